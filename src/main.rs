use clap::Parser;
use event_synapse::plugins::{OrderPlugin, UserPlugin};
use event_synapse::prelude::*;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Run the event synapse with the bundled plugins",
    long_about = None
)]
struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(short, long)]
    log_level: Option<String>,

    /// Only these plugins may initialize (comma separated)
    #[arg(long, value_delimiter = ',')]
    enable: Vec<String>,

    /// Plugins that are registered but never initialized (comma separated)
    #[arg(long, value_delimiter = ',')]
    disable: Vec<String>,

    /// Extra env file loaded before the process environment is read
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Initialize, announce startup, then shut down without waiting for a signal
    #[arg(long)]
    no_signals: bool,
}

fn config_from(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::from_env()?;

    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if !cli.enable.is_empty() {
        config.policy.enabled = cli.enable.clone();
    }
    if !cli.disable.is_empty() {
        config.policy.disabled = cli.disable.clone();
    }
    if cli.no_signals {
        config.enable_signal_handling = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenv::from_path(path)?;
        }
        None => {
            let _ = dotenv::dotenv();
        }
    }

    let config = config_from(&cli)?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(fmt::layer())
        .init();

    info!(
        app = %config.name,
        environment = %config.environment,
        "{}",
        event_synapse::build_info()
    );

    let signals = config.enable_signal_handling;
    let mut app = SynapseApp::build()
        .with_config(config)
        .add_plugin(UserPlugin::new())
        .add_plugin(OrderPlugin::new())
        .build()?;

    let mut outcome = app.run().await;
    if outcome.is_ok() && !signals {
        outcome = app.shutdown().await;
    }

    if let Err(e) = &outcome {
        error!(error = %e, "Application stopped with an error");
    }
    outcome?;
    Ok(())
}
