//! User plugin: keeps an in-memory directory in step with `user.*` events

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::bail;
use crate::core::{names, BasePlugin, Event, HandlerBinding, Plugin, PluginMetadata};
use crate::error::Result;
use crate::plugins::{optional_string, required_str};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub logins: u32,
    pub online: bool,
}

/// Shared handle to the users seen so far
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl UserDirectory {
    pub fn get(&self, id: &str) -> Option<UserRecord> {
        self.users.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.users.read().values().filter(|u| u.online).count()
    }
}

type UserOp = fn(&UserDirectory, &Event) -> Result<()>;

pub struct UserPlugin {
    base: BasePlugin,
    directory: UserDirectory,
}

impl UserPlugin {
    pub fn new() -> Self {
        Self {
            base: BasePlugin::new("user-plugin", "1.0.0")
                .with_description("Handles user-related events"),
            directory: UserDirectory::default(),
        }
    }

    pub fn directory(&self) -> UserDirectory {
        self.directory.clone()
    }

    fn bind(&mut self, event_name: &str, op: UserOp) {
        let directory = self.directory.clone();
        let handler = self.base.create_event_handler(event_name, move |event| {
            let directory = directory.clone();
            async move { op(&directory, &event) }
        });
        self.base.register_event_handler(event_name, handler, 0, false);
    }

    fn handle_user_created(directory: &UserDirectory, event: &Event) -> Result<()> {
        let id = required_str(event, "id")?;
        let mut users = directory.users.write();
        if users.contains_key(id) {
            bail!("user {} already exists", id);
        }

        users.insert(
            id.to_string(),
            UserRecord {
                id: id.to_string(),
                email: optional_string(event, "email"),
                name: optional_string(event, "name"),
                logins: 0,
                online: false,
            },
        );
        info!(user = %id, correlation_id = %event.correlation_id(), "User created");
        Ok(())
    }

    fn handle_user_updated(directory: &UserDirectory, event: &Event) -> Result<()> {
        let id = required_str(event, "id")?;
        let mut users = directory.users.write();
        let Some(user) = users.get_mut(id) else {
            bail!("cannot update unknown user {}", id);
        };

        if let Some(email) = optional_string(event, "email") {
            user.email = Some(email);
        }
        if let Some(name) = optional_string(event, "name") {
            user.name = Some(name);
        }
        info!(user = %id, "User updated");
        Ok(())
    }

    fn handle_user_deleted(directory: &UserDirectory, event: &Event) -> Result<()> {
        let id = required_str(event, "id")?;
        if directory.users.write().remove(id).is_none() {
            bail!("cannot delete unknown user {}", id);
        }
        info!(user = %id, "User deleted");
        Ok(())
    }

    fn handle_user_login(directory: &UserDirectory, event: &Event) -> Result<()> {
        let id = required_str(event, "id")?;
        let mut users = directory.users.write();
        let Some(user) = users.get_mut(id) else {
            bail!("login for unknown user {}", id);
        };

        user.logins += 1;
        user.online = true;
        info!(user = %id, logins = user.logins, "User login");
        Ok(())
    }

    fn handle_user_logout(directory: &UserDirectory, event: &Event) -> Result<()> {
        let id = required_str(event, "id")?;
        if let Some(user) = directory.users.write().get_mut(id) {
            user.online = false;
        }
        info!(user = %id, "User logout");
        Ok(())
    }
}

impl Default for UserPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for UserPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.base.metadata().clone()
    }

    async fn initialize(&mut self) -> Result<()> {
        info!("Initializing UserPlugin...");

        self.bind(names::USER_CREATED, Self::handle_user_created);
        self.bind(names::USER_UPDATED, Self::handle_user_updated);
        self.bind(names::USER_DELETED, Self::handle_user_deleted);
        self.bind(names::USER_LOGIN, Self::handle_user_login);
        self.bind(names::USER_LOGOUT, Self::handle_user_logout);

        info!("UserPlugin initialized successfully");
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        info!("Destroying UserPlugin...");
        self.base.clear_event_handlers();
        Ok(())
    }

    fn event_handlers(&self) -> Vec<HandlerBinding> {
        self.base.event_handlers()
    }
}
