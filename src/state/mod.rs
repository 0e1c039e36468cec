//! In-process state store: accounts, active users, and their capabilities.
//!
//! All access goes through [`SharedState`], a single process-wide lock. A
//! caller holds the guard only for its reads and mutations; anything that
//! waits on a connection (sending replies) happens after the guard is
//! dropped.

pub mod caps;
pub mod credentials;
pub mod roles;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::irc::connection::MessageSink;

pub use caps::Caps;
pub use roles::Role;

/// The process-wide exclusive handoff around the state store.
pub type SharedState = Arc<Mutex<State>>;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no such account")]
    UnknownAccount,
    #[error("password mismatch")]
    BadPassword,
    #[error("stored credential is malformed: {0}")]
    MalformedHash(String),
}

/// An account the gateway can authenticate against.
#[derive(Debug, Clone)]
pub struct Account {
    /// Canonical spelling of the account name.
    pub name: String,
    /// argon2 PHC string.
    pub password_hash: String,
    pub roles: Vec<Role>,
}

/// Who a successful `auth` call identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub roles: Vec<Role>,
}

/// A registered (or registering) user bound to one connection.
#[derive(Debug)]
pub struct User {
    name: String,
    roles: Vec<Role>,
    caps: Caps,
    sink: Option<MessageSink>,
    pub connected_at: DateTime<Utc>,
}

impl User {
    fn new(name: String) -> Self {
        Self {
            name,
            roles: Vec::new(),
            caps: Caps::empty(),
            sink: None,
            connected_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn caps(&self) -> Caps {
        self.caps
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn add_roles(&mut self, roles: impl IntoIterator<Item = Role>) {
        for role in roles {
            if !self.roles.contains(&role) {
                debug!(user = %self.name, role = role.as_str(), "role granted");
                self.roles.push(role);
            }
        }
    }

    /// Bind the outbound sink other parts of the gateway deliver through.
    pub fn set_send_fn(&mut self, sink: MessageSink) {
        self.sink = Some(sink);
    }

    pub fn sink(&self) -> Option<&MessageSink> {
        self.sink.as_ref()
    }
}

/// Shared user/account registry.
pub struct State {
    server_name: String,
    /// Accounts keyed by lowercased name.
    accounts: HashMap<String, Account>,
    /// Active users keyed by lowercased nickname.
    users: HashMap<String, User>,
}

impl State {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            accounts: HashMap::new(),
            users: HashMap::new(),
        }
    }

    /// Wrap into the process-wide handoff.
    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn add_account(&mut self, account: Account) {
        self.accounts.insert(account.name.to_lowercase(), account);
    }

    /// Authenticate `nickname` with `password`.
    ///
    /// The returned identity carries the account's canonical name, which may
    /// differ in case from the requested nickname.
    pub fn auth(&self, nickname: &str, password: &str) -> Result<Identity, AuthError> {
        let account = self
            .accounts
            .get(&nickname.to_lowercase())
            .ok_or(AuthError::UnknownAccount)?;
        credentials::verify_password(password, &account.password_hash)?;
        Ok(Identity {
            name: account.name.clone(),
            roles: account.roles.clone(),
        })
    }

    /// Register an active user. Returns `None` if the name is already active.
    pub fn new_user(&mut self, nickname: &str) -> Option<&mut User> {
        let key = nickname.to_lowercase();
        if self.users.contains_key(&key) {
            return None;
        }
        info!(%nickname, "user created");
        Some(
            self.users
                .entry(key)
                .or_insert_with(|| User::new(nickname.to_string())),
        )
    }

    pub fn remove_user(&mut self, nickname: &str) -> Option<User> {
        let removed = self.users.remove(&nickname.to_lowercase());
        if let Some(user) = &removed {
            let connected_secs = (Utc::now() - user.connected_at).num_seconds();
            info!(%nickname, connected_secs, "user removed");
        }
        removed
    }

    pub fn set_user_cap(&mut self, nickname: &str, cap: Caps) {
        if let Some(user) = self.users.get_mut(&nickname.to_lowercase()) {
            debug!(%nickname, ?cap, "capability set");
            user.caps.insert(cap);
        }
    }

    pub fn user(&self, nickname: &str) -> Option<&User> {
        self.users.get(&nickname.to_lowercase())
    }

    pub fn user_mut(&mut self, nickname: &str) -> Option<&mut User> {
        self.users.get_mut(&nickname.to_lowercase())
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
