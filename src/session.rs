//! User directory and active-session bookkeeping.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use crate::models::User;

/// Identifies the connection that currently holds a user's session.
///
/// This is what the directory stores per logged-in username: enough to reach
/// and recognize the owning connection. The connection id guards teardown — a
/// handler going away only removes the entry it installed itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub conn_id: u64,
    pub peer_addr: SocketAddr,
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<String, User>,
    active: HashMap<String, ConnectionHandle>,
}

/// Shared mapping of username to credentials and to the active connection.
///
/// Every operation is atomic under one directory-wide lock; no caller ever
/// touches the raw maps. Users are insertion-only and live for the process
/// lifetime, active entries come and go with login/logout/disconnect.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    inner: Mutex<DirectoryState>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the user and marks the directory entry logged-in. Fails if the
    /// username is already taken; under concurrent attempts for one username
    /// exactly one caller wins.
    pub fn register(&self, username: &str, password: &str, handle: ConnectionHandle) -> bool {
        let mut state = self.inner.lock().expect("directory lock poisoned");
        if state.users.contains_key(username) {
            return false;
        }
        state
            .users
            .insert(username.to_string(), User::new(username, password));
        state.active.insert(username.to_string(), handle);
        true
    }

    /// Clear-text credential check; on success the caller's handle becomes the
    /// active entry, replacing any previous holder.
    pub fn login(&self, username: &str, password: &str, handle: ConnectionHandle) -> bool {
        let mut state = self.inner.lock().expect("directory lock poisoned");
        match state.users.get(username) {
            Some(user) if user.password == password => {
                state.active.insert(username.to_string(), handle);
                true
            }
            _ => false,
        }
    }

    pub fn logout(&self, username: &str) -> bool {
        let mut state = self.inner.lock().expect("directory lock poisoned");
        state.active.remove(username).is_some()
    }

    /// Connection-teardown cleanup. Removes the active entry only if it still
    /// belongs to the departing connection, so a newer login is kept intact.
    pub fn disconnect(&self, username: &str, conn_id: u64) {
        let mut state = self.inner.lock().expect("directory lock poisoned");
        if state
            .active
            .get(username)
            .is_some_and(|handle| handle.conn_id == conn_id)
        {
            state.active.remove(username);
        }
    }

    pub fn is_logged_in(&self, username: &str) -> bool {
        let state = self.inner.lock().expect("directory lock poisoned");
        state.active.contains_key(username)
    }
}
