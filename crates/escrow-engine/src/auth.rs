//! # User Directory and Staff Roles
//!
//! [`AdminAuth`] answers one question: what role does this user hold? An
//! unknown user is `None`, which the engine reports as `NotFound`.
//! Transaction parties are any known users; only the release queue gates
//! on the role itself.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use escrow_core::{UserId, UserRole};

/// Role lookup consulted by the engine.
pub trait AdminAuth: Send + Sync {
    /// The user's role, or `None` if the user is unknown.
    fn role(&self, user: UserId) -> Option<UserRole>;
}

/// In-memory directory. Clones share data.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: Arc<RwLock<HashMap<UserId, UserRole>>>,
}

impl StaticDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user's role.
    pub fn register(&self, user: UserId, role: UserRole) {
        self.users.write().insert(user, role);
    }

    /// Add the user as `UserRole::User` unless already known. Returns the
    /// role they end up with.
    pub fn ensure(&self, user: UserId) -> UserRole {
        *self.users.write().entry(user).or_insert(UserRole::User)
    }

    /// Every known user and role.
    pub fn list(&self) -> Vec<(UserId, UserRole)> {
        let mut users: Vec<_> = self.users.read().iter().map(|(u, r)| (*u, *r)).collect();
        users.sort_by_key(|(u, _)| *u);
        users
    }
}

impl AdminAuth for StaticDirectory {
    fn role(&self, user: UserId) -> Option<UserRole> {
        self.users.read().get(&user).copied()
    }
}
