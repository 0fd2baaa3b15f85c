//! The caller identity handed to every core operation.
//!
//! The identity provider has already authenticated the actor; the core trusts
//! `id` and `role` as given.

use crate::entities::Role;
use serde::{Deserialize, Serialize};

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identifier from the identity provider
    pub id: String,
    /// Role the identity provider reports for this actor
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn supervisor(id: impl Into<String>) -> Self {
        Self::new(id, Role::Supervisor)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn super_admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::SuperAdmin)
    }

    #[must_use]
    pub const fn is_supervisor(&self) -> bool {
        matches!(self.role, Role::Supervisor)
    }
}
