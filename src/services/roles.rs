//! Role-based access control.
//!
//! DESIGN
//! ======
//! Every account carries exactly one [`Role`]. Protected operations declare
//! an access set (a slice of allowed roles) and handlers call [`ensure_role`]
//! before touching the repository.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "role", rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            "user" => Ok(Self::User),
            _ => Err(RoleError::Unknown(raw.to_owned())),
        }
    }
}

// =============================================================================
// ACCESS SETS
// =============================================================================

pub const CONTACTS_READ: &[Role] = &[Role::Admin, Role::Moderator, Role::User];
pub const CONTACTS_CREATE: &[Role] = &[Role::Admin, Role::Moderator];
pub const CONTACTS_UPDATE: &[Role] = &[Role::Admin, Role::Moderator];
pub const CONTACTS_DELETE: &[Role] = &[Role::Admin];
pub const USERS_MANAGE: &[Role] = &[Role::Admin];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoleError {
    #[error("Operation forbidden")]
    Forbidden,
    #[error("unknown role: {0}")]
    Unknown(String),
}

/// Reject the caller unless `role` is one of `allowed`.
///
/// # Errors
///
/// Returns [`RoleError::Forbidden`] when the role is not in the access set.
pub fn ensure_role(role: Role, allowed: &[Role]) -> Result<(), RoleError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(RoleError::Forbidden)
    }
}

#[cfg(test)]
#[path = "roles_test.rs"]
mod tests;
