use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Coarse privilege tier. Ordered: `User < Admin < Superadmin`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Superadmin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Admin, Role::Superadmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }

    /// Admin-or-higher. Every admin-gated check also admits superadmin.
    pub fn is_staff(&self) -> bool {
        *self >= Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            _ => Err(CoreError::validation("Invalid role")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    Inactive,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Active => "active",
            IdentityStatus::Inactive => "inactive",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            IdentityStatus::Active => IdentityStatus::Inactive,
            IdentityStatus::Inactive => IdentityStatus::Active,
        }
    }
}

impl FromStr for IdentityStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(IdentityStatus::Active),
            "inactive" => Ok(IdentityStatus::Inactive),
            _ => Err(CoreError::validation("Invalid status")),
        }
    }
}

/// A stored principal. `password_hash` is a PHC string; the plaintext is
/// never kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub status: IdentityStatus,
    /// Capability tags, only meaningful for `Role::Admin`.
    pub permissions: BTreeSet<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: IdentityStatus,
    pub permissions: BTreeSet<String>,
}

/// Partial update: only the fields that are `Some` are written.
#[derive(Debug, Clone, Default)]
pub struct IdentityPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub status: Option<IdentityStatus>,
    pub permissions: Option<BTreeSet<String>>,
}

impl IdentityPatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.role.is_none()
            && self.status.is_none()
            && self.permissions.is_none()
    }

    /// Applies the patch to an in-memory copy.
    pub fn apply_to(&self, identity: &mut Identity) {
        if let Some(v) = &self.first_name {
            identity.first_name = v.clone();
        }
        if let Some(v) = &self.last_name {
            identity.last_name = v.clone();
        }
        if let Some(v) = &self.email {
            identity.email = v.clone();
        }
        if let Some(v) = &self.password_hash {
            identity.password_hash = v.clone();
        }
        if let Some(v) = self.role {
            identity.role = v;
        }
        if let Some(v) = self.status {
            identity.status = v;
        }
        if let Some(v) = &self.permissions {
            identity.permissions = v.clone();
        }
    }
}

/// The authenticated caller of an operation, as established by the
/// authorization layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub email: String,
    pub role: Role,
    pub origin: Option<String>,
}

impl Actor {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        Self {
            email: email.into(),
            role,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }
}

/// Splits a single "name" field the way the admin forms submit it:
/// first word is the first name, the remainder the last name.
pub fn split_name(name: &str) -> (String, String) {
    let name = name.trim();
    match name.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}
