// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Account records handled by the bootstrap routine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Account role. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Parse a stored role. Anything unrecognised is treated as a plain user.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::User
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminAccount {
    pub id: i64,
    /// Unique, case-sensitive.
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
}

/// Password refresh for an existing account. Touches the hash only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordUpdate {
    pub username: String,
    pub password_hash: String,
}

/// The fixed first-run credential and profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminDefaults {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
}

impl Default for AdminDefaults {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "700700".to_string(),
            full_name: "System Administrator".to_string(),
            email: "admin@example.com".to_string(),
        }
    }
}

impl AdminDefaults {
    /// Insert payload for the default account with an already-computed hash.
    #[must_use]
    pub fn new_account(&self, password_hash: String) -> NewAccount {
        NewAccount {
            username: self.username.clone(),
            password_hash,
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            role: Role::Admin,
            active: true,
        }
    }
}
