// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory stand-in for the SQL backend.
//!
//! Holds the same logical tables as the database, keyed by table name. Rows are
//! keyed by username, so the map's entry API enforces the unique-username
//! constraint exactly as the SQL unique index does.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use super::traits::StorageError;
use crate::account::{AdminAccount, NewAccount};
use crate::schema::USERS_TABLE;

pub struct MemoryTable {
    rows: DashMap<String, AdminAccount>,
    next_id: AtomicI64,
}

impl MemoryTable {
    fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    #[must_use]
    pub fn find(&self, username: &str) -> Option<AdminAccount> {
        self.rows.get(username).map(|r| r.value().clone())
    }

    /// Insert a row. A duplicate username is a [`StorageError::ConstraintViolation`].
    pub fn insert(&self, new: &NewAccount) -> Result<AdminAccount, StorageError> {
        match self.rows.entry(new.username.clone()) {
            Entry::Occupied(_) => Err(StorageError::ConstraintViolation(format!(
                "duplicate entry '{}' for key 'username'",
                new.username
            ))),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let account = AdminAccount {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    username: new.username.clone(),
                    password_hash: new.password_hash.clone(),
                    full_name: Some(new.full_name.clone()),
                    email: Some(new.email.clone()),
                    role: new.role,
                    active: new.active,
                    created_at: Some(now),
                    updated_at: Some(now),
                };
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }

    /// Replace the password hash and nothing else. Returns the number of rows touched.
    pub fn update_password(&self, username: &str, password_hash: &str) -> u64 {
        match self.rows.get_mut(username) {
            Some(mut row) => {
                row.password_hash = password_hash.to_string();
                1
            }
            None => 0,
        }
    }

    /// Insert or overwrite a full row (fixtures and setup tooling).
    pub fn put(&self, account: AdminAccount) {
        self.next_id.fetch_max(account.id + 1, Ordering::Relaxed);
        self.rows.insert(account.username.clone(), account);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A set of named in-memory tables.
pub struct MemoryDatabase {
    tables: RwLock<HashMap<String, Arc<MemoryTable>>>,
}

impl MemoryDatabase {
    /// Database with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Database seeded with an empty `users` table (degraded-mode startup).
    #[must_use]
    pub fn with_users_table() -> Self {
        let db = Self::new();
        db.create_table(USERS_TABLE);
        db
    }

    /// Create a table if it doesn't exist yet.
    pub fn create_table(&self, name: &str) -> Arc<MemoryTable> {
        self.tables
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryTable::new()))
            .clone()
    }

    /// Drop a table. Returns `true` if it existed.
    pub fn drop_table(&self, name: &str) -> bool {
        self.tables.write().remove(name).is_some()
    }

    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    pub fn table(&self, name: &str) -> Result<Arc<MemoryTable>, StorageError> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::SchemaMissing(name.to_string()))
    }

    /// Table names, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}
