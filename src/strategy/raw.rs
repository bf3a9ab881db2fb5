// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Literal, dialect-specific SQL against the `users` table.
//!
//! Independent of any model binding, so it still works when the schema-typed strategy
//! cannot be used. Column lists are explicit; `SELECT *` would hand the `Any` driver
//! column types it can't decode.

use async_trait::async_trait;
use sqlx::{Any, AnyConnection};

use super::{QueryStrategy, StrategyName};
use crate::account::{AdminAccount, NewAccount, PasswordUpdate};
use crate::config::Dialect;
use crate::schema::USERS_TABLE;
use crate::storage::row::{account_from_row, AccountColumns};
use crate::storage::{ConnectionManager, StorageError};

const NAME: &str = "raw";

mod mysql {
    pub const FIND: &str = "SELECT id, username, password, fullName, email, role, active, \
        CAST(createdAt AS CHAR) AS createdAt, CAST(updatedAt AS CHAR) AS updatedAt \
        FROM users WHERE username = ?";
    pub const INSERT: &str = "INSERT INTO users (username, password, fullName, email, role, active, createdAt) \
        VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)";
    pub const UPDATE_PASSWORD: &str = "UPDATE users SET password = ? WHERE username = ?";
}

mod postgres {
    pub const FIND: &str = "SELECT id, username, password, \"fullName\", email, role, active, \
        CAST(\"createdAt\" AS TEXT) AS \"createdAt\", CAST(\"updatedAt\" AS TEXT) AS \"updatedAt\" \
        FROM users WHERE username = $1";
    pub const INSERT: &str = "INSERT INTO users (username, password, \"fullName\", email, role, active, \"createdAt\") \
        VALUES ($1, $2, $3, $4, $5, $6, CURRENT_TIMESTAMP)";
    pub const UPDATE_PASSWORD: &str = "UPDATE users SET password = $1 WHERE username = $2";
}

struct Sql {
    find: &'static str,
    insert: &'static str,
    update_password: &'static str,
}

fn statements(dialect: Dialect) -> Sql {
    match dialect {
        Dialect::Postgres => Sql {
            find: postgres::FIND,
            insert: postgres::INSERT,
            update_password: postgres::UPDATE_PASSWORD,
        },
        _ => Sql {
            find: mysql::FIND,
            insert: mysql::INSERT,
            update_password: mysql::UPDATE_PASSWORD,
        },
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RawSqlStrategy;

impl RawSqlStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl StrategyName for RawSqlStrategy {
    fn name(&self) -> &'static str {
        NAME
    }
}

async fn select_by_username(
    conn: &mut AnyConnection,
    dialect: Dialect,
    username: &str,
) -> Result<Option<AdminAccount>, StorageError> {
    let row = sqlx::query::<Any>(statements(dialect).find)
        .bind(username.to_string())
        .fetch_optional(conn)
        .await
        .map_err(|e| StorageError::from_sqlx(NAME, e))?;
    row.map(|r| account_from_row(&r, &AccountColumns::DEFAULT, NAME))
        .transpose()
}

#[async_trait]
impl QueryStrategy<str, Option<AdminAccount>> for RawSqlStrategy {
    async fn run(&self, conn: &ConnectionManager, username: &str) -> Result<Option<AdminAccount>, StorageError> {
        if let Some(db) = conn.memory_db() {
            return Ok(db.table(USERS_TABLE)?.find(username));
        }
        let mut scoped = conn.acquire().await?;
        select_by_username(scoped.require_sql()?, conn.dialect(), username).await
    }
}

#[async_trait]
impl QueryStrategy<NewAccount, AdminAccount> for RawSqlStrategy {
    async fn run(&self, conn: &ConnectionManager, account: &NewAccount) -> Result<AdminAccount, StorageError> {
        if let Some(db) = conn.memory_db() {
            return db.table(USERS_TABLE)?.insert(account);
        }

        let dialect = conn.dialect();
        let mut scoped = conn.acquire().await?;
        let db_conn = scoped.require_sql()?;

        sqlx::query::<Any>(statements(dialect).insert)
            .bind(account.username.clone())
            .bind(account.password_hash.clone())
            .bind(account.full_name.clone())
            .bind(account.email.clone())
            .bind(account.role.as_str().to_string())
            .bind(account.active)
            .execute(&mut *db_conn)
            .await
            .map_err(|e| StorageError::from_sqlx(NAME, e))?;

        select_by_username(db_conn, dialect, &account.username)
            .await?
            .ok_or_else(|| StorageError::strategy(NAME, "inserted row could not be read back"))
    }
}

#[async_trait]
impl QueryStrategy<PasswordUpdate, u64> for RawSqlStrategy {
    async fn run(&self, conn: &ConnectionManager, update: &PasswordUpdate) -> Result<u64, StorageError> {
        if let Some(db) = conn.memory_db() {
            return Ok(db.table(USERS_TABLE)?.update_password(&update.username, &update.password_hash));
        }

        let mut scoped = conn.acquire().await?;
        let result = sqlx::query::<Any>(statements(conn.dialect()).update_password)
            .bind(update.password_hash.clone())
            .bind(update.username.clone())
            .execute(scoped.require_sql()?)
            .await
            .map_err(|e| StorageError::from_sqlx(NAME, e))?;
        Ok(result.rows_affected())
    }
}
