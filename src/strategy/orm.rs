// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Schema-typed account strategy.
//!
//! Statements are derived from a [`TableSchema`] binding: physical column names,
//! identifier quoting and placeholder style all follow the binding and the active
//! dialect. Rows are decoded by the binding's column names. A missing binding, or one
//! lacking a required column, fails before any I/O.

use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::{Any, AnyConnection};
use std::sync::Arc;

use super::{QueryStrategy, StrategyName};
use crate::account::{AdminAccount, NewAccount, PasswordUpdate};
use crate::config::Dialect;
use crate::schema::{quote_ident, users_table, ColumnType, TableSchema};
use crate::storage::row::{account_from_row, AccountColumns};
use crate::storage::{ConnectionManager, StorageError};

const NAME: &str = "orm";

#[derive(Debug, Clone)]
pub struct OrmStrategy {
    schema: Option<Arc<TableSchema>>,
}

impl OrmStrategy {
    #[must_use]
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema: Some(Arc::new(schema)),
        }
    }

    /// Bound to the standard `users` table.
    #[must_use]
    pub fn users() -> Self {
        Self::new(users_table())
    }

    /// No model binding; every call fails with a strategy error.
    #[must_use]
    pub fn unbound() -> Self {
        Self { schema: None }
    }

    #[must_use]
    pub fn schema(&self) -> Option<&TableSchema> {
        self.schema.as_deref()
    }

    fn binding(&self) -> Result<&TableSchema, StorageError> {
        let schema = self
            .schema
            .as_deref()
            .ok_or_else(|| StorageError::strategy(NAME, "no model binding for the users table"))?;
        let missing = schema.missing_required();
        if !missing.is_empty() {
            return Err(StorageError::strategy(
                NAME,
                format!("model '{}' lacks required fields: {}", schema.name, missing.join(", ")),
            ));
        }
        Ok(schema)
    }
}

impl Default for OrmStrategy {
    fn default() -> Self {
        Self::users()
    }
}

impl StrategyName for OrmStrategy {
    fn name(&self) -> &'static str {
        NAME
    }
}

/// A binding rendered for one dialect.
struct Statements<'a> {
    schema: &'a TableSchema,
    dialect: Dialect,
}

impl<'a> Statements<'a> {
    fn new(schema: &'a TableSchema, dialect: Dialect) -> Self {
        Self { schema, dialect }
    }

    fn table(&self) -> String {
        quote_ident(self.dialect, &self.schema.name)
    }

    /// Quoted physical name of a logical field known to be present.
    fn col(&self, field: &str) -> String {
        let name = self.schema.column(field).map_or(field, |c| c.name);
        quote_ident(self.dialect, name)
    }

    fn placeholder(&self, n: usize) -> String {
        match self.dialect {
            Dialect::Postgres => format!("${}", n),
            _ => "?".to_string(),
        }
    }

    /// Every bound column, timestamps cast to text for the `Any` driver.
    fn select_list(&self) -> String {
        let cast_to = match self.dialect {
            Dialect::Postgres => "TEXT",
            _ => "CHAR",
        };
        self.schema
            .columns
            .iter()
            .map(|column| {
                let quoted = quote_ident(self.dialect, column.name);
                if column.ty == ColumnType::Timestamp {
                    format!("CAST({q} AS {t}) AS {q}", q = quoted, t = cast_to)
                } else {
                    quoted
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn find(&self) -> String {
        format!(
            "SELECT {} FROM {} WHERE {} = {} LIMIT 1",
            self.select_list(),
            self.table(),
            self.col("username"),
            self.placeholder(1)
        )
    }

    /// Insert statement plus the logical fields bound to its placeholders, in order.
    fn insert(&self) -> (String, Vec<&'static str>) {
        let mut columns = Vec::new();
        let mut values = Vec::new();
        let mut bound = Vec::new();

        for field in ["username", "password", "full_name", "email", "role", "active"] {
            if let Some(column) = self.schema.column(field) {
                columns.push(quote_ident(self.dialect, column.name));
                bound.push(column.field);
                values.push(self.placeholder(bound.len()));
            }
        }
        for field in ["created_at", "updated_at"] {
            if let Some(column) = self.schema.column(field) {
                columns.push(quote_ident(self.dialect, column.name));
                values.push("CURRENT_TIMESTAMP".to_string());
            }
        }

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            columns.join(", "),
            values.join(", ")
        );
        if self.dialect == Dialect::Postgres {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.select_list());
        }
        (sql, bound)
    }

    fn update_password(&self) -> String {
        format!(
            "UPDATE {} SET {} = {} WHERE {} = {}",
            self.table(),
            self.col("password"),
            self.placeholder(1),
            self.col("username"),
            self.placeholder(2)
        )
    }

    fn columns(&self) -> AccountColumns<'a> {
        let name = |field: &str| self.schema.column(field).map(|c| c.name);
        AccountColumns {
            id: name("id"),
            username: name("username").unwrap_or("username"),
            password: name("password").unwrap_or("password"),
            full_name: name("full_name"),
            email: name("email"),
            role: name("role").unwrap_or("role"),
            active: name("active").unwrap_or("active"),
            created_at: name("created_at").unwrap_or("created_at"),
            updated_at: name("updated_at").unwrap_or("updated_at"),
        }
    }

    fn decode(&self, row: &AnyRow) -> Result<AdminAccount, StorageError> {
        account_from_row(row, &self.columns(), NAME)
    }
}

async fn fetch_account(
    conn: &mut AnyConnection,
    stmts: &Statements<'_>,
    username: &str,
) -> Result<Option<AdminAccount>, StorageError> {
    let sql = stmts.find();
    let row = sqlx::query::<Any>(&sql)
        .bind(username.to_string())
        .fetch_optional(conn)
        .await
        .map_err(|e| StorageError::from_sqlx(NAME, e))?;
    row.map(|r| stmts.decode(&r)).transpose()
}

#[async_trait]
impl QueryStrategy<str, Option<AdminAccount>> for OrmStrategy {
    async fn run(&self, conn: &ConnectionManager, username: &str) -> Result<Option<AdminAccount>, StorageError> {
        let schema = self.binding()?;
        if let Some(db) = conn.memory_db() {
            return Ok(db.table(&schema.name)?.find(username));
        }

        let stmts = Statements::new(schema, conn.dialect());
        let mut scoped = conn.acquire().await?;
        fetch_account(scoped.require_sql()?, &stmts, username).await
    }
}

#[async_trait]
impl QueryStrategy<NewAccount, AdminAccount> for OrmStrategy {
    async fn run(&self, conn: &ConnectionManager, account: &NewAccount) -> Result<AdminAccount, StorageError> {
        let schema = self.binding()?;
        if let Some(db) = conn.memory_db() {
            return db.table(&schema.name)?.insert(account);
        }

        let stmts = Statements::new(schema, conn.dialect());
        let (sql, bound) = stmts.insert();
        let mut query = sqlx::query::<Any>(&sql);
        for field in bound {
            query = match field {
                "username" => query.bind(account.username.clone()),
                "password" => query.bind(account.password_hash.clone()),
                "full_name" => query.bind(account.full_name.clone()),
                "email" => query.bind(account.email.clone()),
                "role" => query.bind(account.role.as_str().to_string()),
                _ => query.bind(account.active),
            };
        }

        let mut scoped = conn.acquire().await?;
        let db_conn = scoped.require_sql()?;

        if conn.dialect() == Dialect::Postgres {
            let row = query
                .fetch_one(&mut *db_conn)
                .await
                .map_err(|e| StorageError::from_sqlx(NAME, e))?;
            return stmts.decode(&row);
        }

        query
            .execute(&mut *db_conn)
            .await
            .map_err(|e| StorageError::from_sqlx(NAME, e))?;
        fetch_account(db_conn, &stmts, &account.username)
            .await?
            .ok_or_else(|| StorageError::strategy(NAME, "inserted row could not be read back"))
    }
}

#[async_trait]
impl QueryStrategy<PasswordUpdate, u64> for OrmStrategy {
    async fn run(&self, conn: &ConnectionManager, update: &PasswordUpdate) -> Result<u64, StorageError> {
        let schema = self.binding()?;
        if let Some(db) = conn.memory_db() {
            return Ok(db.table(&schema.name)?.update_password(&update.username, &update.password_hash));
        }

        let stmts = Statements::new(schema, conn.dialect());
        let sql = stmts.update_password();
        let mut scoped = conn.acquire().await?;
        let result = sqlx::query::<Any>(&sql)
            .bind(update.password_hash.clone())
            .bind(update.username.clone())
            .execute(scoped.require_sql()?)
            .await
            .map_err(|e| StorageError::from_sqlx(NAME, e))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AdminDefaults, Role};
    use crate::config::BackendConfig;
    use crate::storage::MemoryDatabase;

    fn memory_manager() -> (Arc<MemoryDatabase>, ConnectionManager) {
        let db = Arc::new(MemoryDatabase::with_users_table());
        (db.clone(), ConnectionManager::from_memory(db))
    }

    #[test]
    fn test_mysql_statements() {
        let schema = users_table();
        let stmts = Statements::new(&schema, Dialect::Mysql);

        assert_eq!(
            stmts.find(),
            "SELECT `id`, `username`, `password`, `fullName`, `email`, `role`, `active`, \
             CAST(`createdAt` AS CHAR) AS `createdAt`, CAST(`updatedAt` AS CHAR) AS `updatedAt` \
             FROM `users` WHERE `username` = ? LIMIT 1"
        );

        let (insert, bound) = stmts.insert();
        assert_eq!(
            insert,
            "INSERT INTO `users` (`username`, `password`, `fullName`, `email`, `role`, `active`, \
             `createdAt`, `updatedAt`) VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)"
        );
        assert_eq!(bound.len(), 6);

        assert_eq!(
            stmts.update_password(),
            "UPDATE `users` SET `password` = ? WHERE `username` = ?"
        );
    }

    #[test]
    fn test_postgres_statements() {
        let schema = users_table();
        let stmts = Statements::new(&schema, Dialect::Postgres);

        assert!(stmts.find().ends_with("FROM \"users\" WHERE \"username\" = $1 LIMIT 1"));
        assert!(stmts.find().contains("CAST(\"createdAt\" AS TEXT) AS \"createdAt\""));

        let (insert, _) = stmts.insert();
        assert!(insert.contains("VALUES ($1, $2, $3, $4, $5, $6, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)"));
        assert!(insert.contains(" RETURNING \"id\""));

        assert_eq!(
            stmts.update_password(),
            "UPDATE \"users\" SET \"password\" = $1 WHERE \"username\" = $2"
        );
    }

    #[tokio::test]
    async fn test_unbound_strategy_fails_before_io() {
        let orm = OrmStrategy::unbound();
        let manager = ConnectionManager::connect(BackendConfig::memory()).unwrap();
        manager.close().await;

        let err = QueryStrategy::<str, Option<AdminAccount>>::run(&orm, &manager, "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Strategy { strategy: "orm", .. }));
    }

    #[tokio::test]
    async fn test_incomplete_binding_is_rejected() {
        let mut schema = users_table();
        schema.columns.retain(|c| c.field != "role");
        let orm = OrmStrategy::new(schema);
        let (_, manager) = memory_manager();

        let err = QueryStrategy::<str, Option<AdminAccount>>::run(&orm, &manager, "admin")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("role"));
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let orm = OrmStrategy::users();
        let (db, manager) = memory_manager();
        let new = AdminDefaults::default().new_account("hash".into());

        let created = QueryStrategy::<NewAccount, AdminAccount>::run(&orm, &manager, &new)
            .await
            .unwrap();
        assert_eq!(created.role, Role::Admin);

        let found = QueryStrategy::<str, Option<AdminAccount>>::run(&orm, &manager, "admin")
            .await
            .unwrap();
        assert_eq!(found, Some(created));

        let update = PasswordUpdate {
            username: "admin".into(),
            password_hash: "new".into(),
        };
        let touched = QueryStrategy::<PasswordUpdate, u64>::run(&orm, &manager, &update)
            .await
            .unwrap();
        assert_eq!(touched, 1);
        assert_eq!(db.table("users").unwrap().find("admin").unwrap().password_hash, "new");
    }

    #[tokio::test]
    async fn test_memory_missing_table() {
        let orm = OrmStrategy::users();
        let (db, manager) = memory_manager();
        db.drop_table("users");

        let err = QueryStrategy::<str, Option<AdminAccount>>::run(&orm, &manager, "admin")
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::SchemaMissing("users".into()));
    }
}
