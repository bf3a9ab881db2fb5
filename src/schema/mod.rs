// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed description of the tables the data-access layer touches.
//!
//! The ORM strategy binds to a [`TableSchema`] to build its statements and to decode
//! rows by column name. The description also renders per-dialect DDL for setup
//! tooling; the bootstrap routine itself never creates tables.
//!
//! # Example
//!
//! ```
//! use admin_bootstrap::schema::{users_table, quote_ident};
//! use admin_bootstrap::Dialect;
//!
//! let users = users_table();
//! assert_eq!(users.name, "users");
//! assert_eq!(users.column("full_name").unwrap().name, "fullName");
//! assert!(users.missing_required().is_empty());
//!
//! assert_eq!(quote_ident(Dialect::Mysql, "fullName"), "`fullName`");
//! assert_eq!(quote_ident(Dialect::Postgres, "fullName"), "\"fullName\"");
//! ```

pub mod probe;

pub use probe::SchemaProbe;

use crate::config::Dialect;

/// Name of the accounts table.
pub const USERS_TABLE: &str = "users";

/// Logical fields the ORM strategy cannot work without.
pub const REQUIRED_USER_FIELDS: &[&str] = &[
    "username",
    "password",
    "role",
    "active",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing integer key
    Id,
    /// Short text with a length limit
    Varchar(u16),
    Bool,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Logical field name used by code
    pub field: &'static str,
    /// Physical column name in the database
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    /// Compare values byte-for-byte, overriding MySQL's case-insensitive default collation
    pub case_sensitive: bool,
    /// SQL default expression, inlined verbatim into DDL
    pub default: Option<&'static str>,
}

impl Column {
    const fn new(field: &'static str, name: &'static str, ty: ColumnType) -> Self {
        Self {
            field,
            name,
            ty,
            nullable: true,
            unique: false,
            case_sensitive: false,
            default: None,
        }
    }

    const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    const fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    const fn default_to(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Column for a logical field.
    #[must_use]
    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Required logical fields absent from this description.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_USER_FIELDS
            .iter()
            .copied()
            .filter(|field| self.column(field).is_none())
            .collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for setup tooling.
    ///
    /// Returns `None` for the in-memory dialect, which creates tables directly.
    #[must_use]
    pub fn create_table_sql(&self, dialect: Dialect) -> Option<String> {
        if !dialect.is_sql() {
            return None;
        }
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|column| column_ddl(dialect, column))
            .collect();
        Some(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(dialect, &self.name),
            columns.join(",\n    ")
        ))
    }
}

fn column_ddl(dialect: Dialect, column: &Column) -> String {
    let name = quote_ident(dialect, column.name);
    let ty = match (column.ty, dialect) {
        (ColumnType::Id, Dialect::Postgres) => return format!("{} SERIAL PRIMARY KEY", name),
        (ColumnType::Id, _) => return format!("{} INT AUTO_INCREMENT PRIMARY KEY", name),
        (ColumnType::Varchar(len), _) => format!("VARCHAR({})", len),
        (ColumnType::Bool, _) => "BOOLEAN".to_string(),
        (ColumnType::Timestamp, _) => "TIMESTAMP".to_string(),
    };

    let mut ddl = format!("{} {}", name, ty);
    if dialect == Dialect::Mysql && column.case_sensitive {
        ddl.push_str(" COLLATE utf8mb4_bin");
    }
    if !column.nullable {
        ddl.push_str(" NOT NULL");
    }
    if column.unique {
        ddl.push_str(" UNIQUE");
    }
    if let Some(default) = column.default {
        ddl.push_str(" DEFAULT ");
        ddl.push_str(default);
    }
    ddl
}

/// The `users` table as created by the setup tooling.
#[must_use]
pub fn users_table() -> TableSchema {
    TableSchema {
        name: USERS_TABLE.to_string(),
        columns: vec![
            Column::new("id", "id", ColumnType::Id).not_null(),
            Column::new("username", "username", ColumnType::Varchar(50))
                .not_null()
                .unique()
                .case_sensitive(),
            Column::new("password", "password", ColumnType::Varchar(255)).not_null(),
            Column::new("full_name", "fullName", ColumnType::Varchar(100)),
            Column::new("email", "email", ColumnType::Varchar(100)),
            Column::new("role", "role", ColumnType::Varchar(20)).default_to("'user'"),
            Column::new("active", "active", ColumnType::Bool).default_to("TRUE"),
            Column::new("created_at", "createdAt", ColumnType::Timestamp).default_to("CURRENT_TIMESTAMP"),
            Column::new("updated_at", "updatedAt", ColumnType::Timestamp).default_to("CURRENT_TIMESTAMP"),
        ],
    }
}

/// Quote an identifier for `dialect`.
#[must_use]
pub fn quote_ident(dialect: Dialect, ident: &str) -> String {
    match dialect {
        Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        _ => format!("`{}`", ident.replace('`', "``")),
    }
}

/// Plain identifiers only: ASCII letters, digits and underscores, not starting with a digit.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
