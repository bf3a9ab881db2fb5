// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lenient column decoding for the sqlx `Any` driver.
//!
//! The `Any` driver reports the same logical column differently per backend:
//! MySQL text can arrive as bytes, `BOOLEAN` is a `TINYINT(1)`, `INT`/`SERIAL`
//! keys are 32-bit. These helpers try the plausible representations in turn.
//! Timestamps are selected as text (`CAST(... AS CHAR/TEXT)`) because the `Any`
//! driver has no timestamp type.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::{ColumnIndex, Row};

use super::traits::StorageError;
use crate::account::{AdminAccount, Role};

pub(crate) fn get_string<I>(row: &AnyRow, index: I) -> Option<String>
where
    I: ColumnIndex<AnyRow> + Copy,
{
    row.try_get::<Option<String>, _>(index)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(index)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

pub(crate) fn get_i64<I>(row: &AnyRow, index: I) -> Option<i64>
where
    I: ColumnIndex<AnyRow> + Copy,
{
    row.try_get::<i64, _>(index)
        .ok()
        .or_else(|| row.try_get::<i32, _>(index).ok().map(i64::from))
        .or_else(|| row.try_get::<i16, _>(index).ok().map(i64::from))
}

pub(crate) fn get_bool<I>(row: &AnyRow, index: I) -> Option<bool>
where
    I: ColumnIndex<AnyRow> + Copy,
{
    row.try_get::<bool, _>(index)
        .ok()
        .or_else(|| get_i64(row, index).map(|n| n != 0))
        .or_else(|| {
            get_string(row, index).map(|s| matches!(s.trim(), "1" | "t" | "true" | "TRUE"))
        })
}

pub(crate) fn get_timestamp<I>(row: &AnyRow, index: I) -> Option<DateTime<Utc>>
where
    I: ColumnIndex<AnyRow> + Copy,
{
    get_string(row, index).and_then(|raw| parse_timestamp(&raw))
}

/// Parse the textual timestamp forms MySQL, Postgres and SQLite produce.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Postgres TIMESTAMPTZ::text, e.g. "2026-10-15 09:12:44.12+00"
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Physical column labels of an account result set.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AccountColumns<'a> {
    pub id: Option<&'a str>,
    pub username: &'a str,
    pub password: &'a str,
    pub full_name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub role: &'a str,
    pub active: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

impl AccountColumns<'static> {
    /// Labels used by the setup tooling's `users` table.
    pub(crate) const DEFAULT: Self = Self {
        id: Some("id"),
        username: "username",
        password: "password",
        full_name: Some("fullName"),
        email: Some("email"),
        role: "role",
        active: "active",
        created_at: "createdAt",
        updated_at: "updatedAt",
    };
}

/// Decode an account. A missing username or password is a result-shape mismatch.
pub(crate) fn account_from_row(
    row: &AnyRow,
    columns: &AccountColumns<'_>,
    strategy: &'static str,
) -> Result<AdminAccount, StorageError> {
    let username = get_string(row, columns.username).ok_or_else(|| {
        StorageError::strategy(strategy, format!("result has no '{}' column", columns.username))
    })?;
    let password_hash = get_string(row, columns.password).ok_or_else(|| {
        StorageError::strategy(strategy, format!("result has no '{}' column", columns.password))
    })?;

    Ok(AdminAccount {
        id: columns.id.and_then(|c| get_i64(row, c)).unwrap_or(0),
        username,
        password_hash,
        full_name: columns.full_name.and_then(|c| get_string(row, c)),
        email: columns.email.and_then(|c| get_string(row, c)),
        role: get_string(row, columns.role)
            .map(|r| Role::parse(&r))
            .unwrap_or(Role::User),
        active: get_bool(row, columns.active).unwrap_or(true),
        created_at: get_timestamp(row, columns.created_at),
        updated_at: get_timestamp(row, columns.updated_at),
    })
}
