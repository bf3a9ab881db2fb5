// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Table-existence probe.
//!
//! The probe is biased towards "exists": when it can't tell, it records the fault and
//! answers `true`, so the later read/write steps surface the real error through their
//! own fallback chain.
//!
//! ```text
//! table_exists(t)
//!   ├─ memory  ─► exact lookup
//!   └─ sql     ─► primary dialect query ─(err)─► alternate dialect query, once
//!                                                  └─(err)─► record, assume true
//! ```
//!
//! The alternate-dialect attempt covers a backend that was configured as one SQL
//! family but actually speaks the other. It is tried exactly once and never chained further.

use std::sync::Arc;
use tracing::{debug, warn};

use super::is_valid_identifier;
use crate::config::Dialect;
use crate::diagnostics::DiagnosticSink;
use crate::storage::row::{get_i64, get_string};
use crate::storage::{ConnectionManager, StorageError};

const PROBE: &str = "schema-probe";

#[derive(Clone)]
pub struct SchemaProbe {
    sink: Arc<DiagnosticSink>,
}

impl SchemaProbe {
    pub fn new(sink: Arc<DiagnosticSink>) -> Self {
        Self { sink }
    }

    /// Whether `table` exists on the manager's backend. Never errors.
    pub async fn table_exists(&self, manager: &ConnectionManager, table: &str) -> bool {
        let dialect = manager.dialect();

        if !is_valid_identifier(table) {
            let err = StorageError::strategy(PROBE, format!("refusing to probe invalid table name {:?}", table));
            self.sink.record("Schema probe skipped", &err).await;
            crate::metrics::record_schema_probe(&dialect.to_string(), "assumed");
            return true;
        }

        if let Some(db) = manager.memory_db() {
            let exists = db.has_table(table);
            crate::metrics::record_schema_probe("memory", if exists { "found" } else { "missing" });
            return exists;
        }

        let primary = match probe_query(manager, dialect, table).await {
            Ok(exists) => {
                debug!(%dialect, table, exists, "Schema probe answered");
                crate::metrics::record_schema_probe(&dialect.to_string(), if exists { "found" } else { "missing" });
                return exists;
            }
            Err(e) => e,
        };

        if let Some(alternate) = dialect.alternate() {
            warn!(%dialect, %alternate, table, error = %primary, "Schema probe failed, trying the alternate dialect query");
            match probe_query(manager, alternate, table).await {
                Ok(exists) => {
                    crate::metrics::record_schema_probe(&dialect.to_string(), if exists { "found" } else { "missing" });
                    return exists;
                }
                Err(e) => {
                    debug!(%alternate, error = %e, "Alternate dialect probe failed");
                }
            }
        }

        self.sink
            .record(&format!("Could not determine whether table '{}' exists, assuming it does", table), &primary)
            .await;
        crate::metrics::record_schema_probe(&dialect.to_string(), "assumed");
        true
    }

    /// Names of the tables visible to the connection's schema.
    pub async fn list_tables(&self, manager: &ConnectionManager) -> Result<Vec<String>, StorageError> {
        if let Some(db) = manager.memory_db() {
            return Ok(db.table_names());
        }

        let sql = match manager.dialect() {
            Dialect::Postgres => {
                "SELECT CAST(table_name AS TEXT) AS table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() ORDER BY table_name"
            }
            _ => "SHOW TABLES",
        };

        let mut scoped = manager.acquire().await?;
        let conn = scoped.require_sql()?;
        let rows = sqlx::query(sql)
            .fetch_all(conn)
            .await
            .map_err(|e| StorageError::from_sqlx(PROBE, e))?;

        Ok(rows.iter().filter_map(|row| get_string(row, 0usize)).collect())
    }
}

async fn probe_query(manager: &ConnectionManager, dialect: Dialect, table: &str) -> Result<bool, StorageError> {
    let mut scoped = manager.acquire().await?;
    let conn = scoped.require_sql()?;

    match dialect {
        Dialect::Postgres => {
            let sql = format!(
                "SELECT COUNT(*) AS n FROM information_schema.tables WHERE table_name = '{}'",
                table
            );
            let row = sqlx::query(&sql)
                .fetch_one(conn)
                .await
                .map_err(|e| StorageError::from_sqlx(PROBE, e))?;
            table_count_answer(get_i64(&row, "n"))
        }
        _ => {
            // `_` is a LIKE wildcard
            let sql = format!("SHOW TABLES LIKE '{}'", table.replace('_', "\\_"));
            let rows = sqlx::query(&sql)
                .fetch_all(conn)
                .await
                .map_err(|e| StorageError::from_sqlx(PROBE, e))?;
            Ok(!rows.is_empty())
        }
    }
}

/// An undecodable count is a failed probe, not an empty schema.
fn table_count_answer(count: Option<i64>) -> Result<bool, StorageError> {
    count
        .map(|n| n > 0)
        .ok_or_else(|| StorageError::strategy(PROBE, "unreadable table count"))
}
