// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Append-only diagnostic log for backend failures.
//!
//! Each record is one line:
//!
//! ```text
//! [2026-10-15T09:12:44.120Z] users table probe failed: connection error: pool timed out
//! ```
//!
//! The sink is written to, never read, by the data-access layer. A failed write is
//! reported through `tracing` and otherwise swallowed.

use chrono::{SecondsFormat, Utc};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::error;

use crate::storage::traits::StorageError;

pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "db-errors.log";

pub struct DiagnosticSink {
    path: PathBuf,
    /// Serializes appends from concurrent bootstrap runs
    write_lock: Mutex<()>,
}

impl DiagnosticSink {
    /// Sink writing to `path`. Nothing touches the filesystem until the first record.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `logs/db-errors.log` under `root`.
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a timestamped record. Never fails.
    pub async fn record(&self, message: &str, err: &(dyn StdError + Send + Sync + '_)) {
        error!(error = %err, "{}", message);

        let line = format_line(message, err);
        if let Err(fault) = self.append(&line).await {
            crate::metrics::record_persistence_fault();
            error!(
                path = %self.path.display(),
                error = %fault,
                "Failed to write diagnostic log"
            );
        }
    }

    async fn append(&self, line: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::Persistence(e.to_string()))?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StorageError::Persistence(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StorageError::Persistence(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| StorageError::Persistence(e.to_string()))
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

/// `[<timestamp>] <message>: <error>[ <- <source>...]\n`
fn format_line(message: &str, err: &(dyn StdError + '_)) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(" <- ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    // One record per line
    let detail = detail.replace('\n', " ");
    format!(
        "[{}] {}: {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        message,
        detail
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_creates_directory_and_appends() {
        let dir = tempdir().unwrap();
        let sink = DiagnosticSink::in_dir(dir.path());
        assert!(!sink.path().exists());

        sink.record("first failure", &StorageError::Connection("refused".into())).await;
        sink.record("second failure", &StorageError::SchemaMissing("users".into())).await;

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("first failure: connection error: refused"));
        assert!(lines[1].ends_with("second failure: table 'users' does not exist"));
    }

    #[tokio::test]
    async fn test_timestamp_is_rfc3339() {
        let dir = tempdir().unwrap();
        let sink = DiagnosticSink::in_dir(dir.path());
        sink.record("x", &StorageError::Persistence("y".into())).await;

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let stamp = &contents[1..contents.find(']').unwrap()];
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[tokio::test]
    async fn test_source_chain_is_included() {
        let dir = tempdir().unwrap();
        let sink = DiagnosticSink::in_dir(dir.path());
        let io = std::io::Error::new(std::io::ErrorKind::Other, "outer\nmultiline");
        sink.record("io", &io).await;

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("outer multiline"));
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        // A regular file where the log directory should be
        let blocker = dir.path().join("logs");
        std::fs::write(&blocker, "not a directory").unwrap();

        let sink = DiagnosticSink::in_dir(dir.path());
        sink.record("unwritable", &StorageError::Connection("x".into())).await;

        assert!(!sink.path().exists());
    }

    #[tokio::test]
    async fn test_concurrent_records_do_not_interleave() {
        let dir = tempdir().unwrap();
        let sink = std::sync::Arc::new(DiagnosticSink::in_dir(dir.path()));

        let mut handles = vec![];
        for i in 0..20 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                sink.record(&format!("failure {}", i), &StorageError::Connection("down".into()))
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.lines().count(), 20);
        assert!(contents.lines().all(|l| l.ends_with("connection error: down")));
    }
}
