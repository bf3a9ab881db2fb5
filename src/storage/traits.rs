// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

/// Failure taxonomy for everything that talks to the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend unreachable, pool closed, or credentials rejected.
    #[error("connection error: {0}")]
    Connection(String),
    /// An expected table is absent.
    #[error("table '{0}' does not exist")]
    SchemaMissing(String),
    /// ORM binding/query failure or raw-SQL execution failure.
    #[error("{strategy} strategy failed: {reason}")]
    Strategy {
        strategy: &'static str,
        reason: String,
    },
    /// Unique-key conflict on insert.
    #[error("unique constraint violated: {0}")]
    ConstraintViolation(String),
    /// The diagnostic log itself could not be written.
    #[error("diagnostic log write failed: {0}")]
    Persistence(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    /// Unexpected fault (a panicked step, a failed blocking task).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn strategy(strategy: &'static str, reason: impl Into<String>) -> Self {
        Self::Strategy {
            strategy,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }

    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Classify a sqlx error raised while `strategy` was executing.
    ///
    /// Unique violations are surfaced as [`StorageError::ConstraintViolation`] so callers can
    /// treat a lost insert race as "already exists".
    pub fn from_sqlx(strategy: &'static str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Self::ConstraintViolation(db.message().to_string())
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Connection(err.to_string()),
            other => Self::strategy(strategy, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_connection_errors() {
        let err = StorageError::from_sqlx("raw", sqlx::Error::PoolClosed);
        assert!(err.is_connection());

        let err = StorageError::from_sqlx("raw", sqlx::Error::PoolTimedOut);
        assert!(err.is_connection());
    }

    #[test]
    fn test_other_errors_are_strategy_errors() {
        let err = StorageError::from_sqlx("orm", sqlx::Error::RowNotFound);
        assert_eq!(
            err,
            StorageError::Strategy {
                strategy: "orm",
                reason: sqlx::Error::RowNotFound.to_string(),
            }
        );
        assert!(!err.is_constraint_violation());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            StorageError::SchemaMissing("users".into()).to_string(),
            "table 'users' does not exist"
        );
        assert_eq!(
            StorageError::strategy("raw", "boom").to_string(),
            "raw strategy failed: boom"
        );
    }
}
