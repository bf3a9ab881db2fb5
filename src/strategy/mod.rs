// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Interchangeable query strategies and the primary → fallback runner.
//!
//! Every data step of the bootstrap routine runs as a two-link chain: the schema-typed
//! [`OrmStrategy`] first, the literal [`RawSqlStrategy`] second. A failed primary is
//! substituted, never retried.
//!
//! ```text
//! run_with_fallback(step, primary, fallback, conn, args)
//!      │
//!      ├─ primary.run(conn, args) ── Ok ──────────────► Resolved { fell_back: false }
//!      │        │
//!      │       Err ─► warn! + metric
//!      │        ▼
//!      └─ fallback.run(conn, args) ─ Ok ──────────────► Resolved { fell_back: true }
//!               │
//!              Err ──────────────────────────────────► ChainError { primary, fallback }
//! ```

pub mod orm;
pub mod raw;

pub use orm::OrmStrategy;
pub use raw::RawSqlStrategy;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::account::{AdminAccount, NewAccount, PasswordUpdate};
use crate::storage::{ConnectionManager, StorageError};

/// Step labels used in logs and metrics.
pub const STEP_FIND: &str = "find_by_username";
pub const STEP_INSERT: &str = "insert_account";
pub const STEP_UPDATE: &str = "update_password";

pub trait StrategyName {
    /// Short label used in logs, metrics and errors.
    fn name(&self) -> &'static str;
}

/// One way of performing one data operation.
#[async_trait]
pub trait QueryStrategy<A: ?Sized + Sync, O: Send>: StrategyName + Send + Sync {
    async fn run(&self, conn: &ConnectionManager, args: &A) -> Result<O, StorageError>;
}

/// A strategy that can perform every account operation the bootstrap routine needs:
/// find by username, insert, and password update.
pub trait AccountStrategy:
    QueryStrategy<str, Option<AdminAccount>>
    + QueryStrategy<NewAccount, AdminAccount>
    + QueryStrategy<PasswordUpdate, u64>
{
}

impl<T> AccountStrategy for T where
    T: QueryStrategy<str, Option<AdminAccount>>
        + QueryStrategy<NewAccount, AdminAccount>
        + QueryStrategy<PasswordUpdate, u64>
{
}

/// Value produced by a chain, with the link that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<O> {
    pub value: O,
    pub strategy: &'static str,
    pub fell_back: bool,
}

/// Both links of a chain failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{step}: {primary_strategy} failed ({primary}); {fallback_strategy} failed ({fallback})")]
pub struct ChainError {
    pub step: &'static str,
    pub primary_strategy: &'static str,
    pub primary: StorageError,
    pub fallback_strategy: &'static str,
    #[source]
    pub fallback: StorageError,
}

impl ChainError {
    /// Whether either attempt lost a unique-key race.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        self.primary.is_constraint_violation() || self.fallback.is_constraint_violation()
    }
}

/// Run `primary`, and on any error run `fallback` with the same arguments.
pub async fn run_with_fallback<P, F, A, O>(
    step: &'static str,
    primary: &P,
    fallback: &F,
    conn: &ConnectionManager,
    args: &A,
) -> Result<Resolved<O>, ChainError>
where
    P: QueryStrategy<A, O> + ?Sized,
    F: QueryStrategy<A, O> + ?Sized,
    A: ?Sized + Sync,
    O: Send,
{
    let primary_err = match primary.run(conn, args).await {
        Ok(value) => {
            debug!(step, strategy = primary.name(), "Query step succeeded");
            return Ok(Resolved {
                value,
                strategy: primary.name(),
                fell_back: false,
            });
        }
        Err(e) => e,
    };

    warn!(
        step,
        primary = primary.name(),
        fallback = fallback.name(),
        error = %primary_err,
        "Primary strategy failed, switching to fallback"
    );
    crate::metrics::record_strategy_fallback(step, primary.name());

    match fallback.run(conn, args).await {
        Ok(value) => Ok(Resolved {
            value,
            strategy: fallback.name(),
            fell_back: true,
        }),
        Err(fallback_err) => {
            crate::metrics::record_chain_failure(step);
            Err(ChainError {
                step,
                primary_strategy: primary.name(),
                primary: primary_err,
                fallback_strategy: fallback.name(),
                fallback: fallback_err,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stub {
        name: &'static str,
        result: Result<u64, StorageError>,
        calls: AtomicUsize,
    }

    impl Stub {
        fn ok(name: &'static str, value: u64) -> Self {
            Self { name, result: Ok(value), calls: AtomicUsize::new(0) }
        }

        fn failing(name: &'static str, err: StorageError) -> Self {
            Self { name, result: Err(err), calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StrategyName for Stub {
        fn name(&self) -> &'static str {
            self.name
        }
    }

    #[async_trait]
    impl QueryStrategy<str, u64> for Stub {
        async fn run(&self, _conn: &ConnectionManager, _args: &str) -> Result<u64, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn manager() -> ConnectionManager {
        ConnectionManager::connect(crate::config::BackendConfig::memory()).unwrap()
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let primary = Stub::ok("orm", 1);
        let fallback = Stub::ok("raw", 2);

        let resolved = run_with_fallback::<_, _, str, u64>("step", &primary, &fallback, &manager(), "admin")
            .await
            .unwrap();

        assert_eq!(resolved, Resolved { value: 1, strategy: "orm", fell_back: false });
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_uses_fallback() {
        let primary = Stub::failing("orm", StorageError::strategy("orm", "no binding"));
        let fallback = Stub::ok("raw", 2);

        let resolved = run_with_fallback::<_, _, str, u64>("step", &primary, &fallback, &manager(), "admin")
            .await
            .unwrap();

        assert_eq!(resolved.value, 2);
        assert_eq!(resolved.strategy, "raw");
        assert!(resolved.fell_back);
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_both_failing_carries_both_errors() {
        let primary = Stub::failing("orm", StorageError::strategy("orm", "bad shape"));
        let fallback = Stub::failing("raw", StorageError::Connection("reset".into()));

        let err = run_with_fallback::<_, _, str, u64>("find", &primary, &fallback, &manager(), "admin")
            .await
            .unwrap_err();

        assert_eq!(err.step, "find");
        assert_eq!(err.primary_strategy, "orm");
        assert_eq!(err.fallback_strategy, "raw");
        assert!(err.fallback.is_connection());
        assert!(!err.is_constraint_violation());
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_constraint_violation_is_visible_on_chain_error() {
        let primary = Stub::failing("orm", StorageError::strategy("orm", "bad shape"));
        let fallback = Stub::failing("raw", StorageError::ConstraintViolation("dup".into()));

        let err = run_with_fallback::<_, _, str, u64>("insert", &primary, &fallback, &manager(), "admin")
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }
}
