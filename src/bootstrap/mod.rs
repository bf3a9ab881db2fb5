// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Default administrator bootstrap.
//!
//! Guarantees an `admin` account exists with the first-run password, and never fails
//! the host process while doing so. Every step reports an [`OperationOutcome`]; the run
//! as a whole always resolves to a [`BootstrapReport`].
//!
//! ```text
//! Start ─► ConnectivityChecked ─► SchemaChecked ─► AccountQueried ─┬─► AccountCreated ─┐
//!   │              │                    │                │         └─► AccountUpdated ─┤
//!   └──────────────┴────────────────────┴────────────────┴──── degraded ──────────────►├─► Done
//! ```
//!
//! The read chain runs to completion (ORM, then raw SQL) before any write decision, so a
//! failing ORM read can never cause a duplicate insert. Concurrent runs may still race
//! between read and insert; the unique index on `username` settles that, and the loser
//! reports [`BootstrapOutcome::Existing`].
//!
//! # Example
//!
//! ```no_run
//! use admin_bootstrap::{BackendConfig, BootstrapService, ConnectionManager, DiagnosticSink};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BackendConfig::from_env("host.config.json")?;
//! let manager = Arc::new(ConnectionManager::connect_with_fallback(config).await?);
//! let service = BootstrapService::new(manager, Arc::new(DiagnosticSink::in_dir(".")));
//!
//! let report = service.run().await;
//! println!("admin bootstrap: {}", report.outcome.label());
//! # Ok(())
//! # }
//! ```

pub mod outcome;

pub use outcome::{BootstrapOutcome, BootstrapReport, BootstrapState, DegradedReason, OperationOutcome};

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::account::{AdminAccount, AdminDefaults, NewAccount, PasswordUpdate};
use crate::diagnostics::DiagnosticSink;
use crate::password::{BcryptHasher, PasswordHasher};
use crate::resilience::{RetryConfig, RetryExecutor, RetryOutcome};
use crate::schema::{SchemaProbe, USERS_TABLE};
use crate::storage::{ConnectionManager, StorageError};
use crate::strategy::{
    run_with_fallback, AccountStrategy, ChainError, OrmStrategy, RawSqlStrategy, Resolved, STEP_FIND,
    STEP_INSERT, STEP_UPDATE,
};

const STEP_CONNECT: &str = "connectivity";
const STEP_HASH: &str = "hash_password";

/// States visited and soft failures collected during one run.
struct Progress {
    trail: Vec<BootstrapState>,
    soft_failures: Vec<String>,
}

impl Progress {
    fn new() -> Self {
        Self {
            trail: vec![BootstrapState::Start],
            soft_failures: Vec::new(),
        }
    }

    fn enter(&mut self, state: BootstrapState) {
        debug!(?state, "Bootstrap state");
        self.trail.push(state);
    }

    fn soft_failure(&mut self, step: &str, reason: String) {
        warn!(step, %reason, "Bootstrap step soft-failed, continuing");
        crate::metrics::record_soft_failure(step);
        self.soft_failures.push(reason);
    }
}

/// Ensures the default administrator account exists.
///
/// Cheap to clone; clones share the connection manager, strategies and diagnostic sink.
#[derive(Clone)]
pub struct BootstrapService {
    manager: Arc<ConnectionManager>,
    primary: Arc<dyn AccountStrategy>,
    fallback: Arc<dyn AccountStrategy>,
    hasher: Arc<dyn PasswordHasher>,
    sink: Arc<DiagnosticSink>,
    probe: SchemaProbe,
    retry: RetryExecutor,
    defaults: Arc<AdminDefaults>,
}

impl BootstrapService {
    /// ORM strategy first, raw SQL second, bcrypt hashing, 3 × 2 s connectivity retry.
    pub fn new(manager: Arc<ConnectionManager>, sink: Arc<DiagnosticSink>) -> Self {
        Self {
            manager,
            primary: Arc::new(OrmStrategy::users()),
            fallback: Arc::new(RawSqlStrategy::new()),
            hasher: Arc::new(BcryptHasher::default()),
            probe: SchemaProbe::new(sink.clone()),
            sink,
            retry: RetryExecutor::default(),
            defaults: Arc::new(AdminDefaults::default()),
        }
    }

    #[must_use]
    pub fn with_strategies(mut self, primary: Arc<dyn AccountStrategy>, fallback: Arc<dyn AccountStrategy>) -> Self {
        self.primary = primary;
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(config);
        self
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: AdminDefaults) -> Self {
        self.defaults = Arc::new(defaults);
        self
    }

    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    #[must_use]
    pub fn defaults(&self) -> &AdminDefaults {
        &self.defaults
    }

    /// Retry-wrapped health check. Exhaustion is recorded to the diagnostic log.
    pub async fn check_database_connection(&self) -> bool {
        self.check_connectivity().await.is_success()
    }

    /// Run the bootstrap and return the account it left in place, if any.
    pub async fn ensure_default_admin_exists(&self) -> Option<AdminAccount> {
        self.run().await.outcome.account().cloned()
    }

    /// Run the full bootstrap. Never panics, never errors.
    #[tracing::instrument(skip(self), fields(dialect = %self.manager.dialect()))]
    pub async fn run(&self) -> BootstrapReport {
        let mut progress = Progress::new();

        let outcome = match AssertUnwindSafe(self.drive(&mut progress)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.sink
                    .record(
                        "Unexpected fault while ensuring the admin account",
                        &StorageError::Internal(message.clone()),
                    )
                    .await;
                BootstrapOutcome::Degraded {
                    reason: DegradedReason::Internal(message),
                }
            }
        };
        progress.enter(BootstrapState::Done);

        crate::metrics::record_bootstrap_outcome(outcome.label());
        match &outcome {
            BootstrapOutcome::Degraded { reason } => {
                warn!(%reason, "Admin bootstrap finished degraded");
            }
            other => {
                info!(
                    outcome = other.label(),
                    username = %self.defaults.username,
                    soft_failures = progress.soft_failures.len(),
                    "Admin account ensured"
                );
            }
        }

        BootstrapReport {
            outcome,
            trail: progress.trail,
            soft_failures: progress.soft_failures,
        }
    }

    async fn drive(&self, progress: &mut Progress) -> BootstrapOutcome {
        match self.check_connectivity().await {
            OperationOutcome::Success(()) => progress.enter(BootstrapState::ConnectivityChecked),
            OperationOutcome::SoftFailure(reason) | OperationOutcome::HardFailure(reason) => {
                progress.soft_failure(STEP_CONNECT, reason);
                return degraded(DegradedReason::NoConnection);
            }
        }

        match self.check_schema().await {
            OperationOutcome::Success(()) => progress.enter(BootstrapState::SchemaChecked),
            _ => return degraded(DegradedReason::NoUsersTable),
        }

        let password_hash = match self.hash_default_password().await {
            OperationOutcome::Success(hash) => hash,
            OperationOutcome::SoftFailure(reason) | OperationOutcome::HardFailure(reason) => {
                return degraded(DegradedReason::Internal(reason));
            }
        };

        let existing = match self.find_account().await {
            OperationOutcome::Success(found) => found,
            OperationOutcome::SoftFailure(reason) | OperationOutcome::HardFailure(reason) => {
                return degraded(DegradedReason::ReadFailed(reason));
            }
        };
        progress.enter(BootstrapState::AccountQueried);

        match existing {
            None => match self.create_account(password_hash).await {
                OperationOutcome::Success(outcome) => {
                    if matches!(outcome, BootstrapOutcome::Created { .. }) {
                        progress.enter(BootstrapState::AccountCreated);
                    }
                    outcome
                }
                OperationOutcome::SoftFailure(reason) | OperationOutcome::HardFailure(reason) => {
                    degraded(DegradedReason::CreateFailed(reason))
                }
            },
            Some(mut account) => {
                let refreshed = match self.refresh_password(&account, &password_hash).await {
                    OperationOutcome::Success(_) => {
                        account.password_hash = password_hash;
                        true
                    }
                    OperationOutcome::SoftFailure(reason) | OperationOutcome::HardFailure(reason) => {
                        progress.soft_failure(STEP_UPDATE, reason);
                        false
                    }
                };
                progress.enter(BootstrapState::AccountUpdated);
                BootstrapOutcome::Updated { account, refreshed }
            }
        }
    }

    async fn check_connectivity(&self) -> OperationOutcome<()> {
        let manager = &self.manager;
        let outcome = self
            .retry
            .execute("database connectivity", || async move {
                if manager.health_check().await {
                    Ok(())
                } else {
                    Err(StorageError::Connection(format!(
                        "{} backend did not answer the health check",
                        manager.dialect()
                    )))
                }
            })
            .await;

        match outcome {
            RetryOutcome::Success(()) => OperationOutcome::Success(()),
            RetryOutcome::Exhausted { attempts, last_error } => {
                self.sink
                    .record(
                        &format!("Database unreachable after {} attempts", attempts),
                        &last_error,
                    )
                    .await;
                OperationOutcome::SoftFailure(format!(
                    "database unreachable after {} attempts: {}",
                    attempts, last_error
                ))
            }
        }
    }

    async fn check_schema(&self) -> OperationOutcome<()> {
        if self.probe.table_exists(&self.manager, USERS_TABLE).await {
            return OperationOutcome::Success(());
        }
        let err = StorageError::SchemaMissing(USERS_TABLE.to_string());
        self.sink
            .record("Skipping admin bootstrap, schema is not installed", &err)
            .await;
        OperationOutcome::HardFailure(err.to_string())
    }

    async fn hash_default_password(&self) -> OperationOutcome<String> {
        let hasher = self.hasher.clone();
        let plaintext = self.defaults.password.clone();

        let result = match tokio::task::spawn_blocking(move || hasher.hash(&plaintext)).await {
            Ok(result) => result,
            Err(join) => Err(StorageError::Internal(format!("hashing task failed: {}", join))),
        };

        match result {
            Ok(hash) => OperationOutcome::Success(hash),
            Err(e) => {
                self.sink.record("Failed to hash the default admin password", &e).await;
                crate::metrics::record_hard_failure(STEP_HASH);
                OperationOutcome::HardFailure(e.to_string())
            }
        }
    }

    async fn find_account(&self) -> OperationOutcome<Option<AdminAccount>> {
        let username = self.defaults.username.as_str();
        let result: Result<Resolved<Option<AdminAccount>>, ChainError> = run_with_fallback(
            STEP_FIND,
            self.primary.as_ref(),
            self.fallback.as_ref(),
            &self.manager,
            username,
        )
        .await;

        match result {
            Ok(resolved) => OperationOutcome::Success(resolved.value),
            Err(e) => {
                self.sink.record("Failed to look up the admin account", &e).await;
                OperationOutcome::HardFailure(e.to_string())
            }
        }
    }

    /// Insert the default account. A lost insert race resolves to `Existing`.
    async fn create_account(&self, password_hash: String) -> OperationOutcome<BootstrapOutcome> {
        let new: NewAccount = self.defaults.new_account(password_hash);
        let result: Result<Resolved<AdminAccount>, ChainError> = run_with_fallback(
            STEP_INSERT,
            self.primary.as_ref(),
            self.fallback.as_ref(),
            &self.manager,
            &new,
        )
        .await;

        match result {
            Ok(resolved) => {
                info!(username = %resolved.value.username, strategy = resolved.strategy, "Default admin account created");
                OperationOutcome::Success(BootstrapOutcome::Created {
                    account: resolved.value,
                })
            }
            Err(e) if e.is_constraint_violation() => {
                info!(username = %new.username, "Admin account was created concurrently");
                let account = self.find_account().await.success().flatten();
                OperationOutcome::Success(BootstrapOutcome::Existing { account })
            }
            Err(e) => {
                self.sink.record("Failed to create the admin account", &e).await;
                OperationOutcome::HardFailure(e.to_string())
            }
        }
    }

    /// Replace the stored hash. Anything short of one updated row is a soft failure.
    async fn refresh_password(&self, account: &AdminAccount, password_hash: &str) -> OperationOutcome<u64> {
        let update = PasswordUpdate {
            username: account.username.clone(),
            password_hash: password_hash.to_string(),
        };
        let result: Result<Resolved<u64>, ChainError> = run_with_fallback(
            STEP_UPDATE,
            self.primary.as_ref(),
            self.fallback.as_ref(),
            &self.manager,
            &update,
        )
        .await;

        match result {
            Ok(resolved) if resolved.value > 0 => OperationOutcome::Success(resolved.value),
            Ok(resolved) => OperationOutcome::SoftFailure(format!(
                "{} strategy updated no rows for '{}'",
                resolved.strategy, account.username
            )),
            Err(e) => {
                self.sink.record("Failed to refresh the admin password", &e).await;
                OperationOutcome::SoftFailure(e.to_string())
            }
        }
    }
}

fn degraded(reason: DegradedReason) -> BootstrapOutcome {
    BootstrapOutcome::Degraded { reason }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
