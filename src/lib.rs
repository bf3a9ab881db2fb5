//! # Admin Bootstrap
//!
//! A resilient data-access layer that makes sure a default administrator account exists,
//! whatever state the database is in.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BootstrapService                       │
//! │  • Connectivity gate (RetryExecutor, 3 × 2 s)              │
//! │  • Schema gate (SchemaProbe, never creates tables)         │
//! │  • Read, then create or refresh the admin account          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (every read/write step)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Strategy fallback chain                  │
//! │  • OrmStrategy: schema-typed, preferred                    │
//! │  • RawSqlStrategy: literal per-dialect SQL                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ConnectionManager                       │
//! │  • MySQL or Postgres through the sqlx Any driver           │
//! │  • In-memory tables when no SQL backend is reachable       │
//! └─────────────────────────────────────────────────────────────┘
//!
//!        DiagnosticSink ◄── every failure (logs/db-errors.log)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use admin_bootstrap::{BackendConfig, BootstrapService, ConnectionManager, DiagnosticSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = BackendConfig::from_env("host.config.json").expect("invalid database config");
//!     let manager = ConnectionManager::connect_with_fallback(config)
//!         .await
//!         .expect("failed to build connection manager");
//!
//!     let service = BootstrapService::new(Arc::new(manager), Arc::new(DiagnosticSink::in_dir(".")));
//!
//!     // Never panics or errors; the worst case is a degraded report
//!     let report = service.run().await;
//!     println!("admin bootstrap: {}", report.outcome.label());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Backend configuration from env vars and the host config file
//! - [`storage`]: Connection manager, in-memory backend, error taxonomy
//! - [`schema`]: `users` table description and the table-existence probe
//! - [`strategy`]: ORM and raw-SQL strategies plus the fallback runner
//! - [`bootstrap`]: The admin bootstrap state machine
//! - [`resilience`]: Fixed-delay retry
//! - [`diagnostics`]: Append-only failure log
//! - [`metrics`]: `metrics` crate instrumentation

pub mod account;
pub mod bootstrap;
pub mod config;
pub mod diagnostics;
pub mod metrics;
pub mod password;
pub mod resilience;
pub mod schema;
pub mod storage;
pub mod strategy;

pub use account::{AdminAccount, AdminDefaults, NewAccount, PasswordUpdate, Role};
pub use bootstrap::{
    BootstrapOutcome, BootstrapReport, BootstrapService, BootstrapState, DegradedReason, OperationOutcome,
};
pub use config::{BackendConfig, ConfigError, Dialect, HostConfig};
pub use diagnostics::DiagnosticSink;
pub use password::{BcryptHasher, PasswordHasher};
pub use resilience::retry::{RetryConfig, RetryExecutor, RetryOutcome};
pub use schema::{SchemaProbe, TableSchema};
pub use storage::{ConnectionManager, MemoryDatabase, ScopedConnection, StorageError};
pub use strategy::{
    run_with_fallback, AccountStrategy, ChainError, OrmStrategy, QueryStrategy, RawSqlStrategy, Resolved,
    StrategyName,
};
