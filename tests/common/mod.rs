//! Shared fixtures for the integration test binaries.
//!
//! SQLite stands in for MySQL: it accepts backtick quoting, `?` placeholders,
//! `CAST(.. AS CHAR)` and `CURRENT_TIMESTAMP`, so both strategies run their MySQL
//! statements unchanged. It does not understand `SHOW TABLES`, so the schema probe
//! falls back to "assume the table exists" there.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

use admin_bootstrap::{
    AccountStrategy, AdminAccount, BackendConfig, BcryptHasher, BootstrapService, ConnectionManager, Dialect,
    DiagnosticSink, NewAccount, PasswordUpdate, QueryStrategy, RawSqlStrategy, RetryConfig, StorageError,
    StrategyName,
};

pub const SQLITE_USERS_DDL: &str = "CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username VARCHAR(50) NOT NULL UNIQUE,
    password VARCHAR(255) NOT NULL,
    fullName VARCHAR(100),
    email VARCHAR(100),
    role VARCHAR(20) DEFAULT 'user',
    active BOOLEAN DEFAULT 1,
    createdAt TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updatedAt TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

/// bcrypt at minimum cost
pub fn test_hasher() -> BcryptHasher {
    BcryptHasher::new(4)
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        delay: Duration::from_millis(5),
    }
}

/// MySQL-tagged manager over a fresh SQLite file, with the `users` table installed.
pub async fn sqlite_manager(dir: &Path) -> Arc<ConnectionManager> {
    let config = BackendConfig {
        url: Some(format!("sqlite://{}?mode=rwc", dir.join("users.sqlite").display())),
        memory_fallback: false,
        ..BackendConfig::for_dialect(Dialect::Mysql)
    };
    let manager = ConnectionManager::connect(config).expect("sqlite pool");
    execute(&manager, SQLITE_USERS_DDL).await;
    Arc::new(manager)
}

pub async fn execute(manager: &ConnectionManager, sql: &str) {
    let mut scoped = manager.acquire().await.expect("acquire");
    sqlx::query(sql)
        .execute(scoped.require_sql().expect("sql connection"))
        .await
        .expect("statement");
}

/// Service wired for tests: cheap hashing, fast retries, log under `dir`.
pub fn service(manager: Arc<ConnectionManager>, dir: &Path) -> BootstrapService {
    BootstrapService::new(manager, Arc::new(DiagnosticSink::in_dir(dir)))
        .with_hasher(Arc::new(test_hasher()))
        .with_retry(fast_retry())
}

pub fn diagnostic_log(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("logs").join("db-errors.log")).unwrap_or_default()
}

pub async fn find_admin(manager: &ConnectionManager) -> Option<AdminAccount> {
    QueryStrategy::<str, Option<AdminAccount>>::run(&RawSqlStrategy, manager, "admin")
        .await
        .expect("raw read")
}

pub async fn count_users(manager: &ConnectionManager, username: &str) -> usize {
    let mut scoped = manager.acquire().await.expect("acquire");
    let rows = sqlx::query("SELECT username FROM users WHERE username = ?")
        .bind(username.to_string())
        .fetch_all(scoped.require_sql().expect("sql connection"))
        .await
        .expect("count");
    rows.len()
}

// =============================================================================
// Scripted Strategy Wrapper - Precise Error Injection
// =============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub find: usize,
    pub insert: usize,
    pub update: usize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.find + self.insert + self.update
    }
}

/// Wraps a real strategy, counting calls and failing selected operations.
pub struct ScriptedStrategy {
    name: &'static str,
    inner: Arc<dyn AccountStrategy>,
    fail_find: bool,
    fail_insert: bool,
    fail_update: bool,
    /// Report zero updated rows without touching the database
    skip_update: bool,
    /// The first find waits here after reading, so concurrent runs all read before any writes
    find_barrier: Option<Arc<Barrier>>,
    finds: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

impl ScriptedStrategy {
    pub fn new(name: &'static str, inner: Arc<dyn AccountStrategy>) -> Self {
        Self {
            name,
            inner,
            fail_find: false,
            fail_insert: false,
            fail_update: false,
            skip_update: false,
            find_barrier: None,
            finds: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    pub fn failing_find(mut self) -> Self {
        self.fail_find = true;
        self
    }

    pub fn failing_insert(mut self) -> Self {
        self.fail_insert = true;
        self
    }

    pub fn failing_update(mut self) -> Self {
        self.fail_update = true;
        self
    }

    pub fn failing_all(self) -> Self {
        self.failing_find().failing_insert().failing_update()
    }

    pub fn skipping_update(mut self) -> Self {
        self.skip_update = true;
        self
    }

    pub fn with_find_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.find_barrier = Some(barrier);
        self
    }

    pub fn calls(&self) -> Calls {
        Calls {
            find: self.finds.load(Ordering::SeqCst),
            insert: self.inserts.load(Ordering::SeqCst),
            update: self.updates.load(Ordering::SeqCst),
        }
    }

    fn injected(&self, op: &str) -> StorageError {
        StorageError::strategy(self.name, format!("injected {} failure", op))
    }
}

impl StrategyName for ScriptedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }
}

#[async_trait]
impl QueryStrategy<str, Option<AdminAccount>> for ScriptedStrategy {
    async fn run(&self, conn: &ConnectionManager, username: &str) -> Result<Option<AdminAccount>, StorageError> {
        let previous = self.finds.fetch_add(1, Ordering::SeqCst);
        if self.fail_find {
            return Err(self.injected("find"));
        }
        let found = QueryStrategy::<str, Option<AdminAccount>>::run(self.inner.as_ref(), conn, username).await;
        if let (Some(barrier), 0) = (&self.find_barrier, previous) {
            barrier.wait().await;
        }
        found
    }
}

#[async_trait]
impl QueryStrategy<NewAccount, AdminAccount> for ScriptedStrategy {
    async fn run(&self, conn: &ConnectionManager, account: &NewAccount) -> Result<AdminAccount, StorageError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_insert {
            return Err(self.injected("insert"));
        }
        QueryStrategy::<NewAccount, AdminAccount>::run(self.inner.as_ref(), conn, account).await
    }
}

#[async_trait]
impl QueryStrategy<PasswordUpdate, u64> for ScriptedStrategy {
    async fn run(&self, conn: &ConnectionManager, update: &PasswordUpdate) -> Result<u64, StorageError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_update {
            return Err(self.injected("update"));
        }
        if self.skip_update {
            return Ok(0);
        }
        QueryStrategy::<PasswordUpdate, u64>::run(self.inner.as_ref(), conn, update).await
    }
}
