// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connection management for exactly one active backend.
//!
//! The dialect is fixed when the manager is built from a [`BackendConfig`]; there is
//! no mid-run switching. SQL backends go through the sqlx `Any` driver with a lazily
//! connecting pool, so building a manager never touches the network and reachability
//! is established by [`ConnectionManager::health_check`].
//!
//! ```text
//! connect(config) ──► ConnectionManager ──► health_check() ─► bool (never errors)
//!                            │
//!                            └──► acquire() ─► ScopedConnection (released on drop)
//! ```

use sqlx::any::AnyPoolOptions;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, AnyPool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::memory::MemoryDatabase;
use super::traits::StorageError;
use crate::config::{BackendConfig, Dialect};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

enum Pool {
    Sql(AnyPool),
    Memory(Arc<MemoryDatabase>),
}

/// The live backend binding.
///
/// The pooled resource is owned exclusively by the handle; `available` only
/// changes through health checks.
pub struct ConnectionHandle {
    dialect: Dialect,
    pool: Pool,
    available: AtomicBool,
    closed: AtomicBool,
}

impl ConnectionHandle {
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Result of the most recent health check (`false` before the first one).
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A connection checked out for the duration of one operation.
///
/// The SQL variant returns its slot to the pool when dropped, on every exit path.
pub enum ScopedConnection {
    Sql(PoolConnection<Any>),
    Memory(Arc<MemoryDatabase>),
}

impl ScopedConnection {
    /// The SQL connection, or `None` for the in-memory backend.
    pub fn as_sql(&mut self) -> Option<&mut AnyConnection> {
        match self {
            Self::Sql(conn) => Some(&mut **conn),
            Self::Memory(_) => None,
        }
    }

    /// The SQL connection; an internal error on the in-memory backend.
    pub fn require_sql(&mut self) -> Result<&mut AnyConnection, StorageError> {
        self.as_sql()
            .ok_or_else(|| StorageError::Internal("SQL dialect without a SQL pool".to_string()))
    }
}

pub struct ConnectionManager {
    config: Arc<BackendConfig>,
    handle: ConnectionHandle,
}

impl ConnectionManager {
    /// Build the manager for `config.dialect`.
    ///
    /// Fails only when the connection string can't be turned into a pool.
    pub fn connect(config: BackendConfig) -> Result<Self, StorageError> {
        let pool = match config.dialect {
            Dialect::Memory => Pool::Memory(Arc::new(MemoryDatabase::with_users_table())),
            Dialect::Mysql | Dialect::Postgres => {
                install_drivers();
                let pool = AnyPoolOptions::new()
                    .max_connections(config.connection_limit)
                    .acquire_timeout(config.acquire_timeout)
                    .idle_timeout(Duration::from_secs(300))
                    .connect_lazy(&config.connection_url())
                    .map_err(|e| StorageError::Connection(e.to_string()))?;
                Pool::Sql(pool)
            }
        };

        info!(
            dialect = %config.dialect,
            host = %config.host,
            database = %config.database,
            connection_limit = config.connection_limit,
            "Connection manager created"
        );

        Ok(Self::from_parts(config, pool))
    }

    /// Wrap an existing in-memory database (fixtures, or sharing one store between managers).
    #[must_use]
    pub fn from_memory(db: Arc<MemoryDatabase>) -> Self {
        Self::from_parts(BackendConfig::memory(), Pool::Memory(db))
    }

    /// Connect and verify reachability once; when the SQL backend is down and
    /// `memory_fallback` is set, continue in degraded mode on the in-memory backend.
    pub async fn connect_with_fallback(config: BackendConfig) -> Result<Self, StorageError> {
        let fallback_allowed = config.memory_fallback && config.dialect.is_sql();
        let requested = config.dialect;

        match Self::connect(config.clone()) {
            Ok(manager) => {
                if manager.health_check().await || !fallback_allowed {
                    return Ok(manager);
                }
                warn!(dialect = %requested, "SQL backend unreachable, falling back to in-memory storage");
                manager.close().await;
            }
            Err(e) if fallback_allowed => {
                warn!(dialect = %requested, error = %e, "SQL backend unusable, falling back to in-memory storage");
            }
            Err(e) => return Err(e),
        }

        crate::metrics::record_memory_fallback(&requested.to_string());
        let degraded = BackendConfig {
            dialect: Dialect::Memory,
            url: None,
            ..config
        };
        let manager = Self::from_parts(degraded, Pool::Memory(Arc::new(MemoryDatabase::with_users_table())));
        manager.health_check().await;
        Ok(manager)
    }

    fn from_parts(config: BackendConfig, pool: Pool) -> Self {
        Self {
            handle: ConnectionHandle {
                dialect: config.dialect,
                pool,
                available: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            },
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.handle.dialect
    }

    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.handle.is_available()
    }

    /// The in-memory store, when that is the active backend.
    #[must_use]
    pub fn memory_db(&self) -> Option<Arc<MemoryDatabase>> {
        match &self.handle.pool {
            Pool::Memory(db) => Some(db.clone()),
            Pool::Sql(_) => None,
        }
    }

    /// Ping the backend. Never errors: any fault reads as `false`.
    pub async fn health_check(&self) -> bool {
        let healthy = if self.handle.is_closed() {
            debug!("Health check on closed connection manager");
            false
        } else {
            match &self.handle.pool {
                Pool::Memory(_) => true,
                Pool::Sql(pool) => {
                    let ping = sqlx::query("SELECT 1").execute(pool);
                    match tokio::time::timeout(self.config.health_check_timeout, ping).await {
                        Ok(Ok(_)) => true,
                        Ok(Err(e)) => {
                            debug!(error = %e, "Health check query failed");
                            false
                        }
                        Err(_) => {
                            debug!(timeout = ?self.config.health_check_timeout, "Health check timed out");
                            false
                        }
                    }
                }
            }
        };

        self.handle.available.store(healthy, Ordering::Release);
        crate::metrics::record_health_check(&self.handle.dialect.to_string(), healthy);
        healthy
    }

    /// Check out a connection. The slot is released when the returned value drops.
    pub async fn acquire(&self) -> Result<ScopedConnection, StorageError> {
        if self.handle.is_closed() {
            return Err(StorageError::Connection("connection manager is closed".to_string()));
        }
        match &self.handle.pool {
            Pool::Sql(pool) => pool
                .acquire()
                .await
                .map(ScopedConnection::Sql)
                .map_err(|e| StorageError::Connection(e.to_string())),
            Pool::Memory(db) => Ok(ScopedConnection::Memory(db.clone())),
        }
    }

    /// Close the pool. Safe to call more than once.
    pub async fn close(&self) {
        if self.handle.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.handle.available.store(false, Ordering::Release);
        if let Pool::Sql(pool) = &self.handle.pool {
            pool.close().await;
        }
        info!(dialect = %self.handle.dialect, "Connection manager closed");
    }

    /// Idle + in-use pool connections (always 0 for the in-memory backend).
    #[must_use]
    pub fn pool_size(&self) -> u32 {
        match &self.handle.pool {
            Pool::Sql(pool) => pool.size(),
            Pool::Memory(_) => 0,
        }
    }

    /// Idle pool connections (always 0 for the in-memory backend).
    #[must_use]
    pub fn idle_connections(&self) -> usize {
        match &self.handle.pool {
            Pool::Sql(pool) => pool.num_idle(),
            Pool::Memory(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::USERS_TABLE;
    use tempfile::tempdir;

    fn sqlite_config(path: &std::path::Path) -> BackendConfig {
        BackendConfig {
            url: Some(format!("sqlite://{}?mode=rwc", path.display())),
            connection_limit: 2,
            acquire_timeout: Duration::from_secs(2),
            ..BackendConfig::for_dialect(Dialect::Mysql)
        }
    }

    #[tokio::test]
    async fn test_memory_manager_is_healthy() {
        let manager = ConnectionManager::connect(BackendConfig::memory()).unwrap();
        assert_eq!(manager.dialect(), Dialect::Memory);
        assert!(!manager.is_available());

        assert!(manager.health_check().await);
        assert!(manager.is_available());
        assert!(manager.memory_db().unwrap().has_table(USERS_TABLE));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let manager = ConnectionManager::connect(BackendConfig::memory()).unwrap();
        assert!(manager.health_check().await);

        manager.close().await;
        manager.close().await;

        assert!(manager.handle().is_closed());
        assert!(!manager.health_check().await);
        assert!(!manager.is_available());
        assert!(matches!(manager.acquire().await, Err(StorageError::Connection(_))));
    }

    #[tokio::test]
    async fn test_sql_manager_health_and_release() {
        let dir = tempdir().unwrap();
        let manager = ConnectionManager::connect(sqlite_config(&dir.path().join("db.sqlite"))).unwrap();

        assert!(manager.health_check().await);

        {
            let mut conn = manager.acquire().await.unwrap();
            let sql = conn.as_sql().unwrap();
            sqlx::query("SELECT 1").execute(sql).await.unwrap();
        }
        // Slot came back to the pool
        assert!(manager.idle_connections() >= 1);

        manager.close().await;
        assert!(!manager.health_check().await);
    }

    #[tokio::test]
    async fn test_failed_operation_does_not_leak_slot() {
        let dir = tempdir().unwrap();
        let mut config = sqlite_config(&dir.path().join("db.sqlite"));
        config.connection_limit = 1;
        let manager = ConnectionManager::connect(config).unwrap();

        for _ in 0..3 {
            let mut conn = manager.acquire().await.unwrap();
            let sql = conn.as_sql().unwrap();
            assert!(sqlx::query("SELECT * FROM missing_table").execute(sql).await.is_err());
        }
        // With a single slot, a leak would make this time out
        assert!(manager.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unhealthy() {
        let config = BackendConfig {
            port: 1,
            host: "127.0.0.1".into(),
            acquire_timeout: Duration::from_millis(500),
            health_check_timeout: Duration::from_millis(500),
            ..BackendConfig::for_dialect(Dialect::Mysql)
        };
        let manager = ConnectionManager::connect(config).unwrap();
        assert!(!manager.health_check().await);
        assert!(!manager.is_available());
    }

    #[tokio::test]
    async fn test_fallback_to_memory_when_unreachable() {
        let config = BackendConfig {
            port: 1,
            host: "127.0.0.1".into(),
            acquire_timeout: Duration::from_millis(500),
            health_check_timeout: Duration::from_millis(500),
            ..BackendConfig::for_dialect(Dialect::Postgres)
        };
        let manager = ConnectionManager::connect_with_fallback(config).await.unwrap();
        assert_eq!(manager.dialect(), Dialect::Memory);
        assert!(manager.is_available());
    }

    #[tokio::test]
    async fn test_no_fallback_keeps_sql_dialect() {
        let config = BackendConfig {
            port: 1,
            host: "127.0.0.1".into(),
            acquire_timeout: Duration::from_millis(500),
            health_check_timeout: Duration::from_millis(500),
            memory_fallback: false,
            ..BackendConfig::for_dialect(Dialect::Mysql)
        };
        let manager = ConnectionManager::connect_with_fallback(config).await.unwrap();
        assert_eq!(manager.dialect(), Dialect::Mysql);
        assert!(!manager.is_available());
    }

    #[tokio::test]
    async fn test_malformed_url_is_connection_error() {
        let config = BackendConfig {
            url: Some("mysql://[not a url".into()),
            memory_fallback: false,
            ..BackendConfig::for_dialect(Dialect::Mysql)
        };
        assert!(matches!(
            ConnectionManager::connect(config),
            Err(StorageError::Connection(_))
        ));
    }
}
