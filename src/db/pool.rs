//! Connection pool management with automatic failover.
//!
//! `ConnectionPool` owns one lazily-created engine per backend id. Engines
//! are dialect-specific sqlx pools (`MySqlPool`, `SqlitePool`) so each keeps
//! full type support.
//!
//! # Concurrency
//!
//! - **`OnceCell` per backend**: single-flight engine construction; backends
//!   never wait on each other
//! - **`tokio::sync::Mutex` per health record**: held across the probe so
//!   concurrent due checks collapse into one round trip
//! - **Slot map fixed at construction**: lookups take no lock; `reset` swaps
//!   the cell inside a slot rather than the slot itself

use crate::error::{DbError, DbResult};
use crate::models::{
    BackendId, BackendSelector, ConnectionConfig, Dialect, HealthRecord, PoolIntrospection,
};
use chrono::Utc;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, Connection, MySqlPool, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Dialect-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        impl_db_dispatch!(self, {
            MySql(p) => p.close().await,
            SQLite(p) => p.close().await,
        })
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            DbPool::MySql(_) => Dialect::Server,
            DbPool::SQLite(_) => Dialect::Embedded,
        }
    }

    /// Number of open connections, idle or in use.
    pub fn size(&self) -> u32 {
        impl_db_dispatch!(self, {
            MySql(p) => p.size(),
            SQLite(p) => p.size(),
        })
    }

    pub fn num_idle(&self) -> usize {
        impl_db_dispatch!(self, {
            MySql(p) => p.num_idle(),
            SQLite(p) => p.num_idle(),
        })
    }

    /// Trivial round trip through a pooled connection.
    pub async fn ping(&self) -> DbResult<()> {
        impl_db_dispatch!(self, {
            MySql(p) => sqlx::query("SELECT 1").execute(p).await.map(|_| ())?,
            SQLite(p) => sqlx::query("SELECT 1").execute(p).await.map(|_| ())?,
        });
        Ok(())
    }
}

/// A live engine handed out by `ConnectionPool::get_engine`.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    backend: BackendId,
    pool: DbPool,
    query_timeout: Duration,
}

impl EngineHandle {
    pub fn backend(&self) -> BackendId {
        self.backend
    }

    pub fn dialect(&self) -> Dialect {
        self.pool.dialect()
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }
}

#[derive(Debug)]
struct HealthState {
    record: HealthRecord,
    /// Monotonic time of the last round trip; drives rate limiting.
    checked_at: Option<Instant>,
}

/// Everything the pool keeps for one backend.
struct BackendSlot {
    config: ConnectionConfig,
    engine: RwLock<Arc<OnceCell<DbPool>>>,
    health: Mutex<HealthState>,
    constructions: AtomicUsize,
}

impl BackendSlot {
    fn new(config: ConnectionConfig) -> Self {
        Self {
            health: Mutex::new(HealthState {
                record: HealthRecord::unchecked(config.backend_id),
                checked_at: None,
            }),
            config,
            engine: RwLock::new(Arc::new(OnceCell::new())),
            constructions: AtomicUsize::new(0),
        }
    }

    fn id(&self) -> BackendId {
        self.config.backend_id
    }

    /// Get the engine, constructing it on first use.
    async fn engine(&self) -> DbResult<DbPool> {
        let cell = Arc::clone(&*self.engine.read().await);
        let pool = cell
            .get_or_try_init(|| async {
                info!(
                    backend = %self.id(),
                    target = %self.config.masked_connection_string(),
                    "Creating database engine"
                );
                let pool = create_pool(&self.config).await?;
                self.constructions.fetch_add(1, Ordering::AcqRel);
                Ok::<_, DbError>(pool)
            })
            .await?;
        Ok(pool.clone())
    }

    /// Engine if already constructed. Never constructs.
    async fn constructed(&self) -> Option<DbPool> {
        self.engine.read().await.get().cloned()
    }

    /// Swap in an empty cell and return the previous engine.
    async fn take_engine(&self) -> Option<DbPool> {
        let mut engine = self.engine.write().await;
        let old = std::mem::replace(&mut *engine, Arc::new(OnceCell::new()));
        old.get().cloned()
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    checked_at: Option<Instant>,
    reachable: bool,
}

/// Owns the engines for every configured backend.
pub struct ConnectionPool {
    slots: HashMap<BackendId, Arc<BackendSlot>>,
    health_check_interval: Duration,
    probe_timeout: Duration,
    /// Cached outcome of the direct primary probe used by `Auto`.
    probe: Mutex<ProbeState>,
    /// Backend of the last handle handed out.
    active: std::sync::RwLock<Option<BackendId>>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut backends: Vec<_> = self.slots.keys().collect();
        backends.sort();
        f.debug_struct("ConnectionPool")
            .field("backends", &backends)
            .field("health_check_interval", &self.health_check_interval)
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Create a pool over the given backend configs. Nothing connects until
    /// the first `get_engine`.
    pub fn new(
        configs: impl IntoIterator<Item = ConnectionConfig>,
        health_check_interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let slots = configs
            .into_iter()
            .map(|config| (config.backend_id, Arc::new(BackendSlot::new(config))))
            .collect();
        Self {
            slots,
            health_check_interval,
            probe_timeout,
            probe: Mutex::new(ProbeState::default()),
            active: std::sync::RwLock::new(None),
        }
    }

    pub fn is_configured(&self, backend: BackendId) -> bool {
        self.slots.contains_key(&backend)
    }

    pub fn config(&self, backend: BackendId) -> Option<&ConnectionConfig> {
        self.slots.get(&backend).map(|slot| &slot.config)
    }

    fn slot(&self, backend: BackendId) -> DbResult<&Arc<BackendSlot>> {
        self.slots.get(&backend).ok_or_else(|| {
            DbError::configuration(format!("Backend '{}' is not configured", backend))
        })
    }

    /// Get a live engine.
    ///
    /// `Auto` probes the primary directly and falls back when it is
    /// unreachable. A specific backend whose health check fails is swapped
    /// for its alternate, one hop only.
    pub async fn get_engine(&self, selector: BackendSelector) -> DbResult<EngineHandle> {
        let backend = match selector {
            BackendSelector::Auto => self.select_backend().await,
            BackendSelector::Backend(id) => id,
        };

        let err = match self.acquire(backend).await {
            Ok(handle) => return Ok(handle),
            Err(e) if e.is_transient() => e,
            Err(e) => return Err(e),
        };

        let alternate = backend.alternate();
        if !self.is_configured(alternate) {
            return Err(err);
        }
        warn!(
            backend = %backend,
            alternate = %alternate,
            error = %err,
            "Backend unavailable, failing over"
        );
        match self.acquire(alternate).await {
            Ok(handle) => Ok(handle),
            Err(alt_err) => {
                warn!(backend = %alternate, error = %alt_err, "Failover target also unavailable");
                Err(err)
            }
        }
    }

    /// Construct (if needed) and health-check one backend. No failover.
    async fn acquire(&self, backend: BackendId) -> DbResult<EngineHandle> {
        let slot = self.slot(backend)?;
        if let Some(reason) = self.cached_failure(slot).await {
            debug!(backend = %backend, error = %reason, "Backend marked unhealthy, skipping");
            return Err(unhealthy_error(backend, &reason));
        }
        let pool = match slot.engine().await {
            Ok(pool) => pool,
            Err(e) => {
                record_failure(slot, &e).await;
                return Err(e);
            }
        };

        if let Err(reason) = self.check_slot(slot, &pool).await {
            return Err(unhealthy_error(backend, &reason));
        }

        if let Ok(mut active) = self.active.write() {
            *active = Some(backend);
        }
        Ok(EngineHandle {
            backend,
            pool,
            query_timeout: slot.config.query_timeout,
        })
    }

    /// Rate-limited health check of a backend.
    ///
    /// Constructs the engine if needed; a construction failure counts as
    /// unhealthy. Calls inside `health_check_interval` return the cached
    /// result, including a cached construction failure.
    pub async fn health_check(&self, backend: BackendId) -> bool {
        let Some(slot) = self.slots.get(&backend) else {
            return false;
        };
        if self.cached_failure(slot).await.is_some() {
            return false;
        }
        match slot.engine().await {
            Ok(pool) => self.check_slot(slot, &pool).await.is_ok(),
            Err(e) => {
                record_failure(slot, &e).await;
                false
            }
        }
    }

    /// Error of a failed check that is still inside the interval.
    async fn cached_failure(&self, slot: &BackendSlot) -> Option<String> {
        let state = slot.health.lock().await;
        let fresh = state
            .checked_at
            .is_some_and(|at| at.elapsed() < self.health_check_interval);
        if fresh {
            cached_result(&state.record).err()
        } else {
            None
        }
    }

    /// Returns the cached error message when the backend is unhealthy.
    async fn check_slot(&self, slot: &BackendSlot, pool: &DbPool) -> Result<(), String> {
        let mut state = slot.health.lock().await;
        let fresh = state
            .checked_at
            .is_some_and(|at| at.elapsed() < self.health_check_interval);
        if fresh {
            return cached_result(&state.record);
        }

        let started = Instant::now();
        let outcome = match timeout(self.probe_timeout, pool.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "health check timed out after {}ms",
                self.probe_timeout.as_millis()
            )),
        };

        match &outcome {
            Ok(()) => debug!(
                backend = %slot.id(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Health check passed"
            ),
            Err(reason) => warn!(backend = %slot.id(), error = %reason, "Health check failed"),
        }

        state.record = HealthRecord {
            backend_id: slot.id(),
            last_checked_at: Some(Utc::now()),
            is_healthy: outcome.is_ok(),
            last_error: outcome.as_ref().err().cloned(),
        };
        state.checked_at = Some(Instant::now());
        outcome
    }

    /// Pick the primary when a direct probe reaches it, the fallback otherwise.
    async fn select_backend(&self) -> BackendId {
        let Some(primary) = self.slots.get(&BackendId::Primary) else {
            return BackendId::Fallback;
        };
        if !self.is_configured(BackendId::Fallback) {
            return BackendId::Primary;
        }

        let mut probe = self.probe.lock().await;
        let due = probe
            .checked_at
            .is_none_or(|at| at.elapsed() >= self.health_check_interval);
        if due {
            probe.reachable = match probe_direct(&primary.config, self.probe_timeout).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        target = %primary.config.masked_connection_string(),
                        error = %e,
                        "Primary unreachable, using fallback"
                    );
                    false
                }
            };
            probe.checked_at = Some(Instant::now());
        }

        if probe.reachable {
            BackendId::Primary
        } else {
            BackendId::Fallback
        }
    }

    /// Backend of the last handle handed out.
    pub fn active_backend(&self) -> Option<BackendId> {
        self.active.read().ok().and_then(|active| *active)
    }

    /// Number of engines built for a backend since startup.
    pub fn constructions(&self, backend: BackendId) -> usize {
        self.slots
            .get(&backend)
            .map_or(0, |slot| slot.constructions.load(Ordering::Acquire))
    }

    /// Snapshot of every configured backend. Never constructs an engine.
    pub async fn introspect(&self) -> Vec<PoolIntrospection> {
        let mut report = Vec::with_capacity(self.slots.len());
        for id in BackendId::ALL {
            let Some(slot) = self.slots.get(&id) else {
                continue;
            };
            let engine = slot.constructed().await;
            let health = slot.health.lock().await.record.clone();
            report.push(PoolIntrospection {
                backend_id: id,
                dialect: slot.config.dialect,
                target: slot.config.masked_connection_string(),
                constructed: engine.is_some(),
                size: engine.as_ref().map_or(0, DbPool::size),
                idle: engine.as_ref().map_or(0, DbPool::num_idle),
                max_connections: slot.config.max_connections(),
                constructions: slot.constructions.load(Ordering::Acquire),
                health,
            });
        }
        report
    }

    /// Close and drop every engine, forget all health state.
    pub async fn reset(&self) {
        for slot in self.slots.values() {
            if let Some(pool) = slot.take_engine().await {
                info!(backend = %slot.id(), "Closing database engine");
                pool.close().await;
            }
            let mut state = slot.health.lock().await;
            state.record = HealthRecord::unchecked(slot.id());
            state.checked_at = None;
        }
        *self.probe.lock().await = ProbeState::default();
        if let Ok(mut active) = self.active.write() {
            *active = None;
        }
        info!("Connection pool reset");
    }

    /// Close every engine at shutdown.
    pub async fn close(&self) {
        for slot in self.slots.values() {
            if let Some(pool) = slot.take_engine().await {
                info!(backend = %slot.id(), "Closing database engine");
                pool.close().await;
            }
        }
        info!("All database engines closed");
    }
}

/// Mark a backend unhealthy after its engine could not be built.
async fn record_failure(slot: &BackendSlot, error: &DbError) {
    let mut state = slot.health.lock().await;
    state.record = HealthRecord {
        backend_id: slot.id(),
        last_checked_at: Some(Utc::now()),
        is_healthy: false,
        last_error: Some(error.to_string()),
    };
    state.checked_at = Some(Instant::now());
}

fn unhealthy_error(backend: BackendId, reason: &str) -> DbError {
    DbError::connection(
        format!("Backend '{}' failed its health check: {}", backend, reason),
        "Verify the database server is running and reachable",
    )
}

fn cached_result(record: &HealthRecord) -> Result<(), String> {
    if record.is_healthy {
        Ok(())
    } else {
        Err(record
            .last_error
            .clone()
            .unwrap_or_else(|| "unhealthy".to_string()))
    }
}

/// Open a single unpooled connection and ping it.
async fn probe_direct(config: &ConnectionConfig, probe_timeout: Duration) -> DbResult<()> {
    let attempt = async {
        match config.dialect {
            Dialect::Server => {
                let mut conn = mysql_options(config)?.connect().await?;
                conn.ping().await?;
                conn.close().await?;
            }
            Dialect::Embedded => {
                let mut conn = SqliteConnectOptions::new()
                    .filename(config.embedded_path())
                    .connect()
                    .await?;
                conn.ping().await?;
                conn.close().await?;
            }
        }
        Ok::<_, DbError>(())
    };
    match timeout(probe_timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(DbError::timeout(
            "primary probe",
            probe_timeout.as_millis() as u64,
        )),
    }
}

fn mysql_options(config: &ConnectionConfig) -> DbResult<MySqlConnectOptions> {
    let url = config.connection_url()?;
    let options = MySqlConnectOptions::from_str(&url).map_err(|e| {
        DbError::configuration(format!(
            "Invalid connection target {}: {}",
            config.masked_connection_string(),
            e
        ))
    })?;
    Ok(options.charset("utf8mb4"))
}

/// Create the engine for a backend. Bounded by `connect_timeout`.
async fn create_pool(config: &ConnectionConfig) -> DbResult<DbPool> {
    let pool = match config.dialect {
        Dialect::Server => {
            let options = mysql_options(config)?;
            let connect = MySqlPoolOptions::new()
                .min_connections(config.pool_min)
                .max_connections(config.max_connections())
                .acquire_timeout(config.pool_timeout)
                .max_lifetime(Some(config.pool_recycle()))
                .test_before_acquire(true)
                .connect_with(options);
            let pool = timeout(config.connect_timeout, connect)
                .await
                .map_err(|_| connect_timeout_error(config))?
                .map_err(|e| connect_error(config, e))?;
            DbPool::MySql(pool)
        }
        Dialect::Embedded => {
            let path = config.embedded_path();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    DbError::configuration(format!(
                        "Cannot create directory '{}' for the embedded database: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            let options = SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true)
                .busy_timeout(config.connect_timeout);
            let connect = SqlitePoolOptions::new()
                .min_connections(config.pool_min)
                .max_connections(config.max_connections())
                .acquire_timeout(config.pool_timeout)
                .max_lifetime(Some(config.pool_recycle()))
                .test_before_acquire(true)
                .connect_with(options);
            let pool = timeout(config.connect_timeout, connect)
                .await
                .map_err(|_| connect_timeout_error(config))?
                .map_err(|e| connect_error(config, e))?;
            DbPool::SQLite(pool)
        }
    };
    info!(backend = %config.backend_id, dialect = %config.dialect, "Database engine ready");
    Ok(pool)
}

fn connect_timeout_error(config: &ConnectionConfig) -> DbError {
    DbError::timeout(
        format!("connect to {}", config.backend_id),
        config.connect_timeout.as_millis() as u64,
    )
}

/// Classify a construction failure, keeping a helpful suggestion.
fn connect_error(config: &ConnectionConfig, error: sqlx::Error) -> DbError {
    let suggestion = connection_suggestion(config.dialect, &error);
    let message = format!("Failed to connect to {}: {}", config.backend_id, error);
    match DbError::from(error) {
        DbError::Connection { .. } | DbError::Timeout { .. } => {
            DbError::connection(message, suggestion)
        }
        // Authentication and unknown-database errors arrive as database errors
        DbError::Statement { .. } => {
            DbError::configuration(format!("{}. {}", message, suggestion))
        }
        other => other,
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(dialect: Dialect, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return "Check that the database server is running and accessible".to_string();
    }

    if error_str.contains("access denied") || error_str.contains("password") {
        return "Verify the username and password in the secrets file".to_string();
    }

    if error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match dialect {
        Dialect::Server => "Verify primary.host, primary.port and primary.database".to_string(),
        Dialect::Embedded => "Verify the fallback file path is writable".to_string(),
    }
}
