use super::{Connection, config::DataSourceConfig, metrics::{ConnectionMetrics, MetricsSnapshot}};
use crate::core::{Result, TxError};
use crate::storage::InMemoryStore;
use log::{debug, warn};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Connection pool
///
/// The resource provider of the transaction manager: hands out physical
/// connections to one in-memory database and blocks (up to
/// `connect_timeout`) when all of them are in use.
pub struct ConnectionPool {
    /// Pool configuration
    config: DataSourceConfig,
    /// Shared database instance
    store: Arc<InMemoryStore>,
    /// State shared with outstanding guards
    shared: Arc<PoolShared>,
    /// Next connection ID
    next_id: AtomicU64,
}

/// Pool state reachable from [`PoolGuard`]s
struct PoolShared {
    /// Available connections
    available: Mutex<VecDeque<PooledConnection>>,
    /// Signalled whenever a connection is returned or destroyed
    returned: Condvar,
    /// Total number of connections created and not yet destroyed
    total_connections: AtomicUsize,
    metrics: Arc<ConnectionMetrics>,
}

/// A connection from the pool
struct PooledConnection {
    connection: Connection,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(connection: Connection) -> Self {
        let now = Instant::now();
        Self {
            connection,
            created_at: now,
            last_used: now,
        }
    }

    fn returned(connection: Connection, created_at: Instant) -> Self {
        Self {
            connection,
            created_at,
            last_used: Instant::now(),
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        max_lifetime.is_some_and(|lifetime| self.created_at.elapsed() > lifetime)
    }

    fn is_idle_too_long(&self, idle_timeout: Option<Duration>) -> bool {
        idle_timeout.is_some_and(|timeout| self.last_used.elapsed() > timeout)
    }
}

impl ConnectionPool {
    /// Create a new connection pool on the named database of the config
    pub fn new(config: DataSourceConfig) -> Result<Self> {
        let store = InMemoryStore::named(&config.database)?;
        Self::new_with_store(config, store)
    }

    /// Create a new connection pool over a specific store
    pub fn new_with_store(config: DataSourceConfig, store: Arc<InMemoryStore>) -> Result<Self> {
        config.validate()?;

        let pool = Self {
            config,
            store,
            shared: Arc::new(PoolShared {
                available: Mutex::new(VecDeque::new()),
                returned: Condvar::new(),
                total_connections: AtomicUsize::new(0),
                metrics: Arc::new(ConnectionMetrics::new()),
            }),
            next_id: AtomicU64::new(1),
        };

        // Pre-create minimum connections
        pool.ensure_min_connections()?;

        Ok(pool)
    }

    /// Create a new connection pool with an isolated database instance
    ///
    /// Useful for testing to ensure tests don't interfere with each other.
    pub fn new_isolated(config: DataSourceConfig) -> Result<Self> {
        let store = InMemoryStore::isolated(&config.database);
        Self::new_with_store(config, store)
    }

    /// Get a connection from the pool, waiting up to `connect_timeout`
    pub fn get_connection(&self) -> Result<PoolGuard> {
        let start = Instant::now();
        let mut available = self.shared.available.lock()?;

        loop {
            // Try to get an available connection
            if let Some(pooled) = self.take_available(&mut available) {
                debug!("conn{}: acquired from pool", pooled.connection.id());
                return Ok(self.guard(pooled.connection, pooled.created_at));
            }

            // Try to create a new connection if under limit
            if let Some(conn) = self.try_create_connection() {
                debug!("conn{}: created", conn.id());
                return Ok(self.guard(conn, Instant::now()));
            }

            // Check timeout
            let elapsed = start.elapsed();
            if elapsed >= self.config.connect_timeout {
                return Err(TxError::PoolTimeout(format!(
                    "no connections available after {:?} (max {})",
                    self.config.connect_timeout, self.config.max_connections
                )));
            }

            let (guard, _) = self
                .shared
                .returned
                .wait_timeout(available, self.config.connect_timeout - elapsed)?;
            available = guard;
        }
    }

    fn guard(&self, connection: Connection, created_at: Instant) -> PoolGuard {
        PoolGuard {
            connection: Some(connection),
            created_at,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Pop the first healthy connection, evicting closed and expired ones on the way
    fn take_available(&self, available: &mut VecDeque<PooledConnection>) -> Option<PooledConnection> {
        let before = available.len();
        available.retain(|pooled| {
            pooled.connection.is_active()
                && !pooled.is_expired(self.config.max_lifetime)
                && !pooled.is_idle_too_long(self.config.idle_timeout)
        });

        let removed = before - available.len();
        if removed > 0 {
            self.shared.total_connections.fetch_sub(removed, Ordering::SeqCst);
            debug!("evicted {} stale connections", removed);
        }

        available.pop_front()
    }

    /// Try to create a new connection if under limit
    fn try_create_connection(&self) -> Option<Connection> {
        let reserved = self.shared.total_connections.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |total| (total < self.config.max_connections).then_some(total + 1),
        );
        if reserved.is_err() {
            return None;
        }

        Some(self.create_connection())
    }

    fn create_connection(&self) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Connection::new(id, Arc::clone(&self.store), Arc::clone(&self.shared.metrics))
    }

    /// Ensure minimum number of connections
    fn ensure_min_connections(&self) -> Result<()> {
        let mut available = self.shared.available.lock()?;

        while self.shared.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            let connection = self.create_connection();
            available.push_back(PooledConnection::new(connection));
            self.shared.total_connections.fetch_add(1, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Get pool statistics
    pub fn stats(&self) -> Result<PoolStats> {
        let available = self.shared.available.lock()?;
        let total = self.shared.total_connections.load(Ordering::SeqCst);

        Ok(PoolStats {
            total_connections: total,
            available_connections: available.len(),
            active_connections: total.saturating_sub(available.len()),
            max_connections: self.config.max_connections,
        })
    }

    /// Counters of physical begins, commits, rollbacks and savepoints
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// The store this pool's connections write to
    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when dropped, rolling back a
/// transaction that was left open.
pub struct PoolGuard {
    connection: Option<Connection>,
    created_at: Instant,
    shared: Arc<PoolShared>,
}

impl PoolGuard {
    /// Get a reference to the connection
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Get a mutable reference to the connection
    pub fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.connection.as_mut()
    }

    /// Explicitly return the connection to the pool
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        if !connection.is_active() {
            debug!("conn{}: closed, not returned to pool", connection.id());
            self.discard();
            return Ok(());
        }

        if connection.is_in_transaction() {
            warn!(
                "conn{}: returned to pool with an active transaction, rolling back",
                connection.id()
            );
            if let Err(err) = connection.rollback() {
                self.discard();
                return Err(err);
            }
        }

        match self.shared.available.lock() {
            Ok(mut pool) => {
                pool.push_back(PooledConnection::returned(connection, self.created_at));
                self.shared.returned.notify_one();
                Ok(())
            }
            Err(err) => {
                warn!("conn{}: pool lock poisoned, connection dropped", connection.id());
                self.discard();
                Err(err.into())
            }
        }
    }

    fn discard(&self) {
        self.shared.total_connections.fetch_sub(1, Ordering::SeqCst);
        self.shared.returned.notify_one();
    }
}

impl Deref for PoolGuard {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self.connection.as_ref() {
            Some(connection) => connection,
            None => unreachable!("PoolGuard used after its connection was returned"),
        }
    }
}

impl DerefMut for PoolGuard {
    fn deref_mut(&mut self) -> &mut Connection {
        match self.connection.as_mut() {
            Some(connection) => connection,
            None => unreachable!("PoolGuard used after its connection was returned"),
        }
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to return connection to pool: {}", err);
        }
    }
}

impl std::fmt::Debug for PoolGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard")
            .field("connection", &self.connection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::IsolationLevel;
    use serde_json::json;

    fn isolated(config: DataSourceConfig) -> ConnectionPool {
        ConnectionPool::new_isolated(config).unwrap()
    }

    #[test]
    fn test_pool_creation() {
        let pool = isolated(DataSourceConfig::new("pool_test").min_connections(2).max_connections(5));
        let stats = pool.stats().unwrap();

        assert_eq!(stats.total_connections, 2); // min_connections
        assert_eq!(stats.available_connections, 2);
    }

    #[test]
    fn test_get_connection() {
        let pool = isolated(DataSourceConfig::new("pool_test").max_connections(5));
        let conn = pool.get_connection().unwrap();
        assert!(conn.is_active());
    }

    #[test]
    fn test_connection_return_to_pool() {
        let pool = isolated(DataSourceConfig::new("pool_test").min_connections(1).max_connections(5));

        {
            let _conn = pool.get_connection().unwrap();
            let stats = pool.stats().unwrap();
            assert_eq!(stats.active_connections, 1);
            assert_eq!(stats.available_connections, 0);
        } // Connection returned here

        let stats = pool.stats().unwrap();
        assert_eq!(stats.available_connections, 1);
        assert_eq!(stats.total_connections, 1);
    }

    #[test]
    fn test_max_connections_limit() {
        let pool = isolated(
            DataSourceConfig::new("pool_test")
                .max_connections(2)
                .connect_timeout(Duration::from_millis(50)),
        );

        let _conn1 = pool.get_connection().unwrap();
        let _conn2 = pool.get_connection().unwrap();

        // Third connection should timeout
        let result = pool.get_connection();
        assert!(matches!(result, Err(TxError::PoolTimeout(_))));
    }

    #[test]
    fn test_waiter_gets_returned_connection() {
        let pool = Arc::new(isolated(
            DataSourceConfig::new("pool_test")
                .min_connections(0)
                .max_connections(1)
                .connect_timeout(Duration::from_secs(5)),
        ));

        let conn = pool.get_connection().unwrap();
        let first_id = conn.id();

        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || pool.get_connection().map(|c| c.id()))
        };

        std::thread::sleep(Duration::from_millis(20));
        drop(conn);

        assert_eq!(waiter.join().unwrap().unwrap(), first_id);
    }

    #[test]
    fn test_drop_rolls_back_open_transaction() {
        let pool = isolated(DataSourceConfig::new("pool_test").max_connections(1));

        {
            let mut conn = pool.get_connection().unwrap();
            conn.begin(IsolationLevel::Default, false, None).unwrap();
            conn.insert("member", json!({"username": "leaked"})).unwrap();
        }

        assert_eq!(pool.store().count("member").unwrap(), 0);
        assert_eq!(pool.metrics().rollbacks, 1);

        let conn = pool.get_connection().unwrap();
        assert!(!conn.is_in_transaction());
    }

    #[test]
    fn test_closed_connection_is_discarded() {
        let pool = isolated(
            DataSourceConfig::new("pool_test")
                .min_connections(0)
                .max_connections(1)
                .connect_timeout(Duration::from_millis(50)),
        );

        {
            let mut conn = pool.get_connection().unwrap();
            conn.begin(IsolationLevel::Default, false, None).unwrap();
            conn.close().unwrap();
        }

        let stats = pool.stats().unwrap();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.available_connections, 0);

        let conn = pool.get_connection().unwrap();
        assert!(conn.is_active());
        assert_eq!(conn.id(), 2);
    }

    #[test]
    fn test_idle_connections_are_evicted() {
        let pool = isolated(
            DataSourceConfig::new("pool_test")
                .min_connections(1)
                .idle_timeout(Duration::from_millis(1)),
        );
        std::thread::sleep(Duration::from_millis(10));

        let conn = pool.get_connection().unwrap();
        assert_eq!(conn.id(), 2);
        assert_eq!(pool.stats().unwrap().total_connections, 1);
    }

    #[test]
    fn test_pool_stats_display() {
        let pool = isolated(DataSourceConfig::new("pool_test").min_connections(2).max_connections(10));
        let stats = pool.stats().unwrap();

        assert_eq!(stats.max_connections, 10);
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.to_string(), "Pool Stats: 0/2 active, 2 available, max 10");
    }
}
