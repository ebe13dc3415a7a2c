pub mod config;
pub mod metrics;
pub mod pool;

use crate::core::{EntityId, Result, Row, TxError, with_id};
use crate::storage::{Change, InMemoryStore};
use crate::transaction::IsolationLevel;
use log::debug;
use metrics::ConnectionMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Physical database connection
///
/// Owns at most one running physical transaction. Writes are buffered as
/// [`Change`]s and reach the shared [`InMemoryStore`] only on `commit`.
/// Reads see committed data overlaid with this connection's own buffer.
pub struct Connection {
    /// Unique connection ID
    id: u64,
    /// Shared committed data
    store: Arc<InMemoryStore>,
    /// Physical action counters of the owning pool
    metrics: Arc<ConnectionMetrics>,
    /// Connection state
    state: ConnectionState,
    /// Writes of the running transaction
    pending: Vec<Change>,
    /// Open savepoints with the buffer length at creation time
    savepoints: Vec<(Savepoint, usize)>,
    next_savepoint: u64,
    isolation: IsolationLevel,
    read_only: bool,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Idle,
    InTransaction,
    Closed,
}

/// Restorable marker inside a physical transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    id: u64,
    name: String,
}

impl Savepoint {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Savepoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Connection {
    /// Create a new connection (internal use)
    pub(crate) fn new(id: u64, store: Arc<InMemoryStore>, metrics: Arc<ConnectionMetrics>) -> Self {
        Self {
            id,
            store,
            metrics,
            state: ConnectionState::Idle,
            pending: Vec::new(),
            savepoints: Vec::new(),
            next_savepoint: 1,
            isolation: IsolationLevel::Default,
            read_only: false,
            deadline: None,
        }
    }

    /// Get connection ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the database this connection points at
    pub fn database(&self) -> &str {
        self.store.name()
    }

    /// Begin a physical transaction
    pub fn begin(
        &mut self,
        isolation: IsolationLevel,
        read_only: bool,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.ensure_open()?;

        if self.state == ConnectionState::InTransaction {
            return Err(TxError::Resource(format!(
                "connection {} already has an active transaction",
                self.id
            )));
        }

        self.state = ConnectionState::InTransaction;
        self.isolation = isolation;
        self.read_only = read_only;
        self.deadline = timeout.map(|t| Instant::now() + t);
        self.metrics.record_begin();
        debug!(
            "conn{}: BEGIN (isolation={}, read_only={})",
            self.id, isolation, read_only
        );
        Ok(())
    }

    /// Commit the physical transaction, publishing buffered writes
    ///
    /// A transaction past its deadline is rolled back instead and reported
    /// as [`TxError::Timeout`].
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_in_transaction("commit")?;

        if self.is_past_deadline() {
            self.rollback()?;
            return Err(TxError::Timeout(format!(
                "transaction on connection {} exceeded its deadline before commit",
                self.id
            )));
        }

        let changes = std::mem::take(&mut self.pending);
        let applied = self.store.apply(&changes);
        self.finish_transaction();

        match applied {
            Ok(()) => {
                self.metrics.record_commit();
                debug!("conn{}: COMMIT ({} changes)", self.id, changes.len());
                Ok(())
            }
            Err(err) => {
                self.metrics.record_rollback();
                debug!("conn{}: COMMIT failed, changes discarded: {}", self.id, err);
                Err(err)
            }
        }
    }

    /// Roll back the physical transaction, discarding buffered writes
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_in_transaction("rollback")?;

        let discarded = self.pending.len();
        self.pending.clear();
        self.finish_transaction();
        self.metrics.record_rollback();
        debug!("conn{}: ROLLBACK ({} changes discarded)", self.id, discarded);
        Ok(())
    }

    /// Create a savepoint at the current position of the write buffer
    pub fn create_savepoint(&mut self) -> Result<Savepoint> {
        self.ensure_in_transaction("create a savepoint")?;

        let id = self.next_savepoint;
        self.next_savepoint += 1;
        let savepoint = Savepoint {
            id,
            name: format!("SAVEPOINT_{}", id),
        };
        self.savepoints.push((savepoint.clone(), self.pending.len()));
        self.metrics.record_savepoint();
        debug!("conn{}: {} created", self.id, savepoint);
        Ok(savepoint)
    }

    /// Discard every write made after `savepoint`; the savepoint stays valid
    pub fn rollback_to_savepoint(&mut self, savepoint: &Savepoint) -> Result<()> {
        self.ensure_in_transaction("roll back to a savepoint")?;

        let index = self.savepoint_index(savepoint)?;
        let mark = self.savepoints[index].1;
        self.pending.truncate(mark);
        self.savepoints.truncate(index + 1);
        self.metrics.record_savepoint_rollback();
        debug!("conn{}: ROLLBACK TO {}", self.id, savepoint);
        Ok(())
    }

    /// Forget `savepoint` (and any savepoint created after it), keeping writes
    pub fn release_savepoint(&mut self, savepoint: &Savepoint) -> Result<()> {
        self.ensure_in_transaction("release a savepoint")?;

        let index = self.savepoint_index(savepoint)?;
        self.savepoints.truncate(index);
        self.metrics.record_savepoint_release();
        debug!("conn{}: RELEASE {}", self.id, savepoint);
        Ok(())
    }

    /// Buffer an insert and return the allocated id
    pub fn insert(&mut self, table: &str, row: Row) -> Result<EntityId> {
        self.ensure_writable()?;

        let id = self.store.next_id();
        self.pending.push(Change::Insert {
            table: table.to_string(),
            id,
            row: with_id(row, id),
        });
        Ok(id)
    }

    /// Buffer a full replacement of an existing row
    pub fn update(&mut self, table: &str, id: EntityId, row: Row) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_exists(table, id)?;

        self.pending.push(Change::Update {
            table: table.to_string(),
            id,
            row: with_id(row, id),
        });
        Ok(())
    }

    /// Buffer a delete of an existing row
    pub fn delete(&mut self, table: &str, id: EntityId) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_exists(table, id)?;

        self.pending.push(Change::Delete {
            table: table.to_string(),
            id,
        });
        Ok(())
    }

    /// Read one row as seen by this connection
    pub fn find(&self, table: &str, id: EntityId) -> Result<Option<Row>> {
        self.ensure_open()?;

        let mut row = self.store.get(table, id)?;
        for change in self.pending.iter().filter(|c| c.affects(table, id)) {
            row = change.resulting_row();
        }
        Ok(row)
    }

    /// Read every row of a table as seen by this connection, ordered by id
    pub fn scan(&self, table: &str) -> Result<Vec<Row>> {
        self.ensure_open()?;

        let mut rows: std::collections::BTreeMap<EntityId, Row> =
            self.store.scan(table)?.into_iter().collect();
        for change in self.pending.iter().filter(|c| c.table_name() == table) {
            match change.resulting_row() {
                Some(row) => {
                    rows.insert(change.entity_id(), row);
                }
                None => {
                    rows.remove(&change.entity_id());
                }
            }
        }
        Ok(rows.into_values().collect())
    }

    /// Writes buffered by the running transaction
    pub fn pending_changes(&self) -> &[Change] {
        &self.pending
    }

    /// Number of open savepoints
    pub fn savepoint_count(&self) -> usize {
        self.savepoints.len()
    }

    /// Isolation level of the running transaction
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Check if the running transaction is read-only
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Check if connection is in a transaction
    pub fn is_in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    /// Check if connection is active
    pub fn is_active(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    /// Close the connection, rolling back any running transaction
    pub fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::InTransaction {
            self.rollback()?;
        }

        self.state = ConnectionState::Closed;
        Ok(())
    }

    fn finish_transaction(&mut self) {
        self.state = ConnectionState::Idle;
        self.savepoints.clear();
        self.isolation = IsolationLevel::Default;
        self.read_only = false;
        self.deadline = None;
    }

    fn is_past_deadline(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() > deadline)
    }

    fn savepoint_index(&self, savepoint: &Savepoint) -> Result<usize> {
        self.savepoints
            .iter()
            .position(|(sp, _)| sp == savepoint)
            .ok_or_else(|| {
                TxError::Resource(format!(
                    "{} is not open on connection {}",
                    savepoint, self.id
                ))
            })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(TxError::ConnectionClosed(self.id));
        }
        Ok(())
    }

    fn ensure_in_transaction(&self, action: &str) -> Result<()> {
        self.ensure_open()?;
        if self.state != ConnectionState::InTransaction {
            return Err(TxError::NoTransaction(format!(
                "cannot {} on connection {}: no active transaction",
                action, self.id
            )));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_in_transaction("write")?;
        if self.read_only {
            return Err(TxError::ReadOnly(format!(
                "connection {} is in a read-only transaction",
                self.id
            )));
        }
        if self.is_past_deadline() {
            return Err(TxError::Timeout(format!(
                "transaction on connection {} exceeded its deadline",
                self.id
            )));
        }
        Ok(())
    }

    fn ensure_exists(&self, table: &str, id: EntityId) -> Result<()> {
        if self.find(table, id)?.is_none() {
            return Err(TxError::EntityNotFound {
                table: table.to_string(),
                id,
            });
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Ensure connection is closed and transaction rolled back
        let _ = self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("database", &self.store.name())
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("savepoints", &self.savepoints.len())
            .finish()
    }
}
