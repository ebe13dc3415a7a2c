// ============================================================================
// Transaction Status
// ============================================================================
//
// A TransactionStatus is the handle of one logical transaction. Several
// handles may point at the same PhysicalTransaction; only the one that
// started it (is_new_transaction) drives the connection.
//
// State transitions of a handle:
// ```text
// Active ──commit──> Committed
//   │
//   └──rollback──> RolledBack
// ```
//
// ============================================================================

use super::{IsolationLevel, PropagationMode, ResourceHolder};
use crate::connection::Savepoint;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Global physical transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Global handle ID counter
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a physical transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// State of one physical transaction shared by every handle that takes part
/// in it
#[derive(Debug)]
pub struct PhysicalTransaction {
    id: TransactionId,
    connection_id: u64,
    isolation: IsolationLevel,
    read_only: bool,
    started_at: DateTime<Utc>,
    /// Poison flag; only ever goes from false to true
    rollback_only: AtomicBool,
}

impl PhysicalTransaction {
    pub(crate) fn new(connection_id: u64, isolation: IsolationLevel, read_only: bool) -> Self {
        Self {
            id: TransactionId::new(),
            connection_id,
            isolation,
            read_only,
            started_at: Utc::now(),
            rollback_only: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Doom the transaction: its owner's commit will roll back instead
    pub(crate) fn mark_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }
}

/// Lifecycle state of a transaction handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can execute operations
    Active,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been rolled back
    RolledBack,
}

impl TransactionState {
    /// Check if transaction can execute operations
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    /// Check if transaction is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// Handle of one logical transaction, returned by
/// [`TransactionManager::begin`](super::TransactionManager::begin)
///
/// The handle must be passed back to exactly one `commit` or `rollback`.
#[derive(Debug)]
pub struct TransactionStatus {
    handle_id: u64,
    name: Option<String>,
    propagation: PropagationMode,
    /// `None` for scopes that run without a transaction
    transaction: Option<Arc<PhysicalTransaction>>,
    new_transaction: bool,
    local_rollback_only: bool,
    state: TransactionState,
    savepoint: Option<Savepoint>,
    suspended: Option<ResourceHolder>,
}

impl TransactionStatus {
    pub(crate) fn new(
        name: Option<String>,
        propagation: PropagationMode,
        transaction: Option<Arc<PhysicalTransaction>>,
        new_transaction: bool,
    ) -> Self {
        Self {
            handle_id: NEXT_HANDLE_ID.fetch_add(1, Ordering::SeqCst),
            name,
            propagation,
            transaction,
            new_transaction,
            local_rollback_only: false,
            state: TransactionState::Active,
            savepoint: None,
            suspended: None,
        }
    }

    pub(crate) fn with_savepoint(mut self, savepoint: Savepoint) -> Self {
        self.savepoint = Some(savepoint);
        self
    }

    pub(crate) fn with_suspended(mut self, suspended: Option<ResourceHolder>) -> Self {
        self.suspended = suspended;
        self
    }

    pub(crate) fn handle_id(&self) -> u64 {
        self.handle_id
    }

    /// Name from the definition, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Propagation this handle was requested with
    pub fn propagation(&self) -> PropagationMode {
        self.propagation
    }

    /// True iff this handle started the physical transaction
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    /// Whether this scope runs inside a physical transaction at all
    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// The physical transaction this handle takes part in
    pub fn transaction(&self) -> Option<&Arc<PhysicalTransaction>> {
        self.transaction.as_ref()
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction.as_ref().map(|tx| tx.id())
    }

    pub fn has_savepoint(&self) -> bool {
        self.savepoint.is_some()
    }

    pub fn savepoint(&self) -> Option<&Savepoint> {
        self.savepoint.as_ref()
    }

    /// Whether an outer physical transaction is parked on this handle
    pub fn has_suspended_resources(&self) -> bool {
        self.suspended.is_some()
    }

    /// Request rollback of this logical transaction on completion
    pub fn set_rollback_only(&mut self) {
        self.local_rollback_only = true;
    }

    pub fn is_local_rollback_only(&self) -> bool {
        self.local_rollback_only
    }

    /// Whether the shared physical transaction has been poisoned
    pub fn is_global_rollback_only(&self) -> bool {
        self.transaction
            .as_ref()
            .is_some_and(|tx| tx.is_rollback_only())
    }

    /// Local request or shared poison flag
    pub fn is_rollback_only(&self) -> bool {
        self.local_rollback_only || self.is_global_rollback_only()
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }

    pub(crate) fn take_savepoint(&mut self) -> Option<Savepoint> {
        self.savepoint.take()
    }

    pub(crate) fn take_suspended(&mut self) -> Option<ResourceHolder> {
        self.suspended.take()
    }

    pub(crate) fn complete(&mut self, state: TransactionState) {
        self.state = state;
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.transaction {
            Some(tx) => write!(
                f,
                "{} [{}] on {} (new={}, {})",
                self.name.as_deref().unwrap_or("<unnamed>"),
                self.propagation,
                tx.id(),
                self.new_transaction,
                self.state
            ),
            None => write!(
                f,
                "{} [{}] without transaction ({})",
                self.name.as_deref().unwrap_or("<unnamed>"),
                self.propagation,
                self.state
            ),
        }
    }
}
