// ============================================================================
// memtx Library
// ============================================================================
//
// Declarative transaction propagation over an in-memory connection pool.
//
// ```text
// TransactionTemplate ──> TransactionManager ──> ConnectionPool ──> InMemoryStore
//        │                      │
//   RollbackRules        TransactionContext (bound ResourceHolder + open handles)
// ```
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod repository;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use core::{EntityId, Result, Row, TxError};
pub use repository::Repository;
pub use storage::InMemoryStore;

// Re-export connection API
pub use connection::{
    Connection, Savepoint,
    config::DataSourceConfig,
    metrics::MetricsSnapshot,
    pool::{ConnectionPool, PoolGuard, PoolStats},
};

// Re-export transaction API
pub use transaction::{
    ClassifiedFailure, CompletionStatus, FailureClass, FailureKind, InvocationError,
    IsolationLevel, PropagationMode, RollbackDecision, RollbackRules, TransactionAttribute,
    TransactionContext, TransactionDefinition, TransactionManager, TransactionManagerConfig,
    TransactionState, TransactionStatus, TransactionSynchronization, TransactionTemplate,
};
