use thiserror::Error;

#[derive(Error, Debug)]
pub enum TxError {
    /// The requested propagation does not fit the current transaction state
    /// (MANDATORY without a transaction, NEVER inside one, ...).
    #[error("Illegal transaction state: {0}")]
    IllegalTransactionState(String),

    /// A transaction handle was completed twice.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A commit was turned into a rollback because the physical transaction
    /// had been marked rollback-only.
    #[error("Unexpected rollback: {0}")]
    UnexpectedRollback(String),

    #[error("Nested transaction not supported: {0}")]
    NestedTransactionNotSupported(String),

    #[error("No transaction: {0}")]
    NoTransaction(String),

    #[error("Read-only transaction: {0}")]
    ReadOnly(String),

    #[error("Transaction timed out: {0}")]
    Timeout(String),

    #[error("Connection pool timeout: {0}")]
    PoolTimeout(String),

    #[error("Connection {0} is closed")]
    ConnectionClosed(u64),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Entity {id} not found in table '{table}'")]
    EntityNotFound { table: String, id: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, TxError>;

impl<T> From<std::sync::PoisonError<T>> for TxError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for TxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
