use crate::core::Result;

/// Outcome reported to [`TransactionSynchronization::after_completion`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Committed,
    RolledBack,
}

/// Callbacks around the completion of a physical transaction
///
/// Registered on the transaction bound to a context and invoked only when
/// the owning handle completes; participants never trigger them.
pub trait TransactionSynchronization: Send {
    /// Runs before the physical commit. An error turns the commit into a
    /// rollback and is returned to the committing caller.
    fn before_commit(&self, read_only: bool) -> Result<()> {
        let _ = read_only;
        Ok(())
    }

    /// Runs before commit or rollback, after `before_commit`
    fn before_completion(&self) {}

    /// Runs after a successful physical commit
    fn after_commit(&self) {}

    fn after_completion(&self, status: CompletionStatus) {
        let _ = status;
    }
}
