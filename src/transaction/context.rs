use super::{ResourceHolder, TransactionId, TransactionStatus, TransactionSynchronization};
use crate::connection::Connection;
use crate::core::{Result, TxError};
use log::warn;

/// Per-flow transaction state
///
/// Carries the resource holder currently bound for this flow of control and
/// the stack of open handles. A context must not be shared between
/// concurrent flows; hand each thread its own from
/// [`TransactionManager::context`](super::TransactionManager::context).
#[derive(Debug, Default)]
pub struct TransactionContext {
    holder: Option<ResourceHolder>,
    /// Open handle ids, innermost last
    open_handles: Vec<u64>,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a physical transaction is bound to this context
    pub fn is_transaction_active(&self) -> bool {
        self.holder.is_some()
    }

    pub fn current_transaction_id(&self) -> Option<TransactionId> {
        self.holder.as_ref().map(|h| h.transaction().id())
    }

    pub fn current_connection_id(&self) -> Option<u64> {
        self.holder.as_ref().map(|h| h.connection().id())
    }

    /// Whether the bound physical transaction has been marked rollback-only
    pub fn is_current_rollback_only(&self) -> bool {
        self.holder
            .as_ref()
            .is_some_and(|h| h.transaction().is_rollback_only())
    }

    /// Number of logical scopes that have begun and not completed yet
    pub fn depth(&self) -> usize {
        self.open_handles.len()
    }

    /// The bound connection, if any
    pub fn connection(&self) -> Option<&Connection> {
        self.holder.as_ref().map(|h| h.connection())
    }

    pub fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.holder.as_mut().map(|h| h.connection_mut())
    }

    pub fn holder(&self) -> Option<&ResourceHolder> {
        self.holder.as_ref()
    }

    /// Register callbacks on the bound physical transaction
    pub fn register_synchronization<S>(&mut self, synchronization: S) -> Result<()>
    where
        S: TransactionSynchronization + 'static,
    {
        let holder = self.holder.as_mut().ok_or_else(|| {
            TxError::IllegalState("Transaction synchronization is not active".to_string())
        })?;
        holder.register_synchronization(Box::new(synchronization));
        Ok(())
    }

    pub(crate) fn holder_mut(&mut self) -> Result<&mut ResourceHolder> {
        self.holder.as_mut().ok_or_else(|| {
            TxError::IllegalTransactionState("No transaction bound to this context".to_string())
        })
    }

    pub(crate) fn bind(&mut self, holder: ResourceHolder) -> Result<()> {
        if let Some(bound) = &self.holder {
            return Err(TxError::IllegalTransactionState(format!(
                "Already bound to {}",
                bound.transaction().id()
            )));
        }
        self.holder = Some(holder);
        Ok(())
    }

    pub(crate) fn unbind(&mut self) -> Option<ResourceHolder> {
        self.holder.take()
    }

    pub(crate) fn push(&mut self, status: &TransactionStatus) {
        self.open_handles.push(status.handle_id());
    }

    /// Fail unless `status` is the innermost open handle
    pub(crate) fn ensure_innermost(&self, status: &TransactionStatus) -> Result<()> {
        match self.open_handles.last() {
            Some(&id) if id == status.handle_id() => Ok(()),
            Some(_) => Err(TxError::IllegalTransactionState(format!(
                "Transaction {} completed while an inner transaction is still open",
                status
            ))),
            None => Err(TxError::IllegalTransactionState(format!(
                "Transaction {} does not belong to this context",
                status
            ))),
        }
    }

    pub(crate) fn pop(&mut self, status: &TransactionStatus) {
        if self.open_handles.last() == Some(&status.handle_id()) {
            self.open_handles.pop();
        }
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if let Some(holder) = &self.holder {
            warn!(
                "context dropped with {} still bound ({} open scopes), rolling back",
                holder.transaction().id(),
                self.open_handles.len()
            );
        }
    }
}
