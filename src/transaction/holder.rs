use super::{PhysicalTransaction, TransactionSynchronization};
use crate::connection::Connection;
use crate::connection::pool::PoolGuard;
use std::sync::Arc;

/// Connection bound to a context while a physical transaction runs on it
///
/// Counts the logical scopes currently using the connection: the owner plus
/// every participant or savepoint scope that has not completed yet.
pub struct ResourceHolder {
    connection: PoolGuard,
    transaction: Arc<PhysicalTransaction>,
    reference_count: usize,
    synchronizations: Vec<Box<dyn TransactionSynchronization>>,
}

impl ResourceHolder {
    pub(crate) fn new(connection: PoolGuard, transaction: Arc<PhysicalTransaction>) -> Self {
        Self {
            connection,
            transaction,
            reference_count: 0,
            synchronizations: Vec::new(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn transaction(&self) -> &Arc<PhysicalTransaction> {
        &self.transaction
    }

    pub fn reference_count(&self) -> usize {
        self.reference_count
    }

    pub fn is_open(&self) -> bool {
        self.reference_count > 0
    }

    pub(crate) fn requested(&mut self) {
        self.reference_count += 1;
    }

    pub(crate) fn released(&mut self) {
        self.reference_count = self.reference_count.saturating_sub(1);
    }

    pub(crate) fn register_synchronization(
        &mut self,
        synchronization: Box<dyn TransactionSynchronization>,
    ) {
        self.synchronizations.push(synchronization);
    }

    pub(crate) fn take_synchronizations(&mut self) -> Vec<Box<dyn TransactionSynchronization>> {
        std::mem::take(&mut self.synchronizations)
    }
}

impl std::fmt::Debug for ResourceHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHolder")
            .field("transaction", &self.transaction.id())
            .field("connection", &self.connection.id())
            .field("reference_count", &self.reference_count)
            .field("synchronizations", &self.synchronizations.len())
            .finish()
    }
}
