// ============================================================================
// Transaction Manager
// ============================================================================
//
// Drives logical transactions over pooled connections:
//
// - `begin` resolves the propagation mode against the context and either
//   starts a physical transaction, joins the bound one, opens a savepoint or
//   runs without a transaction (suspending the bound one when required).
// - `commit` / `rollback` complete the innermost open handle. Only the owner
//   of a physical transaction touches the connection; participants either
//   do nothing (commit) or poison the shared transaction (rollback).
//
// ============================================================================

use super::context::TransactionContext;
use super::propagation::{self, PropagationDecision};
use super::{
    CompletionStatus, PhysicalTransaction, ResourceHolder, TransactionDefinition,
    TransactionManagerConfig, TransactionState, TransactionStatus,
};
use crate::connection::config::DataSourceConfig;
use crate::connection::metrics::MetricsSnapshot;
use crate::connection::pool::ConnectionPool;
use crate::core::{Result, TxError};
use std::sync::Arc;
use tracing::{Level, event, info_span};

pub struct TransactionManager {
    pool: Arc<ConnectionPool>,
    config: TransactionManagerConfig,
}

impl TransactionManager {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self::with_config(pool, TransactionManagerConfig::default())
    }

    pub fn with_config(pool: Arc<ConnectionPool>, config: TransactionManagerConfig) -> Self {
        Self { pool, config }
    }

    /// Build a manager over a fresh pool for `data_source`
    pub fn connect(data_source: DataSourceConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(ConnectionPool::new(data_source)?)))
    }

    /// A fresh context for one flow of control
    pub fn context(&self) -> TransactionContext {
        TransactionContext::new()
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn config(&self) -> &TransactionManagerConfig {
        &self.config
    }

    /// Physical action counters of the underlying pool
    pub fn metrics(&self) -> MetricsSnapshot {
        self.pool.metrics()
    }

    /// Open a logical transaction according to `definition`
    ///
    /// # Errors
    ///
    /// - [`TxError::IllegalTransactionState`] for MANDATORY without a
    ///   transaction, NEVER with one, or a failed join validation
    /// - [`TxError::NestedTransactionNotSupported`] for NESTED when savepoints
    ///   are disabled
    /// - [`TxError::PoolTimeout`] when no connection can be acquired
    pub fn begin(
        &self,
        ctx: &mut TransactionContext,
        definition: &TransactionDefinition,
    ) -> Result<TransactionStatus> {
        let span = info_span!(
            "tx.begin",
            name = %definition.display_name(),
            propagation = %definition.propagation
        );
        let _enter = span.enter();

        let decision = propagation::resolve(definition.propagation, ctx.is_transaction_active())?;
        event!(Level::DEBUG, decision = %decision, "propagation resolved");

        let status = match decision {
            PropagationDecision::NewPhysical { suspend_current } => {
                let suspended = if suspend_current {
                    self.suspend(ctx)
                } else {
                    None
                };

                match self.start_physical(ctx, definition) {
                    Ok(transaction) => TransactionStatus::new(
                        definition.name.clone(),
                        definition.propagation,
                        Some(transaction),
                        true,
                    )
                    .with_suspended(suspended),
                    Err(err) => {
                        event!(Level::ERROR, error = %err, "could not start physical transaction");
                        self.resume(ctx, suspended)?;
                        return Err(err);
                    }
                }
            }
            PropagationDecision::JoinExisting => {
                let holder = ctx.holder_mut()?;
                if self.config.validate_existing_transaction {
                    validate_join(definition, holder.transaction())?;
                }
                holder.requested();
                event!(
                    Level::DEBUG,
                    transaction = %holder.transaction().id(),
                    "participating in existing transaction"
                );
                TransactionStatus::new(
                    definition.name.clone(),
                    definition.propagation,
                    Some(holder.transaction().clone()),
                    false,
                )
            }
            PropagationDecision::Savepoint => {
                if !self.config.nested_transaction_allowed {
                    return Err(TxError::NestedTransactionNotSupported(
                        "Transaction manager does not allow nested transactions; \
                         enable 'nested_transaction_allowed'"
                            .to_string(),
                    ));
                }
                let holder = ctx.holder_mut()?;
                let savepoint = holder.connection_mut().create_savepoint()?;
                holder.requested();
                event!(
                    Level::DEBUG,
                    transaction = %holder.transaction().id(),
                    savepoint = %savepoint,
                    "creating nested transaction"
                );
                TransactionStatus::new(
                    definition.name.clone(),
                    definition.propagation,
                    Some(holder.transaction().clone()),
                    false,
                )
                .with_savepoint(savepoint)
            }
            PropagationDecision::NonTransactional { suspend_current } => {
                let suspended = if suspend_current {
                    self.suspend(ctx)
                } else {
                    None
                };
                TransactionStatus::new(
                    definition.name.clone(),
                    definition.propagation,
                    None,
                    false,
                )
                .with_suspended(suspended)
            }
        };

        ctx.push(&status);
        event!(Level::DEBUG, status = %status, "transaction begun");
        Ok(status)
    }

    /// Complete `status` successfully
    ///
    /// A handle marked rollback-only is rolled back instead. When the shared
    /// transaction was poisoned, or a participant asked for rollback, the
    /// caller gets [`TxError::UnexpectedRollback`] after the rollback.
    pub fn commit(&self, ctx: &mut TransactionContext, status: &mut TransactionStatus) -> Result<()> {
        let span = info_span!("tx.commit", status = %status);
        let _enter = span.enter();

        self.ensure_completable(ctx, status)?;

        if status.is_local_rollback_only() {
            event!(Level::DEBUG, "transactional code has requested rollback");
            let unexpected = status.has_transaction() && !status.is_new_transaction();
            return self.process_rollback(ctx, status, unexpected);
        }

        if status.is_global_rollback_only() {
            event!(
                Level::DEBUG,
                "global transaction is marked as rollback-only but transactional code requested commit"
            );
            return self.process_rollback(ctx, status, true);
        }

        self.process_commit(ctx, status)
    }

    /// Complete `status` by rolling back
    ///
    /// Participants do not roll back the connection; they mark the shared
    /// transaction rollback-only for its owner.
    pub fn rollback(
        &self,
        ctx: &mut TransactionContext,
        status: &mut TransactionStatus,
    ) -> Result<()> {
        let span = info_span!("tx.rollback", status = %status);
        let _enter = span.enter();

        self.ensure_completable(ctx, status)?;
        self.process_rollback(ctx, status, false)
    }

    fn ensure_completable(&self, ctx: &TransactionContext, status: &TransactionStatus) -> Result<()> {
        if status.is_completed() {
            return Err(TxError::IllegalState(
                "Transaction is already completed - do not call commit or rollback more than once per transaction"
                    .to_string(),
            ));
        }
        ctx.ensure_innermost(status)
    }

    fn start_physical(
        &self,
        ctx: &mut TransactionContext,
        definition: &TransactionDefinition,
    ) -> Result<Arc<PhysicalTransaction>> {
        let mut connection = self.pool.get_connection()?;

        let isolation = if definition.isolation.is_default() {
            self.pool.config().default_isolation
        } else {
            definition.isolation
        };
        let timeout = definition.timeout.or(self.config.default_timeout);
        connection.begin(isolation, definition.read_only, timeout)?;

        let transaction = Arc::new(PhysicalTransaction::new(
            connection.id(),
            isolation,
            definition.read_only,
        ));
        event!(
            Level::DEBUG,
            transaction = %transaction.id(),
            connection = connection.id(),
            isolation = %isolation,
            "created new transaction"
        );

        let mut holder = ResourceHolder::new(connection, transaction.clone());
        holder.requested();
        ctx.bind(holder)?;
        Ok(transaction)
    }

    fn suspend(&self, ctx: &mut TransactionContext) -> Option<ResourceHolder> {
        let suspended = ctx.unbind();
        if let Some(holder) = &suspended {
            event!(
                Level::DEBUG,
                transaction = %holder.transaction().id(),
                "suspending current transaction"
            );
        }
        suspended
    }

    fn resume(&self, ctx: &mut TransactionContext, suspended: Option<ResourceHolder>) -> Result<()> {
        if let Some(holder) = suspended {
            event!(
                Level::DEBUG,
                transaction = %holder.transaction().id(),
                "resuming suspended transaction"
            );
            ctx.bind(holder)?;
        }
        Ok(())
    }

    fn process_commit(&self, ctx: &mut TransactionContext, status: &mut TransactionStatus) -> Result<()> {
        let outcome = self.do_commit(ctx, status);
        let state = if outcome.is_ok() {
            TransactionState::Committed
        } else {
            TransactionState::RolledBack
        };
        let cleanup = self.cleanup_after_completion(ctx, status, state);
        outcome.and(cleanup)
    }

    fn do_commit(&self, ctx: &mut TransactionContext, status: &mut TransactionStatus) -> Result<()> {
        if let Some(savepoint) = status.take_savepoint() {
            event!(Level::DEBUG, savepoint = %savepoint, "releasing transaction savepoint");
            let holder = ctx.holder_mut()?;
            let result = holder.connection_mut().release_savepoint(&savepoint);
            holder.released();
            return result;
        }

        if !status.is_new_transaction() {
            if status.has_transaction() {
                ctx.holder_mut()?.released();
            }
            return Ok(());
        }

        let mut holder = self.unbind_owned(ctx, status)?;
        let synchronizations = holder.take_synchronizations();
        let read_only = holder.transaction().is_read_only();

        if let Err(err) = synchronizations
            .iter()
            .try_for_each(|sync| sync.before_commit(read_only))
        {
            event!(Level::WARN, error = %err, "before-commit callback failed, rolling back");
            synchronizations.iter().for_each(|sync| sync.before_completion());
            if let Err(rollback_err) = holder.connection_mut().rollback() {
                event!(Level::ERROR, error = %rollback_err, "rollback after callback failure failed");
            }
            synchronizations
                .iter()
                .for_each(|sync| sync.after_completion(CompletionStatus::RolledBack));
            return Err(err);
        }

        synchronizations.iter().for_each(|sync| sync.before_completion());
        event!(
            Level::DEBUG,
            connection = holder.connection().id(),
            "initiating transaction commit"
        );

        match holder.connection_mut().commit() {
            Ok(()) => {
                synchronizations.iter().for_each(|sync| sync.after_commit());
                synchronizations
                    .iter()
                    .for_each(|sync| sync.after_completion(CompletionStatus::Committed));
                Ok(())
            }
            Err(err) => {
                event!(Level::ERROR, error = %err, "physical commit failed");
                synchronizations
                    .iter()
                    .for_each(|sync| sync.after_completion(CompletionStatus::RolledBack));
                Err(err)
            }
        }
    }

    fn process_rollback(
        &self,
        ctx: &mut TransactionContext,
        status: &mut TransactionStatus,
        unexpected: bool,
    ) -> Result<()> {
        let outcome = self.do_rollback(ctx, status);
        let cleanup = self.cleanup_after_completion(ctx, status, TransactionState::RolledBack);
        outcome.and(cleanup)?;

        if unexpected {
            event!(Level::WARN, "transaction rolled back because it has been marked as rollback-only");
            return Err(TxError::UnexpectedRollback(
                "Transaction rolled back because it has been marked as rollback-only".to_string(),
            ));
        }
        Ok(())
    }

    fn do_rollback(&self, ctx: &mut TransactionContext, status: &mut TransactionStatus) -> Result<()> {
        if let Some(savepoint) = status.take_savepoint() {
            event!(Level::DEBUG, savepoint = %savepoint, "rolling back transaction to savepoint");
            let holder = ctx.holder_mut()?;
            let connection = holder.connection_mut();
            let result = connection
                .rollback_to_savepoint(&savepoint)
                .and_then(|()| connection.release_savepoint(&savepoint));
            holder.released();
            return result;
        }

        if status.is_new_transaction() {
            let mut holder = self.unbind_owned(ctx, status)?;
            let synchronizations = holder.take_synchronizations();
            synchronizations.iter().for_each(|sync| sync.before_completion());
            event!(
                Level::DEBUG,
                connection = holder.connection().id(),
                "initiating transaction rollback"
            );
            let result = holder.connection_mut().rollback();
            synchronizations
                .iter()
                .for_each(|sync| sync.after_completion(CompletionStatus::RolledBack));
            return result;
        }

        match status.transaction() {
            Some(transaction) => {
                event!(
                    Level::DEBUG,
                    transaction = %transaction.id(),
                    "participating transaction failed - marking existing transaction as rollback-only"
                );
                transaction.mark_rollback_only();
                ctx.holder_mut()?.released();
            }
            None => {
                event!(
                    Level::DEBUG,
                    "should roll back transaction but cannot - no transaction available"
                );
            }
        }
        Ok(())
    }

    /// Take the holder of the physical transaction `status` owns off the context
    fn unbind_owned(
        &self,
        ctx: &mut TransactionContext,
        status: &TransactionStatus,
    ) -> Result<ResourceHolder> {
        if ctx.current_transaction_id() != status.transaction_id() {
            return Err(TxError::IllegalTransactionState(format!(
                "Transaction {} is not bound to this context",
                status
            )));
        }
        ctx.unbind().ok_or_else(|| {
            TxError::IllegalTransactionState("No transaction bound to this context".to_string())
        })
    }

    fn cleanup_after_completion(
        &self,
        ctx: &mut TransactionContext,
        status: &mut TransactionStatus,
        state: TransactionState,
    ) -> Result<()> {
        status.complete(state);
        ctx.pop(status);
        self.resume(ctx, status.take_suspended())
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("database", &self.pool.config().database)
            .field("config", &self.config)
            .finish()
    }
}

fn validate_join(definition: &TransactionDefinition, existing: &PhysicalTransaction) -> Result<()> {
    if !definition.isolation.is_default() && definition.isolation != existing.isolation() {
        return Err(TxError::IllegalTransactionState(format!(
            "Participating transaction '{}' specifies isolation level {} which is incompatible with existing transaction ({})",
            definition.display_name(),
            definition.isolation,
            existing.isolation()
        )));
    }

    if !definition.read_only && existing.is_read_only() {
        return Err(TxError::IllegalTransactionState(format!(
            "Participating transaction '{}' is not marked as read-only but existing transaction is",
            definition.display_name()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Row;
    use crate::transaction::{IsolationLevel, PropagationMode, TransactionSynchronization};
    use serde_json::json;
    use std::sync::Mutex;

    fn manager() -> TransactionManager {
        let pool = ConnectionPool::new_isolated(DataSourceConfig::new("manager_test")).unwrap();
        TransactionManager::new(Arc::new(pool))
    }

    fn insert(ctx: &mut TransactionContext, name: &str) {
        let row: Row = json!({ "name": name });
        ctx.connection_mut().unwrap().insert("member", row).unwrap();
    }

    fn count(manager: &TransactionManager) -> usize {
        manager.pool().store().count("member").unwrap()
    }

    #[test]
    fn test_commit_publishes_writes() {
        let manager = manager();
        let mut ctx = manager.context();

        let mut status = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        assert!(status.is_new_transaction());
        insert(&mut ctx, "a");
        manager.commit(&mut ctx, &mut status).unwrap();

        assert_eq!(count(&manager), 1);
        assert!(status.is_completed());
        assert!(!ctx.is_transaction_active());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let manager = manager();
        let mut ctx = manager.context();

        let mut status = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        insert(&mut ctx, "a");
        manager.rollback(&mut ctx, &mut status).unwrap();

        assert_eq!(count(&manager), 0);
        assert_eq!(status.state(), TransactionState::RolledBack);
    }

    #[test]
    fn test_double_completion_is_rejected() {
        let manager = manager();
        let mut ctx = manager.context();

        let mut status = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        manager.commit(&mut ctx, &mut status).unwrap();

        assert!(matches!(
            manager.commit(&mut ctx, &mut status),
            Err(TxError::IllegalState(_))
        ));
        assert!(matches!(
            manager.rollback(&mut ctx, &mut status),
            Err(TxError::IllegalState(_))
        ));
    }

    #[test]
    fn test_out_of_order_completion_is_rejected() {
        let manager = manager();
        let mut ctx = manager.context();

        let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        let mut inner = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();

        assert!(matches!(
            manager.commit(&mut ctx, &mut outer),
            Err(TxError::IllegalTransactionState(_))
        ));
        assert!(!outer.is_completed());

        manager.commit(&mut ctx, &mut inner).unwrap();
        manager.commit(&mut ctx, &mut outer).unwrap();
    }

    #[test]
    fn test_participant_shares_connection() {
        let manager = manager();
        let mut ctx = manager.context();

        let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        let outer_connection = ctx.connection().unwrap().id();
        let mut inner = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();

        assert!(!inner.is_new_transaction());
        assert_eq!(inner.transaction_id(), outer.transaction_id());
        assert_eq!(ctx.connection().unwrap().id(), outer_connection);
        assert_eq!(ctx.holder().unwrap().reference_count(), 2);

        manager.commit(&mut ctx, &mut inner).unwrap();
        assert_eq!(ctx.holder().unwrap().reference_count(), 1);
        manager.commit(&mut ctx, &mut outer).unwrap();
    }

    #[test]
    fn test_requires_new_suspends_and_resumes() {
        let manager = manager();
        let mut ctx = manager.context();

        let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        let outer_id = ctx.current_transaction_id();

        let mut inner = manager
            .begin(&mut ctx, &TransactionDefinition::requires_new())
            .unwrap();
        assert!(inner.is_new_transaction());
        assert!(inner.has_suspended_resources());
        assert_ne!(ctx.current_transaction_id(), outer_id);

        manager.commit(&mut ctx, &mut inner).unwrap();
        assert_eq!(ctx.current_transaction_id(), outer_id);

        manager.commit(&mut ctx, &mut outer).unwrap();
        assert_eq!(manager.metrics().commits, 2);
    }

    #[test]
    fn test_not_supported_runs_without_connection() {
        let manager = manager();
        let mut ctx = manager.context();

        let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        let mut inner = manager
            .begin(&mut ctx, &TransactionDefinition::new(PropagationMode::NotSupported))
            .unwrap();

        assert!(!inner.has_transaction());
        assert!(!ctx.is_transaction_active());
        assert!(ctx.connection().is_none());

        manager.commit(&mut ctx, &mut inner).unwrap();
        assert!(ctx.is_transaction_active());
        manager.commit(&mut ctx, &mut outer).unwrap();
    }

    #[test]
    fn test_supports_without_transaction_is_empty() {
        let manager = manager();
        let mut ctx = manager.context();

        let mut status = manager
            .begin(&mut ctx, &TransactionDefinition::new(PropagationMode::Supports))
            .unwrap();
        assert!(!status.has_transaction());
        status.set_rollback_only();
        manager.commit(&mut ctx, &mut status).unwrap();
        assert_eq!(manager.metrics().begins, 0);
    }

    #[test]
    fn test_mandatory_and_never() {
        let manager = manager();
        let mut ctx = manager.context();

        assert!(matches!(
            manager.begin(&mut ctx, &TransactionDefinition::new(PropagationMode::Mandatory)),
            Err(TxError::IllegalTransactionState(_))
        ));

        let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        assert!(matches!(
            manager.begin(&mut ctx, &TransactionDefinition::new(PropagationMode::Never)),
            Err(TxError::IllegalTransactionState(_))
        ));
        assert_eq!(ctx.depth(), 1);
        manager.commit(&mut ctx, &mut outer).unwrap();
    }

    #[test]
    fn test_nested_disabled() {
        let pool = ConnectionPool::new_isolated(DataSourceConfig::new("nested_disabled")).unwrap();
        let manager = TransactionManager::with_config(
            Arc::new(pool),
            TransactionManagerConfig::new().nested_transaction_allowed(false),
        );
        let mut ctx = manager.context();

        let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        assert!(matches!(
            manager.begin(&mut ctx, &TransactionDefinition::nested()),
            Err(TxError::NestedTransactionNotSupported(_))
        ));
        manager.rollback(&mut ctx, &mut outer).unwrap();
    }

    #[test]
    fn test_validate_existing_transaction() {
        let pool = ConnectionPool::new_isolated(DataSourceConfig::new("validate_join")).unwrap();
        let manager = TransactionManager::with_config(
            Arc::new(pool),
            TransactionManagerConfig::new().validate_existing_transaction(true),
        );
        let mut ctx = manager.context();

        let mut outer = manager
            .begin(&mut ctx, &TransactionDefinition::required().read_only(true))
            .unwrap();

        assert!(matches!(
            manager.begin(&mut ctx, &TransactionDefinition::required()),
            Err(TxError::IllegalTransactionState(_))
        ));
        assert!(matches!(
            manager.begin(
                &mut ctx,
                &TransactionDefinition::required()
                    .read_only(true)
                    .isolation(IsolationLevel::Serializable)
            ),
            Err(TxError::IllegalTransactionState(_))
        ));

        let mut inner = manager
            .begin(&mut ctx, &TransactionDefinition::required().read_only(true))
            .unwrap();
        manager.commit(&mut ctx, &mut inner).unwrap();
        manager.commit(&mut ctx, &mut outer).unwrap();
    }

    #[test]
    fn test_default_isolation_comes_from_data_source() {
        let manager = manager();
        let mut ctx = manager.context();

        let mut status = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        assert_eq!(
            status.transaction().unwrap().isolation(),
            IsolationLevel::ReadCommitted
        );
        manager.commit(&mut ctx, &mut status).unwrap();
    }

    struct Recording {
        events: Arc<Mutex<Vec<String>>>,
        fail_before_commit: bool,
    }

    impl TransactionSynchronization for Recording {
        fn before_commit(&self, _read_only: bool) -> Result<()> {
            self.events.lock().unwrap().push("before_commit".to_string());
            if self.fail_before_commit {
                return Err(TxError::Resource("flush failed".to_string()));
            }
            Ok(())
        }

        fn before_completion(&self) {
            self.events.lock().unwrap().push("before_completion".to_string());
        }

        fn after_commit(&self) {
            self.events.lock().unwrap().push("after_commit".to_string());
        }

        fn after_completion(&self, status: CompletionStatus) {
            self.events
                .lock()
                .unwrap()
                .push(format!("after_completion({:?})", status));
        }
    }

    #[test]
    fn test_synchronization_callbacks_on_commit() {
        let manager = manager();
        let mut ctx = manager.context();
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        let mut inner = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        ctx.register_synchronization(Recording {
            events: events.clone(),
            fail_before_commit: false,
        })
        .unwrap();

        manager.commit(&mut ctx, &mut inner).unwrap();
        assert!(events.lock().unwrap().is_empty());

        manager.commit(&mut ctx, &mut outer).unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "before_commit",
                "before_completion",
                "after_commit",
                "after_completion(Committed)"
            ]
        );
    }

    #[test]
    fn test_failing_before_commit_rolls_back() {
        let manager = manager();
        let mut ctx = manager.context();
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut status = manager.begin(&mut ctx, &TransactionDefinition::required()).unwrap();
        insert(&mut ctx, "a");
        ctx.register_synchronization(Recording {
            events: events.clone(),
            fail_before_commit: true,
        })
        .unwrap();

        assert!(matches!(
            manager.commit(&mut ctx, &mut status),
            Err(TxError::Resource(_))
        ));
        assert_eq!(count(&manager), 0);
        assert_eq!(status.state(), TransactionState::RolledBack);
        assert_eq!(
            events.lock().unwrap().last().map(String::as_str),
            Some("after_completion(RolledBack)")
        );
    }

    #[test]
    fn test_register_synchronization_requires_transaction() {
        let manager = manager();
        let mut ctx = manager.context();
        let result = ctx.register_synchronization(Recording {
            events: Arc::new(Mutex::new(Vec::new())),
            fail_before_commit: false,
        });
        assert!(matches!(result, Err(TxError::IllegalState(_))));
    }
}
