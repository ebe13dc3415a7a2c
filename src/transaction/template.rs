use super::context::TransactionContext;
use super::rollback::{ClassifiedFailure, FailureKind, RollbackDecision, RollbackRules};
use super::{IsolationLevel, PropagationMode, TransactionDefinition, TransactionManager};
use crate::core::TxError;
use std::time::Duration;
use thiserror::Error;
use tracing::{Level, event, info_span};

/// Transaction definition plus the rollback rules applied to failures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionAttribute {
    pub definition: TransactionDefinition,
    pub rules: RollbackRules,
}

impl TransactionAttribute {
    pub fn new(propagation: PropagationMode) -> Self {
        Self {
            definition: TransactionDefinition::new(propagation),
            rules: RollbackRules::default(),
        }
    }

    pub fn required() -> Self {
        Self::new(PropagationMode::Required)
    }

    pub fn requires_new() -> Self {
        Self::new(PropagationMode::RequiresNew)
    }

    pub fn nested() -> Self {
        Self::new(PropagationMode::Nested)
    }

    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.definition.isolation = isolation;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.definition.read_only = read_only;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.definition.timeout = Some(timeout);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.definition.name = Some(name.to_string());
        self
    }

    pub fn rollback_for(mut self, kind: FailureKind) -> Self {
        self.rules = self.rules.rollback_for(kind);
        self
    }

    pub fn no_rollback_for(mut self, kind: FailureKind) -> Self {
        self.rules = self.rules.no_rollback_for(kind);
        self
    }
}

impl From<TransactionDefinition> for TransactionAttribute {
    fn from(definition: TransactionDefinition) -> Self {
        Self {
            definition,
            rules: RollbackRules::default(),
        }
    }
}

/// Error returned by a unit of work run through [`TransactionTemplate`]
#[derive(Debug, Error)]
pub enum InvocationError<E> {
    /// The unit of work failed; the transaction was completed per the rules
    #[error("{0}")]
    Failure(E),

    /// The transaction infrastructure failed. `failure` holds the unit of
    /// work's own error when completing after it failed as well.
    #[error("{error}")]
    Transaction {
        error: TxError,
        failure: Option<E>,
    },
}

impl<E> InvocationError<E> {
    pub fn failure(&self) -> Option<&E> {
        match self {
            InvocationError::Failure(failure) => Some(failure),
            InvocationError::Transaction { failure, .. } => failure.as_ref(),
        }
    }

    pub fn transaction_error(&self) -> Option<&TxError> {
        match self {
            InvocationError::Failure(_) => None,
            InvocationError::Transaction { error, .. } => Some(error),
        }
    }

    pub fn is_unexpected_rollback(&self) -> bool {
        matches!(
            self,
            InvocationError::Transaction {
                error: TxError::UnexpectedRollback(_),
                ..
            }
        )
    }
}

impl<E> From<TxError> for InvocationError<E> {
    fn from(error: TxError) -> Self {
        InvocationError::Transaction {
            error,
            failure: None,
        }
    }
}

/// Runs units of work inside transactions of one [`TransactionManager`]
///
/// ```
/// use memtx::{DataSourceConfig, TransactionAttribute, TransactionManager, TransactionTemplate, TxError};
///
/// let manager = TransactionManager::connect(DataSourceConfig::new("template_doc")).unwrap();
/// let template = TransactionTemplate::new(&manager);
/// let mut ctx = manager.context();
///
/// let id = template
///     .execute(&mut ctx, &TransactionAttribute::required(), |ctx| {
///         let connection = ctx.connection_mut().ok_or_else(|| TxError::NoTransaction("unbound".into()))?;
///         connection.insert("member", serde_json::json!({ "username": "doc" }))
///     })
///     .unwrap();
/// assert!(manager.pool().store().get("member", id).unwrap().is_some());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TransactionTemplate<'a> {
    manager: &'a TransactionManager,
}

impl<'a> TransactionTemplate<'a> {
    pub fn new(manager: &'a TransactionManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &'a TransactionManager {
        self.manager
    }

    /// Run `work` inside a logical transaction described by `attribute`
    ///
    /// Normal completion commits. A failure is classified by the rollback
    /// rules and the transaction committed or rolled back accordingly; the
    /// failure is then returned unchanged as [`InvocationError::Failure`].
    /// If that commit or rollback fails too, both errors come back as
    /// [`InvocationError::Transaction`].
    pub fn execute<T, E, F>(
        &self,
        ctx: &mut TransactionContext,
        attribute: &TransactionAttribute,
        work: F,
    ) -> Result<T, InvocationError<E>>
    where
        F: FnOnce(&mut TransactionContext) -> Result<T, E>,
        E: ClassifiedFailure + std::fmt::Display,
    {
        let span = info_span!(
            "tx.execute",
            name = %attribute.definition.display_name(),
            propagation = %attribute.definition.propagation
        );
        let _enter = span.enter();

        let mut status = self.manager.begin(ctx, &attribute.definition)?;

        let failure = match work(ctx) {
            Ok(value) => {
                self.manager.commit(ctx, &mut status)?;
                return Ok(value);
            }
            Err(failure) => failure,
        };

        let kind = failure.failure_kind();
        let decision = attribute.rules.decide(Some(&kind));
        event!(
            Level::DEBUG,
            failure = %failure,
            kind = %kind,
            decision = %decision,
            "unit of work failed"
        );

        let completion = match decision {
            RollbackDecision::Commit => self.manager.commit(ctx, &mut status),
            RollbackDecision::Rollback => self.manager.rollback(ctx, &mut status),
        };

        match completion {
            Ok(()) => Err(InvocationError::Failure(failure)),
            Err(error) => Err(InvocationError::Transaction {
                error,
                failure: Some(failure),
            }),
        }
    }

    /// [`execute`](Self::execute) with REQUIRED propagation and default rules
    pub fn execute_default<T, E, F>(
        &self,
        ctx: &mut TransactionContext,
        work: F,
    ) -> Result<T, InvocationError<E>>
    where
        F: FnOnce(&mut TransactionContext) -> Result<T, E>,
        E: ClassifiedFailure + std::fmt::Display,
    {
        self.execute(ctx, &TransactionAttribute::required(), work)
    }
}
