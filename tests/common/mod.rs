#![allow(dead_code)]

use memtx::{
    ClassifiedFailure, ConnectionPool, DataSourceConfig, EntityId, FailureKind, InvocationError,
    Repository, TransactionAttribute, TransactionContext, TransactionManager, TransactionTemplate,
    TxError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const NOT_ENOUGH_MONEY: FailureKind =
    FailureKind::extends("NotEnoughMoneyException", &FailureKind::CHECKED);

pub const LOG_WRITE_FAILURE: FailureKind =
    FailureKind::extends("LogWriteFailure", &FailureKind::UNCHECKED);

/// Username that makes the order service raise a system failure
pub const SYSTEM_FAILURE_USER: &str = "exception";

/// Username that makes the order service raise a business failure
pub const NOT_ENOUGH_MONEY_USER: &str = "insufficient";

/// Log messages containing this marker fail to persist
pub const LOG_FAILURE_MARKER: &str = "logException";

pub const PAY_COMPLETE: &str = "complete";
pub const PAY_WAITING: &str = "waiting";

/// Manager over a private store so tests do not see each other's rows
pub fn manager(database: &str) -> TransactionManager {
    let config = DataSourceConfig::new(database)
        .max_connections(4)
        .connect_timeout(std::time::Duration::from_millis(200));
    let pool = ConnectionPool::new_isolated(config).expect("pool");
    TransactionManager::new(Arc::new(pool))
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not enough money")]
    NotEnoughMoney,

    #[error("system failure: {0}")]
    System(String),

    #[error("log write failed: {0}")]
    LogWrite(String),

    #[error(transparent)]
    Tx(#[from] TxError),
}

impl ClassifiedFailure for ServiceError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            ServiceError::NotEnoughMoney => NOT_ENOUGH_MONEY,
            ServiceError::System(_) => FailureKind::UNCHECKED,
            ServiceError::LogWrite(_) => LOG_WRITE_FAILURE,
            ServiceError::Tx(err) => err.failure_kind(),
        }
    }
}

impl From<InvocationError<ServiceError>> for ServiceError {
    fn from(err: InvocationError<ServiceError>) -> Self {
        match err {
            InvocationError::Failure(failure) => failure,
            InvocationError::Transaction { error, .. } => ServiceError::Tx(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub id: Option<EntityId>,
    pub username: String,
}

impl Member {
    pub fn new(username: &str) -> Self {
        Self {
            id: None,
            username: username.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    #[serde(default)]
    pub id: Option<EntityId>,
    pub message: String,
}

impl Log {
    pub fn new(message: &str) -> Self {
        Self {
            id: None,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: Option<EntityId>,
    pub username: String,
    pub pay_status: Option<String>,
}

impl Order {
    pub fn new(username: &str) -> Self {
        Self {
            id: None,
            username: username.to_string(),
            pay_status: None,
        }
    }
}

/// Runs `work` through the template when an attribute is configured and
/// directly otherwise
fn run<T, F>(
    template: &TransactionTemplate<'_>,
    attribute: Option<&TransactionAttribute>,
    ctx: &mut TransactionContext,
    work: F,
) -> Result<T, ServiceError>
where
    F: FnOnce(&mut TransactionContext) -> Result<T, ServiceError>,
{
    match attribute {
        Some(attribute) => Ok(template.execute(ctx, attribute, work)?),
        None => work(ctx),
    }
}

pub struct MemberRepository<'a> {
    template: TransactionTemplate<'a>,
    attribute: Option<TransactionAttribute>,
    members: Repository<Member>,
}

impl<'a> MemberRepository<'a> {
    pub fn new(manager: &'a TransactionManager) -> Self {
        Self {
            template: TransactionTemplate::new(manager),
            attribute: Some(TransactionAttribute::required().name("MemberRepository.save")),
            members: Repository::new("member", manager.pool().store().clone()),
        }
    }

    pub fn without_transaction(mut self) -> Self {
        self.attribute = None;
        self
    }

    pub fn save(&self, ctx: &mut TransactionContext, member: &Member) -> Result<EntityId, ServiceError> {
        run(&self.template, self.attribute.as_ref(), ctx, |ctx| {
            Ok(self.members.save(ctx, member)?)
        })
    }

    pub fn find(&self, ctx: &TransactionContext, username: &str) -> Option<Member> {
        self.members
            .find_by(ctx, "username", username)
            .expect("member lookup")
            .into_iter()
            .next()
    }
}

pub struct LogRepository<'a> {
    template: TransactionTemplate<'a>,
    attribute: Option<TransactionAttribute>,
    logs: Repository<Log>,
}

impl<'a> LogRepository<'a> {
    pub fn new(manager: &'a TransactionManager) -> Self {
        Self {
            template: TransactionTemplate::new(manager),
            attribute: Some(TransactionAttribute::required().name("LogRepository.save")),
            logs: Repository::new("log", manager.pool().store().clone()),
        }
    }

    pub fn requires_new(mut self) -> Self {
        self.attribute = Some(TransactionAttribute::requires_new().name("LogRepository.save"));
        self
    }

    pub fn without_transaction(mut self) -> Self {
        self.attribute = None;
        self
    }

    pub fn save(&self, ctx: &mut TransactionContext, log: &Log) -> Result<EntityId, ServiceError> {
        run(&self.template, self.attribute.as_ref(), ctx, |ctx| {
            let id = self.logs.save(ctx, log)?;
            if log.message.contains(LOG_FAILURE_MARKER) {
                return Err(ServiceError::LogWrite(log.message.clone()));
            }
            Ok(id)
        })
    }

    pub fn find(&self, ctx: &TransactionContext, message: &str) -> Option<Log> {
        self.logs
            .find_by(ctx, "message", message)
            .expect("log lookup")
            .into_iter()
            .next()
    }
}

/// Registers a member and writes a log entry for it
pub struct MemberService<'a> {
    template: TransactionTemplate<'a>,
    attribute: Option<TransactionAttribute>,
    pub members: MemberRepository<'a>,
    pub logs: LogRepository<'a>,
}

impl<'a> MemberService<'a> {
    pub fn new(
        manager: &'a TransactionManager,
        members: MemberRepository<'a>,
        logs: LogRepository<'a>,
    ) -> Self {
        Self {
            template: TransactionTemplate::new(manager),
            attribute: None,
            members,
            logs,
        }
    }

    /// Wrap the whole join in a REQUIRED transaction
    pub fn transactional(mut self) -> Self {
        self.attribute = Some(TransactionAttribute::required().name("MemberService.join"));
        self
    }

    pub fn join_v1(&self, ctx: &mut TransactionContext, username: &str) -> Result<(), ServiceError> {
        run(&self.template, self.attribute.as_ref(), ctx, |ctx| {
            self.members.save(ctx, &Member::new(username))?;
            self.logs.save(ctx, &Log::new(username))?;
            Ok(())
        })
    }

    /// Like `join_v1`, but a failed log write is swallowed
    pub fn join_v2(&self, ctx: &mut TransactionContext, username: &str) -> Result<(), ServiceError> {
        run(&self.template, self.attribute.as_ref(), ctx, |ctx| {
            self.members.save(ctx, &Member::new(username))?;
            if let Err(err) = self.logs.save(ctx, &Log::new(username)) {
                tracing::info!(error = %err, "log write failed, continuing");
            }
            Ok(())
        })
    }
}

/// Places orders; the username selects the payment outcome
pub struct OrderService<'a> {
    template: TransactionTemplate<'a>,
    attribute: TransactionAttribute,
    orders: Repository<Order>,
}

impl<'a> OrderService<'a> {
    pub fn new(manager: &'a TransactionManager) -> Self {
        Self {
            template: TransactionTemplate::new(manager),
            attribute: TransactionAttribute::required().name("OrderService.order"),
            orders: Repository::new("orders", manager.pool().store().clone()),
        }
    }

    pub fn with_attribute(mut self, attribute: TransactionAttribute) -> Self {
        self.attribute = attribute;
        self
    }

    pub fn order(
        &self,
        ctx: &mut TransactionContext,
        username: &str,
    ) -> Result<EntityId, InvocationError<ServiceError>> {
        self.template
            .execute(ctx, &self.attribute, |ctx| -> Result<EntityId, ServiceError> {
                let mut order = Order::new(username);
                let id = self.orders.save(ctx, &order)?;

                match username {
                    SYSTEM_FAILURE_USER => Err(ServiceError::System("system exception".to_string())),
                    NOT_ENOUGH_MONEY_USER => {
                        order.pay_status = Some(PAY_WAITING.to_string());
                        self.orders.update(ctx, id, &order)?;
                        Err(ServiceError::NotEnoughMoney)
                    }
                    _ => {
                        order.pay_status = Some(PAY_COMPLETE.to_string());
                        self.orders.update(ctx, id, &order)?;
                        Ok(id)
                    }
                }
            })
    }

    pub fn find(&self, ctx: &TransactionContext, username: &str) -> Option<Order> {
        self.orders
            .find_by(ctx, "username", username)
            .expect("order lookup")
            .into_iter()
            .next()
    }
}
