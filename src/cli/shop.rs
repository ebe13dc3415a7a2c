use memtx::{
    ClassifiedFailure, EntityId, FailureKind, InvocationError, Repository, TransactionAttribute,
    TransactionContext, TransactionManager, TransactionTemplate, TxError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const NOT_ENOUGH_MONEY: FailureKind =
    FailureKind::extends("NotEnoughMoneyException", &FailureKind::CHECKED);

pub const SYSTEM_FAILURE_USER: &str = "exception";
pub const NOT_ENOUGH_MONEY_USER: &str = "insufficient";
pub const LOG_FAILURE_MARKER: &str = "logException";

#[derive(Debug, Error)]
pub enum ShopError {
    #[error("not enough money")]
    NotEnoughMoney,

    #[error("system failure: {0}")]
    System(String),

    #[error("log write failed: {0}")]
    LogWrite(String),

    #[error(transparent)]
    Tx(#[from] TxError),
}

impl ClassifiedFailure for ShopError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            ShopError::NotEnoughMoney => NOT_ENOUGH_MONEY,
            ShopError::System(_) | ShopError::LogWrite(_) => FailureKind::UNCHECKED,
            ShopError::Tx(err) => err.failure_kind(),
        }
    }
}

impl From<InvocationError<ShopError>> for ShopError {
    fn from(err: InvocationError<ShopError>) -> Self {
        match err {
            InvocationError::Failure(failure) => failure,
            InvocationError::Transaction { error, .. } => ShopError::Tx(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub id: Option<EntityId>,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    #[serde(default)]
    pub id: Option<EntityId>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: Option<EntityId>,
    pub username: String,
    pub pay_status: Option<String>,
}

pub fn members(manager: &TransactionManager) -> Repository<Member> {
    Repository::new("member", manager.pool().store().clone())
}

pub fn logs(manager: &TransactionManager) -> Repository<Log> {
    Repository::new("log", manager.pool().store().clone())
}

pub fn orders(manager: &TransactionManager) -> Repository<Order> {
    Repository::new("orders", manager.pool().store().clone())
}

pub fn member(username: &str) -> Member {
    Member {
        id: None,
        username: username.to_string(),
    }
}

/// Save an order and run the payment selected by `username`
pub fn place_order(
    manager: &TransactionManager,
    ctx: &mut TransactionContext,
    username: &str,
) -> Result<EntityId, InvocationError<ShopError>> {
    let orders = orders(manager);
    let attribute = TransactionAttribute::required().name("order");

    TransactionTemplate::new(manager).execute(ctx, &attribute, |ctx| -> Result<EntityId, ShopError> {
        let mut order = Order {
            id: None,
            username: username.to_string(),
            pay_status: None,
        };
        let id = orders.save(ctx, &order)?;

        match username {
            SYSTEM_FAILURE_USER => {
                info!("system failure during payment");
                Err(ShopError::System("payment gateway down".to_string()))
            }
            NOT_ENOUGH_MONEY_USER => {
                info!("insufficient balance, order left waiting");
                order.pay_status = Some("waiting".to_string());
                orders.update(ctx, id, &order)?;
                Err(ShopError::NotEnoughMoney)
            }
            _ => {
                order.pay_status = Some("complete".to_string());
                orders.update(ctx, id, &order)?;
                Ok(id)
            }
        }
    })
}

/// Register a member inside a REQUIRED transaction, swallowing a failed log
/// write issued with `log_attribute`
pub fn join_recovering(
    manager: &TransactionManager,
    ctx: &mut TransactionContext,
    username: &str,
    log_attribute: &TransactionAttribute,
) -> Result<(), ShopError> {
    let template = TransactionTemplate::new(manager);
    let members = members(manager);
    let logs = logs(manager);
    let outer = TransactionAttribute::required().name("join");

    template.execute(ctx, &outer, |ctx| -> Result<(), ShopError> {
        members.save(ctx, &member(username))?;

        let logged = template.execute(ctx, log_attribute, |ctx| -> Result<EntityId, ShopError> {
            let id = logs.save(
                ctx,
                &Log {
                    id: None,
                    message: username.to_string(),
                },
            )?;
            if username.contains(LOG_FAILURE_MARKER) {
                return Err(ShopError::LogWrite(username.to_string()));
            }
            Ok(id)
        });

        if let Err(err) = logged {
            info!(error = %err, "log write failed, returning to normal flow");
        }
        Ok(())
    })?;
    Ok(())
}
