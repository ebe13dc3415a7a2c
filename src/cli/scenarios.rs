use super::shop::{self, LOG_FAILURE_MARKER, NOT_ENOUGH_MONEY_USER, SYSTEM_FAILURE_USER};
use anyhow::{Context, Result};
use clap::ValueEnum;
use memtx::{
    ConnectionPool, DataSourceConfig, MetricsSnapshot, TransactionAttribute,
    TransactionDefinition, TransactionManager,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// One transaction, committed
    Commit,
    /// One transaction, rolled back
    Rollback,
    /// REQUIRED inside REQUIRED, both committed
    InnerCommit,
    /// Inner participant committed, outer rolled back
    OuterRollback,
    /// Inner participant rolled back, outer asks to commit
    InnerRollback,
    /// REQUIRES_NEW inner rolled back, outer committed
    RequiresNew,
    /// NESTED savepoint rolled back, outer committed
    Nested,
    /// Order paid normally
    OrderComplete,
    /// Order hit by a system failure
    OrderSystemFailure,
    /// Order hit by a business failure
    OrderBusinessFailure,
    /// Member join recovering from a failed log write
    MemberRecover,
}

impl Scenario {
    pub fn all() -> &'static [Scenario] {
        Scenario::value_variants()
    }

    pub fn name(&self) -> String {
        self.to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_else(|| format!("{:?}", self))
    }
}

/// What a scenario left behind
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub outcome: String,
    pub rows: BTreeMap<String, usize>,
    pub metrics: MetricsSnapshot,
}

impl std::fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "== {} ==", self.scenario.name())?;
        writeln!(f, "outcome: {}", self.outcome)?;
        if self.rows.is_empty() {
            writeln!(f, "rows:    (none)")?;
        }
        for (table, count) in &self.rows {
            writeln!(f, "rows:    {} = {}", table, count)?;
        }
        write!(f, "metrics: {}", self.metrics)
    }
}

pub fn run(scenario: Scenario) -> Result<ScenarioReport> {
    let config = DataSourceConfig::new(&format!("demo-{}", scenario.name())).max_connections(4);
    let pool = ConnectionPool::new_isolated(config).context("creating connection pool")?;
    let manager = TransactionManager::new(Arc::new(pool));

    let outcome = match scenario {
        Scenario::Commit => commit(&manager),
        Scenario::Rollback => rollback(&manager),
        Scenario::InnerCommit => inner_commit(&manager),
        Scenario::OuterRollback => outer_rollback(&manager),
        Scenario::InnerRollback => inner_rollback(&manager),
        Scenario::RequiresNew => requires_new(&manager),
        Scenario::Nested => nested(&manager),
        Scenario::OrderComplete => order(&manager, "regular"),
        Scenario::OrderSystemFailure => order(&manager, SYSTEM_FAILURE_USER),
        Scenario::OrderBusinessFailure => order(&manager, NOT_ENOUGH_MONEY_USER),
        Scenario::MemberRecover => member_recover(&manager),
    }
    .with_context(|| format!("scenario '{}'", scenario.name()))?;

    let store = manager.pool().store();
    let mut rows = BTreeMap::new();
    for table in store.table_names()? {
        let count = store.count(&table)?;
        rows.insert(table, count);
    }

    Ok(ScenarioReport {
        scenario,
        outcome,
        rows,
        metrics: manager.metrics(),
    })
}

fn commit(manager: &TransactionManager) -> Result<String> {
    let members = shop::members(manager);
    let mut ctx = manager.context();

    let mut status = manager.begin(&mut ctx, &TransactionDefinition::required())?;
    members.save(&mut ctx, &shop::member("commit"))?;
    manager.commit(&mut ctx, &mut status)?;
    Ok("committed".to_string())
}

fn rollback(manager: &TransactionManager) -> Result<String> {
    let members = shop::members(manager);
    let mut ctx = manager.context();

    let mut status = manager.begin(&mut ctx, &TransactionDefinition::required())?;
    members.save(&mut ctx, &shop::member("rollback"))?;
    manager.rollback(&mut ctx, &mut status)?;
    Ok("rolled back".to_string())
}

fn inner_commit(manager: &TransactionManager) -> Result<String> {
    let members = shop::members(manager);
    let mut ctx = manager.context();

    let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required())?;
    let mut inner = manager.begin(&mut ctx, &TransactionDefinition::required())?;
    members.save(&mut ctx, &shop::member("inner"))?;
    manager.commit(&mut ctx, &mut inner)?;
    let deferred = manager.metrics().commits == 0;
    manager.commit(&mut ctx, &mut outer)?;
    Ok(format!(
        "outer committed (inner commit deferred to outer: {})",
        deferred
    ))
}

fn outer_rollback(manager: &TransactionManager) -> Result<String> {
    let members = shop::members(manager);
    let mut ctx = manager.context();

    let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required())?;
    members.save(&mut ctx, &shop::member("outer"))?;
    let mut inner = manager.begin(&mut ctx, &TransactionDefinition::required())?;
    members.save(&mut ctx, &shop::member("inner"))?;
    manager.commit(&mut ctx, &mut inner)?;
    manager.rollback(&mut ctx, &mut outer)?;
    Ok("outer rolled back, inner work discarded with it".to_string())
}

fn inner_rollback(manager: &TransactionManager) -> Result<String> {
    let members = shop::members(manager);
    let mut ctx = manager.context();

    let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required())?;
    members.save(&mut ctx, &shop::member("outer"))?;
    let mut inner = manager.begin(&mut ctx, &TransactionDefinition::required())?;
    members.save(&mut ctx, &shop::member("inner"))?;
    manager.rollback(&mut ctx, &mut inner)?;

    Ok(match manager.commit(&mut ctx, &mut outer) {
        Ok(()) => "outer committed".to_string(),
        Err(err) => format!("outer commit failed: {}", err),
    })
}

fn requires_new(manager: &TransactionManager) -> Result<String> {
    let members = shop::members(manager);
    let mut ctx = manager.context();

    let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required())?;
    members.save(&mut ctx, &shop::member("outer"))?;
    let mut inner = manager.begin(&mut ctx, &TransactionDefinition::requires_new())?;
    members.save(&mut ctx, &shop::member("inner"))?;
    manager.rollback(&mut ctx, &mut inner)?;
    manager.commit(&mut ctx, &mut outer)?;
    Ok("inner rolled back on its own connection, outer committed".to_string())
}

fn nested(manager: &TransactionManager) -> Result<String> {
    let members = shop::members(manager);
    let mut ctx = manager.context();

    let mut outer = manager.begin(&mut ctx, &TransactionDefinition::required())?;
    members.save(&mut ctx, &shop::member("outer"))?;
    let mut inner = manager.begin(&mut ctx, &TransactionDefinition::nested())?;
    members.save(&mut ctx, &shop::member("nested"))?;
    manager.rollback(&mut ctx, &mut inner)?;
    manager.commit(&mut ctx, &mut outer)?;
    Ok("rolled back to savepoint, outer committed".to_string())
}

fn order(manager: &TransactionManager, username: &str) -> Result<String> {
    let mut ctx = manager.context();

    let outcome = match shop::place_order(manager, &mut ctx, username) {
        Ok(id) => format!("order {} completed", id),
        Err(err) => format!("order failed: {}", err),
    };

    let status = shop::orders(manager)
        .find_by(&ctx, "username", username)?
        .into_iter()
        .next()
        .and_then(|order| order.pay_status);
    Ok(format!(
        "{} (stored pay status: {})",
        outcome,
        status.as_deref().unwrap_or("none")
    ))
}

fn member_recover(manager: &TransactionManager) -> Result<String> {
    let mut ctx = manager.context();

    let joined_required = shop::join_recovering(
        manager,
        &mut ctx,
        &format!("required_{}", LOG_FAILURE_MARKER),
        &TransactionAttribute::required(),
    );
    let joined_requires_new = shop::join_recovering(
        manager,
        &mut ctx,
        &format!("requires_new_{}", LOG_FAILURE_MARKER),
        &TransactionAttribute::requires_new(),
    );

    let describe = |result: std::result::Result<(), shop::ShopError>| match result {
        Ok(()) => "joined".to_string(),
        Err(err) => format!("failed ({})", err),
    };
    Ok(format!(
        "log REQUIRED: {}; log REQUIRES_NEW: {}",
        describe(joined_required),
        describe(joined_requires_new)
    ))
}
