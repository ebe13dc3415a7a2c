use crate::core::{EntityId, Result, Row, TxError, field};
use crate::storage::InMemoryStore;
use crate::transaction::TransactionContext;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed access to one table through the connection bound to a context
///
/// Entities are stored as JSON rows; the allocated id is added under the
/// `id` field. Writes need a bound transaction. Reads use the bound
/// connection when there is one and committed data otherwise.
pub struct Repository<T> {
    table: String,
    store: Arc<InMemoryStore>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(table: &str, store: Arc<InMemoryStore>) -> Self {
        Self {
            table: table.to_string(),
            store,
            _entity: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn save(&self, ctx: &mut TransactionContext, entity: &T) -> Result<EntityId> {
        let row = serde_json::to_value(entity)?;
        self.bound(ctx, "save")?.insert(&self.table, row)
    }

    pub fn update(&self, ctx: &mut TransactionContext, id: EntityId, entity: &T) -> Result<()> {
        let row = serde_json::to_value(entity)?;
        self.bound(ctx, "update")?.update(&self.table, id, row)
    }

    pub fn delete(&self, ctx: &mut TransactionContext, id: EntityId) -> Result<()> {
        self.bound(ctx, "delete")?.delete(&self.table, id)
    }

    pub fn find(&self, ctx: &TransactionContext, id: EntityId) -> Result<Option<T>> {
        let row = match ctx.connection() {
            Some(connection) => connection.find(&self.table, id)?,
            None => self.store.get(&self.table, id)?,
        };
        row.map(decode).transpose()
    }

    /// Entities whose `name` field equals `value`, ordered by id
    pub fn find_by(
        &self,
        ctx: &TransactionContext,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<T>> {
        let value = value.into();
        self.rows(ctx)?
            .into_iter()
            .filter(|row| field(row, name) == Some(&value))
            .map(decode)
            .collect()
    }

    pub fn find_all(&self, ctx: &TransactionContext) -> Result<Vec<T>> {
        self.rows(ctx)?.into_iter().map(decode).collect()
    }

    pub fn count(&self, ctx: &TransactionContext) -> Result<usize> {
        Ok(self.rows(ctx)?.len())
    }

    fn rows(&self, ctx: &TransactionContext) -> Result<Vec<Row>> {
        match ctx.connection() {
            Some(connection) => connection.scan(&self.table),
            None => Ok(self
                .store
                .scan(&self.table)?
                .into_iter()
                .map(|(_, row)| row)
                .collect()),
        }
    }

    fn bound<'c>(
        &self,
        ctx: &'c mut TransactionContext,
        action: &str,
    ) -> Result<&'c mut crate::connection::Connection> {
        ctx.connection_mut().ok_or_else(|| {
            TxError::NoTransaction(format!(
                "cannot {} into '{}' without an active transaction",
                action, self.table
            ))
        })
    }
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            store: self.store.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.table)
            .field("database", &self.store.name())
            .finish()
    }
}

fn decode<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(row)?)
}
