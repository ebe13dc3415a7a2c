use super::Change;
use crate::core::{EntityId, Result, Row, TxError, with_id};
use lazy_static::lazy_static;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

// Registry of named in-memory databases, shared by every data source that
// points at the same name (`memtx:mem:<name>`).
lazy_static! {
    static ref NAMED_STORES: Mutex<HashMap<String, Arc<InMemoryStore>>> =
        Mutex::new(HashMap::new());
}

type Tables = HashMap<String, BTreeMap<EntityId, Row>>;

/// Committed data of one in-memory database
///
/// Only connections write to the store, and only at COMMIT, through
/// [`InMemoryStore::apply`]. Readers without a connection see committed data.
pub struct InMemoryStore {
    name: String,
    tables: RwLock<Tables>,
    /// Id sequence shared by all tables; ids are never reused, even when the
    /// inserting transaction rolls back.
    sequence: AtomicU64,
}

impl InMemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tables: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(1),
        }
    }

    /// Get (or create) the process-wide store registered under `name`
    pub fn named(name: &str) -> Result<Arc<InMemoryStore>> {
        let mut registry = NAMED_STORES.lock()?;
        let store = registry
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryStore::new(name)));
        Ok(Arc::clone(store))
    }

    /// Remove `name` from the registry
    ///
    /// Pools already holding the store keep using it; the next
    /// [`named`](Self::named) call creates a fresh, empty store.
    pub fn drop_named(name: &str) -> Result<bool> {
        let mut registry = NAMED_STORES.lock()?;
        Ok(registry.remove(name).is_some())
    }

    /// Create a store that is not visible through the registry
    pub fn isolated(name: &str) -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::new(name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Allocate the next row id
    pub fn next_id(&self) -> EntityId {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Read a committed row
    pub fn get(&self, table: &str, id: EntityId) -> Result<Option<Row>> {
        let tables = self.tables.read()?;
        Ok(tables.get(table).and_then(|rows| rows.get(&id)).cloned())
    }

    /// Read all committed rows of a table, ordered by id
    pub fn scan(&self, table: &str) -> Result<Vec<(EntityId, Row)>> {
        let tables = self.tables.read()?;
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().map(|(id, row)| (*id, row.clone())).collect())
            .unwrap_or_default())
    }

    /// Number of committed rows in a table
    pub fn count(&self, table: &str) -> Result<usize> {
        let tables = self.tables.read()?;
        Ok(tables.get(table).map(BTreeMap::len).unwrap_or(0))
    }

    /// Names of all tables that ever received a committed row
    pub fn table_names(&self) -> Result<Vec<String>> {
        let tables = self.tables.read()?;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Apply a batch of changes atomically
    ///
    /// Either every change is applied or none is: the touched tables are
    /// staged first and swapped in only when the whole batch validated.
    pub fn apply(&self, changes: &[Change]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write()?;

        let mut staged: HashMap<String, BTreeMap<EntityId, Row>> = HashMap::new();
        for change in changes {
            let table = change.table_name();
            let rows = staged
                .entry(table.to_string())
                .or_insert_with(|| tables.get(table).cloned().unwrap_or_default());

            match change {
                Change::Insert { id, row, .. } => {
                    if rows.contains_key(id) {
                        return Err(TxError::Resource(format!(
                            "duplicate id {} in table '{}'",
                            id, table
                        )));
                    }
                    rows.insert(*id, with_id(row.clone(), *id));
                }
                Change::Update { id, row, .. } => {
                    let Some(slot) = rows.get_mut(id) else {
                        return Err(TxError::EntityNotFound {
                            table: table.to_string(),
                            id: *id,
                        });
                    };
                    *slot = with_id(row.clone(), *id);
                }
                Change::Delete { id, .. } => {
                    if rows.remove(id).is_none() {
                        return Err(TxError::EntityNotFound {
                            table: table.to_string(),
                            id: *id,
                        });
                    }
                }
            }
        }

        for (name, rows) in staged {
            tables.insert(name, rows);
        }
        Ok(())
    }

    /// Remove every table (test helper for shared named stores)
    pub fn clear(&self) -> Result<()> {
        self.tables.write()?.clear();
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("name", &self.name)
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert(table: &str, id: EntityId, row: Row) -> Change {
        Change::Insert {
            table: table.to_string(),
            id,
            row,
        }
    }

    #[test]
    fn test_apply_inserts() {
        let store = InMemoryStore::new("test");
        let id = store.next_id();
        store
            .apply(&[insert("member", id, json!({"username": "a"}))])
            .unwrap();

        let row = store.get("member", id).unwrap().unwrap();
        assert_eq!(row["username"], json!("a"));
        assert_eq!(row["id"], json!(id));
        assert_eq!(store.count("member").unwrap(), 1);
    }

    #[test]
    fn test_apply_is_atomic() {
        let store = InMemoryStore::new("test");
        let id = store.next_id();
        let result = store.apply(&[
            insert("member", id, json!({"username": "a"})),
            Change::Delete {
                table: "member".to_string(),
                id: 999,
            },
        ]);

        assert!(matches!(result, Err(TxError::EntityNotFound { .. })));
        assert_eq!(store.count("member").unwrap(), 0);
    }

    #[test]
    fn test_update_and_delete_in_one_batch() {
        let store = InMemoryStore::new("test");
        let id = store.next_id();
        store
            .apply(&[
                insert("log", id, json!({"message": "v1"})),
                Change::Update {
                    table: "log".to_string(),
                    id,
                    row: json!({"message": "v2"}),
                },
            ])
            .unwrap();
        assert_eq!(store.get("log", id).unwrap().unwrap()["message"], json!("v2"));

        store
            .apply(&[Change::Delete {
                table: "log".to_string(),
                id,
            }])
            .unwrap();
        assert!(store.get("log", id).unwrap().is_none());
    }

    #[test]
    fn test_named_store_is_shared() {
        let a = InMemoryStore::named("memory_test_shared").unwrap();
        let b = InMemoryStore::named("memory_test_shared").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let isolated = InMemoryStore::isolated("memory_test_shared");
        assert!(!Arc::ptr_eq(&a, &isolated));
    }

    #[test]
    fn test_drop_named_forgets_store() {
        let first = InMemoryStore::named("memory_test_dropped").unwrap();
        first
            .apply(&[insert("member", 1, json!({"username": "kept"}))])
            .unwrap();

        assert!(InMemoryStore::drop_named("memory_test_dropped").unwrap());
        assert!(!InMemoryStore::drop_named("memory_test_dropped").unwrap());

        let second = InMemoryStore::named("memory_test_dropped").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.count("member").unwrap(), 0);
        assert_eq!(first.count("member").unwrap(), 1);
    }

    #[test]
    fn test_sequence_never_reuses_ids() {
        let store = InMemoryStore::new("test");
        let first = store.next_id();
        let second = store.next_id();
        assert!(second > first);
    }
}
