// ============================================================================
// Buffered Changes
// ============================================================================
//
// A connection records every write of the running physical transaction as a
// Change. COMMIT applies the buffer to the store in one step, ROLLBACK and
// ROLLBACK TO SAVEPOINT discard (a suffix of) it.
//
// ============================================================================

use crate::core::{EntityId, Row};

/// A single buffered write inside a physical transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert a new row under a freshly allocated id
    Insert {
        table: String,
        id: EntityId,
        row: Row,
    },

    /// Replace the row stored under `id`
    Update {
        table: String,
        id: EntityId,
        row: Row,
    },

    /// Remove the row stored under `id`
    Delete { table: String, id: EntityId },
}

impl Change {
    /// Get the table name affected by this change
    pub fn table_name(&self) -> &str {
        match self {
            Change::Insert { table, .. } => table,
            Change::Update { table, .. } => table,
            Change::Delete { table, .. } => table,
        }
    }

    /// Get the row id affected by this change
    pub fn entity_id(&self) -> EntityId {
        match self {
            Change::Insert { id, .. } | Change::Update { id, .. } | Change::Delete { id, .. } => {
                *id
            }
        }
    }

    /// Whether this change touches the given row
    pub fn affects(&self, table: &str, id: EntityId) -> bool {
        self.table_name() == table && self.entity_id() == id
    }

    /// The row value this change leaves behind (`None` once deleted)
    pub fn resulting_row(&self) -> Option<Row> {
        match self {
            Change::Insert { row, .. } | Change::Update { row, .. } => Some(row.clone()),
            Change::Delete { .. } => None,
        }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Insert { table, id, .. } => write!(f, "INSERT {}#{}", table, id),
            Change::Update { table, id, .. } => write!(f, "UPDATE {}#{}", table, id),
            Change::Delete { table, id } => write!(f, "DELETE {}#{}", table, id),
        }
    }
}
