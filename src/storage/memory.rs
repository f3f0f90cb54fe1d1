use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::Record;

type Table = BTreeMap<String, Record>;

/// A buffered, uncommitted mutation.
#[derive(Debug, Clone)]
pub enum Change {
    Put {
        table: String,
        key: String,
        record: Record,
    },
    Delete {
        table: String,
        key: String,
    },
}

/// Committed state shared by every session of one driver.
///
/// Sessions never mutate this directly; write transactions buffer `Change`s
/// and apply them here as one batch on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn get(&self, table: &str, key: &str) -> Option<Record> {
        let tables = self.tables.read().await;
        tables.get(table).and_then(|rows| rows.get(key).cloned())
    }

    pub(crate) async fn contains(&self, table: &str, key: &str) -> bool {
        let tables = self.tables.read().await;
        tables.get(table).is_some_and(|rows| rows.contains_key(key))
    }

    pub(crate) async fn scan(&self, table: &str) -> Vec<(String, Record)> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(key, record)| (key.clone(), record.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Applies a batch of buffered changes atomically.
    pub(crate) async fn apply(&self, changes: Vec<Change>) {
        let mut tables = self.tables.write().await;
        for change in changes {
            match change {
                Change::Put { table, key, record } => {
                    tables.entry(table).or_default().insert(key, record);
                }
                Change::Delete { table, key } => {
                    if let Some(rows) = tables.get_mut(&table) {
                        rows.remove(&key);
                    }
                }
            }
        }
    }
}
