//! In-memory row storage with secondary indexes.
//!
//! The engine only talks to storage through [`RowStore`]: full iteration,
//! equi-lookup on an index by a column-ordered key, and row mutation. Index
//! keys are kept in column order, so a lookup may use any leading prefix of
//! an index's columns.

use crate::access::Value;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a row within one table's store
pub type RowId = u64;

/// A stored row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: RowId,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(id: RowId, values: Vec<Value>) -> Self {
        Self { id, values }
    }

    /// Project the given columns, in order
    pub fn key(&self, columns: &[usize]) -> Vec<Value> {
        columns.iter().map(|&c| self.values[c].clone()).collect()
    }
}

/// Forward-only iterator over a snapshot of rows
pub struct RowIterator {
    rows: std::vec::IntoIter<Row>,
}

impl RowIterator {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for RowIterator {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }
}

/// Storage contract consumed by tables and constraints
pub trait RowStore: Send + Sync {
    /// Iterate all rows; restartable per call
    fn row_iterator(&self) -> RowIterator;

    /// Rows whose leading index columns equal `key`
    fn find_first_row(&self, index: usize, key: &[Value]) -> RowIterator;

    fn get(&self, id: RowId) -> Option<Row>;

    fn insert(&self, values: Vec<Value>) -> RowId;

    /// Put back a row under its original id (statement undo)
    fn restore(&self, row: Row);

    fn delete(&self, id: RowId) -> Option<Row>;

    /// Replace a row's values, returning the previous row
    fn update(&self, id: RowId, values: Vec<Value>) -> Option<Row>;

    /// Register an index over `columns` and populate it; returns its position
    fn add_index(&self, columns: Vec<usize>) -> usize;

    fn row_count(&self) -> usize;
}

struct IndexData {
    columns: Vec<usize>,
    entries: BTreeMap<Vec<Value>, BTreeSet<RowId>>,
}

impl IndexData {
    fn key_of(&self, values: &[Value]) -> Vec<Value> {
        self.columns.iter().map(|&c| values[c].clone()).collect()
    }

    fn add(&mut self, id: RowId, values: &[Value]) {
        let key = self.key_of(values);
        self.entries.entry(key).or_default().insert(id);
    }

    fn remove(&mut self, id: RowId, values: &[Value]) {
        let key = self.key_of(values);
        if let Some(ids) = self.entries.get_mut(&key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    fn lookup(&self, prefix: &[Value]) -> Vec<RowId> {
        let start = Bound::Included(prefix.to_vec());
        self.entries
            .range((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }
}

struct StoreState {
    rows: BTreeMap<RowId, Vec<Value>>,
    indexes: Vec<IndexData>,
}

/// Row store backed by ordered maps
pub struct MemoryRowStore {
    state: RwLock<StoreState>,
    next_row_id: AtomicU64,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                rows: BTreeMap::new(),
                indexes: Vec::new(),
            }),
            next_row_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryRowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RowStore for MemoryRowStore {
    fn row_iterator(&self) -> RowIterator {
        let state = self.state.read();
        RowIterator::new(
            state
                .rows
                .iter()
                .map(|(id, values)| Row::new(*id, values.clone()))
                .collect(),
        )
    }

    fn find_first_row(&self, index: usize, key: &[Value]) -> RowIterator {
        let state = self.state.read();
        let Some(index) = state.indexes.get(index) else {
            return RowIterator::empty();
        };
        let rows = index
            .lookup(key)
            .into_iter()
            .filter_map(|id| state.rows.get(&id).map(|v| Row::new(id, v.clone())))
            .collect();
        RowIterator::new(rows)
    }

    fn get(&self, id: RowId) -> Option<Row> {
        self.state
            .read()
            .rows
            .get(&id)
            .map(|values| Row::new(id, values.clone()))
    }

    fn insert(&self, values: Vec<Value>) -> RowId {
        let id = self.next_row_id.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write();
        for index in state.indexes.iter_mut() {
            index.add(id, &values);
        }
        state.rows.insert(id, values);
        id
    }

    fn restore(&self, row: Row) {
        let mut state = self.state.write();
        for index in state.indexes.iter_mut() {
            index.add(row.id, &row.values);
        }
        state.rows.insert(row.id, row.values);
        self.next_row_id.fetch_max(row.id + 1, Ordering::SeqCst);
    }

    fn delete(&self, id: RowId) -> Option<Row> {
        let mut state = self.state.write();
        let values = state.rows.remove(&id)?;
        for index in state.indexes.iter_mut() {
            index.remove(id, &values);
        }
        Some(Row::new(id, values))
    }

    fn update(&self, id: RowId, values: Vec<Value>) -> Option<Row> {
        let mut state = self.state.write();
        let old = state.rows.get(&id)?.clone();
        for index in state.indexes.iter_mut() {
            index.remove(id, &old);
            index.add(id, &values);
        }
        state.rows.insert(id, values);
        Some(Row::new(id, old))
    }

    fn add_index(&self, columns: Vec<usize>) -> usize {
        let mut state = self.state.write();
        let mut index = IndexData {
            columns,
            entries: BTreeMap::new(),
        };
        for (id, values) in state.rows.iter() {
            index.add(*id, values);
        }
        state.indexes.push(index);
        state.indexes.len() - 1
    }

    fn row_count(&self) -> usize {
        self.state.read().rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(a: i32, b: &str) -> Vec<Value> {
        vec![Value::Int32(a), Value::String(b.to_string())]
    }

    #[test]
    fn test_insert_and_iterate() {
        let store = MemoryRowStore::new();
        let id1 = store.insert(row(1, "a"));
        let id2 = store.insert(row(2, "b"));
        assert_ne!(id1, id2);

        let rows: Vec<Row> = store.row_iterator().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values, row(1, "a"));
        assert_eq!(store.row_count(), 2);
    }

    #[test]
    fn test_index_lookup_by_prefix() {
        let store = MemoryRowStore::new();
        store.insert(row(1, "a"));
        store.insert(row(1, "b"));
        store.insert(row(2, "a"));
        let index = store.add_index(vec![0, 1]);

        let hits: Vec<Row> = store.find_first_row(index, &[Value::Int32(1)]).collect();
        assert_eq!(hits.len(), 2);

        let hits: Vec<Row> = store
            .find_first_row(index, &[Value::Int32(2), Value::String("a".to_string())])
            .collect();
        assert_eq!(hits.len(), 1);

        let hits: Vec<Row> = store.find_first_row(index, &[Value::Int32(3)]).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_update_and_delete_maintain_indexes() {
        let store = MemoryRowStore::new();
        let index = store.add_index(vec![0]);
        let id = store.insert(row(1, "a"));

        let old = store.update(id, row(5, "a")).unwrap();
        assert_eq!(old.values, row(1, "a"));
        assert_eq!(store.find_first_row(index, &[Value::Int32(1)]).count(), 0);
        assert_eq!(store.find_first_row(index, &[Value::Int32(5)]).count(), 1);

        let deleted = store.delete(id).unwrap();
        assert_eq!(store.find_first_row(index, &[Value::Int32(5)]).count(), 0);

        store.restore(deleted);
        assert_eq!(store.find_first_row(index, &[Value::Int32(5)]).count(), 1);
        assert_eq!(store.get(id).unwrap().values, row(5, "a"));
    }
}
