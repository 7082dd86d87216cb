//! Table metadata plus the row store that holds its data.

use crate::access::{format_key, DataType, MemoryRowStore, Row, RowId, RowIterator, RowStore, Value};
use crate::catalog::{ColumnInfo, IndexInfo};
use crate::constraint::{Constraint, ConstraintType};
use crate::error::{SqlError, SqlResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

/// A base table: column layout, indexes, constraints and rows.
///
/// The column layout is fixed for the lifetime of the object. Structural
/// changes build a new `Table` and swap it into the catalog.
pub struct Table {
    table_id: TableId,
    table_name: String,
    columns: Vec<ColumnInfo>,
    indexes: RwLock<Vec<IndexInfo>>,
    constraints: RwLock<Vec<Constraint>>,
    store: Box<dyn RowStore>,
    identity_sequence: AtomicI64,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("table_id", &self.table_id)
            .field("table_name", &self.table_name)
            .field("columns", &self.columns)
            .finish()
    }
}

impl Table {
    pub fn new(table_id: TableId, table_name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            table_id,
            table_name: table_name.into(),
            columns,
            indexes: RwLock::new(Vec::new()),
            constraints: RwLock::new(Vec::new()),
            store: Box::new(MemoryRowStore::new()),
            identity_sequence: AtomicI64::new(1),
        }
    }

    pub fn id(&self) -> TableId {
        self.table_id
    }

    pub fn name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> &ColumnInfo {
        &self.columns[index]
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.column_name.clone()).collect()
    }

    pub fn column_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.column_type.clone()).collect()
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.column_name == name)
    }

    /// Resolve column names to positions, failing on the first unknown name
    pub fn column_indexes(&self, names: &[String]) -> SqlResult<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.find_column(name).ok_or_else(|| {
                    SqlError::UnresolvedColumn(vec![format!("{}.{}", self.table_name, name)])
                })
            })
            .collect()
    }

    pub fn next_identity(&self) -> i64 {
        self.identity_sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Keep the identity sequence ahead of explicitly supplied values
    pub fn observe_identity(&self, value: i64) {
        self.identity_sequence.fetch_max(value + 1, Ordering::SeqCst);
    }

    pub fn identity_position(&self) -> i64 {
        self.identity_sequence.load(Ordering::SeqCst)
    }

    // Indexes

    pub fn add_index(
        &self,
        index_name: impl Into<String>,
        key_columns: Vec<usize>,
        is_unique: bool,
    ) -> IndexInfo {
        let position = self.store.add_index(key_columns.clone());
        let info = IndexInfo {
            index_name: index_name.into(),
            key_columns,
            is_unique,
            position,
        };
        self.indexes.write().push(info.clone());
        info
    }

    /// Stop using an index. Its entries stay in the row store but it no
    /// longer takes part in lookups or unique checks.
    pub fn remove_index(&self, name: &str) -> Option<IndexInfo> {
        let mut indexes = self.indexes.write();
        let position = indexes.iter().position(|i| i.index_name == name)?;
        Some(indexes.remove(position))
    }

    pub fn indexes(&self) -> Vec<IndexInfo> {
        self.indexes.read().clone()
    }

    pub fn find_index(&self, name: &str) -> Option<IndexInfo> {
        self.indexes
            .read()
            .iter()
            .find(|i| i.index_name == name)
            .cloned()
    }

    /// A unique index whose key is exactly `columns` in any order
    pub fn unique_index_for(&self, columns: &[usize]) -> Option<IndexInfo> {
        self.indexes
            .read()
            .iter()
            .find(|i| i.is_unique && i.covers_exactly(columns))
            .cloned()
    }

    // Constraints

    pub fn constraints(&self) -> Vec<Constraint> {
        self.constraints.read().clone()
    }

    pub fn add_constraint(&self, constraint: Constraint) {
        self.constraints.write().push(constraint);
    }

    pub fn remove_constraint(&self, name: &str) -> Option<Constraint> {
        let mut constraints = self.constraints.write();
        let position = constraints.iter().position(|c| c.name() == name)?;
        Some(constraints.remove(position))
    }

    pub fn set_constraints(&self, constraints: Vec<Constraint>) {
        *self.constraints.write() = constraints;
    }

    pub fn get_constraint(&self, name: &str) -> Option<Constraint> {
        self.constraints
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    pub fn primary_key(&self) -> Option<Constraint> {
        self.constraints
            .read()
            .iter()
            .find(|c| c.constraint_type() == ConstraintType::PrimaryKey)
            .cloned()
    }

    // Rows

    pub fn row_iterator(&self) -> RowIterator {
        self.store.row_iterator()
    }

    pub fn row_count(&self) -> usize {
        self.store.row_count()
    }

    pub fn get_row(&self, id: RowId) -> Option<Row> {
        self.store.get(id)
    }

    /// Equi-lookup through an index
    pub fn find_first_row(&self, index: &IndexInfo, key: &[Value]) -> RowIterator {
        self.store.find_first_row(index.position, key)
    }

    /// Rows whose `columns` equal `key`, using an index when one has the
    /// columns as a leading prefix and scanning otherwise.
    pub fn find_rows(&self, columns: &[usize], key: &[Value]) -> Vec<Row> {
        let indexes = self.indexes.read();
        if let Some(index) = indexes.iter().find(|i| i.has_prefix(columns)) {
            return self.store.find_first_row(index.position, key).collect();
        }
        if let Some(index) = indexes.iter().find(|i| i.covers_exactly(columns)) {
            let ordered: Vec<Value> = index
                .key_columns
                .iter()
                .filter_map(|c| columns.iter().position(|x| x == c).map(|p| key[p].clone()))
                .collect();
            return self.store.find_first_row(index.position, &ordered).collect();
        }
        drop(indexes);
        self.store
            .row_iterator()
            .filter(|row| row.key(columns).as_slice() == key)
            .collect()
    }

    /// Insert a row, enforcing unique indexes
    pub fn insert_row(&self, values: Vec<Value>) -> SqlResult<RowId> {
        self.check_unique(&values, None)?;
        Ok(self.store.insert(values))
    }

    /// Replace a row's values, enforcing unique indexes
    pub fn update_row(&self, id: RowId, values: Vec<Value>) -> SqlResult<Row> {
        self.check_unique(&values, Some(id))?;
        self.store.update(id, values).ok_or_else(|| {
            SqlError::invariant(format!("row {} missing from {}", id, self.table_name))
        })
    }

    /// Put back a row removed earlier in the same statement under its old
    /// id, with new values. Used by multi-row UPDATE, which takes every old
    /// version out before writing any new one.
    pub fn reinsert_row(&self, id: RowId, values: Vec<Value>) -> SqlResult<()> {
        self.check_unique(&values, Some(id))?;
        self.store.restore(Row::new(id, values));
        Ok(())
    }

    pub fn delete_row(&self, id: RowId) -> Option<Row> {
        self.store.delete(id)
    }

    pub fn restore_row(&self, row: Row) {
        self.store.restore(row)
    }

    /// Load rows produced by a structural rewrite without re-checking them
    pub fn load_rows(&self, rows: impl IntoIterator<Item = Vec<Value>>) {
        for values in rows {
            self.store.insert(values);
        }
    }

    fn check_unique(&self, values: &[Value], updating: Option<RowId>) -> SqlResult<()> {
        let indexes = self.indexes.read();
        for index in indexes.iter().filter(|i| i.is_unique) {
            let key: Vec<Value> = index.key_columns.iter().map(|&c| values[c].clone()).collect();
            if key.iter().any(Value::is_null) {
                continue;
            }
            let duplicate = self
                .store
                .find_first_row(index.position, &key)
                .any(|row| Some(row.id) != updating);
            if duplicate {
                return Err(self.unique_violation(index, values));
            }
        }
        Ok(())
    }

    fn unique_violation(&self, index: &IndexInfo, values: &[Value]) -> SqlError {
        let owner = self.constraints.read().iter().find(|c| {
            c.is_unique_kind() && c.main_index_name().as_deref() == Some(index.index_name.as_str())
        }).cloned();
        match owner {
            Some(constraint) => constraint.get_exception(values),
            None => SqlError::UniqueViolation {
                constraint: index.index_name.clone(),
                table: self.table_name.clone(),
                key: format_key(
                    &index
                        .key_columns
                        .iter()
                        .map(|&c| values[c].clone())
                        .collect::<Vec<_>>(),
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table::new(
            TableId(1),
            "t",
            vec![
                ColumnInfo::new("a", DataType::Int32),
                ColumnInfo::new("b", DataType::Int32),
            ],
        )
    }

    #[test]
    fn test_unique_index_rejects_duplicates() {
        let table = sample_table();
        table.add_index("idx_a", vec![0], true);

        table.insert_row(vec![Value::Int32(1), Value::Int32(10)]).unwrap();
        let err = table
            .insert_row(vec![Value::Int32(1), Value::Int32(20)])
            .unwrap_err();
        assert_eq!(
            err,
            SqlError::UniqueViolation {
                constraint: "idx_a".to_string(),
                table: "t".to_string(),
                key: "1".to_string(),
            }
        );
    }

    #[test]
    fn test_unique_index_allows_nulls() {
        let table = sample_table();
        table.add_index("idx_a", vec![0], true);
        table.insert_row(vec![Value::Null, Value::Int32(1)]).unwrap();
        table.insert_row(vec![Value::Null, Value::Int32(2)]).unwrap();
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_update_same_row_keeps_key() {
        let table = sample_table();
        table.add_index("idx_a", vec![0], true);
        let id = table.insert_row(vec![Value::Int32(1), Value::Int32(10)]).unwrap();
        table
            .update_row(id, vec![Value::Int32(1), Value::Int32(11)])
            .unwrap();
        assert_eq!(table.get_row(id).unwrap().values[1], Value::Int32(11));
    }

    #[test]
    fn test_reinsert_after_delete_swaps_keys() {
        let table = sample_table();
        table.add_index("idx_a", vec![0], true);
        let first = table.insert_row(vec![Value::Int32(1), Value::Int32(0)]).unwrap();
        let second = table.insert_row(vec![Value::Int32(2), Value::Int32(0)]).unwrap();

        table.delete_row(first).unwrap();
        table.delete_row(second).unwrap();
        table
            .reinsert_row(first, vec![Value::Int32(2), Value::Int32(0)])
            .unwrap();
        table
            .reinsert_row(second, vec![Value::Int32(1), Value::Int32(0)])
            .unwrap();
        assert_eq!(table.get_row(first).unwrap().values[0], Value::Int32(2));

        assert!(table.remove_index("idx_a").is_some());
        table.insert_row(vec![Value::Int32(1), Value::Int32(5)]).unwrap();
        assert_eq!(table.row_count(), 3);
    }

    #[test]
    fn test_find_rows_with_and_without_index() {
        let table = sample_table();
        table.insert_row(vec![Value::Int32(1), Value::Int32(10)]).unwrap();
        table.insert_row(vec![Value::Int32(2), Value::Int32(10)]).unwrap();

        assert_eq!(table.find_rows(&[1], &[Value::Int32(10)]).len(), 2);

        table.add_index("idx_ba", vec![1, 0], false);
        assert_eq!(
            table
                .find_rows(&[0, 1], &[Value::Int32(2), Value::Int32(10)])
                .len(),
            1
        );
        assert_eq!(table.find_rows(&[1], &[Value::Int32(10)]).len(), 2);
    }
}
