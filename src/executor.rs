//! Statement execution: the runtime row context shared by expression
//! evaluation, and the data-change executors.
//!
//! Range iteration writes the current row of every range variable into an
//! [`ExecutionContext`]; expressions read column values from it by range id.
//! Nothing is stored on the range variables themselves, so a compiled
//! statement can be executed any number of times.

use crate::access::{DataType, RowId, Value};
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{SqlError, SqlResult};
use crate::expression::ColumnBinding;
use crate::query::RowSet;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

pub mod data_change;
pub mod delete;
pub mod insert;
pub mod update;

pub use data_change::DataChange;
pub use delete::DeleteExecutor;
pub use insert::{InsertExecutor, InsertSource};
pub use update::UpdateExecutor;

/// Trait for data-change executors
pub trait Executor {
    /// Apply the statement, recording every row mutation in `change`.
    /// Returns the number of rows the statement itself touched.
    fn execute(&self, ctx: &mut ExecutionContext, change: &mut DataChange) -> SqlResult<usize>;
}

/// Materialized rows of a derived table or work table
pub type SharedRows = Rc<Vec<Vec<Value>>>;

/// Per-statement runtime state
pub struct ExecutionContext {
    pub catalog: Arc<Catalog>,
    pub config: EngineConfig,
    statement_timestamp: i64,
    /// Current row of each range variable, by range id
    rows: Vec<Option<Vec<Value>>>,
    /// Store id of the current row, for ranges over base tables
    row_ids: Vec<Option<RowId>>,
    /// Finalized set-function values of the group being projected, by slot
    aggregates: Vec<Value>,
    parameters: Vec<Value>,
    subquery_cache: HashMap<usize, Rc<RowSet>>,
    derived_cache: HashMap<usize, SharedRows>,
    work_tables: HashMap<usize, SharedRows>,
    warnings: Vec<String>,
    recursive_rounds: Option<usize>,
}

impl ExecutionContext {
    pub fn new(catalog: Arc<Catalog>, config: EngineConfig, statement_timestamp: i64) -> Self {
        Self {
            catalog,
            config,
            statement_timestamp,
            rows: Vec::new(),
            row_ids: Vec::new(),
            aggregates: Vec::new(),
            parameters: Vec::new(),
            subquery_cache: HashMap::new(),
            derived_cache: HashMap::new(),
            work_tables: HashMap::new(),
            warnings: Vec::new(),
            recursive_rounds: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// A context with no rows or cached results, sharing this statement's
    /// catalog, configuration and timestamp. Used for CHECK evaluation.
    pub fn fork(&self) -> ExecutionContext {
        ExecutionContext::new(
            self.catalog.clone(),
            self.config.clone(),
            self.statement_timestamp,
        )
    }

    pub fn statement_timestamp(&self) -> i64 {
        self.statement_timestamp
    }

    // Row context

    pub fn set_row(&mut self, range_id: usize, values: Vec<Value>) {
        if self.rows.len() <= range_id {
            self.rows.resize(range_id + 1, None);
        }
        self.rows[range_id] = Some(values);
    }

    pub fn set_row_id(&mut self, range_id: usize, id: Option<RowId>) {
        if self.row_ids.len() <= range_id {
            self.row_ids.resize(range_id + 1, None);
        }
        self.row_ids[range_id] = id;
    }

    pub fn row_id(&self, range_id: usize) -> Option<RowId> {
        self.row_ids.get(range_id).copied().flatten()
    }

    /// Null-extended row for the inner side of an outer join
    pub fn set_null_row(&mut self, range_id: usize, width: usize) {
        self.set_row(range_id, vec![Value::Null; width]);
        self.set_row_id(range_id, None);
    }

    pub fn row(&self, range_id: usize) -> Option<&[Value]> {
        self.rows.get(range_id).and_then(|r| r.as_deref())
    }

    pub fn column_value(&self, binding: ColumnBinding) -> SqlResult<Value> {
        self.row(binding.range_id)
            .and_then(|row| row.get(binding.column))
            .cloned()
            .ok_or_else(|| {
                SqlError::invariant(format!(
                    "no current row for range {} column {}",
                    binding.range_id, binding.column
                ))
            })
    }

    /// Copy of the current rows of `range_ids`, for grouping
    pub fn snapshot_rows(&self, range_ids: &[usize]) -> Vec<Option<Vec<Value>>> {
        range_ids
            .iter()
            .map(|&id| self.rows.get(id).cloned().flatten())
            .collect()
    }

    pub fn restore_rows(&mut self, range_ids: &[usize], snapshot: &[Option<Vec<Value>>]) {
        for (&id, row) in range_ids.iter().zip(snapshot.iter()) {
            match row {
                Some(values) => self.set_row(id, values.clone()),
                None => {
                    if let Some(slot) = self.rows.get_mut(id) {
                        *slot = None;
                    }
                }
            }
        }
    }

    // Aggregates and parameters

    pub fn set_aggregate(&mut self, slot: usize, value: Value) {
        if self.aggregates.len() <= slot {
            self.aggregates.resize(slot + 1, Value::Null);
        }
        self.aggregates[slot] = value;
    }

    pub fn aggregate(&self, slot: usize) -> SqlResult<Value> {
        self.aggregates
            .get(slot)
            .cloned()
            .ok_or_else(|| SqlError::invariant(format!("aggregate slot {} not computed", slot)))
    }

    pub fn parameter(&self, index: usize) -> SqlResult<Value> {
        self.parameters.get(index).cloned().ok_or_else(|| {
            SqlError::Parse(format!("no value supplied for parameter {}", index + 1))
        })
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    // Materialized results

    pub fn cached_subquery(&self, id: usize) -> Option<Rc<RowSet>> {
        self.subquery_cache.get(&id).cloned()
    }

    pub fn cache_subquery(&mut self, id: usize, result: Rc<RowSet>) {
        self.subquery_cache.insert(id, result);
    }

    pub fn cached_derived(&self, range_id: usize) -> Option<SharedRows> {
        self.derived_cache.get(&range_id).cloned()
    }

    pub fn cache_derived(&mut self, range_id: usize, rows: SharedRows) {
        self.derived_cache.insert(range_id, rows);
    }

    pub fn set_work_table(&mut self, work_id: usize, rows: SharedRows) {
        self.work_tables.insert(work_id, rows);
    }

    pub fn work_table(&self, work_id: usize) -> SqlResult<SharedRows> {
        self.work_tables
            .get(&work_id)
            .cloned()
            .ok_or_else(|| SqlError::invariant(format!("work table {} not populated", work_id)))
    }

    pub fn clear_work_table(&mut self, work_id: usize) {
        self.work_tables.remove(&work_id);
    }

    // Diagnostics reported back to the session

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn record_recursive_rounds(&mut self, rounds: usize) {
        self.recursive_rounds = Some(rounds);
    }

    pub fn recursive_rounds(&self) -> Option<usize> {
        self.recursive_rounds
    }
}

/// Convert a row to the given column types
pub fn convert_row(values: Vec<Value>, types: &[DataType]) -> SqlResult<Vec<Value>> {
    values
        .into_iter()
        .zip(types.iter())
        .map(|(v, t)| v.convert_to_type(t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ExecutionContext {
        ExecutionContext::new(Arc::new(Catalog::new()), EngineConfig::default(), 7)
    }

    #[test]
    fn test_row_context() {
        let mut ctx = context();
        ctx.set_row(2, vec![Value::Int32(1), Value::Int32(2)]);
        let binding = ColumnBinding {
            range_id: 2,
            column: 1,
        };
        assert_eq!(ctx.column_value(binding).unwrap(), Value::Int32(2));
        assert!(ctx.row(0).is_none());
        assert!(matches!(
            ctx.column_value(ColumnBinding {
                range_id: 0,
                column: 0
            }),
            Err(SqlError::InvariantViolation(_))
        ));

        ctx.set_null_row(2, 2);
        assert_eq!(ctx.column_value(binding).unwrap(), Value::Null);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let mut ctx = context();
        ctx.set_row(0, vec![Value::Int32(1)]);
        let snapshot = ctx.snapshot_rows(&[0, 1]);
        ctx.set_row(0, vec![Value::Int32(9)]);
        ctx.set_row(1, vec![Value::Int32(9)]);
        ctx.restore_rows(&[0, 1], &snapshot);
        assert_eq!(ctx.row(0), Some(&[Value::Int32(1)][..]));
        assert!(ctx.row(1).is_none());
    }

    #[test]
    fn test_fork_keeps_statement_state() {
        let mut ctx = context().with_parameters(vec![Value::Int32(3)]);
        ctx.set_row(0, vec![Value::Int32(1)]);
        let forked = ctx.fork();
        assert_eq!(forked.statement_timestamp(), 7);
        assert!(forked.row(0).is_none());
        assert_eq!(ctx.parameter(0).unwrap(), Value::Int32(3));
        assert!(forked.parameter(0).is_err());
    }
}
