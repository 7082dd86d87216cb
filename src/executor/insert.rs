//! INSERT executor.

use crate::access::Value;
use crate::catalog::{Catalog, ColumnInfo, Table};
use crate::error::{SqlError, SqlResult};
use crate::executor::{DataChange, ExecutionContext, Executor};
use crate::expression::Expression;
use crate::query::QueryExpression;
use std::sync::Arc;

/// Rows to insert. In a VALUES row, `None` stands for DEFAULT.
#[derive(Debug, Clone)]
pub enum InsertSource {
    Values(Vec<Vec<Option<Expression>>>),
    Query(Box<QueryExpression>),
    DefaultValues,
}

/// Executor for inserting rows into a table
pub struct InsertExecutor {
    table: Arc<Table>,
    /// Target position of each supplied value
    columns: Vec<usize>,
    source: InsertSource,
}

impl InsertExecutor {
    pub fn new(table: Arc<Table>, columns: Vec<usize>, source: InsertSource) -> Self {
        Self {
            table,
            columns,
            source,
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn rebind_tables(&mut self, catalog: &Catalog) -> SqlResult<()> {
        let current = catalog.get_table(self.table.name())?;
        if current.column_types() != self.table.column_types() {
            return Err(SqlError::ObjectNotFound(self.table.name().to_string()));
        }
        self.table = current;
        if let InsertSource::Query(query) = &mut self.source {
            query.rebind_tables(catalog)?;
        }
        Ok(())
    }

    /// Complete row for the table from the supplied values, with defaults
    /// and identity values filled in
    fn build_row(&self, supplied: Vec<Option<Value>>) -> SqlResult<Vec<Value>> {
        let mut values: Vec<Option<Value>> = vec![None; self.table.column_count()];
        for (&column, value) in self.columns.iter().zip(supplied) {
            values[column] = value;
        }
        self.table
            .columns()
            .iter()
            .zip(values)
            .map(|(column, value)| column_value(&self.table, column, value))
            .collect()
    }
}

fn column_value(table: &Table, column: &ColumnInfo, value: Option<Value>) -> SqlResult<Value> {
    let value = match value {
        Some(_) if column.is_generated => {
            return Err(SqlError::Unsupported(format!(
                "value supplied for generated column {}",
                column.column_name
            )))
        }
        Some(value) if value.is_null() && column.is_identity => {
            Value::BigInt(table.next_identity())
        }
        Some(value) => {
            if column.is_identity {
                if let Some(n) = value.as_integer() {
                    table.observe_identity(n);
                }
            }
            value
        }
        None if column.is_identity => Value::BigInt(table.next_identity()),
        None => column.default.clone().unwrap_or(Value::Null),
    };
    value.convert_to_type(&column.column_type)
}

impl Executor for InsertExecutor {
    fn execute(&self, ctx: &mut ExecutionContext, change: &mut DataChange) -> SqlResult<usize> {
        let rows: Vec<Vec<Option<Value>>> = match &self.source {
            InsertSource::Values(rows) => rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|expr| expr.as_ref().map(|e| e.get_value(ctx)).transpose())
                        .collect::<SqlResult<Vec<_>>>()
                })
                .collect::<SqlResult<Vec<_>>>()?,
            InsertSource::Query(query) => query
                .get_result(ctx)?
                .rows
                .into_iter()
                .map(|row| row.into_iter().map(Some).collect())
                .collect(),
            InsertSource::DefaultValues => vec![Vec::new()],
        };

        let mut count = 0;
        for supplied in rows {
            let row = self.build_row(supplied)?;
            change.insert_row(ctx, &self.table, row)?;
            count += 1;
        }
        Ok(count)
    }
}
