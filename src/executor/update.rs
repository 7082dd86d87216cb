//! UPDATE executor.

use crate::access::Value;
use crate::catalog::{Catalog, Table};
use crate::error::{SqlError, SqlResult};
use crate::executor::{DataChange, ExecutionContext, Executor};
use crate::expression::Expression;
use crate::query::specification::rebind_subqueries;
use crate::range::{QueryPlan, RangeVariable};
use std::sync::Arc;

/// `SET column = expr`; `None` is `SET column = DEFAULT`
#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: usize,
    pub value: Option<Expression>,
}

/// Executor for updating the rows of one table
pub struct UpdateExecutor {
    table: Arc<Table>,
    /// The target table's range; always position 0
    ranges: Vec<RangeVariable>,
    plan: QueryPlan,
    assignments: Vec<Assignment>,
}

impl UpdateExecutor {
    pub fn new(
        table: Arc<Table>,
        range: RangeVariable,
        plan: QueryPlan,
        assignments: Vec<Assignment>,
    ) -> Self {
        Self {
            table,
            ranges: vec![range],
            plan,
            assignments,
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn rebind_tables(&mut self, catalog: &Catalog) -> SqlResult<()> {
        let current = catalog.get_table(self.table.name())?;
        for assignment in &self.assignments {
            if current.column_count() <= assignment.column
                || current.column(assignment.column).column_type
                    != self.table.column(assignment.column).column_type
            {
                return Err(SqlError::ObjectNotFound(self.table.name().to_string()));
            }
        }
        self.ranges[0].swap_table(current.clone())?;
        self.plan.refresh_indexes(&self.ranges)?;
        for expr in self.plan.expressions_mut() {
            rebind_subqueries(expr, catalog)?;
        }
        for assignment in &mut self.assignments {
            if let Some(value) = &mut assignment.value {
                rebind_subqueries(value, catalog)?;
            }
        }
        self.table = current;
        Ok(())
    }
}

impl Executor for UpdateExecutor {
    fn execute(&self, ctx: &mut ExecutionContext, change: &mut DataChange) -> SqlResult<usize> {
        let range_id = self.ranges[0].range_id;
        let mut updates = Vec::new();
        self.plan.for_each(&self.ranges, ctx, &mut |ctx| {
            let id = ctx
                .row_id(range_id)
                .ok_or_else(|| SqlError::invariant("updated row has no row id"))?;
            let mut values = ctx
                .row(range_id)
                .map(<[Value]>::to_vec)
                .ok_or_else(|| SqlError::invariant("updated row is not current"))?;
            // Every assignment reads the old row.
            let mut assigned = Vec::with_capacity(self.assignments.len());
            for assignment in &self.assignments {
                let column = self.table.column(assignment.column);
                let value = match &assignment.value {
                    Some(expr) => expr.get_value(ctx)?,
                    None => column.default.clone().unwrap_or(Value::Null),
                };
                assigned.push((assignment.column, value.convert_to_type(&column.column_type)?));
            }
            for (column, value) in assigned {
                values[column] = value;
            }
            updates.push((id, values));
            Ok(())
        })?;
        change.update_rows(ctx, &self.table, updates)
    }
}
