//! DELETE executor.

use crate::catalog::{Catalog, Table};
use crate::error::{SqlError, SqlResult};
use crate::executor::{DataChange, ExecutionContext, Executor};
use crate::query::specification::rebind_subqueries;
use crate::range::{QueryPlan, RangeVariable};
use std::sync::Arc;

/// Executor for deleting the rows of one table
pub struct DeleteExecutor {
    table: Arc<Table>,
    ranges: Vec<RangeVariable>,
    plan: QueryPlan,
}

impl DeleteExecutor {
    pub fn new(table: Arc<Table>, range: RangeVariable, plan: QueryPlan) -> Self {
        Self {
            table,
            ranges: vec![range],
            plan,
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn rebind_tables(&mut self, catalog: &Catalog) -> SqlResult<()> {
        let current = catalog.get_table(self.table.name())?;
        self.ranges[0].swap_table(current.clone())?;
        self.plan.refresh_indexes(&self.ranges)?;
        for expr in self.plan.expressions_mut() {
            rebind_subqueries(expr, catalog)?;
        }
        self.table = current;
        Ok(())
    }
}

impl Executor for DeleteExecutor {
    fn execute(&self, ctx: &mut ExecutionContext, change: &mut DataChange) -> SqlResult<usize> {
        let range_id = self.ranges[0].range_id;
        let mut ids = Vec::new();
        self.plan.for_each(&self.ranges, ctx, &mut |ctx| {
            let id = ctx
                .row_id(range_id)
                .ok_or_else(|| SqlError::invariant("deleted row has no row id"))?;
            ids.push(id);
            Ok(())
        })?;

        let mut count = 0;
        for id in ids {
            // A cascade from an earlier row may already have removed it.
            if change.delete_row(ctx, &self.table, id)? {
                count += 1;
            }
        }
        Ok(count)
    }
}
