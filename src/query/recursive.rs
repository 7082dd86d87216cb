//! `WITH RECURSIVE` evaluation.
//!
//! A recursive CTE is `anchor UNION [ALL] recursive-member`. The anchor runs
//! once; the recursive member then runs repeatedly against a work table
//! holding only the rows the previous round added, until a round adds
//! nothing. Column types start as the anchor's and are widened until the
//! recursive member no longer changes them.

use crate::access::{aggregate_type, Value};
use crate::catalog::Catalog;
use crate::error::{SqlError, SqlResult};
use crate::executor::{convert_row, ExecutionContext};
use crate::query::compiler::CteState;
use crate::query::{
    CompileContext, CteDefinition, QueryBody, QueryExpression, ResultColumn, SetOperator,
};
use crate::range::RangeColumn;
use log::{debug, warn};
use std::collections::HashSet;
use std::rc::Rc;

type Rows = Vec<Vec<Value>>;

/// Attempts at settling the column types of the recursive member
const MAX_TYPE_ROUNDS: usize = 4;

#[derive(Debug, Clone)]
pub struct RecursiveQuery {
    name: String,
    anchor: Box<QueryExpression>,
    recursive: Box<QueryExpression>,
    union_all: bool,
    work_id: usize,
    columns: Vec<ResultColumn>,
}

impl RecursiveQuery {
    /// Compile a CTE of a recursive WITH clause. `Ok(None)` when the
    /// definition is not a UNION whose second branch reads the CTE itself;
    /// such a definition is compiled as an ordinary derived table.
    pub(crate) fn compile(
        compiler: &mut CompileContext,
        definition: &CteDefinition,
        location: (usize, usize),
    ) -> SqlResult<Option<RecursiveQuery>> {
        let query = &definition.query;
        let operation = match &query.body {
            QueryBody::SetOperation(operation)
                if operation.operator == SetOperator::Union
                    && operation.corresponding.is_none()
                    && query.order_by.is_empty()
                    && query.limit.is_none()
                    && query.offset.is_none()
                    && query.with.is_none() =>
            {
                operation
            }
            _ => return Ok(None),
        };

        let mut anchor = (*operation.left).clone();
        anchor.resolve(compiler, &[])?;
        let names = match &definition.columns {
            Some(columns) if columns.len() != anchor.degree() => {
                return Err(SqlError::DegreeMismatch {
                    expected: anchor.degree(),
                    actual: columns.len(),
                })
            }
            Some(columns) => columns.clone(),
            None => anchor.column_names(),
        };
        let mut types = anchor.column_types();
        let work_id = compiler.next_work_id();

        for round in 1..=MAX_TYPE_ROUNDS {
            let columns = names
                .iter()
                .zip(types.iter())
                .map(|(name, data_type)| RangeColumn::new(name.clone(), data_type.clone()))
                .collect();
            compiler.set_cte_state(location, CteState::Recursive { work_id, columns });
            let mut recursive = (*operation.right).clone();
            let resolved = recursive.resolve(compiler, &[]);
            compiler.set_cte_state(location, CteState::Compiling);
            resolved?;

            if !recursive.uses_work_table() {
                return Ok(None);
            }
            if recursive.degree() != names.len() {
                return Err(SqlError::DegreeMismatch {
                    expected: names.len(),
                    actual: recursive.degree(),
                });
            }
            let widened = types
                .iter()
                .zip(recursive.column_types().iter())
                .map(|(current, produced)| aggregate_type(current, produced))
                .collect::<SqlResult<Vec<_>>>()?;
            if widened == types {
                debug!(
                    "recursive query {} typed after {} compilation rounds",
                    definition.name, round
                );
                let columns = names
                    .iter()
                    .zip(types)
                    .map(|(name, data_type)| ResultColumn::new(name.clone(), data_type))
                    .collect();
                return Ok(Some(RecursiveQuery {
                    name: definition.name.clone(),
                    anchor: Box::new(anchor),
                    recursive: Box::new(recursive),
                    union_all: operation.all,
                    work_id,
                    columns,
                }));
            }
            types = widened;
        }
        Err(SqlError::type_mismatch(format!(
            "column types of recursive query {} do not settle",
            definition.name
        )))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result_columns(&self) -> &[ResultColumn] {
        &self.columns
    }

    pub fn range_columns(&self) -> Vec<RangeColumn> {
        self.columns
            .iter()
            .map(|c| RangeColumn::new(c.name.clone(), c.data_type.clone()))
            .collect()
    }

    pub fn rebind_tables(&mut self, catalog: &Catalog) -> SqlResult<()> {
        self.anchor.rebind_tables(catalog)?;
        self.recursive.rebind_tables(catalog)
    }

    /// Run the anchor, then the recursive member until a round adds no
    /// rows. The final, empty round counts towards the round limit.
    pub fn get_result(&self, ctx: &mut ExecutionContext) -> SqlResult<Vec<Vec<Value>>> {
        let types: Vec<_> = self.columns.iter().map(|c| c.data_type.clone()).collect();
        let limit = ctx.config.max_recursive_rounds;
        let warn_at = limit - limit / 10;

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut work = Vec::new();
        let mut accept = |row: Vec<Value>, result: &mut Rows, work: &mut Rows| {
            if self.union_all || seen.insert(row.clone()) {
                result.push(row.clone());
                work.push(row);
            }
        };
        for row in self.anchor.get_result(ctx)?.rows {
            accept(convert_row(row, &types)?, &mut result, &mut work);
        }

        let mut rounds = 0;
        loop {
            rounds += 1;
            if rounds > limit {
                ctx.clear_work_table(self.work_id);
                return Err(SqlError::RecursionLimitExceeded { limit });
            }
            if rounds == warn_at && limit >= 10 {
                warn!(
                    "recursive query {} reached round {} of {}",
                    self.name, rounds, limit
                );
            }
            ctx.set_work_table(self.work_id, Rc::new(std::mem::take(&mut work)));
            for row in self.recursive.get_result(ctx)?.rows {
                accept(convert_row(row, &types)?, &mut result, &mut work);
            }
            if work.is_empty() {
                break;
            }
        }
        ctx.clear_work_table(self.work_id);
        ctx.record_recursive_rounds(rounds);
        debug!(
            "recursive query {} produced {} rows in {} rounds",
            self.name,
            result.len(),
            rounds
        );
        Ok(result)
    }
}
