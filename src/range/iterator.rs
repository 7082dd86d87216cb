//! Nested-loop evaluation of a [`QueryPlan`].
//!
//! Each complete joined row is reported through a callback after the
//! current row of every range has been written into the context.

use crate::access::Value;
use crate::error::SqlResult;
use crate::executor::ExecutionContext;
use crate::expression::Expression;
use crate::range::{AccessPath, JoinKind, PlanNode, QueryPlan, RangeAccess, RangeVariable};

type RowCallback<'f> = dyn FnMut(&mut ExecutionContext) -> SqlResult<()> + 'f;

impl QueryPlan {
    /// Call `emit` once for every row of the join that passes all
    /// conditions.
    pub fn for_each(
        &self,
        ranges: &[RangeVariable],
        ctx: &mut ExecutionContext,
        emit: &mut RowCallback<'_>,
    ) -> SqlResult<()> {
        let residual = &self.residual;
        self.root.for_each(ranges, ctx, &mut |ctx| {
            if passes(residual, ctx)? {
                emit(ctx)?;
            }
            Ok(())
        })
    }
}

impl PlanNode {
    fn for_each(
        &self,
        ranges: &[RangeVariable],
        ctx: &mut ExecutionContext,
        emit: &mut RowCallback<'_>,
    ) -> SqlResult<()> {
        match self {
            PlanNode::Empty => emit(ctx),
            PlanNode::Range(access) => access.for_each(ranges, ctx, emit),
            PlanNode::Join {
                kind,
                left,
                right,
                post_filters,
            } => {
                let mut filtered = |ctx: &mut ExecutionContext| -> SqlResult<()> {
                    if passes(post_filters, ctx)? {
                        emit(ctx)?;
                    }
                    Ok(())
                };
                let (outer, inner) = match kind {
                    JoinKind::Right => (right, left),
                    _ => (left, right),
                };
                if !kind.is_outer() {
                    return outer.for_each(ranges, ctx, &mut |ctx| {
                        inner.for_each(ranges, ctx, &mut filtered)
                    });
                }
                outer.for_each(ranges, ctx, &mut |ctx| {
                    let mut matched = false;
                    inner.for_each(ranges, ctx, &mut |ctx| {
                        matched = true;
                        filtered(ctx)
                    })?;
                    if !matched {
                        inner.set_null_rows(ranges, ctx);
                        filtered(ctx)?;
                    }
                    Ok(())
                })
            }
        }
    }

    fn set_null_rows(&self, ranges: &[RangeVariable], ctx: &mut ExecutionContext) {
        let mut positions = Vec::new();
        self.positions(&mut positions);
        for position in positions {
            let range = &ranges[position];
            ctx.set_null_row(range.range_id, range.width());
        }
    }
}

impl RangeAccess {
    fn for_each(
        &self,
        ranges: &[RangeVariable],
        ctx: &mut ExecutionContext,
        emit: &mut RowCallback<'_>,
    ) -> SqlResult<()> {
        let range = &ranges[self.position];
        let table = match range.table() {
            Some(table) => table,
            None => {
                let rows = range.source_rows(ctx)?;
                for values in rows.iter() {
                    ctx.set_row(range.range_id, values.clone());
                    ctx.set_row_id(range.range_id, None);
                    if passes(&self.filters, ctx)? {
                        emit(ctx)?;
                    }
                }
                return Ok(());
            }
        };

        let rows = match &self.access {
            AccessPath::Scan => table.row_iterator(),
            AccessPath::Index { index, key } => {
                let key_types = index.key_types(table.columns());
                let mut probe = Vec::with_capacity(key.len());
                for (expr, data_type) in key.iter().zip(key_types.iter()) {
                    let value = expr.get_value(ctx)?;
                    if value.is_null() {
                        return Ok(());
                    }
                    probe.push(value.convert_to_type(data_type)?);
                }
                table.find_first_row(index, &probe)
            }
        };
        for row in rows {
            ctx.set_row(range.range_id, row.values);
            ctx.set_row_id(range.range_id, Some(row.id));
            if passes(&self.filters, ctx)? {
                emit(ctx)?;
            }
        }
        Ok(())
    }
}

fn passes(conditions: &[Expression], ctx: &mut ExecutionContext) -> SqlResult<bool> {
    for condition in conditions {
        if !condition.test_condition(ctx)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Collect the values of `exprs` for every row of the plan
pub fn collect_rows(
    plan: &QueryPlan,
    ranges: &[RangeVariable],
    exprs: &[Expression],
    ctx: &mut ExecutionContext,
) -> SqlResult<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    plan.for_each(ranges, ctx, &mut |ctx| {
        let row = exprs
            .iter()
            .map(|e| e.get_value(ctx))
            .collect::<SqlResult<Vec<_>>>()?;
        rows.push(row);
        Ok(())
    })?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::DataType;
    use crate::catalog::{Catalog, ColumnInfo};
    use crate::config::EngineConfig;
    use crate::expression::{ColumnBinding, UnaryOperator};
    use crate::range::{plan_ranges, JoinTree};
    use std::sync::Arc;

    fn setup() -> (Arc<Catalog>, Vec<RangeVariable>) {
        let catalog = Arc::new(Catalog::new());
        let t = catalog
            .create_table("t", vec![ColumnInfo::new("a", DataType::Int32)])
            .unwrap();
        let u = catalog
            .create_table(
                "u",
                vec![
                    ColumnInfo::new("a", DataType::Int32),
                    ColumnInfo::new("c", DataType::Int32),
                ],
            )
            .unwrap();
        u.add_index("u_a", vec![0], false);
        for a in 1..=3 {
            t.insert_row(vec![Value::Int32(a)]).unwrap();
        }
        u.insert_row(vec![Value::Int32(1), Value::Int32(10)]).unwrap();
        u.insert_row(vec![Value::Int32(1), Value::Int32(11)]).unwrap();
        u.insert_row(vec![Value::Int32(3), Value::Null]).unwrap();
        let ranges = vec![
            RangeVariable::for_table(0, None, t),
            RangeVariable::for_table(1, None, u),
        ];
        (catalog, ranges)
    }

    fn col(range_id: usize, column: usize) -> Expression {
        Expression::bound_column(
            format!("c{}", column),
            None,
            ColumnBinding { range_id, column },
            DataType::Int32,
        )
    }

    fn left_join() -> JoinTree {
        let mut on = Expression::eq(col(1, 0), col(0, 0));
        on.data_type = Some(DataType::Boolean);
        JoinTree::Join {
            kind: JoinKind::Left,
            left: Box::new(JoinTree::Range(0)),
            right: Box::new(JoinTree::Range(1)),
            condition: Some(on),
        }
    }

    #[test]
    fn test_left_join_null_extends_once() {
        let (catalog, ranges) = setup();
        let plan = plan_ranges(&ranges, left_join(), None).unwrap();
        let mut ctx = ExecutionContext::new(catalog, EngineConfig::default(), 0);
        let mut rows = collect_rows(&plan, &ranges, &[col(0, 0), col(1, 1)], &mut ctx).unwrap();
        rows.sort();
        assert_eq!(
            rows,
            vec![
                vec![Value::Int32(1), Value::Int32(10)],
                vec![Value::Int32(1), Value::Int32(11)],
                vec![Value::Int32(2), Value::Null],
                vec![Value::Int32(3), Value::Null],
            ]
        );
    }

    #[test]
    fn test_where_after_outer_join() {
        let (catalog, ranges) = setup();
        let mut is_null = Expression::unary(UnaryOperator::IsNull, col(1, 0));
        is_null.data_type = Some(DataType::Boolean);
        let plan = plan_ranges(&ranges, left_join(), Some(is_null)).unwrap();
        let mut ctx = ExecutionContext::new(catalog, EngineConfig::default(), 0);
        let rows = collect_rows(&plan, &ranges, &[col(0, 0)], &mut ctx).unwrap();
        assert_eq!(rows, vec![vec![Value::Int32(2)]]);
    }

    #[test]
    fn test_empty_plan_yields_one_row() {
        let catalog = Arc::new(Catalog::new());
        let plan = plan_ranges(&[], JoinTree::Empty, None).unwrap();
        let mut ctx = ExecutionContext::new(catalog, EngineConfig::default(), 0);
        let rows = collect_rows(
            &plan,
            &[],
            &[Expression::value(Value::Int32(7))],
            &mut ctx,
        )
        .unwrap();
        assert_eq!(rows, vec![vec![Value::Int32(7)]]);
    }
}
