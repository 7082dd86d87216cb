//! `SELECT ... FROM ... WHERE ... GROUP BY ... HAVING ...`

use crate::access::{DataType, Value};
use crate::catalog::Catalog;
use crate::error::{SqlError, SqlResult};
use crate::executor::ExecutionContext;
use crate::expression::{ColumnBinding, ExprKind, Expression, SetFunction, SetFunctionAggregator};
use crate::query::{CompileContext, QueryExpression, ResultColumn, SortSpec};
use crate::range::iterator::collect_rows;
use crate::range::{
    plan_ranges, JoinKind, JoinTree, QueryPlan, RangeGroup, RangeSource, RangeVariable,
};
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum SelectItem {
    /// `*` or `qualifier.*`
    Wildcard(Option<String>),
    Expr(Expression),
}

/// FROM clause item as parsed
#[derive(Debug, Clone)]
pub enum TableRef {
    Named {
        name: String,
        alias: Option<String>,
    },
    Derived {
        query: Box<QueryExpression>,
        alias: String,
        columns: Option<Vec<String>>,
    },
    Join {
        kind: JoinKind,
        left: Box<TableRef>,
        right: Box<TableRef>,
        condition: Option<Expression>,
    },
}

#[derive(Debug, Clone)]
struct AggregateSlot {
    slot: usize,
    function: SetFunction,
    distinct: bool,
    arg: Option<Expression>,
}

struct Group {
    /// Rows of the first joined row of the group
    snapshot: Vec<Option<Vec<Value>>>,
    accumulators: Vec<SetFunctionAggregator>,
}

#[derive(Debug, Clone)]
pub struct QuerySpecification {
    pub distinct: bool,
    pub select_list: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub where_clause: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    ranges: Vec<RangeVariable>,
    join_tree: JoinTree,
    plan: Option<QueryPlan>,
    /// Select list after wildcard expansion, then hidden ORDER BY columns
    exprs: Vec<Expression>,
    names: Vec<String>,
    visible: usize,
    aggregates: Vec<AggregateSlot>,
    grouped: bool,
    outer_references: Vec<Expression>,
    uses_work_table: bool,
}

impl QuerySpecification {
    pub fn new(select_list: Vec<SelectItem>) -> Self {
        Self {
            distinct: false,
            select_list,
            from: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            ranges: Vec::new(),
            join_tree: JoinTree::Empty,
            plan: None,
            exprs: Vec::new(),
            names: Vec::new(),
            visible: 0,
            aggregates: Vec::new(),
            grouped: false,
            outer_references: Vec::new(),
            uses_work_table: false,
        }
    }

    pub fn ranges(&self) -> &[RangeVariable] {
        &self.ranges
    }

    pub fn outer_references(&self) -> &[Expression] {
        &self.outer_references
    }

    pub fn uses_work_table(&self) -> bool {
        self.uses_work_table
    }

    pub fn column_names(&self) -> Vec<String> {
        self.names[..self.visible].to_vec()
    }

    pub fn result_columns(&self) -> Vec<ResultColumn> {
        self.names[..self.visible]
            .iter()
            .zip(self.exprs.iter())
            .map(|(name, expr)| {
                ResultColumn::new(
                    name.clone(),
                    expr.data_type().cloned().unwrap_or(DataType::Null),
                )
            })
            .collect()
    }

    /// Bind the FROM clause, expand the select list and bind every column
    /// reference. ORDER BY items that are not output columns become hidden
    /// trailing columns.
    pub fn resolve_references(
        &mut self,
        compiler: &mut CompileContext,
        outer: &[&RangeGroup<'_>],
        order_by: &mut [SortSpec],
    ) -> SqlResult<Vec<String>> {
        let mut unresolved = Vec::new();
        let mut outer_references = Vec::new();

        let mut tree = JoinTree::Empty;
        for item in std::mem::take(&mut self.from) {
            let subtree =
                self.add_table_ref(item, compiler, outer, &mut unresolved, &mut outer_references)?;
            tree = JoinTree::cross(tree, subtree);
        }
        self.join_tree = tree;

        let group = RangeGroup::new(&self.ranges);
        let mut exprs = Vec::new();
        let mut names = Vec::new();
        for item in std::mem::take(&mut self.select_list) {
            match item {
                SelectItem::Wildcard(qualifier) => {
                    let mut matched = false;
                    for range in group.ranges() {
                        if let Some(q) = &qualifier {
                            if !range.matches_qualifier(q) {
                                continue;
                            }
                        }
                        matched = true;
                        for (column, info) in range.columns.iter().enumerate() {
                            range.mark_used(column);
                            exprs.push(Expression::bound_column(
                                info.name.clone(),
                                Some(range.name.clone()),
                                ColumnBinding {
                                    range_id: range.range_id,
                                    column,
                                },
                                info.data_type.clone(),
                            ));
                            names.push(info.name.clone());
                        }
                    }
                    if !matched {
                        return Err(match qualifier {
                            Some(q) => SqlError::ObjectNotFound(q),
                            None => SqlError::Parse("SELECT * without a FROM clause".to_string()),
                        });
                    }
                }
                SelectItem::Expr(mut expr) => {
                    unresolved.extend(expr.resolve_column_references(compiler, &group, outer)?);
                    names.push(
                        expr.output_name()
                            .unwrap_or_else(|| format!("C{}", names.len() + 1)),
                    );
                    exprs.push(expr);
                }
            }
        }
        let visible = exprs.len();

        for expr in self
            .where_clause
            .iter_mut()
            .chain(self.group_by.iter_mut())
            .chain(self.having.iter_mut())
        {
            unresolved.extend(expr.resolve_column_references(compiler, &group, outer)?);
        }

        for sort in order_by.iter_mut() {
            if let Some(position) = sort.output_position(&names)? {
                sort.column = Some(position);
                continue;
            }
            let mut expr = sort.expr.clone();
            unresolved.extend(expr.resolve_column_references(compiler, &group, outer)?);
            let position = match exprs[..visible].iter().position(|e| *e == expr) {
                Some(position) => position,
                None => {
                    exprs.push(expr);
                    names.push(String::new());
                    exprs.len() - 1
                }
            };
            sort.column = Some(position);
        }

        for reference in group.outer_references() {
            if !outer_references.contains(&reference) {
                outer_references.push(reference);
            }
        }
        let uses_work_table = group.ranges().iter().any(|range| match &range.source {
            RangeSource::WorkTable { .. } => true,
            RangeSource::Derived(query) => query.uses_work_table(),
            _ => false,
        }) || exprs
            .iter()
            .chain(self.where_clause.iter())
            .chain(self.having.iter())
            .chain(self.group_by.iter())
            .any(reads_work_table)
            || join_conditions(&self.join_tree)
                .into_iter()
                .any(reads_work_table);

        self.exprs = exprs;
        self.names = names;
        self.visible = visible;
        self.outer_references = outer_references;
        self.uses_work_table = uses_work_table;
        Ok(unresolved)
    }

    fn add_table_ref(
        &mut self,
        item: TableRef,
        compiler: &mut CompileContext,
        outer: &[&RangeGroup<'_>],
        unresolved: &mut Vec<String>,
        outer_references: &mut Vec<Expression>,
    ) -> SqlResult<JoinTree> {
        match item {
            TableRef::Named { name, alias } => {
                let range = compiler.resolve_named_range(&name, alias)?;
                self.ranges.push(range);
                Ok(JoinTree::Range(self.ranges.len() - 1))
            }
            TableRef::Derived {
                query,
                alias,
                columns,
            } => {
                let mut query = *query;
                // A derived table sees the enclosing queries but not the
                // other items of its own FROM clause.
                query.resolve(compiler, outer)?;
                outer_references.extend(query.outer_references().iter().cloned());
                let range_id = compiler.next_range_id();
                let range = RangeVariable::for_query(range_id, alias, columns.as_deref(), query)?;
                self.ranges.push(range);
                Ok(JoinTree::Range(self.ranges.len() - 1))
            }
            TableRef::Join {
                kind,
                left,
                right,
                condition,
            } => {
                let first = self.ranges.len();
                let left =
                    self.add_table_ref(*left, compiler, outer, unresolved, outer_references)?;
                let right =
                    self.add_table_ref(*right, compiler, outer, unresolved, outer_references)?;
                let condition = match condition {
                    Some(mut condition) => {
                        let group = RangeGroup::new(&self.ranges[first..]);
                        unresolved.extend(condition.resolve_column_references(
                            compiler, &group, outer,
                        )?);
                        outer_references.extend(group.outer_references());
                        Some(condition)
                    }
                    None => None,
                };
                Ok(JoinTree::Join {
                    kind,
                    left: Box::new(left),
                    right: Box::new(right),
                    condition,
                })
            }
        }
    }

    /// Type every expression, validate grouping, assign set-function slots
    /// and plan the joins.
    pub fn resolve_types(&mut self, compiler: &mut CompileContext) -> SqlResult<()> {
        for expr in self.exprs.iter_mut().chain(self.group_by.iter_mut()) {
            expr.resolve_types()?;
        }
        if let Some(condition) = &mut self.where_clause {
            resolve_condition(condition, "WHERE")?;
        }
        for condition in self.join_tree.conditions_mut() {
            resolve_condition(condition, "ON")?;
        }
        if let Some(having) = &mut self.having {
            resolve_condition(having, "HAVING")?;
        }

        if self.where_clause.as_ref().is_some_and(|e| e.contains_aggregate()) {
            return Err(SqlError::InvalidAggregate("in WHERE clause".to_string()));
        }
        if self.group_by.iter().any(|e| e.contains_aggregate()) {
            return Err(SqlError::InvalidAggregate("in GROUP BY clause".to_string()));
        }
        if self
            .join_tree
            .conditions_mut()
            .iter()
            .any(|e| e.contains_aggregate())
        {
            return Err(SqlError::InvalidAggregate("in ON condition".to_string()));
        }
        for expr in self.exprs.iter().chain(self.having.iter()) {
            if let Some(nested) = find_nested_aggregate(expr) {
                return Err(SqlError::InvalidAggregate(format!(
                    "nested set function {}",
                    nested.get_sql()
                )));
            }
        }

        self.grouped = !self.group_by.is_empty()
            || self.having.is_some()
            || self.exprs.iter().any(|e| e.contains_aggregate());
        if self.grouped {
            let local: BTreeSet<usize> = self.ranges.iter().map(|r| r.range_id).collect();
            for expr in self.exprs.iter().chain(self.having.iter()) {
                if !expr.is_composed_of(&self.group_by, &local) {
                    return Err(SqlError::NotGroupingExpression(expr.get_sql()));
                }
            }
        }
        if self.distinct && self.exprs.len() > self.visible {
            return Err(SqlError::Unsupported(
                "ORDER BY expression not in the select list of SELECT DISTINCT".to_string(),
            ));
        }

        let mut aggregates = Vec::new();
        for expr in self.exprs.iter_mut().chain(self.having.iter_mut()) {
            assign_aggregate_slots(expr, compiler, &mut aggregates);
        }
        self.aggregates = aggregates;

        let tree = std::mem::replace(&mut self.join_tree, JoinTree::Empty);
        self.plan = Some(plan_ranges(&self.ranges, tree, self.where_clause.take())?);
        Ok(())
    }

    pub fn rebind_tables(&mut self, catalog: &Catalog) -> SqlResult<()> {
        for range in &mut self.ranges {
            let replacement = match &range.source {
                RangeSource::Table(table) => {
                    let current = catalog.get_table(table.name())?;
                    (!Arc::ptr_eq(&current, table)).then_some(current)
                }
                _ => None,
            };
            if let Some(table) = replacement {
                range.swap_table(table)?;
            }
            match &mut range.source {
                RangeSource::Derived(query) => query.rebind_tables(catalog)?,
                RangeSource::Recursive(query) => query.rebind_tables(catalog)?,
                _ => {}
            }
        }
        let plan = self
            .plan
            .as_mut()
            .ok_or_else(|| SqlError::invariant("rebinding an unplanned query"))?;
        plan.refresh_indexes(&self.ranges)?;
        for expr in plan
            .expressions_mut()
            .into_iter()
            .chain(self.exprs.iter_mut())
            .chain(self.group_by.iter_mut())
            .chain(self.having.iter_mut())
        {
            rebind_subqueries(expr, catalog)?;
        }
        Ok(())
    }

    /// Output rows, hidden sort columns included
    pub fn get_rows(&self, ctx: &mut ExecutionContext) -> SqlResult<Vec<Vec<Value>>> {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| SqlError::invariant("query specification executed before planning"))?;
        let mut rows = if self.grouped {
            self.grouped_rows(plan, ctx)?
        } else {
            collect_rows(plan, &self.ranges, &self.exprs, ctx)?
        };
        if self.distinct {
            let mut seen = HashSet::new();
            rows.retain(|row| seen.insert(row.clone()));
        }
        Ok(rows)
    }

    fn grouped_rows(
        &self,
        plan: &QueryPlan,
        ctx: &mut ExecutionContext,
    ) -> SqlResult<Vec<Vec<Value>>> {
        let range_ids: Vec<usize> = self.ranges.iter().map(|r| r.range_id).collect();
        let new_accumulators = || -> Vec<SetFunctionAggregator> {
            self.aggregates
                .iter()
                .map(|a| SetFunctionAggregator::new(a.function, a.distinct))
                .collect()
        };

        let mut positions: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();
        plan.for_each(&self.ranges, ctx, &mut |ctx| {
            let key = self
                .group_by
                .iter()
                .map(|e| e.get_value(ctx))
                .collect::<SqlResult<Vec<_>>>()?;
            let position = match positions.get(&key) {
                Some(&position) => position,
                None => {
                    groups.push(Group {
                        snapshot: ctx.snapshot_rows(&range_ids),
                        accumulators: new_accumulators(),
                    });
                    positions.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };
            let group = &mut groups[position];
            for (aggregate, accumulator) in
                self.aggregates.iter().zip(group.accumulators.iter_mut())
            {
                match &aggregate.arg {
                    None => accumulator.add_row(),
                    Some(arg) => accumulator.add(arg.get_value(ctx)?)?,
                }
            }
            Ok(())
        })?;

        if groups.is_empty() && self.group_by.is_empty() {
            groups.push(Group {
                snapshot: self
                    .ranges
                    .iter()
                    .map(|r| Some(vec![Value::Null; r.width()]))
                    .collect(),
                accumulators: new_accumulators(),
            });
        }
        debug!("grouped into {} groups", groups.len());

        let mut rows = Vec::with_capacity(groups.len());
        let mut nulls_eliminated = false;
        for group in groups {
            ctx.restore_rows(&range_ids, &group.snapshot);
            for (aggregate, accumulator) in self.aggregates.iter().zip(group.accumulators.iter()) {
                nulls_eliminated |= accumulator.null_count() > 0;
                ctx.set_aggregate(aggregate.slot, accumulator.get_value()?);
            }
            if let Some(having) = &self.having {
                if !having.test_condition(ctx)? {
                    continue;
                }
            }
            rows.push(
                self.exprs
                    .iter()
                    .map(|e| e.get_value(ctx))
                    .collect::<SqlResult<Vec<_>>>()?,
            );
        }
        if nulls_eliminated && ctx.config.null_elimination_warnings {
            warn!("null value eliminated in set function");
            ctx.add_warning("null value eliminated in set function");
        }
        Ok(rows)
    }
}

pub(crate) fn resolve_condition(condition: &mut Expression, clause: &str) -> SqlResult<()> {
    condition.resolve_types()?;
    match condition.data_type() {
        None | Some(DataType::Boolean) | Some(DataType::Null) => Ok(()),
        Some(other) => Err(SqlError::type_mismatch(format!(
            "{} condition {} has type {}",
            clause,
            condition.get_sql(),
            other
        ))),
    }
}

fn join_conditions(tree: &JoinTree) -> Vec<&Expression> {
    match tree {
        JoinTree::Empty | JoinTree::Range(_) => Vec::new(),
        JoinTree::Join {
            left,
            right,
            condition,
            ..
        } => {
            let mut conditions = join_conditions(left);
            conditions.extend(join_conditions(right));
            conditions.extend(condition.iter());
            conditions
        }
    }
}

/// A set function whose argument holds another set function
fn find_nested_aggregate(expr: &Expression) -> Option<&Expression> {
    match &expr.kind {
        ExprKind::Aggregate { arg: Some(arg), .. } if arg.contains_aggregate() => Some(expr),
        _ => expr.children().into_iter().find_map(find_nested_aggregate),
    }
}

fn assign_aggregate_slots(
    expr: &mut Expression,
    compiler: &mut CompileContext,
    out: &mut Vec<AggregateSlot>,
) {
    if let ExprKind::Aggregate {
        function,
        distinct,
        arg,
        slot,
    } = &mut expr.kind
    {
        let assigned = compiler.next_aggregate_slot();
        *slot = Some(assigned);
        out.push(AggregateSlot {
            slot: assigned,
            function: *function,
            distinct: *distinct,
            arg: arg.as_deref().cloned(),
        });
        return;
    }
    for child in expr.children_mut() {
        assign_aggregate_slots(child, compiler, out);
    }
}

/// Whether evaluating the expression reads a recursive work table
pub(crate) fn reads_work_table(expr: &Expression) -> bool {
    match &expr.kind {
        ExprKind::Subquery { query, .. } => query.uses_work_table(),
        _ => expr.children().into_iter().any(reads_work_table),
    }
}

pub(crate) fn rebind_subqueries(expr: &mut Expression, catalog: &Catalog) -> SqlResult<()> {
    if let ExprKind::Subquery { query, .. } = &mut expr.kind {
        return query.rebind_tables(catalog);
    }
    for child in expr.children_mut() {
        rebind_subqueries(child, catalog)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnInfo;
    use crate::config::EngineConfig;
    use crate::query::QueryBody;

    fn catalog() -> Arc<Catalog> {
        let catalog = Arc::new(Catalog::new());
        let t = catalog
            .create_table(
                "t",
                vec![
                    ColumnInfo::new("g", DataType::Int32),
                    ColumnInfo::new("v", DataType::Int32),
                ],
            )
            .unwrap();
        for (g, v) in [(1, Some(10)), (1, Some(20)), (2, None), (2, Some(5))] {
            t.insert_row(vec![
                Value::Int32(g),
                v.map(Value::Int32).unwrap_or(Value::Null),
            ])
            .unwrap();
        }
        catalog
    }

    fn query(spec: QuerySpecification) -> QueryExpression {
        QueryExpression::new(QueryBody::Specification(Box::new(spec)))
    }

    fn from_t(select_list: Vec<SelectItem>) -> QuerySpecification {
        let mut spec = QuerySpecification::new(select_list);
        spec.from.push(TableRef::Named {
            name: "t".to_string(),
            alias: None,
        });
        spec
    }

    #[test]
    fn test_group_by_with_null_elimination_warning() {
        let catalog = catalog();
        let mut spec = from_t(vec![
            SelectItem::Expr(Expression::column("g", None)),
            SelectItem::Expr(Expression::aggregate(
                SetFunction::Count,
                false,
                Some(Expression::column("v", None)),
            )),
        ]);
        spec.group_by.push(Expression::column("g", None));
        let mut q = query(spec);
        q.order_by.push(SortSpec::new(Expression::column("g", None), false));
        let mut compiler = CompileContext::new(catalog.clone());
        q.resolve(&mut compiler, &[]).unwrap();

        let mut ctx = ExecutionContext::new(catalog, EngineConfig::default(), 0);
        let result = q.get_result(&mut ctx).unwrap();
        assert_eq!(
            result.rows,
            vec![
                vec![Value::Int32(1), Value::BigInt(2)],
                vec![Value::Int32(2), Value::BigInt(1)],
            ]
        );
        assert_eq!(ctx.take_warnings().len(), 1);
    }

    #[test]
    fn test_aggregate_over_empty_input_yields_one_row() {
        let catalog = catalog();
        let mut spec = from_t(vec![SelectItem::Expr(Expression::aggregate(
            SetFunction::Count,
            false,
            None,
        ))]);
        spec.where_clause = Some(Expression::boolean(false));
        let mut q = query(spec);
        let mut compiler = CompileContext::new(catalog.clone());
        q.resolve(&mut compiler, &[]).unwrap();
        let mut ctx = ExecutionContext::new(catalog, EngineConfig::default(), 0);
        assert_eq!(
            q.get_result(&mut ctx).unwrap().rows,
            vec![vec![Value::BigInt(0)]]
        );
    }

    #[test]
    fn test_ungrouped_column_is_rejected() {
        let catalog = catalog();
        let spec = from_t(vec![
            SelectItem::Expr(Expression::column("v", None)),
            SelectItem::Expr(Expression::aggregate(SetFunction::Count, false, None)),
        ]);
        let mut q = query(spec);
        let mut compiler = CompileContext::new(catalog);
        assert!(matches!(
            q.resolve(&mut compiler, &[]),
            Err(SqlError::NotGroupingExpression(_))
        ));
    }

    #[test]
    fn test_aggregate_in_where_is_rejected() {
        let catalog = catalog();
        let mut spec = from_t(vec![SelectItem::Wildcard(None)]);
        spec.where_clause = Some(Expression::eq(
            Expression::aggregate(SetFunction::Count, false, None),
            Expression::value(Value::Int32(1)),
        ));
        let mut q = query(spec);
        let mut compiler = CompileContext::new(catalog);
        assert!(matches!(
            q.resolve(&mut compiler, &[]),
            Err(SqlError::InvalidAggregate(_))
        ));
    }

    #[test]
    fn test_hidden_order_by_column_is_trimmed() {
        let catalog = catalog();
        let spec = from_t(vec![SelectItem::Expr(Expression::column("g", None))]);
        let mut q = query(spec);
        q.order_by.push(SortSpec::new(Expression::column("v", None), true));
        let mut compiler = CompileContext::new(catalog.clone());
        q.resolve(&mut compiler, &[]).unwrap();
        assert_eq!(q.degree(), 1);

        let mut ctx = ExecutionContext::new(catalog, EngineConfig::default(), 0);
        let result = q.get_result(&mut ctx).unwrap();
        assert_eq!(
            result.first_column(),
            vec![
                Value::Int32(1),
                Value::Int32(1),
                Value::Int32(2),
                Value::Int32(2)
            ]
        );
        assert_eq!(result.rows[0].len(), 1);
    }
}
