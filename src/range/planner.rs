//! Join planning.
//!
//! The FROM clause arrives as a [`JoinTree`]. Ranges are evaluated
//! left-deep in tree order, except that the preserved side of a RIGHT join
//! is evaluated before the nullable side. Every conjunct of WHERE and of the
//! ON conditions is attached to the earliest point of that order where all
//! of its columns are available:
//!
//! - normally the range whose row completes the conjunct's inputs, where it
//!   filters rows before any range after it is visited
//! - an outer join node, when the completing range sits on a nullable side
//!   the conjunct did not originate in; it then filters joined rows after
//!   null extension
//!
//! WHERE conjuncts holding subqueries are kept back and evaluated once per
//! complete joined row. Equality conjuncts against values known before a
//! base-table range is visited become index keys for that range.

use crate::catalog::IndexInfo;
use crate::error::{SqlError, SqlResult};
use crate::expression::{BinaryOperator, ExprKind, Expression};
use crate::range::RangeVariable;
use log::debug;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Cross,
    Left,
    Right,
}

impl JoinKind {
    pub fn is_outer(self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Right)
    }

    pub fn sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Cross => "CROSS JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

/// Shape of a resolved FROM clause. Leaves are positions in the owning
/// query's range list.
#[derive(Debug, Clone)]
pub enum JoinTree {
    Empty,
    Range(usize),
    Join {
        kind: JoinKind,
        left: Box<JoinTree>,
        right: Box<JoinTree>,
        condition: Option<Expression>,
    },
}

impl JoinTree {
    pub fn cross(left: JoinTree, right: JoinTree) -> JoinTree {
        match left {
            JoinTree::Empty => right,
            left => JoinTree::Join {
                kind: JoinKind::Cross,
                left: Box::new(left),
                right: Box::new(right),
                condition: None,
            },
        }
    }

    pub fn conditions_mut(&mut self) -> Vec<&mut Expression> {
        match self {
            JoinTree::Empty | JoinTree::Range(_) => Vec::new(),
            JoinTree::Join {
                left,
                right,
                condition,
                ..
            } => {
                let mut conditions = left.conditions_mut();
                conditions.extend(right.conditions_mut());
                conditions.extend(condition.iter_mut());
                conditions
            }
        }
    }
}

/// How a base-table range reads its rows
#[derive(Debug, Clone)]
pub enum AccessPath {
    Scan,
    /// Equi-lookup on a leading prefix of the index key
    Index {
        index: IndexInfo,
        key: Vec<Expression>,
    },
}

/// Visit of one range with the conjuncts attached to it
#[derive(Debug, Clone)]
pub struct RangeAccess {
    pub position: usize,
    pub access: AccessPath,
    pub filters: Vec<Expression>,
}

#[derive(Debug, Clone)]
pub enum PlanNode {
    /// No FROM clause: a single empty row
    Empty,
    Range(RangeAccess),
    Join {
        kind: JoinKind,
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        /// Conjuncts evaluated on joined rows, after null extension
        post_filters: Vec<Expression>,
    },
}

impl PlanNode {
    /// Range positions of this subtree
    pub fn positions(&self, out: &mut Vec<usize>) {
        match self {
            PlanNode::Empty => {}
            PlanNode::Range(access) => out.push(access.position),
            PlanNode::Join { left, right, .. } => {
                left.positions(out);
                right.positions(out);
            }
        }
    }

    fn expressions_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Expression>) {
        match self {
            PlanNode::Empty => {}
            PlanNode::Range(access) => {
                out.extend(access.filters.iter_mut());
                if let AccessPath::Index { key, .. } = &mut access.access {
                    out.extend(key.iter_mut());
                }
            }
            PlanNode::Join {
                left,
                right,
                post_filters,
                ..
            } => {
                left.expressions_mut(out);
                right.expressions_mut(out);
                out.extend(post_filters.iter_mut());
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub root: PlanNode,
    /// WHERE conjuncts with subqueries, tested on complete rows
    pub residual: Vec<Expression>,
}

impl QueryPlan {
    /// Every expression held by the plan, for rebinding nested subqueries
    pub fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        let mut out = Vec::new();
        self.root.expressions_mut(&mut out);
        out.extend(self.residual.iter_mut());
        out
    }

    /// Re-read index descriptors after the ranges were rebound to new
    /// table versions. An index that is gone or has a different key fails.
    pub fn refresh_indexes(&mut self, ranges: &[RangeVariable]) -> SqlResult<()> {
        self.root.refresh_indexes(ranges)
    }
}

impl PlanNode {
    fn refresh_indexes(&mut self, ranges: &[RangeVariable]) -> SqlResult<()> {
        match self {
            PlanNode::Empty => Ok(()),
            PlanNode::Join { left, right, .. } => {
                left.refresh_indexes(ranges)?;
                right.refresh_indexes(ranges)
            }
            PlanNode::Range(access) => {
                let index = match &mut access.access {
                    AccessPath::Index { index, .. } => index,
                    AccessPath::Scan => return Ok(()),
                };
                let current = ranges[access.position]
                    .table()
                    .and_then(|table| table.find_index(&index.index_name));
                match current {
                    Some(current) if current.key_columns == index.key_columns => {
                        *index = current;
                        Ok(())
                    }
                    _ => Err(SqlError::ObjectNotFound(index.index_name.clone())),
                }
            }
        }
    }
}

/// Build the plan for `ranges` joined as `tree` and filtered by `condition`.
pub fn plan_ranges(
    ranges: &[RangeVariable],
    tree: JoinTree,
    condition: Option<Expression>,
) -> SqlResult<QueryPlan> {
    let mut planner = Planner::new(ranges);
    let mut pending = Vec::new();
    planner.visit(&tree, &[], &mut pending);

    let mut residual = Vec::new();
    for conjunct in condition.map(Expression::split_conjuncts).unwrap_or_default() {
        if planner.order.is_empty() || conjunct.contains_subquery() {
            residual.push(conjunct);
        } else {
            pending.push(Pending {
                conjunct,
                origin_chain: Vec::new(),
                origin_first: 0,
            });
        }
    }
    for item in pending {
        planner.place(item)?;
    }

    let mut next_join = 0;
    let root = planner.build(tree, &mut next_join)?;
    debug!(
        "planned {} ranges in order {:?}, {} residual conjuncts",
        ranges.len(),
        planner.order,
        residual.len()
    );
    Ok(QueryPlan { root, residual })
}

struct Pending {
    conjunct: Expression,
    /// Outer joins whose nullable side contains the conjunct's origin
    origin_chain: Vec<usize>,
    /// Evaluation rank of the first range of the origin subtree
    origin_first: usize,
}

struct Planner<'a> {
    ranges: &'a [RangeVariable],
    /// Range positions in evaluation order
    order: Vec<usize>,
    rank: HashMap<usize, usize>,
    /// Outer joins whose nullable side contains each range position
    chains: HashMap<usize, Vec<usize>>,
    positions_by_id: HashMap<usize, usize>,
    leaf_filters: HashMap<usize, Vec<Expression>>,
    post_filters: HashMap<usize, Vec<Expression>>,
    next_join: usize,
}

impl<'a> Planner<'a> {
    fn new(ranges: &'a [RangeVariable]) -> Self {
        let positions_by_id = ranges
            .iter()
            .enumerate()
            .map(|(position, range)| (range.range_id, position))
            .collect();
        Self {
            ranges,
            order: Vec::new(),
            rank: HashMap::new(),
            chains: HashMap::new(),
            positions_by_id,
            leaf_filters: HashMap::new(),
            post_filters: HashMap::new(),
            next_join: 0,
        }
    }

    /// Number join nodes in pre-order, fix the evaluation order and collect
    /// ON conjuncts with their origin.
    fn visit(&mut self, tree: &JoinTree, chain: &[usize], pending: &mut Vec<Pending>) {
        match tree {
            JoinTree::Empty => {}
            JoinTree::Range(position) => {
                self.rank.insert(*position, self.order.len());
                self.order.push(*position);
                self.chains.insert(*position, chain.to_vec());
            }
            JoinTree::Join {
                kind,
                left,
                right,
                condition,
            } => {
                let id = self.next_join;
                self.next_join += 1;
                let start = self.order.len();
                let (first, second) = match kind {
                    JoinKind::Right => (right, left),
                    _ => (left, right),
                };
                self.visit(first, chain, pending);

                let second_start = self.order.len();
                let mut second_chain = chain.to_vec();
                if kind.is_outer() {
                    second_chain.push(id);
                }
                self.visit(second, &second_chain, pending);

                if let Some(condition) = condition {
                    let (origin_chain, origin_first) = if kind.is_outer() {
                        (second_chain, second_start)
                    } else {
                        (chain.to_vec(), start)
                    };
                    for conjunct in condition.clone().split_conjuncts() {
                        pending.push(Pending {
                            conjunct,
                            origin_chain: origin_chain.clone(),
                            origin_first,
                        });
                    }
                }
            }
        }
    }

    fn place(&mut self, item: Pending) -> SqlResult<()> {
        let mut range_ids = BTreeSet::new();
        item.conjunct.collect_range_ids(&mut range_ids);
        let mut rank = item.origin_first;
        for range_id in range_ids {
            if let Some(position) = self.positions_by_id.get(&range_id) {
                rank = rank.max(self.rank[position]);
            }
        }
        let position = *self
            .order
            .get(rank)
            .ok_or_else(|| SqlError::invariant("conjunct placed past the last range"))?;
        let chain = &self.chains[&position];
        if chain.len() <= item.origin_chain.len() {
            self.leaf_filters
                .entry(position)
                .or_default()
                .push(item.conjunct);
        } else {
            let join = chain[item.origin_chain.len()];
            self.post_filters.entry(join).or_default().push(item.conjunct);
        }
        Ok(())
    }

    fn build(&mut self, tree: JoinTree, next_join: &mut usize) -> SqlResult<PlanNode> {
        match tree {
            JoinTree::Empty => Ok(PlanNode::Empty),
            JoinTree::Range(position) => {
                let filters = self.leaf_filters.remove(&position).unwrap_or_default();
                let access = self.choose_access(position, &filters);
                Ok(PlanNode::Range(RangeAccess {
                    position,
                    access,
                    filters,
                }))
            }
            JoinTree::Join {
                kind, left, right, ..
            } => {
                let id = *next_join;
                *next_join += 1;
                let left = self.build(*left, next_join)?;
                let right = self.build(*right, next_join)?;
                Ok(PlanNode::Join {
                    kind,
                    left: Box::new(left),
                    right: Box::new(right),
                    post_filters: self.post_filters.remove(&id).unwrap_or_default(),
                })
            }
        }
    }

    /// Pick an index for a base-table range from its `column = value`
    /// filters: a unique index fully covered by such filters, or else the
    /// index with the longest covered key prefix.
    fn choose_access(&self, position: usize, filters: &[Expression]) -> AccessPath {
        let range = &self.ranges[position];
        let table = match range.table() {
            Some(table) => table,
            None => return AccessPath::Scan,
        };

        let mut candidates: HashMap<usize, &Expression> = HashMap::new();
        for filter in filters {
            if let ExprKind::Binary {
                op: BinaryOperator::Eq,
                left,
                right,
            } = &filter.kind
            {
                for (column_side, value_side) in [(left, right), (right, left)] {
                    let column = match column_side.binding() {
                        Some(binding) if binding.range_id == range.range_id => binding.column,
                        _ => continue,
                    };
                    if self.usable_key(position, column, value_side) {
                        candidates.entry(column).or_insert(value_side);
                    }
                }
            }
        }
        if candidates.is_empty() {
            return AccessPath::Scan;
        }

        let indexes = table.indexes();
        let covered = |index: &IndexInfo| {
            index
                .key_columns
                .iter()
                .take_while(|c| candidates.contains_key(c))
                .count()
        };
        let chosen = indexes
            .iter()
            .find(|index| index.is_unique && covered(index) == index.key_columns.len())
            .map(|index| (index, index.key_columns.len()))
            .or_else(|| {
                indexes
                    .iter()
                    .map(|index| (index, covered(index)))
                    .filter(|(_, n)| *n > 0)
                    .max_by_key(|(_, n)| *n)
            });

        match chosen {
            Some((index, prefix)) => {
                let key = index.key_columns[..prefix]
                    .iter()
                    .map(|c| candidates[c].clone())
                    .collect();
                debug!(
                    "range {} uses index {} on {} key columns",
                    range.name, index.index_name, prefix
                );
                AccessPath::Index {
                    index: index.clone(),
                    key,
                }
            }
            None => AccessPath::Scan,
        }
    }

    /// A probe value must be computable before the range is visited and
    /// have exactly the column's type.
    fn usable_key(&self, position: usize, column: usize, value: &Expression) -> bool {
        if value.contains_subquery() || value.contains_aggregate() || value.flags.no_optimisation {
            return false;
        }
        if value.data_type() != Some(&self.ranges[position].columns[column].data_type) {
            return false;
        }
        let mut range_ids = BTreeSet::new();
        value.collect_range_ids(&mut range_ids);
        let own_rank = self.rank[&position];
        range_ids.iter().all(|id| match self.positions_by_id.get(id) {
            Some(other) => self.rank[other] < own_rank,
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Value};
    use crate::catalog::{Catalog, ColumnInfo};
    use crate::expression::ColumnBinding;

    fn ranges() -> Vec<RangeVariable> {
        let catalog = Catalog::new();
        let t = catalog
            .create_table(
                "t",
                vec![
                    ColumnInfo::new("a", DataType::Int32),
                    ColumnInfo::new("b", DataType::Int32),
                ],
            )
            .unwrap();
        t.add_index("t_a", vec![0], true);
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
        vec![
            RangeVariable::for_table(0, None, t),
            RangeVariable::for_table(1, None, u),
        ]
    }

    fn col(range_id: usize, column: usize) -> Expression {
        Expression::bound_column(
            format!("c{}", column),
            None,
            ColumnBinding { range_id, column },
            DataType::Int32,
        )
    }

    fn eq(left: Expression, right: Expression) -> Expression {
        let mut e = Expression::eq(left, right);
        e.data_type = Some(DataType::Boolean);
        e
    }

    fn join(kind: JoinKind, condition: Option<Expression>) -> JoinTree {
        JoinTree::Join {
            kind,
            left: Box::new(JoinTree::Range(0)),
            right: Box::new(JoinTree::Range(1)),
            condition,
        }
    }

    #[test]
    fn test_inner_join_condition_drives_index_lookup() {
        let ranges = ranges();
        let plan = plan_ranges(
            &ranges,
            join(JoinKind::Inner, Some(eq(col(1, 0), col(0, 0)))),
            None,
        )
        .unwrap();
        match plan.root {
            PlanNode::Join { right, .. } => match *right {
                PlanNode::Range(access) => {
                    assert_eq!(access.filters.len(), 1);
                    assert!(matches!(
                        access.access,
                        AccessPath::Index { ref index, .. } if index.index_name == "u_a"
                    ))
                }
                other => panic!("unexpected node {:?}", other),
            },
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_where_on_nullable_side_filters_after_extension() {
        let ranges = ranges();
        let where_clause = Expression::unary(
            crate::expression::UnaryOperator::IsNull,
            col(1, 1),
        );
        let plan = plan_ranges(
            &ranges,
            join(JoinKind::Left, Some(eq(col(1, 0), col(0, 0)))),
            Some(where_clause),
        )
        .unwrap();
        match plan.root {
            PlanNode::Join {
                right,
                post_filters,
                ..
            } => {
                assert_eq!(post_filters.len(), 1);
                match *right {
                    PlanNode::Range(access) => assert_eq!(access.filters.len(), 1),
                    other => panic!("unexpected node {:?}", other),
                }
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_constant_key_uses_unique_index() {
        let ranges = ranges();
        let plan = plan_ranges(
            &ranges[..1],
            JoinTree::Range(0),
            Some(eq(col(0, 0), Expression::value(Value::Int32(3)))),
        )
        .unwrap();
        match plan.root {
            PlanNode::Range(access) => {
                assert!(matches!(
                    access.access,
                    AccessPath::Index { ref index, .. } if index.index_name == "t_a"
                ))
            }
            other => panic!("unexpected node {:?}", other),
        }
        assert!(plan.residual.is_empty());
    }

    #[test]
    fn test_no_from_clause_keeps_conditions_residual() {
        let plan = plan_ranges(&[], JoinTree::Empty, Some(Expression::boolean(true))).unwrap();
        assert!(matches!(plan.root, PlanNode::Empty));
        assert_eq!(plan.residual.len(), 1);
    }
}
