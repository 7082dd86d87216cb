//! Expression tree definitions.

use crate::access::{DataType, Value};
use crate::expression::function::Function;
use crate::expression::operator::{BinaryOperator, UnaryOperator};
use crate::expression::set_function::SetFunction;
use crate::query::QueryExpression;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// Position of a resolved column: the range variable supplying the current
/// row and the column within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnBinding {
    pub range_id: usize,
    pub column: usize,
}

/// Column reference in an expression
#[derive(Debug, Clone)]
pub struct ColumnRef {
    pub name: String,
    /// Table name or alias qualifying the column, if written
    pub qualifier: Option<String>,
    /// Set by column resolution
    pub binding: Option<ColumnBinding>,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>, qualifier: Option<String>) -> Self {
        Self {
            name: name.into(),
            qualifier,
            binding: None,
        }
    }

    /// `qualifier.name` or just `name`
    pub fn display_name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}", q, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubqueryKind {
    /// Single value; becomes `Row` when the query has more than one column
    Scalar,
    Row,
    /// Row set consumed by IN, EXISTS and quantified comparisons
    Table,
    /// `ARRAY(SELECT ...)`
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Any,
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExprFlags {
    /// The subtree contains a set function of the enclosing query
    pub has_aggregate: bool,
    /// A subquery node whose query references enclosing range variables
    pub is_correlated: bool,
    /// The value may change between evaluations with the same inputs
    pub no_optimisation: bool,
}

/// Operation kind of an expression node, with its operands
#[derive(Debug, Clone)]
pub enum ExprKind {
    Value(Value),
    /// `?` placeholder, numbered from zero in order of appearance
    Parameter(usize),
    Column(ColumnRef),
    Row(Vec<Expression>),
    Array(Vec<Expression>),
    /// Parenthesised list on the right of IN
    ValueList(Vec<Expression>),
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `left op ANY|ALL right`; `right` is a value list or table subquery.
    /// IN is `= ANY`.
    Quantified {
        op: BinaryOperator,
        quantifier: Quantifier,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// EXISTS over a table subquery
    Exists(Box<Expression>),
    Case {
        operand: Option<Box<Expression>>,
        branches: Vec<(Expression, Expression)>,
        else_result: Option<Box<Expression>>,
    },
    /// Type conversion, written by the user or inserted by coercion
    Cast {
        operand: Box<Expression>,
        target: DataType,
    },
    Function {
        function: Function,
        args: Vec<Expression>,
    },
    Aggregate {
        function: SetFunction,
        distinct: bool,
        /// `None` for `COUNT(*)`
        arg: Option<Box<Expression>>,
        /// Accumulator slot assigned by the owning query
        slot: Option<usize>,
    },
    Subquery {
        kind: SubqueryKind,
        query: Box<QueryExpression>,
        /// Result cache key, assigned at resolution
        id: usize,
    },
}

/// Expression tree node
#[derive(Debug, Clone)]
pub struct Expression {
    pub kind: ExprKind,
    /// Set by type resolution
    pub data_type: Option<DataType>,
    pub alias: Option<String>,
    pub flags: ExprFlags,
}

impl Expression {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            data_type: None,
            alias: None,
            flags: ExprFlags::default(),
        }
    }

    /// Create a literal expression; its type is known immediately
    pub fn value(value: Value) -> Self {
        let data_type = value.data_type().unwrap_or(DataType::Null);
        let mut expr = Self::new(ExprKind::Value(value));
        expr.data_type = Some(data_type);
        expr
    }

    pub fn null() -> Self {
        Self::value(Value::Null)
    }

    pub fn boolean(b: bool) -> Self {
        Self::value(Value::Boolean(b))
    }

    pub fn parameter(index: usize) -> Self {
        Self::new(ExprKind::Parameter(index))
    }

    /// Create an unresolved column reference
    pub fn column(name: impl Into<String>, qualifier: Option<String>) -> Self {
        Self::new(ExprKind::Column(ColumnRef::new(name, qualifier)))
    }

    /// Create a column reference that is already bound
    pub fn bound_column(
        name: impl Into<String>,
        qualifier: Option<String>,
        binding: ColumnBinding,
        data_type: DataType,
    ) -> Self {
        let mut column = ColumnRef::new(name, qualifier);
        column.binding = Some(binding);
        let mut expr = Self::new(ExprKind::Column(column));
        expr.data_type = Some(data_type);
        expr
    }

    pub fn row(fields: Vec<Expression>) -> Self {
        Self::new(ExprKind::Row(fields))
    }

    pub fn array(elements: Vec<Expression>) -> Self {
        Self::new(ExprKind::Array(elements))
    }

    pub fn value_list(elements: Vec<Expression>) -> Self {
        Self::new(ExprKind::ValueList(elements))
    }

    pub fn unary(op: UnaryOperator, operand: Expression) -> Self {
        Self::new(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Self::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::And, left, right)
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::Or, left, right)
    }

    pub fn not(operand: Expression) -> Self {
        Self::unary(UnaryOperator::Not, operand)
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::Eq, left, right)
    }

    pub fn quantified(
        op: BinaryOperator,
        quantifier: Quantifier,
        left: Expression,
        right: Expression,
    ) -> Self {
        Self::new(ExprKind::Quantified {
            op,
            quantifier,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// `left IN (list or subquery)`
    pub fn in_list(left: Expression, right: Expression) -> Self {
        Self::quantified(BinaryOperator::Eq, Quantifier::Any, left, right)
    }

    pub fn exists(subquery: Expression) -> Self {
        Self::new(ExprKind::Exists(Box::new(subquery)))
    }

    pub fn case(
        operand: Option<Expression>,
        branches: Vec<(Expression, Expression)>,
        else_result: Option<Expression>,
    ) -> Self {
        Self::new(ExprKind::Case {
            operand: operand.map(Box::new),
            branches,
            else_result: else_result.map(Box::new),
        })
    }

    pub fn cast(operand: Expression, target: DataType) -> Self {
        Self::new(ExprKind::Cast {
            operand: Box::new(operand),
            target,
        })
    }

    pub fn function(function: Function, args: Vec<Expression>) -> Self {
        Self::new(ExprKind::Function { function, args })
    }

    pub fn aggregate(function: SetFunction, distinct: bool, arg: Option<Expression>) -> Self {
        Self::new(ExprKind::Aggregate {
            function,
            distinct,
            arg: arg.map(Box::new),
            slot: None,
        })
    }

    pub fn subquery(kind: SubqueryKind, query: QueryExpression) -> Self {
        Self::new(ExprKind::Subquery {
            kind,
            query: Box::new(query),
            id: 0,
        })
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn is_value(&self) -> bool {
        matches!(self.kind, ExprKind::Value(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match &self.kind {
            ExprKind::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn binding(&self) -> Option<ColumnBinding> {
        self.as_column().and_then(|c| c.binding)
    }

    pub fn data_type(&self) -> Option<&DataType> {
        self.data_type.as_ref()
    }

    /// Column count of the value this node produces
    pub fn degree(&self) -> usize {
        match &self.kind {
            ExprKind::Row(fields) => fields.len(),
            ExprKind::Subquery {
                kind: SubqueryKind::Table | SubqueryKind::Row,
                query,
                ..
            } => query.degree(),
            _ => self.data_type.as_ref().map_or(1, |t| t.degree()),
        }
    }

    /// Name of the column this expression produces in a result
    pub fn output_name(&self) -> Option<String> {
        if let Some(alias) = &self.alias {
            return Some(alias.clone());
        }
        self.as_column().map(|c| c.name.clone())
    }

    /// Deep copy with independent node identities
    pub fn duplicate(&self) -> Expression {
        self.clone()
    }

    /// Direct operands. Subquery nodes are opaque and report none.
    pub fn children(&self) -> Vec<&Expression> {
        match &self.kind {
            ExprKind::Value(_)
            | ExprKind::Parameter(_)
            | ExprKind::Column(_)
            | ExprKind::Subquery { .. } => vec![],
            ExprKind::Row(items) | ExprKind::Array(items) | ExprKind::ValueList(items) => {
                items.iter().collect()
            }
            ExprKind::Unary { operand, .. } | ExprKind::Cast { operand, .. } => vec![operand],
            ExprKind::Binary { left, right, .. } | ExprKind::Quantified { left, right, .. } => {
                vec![left, right]
            }
            ExprKind::Exists(subquery) => vec![subquery],
            ExprKind::Case {
                operand,
                branches,
                else_result,
            } => {
                let mut children: Vec<&Expression> = Vec::new();
                if let Some(operand) = operand {
                    children.push(operand);
                }
                for (when, then) in branches {
                    children.push(when);
                    children.push(then);
                }
                if let Some(e) = else_result {
                    children.push(e);
                }
                children
            }
            ExprKind::Function { args, .. } => args.iter().collect(),
            ExprKind::Aggregate { arg, .. } => arg.iter().map(|a| a.as_ref()).collect(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expression> {
        match &mut self.kind {
            ExprKind::Value(_)
            | ExprKind::Parameter(_)
            | ExprKind::Column(_)
            | ExprKind::Subquery { .. } => vec![],
            ExprKind::Row(items) | ExprKind::Array(items) | ExprKind::ValueList(items) => {
                items.iter_mut().collect()
            }
            ExprKind::Unary { operand, .. } | ExprKind::Cast { operand, .. } => vec![operand],
            ExprKind::Binary { left, right, .. } | ExprKind::Quantified { left, right, .. } => {
                vec![left, right]
            }
            ExprKind::Exists(subquery) => vec![subquery],
            ExprKind::Case {
                operand,
                branches,
                else_result,
            } => {
                let mut children: Vec<&mut Expression> = Vec::new();
                if let Some(operand) = operand {
                    children.push(operand);
                }
                for (when, then) in branches.iter_mut() {
                    children.push(when);
                    children.push(then);
                }
                if let Some(e) = else_result {
                    children.push(e);
                }
                children
            }
            ExprKind::Function { args, .. } => args.iter_mut().collect(),
            ExprKind::Aggregate { arg, .. } => arg.iter_mut().map(|a| a.as_mut()).collect(),
        }
    }

    /// Split an AND tree into its conjuncts
    pub fn split_conjuncts(self) -> Vec<Expression> {
        match self.kind {
            ExprKind::Binary {
                op: BinaryOperator::And,
                left,
                right,
            } => {
                let mut conjuncts = left.split_conjuncts();
                conjuncts.extend(right.split_conjuncts());
                conjuncts
            }
            _ => vec![self],
        }
    }

    /// Rebuild an AND tree; `None` for an empty list
    pub fn combine_conjuncts(conjuncts: Vec<Expression>) -> Option<Expression> {
        conjuncts.into_iter().reduce(|acc, e| {
            let mut combined = Expression::and(acc, e);
            combined.data_type = Some(DataType::Boolean);
            combined
        })
    }

    /// Range ids of every column this expression reads, including the
    /// enclosing-scope columns read by nested subqueries.
    pub fn collect_range_ids(&self, out: &mut BTreeSet<usize>) {
        match &self.kind {
            ExprKind::Column(c) => {
                if let Some(binding) = c.binding {
                    out.insert(binding.range_id);
                }
            }
            ExprKind::Subquery { query, .. } => {
                for outer in query.outer_references() {
                    outer.collect_range_ids(out);
                }
            }
            _ => {
                for child in self.children() {
                    child.collect_range_ids(out);
                }
            }
        }
    }

    /// Every bound column in the tree outside subqueries
    pub fn collect_bindings(&self, out: &mut Vec<ColumnBinding>) {
        if let Some(binding) = self.binding() {
            out.push(binding);
        }
        for child in self.children() {
            child.collect_bindings(out);
        }
    }

    pub fn contains_subquery(&self) -> bool {
        matches!(self.kind, ExprKind::Subquery { .. })
            || self.children().iter().any(|c| c.contains_subquery())
    }

    pub fn contains_aggregate(&self) -> bool {
        matches!(self.kind, ExprKind::Aggregate { .. })
            || self.children().iter().any(|c| c.contains_aggregate())
    }

    pub fn contains_parameter(&self) -> bool {
        matches!(self.kind, ExprKind::Parameter(_))
            || self.children().iter().any(|c| c.contains_parameter())
    }

    /// First non-deterministic function in the tree, if any
    pub fn find_nondeterministic(&self) -> Option<Function> {
        if let ExprKind::Function { function, .. } = &self.kind {
            if !function.is_deterministic() {
                return Some(*function);
            }
        }
        self.children()
            .into_iter()
            .find_map(|c| c.find_nondeterministic())
    }

    /// SQL text that parses back to an equivalent expression
    pub fn get_sql(&self) -> String {
        match &self.kind {
            ExprKind::Value(v) => v.to_sql_string(),
            ExprKind::Parameter(_) => "?".to_string(),
            ExprKind::Column(c) => c.display_name(),
            ExprKind::Row(fields) => format!("ROW({})", join_sql(fields)),
            ExprKind::Array(elements) => format!("ARRAY[{}]", join_sql(elements)),
            ExprKind::ValueList(elements) => format!("({})", join_sql(elements)),
            ExprKind::Unary { op, operand } => match op {
                UnaryOperator::Not => format!("(NOT {})", operand.get_sql()),
                UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
                    format!("({} {})", operand.get_sql(), op.as_str())
                }
                UnaryOperator::Plus | UnaryOperator::Minus => {
                    format!("({}{})", op.as_str(), operand.get_sql())
                }
            },
            ExprKind::Binary { op, left, right } => {
                format!("({} {} {})", left.get_sql(), op.as_str(), right.get_sql())
            }
            ExprKind::Quantified {
                op,
                quantifier,
                left,
                right,
            } => {
                if *op == BinaryOperator::Eq && *quantifier == Quantifier::Any {
                    format!("({} IN {})", left.get_sql(), right.get_sql())
                } else {
                    let word = match quantifier {
                        Quantifier::Any => "ANY",
                        Quantifier::All => "ALL",
                    };
                    format!(
                        "({} {} {} {})",
                        left.get_sql(),
                        op.as_str(),
                        word,
                        right.get_sql()
                    )
                }
            }
            ExprKind::Exists(subquery) => format!("EXISTS {}", subquery.get_sql()),
            ExprKind::Case {
                operand,
                branches,
                else_result,
            } => {
                let mut sql = "CASE".to_string();
                if let Some(operand) = operand {
                    sql.push(' ');
                    sql.push_str(&operand.get_sql());
                }
                for (when, then) in branches {
                    sql.push_str(&format!(" WHEN {} THEN {}", when.get_sql(), then.get_sql()));
                }
                if let Some(e) = else_result {
                    sql.push_str(&format!(" ELSE {}", e.get_sql()));
                }
                sql.push_str(" END");
                sql
            }
            ExprKind::Cast { operand, target } => {
                format!("CAST({} AS {})", operand.get_sql(), target.sql_name())
            }
            ExprKind::Function { function, args } => {
                if args.is_empty() && function.is_niladic_keyword() {
                    function.name().to_string()
                } else {
                    format!("{}({})", function.name(), join_sql(args))
                }
            }
            ExprKind::Aggregate {
                function,
                distinct,
                arg,
                ..
            } => match arg {
                None => format!("{}(*)", function.name()),
                Some(arg) => format!(
                    "{}({}{})",
                    function.name(),
                    if *distinct { "DISTINCT " } else { "" },
                    arg.get_sql()
                ),
            },
            ExprKind::Subquery { kind, query, .. } => match kind {
                SubqueryKind::Array => format!("ARRAY({})", query.get_sql()),
                _ => format!("({})", query.get_sql()),
            },
        }
    }
}

fn join_sql(items: &[Expression]) -> String {
    items
        .iter()
        .map(|e| e.get_sql())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Structural equality used by GROUP BY / HAVING composition checks: same
/// kind, same type and equal operands. Aliases are ignored, bound columns
/// compare by binding and subqueries by their query text.
impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        if self.data_type != other.data_type {
            return false;
        }
        match (&self.kind, &other.kind) {
            (ExprKind::Value(a), ExprKind::Value(b)) => a == b,
            (ExprKind::Parameter(a), ExprKind::Parameter(b)) => a == b,
            (ExprKind::Column(a), ExprKind::Column(b)) => match (a.binding, b.binding) {
                (Some(x), Some(y)) => x == y,
                (None, None) => a.name == b.name && a.qualifier == b.qualifier,
                _ => false,
            },
            (ExprKind::Row(a), ExprKind::Row(b))
            | (ExprKind::Array(a), ExprKind::Array(b))
            | (ExprKind::ValueList(a), ExprKind::ValueList(b)) => a == b,
            (
                ExprKind::Unary { op: o1, operand: a },
                ExprKind::Unary { op: o2, operand: b },
            ) => o1 == o2 && a == b,
            (
                ExprKind::Binary {
                    op: o1,
                    left: l1,
                    right: r1,
                },
                ExprKind::Binary {
                    op: o2,
                    left: l2,
                    right: r2,
                },
            ) => o1 == o2 && l1 == l2 && r1 == r2,
            (
                ExprKind::Quantified {
                    op: o1,
                    quantifier: q1,
                    left: l1,
                    right: r1,
                },
                ExprKind::Quantified {
                    op: o2,
                    quantifier: q2,
                    left: l2,
                    right: r2,
                },
            ) => o1 == o2 && q1 == q2 && l1 == l2 && r1 == r2,
            (ExprKind::Exists(a), ExprKind::Exists(b)) => a == b,
            (
                ExprKind::Case {
                    operand: o1,
                    branches: b1,
                    else_result: e1,
                },
                ExprKind::Case {
                    operand: o2,
                    branches: b2,
                    else_result: e2,
                },
            ) => o1 == o2 && b1 == b2 && e1 == e2,
            (
                ExprKind::Cast {
                    operand: a,
                    target: t1,
                },
                ExprKind::Cast {
                    operand: b,
                    target: t2,
                },
            ) => t1 == t2 && a == b,
            (
                ExprKind::Function {
                    function: f1,
                    args: a1,
                },
                ExprKind::Function {
                    function: f2,
                    args: a2,
                },
            ) => f1 == f2 && a1 == a2,
            (
                ExprKind::Aggregate {
                    function: f1,
                    distinct: d1,
                    arg: a1,
                    ..
                },
                ExprKind::Aggregate {
                    function: f2,
                    distinct: d2,
                    arg: a2,
                    ..
                },
            ) => f1 == f2 && d1 == d2 && a1 == a2,
            (
                ExprKind::Subquery {
                    kind: k1,
                    query: q1,
                    ..
                },
                ExprKind::Subquery {
                    kind: k2,
                    query: q2,
                    ..
                },
            ) => k1 == k2 && q1.get_sql() == q2.get_sql(),
            _ => false,
        }
    }
}

impl Eq for Expression {}

impl Hash for Expression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.kind).hash(state);
        self.data_type.hash(state);
        match &self.kind {
            ExprKind::Value(v) => v.hash(state),
            ExprKind::Parameter(i) => i.hash(state),
            ExprKind::Column(c) => match c.binding {
                Some(binding) => binding.hash(state),
                None => {
                    c.name.hash(state);
                    c.qualifier.hash(state);
                }
            },
            ExprKind::Unary { op, .. } => op.hash(state),
            ExprKind::Binary { op, .. } | ExprKind::Quantified { op, .. } => op.hash(state),
            ExprKind::Cast { target, .. } => target.hash(state),
            ExprKind::Function { function, .. } => function.hash(state),
            ExprKind::Aggregate {
                function, distinct, ..
            } => {
                function.hash(state);
                distinct.hash(state);
            }
            ExprKind::Subquery { kind, query, .. } => {
                kind.hash(state);
                query.get_sql().hash(state);
            }
            _ => {}
        }
        for child in self.children() {
            child.hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Expression {
        Expression::column(name, None)
    }

    #[test]
    fn test_get_sql() {
        let expr = Expression::and(
            Expression::binary(
                BinaryOperator::Gt,
                col("a"),
                Expression::value(Value::Int32(1)),
            ),
            Expression::unary(UnaryOperator::IsNotNull, Expression::column("b", Some("t".into()))),
        );
        assert_eq!(expr.get_sql(), "((a > 1) AND (t.b IS NOT NULL))");

        let expr = Expression::in_list(
            col("a"),
            Expression::value_list(vec![
                Expression::value(Value::Int32(1)),
                Expression::value(Value::String("x".into())),
            ]),
        );
        assert_eq!(expr.get_sql(), "(a IN (1, 'x'))");

        let expr = Expression::aggregate(SetFunction::Count, false, None);
        assert_eq!(expr.get_sql(), "COUNT(*)");

        let expr = Expression::function(Function::CurrentTimestamp, vec![]);
        assert_eq!(expr.get_sql(), "CURRENT_TIMESTAMP");
    }

    #[test]
    fn test_equality_ignores_alias() {
        let a = Expression::binary(
            BinaryOperator::Add,
            col("a"),
            Expression::value(Value::Int32(1)),
        );
        let b = a.duplicate().with_alias("x");
        assert_eq!(a, b);

        let c = Expression::binary(
            BinaryOperator::Add,
            col("a"),
            Expression::value(Value::Int32(2)),
        );
        assert_ne!(a, c);
    }

    #[test]
    fn test_bound_columns_compare_by_binding() {
        let binding = ColumnBinding {
            range_id: 0,
            column: 1,
        };
        let a = Expression::bound_column("b", None, binding, DataType::Int32);
        let b = Expression::bound_column("b", Some("t".into()), binding, DataType::Int32);
        assert_eq!(a, b);
    }

    #[test]
    fn test_split_and_combine_conjuncts() {
        let expr = Expression::and(
            Expression::and(col("a"), col("b")),
            col("c"),
        );
        let conjuncts = expr.split_conjuncts();
        assert_eq!(conjuncts.len(), 3);
        let combined = Expression::combine_conjuncts(conjuncts).unwrap();
        assert_eq!(combined.get_sql(), "((a AND b) AND c)");
        assert!(Expression::combine_conjuncts(vec![]).is_none());
    }
}
