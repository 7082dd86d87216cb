//! Grouping validity: whether an expression can be computed from a set of
//! grouping expressions alone.

use crate::expression::{ExprKind, Expression};
use std::collections::BTreeSet;

impl Expression {
    /// True when the value of this expression is fixed once the values of
    /// `candidates` are fixed.
    ///
    /// Literals and parameters always qualify, as do columns of enclosing
    /// queries (constant for one evaluation of the query owning
    /// `local_ranges`). Set functions are computed per group and are never
    /// inspected. Subquery and EXISTS nodes are judged as a unit through the
    /// local columns they read from the enclosing scope. Functions without
    /// arguments qualify. Anything else qualifies when all of its operands do.
    pub fn is_composed_of(
        &self,
        candidates: &[Expression],
        local_ranges: &BTreeSet<usize>,
    ) -> bool {
        match &self.kind {
            ExprKind::Value(_) | ExprKind::Parameter(_) => return true,
            _ => {}
        }
        if candidates.contains(self) {
            return true;
        }
        match &self.kind {
            ExprKind::Column(column) => match column.binding {
                Some(binding) => !local_ranges.contains(&binding.range_id),
                None => false,
            },
            ExprKind::Aggregate { .. } => true,
            ExprKind::Subquery { query, .. } => query
                .outer_references()
                .iter()
                .all(|reference| reference.is_composed_of(candidates, local_ranges)),
            ExprKind::Exists(subquery) => subquery.is_composed_of(candidates, local_ranges),
            ExprKind::Function { args, .. } if args.is_empty() => true,
            _ => self
                .children()
                .iter()
                .all(|child| child.is_composed_of(candidates, local_ranges)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Value};
    use crate::database::Database;
    use crate::error::SqlError;
    use crate::expression::{BinaryOperator, ColumnBinding, Function, SetFunction};
    use crate::session::Session;

    fn column(range_id: usize, column: usize) -> Expression {
        Expression::bound_column(
            format!("c{}", column),
            None,
            ColumnBinding { range_id, column },
            DataType::Int32,
        )
    }

    fn local() -> BTreeSet<usize> {
        [0].into_iter().collect()
    }

    #[test]
    fn test_grouping_column_and_literals() {
        let group_by = vec![column(0, 0)];
        let expr = Expression::binary(
            BinaryOperator::Add,
            column(0, 0),
            Expression::value(Value::Int32(1)),
        );
        assert!(expr.is_composed_of(&group_by, &local()));
        assert!(Expression::parameter(0).is_composed_of(&[], &local()));
    }

    #[test]
    fn test_bare_column_outside_group_is_rejected() {
        let group_by = vec![column(0, 0)];
        let expr = Expression::binary(BinaryOperator::Add, column(0, 0), column(0, 1));
        assert!(!expr.is_composed_of(&group_by, &local()));
    }

    #[test]
    fn test_whole_expression_match() {
        let grouped = Expression::binary(BinaryOperator::Add, column(0, 0), column(0, 1));
        let expr = Expression::binary(
            BinaryOperator::Mul,
            grouped.duplicate(),
            Expression::value(Value::Int32(2)),
        );
        assert!(expr.is_composed_of(&[grouped], &local()));
    }

    #[test]
    fn test_aggregates_are_opaque() {
        let expr = Expression::aggregate(SetFunction::Sum, false, Some(column(0, 1)));
        assert!(expr.is_composed_of(&[], &local()));
    }

    #[test]
    fn test_outer_columns_are_constant() {
        assert!(column(5, 0).is_composed_of(&[], &local()));
    }

    #[test]
    fn test_zero_argument_functions() {
        let now = Expression::function(Function::CurrentTimestamp, vec![]);
        assert!(now.is_composed_of(&[], &local()));
        let abs = Expression::function(Function::Abs, vec![column(0, 1)]);
        assert!(!abs.is_composed_of(&[], &local()));
    }

    fn grouped_tables(db: &Database) -> Session {
        let mut session = db.session();
        for sql in [
            "CREATE TABLE t (a INT, b INT)",
            "CREATE TABLE u (x INT)",
            "INSERT INTO t VALUES (1, 10), (1, 20), (2, 30)",
            "INSERT INTO u VALUES (1), (1), (30)",
        ] {
            session.execute(sql).unwrap();
        }
        session
    }

    #[test]
    fn test_correlated_subquery_on_grouping_column() {
        let db = Database::default();
        let mut s = grouped_tables(&db);
        let counts = s
            .execute(
                "SELECT a, (SELECT COUNT(*) FROM u WHERE u.x = t.a) FROM t \
                 GROUP BY a ORDER BY a",
            )
            .unwrap();
        assert_eq!(
            counts.rows().unwrap().rows,
            vec![
                vec![Value::Int32(1), Value::BigInt(2)],
                vec![Value::Int32(2), Value::BigInt(0)],
            ]
        );
        let exists = s
            .execute("SELECT a FROM t GROUP BY a HAVING EXISTS (SELECT 1 FROM u WHERE u.x = t.a)")
            .unwrap();
        assert_eq!(exists.rows().unwrap().first_column(), vec![Value::Int32(1)]);
    }

    #[test]
    fn test_correlated_subquery_on_ungrouped_column() {
        let db = Database::default();
        let mut s = grouped_tables(&db);
        assert!(matches!(
            s.execute("SELECT a, (SELECT COUNT(*) FROM u WHERE u.x = t.b) FROM t GROUP BY a"),
            Err(SqlError::NotGroupingExpression(_))
        ));
        assert!(matches!(
            s.execute("SELECT a FROM t GROUP BY a HAVING EXISTS (SELECT 1 FROM u WHERE u.x = t.b)"),
            Err(SqlError::NotGroupingExpression(_))
        ));
        let summed = s
            .execute("SELECT a FROM t GROUP BY a HAVING (SELECT SUM(x) FROM u) > 0 ORDER BY a")
            .unwrap();
        assert_eq!(
            summed.rows().unwrap().first_column(),
            vec![Value::Int32(1), Value::Int32(2)]
        );
    }
}
