//! CHECK conditions.
//!
//! A condition is always compiled from its SQL text, against a synthetic
//! range variable standing for the row being checked. After a structural
//! change to the table the text is compiled again against the new layout;
//! the old tree is never patched.

use crate::access::{DataType, Value};
use crate::catalog::{Catalog, Table};
use crate::error::{SqlError, SqlResult};
use crate::executor::ExecutionContext;
use crate::expression::Expression;
use crate::query::CompileContext;
use crate::range::{RangeGroup, RangeVariable};
use log::debug;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Range id the checked row is bound to
const CHECK_RANGE: usize = 0;

#[derive(Debug)]
pub struct CheckDefinition {
    sql: String,
    condition: Expression,
    columns: BTreeSet<usize>,
}

impl CheckDefinition {
    /// Parse and resolve a condition for the constraint `name` on `table`
    pub fn compile(
        name: &str,
        sql: &str,
        table: &Table,
        catalog: Arc<Catalog>,
    ) -> SqlResult<Self> {
        let mut condition = crate::sql::parse_expression(sql)?;
        let invalid = |reason: String| SqlError::InvalidCheckConstraint {
            constraint: name.to_string(),
            reason,
        };

        if condition.contains_subquery() {
            return Err(invalid("subqueries are not allowed".to_string()));
        }
        if condition.contains_aggregate() {
            return Err(invalid("set functions are not allowed".to_string()));
        }
        if condition.contains_parameter() {
            return Err(invalid("parameters are not allowed".to_string()));
        }
        if let Some(function) = condition.find_nondeterministic() {
            return Err(invalid(format!("{} is not deterministic", function.name())));
        }

        let ranges = [RangeVariable::synthetic(CHECK_RANGE, table)];
        let group = RangeGroup::new(&ranges);
        let mut compiler = CompileContext::new(catalog);
        let unresolved = condition.resolve_column_references(&mut compiler, &group, &[])?;
        if !unresolved.is_empty() {
            return Err(SqlError::UnresolvedColumn(unresolved));
        }
        condition.resolve_types()?;
        if condition.data_type() != Some(&DataType::Boolean) {
            return Err(invalid(format!("{} is not a boolean condition", sql)));
        }

        let mut bindings = Vec::new();
        condition.collect_bindings(&mut bindings);
        let columns = bindings.iter().map(|b| b.column).collect();
        debug!("compiled CHECK {} on {}: {}", name, table.name(), sql);
        Ok(Self {
            sql: sql.to_string(),
            condition,
            columns,
        })
    }

    pub fn get_sql(&self) -> &str {
        &self.sql
    }

    pub fn references_column(&self, column: usize) -> bool {
        self.columns.contains(&column)
    }

    /// Three-valued result of the condition for one row
    pub fn evaluate(&self, ctx: &ExecutionContext, row: &[Value]) -> SqlResult<Option<bool>> {
        let mut check_ctx = ctx.fork();
        check_ctx.set_row(CHECK_RANGE, row.to_vec());
        match self.condition.get_value(&mut check_ctx)? {
            Value::Boolean(b) => Ok(Some(b)),
            Value::Null => Ok(None),
            other => Err(SqlError::invariant(format!(
                "CHECK {} produced {}",
                self.sql, other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnInfo;
    use crate::config::EngineConfig;

    fn setup() -> (Arc<Catalog>, Arc<Table>) {
        let catalog = Arc::new(Catalog::new());
        let table = catalog
            .create_table(
                "t",
                vec![
                    ColumnInfo::new("a", DataType::Int32),
                    ColumnInfo::new("b", DataType::Int32),
                ],
            )
            .unwrap();
        (catalog, table)
    }

    #[test]
    fn test_null_result_is_unknown() {
        let (catalog, table) = setup();
        let check = CheckDefinition::compile("ck", "b > 0", &table, catalog.clone()).unwrap();
        let ctx = ExecutionContext::new(catalog, EngineConfig::default(), 0);

        assert_eq!(
            check.evaluate(&ctx, &[Value::Int32(1), Value::Int32(5)]).unwrap(),
            Some(true)
        );
        assert_eq!(
            check.evaluate(&ctx, &[Value::Int32(1), Value::Int32(-5)]).unwrap(),
            Some(false)
        );
        assert_eq!(
            check.evaluate(&ctx, &[Value::Int32(1), Value::Null]).unwrap(),
            None
        );
        assert!(check.references_column(1));
        assert!(!check.references_column(0));
    }

    #[test]
    fn test_rejected_conditions() {
        let (catalog, table) = setup();
        for sql in [
            "a > (SELECT MAX(a) FROM t)",
            "a = ?",
            "RAND() > 0.5",
            "a + 1",
        ] {
            assert!(
                matches!(
                    CheckDefinition::compile("ck", sql, &table, catalog.clone()),
                    Err(SqlError::InvalidCheckConstraint { .. })
                ),
                "{} should be rejected",
                sql
            );
        }
        assert!(matches!(
            CheckDefinition::compile("ck", "c > 0", &table, catalog),
            Err(SqlError::UnresolvedColumn(_))
        ));
    }

    #[test]
    fn test_text_round_trip() {
        let (catalog, table) = setup();
        let first = CheckDefinition::compile(
            "ck",
            "a BETWEEN 1 AND 10 OR b IS NULL",
            &table,
            catalog.clone(),
        )
        .unwrap();
        let text = first.condition.get_sql();
        let second = CheckDefinition::compile("ck", &text, &table, catalog.clone()).unwrap();
        let ctx = ExecutionContext::new(catalog, EngineConfig::default(), 0);
        for row in [
            vec![Value::Int32(5), Value::Int32(0)],
            vec![Value::Int32(50), Value::Int32(0)],
            vec![Value::Int32(50), Value::Null],
        ] {
            assert_eq!(
                first.evaluate(&ctx, &row).unwrap(),
                second.evaluate(&ctx, &row).unwrap()
            );
        }
    }
}
