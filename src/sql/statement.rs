// SQL statement compilation - binds parsed statements against the catalog

use super::ast::*;
use crate::catalog::{Catalog, Table};
use crate::error::{SqlError, SqlResult};
use crate::executor::update::Assignment;
use crate::executor::{DeleteExecutor, InsertExecutor, InsertSource, UpdateExecutor};
use crate::expression::type_checker::{coerce_to, is_convertible};
use crate::expression::Expression;
use crate::query::specification::resolve_condition;
use crate::query::{CompileContext, QueryExpression};
use crate::range::{plan_ranges, JoinTree, QueryPlan, RangeGroup, RangeVariable};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

/// A statement ready to run. Schema statements are carried as parsed and
/// applied by the DDL module.
pub enum CompiledStatement {
    Query(QueryExpression),
    Insert(InsertExecutor),
    Update(UpdateExecutor),
    Delete(DeleteExecutor),
    Schema(Statement),
}

impl CompiledStatement {
    /// Point the statement at the catalog's current tables after a schema
    /// change. An error means the statement must be compiled again.
    pub fn rebind_tables(&mut self, catalog: &Catalog) -> SqlResult<()> {
        match self {
            CompiledStatement::Query(query) => query.rebind_tables(catalog),
            CompiledStatement::Insert(insert) => insert.rebind_tables(catalog),
            CompiledStatement::Update(update) => update.rebind_tables(catalog),
            CompiledStatement::Delete(delete) => delete.rebind_tables(catalog),
            CompiledStatement::Schema(_) => Ok(()),
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, CompiledStatement::Query(_))
    }
}

/// Converts parsed statements into compiled queries and executors
pub struct StatementCompiler {
    catalog: Arc<Catalog>,
}

impl StatementCompiler {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        StatementCompiler { catalog }
    }

    /// Compile a SQL statement for execution
    pub fn compile(&self, statement: Statement) -> SqlResult<CompiledStatement> {
        let mut compiler = CompileContext::new(self.catalog.clone());
        match statement {
            Statement::Query(query) => self.compile_query(&mut compiler, query),
            Statement::Insert(insert) => self.compile_insert(&mut compiler, insert),
            Statement::Update(update) => self.compile_update(&mut compiler, update),
            Statement::Delete(delete) => self.compile_delete(&mut compiler, delete),
            schema => Ok(CompiledStatement::Schema(schema)),
        }
    }

    fn compile_query(
        &self,
        compiler: &mut CompileContext,
        mut query: QueryExpression,
    ) -> SqlResult<CompiledStatement> {
        query.resolve(compiler, &[])?;
        debug!(
            "compiled query with {} columns: {}",
            query.degree(),
            query.get_sql()
        );
        Ok(CompiledStatement::Query(query))
    }

    fn compile_insert(
        &self,
        compiler: &mut CompileContext,
        insert: InsertStatement,
    ) -> SqlResult<CompiledStatement> {
        let table = self.catalog.get_table(&insert.table_name)?;
        let columns = match &insert.columns {
            Some(names) => {
                let columns = table.column_indexes(names)?;
                let mut seen = HashSet::new();
                if let Some(duplicate) = columns.iter().find(|c| !seen.insert(**c)) {
                    return Err(SqlError::Parse(format!(
                        "column {} listed twice in INSERT",
                        table.column(*duplicate).column_name
                    )));
                }
                columns
            }
            None => (0..table.column_count()).collect(),
        };

        let source = match insert.source {
            InsertSource::Values(mut rows) => {
                for row in &mut rows {
                    if row.len() != columns.len() {
                        return Err(SqlError::DegreeMismatch {
                            expected: columns.len(),
                            actual: row.len(),
                        });
                    }
                    for (expr, &column) in row.iter_mut().zip(columns.iter()) {
                        if let Some(expr) = expr {
                            resolve_free_expression(compiler, expr)?;
                            coerce_to(expr, &table.column(column).column_type)?;
                        }
                    }
                }
                InsertSource::Values(rows)
            }
            InsertSource::Query(mut query) => {
                query.resolve(compiler, &[])?;
                if query.degree() != columns.len() {
                    return Err(SqlError::DegreeMismatch {
                        expected: columns.len(),
                        actual: query.degree(),
                    });
                }
                for (source, &column) in query.column_types().iter().zip(columns.iter()) {
                    let target = &table.column(column).column_type;
                    if !is_convertible(source, target) {
                        return Err(SqlError::type_mismatch(format!(
                            "{} to {} for column {}",
                            source.sql_name(),
                            target.sql_name(),
                            table.column(column).column_name
                        )));
                    }
                }
                InsertSource::Query(query)
            }
            InsertSource::DefaultValues => InsertSource::DefaultValues,
        };

        debug!("compiled INSERT into {}", table.name());
        Ok(CompiledStatement::Insert(InsertExecutor::new(
            table, columns, source,
        )))
    }

    fn compile_update(
        &self,
        compiler: &mut CompileContext,
        update: UpdateStatement,
    ) -> SqlResult<CompiledStatement> {
        let table = self.catalog.get_table(&update.table_name)?;
        let range = RangeVariable::for_table(compiler.next_range_id(), update.alias, table.clone());
        let ranges = vec![range];

        let mut assignments = Vec::with_capacity(update.assignments.len());
        {
            let group = RangeGroup::new(&ranges);
            let mut seen = HashSet::new();
            for (name, value) in update.assignments {
                let column = table
                    .find_column(&name)
                    .ok_or_else(|| SqlError::UnresolvedColumn(vec![name.clone()]))?;
                if !seen.insert(column) {
                    return Err(SqlError::Parse(format!(
                        "column {} assigned twice in UPDATE",
                        name
                    )));
                }
                let info = table.column(column);
                if info.is_generated && value.is_some() {
                    return Err(SqlError::Unsupported(format!(
                        "assignment to generated column {}",
                        name
                    )));
                }
                let value = match value {
                    Some(mut expr) => {
                        resolve_row_expression(compiler, &group, &mut expr)?;
                        coerce_to(&mut expr, &info.column_type)?;
                        Some(expr)
                    }
                    None => None,
                };
                assignments.push(Assignment { column, value });
            }
        }

        let plan = plan_single_range(compiler, &ranges, update.where_clause)?;
        let range = ranges
            .into_iter()
            .next()
            .ok_or_else(|| SqlError::invariant("UPDATE without a target range"))?;
        debug!(
            "compiled UPDATE of {} with {} assignments",
            table.name(),
            assignments.len()
        );
        Ok(CompiledStatement::Update(UpdateExecutor::new(
            table,
            range,
            plan,
            assignments,
        )))
    }

    fn compile_delete(
        &self,
        compiler: &mut CompileContext,
        delete: DeleteStatement,
    ) -> SqlResult<CompiledStatement> {
        let table = self.catalog.get_table(&delete.table_name)?;
        let range = RangeVariable::for_table(compiler.next_range_id(), delete.alias, table.clone());
        let ranges = vec![range];
        let plan = plan_single_range(compiler, &ranges, delete.where_clause)?;
        let range = ranges
            .into_iter()
            .next()
            .ok_or_else(|| SqlError::invariant("DELETE without a target range"))?;
        debug!("compiled DELETE from {}", table.name());
        Ok(CompiledStatement::Delete(DeleteExecutor::new(
            table, range, plan,
        )))
    }
}

/// Resolve an expression that may not reference any column
pub(crate) fn resolve_free_expression(
    compiler: &mut CompileContext,
    expr: &mut Expression,
) -> SqlResult<()> {
    let no_ranges: [RangeVariable; 0] = [];
    let group = RangeGroup::new(&no_ranges);
    resolve_row_expression(compiler, &group, expr)
}

/// Resolve an expression evaluated once per row of `group`
fn resolve_row_expression(
    compiler: &mut CompileContext,
    group: &RangeGroup<'_>,
    expr: &mut Expression,
) -> SqlResult<()> {
    let unresolved = expr.resolve_column_references(compiler, group, &[])?;
    if !unresolved.is_empty() {
        return Err(SqlError::UnresolvedColumn(unresolved));
    }
    expr.resolve_types()?;
    if expr.contains_aggregate() {
        return Err(SqlError::InvalidAggregate(expr.get_sql()));
    }
    Ok(())
}

/// Plan the scan of a data-change target filtered by its WHERE clause
fn plan_single_range(
    compiler: &mut CompileContext,
    ranges: &[RangeVariable],
    where_clause: Option<Expression>,
) -> SqlResult<QueryPlan> {
    let condition = match where_clause {
        Some(mut condition) => {
            let group = RangeGroup::new(ranges);
            let unresolved = condition.resolve_column_references(compiler, &group, &[])?;
            if !unresolved.is_empty() {
                return Err(SqlError::UnresolvedColumn(unresolved));
            }
            resolve_condition(&mut condition, "WHERE")?;
            if condition.contains_aggregate() {
                return Err(SqlError::InvalidAggregate("in WHERE clause".to_string()));
            }
            Some(condition)
        }
        None => None,
    };
    plan_ranges(ranges, JoinTree::Range(0), condition)
}

/// Table a compiled data-change statement writes to
pub fn target_table(statement: &CompiledStatement) -> Option<&Arc<Table>> {
    match statement {
        CompiledStatement::Insert(insert) => Some(insert.table()),
        CompiledStatement::Update(update) => Some(update.table()),
        CompiledStatement::Delete(delete) => Some(delete.table()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Value};
    use crate::catalog::ColumnInfo;
    use crate::config::EngineConfig;
    use crate::executor::{DataChange, ExecutionContext, Executor};
    use crate::sql::parse_statement;

    fn setup() -> Arc<Catalog> {
        let catalog = Arc::new(Catalog::new());
        catalog
            .create_table(
                "t",
                vec![
                    ColumnInfo::new("a", DataType::Int32),
                    ColumnInfo::new("b", DataType::Varchar),
                ],
            )
            .unwrap();
        catalog
    }

    fn compile(catalog: &Arc<Catalog>, sql: &str) -> SqlResult<CompiledStatement> {
        StatementCompiler::new(catalog.clone()).compile(parse_statement(sql)?)
    }

    fn run(catalog: &Arc<Catalog>, sql: &str) -> usize {
        let mut ctx = ExecutionContext::new(catalog.clone(), EngineConfig::default(), 0);
        let mut change = DataChange::new();
        let count = match compile(catalog, sql).unwrap() {
            CompiledStatement::Insert(e) => e.execute(&mut ctx, &mut change).unwrap(),
            CompiledStatement::Update(e) => e.execute(&mut ctx, &mut change).unwrap(),
            CompiledStatement::Delete(e) => e.execute(&mut ctx, &mut change).unwrap(),
            _ => panic!("not a data change statement"),
        };
        change.finish(&ctx).unwrap();
        count
    }

    #[test]
    fn test_data_change_round() {
        let catalog = setup();
        assert_eq!(run(&catalog, "INSERT INTO t VALUES (1, 'x'), (2, 'y'), (3, 'z')"), 3);
        assert_eq!(run(&catalog, "UPDATE t SET b = b || '!' WHERE a >= 2"), 2);
        assert_eq!(run(&catalog, "DELETE FROM t WHERE b = 'x'"), 1);

        let table = catalog.get_table("t").unwrap();
        let rows: Vec<Vec<Value>> = table.row_iterator().map(|r| r.values).collect();
        assert_eq!(
            rows,
            vec![
                vec![Value::Int32(2), Value::String("y!".into())],
                vec![Value::Int32(3), Value::String("z!".into())],
            ]
        );
    }

    #[test]
    fn test_insert_errors() {
        let catalog = setup();
        assert!(matches!(
            compile(&catalog, "INSERT INTO t VALUES (1)"),
            Err(SqlError::DegreeMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            compile(&catalog, "INSERT INTO t (a, a) VALUES (1, 2)"),
            Err(SqlError::Parse(_))
        ));
        assert!(matches!(
            compile(&catalog, "INSERT INTO t (a) VALUES (c)"),
            Err(SqlError::UnresolvedColumn(_))
        ));
        assert!(matches!(
            compile(&catalog, "INSERT INTO missing VALUES (1)"),
            Err(SqlError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_update_errors() {
        let catalog = setup();
        assert!(matches!(
            compile(&catalog, "UPDATE t SET c = 1"),
            Err(SqlError::UnresolvedColumn(_))
        ));
        assert!(matches!(
            compile(&catalog, "UPDATE t SET a = 1 WHERE a"),
            Err(SqlError::TypeMismatch(_))
        ));
        assert!(matches!(
            compile(&catalog, "UPDATE t SET a = COUNT(*)"),
            Err(SqlError::InvalidAggregate(_))
        ));
    }

    #[test]
    fn test_schema_statements_pass_through() {
        let catalog = setup();
        assert!(matches!(
            compile(&catalog, "DROP TABLE t"),
            Ok(CompiledStatement::Schema(Statement::DropTable(_)))
        ));
    }
}
