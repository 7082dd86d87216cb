//! Sessions: parse, compile and run statements against a shared catalog.

use crate::access::Value;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::ddl;
use crate::error::{SqlError, SqlResult};
use crate::executor::{DataChange, ExecutionContext, Executor};
use crate::query::RowSet;
use crate::sql::{CompiledStatement, Parser, Statement, StatementCompiler};
use log::debug;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of one statement
#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    Rows(RowSet),
    /// Rows inserted, updated or deleted by the statement itself
    UpdateCount(usize),
    /// Schema statements
    Ok,
}

impl StatementResult {
    pub fn rows(&self) -> Option<&RowSet> {
        match self {
            StatementResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn update_count(&self) -> Option<usize> {
        match self {
            StatementResult::UpdateCount(count) => Some(*count),
            _ => None,
        }
    }
}

/// A compiled statement kept for repeated execution with `?` parameters
pub struct PreparedStatement {
    sql: String,
    statement: CompiledStatement,
    parameter_count: usize,
    schema_version: u64,
}

impl PreparedStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }
}

/// One connection's view of a database.
///
/// Queries run under a shared lock; data changes and schema changes take
/// the exclusive lock so that a statement's undo log is never interleaved
/// with another writer.
pub struct Session {
    catalog: Arc<Catalog>,
    config: EngineConfig,
    lock: Arc<RwLock<()>>,
    warnings: Vec<String>,
}

impl Session {
    pub fn new(catalog: Arc<Catalog>, config: EngineConfig, lock: Arc<RwLock<()>>) -> Self {
        Self {
            catalog,
            config,
            lock,
            warnings: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse, compile and run one statement
    pub fn execute(&mut self, sql: &str) -> SqlResult<StatementResult> {
        debug!("execute: {}", sql);
        let (statement, parameter_count) = parse(sql)?;
        if parameter_count > 0 {
            return Err(SqlError::Parse(format!(
                "statement has {} parameters; prepare it to supply values",
                parameter_count
            )));
        }
        if statement.is_ddl() {
            return self.run_schema(statement);
        }
        let compiled = StatementCompiler::new(self.catalog.clone()).compile(statement)?;
        self.run(&compiled, Vec::new())
    }

    pub fn prepare(&self, sql: &str) -> SqlResult<PreparedStatement> {
        let (statement, parameter_count) = parse(sql)?;
        let schema_version = self.catalog.schema_version();
        let statement = StatementCompiler::new(self.catalog.clone()).compile(statement)?;
        Ok(PreparedStatement {
            sql: sql.to_string(),
            statement,
            parameter_count,
            schema_version,
        })
    }

    /// Run a prepared statement. After a schema change the statement is
    /// pointed at the current tables, or compiled again from its text when
    /// that is not possible.
    pub fn execute_prepared(
        &mut self,
        prepared: &mut PreparedStatement,
        parameters: Vec<Value>,
    ) -> SqlResult<StatementResult> {
        if parameters.len() != prepared.parameter_count {
            return Err(SqlError::DegreeMismatch {
                expected: prepared.parameter_count,
                actual: parameters.len(),
            });
        }
        let version = self.catalog.schema_version();
        if version != prepared.schema_version {
            if let Err(e) = prepared.statement.rebind_tables(&self.catalog) {
                debug!("recompiling after schema change ({}): {}", e, prepared.sql);
                let (statement, _) = parse(&prepared.sql)?;
                prepared.statement =
                    StatementCompiler::new(self.catalog.clone()).compile(statement)?;
            }
            prepared.schema_version = version;
        }
        if let CompiledStatement::Schema(statement) = &prepared.statement {
            return self.run_schema(statement.clone());
        }
        self.run(&prepared.statement, parameters)
    }

    /// Warnings raised since the last call, oldest first
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.catalog.clone(), self.config.clone(), current_timestamp())
    }

    fn run(
        &mut self,
        statement: &CompiledStatement,
        parameters: Vec<Value>,
    ) -> SqlResult<StatementResult> {
        let mut ctx = self.context().with_parameters(parameters);
        let result = match statement {
            CompiledStatement::Query(query) => {
                let _guard = self.lock.read();
                query.get_result(&mut ctx).map(StatementResult::Rows)
            }
            CompiledStatement::Insert(insert) => apply(&self.lock, &mut ctx, insert),
            CompiledStatement::Update(update) => apply(&self.lock, &mut ctx, update),
            CompiledStatement::Delete(delete) => apply(&self.lock, &mut ctx, delete),
            CompiledStatement::Schema(_) => Err(SqlError::invariant(
                "schema statement reached the data path",
            )),
        };
        self.warnings.extend(ctx.take_warnings());
        result
    }

    fn run_schema(&mut self, statement: Statement) -> SqlResult<StatementResult> {
        let mut ctx = self.context();
        let _guard = self.lock.write();
        ddl::execute(&mut ctx, statement)?;
        Ok(StatementResult::Ok)
    }
}

/// Run a data-change executor as one atomic statement
fn apply(
    lock: &RwLock<()>,
    ctx: &mut ExecutionContext,
    executor: &dyn Executor,
) -> SqlResult<StatementResult> {
    let _guard = lock.write();
    let mut change = DataChange::new();
    let outcome = executor
        .execute(ctx, &mut change)
        .and_then(|count| change.finish(ctx).map(|_| count));
    match outcome {
        Ok(count) => Ok(StatementResult::UpdateCount(count)),
        Err(e) => {
            change.rollback();
            Err(e)
        }
    }
}

fn parse(sql: &str) -> SqlResult<(Statement, usize)> {
    let mut parser = Parser::new(sql)?;
    let statement = parser.parse()?;
    Ok((statement, parser.parameter_count()))
}

/// Milliseconds since the Unix epoch; fixed for the duration of a statement
fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
