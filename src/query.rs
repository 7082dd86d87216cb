//! Query expressions: SELECT specifications, set operations, common table
//! expressions and the ORDER BY / LIMIT applied on top of them.
//!
//! A query goes through three phases before it can run:
//!
//! 1. reference resolution binds FROM items and column references
//! 2. type resolution types every expression, validates grouping and
//!    unifies set-operation branches
//! 3. planning distributes conditions over the join tree
//!
//! After that the query is `Ready` and [`QueryExpression::get_result`] can
//! be called any number of times with different execution contexts.

pub mod compiler;
pub mod recursive;
pub mod result;
pub mod set_operation;
pub mod specification;

pub use compiler::{CompileContext, CteDefinition};
pub use recursive::RecursiveQuery;
pub use result::{ResultColumn, RowSet};
pub use set_operation::{SetOperation, SetOperator};
pub use specification::{QuerySpecification, SelectItem, TableRef};

use crate::access::{DataType, Value};
use crate::catalog::Catalog;
use crate::error::{SqlError, SqlResult};
use crate::executor::ExecutionContext;
use crate::expression::type_checker::{coerce_to, is_convertible};
use crate::expression::{ExprKind, Expression};
use crate::range::{RangeColumn, RangeGroup};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolveState {
    Unresolved,
    ReferencesResolved,
    TypesResolvedPart1,
    TypesResolvedPart2,
    Ready,
}

#[derive(Debug, Clone)]
pub enum QueryBody {
    Specification(Box<QuerySpecification>),
    SetOperation(Box<SetOperation>),
}

#[derive(Debug, Clone)]
pub struct WithClause {
    pub recursive: bool,
    pub ctes: Vec<CteDefinition>,
}

/// One ORDER BY item
#[derive(Debug, Clone)]
pub struct SortSpec {
    pub expr: Expression,
    pub descending: bool,
    /// Position of the sort key in the body's output, hidden columns
    /// included
    pub(crate) column: Option<usize>,
}

impl SortSpec {
    pub fn new(expr: Expression, descending: bool) -> Self {
        Self {
            expr,
            descending,
            column: None,
        }
    }

    /// Position named by an ordinal or by an output column name. `None`
    /// when the item is some other expression.
    pub(crate) fn output_position(&self, names: &[String]) -> SqlResult<Option<usize>> {
        match &self.expr.kind {
            ExprKind::Value(value) => match value.as_integer() {
                Some(n) if n >= 1 && (n as usize) <= names.len() => Ok(Some(n as usize - 1)),
                Some(n) => Err(SqlError::Parse(format!(
                    "ORDER BY position {} is not in the select list",
                    n
                ))),
                None => Ok(None),
            },
            ExprKind::Column(column) if column.qualifier.is_none() => {
                let mut matches = names
                    .iter()
                    .enumerate()
                    .filter(|(_, name)| **name == column.name);
                match (matches.next(), matches.next()) {
                    (Some((position, _)), None) => Ok(Some(position)),
                    (Some(_), Some(_)) => {
                        Err(SqlError::AmbiguousColumnReference(column.name.clone()))
                    }
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }
}

/// A complete query: body, ordering and row limits, with the WITH clause
/// whose definitions are visible inside it.
#[derive(Debug, Clone)]
pub struct QueryExpression {
    pub with: Option<WithClause>,
    pub body: QueryBody,
    pub order_by: Vec<SortSpec>,
    pub limit: Option<Expression>,
    pub offset: Option<Expression>,
    sql: String,
    state: ResolveState,
    columns: Vec<ResultColumn>,
    outer_references: Vec<Expression>,
    uses_work_table: bool,
}

impl QueryExpression {
    pub fn new(body: QueryBody) -> Self {
        Self {
            with: None,
            body,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            sql: String::new(),
            state: ResolveState::Unresolved,
            columns: Vec::new(),
            outer_references: Vec::new(),
            uses_work_table: false,
        }
    }

    pub fn from_specification(spec: QuerySpecification) -> Self {
        Self::new(QueryBody::Specification(Box::new(spec)))
    }

    /// Record the source text the query was parsed from
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = sql.into();
        self
    }

    pub fn get_sql(&self) -> &str {
        &self.sql
    }

    pub fn state(&self) -> ResolveState {
        self.state
    }

    /// Resolve references, then types. Unresolved names are an error here.
    pub fn resolve(
        &mut self,
        compiler: &mut CompileContext,
        outer: &[&RangeGroup<'_>],
    ) -> SqlResult<()> {
        let unresolved = self.resolve_references(compiler, outer)?;
        if !unresolved.is_empty() {
            return Err(SqlError::UnresolvedColumn(unresolved));
        }
        self.resolve_types(compiler)
    }

    /// Bind FROM items and column references. `outer` lists the range
    /// groups of the enclosing queries, innermost first. Names that bind
    /// nowhere are returned.
    pub fn resolve_references(
        &mut self,
        compiler: &mut CompileContext,
        outer: &[&RangeGroup<'_>],
    ) -> SqlResult<Vec<String>> {
        if self.state >= ResolveState::ReferencesResolved {
            return Ok(Vec::new());
        }
        if let Some(with) = &self.with {
            compiler.push_ctes(with);
        }
        let result = self.resolve_body_references(compiler, outer);
        if self.with.is_some() {
            compiler.pop_ctes();
        }
        let unresolved = result?;
        self.state = ResolveState::ReferencesResolved;
        Ok(unresolved)
    }

    fn resolve_body_references(
        &mut self,
        compiler: &mut CompileContext,
        outer: &[&RangeGroup<'_>],
    ) -> SqlResult<Vec<String>> {
        let mut unresolved = match &mut self.body {
            QueryBody::Specification(spec) => {
                spec.resolve_references(compiler, outer, &mut self.order_by)?
            }
            QueryBody::SetOperation(operation) => {
                let unresolved = operation.resolve_references(compiler, outer)?;
                let names = operation.column_names();
                for sort in &mut self.order_by {
                    match sort.output_position(&names)? {
                        Some(position) => sort.column = Some(position),
                        None => {
                            return Err(SqlError::UnresolvedColumn(vec![sort.expr.get_sql()]))
                        }
                    }
                }
                unresolved
            }
        };

        let no_ranges = [];
        let empty = RangeGroup::new(&no_ranges);
        for expr in self.limit.iter_mut().chain(self.offset.iter_mut()) {
            unresolved.extend(expr.resolve_column_references(compiler, &empty, &[])?);
        }

        let (outer_references, uses_work_table) = match &self.body {
            QueryBody::Specification(spec) => {
                (spec.outer_references().to_vec(), spec.uses_work_table())
            }
            QueryBody::SetOperation(operation) => (
                operation.outer_references().to_vec(),
                operation.uses_work_table(),
            ),
        };
        self.outer_references = outer_references;
        self.uses_work_table = uses_work_table;
        Ok(unresolved)
    }

    pub fn resolve_types(&mut self, compiler: &mut CompileContext) -> SqlResult<()> {
        if self.state >= ResolveState::Ready {
            return Ok(());
        }
        if self.state < ResolveState::ReferencesResolved {
            return Err(SqlError::invariant(
                "query types resolved before its references",
            ));
        }
        match &mut self.body {
            QueryBody::Specification(spec) => spec.resolve_types(compiler)?,
            QueryBody::SetOperation(operation) => operation.resolve_types(compiler)?,
        }
        self.state = ResolveState::TypesResolvedPart1;

        for expr in self.limit.iter_mut().chain(self.offset.iter_mut()) {
            expr.resolve_types()?;
            let data_type = expr.data_type().cloned().unwrap_or(DataType::Null);
            if !data_type.is_integral() && !is_convertible(&data_type, &DataType::BigInt) {
                return Err(SqlError::type_mismatch(format!(
                    "row limit {} is not an integer",
                    expr.get_sql()
                )));
            }
            coerce_to(expr, &DataType::BigInt)?;
        }
        self.state = ResolveState::TypesResolvedPart2;

        self.columns = match &self.body {
            QueryBody::Specification(spec) => spec.result_columns(),
            QueryBody::SetOperation(operation) => operation.result_columns(),
        };
        self.state = ResolveState::Ready;
        Ok(())
    }

    /// Visible output columns
    pub fn result_columns(&self) -> &[ResultColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        match &self.body {
            QueryBody::Specification(spec) => spec.column_names(),
            QueryBody::SetOperation(operation) => operation.column_names(),
        }
    }

    pub fn column_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type.clone()).collect()
    }

    pub fn range_columns(&self) -> Vec<RangeColumn> {
        self.columns
            .iter()
            .map(|c| RangeColumn::new(c.name.clone(), c.data_type.clone()))
            .collect()
    }

    pub fn degree(&self) -> usize {
        self.columns.len()
    }

    /// Columns of enclosing queries read anywhere inside this query
    pub fn outer_references(&self) -> &[Expression] {
        &self.outer_references
    }

    pub fn is_correlated(&self) -> bool {
        !self.outer_references.is_empty()
    }

    /// Whether the result depends on the work table of a recursive query
    pub fn uses_work_table(&self) -> bool {
        self.uses_work_table
    }

    /// Point every base-table range at the catalog's current version of
    /// its table. Fails when a column the query reads has moved or
    /// changed type.
    pub fn rebind_tables(&mut self, catalog: &Catalog) -> SqlResult<()> {
        match &mut self.body {
            QueryBody::Specification(spec) => spec.rebind_tables(catalog),
            QueryBody::SetOperation(operation) => operation.rebind_tables(catalog),
        }
    }

    /// Evaluate the query. Hidden sort columns are removed from the
    /// result.
    pub fn get_result(&self, ctx: &mut ExecutionContext) -> SqlResult<RowSet> {
        if self.state != ResolveState::Ready {
            return Err(SqlError::invariant(format!(
                "query executed in state {:?}",
                self.state
            )));
        }
        let mut rows = match &self.body {
            QueryBody::Specification(spec) => spec.get_rows(ctx)?,
            QueryBody::SetOperation(operation) => operation.get_rows(ctx)?,
        };

        if !self.order_by.is_empty() {
            let keys: Vec<(usize, bool)> = self
                .order_by
                .iter()
                .filter_map(|s| s.column.map(|c| (c, s.descending)))
                .collect();
            rows.sort_by(|a, b| compare_rows(a, b, &keys));
        }

        let offset = row_limit(self.offset.as_ref(), ctx)?.unwrap_or(0);
        let limit = row_limit(self.limit.as_ref(), ctx)?;
        let visible = self.columns.len();
        let rows = rows
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .map(|mut row| {
                row.truncate(visible);
                row
            })
            .collect();
        Ok(RowSet::new(self.columns.clone(), rows))
    }
}

fn compare_rows(a: &[Value], b: &[Value], keys: &[(usize, bool)]) -> Ordering {
    for &(column, descending) in keys {
        let ordering = a[column].cmp(&b[column]);
        let ordering = if descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn row_limit(expr: Option<&Expression>, ctx: &mut ExecutionContext) -> SqlResult<Option<usize>> {
    let value = match expr {
        Some(expr) => expr.get_value(ctx)?,
        None => return Ok(None),
    };
    match value {
        Value::Null => Ok(None),
        value => match value.as_integer() {
            Some(n) if n >= 0 => Ok(Some(n as usize)),
            _ => Err(SqlError::InvalidConversion(format!(
                "invalid row limit {}",
                value.to_display_string()
            ))),
        },
    }
}
