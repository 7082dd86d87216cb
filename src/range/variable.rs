use crate::access::DataType;
use crate::catalog::Table;
use crate::error::{SqlError, SqlResult};
use crate::executor::{ExecutionContext, SharedRows};
use crate::expression::{ColumnBinding, ColumnRef, Expression};
use crate::query::{QueryExpression, RecursiveQuery};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

/// Column of a range as seen by the query
#[derive(Debug, Clone, PartialEq)]
pub struct RangeColumn {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl RangeColumn {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

/// Where the rows of a range come from
#[derive(Debug, Clone)]
pub enum RangeSource {
    Table(Arc<Table>),
    Derived(Box<QueryExpression>),
    Recursive(Box<RecursiveQuery>),
    /// The previous round of a recursive query, read from the context
    WorkTable { work_id: usize },
    /// Rows are placed in the context directly (CHECK evaluation)
    Synthetic,
}

/// One entry of a FROM clause
#[derive(Debug, Clone)]
pub struct RangeVariable {
    /// Slot of this range's current row in the execution context
    pub range_id: usize,
    /// Alias, or the table/CTE name when there is none
    pub name: String,
    pub source: RangeSource,
    pub columns: Vec<RangeColumn>,
    used_columns: RefCell<Vec<bool>>,
}

impl RangeVariable {
    fn new(range_id: usize, name: String, source: RangeSource, columns: Vec<RangeColumn>) -> Self {
        let used_columns = RefCell::new(vec![false; columns.len()]);
        Self {
            range_id,
            name,
            source,
            columns,
            used_columns,
        }
    }

    pub fn for_table(range_id: usize, alias: Option<String>, table: Arc<Table>) -> Self {
        let name = alias.unwrap_or_else(|| table.name().to_string());
        let columns = table_columns(&table);
        Self::new(range_id, name, RangeSource::Table(table), columns)
    }

    /// A derived table over an already resolved query. `column_names`
    /// renames the query's output columns and must match its degree.
    pub fn for_query(
        range_id: usize,
        name: String,
        column_names: Option<&[String]>,
        query: QueryExpression,
    ) -> SqlResult<Self> {
        let columns = renamed_columns(query.range_columns(), column_names)?;
        Ok(Self::new(
            range_id,
            name,
            RangeSource::Derived(Box::new(query)),
            columns,
        ))
    }

    pub fn for_recursive(range_id: usize, name: String, query: RecursiveQuery) -> Self {
        let columns = query.range_columns();
        Self::new(range_id, name, RangeSource::Recursive(Box::new(query)), columns)
    }

    pub fn for_work_table(
        range_id: usize,
        name: String,
        work_id: usize,
        columns: Vec<RangeColumn>,
    ) -> Self {
        Self::new(range_id, name, RangeSource::WorkTable { work_id }, columns)
    }

    /// A range over a table's columns whose row is supplied by the caller
    pub fn synthetic(range_id: usize, table: &Table) -> Self {
        Self::new(
            range_id,
            table.name().to_string(),
            RangeSource::Synthetic,
            table_columns(table),
        )
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn table(&self) -> Option<&Arc<Table>> {
        match &self.source {
            RangeSource::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn matches_qualifier(&self, qualifier: &str) -> bool {
        self.name == qualifier
    }

    pub fn mark_used(&self, column: usize) {
        if let Some(used) = self.used_columns.borrow_mut().get_mut(column) {
            *used = true;
        }
    }

    pub fn used_columns(&self) -> Vec<usize> {
        self.used_columns
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(i, used)| used.then_some(i))
            .collect()
    }

    /// Rebind to a structurally changed version of the same table. Every
    /// column the compiled statement reads must still exist at the same
    /// position with the same type, otherwise the statement needs to be
    /// compiled again.
    pub fn swap_table(&mut self, table: Arc<Table>) -> SqlResult<()> {
        let columns = table_columns(&table);
        for position in self.used_columns() {
            let old = &self.columns[position];
            match columns.get(position) {
                Some(new) if new.name == old.name && new.data_type == old.data_type => {}
                _ => {
                    return Err(SqlError::ObjectNotFound(format!(
                        "{}.{}",
                        table.name(),
                        old.name
                    )))
                }
            }
        }
        let mut used = self.used_columns.borrow().clone();
        used.resize(columns.len(), false);
        *self.used_columns.borrow_mut() = used;
        self.columns = columns;
        self.source = RangeSource::Table(table);
        Ok(())
    }

    /// Materialized rows of a non-table source. Results that do not depend
    /// on the enclosing row or on a work table are computed once per
    /// statement.
    pub fn source_rows(&self, ctx: &mut ExecutionContext) -> SqlResult<SharedRows> {
        match &self.source {
            RangeSource::Derived(query) => {
                let cacheable = !query.is_correlated() && !query.uses_work_table();
                if cacheable {
                    if let Some(rows) = ctx.cached_derived(self.range_id) {
                        return Ok(rows);
                    }
                }
                let rows = Rc::new(query.get_result(ctx)?.rows);
                if cacheable {
                    ctx.cache_derived(self.range_id, rows.clone());
                }
                Ok(rows)
            }
            RangeSource::Recursive(query) => {
                if let Some(rows) = ctx.cached_derived(self.range_id) {
                    return Ok(rows);
                }
                let rows = Rc::new(query.get_result(ctx)?);
                ctx.cache_derived(self.range_id, rows.clone());
                Ok(rows)
            }
            RangeSource::WorkTable { work_id } => ctx.work_table(*work_id),
            RangeSource::Table(_) | RangeSource::Synthetic => Err(SqlError::invariant(format!(
                "range {} has no materialized rows",
                self.name
            ))),
        }
    }
}

fn table_columns(table: &Table) -> Vec<RangeColumn> {
    table
        .columns()
        .iter()
        .map(|c| RangeColumn {
            name: c.column_name.clone(),
            data_type: c.column_type.clone(),
            nullable: c.nullable,
        })
        .collect()
}

fn renamed_columns(
    columns: Vec<RangeColumn>,
    names: Option<&[String]>,
) -> SqlResult<Vec<RangeColumn>> {
    match names {
        None => Ok(columns),
        Some(names) if names.len() != columns.len() => Err(SqlError::DegreeMismatch {
            expected: columns.len(),
            actual: names.len(),
        }),
        Some(names) => Ok(columns
            .into_iter()
            .zip(names.iter())
            .map(|(column, name)| RangeColumn {
                name: name.clone(),
                ..column
            })
            .collect()),
    }
}

/// The ranges of one query level.
///
/// Column lookups that fail here fall through to the enclosing groups; the
/// references bound that way are recorded on every group they cross.
pub struct RangeGroup<'a> {
    ranges: &'a [RangeVariable],
    correlated: Cell<bool>,
    outer_references: RefCell<Vec<Expression>>,
}

impl<'a> RangeGroup<'a> {
    pub fn new(ranges: &'a [RangeVariable]) -> Self {
        Self {
            ranges,
            correlated: Cell::new(false),
            outer_references: RefCell::new(Vec::new()),
        }
    }

    pub fn ranges(&self) -> &'a [RangeVariable] {
        self.ranges
    }

    /// Bind a column reference within this group. More than one candidate
    /// is an error; none is `Ok(None)`.
    pub fn lookup(&self, column: &ColumnRef) -> SqlResult<Option<(ColumnBinding, DataType)>> {
        let mut found: Option<(&RangeVariable, usize)> = None;
        for range in self.ranges {
            if let Some(qualifier) = &column.qualifier {
                if !range.matches_qualifier(qualifier) {
                    continue;
                }
            }
            if let Some(position) = range.find_column(&column.name) {
                if found.is_some() {
                    return Err(SqlError::AmbiguousColumnReference(column.display_name()));
                }
                found = Some((range, position));
            }
        }
        Ok(found.map(|(range, position)| {
            range.mark_used(position);
            (
                ColumnBinding {
                    range_id: range.range_id,
                    column: position,
                },
                range.columns[position].data_type.clone(),
            )
        }))
    }

    pub fn add_outer_reference(&self, reference: Expression) {
        self.correlated.set(true);
        let mut references = self.outer_references.borrow_mut();
        if !references.contains(&reference) {
            references.push(reference);
        }
    }

    pub fn is_correlated(&self) -> bool {
        self.correlated.get()
    }

    pub fn outer_references(&self) -> Vec<Expression> {
        self.outer_references.borrow().clone()
    }
}
