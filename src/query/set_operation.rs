//! UNION, INTERSECT and EXCEPT, with optional CORRESPONDING matching.

use crate::access::{aggregate_type, Value};
use crate::catalog::Catalog;
use crate::error::{SqlError, SqlResult};
use crate::executor::{convert_row, ExecutionContext};
use crate::expression::Expression;
use crate::query::{CompileContext, QueryExpression, ResultColumn};
use crate::range::RangeGroup;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

impl SetOperator {
    pub fn sql(self) -> &'static str {
        match self {
            SetOperator::Union => "UNION",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetOperation {
    pub operator: SetOperator,
    pub all: bool,
    /// `Some(vec![])` is CORRESPONDING without a column list
    pub corresponding: Option<Vec<String>>,
    pub left: Box<QueryExpression>,
    pub right: Box<QueryExpression>,
    left_map: Vec<usize>,
    right_map: Vec<usize>,
    names: Vec<String>,
    columns: Vec<ResultColumn>,
    outer_references: Vec<Expression>,
}

impl SetOperation {
    pub fn new(
        operator: SetOperator,
        all: bool,
        left: QueryExpression,
        right: QueryExpression,
    ) -> Self {
        Self {
            operator,
            all,
            corresponding: None,
            left: Box::new(left),
            right: Box::new(right),
            left_map: Vec::new(),
            right_map: Vec::new(),
            names: Vec::new(),
            columns: Vec::new(),
            outer_references: Vec::new(),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.names.clone()
    }

    pub fn result_columns(&self) -> Vec<ResultColumn> {
        self.columns.clone()
    }

    pub fn outer_references(&self) -> &[Expression] {
        &self.outer_references
    }

    pub fn uses_work_table(&self) -> bool {
        self.left.uses_work_table() || self.right.uses_work_table()
    }

    /// Resolve both branches and fix which of their columns line up.
    pub fn resolve_references(
        &mut self,
        compiler: &mut CompileContext,
        outer: &[&RangeGroup<'_>],
    ) -> SqlResult<Vec<String>> {
        let mut unresolved = self.left.resolve_references(compiler, outer)?;
        unresolved.extend(self.right.resolve_references(compiler, outer)?);

        let left_names = self.left.column_names();
        let right_names = self.right.column_names();
        match &self.corresponding {
            None => {
                if left_names.len() != right_names.len() {
                    return Err(SqlError::DegreeMismatch {
                        expected: left_names.len(),
                        actual: right_names.len(),
                    });
                }
                self.left_map = (0..left_names.len()).collect();
                self.right_map = (0..right_names.len()).collect();
                self.names = left_names;
            }
            Some(list) => {
                let names: Vec<String> = if list.is_empty() {
                    left_names
                        .iter()
                        .filter(|name| right_names.contains(name))
                        .cloned()
                        .collect()
                } else {
                    list.clone()
                };
                if names.is_empty() {
                    return Err(SqlError::Parse(
                        "CORRESPONDING branches have no column names in common".to_string(),
                    ));
                }
                self.left_map = corresponding_positions(&names, &left_names)?;
                self.right_map = corresponding_positions(&names, &right_names)?;
                self.names = names;
            }
        }

        let mut outer_references = self.left.outer_references().to_vec();
        for reference in self.right.outer_references() {
            if !outer_references.contains(reference) {
                outer_references.push(reference.clone());
            }
        }
        self.outer_references = outer_references;
        Ok(unresolved)
    }

    /// Type both branches and unify the matched column types.
    pub fn resolve_types(&mut self, compiler: &mut CompileContext) -> SqlResult<()> {
        self.left.resolve_types(compiler)?;
        self.right.resolve_types(compiler)?;
        let left_types = self.left.column_types();
        let right_types = self.right.column_types();
        self.columns = self
            .names
            .iter()
            .zip(self.left_map.iter().zip(self.right_map.iter()))
            .map(|(name, (&l, &r))| {
                Ok(ResultColumn::new(
                    name.clone(),
                    aggregate_type(&left_types[l], &right_types[r])?,
                ))
            })
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(())
    }

    pub fn rebind_tables(&mut self, catalog: &Catalog) -> SqlResult<()> {
        self.left.rebind_tables(catalog)?;
        self.right.rebind_tables(catalog)
    }

    pub fn get_rows(&self, ctx: &mut ExecutionContext) -> SqlResult<Vec<Vec<Value>>> {
        let types: Vec<_> = self.columns.iter().map(|c| c.data_type.clone()).collect();
        let project = |rows: Vec<Vec<Value>>, map: &[usize]| -> SqlResult<Vec<Vec<Value>>> {
            rows.into_iter()
                .map(|row| convert_row(map.iter().map(|&i| row[i].clone()).collect(), &types))
                .collect()
        };
        let left = project(self.left.get_result(ctx)?.rows, &self.left_map)?;
        let right = project(self.right.get_result(ctx)?.rows, &self.right_map)?;

        let rows = match (self.operator, self.all) {
            (SetOperator::Union, true) => {
                let mut rows = left;
                rows.extend(right);
                rows
            }
            (SetOperator::Union, false) => {
                let mut seen = HashSet::new();
                left.into_iter()
                    .chain(right)
                    .filter(|row| seen.insert(row.clone()))
                    .collect()
            }
            (SetOperator::Intersect, all) => {
                let mut counts = count_rows(right);
                let mut emitted = HashSet::new();
                left.into_iter()
                    .filter(|row| match counts.get_mut(row) {
                        Some(n) if *n > 0 => {
                            if all {
                                *n -= 1;
                                true
                            } else {
                                emitted.insert(row.clone())
                            }
                        }
                        _ => false,
                    })
                    .collect()
            }
            (SetOperator::Except, true) => {
                let mut counts = count_rows(right);
                left.into_iter()
                    .filter(|row| match counts.get_mut(row) {
                        Some(n) if *n > 0 => {
                            *n -= 1;
                            false
                        }
                        _ => true,
                    })
                    .collect()
            }
            (SetOperator::Except, false) => {
                let excluded: HashSet<Vec<Value>> = right.into_iter().collect();
                let mut emitted = HashSet::new();
                left.into_iter()
                    .filter(|row| !excluded.contains(row) && emitted.insert(row.clone()))
                    .collect()
            }
        };
        Ok(rows)
    }
}

fn count_rows(rows: Vec<Vec<Value>>) -> HashMap<Vec<Value>, usize> {
    let mut counts = HashMap::new();
    for row in rows {
        *counts.entry(row).or_insert(0) += 1;
    }
    counts
}

/// Position of each name in a branch's output; each must occur exactly once
fn corresponding_positions(names: &[String], branch: &[String]) -> SqlResult<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            let mut found = branch.iter().enumerate().filter(|(_, n)| *n == name);
            match (found.next(), found.next()) {
                (Some((position, _)), None) => Ok(position),
                (Some(_), Some(_)) => Err(SqlError::AmbiguousColumnReference(name.clone())),
                _ => Err(SqlError::UnresolvedColumn(vec![name.clone()])),
            }
        })
        .collect()
}
