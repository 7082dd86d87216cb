//! Column reference resolution.
//!
//! Columns bind against the innermost range group first, then against each
//! enclosing group in turn. A column bound in an enclosing group is an outer
//! reference: every group between the reference and its binding is marked
//! correlated and records the reference.

use crate::access::DataType;
use crate::error::SqlResult;
use crate::expression::{ColumnBinding, ColumnRef, ExprKind, Expression};
use crate::query::CompileContext;
use crate::range::RangeGroup;
use log::debug;

impl Expression {
    /// Bind every column reference in the tree, resolving nested subqueries
    /// on the way. Names that cannot be bound are returned, not raised, so
    /// the caller can report all of them at once.
    pub fn resolve_column_references(
        &mut self,
        compiler: &mut CompileContext,
        group: &RangeGroup<'_>,
        outer: &[&RangeGroup<'_>],
    ) -> SqlResult<Vec<String>> {
        let mut unresolved = Vec::new();
        self.resolve_references_into(compiler, group, outer, &mut unresolved)?;
        Ok(unresolved)
    }

    fn resolve_references_into(
        &mut self,
        compiler: &mut CompileContext,
        group: &RangeGroup<'_>,
        outer: &[&RangeGroup<'_>],
        unresolved: &mut Vec<String>,
    ) -> SqlResult<()> {
        match &mut self.kind {
            ExprKind::Column(column) => {
                if column.binding.is_some() {
                    return Ok(());
                }
                match bind_column(column, group, outer)? {
                    Some((binding, data_type, depth)) => {
                        column.binding = Some(binding);
                        self.data_type = Some(data_type);
                        if depth > 0 {
                            group.add_outer_reference(self.clone());
                            for intervening in &outer[..depth - 1] {
                                intervening.add_outer_reference(self.clone());
                            }
                        }
                    }
                    None => unresolved.push(column.display_name()),
                }
                Ok(())
            }
            ExprKind::Subquery { query, id, .. } => {
                *id = compiler.next_subquery_id();
                let mut chain: Vec<&RangeGroup<'_>> = Vec::with_capacity(outer.len() + 1);
                chain.push(group);
                chain.extend_from_slice(outer);

                let inner = query.resolve_references(compiler, &chain)?;
                if inner.is_empty() {
                    query.resolve_types(compiler)?;
                }
                unresolved.extend(inner);
                self.flags.is_correlated = query.is_correlated();
                if self.flags.is_correlated {
                    debug!("correlated subquery {}: {}", id, query.get_sql());
                }
                Ok(())
            }
            _ => {
                for child in self.children_mut() {
                    child.resolve_references_into(compiler, group, outer, unresolved)?;
                }
                Ok(())
            }
        }
    }
}

/// Look a column up in `group`, then in each enclosing group. The depth is 0
/// for a local binding and `n + 1` for a binding in `outer[n]`.
fn bind_column(
    column: &ColumnRef,
    group: &RangeGroup<'_>,
    outer: &[&RangeGroup<'_>],
) -> SqlResult<Option<(ColumnBinding, DataType, usize)>> {
    if let Some((binding, data_type)) = group.lookup(column)? {
        return Ok(Some((binding, data_type, 0)));
    }
    for (n, enclosing) in outer.iter().enumerate() {
        if let Some((binding, data_type)) = enclosing.lookup(column)? {
            return Ok(Some((binding, data_type, n + 1)));
        }
    }
    Ok(None)
}
