//! Row mutations of one data-change statement.
//!
//! Every write goes through [`DataChange`], which enforces NOT NULL, unique
//! indexes and constraints, runs referential actions, and keeps an undo log
//! so that a failing statement leaves no trace.

use crate::access::{format_key, Row, RowId, Value};
use crate::catalog::Table;
use crate::constraint::{Constraint, ConstraintType, ReferentialAction};
use crate::error::{SqlError, SqlResult};
use crate::executor::ExecutionContext;
use log::debug;
use std::sync::Arc;

/// Nesting limit for cascading referential actions
const MAX_ACTION_DEPTH: usize = 64;

enum UndoEntry {
    Inserted { table: Arc<Table>, id: RowId },
    Deleted { table: Arc<Table>, row: Row },
}

/// A NO ACTION reference, checked when the statement completes
struct PendingCheck {
    constraint: Constraint,
    key: Vec<Value>,
}

#[derive(Default)]
pub struct DataChange {
    undo: Vec<UndoEntry>,
    pending: Vec<PendingCheck>,
}

impl DataChange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a complete row, already converted to the column types
    pub fn insert_row(
        &mut self,
        ctx: &ExecutionContext,
        table: &Arc<Table>,
        values: Vec<Value>,
    ) -> SqlResult<RowId> {
        check_not_null(table, &values)?;
        let id = table.insert_row(values.clone())?;
        self.undo.push(UndoEntry::Inserted {
            table: table.clone(),
            id,
        });
        for constraint in table.constraints() {
            constraint.check_insert(ctx, table, &values, None)?;
        }
        Ok(id)
    }

    /// Delete a row and apply the delete rules of foreign keys referencing
    /// it. `false` when a cascade already removed the row.
    pub fn delete_row(
        &mut self,
        ctx: &ExecutionContext,
        table: &Arc<Table>,
        id: RowId,
    ) -> SqlResult<bool> {
        self.delete_row_at(ctx, table, id, 0)
    }

    /// Replace rows with new versions. Every old version is taken out
    /// before any new one goes in, so keys may be exchanged between rows of
    /// the same statement.
    pub fn update_rows(
        &mut self,
        ctx: &ExecutionContext,
        table: &Arc<Table>,
        updates: Vec<(RowId, Vec<Value>)>,
    ) -> SqlResult<usize> {
        self.update_rows_at(ctx, table, updates, 0)
    }

    /// Run the deferred NO ACTION checks and forget the undo log
    pub fn finish(&mut self, ctx: &ExecutionContext) -> SqlResult<()> {
        for check in std::mem::take(&mut self.pending) {
            let main_table = ctx.catalog.get_table(&check.constraint.core().main_table)?;
            if !check
                .constraint
                .find_unique_rows(&main_table, &check.key)?
                .is_empty()
            {
                continue;
            }
            let (ref_table, rows) = check
                .constraint
                .find_referencing_rows(&ctx.catalog, &check.key)?;
            if !rows.is_empty() {
                return Err(SqlError::ForeignKeyRestrict {
                    constraint: check.constraint.name().to_string(),
                    table: ref_table.name().to_string(),
                    key: format_key(&check.key),
                });
            }
        }
        self.undo.clear();
        Ok(())
    }

    /// Put back every row the statement changed, newest change first
    pub fn rollback(&mut self) {
        debug!("rolling back {} row changes", self.undo.len());
        while let Some(entry) = self.undo.pop() {
            match entry {
                UndoEntry::Inserted { table, id } => {
                    table.delete_row(id);
                }
                UndoEntry::Deleted { table, row } => table.restore_row(row),
            }
        }
        self.pending.clear();
    }

    fn delete_row_at(
        &mut self,
        ctx: &ExecutionContext,
        table: &Arc<Table>,
        id: RowId,
        depth: usize,
    ) -> SqlResult<bool> {
        let row = match table.delete_row(id) {
            Some(row) => row,
            None => return Ok(false),
        };
        self.undo.push(UndoEntry::Deleted {
            table: table.clone(),
            row: row.clone(),
        });
        for constraint in main_constraints(table) {
            let action = constraint.core().delete_action;
            self.apply_action(ctx, &constraint, action, table, &row.values, None, depth)?;
        }
        Ok(true)
    }

    fn update_rows_at(
        &mut self,
        ctx: &ExecutionContext,
        table: &Arc<Table>,
        updates: Vec<(RowId, Vec<Value>)>,
        depth: usize,
    ) -> SqlResult<usize> {
        let mut changed = Vec::with_capacity(updates.len());
        for (id, values) in updates {
            check_not_null(table, &values)?;
            let old = match table.delete_row(id) {
                Some(old) => old,
                None => continue,
            };
            self.undo.push(UndoEntry::Deleted {
                table: table.clone(),
                row: old.clone(),
            });
            changed.push((old, values));
        }
        for (old, values) in &changed {
            table.reinsert_row(old.id, values.clone())?;
            self.undo.push(UndoEntry::Inserted {
                table: table.clone(),
                id: old.id,
            });
        }

        let constraints = table.constraints();
        for (old, values) in &changed {
            for constraint in &constraints {
                constraint.check_insert(ctx, table, values, Some(&old.values))?;
            }
        }
        for constraint in constraints
            .iter()
            .filter(|c| c.constraint_type() == ConstraintType::Main)
        {
            let core = constraint.core();
            for (old, values) in &changed {
                if core.main_key(&old.values) == core.main_key(values) {
                    continue;
                }
                self.apply_action(
                    ctx,
                    constraint,
                    core.update_action,
                    table,
                    &old.values,
                    Some(values),
                    depth,
                )?;
            }
        }
        Ok(changed.len())
    }

    /// Apply the referential action of `constraint`, a MAIN constraint of
    /// `table`, for a row whose key went away. `new_row` is the updated row
    /// when the key changed rather than the row being deleted.
    #[allow(clippy::too_many_arguments)]
    fn apply_action(
        &mut self,
        ctx: &ExecutionContext,
        constraint: &Constraint,
        action: ReferentialAction,
        table: &Arc<Table>,
        old_row: &[Value],
        new_row: Option<&[Value]>,
        depth: usize,
    ) -> SqlResult<()> {
        let core = constraint.core();
        let key = core.main_key(old_row);
        if key.iter().any(Value::is_null) {
            return Ok(());
        }
        // Another row of the statement may have taken over the key.
        if !constraint.find_unique_rows(table, &key)?.is_empty() {
            return Ok(());
        }
        let (ref_table, rows) = constraint.find_referencing_rows(&ctx.catalog, &key)?;
        if rows.is_empty() {
            return Ok(());
        }
        if depth >= MAX_ACTION_DEPTH {
            return Err(SqlError::Unsupported(format!(
                "referential actions of {} nested deeper than {}",
                constraint.name(),
                MAX_ACTION_DEPTH
            )));
        }
        debug!(
            "{} on {}: {} referencing rows in {}",
            action.sql(),
            constraint.name(),
            rows.len(),
            ref_table.name()
        );

        let replacement: Vec<Value> = match (action, new_row) {
            (ReferentialAction::NoAction, _) => {
                self.pending.push(PendingCheck {
                    constraint: constraint.clone(),
                    key,
                });
                return Ok(());
            }
            (ReferentialAction::Restrict, _) => return Err(constraint.get_exception(old_row)),
            (ReferentialAction::Cascade, None) => {
                for row in rows {
                    self.delete_row_at(ctx, &ref_table, row.id, depth + 1)?;
                }
                return Ok(());
            }
            (ReferentialAction::Cascade, Some(new_row)) => core.main_key(new_row),
            (ReferentialAction::SetNull, _) => vec![Value::Null; core.ref_columns.len()],
            (ReferentialAction::SetDefault, _) => core
                .ref_columns
                .iter()
                .map(|&c| ref_table.column(c).default.clone().unwrap_or(Value::Null))
                .collect(),
        };

        let updates = rows
            .into_iter()
            .map(|row| {
                let mut values = row.values;
                for (&column, value) in core.ref_columns.iter().zip(replacement.iter()) {
                    values[column] = value.convert_to_type(&ref_table.column(column).column_type)?;
                }
                Ok((row.id, values))
            })
            .collect::<SqlResult<Vec<_>>>()?;
        self.update_rows_at(ctx, &ref_table, updates, depth + 1)?;
        Ok(())
    }
}

fn main_constraints(table: &Table) -> Vec<Constraint> {
    table
        .constraints()
        .into_iter()
        .filter(|c| c.constraint_type() == ConstraintType::Main)
        .collect()
}

fn check_not_null(table: &Table, values: &[Value]) -> SqlResult<()> {
    for (column, value) in table.columns().iter().zip(values) {
        if !column.nullable && value.is_null() {
            return Err(SqlError::NotNullViolation {
                column: column.column_name.clone(),
                table: table.name().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::DataType;
    use crate::catalog::{Catalog, ColumnInfo};
    use crate::config::EngineConfig;
    use crate::constraint::ConstraintCore;

    struct Fixture {
        ctx: ExecutionContext,
        parent: Arc<Table>,
        child: Arc<Table>,
    }

    fn fixture(on_delete: ReferentialAction, on_update: ReferentialAction) -> Fixture {
        let catalog = Arc::new(Catalog::new());
        let parent = catalog
            .create_table("p", vec![ColumnInfo::new("id", DataType::Int32).not_null()])
            .unwrap();
        parent.add_index("pk_p", vec![0], true);
        parent.add_constraint(Constraint::primary_key(
            "pk_p",
            ConstraintCore::for_key("p", vec![0], vec!["id".into()], "pk_p"),
        ));
        let child = catalog
            .create_table(
                "c",
                vec![
                    ColumnInfo::new("n", DataType::Int32),
                    ColumnInfo::new("pid", DataType::Int32).with_default(Value::Int32(0)),
                ],
            )
            .unwrap();
        child.add_index("fk_c", vec![1], false);
        let mut core = ConstraintCore::for_key("p", vec![0], vec!["id".into()], "pk_p");
        core.ref_table = Some("c".to_string());
        core.ref_columns = vec![1];
        core.ref_column_names = vec!["pid".into()];
        core.delete_action = on_delete;
        core.update_action = on_update;
        let (fk, main) = Constraint::foreign_key("fk_c", core);
        child.add_constraint(fk);
        parent.add_constraint(main);

        let ctx = ExecutionContext::new(catalog, EngineConfig::default(), 0);
        let mut change = DataChange::new();
        for id in [0, 1, 2] {
            change.insert_row(&ctx, &parent, vec![Value::Int32(id)]).unwrap();
        }
        change
            .insert_row(&ctx, &child, vec![Value::Int32(10), Value::Int32(1)])
            .unwrap();
        change.finish(&ctx).unwrap();
        Fixture { ctx, parent, child }
    }

    fn row_id(table: &Table, value: i32) -> RowId {
        table
            .row_iterator()
            .find(|r| r.values[0] == Value::Int32(value))
            .unwrap()
            .id
    }

    fn child_parents(f: &Fixture) -> Vec<Value> {
        f.child.row_iterator().map(|r| r.values[1].clone()).collect()
    }

    #[test]
    fn test_cascade_delete() {
        let f = fixture(ReferentialAction::Cascade, ReferentialAction::NoAction);
        let mut change = DataChange::new();
        assert!(change.delete_row(&f.ctx, &f.parent, row_id(&f.parent, 1)).unwrap());
        change.finish(&f.ctx).unwrap();
        assert_eq!(f.child.row_count(), 0);
    }

    #[test]
    fn test_set_null_and_set_default() {
        let f = fixture(ReferentialAction::SetNull, ReferentialAction::SetDefault);
        let mut change = DataChange::new();
        let id = row_id(&f.parent, 1);
        change
            .update_rows(&f.ctx, &f.parent, vec![(id, vec![Value::Int32(5)])])
            .unwrap();
        assert_eq!(child_parents(&f), vec![Value::Int32(0)]);

        let id = row_id(&f.parent, 0);
        change.delete_row(&f.ctx, &f.parent, id).unwrap();
        change.finish(&f.ctx).unwrap();
        assert_eq!(child_parents(&f), vec![Value::Null]);
    }

    #[test]
    fn test_cascade_update_follows_key() {
        let f = fixture(ReferentialAction::NoAction, ReferentialAction::Cascade);
        let mut change = DataChange::new();
        let id = row_id(&f.parent, 1);
        change
            .update_rows(&f.ctx, &f.parent, vec![(id, vec![Value::Int32(7)])])
            .unwrap();
        change.finish(&f.ctx).unwrap();
        assert_eq!(child_parents(&f), vec![Value::Int32(7)]);
    }

    #[test]
    fn test_restrict_fails_immediately() {
        let f = fixture(ReferentialAction::Restrict, ReferentialAction::Restrict);
        let mut change = DataChange::new();
        let err = change
            .delete_row(&f.ctx, &f.parent, row_id(&f.parent, 1))
            .unwrap_err();
        assert!(matches!(err, SqlError::ForeignKeyRestrict { .. }));
        change.rollback();
        assert_eq!(f.parent.row_count(), 3);
    }

    #[test]
    fn test_no_action_checked_at_end() {
        let f = fixture(ReferentialAction::NoAction, ReferentialAction::NoAction);

        // Child removed later in the same statement: allowed.
        let mut change = DataChange::new();
        change
            .delete_row(&f.ctx, &f.parent, row_id(&f.parent, 1))
            .unwrap();
        let child_id = f.child.row_iterator().next().unwrap().id;
        change.delete_row(&f.ctx, &f.child, child_id).unwrap();
        change.finish(&f.ctx).unwrap();
        assert_eq!(f.parent.row_count(), 2);

        let f = fixture(ReferentialAction::NoAction, ReferentialAction::NoAction);
        let mut change = DataChange::new();
        change
            .delete_row(&f.ctx, &f.parent, row_id(&f.parent, 1))
            .unwrap();
        assert!(matches!(
            change.finish(&f.ctx),
            Err(SqlError::ForeignKeyRestrict { .. })
        ));
        change.rollback();
        assert_eq!(f.parent.row_count(), 3);
    }

    #[test]
    fn test_update_swaps_unique_keys() {
        let f = fixture(ReferentialAction::NoAction, ReferentialAction::NoAction);
        let mut change = DataChange::new();
        let one = row_id(&f.parent, 1);
        let two = row_id(&f.parent, 2);
        change
            .update_rows(
                &f.ctx,
                &f.parent,
                vec![(one, vec![Value::Int32(2)]), (two, vec![Value::Int32(1)])],
            )
            .unwrap();
        change.finish(&f.ctx).unwrap();
        assert_eq!(f.parent.get_row(one).unwrap().values, vec![Value::Int32(2)]);
    }

    #[test]
    fn test_rollback_restores_rows() {
        let f = fixture(ReferentialAction::Cascade, ReferentialAction::NoAction);
        let mut change = DataChange::new();
        change
            .insert_row(&f.ctx, &f.parent, vec![Value::Int32(9)])
            .unwrap();
        change
            .delete_row(&f.ctx, &f.parent, row_id(&f.parent, 1))
            .unwrap();
        assert!(matches!(
            change.insert_row(&f.ctx, &f.child, vec![Value::Int32(1), Value::Int32(42)]),
            Err(SqlError::ForeignKeyViolation { .. })
        ));
        change.rollback();
        assert_eq!(f.parent.row_count(), 3);
        assert_eq!(child_parents(&f), vec![Value::Int32(1)]);
    }

    #[test]
    fn test_not_null() {
        let f = fixture(ReferentialAction::NoAction, ReferentialAction::NoAction);
        let mut change = DataChange::new();
        assert_eq!(
            change
                .insert_row(&f.ctx, &f.parent, vec![Value::Null])
                .unwrap_err(),
            SqlError::NotNullViolation {
                column: "id".to_string(),
                table: "p".to_string(),
            }
        );
    }
}
