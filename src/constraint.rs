//! Declarative constraints: PRIMARY KEY, UNIQUE, FOREIGN KEY and CHECK.
//!
//! Duplicate keys are rejected by the unique index backing a PRIMARY KEY or
//! UNIQUE constraint; the constraint object supplies the error. Foreign
//! keys are registered twice: as a `ForeignKey` on the referencing table,
//! checked on insert and update, and as a `Main` constraint on the
//! referenced table, which drives referential actions on delete and update.
//! Both registrations share one [`ConstraintCore`].

pub mod check;
pub mod core;

pub use self::check::CheckDefinition;
pub use self::core::ConstraintCore;

use crate::access::{format_key, Row, Value};
use crate::catalog::{Catalog, Table};
use crate::error::{SqlError, SqlResult};
use crate::executor::ExecutionContext;
use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    PrimaryKey,
    Unique,
    ForeignKey,
    /// Referenced side of a foreign key
    Main,
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    pub fn sql(self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// How NULLs in a multi-column foreign key are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchType {
    /// Any NULL column exempts the row from the check
    Simple,
    /// Either every column is NULL or none is
    Full,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    name: String,
    constraint_type: ConstraintType,
    core: Arc<RwLock<ConstraintCore>>,
    check: Option<Arc<CheckDefinition>>,
}

impl Constraint {
    fn new(name: impl Into<String>, constraint_type: ConstraintType, core: ConstraintCore) -> Self {
        Self {
            name: name.into(),
            constraint_type,
            core: Arc::new(RwLock::new(core)),
            check: None,
        }
    }

    pub fn primary_key(name: impl Into<String>, core: ConstraintCore) -> Self {
        Self::new(name, ConstraintType::PrimaryKey, core)
    }

    pub fn unique(name: impl Into<String>, core: ConstraintCore) -> Self {
        Self::new(name, ConstraintType::Unique, core)
    }

    /// The referencing-side constraint and its MAIN counterpart, sharing
    /// one core
    pub fn foreign_key(name: impl Into<String>, core: ConstraintCore) -> (Self, Self) {
        let fk = Self::new(name, ConstraintType::ForeignKey, core);
        let main = Self {
            constraint_type: ConstraintType::Main,
            ..fk.clone()
        };
        (fk, main)
    }

    pub fn check(name: impl Into<String>, table: &str, definition: CheckDefinition) -> Self {
        let mut constraint =
            Self::new(name, ConstraintType::Check, ConstraintCore::for_check(table));
        constraint.check = Some(Arc::new(definition));
        constraint
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constraint_type(&self) -> ConstraintType {
        self.constraint_type
    }

    pub fn is_unique_kind(&self) -> bool {
        matches!(
            self.constraint_type,
            ConstraintType::PrimaryKey | ConstraintType::Unique
        )
    }

    /// Snapshot of the shared core
    pub fn core(&self) -> ConstraintCore {
        self.core.read().clone()
    }

    pub fn shares_core(&self, other: &Constraint) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    pub fn main_index_name(&self) -> Option<String> {
        self.core.read().main_index.clone()
    }

    pub fn check_definition(&self) -> Option<&CheckDefinition> {
        self.check.as_deref()
    }

    /// Whether dropping `column` of `table` would leave this constraint
    /// without one of its columns
    pub fn uses_column(&self, table: &str, column: usize) -> bool {
        match &self.check {
            Some(check) => self.core.read().main_table == table && check.references_column(column),
            None => self.core.read().uses_column(table, column),
        }
    }

    /// The violation error for `row`, a row of the table the constraint
    /// is registered on
    pub fn get_exception(&self, row: &[Value]) -> SqlError {
        let core = self.core.read();
        match self.constraint_type {
            ConstraintType::PrimaryKey | ConstraintType::Unique => SqlError::UniqueViolation {
                constraint: self.name.clone(),
                table: core.main_table.clone(),
                key: format_key(&core.main_key(row)),
            },
            ConstraintType::ForeignKey => SqlError::ForeignKeyViolation {
                constraint: self.name.clone(),
                table: core.main_table.clone(),
                key: format_key(&core.ref_key(row)),
            },
            ConstraintType::Main => SqlError::ForeignKeyRestrict {
                constraint: self.name.clone(),
                table: core.ref_table_name().to_string(),
                key: format_key(&core.main_key(row)),
            },
            ConstraintType::Check => SqlError::CheckViolation {
                constraint: self.name.clone(),
                table: core.main_table.clone(),
            },
        }
    }

    /// Table-constraint clause of CREATE TABLE / ALTER TABLE ADD
    pub fn get_sql(&self) -> String {
        let core = self.core.read();
        let body = match self.constraint_type {
            ConstraintType::PrimaryKey => {
                format!("PRIMARY KEY ({})", core.main_column_names.join(", "))
            }
            ConstraintType::Unique => format!("UNIQUE ({})", core.main_column_names.join(", ")),
            ConstraintType::ForeignKey | ConstraintType::Main => {
                let mut sql = format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    core.ref_column_names.join(", "),
                    core.main_table,
                    core.main_column_names.join(", ")
                );
                if core.match_type == MatchType::Full {
                    sql.push_str(" MATCH FULL");
                }
                if core.delete_action != ReferentialAction::NoAction {
                    sql.push_str(&format!(" ON DELETE {}", core.delete_action.sql()));
                }
                if core.update_action != ReferentialAction::NoAction {
                    sql.push_str(&format!(" ON UPDATE {}", core.update_action.sql()));
                }
                sql
            }
            ConstraintType::Check => format!(
                "CHECK ({})",
                self.check.as_ref().map(|c| c.get_sql()).unwrap_or_default()
            ),
        };
        format!("CONSTRAINT {} {}", self.name, body)
    }

    /// Check a row that has just been written to `table`. `old_row` is the
    /// previous version when the write is an update.
    pub fn check_insert(
        &self,
        ctx: &ExecutionContext,
        table: &Table,
        new_row: &[Value],
        old_row: Option<&[Value]>,
    ) -> SqlResult<()> {
        match self.constraint_type {
            ConstraintType::Check => {
                let check = self.check.as_ref().ok_or_else(|| {
                    SqlError::invariant(format!("CHECK {} has no condition", self.name))
                })?;
                match check.evaluate(ctx, new_row)? {
                    Some(false) => Err(self.get_exception(new_row)),
                    _ => Ok(()),
                }
            }
            ConstraintType::PrimaryKey => {
                let core = self.core.read();
                match core.main_columns.iter().find(|&&c| new_row[c].is_null()) {
                    Some(&column) => Err(SqlError::NotNullViolation {
                        column: table.column(column).column_name.clone(),
                        table: table.name().to_string(),
                    }),
                    None => Ok(()),
                }
            }
            ConstraintType::ForeignKey => {
                let (key, match_type) = {
                    let core = self.core.read();
                    (core.ref_key(new_row), core.match_type)
                };
                let nulls = key.iter().filter(|v| v.is_null()).count();
                if nulls == key.len() {
                    return Ok(());
                }
                if nulls > 0 {
                    return match match_type {
                        MatchType::Simple => Ok(()),
                        MatchType::Full => Err(self.get_exception(new_row)),
                    };
                }
                if let Some(old_row) = old_row {
                    if self.core.read().ref_key(old_row) == key {
                        return Ok(());
                    }
                }
                match self.find_fk_ref(&ctx.catalog, &key)? {
                    Some(_) => Ok(()),
                    None => Err(self.get_exception(new_row)),
                }
            }
            ConstraintType::Unique | ConstraintType::Main => Ok(()),
        }
    }

    /// The referenced row matching a referencing key. `None` when the key
    /// has a NULL.
    pub fn find_fk_ref(&self, catalog: &Catalog, key: &[Value]) -> SqlResult<Option<Row>> {
        if key.iter().any(Value::is_null) {
            return Ok(None);
        }
        let (main_table, main_columns) = {
            let core = self.core.read();
            (core.main_table.clone(), core.main_columns.clone())
        };
        let table = catalog.get_table(&main_table)?;
        Ok(convert_key(&table, &main_columns, key)
            .and_then(|key| table.find_rows(&main_columns, &key).into_iter().next()))
    }

    /// Rows of `table` holding the key of a PRIMARY KEY, UNIQUE or MAIN
    /// constraint. Empty when the key has a NULL.
    pub fn find_unique_rows(&self, table: &Table, key: &[Value]) -> SqlResult<Vec<Row>> {
        if key.iter().any(Value::is_null) {
            return Ok(Vec::new());
        }
        let columns = self.core.read().main_columns.clone();
        Ok(convert_key(table, &columns, key)
            .map(|key| table.find_rows(&columns, &key))
            .unwrap_or_default())
    }

    /// The referencing table and its rows whose foreign key equals `key`.
    /// No rows when the key has a NULL.
    pub fn find_referencing_rows(
        &self,
        catalog: &Catalog,
        key: &[Value],
    ) -> SqlResult<(Arc<Table>, Vec<Row>)> {
        let (ref_table, ref_columns) = {
            let core = self.core.read();
            (core.ref_table_name().to_string(), core.ref_columns.clone())
        };
        let table = catalog.get_table(&ref_table)?;
        if key.iter().any(Value::is_null) {
            return Ok((table, Vec::new()));
        }
        let rows = convert_key(&table, &ref_columns, key)
            .map(|key| table.find_rows(&ref_columns, &key))
            .unwrap_or_default();
        Ok((table, rows))
    }

    /// Validate every existing row of `table`; used when the constraint is
    /// added to a populated table. Stops at the first violation.
    pub fn check_referenced_rows(&self, ctx: &ExecutionContext, table: &Table) -> SqlResult<()> {
        for row in table.row_iterator() {
            self.check_insert(ctx, table, &row.values, None)?;
        }
        Ok(())
    }

    /// Add one column pair to a foreign key, now backed by `main_index` on
    /// the referenced table and `ref_index` on the referencing one. The
    /// change is made on the shared core and so applies to both
    /// registrations.
    pub fn extend_fk_index_columns(
        &self,
        ref_column: (usize, String),
        main_column: (usize, String),
        main_index: String,
        ref_index: String,
    ) {
        let mut core = self.core.write();
        core.ref_columns.push(ref_column.0);
        core.ref_column_names.push(ref_column.1);
        core.main_columns.push(main_column.0);
        core.main_column_names.push(main_column.1);
        core.main_index = Some(main_index);
        core.ref_index = Some(ref_index);
        info!(
            "foreign key {} now ({}) -> {} ({})",
            self.name,
            core.ref_column_names.join(", "),
            core.main_table,
            core.main_column_names.join(", ")
        );
    }

    /// Undo [`Constraint::extend_fk_index_columns`]
    pub fn restore_core(&self, core: ConstraintCore) {
        *self.core.write() = core;
    }

    pub fn remap_columns(&self, table: &str, map: &[Option<usize>]) -> SqlResult<()> {
        self.core.write().remap_columns(table, map)
    }

    /// This constraint bound to a rewritten `table`. CHECK conditions are
    /// compiled again from their text.
    pub fn recompile(&self, catalog: Arc<Catalog>, table: &Table) -> SqlResult<Constraint> {
        let check = match &self.check {
            Some(check) => check,
            None => return Ok(self.clone()),
        };
        let definition = CheckDefinition::compile(&self.name, check.get_sql(), table, catalog)?;
        Ok(Constraint {
            check: Some(Arc::new(definition)),
            ..self.clone()
        })
    }
}

/// `key` in the column types of `table`, or `None` when some value has no
/// exact counterpart there and so cannot be stored in those columns.
fn convert_key(table: &Table, columns: &[usize], key: &[Value]) -> Option<Vec<Value>> {
    columns
        .iter()
        .zip(key)
        .map(|(&column, value)| {
            let converted = value
                .convert_to_type(&table.column(column).column_type)
                .ok()?;
            let original_type = match value.data_type() {
                Some(data_type) => data_type,
                None => return Some(converted),
            };
            let back = converted.convert_to_type(&original_type).ok()?;
            match value.compare(&back) {
                Ok(Some(Ordering::Equal)) => Some(converted),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::DataType;
    use crate::catalog::ColumnInfo;
    use crate::config::EngineConfig;

    struct Fixture {
        catalog: Arc<Catalog>,
        parent: Arc<Table>,
        child: Arc<Table>,
        fk: Constraint,
        main: Constraint,
    }

    fn parent_key() -> ConstraintCore {
        let names = vec!["a".to_string(), "b".to_string()];
        ConstraintCore::for_key("parent", vec![0, 1], names, "pk_parent")
    }

    fn fixture(match_type: MatchType) -> Fixture {
        let catalog = Arc::new(Catalog::new());
        let parent = catalog
            .create_table(
                "parent",
                vec![
                    ColumnInfo::new("a", DataType::Int32).not_null(),
                    ColumnInfo::new("b", DataType::Int32).not_null(),
                ],
            )
            .unwrap();
        parent.add_index("pk_parent", vec![0, 1], true);
        let pk = Constraint::primary_key("pk_parent", parent_key());
        parent.add_constraint(pk);

        let child = catalog
            .create_table(
                "child",
                vec![
                    ColumnInfo::new("x", DataType::BigInt),
                    ColumnInfo::new("y", DataType::Int32),
                ],
            )
            .unwrap();
        child.add_index("fk_child", vec![0, 1], false);
        let mut core = parent_key();
        core.ref_table = Some("child".to_string());
        core.ref_columns = vec![0, 1];
        core.ref_column_names = vec!["x".into(), "y".into()];
        core.ref_index = Some("fk_child".to_string());
        core.match_type = match_type;
        let (fk, main) = Constraint::foreign_key("fk_child", core);
        child.add_constraint(fk.clone());
        parent.add_constraint(main.clone());

        parent
            .insert_row(vec![Value::Int32(1), Value::Int32(2)])
            .unwrap();
        Fixture {
            catalog,
            parent,
            child,
            fk,
            main,
        }
    }

    fn context(fixture: &Fixture) -> ExecutionContext {
        ExecutionContext::new(fixture.catalog.clone(), EngineConfig::default(), 0)
    }

    #[test]
    fn test_foreign_key_lookup_converts_key() {
        let f = fixture(MatchType::Simple);
        let ctx = context(&f);
        f.fk
            .check_insert(&ctx, &f.child, &[Value::BigInt(1), Value::Int32(2)], None)
            .unwrap();
        let err = f
            .fk
            .check_insert(&ctx, &f.child, &[Value::BigInt(1), Value::Int32(3)], None)
            .unwrap_err();
        assert_eq!(
            err,
            SqlError::ForeignKeyViolation {
                constraint: "fk_child".to_string(),
                table: "parent".to_string(),
                key: "1, 3".to_string(),
            }
        );
    }

    #[test]
    fn test_inexact_or_overflowing_key_has_no_match() {
        let f = fixture(MatchType::Simple);
        let ctx = context(&f);

        let fraction = [Value::Double(1.4), Value::Int32(2)];
        assert!(f.fk.find_fk_ref(&f.catalog, &fraction).unwrap().is_none());
        let exact = [Value::Double(1.0), Value::Int32(2)];
        assert!(f.fk.find_fk_ref(&f.catalog, &exact).unwrap().is_some());

        let wide = [Value::BigInt(3_000_000_000), Value::Int32(2)];
        assert!(f.fk.find_fk_ref(&f.catalog, &wide).unwrap().is_none());
        assert_eq!(
            f.fk.check_insert(&ctx, &f.child, &wide, None).unwrap_err(),
            SqlError::ForeignKeyViolation {
                constraint: "fk_child".to_string(),
                table: "parent".to_string(),
                key: "3000000000, 2".to_string(),
            }
        );
        assert!(f.main.find_unique_rows(&f.parent, &wide).unwrap().is_empty());

        f.child
            .insert_row(vec![Value::BigInt(1), Value::Int32(2)])
            .unwrap();
        let (_, rows) = f
            .main
            .find_referencing_rows(&f.catalog, &[Value::Double(1.5), Value::Int32(2)])
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_match_simple_and_full() {
        let simple = fixture(MatchType::Simple);
        let ctx = context(&simple);
        let partial = [Value::BigInt(9), Value::Null];
        simple
            .fk
            .check_insert(&ctx, &simple.child, &partial, None)
            .unwrap();

        let full = fixture(MatchType::Full);
        let ctx = context(&full);
        assert!(matches!(
            full.fk.check_insert(&ctx, &full.child, &partial, None),
            Err(SqlError::ForeignKeyViolation { .. })
        ));
        full.fk
            .check_insert(&ctx, &full.child, &[Value::Null, Value::Null], None)
            .unwrap();
    }

    #[test]
    fn test_unchanged_key_skips_lookup() {
        let f = fixture(MatchType::Simple);
        let ctx = context(&f);
        let dangling = [Value::BigInt(7), Value::Int32(7)];
        f.fk
            .check_insert(&ctx, &f.child, &dangling, Some(&dangling))
            .unwrap();
    }

    #[test]
    fn test_null_keys_find_nothing() {
        let f = fixture(MatchType::Simple);
        assert!(f
            .fk
            .find_fk_ref(&f.catalog, &[Value::Int32(1), Value::Null])
            .unwrap()
            .is_none());
        assert!(f
            .main
            .find_unique_rows(&f.parent, &[Value::Null, Value::Int32(2)])
            .unwrap()
            .is_empty());
        let (_, rows) = f
            .main
            .find_referencing_rows(&f.catalog, &[Value::Null, Value::Null])
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_shared_core_and_extension() {
        let f = fixture(MatchType::Simple);
        assert!(f.fk.shares_core(&f.main));
        f.fk.extend_fk_index_columns(
            (1, "y".into()),
            (1, "b".into()),
            "pk_parent".into(),
            "fk_child_2".into(),
        );
        assert_eq!(f.main.core().ref_columns, vec![0, 1, 1]);
        assert_eq!(f.main.core().ref_index.as_deref(), Some("fk_child_2"));
    }

    #[test]
    fn test_exceptions_and_sql() {
        let f = fixture(MatchType::Full);
        let pk = f.parent.primary_key().unwrap();
        assert!(pk.is_unique_kind());
        assert_eq!(
            pk.get_exception(&[Value::Int32(1), Value::Int32(2)]),
            SqlError::UniqueViolation {
                constraint: "pk_parent".to_string(),
                table: "parent".to_string(),
                key: "1, 2".to_string(),
            }
        );
        assert_eq!(
            f.fk.get_sql(),
            "CONSTRAINT fk_child FOREIGN KEY (x, y) REFERENCES parent (a, b) MATCH FULL"
        );
        assert!(matches!(
            f.main.get_exception(&[Value::Int32(1), Value::Int32(2)]),
            SqlError::ForeignKeyRestrict { .. }
        ));
    }

    #[test]
    fn test_check_referenced_rows_stops_at_violation() {
        let f = fixture(MatchType::Simple);
        let ctx = context(&f);
        f.child
            .insert_row(vec![Value::BigInt(1), Value::Int32(2)])
            .unwrap();
        f.fk.check_referenced_rows(&ctx, &f.child).unwrap();
        f.child
            .insert_row(vec![Value::BigInt(5), Value::Int32(5)])
            .unwrap();
        assert!(matches!(
            f.fk.check_referenced_rows(&ctx, &f.child),
            Err(SqlError::ForeignKeyViolation { .. })
        ));
    }
}
