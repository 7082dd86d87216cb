use crate::access::Value;
use crate::constraint::{MatchType, ReferentialAction};
use crate::error::{SqlError, SqlResult};

/// Key columns and referential settings of a constraint.
///
/// A foreign key and the MAIN constraint registered on the referenced table
/// hold the same core, so a change made through either side is seen by the
/// other.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintCore {
    /// Referenced table of a foreign key, or the constrained table
    pub main_table: String,
    pub main_columns: Vec<usize>,
    pub main_column_names: Vec<String>,
    /// Unique index backing the main key
    pub main_index: Option<String>,
    /// Referencing table of a foreign key
    pub ref_table: Option<String>,
    pub ref_columns: Vec<usize>,
    pub ref_column_names: Vec<String>,
    /// Index over the referencing columns
    pub ref_index: Option<String>,
    pub delete_action: ReferentialAction,
    pub update_action: ReferentialAction,
    pub match_type: MatchType,
}

impl ConstraintCore {
    /// Core of a PRIMARY KEY or UNIQUE constraint
    pub fn for_key(
        table: impl Into<String>,
        columns: Vec<usize>,
        column_names: Vec<String>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            main_table: table.into(),
            main_columns: columns,
            main_column_names: column_names,
            main_index: Some(index.into()),
            ref_table: None,
            ref_columns: Vec::new(),
            ref_column_names: Vec::new(),
            ref_index: None,
            delete_action: ReferentialAction::NoAction,
            update_action: ReferentialAction::NoAction,
            match_type: MatchType::Simple,
        }
    }

    pub fn for_check(table: impl Into<String>) -> Self {
        Self {
            main_table: table.into(),
            main_columns: Vec::new(),
            main_column_names: Vec::new(),
            main_index: None,
            ref_table: None,
            ref_columns: Vec::new(),
            ref_column_names: Vec::new(),
            ref_index: None,
            delete_action: ReferentialAction::NoAction,
            update_action: ReferentialAction::NoAction,
            match_type: MatchType::Simple,
        }
    }

    pub fn main_key(&self, row: &[Value]) -> Vec<Value> {
        self.main_columns.iter().map(|&c| row[c].clone()).collect()
    }

    pub fn ref_key(&self, row: &[Value]) -> Vec<Value> {
        self.ref_columns.iter().map(|&c| row[c].clone()).collect()
    }

    pub fn ref_table_name(&self) -> &str {
        self.ref_table.as_deref().unwrap_or(&self.main_table)
    }

    /// Whether a column of `table` is one of the key columns
    pub fn uses_column(&self, table: &str, column: usize) -> bool {
        (self.main_table == table && self.main_columns.contains(&column))
            || (self.ref_table.as_deref() == Some(table) && self.ref_columns.contains(&column))
    }

    /// Renumber the columns of `table` after a structural rewrite.
    /// `map[old]` is the new position, `None` for a dropped column.
    pub fn remap_columns(&mut self, table: &str, map: &[Option<usize>]) -> SqlResult<()> {
        let remap = |columns: &mut Vec<usize>| -> SqlResult<()> {
            for column in columns.iter_mut() {
                *column = map.get(*column).copied().flatten().ok_or_else(|| {
                    SqlError::invariant(format!("key column {} of {} was dropped", column, table))
                })?;
            }
            Ok(())
        };
        if self.main_table == table {
            remap(&mut self.main_columns)?;
        }
        if self.ref_table.as_deref() == Some(table) {
            remap(&mut self.ref_columns)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_columns_of_self_reference() {
        let mut core = ConstraintCore::for_key("t", vec![0], vec!["id".into()], "pk");
        core.ref_table = Some("t".to_string());
        core.ref_columns = vec![2];

        core.remap_columns("t", &[Some(0), None, Some(1)]).unwrap();
        assert_eq!(core.main_columns, vec![0]);
        assert_eq!(core.ref_columns, vec![1]);
        assert!(core.uses_column("t", 1));
        assert!(!core.uses_column("other", 1));

        assert!(core
            .remap_columns("t", &[None, Some(0)])
            .unwrap_err()
            .is_invariant_violation());
    }

    #[test]
    fn test_keys() {
        let mut core = ConstraintCore::for_key("p", vec![1], vec!["b".into()], "idx");
        core.ref_columns = vec![0];
        let row = vec![Value::Int32(1), Value::Int32(2)];
        assert_eq!(core.main_key(&row), vec![Value::Int32(2)]);
        assert_eq!(core.ref_key(&row), vec![Value::Int32(1)]);
        assert_eq!(core.ref_table_name(), "p");
    }
}
