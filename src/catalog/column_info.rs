//! Column information and metadata structures.

use crate::access::{DataType, Value};

/// Descriptor of one table column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub column_name: String,
    pub column_type: DataType,
    pub nullable: bool,
    /// Values come from the table's identity sequence when not supplied
    pub is_identity: bool,
    /// GENERATED ALWAYS: user-supplied values are rejected
    pub is_generated: bool,
    pub default: Option<Value>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: DataType) -> Self {
        Self {
            column_name: name.into(),
            column_type,
            nullable: true,
            is_identity: false,
            is_generated: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn identity(mut self, always: bool) -> Self {
        self.is_identity = true;
        self.is_generated = always;
        self.nullable = false;
        self
    }

    /// Column definition text as it appears in CREATE TABLE / ADD COLUMN
    pub fn get_sql(&self) -> String {
        let mut sql = format!("{} {}", self.column_name, self.column_type.sql_name());
        if self.is_identity {
            if self.is_generated {
                sql.push_str(" GENERATED ALWAYS AS IDENTITY");
            } else {
                sql.push_str(" GENERATED BY DEFAULT AS IDENTITY");
            }
        } else if let Some(default) = &self.default {
            sql.push_str(&format!(" DEFAULT {}", default.to_sql_string()));
        }
        if !self.nullable && !self.is_identity {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_builders() {
        let col = ColumnInfo::new("id", DataType::Int32).identity(true);
        assert!(col.is_identity);
        assert!(col.is_generated);
        assert!(!col.nullable);

        let col = ColumnInfo::new("name", DataType::Varchar)
            .not_null()
            .with_default(Value::String("x".to_string()));
        assert!(!col.nullable);
        assert_eq!(col.get_sql(), "name VARCHAR DEFAULT 'x' NOT NULL");
    }
}
