//! Error types for expression resolution, evaluation and constraint enforcement.

use thiserror::Error;

/// Errors raised while compiling or executing a statement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    #[error("syntax error: {0}")]
    Parse(String),

    #[error("user lacks privilege or object not found: {}", .0.join(", "))]
    UnresolvedColumn(Vec<String>),

    #[error("ambiguous column reference: {0}")]
    AmbiguousColumnReference(String),

    #[error("user lacks privilege or object not found: {0}")]
    ObjectNotFound(String),

    #[error("object name already exists: {0}")]
    ObjectExists(String),

    #[error("dependent objects exist: {0}")]
    DependentObjects(String),

    #[error("incompatible data type: {0}")]
    TypeMismatch(String),

    #[error("cardinality violation: expected {expected} columns, found {actual}")]
    DegreeMismatch { expected: usize, actual: usize },

    #[error("invalid CHECK constraint {constraint}: {reason}")]
    InvalidCheckConstraint { constraint: String, reason: String },

    #[error("expression not in aggregate or GROUP BY columns: {0}")]
    NotGroupingExpression(String),

    #[error("invalid use of aggregate function: {0}")]
    InvalidAggregate(String),

    #[error("check constraint violation: {constraint} table: {table}")]
    CheckViolation { constraint: String, table: String },

    #[error("unique constraint or index violation: {constraint} table: {table} value: {key}")]
    UniqueViolation {
        constraint: String,
        table: String,
        key: String,
    },

    #[error("integrity constraint violation: foreign key no parent: {constraint} table: {table} value: {key}")]
    ForeignKeyViolation {
        constraint: String,
        table: String,
        key: String,
    },

    #[error("integrity constraint violation: foreign key no action: {constraint} table: {table} value: {key}")]
    ForeignKeyRestrict {
        constraint: String,
        table: String,
        key: String,
    },

    #[error("integrity constraint violation: NOT NULL check constraint: column {column} table: {table}")]
    NotNullViolation { column: String, table: String },

    #[error("cardinality violation: {0}")]
    CardinalityViolation(String),

    #[error("data exception: division by zero")]
    DivisionByZero,

    #[error("data exception: numeric value out of range")]
    NumericOverflow,

    #[error("data exception: invalid conversion: {0}")]
    InvalidConversion(String),

    #[error("recursive query did not reach a fixed point within {limit} rounds")]
    RecursionLimitExceeded { limit: usize },

    #[error("feature not supported: {0}")]
    Unsupported(String),

    #[error("internal consistency failure: {0}")]
    InvariantViolation(String),
}

impl SqlError {
    /// Internal failures indicate a defect rather than a user error.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, SqlError::InvariantViolation(_))
    }

    pub(crate) fn type_mismatch(context: impl Into<String>) -> Self {
        SqlError::TypeMismatch(context.into())
    }

    pub(crate) fn invariant(context: impl Into<String>) -> Self {
        SqlError::InvariantViolation(context.into())
    }
}

/// Result type for engine operations.
pub type SqlResult<T> = Result<T, SqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SqlError::UnresolvedColumn(vec!["a".to_string(), "t.b".to_string()]);
        assert_eq!(
            err.to_string(),
            "user lacks privilege or object not found: a, t.b"
        );

        let err = SqlError::UniqueViolation {
            constraint: "uq_a".to_string(),
            table: "t".to_string(),
            key: "1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unique constraint or index violation: uq_a table: t value: 1"
        );

        let err = SqlError::DegreeMismatch {
            expected: 1,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "cardinality violation: expected 1 columns, found 2"
        );

        assert!(SqlError::invariant("unreachable branch").is_invariant_violation());
        assert!(!SqlError::DivisionByZero.is_invariant_violation());
    }
}
