//! Operator definitions for expressions.

use crate::access::{aggregate_type, DataType};
use crate::error::{SqlError, SqlResult};
use std::cmp::Ordering;

/// Binary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,

    // String
    Concat,
    Like,
}

impl BinaryOperator {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Div
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    /// Result type of the operator for resolved operand types.
    ///
    /// `DataType::Null` stands for an operand whose type is still open (an
    /// untyped NULL or parameter) and is accepted everywhere.
    pub fn output_type(&self, left: &DataType, right: &DataType) -> SqlResult<DataType> {
        let mismatch = || {
            SqlError::type_mismatch(format!(
                "{} {} {}",
                left.sql_name(),
                self.as_str(),
                right.sql_name()
            ))
        };
        match self {
            BinaryOperator::Add
            | BinaryOperator::Sub
            | BinaryOperator::Mul
            | BinaryOperator::Div => {
                let numeric_or_open = |t: &DataType| t.is_numeric() || *t == DataType::Null;
                if !numeric_or_open(left) || !numeric_or_open(right) {
                    return Err(mismatch());
                }
                aggregate_type(left, right)
            }

            BinaryOperator::Eq
            | BinaryOperator::Ne
            | BinaryOperator::Lt
            | BinaryOperator::Le
            | BinaryOperator::Gt
            | BinaryOperator::Ge => {
                if left.degree() != right.degree() {
                    return Err(SqlError::DegreeMismatch {
                        expected: left.degree(),
                        actual: right.degree(),
                    });
                }
                if left.is_comparable_with(right) {
                    Ok(DataType::Boolean)
                } else {
                    Err(mismatch())
                }
            }

            BinaryOperator::And | BinaryOperator::Or => {
                let boolean = |t: &DataType| matches!(t, DataType::Boolean | DataType::Null);
                if boolean(left) && boolean(right) {
                    Ok(DataType::Boolean)
                } else {
                    Err(mismatch())
                }
            }

            BinaryOperator::Concat => {
                let scalar = |t: &DataType| !matches!(t, DataType::Row(_) | DataType::Array(_));
                if scalar(left) && scalar(right) {
                    Ok(DataType::Varchar)
                } else {
                    Err(mismatch())
                }
            }

            BinaryOperator::Like => {
                let text = |t: &DataType| matches!(t, DataType::Varchar | DataType::Null);
                if text(left) && text(right) {
                    Ok(DataType::Boolean)
                } else {
                    Err(mismatch())
                }
            }
        }
    }

    /// Apply a comparison operator to the outcome of `Value::compare`
    pub fn test(&self, ordering: Ordering) -> bool {
        match self {
            BinaryOperator::Eq => ordering == Ordering::Equal,
            BinaryOperator::Ne => ordering != Ordering::Equal,
            BinaryOperator::Lt => ordering == Ordering::Less,
            BinaryOperator::Le => ordering != Ordering::Greater,
            BinaryOperator::Gt => ordering == Ordering::Greater,
            BinaryOperator::Ge => ordering != Ordering::Less,
            _ => false,
        }
    }

    /// Get the display string for this operator
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Concat => "||",
            BinaryOperator::Like => "LIKE",
        }
    }
}

/// Unary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    IsNull,
    IsNotNull,
    Plus,
    Minus,
}

impl UnaryOperator {
    /// Get the output type of this operator given input type
    pub fn output_type(&self, operand: &DataType) -> SqlResult<DataType> {
        match self {
            UnaryOperator::Not => match operand {
                DataType::Boolean | DataType::Null => Ok(DataType::Boolean),
                other => Err(SqlError::type_mismatch(format!("NOT {}", other.sql_name()))),
            },

            // NULL checks always return boolean regardless of input type
            UnaryOperator::IsNull | UnaryOperator::IsNotNull => Ok(DataType::Boolean),

            UnaryOperator::Plus | UnaryOperator::Minus => {
                if operand.is_numeric() || *operand == DataType::Null {
                    Ok(operand.clone())
                } else {
                    Err(SqlError::type_mismatch(format!(
                        "{}{}",
                        self.as_str(),
                        operand.sql_name()
                    )))
                }
            }
        }
    }

    /// Get the display string for this operator
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "NOT",
            UnaryOperator::IsNull => "IS NULL",
            UnaryOperator::IsNotNull => "IS NOT NULL",
            UnaryOperator::Plus => "+",
            UnaryOperator::Minus => "-",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_operator_output_types() {
        assert_eq!(
            BinaryOperator::Add
                .output_type(&DataType::Int32, &DataType::Int32)
                .unwrap(),
            DataType::Int32
        );
        assert_eq!(
            BinaryOperator::Mul
                .output_type(&DataType::Int32, &DataType::Double)
                .unwrap(),
            DataType::Double
        );
        assert!(BinaryOperator::Add
            .output_type(&DataType::Int32, &DataType::Varchar)
            .is_err());

        assert_eq!(
            BinaryOperator::Eq
                .output_type(&DataType::Int32, &DataType::BigInt)
                .unwrap(),
            DataType::Boolean
        );
        assert!(matches!(
            BinaryOperator::Eq.output_type(&DataType::Int32, &DataType::Varchar),
            Err(SqlError::TypeMismatch(_))
        ));
        assert!(matches!(
            BinaryOperator::Eq.output_type(
                &DataType::Row(vec![DataType::Int32, DataType::Int32]),
                &DataType::Int32
            ),
            Err(SqlError::DegreeMismatch { .. })
        ));

        assert_eq!(
            BinaryOperator::And
                .output_type(&DataType::Boolean, &DataType::Null)
                .unwrap(),
            DataType::Boolean
        );
        assert!(BinaryOperator::And
            .output_type(&DataType::Int32, &DataType::Boolean)
            .is_err());

        assert_eq!(
            BinaryOperator::Concat
                .output_type(&DataType::Varchar, &DataType::Int32)
                .unwrap(),
            DataType::Varchar
        );
        assert_eq!(
            BinaryOperator::Like
                .output_type(&DataType::Varchar, &DataType::Varchar)
                .unwrap(),
            DataType::Boolean
        );
    }

    #[test]
    fn test_unary_operator_output_types() {
        assert_eq!(
            UnaryOperator::Not.output_type(&DataType::Boolean).unwrap(),
            DataType::Boolean
        );
        assert!(UnaryOperator::Not.output_type(&DataType::Int32).is_err());
        assert_eq!(
            UnaryOperator::IsNull.output_type(&DataType::Varchar).unwrap(),
            DataType::Boolean
        );
        assert_eq!(
            UnaryOperator::Minus.output_type(&DataType::BigInt).unwrap(),
            DataType::BigInt
        );
        assert!(UnaryOperator::Minus.output_type(&DataType::Varchar).is_err());
    }

    #[test]
    fn test_comparison_test() {
        assert!(BinaryOperator::Le.test(Ordering::Equal));
        assert!(BinaryOperator::Ne.test(Ordering::Less));
        assert!(!BinaryOperator::Gt.test(Ordering::Equal));
    }
}
