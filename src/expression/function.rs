//! Built-in scalar functions.

use crate::access::{aggregate_type, DataType, Value};
use crate::error::{SqlError, SqlResult};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Abs,
    Mod,
    Upper,
    Lower,
    CharLength,
    Coalesce,
    NullIf,
    Cardinality,
    CurrentTimestamp,
    Rand,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Function> {
        match name.to_ascii_uppercase().as_str() {
            "ABS" => Some(Function::Abs),
            "MOD" => Some(Function::Mod),
            "UPPER" | "UCASE" => Some(Function::Upper),
            "LOWER" | "LCASE" => Some(Function::Lower),
            "CHAR_LENGTH" | "CHARACTER_LENGTH" | "LENGTH" => Some(Function::CharLength),
            "COALESCE" => Some(Function::Coalesce),
            "NULLIF" => Some(Function::NullIf),
            "CARDINALITY" => Some(Function::Cardinality),
            "CURRENT_TIMESTAMP" => Some(Function::CurrentTimestamp),
            "RAND" => Some(Function::Rand),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Abs => "ABS",
            Function::Mod => "MOD",
            Function::Upper => "UPPER",
            Function::Lower => "LOWER",
            Function::CharLength => "CHAR_LENGTH",
            Function::Coalesce => "COALESCE",
            Function::NullIf => "NULLIF",
            Function::Cardinality => "CARDINALITY",
            Function::CurrentTimestamp => "CURRENT_TIMESTAMP",
            Function::Rand => "RAND",
        }
    }

    /// Accepted argument counts as an inclusive range
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Function::Abs
            | Function::Upper
            | Function::Lower
            | Function::CharLength
            | Function::Cardinality => (1, 1),
            Function::Mod | Function::NullIf => (2, 2),
            Function::Coalesce => (1, usize::MAX),
            Function::CurrentTimestamp | Function::Rand => (0, 0),
        }
    }

    pub fn check_arity(&self, count: usize) -> SqlResult<()> {
        let (min, max) = self.arity();
        if count < min || count > max {
            return Err(SqlError::Parse(format!(
                "wrong number of arguments for {}: {}",
                self.name(),
                count
            )));
        }
        Ok(())
    }

    /// Functions whose result may differ between calls with equal arguments
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, Function::CurrentTimestamp | Function::Rand)
    }

    /// Zero-argument functions are rendered without parentheses when the
    /// SQL standard spells them that way.
    pub fn is_niladic_keyword(&self) -> bool {
        matches!(self, Function::CurrentTimestamp)
    }

    /// Result type for the given argument types. For COALESCE the returned
    /// type is also the type every argument is coerced to.
    pub fn result_type(&self, args: &[DataType]) -> SqlResult<DataType> {
        let mismatch = |t: &DataType| {
            SqlError::type_mismatch(format!("{}({})", self.name(), t.sql_name()))
        };
        match self {
            Function::Abs => {
                let t = &args[0];
                if t.is_numeric() || *t == DataType::Null {
                    Ok(t.clone())
                } else {
                    Err(mismatch(t))
                }
            }
            Function::Mod => {
                for t in args {
                    if !(t.is_integral() || *t == DataType::Null) {
                        return Err(mismatch(t));
                    }
                }
                aggregate_type(&args[0], &args[1])
            }
            Function::Upper | Function::Lower => match &args[0] {
                DataType::Varchar | DataType::Null => Ok(DataType::Varchar),
                other => Err(mismatch(other)),
            },
            Function::CharLength => match &args[0] {
                DataType::Varchar | DataType::Null => Ok(DataType::Int32),
                other => Err(mismatch(other)),
            },
            Function::Coalesce => args
                .iter()
                .try_fold(DataType::Null, |acc, t| aggregate_type(&acc, t)),
            Function::NullIf => {
                if !args[0].is_comparable_with(&args[1]) {
                    return Err(mismatch(&args[1]));
                }
                Ok(args[0].clone())
            }
            Function::Cardinality => match &args[0] {
                DataType::Array(_) | DataType::Null => Ok(DataType::Int32),
                other => Err(mismatch(other)),
            },
            Function::CurrentTimestamp => Ok(DataType::BigInt),
            Function::Rand => Ok(DataType::Double),
        }
    }

    /// Evaluate with already computed arguments. COALESCE is short-circuited
    /// by the evaluator and only reaches here with every argument computed.
    pub fn invoke(&self, args: Vec<Value>, statement_timestamp: i64) -> SqlResult<Value> {
        match self {
            Function::Abs => match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::Int32(n) => n
                    .checked_abs()
                    .map(Value::Int32)
                    .ok_or(SqlError::NumericOverflow),
                Value::BigInt(n) => n
                    .checked_abs()
                    .map(Value::BigInt)
                    .ok_or(SqlError::NumericOverflow),
                Value::Double(d) => Ok(Value::Double(d.abs())),
                other => Err(SqlError::type_mismatch(format!("ABS({})", other))),
            },
            Function::Mod => {
                if args.iter().any(Value::is_null) {
                    return Ok(Value::Null);
                }
                match (&args[0], &args[1]) {
                    (Value::Int32(a), Value::Int32(b)) => {
                        if *b == 0 {
                            return Err(SqlError::DivisionByZero);
                        }
                        Ok(Value::Int32(a.wrapping_rem(*b)))
                    }
                    (a, b) => {
                        let (a, b) = match (a.as_integer(), b.as_integer()) {
                            (Some(a), Some(b)) => (a, b),
                            _ => return Err(SqlError::type_mismatch("MOD on non-integer")),
                        };
                        if b == 0 {
                            return Err(SqlError::DivisionByZero);
                        }
                        Ok(Value::BigInt(a.wrapping_rem(b)))
                    }
                }
            }
            Function::Upper | Function::Lower => match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::String(s) => Ok(Value::String(if *self == Function::Upper {
                    s.to_uppercase()
                } else {
                    s.to_lowercase()
                })),
                other => Err(SqlError::type_mismatch(format!("{}({})", self.name(), other))),
            },
            Function::CharLength => match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::String(s) => Ok(Value::Int32(s.chars().count() as i32)),
                other => Err(SqlError::type_mismatch(format!("CHAR_LENGTH({})", other))),
            },
            Function::Coalesce => Ok(args
                .into_iter()
                .find(|v| !v.is_null())
                .unwrap_or(Value::Null)),
            Function::NullIf => {
                let mut args = args.into_iter();
                let first = args.next().unwrap_or(Value::Null);
                let second = args.next().unwrap_or(Value::Null);
                match first.compare(&second)? {
                    Some(std::cmp::Ordering::Equal) => Ok(Value::Null),
                    _ => Ok(first),
                }
            }
            Function::Cardinality => match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::Array(elements) => Ok(Value::Int32(elements.len() as i32)),
                other => Err(SqlError::type_mismatch(format!("CARDINALITY({})", other))),
            },
            Function::CurrentTimestamp => Ok(Value::BigInt(statement_timestamp)),
            Function::Rand => Ok(Value::Double(rand::thread_rng().gen::<f64>())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_arity() {
        assert_eq!(Function::from_name("upper"), Some(Function::Upper));
        assert_eq!(Function::from_name("nope"), None);
        assert!(Function::Mod.check_arity(2).is_ok());
        assert!(Function::Mod.check_arity(1).is_err());
        assert!(Function::Coalesce.check_arity(5).is_ok());
        assert!(!Function::Rand.is_deterministic());
        assert!(Function::Abs.is_deterministic());
    }

    #[test]
    fn test_result_types() {
        assert_eq!(
            Function::Coalesce
                .result_type(&[DataType::Null, DataType::Int32, DataType::BigInt])
                .unwrap(),
            DataType::BigInt
        );
        assert!(Function::Upper.result_type(&[DataType::Int32]).is_err());
        assert_eq!(
            Function::Cardinality
                .result_type(&[DataType::Array(Box::new(DataType::Int32))])
                .unwrap(),
            DataType::Int32
        );
    }

    #[test]
    fn test_invoke() {
        assert_eq!(
            Function::Abs.invoke(vec![Value::Int32(-4)], 0).unwrap(),
            Value::Int32(4)
        );
        assert_eq!(
            Function::Mod
                .invoke(vec![Value::Int32(7), Value::Int32(3)], 0)
                .unwrap(),
            Value::Int32(1)
        );
        assert!(matches!(
            Function::Mod.invoke(vec![Value::Int32(7), Value::Int32(0)], 0),
            Err(SqlError::DivisionByZero)
        ));
        assert_eq!(
            Function::NullIf
                .invoke(vec![Value::Int32(1), Value::Int32(1)], 0)
                .unwrap(),
            Value::Null
        );
        assert_eq!(
            Function::CharLength
                .invoke(vec![Value::String("héllo".to_string())], 0)
                .unwrap(),
            Value::Int32(5)
        );
        assert_eq!(
            Function::CurrentTimestamp.invoke(vec![], 42).unwrap(),
            Value::BigInt(42)
        );
        match Function::Rand.invoke(vec![], 0).unwrap() {
            Value::Double(d) => assert!((0.0..1.0).contains(&d)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
