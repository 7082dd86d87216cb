//! SQL data types and values, with the comparison and coercion rules the
//! expression engine relies on.

use crate::error::{SqlError, SqlResult};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Data types supported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Type of an untyped NULL literal before it is coerced by its context
    Null,
    Boolean,
    Int32,
    BigInt,
    Double,
    Varchar,
    /// Large binary object; not usable as a key column
    Blob,
    Row(Vec<DataType>),
    Array(Box<DataType>),
}

/// Broad groups of types that can be compared with each other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Null,
    Boolean,
    Numeric,
    Character,
    Binary,
    Row,
    Array,
}

impl DataType {
    pub fn category(&self) -> TypeCategory {
        match self {
            DataType::Null => TypeCategory::Null,
            DataType::Boolean => TypeCategory::Boolean,
            DataType::Int32 | DataType::BigInt | DataType::Double => TypeCategory::Numeric,
            DataType::Varchar => TypeCategory::Character,
            DataType::Blob => TypeCategory::Binary,
            DataType::Row(_) => TypeCategory::Row,
            DataType::Array(_) => TypeCategory::Array,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.category() == TypeCategory::Numeric
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::BigInt)
    }

    pub fn is_lob(&self) -> bool {
        matches!(self, DataType::Blob)
    }

    /// Number of columns a value of this type occupies
    pub fn degree(&self) -> usize {
        match self {
            DataType::Row(fields) => fields.len(),
            _ => 1,
        }
    }

    fn numeric_rank(&self) -> u8 {
        match self {
            DataType::Int32 => 1,
            DataType::BigInt => 2,
            DataType::Double => 3,
            _ => 0,
        }
    }

    /// SQL spelling of the type, used by `get_sql()` and messages
    pub fn sql_name(&self) -> String {
        match self {
            DataType::Null => "NULL".to_string(),
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::Int32 => "INTEGER".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Double => "DOUBLE".to_string(),
            DataType::Varchar => "VARCHAR".to_string(),
            DataType::Blob => "BLOB".to_string(),
            DataType::Row(fields) => format!(
                "ROW({})",
                fields
                    .iter()
                    .map(|f| f.sql_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            DataType::Array(element) => format!("{} ARRAY", element.sql_name()),
        }
    }

    /// Whether values of the two types can be compared with `=`/`<`.
    pub fn is_comparable_with(&self, other: &DataType) -> bool {
        match (self, other) {
            (DataType::Null, _) | (_, DataType::Null) => true,
            (DataType::Row(a), DataType::Row(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.is_comparable_with(y))
            }
            (DataType::Array(a), DataType::Array(b)) => a.is_comparable_with(b),
            (DataType::Blob, _) | (_, DataType::Blob) => false,
            _ => self.category() == other.category(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// Type-widening rule used for heterogeneous lists (CASE branches, ARRAY
/// literals, set-operation columns).
pub fn aggregate_type(left: &DataType, right: &DataType) -> SqlResult<DataType> {
    match (left, right) {
        (DataType::Null, other) | (other, DataType::Null) => Ok(other.clone()),
        (a, b) if a == b => Ok(a.clone()),
        (a, b) if a.is_numeric() && b.is_numeric() => {
            if a.numeric_rank() >= b.numeric_rank() {
                Ok(a.clone())
            } else {
                Ok(b.clone())
            }
        }
        (DataType::Row(a), DataType::Row(b)) => {
            if a.len() != b.len() {
                return Err(SqlError::DegreeMismatch {
                    expected: a.len(),
                    actual: b.len(),
                });
            }
            let fields = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| aggregate_type(x, y))
                .collect::<SqlResult<Vec<_>>>()?;
            Ok(DataType::Row(fields))
        }
        (DataType::Array(a), DataType::Array(b)) => {
            Ok(DataType::Array(Box::new(aggregate_type(a, b)?)))
        }
        (a, b) => Err(SqlError::type_mismatch(format!(
            "cannot combine {} and {}",
            a, b
        ))),
    }
}

/// Values that can be stored in the database
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    BigInt(i64),
    Double(f64),
    String(String),
    Blob(Vec<u8>),
    Row(Vec<Value>),
    Array(Vec<Value>),
}

impl Value {
    /// Get the data type of this value
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int32(_) => Some(DataType::Int32),
            Value::BigInt(_) => Some(DataType::BigInt),
            Value::Double(_) => Some(DataType::Double),
            Value::String(_) => Some(DataType::Varchar),
            Value::Blob(_) => Some(DataType::Blob),
            Value::Row(fields) => Some(DataType::Row(
                fields
                    .iter()
                    .map(|f| f.data_type().unwrap_or(DataType::Null))
                    .collect(),
            )),
            Value::Array(elements) => {
                let mut element_type = DataType::Null;
                for element in elements {
                    if let Some(t) = element.data_type() {
                        element_type = aggregate_type(&element_type, &t).unwrap_or(element_type);
                    }
                }
                Some(DataType::Array(Box::new(element_type)))
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is compatible with the given data type
    pub fn is_compatible_with(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Null, _) => true,
            (Value::Boolean(_), DataType::Boolean) => true,
            (Value::Int32(_), DataType::Int32) => true,
            (Value::BigInt(_), DataType::BigInt) => true,
            (Value::Double(_), DataType::Double) => true,
            (Value::String(_), DataType::Varchar) => true,
            (Value::Blob(_), DataType::Blob) => true,
            (Value::Row(fields), DataType::Row(types)) => {
                fields.len() == types.len()
                    && fields
                        .iter()
                        .zip(types.iter())
                        .all(|(v, t)| v.is_compatible_with(t))
            }
            (Value::Array(elements), DataType::Array(t)) => {
                elements.iter().all(|v| v.is_compatible_with(t))
            }
            _ => false,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(*n as i64),
            Value::BigInt(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view used by arithmetic and aggregates
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(n) => Some(*n as f64),
            Value::BigInt(n) => Some(*n as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        self.as_i64()
    }

    /// SQL comparison. `None` means unknown (a NULL was involved).
    pub fn compare(&self, other: &Value) -> SqlResult<Option<Ordering>> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(None),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(Some(a.cmp(b))),
            (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
            (Value::Blob(a), Value::Blob(b)) => Ok(Some(a.cmp(b))),
            (Value::Row(a), Value::Row(b)) => {
                if a.len() != b.len() {
                    return Err(SqlError::DegreeMismatch {
                        expected: a.len(),
                        actual: b.len(),
                    });
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Some(Ordering::Equal) => continue,
                        decided => return Ok(decided),
                    }
                }
                Ok(Some(Ordering::Equal))
            }
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Some(Ordering::Equal) => continue,
                        decided => return Ok(decided),
                    }
                }
                Ok(Some(a.len().cmp(&b.len())))
            }
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Ok(Some(x.cmp(&y))),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => Ok(Some(x.total_cmp(&y))),
                    _ => Err(SqlError::type_mismatch(format!(
                        "cannot compare {} with {}",
                        a.type_name(),
                        b.type_name()
                    ))),
                },
            },
        }
    }

    fn type_name(&self) -> String {
        self.data_type()
            .map(|t| t.sql_name())
            .unwrap_or_else(|| "NULL".to_string())
    }

    /// Convert this value to `target`, failing on lossy or impossible
    /// conversions.
    pub fn convert_to_type(&self, target: &DataType) -> SqlResult<Value> {
        if self.is_null() || *target == DataType::Null {
            return Ok(self.clone());
        }
        if self.is_compatible_with(target) {
            return Ok(self.clone());
        }
        let failed = || {
            SqlError::InvalidConversion(format!(
                "{} to {}",
                self.to_sql_string(),
                target.sql_name()
            ))
        };
        match (self, target) {
            (v, DataType::Int32) if v.as_i64().is_some() => {
                let n = v.as_i64().ok_or_else(failed)?;
                i32::try_from(n)
                    .map(Value::Int32)
                    .map_err(|_| SqlError::NumericOverflow)
            }
            (v, DataType::BigInt) if v.as_i64().is_some() => {
                Ok(Value::BigInt(v.as_i64().ok_or_else(failed)?))
            }
            (Value::Double(d), DataType::Int32) => {
                let rounded = round_double(*d)?;
                if rounded < i32::MIN as f64 || rounded > i32::MAX as f64 {
                    return Err(SqlError::NumericOverflow);
                }
                Ok(Value::Int32(rounded as i32))
            }
            (Value::Double(d), DataType::BigInt) => {
                let rounded = round_double(*d)?;
                if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
                    return Err(SqlError::NumericOverflow);
                }
                Ok(Value::BigInt(rounded as i64))
            }
            (v, DataType::Double) if v.as_f64().is_some() => {
                Ok(Value::Double(v.as_f64().ok_or_else(failed)?))
            }
            (Value::String(s), DataType::Int32) => {
                s.trim().parse::<i32>().map(Value::Int32).map_err(|_| failed())
            }
            (Value::String(s), DataType::BigInt) => {
                s.trim().parse::<i64>().map(Value::BigInt).map_err(|_| failed())
            }
            (Value::String(s), DataType::Double) => {
                s.trim().parse::<f64>().map(Value::Double).map_err(|_| failed())
            }
            (Value::String(s), DataType::Boolean) => match s.trim().to_ascii_uppercase().as_str() {
                "TRUE" => Ok(Value::Boolean(true)),
                "FALSE" => Ok(Value::Boolean(false)),
                _ => Err(failed()),
            },
            (Value::String(s), DataType::Blob) => decode_hex(s).map(Value::Blob).ok_or_else(failed),
            (Value::Row(_) | Value::Array(_), DataType::Varchar) => Err(failed()),
            (v, DataType::Varchar) => Ok(Value::String(v.to_display_string())),
            (Value::Row(fields), DataType::Row(types)) => {
                if fields.len() != types.len() {
                    return Err(SqlError::DegreeMismatch {
                        expected: types.len(),
                        actual: fields.len(),
                    });
                }
                let converted = fields
                    .iter()
                    .zip(types.iter())
                    .map(|(v, t)| v.convert_to_type(t))
                    .collect::<SqlResult<Vec<_>>>()?;
                Ok(Value::Row(converted))
            }
            (Value::Array(elements), DataType::Array(t)) => {
                let converted = elements
                    .iter()
                    .map(|v| v.convert_to_type(t))
                    .collect::<SqlResult<Vec<_>>>()?;
                Ok(Value::Array(converted))
            }
            _ => Err(failed()),
        }
    }

    /// Rendering used in diagnostics and formatted constraint keys
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Int32(n) => n.to_string(),
            Value::BigInt(n) => n.to_string(),
            Value::Double(d) => format_double(*d),
            Value::String(s) => s.clone(),
            Value::Blob(bytes) => encode_hex(bytes),
            Value::Row(fields) => format!(
                "({})",
                fields
                    .iter()
                    .map(|v| v.to_display_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Array(elements) => format!(
                "[{}]",
                elements
                    .iter()
                    .map(|v| v.to_display_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Literal SQL text that parses back to an equal value
    pub fn to_sql_string(&self) -> String {
        match self {
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Blob(bytes) => format!("CAST('{}' AS BLOB)", encode_hex(bytes)),
            Value::BigInt(n) if i32::try_from(*n).is_ok() => format!("CAST({} AS BIGINT)", n),
            Value::Row(fields) => format!(
                "ROW({})",
                fields
                    .iter()
                    .map(|v| v.to_sql_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Array(elements) => format!(
                "ARRAY[{}]",
                elements
                    .iter()
                    .map(|v| v.to_sql_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            other => other.to_display_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int32(_) => 2,
            Value::BigInt(_) => 3,
            Value::Double(_) => 4,
            Value::String(_) => 5,
            Value::Blob(_) => 6,
            Value::Row(_) => 7,
            Value::Array(_) => 8,
        }
    }
}

fn round_double(d: f64) -> SqlResult<f64> {
    if d.is_finite() {
        Ok(d.round())
    } else {
        Err(SqlError::InvalidConversion(format!("{} to integer", d)))
    }
}

fn format_double(d: f64) -> String {
    let text = d.to_string();
    if d.is_finite() && !text.contains('.') {
        format!("{}.0", text)
    } else {
        text
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Total ordering used for grouping, DISTINCT, set operations and index keys.
/// NULLs sort first and are equal to each other; values of different types
/// order by type.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
            (Value::BigInt(a), Value::BigInt(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::Row(a), Value::Row(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int32(n) => n.hash(state),
            Value::BigInt(n) => n.hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Blob(bytes) => bytes.hash(state),
            Value::Row(fields) => fields.hash(state),
            Value::Array(elements) => elements.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

/// Comma-joined per-column rendering used in constraint violation messages
pub fn format_key(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_display_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_compatibility() {
        assert!(Value::Null.is_compatible_with(&DataType::Int32));
        assert!(Value::Boolean(true).is_compatible_with(&DataType::Boolean));
        assert!(Value::Int32(42).is_compatible_with(&DataType::Int32));
        assert!(Value::String("hello".to_string()).is_compatible_with(&DataType::Varchar));

        assert!(!Value::Boolean(true).is_compatible_with(&DataType::Int32));
        assert!(!Value::Int32(42).is_compatible_with(&DataType::Varchar));
    }

    #[test]
    fn test_aggregate_type() {
        assert_eq!(
            aggregate_type(&DataType::Int32, &DataType::Double).unwrap(),
            DataType::Double
        );
        assert_eq!(
            aggregate_type(&DataType::Null, &DataType::Varchar).unwrap(),
            DataType::Varchar
        );
        assert!(matches!(
            aggregate_type(&DataType::Int32, &DataType::Varchar),
            Err(SqlError::TypeMismatch(_))
        ));
        assert!(matches!(
            aggregate_type(
                &DataType::Row(vec![DataType::Int32]),
                &DataType::Row(vec![DataType::Int32, DataType::Int32])
            ),
            Err(SqlError::DegreeMismatch { .. })
        ));
    }

    #[test]
    fn test_compare_across_numeric_types() {
        assert_eq!(
            Value::Int32(2).compare(&Value::BigInt(2)).unwrap(),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Int32(2).compare(&Value::Double(2.5)).unwrap(),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Null.compare(&Value::Int32(1)).unwrap(), None);
        assert!(Value::Int32(1)
            .compare(&Value::String("1".to_string()))
            .is_err());
    }

    #[test]
    fn test_row_compare_with_null() {
        let left = Value::Row(vec![Value::Int32(1), Value::Null]);
        let right = Value::Row(vec![Value::Int32(2), Value::Int32(1)]);
        assert_eq!(left.compare(&right).unwrap(), Some(Ordering::Less));

        let right = Value::Row(vec![Value::Int32(1), Value::Int32(1)]);
        assert_eq!(left.compare(&right).unwrap(), None);
    }

    #[test]
    fn test_convert_to_type() {
        assert_eq!(
            Value::Int32(7).convert_to_type(&DataType::BigInt).unwrap(),
            Value::BigInt(7)
        );
        assert_eq!(
            Value::Double(2.5).convert_to_type(&DataType::Int32).unwrap(),
            Value::Int32(3)
        );
        assert_eq!(
            Value::String(" 12 ".to_string())
                .convert_to_type(&DataType::Int32)
                .unwrap(),
            Value::Int32(12)
        );
        assert!(matches!(
            Value::BigInt(i64::MAX).convert_to_type(&DataType::Int32),
            Err(SqlError::NumericOverflow)
        ));
        assert!(matches!(
            Value::String("abc".to_string()).convert_to_type(&DataType::Int32),
            Err(SqlError::InvalidConversion(_))
        ));
    }

    #[test]
    fn test_sql_string() {
        assert_eq!(Value::String("it's".to_string()).to_sql_string(), "'it''s'");
        assert_eq!(Value::Double(1.0).to_sql_string(), "1.0");
        assert_eq!(Value::Null.to_sql_string(), "NULL");
        assert_eq!(
            format_key(&[Value::Int32(1), Value::String("x".to_string())]),
            "1, x"
        );
    }

    #[test]
    fn test_total_order_groups_nulls() {
        let mut values = vec![Value::Int32(3), Value::Null, Value::Int32(1), Value::Null];
        values.sort();
        assert_eq!(
            values,
            vec![Value::Null, Value::Null, Value::Int32(1), Value::Int32(3)]
        );
    }
}
