//! Set functions (aggregates) and their incremental accumulators.
//!
//! An aggregator is fed one value per contributing row through `add` and
//! produces its result with `get_value`:
//! - NULL inputs are skipped and counted for the null-elimination warning
//! - DISTINCT de-duplicates as values arrive, so intermediate counts are
//!   always exact
//! - Integer sums are accumulated in a 128-bit value held as two 64-bit
//!   halves; the final result must fit BIGINT
//! - With no contributing rows COUNT returns 0 and every other function
//!   returns NULL; sample variance and deviation need two rows

use crate::access::{DataType, Value};
use crate::error::{SqlError, SqlResult};
use std::collections::BTreeSet;

/// Supported set functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Every,
    Some,
    StddevPop,
    StddevSamp,
    VarPop,
    VarSamp,
}

impl SetFunction {
    pub fn from_name(name: &str) -> Option<SetFunction> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(SetFunction::Count),
            "SUM" => Some(SetFunction::Sum),
            "AVG" => Some(SetFunction::Avg),
            "MIN" => Some(SetFunction::Min),
            "MAX" => Some(SetFunction::Max),
            "EVERY" => Some(SetFunction::Every),
            "SOME" | "ANY" => Some(SetFunction::Some),
            "STDDEV_POP" => Some(SetFunction::StddevPop),
            "STDDEV_SAMP" | "STDDEV" => Some(SetFunction::StddevSamp),
            "VAR_POP" => Some(SetFunction::VarPop),
            "VAR_SAMP" | "VARIANCE" => Some(SetFunction::VarSamp),
            _ => None,
        }
    }

    /// Returns the name of the set function
    pub fn name(&self) -> &'static str {
        match self {
            SetFunction::Count => "COUNT",
            SetFunction::Sum => "SUM",
            SetFunction::Avg => "AVG",
            SetFunction::Min => "MIN",
            SetFunction::Max => "MAX",
            SetFunction::Every => "EVERY",
            SetFunction::Some => "SOME",
            SetFunction::StddevPop => "STDDEV_POP",
            SetFunction::StddevSamp => "STDDEV_SAMP",
            SetFunction::VarPop => "VAR_POP",
            SetFunction::VarSamp => "VAR_SAMP",
        }
    }

    /// Result type for an argument type; `None` is `COUNT(*)`
    pub fn result_type(&self, arg: Option<&DataType>) -> SqlResult<DataType> {
        let arg = match (self, arg) {
            (SetFunction::Count, _) => return Ok(DataType::BigInt),
            (_, Some(t)) => t,
            (_, None) => {
                return Err(SqlError::InvalidAggregate(format!(
                    "{}(*) is not allowed",
                    self.name()
                )))
            }
        };
        let mismatch = || SqlError::type_mismatch(format!("{}({})", self.name(), arg.sql_name()));
        match self {
            SetFunction::Count => Ok(DataType::BigInt),
            SetFunction::Sum => match arg {
                DataType::Int32 | DataType::BigInt | DataType::Null => Ok(DataType::BigInt),
                DataType::Double => Ok(DataType::Double),
                _ => Err(mismatch()),
            },
            SetFunction::Avg
            | SetFunction::StddevPop
            | SetFunction::StddevSamp
            | SetFunction::VarPop
            | SetFunction::VarSamp => {
                if arg.is_numeric() || *arg == DataType::Null {
                    Ok(DataType::Double)
                } else {
                    Err(mismatch())
                }
            }
            SetFunction::Min | SetFunction::Max => {
                if arg.is_lob() {
                    Err(mismatch())
                } else {
                    Ok(arg.clone())
                }
            }
            SetFunction::Every | SetFunction::Some => match arg {
                DataType::Boolean | DataType::Null => Ok(DataType::Boolean),
                _ => Err(mismatch()),
            },
        }
    }
}

/// 128-bit signed sum kept as a signed high half and an unsigned low half
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LongSum {
    high: i64,
    low: u64,
}

impl LongSum {
    fn add(&mut self, value: i64) -> SqlResult<()> {
        let sign_extension: i64 = if value < 0 { -1 } else { 0 };
        let (low, carry) = self.low.overflowing_add(value as u64);
        self.low = low;
        self.high = self
            .high
            .checked_add(sign_extension)
            .and_then(|h| h.checked_add(carry as i64))
            .ok_or(SqlError::NumericOverflow)?;
        Ok(())
    }

    fn to_i128(self) -> i128 {
        ((self.high as i128) << 64) | self.low as i128
    }
}

/// Incremental state of one set function over one group
#[derive(Debug, Clone)]
pub struct SetFunctionAggregator {
    function: SetFunction,
    distinct: bool,
    seen: BTreeSet<Value>,
    count: u64,
    null_count: u64,
    long_sum: LongSum,
    double_sum: f64,
    integral: bool,
    extreme: Option<Value>,
    every: bool,
    some: bool,
    // Welford running mean and squared deviations
    mean: f64,
    m2: f64,
}

impl SetFunctionAggregator {
    pub fn new(function: SetFunction, distinct: bool) -> Self {
        Self {
            function,
            distinct,
            seen: BTreeSet::new(),
            count: 0,
            null_count: 0,
            long_sum: LongSum::default(),
            double_sum: 0.0,
            integral: true,
            extreme: None,
            every: true,
            some: false,
            mean: 0.0,
            m2: 0.0,
        }
    }

    pub fn function(&self) -> SetFunction {
        self.function
    }

    /// Number of NULL inputs skipped so far
    pub fn null_count(&self) -> u64 {
        self.null_count
    }

    /// Count one row for `COUNT(*)`
    pub fn add_row(&mut self) {
        self.count += 1;
    }

    pub fn add(&mut self, value: Value) -> SqlResult<()> {
        if value.is_null() {
            self.null_count += 1;
            return Ok(());
        }
        if self.distinct && !self.seen.insert(value.clone()) {
            return Ok(());
        }
        self.count += 1;

        match self.function {
            SetFunction::Count => {}
            SetFunction::Sum | SetFunction::Avg => match &value {
                Value::Int32(n) => self.add_integral(*n as i64)?,
                Value::BigInt(n) => self.add_integral(*n)?,
                Value::Double(d) => {
                    self.integral = false;
                    self.double_sum += d;
                }
                other => {
                    return Err(SqlError::type_mismatch(format!(
                        "{} of {}",
                        self.function.name(),
                        other
                    )))
                }
            },
            SetFunction::Min | SetFunction::Max => {
                let replace = match &self.extreme {
                    None => true,
                    Some(current) => {
                        let ordering = value.compare(current)?;
                        match self.function {
                            SetFunction::Min => ordering == Some(std::cmp::Ordering::Less),
                            _ => ordering == Some(std::cmp::Ordering::Greater),
                        }
                    }
                };
                if replace {
                    self.extreme = Some(value);
                }
            }
            SetFunction::Every | SetFunction::Some => match value {
                Value::Boolean(b) => {
                    self.every &= b;
                    self.some |= b;
                }
                other => {
                    return Err(SqlError::type_mismatch(format!(
                        "{} of {}",
                        self.function.name(),
                        other
                    )))
                }
            },
            SetFunction::StddevPop
            | SetFunction::StddevSamp
            | SetFunction::VarPop
            | SetFunction::VarSamp => {
                let x = value.as_f64().ok_or_else(|| {
                    SqlError::type_mismatch(format!("{} of {}", self.function.name(), value))
                })?;
                let n = self.count as f64;
                let delta = x - self.mean;
                self.mean += delta / n;
                self.m2 += delta * (x - self.mean);
            }
        }
        Ok(())
    }

    fn add_integral(&mut self, n: i64) -> SqlResult<()> {
        self.long_sum.add(n)?;
        self.double_sum += n as f64;
        Ok(())
    }

    /// Final value of the function over everything added so far
    pub fn get_value(&self) -> SqlResult<Value> {
        if self.function == SetFunction::Count {
            return i64::try_from(self.count)
                .map(Value::BigInt)
                .map_err(|_| SqlError::NumericOverflow);
        }
        if self.count == 0 {
            return Ok(Value::Null);
        }
        let n = self.count as f64;
        match self.function {
            SetFunction::Count => Ok(Value::BigInt(self.count as i64)),
            SetFunction::Sum => {
                if self.integral {
                    i64::try_from(self.long_sum.to_i128())
                        .map(Value::BigInt)
                        .map_err(|_| SqlError::NumericOverflow)
                } else {
                    Ok(Value::Double(self.double_sum))
                }
            }
            SetFunction::Avg => {
                if self.integral {
                    Ok(Value::Double(self.long_sum.to_i128() as f64 / n))
                } else {
                    Ok(Value::Double(self.double_sum / n))
                }
            }
            SetFunction::Min | SetFunction::Max => Ok(self.extreme.clone().unwrap_or(Value::Null)),
            SetFunction::Every => Ok(Value::Boolean(self.every)),
            SetFunction::Some => Ok(Value::Boolean(self.some)),
            SetFunction::VarPop => Ok(Value::Double(self.m2 / n)),
            SetFunction::StddevPop => Ok(Value::Double((self.m2 / n).sqrt())),
            SetFunction::VarSamp => {
                if self.count < 2 {
                    return Ok(Value::Null);
                }
                Ok(Value::Double(self.m2 / (n - 1.0)))
            }
            SetFunction::StddevSamp => {
                if self.count < 2 {
                    return Ok(Value::Null);
                }
                Ok(Value::Double((self.m2 / (n - 1.0)).sqrt()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(function: SetFunction, distinct: bool, values: Vec<Value>) -> SetFunctionAggregator {
        let mut agg = SetFunctionAggregator::new(function, distinct);
        for v in values {
            agg.add(v).unwrap();
        }
        agg
    }

    #[test]
    fn test_empty_input_policy() {
        assert_eq!(
            feed(SetFunction::Count, false, vec![]).get_value().unwrap(),
            Value::BigInt(0)
        );
        for function in [
            SetFunction::Sum,
            SetFunction::Avg,
            SetFunction::Min,
            SetFunction::Max,
        ] {
            assert_eq!(feed(function, false, vec![]).get_value().unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_sample_variance_needs_two_values() {
        let agg = feed(SetFunction::VarSamp, false, vec![Value::Int32(5)]);
        assert_eq!(agg.get_value().unwrap(), Value::Null);
        let agg = feed(SetFunction::StddevSamp, false, vec![Value::Int32(5)]);
        assert_eq!(agg.get_value().unwrap(), Value::Null);

        let agg = feed(SetFunction::VarPop, false, vec![Value::Int32(5)]);
        assert_eq!(agg.get_value().unwrap(), Value::Double(0.0));

        let agg = feed(
            SetFunction::VarSamp,
            false,
            vec![Value::Int32(2), Value::Int32(4), Value::Int32(6)],
        );
        assert_eq!(agg.get_value().unwrap(), Value::Double(4.0));
    }

    #[test]
    fn test_nulls_are_skipped_and_counted() {
        let agg = feed(
            SetFunction::Sum,
            false,
            vec![Value::Int32(1), Value::Null, Value::Int32(2), Value::Null],
        );
        assert_eq!(agg.get_value().unwrap(), Value::BigInt(3));
        assert_eq!(agg.null_count(), 2);

        let agg = feed(SetFunction::Count, false, vec![Value::Null, Value::Int32(1)]);
        assert_eq!(agg.get_value().unwrap(), Value::BigInt(1));
    }

    #[test]
    fn test_distinct() {
        let agg = feed(
            SetFunction::Count,
            true,
            vec![Value::Int32(1), Value::Int32(1), Value::Int32(2)],
        );
        assert_eq!(agg.get_value().unwrap(), Value::BigInt(2));

        let agg = feed(
            SetFunction::Sum,
            true,
            vec![Value::Int32(5), Value::Int32(5), Value::Null, Value::Int32(7)],
        );
        assert_eq!(agg.get_value().unwrap(), Value::BigInt(12));
        assert_eq!(agg.null_count(), 1);
    }

    #[test]
    fn test_sum_beyond_bigint_intermediate() {
        let mut agg = SetFunctionAggregator::new(SetFunction::Sum, false);
        agg.add(Value::BigInt(i64::MAX)).unwrap();
        agg.add(Value::BigInt(10)).unwrap();
        agg.add(Value::BigInt(-20)).unwrap();
        assert_eq!(agg.get_value().unwrap(), Value::BigInt(i64::MAX - 10));

        agg.add(Value::BigInt(i64::MAX)).unwrap();
        assert!(matches!(agg.get_value(), Err(SqlError::NumericOverflow)));

        let mut agg = SetFunctionAggregator::new(SetFunction::Avg, false);
        agg.add(Value::BigInt(i64::MAX)).unwrap();
        agg.add(Value::BigInt(i64::MAX)).unwrap();
        assert_eq!(agg.get_value().unwrap(), Value::Double(i64::MAX as f64));
    }

    #[test]
    fn test_min_max_every_some() {
        let values = vec![Value::Int32(3), Value::Int32(1), Value::Int32(2)];
        assert_eq!(
            feed(SetFunction::Min, false, values.clone()).get_value().unwrap(),
            Value::Int32(1)
        );
        assert_eq!(
            feed(SetFunction::Max, false, values).get_value().unwrap(),
            Value::Int32(3)
        );

        let flags = vec![Value::Boolean(true), Value::Boolean(false)];
        assert_eq!(
            feed(SetFunction::Every, false, flags.clone()).get_value().unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            feed(SetFunction::Some, false, flags).get_value().unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_result_types() {
        assert_eq!(
            SetFunction::Sum.result_type(Some(&DataType::Int32)).unwrap(),
            DataType::BigInt
        );
        assert_eq!(SetFunction::Count.result_type(None).unwrap(), DataType::BigInt);
        assert!(SetFunction::Sum.result_type(None).is_err());
        assert!(SetFunction::Avg.result_type(Some(&DataType::Varchar)).is_err());
    }
}
