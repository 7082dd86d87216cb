//! Expression evaluation against the current row context.

use crate::access::{DataType, Value};
use crate::error::{SqlError, SqlResult};
use crate::executor::ExecutionContext;
use crate::expression::{
    BinaryOperator, ExprKind, Expression, Function, Quantifier, SubqueryKind, UnaryOperator,
};
use crate::query::{QueryExpression, RowSet};
use std::cmp::Ordering;
use std::rc::Rc;

impl Expression {
    /// Evaluate to a single value. Row-valued nodes produce `Value::Row`.
    pub fn get_value(&self, ctx: &mut ExecutionContext) -> SqlResult<Value> {
        match &self.kind {
            ExprKind::Value(value) => Ok(value.clone()),

            ExprKind::Parameter(index) => {
                let value = ctx.parameter(*index)?;
                match &self.data_type {
                    Some(t) if *t != DataType::Null => value.convert_to_type(t),
                    _ => Ok(value),
                }
            }

            ExprKind::Column(column) => match column.binding {
                Some(binding) => ctx.column_value(binding),
                None => Err(SqlError::invariant(format!(
                    "unbound column {} at evaluation",
                    column.display_name()
                ))),
            },

            ExprKind::Row(fields) => Ok(Value::Row(evaluate_all(fields, ctx)?)),

            ExprKind::Array(elements) => Ok(Value::Array(evaluate_all(elements, ctx)?)),

            ExprKind::ValueList(_) => Err(SqlError::invariant(
                "value list evaluated outside a quantified comparison",
            )),

            ExprKind::Unary { op, operand } => {
                let value = operand.get_value(ctx)?;
                evaluate_unary_op(*op, value)
            }

            ExprKind::Binary { op, left, right } => match op {
                BinaryOperator::And => {
                    let left = left.get_value(ctx)?;
                    if left == Value::Boolean(false) {
                        return Ok(left);
                    }
                    let right = right.get_value(ctx)?;
                    Ok(and3(&left, &right))
                }
                BinaryOperator::Or => {
                    let left = left.get_value(ctx)?;
                    if left == Value::Boolean(true) {
                        return Ok(left);
                    }
                    let right = right.get_value(ctx)?;
                    Ok(or3(&left, &right))
                }
                _ => {
                    let left = left.get_value(ctx)?;
                    let right = right.get_value(ctx)?;
                    evaluate_binary_op(*op, left, right, self.data_type.as_ref())
                }
            },

            ExprKind::Quantified {
                op,
                quantifier,
                left,
                right,
            } => {
                let probe = left.get_value(ctx)?;
                let candidates = table_values(right, ctx)?;
                evaluate_quantified(*op, *quantifier, &probe, &candidates)
            }

            ExprKind::Exists(subquery) => match &subquery.kind {
                ExprKind::Subquery { query, id, .. } => {
                    let result = subquery_result(query, *id, ctx)?;
                    Ok(Value::Boolean(!result.rows.is_empty()))
                }
                _ => Err(SqlError::invariant("EXISTS over a non-subquery operand")),
            },

            ExprKind::Case {
                operand,
                branches,
                else_result,
            } => {
                let subject = match operand {
                    Some(operand) => Some(operand.get_value(ctx)?),
                    None => None,
                };
                for (when, then) in branches {
                    let matched = match &subject {
                        Some(subject) => {
                            let candidate = when.get_value(ctx)?;
                            subject.compare(&candidate)? == Some(Ordering::Equal)
                        }
                        None => when.test_condition(ctx)?,
                    };
                    if matched {
                        return then.get_value(ctx);
                    }
                }
                match else_result {
                    Some(e) => e.get_value(ctx),
                    None => Ok(Value::Null),
                }
            }

            ExprKind::Cast { operand, target } => operand.get_value(ctx)?.convert_to_type(target),

            ExprKind::Function { function, args } => {
                if *function == Function::Coalesce {
                    for arg in args {
                        let value = arg.get_value(ctx)?;
                        if !value.is_null() {
                            return Ok(value);
                        }
                    }
                    return Ok(Value::Null);
                }
                let values = evaluate_all(args, ctx)?;
                function.invoke(values, ctx.statement_timestamp())
            }

            ExprKind::Aggregate { slot, .. } => match slot {
                Some(slot) => ctx.aggregate(*slot),
                None => Err(SqlError::invariant(format!(
                    "aggregate {} has no accumulator",
                    self.get_sql()
                ))),
            },

            ExprKind::Subquery { kind, query, id } => {
                let result = subquery_result(query, *id, ctx)?;
                match kind {
                    SubqueryKind::Scalar => match result.rows.len() {
                        0 => Ok(Value::Null),
                        1 => Ok(result.rows[0][0].clone()),
                        n => Err(SqlError::CardinalityViolation(format!(
                            "scalar subquery returned {} rows",
                            n
                        ))),
                    },
                    SubqueryKind::Row => match result.rows.len() {
                        0 => Ok(Value::Row(vec![Value::Null; result.columns.len()])),
                        1 => Ok(Value::Row(result.rows[0].clone())),
                        n => Err(SqlError::CardinalityViolation(format!(
                            "row subquery returned {} rows",
                            n
                        ))),
                    },
                    SubqueryKind::Array => Ok(Value::Array(
                        result.rows.iter().map(|row| row[0].clone()).collect(),
                    )),
                    SubqueryKind::Table => Err(SqlError::invariant(
                        "table subquery evaluated as a value",
                    )),
                }
            }
        }
    }

    /// Evaluate to a list of column values: the fields of a row-valued node,
    /// or a single value otherwise.
    pub fn get_row_value(&self, ctx: &mut ExecutionContext) -> SqlResult<Vec<Value>> {
        match &self.kind {
            ExprKind::Row(fields) => evaluate_all(fields, ctx),
            _ => match self.get_value(ctx)? {
                Value::Row(fields) if self.degree() > 1 => Ok(fields),
                value => Ok(vec![value]),
            },
        }
    }

    /// A condition holds only when it evaluates to TRUE
    pub fn test_condition(&self, ctx: &mut ExecutionContext) -> SqlResult<bool> {
        match self.get_value(ctx)? {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(SqlError::type_mismatch(format!(
                "condition {} produced {}",
                self.get_sql(),
                other
            ))),
        }
    }
}

fn evaluate_all(exprs: &[Expression], ctx: &mut ExecutionContext) -> SqlResult<Vec<Value>> {
    exprs.iter().map(|e| e.get_value(ctx)).collect()
}

/// Result of a subquery, reusing the materialized result of an
/// uncorrelated subquery for the rest of the statement. Results that read a
/// recursive work table change every round and are never reused.
fn subquery_result(
    query: &QueryExpression,
    id: usize,
    ctx: &mut ExecutionContext,
) -> SqlResult<Rc<RowSet>> {
    let cacheable = !query.is_correlated() && !query.uses_work_table();
    if cacheable {
        if let Some(cached) = ctx.cached_subquery(id) {
            return Ok(cached);
        }
    }
    let result = Rc::new(query.get_result(ctx)?);
    if cacheable {
        ctx.cache_subquery(id, result.clone());
    }
    Ok(result)
}

/// Values on the right of IN / ANY / ALL
fn table_values(right: &Expression, ctx: &mut ExecutionContext) -> SqlResult<Vec<Value>> {
    match &right.kind {
        ExprKind::ValueList(elements) => evaluate_all(elements, ctx),
        ExprKind::Subquery { query, id, .. } => {
            let result = subquery_result(query, *id, ctx)?;
            Ok(result
                .rows
                .iter()
                .map(|row| {
                    if row.len() == 1 {
                        row[0].clone()
                    } else {
                        Value::Row(row.clone())
                    }
                })
                .collect())
        }
        _ => Err(SqlError::invariant(
            "quantified comparison over a non-table operand",
        )),
    }
}

fn evaluate_quantified(
    op: BinaryOperator,
    quantifier: Quantifier,
    probe: &Value,
    candidates: &[Value],
) -> SqlResult<Value> {
    let mut unknown = false;
    for candidate in candidates {
        match probe.compare(candidate)? {
            Some(ordering) => {
                let holds = op.test(ordering);
                match quantifier {
                    Quantifier::Any if holds => return Ok(Value::Boolean(true)),
                    Quantifier::All if !holds => return Ok(Value::Boolean(false)),
                    _ => {}
                }
            }
            None => unknown = true,
        }
    }
    if unknown {
        Ok(Value::Null)
    } else {
        Ok(Value::Boolean(quantifier == Quantifier::All))
    }
}

fn and3(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Boolean(false), _) | (_, Value::Boolean(false)) => Value::Boolean(false),
        (Value::Boolean(true), Value::Boolean(true)) => Value::Boolean(true),
        _ => Value::Null,
    }
}

fn or3(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Boolean(true), _) | (_, Value::Boolean(true)) => Value::Boolean(true),
        (Value::Boolean(false), Value::Boolean(false)) => Value::Boolean(false),
        _ => Value::Null,
    }
}

/// Evaluate a unary operation
fn evaluate_unary_op(op: UnaryOperator, value: Value) -> SqlResult<Value> {
    match op {
        UnaryOperator::IsNull => Ok(Value::Boolean(match &value {
            Value::Row(fields) => fields.iter().all(Value::is_null),
            v => v.is_null(),
        })),
        UnaryOperator::IsNotNull => Ok(Value::Boolean(match &value {
            Value::Row(fields) => fields.iter().all(|f| !f.is_null()),
            v => !v.is_null(),
        })),
        UnaryOperator::Not => match value {
            Value::Null => Ok(Value::Null),
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            other => Err(SqlError::type_mismatch(format!("NOT {}", other))),
        },
        UnaryOperator::Plus => Ok(value),
        UnaryOperator::Minus => match value {
            Value::Null => Ok(Value::Null),
            Value::Int32(n) => n.checked_neg().map(Value::Int32).ok_or(SqlError::NumericOverflow),
            Value::BigInt(n) => n
                .checked_neg()
                .map(Value::BigInt)
                .ok_or(SqlError::NumericOverflow),
            Value::Double(d) => Ok(Value::Double(-d)),
            other => Err(SqlError::type_mismatch(format!("-{}", other))),
        },
    }
}

/// Evaluate a non-logical binary operation. `result_type` is the resolved
/// type of the node and selects the arithmetic domain.
fn evaluate_binary_op(
    op: BinaryOperator,
    left: Value,
    right: Value,
    result_type: Option<&DataType>,
) -> SqlResult<Value> {
    if op.is_comparison() {
        return Ok(match left.compare(&right)? {
            Some(ordering) => Value::Boolean(op.test(ordering)),
            None => Value::Null,
        });
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    match op {
        BinaryOperator::Add
        | BinaryOperator::Sub
        | BinaryOperator::Mul
        | BinaryOperator::Div => arithmetic(op, &left, &right, result_type),
        BinaryOperator::Concat => Ok(Value::String(format!(
            "{}{}",
            left.to_display_string(),
            right.to_display_string()
        ))),
        BinaryOperator::Like => match (&left, &right) {
            (Value::String(text), Value::String(pattern)) => {
                Ok(Value::Boolean(like_match(text, pattern)))
            }
            _ => Err(SqlError::type_mismatch(format!("{} LIKE {}", left, right))),
        },
        _ => Err(SqlError::invariant(format!(
            "operator {} reached value evaluation",
            op.as_str()
        ))),
    }
}

fn arithmetic(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    result_type: Option<&DataType>,
) -> SqlResult<Value> {
    let domain = match result_type {
        Some(t) if t.is_numeric() => t.clone(),
        _ => match (left, right) {
            (Value::Double(_), _) | (_, Value::Double(_)) => DataType::Double,
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => DataType::BigInt,
            _ => DataType::Int32,
        },
    };
    match domain {
        DataType::Double => {
            let (a, b) = match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(SqlError::type_mismatch(format!(
                        "{} {} {}",
                        left,
                        op.as_str(),
                        right
                    )));
                }
            };
            let value = match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Sub => a - b,
                BinaryOperator::Mul => a * b,
                _ => {
                    if b == 0.0 {
                        return Err(SqlError::DivisionByZero);
                    }
                    a / b
                }
            };
            Ok(Value::Double(value))
        }
        integral => {
            let (a, b) = match (left.as_integer(), right.as_integer()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(SqlError::type_mismatch(format!(
                        "{} {} {}",
                        left,
                        op.as_str(),
                        right
                    )));
                }
            };
            let value = match op {
                BinaryOperator::Add => a.checked_add(b),
                BinaryOperator::Sub => a.checked_sub(b),
                BinaryOperator::Mul => a.checked_mul(b),
                _ => {
                    if b == 0 {
                        return Err(SqlError::DivisionByZero);
                    }
                    a.checked_div(b)
                }
            }
            .ok_or(SqlError::NumericOverflow)?;
            if integral == DataType::Int32 {
                i32::try_from(value)
                    .map(Value::Int32)
                    .map_err(|_| SqlError::NumericOverflow)
            } else {
                Ok(Value::BigInt(value))
            }
        }
    }
}

/// SQL LIKE with `%` (any run) and `_` (one character)
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}
