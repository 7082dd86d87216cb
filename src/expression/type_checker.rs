//! Type resolution for expressions.
//!
//! Types are inferred bottom-up once column references are bound. Operands
//! that need a different type are coerced with one discipline throughout:
//! literal values are converted in place, untyped parameters adopt the
//! required type, row constructors coerce field by field, and anything else
//! is wrapped in a `Cast` node. Running resolution again on a resolved tree
//! changes nothing.

use crate::access::{aggregate_type, DataType, TypeCategory};
use crate::error::{SqlError, SqlResult};
use crate::expression::{
    BinaryOperator, ExprKind, Expression, Function, SubqueryKind, UnaryOperator,
};

impl Expression {
    /// Infer and check the type of every node in the tree
    pub fn resolve_types(&mut self) -> SqlResult<()> {
        for child in self.children_mut() {
            child.resolve_types()?;
        }

        let data_type = match &mut self.kind {
            ExprKind::Value(value) => match &self.data_type {
                Some(t) => t.clone(),
                None => value.data_type().unwrap_or(DataType::Null),
            },
            ExprKind::Parameter(_) => self.data_type.clone().unwrap_or(DataType::Null),
            ExprKind::Column(column) => match &self.data_type {
                Some(t) => t.clone(),
                None => {
                    return Err(SqlError::invariant(format!(
                        "column {} reached type resolution unbound",
                        column.display_name()
                    )))
                }
            },

            ExprKind::Row(fields) => DataType::Row(fields.iter().map(type_of).collect()),

            ExprKind::Array(elements) => {
                let element_type = unify(elements)?;
                if element_type.is_lob() {
                    return Err(SqlError::type_mismatch("BLOB elements in ARRAY"));
                }
                DataType::Array(Box::new(element_type))
            }

            ExprKind::ValueList(elements) => unify(elements)?,

            ExprKind::Unary { op, operand } => {
                if *op == UnaryOperator::Not && is_untyped_parameter(operand) {
                    operand.data_type = Some(DataType::Boolean);
                }
                op.output_type(&type_of(operand))?
            }

            ExprKind::Binary { op, left, right } => {
                adopt_parameter_types(left, right, op.is_logical(), *op == BinaryOperator::Like);
                if op.is_comparison() {
                    narrow_comparison_literal(left, right);
                    narrow_comparison_literal(right, left);
                }
                op.output_type(&type_of(left), &type_of(right))?
            }

            ExprKind::Quantified { op, left, right, .. } => {
                let left_type = type_of(left);
                let right_type = match &right.kind {
                    ExprKind::ValueList(_) | ExprKind::Subquery { .. } => type_of(right),
                    _ => {
                        return Err(SqlError::invariant(
                            "quantified comparison over a non-table operand",
                        ))
                    }
                };
                if left_type.degree() != right_type.degree() {
                    return Err(SqlError::DegreeMismatch {
                        expected: left_type.degree(),
                        actual: right_type.degree(),
                    });
                }
                op.output_type(&left_type, &right_type)?
            }

            ExprKind::Exists(_) => DataType::Boolean,

            ExprKind::Case {
                operand,
                branches,
                else_result,
            } => {
                for (when, _) in branches.iter_mut() {
                    match operand.as_deref() {
                        Some(operand) => {
                            let (a, b) = (type_of(operand), type_of(when));
                            if a.degree() != b.degree() {
                                return Err(SqlError::DegreeMismatch {
                                    expected: a.degree(),
                                    actual: b.degree(),
                                });
                            }
                            if !a.is_comparable_with(&b) {
                                return Err(SqlError::type_mismatch(format!(
                                    "CASE {} WHEN {}",
                                    a.sql_name(),
                                    b.sql_name()
                                )));
                            }
                        }
                        None => {
                            if is_untyped_parameter(when) {
                                when.data_type = Some(DataType::Boolean);
                            }
                            if !matches!(type_of(when), DataType::Boolean | DataType::Null) {
                                return Err(SqlError::type_mismatch(format!(
                                    "WHEN {} is not a condition",
                                    when.get_sql()
                                )));
                            }
                        }
                    }
                }
                let mut result_type = DataType::Null;
                for (_, then) in branches.iter() {
                    result_type = aggregate_type(&result_type, &type_of(then))?;
                }
                if let Some(e) = else_result.as_ref() {
                    result_type = aggregate_type(&result_type, &type_of(e))?;
                }
                for (_, then) in branches.iter_mut() {
                    coerce_to(then, &result_type)?;
                }
                if let Some(e) = else_result.as_mut() {
                    coerce_to(e, &result_type)?;
                }
                result_type
            }

            ExprKind::Cast { operand, target } => {
                let source = type_of(operand);
                if is_untyped_parameter(operand) {
                    operand.data_type = Some(target.clone());
                } else if !is_convertible(&source, target) {
                    return Err(SqlError::type_mismatch(format!(
                        "CAST {} AS {}",
                        source.sql_name(),
                        target.sql_name()
                    )));
                }
                target.clone()
            }

            ExprKind::Function { function, args } => {
                let arg_types: Vec<DataType> = args.iter().map(type_of).collect();
                let result_type = function.result_type(&arg_types)?;
                if *function == Function::Coalesce {
                    for arg in args.iter_mut() {
                        coerce_to(arg, &result_type)?;
                    }
                }
                result_type
            }

            ExprKind::Aggregate { function, arg, .. } => {
                let arg_type = arg.as_ref().map(|a| type_of(a));
                function.result_type(arg_type.as_ref())?
            }

            ExprKind::Subquery { kind, query, .. } => {
                let types = query.column_types();
                match *kind {
                    SubqueryKind::Array => {
                        if types.len() != 1 {
                            return Err(SqlError::type_mismatch(format!(
                                "ARRAY subquery returns {} columns",
                                types.len()
                            )));
                        }
                        DataType::Array(Box::new(types[0].clone()))
                    }
                    SubqueryKind::Scalar if types.len() > 1 => {
                        *kind = SubqueryKind::Row;
                        DataType::Row(types)
                    }
                    SubqueryKind::Row => DataType::Row(types),
                    SubqueryKind::Scalar | SubqueryKind::Table => {
                        if types.len() == 1 {
                            types[0].clone()
                        } else {
                            DataType::Row(types)
                        }
                    }
                }
            }
        };

        self.data_type = Some(data_type);
        self.refresh_flags();
        self.fold_cast()?;
        Ok(())
    }

    /// Recompute the flags derived from the children
    fn refresh_flags(&mut self) {
        let mut has_aggregate = matches!(self.kind, ExprKind::Aggregate { .. });
        let mut no_optimisation = matches!(
            &self.kind,
            ExprKind::Function { function, .. } if !function.is_deterministic()
        );
        for child in self.children() {
            has_aggregate |= child.flags.has_aggregate;
            no_optimisation |= child.flags.no_optimisation;
        }
        self.flags.has_aggregate = has_aggregate;
        self.flags.no_optimisation = no_optimisation;
    }

    /// Replace `CAST(literal AS T)` by the converted literal
    fn fold_cast(&mut self) -> SqlResult<()> {
        if self.flags.no_optimisation {
            return Ok(());
        }
        if let ExprKind::Cast { operand, target } = &self.kind {
            if let ExprKind::Value(value) = &operand.kind {
                let converted = value.convert_to_type(target)?;
                let target = target.clone();
                let alias = self.alias.take();
                *self = Expression::value(converted);
                self.data_type = Some(target);
                self.alias = alias;
            }
        }
        Ok(())
    }
}

fn type_of(expr: &Expression) -> DataType {
    expr.data_type.clone().unwrap_or(DataType::Null)
}

fn is_untyped_parameter(expr: &Expression) -> bool {
    matches!(expr.kind, ExprKind::Parameter(_)) && type_of(expr) == DataType::Null
}

/// Widen the element types of a list and coerce every element to the result
fn unify(elements: &mut [Expression]) -> SqlResult<DataType> {
    let mut unified = DataType::Null;
    for element in elements.iter() {
        unified = aggregate_type(&unified, &type_of(element))?;
    }
    for element in elements.iter_mut() {
        coerce_to(element, &unified)?;
    }
    Ok(unified)
}

/// Coerce `expr` so that it produces values of `target`
pub(crate) fn coerce_to(expr: &mut Expression, target: &DataType) -> SqlResult<()> {
    let current = type_of(expr);
    if current == *target || *target == DataType::Null {
        return Ok(());
    }
    match &mut expr.kind {
        ExprKind::Value(value) => {
            *value = value.convert_to_type(target)?;
            expr.data_type = Some(target.clone());
        }
        ExprKind::Parameter(_) if current == DataType::Null => {
            expr.data_type = Some(target.clone());
        }
        ExprKind::Row(fields) => {
            let DataType::Row(types) = target else {
                return Err(SqlError::type_mismatch(format!(
                    "{} to {}",
                    current.sql_name(),
                    target.sql_name()
                )));
            };
            if fields.len() != types.len() {
                return Err(SqlError::DegreeMismatch {
                    expected: types.len(),
                    actual: fields.len(),
                });
            }
            for (field, t) in fields.iter_mut().zip(types.iter()) {
                coerce_to(field, t)?;
            }
            expr.data_type = Some(target.clone());
        }
        _ => {
            if !is_convertible(&current, target) {
                return Err(SqlError::type_mismatch(format!(
                    "{} to {}",
                    current.sql_name(),
                    target.sql_name()
                )));
            }
            let flags = expr.flags;
            let inner = std::mem::replace(expr, Expression::null());
            let mut cast = Expression::cast(inner, target.clone());
            cast.data_type = Some(target.clone());
            cast.flags = flags;
            cast.alias = cast_alias(&cast);
            *expr = cast;
        }
    }
    Ok(())
}

/// Keep the output name of a coerced column
fn cast_alias(cast: &Expression) -> Option<String> {
    match &cast.kind {
        ExprKind::Cast { operand, .. } => operand.output_name(),
        _ => None,
    }
}

/// Give untyped parameters the type of the opposite operand
fn adopt_parameter_types(left: &mut Expression, right: &mut Expression, logical: bool, like: bool) {
    let forced = if logical {
        Some(DataType::Boolean)
    } else if like {
        Some(DataType::Varchar)
    } else {
        None
    };
    let (lt, rt) = (type_of(left), type_of(right));
    for (side, other) in [(&mut *left, rt), (&mut *right, lt)] {
        if is_untyped_parameter(side) {
            if let Some(t) = forced.clone().or(Some(other)) {
                if t != DataType::Null {
                    side.data_type = Some(t);
                }
            }
        }
    }
}

/// Convert a numeric literal compared against a column of another numeric
/// type to that type when the conversion is exact, so equality predicates
/// can drive index lookups.
fn narrow_comparison_literal(literal: &mut Expression, other: &Expression) {
    let target = type_of(other);
    if !target.is_numeric() || type_of(literal) == target {
        return;
    }
    if let ExprKind::Value(value) = &literal.kind {
        if value.is_null() || value.as_f64().is_none() {
            return;
        }
        if let Ok(converted) = value.convert_to_type(&target) {
            if converted.compare(value) == Ok(Some(std::cmp::Ordering::Equal)) {
                *literal = Expression::value(converted);
            }
        }
    }
}

/// Whether CAST from `source` to `target` can succeed for some value
pub(crate) fn is_convertible(source: &DataType, target: &DataType) -> bool {
    use TypeCategory as C;
    match (source, target) {
        (DataType::Null, _) => true,
        (DataType::Row(a), DataType::Row(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| is_convertible(x, y))
        }
        (DataType::Array(a), DataType::Array(b)) => is_convertible(a, b),
        (DataType::Row(_) | DataType::Array(_), _) | (_, DataType::Row(_) | DataType::Array(_)) => {
            false
        }
        _ => match (source.category(), target.category()) {
            (a, b) if a == b => true,
            (_, C::Character) => true,
            (C::Character, _) => true,
            _ => false,
        },
    }
}
