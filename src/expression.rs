//! Expression trees: construction, resolution, type inference and
//! evaluation.
//!
//! This module provides:
//! - The expression tree and its structural equality
//! - Column resolution against range groups, including outer references
//! - Bottom-up type resolution with coercion
//! - Evaluation against an execution context
//! - Grouping validity checks
//! - Scalar functions and set-function accumulators

pub mod compose;
pub mod eval;
pub mod expr;
pub mod function;
pub mod operator;
pub mod resolve;
pub mod set_function;
pub mod type_checker;

pub use expr::{
    ColumnBinding, ColumnRef, ExprFlags, ExprKind, Expression, Quantifier, SubqueryKind,
};
pub use function::Function;
pub use operator::{BinaryOperator, UnaryOperator};
pub use set_function::{SetFunction, SetFunctionAggregator};
