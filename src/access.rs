//! Access layer for row-oriented operations.
//!
//! This module provides the pieces the expression and constraint engine
//! consumes from storage:
//!
//! - **Value / DataType**: SQL values with comparison, coercion and
//!   type-widening rules
//! - **RowStore**: row iteration, index equi-lookup and row mutation
//! - **MemoryRowStore**: the in-process implementation used by tables

pub mod store;
pub mod value;

pub use store::{MemoryRowStore, Row, RowId, RowIterator, RowStore};
pub use value::{aggregate_type, format_key, DataType, TypeCategory, Value};
