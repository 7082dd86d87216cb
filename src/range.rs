//! Range variables: the named row sources of a query, how they are grouped
//! for column resolution, and how they are joined at run time.
//!
//! This module provides:
//! - **RangeVariable**: one FROM item (base table, derived table, CTE or
//!   work table) with its column layout and used-column tracking
//! - **RangeGroup**: the ranges of one query level, used for binding
//!   column references and recording outer references
//! - **QueryPlan**: the join tree with conditions distributed to the
//!   innermost range or outer join able to evaluate them
//! - Nested-loop iteration over a plan, including outer-join null extension

pub mod iterator;
pub mod planner;
pub mod variable;

pub use planner::{plan_ranges, AccessPath, JoinKind, JoinTree, PlanNode, QueryPlan, RangeAccess};
pub use variable::{RangeColumn, RangeGroup, RangeSource, RangeVariable};
