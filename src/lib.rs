pub mod access;
pub mod catalog;
pub mod config;
pub mod constraint;
pub mod database;
pub mod ddl;
pub mod error;
pub mod executor;
pub mod expression;
pub mod query;
pub mod range;
pub mod script;
pub mod session;
pub mod sql;
