//! Shared value, catalog and error types for the msarrow SQL Server layer.
//!
//! This crate carries no Arrow dependency so driver implementations can depend
//! on it without pulling in the columnar stack.

pub mod catalog;
pub mod error;
pub mod value;

pub use catalog::{CatalogColumn, ColumnDescription, DescriptionTypeCode, TableKind};
pub use error::DriverError;
pub use value::SqlValue;

/// Hard ceiling on bound parameters per statement. The server documents 2100;
/// one slot is held back.
pub const MAX_BOUND_PARAMETERS: usize = 2099;

/// Server error number raised for a deadlock victim.
pub const DEADLOCK_ERROR_NUMBER: i32 = 1205;
