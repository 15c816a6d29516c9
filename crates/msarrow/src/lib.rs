//! Arrow record batches in and out of SQL Server.
//!
//! Columnar input is reconciled against a destination table's catalog
//! schema, cast column by column, and written either through multi-row
//! parameterized INSERT statements clamped to the server's bound-parameter
//! ceiling or through BULK INSERT of staged CSV files. The network driver
//! sits behind [`DatabaseDriver`].

pub mod batch;
mod bulk;
pub mod cast;
pub mod config;
pub mod driver;
pub mod error;
pub mod fanout;
pub mod fetch;
pub mod ingest;
pub mod logging;
pub mod reconcile;
pub mod session;
pub mod statement;
pub mod table;
pub mod typemap;

pub use batch::{safe_commit_size, ArrowData};
pub use cast::{cast_batch, cast_column, BatchCaster, CastSettings, TypeCategory};
pub use config::{BulkOptions, FailurePolicy, FanOutOptions, InsertOptions, MsaConfig, ParquetOptions};
pub use driver::{Connector, DatabaseDriver};
pub use error::{Error, Result};
pub use fanout::{fan_out, FanOut};
pub use fetch::ArrowBatches;
pub use ingest::{open_parquet, parquet_files};
pub use reconcile::reconcile;
pub use session::Session;
pub use table::TargetTable;
pub use typemap::{to_column_field, to_columnar_type, SourceType};

pub use msarrow_types::{
    CatalogColumn, ColumnDescription, DescriptionTypeCode, DriverError, SqlValue, TableKind,
    MAX_BOUND_PARAMETERS,
};
