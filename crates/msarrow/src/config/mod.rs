//! Writer, bulk-load and fan-out settings.

pub mod parser;
mod types;

pub use parser::{load_config, parse_config_str, substitute_env_vars};
pub use types::{BulkOptions, FailurePolicy, FanOutOptions, InsertOptions, MsaConfig, ParquetOptions};
