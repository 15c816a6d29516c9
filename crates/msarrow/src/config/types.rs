use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::cast::CastSettings;
use crate::error::{Error, Result};
use crate::statement::BulkLoadOptions;

/// Rows bound into one INSERT statement unless configured otherwise.
pub const DEFAULT_COMMIT_SIZE: usize = 10;
pub const DEFAULT_SAFE_MODE: bool = true;
pub const DEFAULT_DEADLOCK_RETRIES: u32 = 3;
pub const DEFAULT_DEADLOCK_RETRY_DELAY_MS: u64 = 200;
pub const DEFAULT_PARQUET_BATCH_ROWS: usize = 65_536;

/// Top-level settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MsaConfig {
    #[serde(default)]
    pub insert: InsertOptions,
    #[serde(default)]
    pub bulk: BulkOptions,
    #[serde(default)]
    pub fanout: FanOutOptions,
    #[serde(default)]
    pub parquet: ParquetOptions,
}

impl MsaConfig {
    pub fn validate(&self) -> Result<()> {
        self.insert.validate()?;
        self.bulk.validate()?;
        self.fanout.validate()?;
        self.parquet.validate()
    }
}

/// Parameterized INSERT settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertOptions {
    /// Requested rows per statement, before clamping to the parameter limit.
    #[serde(default = "default_commit_size")]
    pub commit_size: usize,
    #[serde(default)]
    pub tablock: bool,
    /// Extra attempts after a deadlock.
    #[serde(default = "default_retry")]
    pub retry: u32,
    /// Base backoff; attempt `n` waits `n` times this long.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub commit: bool,
    #[serde(default = "default_safe")]
    pub safe: bool,
    /// Reconcile and cast input batches against the table schema.
    #[serde(default = "default_true")]
    pub cast: bool,
    #[serde(default)]
    pub fill_empty: bool,
    #[serde(default = "default_true", rename = "drop")]
    pub drop_unmatched: bool,
    /// Wrap the write in `SET IDENTITY_INSERT` when identity columns are written.
    #[serde(default)]
    pub identity_insert: bool,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            commit_size: default_commit_size(),
            tablock: false,
            retry: default_retry(),
            retry_delay_ms: default_retry_delay_ms(),
            commit: true,
            safe: default_safe(),
            cast: true,
            fill_empty: false,
            drop_unmatched: true,
            identity_insert: false,
        }
    }
}

impl InsertOptions {
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub fn cast_settings(&self) -> CastSettings {
        CastSettings {
            safe: self.safe,
            fill_empty: self.fill_empty,
            drop_unmatched: self.drop_unmatched,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.commit_size == 0 {
            return Err(Error::Config("insert.commit_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Bulk-load settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkOptions {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_file_format")]
    pub file_format: String,
    #[serde(default = "default_datafile_type")]
    pub datafile_type: String,
    #[serde(default = "default_field_quote")]
    pub field_quote: String,
    #[serde(default = "default_row_terminator")]
    pub row_terminator: String,
    #[serde(default = "default_code_page")]
    pub code_page: String,
    #[serde(default = "default_first_row")]
    pub first_row: u32,
    #[serde(default)]
    pub tablock: bool,
    #[serde(default = "default_true")]
    pub commit: bool,
    #[serde(default = "default_safe")]
    pub safe: bool,
    #[serde(default = "default_true")]
    pub cast: bool,
    #[serde(default)]
    pub other_options: Option<String>,
    /// Parent directory for staged files. Must be readable by the server.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            file_format: default_file_format(),
            datafile_type: default_datafile_type(),
            field_quote: default_field_quote(),
            row_terminator: default_row_terminator(),
            code_page: default_code_page(),
            first_row: default_first_row(),
            tablock: false,
            commit: true,
            safe: default_safe(),
            cast: true,
            other_options: None,
            temp_dir: None,
        }
    }
}

impl BulkOptions {
    /// Field delimiter as the single byte the CSV writer needs. It may be any
    /// ASCII character except a newline or the configured quote.
    pub fn delimiter_byte(&self) -> Result<u8> {
        let quote = self.quote_byte()?;
        match self.delimiter.as_bytes() {
            [b] if b.is_ascii() && *b != b'\n' && *b != b'\r' && *b != quote => Ok(*b),
            _ => Err(Error::Config(format!(
                "bulk.delimiter must be one ASCII character other than a newline or bulk.field_quote ({:?}), got {:?}",
                self.field_quote, self.delimiter
            ))),
        }
    }

    /// Quote character as the single byte the CSV writer needs.
    pub fn quote_byte(&self) -> Result<u8> {
        match self.field_quote.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(Error::Config(format!(
                "bulk.field_quote must be one ASCII character, got {:?}",
                self.field_quote
            ))),
        }
    }

    /// Bulk loads cover every column: missing nullable columns are filled,
    /// nothing is dropped.
    #[must_use]
    pub fn cast_settings(&self) -> CastSettings {
        CastSettings {
            safe: self.safe,
            fill_empty: true,
            drop_unmatched: false,
        }
    }

    #[must_use]
    pub fn load_options(&self) -> BulkLoadOptions {
        BulkLoadOptions {
            file_format: self.file_format.clone(),
            datafile_type: self.datafile_type.clone(),
            first_row: self.first_row,
            field_quote: self.field_quote.clone(),
            row_terminator: self.row_terminator.clone(),
            code_page: self.code_page.clone(),
            field_terminator: self.delimiter.clone(),
            tablock: self.tablock,
            other_options: self.other_options.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.delimiter_byte()?;
        if self.first_row == 0 {
            return Err(Error::Config("bulk.first_row is 1-based".into()));
        }
        Ok(())
    }
}

/// What the fan-out driver does after one work item fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep dispatching; failures surface as their results are read.
    #[default]
    BestEffort,
    /// Stop dispatching new items once a failure is observed. Items already
    /// running still finish, and committed work is not undone.
    CancelPending,
}

/// Fan-out pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FanOutOptions {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Work items handled back to back by one pool slot.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for FanOutOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            timeout_secs: None,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl FanOutOptions {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("fanout.concurrency must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("fanout.chunk_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Parquet file and directory ingestion settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParquetOptions {
    /// Rows decoded into each record batch.
    #[serde(default = "default_parquet_batch_rows")]
    pub batch_rows: usize,
    /// File columns never read, matched case-insensitively.
    #[serde(default)]
    pub exclude_columns: Vec<String>,
    /// Descend into subdirectories when loading a directory.
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Treat a missing directory as empty instead of an error.
    #[serde(default)]
    pub allow_not_found: bool,
}

impl Default for ParquetOptions {
    fn default() -> Self {
        Self {
            batch_rows: default_parquet_batch_rows(),
            exclude_columns: Vec::new(),
            recursive: true,
            allow_not_found: false,
        }
    }
}

impl ParquetOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_rows == 0 {
            return Err(Error::Config("parquet.batch_rows must be at least 1".into()));
        }
        Ok(())
    }

    pub(crate) fn excludes(&self, name: &str) -> bool {
        self.exclude_columns.iter().any(|c| c.eq_ignore_ascii_case(name))
    }
}

fn default_true() -> bool {
    true
}

fn default_safe() -> bool {
    DEFAULT_SAFE_MODE
}

fn default_commit_size() -> usize {
    DEFAULT_COMMIT_SIZE
}

fn default_retry() -> u32 {
    DEFAULT_DEADLOCK_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_DEADLOCK_RETRY_DELAY_MS
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_file_format() -> String {
    "CSV".to_string()
}

fn default_datafile_type() -> String {
    "char".to_string()
}

fn default_field_quote() -> String {
    "\"".to_string()
}

fn default_row_terminator() -> String {
    "\n".to_string()
}

fn default_code_page() -> String {
    "65001".to_string()
}

fn default_first_row() -> u32 {
    2
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map_or(4, |n| (n.get() + 4).min(32))
}

fn default_parquet_batch_rows() -> usize {
    DEFAULT_PARQUET_BATCH_ROWS
}

fn default_chunk_size() -> usize {
    1
}
