//! Error types for the reshaping pipeline.
//!
//! - [`CsvError`] - reading and decoding the delimited source file
//! - [`SchemaError`] - missing columns and values of the wrong type
//! - [`LoadError`] - either of the above, raised while loading records
//! - [`ReshapeError`] - pivot, stacking, classification and ranking failures
//! - [`ConfigError`] - settings file and settings validation
//! - [`PipelineError`] - top-level batch job errors
//!
//! Every lower-level error converts into [`PipelineError`] via `From`,
//! so `?` works across module boundaries.

use thiserror::Error;

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors while reading the source file.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Content could not be decoded.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Malformed delimited text.
    #[error("Invalid CSV format: {0}")]
    ParseError(#[from] csv::Error),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// Delimiter is not a single-byte character.
    #[error("Delimiter must be an ASCII character, got '{0}'")]
    InvalidDelimiter(char),
}

// =============================================================================
// Schema Errors
// =============================================================================

/// The input does not have the shape a reshape step expects.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    /// An expected column is missing from the file or the table.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A cell could not be parsed as the expected type.
    #[error("Line {line}, column '{column}' (value '{value}'): expected {expected}")]
    InvalidValue {
        line: usize,
        column: String,
        value: String,
        expected: &'static str,
    },

    /// A key has the wrong kind for the field it is used with.
    #[error("Key '{key}' cannot be used as {field}")]
    KeyMismatch { key: String, field: &'static str },
}

// =============================================================================
// Load Errors
// =============================================================================

/// Errors from the data-loading collaborator.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read or parsed as delimited text.
    #[error(transparent)]
    Csv(#[from] CsvError),

    /// The file parsed but does not match the dataset schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

// =============================================================================
// Reshape Errors
// =============================================================================

/// Errors raised by the reshaping operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReshapeError {
    /// Schema problem found while reshaping.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// More than one record maps to the same (row, column) cell.
    #[error("Duplicate key: row {row}, column {column}")]
    DuplicateKey { row: String, column: String },

    /// A period has no values left once sentinels are removed.
    #[error("No usable values for period {period}")]
    EmptyGroup { period: String },

    /// A non-zero flow was classified without a positive reference.
    #[error("Flow {flow} has no usable reference magnitude (got {reference:?})")]
    MissingReference { flow: f64, reference: Option<f64> },

    /// A caller-supplied ordering is empty or repeats a key.
    #[error("Invalid ordering: {0}")]
    InvalidOrdering(String),

    /// A reshape step was configured inconsistently.
    #[error("Invalid reshape: {0}")]
    InvalidSpec(String),

    /// A requested row or index level does not exist.
    #[error("Unknown key: {0}")]
    UnknownKey(String),
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors loading or validating [`crate::config::Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings file could not be read.
    #[error("Failed to read settings: {0}")]
    IoError(#[from] std::io::Error),

    /// Settings file is not valid JSON for [`crate::config::Settings`].
    #[error("Invalid settings JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// An environment override could not be used.
    #[error("Invalid environment variable {name}: {message}")]
    InvalidEnv { name: String, message: String },

    /// Settings are internally inconsistent.
    #[error("Invalid settings: {0}")]
    Invalid(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level errors returned by the batch jobs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source file error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Source schema error.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Loading error.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Reshaping error.
    #[error("Reshape error: {0}")]
    Reshape(#[from] ReshapeError),

    /// Settings error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Writing output failed.
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),

    /// Serializing output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The source file holds no records.
    #[error("No records to reshape")]
    EmptyInput,

    /// The requested chart job does not exist.
    #[error("Unknown chart: {0}")]
    UnknownChart(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for reshaping operations.
pub type ReshapeResult<T> = Result<T, ReshapeError>;

/// Result type for settings operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
