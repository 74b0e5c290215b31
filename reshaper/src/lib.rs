//! # Budget Reshaper - chart data from Russian budget statistics
//!
//! Budget Reshaper turns the long-format budget dataset (one row per region,
//! indicator and year) into the wide tables a plotting layer draws from.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Transform  │────▶│ Chart data  │
//! │ (UTF8/1251) │     │  (auto-enc) │     │ (pivot, ...)│     │ (JSON, CSV) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use budget_reshaper::{load_records, run_chart, ChartKind, Settings};
//!
//! let settings = Settings::load(None)?;
//! let parsed = load_records(&settings.data_path, &settings.schema, settings.delimiter)?;
//! let chart = run_chart(ChartKind::DonorAreas, &parsed.records, &settings)?;
//! println!("{}", chart.to_json());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`logs`] - Pipeline log helpers
//! - [`config`] - Settings and their sources
//! - [`models`] - Records, keys and wide tables
//! - [`parser`] - Delimited text loading with auto-detection
//! - [`transform`] - Filter, pivot, stack, classify, rank, derive
//! - [`charts`] - The chart-data jobs

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod models;

// Loading
pub mod parser;

// Reshaping
pub mod transform;

// Jobs
pub mod charts;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, CsvError, LoadError, PipelineError, PipelineResult, ReshapeError, ReshapeResult,
    SchemaError,
};

// =============================================================================
// Re-exports - Settings
// =============================================================================

pub use config::{
    CumulativeOptions, DatasetSchema, DonorOptions, EmptyGroupPolicy, PeriodWindow, QuantileScheme,
    SentinelPolicy, Settings,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Field, FlowBucket, Key, QuantileBucket, Record, RecordSet, Row, RowKey, SignBucket, WideTable,
};

// =============================================================================
// Re-exports - Loading
// =============================================================================

pub use parser::{decode_content, detect_delimiter, detect_encoding, load_records, parse_str, ParseResult};

// =============================================================================
// Re-exports - Reshaping
// =============================================================================

pub use transform::{
    classify_flow, cumulative_by_group, cumulative_sum, melt, pivot, rank, unstack, Derivation,
    FillMode, Filter, PivotSpec, QuantileClassifier, RankOptions,
};

// =============================================================================
// Re-exports - Jobs
// =============================================================================

pub use charts::{run as run_chart, run_all as run_all_charts, ChartData, ChartKind};
