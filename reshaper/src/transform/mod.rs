//! Reshaping operations.
//!
//! - Filter: select the records a chart needs
//! - Pivot: long records to wide tables, and back
//! - Stack: grouped cumulative sums in a fixed category order
//! - Classify: quantile, donor/dependent and sign buckets
//! - Rank: stable ranking with exclusion and top-N
//! - Derive: computed columns

pub mod classify;
pub mod derive;
pub mod filter;
pub mod pivot;
pub mod rank;
pub mod stack;

pub use classify::{
    annotate_flow_buckets, annotate_signs, classify_flow, classify_quantile, quantile,
    QuantileClassification, QuantileClassifier, Thresholds,
};
pub use derive::{derive, derive_all, round_to, Derivation, Term};
pub use filter::{CodeFilter, Comparison, Filter};
pub use pivot::{melt, pivot, unstack, Aggregate, FillMode, PivotSpec};
pub use rank::{rank, rank_rows, RankOptions};
pub use stack::{cumulative_by_group, cumulative_sum};
