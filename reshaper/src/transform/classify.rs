//! Bucket classification of table values.
//!
//! - per-period quantile buckets ([`QuantileClassifier`])
//! - donor/dependent flow buckets ([`classify_flow`])
//! - positive/non-positive sign buckets ([`annotate_signs`])
//!
//! The scalar rules are pure functions; the `annotate_*` helpers map them
//! over a table and store the result as label columns.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{EmptyGroupPolicy, QuantileScheme, SentinelPolicy};
use crate::error::{ReshapeError, ReshapeResult};
use crate::logs::log_warning;
use crate::models::{Field, FlowBucket, Key, QuantileBucket, RowKey, SignBucket, WideTable};

// =============================================================================
// Quantiles
// =============================================================================

/// Quantile `q` of ascending `sorted` values, linearly interpolated between
/// the closest ranks.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Thresholds of one period, ascending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thresholds {
    values: Vec<f64>,
}

impl Thresholds {
    /// Thresholds at `levels` (ascending) of `values`; `None` when `values` is empty.
    pub fn compute(values: &[f64], levels: &[f64]) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let values = levels
            .iter()
            .map(|&q| quantile(&sorted, q))
            .collect::<Option<Vec<f64>>>()?;
        Some(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Tier of `value`: 0 for values at or above the top threshold, one more
    /// for each threshold it falls below. Ties go to the higher bucket.
    pub fn tier(&self, value: f64) -> usize {
        let reached = self.values.iter().filter(|&&t| value >= t).count();
        self.values.len() - reached
    }
}

/// Bucket of one value given its period's thresholds.
///
/// Sentinel or absent values, and periods without thresholds, are no-data.
pub fn classify_quantile(
    value: Option<f64>,
    thresholds: Option<&Thresholds>,
    sentinel: SentinelPolicy,
) -> QuantileBucket {
    match (value, thresholds) {
        (Some(v), Some(t)) if !sentinel.is_missing(v) => QuantileBucket::Tier(t.tier(v)),
        _ => QuantileBucket::NoData,
    }
}

/// Per-period thresholds and the bucket of every row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantileClassification {
    /// Thresholds per period; `None` for periods without usable values
    pub thresholds: BTreeMap<Key, Option<Thresholds>>,
    /// Bucket of each table row, in row order
    pub buckets: Vec<QuantileBucket>,
}

/// Quantile classification settings.
#[derive(Debug, Clone)]
pub struct QuantileClassifier<'a> {
    pub scheme: &'a QuantileScheme,
    pub sentinel: SentinelPolicy,
    pub empty_group: EmptyGroupPolicy,
}

impl<'a> QuantileClassifier<'a> {
    pub fn new(scheme: &'a QuantileScheme, sentinel: SentinelPolicy, empty_group: EmptyGroupPolicy) -> Self {
        Self { scheme, sentinel, empty_group }
    }

    /// Classify `column` of every row against the thresholds of its `period` level.
    ///
    /// Thresholds are computed once per period from that period's non-sentinel
    /// values only. Under `ZeroIsMissing` the zero-filled cells of regions that
    /// reported nothing do not pull the thresholds down, so they come out
    /// higher than quantiles taken over every cell of the period.
    pub fn classify(&self, table: &WideTable, column: &Key, period: Field) -> ReshapeResult<QuantileClassification> {
        let values = table.column_values(column)?;
        let level = table.level_position(period)?;

        let mut groups: BTreeMap<Key, Vec<f64>> = BTreeMap::new();
        for (row, value) in table.rows().iter().zip(&values) {
            let group = groups.entry(row.level(level).clone()).or_default();
            if let Some(v) = value.filter(|v| !self.sentinel.is_missing(*v)) {
                group.push(v);
            }
        }

        let mut thresholds = BTreeMap::new();
        for (key, group) in groups {
            let computed = Thresholds::compute(&group, &self.scheme.levels);
            if computed.is_none() {
                match self.empty_group {
                    EmptyGroupPolicy::Fail => {
                        return Err(ReshapeError::EmptyGroup { period: key.to_string() })
                    }
                    EmptyGroupPolicy::NoData => {
                        log_warning(format!("Period {} has no usable {} values", key, column))
                    }
                }
            }
            thresholds.insert(key, computed);
        }

        let buckets = table
            .rows()
            .iter()
            .zip(values)
            .map(|(row, value)| {
                let t = thresholds.get(row.level(level)).and_then(Option::as_ref);
                classify_quantile(value, t, self.sentinel)
            })
            .collect();

        Ok(QuantileClassification { thresholds, buckets })
    }

    /// Classify and store the result on `table`: a label column
    /// `label_column` and a numeric `order_column` (tier, no-data last).
    pub fn annotate(
        &self,
        table: &mut WideTable,
        column: &Key,
        period: Field,
        label_column: &str,
        order_column: &str,
    ) -> ReshapeResult<QuantileClassification> {
        let classification = self.classify(table, column, period)?;

        let labels = classification
            .buckets
            .iter()
            .map(|b| Some(self.label(*b).to_string()))
            .collect();
        let order = classification
            .buckets
            .iter()
            .map(|b| Some(self.order(*b) as f64))
            .collect();

        table.set_label_column(label_column, labels);
        table.set_column(order_column, order);
        Ok(classification)
    }

    pub fn label(&self, bucket: QuantileBucket) -> &str {
        match bucket {
            QuantileBucket::Tier(t) => self.scheme.labels.get(t).map(String::as_str).unwrap_or("unknown"),
            QuantileBucket::NoData => &self.scheme.no_data_label,
        }
    }

    /// Sort position of a bucket: tiers first, then no-data.
    pub fn order(&self, bucket: QuantileBucket) -> usize {
        match bucket {
            QuantileBucket::Tier(t) => t,
            QuantileBucket::NoData => self.scheme.tiers(),
        }
    }

    /// Thresholds as a period-indexed table, one column per level (`q40`, ...).
    pub fn thresholds_table(&self, classification: &QuantileClassification) -> WideTable {
        let columns: Vec<Key> = self
            .scheme
            .levels
            .iter()
            .map(|l| Key::from(format!("q{}", (l * 100.0).round())))
            .collect();

        let mut table = WideTable::new(vec![Field::Period], columns);
        for (period, thresholds) in &classification.thresholds {
            let cells = match thresholds {
                Some(t) => t.values().iter().map(|v| Some(*v)).collect(),
                None => vec![None; self.scheme.levels.len()],
            };
            table.push_row(RowKey(vec![period.clone()]), cells);
        }
        table
    }
}

// =============================================================================
// Signed flow buckets
// =============================================================================

/// Classify a net flow against a reference magnitude.
///
/// A zero (or NaN) flow is no-data. Any other flow needs a strictly positive
/// reference. Flows exactly at ±reference belong to the large buckets.
pub fn classify_flow(flow: f64, reference: Option<f64>) -> ReshapeResult<FlowBucket> {
    if flow == 0.0 || flow.is_nan() {
        return Ok(FlowBucket::NoData);
    }

    let r = match reference {
        Some(r) if r > 0.0 && r.is_finite() => r,
        _ => return Err(ReshapeError::MissingReference { flow, reference }),
    };

    Ok(if flow <= -r {
        FlowBucket::LargeNegative
    } else if flow < 0.0 {
        FlowBucket::SmallNegative
    } else if flow < r {
        FlowBucket::SmallPositive
    } else {
        FlowBucket::LargePositive
    })
}

/// Store the [`FlowBucket`] label of every row in `label_column`.
///
/// Rows with an absent flow are no-data.
pub fn annotate_flow_buckets(
    table: &mut WideTable,
    flow: &Key,
    reference: &Key,
    label_column: &str,
) -> ReshapeResult<()> {
    let flows = table.column_values(flow)?;
    let references = table.column_values(reference)?;

    let labels = flows
        .into_iter()
        .zip(references)
        .map(|(f, r)| match f {
            Some(f) => classify_flow(f, r).map(|b| Some(b.label().to_string())),
            None => Ok(Some(FlowBucket::NoData.label().to_string())),
        })
        .collect::<ReshapeResult<Vec<_>>>()?;

    table.set_label_column(label_column, labels);
    Ok(())
}

/// Store the [`SignBucket`] label of `column` in `label_column`; absent stays absent.
pub fn annotate_signs(table: &mut WideTable, column: &Key, label_column: &str) -> ReshapeResult<()> {
    let labels = table
        .column_values(column)?
        .into_iter()
        .map(|v| v.map(|v| SignBucket::of(v).label().to_string()))
        .collect();
    table.set_label_column(label_column, labels);
    Ok(())
}
