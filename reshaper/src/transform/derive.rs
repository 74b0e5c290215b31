//! Derived numeric columns.
//!
//! A [`Derivation`] computes one column from other columns of the same row
//! (ratio, difference, weighted sum) or from a column's distribution over rows
//! (share of total, ratio to group mean). Absent inputs give absent outputs;
//! a zero denominator gives an absent cell, never NaN or infinity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ReshapeError, ReshapeResult};
use crate::models::{Field, Key, WideTable};

/// One weighted column of a [`Derivation::Linear`] combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub column: Key,
    #[serde(default = "one")]
    pub weight: f64,
}

fn one() -> f64 {
    1.0
}

impl Term {
    pub fn new(column: impl Into<Key>, weight: f64) -> Self {
        Self { column: column.into(), weight }
    }
}

/// How a derived column is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Derivation {
    /// `numerator / denominator * scale`
    Ratio {
        numerator: Key,
        denominator: Key,
        #[serde(default = "one")]
        scale: f64,
    },

    /// `minuend - subtrahend`
    Difference { minuend: Key, subtrahend: Key },

    /// `Σ weight × column`; absent when any term is absent
    Linear { terms: Vec<Term> },

    /// Sum of the present cells of `columns`; absent when all are absent
    Sum { columns: Vec<Key> },

    /// `column / divisor`, optionally rounded to `decimals`
    Scale {
        column: Key,
        divisor: f64,
        #[serde(default)]
        decimals: Option<u32>,
    },

    /// `column / Σ column * scale` over all rows
    ShareOfTotal {
        column: Key,
        #[serde(default = "one")]
        scale: f64,
    },

    /// `column / mean(column)` over the rows sharing the `group` index level
    RatioToGroupMean { column: Key, group: Field },

    /// `max(column, min)`
    ClipLower { column: Key, min: f64 },

    /// Drop the fractional part of `column`
    Truncate { column: Key },
}

impl Derivation {
    pub fn ratio(numerator: impl Into<Key>, denominator: impl Into<Key>, scale: f64) -> Self {
        Derivation::Ratio {
            numerator: numerator.into(),
            denominator: denominator.into(),
            scale,
        }
    }

    pub fn difference(minuend: impl Into<Key>, subtrahend: impl Into<Key>) -> Self {
        Derivation::Difference {
            minuend: minuend.into(),
            subtrahend: subtrahend.into(),
        }
    }

    pub fn scale(column: impl Into<Key>, divisor: f64, decimals: Option<u32>) -> Self {
        Derivation::Scale { column: column.into(), divisor, decimals }
    }

    /// Compute the derived cells, in row order.
    pub fn evaluate(&self, table: &WideTable) -> ReshapeResult<Vec<Option<f64>>> {
        let values: Vec<Option<f64>> = match self {
            Derivation::Ratio { numerator, denominator, scale } => {
                let num = table.column_values(numerator)?;
                let den = table.column_values(denominator)?;
                num.into_iter()
                    .zip(den)
                    .map(|(n, d)| divide(n?, d?).map(|r| r * scale))
                    .collect()
            }

            Derivation::Difference { minuend, subtrahend } => {
                let a = table.column_values(minuend)?;
                let b = table.column_values(subtrahend)?;
                a.into_iter().zip(b).map(|(a, b)| Some(a? - b?)).collect()
            }

            Derivation::Linear { terms } => {
                if terms.is_empty() {
                    return Err(ReshapeError::InvalidSpec("linear combination has no terms".into()));
                }
                let columns = terms
                    .iter()
                    .map(|t| table.column_values(&t.column))
                    .collect::<Result<Vec<_>, _>>()?;
                (0..table.len())
                    .map(|row| {
                        terms
                            .iter()
                            .zip(&columns)
                            .map(|(t, col)| col[row].map(|v| v * t.weight))
                            .sum::<Option<f64>>()
                    })
                    .collect()
            }

            Derivation::Sum { columns } => {
                let columns = columns
                    .iter()
                    .map(|c| table.column_values(c))
                    .collect::<Result<Vec<_>, _>>()?;
                (0..table.len())
                    .map(|row| {
                        columns
                            .iter()
                            .filter_map(|col| col[row])
                            .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
                    })
                    .collect()
            }

            Derivation::Scale { column, divisor, decimals } => {
                if *divisor == 0.0 {
                    return Err(ReshapeError::InvalidSpec(format!("{} scaled by zero", column)));
                }
                table
                    .column_values(column)?
                    .into_iter()
                    .map(|v| v.map(|v| round_to(v / divisor, *decimals)))
                    .collect()
            }

            Derivation::ShareOfTotal { column, scale } => {
                let values = table.column_values(column)?;
                let total: f64 = values.iter().flatten().sum();
                values
                    .into_iter()
                    .map(|v| divide(v?, total).map(|r| r * scale))
                    .collect()
            }

            Derivation::RatioToGroupMean { column, group } => {
                let level = table.level_position(*group)?;
                let values = table.column_values(column)?;

                let mut sums: HashMap<&Key, (f64, usize)> = HashMap::new();
                for (row, v) in table.rows().iter().zip(&values) {
                    if let Some(v) = v {
                        let entry = sums.entry(row.level(level)).or_insert((0.0, 0));
                        entry.0 += v;
                        entry.1 += 1;
                    }
                }

                table
                    .rows()
                    .iter()
                    .zip(&values)
                    .map(|(row, v)| {
                        let (sum, count) = sums.get(row.level(level))?;
                        divide((*v)?, sum / *count as f64)
                    })
                    .collect()
            }

            Derivation::ClipLower { column, min } => table
                .column_values(column)?
                .into_iter()
                .map(|v| v.map(|v| v.max(*min)))
                .collect(),

            Derivation::Truncate { column } => table
                .column_values(column)?
                .into_iter()
                .map(|v| v.map(f64::trunc))
                .collect(),
        };
        Ok(values)
    }
}

/// Store `derivation` as column `name`, replacing it when it exists.
pub fn derive(table: &mut WideTable, name: impl Into<Key>, derivation: &Derivation) -> ReshapeResult<()> {
    let values = derivation.evaluate(table)?;
    table.set_column(name, values);
    Ok(())
}

/// Apply several derivations in order; later ones may use earlier results.
pub fn derive_all(table: &mut WideTable, derivations: &[(Key, Derivation)]) -> ReshapeResult<()> {
    for (name, derivation) in derivations {
        derive(table, name, derivation)?;
    }
    Ok(())
}

/// Round half away from zero to `decimals` places; unchanged when `None`.
pub fn round_to(value: f64, decimals: Option<u32>) -> f64 {
    match decimals {
        Some(d) => {
            let factor = 10f64.powi(d as i32);
            (value * factor).round() / factor
        }
        None => value,
    }
}

fn divide(numerator: f64, denominator: f64) -> Option<f64> {
    let r = numerator / denominator;
    r.is_finite().then_some(r)
}
