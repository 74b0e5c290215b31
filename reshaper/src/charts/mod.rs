//! Chart-data jobs.
//!
//! Each job filters the loaded records, reshapes them and returns the named
//! tables one chart needs. Jobs are pure: same records and settings, same
//! tables.
//!
//! | job | tables |
//! |---|---|
//! | `federal-taxes` | `taxes` |
//! | `donor-areas` | `areas`, `edges`, `order`, `ranking` |
//! | `tax-share` | `shares` |
//! | `regional-flows` | `flows`, `quantiles`, `outliers` |
//! | `spending-boxplot` | `spending`, `classes` |
//! | `federal-revenue` | `revenue` |
//! | `spending-lines` | `spending` |
//! | `cumulative-flows` | `flows` |

mod donors;
mod federal;
mod flows;
mod shares;

use clap::ValueEnum;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::Settings;
use crate::error::{PipelineError, PipelineResult, ReshapeResult};
use crate::logs::{log_info, log_info_indent, log_warning};
use crate::models::{Field, Key, RecordSet, WideTable};
use crate::transform::{derive, pivot, round_to, Derivation, FillMode, Filter, PivotSpec};

/// The chart-data jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ChartKind {
    /// Federal tax revenue by tax type
    FederalTaxes,
    /// Key-tax area grid of the leading donor regions
    DonorAreas,
    /// Federal share of regional tax revenue, first vs last period
    TaxShare,
    /// Deficit and federal flows per region with income classes
    RegionalFlows,
    /// Per-capita spending by donor/dependent class
    SpendingBoxplot,
    /// Federal revenue totals and key parts
    FederalRevenue,
    /// Federal spending by function
    SpendingLines,
    /// Cumulative net flows over two period windows
    CumulativeFlows,
}

impl ChartKind {
    pub const ALL: [ChartKind; 8] = [
        ChartKind::FederalTaxes,
        ChartKind::DonorAreas,
        ChartKind::TaxShare,
        ChartKind::RegionalFlows,
        ChartKind::SpendingBoxplot,
        ChartKind::FederalRevenue,
        ChartKind::SpendingLines,
        ChartKind::CumulativeFlows,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChartKind::FederalTaxes => "federal-taxes",
            ChartKind::DonorAreas => "donor-areas",
            ChartKind::TaxShare => "tax-share",
            ChartKind::RegionalFlows => "regional-flows",
            ChartKind::SpendingBoxplot => "spending-boxplot",
            ChartKind::FederalRevenue => "federal-revenue",
            ChartKind::SpendingLines => "spending-lines",
            ChartKind::CumulativeFlows => "cumulative-flows",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ChartKind::FederalTaxes => "Federal tax revenue by tax type, RUB tn",
            ChartKind::DonorAreas => "Key taxes of the leading donor regions, RUB bn",
            ChartKind::TaxShare => "Federal taxes as a share of regional revenue",
            ChartKind::RegionalFlows => "Deficit vs federal flow per region, with income classes",
            ChartKind::SpendingBoxplot => "Per-capita spending by donor/dependent class, USD",
            ChartKind::FederalRevenue => "Federal revenue totals and key parts, RUB tn",
            ChartKind::SpendingLines => "Federal spending by function, RUB tn",
            ChartKind::CumulativeFlows => "Cumulative net flows to the federal center, USD bn",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChartKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| PipelineError::UnknownChart(s.to_string()))
    }
}

/// Output of one job: named tables for the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub chart: ChartKind,
    pub tables: BTreeMap<String, WideTable>,
}

impl ChartData {
    pub fn new(chart: ChartKind) -> Self {
        Self { chart, tables: BTreeMap::new() }
    }

    pub fn with_table(mut self, name: &str, table: WideTable) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }

    pub fn table(&self, name: &str) -> Option<&WideTable> {
        self.tables.get(name)
    }

    /// `{ "chart": ..., "tables": { name: [row objects] } }`
    pub fn to_json(&self) -> Value {
        let tables: Map<String, Value> = self
            .tables
            .iter()
            .map(|(name, table)| (name.clone(), Value::Array(table.to_json_records())))
            .collect();
        json!({ "chart": self.chart.name(), "tables": tables })
    }

    /// Write one `<chart>_<table>.csv` per table into `dir`.
    pub fn write_csv_dir(&self, dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for (name, table) in &self.tables {
            let path = dir.join(format!("{}_{}.csv", self.chart.name(), name));
            let file = BufWriter::new(File::create(&path)?);
            table
                .write_csv(file)
                .map_err(|e| PipelineError::Csv(e.into()))?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Run one job.
pub fn run(kind: ChartKind, records: &RecordSet, settings: &Settings) -> ReshapeResult<ChartData> {
    log_info(format!("Building {}", kind));
    let data = match kind {
        ChartKind::FederalTaxes => federal::federal_taxes(records, settings)?,
        ChartKind::DonorAreas => donors::donor_areas(records, settings)?,
        ChartKind::TaxShare => shares::tax_share(records, settings)?,
        ChartKind::RegionalFlows => flows::regional_flows(records, settings)?,
        ChartKind::SpendingBoxplot => flows::spending_boxplot(records, settings)?,
        ChartKind::FederalRevenue => federal::federal_revenue(records, settings)?,
        ChartKind::SpendingLines => federal::spending_lines(records, settings)?,
        ChartKind::CumulativeFlows => flows::cumulative_flows(records, settings)?,
    };
    for (name, table) in &data.tables {
        log_info_indent(
            format!("{}: {} rows x {} columns", name, table.len(), table.columns().len()),
            1,
        );
    }
    Ok(data)
}

/// Run every job, stopping at the first failure.
pub fn run_all(records: &RecordSet, settings: &Settings) -> ReshapeResult<Vec<ChartData>> {
    ChartKind::ALL
        .into_iter()
        .map(|kind| run(kind, records, settings))
        .collect()
}

// =============================================================================
// Shared steps
// =============================================================================

/// Apply `filter`, logging how many records it kept.
fn select(records: &RecordSet, filter: &Filter, what: &str) -> RecordSet {
    let selected = filter.apply(records);
    if selected.is_empty() {
        log_warning(format!("No {} records matched", what));
    } else {
        log_info_indent(format!("{}: {} of {} records", what, selected.len(), records.len()), 1);
    }
    selected
}

/// Pivot categories into columns over the `index` fields.
fn wide(records: &RecordSet, index: &[Field], fill: FillMode) -> ReshapeResult<WideTable> {
    pivot(records, &PivotSpec::new(index, Field::Category).fill(fill))
}

/// Divide every cell of `columns` (all when `None`) and round.
fn rescale(table: &mut WideTable, columns: Option<&[Key]>, divisor: f64, decimals: u32) -> ReshapeResult<()> {
    table.map_values(columns, |v| round_to(v / divisor, Some(decimals)))?;
    Ok(())
}

/// `numerator / denominator * scale` stored as `name`, rounded to `decimals`.
fn ratio_column(
    table: &mut WideTable,
    name: &str,
    numerator: &str,
    denominator: &str,
    scale: f64,
    decimals: u32,
) -> ReshapeResult<()> {
    derive(table, name, &Derivation::ratio(numerator, denominator, scale))?;
    derive(table, name, &Derivation::scale(name, 1.0, Some(decimals)))
}

fn keys(names: &[&str]) -> Vec<Key> {
    names.iter().map(|n| Key::from(*n)).collect()
}

const RUB_TN: f64 = 1.0e12;
const RUB_BN: f64 = 1.0e9;
