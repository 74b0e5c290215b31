//! Settings for the chart-data jobs.
//!
//! Sources, lowest to highest precedence:
//!
//! 1. built-in defaults ([`Settings::default`])
//! 2. a JSON settings file (`--config`)
//! 3. `.env` / process environment (`BUDGET_DATA`, `BUDGET_DELIMITER`)
//! 4. command-line flags, applied by the binary
//!
//! Missing fields in the settings file fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};

/// Environment variable naming the dataset file.
pub const ENV_DATA_PATH: &str = "BUDGET_DATA";

/// Environment variable overriding delimiter detection.
pub const ENV_DELIMITER: &str = "BUDGET_DELIMITER";

const DEFAULT_DATA_PATH: &str = "russian_budget_data.csv";

// =============================================================================
// Dataset Schema
// =============================================================================

/// Column names of the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSchema {
    /// Entity column (region name)
    pub entity_column: String,
    /// Categorical tag column (indicator or tax name)
    pub category_column: String,
    /// Period column (integer year)
    pub period_column: String,
    /// Numeric value column
    pub value_column: String,
    /// Integer classification columns kept on each record for filtering
    pub code_columns: Vec<String>,
}

impl Default for DatasetSchema {
    fn default() -> Self {
        Self {
            entity_column: "region_eng".to_string(),
            category_column: "index".to_string(),
            period_column: "year".to_string(),
            value_column: "value".to_string(),
            code_columns: ["i1", "i2", "i3", "r1", "r2", "r3", "r4", "r5", "s1", "s2"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

// =============================================================================
// Classification Policies
// =============================================================================

/// How an exact zero is read by the quantile classification.
///
/// The budget dataset writes zero where a region reported nothing, so the
/// default treats zero as missing. Use `ZeroIsValue` for data that contains
/// genuine zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelPolicy {
    #[default]
    ZeroIsMissing,
    ZeroIsValue,
}

impl SentinelPolicy {
    /// Whether `value` stands for "no data" under this policy.
    pub fn is_missing(self, value: f64) -> bool {
        match self {
            SentinelPolicy::ZeroIsMissing => value == 0.0 || value.is_nan(),
            SentinelPolicy::ZeroIsValue => value.is_nan(),
        }
    }
}

/// What to do with a period that has no usable values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyGroupPolicy {
    /// Put every entity of the period in the no-data bucket.
    #[default]
    NoData,
    /// Fail with [`crate::error::ReshapeError::EmptyGroup`].
    Fail,
}

/// Quantile levels and the labels of the buckets they delimit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantileScheme {
    /// Ascending levels in (0, 1)
    pub levels: Vec<f64>,
    /// Bucket labels from the highest bucket down; one more than `levels`
    pub labels: Vec<String>,
    /// Label of the no-data bucket
    pub no_data_label: String,
}

impl Default for QuantileScheme {
    fn default() -> Self {
        Self {
            levels: vec![0.4, 0.6, 0.8],
            labels: ["high", "higher_avg", "lower_avg", "low"]
                .iter()
                .map(|l| l.to_string())
                .collect(),
            no_data_label: "nodata".to_string(),
        }
    }
}

impl QuantileScheme {
    /// Number of non-sentinel buckets.
    pub fn tiers(&self) -> usize {
        self.levels.len() + 1
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.levels.is_empty() {
            return Err(ConfigError::Invalid("quantile levels are empty".into()));
        }
        if self.levels.iter().any(|l| !(*l > 0.0 && *l < 1.0)) {
            return Err(ConfigError::Invalid("quantile levels must lie in (0, 1)".into()));
        }
        if self.levels.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Invalid("quantile levels must be strictly ascending".into()));
        }
        if self.labels.len() != self.tiers() {
            return Err(ConfigError::Invalid(format!(
                "{} quantile levels need {} labels, got {}",
                self.levels.len(),
                self.tiers(),
                self.labels.len()
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Chart Options
// =============================================================================

/// Options of the donor area-chart grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DonorOptions {
    /// Regions shown on other charts, removed before truncation (case-insensitive)
    pub exclude: Vec<String>,
    /// Number of regions kept
    pub limit: usize,
    /// Stacking order of the tax layers, bottom first
    pub stacking_order: Vec<String>,
}

impl Default for DonorOptions {
    fn default() -> Self {
        Self {
            exclude: [
                "khanty-mansiysk autonomous okrug – ugra",
                "yamalo-nenets autonomous okrug",
                "moscow",
                "republic of tatarstan",
                "saint petersburg",
            ]
            .iter()
            .map(|r| r.to_string())
            .collect(),
            limit: 20,
            stacking_order: ["vat", "oil", "hydrocarbon", "gas_condensate", "gas", "corporate"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

/// Inclusive period range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodWindow {
    pub start: i32,
    pub end: i32,
}

impl PeriodWindow {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, period: i32) -> bool {
        (self.start..=self.end).contains(&period)
    }

    pub fn periods(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }
}

/// Options of the cumulative-flow comparison bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CumulativeOptions {
    pub current: PeriodWindow,
    pub previous: PeriodWindow,
    /// Regions with |cumulative flow| at or below this are dropped
    pub min_magnitude: f64,
}

impl Default for CumulativeOptions {
    fn default() -> Self {
        Self {
            current: PeriodWindow::new(2017, 2021),
            previous: PeriodWindow::new(2012, 2016),
            min_magnitude: 1.0,
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

/// All settings of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Source dataset
    pub data_path: PathBuf,
    /// Delimiter override (auto-detect when `None`)
    pub delimiter: Option<char>,
    pub schema: DatasetSchema,
    pub sentinel: SentinelPolicy,
    pub empty_group: EmptyGroupPolicy,
    pub quantiles: QuantileScheme,
    /// Baseline period of two-point comparisons
    pub first_period: i32,
    /// Final period of two-point comparisons and single-period snapshots
    pub last_period: i32,
    pub donor: DonorOptions,
    pub cumulative: CumulativeOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            delimiter: None,
            schema: DatasetSchema::default(),
            sentinel: SentinelPolicy::default(),
            empty_group: EmptyGroupPolicy::default(),
            quantiles: QuantileScheme::default(),
            first_period: 2011,
            last_period: 2021,
            donor: DonorOptions::default(),
            cumulative: CumulativeOptions::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional JSON file, then the environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };

        dotenvy::dotenv().ok();
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read a JSON settings file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATA_PATH).filter(|p| !p.trim().is_empty()) {
            self.data_path = PathBuf::from(path.trim());
        }

        if let Some(raw) = lookup(ENV_DELIMITER) {
            self.delimiter = Some(parse_delimiter(&raw).ok_or_else(|| ConfigError::InvalidEnv {
                name: ENV_DELIMITER.to_string(),
                message: format!("expected a single character, got '{}'", raw),
            })?);
        }

        Ok(())
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> ConfigResult<()> {
        self.quantiles.validate()?;

        if self.first_period >= self.last_period {
            return Err(ConfigError::Invalid(format!(
                "first_period {} must precede last_period {}",
                self.first_period, self.last_period
            )));
        }
        if self.donor.stacking_order.is_empty() {
            return Err(ConfigError::Invalid("donor stacking order is empty".into()));
        }
        for window in [&self.cumulative.current, &self.cumulative.previous] {
            if window.start > window.end {
                return Err(ConfigError::Invalid(format!(
                    "period window {}..{} is reversed",
                    window.start, window.end
                )));
            }
        }
        if self.delimiter.is_some_and(|d| !d.is_ascii()) {
            return Err(ConfigError::Invalid("delimiter must be ASCII".into()));
        }
        Ok(())
    }
}

/// Parse a delimiter given as one character or as `\t` / `tab`.
pub fn parse_delimiter(raw: &str) -> Option<char> {
    match raw {
        "\\t" | "tab" => Some('\t'),
        _ => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.quantiles.tiers(), 4);
        assert_eq!(settings.schema.entity_column, "region_eng");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "sentinel": "zero_is_value", "donor": { "limit": 10 } }"#,
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.sentinel, SentinelPolicy::ZeroIsValue);
        assert_eq!(settings.donor.limit, 10);
        assert_eq!(settings.donor.stacking_order.len(), 6);
        assert_eq!(settings.last_period, 2021);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [(ENV_DATA_PATH, "/data/budget.csv"), (ENV_DELIMITER, "\\t")].into_iter().collect();

        let mut settings = Settings::default();
        settings
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.data_path, PathBuf::from("/data/budget.csv"));
        assert_eq!(settings.delimiter, Some('\t'));
    }

    #[test]
    fn test_bad_env_delimiter() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(|name| (name == ENV_DELIMITER).then(|| ";;".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_DELIMITER));
    }

    #[test]
    fn test_quantile_scheme_validation() {
        let mut scheme = QuantileScheme::default();
        scheme.levels = vec![0.6, 0.4, 0.8];
        assert!(scheme.validate().is_err());

        let mut scheme = QuantileScheme::default();
        scheme.labels.pop();
        assert!(scheme.validate().is_err());

        let mut scheme = QuantileScheme::default();
        scheme.levels = vec![0.0, 0.5];
        scheme.labels = vec!["a".into(), "b".into(), "c".into()];
        assert!(scheme.validate().is_err());
    }

    #[test]
    fn test_sentinel_policy() {
        assert!(SentinelPolicy::ZeroIsMissing.is_missing(0.0));
        assert!(!SentinelPolicy::ZeroIsValue.is_missing(0.0));
        assert!(SentinelPolicy::ZeroIsValue.is_missing(f64::NAN));
        assert!(!SentinelPolicy::ZeroIsMissing.is_missing(12.5));
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(";"), Some(';'));
        assert_eq!(parse_delimiter("tab"), Some('\t'));
        assert_eq!(parse_delimiter(""), None);
        assert_eq!(parse_delimiter("ab"), None);
    }
}
