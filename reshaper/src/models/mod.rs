//! Domain models for the reshaping pipeline.
//!
//! - [`Record`] - one long-format observation
//! - [`RecordSet`] - the immutable set of records loaded from a file
//! - [`Field`] / [`Key`] - record fields and the values they take
//! - [`WideTable`] - pivoted output handed to the rendering collaborator
//! - [`QuantileBucket`], [`FlowBucket`], [`SignBucket`] - classification labels

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

mod table;

pub use table::{Row, RowKey, WideTable};
pub(crate) use table::{ascending, descending};

// =============================================================================
// Records
// =============================================================================

/// One observation: an entity, a category tag, a period and a value.
///
/// `codes` carries the dataset's integer classification columns
/// (`i1`, `r3`, `s1`, ...). A code with an empty cell is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub entity: String,
    pub category: String,
    pub period: i32,
    pub value: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub codes: BTreeMap<String, i64>,
}

impl Record {
    /// Create a record without classification codes.
    pub fn new(entity: impl Into<String>, category: impl Into<String>, period: i32, value: f64) -> Self {
        Self {
            entity: entity.into(),
            category: category.into(),
            period,
            value,
            codes: BTreeMap::new(),
        }
    }

    /// Attach a classification code.
    pub fn with_code(mut self, name: impl Into<String>, value: i64) -> Self {
        self.codes.insert(name.into(), value);
        self
    }

    /// Look up a classification code.
    pub fn code(&self, name: &str) -> Option<i64> {
        self.codes.get(name).copied()
    }

    /// The key this record takes for `field`.
    pub fn key(&self, field: Field) -> Key {
        match field {
            Field::Entity => Key::Text(self.entity.clone()),
            Field::Category => Key::Text(self.category.clone()),
            Field::Period => Key::Period(self.period),
        }
    }
}

/// Records loaded from one source, never mutated after load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordSet {
    records: Vec<Record>,
    headers: Vec<String>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>, headers: Vec<String>) -> Self {
        Self { records, headers }
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records, headers: Vec::new() }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Column headers of the source file (empty for in-memory sets).
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Distinct periods in ascending order.
    pub fn periods(&self) -> Vec<i32> {
        let mut periods: Vec<i32> = self.records.iter().map(|r| r.period).collect();
        periods.sort_unstable();
        periods.dedup();
        periods
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// =============================================================================
// Fields and Keys
// =============================================================================

/// A categorical field of a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Entity,
    Category,
    Period,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Entity => "entity",
            Field::Category => "category",
            Field::Period => "period",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value of a [`Field`], also used as a column label.
///
/// Periods sort before text, periods numerically, text lexically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Period(i32),
    Text(String),
}

impl Key {
    pub fn as_period(&self) -> Option<i32> {
        match self {
            Key::Period(p) => Some(*p),
            Key::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            Key::Period(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Period(p) => write!(f, "{}", p),
            Key::Text(s) => f.write_str(s),
        }
    }
}

impl From<i32> for Key {
    fn from(p: i32) -> Self {
        Key::Period(p)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<&Key> for Key {
    fn from(k: &Key) -> Self {
        k.clone()
    }
}

// =============================================================================
// Buckets
// =============================================================================

/// Result of per-period quantile classification.
///
/// `Tier(0)` is the highest bucket; higher tiers hold lower values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "tier", rename_all = "snake_case")]
pub enum QuantileBucket {
    Tier(usize),
    NoData,
}

/// Donor/dependent classification of a net flow against a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowBucket {
    /// flow ≤ −reference
    LargeNegative,
    /// −reference < flow < 0
    SmallNegative,
    /// 0 < flow < reference
    SmallPositive,
    /// flow ≥ reference
    LargePositive,
    /// flow is exactly zero
    NoData,
}

impl FlowBucket {
    /// Label used by the budget charts (a negative net flow to a region is a donor).
    pub fn label(self) -> &'static str {
        match self {
            FlowBucket::LargeNegative => "donor_100_and_more",
            FlowBucket::SmallNegative => "donor_up_to_100",
            FlowBucket::SmallPositive => "dependent_up_to_100",
            FlowBucket::LargePositive => "dependent_100_and_more",
            FlowBucket::NoData => "no_data",
        }
    }
}

/// Positive/non-positive split used to color bars and arrows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignBucket {
    Positive,
    NonPositive,
}

impl SignBucket {
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            SignBucket::Positive
        } else {
            SignBucket::NonPositive
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SignBucket::Positive => "positive",
            SignBucket::NonPositive => "non_positive",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keys() {
        let r = Record::new("moscow", "tax_to_fed", 2021, 10.0).with_code("i1", 1);
        assert_eq!(r.key(Field::Entity), Key::Text("moscow".into()));
        assert_eq!(r.key(Field::Period), Key::Period(2021));
        assert_eq!(r.code("i1"), Some(1));
        assert_eq!(r.code("r3"), None);
    }

    #[test]
    fn test_key_ordering() {
        let mut keys = vec![Key::from("b"), Key::from(2021), Key::from("a"), Key::from(2011)];
        keys.sort();
        assert_eq!(keys, vec![Key::from(2011), Key::from(2021), Key::from("a"), Key::from("b")]);
    }

    #[test]
    fn test_key_serializes_untagged() {
        assert_eq!(serde_json::to_string(&Key::from(2020)).unwrap(), "2020");
        assert_eq!(serde_json::to_string(&Key::from("vat")).unwrap(), "\"vat\"");
    }

    #[test]
    fn test_record_set_periods() {
        let set = RecordSet::from_records(vec![
            Record::new("x", "a", 2021, 1.0),
            Record::new("y", "a", 2020, 1.0),
            Record::new("x", "b", 2021, 1.0),
        ]);
        assert_eq!(set.periods(), vec![2020, 2021]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_sign_bucket() {
        assert_eq!(SignBucket::of(0.5), SignBucket::Positive);
        assert_eq!(SignBucket::of(0.0), SignBucket::NonPositive);
        assert_eq!(SignBucket::of(-3.0), SignBucket::NonPositive);
    }
}
