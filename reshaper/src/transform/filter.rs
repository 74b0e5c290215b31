//! Declarative row filters over [`Record`]s.
//!
//! Filters select the rows a chart needs before pivoting. They are plain data
//! (serde-tagged like the rest of the settings) and compose with [`Filter::all`]
//! and [`Filter::any`].
//!
//! ```rust,ignore
//! let f = Filter::all(vec![
//!     Filter::code("i1").eq(2),
//!     Filter::code("r1").eq(3),
//!     Filter::code("r3").ne(0),
//! ]);
//! let federal = f.apply(&records);
//! ```
//!
//! A record without a code compares unequal to everything: every comparison
//! on a missing code is false except `ne`, which is true.

use serde::{Deserialize, Serialize};

use crate::models::{Record, RecordSet};

/// Comparison applied to a classification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn test(self, actual: Option<i64>, expected: i64) -> bool {
        match (self, actual) {
            (Comparison::Ne, None) => true,
            (_, None) => false,
            (Comparison::Eq, Some(a)) => a == expected,
            (Comparison::Ne, Some(a)) => a != expected,
            (Comparison::Lt, Some(a)) => a < expected,
            (Comparison::Le, Some(a)) => a <= expected,
            (Comparison::Gt, Some(a)) => a > expected,
            (Comparison::Ge, Some(a)) => a >= expected,
        }
    }
}

/// A predicate over records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Every inner filter matches (true when empty)
    All { filters: Vec<Filter> },

    /// At least one inner filter matches (false when empty)
    Any { filters: Vec<Filter> },

    /// Inner filter does not match
    Not { filter: Box<Filter> },

    /// Compare a code with a constant
    Code { code: String, op: Comparison, value: i64 },

    /// Code is one of the listed values
    CodeIn { code: String, values: Vec<i64> },

    /// Period is one of the listed values
    PeriodIn { periods: Vec<i32> },

    /// Period lies in `start..=end`
    PeriodRange { start: i32, end: i32 },

    /// Entity is one of the listed names (case-insensitive)
    EntityIn { entities: Vec<String> },

    /// Category is one of the listed names
    CategoryIn { categories: Vec<String> },
}

impl Filter {
    pub fn all(filters: Vec<Filter>) -> Self {
        Filter::All { filters }
    }

    pub fn any(filters: Vec<Filter>) -> Self {
        Filter::Any { filters }
    }

    pub fn negate(self) -> Self {
        Filter::Not { filter: Box::new(self) }
    }

    /// Start a filter on classification code `name`.
    pub fn code(name: &str) -> CodeFilter {
        CodeFilter { code: name.to_string() }
    }

    pub fn periods(periods: &[i32]) -> Self {
        Filter::PeriodIn { periods: periods.to_vec() }
    }

    pub fn period_range(start: i32, end: i32) -> Self {
        Filter::PeriodRange { start, end }
    }

    pub fn entities<S: AsRef<str>>(entities: &[S]) -> Self {
        Filter::EntityIn {
            entities: entities.iter().map(|e| e.as_ref().to_lowercase()).collect(),
        }
    }

    pub fn categories<S: AsRef<str>>(categories: &[S]) -> Self {
        Filter::CategoryIn {
            categories: categories.iter().map(|c| c.as_ref().to_string()).collect(),
        }
    }

    /// Combine with another filter; both must match.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All { mut filters } => {
                filters.push(other);
                Filter::All { filters }
            }
            first => Filter::All { filters: vec![first, other] },
        }
    }

    /// Combine with another filter; either may match.
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Any { mut filters } => {
                filters.push(other);
                Filter::Any { filters }
            }
            first => Filter::Any { filters: vec![first, other] },
        }
    }

    /// Whether `record` passes this filter.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::All { filters } => filters.iter().all(|f| f.matches(record)),
            Filter::Any { filters } => filters.iter().any(|f| f.matches(record)),
            Filter::Not { filter } => !filter.matches(record),
            Filter::Code { code, op, value } => op.test(record.code(code), *value),
            Filter::CodeIn { code, values } => record
                .code(code)
                .is_some_and(|c| values.contains(&c)),
            Filter::PeriodIn { periods } => periods.contains(&record.period),
            Filter::PeriodRange { start, end } => (*start..=*end).contains(&record.period),
            Filter::EntityIn { entities } => {
                let entity = record.entity.to_lowercase();
                entities.iter().any(|e| e.to_lowercase() == entity)
            }
            Filter::CategoryIn { categories } => categories.iter().any(|c| *c == record.category),
        }
    }

    /// A new record set holding the matching records, in their original order.
    pub fn apply(&self, records: &RecordSet) -> RecordSet {
        let kept = records.iter().filter(|r| self.matches(r)).cloned().collect();
        RecordSet::new(kept, records.headers().to_vec())
    }
}

/// Builder returned by [`Filter::code`].
#[derive(Debug, Clone)]
pub struct CodeFilter {
    code: String,
}

impl CodeFilter {
    fn compare(self, op: Comparison, value: i64) -> Filter {
        Filter::Code { code: self.code, op, value }
    }

    pub fn eq(self, value: i64) -> Filter {
        self.compare(Comparison::Eq, value)
    }

    pub fn ne(self, value: i64) -> Filter {
        self.compare(Comparison::Ne, value)
    }

    pub fn lt(self, value: i64) -> Filter {
        self.compare(Comparison::Lt, value)
    }

    pub fn le(self, value: i64) -> Filter {
        self.compare(Comparison::Le, value)
    }

    pub fn gt(self, value: i64) -> Filter {
        self.compare(Comparison::Gt, value)
    }

    pub fn ge(self, value: i64) -> Filter {
        self.compare(Comparison::Ge, value)
    }

    pub fn is_in(self, values: &[i64]) -> Filter {
        Filter::CodeIn { code: self.code, values: values.to_vec() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> RecordSet {
        RecordSet::from_records(vec![
            Record::new("Moscow", "tax_to_fed", 2011, 1.0).with_code("i1", 1).with_code("r3", 0),
            Record::new("tver oblast", "tax_to_fed", 2021, 2.0).with_code("i1", 1).with_code("r3", 3),
            Record::new("", "fed_tax_revenue", 2021, 3.0).with_code("i1", 2),
        ])
    }

    #[test]
    fn test_code_comparisons() {
        let set = records();
        assert_eq!(Filter::code("i1").eq(1).apply(&set).len(), 2);
        assert_eq!(Filter::code("r3").gt(0).apply(&set).len(), 1);
        assert_eq!(Filter::code("i1").is_in(&[2, 5]).apply(&set).len(), 1);
    }

    #[test]
    fn test_missing_code_only_matches_ne() {
        let set = records();
        // the federal row has no r3
        assert_eq!(Filter::code("r3").eq(0).apply(&set).len(), 1);
        assert_eq!(Filter::code("r3").ne(0).apply(&set).len(), 2);
        assert_eq!(Filter::code("r3").is_in(&[0, 3]).apply(&set).len(), 2);
    }

    #[test]
    fn test_composition() {
        let set = records();
        let f = Filter::code("i1").eq(1).and(Filter::periods(&[2021]));
        assert_eq!(f.apply(&set).records()[0].entity, "tver oblast");

        let f = Filter::code("i1").eq(2).or(Filter::entities(&["MOSCOW"]));
        assert_eq!(f.apply(&set).len(), 2);

        let f = Filter::code("i1").eq(1).negate();
        assert_eq!(f.apply(&set).len(), 1);
    }

    #[test]
    fn test_period_range_inclusive() {
        let f = Filter::period_range(2011, 2020);
        assert_eq!(f.apply(&records()).len(), 1);
    }

    #[test]
    fn test_empty_combinators() {
        let r = Record::new("x", "y", 2000, 0.0);
        assert!(Filter::all(vec![]).matches(&r));
        assert!(!Filter::any(vec![]).matches(&r));
    }

    #[test]
    fn test_filter_deserializes_from_json() {
        let json = r#"{ "type": "all", "filters": [
            { "type": "code", "code": "i1", "op": "eq", "value": 1 },
            { "type": "period_in", "periods": [2011, 2021] }
        ] }"#;
        let f: Filter = serde_json::from_str(json).unwrap();
        assert_eq!(f, Filter::code("i1").eq(1).and(Filter::periods(&[2011, 2021])));
    }
}
