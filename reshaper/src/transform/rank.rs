//! Ranking: stable sort on a metric, exclusion, top-N.

use serde::{Deserialize, Serialize};

use crate::error::ReshapeResult;
use crate::logs::log_info_indent;
use crate::models::{ascending, descending, Field, Key, WideTable};

/// Ranking options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankOptions {
    /// Entities removed before truncation, matched case-insensitively
    pub exclude: Vec<String>,
    /// Number of entries kept; all when `None`
    pub limit: Option<usize>,
    /// Largest first (default)
    pub descending: bool,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            limit: None,
            descending: true,
        }
    }
}

impl RankOptions {
    pub fn top(limit: usize) -> Self {
        Self { limit: Some(limit), ..Self::default() }
    }

    pub fn excluding<S: AsRef<str>>(mut self, entities: &[S]) -> Self {
        self.exclude = entities.iter().map(|e| e.as_ref().to_string()).collect();
        self
    }

    fn is_excluded(&self, key: &Key) -> bool {
        let name = key.to_string().to_lowercase();
        self.exclude.iter().any(|e| e.to_lowercase() == name)
    }

    fn compare(&self, a: f64, b: f64) -> std::cmp::Ordering {
        if self.descending {
            descending(Some(a), Some(b))
        } else {
            ascending(Some(a), Some(b))
        }
    }
}

/// Sort `entries` by metric, drop excluded keys, keep the first `limit`.
///
/// The sort is stable: equal metrics keep their input order. NaN sorts last.
pub fn rank(mut entries: Vec<(Key, f64)>, options: &RankOptions) -> Vec<(Key, f64)> {
    entries.sort_by(|a, b| options.compare(a.1, b.1));
    entries.retain(|(k, _)| !options.is_excluded(k));
    if let Some(limit) = options.limit {
        entries.truncate(limit);
    }
    entries
}

/// Rank the rows of `table` on `column`, excluding by the `level` index key.
///
/// Absent metrics sort last.
pub fn rank_rows(table: &WideTable, column: &Key, level: Field, options: &RankOptions) -> ReshapeResult<WideTable> {
    let pos = table.level_position(level)?;
    let mut ranked = table.clone();
    ranked.sort_by_column(column, options.descending)?;

    let before = ranked.len();
    ranked.retain_rows(|r| !options.is_excluded(r.level(pos)));
    if before != ranked.len() {
        log_info_indent(format!("Excluded {} {} rows", before - ranked.len(), level), 1);
    }

    if let Some(limit) = options.limit {
        ranked.truncate(limit);
    }
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RowKey;
    use proptest::prelude::*;

    fn keys(ranked: &[(Key, f64)]) -> Vec<String> {
        ranked.iter().map(|(k, _)| k.to_string()).collect()
    }

    #[test]
    fn test_ties_keep_input_order() {
        let entries = vec![("A".into(), 10.0), ("B".into(), 10.0), ("C".into(), 5.0)];
        assert_eq!(keys(&rank(entries, &RankOptions::default())), vec!["A", "B", "C"]);

        let entries = vec![("B".into(), 10.0), ("C".into(), 5.0), ("A".into(), 10.0)];
        assert_eq!(keys(&rank(entries, &RankOptions::default())), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_exclusion_happens_before_truncation() {
        let entries = vec![
            ("Moscow".into(), 50.0),
            ("Tver".into(), 10.0),
            ("Omsk".into(), 20.0),
            ("Kursk".into(), 5.0),
        ];
        let options = RankOptions::top(2).excluding(&["moscow"]);
        assert_eq!(keys(&rank(entries, &options)), vec!["Omsk", "Tver"]);
    }

    #[test]
    fn test_ascending_and_nan() {
        let entries = vec![("a".into(), f64::NAN), ("b".into(), 2.0), ("c".into(), 1.0)];
        let options = RankOptions { descending: false, ..RankOptions::default() };
        assert_eq!(keys(&rank(entries.clone(), &options)), vec!["c", "b", "a"]);
        assert_eq!(keys(&rank(entries, &RankOptions::default())), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_rank_rows() {
        let mut t = WideTable::new(vec![Field::Entity], vec![Key::from("share")]);
        t.push_row(RowKey::single("x"), vec![Some(1.0)]);
        t.push_row(RowKey::single("y"), vec![None]);
        t.push_row(RowKey::single("z"), vec![Some(3.0)]);
        t.push_row(RowKey::single("w"), vec![Some(2.0)]);

        let ranked = rank_rows(&t, &"share".into(), Field::Entity, &RankOptions::top(2).excluding(&["Z"])).unwrap();
        let names: Vec<String> = ranked.rows().iter().map(|r| r.key.to_string()).collect();
        assert_eq!(names, vec!["(w)", "(x)"]);

        assert!(rank_rows(&t, &"nope".into(), Field::Entity, &RankOptions::default()).is_err());
        assert!(rank_rows(&t, &"share".into(), Field::Period, &RankOptions::default()).is_err());
    }

    proptest! {
        #[test]
        fn prop_rank_is_a_stable_descending_sort(values in prop::collection::vec(0i32..5, 0..30)) {
            let entries: Vec<(Key, f64)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (Key::from(i as i32), *v as f64))
                .collect();
            let ranked = rank(entries, &RankOptions::default());

            prop_assert_eq!(ranked.len(), values.len());
            for w in ranked.windows(2) {
                prop_assert!(w[0].1 >= w[1].1);
                if w[0].1 == w[1].1 {
                    prop_assert!(w[0].0 < w[1].0);
                }
            }
        }
    }
}
