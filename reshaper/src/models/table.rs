//! The wide table handed to the rendering collaborator.
//!
//! A [`WideTable`] has ordered index fields, ordered numeric columns, optional
//! categorical label columns and ordered rows. Each row key is unique and each
//! row holds exactly one cell per column. `None` marks an absent value.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;

use super::{Field, Key};
use crate::error::{ReshapeError, ReshapeResult, SchemaError};

/// Composite row key, one [`Key`] per index field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(pub Vec<Key>);

impl RowKey {
    pub fn single(key: impl Into<Key>) -> Self {
        RowKey(vec![key.into()])
    }

    pub fn keys(&self) -> &[Key] {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|k| k.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// One table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub key: RowKey,
    pub cells: Vec<Option<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Option<String>>,
}

impl Row {
    /// The key component at index position `level`.
    pub fn level(&self, level: usize) -> &Key {
        &self.key.0[level]
    }
}

/// Pivoted table: rows keyed by index fields, one column per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideTable {
    index: Vec<Field>,
    columns: Vec<Key>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    label_columns: Vec<String>,
    rows: Vec<Row>,
}

impl WideTable {
    pub fn new(index: Vec<Field>, columns: Vec<Key>) -> Self {
        Self {
            index,
            columns,
            label_columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Append a row. The caller guarantees key uniqueness and cell count.
    pub(crate) fn push_row(&mut self, key: RowKey, cells: Vec<Option<f64>>) {
        debug_assert_eq!(cells.len(), self.columns.len());
        debug_assert_eq!(key.0.len(), self.index.len());
        let labels = vec![None; self.label_columns.len()];
        self.rows.push(Row { key, cells, labels });
    }

    pub fn index(&self) -> &[Field] {
        &self.index
    }

    pub fn columns(&self) -> &[Key] {
        &self.columns
    }

    pub fn label_columns(&self) -> &[String] {
        &self.label_columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    pub fn column_position(&self, column: &Key) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Position of `column`, or a [`SchemaError::MissingColumn`].
    pub fn require_column(&self, column: &Key) -> Result<usize, SchemaError> {
        self.column_position(column)
            .ok_or_else(|| SchemaError::MissingColumn(column.to_string()))
    }

    /// Position of an index field.
    pub fn level_position(&self, field: Field) -> ReshapeResult<usize> {
        self.index
            .iter()
            .position(|f| *f == field)
            .ok_or_else(|| ReshapeError::UnknownKey(format!("index level {}", field)))
    }

    fn label_position(&self, name: &str) -> Option<usize> {
        self.label_columns.iter().position(|c| c == name)
    }

    pub fn row(&self, key: &RowKey) -> Option<&Row> {
        self.rows.iter().find(|r| &r.key == key)
    }

    /// Cell value at `(key, column)`; `None` when absent or either key is unknown.
    pub fn value(&self, key: &RowKey, column: &Key) -> Option<f64> {
        let pos = self.column_position(column)?;
        self.row(key).and_then(|r| r.cells[pos])
    }

    /// All cells of one column, in row order.
    pub fn column_values(&self, column: &Key) -> Result<Vec<Option<f64>>, SchemaError> {
        let pos = self.require_column(column)?;
        Ok(self.rows.iter().map(|r| r.cells[pos]).collect())
    }

    /// Label at row position `row` of label column `name`.
    pub fn label(&self, row: usize, name: &str) -> Option<&str> {
        let pos = self.label_position(name)?;
        self.rows.get(row)?.labels[pos].as_deref()
    }

    // -------------------------------------------------------------------------
    // Columns
    // -------------------------------------------------------------------------

    /// Replace `column` or append it when new. `values` follows row order.
    pub fn set_column(&mut self, column: impl Into<Key>, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.rows.len());
        let column = column.into();
        match self.column_position(&column) {
            Some(pos) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.cells[pos] = v;
                }
            }
            None => {
                self.columns.push(column);
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.cells.push(v);
                }
            }
        }
    }

    /// Replace label column `name` or append it when new.
    pub fn set_label_column(&mut self, name: impl Into<String>, values: Vec<Option<String>>) {
        debug_assert_eq!(values.len(), self.rows.len());
        let name = name.into();
        match self.label_position(&name) {
            Some(pos) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.labels[pos] = v;
                }
            }
            None => {
                self.label_columns.push(name);
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.labels.push(v);
                }
            }
        }
    }

    /// Keep only `columns`, in the given order. Label columns are kept.
    pub fn select(&self, columns: &[Key]) -> Result<WideTable, SchemaError> {
        let positions = columns
            .iter()
            .map(|c| self.require_column(c))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self
            .rows
            .iter()
            .map(|r| Row {
                key: r.key.clone(),
                cells: positions.iter().map(|&p| r.cells[p]).collect(),
                labels: r.labels.clone(),
            })
            .collect();

        Ok(WideTable {
            index: self.index.clone(),
            columns: columns.to_vec(),
            label_columns: self.label_columns.clone(),
            rows,
        })
    }

    /// Rename columns; names not present are ignored.
    pub fn rename(&mut self, mapping: &[(Key, Key)]) {
        for (from, to) in mapping {
            if let Some(pos) = self.column_position(from) {
                self.columns[pos] = to.clone();
            }
        }
    }

    /// Apply `f` to every present cell of `columns` (all columns when `None`).
    pub fn map_values<F>(&mut self, columns: Option<&[Key]>, f: F) -> Result<(), SchemaError>
    where
        F: Fn(f64) -> f64,
    {
        let positions: Vec<usize> = match columns {
            Some(cols) => cols
                .iter()
                .map(|c| self.require_column(c))
                .collect::<Result<_, _>>()?,
            None => (0..self.columns.len()).collect(),
        };
        for row in &mut self.rows {
            for &p in &positions {
                row.cells[p] = row.cells[p].map(&f);
            }
        }
        Ok(())
    }

    /// Reorder columns by their mean over present cells, largest first.
    ///
    /// Columns with no present cells go last; ties keep their order.
    pub fn reorder_columns_by_mean(&mut self) {
        let means: Vec<Option<f64>> = (0..self.columns.len())
            .map(|p| {
                let present: Vec<f64> = self.rows.iter().filter_map(|r| r.cells[p]).collect();
                if present.is_empty() {
                    None
                } else {
                    Some(present.iter().sum::<f64>() / present.len() as f64)
                }
            })
            .collect();

        let mut order: Vec<usize> = (0..self.columns.len()).collect();
        order.sort_by(|&a, &b| descending(means[a], means[b]));

        self.columns = order.iter().map(|&p| self.columns[p].clone()).collect();
        for row in &mut self.rows {
            row.cells = order.iter().map(|&p| row.cells[p]).collect();
        }
    }

    // -------------------------------------------------------------------------
    // Rows
    // -------------------------------------------------------------------------

    /// Stable sort by a column; absent values go last.
    pub fn sort_by_column(&mut self, column: &Key, descending_order: bool) -> Result<(), SchemaError> {
        let pos = self.require_column(column)?;
        self.rows.sort_by(|a, b| {
            if descending_order {
                descending(a.cells[pos], b.cells[pos])
            } else {
                ascending(a.cells[pos], b.cells[pos])
            }
        });
        Ok(())
    }

    /// Stable sort with a caller comparator.
    pub fn sort_rows_by<F>(&mut self, compare: F)
    where
        F: FnMut(&Row, &Row) -> Ordering,
    {
        self.rows.sort_by(compare);
    }

    pub fn retain_rows<F>(&mut self, keep: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(keep);
    }

    /// Drop rows with any absent numeric cell.
    pub fn drop_incomplete(&mut self) {
        self.rows.retain(|r| r.cells.iter().all(Option::is_some));
    }

    pub fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    /// Rows whose `field` level equals `key`, with that level removed.
    pub fn cross_section(&self, field: Field, key: &Key) -> ReshapeResult<WideTable> {
        let level = self.level_position(field)?;

        let mut index = self.index.clone();
        index.remove(level);

        let rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|r| r.level(level) == key)
            .map(|r| {
                let mut keys = r.key.0.clone();
                keys.remove(level);
                Row {
                    key: RowKey(keys),
                    cells: r.cells.clone(),
                    labels: r.labels.clone(),
                }
            })
            .collect();

        if rows.is_empty() {
            return Err(ReshapeError::UnknownKey(format!("{} = {}", field, key)));
        }

        Ok(WideTable {
            index,
            columns: self.columns.clone(),
            label_columns: self.label_columns.clone(),
            rows,
        })
    }

    /// Order rows by the position of their `field` level in `order`.
    ///
    /// Rows whose level is not listed are dropped. Relative order within one
    /// level value is preserved.
    pub fn reindex_level(&self, field: Field, order: &[Key]) -> ReshapeResult<WideTable> {
        let level = self.level_position(field)?;
        let rank: HashMap<&Key, usize> = order.iter().enumerate().map(|(i, k)| (k, i)).collect();
        if rank.len() != order.len() {
            return Err(ReshapeError::InvalidOrdering(format!(
                "order for {} repeats a key",
                field
            )));
        }

        let mut ranked: Vec<(usize, &Row)> = self
            .rows
            .iter()
            .filter_map(|r| rank.get(r.level(level)).map(|&i| (i, r)))
            .collect();
        ranked.sort_by_key(|(i, _)| *i);

        Ok(WideTable {
            index: self.index.clone(),
            columns: self.columns.clone(),
            label_columns: self.label_columns.clone(),
            rows: ranked.into_iter().map(|(_, r)| r.clone()).collect(),
        })
    }

    /// Left join `columns` and `labels` of `other` onto this table.
    ///
    /// Every index field of `other` must be an index field of `self`; rows are
    /// matched on those fields. Unmatched rows get absent cells.
    pub fn join(&self, other: &WideTable, columns: &[Key], labels: &[&str]) -> ReshapeResult<WideTable> {
        let levels = other
            .index
            .iter()
            .map(|f| self.level_position(*f))
            .collect::<ReshapeResult<Vec<usize>>>()?;

        for column in columns {
            if self.column_position(column).is_some() {
                return Err(ReshapeError::DuplicateKey {
                    row: "join".to_string(),
                    column: column.to_string(),
                });
            }
        }

        let col_positions = columns
            .iter()
            .map(|c| other.require_column(c))
            .collect::<Result<Vec<_>, _>>()?;
        let label_positions = labels
            .iter()
            .map(|l| {
                other
                    .label_position(l)
                    .ok_or_else(|| SchemaError::MissingColumn(l.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let lookup: HashMap<&RowKey, &Row> = other.rows.iter().map(|r| (&r.key, r)).collect();

        let mut joined = self.clone();
        joined.columns.extend(columns.iter().cloned());
        joined.label_columns.extend(labels.iter().map(|l| l.to_string()));

        for row in &mut joined.rows {
            let projected = RowKey(levels.iter().map(|&l| row.key.0[l].clone()).collect());
            let matched = lookup.get(&projected);
            for &p in &col_positions {
                row.cells.push(matched.and_then(|m| m.cells[p]));
            }
            for &p in &label_positions {
                row.labels.push(matched.and_then(|m| m.labels[p].clone()));
            }
        }

        Ok(joined)
    }

    /// Collapse rows onto the `keep` index fields, summing every column.
    ///
    /// A cell is absent only when all collapsed cells are absent.
    pub fn group_sum(&self, keep: &[Field]) -> ReshapeResult<WideTable> {
        let levels = keep
            .iter()
            .map(|f| self.level_position(*f))
            .collect::<ReshapeResult<Vec<usize>>>()?;

        let mut groups: BTreeMap<RowKey, Vec<Option<f64>>> = BTreeMap::new();
        for row in &self.rows {
            let key = RowKey(levels.iter().map(|&l| row.key.0[l].clone()).collect());
            let acc = groups
                .entry(key)
                .or_insert_with(|| vec![None; self.columns.len()]);
            for (slot, cell) in acc.iter_mut().zip(&row.cells) {
                if let Some(v) = cell {
                    *slot = Some(slot.unwrap_or(0.0) + v);
                }
            }
        }

        let mut table = WideTable::new(keep.to_vec(), self.columns.clone());
        for (key, cells) in groups {
            table.push_row(key, cells);
        }
        Ok(table)
    }

    // -------------------------------------------------------------------------
    // Output
    // -------------------------------------------------------------------------

    /// Row-oriented JSON: one object per row with index, column and label fields.
    pub fn to_json_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut obj = Map::new();
                for (field, key) in self.index.iter().zip(&row.key.0) {
                    obj.insert(field.name().to_string(), json!(key));
                }
                for (column, cell) in self.columns.iter().zip(&row.cells) {
                    obj.insert(column.to_string(), json!(cell));
                }
                for (name, label) in self.label_columns.iter().zip(&row.labels) {
                    obj.insert(name.clone(), json!(label));
                }
                Value::Object(obj)
            })
            .collect()
    }

    /// Write the table as CSV; absent cells are empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);

        let mut header: Vec<String> = self.index.iter().map(|f| f.name().to_string()).collect();
        header.extend(self.columns.iter().map(|c| c.to_string()));
        header.extend(self.label_columns.iter().cloned());
        out.write_record(&header)?;

        for row in &self.rows {
            let mut record: Vec<String> = row.key.0.iter().map(|k| k.to_string()).collect();
            record.extend(row.cells.iter().map(|c| c.map(|v| v.to_string()).unwrap_or_default()));
            record.extend(row.labels.iter().map(|l| l.clone().unwrap_or_default()));
            out.write_record(&record)?;
        }

        out.flush()?;
        Ok(())
    }
}

/// Ascending order with absent and NaN values last.
pub(crate) fn ascending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a.filter(|v| !v.is_nan()), b.filter(|v| !v.is_nan())) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Descending order with absent and NaN values last.
pub(crate) fn descending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a.filter(|v| !v.is_nan()), b.filter(|v| !v.is_nan())) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WideTable {
        let mut t = WideTable::new(
            vec![Field::Period, Field::Entity],
            vec![Key::from("a"), Key::from("b")],
        );
        t.push_row(RowKey(vec![2020.into(), "x".into()]), vec![Some(1.0), Some(4.0)]);
        t.push_row(RowKey(vec![2020.into(), "y".into()]), vec![Some(3.0), None]);
        t.push_row(RowKey(vec![2021.into(), "x".into()]), vec![Some(2.0), Some(6.0)]);
        t
    }

    #[test]
    fn test_value_lookup() {
        let t = sample();
        let key = RowKey(vec![2020.into(), "x".into()]);
        assert_eq!(t.value(&key, &"b".into()), Some(4.0));
        assert_eq!(t.value(&key, &"zzz".into()), None);
    }

    #[test]
    fn test_select_missing_column() {
        let err = sample().select(&["nope".into()]).unwrap_err();
        assert_eq!(err, SchemaError::MissingColumn("nope".into()));
    }

    #[test]
    fn test_sort_by_column_puts_absent_last() {
        let mut t = sample();
        t.sort_by_column(&"b".into(), true).unwrap();
        let firsts: Vec<Option<f64>> = t.rows().iter().map(|r| r.cells[1]).collect();
        assert_eq!(firsts, vec![Some(6.0), Some(4.0), None]);
    }

    #[test]
    fn test_cross_section_drops_level() {
        let xs = sample().cross_section(Field::Period, &2020.into()).unwrap();
        assert_eq!(xs.index(), &[Field::Entity]);
        assert_eq!(xs.len(), 2);
        assert_eq!(xs.rows()[1].key, RowKey::single("y"));

        let err = sample().cross_section(Field::Period, &1999.into()).unwrap_err();
        assert!(matches!(err, ReshapeError::UnknownKey(_)));
    }

    #[test]
    fn test_group_sum() {
        let g = sample().group_sum(&[Field::Entity]).unwrap();
        assert_eq!(g.len(), 2);
        assert_eq!(g.value(&RowKey::single("x"), &"a".into()), Some(3.0));
        assert_eq!(g.value(&RowKey::single("y"), &"b".into()), None);
    }

    #[test]
    fn test_reindex_level() {
        let t = sample()
            .reindex_level(Field::Entity, &["y".into(), "x".into()])
            .unwrap();
        let entities: Vec<String> = t.rows().iter().map(|r| r.level(1).to_string()).collect();
        assert_eq!(entities, vec!["y", "x", "x"]);

        let err = sample()
            .reindex_level(Field::Entity, &["y".into(), "y".into()])
            .unwrap_err();
        assert!(matches!(err, ReshapeError::InvalidOrdering(_)));
    }

    #[test]
    fn test_join_on_sub_index() {
        let mut other = WideTable::new(vec![Field::Entity], vec![Key::from("pop")]);
        other.push_row(RowKey::single("x"), vec![Some(10.0)]);
        other.set_label_column("class", vec![Some("donor".into())]);

        let joined = sample().join(&other, &["pop".into()], &["class"]).unwrap();
        assert_eq!(joined.columns().len(), 3);
        assert_eq!(joined.rows()[0].cells[2], Some(10.0));
        assert_eq!(joined.label(0, "class"), Some("donor"));
        assert_eq!(joined.rows()[1].cells[2], None);
        assert_eq!(joined.label(1, "class"), None);
    }

    #[test]
    fn test_reorder_columns_by_mean() {
        let mut t = sample();
        t.reorder_columns_by_mean();
        assert_eq!(t.columns(), &[Key::from("b"), Key::from("a")]);
        assert_eq!(t.rows()[0].cells, vec![Some(4.0), Some(1.0)]);
    }

    #[test]
    fn test_json_and_csv_output() {
        let t = sample();
        let records = t.to_json_records();
        assert_eq!(records[1]["entity"], "y");
        assert_eq!(records[1]["period"], 2020);
        assert!(records[1]["b"].is_null());

        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("period,entity,a,b\n"));
        assert!(text.contains("2020,y,3,\n"));
    }
}
