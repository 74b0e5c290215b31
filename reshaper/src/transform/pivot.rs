//! Long-to-wide pivot, its inverse, and unstacking of a single column.
//!
//! ```text
//! entity period value            entity | 2020 | 2021
//! X      2020   5        pivot   -------+------+-----
//! X      2021   7       ──────▶  X      |    5 |    7
//! Y      2020   3                Y      |    3 |    9
//! Y      2021   9
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ReshapeError, ReshapeResult, SchemaError};
use crate::models::{Field, Key, Record, RecordSet, RowKey, WideTable};

/// How cells without a matching record are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Additive domains (stacking): missing means zero.
    Zero,
    /// Classification domains: missing stays absent.
    #[default]
    Absent,
}

/// How several records landing on one cell are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// At most one record per cell, otherwise [`ReshapeError::DuplicateKey`].
    #[default]
    Unique,
    /// Sum every record of the cell.
    Sum,
}

/// Pivot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotSpec {
    /// Fields forming the row key, outermost first
    pub index: Vec<Field>,
    /// Field spread into columns
    pub columns: Field,
    #[serde(default)]
    pub fill: FillMode,
    #[serde(default)]
    pub aggregate: Aggregate,
}

impl PivotSpec {
    pub fn new(index: &[Field], columns: Field) -> Self {
        Self {
            index: index.to_vec(),
            columns,
            fill: FillMode::default(),
            aggregate: Aggregate::default(),
        }
    }

    pub fn fill(mut self, fill: FillMode) -> Self {
        self.fill = fill;
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    fn validate(&self) -> ReshapeResult<()> {
        if self.index.is_empty() {
            return Err(ReshapeError::InvalidSpec("pivot index is empty".into()));
        }
        if self.index.contains(&self.columns) {
            return Err(ReshapeError::InvalidSpec(format!(
                "{} is both an index field and the column field",
                self.columns
            )));
        }
        let distinct: BTreeSet<Field> = self.index.iter().copied().collect();
        if distinct.len() != self.index.len() {
            return Err(ReshapeError::InvalidSpec("pivot index repeats a field".into()));
        }
        Ok(())
    }
}

/// Spread `spec.columns` into columns, one row per distinct index key.
///
/// Rows and columns come out in ascending key order.
pub fn pivot(records: &RecordSet, spec: &PivotSpec) -> ReshapeResult<WideTable> {
    spec.validate()?;

    let mut cells: BTreeMap<RowKey, BTreeMap<Key, f64>> = BTreeMap::new();
    let mut columns: BTreeSet<Key> = BTreeSet::new();

    for record in records {
        let row_key = RowKey(spec.index.iter().map(|f| record.key(*f)).collect());
        let column = record.key(spec.columns);

        let row = cells.entry(row_key.clone()).or_default();
        match (row.get_mut(&column), spec.aggregate) {
            (Some(existing), Aggregate::Sum) => *existing += record.value,
            (Some(_), Aggregate::Unique) => {
                return Err(ReshapeError::DuplicateKey {
                    row: row_key.to_string(),
                    column: column.to_string(),
                });
            }
            (None, _) => {
                row.insert(column.clone(), record.value);
            }
        }
        columns.insert(column);
    }

    let columns: Vec<Key> = columns.into_iter().collect();
    let fill = match spec.fill {
        FillMode::Zero => Some(0.0),
        FillMode::Absent => None,
    };

    let mut table = WideTable::new(spec.index.clone(), columns.clone());
    for (key, values) in cells {
        let row = columns
            .iter()
            .map(|c| values.get(c).copied().or(fill))
            .collect();
        table.push_row(key, row);
    }

    tracing::debug!(rows = table.len(), columns = table.columns().len(), "pivoted");
    Ok(table)
}

/// Inverse of [`pivot`]: one record per present cell.
///
/// `column_field` names the field the columns were spread from. Fields that
/// are neither index nor column field are left empty (`""` or period `0`).
/// Label columns are not melted.
pub fn melt(table: &WideTable, column_field: Field) -> ReshapeResult<RecordSet> {
    if table.index().contains(&column_field) {
        return Err(ReshapeError::InvalidSpec(format!(
            "{} is already an index field",
            column_field
        )));
    }

    let mut records = Vec::new();
    for row in table.rows() {
        for (column, cell) in table.columns().iter().zip(&row.cells) {
            let Some(value) = cell else { continue };

            let mut record = Record::new("", "", 0, *value);
            for (field, key) in table.index().iter().zip(row.key.keys()) {
                assign(&mut record, *field, key)?;
            }
            assign(&mut record, column_field, column)?;
            records.push(record);
        }
    }

    Ok(RecordSet::from_records(records))
}

fn assign(record: &mut Record, field: Field, key: &Key) -> Result<(), SchemaError> {
    match (field, key) {
        (Field::Period, Key::Period(p)) => record.period = *p,
        (Field::Entity, Key::Text(s)) => record.entity = s.clone(),
        (Field::Category, Key::Text(s)) => record.category = s.clone(),
        (field, key) => {
            return Err(SchemaError::KeyMismatch {
                key: key.to_string(),
                field: field.name(),
            })
        }
    }
    Ok(())
}

/// Move index level `level` into columns, keeping only `value`.
///
/// ```text
/// (period, entity) | share            entity | 2011 | 2021
/// (2011, X)        |   10   unstack   X      |   10 |   12
/// (2021, X)        |   12   ──────▶   Y      |    - |    8
/// (2021, Y)        |    8
/// ```
pub fn unstack(table: &WideTable, value: &Key, level: Field) -> ReshapeResult<WideTable> {
    let value_pos = table.require_column(value)?;
    let level_pos = table.level_position(level)?;
    if table.index().len() < 2 {
        return Err(ReshapeError::InvalidSpec(format!(
            "cannot unstack {}: it is the only index level",
            level
        )));
    }

    let mut index: Vec<Field> = table.index().to_vec();
    index.remove(level_pos);

    let mut cells: BTreeMap<RowKey, BTreeMap<Key, Option<f64>>> = BTreeMap::new();
    let mut columns: BTreeSet<Key> = BTreeSet::new();

    for row in table.rows() {
        let mut keys = row.key.keys().to_vec();
        let column = keys.remove(level_pos);
        cells.entry(RowKey(keys)).or_default().insert(column.clone(), row.cells[value_pos]);
        columns.insert(column);
    }

    let columns: Vec<Key> = columns.into_iter().collect();
    let mut out = WideTable::new(index, columns.clone());
    for (key, values) in cells {
        let row = columns.iter().map(|c| values.get(c).copied().flatten()).collect();
        out.push_row(key, row);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn example() -> RecordSet {
        RecordSet::from_records(vec![
            Record::new("X", "v", 2020, 5.0),
            Record::new("X", "v", 2021, 7.0),
            Record::new("Y", "v", 2020, 3.0),
            Record::new("Y", "v", 2021, 9.0),
        ])
    }

    #[test]
    fn test_pivot_on_period() {
        let spec = PivotSpec::new(&[Field::Entity], Field::Period).fill(FillMode::Zero);
        let table = pivot(&example(), &spec).unwrap();

        assert_eq!(table.columns(), &[Key::from(2020), Key::from(2021)]);
        assert_eq!(table.rows()[0].key, RowKey::single("X"));
        assert_eq!(table.rows()[0].cells, vec![Some(5.0), Some(7.0)]);
        assert_eq!(table.rows()[1].cells, vec![Some(3.0), Some(9.0)]);
    }

    #[test]
    fn test_fill_modes() {
        let records = RecordSet::from_records(vec![
            Record::new("X", "a", 2020, 1.0),
            Record::new("Y", "b", 2020, 2.0),
        ]);
        let spec = PivotSpec::new(&[Field::Entity], Field::Category);

        let absent = pivot(&records, &spec).unwrap();
        assert_eq!(absent.rows()[0].cells, vec![Some(1.0), None]);

        let zero = pivot(&records, &spec.fill(FillMode::Zero)).unwrap();
        assert_eq!(zero.rows()[0].cells, vec![Some(1.0), Some(0.0)]);
    }

    #[test]
    fn test_duplicate_key_is_an_error() {
        let records = RecordSet::from_records(vec![
            Record::new("X", "a", 2020, 1.0),
            Record::new("X", "a", 2020, 2.0),
        ]);
        let spec = PivotSpec::new(&[Field::Entity, Field::Period], Field::Category);

        let err = pivot(&records, &spec).unwrap_err();
        assert_eq!(
            err,
            ReshapeError::DuplicateKey { row: "(X, 2020)".into(), column: "a".into() }
        );

        let summed = pivot(&records, &spec.aggregate(Aggregate::Sum)).unwrap();
        assert_eq!(summed.rows()[0].cells, vec![Some(3.0)]);
    }

    #[test]
    fn test_invalid_specs() {
        let records = example();
        assert!(pivot(&records, &PivotSpec::new(&[], Field::Period)).is_err());
        assert!(pivot(&records, &PivotSpec::new(&[Field::Period], Field::Period)).is_err());
        assert!(pivot(&records, &PivotSpec::new(&[Field::Entity, Field::Entity], Field::Period)).is_err());
    }

    #[test]
    fn test_melt_key_mismatch() {
        let spec = PivotSpec::new(&[Field::Entity], Field::Period);
        let table = pivot(&example(), &spec).unwrap();
        // period columns cannot become categories
        let err = melt(&table, Field::Category).unwrap_err();
        assert!(matches!(err, ReshapeError::Schema(SchemaError::KeyMismatch { .. })));
    }

    #[test]
    fn test_unstack() {
        let records = RecordSet::from_records(vec![
            Record::new("X", "share", 2011, 10.0),
            Record::new("X", "share", 2021, 12.0),
            Record::new("Y", "share", 2021, 8.0),
        ]);
        let spec = PivotSpec::new(&[Field::Period, Field::Entity], Field::Category);
        let table = pivot(&records, &spec).unwrap();

        let wide = unstack(&table, &"share".into(), Field::Period).unwrap();
        assert_eq!(wide.index(), &[Field::Entity]);
        assert_eq!(wide.columns(), &[Key::from(2011), Key::from(2021)]);
        assert_eq!(wide.rows()[1].cells, vec![None, Some(8.0)]);
    }

    fn arb_records() -> impl Strategy<Value = Vec<Record>> {
        prop::collection::btree_map(
            (0usize..4, 0usize..3, 2011i32..2016),
            -1.0e6f64..1.0e6,
            0..40,
        )
        .prop_map(|cells| {
            cells
                .into_iter()
                .map(|((e, c, p), v)| Record::new(format!("region{e}"), format!("tax{c}"), p, v))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_pivot_melt_round_trip(records in arb_records(), zero in any::<bool>()) {
            let fill = if zero { FillMode::Zero } else { FillMode::Absent };
            let spec = PivotSpec::new(&[Field::Entity, Field::Category], Field::Period).fill(fill);

            let table = pivot(&RecordSet::from_records(records), &spec).unwrap();
            let melted = melt(&table, Field::Period).unwrap();
            let again = pivot(&melted, &spec).unwrap();

            prop_assert_eq!(table, again);
        }
    }
}
