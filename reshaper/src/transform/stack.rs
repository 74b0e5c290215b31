//! Grouped cumulative sums for stacked visuals.
//!
//! The stacking order is always supplied by the caller; it is never inferred
//! from the data. Absent cells count as zero.

use std::collections::HashSet;

use crate::error::{ReshapeError, ReshapeResult};
use crate::models::{Field, Key, RecordSet, WideTable};
use crate::transform::pivot::{pivot, FillMode, PivotSpec};

fn check_order(order: &[Key]) -> ReshapeResult<()> {
    if order.is_empty() {
        return Err(ReshapeError::InvalidOrdering("stacking order is empty".into()));
    }
    let mut seen = HashSet::new();
    for key in order {
        if !seen.insert(key) {
            return Err(ReshapeError::InvalidOrdering(format!("'{}' is listed twice", key)));
        }
    }
    Ok(())
}

/// Running sums across the `order` columns of each row.
///
/// The output has the same rows and exactly the `order` columns; cell `i`
/// holds the sum of the row's cells `order[0..=i]`. Columns outside `order`
/// are not part of the stack.
pub fn cumulative_sum(table: &WideTable, order: &[Key]) -> ReshapeResult<WideTable> {
    check_order(order)?;
    let positions = order
        .iter()
        .map(|k| table.require_column(k))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = WideTable::new(table.index().to_vec(), order.to_vec());
    for row in table.rows() {
        let mut running = 0.0;
        let cells = positions
            .iter()
            .map(|&p| {
                running += row.cells[p].unwrap_or(0.0);
                Some(running)
            })
            .collect();
        out.push_row(row.key.clone(), cells);
    }
    Ok(out)
}

/// Cumulative sums of long-format records, grouped by `group` and stacked
/// along `along` in `order`.
///
/// Every `along` key present in the data must be listed in `order`, so the
/// last cumulative value of each group is the group total.
pub fn cumulative_by_group(
    records: &RecordSet,
    group: &[Field],
    along: Field,
    order: &[Key],
) -> ReshapeResult<WideTable> {
    check_order(order)?;

    let listed: HashSet<&Key> = order.iter().collect();
    if let Some(stray) = records.iter().map(|r| r.key(along)).find(|k| !listed.contains(k)) {
        return Err(ReshapeError::InvalidOrdering(format!(
            "'{}' is missing from the stacking order",
            stray
        )));
    }

    let spec = PivotSpec::new(group, along).fill(FillMode::Zero);
    let mut table = pivot(records, &spec)?;

    // keys listed in the order but absent from the data stack as zero
    for key in order {
        if table.column_position(key).is_none() {
            let zeros = vec![Some(0.0); table.len()];
            table.set_column(key.clone(), zeros);
        }
    }

    cumulative_sum(&table, order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, RowKey};
    use proptest::prelude::*;

    #[test]
    fn test_cumulative_by_entity_over_periods() {
        let records = RecordSet::from_records(vec![
            Record::new("X", "v", 2020, 5.0),
            Record::new("X", "v", 2021, 7.0),
            Record::new("Y", "v", 2020, 3.0),
            Record::new("Y", "v", 2021, 9.0),
        ]);
        let table =
            cumulative_by_group(&records, &[Field::Entity], Field::Period, &[2020.into(), 2021.into()])
                .unwrap();

        assert_eq!(table.rows()[0].key, RowKey::single("X"));
        assert_eq!(table.rows()[0].cells, vec![Some(5.0), Some(12.0)]);
        assert_eq!(table.rows()[1].cells, vec![Some(3.0), Some(12.0)]);
    }

    #[test]
    fn test_order_is_respected_not_sorted() {
        let records = RecordSet::from_records(vec![
            Record::new("X", "vat", 2021, 1.0),
            Record::new("X", "oil", 2021, 10.0),
            Record::new("X", "gas", 2021, 100.0),
        ]);
        let order: Vec<Key> = vec!["vat".into(), "oil".into(), "gas".into()];
        let table =
            cumulative_by_group(&records, &[Field::Period, Field::Entity], Field::Category, &order).unwrap();

        assert_eq!(table.columns(), order.as_slice());
        assert_eq!(table.rows()[0].cells, vec![Some(1.0), Some(11.0), Some(111.0)]);
    }

    #[test]
    fn test_unlisted_category_is_rejected() {
        let records = RecordSet::from_records(vec![
            Record::new("X", "vat", 2021, 1.0),
            Record::new("X", "mining", 2021, 2.0),
        ]);
        let err = cumulative_by_group(&records, &[Field::Entity], Field::Category, &["vat".into()])
            .unwrap_err();
        assert!(matches!(err, ReshapeError::InvalidOrdering(_)));
    }

    #[test]
    fn test_listed_but_missing_key_stacks_as_zero() {
        let records = RecordSet::from_records(vec![Record::new("X", "vat", 2021, 4.0)]);
        let table = cumulative_by_group(
            &records,
            &[Field::Entity],
            Field::Category,
            &["gas".into(), "vat".into()],
        )
        .unwrap();
        assert_eq!(table.rows()[0].cells, vec![Some(0.0), Some(4.0)]);
    }

    #[test]
    fn test_bad_orders() {
        let table = WideTable::new(vec![Field::Entity], vec![Key::from("a")]);
        assert!(matches!(cumulative_sum(&table, &[]), Err(ReshapeError::InvalidOrdering(_))));
        assert!(matches!(
            cumulative_sum(&table, &["a".into(), "a".into()]),
            Err(ReshapeError::InvalidOrdering(_))
        ));
        assert!(matches!(cumulative_sum(&table, &["b".into()]), Err(ReshapeError::Schema(_))));
    }

    proptest! {
        #[test]
        fn prop_non_negative_stack_is_monotone_and_ends_at_total(
            values in prop::collection::vec(0.0f64..1.0e9, 1..8)
        ) {
            let order: Vec<Key> = (0..values.len()).map(|i| Key::from(format!("c{i}"))).collect();
            let records = RecordSet::from_records(
                values.iter().enumerate()
                    .map(|(i, v)| Record::new("X", format!("c{i}"), 2021, *v))
                    .collect(),
            );

            let table = cumulative_by_group(&records, &[Field::Entity], Field::Category, &order).unwrap();
            let sums: Vec<f64> = table.rows()[0].cells.iter().map(|c| c.unwrap()).collect();

            prop_assert!(sums.windows(2).all(|w| w[0] <= w[1]));
            let total: f64 = values.iter().sum();
            let last = *sums.last().unwrap();
            prop_assert!((last - total).abs() <= 1e-6 * total.max(1.0));
        }
    }
}
