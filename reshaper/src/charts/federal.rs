//! Federal-level series: taxes by type, revenue totals, spending by function.

use crate::config::Settings;
use crate::error::{ReshapeError, ReshapeResult};
use crate::models::{Field, Key, RecordSet};
use crate::transform::{derive, Derivation, FillMode, Filter};

use super::{rescale, select, wide, ChartData, ChartKind, RUB_TN};

/// Display names of long tax names.
const TAX_DISPLAY_NAMES: [(&str, &str); 3] = [
    ("additional income from hydrocarbon extraction tax", "hydrocarbon extraction tax"),
    ("corporate income tax full", "corporate income tax"),
    ("vat on sales", "VAT on sales"),
];

const OTHER_TAXES: &str = "other taxes";

/// Federal tax revenue per period, one column per tax.
///
/// Columns are ordered by their mean, largest first. The first four and the
/// sixth are kept; the fifth and everything from the seventh on are summed
/// into `other taxes`.
pub fn federal_taxes(records: &RecordSet, _settings: &Settings) -> ReshapeResult<ChartData> {
    let filter = Filter::all(vec![
        Filter::code("i1").eq(2),
        Filter::code("r1").eq(3),
        Filter::code("r3").ne(0),
        Filter::code("r5").eq(0),
    ]);
    let taxes = select(records, &filter, "federal tax");

    let mut table = wide(&taxes, &[Field::Period], FillMode::Absent)?;
    rescale(&mut table, None, RUB_TN, 1)?;
    table.reorder_columns_by_mean();

    let columns = table.columns().to_vec();
    if columns.len() < 6 {
        return Err(ReshapeError::InvalidSpec(format!(
            "federal taxes need at least 6 tax types, found {}",
            columns.len()
        )));
    }

    let mut other: Vec<Key> = vec![columns[4].clone()];
    other.extend(columns[6..].iter().cloned());
    derive(&mut table, OTHER_TAXES, &Derivation::Sum { columns: other })?;

    let mut kept: Vec<Key> = columns[..4].to_vec();
    kept.push(columns[5].clone());
    kept.push(Key::from(OTHER_TAXES));
    let mut table = table.select(&kept)?;

    let renames: Vec<(Key, Key)> = TAX_DISPLAY_NAMES
        .iter()
        .map(|(from, to)| (Key::from(*from), Key::from(*to)))
        .collect();
    table.rename(&renames);

    Ok(ChartData::new(ChartKind::FederalTaxes).with_table("taxes", table))
}

/// Federal tax and non-tax revenue totals with their key parts, per period.
pub fn federal_revenue(records: &RecordSet, _settings: &Settings) -> ReshapeResult<ChartData> {
    let federal = || Filter::code("i1").eq(2);
    let filter = Filter::any(vec![
        Filter::all(vec![
            federal(),
            Filter::code("i2").eq(2),
            Filter::code("i3").eq(1),
            Filter::code("r3").eq(0),
        ]),
        Filter::all(vec![
            federal(),
            Filter::code("i2").eq(1),
            Filter::code("r1").eq(3),
            Filter::code("r2").eq(0),
        ]),
        Filter::all(vec![
            federal(),
            Filter::code("i2").eq(2),
            Filter::code("i3").eq(2),
            Filter::code("s1").eq(0),
        ]),
        Filter::all(vec![
            federal(),
            Filter::code("i2").eq(2),
            Filter::code("r3").eq(10),
            Filter::code("r4").eq(0),
        ]),
    ]);
    let revenue = select(records, &filter, "federal revenue");

    let mut table = wide(&revenue, &[Field::Period], FillMode::Absent)?;
    rescale(&mut table, None, RUB_TN, 1)?;

    Ok(ChartData::new(ChartKind::FederalRevenue).with_table("revenue", table))
}

/// Federal spending per period, one column per budget function.
pub fn spending_lines(records: &RecordSet, _settings: &Settings) -> ReshapeResult<ChartData> {
    let filter = Filter::all(vec![
        Filter::code("i1").eq(2),
        Filter::code("i2").eq(2),
        Filter::code("i3").eq(2),
        Filter::code("s1").gt(0),
        Filter::code("s1").lt(13),
        Filter::code("s2").eq(0),
    ]);
    let spending = select(records, &filter, "federal spending");

    let mut table = wide(&spending, &[Field::Period], FillMode::Absent)?;
    rescale(&mut table, None, RUB_TN, 1)?;

    Ok(ChartData::new(ChartKind::SpendingLines).with_table("spending", table))
}
