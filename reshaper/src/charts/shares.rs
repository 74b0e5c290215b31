//! Federal taxes as a share of each region's own revenue, first vs last period.

use crate::config::Settings;
use crate::error::ReshapeResult;
use crate::models::{Field, Key, RecordSet};
use crate::transform::{annotate_signs, derive, unstack, Derivation, FillMode, Filter};

use super::{ratio_column, select, wide, ChartData, ChartKind};

const SHARE: &str = "fedtax_share";

/// `shares` table: region × {first, last} share in %, `diff`, and a `sign`
/// label for rising and falling shares. Rows are sorted by the last-period
/// share, ascending. Regions with a negative federal tax in either period,
/// or without both periods, are left out.
pub fn tax_share(records: &RecordSet, settings: &Settings) -> ReshapeResult<ChartData> {
    let (first, last) = (settings.first_period, settings.last_period);
    let filter = Filter::all(vec![
        Filter::code("i1").eq(1),
        Filter::code("r1").is_in(&[1, 3]),
        Filter::code("r3").eq(0),
        Filter::periods(&[first, last]),
    ]);
    let revenue = select(records, &filter, "regional revenue");

    let mut table = wide(&revenue, &[Field::Period, Field::Entity], FillMode::Absent)?;
    ratio_column(&mut table, SHARE, "tax_to_fed", "reg_own_revenue", 100.0, 1)?;

    let tax_pos = table.require_column(&Key::from("tax_to_fed"))?;
    table.retain_rows(|r| r.cells[tax_pos].is_some_and(|v| v >= 0.0));

    let mut shares = unstack(&table, &Key::from(SHARE), Field::Period)?;
    for period in [first, last] {
        if shares.column_position(&Key::from(period)).is_none() {
            shares.set_column(period, vec![None; shares.len()]);
        }
    }
    let mut shares = shares.select(&[Key::from(first), Key::from(last)])?;
    shares.drop_incomplete();
    shares.sort_by_column(&Key::from(last), false)?;

    derive(&mut shares, "diff", &Derivation::difference(last, first))?;
    annotate_signs(&mut shares, &Key::from("diff"), "sign")?;

    Ok(ChartData::new(ChartKind::TaxShare).with_table("shares", shares))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, RowKey};

    fn revenue(region: &str, name: &str, period: i32, value: f64) -> Record {
        let r1 = if name == "tax_to_fed" { 3 } else { 1 };
        Record::new(region, name, period, value)
            .with_code("i1", 1)
            .with_code("r1", r1)
            .with_code("r3", 0)
    }

    fn records() -> RecordSet {
        RecordSet::from_records(vec![
            revenue("tver", "tax_to_fed", 2011, 20.0),
            revenue("tver", "reg_own_revenue", 2011, 100.0),
            revenue("tver", "tax_to_fed", 2021, 10.0),
            revenue("tver", "reg_own_revenue", 2021, 100.0),
            revenue("omsk", "tax_to_fed", 2011, 10.0),
            revenue("omsk", "reg_own_revenue", 2011, 100.0),
            revenue("omsk", "tax_to_fed", 2021, 60.0),
            revenue("omsk", "reg_own_revenue", 2021, 200.0),
            // negative in 2021: dropped
            revenue("kursk", "tax_to_fed", 2011, 10.0),
            revenue("kursk", "reg_own_revenue", 2011, 100.0),
            revenue("kursk", "tax_to_fed", 2021, -1.0),
            revenue("kursk", "reg_own_revenue", 2021, 100.0),
            // only one period: dropped
            revenue("tula", "tax_to_fed", 2021, 1.0),
            revenue("tula", "reg_own_revenue", 2021, 3.0),
            // another period and another section: filtered out
            revenue("tver", "tax_to_fed", 2015, 1.0),
            revenue("tver", "transfers", 2021, 1.0).with_code("r3", 2),
        ])
    }

    #[test]
    fn test_tax_share() {
        let data = tax_share(&records(), &Settings::default()).unwrap();
        let shares = data.table("shares").unwrap();

        let regions: Vec<String> = shares.rows().iter().map(|r| r.key.to_string()).collect();
        assert_eq!(regions, vec!["(tver)", "(omsk)"]);

        assert_eq!(shares.columns(), &[Key::from(2011), Key::from(2021), Key::from("diff")]);
        assert_eq!(shares.value(&RowKey::single("omsk"), &Key::from(2021)), Some(30.0));
        assert_eq!(shares.value(&RowKey::single("tver"), &"diff".into()), Some(-10.0));
        assert_eq!(shares.label(0, "sign"), Some("non_positive"));
        assert_eq!(shares.label(1, "sign"), Some("positive"));
    }
}
