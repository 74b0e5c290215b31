//! Area-chart grid of the regions that pay the most key taxes.
//!
//! Regions are ranked by their share of the growth in key-tax payments
//! between the first and last period. The configured exclusions are removed
//! and the top regions kept. For those regions the job emits the yearly tax
//! amounts (`areas`), their running sums in stacking order (`edges`) and the
//! grid order by last-period total (`order`).

use crate::config::Settings;
use crate::error::ReshapeResult;
use crate::logs::log_info_indent;
use crate::models::{Field, Key, RecordSet, WideTable};
use crate::transform::{
    cumulative_sum, derive, pivot, rank_rows, Derivation, FillMode, Filter, PivotSpec, RankOptions,
};

use super::{select, wide, ChartData, ChartKind, RUB_BN};

/// Source tax names and the short names used on the grid.
const TAX_SHORT_NAMES: [(&str, &str); 7] = [
    ("vat on sales", "vat"),
    ("minerals extraction tax", "mining"),
    ("corporate income tax full", "corporate"),
    ("additional income from hydrocarbon extraction tax", "hydrocarbon"),
    ("oil extraction tax", "oil"),
    ("gas extraction tax", "gas"),
    ("gas condensate extraction tax", "gas_condensate"),
];

/// One regional key-tax item; `main_only` keeps just the aggregate row (`r5=0`).
fn tax_item(r3: i64, r4: i64, main_only: bool) -> Filter {
    let mut parts = vec![
        Filter::code("i1").eq(1),
        Filter::code("r1").eq(3),
        Filter::code("r3").eq(r3),
        Filter::code("r4").eq(r4),
    ];
    if main_only {
        parts.push(Filter::code("r5").eq(0));
    }
    Filter::all(parts)
}

/// Regional payments of VAT, corporate income tax and extraction taxes, with
/// the extraction tax as one aggregate row.
fn ranking_taxes() -> Filter {
    Filter::any(vec![
        tax_item(3, 1, false),
        tax_item(7, 5, true),
        tax_item(1, 1, true),
        tax_item(7, 1, true),
    ])
}

/// Same taxes for the grid, with the extraction tax split into its oil, gas
/// and gas condensate sub-items. The aggregate row stays out of the stack.
fn area_taxes() -> Filter {
    Filter::any(vec![
        tax_item(3, 1, false),
        tax_item(7, 5, true),
        tax_item(1, 1, true),
        tax_item(7, 1, false),
    ])
}

/// Key-tax growth per region: `ranking` table with `difference` and `share` (%).
fn growth_ranking(records: &RecordSet, settings: &Settings) -> ReshapeResult<WideTable> {
    let (first, last) = (settings.first_period, settings.last_period);
    let filter = ranking_taxes().and(Filter::periods(&[first, last]));
    let taxes = select(records, &filter, "key tax");

    let spec = PivotSpec::new(&[Field::Entity, Field::Category], Field::Period);
    let mut by_tax = pivot(&taxes, &spec)?;
    for period in [first, last] {
        if by_tax.column_position(&Key::from(period)).is_none() {
            by_tax.set_column(period, vec![None; by_tax.len()]);
        }
    }
    derive(&mut by_tax, "difference", &Derivation::difference(last, first))?;

    let mut totals = by_tax
        .select(&[Key::from("difference")])?
        .group_sum(&[Field::Entity])?;
    derive(
        &mut totals,
        "share",
        &Derivation::ShareOfTotal { column: "difference".into(), scale: 100.0 },
    )?;
    derive(&mut totals, "share", &Derivation::scale("share", 1.0, Some(1)))?;

    let options = RankOptions::top(settings.donor.limit).excluding(&settings.donor.exclude);
    rank_rows(&totals, &"share".into(), Field::Entity, &options)
}

pub fn donor_areas(records: &RecordSet, settings: &Settings) -> ReshapeResult<ChartData> {
    let ranking = growth_ranking(records, settings)?;
    let regions: Vec<String> = ranking.rows().iter().map(|r| r.level(0).to_string()).collect();
    log_info_indent(format!("{} regions selected", regions.len()), 1);

    let filter = area_taxes().and(Filter::entities(&regions));
    let taxes = select(records, &filter, "selected region tax");

    let mut table = wide(&taxes, &[Field::Period, Field::Entity], FillMode::Zero)?;

    // short-named copies in RUB bn; taxes a region never paid are zero
    for (source, short) in TAX_SHORT_NAMES {
        let source = Key::from(source);
        if table.column_position(&source).is_none() {
            table.set_column(source.clone(), vec![Some(0.0); table.len()]);
        }
        derive(&mut table, short, &Derivation::scale(source, RUB_BN, Some(1)))?;
    }

    let order: Vec<Key> = settings.donor.stacking_order.iter().map(|t| Key::from(t.as_str())).collect();
    // refunds make a tax negative; the areas start at zero
    for layer in &order {
        derive(&mut table, layer, &Derivation::ClipLower { column: layer.clone(), min: 0.0 })?;
    }
    let areas = table.select(&order)?;

    let grid = grid_order(&areas, settings.last_period)?;
    let grid_keys: Vec<Key> = grid.rows().iter().map(|r| r.level(0).clone()).collect();

    let areas = areas.reindex_level(Field::Entity, &grid_keys)?;
    let edges = cumulative_sum(&areas, &order)?;

    Ok(ChartData::new(ChartKind::DonorAreas)
        .with_table("areas", areas)
        .with_table("edges", edges)
        .with_table("order", grid)
        .with_table("ranking", ranking))
}

/// Regions by their whole-number last-period total, largest first.
fn grid_order(areas: &WideTable, last_period: i32) -> ReshapeResult<WideTable> {
    let mut last = areas.cross_section(Field::Period, &Key::from(last_period))?;
    let layers = last.columns().to_vec();
    derive(&mut last, "total", &Derivation::Sum { columns: layers })?;
    derive(&mut last, "total", &Derivation::Truncate { column: "total".into() })?;

    let mut order = last.select(&[Key::from("total")])?;
    order.sort_by_column(&"total".into(), true)?;
    Ok(order)
}
