//! Money flows between the regions and the federal center.

use crate::config::{PeriodWindow, Settings};
use crate::error::ReshapeResult;
use crate::models::{ascending, Field, Key, RecordSet, WideTable};
use crate::transform::{
    annotate_flow_buckets, annotate_signs, cumulative_sum, derive, derive_all, unstack, Derivation,
    FillMode, Filter, QuantileClassifier, Term,
};

use super::{keys, ratio_column, rescale, select, wide, ChartData, ChartKind, RUB_BN};

/// Own revenue, federal taxes and federal transfers of each region.
fn budget_flows() -> Filter {
    Filter::all(vec![
        Filter::code("i1").eq(1),
        Filter::code("r1").ne(0),
        Filter::code("r3").eq(0),
    ])
}

fn regional(i3: &[i64]) -> Filter {
    Filter::all(vec![Filter::code("i1").eq(1), Filter::code("i3").is_in(i3)])
}

// =============================================================================
// Regional flows
// =============================================================================

/// Deficit and net federal flow as shares of own revenue, with per-period
/// income classes.
///
/// Tables: `flows` (period × region, sorted by period then income class),
/// `quantiles` (income thresholds per period) and `outliers` (last-period
/// regions whose flow reaches ±100% of own revenue).
pub fn regional_flows(records: &RecordSet, settings: &Settings) -> ReshapeResult<ChartData> {
    let filter = Filter::any(vec![
        budget_flows(),
        regional(&[5, 7]),
        Filter::all(vec![
            Filter::code("i1").eq(1),
            Filter::code("i3").eq(2),
            Filter::code("s1").eq(0),
        ]),
    ]);
    let flows = select(records, &filter, "regional budget");
    let mut table = wide(&flows, &[Field::Period, Field::Entity], FillMode::Zero)?;

    derive_all(
        &mut table,
        &[
            (
                Key::from("deficit"),
                Derivation::Linear {
                    terms: vec![
                        Term::new("reg_own_revenue", 1.0),
                        Term::new("transfers_to_reg", 1.0),
                        Term::new("reg_spending", -1.0),
                    ],
                },
            ),
            (
                Key::from("flow_to_fed"),
                Derivation::difference("transfers_to_reg", "tax_to_fed"),
            ),
        ],
    )?;

    let money = keys(&["reg_own_revenue", "tax_to_fed", "transfers_to_reg", "deficit", "flow_to_fed"]);
    rescale(&mut table, Some(money.as_slice()), RUB_BN, 1)?;

    ratio_column(&mut table, "deficit_rev_share", "deficit", "reg_own_revenue", 100.0, 1)?;
    ratio_column(&mut table, "flow_to_fed_rev_share", "flow_to_fed", "reg_own_revenue", 100.0, 1)?;
    derive(
        &mut table,
        "income_tw_mean",
        &Derivation::RatioToGroupMean { column: "income_per_cap".into(), group: Field::Period },
    )?;

    let classifier = QuantileClassifier::new(&settings.quantiles, settings.sentinel, settings.empty_group);
    let classes = classifier.annotate(
        &mut table,
        &Key::from("income_per_cap"),
        Field::Period,
        "region_inc",
        "inc_order",
    )?;
    let quantiles = classifier.thresholds_table(&classes);

    let mut table = table.select(&keys(&[
        "deficit_rev_share",
        "flow_to_fed_rev_share",
        "population",
        "income_tw_mean",
        "inc_order",
    ]))?;

    let period = table.level_position(Field::Period)?;
    let order = table.require_column(&Key::from("inc_order"))?;
    table.sort_rows_by(|a, b| {
        a.level(period)
            .cmp(b.level(period))
            .then_with(|| ascending(a.cells[order], b.cells[order]))
    });

    let outliers = flow_outliers(&table, settings.last_period)?;

    Ok(ChartData::new(ChartKind::RegionalFlows)
        .with_table("flows", table)
        .with_table("quantiles", quantiles)
        .with_table("outliers", outliers))
}

/// Last-period regions that sent or received at least their own revenue.
fn flow_outliers(flows: &WideTable, last_period: i32) -> ReshapeResult<WideTable> {
    let last = flows.cross_section(Field::Period, &Key::from(last_period))?;
    let mut outliers = last.select(&keys(&["flow_to_fed_rev_share", "deficit_rev_share"]))?;
    outliers.retain_rows(|r| r.cells[0].is_some_and(|v| v.abs() >= 100.0));
    Ok(outliers)
}

// =============================================================================
// Spending by donor/dependent class
// =============================================================================

/// Per-capita spending in USD per region and function, labeled with the
/// region's last-period donor/dependent class.
///
/// Tables: `spending` (period × region, one column per function, plus the
/// `region_class` label) and `classes` (region → class).
pub fn spending_boxplot(records: &RecordSet, settings: &Settings) -> ReshapeResult<ChartData> {
    let classes = flow_classes(records, settings.last_period)?;

    let spending_filter = Filter::any(vec![
        Filter::all(vec![
            Filter::code("i1").eq(1),
            Filter::code("i3").eq(2),
            Filter::code("s1").is_in(&[5, 7, 9, 10]),
            Filter::code("s2").eq(0),
        ]),
        Filter::all(vec![
            Filter::code("i1").eq(1),
            Filter::code("i3").eq(2),
            Filter::code("s1").eq(4),
            Filter::code("s2").is_in(&[8, 9]),
        ]),
    ]);
    let spending = select(records, &spending_filter, "regional spending");
    let spending = wide(&spending, &[Field::Period, Field::Entity], FillMode::Zero)?;
    let functions = spending.columns().to_vec();

    let context = select(records, &Filter::code("i3").is_in(&[5, 9]), "population and exchange rate");
    let context = wide(&context, &[Field::Period, Field::Entity], FillMode::Zero)?;
    let mut table = spending.join(&context, &keys(&["population", "rub_usd"]), &[])?;

    // RUB -> USD -> USD per capita, rounding after each step
    for function in &functions {
        let name = function.to_string();
        ratio_column(&mut table, &name, &name, "rub_usd", 1.0, 1)?;
        ratio_column(&mut table, &name, &name, "population", 1.0, 1)?;
    }

    let table = table
        .select(&functions)?
        .join(&classes, &[], &["region_class"])?;

    Ok(ChartData::new(ChartKind::SpendingBoxplot)
        .with_table("spending", table)
        .with_table("classes", classes))
}

/// Donor/dependent class of each region in `period`, indexed by region.
fn flow_classes(records: &RecordSet, period: i32) -> ReshapeResult<WideTable> {
    let flows = select(records, &budget_flows(), "regional flow");
    let mut table = wide(&flows, &[Field::Period, Field::Entity], FillMode::Zero)?;
    derive(&mut table, "flow_to_fed", &Derivation::difference("transfers_to_reg", "tax_to_fed"))?;

    let snapshot = table.cross_section(Field::Period, &Key::from(period))?;
    let mut classes = snapshot.select(&keys(&["flow_to_fed", "reg_own_revenue"]))?;
    annotate_flow_buckets(
        &mut classes,
        &Key::from("flow_to_fed"),
        &Key::from("reg_own_revenue"),
        "region_class",
    )?;
    Ok(classes)
}

// =============================================================================
// Cumulative flows
// =============================================================================

const FLOW_USD: &str = "flow_to_fed_usdbn";
const FLOW_USD_PREV: &str = "flow_to_fed_usdbn_prev";

/// Net flow to the federal center in USD bn, summed over the current and the
/// previous period window.
///
/// Regions whose current total is within the configured magnitude of zero are
/// dropped; the rest are sorted ascending with the previous total joined on.
pub fn cumulative_flows(records: &RecordSet, settings: &Settings) -> ReshapeResult<ChartData> {
    let filter = Filter::any(vec![
        Filter::all(vec![
            Filter::code("i1").eq(1),
            Filter::code("r1").gt(1),
            Filter::code("r3").eq(0),
        ]),
        regional(&[9]),
    ]);
    let flows = select(records, &filter, "federal flow");
    let mut table = wide(&flows, &[Field::Period, Field::Entity], FillMode::Zero)?;

    derive_all(
        &mut table,
        &[
            (Key::from(FLOW_USD), Derivation::difference("tax_to_fed", "transfers_to_reg")),
            (Key::from(FLOW_USD), Derivation::ratio(FLOW_USD, "rub_usd", 1.0)),
            (Key::from(FLOW_USD), Derivation::scale(FLOW_USD, RUB_BN, Some(1))),
        ],
    )?;
    let by_period = unstack(&table, &Key::from(FLOW_USD), Field::Period)?;

    let options = &settings.cumulative;
    let mut current = window_total(&by_period, options.current, FLOW_USD)?;
    let previous = window_total(&by_period, options.previous, FLOW_USD_PREV)?;

    let min = options.min_magnitude;
    current.retain_rows(|r| r.cells[0].is_some_and(|v| v.abs() > min));
    current.sort_by_column(&Key::from(FLOW_USD), false)?;

    let mut current = current.join(&previous, &keys(&[FLOW_USD_PREV]), &[])?;
    annotate_signs(&mut current, &Key::from(FLOW_USD), "sign")?;
    annotate_signs(&mut current, &Key::from(FLOW_USD_PREV), "sign_prev")?;

    Ok(ChartData::new(ChartKind::CumulativeFlows).with_table("flows", current))
}

/// Whole-number total of each region over `window`, as column `name`.
///
/// Periods missing from the data count as zero.
fn window_total(by_period: &WideTable, window: PeriodWindow, name: &str) -> ReshapeResult<WideTable> {
    let periods: Vec<Key> = window.periods().map(Key::from).collect();

    let mut span = by_period.clone();
    for period in &periods {
        if span.column_position(period).is_none() {
            span.set_column(period, vec![None; span.len()]);
        }
    }

    let running = cumulative_sum(&span, &periods)?;
    let mut total = running.select(&periods[periods.len() - 1..])?;
    total.rename(&[(periods[periods.len() - 1].clone(), Key::from(name))]);
    derive(&mut total, name, &Derivation::Truncate { column: name.into() })?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CumulativeOptions;
    use crate::models::{Record, RowKey};

    fn budget(region: &str, name: &str, period: i32, value: f64) -> Record {
        let r1 = match name {
            "tax_to_fed" => 3,
            "transfers_to_reg" => 2,
            _ => 1,
        };
        Record::new(region, name, period, value)
            .with_code("i1", 1)
            .with_code("r1", r1)
            .with_code("r3", 0)
    }

    fn indicator(region: &str, name: &str, i3: i64, period: i32, value: f64) -> Record {
        Record::new(region, name, period, value)
            .with_code("i1", 1)
            .with_code("i3", i3)
    }

    #[test]
    fn test_flow_classes() {
        let records = RecordSet::from_records(vec![
            budget("tver", "reg_own_revenue", 2021, 100.0),
            budget("tver", "tax_to_fed", 2021, 250.0),
            budget("tver", "transfers_to_reg", 2021, 50.0),
            budget("omsk", "reg_own_revenue", 2021, 100.0),
            budget("omsk", "tax_to_fed", 2021, 10.0),
            budget("omsk", "transfers_to_reg", 2021, 60.0),
        ]);
        let classes = flow_classes(&records, 2021).unwrap();

        assert_eq!(classes.index(), &[Field::Entity]);
        assert_eq!(classes.label(0, "region_class"), Some("dependent_up_to_100"));
        assert_eq!(classes.label(1, "region_class"), Some("donor_100_and_more"));
    }

    #[test]
    fn test_spending_per_capita_usd() {
        let spend = |region: &str, name: &str, s1: i64, value: f64| {
            indicator(region, name, 2, 2021, value).with_code("s1", s1).with_code("s2", 0)
        };
        let records = RecordSet::from_records(vec![
            budget("tver", "reg_own_revenue", 2021, 100.0),
            budget("tver", "tax_to_fed", 2021, 10.0),
            budget("tver", "transfers_to_reg", 2021, 0.0),
            spend("tver", "healthcare", 9, 7300.0),
            spend("tver", "education", 7, 1460.0),
            spend("tver", "defense", 2, 1000.0),
            indicator("tver", "population", 5, 2021, 2.0),
            indicator("tver", "rub_usd", 9, 2021, 73.0),
        ]);

        let data = spending_boxplot(&records, &Settings::default()).unwrap();
        let spending = data.table("spending").unwrap();
        let key = RowKey(vec![2021.into(), "tver".into()]);

        assert_eq!(spending.columns(), &[Key::from("education"), Key::from("healthcare")]);
        assert_eq!(spending.value(&key, &"healthcare".into()), Some(50.0));
        assert_eq!(spending.value(&key, &"education".into()), Some(10.0));
        assert_eq!(spending.label(0, "region_class"), Some("donor_up_to_100"));
    }

    #[test]
    fn test_regional_flows() {
        let mut rows = Vec::new();
        for (region, income) in [("a", 10.0), ("b", 20.0), ("c", 30.0), ("d", 0.0), ("e", 40.0)] {
            rows.push(budget(region, "reg_own_revenue", 2021, 100.0e9));
            rows.push(budget(region, "tax_to_fed", 2021, 20.0e9));
            rows.push(budget(region, "transfers_to_reg", 2021, if region == "e" { 150.0e9 } else { 40.0e9 }));
            rows.push(indicator(region, "reg_spending", 2, 2021, 110.0e9).with_code("s1", 0));
            rows.push(indicator(region, "income_per_cap", 7, 2021, income));
            rows.push(indicator(region, "population", 5, 2021, 1000.0));
        }
        let data = regional_flows(&RecordSet::from_records(rows), &Settings::default()).unwrap();

        let flows = data.table("flows").unwrap();
        let key = RowKey(vec![2021.into(), "a".into()]);
        assert_eq!(flows.value(&key, &"deficit_rev_share".into()), Some(30.0));
        assert_eq!(flows.value(&key, &"flow_to_fed_rev_share".into()), Some(20.0));
        assert_eq!(flows.value(&key, &"income_tw_mean".into()), Some(0.5));

        // sorted by income class, no-data last
        let order: Vec<String> = flows.rows().iter().map(|r| r.level(1).to_string()).collect();
        assert_eq!(order, vec!["e", "c", "a", "b", "d"]);
        assert_eq!(flows.label(4, "region_inc"), Some("nodata"));

        assert_eq!(data.table("quantiles").unwrap().len(), 1);

        let outliers = data.table("outliers").unwrap();
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers.rows()[0].key, RowKey::single("e"));
    }

    #[test]
    fn test_window_total() {
        let mut by_period = WideTable::new(vec![Field::Entity], vec![Key::from(2017), Key::from(2018)]);
        by_period.push_row(RowKey::single("x"), vec![Some(1.6), Some(2.7)]);
        by_period.push_row(RowKey::single("y"), vec![Some(-3.9), None]);

        let total = window_total(&by_period, PeriodWindow::new(2017, 2019), "total").unwrap();
        assert_eq!(total.columns(), &[Key::from("total")]);
        assert_eq!(total.rows()[0].cells, vec![Some(4.0)]);
        assert_eq!(total.rows()[1].cells, vec![Some(-3.0)]);
    }

    #[test]
    fn test_cumulative_flows() {
        let mut rows = Vec::new();
        for period in 2012..=2021 {
            rows.push(budget("donor", "tax_to_fed", period, 2.0e9));
            rows.push(budget("donor", "transfers_to_reg", period, 0.0));
            rows.push(budget("small", "tax_to_fed", period, 0.1e9));
            rows.push(budget("small", "transfers_to_reg", period, 0.0));
            rows.push(budget("taker", "tax_to_fed", period, 0.0));
            rows.push(budget("taker", "transfers_to_reg", period, 3.0e9));
            for region in ["donor", "small", "taker"] {
                rows.push(indicator(region, "rub_usd", 9, period, 1.0));
            }
        }
        let settings = Settings { cumulative: CumulativeOptions::default(), ..Settings::default() };
        let data = cumulative_flows(&RecordSet::from_records(rows), &settings).unwrap();
        let flows = data.table("flows").unwrap();

        let regions: Vec<String> = flows.rows().iter().map(|r| r.key.to_string()).collect();
        assert_eq!(regions, vec!["(taker)", "(donor)"]);
        assert_eq!(flows.rows()[0].cells, vec![Some(-15.0), Some(-15.0)]);
        assert_eq!(flows.label(0, "sign"), Some("non_positive"));
        assert_eq!(flows.label(1, "sign_prev"), Some("positive"));
    }
}
