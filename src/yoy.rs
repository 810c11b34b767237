//! Year-over-year comparison of one dimension, month by month.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Month};

use crate::aggregate::category_key;
use crate::metrics::growth;
use crate::models::{
    Aggregate, DerivedMetrics, Dimension, MetricKind, Record, YearCell, YearOnYearRow,
    YearOnYearTable,
};
use crate::period::parse_record_date;

fn month_name(month: u32) -> &'static str {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map_or("", |m| m.name())
}

/// Build the table. `metric` picks the value compared between the two most
/// recent years in each row's `growth`.
pub fn year_on_year(
    records: &[Record],
    dimension: Dimension,
    metric: MetricKind,
) -> YearOnYearTable {
    let mut buckets: BTreeMap<(String, u32), BTreeMap<i32, Aggregate>> = BTreeMap::new();
    let mut years: BTreeSet<i32> = BTreeSet::new();

    for record in records {
        let Some(date) = record.date.as_deref().and_then(parse_record_date) else {
            continue;
        };
        years.insert(date.year());
        buckets
            .entry((category_key(record, dimension), date.month()))
            .or_default()
            .entry(date.year())
            .or_default()
            .add(record);
    }

    let years: Vec<i32> = years.into_iter().rev().collect();

    let rows = buckets
        .into_iter()
        .map(|((group, month), by_year)| {
            let metrics: Vec<(i32, DerivedMetrics)> = years
                .iter()
                .map(|year| {
                    let agg = by_year.get(year).copied().unwrap_or_default();
                    (*year, DerivedMetrics::from_aggregate(&agg))
                })
                .collect();

            let row_growth = match metrics.as_slice() {
                [(_, current), (_, previous), ..] => {
                    growth(current.value(metric), previous.value(metric))
                }
                _ => None,
            };

            let cells = metrics
                .iter()
                .map(|(year, m)| YearCell {
                    year: *year,
                    total: m.total,
                    converted: m.converted,
                    avg_ltv: m.avg_ltv,
                    conversion_rate: m.conversion_rate,
                })
                .collect();

            YearOnYearRow {
                group,
                month,
                month_name: month_name(month),
                cells,
                growth: row_growth,
            }
        })
        .collect();

    YearOnYearTable { years, rows }
}
