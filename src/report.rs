use std::fmt::Write;

use crate::aggregate::{
    aggregate_by, compute_period_series, funnel_stages, last_periods, summarize, GroupBy,
};
use crate::metrics::growth;
use crate::models::{DerivedMetrics, Dimension, FilterSet, Granularity, GroupMetrics, Record};
use crate::ranking::{rank_groups, DEFAULT_MIN_SAMPLE};

const TREND_PERIODS: usize = 12;

/// Source breakdown, largest first.
pub fn summarize_by_source(records: &[Record]) -> Vec<GroupMetrics> {
    let mut groups: Vec<GroupMetrics> =
        aggregate_by(records, GroupBy::Category(Dimension::Source))
            .into_iter()
            .map(|(name, metrics)| GroupMetrics { name, metrics })
            .collect();
    groups.sort_by(|a, b| {
        b.metrics
            .total
            .cmp(&a.metrics.total)
            .then_with(|| a.name.cmp(&b.name))
    });
    groups
}

pub fn format_growth(value: Option<f64>) -> String {
    match value {
        Some(pct) => format!("{pct:+.1}%"),
        None => "n/a".to_string(),
    }
}

fn write_group_line(output: &mut String, group: &GroupMetrics) {
    let _ = writeln!(
        output,
        "- {}: {} leads, {:.1}% conversion, avg LTV {:.2}",
        group.name, group.metrics.total, group.metrics.conversion_rate, group.metrics.avg_ltv
    );
}

fn write_headline(output: &mut String, metrics: &DerivedMetrics) {
    let _ = writeln!(output, "## Headline");
    let _ = writeln!(output, "- Leads received: {}", metrics.total);
    let _ = writeln!(output, "- Trials scheduled: {}", metrics.trials_scheduled);
    let _ = writeln!(output, "- Trials completed: {}", metrics.trials_completed);
    let _ = writeln!(output, "- Proximity issues: {}", metrics.proximity_issues);
    let _ = writeln!(output, "- Converted: {}", metrics.converted);
    let _ = writeln!(output, "- Lead to trial: {:.1}%", metrics.lead_to_trial_rate);
    let _ = writeln!(output, "- Trial to member: {:.1}%", metrics.trial_to_member_rate);
    let _ = writeln!(output, "- Lead to member: {:.1}%", metrics.conversion_rate);
    let _ = writeln!(output, "- Retention: {:.1}%", metrics.retention_rate);
    let _ = writeln!(output, "- Average LTV: {:.2}", metrics.avg_ltv);
    let _ = writeln!(output, "- Average visits: {:.1}", metrics.avg_visits);
    let _ = writeln!(output, "- Pipeline health: {}/100", metrics.pipeline_health);
}

/// Markdown report for records that already passed `filters`.
pub fn build_report(label: Option<&str>, filters: &FilterSet, records: &[Record]) -> String {
    let mut output = String::new();
    let label = label.unwrap_or("all studios");

    let _ = writeln!(output, "# Lead Funnel Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}, {} active filters)",
        label,
        filters.date_range,
        filters.active_filter_count()
    );
    let _ = writeln!(output);

    if records.is_empty() {
        let _ = writeln!(output, "No records match these filters.");
        return output;
    }

    write_headline(&mut output, &summarize(records));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Funnel");
    for stage in funnel_stages(records) {
        let _ = writeln!(
            output,
            "- {}: {} ({:.1}% of leads, -{} from previous stage)",
            stage.name, stage.count, stage.share_of_leads, stage.drop_off
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Sources");
    for group in summarize_by_source(records) {
        write_group_line(&mut output, &group);
    }

    let rankings = rank_groups(records, Dimension::Source, DEFAULT_MIN_SAMPLE);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Best Converting Sources");
    if rankings.top.is_empty() {
        let _ = writeln!(
            output,
            "No source has at least {DEFAULT_MIN_SAMPLE} leads in this window."
        );
    } else {
        for group in rankings.top.iter() {
            write_group_line(&mut output, group);
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "## Weakest Sources");
        for group in rankings.bottom.iter() {
            write_group_line(&mut output, group);
        }
    }

    let series = compute_period_series(records, Granularity::Month);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Trend");
    if series.is_empty() {
        let _ = writeln!(output, "No dated records in this window.");
    } else {
        let recent = last_periods(&series, TREND_PERIODS);
        let mut previous: Option<&DerivedMetrics> = None;
        for point in recent {
            let change =
                previous.and_then(|prev| growth(point.metrics.total as f64, prev.total as f64));
            let _ = writeln!(
                output,
                "- {}: {} leads ({} vs previous), {:.1}% conversion",
                point.period,
                point.metrics.total,
                format_growth(change),
                point.metrics.conversion_rate
            );
            previous = Some(&point.metrics);
        }
    }

    output
}
