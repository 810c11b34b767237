use std::collections::BTreeMap;

use crate::metrics::growth;
use crate::models::{
    Aggregate, DerivedMetrics, Dimension, FunnelStage, Granularity, MetricKind, PeriodChange,
    PeriodMetrics, Record,
};
use crate::period::to_period_key;

pub const UNKNOWN_GROUP: &str = "Unknown";

const CONVERTED: &str = "Converted";
const TRIAL_COMPLETED: &str = "Trial Completed";
const TRIAL_MARKER: &str = "Trial";
const PROXIMITY_MARKER: &str = "Proximity";
const RETAINED: &str = "Retained";
const NEW_CLIENT: &str = "New";

pub fn is_converted(record: &Record) -> bool {
    record.conversion_status.as_deref() == Some(CONVERTED)
}

pub fn is_trial_completed(record: &Record) -> bool {
    record.stage.as_deref() == Some(TRIAL_COMPLETED)
}

pub fn is_trial_scheduled(record: &Record) -> bool {
    record
        .stage
        .as_deref()
        .is_some_and(|stage| stage.contains(TRIAL_MARKER))
}

pub fn has_proximity_issue(record: &Record) -> bool {
    let in_stage = record
        .stage
        .as_deref()
        .is_some_and(|stage| stage.contains(PROXIMITY_MARKER));
    let in_remarks = record
        .remarks
        .as_deref()
        .is_some_and(|remarks| remarks.to_lowercase().contains("proximity"));
    in_stage || in_remarks
}

impl Aggregate {
    pub fn add(&mut self, record: &Record) {
        self.total += 1;
        if is_converted(record) {
            self.converted += 1;
        }
        if is_trial_completed(record) {
            self.trials_completed += 1;
        }
        if is_trial_scheduled(record) {
            self.trials_scheduled += 1;
        }
        if has_proximity_issue(record) {
            self.proximity_issues += 1;
        }
        if record.retention_status.as_deref() == Some(RETAINED) {
            self.retained += 1;
        }
        if record.is_new.as_deref() == Some(NEW_CLIENT) {
            self.new_clients += 1;
        }
        if record.conversion_span > 0.0 {
            self.conversion_span_total += record.conversion_span;
            self.conversion_span_count += 1;
        }
        self.total_ltv += record.ltv;
        self.total_visits += record.visits;
        self.total_visits_post_trial += record.visits_post_trial;
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut agg = Aggregate::default();
        for record in records {
            agg.add(record);
        }
        agg
    }
}

/// How records are keyed for grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// Missing or blank values land in the `"Unknown"` group.
    Category(Dimension),
    /// Records without a usable date are skipped.
    Period(Granularity),
}

impl GroupBy {
    pub fn key(&self, record: &Record) -> Option<String> {
        match *self {
            GroupBy::Category(dimension) => Some(category_key(record, dimension)),
            GroupBy::Period(granularity) => record
                .date
                .as_deref()
                .and_then(|raw| to_period_key(raw, granularity)),
        }
    }
}

pub fn category_key(record: &Record, dimension: Dimension) -> String {
    match record.field(dimension) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => UNKNOWN_GROUP.to_string(),
    }
}

/// Single pass grouping. Records whose key is `None` are dropped.
pub fn aggregate<F>(records: &[Record], key_fn: F) -> BTreeMap<String, Aggregate>
where
    F: Fn(&Record) -> Option<String>,
{
    let mut groups: BTreeMap<String, Aggregate> = BTreeMap::new();
    let mut skipped = 0usize;

    for record in records {
        match key_fn(record) {
            Some(key) => groups.entry(key).or_default().add(record),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!(skipped, groups = groups.len(), "records without a group key");
    }
    groups
}

pub fn aggregate_by(records: &[Record], group_by: GroupBy) -> BTreeMap<String, DerivedMetrics> {
    aggregate(records, |record| group_by.key(record))
        .into_iter()
        .map(|(key, agg)| (key, DerivedMetrics::from_aggregate(&agg)))
        .collect()
}

/// Metrics for the whole record set as one group.
pub fn summarize(records: &[Record]) -> DerivedMetrics {
    DerivedMetrics::from_aggregate(&Aggregate::from_records(records))
}

/// Per-period metrics in ascending period order.
pub fn compute_period_series(records: &[Record], granularity: Granularity) -> Vec<PeriodMetrics> {
    // Period keys are zero-padded, so key order is chronological.
    aggregate_by(records, GroupBy::Period(granularity))
        .into_iter()
        .map(|(period, metrics)| PeriodMetrics { period, metrics })
        .collect()
}

/// Keep only the trailing `count` periods of a series.
pub fn last_periods(series: &[PeriodMetrics], count: usize) -> &[PeriodMetrics] {
    &series[series.len().saturating_sub(count)..]
}

/// One metric per period with its absolute and percentage change from the
/// period before. The first period has neither.
pub fn period_changes(series: &[PeriodMetrics], metric: MetricKind) -> Vec<PeriodChange> {
    let mut previous: Option<f64> = None;
    series
        .iter()
        .map(|point| {
            let value = point.metrics.value(metric);
            let row = PeriodChange {
                period: point.period.clone(),
                value,
                change: previous.map(|prev| value - prev),
                growth: previous.and_then(|prev| growth(value, prev)),
            };
            previous = Some(value);
            row
        })
        .collect()
}

/// Leads received, trials scheduled, trials completed and conversions.
pub fn funnel_stages(records: &[Record]) -> Vec<FunnelStage> {
    if records.is_empty() {
        return Vec::new();
    }

    let agg = Aggregate::from_records(records);
    let counts = [
        ("Leads Received", agg.total),
        ("Trials Scheduled", agg.trials_scheduled),
        ("Trials Completed", agg.trials_completed),
        ("Converted", agg.converted),
    ];

    let mut stages = Vec::with_capacity(counts.len());
    let mut previous: Option<u64> = None;
    for (name, count) in counts {
        stages.push(FunnelStage {
            name,
            count,
            share_of_leads: count as f64 * 100.0 / agg.total as f64,
            drop_off: previous.map_or(0, |prev| prev.saturating_sub(count)),
        });
        previous = Some(count);
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: Option<&str>, date: Option<&str>, status: &str, ltv: f64) -> Record {
        Record {
            id: "r".to_string(),
            source: source.map(str::to_string),
            date: date.map(str::to_string),
            conversion_status: Some(status.to_string()),
            ltv,
            ..Record::default()
        }
    }

    #[test]
    fn groups_by_source() {
        let records = vec![
            record(Some("IG"), None, "Converted", 100.0),
            record(Some("IG"), None, "Lost", 50.0),
        ];
        let groups = aggregate_by(&records, GroupBy::Category(Dimension::Source));
        assert_eq!(groups.len(), 1);
        let ig = &groups["IG"];
        assert_eq!(ig.total, 2);
        assert_eq!(ig.converted, 1);
        assert_eq!(ig.avg_ltv, 75.0);
        assert_eq!(ig.conversion_rate, 50.0);
    }

    #[test]
    fn missing_category_goes_to_unknown() {
        let records = vec![
            record(None, None, "Lost", 0.0),
            record(Some(""), None, "Lost", 0.0),
            record(Some("Walk-in"), None, "Converted", 0.0),
        ];
        let groups = aggregate_by(&records, GroupBy::Category(Dimension::Source));
        assert_eq!(groups[UNKNOWN_GROUP].total, 2);
        assert_eq!(groups["Walk-in"].total, 1);
        let total: u64 = groups.values().map(|m| m.total).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn undated_records_are_dropped_from_periods() {
        let records = vec![
            record(Some("IG"), Some("2024-03-15"), "Converted", 10.0),
            record(Some("IG"), Some("2024-03-02T09:00:00Z"), "Lost", 10.0),
            record(Some("IG"), None, "Lost", 10.0),
            record(Some("IG"), Some("tbd"), "Lost", 10.0),
        ];
        let groups = aggregate_by(&records, GroupBy::Period(Granularity::Month));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["2024-03"].total, 2);
        assert!(!groups.contains_key(UNKNOWN_GROUP));
    }

    #[test]
    fn series_is_ascending_and_trimmable() {
        let records = vec![
            record(None, Some("2024-11-01"), "Lost", 0.0),
            record(None, Some("2023-12-31"), "Lost", 0.0),
            record(None, Some("2024-02-10"), "Converted", 0.0),
            record(None, Some("2024-02-11"), "Lost", 0.0),
        ];
        let series = compute_period_series(&records, Granularity::Month);
        let periods: Vec<&str> = series.iter().map(|p| p.period.as_str()).collect();
        assert_eq!(periods, vec!["2023-12", "2024-02", "2024-11"]);
        assert_eq!(series[1].metrics.conversion_rate, 50.0);

        let tail = last_periods(&series, 2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].period, "2024-02");
        assert_eq!(last_periods(&series, 12).len(), 3);
    }

    #[test]
    fn month_on_month_changes() {
        let records = vec![
            record(None, Some("2024-01-03"), "Converted", 0.0),
            record(None, Some("2024-01-04"), "Lost", 0.0),
            record(None, Some("2024-02-01"), "Lost", 0.0),
            record(None, Some("2024-02-02"), "Lost", 0.0),
            record(None, Some("2024-03-05"), "Converted", 0.0),
            record(None, Some("2024-03-06"), "Converted", 0.0),
            record(None, Some("2024-03-07"), "Lost", 0.0),
        ];
        let series = compute_period_series(&records, Granularity::Month);

        let totals = period_changes(&series, MetricKind::Total);
        assert_eq!(totals.len(), 3);
        assert_eq!(totals[0].value, 2.0);
        assert_eq!(totals[0].change, None);
        assert_eq!(totals[0].growth, None);
        assert_eq!(totals[1].change, Some(0.0));
        assert_eq!(totals[1].growth, Some(0.0));
        assert_eq!(totals[2].change, Some(1.0));
        assert_eq!(totals[2].growth, Some(50.0));

        let converted = period_changes(&series, MetricKind::Converted);
        assert_eq!(converted[1].change, Some(-1.0));
        assert_eq!(converted[1].growth, Some(-100.0));
        // February had no conversions to grow from.
        assert_eq!(converted[2].change, Some(2.0));
        assert_eq!(converted[2].growth, None);
    }

    #[test]
    fn empty_input_yields_empty_results() {
        assert!(aggregate_by(&[], GroupBy::Category(Dimension::Source)).is_empty());
        assert!(compute_period_series(&[], Granularity::Week).is_empty());
        assert!(funnel_stages(&[]).is_empty());
        assert_eq!(summarize(&[]), DerivedMetrics::default());
        assert!(period_changes(&[], MetricKind::NewClientRate).is_empty());
    }

    #[test]
    fn classifies_trials_and_proximity() {
        let mut scheduled = Record {
            stage: Some("Trial Scheduled".to_string()),
            ..Record::default()
        };
        assert!(is_trial_scheduled(&scheduled));
        assert!(!is_trial_completed(&scheduled));

        scheduled.stage = Some("Trial Completed".to_string());
        assert!(is_trial_scheduled(&scheduled));
        assert!(is_trial_completed(&scheduled));

        let far = Record {
            stage: Some("Lost - Proximity".to_string()),
            ..Record::default()
        };
        let remark = Record {
            remarks: Some("Studio PROXIMITY too far".to_string()),
            ..Record::default()
        };
        assert!(has_proximity_issue(&far));
        assert!(has_proximity_issue(&remark));
        assert!(!has_proximity_issue(&Record::default()));
    }

    #[test]
    fn funnel_tracks_drop_off() {
        let stages_of = |stage: &str, status: &str| Record {
            stage: Some(stage.to_string()),
            conversion_status: Some(status.to_string()),
            ..Record::default()
        };
        let records = vec![
            stages_of("New Lead", "Lost"),
            stages_of("Trial Scheduled", "Lost"),
            stages_of("Trial Completed", "Lost"),
            stages_of("Trial Completed", "Converted"),
        ];
        let stages = funnel_stages(&records);
        let counts: Vec<u64> = stages.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![4, 3, 2, 1]);
        assert_eq!(stages[0].share_of_leads, 100.0);
        assert_eq!(stages[2].share_of_leads, 50.0);
        assert_eq!(stages[0].drop_off, 0);
        assert_eq!(stages[1].drop_off, 1);
        assert_eq!(stages[3].drop_off, 1);
    }
}
