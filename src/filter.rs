use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::models::{DateRange, Dimension, FilterSet, Record};
use crate::period::{self, parse_record_date};

/// Named date window, resolved against `today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    All,
    PreviousMonth,
    CurrentMonth,
    /// From the first of the month `n` months back through the end of this month.
    TrailingMonths(u32),
    Between(DateRange),
}

impl DateWindow {
    pub fn resolve(self, today: NaiveDate) -> DateRange {
        match self {
            DateWindow::All => DateRange::default(),
            DateWindow::PreviousMonth => period::previous_month_range(today),
            DateWindow::CurrentMonth => period::current_month_range(today),
            DateWindow::TrailingMonths(months) => period::range_for_months(today, months),
            DateWindow::Between(range) => range,
        }
    }
}

/// Constraints layered over a base filter set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOverrides {
    pub window: Option<DateWindow>,
    pub categories: BTreeMap<Dimension, Vec<String>>,
    pub min_ltv: Option<f64>,
    pub max_ltv: Option<f64>,
    pub min_visits_post_trial: Option<f64>,
    pub max_visits_post_trial: Option<f64>,
}

impl FilterSet {
    /// Unrestricted except for the previous calendar month relative to `today`.
    pub fn for_previous_month(today: NaiveDate) -> Self {
        Self {
            date_range: period::previous_month_range(today),
            ..Self::default()
        }
    }

    pub fn allowed(&self, dimension: Dimension) -> &[String] {
        match dimension {
            Dimension::Location => &self.location,
            Dimension::Source => &self.source,
            Dimension::Stage => &self.stage,
            Dimension::Status => &self.status,
            Dimension::Associate => &self.associate,
            Dimension::Channel => &self.channel,
            Dimension::TrialStatus => &self.trial_status,
            Dimension::ConversionStatus => &self.conversion_status,
            Dimension::RetentionStatus => &self.retention_status,
            Dimension::IsNew => &self.is_new,
            Dimension::FirstVisitType => &self.first_visit_type,
        }
    }

    pub fn allowed_mut(&mut self, dimension: Dimension) -> &mut Vec<String> {
        match dimension {
            Dimension::Location => &mut self.location,
            Dimension::Source => &mut self.source,
            Dimension::Stage => &mut self.stage,
            Dimension::Status => &mut self.status,
            Dimension::Associate => &mut self.associate,
            Dimension::Channel => &mut self.channel,
            Dimension::TrialStatus => &mut self.trial_status,
            Dimension::ConversionStatus => &mut self.conversion_status,
            Dimension::RetentionStatus => &mut self.retention_status,
            Dimension::IsNew => &mut self.is_new,
            Dimension::FirstVisitType => &mut self.first_visit_type,
        }
    }

    /// Start from `base` (the previous month when absent) and apply `overrides`.
    pub fn resolve(base: Option<Self>, overrides: &FilterOverrides, today: NaiveDate) -> Self {
        let mut filters = base.unwrap_or_else(|| Self::for_previous_month(today));
        filters.apply_overrides(overrides, today);
        filters
    }

    /// A window replaces the date range, category values are added to the
    /// existing sets and each given bound replaces the current one.
    pub fn apply_overrides(&mut self, overrides: &FilterOverrides, today: NaiveDate) {
        if let Some(window) = overrides.window {
            self.date_range = window.resolve(today);
        }

        for (dimension, values) in &overrides.categories {
            let allowed = self.allowed_mut(*dimension);
            for value in values {
                if !allowed.contains(value) {
                    allowed.push(value.clone());
                }
            }
        }

        let bounds = [
            (&mut self.min_ltv, overrides.min_ltv),
            (&mut self.max_ltv, overrides.max_ltv),
            (&mut self.min_visits_post_trial, overrides.min_visits_post_trial),
            (&mut self.max_visits_post_trial, overrides.max_visits_post_trial),
        ];
        for (slot, value) in bounds {
            if value.is_some() {
                *slot = value;
            }
        }
    }

    /// Selected category values plus defined numeric bounds.
    pub fn active_filter_count(&self) -> usize {
        let categories: usize = Dimension::ALL
            .iter()
            .map(|dimension| self.allowed(*dimension).len())
            .sum();
        let bounds = [
            self.min_ltv,
            self.max_ltv,
            self.min_visits_post_trial,
            self.max_visits_post_trial,
        ]
        .iter()
        .filter(|bound| bound.is_some())
        .count();
        categories + bounds
    }
}

fn date_matches(record: &Record, range: &DateRange) -> bool {
    if range.is_unbounded() {
        return true;
    }
    record
        .date
        .as_deref()
        .and_then(parse_record_date)
        .is_some_and(|date| range.contains(date))
}

fn category_matches(record: &Record, filters: &FilterSet, dimension: Dimension) -> bool {
    let allowed = filters.allowed(dimension);
    if allowed.is_empty() {
        return true;
    }
    record
        .field(dimension)
        .is_some_and(|value| allowed.iter().any(|candidate| candidate == value))
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

/// Whether a record passes every active constraint of the filter set.
pub fn matches(record: &Record, filters: &FilterSet) -> bool {
    date_matches(record, &filters.date_range)
        && Dimension::ALL
            .iter()
            .all(|dimension| category_matches(record, filters, *dimension))
        && within(record.ltv, filters.min_ltv, filters.max_ltv)
        && within(
            record.visits_post_trial,
            filters.min_visits_post_trial,
            filters.max_visits_post_trial,
        )
}

pub fn filter_records(records: &[Record], filters: &FilterSet) -> Vec<Record> {
    let filtered: Vec<Record> = records
        .iter()
        .filter(|record| matches(record, filters))
        .cloned()
        .collect();
    tracing::debug!(
        input = records.len(),
        kept = filtered.len(),
        active_filters = filters.active_filter_count(),
        "filtered records"
    );
    filtered
}

/// Distinct non-empty values per dimension, sorted, for building filter pickers.
pub fn filter_options(records: &[Record]) -> BTreeMap<Dimension, Vec<String>> {
    Dimension::ALL
        .iter()
        .map(|dimension| {
            let values: BTreeSet<&str> = records
                .iter()
                .filter_map(|record| record.field(*dimension))
                .filter(|value| !value.is_empty())
                .collect();
            (*dimension, values.into_iter().map(str::to_string).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lead(source: Option<&str>, created: Option<&str>, ltv: f64) -> Record {
        Record {
            id: "lead-1".to_string(),
            source: source.map(str::to_string),
            date: created.map(str::to_string),
            ltv,
            ..Record::default()
        }
    }

    #[test]
    fn unrestricted_filters_keep_everything() {
        let records = vec![
            lead(Some("IG"), Some("2024-03-01"), 10.0),
            lead(None, None, 0.0),
            lead(Some(""), Some("garbage"), -5.0),
        ];
        assert_eq!(filter_records(&records, &FilterSet::default()), records);
    }

    #[test]
    fn date_bounds_are_inclusive() {
        let filters = FilterSet {
            date_range: DateRange::new(date(2024, 3, 1), date(2024, 3, 31)),
            ..FilterSet::default()
        };
        assert!(matches(&lead(None, Some("2024-03-01"), 0.0), &filters));
        assert!(matches(&lead(None, Some("2024-03-31T22:15:00Z"), 0.0), &filters));
        assert!(!matches(&lead(None, Some("2024-04-01"), 0.0), &filters));
        assert!(!matches(&lead(None, Some("2024-02-29"), 0.0), &filters));
    }

    #[test]
    fn unparsable_date_only_excluded_when_bounded() {
        let record = lead(None, Some("soon"), 0.0);
        assert!(matches(&record, &FilterSet::default()));

        let open_ended = FilterSet {
            date_range: DateRange {
                start: Some(date(2024, 1, 1)),
                end: None,
            },
            ..FilterSet::default()
        };
        assert!(!matches(&record, &open_ended));
        assert!(!matches(&lead(None, None, 0.0), &open_ended));
    }

    #[test]
    fn category_membership_is_exact() {
        let filters = FilterSet {
            source: vec!["Instagram".to_string()],
            ..FilterSet::default()
        };
        assert!(matches(&lead(Some("Instagram"), None, 0.0), &filters));
        assert!(!matches(&lead(Some("instagram"), None, 0.0), &filters));
        assert!(!matches(&lead(Some("Instagram "), None, 0.0), &filters));
        assert!(!matches(&lead(None, None, 0.0), &filters));
    }

    #[test]
    fn numeric_bounds_apply_inclusively() {
        let filters = FilterSet {
            min_ltv: Some(100.0),
            max_ltv: Some(200.0),
            ..FilterSet::default()
        };
        assert!(matches(&lead(None, None, 100.0), &filters));
        assert!(matches(&lead(None, None, 200.0), &filters));
        assert!(!matches(&lead(None, None, 99.5), &filters));
        assert!(!matches(&lead(None, None, 200.5), &filters));

        let visits = FilterSet {
            min_visits_post_trial: Some(2.0),
            ..FilterSet::default()
        };
        let mut record = lead(None, None, 0.0);
        assert!(!matches(&record, &visits));
        record.visits_post_trial = 3.0;
        assert!(matches(&record, &visits));
    }

    #[test]
    fn every_constraint_must_hold() {
        let filters = FilterSet {
            date_range: DateRange::new(date(2024, 3, 1), date(2024, 3, 31)),
            source: vec!["IG".to_string(), "Walk-in".to_string()],
            min_ltv: Some(50.0),
            ..FilterSet::default()
        };
        assert!(matches(&lead(Some("Walk-in"), Some("2024-03-10"), 60.0), &filters));
        assert!(!matches(&lead(Some("Walk-in"), Some("2024-03-10"), 40.0), &filters));
        assert!(!matches(&lead(Some("Referral"), Some("2024-03-10"), 60.0), &filters));
        assert!(!matches(&lead(Some("IG"), Some("2024-05-10"), 60.0), &filters));
    }

    #[test]
    fn previous_month_default() {
        let filters = FilterSet::for_previous_month(date(2025, 1, 10));
        assert_eq!(filters.date_range.start, Some(date(2024, 12, 1)));
        assert_eq!(filters.date_range.end, Some(date(2024, 12, 31)));
        assert_eq!(filters.active_filter_count(), 0);
    }

    #[test]
    fn counts_active_filters() {
        let mut filters = FilterSet {
            max_visits_post_trial: Some(4.0),
            ..FilterSet::default()
        };
        filters.allowed_mut(Dimension::Stage).push("Trial Completed".to_string());
        filters.allowed_mut(Dimension::IsNew).push("New".to_string());
        assert_eq!(filters.active_filter_count(), 3);

        let sources = FilterSet {
            source: vec!["IG".to_string(), "Walk-in".to_string(), "Referral".to_string()],
            ..FilterSet::default()
        };
        assert_eq!(sources.active_filter_count(), 3);
    }

    fn overrides(window: Option<DateWindow>) -> FilterOverrides {
        FilterOverrides {
            window,
            ..FilterOverrides::default()
        }
    }

    #[test]
    fn no_base_defaults_to_previous_month() {
        let filters = FilterSet::resolve(None, &FilterOverrides::default(), date(2025, 1, 10));
        assert_eq!(filters, FilterSet::for_previous_month(date(2025, 1, 10)));
    }

    #[test]
    fn base_keeps_its_window_unless_overridden() {
        let base = FilterSet {
            date_range: DateRange::new(date(2024, 3, 1), date(2024, 3, 31)),
            ..FilterSet::default()
        };
        let today = date(2025, 6, 15);

        let kept = FilterSet::resolve(Some(base.clone()), &FilterOverrides::default(), today);
        assert_eq!(kept.date_range, base.date_range);

        let all_dates = overrides(Some(DateWindow::All));
        let all = FilterSet::resolve(Some(base.clone()), &all_dates, today);
        assert!(all.date_range.is_unbounded());

        let explicit = DateRange {
            start: Some(date(2024, 5, 1)),
            end: None,
        };
        let between = FilterSet::resolve(
            Some(base),
            &overrides(Some(DateWindow::Between(explicit))),
            today,
        );
        assert_eq!(between.date_range, explicit);
    }

    #[test]
    fn month_presets_resolve_against_today() {
        let today = date(2024, 2, 10);
        assert_eq!(
            DateWindow::CurrentMonth.resolve(today),
            DateRange::new(date(2024, 2, 1), date(2024, 2, 29))
        );
        assert_eq!(
            DateWindow::TrailingMonths(3).resolve(today),
            DateRange::new(date(2023, 11, 1), date(2024, 2, 29))
        );
        assert_eq!(
            DateWindow::PreviousMonth.resolve(today),
            DateRange::new(date(2024, 1, 1), date(2024, 1, 31))
        );
    }

    #[test]
    fn overrides_extend_categories_and_replace_bounds() {
        let mut filters = FilterSet {
            source: vec!["IG".to_string()],
            min_ltv: Some(10.0),
            max_ltv: Some(500.0),
            ..FilterSet::default()
        };
        let mut extra = overrides(None);
        extra
            .categories
            .insert(Dimension::Source, vec!["Referral".to_string(), "IG".to_string()]);
        extra.categories.insert(Dimension::Stage, vec!["Trial Completed".to_string()]);
        extra.min_ltv = Some(50.0);
        extra.max_visits_post_trial = Some(6.0);

        filters.apply_overrides(&extra, date(2024, 1, 1));
        assert_eq!(filters.source, vec!["IG", "Referral"]);
        assert_eq!(filters.stage, vec!["Trial Completed"]);
        assert_eq!(filters.min_ltv, Some(50.0));
        assert_eq!(filters.max_ltv, Some(500.0));
        assert_eq!(filters.max_visits_post_trial, Some(6.0));
        assert!(filters.date_range.is_unbounded());
    }

    #[test]
    fn options_are_distinct_sorted_and_skip_blanks() {
        let records = vec![
            lead(Some("Walk-in"), None, 0.0),
            lead(Some("IG"), None, 0.0),
            lead(Some("IG"), None, 0.0),
            lead(Some(""), None, 0.0),
            lead(None, None, 0.0),
        ];
        let options = filter_options(&records);
        assert_eq!(options[&Dimension::Source], vec!["IG", "Walk-in"]);
        assert!(options[&Dimension::Stage].is_empty());
        assert_eq!(options.len(), Dimension::ALL.len());
    }

    #[test]
    fn filter_set_reads_dashboard_json() {
        let json = r#"{
            "dateRange": { "start": "2024-03-01", "end": "2024-03-31" },
            "source": ["IG"],
            "minLTV": 25,
            "maxVisitsPostTrial": 8
        }"#;
        let filters: FilterSet = serde_json::from_str(json).unwrap();
        assert_eq!(filters.date_range.start, Some(date(2024, 3, 1)));
        assert_eq!(filters.source, vec!["IG"]);
        assert_eq!(filters.min_ltv, Some(25.0));
        assert_eq!(filters.max_visits_post_trial, Some(8.0));
        assert!(filters.stage.is_empty());
    }

    #[test]
    fn blank_date_bounds_are_unbounded() {
        let filters: FilterSet =
            serde_json::from_str(r#"{"dateRange":{"start":"","end":""}}"#).unwrap();
        assert!(filters.date_range.is_unbounded());

        let half: FilterSet =
            serde_json::from_str(r#"{"dateRange":{"start":"2024-03-01","end":null}}"#).unwrap();
        assert_eq!(half.date_range.start, Some(date(2024, 3, 1)));
        assert_eq!(half.date_range.end, None);

        assert!(serde_json::from_str::<FilterSet>(r#"{"dateRange":{"start":"March"}}"#).is_err());
    }
}
