use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// A lead or client row as supplied by the fetch layer.
///
/// Categorical fields stay optional so that a missing value can be told apart
/// from an empty one. Numeric fields are defaulted to 0 when the row is read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    #[serde(alias = "memberId")]
    pub id: String,
    #[serde(alias = "center", alias = "firstVisitLocation")]
    pub location: Option<String>,
    pub source: Option<String>,
    pub stage: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "trainerName")]
    pub associate: Option<String>,
    pub channel: Option<String>,
    pub trial_status: Option<String>,
    pub conversion_status: Option<String>,
    pub retention_status: Option<String>,
    pub is_new: Option<String>,
    pub first_visit_type: Option<String>,
    pub remarks: Option<String>,
    #[serde(alias = "createdAt", alias = "firstVisitDate")]
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub ltv: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub visits: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub visits_post_trial: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub conversion_span: f64,
}

impl Record {
    /// Value of a categorical field.
    pub fn field(&self, dimension: Dimension) -> Option<&str> {
        let value = match dimension {
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
        };
        value.as_deref()
    }
}

// Empty CSV cells and JSON nulls both count as 0.
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}` (expected one of: {expected})")]
pub struct ParseNameError {
    kind: &'static str,
    value: String,
    expected: String,
}

impl ParseNameError {
    fn new(kind: &'static str, value: &str, expected: &[&str]) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected: expected.join(", "),
        }
    }
}

fn normalize_name(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Categorical dimensions a record can be filtered or grouped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    Location,
    Source,
    Stage,
    Status,
    Associate,
    Channel,
    TrialStatus,
    ConversionStatus,
    RetentionStatus,
    IsNew,
    FirstVisitType,
}

impl Dimension {
    pub const ALL: [Dimension; 11] = [
        Dimension::Location,
        Dimension::Source,
        Dimension::Stage,
        Dimension::Status,
        Dimension::Associate,
        Dimension::Channel,
        Dimension::TrialStatus,
        Dimension::ConversionStatus,
        Dimension::RetentionStatus,
        Dimension::IsNew,
        Dimension::FirstVisitType,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Location => "location",
            Dimension::Source => "source",
            Dimension::Stage => "stage",
            Dimension::Status => "status",
            Dimension::Associate => "associate",
            Dimension::Channel => "channel",
            Dimension::TrialStatus => "trialStatus",
            Dimension::ConversionStatus => "conversionStatus",
            Dimension::RetentionStatus => "retentionStatus",
            Dimension::IsNew => "isNew",
            Dimension::FirstVisitType => "firstVisitType",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_name(s);
        Dimension::ALL
            .into_iter()
            .find(|dimension| normalize_name(dimension.as_str()) == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Dimension::ALL.iter().map(|d| d.as_str()).collect();
                ParseNameError::new("dimension", s, &names)
            })
    }
}

/// Period size used for time bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Granularity {
    Day,
    Week,
    Month,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Year,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s).as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "week" | "weekly" => Ok(Granularity::Week),
            "month" | "monthly" => Ok(Granularity::Month),
            "year" | "yearly" => Ok(Granularity::Year),
            _ => {
                let names: Vec<&str> = Granularity::ALL.iter().map(|g| g.as_str()).collect();
                Err(ParseNameError::new("granularity", s, &names))
            }
        }
    }
}

/// Single metric picked out of [`DerivedMetrics`] for change and growth columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    Total,
    Converted,
    TotalLtv,
    AvgLtv,
    ConversionRate,
    TrialToMemberRate,
    LeadToTrialRate,
    TrialCompletionRate,
    RetentionRate,
    NewClientRate,
    AvgVisits,
    AvgVisitsPostTrial,
    AvgConversionSpan,
    PipelineHealth,
}

impl MetricKind {
    pub const ALL: [MetricKind; 14] = [
        MetricKind::Total,
        MetricKind::Converted,
        MetricKind::TotalLtv,
        MetricKind::AvgLtv,
        MetricKind::ConversionRate,
        MetricKind::TrialToMemberRate,
        MetricKind::LeadToTrialRate,
        MetricKind::TrialCompletionRate,
        MetricKind::RetentionRate,
        MetricKind::NewClientRate,
        MetricKind::AvgVisits,
        MetricKind::AvgVisitsPostTrial,
        MetricKind::AvgConversionSpan,
        MetricKind::PipelineHealth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Total => "total",
            MetricKind::Converted => "converted",
            MetricKind::TotalLtv => "totalLtv",
            MetricKind::AvgLtv => "avgLtv",
            MetricKind::ConversionRate => "conversionRate",
            MetricKind::TrialToMemberRate => "trialToMemberRate",
            MetricKind::LeadToTrialRate => "leadToTrialRate",
            MetricKind::TrialCompletionRate => "trialCompletionRate",
            MetricKind::RetentionRate => "retentionRate",
            MetricKind::NewClientRate => "newClientRate",
            MetricKind::AvgVisits => "avgVisits",
            MetricKind::AvgVisitsPostTrial => "avgVisitsPostTrial",
            MetricKind::AvgConversionSpan => "avgConversionSpan",
            MetricKind::PipelineHealth => "pipelineHealth",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_name(s);
        // Dashboard tab names.
        match wanted.as_str() {
            "totalclients" => return Ok(MetricKind::Total),
            "totalrevenue" => return Ok(MetricKind::TotalLtv),
            _ => {}
        }
        MetricKind::ALL
            .into_iter()
            .find(|kind| normalize_name(kind.as_str()) == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = MetricKind::ALL.iter().map(|k| k.as_str()).collect();
                ParseNameError::new("metric", s, &names)
            })
    }
}

/// Inclusive calendar date bounds. A missing or blank bound is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateRange {
    #[serde(deserialize_with = "blank_as_unbounded")]
    pub start: Option<NaiveDate>,
    #[serde(deserialize_with = "blank_as_unbounded")]
    pub end: Option<NaiveDate>,
}

fn blank_as_unbounded<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<NaiveDate>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (None, None) => f.write_str("all dates"),
            (Some(start), None) => write!(f, "since {start}"),
            (None, Some(end)) => write!(f, "through {end}"),
            (Some(start), Some(end)) => write!(f, "{start} to {end}"),
        }
    }
}

/// Composable record filter. Empty sets and `None` bounds never exclude.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSet {
    pub date_range: DateRange,
    pub location: Vec<String>,
    pub source: Vec<String>,
    pub stage: Vec<String>,
    pub status: Vec<String>,
    pub associate: Vec<String>,
    pub channel: Vec<String>,
    pub trial_status: Vec<String>,
    pub conversion_status: Vec<String>,
    pub retention_status: Vec<String>,
    pub is_new: Vec<String>,
    pub first_visit_type: Vec<String>,
    #[serde(rename = "minLTV", alias = "minLtv")]
    pub min_ltv: Option<f64>,
    #[serde(rename = "maxLTV", alias = "maxLtv")]
    pub max_ltv: Option<f64>,
    pub min_visits_post_trial: Option<f64>,
    pub max_visits_post_trial: Option<f64>,
}

/// Raw per-group counters and sums built in one pass over the records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub total: u64,
    pub converted: u64,
    pub trials_completed: u64,
    pub trials_scheduled: u64,
    pub proximity_issues: u64,
    pub retained: u64,
    pub new_clients: u64,
    pub conversion_span_count: u64,
    pub total_ltv: f64,
    pub total_visits: f64,
    pub total_visits_post_trial: f64,
    pub conversion_span_total: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    pub total: u64,
    pub converted: u64,
    pub trials_completed: u64,
    pub trials_scheduled: u64,
    pub proximity_issues: u64,
    pub retained: u64,
    pub new_clients: u64,
    pub total_ltv: f64,
    pub conversion_rate: f64,
    pub trial_to_member_rate: f64,
    pub lead_to_trial_rate: f64,
    pub trial_completion_rate: f64,
    pub retention_rate: f64,
    pub new_client_rate: f64,
    pub avg_ltv: f64,
    pub avg_visits: f64,
    pub avg_visits_post_trial: f64,
    pub avg_conversion_span: f64,
    pub pipeline_health: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodMetrics {
    pub period: String,
    pub metrics: DerivedMetrics,
}

/// One period of a single metric next to the period before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodChange {
    pub period: String,
    pub value: f64,
    pub change: Option<f64>,
    pub growth: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStage {
    pub name: &'static str,
    pub count: u64,
    pub share_of_leads: f64,
    pub drop_off: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMetrics {
    pub name: String,
    pub metrics: DerivedMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rankings {
    pub top: Vec<GroupMetrics>,
    pub bottom: Vec<GroupMetrics>,
    pub top_ltv: Vec<GroupMetrics>,
    pub top_volume: Vec<GroupMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearCell {
    pub year: i32,
    pub total: u64,
    pub converted: u64,
    pub avg_ltv: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearOnYearRow {
    pub group: String,
    pub month: u32,
    pub month_name: &'static str,
    pub cells: Vec<YearCell>,
    pub growth: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearOnYearTable {
    pub years: Vec<i32>,
    pub rows: Vec<YearOnYearRow>,
}
