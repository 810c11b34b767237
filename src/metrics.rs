//! Rates, averages and the pipeline health score derived from an [`Aggregate`].
//!
//! Every ratio is 0 when its denominator is 0, so no NaN or infinity reaches
//! a caller.

use crate::models::{Aggregate, DerivedMetrics, MetricKind};

const HEALTH_LEAD_TO_TRIAL_WEIGHT: f64 = 0.3;
const HEALTH_TRIAL_TO_MEMBER_WEIGHT: f64 = 0.4;
const HEALTH_VISITS_WEIGHT: f64 = 0.2;
const HEALTH_PROXIMITY_WEIGHT: f64 = 0.1;
// Average visits are scaled onto a 0-100-ish range before weighting.
const HEALTH_VISITS_SCALE: f64 = 10.0;

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        let value = numerator / denominator;
        if value.is_finite() {
            return value;
        }
    }
    0.0
}

fn percent(numerator: u64, denominator: u64) -> f64 {
    ratio(numerator as f64 * 100.0, denominator as f64)
}

pub fn conversion_rate(agg: &Aggregate) -> f64 {
    percent(agg.converted, agg.total)
}

pub fn trial_to_member_rate(agg: &Aggregate) -> f64 {
    percent(agg.converted, agg.trials_completed)
}

pub fn lead_to_trial_rate(agg: &Aggregate) -> f64 {
    percent(agg.trials_completed, agg.total)
}

pub fn trial_completion_rate(agg: &Aggregate) -> f64 {
    percent(agg.trials_completed, agg.trials_scheduled)
}

pub fn retention_rate(agg: &Aggregate) -> f64 {
    percent(agg.retained, agg.total)
}

pub fn new_client_rate(agg: &Aggregate) -> f64 {
    percent(agg.new_clients, agg.total)
}

pub fn avg_ltv(agg: &Aggregate) -> f64 {
    ratio(agg.total_ltv, agg.total as f64)
}

pub fn avg_visits(agg: &Aggregate) -> f64 {
    ratio(agg.total_visits, agg.total as f64)
}

pub fn avg_visits_post_trial(agg: &Aggregate) -> f64 {
    ratio(agg.total_visits_post_trial, agg.total as f64)
}

pub fn avg_conversion_span(agg: &Aggregate) -> f64 {
    ratio(agg.conversion_span_total, agg.conversion_span_count as f64)
}

/// Fixed-weight 0-100 blend of funnel rates, engagement and location fit.
pub fn pipeline_health(agg: &Aggregate) -> u8 {
    if agg.total == 0 {
        return 0;
    }
    let clear_of_proximity = agg.total.saturating_sub(agg.proximity_issues);
    let score = lead_to_trial_rate(agg) * HEALTH_LEAD_TO_TRIAL_WEIGHT
        + trial_to_member_rate(agg) * HEALTH_TRIAL_TO_MEMBER_WEIGHT
        + avg_visits(agg) * HEALTH_VISITS_SCALE * HEALTH_VISITS_WEIGHT
        + percent(clear_of_proximity, agg.total) * HEALTH_PROXIMITY_WEIGHT;
    if score.is_finite() {
        score.round().clamp(0.0, 100.0) as u8
    } else {
        0
    }
}

/// Percentage change from `previous` to `current`.
///
/// `None` means "not applicable": there is no positive baseline to compare
/// against. Callers render it as such rather than as 0% or 100%.
pub fn growth(current: f64, previous: f64) -> Option<f64> {
    if previous > 0.0 && previous.is_finite() && current.is_finite() {
        Some((current - previous) / previous * 100.0)
    } else {
        None
    }
}

impl DerivedMetrics {
    pub fn from_aggregate(agg: &Aggregate) -> Self {
        Self {
            total: agg.total,
            converted: agg.converted,
            trials_completed: agg.trials_completed,
            trials_scheduled: agg.trials_scheduled,
            proximity_issues: agg.proximity_issues,
            retained: agg.retained,
            new_clients: agg.new_clients,
            total_ltv: agg.total_ltv,
            conversion_rate: conversion_rate(agg),
            trial_to_member_rate: trial_to_member_rate(agg),
            lead_to_trial_rate: lead_to_trial_rate(agg),
            trial_completion_rate: trial_completion_rate(agg),
            retention_rate: retention_rate(agg),
            new_client_rate: new_client_rate(agg),
            avg_ltv: avg_ltv(agg),
            avg_visits: avg_visits(agg),
            avg_visits_post_trial: avg_visits_post_trial(agg),
            avg_conversion_span: avg_conversion_span(agg),
            pipeline_health: pipeline_health(agg),
        }
    }

    pub fn value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Total => self.total as f64,
            MetricKind::Converted => self.converted as f64,
            MetricKind::TotalLtv => self.total_ltv,
            MetricKind::AvgLtv => self.avg_ltv,
            MetricKind::ConversionRate => self.conversion_rate,
            MetricKind::TrialToMemberRate => self.trial_to_member_rate,
            MetricKind::LeadToTrialRate => self.lead_to_trial_rate,
            MetricKind::TrialCompletionRate => self.trial_completion_rate,
            MetricKind::RetentionRate => self.retention_rate,
            MetricKind::NewClientRate => self.new_client_rate,
            MetricKind::AvgVisits => self.avg_visits,
            MetricKind::AvgVisitsPostTrial => self.avg_visits_post_trial,
            MetricKind::AvgConversionSpan => self.avg_conversion_span,
            MetricKind::PipelineHealth => f64::from(self.pipeline_health),
        }
    }
}
