//! Lead funnel and conversion analytics over studio lead/client exports.
//!
//! Records flow through [`filter::filter_records`], are grouped by
//! [`aggregate::aggregate_by`] or [`aggregate::compute_period_series`], and
//! come out as [`models::DerivedMetrics`] for tables, rankings and reports.

pub mod aggregate;
pub mod filter;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod period;
pub mod ranking;
pub mod report;
pub mod yoy;

pub use aggregate::{aggregate, aggregate_by, compute_period_series, GroupBy};
pub use filter::{filter_records, matches};
pub use models::{
    Aggregate, DateRange, DerivedMetrics, Dimension, FilterSet, Granularity, MetricKind,
    PeriodMetrics, Record,
};
pub use period::to_period_key;
