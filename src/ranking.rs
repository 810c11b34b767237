use std::cmp::Ordering;

use crate::aggregate::{aggregate_by, GroupBy};
use crate::models::{DerivedMetrics, Dimension, GroupMetrics, Rankings, Record};

/// Groups smaller than this are left out of rankings.
pub const DEFAULT_MIN_SAMPLE: u64 = 3;

const TOP_COUNT: usize = 5;
const BOTTOM_COUNT: usize = 3;
const LEADER_COUNT: usize = 3;

fn by_desc<F>(key: F) -> impl Fn(&GroupMetrics, &GroupMetrics) -> Ordering
where
    F: Fn(&DerivedMetrics) -> f64,
{
    move |a: &GroupMetrics, b: &GroupMetrics| {
        key(&b.metrics)
            .partial_cmp(&key(&a.metrics))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    }
}

/// Best and worst groups of a dimension, ignoring groups below `min_sample`.
pub fn rank_groups(records: &[Record], dimension: Dimension, min_sample: u64) -> Rankings {
    let eligible: Vec<GroupMetrics> = aggregate_by(records, GroupBy::Category(dimension))
        .into_iter()
        .filter(|(_, metrics)| metrics.total >= min_sample)
        .map(|(name, metrics)| GroupMetrics { name, metrics })
        .collect();

    if eligible.is_empty() {
        return Rankings::default();
    }

    let mut by_conversion = eligible.clone();
    by_conversion.sort_by(by_desc(|m| m.conversion_rate));

    let mut by_ltv = eligible.clone();
    by_ltv.sort_by(by_desc(|m| m.avg_ltv));

    let mut by_volume = eligible;
    by_volume.sort_by(by_desc(|m| m.total as f64));

    let bottom = by_conversion
        .iter()
        .rev()
        .take(BOTTOM_COUNT)
        .cloned()
        .collect();

    Rankings {
        top: by_conversion.iter().take(TOP_COUNT).cloned().collect(),
        bottom,
        top_ltv: by_ltv.into_iter().take(LEADER_COUNT).collect(),
        top_volume: by_volume.into_iter().take(LEADER_COUNT).collect(),
    }
}
