//! Post-workout zone analysis
//!
//! Every function here is pure and recomputes its result from the full sample
//! series, so a summary computed live and one recomputed later never drift apart.

use crate::types::{
    HeartRateSample, TimeInZone, WorkoutStats, ZoneSummary, UNCLASSIFIED_ZONE,
};
use crate::zones::{classify, ZoneTable, ZONE_SPECS};
use std::collections::BTreeMap;

/// Longest interval (seconds) a single sample may account for in time-in-zone
pub const MAX_SAMPLE_GAP_SECS: f64 = 10.0;

/// Per-zone sample counts and the share of classified samples in `target_zone`.
///
/// Unclassified samples (zone 0) count toward no zone and are excluded from the
/// denominator. With no classified samples the percentage is 0.
pub fn summarize(samples: &[HeartRateSample], table: &ZoneTable, target_zone: u8) -> ZoneSummary {
    let mut per_zone_count: BTreeMap<u8, u32> =
        ZONE_SPECS.iter().map(|spec| (spec.zone, 0)).collect();
    let mut unclassified_samples = 0u32;

    for sample in samples {
        let zone = classify(sample.bpm, table);
        match per_zone_count.get_mut(&zone) {
            Some(count) => *count += 1,
            None => unclassified_samples += 1,
        }
    }

    let classified_samples: u32 = per_zone_count.values().sum();
    let in_target = per_zone_count.get(&target_zone).copied().unwrap_or(0);
    let target_zone_percentage = if classified_samples == 0 {
        0.0
    } else {
        f64::from(in_target) / f64::from(classified_samples) * 100.0
    };

    ZoneSummary {
        per_zone_count,
        target_zone,
        target_zone_percentage,
        classified_samples,
        unclassified_samples,
    }
}

/// Seconds spent in each zone.
///
/// Each sample owns the interval until the next sample, capped at
/// [`MAX_SAMPLE_GAP_SECS`]; the last sample owns nothing. Samples are expected in
/// non-decreasing timestamp order; negative gaps count as zero.
pub fn time_in_zone(samples: &[HeartRateSample], table: &ZoneTable) -> TimeInZone {
    let mut seconds: BTreeMap<u8, f64> = ZONE_SPECS.iter().map(|spec| (spec.zone, 0.0)).collect();

    for pair in samples.windows(2) {
        let zone = classify(pair[0].bpm, table);
        if zone == UNCLASSIFIED_ZONE {
            continue;
        }
        let gap = (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 1000.0;
        if let Some(total) = seconds.get_mut(&zone) {
            *total += gap.clamp(0.0, MAX_SAMPLE_GAP_SECS);
        }
    }

    let total_seconds: f64 = seconds.values().sum();
    let percentages = seconds
        .iter()
        .map(|(zone, secs)| {
            let pct = if total_seconds > 0.0 {
                secs / total_seconds * 100.0
            } else {
                0.0
            };
            (*zone, pct)
        })
        .collect();

    TimeInZone {
        seconds,
        percentages,
        total_seconds,
    }
}

/// Average, max and min heart rate plus covered duration
pub fn workout_stats(samples: &[HeartRateSample]) -> WorkoutStats {
    let valid: Vec<f64> = samples
        .iter()
        .filter(|s| s.is_valid())
        .map(|s| s.bpm)
        .collect();

    let average_bpm = if valid.is_empty() {
        None
    } else {
        Some(valid.iter().sum::<f64>() / valid.len() as f64)
    };
    let max_bpm = valid.iter().copied().reduce(f64::max);
    let min_bpm = valid.iter().copied().reduce(f64::min);

    let duration_secs = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => {
            ((last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0).max(0.0)
        }
        _ => 0.0,
    };

    WorkoutStats {
        sample_count: samples.len(),
        average_bpm,
        max_bpm,
        min_bpm,
        duration_secs,
    }
}
