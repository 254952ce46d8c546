//! Core types for the Synheart Zone training loop
//!
//! This module defines the data that flows between the sensor collaborator, the
//! session state machine, the adherence monitor and the post-workout analyzer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of heart-rate zones in a zone table
pub const ZONE_COUNT: usize = 5;

/// Zone index returned for readings outside every configured range
pub const UNCLASSIFIED_ZONE: u8 = 0;

/// A single heart-rate reading from the sensor collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    /// When the reading was taken (UTC)
    pub timestamp: DateTime<Utc>,
    /// Beats per minute
    pub bpm: f64,
}

impl HeartRateSample {
    pub fn new(timestamp: DateTime<Utc>, bpm: f64) -> Self {
        Self { timestamp, bpm }
    }

    /// A sample is usable when its bpm is a finite, non-negative number
    pub fn is_valid(&self) -> bool {
        self.bpm.is_finite() && self.bpm >= 0.0
    }
}

/// One delivery from the sensor collaborator.
///
/// Distance and energy are increments since the previous batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorBatch {
    #[serde(default)]
    pub heart_rate: Vec<HeartRateSample>,
    #[serde(default)]
    pub distance_meters: f64,
    #[serde(default)]
    pub active_energy_kcal: f64,
}

impl SensorBatch {
    pub fn heart_rate(samples: Vec<HeartRateSample>) -> Self {
        Self {
            heart_rate: samples,
            ..Default::default()
        }
    }
}

/// Workout lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Running,
    Paused,
    Ended,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "not_started",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Ended => "ended",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One continuous workout recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub state: SessionState,
    /// When `start()` was called
    pub start_time: DateTime<Utc>,
    /// When `end()` was called
    pub end_time: Option<DateTime<Utc>>,
    /// Zone the wearer should stay in (1-5)
    pub target_zone: u8,
    /// Recorded readings in non-decreasing timestamp order
    pub samples: Vec<HeartRateSample>,
    /// Accumulated distance (meters)
    pub distance_meters: f64,
    /// Accumulated active energy (kcal)
    pub active_energy_kcal: f64,
}

impl Session {
    pub fn new(target_zone: u8, start_time: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::Running,
            start_time,
            end_time: None,
            target_zone,
            samples: Vec::new(),
            distance_meters: 0.0,
            active_energy_kcal: 0.0,
        }
    }
}

/// Running pace derived from elapsed time and distance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pace {
    /// Distance is effectively zero; no meaningful pace
    NotMoving,
    /// Seconds needed per kilometer
    PerKilometer { seconds: f64 },
}

impl fmt::Display for Pace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pace::NotMoving => f.write_str("not moving"),
            Pace::PerKilometer { seconds } => {
                let total = seconds.round() as u64;
                write!(f, "{}:{:02} /km", total / 60, total % 60)
            }
        }
    }
}

/// Derived metrics recomputed on every sample batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMetrics {
    /// Most recent heart rate (bpm)
    pub heart_rate_bpm: Option<f64>,
    /// Zone of the most recent reading (0 = unclassified)
    pub current_zone: u8,
    /// Whether the current zone equals the target zone
    pub on_target: bool,
    /// Active (unpaused) session time in seconds
    pub elapsed_secs: f64,
    pub distance_meters: f64,
    /// Human-readable distance
    pub distance_display: String,
    pub pace: Pace,
    pub active_energy_kcal: f64,
}

impl Default for LiveMetrics {
    fn default() -> Self {
        Self {
            heart_rate_bpm: None,
            current_zone: UNCLASSIFIED_ZONE,
            on_target: false,
            elapsed_secs: 0.0,
            distance_meters: 0.0,
            distance_display: format_distance(0.0),
            pace: Pace::NotMoving,
            active_energy_kcal: 0.0,
        }
    }
}

/// Format a distance for display: meters below one kilometer, kilometers above
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.max(0.0).round() as u64)
    } else {
        format!("{:.2} km", meters / 1000.0)
    }
}

/// Per-zone sample counts and target-zone adherence for a sample series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSummary {
    /// Samples per zone, keyed 1-5 (every zone present)
    pub per_zone_count: BTreeMap<u8, u32>,
    /// Zone the percentage refers to
    pub target_zone: u8,
    /// Share of classified samples inside the target zone (0-100)
    pub target_zone_percentage: f64,
    /// Samples that fell into one of the five zones
    pub classified_samples: u32,
    /// Samples outside every zone
    pub unclassified_samples: u32,
}

impl ZoneSummary {
    /// Count for a zone (1-5); 0 for anything else
    pub fn count(&self, zone: u8) -> u32 {
        self.per_zone_count.get(&zone).copied().unwrap_or(0)
    }
}

/// Time spent in each zone, attributed from sample spacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeInZone {
    /// Seconds per zone, keyed 1-5
    pub seconds: BTreeMap<u8, f64>,
    /// Share of classified time per zone (0-100), keyed 1-5
    pub percentages: BTreeMap<u8, f64>,
    /// Total classified seconds
    pub total_seconds: f64,
}

/// Basic heart-rate statistics for a sample series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutStats {
    pub sample_count: usize,
    pub average_bpm: Option<f64>,
    pub max_bpm: Option<f64>,
    pub min_bpm: Option<f64>,
    pub duration_secs: f64,
}
