//! Workout finalization and report encoding
//!
//! When a session ends, its samples and the zone table in effect are handed to the
//! analyzer. The result, together with the flat metadata map consumed by history
//! views, forms a [`WorkoutReport`].

use crate::analyzer::{summarize, time_in_zone, workout_stats};
use crate::error::ComputeError;
use crate::types::{Session, TimeInZone, WorkoutStats, ZoneSummary};
use crate::zones::{ZoneTable, TARGET_ZONE_KEY};
use crate::{PRODUCER_NAME, ZONE_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Metadata key carrying the brand/source tag
pub const SOURCE_TAG_KEY: &str = "source";

/// Tag identifying workouts recorded by this engine
pub const SOURCE_TAG: &str = "synheart.zone";

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Everything known about a finished session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutReport {
    pub session: Session,
    /// Table in effect when the session ended
    pub zone_table: ZoneTable,
    /// Flat string map written alongside the stored workout
    pub metadata: BTreeMap<String, String>,
    pub summary: ZoneSummary,
    pub time_in_zone: TimeInZone,
    pub stats: WorkoutStats,
    /// Active (unpaused) duration in seconds
    pub active_duration_secs: f64,
}

impl WorkoutReport {
    /// Run the analyzer over a frozen session
    pub fn finalize(session: Session, zone_table: ZoneTable, active_duration_secs: f64) -> Self {
        let metadata = session_metadata(&zone_table, session.target_zone);
        let summary = summarize(&session.samples, &zone_table, session.target_zone);
        let time_in_zone = time_in_zone(&session.samples, &zone_table);
        let stats = workout_stats(&session.samples);
        Self {
            session,
            zone_table,
            metadata,
            summary,
            time_in_zone,
            stats,
            active_duration_secs,
        }
    }

    /// Recompute the summary against another table (e.g. after a zone edit)
    pub fn resummarize(&self, table: &ZoneTable) -> ZoneSummary {
        summarize(&self.session.samples, table, self.session.target_zone)
    }
}

/// `targetZone`, `zone{1..5}{Min,Max}` and the source tag
pub fn session_metadata(table: &ZoneTable, target_zone: u8) -> BTreeMap<String, String> {
    let mut metadata = table.to_metadata();
    metadata.insert(TARGET_ZONE_KEY.to_string(), target_zone.to_string());
    metadata.insert(SOURCE_TAG_KEY.to_string(), SOURCE_TAG.to_string());
    metadata
}

/// Whether a stored workout's metadata marks it as ours
pub fn is_own_workout(metadata: &BTreeMap<String, String>) -> bool {
    metadata.get(SOURCE_TAG_KEY).map(String::as_str) == Some(SOURCE_TAG)
}

/// Producer block of an encoded report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Serialized form of a workout report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: DateTime<Utc>,
    pub workout: WorkoutReport,
}

/// Encoder for workout reports
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn encode(&self, report: &WorkoutReport) -> EncodedReport {
        EncodedReport {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: ZONE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now(),
            workout: report.clone(),
        }
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(&self, report: &WorkoutReport) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(&self.encode(report)).map_err(ComputeError::JsonError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HeartRateSample, SessionState};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn finished_session() -> Session {
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 18, 0, 0).unwrap();
        let mut session = Session::new(2, start);
        session.samples = [120.0, 135.0, 140.0, 150.0]
            .iter()
            .enumerate()
            .map(|(i, bpm)| HeartRateSample::new(start + Duration::seconds(i as i64), *bpm))
            .collect();
        session.state = SessionState::Ended;
        session.end_time = Some(start + Duration::seconds(4));
        session
    }

    fn table() -> ZoneTable {
        ZoneTable::from_ranges(
            [(0, 131), (132, 144), (145, 156), (157, 167), (168, 220)],
            220,
        )
        .unwrap()
    }

    #[test]
    fn test_metadata_contents() {
        let metadata = session_metadata(&table(), 4);
        assert_eq!(metadata.len(), 12);
        assert_eq!(metadata["targetZone"], "4");
        assert_eq!(metadata["zone3Max"], "156");
        assert!(is_own_workout(&metadata));

        let mut foreign = metadata.clone();
        foreign.insert(SOURCE_TAG_KEY.to_string(), "other.app".to_string());
        assert!(!is_own_workout(&foreign));
    }

    #[test]
    fn test_finalize_runs_analyzer() {
        let report = WorkoutReport::finalize(finished_session(), table(), 4.0);
        assert_eq!(report.summary.count(2), 2);
        assert!((report.summary.target_zone_percentage - 50.0).abs() < 1e-9);
        assert_eq!(report.stats.sample_count, 4);
        assert_eq!(report.time_in_zone.total_seconds, 3.0);

        let wider = ZoneTable::from_ranges(
            [(0, 100), (101, 144), (145, 156), (157, 167), (168, 220)],
            220,
        )
        .unwrap();
        assert!((report.resummarize(&wider).target_zone_percentage - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_encode_to_json() {
        let report = WorkoutReport::finalize(finished_session(), table(), 4.0);
        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());
        let json = encoder.encode_to_json(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["report_version"], "1.0.0");
        assert_eq!(value["producer"]["name"], "synheart-zone");
        assert_eq!(value["producer"]["instance_id"], "test-instance");
        assert_eq!(value["workout"]["metadata"]["source"], "synheart.zone");
        assert_eq!(value["workout"]["session"]["state"], "ended");
        assert_eq!(value["workout"]["summary"]["per_zone_count"]["2"], 2);
    }
}
