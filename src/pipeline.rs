//! JSON entry points and session replay
//!
//! Stateless helpers shared by the FFI layer and the `zone` CLI, plus
//! [`replay`], which drives recorded samples through a live
//! [`SessionStateMachine`] as if they were arriving from the sensor.

use crate::analyzer::{summarize, time_in_zone, workout_stats};
use crate::config::{MonitorSettings, TrainerConfig, ZoneTableHandle};
use crate::error::{ComputeError, ZoneError};
use crate::haptics::Haptic;
use crate::report::WorkoutReport;
use crate::sensor::ChannelSensor;
use crate::session::SessionStateMachine;
use crate::types::{HeartRateSample, SensorBatch, TimeInZone, WorkoutStats, ZoneSummary};
use crate::zones::{is_valid_zone, ZoneTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Post-workout analysis of a sample set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneAnalysis {
    pub summary: ZoneSummary,
    pub time_in_zone: TimeInZone,
    pub stats: WorkoutStats,
}

/// Summary, time-in-zone and stats in one pass over the inputs
pub fn analyze(samples: &[HeartRateSample], table: &ZoneTable, target_zone: u8) -> ZoneAnalysis {
    ZoneAnalysis {
        summary: summarize(samples, table, target_zone),
        time_in_zone: time_in_zone(samples, table),
        stats: workout_stats(samples),
    }
}

/// One line of a recorded workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub timestamp: DateTime<Utc>,
    pub bpm: f64,
    /// Distance covered since the previous record
    #[serde(default)]
    pub distance_meters: f64,
    /// Energy burned since the previous record
    #[serde(default)]
    pub active_energy_kcal: f64,
}

impl ReplayRecord {
    fn into_batch(self) -> SensorBatch {
        SensorBatch {
            heart_rate: vec![HeartRateSample::new(self.timestamp, self.bpm)],
            distance_meters: self.distance_meters,
            active_energy_kcal: self.active_energy_kcal,
        }
    }
}

/// Parse newline-delimited JSON records, skipping blank lines
pub fn parse_records_ndjson(text: &str) -> Result<Vec<ReplayRecord>, ComputeError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| ComputeError::ParseError(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

/// Parse samples given either as a JSON array or as NDJSON records
pub fn parse_samples(text: &str) -> Result<Vec<HeartRateSample>, ComputeError> {
    if text.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(text)?);
    }
    Ok(parse_records_ndjson(text)?
        .into_iter()
        .map(|r| HeartRateSample::new(r.timestamp, r.bpm))
        .collect())
}

/// Parse a zone table from JSON, or the default table when none is given
pub fn parse_table(table_json: Option<&str>) -> Result<ZoneTable, ComputeError> {
    match table_json {
        Some(json) => Ok(serde_json::from_str(json)?),
        None => Ok(ZoneTable::default()),
    }
}

fn check_target_zone(target_zone: u8) -> Result<(), ComputeError> {
    if is_valid_zone(target_zone) {
        Ok(())
    } else {
        Err(ZoneError::InvalidZoneIndex(target_zone).into())
    }
}

/// Analyze samples and return the [`ZoneAnalysis`] as JSON
pub fn summarize_to_json(
    samples_json: &str,
    table_json: Option<&str>,
    target_zone: u8,
) -> Result<String, ComputeError> {
    check_target_zone(target_zone)?;
    let samples = parse_samples(samples_json)?;
    let table = parse_table(table_json)?;
    Ok(serde_json::to_string(&analyze(&samples, &table, target_zone))?)
}

/// Standard table for a maximum heart rate, as JSON
pub fn default_table_json(max_heart_rate: u16) -> Result<String, ComputeError> {
    if max_heart_rate == 0 {
        return Err(ZoneError::InvalidMaxHeartRate(max_heart_rate).into());
    }
    Ok(serde_json::to_string(&ZoneTable::from_max_heart_rate(
        max_heart_rate,
    ))?)
}

/// Scale the monitor timings down for replay at `speed`x
fn scaled_monitor(settings: &MonitorSettings, speed: f64) -> MonitorSettings {
    let scale = |secs: u64| (secs as f64 / speed).round() as u64;
    MonitorSettings {
        enabled: settings.enabled,
        delay_secs: scale(settings.delay_secs),
        frequency_secs: scale(settings.frequency_secs).max(1),
    }
}

/// Drive recorded samples through a full session and return its report.
///
/// Gaps between records are slept for `gap / speed`, and the adherence monitor's
/// delay and frequency are scaled by the same factor, so haptic pulses fire
/// where they would have during the real workout. The report's active duration
/// is scaled back up to recorded time. Live pace is computed from replay time.
pub async fn replay(
    records: Vec<ReplayRecord>,
    table: ZoneTable,
    target_zone: u8,
    config: TrainerConfig,
    speed: f64,
    haptic: Arc<dyn Haptic>,
) -> Result<WorkoutReport, ComputeError> {
    check_target_zone(target_zone)?;
    if !(speed.is_finite() && speed > 0.0) {
        return Err(ComputeError::ParseError(format!(
            "replay speed must be positive, got {speed}"
        )));
    }

    let config = TrainerConfig {
        monitor: scaled_monitor(&config.monitor, speed),
        ..config
    };
    let sensor = Arc::new(ChannelSensor::new());
    let mut machine =
        SessionStateMachine::new(sensor.clone(), haptic, ZoneTableHandle::new(table), config);
    machine.start(target_zone)?;
    info!(records = records.len(), speed, target_zone, "Replaying workout");

    let mut previous: Option<DateTime<Utc>> = None;
    for record in records {
        if let Some(prev) = previous {
            let gap = (record.timestamp - prev).to_std().unwrap_or(Duration::ZERO);
            let scaled = Duration::try_from_secs_f64(gap.as_secs_f64() / speed).map_err(|e| {
                ComputeError::ParseError(format!("replay gap {gap:?} at speed {speed}: {e}"))
            })?;
            tokio::time::sleep(scaled).await;
        }
        previous = Some(record.timestamp);

        if !sensor.deliver(record.into_batch()) {
            debug!("Replay batch not accepted by sensor channel");
        }
        machine.process_pending();
    }

    let mut report = machine
        .end()?
        .cloned()
        .ok_or_else(|| ComputeError::ParseError("session produced no report".to_string()))?;
    report.active_duration_secs *= speed;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::haptics::CountingHaptic;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use pretty_assertions::assert_eq;

    fn records(bpms: &[f64]) -> Vec<ReplayRecord> {
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 7, 0, 0).unwrap();
        bpms.iter()
            .enumerate()
            .map(|(i, bpm)| ReplayRecord {
                timestamp: start + ChronoDuration::seconds(i as i64),
                bpm: *bpm,
                distance_meters: 3.0,
                active_energy_kcal: 0.1,
            })
            .collect()
    }

    fn reference_table() -> ZoneTable {
        ZoneTable::from_ranges(
            [(0, 131), (132, 144), (145, 156), (157, 167), (168, 220)],
            220,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_samples_array_and_ndjson() {
        let array = r#"[{"timestamp":"2024-06-03T07:00:00Z","bpm":140.0}]"#;
        assert_eq!(parse_samples(array).unwrap().len(), 1);

        let ndjson = "{\"timestamp\":\"2024-06-03T07:00:00Z\",\"bpm\":140}\n\n{\"timestamp\":\"2024-06-03T07:00:01Z\",\"bpm\":141,\"distance_meters\":2.5}\n";
        let samples = parse_samples(ndjson).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].bpm, 141.0);

        let err = parse_records_ndjson("{\"bpm\":1}\nnope").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_summarize_to_json() {
        let samples = r#"[
            {"timestamp":"2024-06-03T07:00:00Z","bpm":150.0},
            {"timestamp":"2024-06-03T07:00:01Z","bpm":151.0},
            {"timestamp":"2024-06-03T07:00:02Z","bpm":120.0},
            {"timestamp":"2024-06-03T07:00:03Z","bpm":400.0}
        ]"#;
        let table = serde_json::to_string(&reference_table()).unwrap();
        let json = summarize_to_json(samples, Some(&table), 3).unwrap();
        let analysis: ZoneAnalysis = serde_json::from_str(&json).unwrap();

        assert_eq!(analysis.summary.classified_samples, 3);
        assert_eq!(analysis.summary.unclassified_samples, 1);
        assert_eq!(analysis.summary.count(3), 2);
        assert_eq!(analysis.stats.sample_count, 4);

        assert!(summarize_to_json(samples, None, 0).is_err());
        assert!(summarize_to_json("{", None, 3).is_err());
    }

    #[test]
    fn test_default_table_json() {
        let json = default_table_json(200).unwrap();
        let table: ZoneTable = serde_json::from_str(&json).unwrap();
        assert_eq!(table.max_heart_rate(), 200);
        assert!(default_table_json(0).is_err());
    }

    #[test]
    fn test_scaled_monitor() {
        let settings = MonitorSettings {
            enabled: true,
            delay_secs: 120,
            frequency_secs: 30,
        };
        let scaled = scaled_monitor(&settings, 60.0);
        assert_eq!(scaled.delay_secs, 2);
        assert_eq!(scaled.frequency_secs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_produces_report_and_pulses() {
        let haptic = Arc::new(CountingHaptic::new());
        let config = TrainerConfig {
            monitor: MonitorSettings {
                enabled: true,
                delay_secs: 2,
                frequency_secs: 2,
            },
            ..Default::default()
        };
        let report = replay(
            records(&[120.0; 10]),
            reference_table(),
            3,
            config,
            1.0,
            haptic.clone(),
        )
        .await
        .unwrap();

        assert_eq!(report.session.samples.len(), 10);
        assert_eq!(report.summary.count(1), 10);
        assert_eq!(report.summary.target_zone_percentage, 0.0);
        assert!((report.session.distance_meters - 30.0).abs() < 1e-9);
        assert!(haptic.count() >= 3, "off target for 9 s with 2 s frequency");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_rejects_bad_arguments() {
        let haptic = Arc::new(CountingHaptic::new());
        let bad_zone = replay(
            records(&[140.0]),
            reference_table(),
            6,
            TrainerConfig::default(),
            1.0,
            haptic.clone(),
        )
        .await;
        assert!(bad_zone.is_err());

        let bad_speed = replay(
            records(&[140.0]),
            reference_table(),
            2,
            TrainerConfig::default(),
            0.0,
            haptic,
        )
        .await;
        assert!(bad_speed.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_rejects_speed_too_small_to_sleep() {
        let result = replay(
            records(&[140.0, 141.0]),
            reference_table(),
            2,
            TrainerConfig::default(),
            1e-300,
            Arc::new(CountingHaptic::new()),
        )
        .await;
        assert!(matches!(result, Err(ComputeError::ParseError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_duration_is_in_recorded_time() {
        let report = replay(
            records(&[140.0; 10]),
            reference_table(),
            2,
            TrainerConfig::default(),
            2.0,
            Arc::new(CountingHaptic::new()),
        )
        .await
        .unwrap();
        assert!(
            (report.active_duration_secs - 9.0).abs() < 1e-3,
            "got {}",
            report.active_duration_secs
        );
    }
}
