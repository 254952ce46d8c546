//! End-to-end tests of the live training loop: sensor, session, monitor and sync

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use synheart_zone::config::{InMemoryConfigStore, MonitorSettings, SyncSettings};
use synheart_zone::haptics::CountingHaptic;
use synheart_zone::report::{is_own_workout, ReportEncoder};
use synheart_zone::sensor::ChannelSensor;
use synheart_zone::sync::MemoryTransport;
use synheart_zone::{
    ConfigStore, ConfigSyncChannel, ConfigSyncReceiver, DeliveryReport, HeartRateSample,
    SensorBatch, SensorError, SessionState, SessionStateMachine, TrainerConfig, ZoneTable,
    ZoneTableHandle,
};
use tokio::time::sleep;

fn reference_table() -> ZoneTable {
    ZoneTable::from_ranges(
        [(0, 131), (132, 144), (145, 156), (157, 167), (168, 220)],
        220,
    )
    .unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_717_400_000, 0).unwrap() + ChronoDuration::seconds(secs)
}

fn hr(secs: i64, bpm: f64) -> SensorBatch {
    SensorBatch::heart_rate(vec![HeartRateSample::new(at(secs), bpm)])
}

fn config(delay_secs: u64, frequency_secs: u64) -> TrainerConfig {
    TrainerConfig {
        monitor: MonitorSettings {
            enabled: true,
            delay_secs,
            frequency_secs,
        },
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn synced_boundaries_apply_to_running_session() {
    let (transport, incoming) = MemoryTransport::pair();
    let store = Arc::new(InMemoryConfigStore::new());
    reference_table().write_to_store(store.as_ref());
    let zones = ZoneTableHandle::new(reference_table());
    let mut table_updates = zones.subscribe();

    let receiver = Arc::new(ConfigSyncReceiver::new(store.clone(), zones.clone()));
    let listener = receiver.spawn_listener(incoming);
    let (mut channel, mut reports) =
        ConfigSyncChannel::spawn(Arc::new(transport), SyncSettings::default());

    let sensor = Arc::new(ChannelSensor::new());
    let haptic = Arc::new(CountingHaptic::new());
    let mut machine = SessionStateMachine::new(sensor.clone(), haptic, zones.clone(), config(120, 30));
    machine.start(2).unwrap();

    sensor.deliver(hr(0, 150.0));
    assert!(machine.process_next().await);
    assert_eq!(machine.metrics().current_zone, 3);
    assert!(!machine.metrics().on_target);

    channel.send("zone2Max", "150").unwrap();
    channel.send("zone3Min", "151").unwrap();
    for _ in 0..2 {
        assert!(matches!(
            reports.recv().await,
            Some(DeliveryReport::Delivered { .. })
        ));
    }
    table_updates.changed().await.unwrap();
    assert_eq!(zones.snapshot().zone(2).unwrap().max, 150);

    sensor.deliver(hr(1, 150.0));
    assert!(machine.process_next().await);
    assert_eq!(machine.metrics().current_zone, 2);
    assert!(machine.metrics().on_target);

    let report = machine.end().unwrap().unwrap();
    assert_eq!(report.metadata["zone2Max"], "150");
    assert_eq!(report.metadata["zone3Min"], "151");
    assert_eq!(report.summary.count(2), 2, "summary uses the table in effect at end");

    channel.shutdown().await;
    drop(channel);
    // The transport (and its sender half) went away with the channel task
    listener.await.unwrap();
    assert_eq!(store.get("zone2Max").as_deref(), Some("150"));
}

#[tokio::test(start_paused = true)]
async fn pause_extends_the_monitor_delay() {
    let sensor = Arc::new(ChannelSensor::new());
    let haptic = Arc::new(CountingHaptic::new());
    let mut machine = SessionStateMachine::new(
        sensor.clone(),
        haptic.clone(),
        ZoneTableHandle::new(reference_table()),
        config(60, 10),
    );
    machine.start(3).unwrap();
    machine.handle_batch(hr(0, 120.0));

    sleep(Duration::from_secs(35)).await;
    machine.pause().unwrap();
    sleep(Duration::from_secs(3600)).await;
    assert_eq!(haptic.count(), 0);

    machine.resume().unwrap();
    sleep(Duration::from_secs(15)).await;
    assert_eq!(haptic.count(), 0, "resume never pulses before the delay is reached");

    sleep(Duration::from_secs(20)).await;
    assert_eq!(haptic.count(), 1);

    machine.end().unwrap();
    sleep(Duration::from_secs(600)).await;
    assert_eq!(haptic.count(), 1, "monitor stops with the session");
}

#[tokio::test(start_paused = true)]
async fn on_target_wearer_gets_no_pulses() {
    let sensor = Arc::new(ChannelSensor::new());
    let haptic = Arc::new(CountingHaptic::new());
    let mut machine = SessionStateMachine::new(
        sensor.clone(),
        haptic.clone(),
        ZoneTableHandle::new(reference_table()),
        config(0, 5),
    );
    machine.start(3).unwrap();

    for i in 0..30 {
        sensor.deliver(hr(i, 150.0));
        machine.process_pending();
        sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(haptic.count(), 0);
    machine.end().unwrap();
}

#[tokio::test]
async fn full_workout_produces_tagged_report() {
    let sensor = Arc::new(ChannelSensor::new());
    let haptic = Arc::new(CountingHaptic::new());
    let mut machine = SessionStateMachine::new(
        sensor.clone(),
        haptic,
        ZoneTableHandle::new(reference_table()),
        config(120, 30),
    );
    assert_eq!(machine.state(), SessionState::NotStarted);
    machine.start(3).unwrap();

    let bpms = [150.0, 152.0, 149.0, 160.0, 130.0, 146.0, 155.0, 170.0, 145.0, 157.0];
    for (i, bpm) in bpms.iter().enumerate() {
        sensor.deliver(SensorBatch {
            heart_rate: vec![HeartRateSample::new(at(i as i64), *bpm)],
            distance_meters: 25.0,
            active_energy_kcal: 0.5,
        });
        if i == 4 {
            sensor.fail(SensorError::QueryFailed("watch disconnected".into()));
        }
    }
    while machine.process_pending() > 0 {}
    assert_eq!(machine.state(), SessionState::Running);
    assert_eq!(machine.metrics().distance_display, "250 m");

    let report = machine.end().unwrap().unwrap().clone();
    assert!(machine.end().unwrap().is_none());
    assert_eq!(machine.report().unwrap().session.end_time, report.session.end_time);

    assert_eq!(report.session.samples.len(), 10);
    assert!((report.summary.target_zone_percentage - 60.0).abs() < 1e-9);
    assert!(is_own_workout(&report.metadata));
    assert_eq!(report.metadata["targetZone"], "3");

    let json = ReportEncoder::with_instance_id("it".into())
        .encode_to_json(&report)
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["workout"]["summary"]["target_zone"], 3);

    assert!(!sensor.deliver(hr(20, 150.0)));
}
