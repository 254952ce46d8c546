//! Workout session state machine
//!
//! `NotStarted -> Running <-> Paused -> Ended`. The state machine owns the live
//! [`Session`], the sensor subscription and the adherence monitor. Metrics are
//! recomputed whenever a sample batch arrives, never on a clock.

use crate::config::{TrainerConfig, ZoneTableHandle};
use crate::error::{SessionError, ZoneError};
use crate::haptics::Haptic;
use crate::monitor::{AdherenceMonitor, SessionClock};
use crate::report::WorkoutReport;
use crate::sensor::{SensorEvent, SensorSource, SensorSubscription};
use crate::types::{
    format_distance, LiveMetrics, Pace, SensorBatch, Session, SessionState, UNCLASSIFIED_ZONE,
};
use crate::zones::{classify, is_valid_zone};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Drives one workout from start to finalization
pub struct SessionStateMachine {
    sensor: Arc<dyn SensorSource>,
    haptic: Arc<dyn Haptic>,
    zones: ZoneTableHandle,
    config: TrainerConfig,
    state: SessionState,
    session: Option<Session>,
    subscription: Option<SensorSubscription>,
    monitor: Option<AdherenceMonitor>,
    clock: SessionClock,
    on_target: watch::Sender<bool>,
    metrics: watch::Sender<LiveMetrics>,
    report: Option<WorkoutReport>,
}

impl SessionStateMachine {
    pub fn new(
        sensor: Arc<dyn SensorSource>,
        haptic: Arc<dyn Haptic>,
        zones: ZoneTableHandle,
        config: TrainerConfig,
    ) -> Self {
        let (on_target, _) = watch::channel(false);
        let (metrics, _) = watch::channel(LiveMetrics::default());
        Self {
            sensor,
            haptic,
            zones,
            config,
            state: SessionState::NotStarted,
            session: None,
            subscription: None,
            monitor: None,
            clock: SessionClock::new(),
            on_target,
            metrics,
            report: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Latest derived metrics
    pub fn metrics(&self) -> LiveMetrics {
        self.metrics.borrow().clone()
    }

    /// Receiver updated after every processed batch
    pub fn subscribe_metrics(&self) -> watch::Receiver<LiveMetrics> {
        self.metrics.subscribe()
    }

    /// Receiver for the adherence flag
    pub fn subscribe_on_target(&self) -> watch::Receiver<bool> {
        self.on_target.subscribe()
    }

    /// Report produced by `end()`
    pub fn report(&self) -> Option<&WorkoutReport> {
        self.report.as_ref()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.as_ref().is_some_and(AdherenceMonitor::is_running)
    }

    /// Begin a workout targeting `target_zone` (1-5).
    ///
    /// Must be called from within a tokio runtime; the adherence monitor runs as a
    /// background task.
    pub fn start(&mut self, target_zone: u8) -> Result<(), SessionError> {
        if self.state != SessionState::NotStarted {
            return Err(self.invalid("start"));
        }
        if !is_valid_zone(target_zone) {
            return Err(ZoneError::InvalidZoneIndex(target_zone).into());
        }

        let subscription = self.sensor.subscribe()?;
        debug!(subscription = %subscription.id(), "Sensor subscription opened");

        self.session = Some(Session::new(target_zone, Utc::now()));
        self.subscription = Some(subscription);
        self.clock.resume();

        let mut monitor = AdherenceMonitor::new(
            self.config.monitor.clone(),
            self.clock.clone(),
            self.on_target.subscribe(),
            Arc::clone(&self.haptic),
        );
        monitor.start();
        self.monitor = Some(monitor);

        self.state = SessionState::Running;
        self.publish(LiveMetrics::default());
        info!(target_zone, "Workout session started");
        Ok(())
    }

    /// Suspend metric updates and the adherence timer. No-op when already paused.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Running => {
                self.clock.pause();
                if let Some(monitor) = self.monitor.as_mut() {
                    monitor.stop();
                }
                self.set_state(SessionState::Paused);
                info!(elapsed_secs = self.clock.elapsed().as_secs(), "Workout session paused");
                Ok(())
            }
            SessionState::Paused => Ok(()),
            _ => Err(self.invalid("pause")),
        }
    }

    /// Continue a paused session. No-op when already running.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Paused => {
                self.clock.resume();
                if let Some(monitor) = self.monitor.as_mut() {
                    monitor.start();
                }
                self.set_state(SessionState::Running);
                info!(elapsed_secs = self.clock.elapsed().as_secs(), "Workout session resumed");
                Ok(())
            }
            SessionState::Running => Ok(()),
            _ => Err(self.invalid("resume")),
        }
    }

    /// Finish the workout and produce its report.
    ///
    /// Returns the report on the first call. Calling `end()` on an ended session
    /// is a no-op and returns `None`.
    pub fn end(&mut self) -> Result<Option<&WorkoutReport>, SessionError> {
        match self.state {
            SessionState::Running | SessionState::Paused => {}
            SessionState::Ended => return Ok(None),
            SessionState::NotStarted => return Err(self.invalid("end")),
        }

        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
            debug!(subscription = %subscription.id(), "Sensor subscription closed");
        }
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        self.clock.pause();
        self.on_target.send_replace(false);
        self.state = SessionState::Ended;

        let Some(mut session) = self.session.take() else {
            return Ok(None);
        };
        session.state = SessionState::Ended;
        session.end_time = Some(Utc::now());

        let table = self.zones.snapshot();
        let active_secs = self.clock.elapsed().as_secs_f64();
        let report = WorkoutReport::finalize(session.clone(), (*table).clone(), active_secs);
        info!(
            samples = session.samples.len(),
            target_zone = session.target_zone,
            target_zone_pct = report.summary.target_zone_percentage,
            "Workout session ended"
        );
        self.session = Some(session);
        self.report = Some(report);
        Ok(self.report.as_ref())
    }

    /// Wait for the next sensor event and apply it.
    ///
    /// Returns `false` once there is no open subscription or the sensor side has
    /// closed it.
    pub async fn process_next(&mut self) -> bool {
        let event = match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => return false,
        };
        match event {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => {
                debug!("Sensor subscription ended by sensor");
                false
            }
        }
    }

    /// Apply every event already buffered on the subscription
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.subscription.as_mut().and_then(SensorSubscription::try_recv) {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Apply one sensor event. Faults are logged and leave metrics untouched.
    pub fn handle_event(&mut self, event: SensorEvent) {
        match event {
            SensorEvent::Batch(batch) => {
                self.handle_batch(batch);
            }
            SensorEvent::Fault(error) => {
                warn!(error = %error, "Sensor fault, keeping last known metrics");
            }
        }
    }

    /// Record a batch and recompute metrics. Returns the number of heart-rate
    /// samples accepted.
    ///
    /// Batches are ignored unless the session is running. Invalid readings and
    /// readings older than the last recorded one are dropped.
    pub fn handle_batch(&mut self, batch: SensorBatch) -> usize {
        if self.state != SessionState::Running {
            debug!(state = %self.state, "Ignoring sample batch outside a running session");
            return 0;
        }
        let Some(session) = self.session.as_mut() else {
            return 0;
        };

        let mut accepted = 0;
        for sample in batch.heart_rate {
            if !sample.is_valid() {
                warn!(bpm = sample.bpm, "Dropping invalid heart-rate sample");
                continue;
            }
            if let Some(last) = session.samples.last() {
                if sample.timestamp < last.timestamp {
                    warn!(
                        timestamp = %sample.timestamp,
                        last = %last.timestamp,
                        "Dropping out-of-order heart-rate sample"
                    );
                    continue;
                }
            }
            session.samples.push(sample);
            accepted += 1;
        }
        if batch.distance_meters.is_finite() && batch.distance_meters > 0.0 {
            session.distance_meters += batch.distance_meters;
        }
        if batch.active_energy_kcal.is_finite() && batch.active_energy_kcal > 0.0 {
            session.active_energy_kcal += batch.active_energy_kcal;
        }

        self.recompute_metrics();
        accepted
    }

    fn recompute_metrics(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let table = self.zones.snapshot();
        let heart_rate_bpm = session.samples.last().map(|s| s.bpm);
        let current_zone = heart_rate_bpm.map_or(UNCLASSIFIED_ZONE, |bpm| classify(bpm, &table));
        let on_target = current_zone == session.target_zone;
        let elapsed_secs = self.clock.elapsed().as_secs_f64();

        let metrics = LiveMetrics {
            heart_rate_bpm,
            current_zone,
            on_target,
            elapsed_secs,
            distance_meters: session.distance_meters,
            distance_display: format_distance(session.distance_meters),
            pace: pace(
                elapsed_secs,
                session.distance_meters,
                self.config.not_moving_threshold_meters,
            ),
            active_energy_kcal: session.active_energy_kcal,
        };

        self.on_target.send_if_modified(|current| {
            let changed = *current != on_target;
            *current = on_target;
            changed
        });
        self.publish(metrics);
    }

    fn publish(&self, metrics: LiveMetrics) {
        self.metrics.send_replace(metrics);
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        if let Some(session) = self.session.as_mut() {
            session.state = state;
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            state: self.state.as_str(),
        }
    }
}

impl Drop for SessionStateMachine {
    fn drop(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }
}

/// Seconds per kilometer, or `NotMoving` below the distance threshold
pub fn pace(elapsed_secs: f64, distance_meters: f64, not_moving_threshold_meters: f64) -> Pace {
    if !distance_meters.is_finite() || distance_meters < not_moving_threshold_meters.max(f64::EPSILON) {
        return Pace::NotMoving;
    }
    Pace::PerKilometer {
        seconds: elapsed_secs / (distance_meters / 1000.0),
    }
}
