//! Haptic adherence monitor
//!
//! While a session runs, a background timer checks once per `frequency` whether
//! the wearer is outside the target zone and, if so, fires one haptic pulse.
//!
//! All timing is measured in active session time. Pausing freezes the clock, so
//! the initial delay window and the spacing since the last pulse both resume
//! where they left off instead of restarting or catching up.

use crate::config::MonitorSettings;
use crate::haptics::Haptic;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Stopwatch over active (unpaused) session time
#[derive(Debug, Clone, Default)]
pub struct ActiveClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl ActiveClock {
    /// Start or resume counting. No-op if already running.
    pub fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Stop counting, keeping the time accumulated so far. No-op if stopped.
    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Active time as of `now`
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + now.saturating_duration_since(since),
            None => self.accumulated,
        }
    }
}

/// Clock shared between the session state machine and the monitor task
#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    inner: Arc<Mutex<ActiveClock>>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resume(&self) {
        self.lock().resume(Instant::now());
    }

    pub fn pause(&self) {
        self.lock().pause(Instant::now());
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_running()
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed(Instant::now())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ActiveClock> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pulse decision state, kept across stop/start of the timer task
#[derive(Debug, Clone)]
pub struct AdherenceGate {
    delay: Duration,
    frequency: Duration,
    last_pulse: Option<Duration>,
}

impl AdherenceGate {
    pub fn new(delay: Duration, frequency: Duration) -> Self {
        Self {
            delay,
            frequency,
            last_pulse: None,
        }
    }

    /// Decide whether to pulse at active time `elapsed`; records the pulse if so
    pub fn should_pulse(&mut self, elapsed: Duration, on_target: bool) -> bool {
        if on_target || elapsed < self.delay {
            return false;
        }
        let spaced = self
            .last_pulse
            .map_or(true, |last| elapsed.saturating_sub(last) >= self.frequency);
        if spaced {
            self.last_pulse = Some(elapsed);
        }
        spaced
    }

    /// Active time of the most recent pulse
    pub fn last_pulse(&self) -> Option<Duration> {
        self.last_pulse
    }
}

struct RunningTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodic off-target haptic reminder for one session
pub struct AdherenceMonitor {
    settings: MonitorSettings,
    clock: SessionClock,
    on_target: watch::Receiver<bool>,
    haptic: Arc<dyn Haptic>,
    gate: Arc<Mutex<AdherenceGate>>,
    task: Option<RunningTask>,
}

impl AdherenceMonitor {
    pub fn new(
        settings: MonitorSettings,
        clock: SessionClock,
        on_target: watch::Receiver<bool>,
        haptic: Arc<dyn Haptic>,
    ) -> Self {
        let gate = AdherenceGate::new(settings.delay(), settings.frequency());
        Self {
            settings,
            clock,
            on_target,
            haptic,
            gate: Arc::new(Mutex::new(gate)),
            task: None,
        }
    }

    /// Spawn the timer task. The first check happens one full period after the
    /// call, never immediately. No-op when disabled or already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if !self.settings.enabled || self.is_running() {
            return;
        }
        let period = self.settings.frequency();
        let Some(first_tick) = Instant::now().checked_add(period) else {
            warn!(period_secs = period.as_secs(), "Monitor frequency out of range, not starting");
            return;
        };
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let clock = self.clock.clone();
        let on_target = self.on_target.clone();
        let haptic = Arc::clone(&self.haptic);
        let gate = Arc::clone(&self.gate);

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !clock.is_running() {
                            continue;
                        }
                        let elapsed = clock.elapsed();
                        let adhering = *on_target.borrow();
                        let fire = gate
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .should_pulse(elapsed, adhering);
                        if fire {
                            info!(elapsed_secs = elapsed.as_secs(), "Off target, sending haptic pulse");
                            haptic.pulse();
                        }
                    }
                    _ = &mut shutdown_rx => {
                        debug!("Adherence monitor received shutdown signal");
                        break;
                    }
                }
            }
        });

        debug!(period_secs = period.as_secs(), "Adherence monitor started");
        self.task = Some(RunningTask { shutdown, handle });
    }

    /// Stop the timer task. Idempotent; pulse history is kept for a later start.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            // The receiver is gone only if the task already ended
            let _ = task.shutdown.send(());
            task.handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Active time of the most recent pulse
    pub fn last_pulse(&self) -> Option<Duration> {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_pulse()
    }
}

impl Drop for AdherenceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
