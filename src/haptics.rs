//! Haptic actuator interface

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Fire-and-forget haptic actuator
pub trait Haptic: Send + Sync {
    fn pulse(&self);
}

/// Actuator that only records pulses in the log
#[derive(Debug, Default)]
pub struct LogHaptic;

impl Haptic for LogHaptic {
    fn pulse(&self) {
        info!("Haptic pulse");
    }
}

/// Actuator that counts pulses
#[derive(Debug, Default)]
pub struct CountingHaptic {
    pulses: AtomicUsize,
}

impl CountingHaptic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.pulses.load(Ordering::SeqCst)
    }
}

impl Haptic for CountingHaptic {
    fn pulse(&self) {
        self.pulses.fetch_add(1, Ordering::SeqCst);
    }
}
