//! Synheart Zone - On-device heart-rate zone training engine
//!
//! Zone classifies a live stream of heart-rate samples into five configurable
//! intensity zones, tracks adherence to a target zone during a workout session,
//! nudges the wearer with a haptic pulse when they drift off target, and keeps the
//! zone configuration in step with a companion device.
//!
//! ## Modules
//!
//! - **Zones**: zone tables, validation and classification
//! - **Session**: workout lifecycle and live metrics
//! - **Monitor**: periodic haptic adherence reminders
//! - **Sync**: key/value configuration sync with a companion device
//! - **Analyzer / Report**: post-workout summaries

pub mod analyzer;
pub mod config;
pub mod error;
pub mod haptics;
pub mod logging;
pub mod monitor;
pub mod pipeline;
pub mod report;
pub mod sensor;
pub mod session;
pub mod sync;
pub mod types;
pub mod zones;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use analyzer::{summarize, time_in_zone, workout_stats};
pub use config::{ConfigStore, InMemoryConfigStore, TrainerConfig, ZoneTableHandle};
pub use error::{ComputeError, SensorError, SessionError, SyncError, TransportError, ZoneError};
pub use monitor::AdherenceMonitor;
pub use pipeline::{analyze, replay, ZoneAnalysis};
pub use report::{ReportEncoder, WorkoutReport};
pub use session::SessionStateMachine;
pub use sync::{ConfigSyncChannel, ConfigSyncReceiver, DeliveryReport, Transport};
pub use types::{HeartRateSample, LiveMetrics, Pace, SensorBatch, Session, SessionState, ZoneSummary};
pub use zones::{classify, ZoneBoundary, ZoneTable};

/// Zone version embedded in encoded reports
pub const ZONE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for encoded reports
pub const PRODUCER_NAME: &str = "synheart-zone";
