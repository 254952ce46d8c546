//! Configuration: trainer settings, the key/value store and the shared zone table
//!
//! Components never reach for process-wide state. They receive a [`ConfigStore`]
//! and a [`ZoneTableHandle`] explicitly, which keeps tests deterministic.

use crate::zones::{ZoneTable, TARGET_ZONE_KEY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

/// Default grace period before the adherence monitor starts checking
pub const DEFAULT_MONITOR_DELAY_SECS: u64 = 120;

/// Default minimum spacing between haptic pulses
pub const DEFAULT_MONITOR_FREQUENCY_SECS: u64 = 30;

/// Default number of send attempts per sync message
pub const DEFAULT_SYNC_MAX_ATTEMPTS: u32 = 3;

/// Default constant delay between sync attempts
pub const DEFAULT_SYNC_RETRY_DELAY_SECS: u64 = 60;

/// Default period of the sync loop's reachability check
pub const DEFAULT_SYNC_POLL_INTERVAL_SECS: u64 = 5;

/// Distances below this are treated as "not moving" for pace
pub const DEFAULT_NOT_MOVING_THRESHOLD_METERS: f64 = 1.0;

/// Adherence monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub enabled: bool,
    /// Active session time before monitoring starts
    pub delay_secs: u64,
    /// Timer period and minimum spacing between pulses
    pub frequency_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_secs: DEFAULT_MONITOR_DELAY_SECS,
            frequency_secs: DEFAULT_MONITOR_FREQUENCY_SECS,
        }
    }
}

impl MonitorSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// Timer period; never zero
    pub fn frequency(&self) -> Duration {
        Duration::from_secs(self.frequency_secs.max(1))
    }
}

/// Config sync channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Total send attempts per message before it is dropped
    pub max_attempts: u32,
    /// Constant delay between attempts
    pub retry_delay_secs: u64,
    /// How often queued messages are re-checked against reachability
    pub poll_interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_SYNC_MAX_ATTEMPTS,
            retry_delay_secs: DEFAULT_SYNC_RETRY_DELAY_SECS,
            poll_interval_secs: DEFAULT_SYNC_POLL_INTERVAL_SECS,
        }
    }
}

impl SyncSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Top-level trainer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub monitor: MonitorSettings,
    pub sync: SyncSettings,
    pub not_moving_threshold_meters: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorSettings::default(),
            sync: SyncSettings::default(),
            not_moving_threshold_meters: DEFAULT_NOT_MOVING_THRESHOLD_METERS,
        }
    }
}

impl TrainerConfig {
    /// Load configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Apply `ZONE_*` environment overrides
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Some(v) = env_u64("ZONE_MONITOR_DELAY_SECS") {
            self.monitor.delay_secs = v;
        }
        if let Some(v) = env_u64("ZONE_MONITOR_FREQUENCY_SECS") {
            self.monitor.frequency_secs = v;
        }
        if let Ok(v) = env::var("ZONE_MONITOR_ENABLED") {
            self.monitor.enabled = v != "false" && v != "0";
        }
        if let Some(v) = env_u64("ZONE_SYNC_MAX_ATTEMPTS") {
            self.sync.max_attempts = u32::try_from(v).unwrap_or(u32::MAX);
        }
        if let Some(v) = env_u64("ZONE_SYNC_RETRY_DELAY_SECS") {
            self.sync.retry_delay_secs = v;
        }
        self
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring non-numeric environment override");
            None
        }
    }
}

/// Persistent string key/value configuration
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    /// Snapshot of every stored pair
    fn entries(&self) -> BTreeMap<String, String>;

    /// Stored target zone, if any
    fn target_zone(&self) -> Option<u8> {
        self.get(TARGET_ZONE_KEY)
            .and_then(|v| crate::zones::parse_target_zone(&v).ok())
    }
}

/// In-memory store, serializable to JSON for persistence
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let values: BTreeMap<String, String> = serde_json::from_str(json)?;
        Ok(Self {
            values: RwLock::new(values),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries())
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn entries(&self) -> BTreeMap<String, String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Shared, atomically replaced zone table.
///
/// Readers take an `Arc` snapshot; writers publish a whole new table. A reader
/// therefore never observes a half-updated set of boundaries.
#[derive(Clone)]
pub struct ZoneTableHandle {
    tx: Arc<watch::Sender<Arc<ZoneTable>>>,
}

impl ZoneTableHandle {
    pub fn new(table: ZoneTable) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(table));
        Self { tx: Arc::new(tx) }
    }

    /// Current table
    pub fn snapshot(&self) -> Arc<ZoneTable> {
        self.tx.borrow().clone()
    }

    /// Publish a new table; returns the previous one
    pub fn replace(&self, table: ZoneTable) -> Arc<ZoneTable> {
        self.tx.send_replace(Arc::new(table))
    }

    /// Receiver notified whenever the table is replaced
    pub fn subscribe(&self) -> watch::Receiver<Arc<ZoneTable>> {
        self.tx.subscribe()
    }
}

impl Default for ZoneTableHandle {
    fn default() -> Self {
        Self::new(ZoneTable::default())
    }
}

impl std::fmt::Debug for ZoneTableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneTableHandle")
            .field("table", &*self.snapshot())
            .finish()
    }
}
