//! Incoming configuration sync
//!
//! Received table values are staged in the receiver first. The zone table is
//! rebuilt from the store overlaid with the staged values; only when that forms a
//! valid table are the staged values committed to the [`ConfigStore`] and the new
//! table published. Until then the store and the shared snapshot keep the last
//! valid table, so a restart mid-update still loads cleanly.

use super::codec::decode_frame;
use crate::config::{ConfigStore, ZoneTableHandle};
use crate::error::{SyncError, ZoneError};
use crate::zones::{parse_bpm, parse_target_zone, ConfigKey, ZoneTable};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What applying one pair did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Key is not one we understand
    Ignored,
    /// Stored; the effective table did not change
    Unchanged,
    /// A new table was published
    TableUpdated,
    /// Held back: together with the stored values it does not form a valid table yet
    Staged(ZoneError),
    TargetZone(u8),
}

/// Applies companion updates to the local store and zone table
pub struct ConfigSyncReceiver {
    store: Arc<dyn ConfigStore>,
    zones: ZoneTableHandle,
    staged: Mutex<BTreeMap<String, String>>,
}

impl ConfigSyncReceiver {
    pub fn new(store: Arc<dyn ConfigStore>, zones: ZoneTableHandle) -> Self {
        Self {
            store,
            zones,
            staged: Mutex::new(BTreeMap::new()),
        }
    }

    /// Table values received but not yet committed
    pub fn staged(&self) -> BTreeMap<String, String> {
        self.staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply one key/value pair. Applying the same pair twice has the same effect
    /// as applying it once.
    ///
    /// Values that do not parse are rejected and are neither staged nor stored.
    pub fn apply(&self, key: &str, value: &str) -> Result<ApplyOutcome, ZoneError> {
        let Some(config_key) = ConfigKey::parse(key) else {
            debug!(key, "Ignoring unknown sync key");
            return Ok(ApplyOutcome::Ignored);
        };

        if config_key == ConfigKey::TargetZone {
            let zone = parse_target_zone(value)?;
            self.store.set(key, &zone.to_string());
            info!(target_zone = zone, "Target zone updated from companion");
            return Ok(ApplyOutcome::TargetZone(zone));
        }

        let bpm = parse_bpm(key, value)?;
        let mut staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
        staged.insert(key.to_string(), bpm.to_string());

        let mut merged = self.store.entries();
        merged.extend(staged.iter().map(|(k, v)| (k.clone(), v.clone())));

        let current = self.zones.snapshot();
        let table = match ZoneTable::from_entries(&merged, &current) {
            Ok(table) => table,
            Err(error) => {
                warn!(
                    key,
                    value = bpm,
                    staged = staged.len(),
                    error = %error,
                    "Zone boundaries inconsistent, keeping previous table"
                );
                return Ok(ApplyOutcome::Staged(error));
            }
        };

        for (k, v) in std::mem::take(&mut *staged) {
            self.store.set(&k, &v);
        }
        if table == *current {
            return Ok(ApplyOutcome::Unchanged);
        }
        self.zones.replace(table);
        info!(key, value = bpm, "Zone table updated from companion");
        Ok(ApplyOutcome::TableUpdated)
    }

    /// Decode a frame and apply every pair in it. Pairs with invalid values are
    /// logged and skipped.
    pub fn apply_frame(&self, bytes: &[u8]) -> Result<Vec<ApplyOutcome>, SyncError> {
        let pairs = decode_frame(bytes)?;
        let mut outcomes = Vec::with_capacity(pairs.len());
        for (key, value) in &pairs {
            match self.apply(key, value) {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => warn!(key = %key, value = %value, error = %error, "Rejected sync value"),
            }
        }
        Ok(outcomes)
    }

    /// Apply frames as they arrive until the transport closes the channel
    pub fn spawn_listener(self: Arc<Self>, mut incoming: mpsc::Receiver<Vec<u8>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = incoming.recv().await {
                if let Err(error) = self.apply_frame(&frame) {
                    warn!(error = %error, bytes = frame.len(), "Dropping malformed sync frame");
                }
            }
            debug!("Sync listener stopped: transport closed");
        })
    }
}
