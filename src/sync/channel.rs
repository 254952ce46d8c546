//! Outgoing configuration sync with bounded retries
//!
//! [`ConfigSyncChannel::send`] only enqueues. A background task owns the queue and
//! delivers each message as a one-pair frame whenever the companion is reachable.
//! A failed send consumes one attempt and is retried after a constant delay; an
//! unreachable companion consumes nothing. Only the newest value per key is kept.

use super::codec::encode_pair;
use super::transport::Transport;
use crate::config::SyncSettings;
use crate::error::{SyncError, TransportError, ZoneError};
use crate::zones::{is_valid_zone, ZoneTable, TARGET_ZONE_KEY};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One queued key/value update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMessage {
    pub key: String,
    pub value: String,
    pub attempts_remaining: u32,
}

/// Final outcome of a queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    Delivered {
        key: String,
        value: String,
    },
    /// Attempts exhausted; the message has been dropped
    Failed {
        key: String,
        value: String,
        error: TransportError,
    },
}

impl DeliveryReport {
    pub fn key(&self) -> &str {
        match self {
            DeliveryReport::Delivered { key, .. } | DeliveryReport::Failed { key, .. } => key,
        }
    }
}

struct Pending {
    message: SyncMessage,
    retry_at: Option<Instant>,
}

struct SyncWorker {
    transport: Arc<dyn Transport>,
    settings: SyncSettings,
    queue: BTreeMap<String, Pending>,
    reports: mpsc::UnboundedSender<DeliveryReport>,
}

impl SyncWorker {
    fn enqueue(&mut self, message: SyncMessage) {
        let key = message.key.clone();
        let pending = Pending {
            message,
            retry_at: None,
        };
        if self.queue.insert(key.clone(), pending).is_some() {
            debug!(key = %key, "Replaced queued sync message with newer value");
        }
    }

    async fn flush(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        if !self.transport.is_reachable() {
            debug!(queued = self.queue.len(), "Companion unreachable, deferring sync");
            return;
        }
        let now = Instant::now();
        let due: Vec<String> = self
            .queue
            .iter()
            .filter(|(_, pending)| pending.retry_at.map_or(true, |at| at <= now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in due {
            self.attempt(&key).await;
        }
    }

    async fn attempt(&mut self, key: &str) {
        let Some(pending) = self.queue.get(key) else {
            return;
        };
        let result = match encode_pair(&pending.message.key, &pending.message.value) {
            Ok(frame) => self.transport.send_raw(frame).await,
            Err(e) => Err(TransportError::SendFailed(e.to_string())),
        };

        match result {
            Ok(()) => {
                if let Some(pending) = self.queue.remove(key) {
                    info!(key = %pending.message.key, value = %pending.message.value, "Sync message delivered");
                    self.report(DeliveryReport::Delivered {
                        key: pending.message.key,
                        value: pending.message.value,
                    });
                }
            }
            Err(TransportError::Unreachable) => {
                debug!(key = %key, "Companion became unreachable, attempt not counted");
            }
            Err(error) => {
                let Some(pending) = self.queue.get_mut(key) else {
                    return;
                };
                pending.message.attempts_remaining =
                    pending.message.attempts_remaining.saturating_sub(1);
                if pending.message.attempts_remaining > 0 {
                    pending.retry_at = Some(Instant::now() + self.settings.retry_delay());
                    warn!(
                        key = %key,
                        error = %error,
                        attempts_remaining = pending.message.attempts_remaining,
                        "Sync send failed, will retry"
                    );
                    return;
                }
                if let Some(pending) = self.queue.remove(key) {
                    warn!(key = %key, error = %error, "Sync message dropped after final attempt");
                    self.report(DeliveryReport::Failed {
                        key: pending.message.key,
                        value: pending.message.value,
                        error,
                    });
                }
            }
        }
    }

    fn report(&self, report: DeliveryReport) {
        if self.reports.send(report).is_err() {
            debug!("Delivery report dropped: nobody is listening");
        }
    }
}

/// Sending half of the companion configuration sync
pub struct ConfigSyncChannel {
    commands: mpsc::UnboundedSender<SyncMessage>,
    max_attempts: u32,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ConfigSyncChannel {
    /// Spawn the delivery task. Returns the channel and a receiver of final
    /// delivery outcomes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        settings: SyncSettings,
    ) -> (Self, mpsc::UnboundedReceiver<DeliveryReport>) {
        let (commands, mut commands_rx) = mpsc::unbounded_channel();
        let (reports, reports_rx) = mpsc::unbounded_channel();
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let max_attempts = settings.max_attempts.max(1);
        let period = settings.poll_interval();

        let mut worker = SyncWorker {
            transport,
            settings,
            queue: BTreeMap::new(),
            reports,
        };

        let handle = tokio::spawn(async move {
            let mut poll = interval_at(Instant::now() + period, period);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    message = commands_rx.recv() => match message {
                        Some(message) => {
                            worker.enqueue(message);
                            worker.flush().await;
                        }
                        None => break,
                    },
                    _ = poll.tick() => worker.flush().await,
                    _ = &mut shutdown_rx => {
                        debug!("Sync task received shutdown signal");
                        break;
                    }
                }
            }
            if !worker.queue.is_empty() {
                debug!(dropped = worker.queue.len(), "Sync task stopped with queued messages");
            }
        });

        let channel = Self {
            commands,
            max_attempts,
            shutdown: Some(shutdown),
            handle: Some(handle),
        };
        (channel, reports_rx)
    }

    /// Queue `key = value` for delivery. Never waits on the transport.
    pub fn send(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), SyncError> {
        let message = SyncMessage {
            key: key.into(),
            value: value.into(),
            attempts_remaining: self.max_attempts,
        };
        debug!(key = %message.key, value = %message.value, "Queueing sync message");
        self.commands.send(message).map_err(|_| SyncError::Closed)
    }

    /// Queue every field of a zone table
    pub fn send_table(&self, table: &ZoneTable) -> Result<(), SyncError> {
        for (key, value) in table.entries() {
            self.send(key, value)?;
        }
        Ok(())
    }

    pub fn send_target_zone(&self, zone: u8) -> Result<(), SyncError> {
        if !is_valid_zone(zone) {
            return Err(ZoneError::InvalidZoneIndex(zone).into());
        }
        self.send(TARGET_ZONE_KEY, zone.to_string())
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the delivery task and wait for it. Queued messages are discarded.
    pub async fn shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // Fails only if the task already ended
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                debug!(error = %e, "Sync task ended abnormally");
            }
        }
    }
}

impl Drop for ConfigSyncChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
