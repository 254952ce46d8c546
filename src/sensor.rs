//! Sensor collaborator interface
//!
//! The health-data store delivers sample batches over a channel rather than via
//! callbacks. Closing the receiving side is the cancellation: anything the sensor
//! tries to deliver afterwards is dropped on the floor.

use crate::error::SensorError;
use crate::types::SensorBatch;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Buffered events per subscription before the sensor side sees back-pressure
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// Something the sensor collaborator reports to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Batch(SensorBatch),
    Fault(SensorError),
}

/// Live subscription to the sensor; dropping or cancelling it ends delivery
#[derive(Debug)]
pub struct SensorSubscription {
    id: Uuid,
    events: mpsc::Receiver<SensorEvent>,
}

impl SensorSubscription {
    pub fn new(events: mpsc::Receiver<SensorEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next event; `None` once the sensor side has gone away
    pub async fn recv(&mut self) -> Option<SensorEvent> {
        self.events.recv().await
    }

    /// Next event if one is already buffered
    pub fn try_recv(&mut self) -> Option<SensorEvent> {
        self.events.try_recv().ok()
    }

    /// Stop delivery. Idempotent.
    pub fn cancel(&mut self) {
        self.events.close();
    }
}

/// Source of live heart-rate, distance and energy samples
pub trait SensorSource: Send + Sync {
    /// Open a new live subscription
    fn subscribe(&self) -> Result<SensorSubscription, SensorError>;
}

/// In-process sensor fed by the caller (replays, simulators, tests)
#[derive(Debug, Default)]
pub struct ChannelSensor {
    subscriber: Mutex<Option<mpsc::Sender<SensorEvent>>>,
}

impl ChannelSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a batch to the current subscriber; `false` if nobody is listening
    pub fn deliver(&self, batch: SensorBatch) -> bool {
        self.send(SensorEvent::Batch(batch))
    }

    /// Report a sensor fault to the current subscriber
    pub fn fail(&self, error: SensorError) -> bool {
        self.send(SensorEvent::Fault(error))
    }

    /// Whether an open subscription exists
    pub fn is_subscribed(&self) -> bool {
        self.subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn send(&self, event: SensorEvent) -> bool {
        let guard = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Sensor event dropped: subscription closed");
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Sensor event dropped: subscriber is behind");
                false
            }
        }
    }
}

impl SensorSource for ChannelSensor {
    fn subscribe(&self) -> Result<SensorSubscription, SensorError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        *self.subscriber.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(SensorSubscription::new(rx))
    }
}
