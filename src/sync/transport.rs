//! Companion transport interface

use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Buffered frames between an in-memory transport and its peer
pub const PEER_BUFFER: usize = 32;

/// Paired, trusted byte link to the companion device.
///
/// Incoming frames are delivered separately, through an `mpsc::Receiver<Vec<u8>>`
/// handed to [`super::ConfigSyncReceiver::spawn_listener`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the companion can currently be reached
    fn is_reachable(&self) -> bool;

    /// Send one frame
    async fn send_raw(&self, frame: Vec<u8>) -> Result<(), TransportError>;
}

/// In-process transport, optionally wired to a peer's incoming frame channel
#[derive(Debug)]
pub struct MemoryTransport {
    reachable: AtomicBool,
    failing: AtomicBool,
    attempts: AtomicUsize,
    sent: Mutex<Vec<Vec<u8>>>,
    peer: Option<mpsc::Sender<Vec<u8>>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Reachable transport that only records frames
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            peer: None,
        }
    }

    /// Transport plus the receiving end its frames arrive on
    pub fn pair() -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(PEER_BUFFER);
        let transport = Self {
            peer: Some(tx),
            ..Self::new()
        };
        (transport, rx)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make every send attempt fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Send attempts made while reachable
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Frames successfully sent
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn send_raw(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_reachable() {
            return Err(TransportError::Unreachable);
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("simulated link failure".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());
        if let Some(peer) = &self.peer {
            peer.send(frame)
                .await
                .map_err(|_| TransportError::SendFailed("peer closed".to_string()))?;
        }
        Ok(())
    }
}
