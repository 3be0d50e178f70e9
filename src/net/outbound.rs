//! Outbound replication queue
//!
//! The simulation and the replication scheduler push messages through
//! crossbeam channels; the observer hub drains them, encodes each message
//! once and fans it out to every observer.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

use crate::net::protocol::ReplicationMessage;

/// Bounded queue of messages waiting to be sent to observers
pub struct OutboundQueue {
    sender: Sender<ReplicationMessage>,
    receiver: Receiver<ReplicationMessage>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Clonable producer handle
    pub fn sender(&self) -> OutboundSender {
        OutboundSender {
            sender: self.sender.clone(),
        }
    }

    /// Take everything queued so far
    pub fn drain(&self) -> Vec<ReplicationMessage> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        // Several seconds of terminates and batches at peak load
        Self::new(8192)
    }
}

/// Clonable producer side of the outbound queue
#[derive(Debug, Clone)]
pub struct OutboundSender {
    sender: Sender<ReplicationMessage>,
}

impl OutboundSender {
    /// Queue a message without blocking
    #[inline]
    pub fn try_send(&self, message: ReplicationMessage) -> Result<(), OutboundError> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => OutboundError::Full,
            TrySendError::Disconnected(_) => OutboundError::Disconnected,
        })
    }

    /// Queue a message, logging a warning if it is dropped
    pub fn send_or_warn(&self, message: ReplicationMessage) {
        let kind = message.kind();
        if let Err(e) = self.try_send(message) {
            warn!("Dropped {} message: {}", kind, e);
        }
    }
}

/// Outbound queue errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OutboundError {
    #[error("outbound queue full")]
    Full,
    #[error("outbound queue disconnected")]
    Disconnected,
}
