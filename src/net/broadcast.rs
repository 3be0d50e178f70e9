//! Observer hub: fans replication messages out to connected observers
//!
//! Messages drained from the outbound queue are encoded and framed once,
//! then shared through a broadcast channel. Each observer connection has
//! its own writer task; one that falls behind skips the frames it missed.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::constants::net::{OBSERVER_BACKLOG, PUMP_INTERVAL_MS};
use crate::metrics::Metrics;
use crate::net::framing::{frame, FramingError};
use crate::net::outbound::OutboundQueue;
use crate::net::protocol::{encode, EncodeError, ReplicationMessage};

/// One encoded, length-prefixed message
pub type Frame = Arc<Vec<u8>>;

pub struct ObserverHub {
    frames: broadcast::Sender<Frame>,
    metrics: Option<Arc<Metrics>>,
}

impl ObserverHub {
    pub fn new(backlog: usize) -> Self {
        let (frames, _) = broadcast::channel(backlog.max(1));
        Self {
            frames,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.frames.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.frames.receiver_count()
    }

    /// Encode and fan out one message. Returns the framed size, or 0 if the
    /// message could not be encoded.
    pub fn publish(&self, message: &ReplicationMessage) -> usize {
        let framed = match encode_frame(message) {
            Ok(framed) => framed,
            Err(e) => {
                warn!("Failed to encode {} message: {}", message.kind(), e);
                if let Some(metrics) = &self.metrics {
                    Metrics::incr(&metrics.messages_dropped);
                }
                return 0;
            }
        };

        let len = framed.len();
        // No observers is not an error
        if let Ok(receivers) = self.frames.send(Arc::new(framed)) {
            if let Some(metrics) = &self.metrics {
                metrics
                    .bytes_sent
                    .fetch_add((len * receivers) as u64, Ordering::Relaxed);
            }
        }
        len
    }

    /// Publish everything currently queued. Returns how many messages went out.
    pub fn pump_once(&self, queue: &OutboundQueue) -> usize {
        let messages = queue.drain();
        for message in &messages {
            self.publish(message);
        }
        messages.len()
    }

    /// Drain the outbound queue on a short interval until shutdown
    pub async fn pump(self: Arc<Self>, queue: OutboundQueue, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_millis(PUMP_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.pump_once(&queue);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        // Flush what the simulation queued last
                        self.pump_once(&queue);
                        break;
                    }
                }
            }
        }
    }

    /// Accept observer connections until shutdown
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!("Observer hub listening on {}", listener.local_addr()?);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let frames = self.subscribe();
                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        handle_observer(stream, peer, frames, metrics).await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Observer hub stopped");
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new(OBSERVER_BACKLOG)
    }
}

/// Why a message could not be turned into a frame
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Framing(#[from] FramingError),
}

fn encode_frame(message: &ReplicationMessage) -> Result<Vec<u8>, FrameError> {
    let bytes = encode(message)?;
    Ok(frame(&bytes)?)
}

/// Next frame for an observer, skipping any it fell behind on.
/// `None` once the hub is gone.
pub async fn next_frame(frames: &mut broadcast::Receiver<Frame>) -> Option<Frame> {
    loop {
        match frames.recv().await {
            Ok(frame) => return Some(frame),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Observer lagging, skipped {} frames", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn handle_observer(
    mut stream: TcpStream,
    peer: SocketAddr,
    mut frames: broadcast::Receiver<Frame>,
    metrics: Option<Arc<Metrics>>,
) {
    info!("Observer {} connected", peer);
    if let Some(metrics) = &metrics {
        metrics.observers_connected.fetch_add(1, Ordering::Relaxed);
    }
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set nodelay for {}: {}", peer, e);
    }

    while let Some(frame) = next_frame(&mut frames).await {
        if let Err(e) = stream.write_all(&frame).await {
            debug!("Observer {} write failed: {}", peer, e);
            break;
        }
    }

    if let Some(metrics) = &metrics {
        metrics.observers_connected.fetch_sub(1, Ordering::Relaxed);
    }
    info!("Observer {} disconnected", peer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::framing::read_message;
    use crate::net::protocol::{decode, PositionEntry};
    use glam::Vec3;

    #[tokio::test]
    async fn test_lagging_observer_skips_to_latest() {
        let hub = ObserverHub::new(2);
        let mut rx = hub.subscribe();
        for id in 0..5 {
            hub.publish(&ReplicationMessage::Terminate { id });
        }

        let frame = next_frame(&mut rx).await.unwrap();
        let msg: ReplicationMessage = decode(&frame[4..]).unwrap();
        assert_eq!(msg, ReplicationMessage::Terminate { id: 3 });
    }

    #[tokio::test]
    async fn test_next_frame_waits_for_publish() {
        let hub = ObserverHub::default();
        let mut rx = hub.subscribe();
        let mut next = tokio_test::task::spawn(next_frame(&mut rx));
        tokio_test::assert_pending!(next.poll());

        hub.publish(&ReplicationMessage::Terminate { id: 9 });
        assert!(next.is_woken());
        let frame = tokio_test::assert_ready!(next.poll()).unwrap();
        assert_eq!(frame.len(), 4 + 4 + 2);
    }

    #[tokio::test]
    async fn test_next_frame_ends_when_hub_dropped() {
        let hub = ObserverHub::default();
        let mut rx = hub.subscribe();
        drop(hub);
        assert!(next_frame(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_observers() {
        let hub = ObserverHub::default();
        assert_eq!(hub.publish(&ReplicationMessage::Terminate { id: 1 }), 4 + 4 + 2);
    }

    #[tokio::test]
    async fn test_oversized_message_is_dropped() {
        let metrics = Arc::new(Metrics::new());
        let hub = ObserverHub::default().with_metrics(metrics.clone());
        let mut rx = hub.subscribe();
        let message = ReplicationMessage::PositionBatch {
            entries: vec![
                PositionEntry {
                    id: 0,
                    position: Vec3::ZERO,
                };
                8000
            ],
        };

        assert!(matches!(
            encode_frame(&message),
            Err(FrameError::Framing(FramingError::MessageTooLarge(_, _)))
        ));
        assert_eq!(hub.publish(&message), 0);
        assert_eq!(metrics.messages_dropped.load(Ordering::Relaxed), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pump_drains_queue() {
        let hub = ObserverHub::default();
        let mut rx = hub.subscribe();
        let queue = OutboundQueue::new(8);
        queue.sender().send_or_warn(ReplicationMessage::Terminate { id: 1 });
        queue.sender().send_or_warn(ReplicationMessage::Terminate { id: 2 });

        assert_eq!(hub.pump_once(&queue), 2);
        assert!(queue.is_empty());
        assert!(next_frame(&mut rx).await.is_some());
        assert!(next_frame(&mut rx).await.is_some());
    }

    #[tokio::test]
    async fn test_observer_receives_framed_messages() {
        let metrics = Arc::new(Metrics::new());
        let hub = Arc::new(ObserverHub::default().with_metrics(metrics.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let server = tokio::spawn(hub.clone().serve(listener, rx));

        let mut client = TcpStream::connect(addr).await.unwrap();
        while hub.observer_count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let msg = ReplicationMessage::Terminate { id: 77 };
        hub.publish(&msg);
        let payload = read_message(&mut client).await.unwrap();
        assert_eq!(decode::<ReplicationMessage>(&payload).unwrap(), msg);

        tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }
}
