//! # Change Notifier
//!
//! Fans committed [`ChangeEvent`]s out to every connected client.
//!
//! ## Delivery Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  engine / sales ──publish()──► broadcast::Sender (capacity N)           │
//! │                                    │                                    │
//! │                   ┌────────────────┼────────────────┐                   │
//! │                   ▼                ▼                ▼                   │
//! │             Subscription 1   Subscription 2   Subscription 3            │
//! │             (keeps up)       (keeps up)       (slow: Lagged(k),         │
//! │                                                oldest k dropped)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! At most once: no retry, no replay. A publish with no subscribers is a
//! no-op. Publishing never blocks and never fails the caller.

use std::sync::atomic::{AtomicU64, Ordering};

use tally_core::ChangeEvent;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, trace, warn};

/// Sink for committed changes.
///
/// Injected into the engine and the sale manager as
/// `Arc<dyn ChangeNotifier>`.
pub trait ChangeNotifier: Send + Sync {
    fn publish(&self, event: ChangeEvent);

    /// Publishes in order.
    fn publish_all(&self, events: Vec<ChangeEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn publish(&self, event: ChangeEvent) {
        trace!(kind = event.kind(), "Dropping event (no notifier)");
    }
}

// =============================================================================
// Broadcast Notifier
// =============================================================================

/// In-process pub/sub over a bounded `tokio::sync::broadcast` channel.
#[derive(Debug)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ChangeEvent>,
    next_id: AtomicU64,
}

impl BroadcastNotifier {
    /// Creates a notifier buffering up to `capacity` events per subscriber.
    ///
    /// `capacity` of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastNotifier {
            tx,
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new subscriber. It sees events published from now on.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(subscriber = id, "Subscriber attached");
        Subscription {
            id,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChangeNotifier for BroadcastNotifier {
    fn publish(&self, event: ChangeEvent) {
        let kind = event.kind();
        // Err only means nobody is listening.
        match self.tx.send(event) {
            Ok(receivers) => trace!(kind, receivers, "Event published"),
            Err(_) => trace!(kind, "Event published with no subscribers"),
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Event(ChangeEvent),
    /// This subscriber fell behind and missed this many events.
    Lagged(u64),
}

/// One subscriber's handle. Dropping it (or calling
/// [`Subscription::unsubscribe`]) detaches.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next notification. `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        match self.rx.recv().await {
            Ok(event) => Some(Notification::Event(event)),
            Err(RecvError::Lagged(missed)) => {
                warn!(subscriber = self.id, missed, "Subscriber lagged, events dropped");
                Some(Notification::Lagged(missed))
            }
            Err(RecvError::Closed) => None,
        }
    }

    /// Returns a pending notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        match self.rx.try_recv() {
            Ok(event) => Some(Notification::Event(event)),
            Err(TryRecvError::Lagged(missed)) => {
                warn!(subscriber = self.id, missed, "Subscriber lagged, events dropped");
                Some(Notification::Lagged(missed))
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Detaches from the notifier.
    pub fn unsubscribe(self) {
        debug!(subscriber = self.id, "Subscriber detached");
    }
}
