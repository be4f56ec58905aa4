//! # Broadcast Hub
//!
//! A single-writer actor that fans update frames out to every live subscriber.
//!
//! ## Core Design Principles:
//!
//! 1.  **One Owner**: the subscriber set lives inside the `Hub` task and nowhere
//!     else. Registration, unregistration and publishing all arrive as `HubEvent`s
//!     on one channel and are applied one at a time, in arrival order, so the set
//!     needs no lock.
//!
//! 2.  **Zero-Copy Fan-out**: a frame is an `Arc<str>`; every subscriber receives a
//!     new pointer to the same encoded envelope.
//!
//! 3.  **Eviction over Backpressure**: each subscriber has a small bounded queue.
//!     Publishing uses `try_send`; a subscriber whose queue is full is dropped on
//!     the spot (its queue closes, the transport sees the end of the stream)
//!     instead of holding everyone else back. There is no replay: a new subscriber
//!     only sees frames published after it registered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// An encoded update envelope, shared by all subscribers.
pub type Frame = Arc<str>;

/// Opaque subscriber handle, unique for the lifetime of the hub.
pub type SubscriberId = u64;

/// Default capacity of each subscriber's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

enum HubEvent {
    Register(Subscriber),
    Unregister(SubscriberId),
    Publish(Frame),
    Count(oneshot::Sender<usize>),
}

struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<Frame>,
}

/// # Subscription
///
/// What a transport gets back from `HubHandle::register`: its id (to unregister
/// with) and the receiving end of its queue. `frames.recv()` returning `None`
/// means the hub evicted this subscriber or shut down.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub frames: mpsc::Receiver<Frame>,
}

/// # Hub
///
/// The actor itself. Create it with [`Hub::new`], spawn [`Hub::run`], and talk to it
/// through the returned [`HubHandle`].
pub struct Hub {
    subscribers: Vec<Subscriber>,
    events: mpsc::UnboundedReceiver<HubEvent>,
}

/// Cloneable front door to a running `Hub`.
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::UnboundedSender<HubEvent>,
    next_id: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl Hub {
    /// Creates the actor and its handle. `queue_capacity` is the per-subscriber
    /// queue length (at least 1).
    pub fn new(queue_capacity: usize) -> (Hub, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Hub {
            subscribers: Vec::new(),
            events: rx,
        };
        let handle = HubHandle {
            events: tx,
            next_id: Arc::new(AtomicU64::new(1)),
            queue_capacity: queue_capacity.max(1),
        };
        (hub, handle)
    }

    /// Processes events until `shutdown` fires or every handle is dropped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        log::info!("Broadcast hub started.");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("Broadcast hub received shutdown signal.");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                }
            }
        }
        log::info!("Broadcast hub stopped with {} subscribers.", self.subscribers.len());
    }

    fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register(subscriber) => {
                log::info!("Subscriber {} registered.", subscriber.id);
                self.subscribers.push(subscriber);
            }
            HubEvent::Unregister(id) => {
                let before = self.subscribers.len();
                self.subscribers.retain(|s| s.id != id);
                if self.subscribers.len() < before {
                    log::info!("Subscriber {} unregistered.", id);
                }
            }
            HubEvent::Publish(frame) => self.publish(frame),
            HubEvent::Count(reply) => {
                let _ = reply.send(self.subscribers.len());
            }
        }
    }

    fn publish(&mut self, frame: Frame) {
        self.subscribers.retain(|subscriber| {
            match subscriber.sender.try_send(Arc::clone(&frame)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    log::warn!("Subscriber {} can't keep up. Evicting.", subscriber.id);
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    log::info!("Subscriber {} disconnected. Removing from hub.", subscriber.id);
                    false
                }
            }
        });
    }
}

impl HubHandle {
    /// Adds a new subscriber. If the hub is gone the returned queue is already closed.
    pub fn register(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, frames) = mpsc::channel(self.queue_capacity);
        if self
            .events
            .send(HubEvent::Register(Subscriber { id, sender }))
            .is_err()
        {
            log::warn!("Broadcast hub is not running; subscriber {} is closed.", id);
        }
        Subscription { id, frames }
    }

    /// Removes a subscriber. Unknown ids are ignored.
    pub fn unregister(&self, id: SubscriberId) {
        let _ = self.events.send(HubEvent::Unregister(id));
    }

    /// Queues a frame for every current subscriber.
    pub fn publish(&self, frame: impl Into<Frame>) {
        if self.events.send(HubEvent::Publish(frame.into())).is_err() {
            log::debug!("Broadcast hub is not running; frame dropped.");
        }
    }

    /// Number of live subscribers, or `None` if the hub has stopped.
    pub async fn subscriber_count(&self) -> Option<usize> {
        let (tx, rx) = oneshot::channel();
        self.events.send(HubEvent::Count(tx)).ok()?;
        rx.await.ok()
    }
}
