//! Handler registry plus broadcast channel behind [`EventBus`].

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::events::{EventCategory, SessionEvent};

/// Broadcast buffer used by [`EventBus::new`]
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Handle returned by [`EventBus::subscribe`]
///
/// Ids are unique per bus and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which events a handler wants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EventFilter {
    /// Everything published on the bus
    #[default]
    All,
    /// Only events in one of these categories
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    /// Whether `event` passes the filter
    pub fn matches(&self, event: &SessionEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(wanted) => wanted.contains(&event.category()),
        }
    }
}

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    filter: EventFilter,
    handler: Handler,
}

/// Typed event channel owned by one session
///
/// Handlers are called in registration order on the publishing thread.
/// Publishing works from a snapshot of the handler list, so a handler may
/// publish or (un)subscribe on the same bus.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Bus with the default broadcast capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bus whose broadcast side buffers up to `capacity` events per receiver
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            sender,
        }
    }

    /// Register a synchronous handler
    ///
    /// The handler runs on the publishing thread, so it should return
    /// quickly to avoid stalling inbound data.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push(Subscriber {
            id,
            filter,
            handler: Arc::new(handler),
        });
        tracing::trace!(subscription = %id, "subscribed");
        id
    }

    /// Drop a handler; false if `id` was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        match subscribers.iter().position(|s| s.id == id) {
            Some(index) => {
                subscribers.remove(index);
                tracing::trace!(subscription = %id, "unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Deliver `event` to every matching handler, then to broadcast receivers
    ///
    /// Returns how many handlers ran.
    pub fn publish(&self, event: SessionEvent) -> usize {
        let snapshot: Vec<Handler> = {
            let subscribers = self.subscribers.read();
            subscribers
                .iter()
                .filter(|s| s.filter.matches(&event))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        for handler in &snapshot {
            handler(&event);
        }

        // No receivers is not an error.
        let _ = self.sender.send(event);
        snapshot.len()
    }

    /// Receiver for async consumers
    pub fn receiver(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
