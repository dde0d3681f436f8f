//! Engagement notifications.
//!
//! Listeners are called synchronously, in registration order, on whichever
//! thread produced the event. Channel subscribers receive a clone of every
//! event after the listeners have run.
//!
//! ```rust,ignore
//! let rx = engine.subscribe();
//! std::thread::spawn(move || {
//!     while let Ok(event) = rx.recv() {
//!         println!("{event:?}");
//!     }
//! });
//! ```

use engage_sync_engine::PayloadKind;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Something the host app may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngagementEvent {
    /// A payload was accepted by the server.
    PayloadDelivered {
        /// Queue id.
        id: u64,
        /// Payload kind.
        kind: PayloadKind,
        /// Server-assigned id, if returned.
        remote_id: Option<String>,
    },
    /// A payload was rejected and will never be sent.
    PayloadRejected {
        /// Queue id.
        id: u64,
        /// Payload kind.
        kind: PayloadKind,
        /// Rejection reason.
        reason: String,
        /// The payload's local attachment, if it had one.
        attachment: Option<PathBuf>,
    },
    /// New rules were committed.
    RulesUpdated {
        /// Interaction definitions in the new rules.
        interactions: usize,
        /// Target keys in the new rules.
        targets: usize,
    },
    /// An event resolved to an interaction.
    InteractionResolved {
        /// Canonical event key.
        event: String,
        /// Selected interaction id.
        interaction_id: String,
    },
}

/// Receives [`EngagementEvent`]s.
pub trait EngagementListener: Send + Sync {
    /// Called once per event.
    fn on_event(&self, event: &EngagementEvent);
}

impl<F> EngagementListener for F
where
    F: Fn(&EngagementEvent) + Send + Sync,
{
    fn on_event(&self, event: &EngagementEvent) {
        self(event)
    }
}

/// Handle returned by [`Notifier::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Observer registry and channel fan-out.
pub struct Notifier {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn EngagementListener>)>>,
    subscribers: RwLock<Vec<Sender<EngagementEvent>>>,
}

impl Notifier {
    /// Creates an empty notifier.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a listener. Listeners run in registration order.
    pub fn add_listener(&self, listener: impl EngagementListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Unregisters a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Returns a receiver for all future events.
    pub fn subscribe(&self) -> Receiver<EngagementEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Delivers an event to every listener, then every subscriber.
    pub fn emit(&self, event: EngagementEvent) {
        // Snapshot so a listener may register or remove listeners.
        let listeners: Vec<_> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.on_event(&event);
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
