//! Bridging engine message events to user handlers.
//!
//! The engine is given one callback for its whole lifetime. That callback
//! holds only a weak reference to the dispatcher's handler slot and looks up
//! the current handler on every event, so handlers can be swapped at any time
//! without touching the engine.

use crate::engine::{MessageCallback, PeerId};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use uuid::Uuid;

/// User handler for incoming messages
pub type MessageHandler = Arc<dyn Fn(PeerId, &str) + Send + Sync>;

/// An incoming message as emitted by the engine. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageEvent<'a> {
    /// Sending friend
    pub peer_id: PeerId,
    /// Message text
    pub text: &'a str,
}

/// Stable identifier of a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatcherId(Uuid);

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events handed to a handler
    pub delivered: u64,
    /// Events that arrived while no handler was registered
    pub dropped: u64,
    /// Handler invocations that panicked
    pub panicked: u64,
}

#[derive(Default)]
struct HandlerSlot {
    current: RwLock<Option<MessageHandler>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
    panicked: AtomicU64,
}

/// Routes engine message events to the most recently registered handler
pub struct MessageDispatcher {
    id: DispatcherId,
    slot: Arc<HandlerSlot>,
}

impl fmt::Display for DispatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl HandlerSlot {
    fn swap(&self, handler: Option<MessageHandler>) -> Option<MessageHandler> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, handler)
    }

    fn dispatch(&self, id: DispatcherId, event: MessageEvent<'_>) -> bool {
        // Clone under the read lock, invoke outside it: a handler may register
        // a replacement without deadlocking.
        let handler = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(handler) = handler else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("Dispatcher {}: no handler for message from {}", id, event.peer_id);
            return false;
        };

        match catch_unwind(AssertUnwindSafe(|| handler(event.peer_id, event.text))) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "Dispatcher {}: message handler panicked on message from {}",
                    id,
                    event.peer_id
                );
                false
            }
        }
    }
}

impl MessageDispatcher {
    /// Create a dispatcher with no handler
    pub fn new() -> Self {
        Self {
            id: DispatcherId(Uuid::new_v4()),
            slot: Arc::new(HandlerSlot::default()),
        }
    }

    /// Stable identifier of this dispatcher
    pub fn id(&self) -> DispatcherId {
        self.id
    }

    /// Replace the current handler.
    ///
    /// Every event is dispatched to exactly one handler: the one registered
    /// when the event's lookup happens.
    pub fn register_handler<H>(&self, handler: H)
    where
        H: Fn(PeerId, &str) + Send + Sync + 'static,
    {
        let previous = self.slot.swap(Some(Arc::new(handler)));
        log::debug!(
            "Dispatcher {}: handler {}",
            self.id,
            if previous.is_some() { "replaced" } else { "registered" }
        );
    }

    /// Remove the current handler; later events are dropped
    pub fn clear_handler(&self) {
        self.slot.swap(None);
    }

    /// True while a handler is registered
    pub fn has_handler(&self) -> bool {
        self.slot
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Hand one event to the current handler. Returns true if it ran.
    pub fn dispatch(&self, event: MessageEvent<'_>) -> bool {
        self.slot.dispatch(self.id, event)
    }

    /// Callback to install in the engine.
    ///
    /// Holds a weak reference: events arriving after the dispatcher is gone
    /// are discarded.
    pub fn bridge(&self) -> MessageCallback {
        let id = self.id;
        let slot: Weak<HandlerSlot> = Arc::downgrade(&self.slot);
        Box::new(move |peer_id, text| {
            if let Some(slot) = slot.upgrade() {
                slot.dispatch(id, MessageEvent { peer_id, text });
            }
        })
    }

    /// Delivery counters
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.slot.delivered.load(Ordering::Relaxed),
            dropped: self.slot.dropped.load(Ordering::Relaxed),
            panicked: self.slot.panicked.load(Ordering::Relaxed),
        }
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
