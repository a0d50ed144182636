//! # Events
//!
//! Events are posted to an entity's [`EventInput`] and fanned out to every
//! queue subscribed to the event name. Queues are bounded FIFOs; when a queue
//! is full the new event is dropped with a warning.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use glam::Vec3;
use tracing::{trace, warn};

use crate::ecs::{Component, Entity};
use crate::meta::Reflect;

/// Default capacity of a script event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Payload carried by an [`Event`].
#[derive(Clone, Debug, Default, PartialEq)]
pub enum EventData {
    /// No payload.
    #[default]
    None,
    /// A flag.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A scalar.
    Double(f64),
    /// A vector.
    Vec3(Vec3),
    /// Text.
    Text(String),
    /// An entity handle.
    Entity(Entity),
}

/// A named message addressed to one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Event path, e.g. `/action/flashlight/toggle`.
    pub name: String,
    /// Sender, or null when posted by input.
    pub source: Entity,
    /// Payload.
    pub data: EventData,
}

impl Event {
    /// An event without a source entity.
    #[must_use]
    pub fn new(name: impl Into<String>, data: EventData) -> Self {
        Self {
            name: name.into(),
            source: Entity::NULL,
            data,
        }
    }

    /// Sets the sending entity.
    #[must_use]
    pub fn from_entity(mut self, source: Entity) -> Self {
        self.source = source;
        self
    }
}

// ============================================================================
// EVENT QUEUE
// ============================================================================

/// Bounded FIFO of events for one script instance.
pub struct EventQueue {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
    capacity: usize,
}

impl EventQueue {
    /// Creates a shared queue holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Arc::new(Self {
            sender,
            receiver,
            capacity,
        })
    }

    /// Appends `event`.
    ///
    /// # Returns
    ///
    /// False if the queue was full and the event was dropped.
    pub fn push(&self, event: Event) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event) | TrySendError::Disconnected(event)) => {
                warn!(
                    target: "photon::script",
                    event = %event.name,
                    capacity = self.capacity,
                    "event queue full, dropping event"
                );
                false
            }
        }
    }

    /// Takes the oldest event.
    #[inline]
    pub fn poll(&self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Number of queued events.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// True if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Maximum number of queued events.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ============================================================================
// EVENT INPUT
// ============================================================================

/// Event subscriptions of one entity.
///
/// Queues belong to the world they were registered in, so a clone starts
/// with no subscriptions.
#[derive(Default)]
pub struct EventInput {
    subscriptions: BTreeMap<String, Vec<Arc<EventQueue>>>,
}

impl EventInput {
    /// Subscribes `queue` to `event`. Subscribing twice is a no-op.
    pub fn register(&mut self, event: &str, queue: &Arc<EventQueue>) {
        let queues = self.subscriptions.entry(event.to_owned()).or_default();
        if !queues.iter().any(|q| Arc::ptr_eq(q, queue)) {
            queues.push(Arc::clone(queue));
        }
    }

    /// Removes `queue` from every subscription.
    pub fn unregister(&mut self, queue: &Arc<EventQueue>) {
        for queues in self.subscriptions.values_mut() {
            queues.retain(|q| !Arc::ptr_eq(q, queue));
        }
        self.subscriptions.retain(|_, queues| !queues.is_empty());
    }

    /// True if any queue listens for `event`.
    #[must_use]
    pub fn is_registered(&self, event: &str) -> bool {
        self.subscriptions.contains_key(event)
    }

    /// Delivers `event` to every subscribed queue.
    ///
    /// # Returns
    ///
    /// Number of queues that accepted the event.
    pub fn send(&self, event: &Event) -> usize {
        let Some(queues) = self.subscriptions.get(&event.name) else {
            trace!(target: "photon::script", event = %event.name, "no subscribers");
            return 0;
        };
        queues.iter().filter(|q| q.push(event.clone())).count()
    }
}

impl Clone for EventInput {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl fmt::Debug for EventInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.subscriptions.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}

impl Reflect for EventInput {}

impl Component for EventInput {
    const NAME: &'static str = "event_input";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_fifo() {
        let queue = EventQueue::new(4);
        queue.push(Event::new("/a", EventData::Int(1)));
        queue.push(Event::new("/a", EventData::Int(2)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.poll().unwrap().data, EventData::Int(1));
        assert_eq!(queue.poll().unwrap().data, EventData::Int(2));
        assert!(queue.poll().is_none());
    }

    #[test]
    fn test_full_queue_drops_new_event() {
        let queue = EventQueue::new(2);
        assert!(queue.push(Event::new("/a", EventData::Int(1))));
        assert!(queue.push(Event::new("/a", EventData::Int(2))));
        assert!(!queue.push(Event::new("/a", EventData::Int(3))));
        assert_eq!(queue.poll().unwrap().data, EventData::Int(1));
        assert_eq!(queue.poll().unwrap().data, EventData::Int(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_send_fans_out_to_subscribers() {
        let a = EventQueue::new(8);
        let b = EventQueue::new(8);
        let mut input = EventInput::default();
        input.register("/ping", &a);
        input.register("/ping", &a);
        input.register("/ping", &b);

        assert_eq!(input.send(&Event::new("/ping", EventData::None)), 2);
        assert_eq!(input.send(&Event::new("/pong", EventData::None)), 0);
        assert_eq!(a.len(), 1);

        input.unregister(&a);
        assert_eq!(input.send(&Event::new("/ping", EventData::None)), 1);
        input.unregister(&b);
        assert!(!input.is_registered("/ping"));
    }

    #[test]
    fn test_clone_has_no_subscriptions() {
        let q = EventQueue::new(1);
        let mut input = EventInput::default();
        input.register("/x", &q);
        assert!(!input.clone().is_registered("/x"));
    }
}
