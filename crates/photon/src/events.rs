//! # Input Bridge
//!
//! Input devices run on their own threads and never touch the world. They
//! push `(target, event)` pairs into a bounded channel; the logic thread
//! drains it once per tick into the targets' [`EventInput`] components.
//!
//! ```text
//! ┌─────────────┐      ┌─────────────┐      ┌──────────────────────┐
//! │   Input     │─────>│   Bridge    │─────>│ Logic thread         │
//! │  (any thd)  │      │  (bounded)  │      │ Write<EventInput>    │
//! └─────────────┘      └─────────────┘      └──────────────────────┘
//! ```

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use photon_core::{Access, Event, EventInput, Name, World};
use tracing::{debug, trace, warn};

/// An event waiting for delivery to a named entity.
#[derive(Clone, Debug, PartialEq)]
pub struct InputEvent {
    /// Fully qualified name of the receiving entity.
    pub target: Name,
    /// The event.
    pub event: Event,
}

/// Cloneable producer end of an [`InputBridge`].
#[derive(Clone, Debug)]
pub struct InputSender {
    sender: Sender<InputEvent>,
}

impl InputSender {
    /// Queues `event` for `target`.
    ///
    /// # Returns
    ///
    /// False if the bridge was full and the event was dropped.
    pub fn send(&self, target: Name, event: Event) -> bool {
        match self.sender.try_send(InputEvent { target, event }) {
            Ok(()) => true,
            Err(TrySendError::Full(input)) => {
                warn!(
                    target: "photon::input",
                    entity = %input.target,
                    event = %input.event.name,
                    "input bridge full, dropping event"
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// What one drain delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Events taken off the bridge.
    pub received: usize,
    /// Queue deliveries (one event may reach several queues).
    pub delivered: usize,
    /// Events whose target did not exist or had no [`EventInput`].
    pub unmatched: usize,
}

/// Bounded channel between input threads and the logic thread.
#[derive(Debug)]
pub struct InputBridge {
    sender: Sender<InputEvent>,
    receiver: Receiver<InputEvent>,
}

impl InputBridge {
    /// Creates a bridge holding at most `capacity` pending events.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Events in flight before new ones are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// A producer handle for an input thread.
    #[must_use]
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Queues `event` for `target` from the owning thread.
    pub fn send(&self, target: Name, event: Event) -> bool {
        self.sender().send(target, event)
    }

    /// Number of undelivered events.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Delivers every pending event under `Read<Name>, Write<EventInput>`.
    ///
    /// The channel is emptied before the transaction opens, so producers
    /// never wait on world locks.
    pub fn drain(&self, world: &World) -> DrainStats {
        let batch: Vec<InputEvent> = self.receiver.try_iter().collect();
        let mut stats = DrainStats {
            received: batch.len(),
            ..DrainStats::default()
        };
        if batch.is_empty() {
            return stats;
        }

        let txn = world.transaction(Access::new().read::<Name>().write::<EventInput>());
        for input in batch {
            let e = txn.find_named(&input.target);
            let Some(queues) = txn.get::<EventInput>(e) else {
                trace!(target: "photon::input", entity = %input.target, event = %input.event.name, "no receiver");
                stats.unmatched += 1;
                continue;
            };
            stats.delivered += queues.send(&input.event);
        }

        debug!(
            target: "photon::input",
            received = stats.received,
            delivered = stats.delivered,
            unmatched = stats.unmatched,
            "input drained"
        );
        stats
    }
}
