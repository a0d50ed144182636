//! Per-thread record of open transactions.
//!
//! Parking-lot locks do not know their owner, so a thread that asks for a
//! lock it already holds incompatibly would deadlock silently. Every
//! transaction registers here before blocking; incompatible nesting and
//! acquisition against the world order are turned into fatal errors instead.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ecs::{World, WorldKind};
use crate::error::{fatal, EcsError};

use super::access::Permissions;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

struct Held {
    serial: u64,
    world_id: u64,
    kind: WorldKind,
    permissions: Permissions,
}

thread_local! {
    static HELD: RefCell<Vec<Held>> = const { RefCell::new(Vec::new()) };
}

/// Registration handle returned by [`enter`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ticket {
    pub serial: u64,
    /// True if this thread already has a transaction open on the same world.
    pub nested: bool,
}

/// Records a transaction about to acquire locks on `world`.
///
/// # Panics
///
/// Panics if the thread already has a transaction open on `world` and the
/// new one asks for more than a shared re-read of types held read-only, or if
/// it holds a transaction on a world that orders after `world`. Worlds order
/// by kind (staging before live), then by creation.
#[track_caller]
pub(crate) fn enter(world: &World, permissions: &Permissions) -> Ticket {
    let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
    let mut violation = None;
    let mut nested = false;

    HELD.with(|held| {
        let mut held = held.borrow_mut();
        let rank = (world.kind(), world.id());
        if let Some(open) = held.iter().find(|open| (open.kind, open.world_id) > rank) {
            violation = Some(EcsError::LockOrder(format!(
                "{:?} world #{} locked while a transaction on {:?} world #{} is open on this thread",
                world.kind(),
                world.id(),
                open.kind,
                open.world_id
            )));
        } else {
            let mut same_world = held.iter().filter(|open| open.world_id == world.id()).peekable();
            if same_world.peek().is_some() {
                nested = true;
                // Re-entry is limited to types this thread already holds shared.
                if !same_world.any(|open| permissions.is_shared_subset_of(&open.permissions)) {
                    violation = Some(EcsError::RecursiveLock(format!(
                        "{:?} world: {:?} requested while another transaction is open on this thread",
                        world.kind(),
                        permissions,
                    )));
                }
            }
        }

        if violation.is_none() {
            held.push(Held {
                serial,
                world_id: world.id(),
                kind: world.kind(),
                permissions: permissions.clone(),
            });
        }
    });

    if let Some(err) = violation {
        fatal(err);
    }
    Ticket { serial, nested }
}

/// Removes the record for a closed transaction.
pub(crate) fn exit(serial: u64) {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        if let Some(pos) = held.iter().rposition(|h| h.serial == serial) {
            held.remove(pos);
        }
    });
}

/// Number of transactions open on the calling thread.
#[must_use]
pub fn open_transactions() -> usize {
    HELD.with(|held| held.borrow().len())
}
