//! # Synchronization
//!
//! The lock manager. Threads never touch a [`World`](crate::ecs::World)
//! directly; they describe what they need with an [`Access`] and receive a
//! [`Transaction`] once every lock is held.

mod access;
mod held;
mod transaction;

pub use access::{Access, AccessMode, Permissions};
pub use held::open_transactions;
pub use transaction::{Transaction, TransactionState};
