//! # Scripts, Events and Signals
//!
//! Scripts are per-entity behaviors stored in the [`Scripts`] component and
//! ticked once per logic frame by a [`ScriptRunner`], in two phases:
//!
//! 1. Under `Write<Scripts, EventInput>`, every script that subscribes to
//!    events gets a bounded queue registered in its entity's [`EventInput`].
//! 2. Under WriteAll, every script's [`Script::on_tick`] runs with the
//!    transaction, its entity, the tick interval and its queue.
//!
//! Within a tick the order across entities is unspecified. A script only
//! depends on world state, its own events and the interval.

mod builtin;
mod event;
mod library;
mod runner;
mod signal;
mod state;

pub use builtin::{
    register_builtin_scripts, Flashlight, LightSensorScript, Sun, FLASHLIGHT_GRAB, FLASHLIGHT_TOGGLE,
};
pub use event::{Event, EventData, EventInput, EventQueue, DEFAULT_QUEUE_CAPACITY};
pub use library::{Script, ScriptContext, ScriptDefinition, ScriptLibrary};
pub use runner::{ScriptRunner, TickStats};
pub use signal::{SignalOutput, SignalRef};
pub use state::{ScriptState, Scripts};
