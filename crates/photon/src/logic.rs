//! # Logic System
//!
//! One logic tick:
//! 1. Register script event queues (`Write<Scripts, EventInput>`)
//! 2. Drain the input bridge into those queues (`Read<Name>, Write<EventInput>`)
//! 3. Run every script (WriteAll)
//!
//! Registering before draining means a script added this tick already sees
//! input posted for it this tick.

use std::sync::Arc;
use std::time::Duration;

use photon_core::script::TickStats;
use photon_core::{ScriptRunner, World};

use crate::events::{DrainStats, InputBridge};

/// What one logic tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogicStats {
    /// Input delivery.
    pub input: DrainStats,
    /// Script execution.
    pub scripts: TickStats,
}

/// Drives scripts and input delivery for one world.
#[derive(Debug)]
pub struct LogicSystem {
    runner: ScriptRunner,
    input: Arc<InputBridge>,
}

impl LogicSystem {
    /// Creates a logic system fed by `input`.
    #[must_use]
    pub fn new(runner: ScriptRunner, input: Arc<InputBridge>) -> Self {
        Self { runner, input }
    }

    /// The input bridge drained each tick.
    #[inline]
    #[must_use]
    pub fn input(&self) -> &Arc<InputBridge> {
        &self.input
    }

    /// Runs one tick of `interval`.
    pub fn tick(&self, world: &World, interval: Duration) -> LogicStats {
        let queues_created = self.runner.prepare(world);
        let input = self.input.drain(world);
        let scripts = ScriptRunner::run(world, interval);
        LogicStats {
            input,
            scripts: TickStats {
                queues_created,
                ..scripts
            },
        }
    }
}
