//! The per-tick script driver.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::ecs::World;
use crate::sync::Access;

use super::event::{EventInput, DEFAULT_QUEUE_CAPACITY};
use super::state::Scripts;

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Entities whose scripts ran.
    pub entities: usize,
    /// Script instances ticked.
    pub scripts: usize,
    /// Event queues created during preparation.
    pub queues_created: usize,
}

/// Runs every script of a world once per call to [`ScriptRunner::tick`].
#[derive(Clone, Copy, Debug)]
pub struct ScriptRunner {
    queue_capacity: usize,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ScriptRunner {
    /// A runner whose event queues hold `queue_capacity` events.
    #[must_use]
    pub const fn new(queue_capacity: usize) -> Self {
        Self { queue_capacity }
    }

    /// Capacity of newly created queues.
    #[inline]
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Phase 1 and phase 2 back to back.
    pub fn tick(&self, world: &World, interval: Duration) -> TickStats {
        let queues_created = self.prepare(world);
        let stats = Self::run(world, interval);
        TickStats {
            queues_created,
            ..stats
        }
    }

    /// Phase 1, under `Write<Scripts, EventInput>`: gives every subscribing
    /// script a queue and registers it in its entity's [`EventInput`].
    ///
    /// Registration is repeated every tick, so scripts created by a scene
    /// merge subscribe before the next events arrive. Re-registering an
    /// existing queue is a no-op.
    ///
    /// # Returns
    ///
    /// Number of queues created.
    pub fn prepare(&self, world: &World) -> usize {
        let mut txn = world.transaction(Access::new().write::<Scripts>().write::<EventInput>());
        let mut created = 0;

        for e in txn.entities_with::<Scripts>() {
            let mut subscriptions = Vec::new();
            if let Some(scripts) = txn.get_mut::<Scripts>(e) {
                for state in scripts.iter_mut() {
                    if state.events().is_empty() {
                        continue;
                    }
                    let (queue, fresh) = state.ensure_queue(self.queue_capacity);
                    created += usize::from(fresh);
                    subscriptions.extend(state.events().iter().map(|event| (*event, Arc::clone(&queue))));
                }
            }
            if subscriptions.is_empty() {
                continue;
            }

            match txn.get_mut::<EventInput>(e) {
                Some(input) => {
                    for (event, queue) in &subscriptions {
                        input.register(event, queue);
                    }
                }
                None => debug!(
                    target: "photon::script",
                    entity = %e,
                    "scripts subscribe to events but the entity has no event_input"
                ),
            }
        }
        created
    }

    /// Phase 2, under WriteAll: calls `on_tick` on every script instance.
    ///
    /// While an entity's scripts run, its own [`Scripts`] component reads
    /// as empty.
    pub fn run(world: &World, interval: Duration) -> TickStats {
        let mut txn = world.transaction(Access::write_all());
        let mut stats = TickStats::default();

        for e in txn.entities_with::<Scripts>() {
            let Some(mut scripts) = txn.get_mut::<Scripts>(e).map(std::mem::take) else {
                continue;
            };
            for state in scripts.iter_mut() {
                state.tick(&mut txn, e, interval);
                stats.scripts += 1;
            }
            if let Some(slot) = txn.get_mut::<Scripts>(e) {
                *slot = scripts;
            }
            stats.entities += 1;
        }

        trace!(
            target: "photon::script",
            entities = stats.entities,
            scripts = stats.scripts,
            "scripts ticked"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{ComponentRegistry, WorldKind};
    use crate::meta::{Reflect, StructField};
    use crate::script::{Event, EventData, Script, ScriptContext, SignalOutput, SignalRef};

    #[derive(Clone, Default)]
    struct Tally {
        ticks: u32,
    }

    impl Reflect for Tally {
        fn fields() -> Vec<StructField<Self>> {
            vec![StructField::<Self>::new("ticks", |t| &t.ticks, |t| &mut t.ticks)]
        }
    }

    impl Script for Tally {
        const NAME: &'static str = "test_tally";
        const EVENTS: &'static [&'static str] = &["/tally/add"];

        fn on_tick(&mut self, ctx: &mut ScriptContext<'_, '_>) {
            self.ticks += 1;
            let mut received = 0.0;
            while let Some(event) = ctx.poll_event() {
                if let EventData::Double(v) = event.data {
                    received += v;
                }
            }
            let total = SignalRef::new(ctx.entity, "total");
            let sum = total.get_signal(ctx.txn) + received;
            total.set_value(ctx.txn, sum);
        }
    }

    fn setup() -> (World, crate::ecs::Entity) {
        let world = World::new(WorldKind::Live, ComponentRegistry::builder().build());
        let e = {
            let mut txn = world.transaction(Access::add_remove_all());
            let e = txn.new_entity();
            let mut scripts = Scripts::default();
            scripts.add(Tally::default());
            txn.add(e, scripts).unwrap();
            txn.add(e, EventInput::default()).unwrap();
            txn.add(e, SignalOutput::default()).unwrap();
            e
        };
        (world, e)
    }

    #[test]
    fn test_prepare_creates_queue_once() {
        let (world, e) = setup();
        let runner = ScriptRunner::new(8);
        assert_eq!(runner.prepare(&world), 1);
        assert_eq!(runner.prepare(&world), 0);

        let txn = world.transaction(Access::new().read::<EventInput>());
        assert!(txn.get::<EventInput>(e).unwrap().is_registered("/tally/add"));
    }

    #[test]
    fn test_tick_runs_and_delivers_events() {
        let (world, e) = setup();
        let runner = ScriptRunner::new(8);
        runner.prepare(&world);

        {
            let txn = world.transaction(Access::new().read::<EventInput>());
            let input = txn.get::<EventInput>(e).unwrap();
            assert_eq!(input.send(&Event::new("/tally/add", EventData::Double(2.0))), 1);
            assert_eq!(input.send(&Event::new("/tally/add", EventData::Double(3.0))), 1);
        }

        let stats = runner.tick(&world, Duration::from_millis(8));
        assert_eq!(stats, TickStats { entities: 1, scripts: 1, queues_created: 0 });
        runner.tick(&world, Duration::from_millis(8));

        let txn = world.transaction(Access::new().read::<Scripts>().read::<SignalOutput>());
        assert_eq!(txn.get::<SignalOutput>(e).unwrap().get("total"), Some(5.0));
        assert_eq!(txn.get::<Scripts>(e).unwrap().find::<Tally>().unwrap().ticks, 2);
    }
}
