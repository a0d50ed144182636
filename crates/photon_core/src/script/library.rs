//! Script types and the process-wide script library.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::ecs::{Entity, EntityScope};
use crate::error::EcsResult;
use crate::meta::{Reflect, StructMetadata};
use crate::sync::Transaction;

use super::event::{Event, EventQueue};

/// Per-entity behavior, ticked once per logic frame.
///
/// The implementing type is the script's parameter struct: its reflected
/// fields are what scene data sets under `"parameters"`.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Default)]
/// struct Blink { rate: f32 }
///
/// impl Reflect for Blink {
///     fn fields() -> Vec<StructField<Self>> {
///         vec![StructField::<Self>::new("rate", |b| &b.rate, |b| &mut b.rate)]
///     }
/// }
///
/// impl Script for Blink {
///     const NAME: &'static str = "blink";
///
///     fn on_tick(&mut self, ctx: &mut ScriptContext<'_, '_>) {
///         // read and write components through ctx.txn
///     }
/// }
/// ```
pub trait Script: Reflect + Clone + Default {
    /// Library key.
    const NAME: &'static str;

    /// Event names this script receives. Scripts with none get no queue.
    const EVENTS: &'static [&'static str] = &[];

    /// Advances the script by one tick.
    fn on_tick(&mut self, ctx: &mut ScriptContext<'_, '_>);
}

/// What a script sees during [`Script::on_tick`].
pub struct ScriptContext<'a, 'w> {
    /// The tick's WriteAll transaction on the live world.
    pub txn: &'a mut Transaction<'w>,
    /// Entity owning the script.
    pub entity: Entity,
    /// Time since the previous tick.
    pub interval: Duration,
    events: Option<Arc<EventQueue>>,
}

impl<'a, 'w> ScriptContext<'a, 'w> {
    pub(crate) fn new(
        txn: &'a mut Transaction<'w>,
        entity: Entity,
        interval: Duration,
        events: Option<Arc<EventQueue>>,
    ) -> Self {
        Self {
            txn,
            entity,
            interval,
            events,
        }
    }

    /// Takes the oldest pending event for this script instance.
    #[inline]
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.as_ref()?.poll()
    }

    /// [`ScriptContext::interval`] in seconds.
    #[inline]
    #[must_use]
    pub fn interval_secs(&self) -> f64 {
        self.interval.as_secs_f64()
    }
}

// ============================================================================
// TYPE ERASURE
// ============================================================================

pub(crate) trait ScriptInstance: Send + Sync {
    fn clone_box(&self) -> Box<dyn ScriptInstance>;
    fn tick(&mut self, ctx: &mut ScriptContext<'_, '_>);
    fn load(&mut self, src: &Value) -> EcsResult<()>;
    fn save(&self) -> Value;
    fn set_scope(&mut self, scope: &EntityScope);
    fn equals(&self, other: &dyn ScriptInstance) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Instance<S>(S);

impl<S: Script> ScriptInstance for Instance<S> {
    fn clone_box(&self) -> Box<dyn ScriptInstance> {
        Box::new(Self(self.0.clone()))
    }

    fn tick(&mut self, ctx: &mut ScriptContext<'_, '_>) {
        self.0.on_tick(ctx);
    }

    fn load(&mut self, src: &Value) -> EcsResult<()> {
        StructMetadata::<S>::of().load(&mut self.0, src)
    }

    fn save(&self) -> Value {
        StructMetadata::<S>::of().save(&self.0, Some(&S::default()))
    }

    fn set_scope(&mut self, scope: &EntityScope) {
        StructMetadata::<S>::of().set_scope(&mut self.0, scope);
    }

    fn equals(&self, other: &dyn ScriptInstance) -> bool {
        other
            .as_any()
            .downcast_ref::<S>()
            .is_some_and(|other| StructMetadata::<S>::of().compare(&self.0, other))
    }

    fn as_any(&self) -> &dyn Any {
        &self.0
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        &mut self.0
    }
}

pub(crate) fn instance_of<S: Script>(params: S) -> Box<dyn ScriptInstance> {
    Box::new(Instance(params))
}

// ============================================================================
// LIBRARY
// ============================================================================

/// A registered script type.
#[derive(Clone, Copy)]
pub struct ScriptDefinition {
    name: &'static str,
    events: &'static [&'static str],
    create: fn() -> Box<dyn ScriptInstance>,
}

impl ScriptDefinition {
    /// The definition of `S`.
    #[must_use]
    pub fn of<S: Script>() -> Self {
        Self {
            name: S::NAME,
            events: S::EVENTS,
            create: || instance_of(S::default()),
        }
    }

    /// Library key.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Event subscriptions.
    #[inline]
    #[must_use]
    pub const fn events(&self) -> &'static [&'static str] {
        self.events
    }

    pub(crate) fn instantiate(&self) -> Box<dyn ScriptInstance> {
        (self.create)()
    }
}

impl fmt::Debug for ScriptDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptDefinition")
            .field("name", &self.name)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

static LIBRARY: OnceLock<RwLock<HashMap<&'static str, ScriptDefinition>>> = OnceLock::new();

/// Process-wide table of script types, keyed by name.
///
/// Scene data refers to scripts by name only; registering a type here is what
/// makes it loadable.
pub struct ScriptLibrary;

impl ScriptLibrary {
    fn scripts() -> &'static RwLock<HashMap<&'static str, ScriptDefinition>> {
        LIBRARY.get_or_init(|| RwLock::new(HashMap::new()))
    }

    /// Registers `S` under [`Script::NAME`], replacing any previous entry.
    pub fn register<S: Script>() {
        let definition = ScriptDefinition::of::<S>();
        Self::scripts().write().insert(S::NAME, definition);
        debug!(target: "photon::script", script = S::NAME, events = ?S::EVENTS, "script registered");
    }

    /// Looks up a script by name.
    #[must_use]
    pub fn get(name: &str) -> Option<ScriptDefinition> {
        Self::scripts().read().get(name).copied()
    }

    /// True if `name` is registered.
    #[must_use]
    pub fn contains(name: &str) -> bool {
        Self::scripts().read().contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        let mut names: Vec<_> = Self::scripts().read().keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::StructField;

    #[derive(Clone, Default)]
    struct Counter {
        step: u32,
        seen: u32,
    }

    impl Reflect for Counter {
        fn fields() -> Vec<StructField<Self>> {
            vec![StructField::<Self>::new("step", |c| &c.step, |c| &mut c.step)]
        }
    }

    impl Script for Counter {
        const NAME: &'static str = "test_counter";
        const EVENTS: &'static [&'static str] = &["/count"];

        fn on_tick(&mut self, _ctx: &mut ScriptContext<'_, '_>) {
            self.seen += self.step;
        }
    }

    #[test]
    fn test_register_and_lookup() {
        ScriptLibrary::register::<Counter>();
        let def = ScriptLibrary::get("test_counter").unwrap();
        assert_eq!(def.name(), "test_counter");
        assert_eq!(def.events(), &["/count"]);
        assert!(ScriptLibrary::names().contains(&"test_counter"));
        assert!(ScriptLibrary::get("no_such_script").is_none());
    }

    #[test]
    fn test_instance_load_save_compare() {
        let mut a = ScriptDefinition::of::<Counter>().instantiate();
        a.load(&serde_json::json!({ "step": 3 })).unwrap();
        assert_eq!(a.save(), serde_json::json!({ "step": 3 }));

        let b = a.clone_box();
        assert!(a.equals(b.as_ref()));
        assert_eq!(a.as_any().downcast_ref::<Counter>().unwrap().step, 3);
    }
}
