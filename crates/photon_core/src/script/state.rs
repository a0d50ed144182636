//! Script instances attached to entities.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::warn;

use crate::ecs::{Component, Entity, EntityScope};
use crate::error::{EcsError, EcsResult};
use crate::meta::Reflect;
use crate::sync::Transaction;

use super::event::EventQueue;
use super::library::{instance_of, Script, ScriptContext, ScriptDefinition, ScriptInstance, ScriptLibrary};

/// One script instance: its parameters and, if it subscribes to events, its
/// queue.
///
/// A clone copies the parameters but not the queue. Queues belong to the
/// world that registered them.
pub struct ScriptState {
    definition: ScriptDefinition,
    instance: Box<dyn ScriptInstance>,
    queue: Option<Arc<EventQueue>>,
}

impl ScriptState {
    /// An instance of `S` with the given parameters.
    #[must_use]
    pub fn new<S: Script>(params: S) -> Self {
        Self {
            definition: ScriptDefinition::of::<S>(),
            instance: instance_of(params),
            queue: None,
        }
    }

    /// A default instance of the library script `name`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownScript`] if `name` is not registered.
    pub fn from_library(name: &str) -> EcsResult<Self> {
        let definition = ScriptLibrary::get(name).ok_or_else(|| EcsError::UnknownScript(name.to_owned()))?;
        Ok(Self {
            instance: definition.instantiate(),
            definition,
            queue: None,
        })
    }

    /// Script name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.definition.name()
    }

    /// Event subscriptions.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &'static [&'static str] {
        self.definition.events()
    }

    /// The parameters, if this is an instance of `S`.
    #[must_use]
    pub fn params<S: Script>(&self) -> Option<&S> {
        self.instance.as_any().downcast_ref()
    }

    /// The parameters mutably, if this is an instance of `S`.
    pub fn params_mut<S: Script>(&mut self) -> Option<&mut S> {
        self.instance.as_any_mut().downcast_mut()
    }

    /// The event queue, once the runner has created it.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> Option<&Arc<EventQueue>> {
        self.queue.as_ref()
    }

    /// Returns the queue, creating it with `capacity` if missing. The flag is
    /// true when the queue was created by this call.
    pub(crate) fn ensure_queue(&mut self, capacity: usize) -> (Arc<EventQueue>, bool) {
        match &self.queue {
            Some(queue) => (Arc::clone(queue), false),
            None => {
                let queue = EventQueue::new(capacity);
                self.queue = Some(Arc::clone(&queue));
                (queue, true)
            }
        }
    }

    pub(crate) fn take_queue(&mut self) -> Option<Arc<EventQueue>> {
        self.queue.take()
    }

    pub(crate) fn adopt_queue(&mut self, queue: Arc<EventQueue>) {
        self.queue = Some(queue);
    }

    pub(crate) fn tick(&mut self, txn: &mut Transaction<'_>, entity: Entity, interval: Duration) {
        let mut ctx = ScriptContext::new(txn, entity, interval, self.queue.clone());
        self.instance.tick(&mut ctx);
    }

    fn load_params(&mut self, src: &Value) -> EcsResult<()> {
        self.instance.load(src)
    }

    fn save(&self) -> Value {
        let mut out = Map::new();
        out.insert("name".to_owned(), Value::String(self.name().to_owned()));
        let params = self.instance.save();
        if params.as_object().map_or(true, |p| !p.is_empty()) {
            out.insert("parameters".to_owned(), params);
        }
        Value::Object(out)
    }
}

impl Clone for ScriptState {
    fn clone(&self) -> Self {
        Self {
            definition: self.definition,
            instance: self.instance.clone_box(),
            queue: None,
        }
    }
}

impl PartialEq for ScriptState {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name() && self.instance.equals(other.instance.as_ref())
    }
}

impl fmt::Debug for ScriptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptState")
            .field("name", &self.name())
            .field("params", &self.instance.save())
            .field("queue", &self.queue)
            .finish()
    }
}

// ============================================================================
// SCRIPTS COMPONENT
// ============================================================================

/// The scripts attached to an entity.
///
/// Scene data is a list: `[ { "name": "flashlight", "parameters": { ... } } ]`.
/// Unknown script names are skipped with a warning.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scripts {
    scripts: Vec<ScriptState>,
}

impl Scripts {
    /// Appends an instance of `S`.
    pub fn add<S: Script>(&mut self, params: S) -> &mut ScriptState {
        self.push(ScriptState::new(params))
    }

    /// Appends a default instance of the library script `name`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownScript`] if `name` is not registered.
    pub fn add_named(&mut self, name: &str) -> EcsResult<&mut ScriptState> {
        ScriptState::from_library(name).map(|state| self.push(state))
    }

    fn push(&mut self, state: ScriptState) -> &mut ScriptState {
        self.scripts.push(state);
        let last = self.scripts.len() - 1;
        &mut self.scripts[last]
    }

    /// Number of instances.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// True if no scripts are attached.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Iterates the instances in attachment order.
    pub fn iter(&self) -> impl Iterator<Item = &ScriptState> {
        self.scripts.iter()
    }

    /// Iterates the instances mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ScriptState> {
        self.scripts.iter_mut()
    }

    /// Parameters of the first instance of `S`.
    #[must_use]
    pub fn find<S: Script>(&self) -> Option<&S> {
        self.scripts.iter().find_map(ScriptState::params::<S>)
    }
}

impl Reflect for Scripts {
    fn load_extra(&mut self, src: &Value) -> EcsResult<()> {
        let Value::Array(items) = src else {
            return Err(EcsError::FieldLoad {
                field: Self::NAME.to_owned(),
                reason: format!("expected a list of scripts, found {src}"),
            });
        };

        let mut loaded = Vec::with_capacity(items.len());
        for item in items {
            let Some(name) = item.get("name").and_then(Value::as_str) else {
                warn!(target: "photon::script", entry = %item, "script entry without a name, skipped");
                continue;
            };
            let mut state = match ScriptState::from_library(name) {
                Ok(state) => state,
                Err(err) => {
                    warn!(target: "photon::script", error = %err, "script skipped");
                    continue;
                }
            };
            if let Some(params) = item.get("parameters") {
                if let Err(err) = state.load_params(params) {
                    warn!(target: "photon::script", script = name, error = %err, "parameters rejected, using defaults");
                }
            }
            loaded.push(state);
        }

        self.scripts = loaded;
        Ok(())
    }

    fn save_extra(&self, dst: &mut Value) {
        *dst = Value::Array(self.scripts.iter().map(ScriptState::save).collect());
    }

    fn compare_extra(&self, other: &Self) -> bool {
        self.scripts == other.scripts
    }

    fn set_scope_extra(&mut self, scope: &EntityScope) {
        for state in &mut self.scripts {
            state.instance.set_scope(scope);
        }
    }
}

impl Component for Scripts {
    const NAME: &'static str = "scripts";
}
