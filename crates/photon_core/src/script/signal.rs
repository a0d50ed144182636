//! # Signals
//!
//! Named scalar outputs of an entity. Scripts publish state as signals and
//! read each other's through a [`SignalRef`].

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::trace;

use crate::ecs::{Component, Entity, EntityRef, EntityScope};
use crate::error::{EcsError, EcsResult};
use crate::meta::{FieldType, Reflect, StructField};
use crate::sync::Transaction;

/// Signal values of one entity, keyed by signal name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignalOutput {
    /// Current values.
    pub signals: BTreeMap<String, f64>,
}

impl SignalOutput {
    /// Value of `name`, if set.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.signals.get(name).copied()
    }

    /// Sets `name` to `value`.
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.signals.insert(name.into(), value);
    }

    /// Unsets `name`.
    pub fn clear(&mut self, name: &str) -> Option<f64> {
        self.signals.remove(name)
    }
}

impl Reflect for SignalOutput {
    fn fields() -> Vec<StructField<Self>> {
        vec![StructField::<Self>::new("", |s| &s.signals, |s| &mut s.signals)]
    }
}

impl Component for SignalOutput {
    const NAME: &'static str = "signal_output";
}

#[derive(Clone, PartialEq)]
enum SignalTarget {
    Handle(Entity),
    Named(EntityRef),
}

/// One signal of one entity.
///
/// Written in data as `"<entity name>/<signal>"`.
#[derive(Clone, PartialEq)]
pub struct SignalRef {
    target: SignalTarget,
    signal: String,
}

impl Default for SignalRef {
    fn default() -> Self {
        Self {
            target: SignalTarget::Named(EntityRef::NULL),
            signal: String::new(),
        }
    }
}

impl SignalRef {
    /// A signal of a known entity handle.
    #[must_use]
    pub fn new(entity: Entity, signal: impl Into<String>) -> Self {
        Self {
            target: SignalTarget::Handle(entity),
            signal: signal.into(),
        }
    }

    /// A signal of a named entity, resolved on every access.
    #[must_use]
    pub fn named(entity: EntityRef, signal: impl Into<String>) -> Self {
        Self {
            target: SignalTarget::Named(entity),
            signal: signal.into(),
        }
    }

    /// Parses `"<entity>/<signal>"` against `scope`.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidName`] if the separator is missing or the entity
    /// part is malformed.
    pub fn parse(text: &str, scope: &EntityScope) -> EcsResult<Self> {
        let Some((entity, signal)) = text.rsplit_once('/') else {
            return Err(EcsError::InvalidName {
                name: text.to_owned(),
                reason: "signal references are written `entity/signal`",
            });
        };
        if signal.is_empty() {
            return Err(EcsError::InvalidName {
                name: text.to_owned(),
                reason: "empty signal name",
            });
        }
        Ok(Self::named(EntityRef::parse(entity, scope)?, signal))
    }

    /// The signal name.
    #[inline]
    #[must_use]
    pub fn signal(&self) -> &str {
        &self.signal
    }

    /// The entity the signal belongs to in this transaction's world.
    #[must_use]
    pub fn entity(&self, txn: &Transaction<'_>) -> Entity {
        match &self.target {
            SignalTarget::Handle(e) => *e,
            SignalTarget::Named(r) => r.get(txn),
        }
    }

    /// The signal's value, if the entity exists and has set it.
    ///
    /// # Panics
    ///
    /// Requires Read on [`SignalOutput`], and on [`crate::ecs::Name`] for
    /// named targets.
    #[track_caller]
    #[must_use]
    pub fn value(&self, txn: &Transaction<'_>) -> Option<f64> {
        let e = self.entity(txn);
        txn.get::<SignalOutput>(e)?.get(&self.signal)
    }

    /// The signal's value, or zero.
    #[track_caller]
    #[must_use]
    pub fn get_signal(&self, txn: &Transaction<'_>) -> f64 {
        self.value(txn).unwrap_or(0.0)
    }

    /// Sets the signal.
    ///
    /// Adds a [`SignalOutput`] to the entity if it has none and the
    /// transaction may add components.
    ///
    /// # Returns
    ///
    /// False if the entity does not exist or cannot hold the signal.
    ///
    /// # Panics
    ///
    /// Requires Write on [`SignalOutput`].
    #[track_caller]
    pub fn set_value(&self, txn: &mut Transaction<'_>, value: f64) -> bool {
        let e = self.entity(txn);
        if let Some(output) = txn.get_mut::<SignalOutput>(e) {
            output.set(self.signal.as_str(), value);
            return true;
        }

        if !txn.valid(e) || !txn.permissions().can_add_remove() {
            trace!(target: "photon::script", signal = %self, "signal not set, no output on entity");
            return false;
        }
        let mut output = SignalOutput::default();
        output.set(self.signal.as_str(), value);
        txn.add(e, output).is_ok()
    }
}

impl fmt::Debug for SignalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignalRef({self})")
    }
}

impl fmt::Display for SignalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            SignalTarget::Handle(e) => write!(f, "{e}/{}", self.signal),
            SignalTarget::Named(r) => write!(f, "{r}/{}", self.signal),
        }
    }
}

impl FieldType for SignalRef {
    fn load_field(&mut self, src: &Value) -> Result<(), String> {
        match src {
            Value::Null => *self = Self::default(),
            Value::String(text) => {
                *self = Self::parse(text, &EntityScope::default()).map_err(|e| e.to_string())?;
            }
            other => return Err(format!("expected `entity/signal`, found {other}")),
        }
        Ok(())
    }

    fn save_field(&self) -> Value {
        match &self.target {
            SignalTarget::Named(r) if !r.is_null() => Value::String(self.to_string()),
            _ => Value::Null,
        }
    }

    fn set_scope(&mut self, scope: &EntityScope) {
        if let SignalTarget::Named(r) = &mut self.target {
            r.set_scope(scope);
        }
    }
}
