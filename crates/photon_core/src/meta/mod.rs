//! # Field Metadata
//!
//! Per-type reflection tables used to load components and script parameters
//! from scene data, save them back, compare them, and rewrite relative entity
//! names when a value is moved into a different scene scope.
//!
//! A [`StructField<T>`] is built from a pair of accessor functions, never from
//! byte offsets:
//!
//! ```rust,ignore
//! impl Reflect for Light {
//!     fn fields() -> Vec<StructField<Self>> {
//!         vec![
//!             StructField::<Self>::new("intensity", |l| &l.intensity, |l| &mut l.intensity),
//!             StructField::<Self>::new("on", |l| &l.on, |l| &mut l.on),
//!         ]
//!     }
//! }
//! ```
//!
//! A field with an empty name maps to the *whole* value of the component key,
//! so `"name": "door"` or a `transform` object whose keys belong to a nested
//! struct can be expressed without an extra level of nesting.

mod field;

use std::any::type_name;
use std::fmt;
use std::ops::BitOr;

use serde_json::{Map, Value};

use crate::ecs::EntityScope;
use crate::error::{EcsError, EcsResult};

pub use field::FieldType;

// ============================================================================
// FIELD ACTIONS
// ============================================================================

/// Which automatic operations a field takes part in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldAction(u8);

impl FieldAction {
    /// The field is read by [`StructMetadata::load`].
    pub const LOAD: Self = Self(1);
    /// The field is written by [`StructMetadata::save`].
    pub const SAVE: Self = Self(1 << 1);
    /// The field is both loaded and saved.
    pub const DEFAULT: Self = Self(Self::LOAD.0 | Self::SAVE.0);

    /// Returns true if all bits of `other` are set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FieldAction {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ============================================================================
// STRUCT FIELD
// ============================================================================

trait FieldOps<T>: Send + Sync {
    fn load(&self, dst: &mut T, src: &Value) -> Result<(), String>;
    fn save(&self, src: &T) -> Value;
    fn equals(&self, a: &T, b: &T) -> bool;
    fn set_scope(&self, dst: &mut T, scope: &EntityScope);
}

struct Accessor<T, F> {
    get: fn(&T) -> &F,
    get_mut: fn(&mut T) -> &mut F,
}

impl<T: 'static, F: FieldType> FieldOps<T> for Accessor<T, F> {
    fn load(&self, dst: &mut T, src: &Value) -> Result<(), String> {
        (self.get_mut)(dst).load_field(src)
    }

    fn save(&self, src: &T) -> Value {
        (self.get)(src).save_field()
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        (self.get)(a) == (self.get)(b)
    }

    fn set_scope(&self, dst: &mut T, scope: &EntityScope) {
        (self.get_mut)(dst).set_scope(scope);
    }
}

/// One reflected field of `T`.
pub struct StructField<T> {
    name: &'static str,
    type_name: &'static str,
    actions: FieldAction,
    ops: Box<dyn FieldOps<T>>,
}

impl<T: 'static> StructField<T> {
    /// Creates a field from its accessors.
    ///
    /// # Arguments
    ///
    /// * `name` - Key in structured data; empty for the whole value
    /// * `get` - Shared accessor
    /// * `get_mut` - Mutable accessor
    #[must_use]
    pub fn new<F: FieldType>(
        name: &'static str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        Self {
            name,
            type_name: type_name::<F>(),
            actions: FieldAction::DEFAULT,
            ops: Box::new(Accessor { get, get_mut }),
        }
    }

    /// Restricts the automatic operations for this field.
    #[must_use]
    pub fn with_actions(mut self, actions: FieldAction) -> Self {
        self.actions = actions;
        self
    }

    /// Key in structured data. Empty for a whole-value field.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type name of the field, used in diagnostics.
    #[inline]
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Automatic operations enabled for this field.
    #[inline]
    #[must_use]
    pub const fn actions(&self) -> FieldAction {
        self.actions
    }
}

impl<T> fmt::Debug for StructField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructField")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// REFLECT
// ============================================================================

/// Types that expose a field table.
///
/// The `*_extra` hooks run after the field table and cover data that has no
/// plain field representation (script lists, for instance).
pub trait Reflect: Sized + Send + Sync + 'static {
    /// Returns the field table. Called once per metadata instance.
    #[must_use]
    fn fields() -> Vec<StructField<Self>> {
        Vec::new()
    }

    /// Loads data not covered by [`Reflect::fields`].
    ///
    /// # Errors
    ///
    /// Returns an error if `src` cannot be represented at all.
    fn load_extra(&mut self, _src: &Value) -> EcsResult<()> {
        Ok(())
    }

    /// Saves data not covered by [`Reflect::fields`] into `dst`.
    fn save_extra(&self, _dst: &mut Value) {}

    /// Compares data not covered by [`Reflect::fields`].
    fn compare_extra(&self, _other: &Self) -> bool {
        true
    }

    /// Applies a scene scope to data not covered by [`Reflect::fields`].
    fn set_scope_extra(&mut self, _scope: &EntityScope) {}
}

// ============================================================================
// STRUCT METADATA
// ============================================================================

/// Reflection table for `T`.
pub struct StructMetadata<T> {
    type_name: &'static str,
    fields: Vec<StructField<T>>,
}

impl<T: Reflect> StructMetadata<T> {
    /// Builds the table from `T`'s field list.
    #[must_use]
    pub fn of() -> Self {
        Self {
            type_name: type_name::<T>(),
            fields: T::fields(),
        }
    }

    /// Rust type name of `T`.
    #[inline]
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// All fields in declaration order.
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[StructField<T>] {
        &self.fields
    }

    /// Looks up a field by key.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&StructField<T>> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Loads `src` into `dst`.
    ///
    /// Missing keys leave the current value alone. A key whose value has the
    /// wrong shape logs a warning and keeps the current value; loading carries
    /// on with the remaining fields.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::FieldLoad`] if `T` has named fields and `src` is not
    /// an object, or if [`Reflect::load_extra`] rejects the data.
    pub fn load(&self, dst: &mut T, src: &Value) -> EcsResult<()> {
        let has_named = self.fields.iter().any(|f| !f.name.is_empty());
        let has_whole = self.fields.iter().any(|f| f.name.is_empty());
        if has_named && !has_whole && !src.is_object() {
            return Err(EcsError::FieldLoad {
                field: self.type_name.to_owned(),
                reason: format!("expected an object, found {src}"),
            });
        }

        for field in &self.fields {
            if !field.actions.contains(FieldAction::LOAD) {
                continue;
            }
            let value = if field.name.is_empty() {
                Some(src)
            } else {
                src.get(field.name)
            };
            let Some(value) = value else { continue };

            if let Err(reason) = field.ops.load(dst, value) {
                tracing::warn!(
                    target: "photon::meta",
                    component = self.type_name,
                    field = field.name,
                    %reason,
                    "invalid field value, keeping default"
                );
            }
        }

        dst.load_extra(src)
    }

    /// Saves `src` as a JSON value.
    ///
    /// When `default` is given, fields equal to the default are omitted.
    #[must_use]
    pub fn save(&self, src: &T, default: Option<&T>) -> Value {
        let mut object = Map::new();
        let mut whole = None;

        for field in &self.fields {
            if !field.actions.contains(FieldAction::SAVE) {
                continue;
            }
            if default.is_some_and(|d| field.ops.equals(src, d)) {
                continue;
            }
            match field.ops.save(src) {
                Value::Object(map) if field.name.is_empty() => object.extend(map),
                other if field.name.is_empty() => whole = Some(other),
                other => {
                    object.insert(field.name.to_owned(), other);
                }
            }
        }

        let mut out = whole.unwrap_or(Value::Object(object));
        src.save_extra(&mut out);
        out
    }

    /// Field-by-field equality.
    #[must_use]
    pub fn compare(&self, a: &T, b: &T) -> bool {
        self.fields.iter().all(|f| f.ops.equals(a, b)) && a.compare_extra(b)
    }

    /// Rewrites relative entity names in `dst` against `scope`.
    pub fn set_scope(&self, dst: &mut T, scope: &EntityScope) {
        for field in &self.fields {
            field.ops.set_scope(dst, scope);
        }
        dst.set_scope_extra(scope);
    }
}

impl<T> fmt::Debug for StructMetadata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructMetadata")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .finish()
    }
}
