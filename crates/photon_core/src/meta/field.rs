//! Field value conversions.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::ecs::EntityScope;

/// A value that can live in a reflected field.
pub trait FieldType: Clone + PartialEq + Send + Sync + 'static {
    /// Overwrites `self` from `src`. On error `self` is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns a description of the shape mismatch.
    fn load_field(&mut self, src: &Value) -> Result<(), String>;

    /// Converts `self` to structured data.
    fn save_field(&self) -> Value;

    /// Rewrites relative entity names. Most types have none.
    fn set_scope(&mut self, _scope: &EntityScope) {}
}

/// Implements [`FieldType`] through `serde` for plain value types.
#[macro_export]
macro_rules! serde_field_type {
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::meta::FieldType for $ty {
            fn load_field(&mut self, src: &$crate::__serde_json::Value) -> Result<(), String> {
                *self = $crate::__serde_json::from_value(src.clone()).map_err(|e| e.to_string())?;
                Ok(())
            }

            fn save_field(&self) -> $crate::__serde_json::Value {
                $crate::__serde_json::to_value(self).unwrap_or($crate::__serde_json::Value::Null)
            }
        }
    )*};
}

serde_field_type!(
    bool,
    u8,
    u16,
    u32,
    u64,
    usize,
    i32,
    i64,
    f32,
    f64,
    String,
    glam::Vec2,
    glam::Vec3,
    glam::Vec4,
    glam::Quat,
    glam::UVec2,
    glam::IVec3,
);

impl<T: FieldType + Default> FieldType for Vec<T> {
    fn load_field(&mut self, src: &Value) -> Result<(), String> {
        let Value::Array(items) = src else {
            return Err(format!("expected an array, found {src}"));
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let mut value = T::default();
            value.load_field(item)?;
            out.push(value);
        }
        *self = out;
        Ok(())
    }

    fn save_field(&self) -> Value {
        Value::Array(self.iter().map(FieldType::save_field).collect())
    }

    fn set_scope(&mut self, scope: &EntityScope) {
        for value in self {
            value.set_scope(scope);
        }
    }
}

impl<T: FieldType + Default> FieldType for Option<T> {
    fn load_field(&mut self, src: &Value) -> Result<(), String> {
        if src.is_null() {
            *self = None;
            return Ok(());
        }
        let mut value = T::default();
        value.load_field(src)?;
        *self = Some(value);
        Ok(())
    }

    fn save_field(&self) -> Value {
        self.as_ref().map_or(Value::Null, FieldType::save_field)
    }

    fn set_scope(&mut self, scope: &EntityScope) {
        if let Some(value) = self {
            value.set_scope(scope);
        }
    }
}

impl<T: FieldType + Default> FieldType for BTreeMap<String, T> {
    fn load_field(&mut self, src: &Value) -> Result<(), String> {
        let Value::Object(entries) = src else {
            return Err(format!("expected an object, found {src}"));
        };
        let mut out = BTreeMap::new();
        for (key, item) in entries {
            let mut value = T::default();
            value
                .load_field(item)
                .map_err(|reason| format!("{key}: {reason}"))?;
            out.insert(key.clone(), value);
        }
        *self = out;
        Ok(())
    }

    fn save_field(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(k, v)| (k.clone(), v.save_field()))
                .collect::<Map<_, _>>(),
        )
    }

    fn set_scope(&mut self, scope: &EntityScope) {
        for value in self.values_mut() {
            value.set_scope(scope);
        }
    }
}
