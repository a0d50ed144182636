//! # Entity Names
//!
//! A [`Name`] is a `(scene, entity)` pair, written `scene:entity`. Names are
//! unique within a scene, and each world keeps an index from name to handle
//! that is maintained under the structural lock.
//!
//! A name with an empty scene is *relative*. Relative names come out of scene
//! files and prefab parameters; [`Name::scoped`] turns them into absolute
//! names once the owning scene is known.

use std::fmt;

use serde_json::Value;

use crate::error::{EcsError, EcsResult};
use crate::meta::{FieldType, Reflect, StructField};

use super::component::Component;

/// The scope relative names are resolved against.
pub type EntityScope = Name;

/// Keyword that refers to the scope entity itself.
const SCOPE_ROOT: &str = "scoperoot";

/// Scene-qualified entity name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    /// Owning scene. Empty for a relative name.
    pub scene: String,
    /// Entity part, unique within the scene.
    pub entity: String,
}

impl Name {
    /// Creates a name from its parts without validation.
    #[must_use]
    pub fn new(scene: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            entity: entity.into(),
        }
    }

    /// Parses `text` against `scope`.
    ///
    /// - `"scene:entity"` is absolute and ignores the scope.
    /// - `"entity"` is relative: it takes the scope's scene, and is prefixed
    ///   with `"<scope.entity>."` when the scope names an entity.
    /// - `"scoperoot"` names the scope entity itself.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidName`] for empty parts, more than one `:`,
    /// or characters outside `[A-Za-z0-9_.-]`.
    pub fn parse(text: &str, scope: &EntityScope) -> EcsResult<Self> {
        let invalid = |reason| EcsError::InvalidName {
            name: text.to_owned(),
            reason,
        };

        if text.is_empty() {
            return Err(invalid("name is empty"));
        }

        let mut parts = text.split(':');
        let first = parts.next().unwrap_or_default();
        let second = parts.next();
        if parts.next().is_some() {
            return Err(invalid("more than one ':'"));
        }

        let name = match second {
            Some(entity) => {
                if first.is_empty() {
                    return Err(invalid("scene part is empty"));
                }
                if entity.is_empty() {
                    return Err(invalid("entity part is empty"));
                }
                Self::new(first, entity)
            }
            None if first == SCOPE_ROOT => {
                if scope.entity.is_empty() {
                    return Err(invalid("scoperoot used outside of an entity scope"));
                }
                scope.clone()
            }
            None if scope.entity.is_empty() => Self::new(scope.scene.clone(), first),
            None => Self::new(scope.scene.clone(), format!("{}.{first}", scope.entity)),
        };

        if !name.scene.chars().all(is_name_char) || !name.entity.chars().all(is_name_char) {
            return Err(invalid("invalid character"));
        }
        Ok(name)
    }

    /// True if both parts are empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scene.is_empty() && self.entity.is_empty()
    }

    /// True if the scene part is missing.
    #[inline]
    #[must_use]
    pub fn is_relative(&self) -> bool {
        self.scene.is_empty() && !self.entity.is_empty()
    }

    /// Resolves a relative name against `scope`. Absolute names are returned
    /// unchanged.
    #[must_use]
    pub fn scoped(&self, scope: &EntityScope) -> Self {
        if !self.is_relative() {
            return self.clone();
        }
        if self.entity == SCOPE_ROOT && !scope.entity.is_empty() {
            return scope.clone();
        }
        if scope.entity.is_empty() {
            Self::new(scope.scene.clone(), self.entity.clone())
        } else {
            Self::new(
                scope.scene.clone(),
                format!("{}.{}", scope.entity, self.entity),
            )
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scene.is_empty() {
            f.write_str(&self.entity)
        } else {
            write!(f, "{}:{}", self.scene, self.entity)
        }
    }
}

impl FieldType for Name {
    fn load_field(&mut self, src: &Value) -> Result<(), String> {
        let text = src
            .as_str()
            .ok_or_else(|| format!("expected a name string, found {src}"))?;
        *self = Self::parse(text, &EntityScope::default()).map_err(|e| e.to_string())?;
        Ok(())
    }

    fn save_field(&self) -> Value {
        Value::String(self.to_string())
    }

    fn set_scope(&mut self, scope: &EntityScope) {
        *self = self.scoped(scope);
    }
}

impl Reflect for Name {
    fn fields() -> Vec<StructField<Self>> {
        vec![StructField::<Self>::new("", |n| n, |n| n)]
    }
}

impl Component for Name {
    const NAME: &'static str = "name";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute() {
        let name = Name::parse("hall:door", &EntityScope::default()).unwrap();
        assert_eq!(name, Name::new("hall", "door"));
        assert_eq!(name.to_string(), "hall:door");
    }

    #[test]
    fn test_parse_relative_uses_scope_scene() {
        let scope = Name::new("hall", "");
        let name = Name::parse("door", &scope).unwrap();
        assert_eq!(name, Name::new("hall", "door"));
    }

    #[test]
    fn test_parse_relative_prefixes_scope_entity() {
        let scope = Name::new("hall", "lamp");
        assert_eq!(
            Name::parse("bulb", &scope).unwrap(),
            Name::new("hall", "lamp.bulb")
        );
        assert_eq!(Name::parse("scoperoot", &scope).unwrap(), scope);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        let scope = EntityScope::default();
        for bad in ["", "a:b:c", ":door", "hall:", "hall:do or"] {
            assert!(
                matches!(Name::parse(bad, &scope), Err(EcsError::InvalidName { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_scoped_only_touches_relative_names() {
        let scope = Name::new("hall", "");
        let relative = Name::new("", "door");
        assert!(relative.is_relative());
        assert_eq!(relative.scoped(&scope), Name::new("hall", "door"));

        let absolute = Name::new("garden", "gate");
        assert_eq!(absolute.scoped(&scope), absolute);
    }

    #[test]
    fn test_field_round_trip() {
        let mut name = Name::default();
        name.load_field(&Value::String("door".to_owned())).unwrap();
        assert!(name.is_relative());
        name.set_scope(&Name::new("hall", ""));
        assert_eq!(name.save_field(), Value::String("hall:door".to_owned()));
    }
}
