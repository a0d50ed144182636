//! # ECS Error Types
//!
//! Everything that can go wrong in the storage and transaction layer.
//!
//! Two classes share this enum:
//!
//! - **Recoverable** results returned to callers: stale handles, duplicate
//!   components, data-file problems.
//! - **Programmer errors** that are never returned. They are raised through
//!   [`fatal`], which logs and panics (the release profile aborts on panic).

use thiserror::Error;

use crate::ecs::Entity;

/// Errors that can occur in the ECS.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A transaction touched a component type it did not request.
    #[error("permission denied: {access} access to `{component}` was not granted to this transaction")]
    PermissionDenied {
        /// Component type name.
        component: &'static str,
        /// The access that was attempted (`read`, `write`, `add/remove`).
        access: &'static str,
    },

    /// `add` was called for a component the entity already has.
    #[error("component `{component}` already exists on {entity}")]
    DuplicateComponent {
        /// Component type name.
        component: &'static str,
        /// The entity that already holds the component.
        entity: Entity,
    },

    /// The handle refers to a destroyed or never-allocated slot.
    #[error("{0} is stale or was never allocated")]
    StaleEntity(Entity),

    /// A Rust type was used as a component without being registered.
    #[error("component type `{0}` was never registered")]
    UnregisteredComponent(&'static str),

    /// A scene file named a component key nobody registered.
    #[error("unknown component `{0}`")]
    UnknownComponent(String),

    /// Two entities in one scene tried to use the same name.
    #[error("name `{name}` is already used by {entity}")]
    DuplicateName {
        /// The conflicting name.
        name: String,
        /// The entity that already holds it.
        entity: Entity,
    },

    /// A name string could not be parsed.
    #[error("invalid entity name `{name}`: {reason}")]
    InvalidName {
        /// The rejected input.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A scene file referenced a script nobody registered.
    #[error("unknown script `{0}`")]
    UnknownScript(String),

    /// A field value in structured data had the wrong shape.
    #[error("failed to load field `{field}`: {reason}")]
    FieldLoad {
        /// Field (or component) being loaded.
        field: String,
        /// Underlying parse failure.
        reason: String,
    },

    /// The same thread requested an incompatible lock it already holds.
    #[error("recursive lock acquisition: {0}")]
    RecursiveLock(String),

    /// Worlds were locked against the global world ordering.
    #[error("lock order violation: {0}")]
    LockOrder(String),

    /// A staged scene operation named a scene that is not loaded.
    #[error("scene `{0}` is not loaded")]
    SceneNotFound(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;

/// Stops the process for a broken call-graph invariant.
///
/// The error is logged before panicking so the diagnostic survives even when
/// the panic strategy is `abort`.
#[cold]
#[track_caller]
pub(crate) fn fatal(err: EcsError) -> ! {
    tracing::error!(error = %err, "fatal ECS programmer error");
    panic!("{err}")
}
