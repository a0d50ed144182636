//! # Runtime Error Types
//!
//! Failures of the runtime around the ECS: files, threads and backends.
//! Storage and transaction errors pass through as [`EcsError`].

use std::path::PathBuf;

use photon_core::EcsError;
use thiserror::Error;

/// Errors that can occur while running the engine.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An ECS operation failed.
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// A file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A scene file is not valid JSON.
    #[error("failed to parse scene {}: {source}", path.display())]
    SceneParse {
        /// The scene file.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// A subsystem thread could not be started.
    #[error("failed to spawn the {name} thread: {source}")]
    Spawn {
        /// Subsystem name.
        name: &'static str,
        /// Underlying OS failure.
        #[source]
        source: std::io::Error,
    },

    /// A subsystem thread panicked.
    #[error("the {0} thread panicked")]
    ThreadPanicked(&'static str),

    /// A render backend rejected a frame.
    #[error("render backend `{backend}` failed: {reason}")]
    Backend {
        /// Backend name.
        backend: &'static str,
        /// What went wrong.
        reason: String,
    },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
