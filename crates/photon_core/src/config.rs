//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every key is optional:
//!
//! ```toml
//! logic_hz = 120
//! physics_hz = 120
//! render_hz = 90
//! event_queue_capacity = 1000
//! input_queue_capacity = 1024
//! max_interval_ms = 100
//! log_filter = "info,photon::sync=warn"
//! initial_scene = "assets/scenes/hall.json"
//! gravity = [0.0, -9.81, 0.0]
//! ```

use std::path::Path;
use std::time::Duration;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};
use crate::script::DEFAULT_QUEUE_CAPACITY;

/// Runtime settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Logic (script) thread rate.
    pub logic_hz: u32,
    /// Physics thread rate.
    pub physics_hz: u32,
    /// Render thread rate.
    pub render_hz: u32,
    /// Capacity of each script event queue.
    pub event_queue_capacity: usize,
    /// Capacity of the input bridge.
    pub input_queue_capacity: usize,
    /// Longest interval handed to a tick, in milliseconds. Longer stalls are
    /// clamped so a paused process does not produce one huge step.
    pub max_interval_ms: u64,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Scene file loaded at startup.
    pub initial_scene: Option<String>,
    /// World gravity in m/s².
    pub gravity: Vec3,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            logic_hz: 120,
            physics_hz: 120,
            render_hz: 90,
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            input_queue_capacity: 1024,
            max_interval_ms: 100,
            log_filter: "info".to_owned(),
            initial_scene: None,
            gravity: Vec3::new(0.0, -9.81, 0.0),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] on syntax errors, unknown keys or values
    /// that fail [`EngineConfig::validate`].
    pub fn from_toml_str(text: &str) -> EcsResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| EcsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EcsError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(target: "photon::config", path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Serializes back to TOML.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> EcsResult<String> {
        toml::to_string_pretty(self).map_err(|e| EcsError::InvalidConfig(e.to_string()))
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] naming the first bad key.
    pub fn validate(&self) -> EcsResult<()> {
        for (key, hz) in [
            ("logic_hz", self.logic_hz),
            ("physics_hz", self.physics_hz),
            ("render_hz", self.render_hz),
        ] {
            if !(1..=10_000).contains(&hz) {
                return Err(EcsError::InvalidConfig(format!("{key} must be within 1..=10000, got {hz}")));
            }
        }
        if self.event_queue_capacity == 0 {
            return Err(EcsError::InvalidConfig("event_queue_capacity must be positive".to_owned()));
        }
        if self.input_queue_capacity == 0 {
            return Err(EcsError::InvalidConfig("input_queue_capacity must be positive".to_owned()));
        }
        if self.max_interval_ms == 0 {
            return Err(EcsError::InvalidConfig("max_interval_ms must be positive".to_owned()));
        }
        if !self.gravity.is_finite() {
            return Err(EcsError::InvalidConfig("gravity must be finite".to_owned()));
        }
        Ok(())
    }

    /// Period of the logic thread.
    #[inline]
    #[must_use]
    pub fn logic_interval(&self) -> Duration {
        period(self.logic_hz)
    }

    /// Period of the physics thread.
    #[inline]
    #[must_use]
    pub fn physics_interval(&self) -> Duration {
        period(self.physics_hz)
    }

    /// Period of the render thread.
    #[inline]
    #[must_use]
    pub fn render_interval(&self) -> Duration {
        period(self.render_hz)
    }

    /// Upper bound on a tick interval.
    #[inline]
    #[must_use]
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

fn period(hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(hz.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            logic_hz = 60
            initial_scene = "hall.json"
            gravity = [0.0, -1.62, 0.0]
            "#,
        )
        .unwrap();
        assert_eq!(config.logic_hz, 60);
        assert_eq!(config.physics_hz, 120);
        assert_eq!(config.initial_scene.as_deref(), Some("hall.json"));
        assert_eq!(config.gravity, Vec3::new(0.0, -1.62, 0.0));
        assert_eq!(config.logic_interval(), Duration::from_secs_f64(1.0 / 60.0));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("render_hz = 0"),
            Err(EcsError::InvalidConfig(_))
        ));
        assert!(EngineConfig::from_toml_str("event_queue_capacity = 0").is_err());
        assert!(EngineConfig::from_toml_str("unknown_key = 1").is_err());
        assert!(EngineConfig::from_toml_str("logic_hz = \"fast\"").is_err());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = EngineConfig {
            render_hz: 72,
            initial_scene: Some("a.json".to_owned()),
            ..EngineConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            EngineConfig::from_file("/nonexistent/photon.toml"),
            Err(EcsError::InvalidConfig(_))
        ));
    }
}
