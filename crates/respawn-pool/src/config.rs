//! Pool and entity configuration.
//!
//! Both [`PoolConfig`] and [`EntitySettings`] are plain serde structs so a
//! host can load them from JSON, edit them from an inspector, or build them in
//! code. Every field has a default; a missing field in JSON takes the default.
//!
//! ```
//! use respawn_pool::config::{PoolConfig, SpawnParent};
//!
//! let config = PoolConfig::from_json_str(r#"{ "capacity": 4, "expansion_size": 2 }"#).unwrap();
//! assert_eq!(config.capacity, 4);
//! assert!(config.is_expandable);
//! assert_eq!(config.spawn_parent, SpawnParent::None);
//! ```

use serde::{Deserialize, Serialize};

use crate::{PoolError, PoolResult};

// ---------------------------------------------------------------------------
// DeactivationMode
// ---------------------------------------------------------------------------

/// What drives an active entity back to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationMode {
    /// Deactivate after `duration` seconds of simulated time.
    Timer {
        /// Lifespan in seconds.
        duration: f64,
    },
    /// Deactivate after `ticks` explicit [`tick`](crate::lifecycle::Entity::tick) calls.
    TickCount {
        /// Number of ticks before deactivation.
        ticks: u32,
    },
    /// Only explicit deactivation calls end an activation.
    Manual,
}

impl Default for DeactivationMode {
    fn default() -> Self {
        DeactivationMode::Timer { duration: 2.0 }
    }
}

// ---------------------------------------------------------------------------
// EntitySettings
// ---------------------------------------------------------------------------

/// Per-entity lifecycle settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitySettings {
    /// The countdown armed by a plain `activate()`.
    pub mode: DeactivationMode,
    /// Length in seconds of the pending phase entered by `start_deactivation()`.
    /// Zero deactivates in the same call.
    pub deactivation_delay: f64,
}

impl Default for EntitySettings {
    fn default() -> Self {
        Self {
            mode: DeactivationMode::default(),
            deactivation_delay: 0.0,
        }
    }
}

impl EntitySettings {
    /// Check value ranges.
    pub fn validate(&self) -> PoolResult<()> {
        if let DeactivationMode::Timer { duration } = self.mode {
            if !(duration > 0.0 && duration.is_finite()) {
                return Err(PoolError::InvalidConfig {
                    field: "mode.duration",
                    reason: format!("must be positive and finite, got {duration}"),
                });
            }
        }
        if !(self.deactivation_delay >= 0.0 && self.deactivation_delay.is_finite()) {
            return Err(PoolError::InvalidConfig {
                field: "deactivation_delay",
                reason: format!(
                    "must be non-negative and finite, got {}",
                    self.deactivation_delay
                ),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parents
// ---------------------------------------------------------------------------

/// Opaque reference to a node in the host's scene hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Where newly created entities are attached in the host hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnParent {
    /// Entities live at the hierarchy root.
    #[default]
    None,
    /// Entities become children of the pool itself.
    Pool,
    /// Entities become children of a host-chosen node.
    Custom(NodeId),
}

// ---------------------------------------------------------------------------
// PoolConfig
// ---------------------------------------------------------------------------

/// Construction-time pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of entities created up front. Must be positive.
    pub capacity: usize,
    /// Whether an empty store triggers expansion instead of returning `None`.
    pub is_expandable: bool,
    /// Entities added per expansion. Must be at least 1 when expandable.
    pub expansion_size: usize,
    /// Hierarchy placement of created entities.
    pub spawn_parent: SpawnParent,
    /// When set, every checkout activates for this many seconds instead of
    /// the entity's own [`DeactivationMode`].
    pub lifespan_override: Option<f64>,
    /// Undrained events kept before the oldest are dropped. Zero disables
    /// event recording.
    pub event_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 12,
            is_expandable: true,
            expansion_size: 3,
            spawn_parent: SpawnParent::None,
            lifespan_override: None,
            event_capacity: 1024,
        }
    }
}

impl PoolConfig {
    /// A config with the given initial capacity and the remaining defaults.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Builder: disable expansion.
    pub fn fixed(mut self) -> Self {
        self.is_expandable = false;
        self
    }

    /// Builder: enable expansion by `size` entities at a time.
    pub fn expandable_by(mut self, size: usize) -> Self {
        self.is_expandable = true;
        self.expansion_size = size;
        self
    }

    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> PoolResult<Self> {
        let config: PoolConfig =
            serde_json::from_str(json).map_err(|e| PoolError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> PoolResult<()> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfig {
                field: "capacity",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.is_expandable && self.expansion_size == 0 {
            return Err(PoolError::InvalidConfig {
                field: "expansion_size",
                reason: "must be at least 1 when the pool is expandable".to_owned(),
            });
        }
        if let Some(lifespan) = self.lifespan_override {
            if !(lifespan > 0.0 && lifespan.is_finite()) {
                return Err(PoolError::InvalidConfig {
                    field: "lifespan_override",
                    reason: format!("must be positive and finite, got {lifespan}"),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_inspector_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.capacity, 12);
        assert!(config.is_expandable);
        assert_eq!(config.expansion_size, 3);
        assert_eq!(config.spawn_parent, SpawnParent::None);
        assert_eq!(config.lifespan_override, None);
        assert_eq!(config.event_capacity, 1024);
        assert!(config.validate().is_ok());

        let settings = EntitySettings::default();
        assert_eq!(settings.mode, DeactivationMode::Timer { duration: 2.0 });
        assert_eq!(settings.deactivation_delay, 0.0);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = PoolConfig::with_capacity(0).validate().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig { field: "capacity", .. }));
    }

    #[test]
    fn zero_expansion_only_matters_when_expandable() {
        let mut config = PoolConfig::with_capacity(2).expandable_by(0);
        assert!(config.validate().is_err());
        config.is_expandable = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_positive_lifespan_override_is_rejected() {
        let config = PoolConfig {
            lifespan_override: Some(0.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_json_with_partial_fields() {
        let config = PoolConfig::from_json_str(
            r#"{ "capacity": 5, "is_expandable": false, "spawn_parent": { "custom": 9 } }"#,
        )
        .unwrap();
        assert_eq!(config.capacity, 5);
        assert!(!config.is_expandable);
        assert_eq!(config.spawn_parent, SpawnParent::Custom(NodeId(9)));
        assert_eq!(config.expansion_size, 3);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = PoolConfig::from_json_str("{ capacity: ").unwrap_err();
        assert!(matches!(err, PoolError::ConfigParse(_)));
    }

    #[test]
    fn invalid_json_values_fail_validation() {
        let err = PoolConfig::from_json_str(r#"{ "capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig { .. }));
    }

    #[test]
    fn entity_settings_parse_tick_mode() {
        let settings: EntitySettings =
            serde_json::from_str(r#"{ "mode": { "tick_count": { "ticks": 3 } } }"#).unwrap();
        assert_eq!(settings.mode, DeactivationMode::TickCount { ticks: 3 });
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn entity_settings_reject_negative_delay() {
        let settings = EntitySettings {
            deactivation_delay: -1.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
