use serde::{Deserialize, Serialize};

use crate::WardenError;

/// Engine configuration. Every field has a default, so partial documents
/// deserialize cleanly:
///
/// ```rust
/// use warden::{GateMode, WardenSettings};
///
/// let settings = WardenSettings::from_json(r#"{ "gate": { "mode": "after" } }"#).unwrap();
///
/// assert_eq!(settings.guard, "web");
/// assert_eq!(settings.gate.mode, GateMode::After);
/// assert!(settings.cache.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenSettings {
    /// Namespace for roles created and looked up by name
    pub guard: String,
    /// Permission map caching
    pub cache: CacheSettings,
    /// Host gate integration
    pub gate: GateSettings,
}

impl Default for WardenSettings {
    fn default() -> Self {
        Self {
            guard: "web".into(),
            cache: CacheSettings::default(),
            gate: GateSettings::default(),
        }
    }
}

impl WardenSettings {
    /// Parse settings from a JSON document
    pub fn from_json(json: &str) -> Result<Self, WardenError> {
        serde_json::from_str(json).map_err(|error| WardenError::Settings(error.to_string()))
    }

    /// Use `guard` as the role namespace
    pub fn with_guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = guard.into();
        self
    }

    /// Compute permission maps on every check
    pub fn without_cache(mut self) -> Self {
        self.cache.enabled = false;
        self
    }

    /// Prefix cache keys with `prefix`
    pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache.prefix = prefix.into();
        self
    }

    /// Run the gate hook in `mode`
    pub fn with_gate_mode(mut self, mode: GateMode) -> Self {
        self.gate.mode = mode;
        self
    }
}

/// See [`WardenSettings::cache`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// When false, the cache backend is bypassed entirely
    pub enabled: bool,
    /// Prefix of every cache key
    pub prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "warden.permissions".into(),
        }
    }
}

/// See [`WardenSettings::gate`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Whether the engine decides before or after the host's own policies
    pub mode: GateMode,
}

/// When the engine is consulted relative to the host's own policies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// The engine decides first and may defer to the host
    #[default]
    Before,
    /// The host decides first; the engine only fills in undecided checks
    After,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_fills_missing_settings_with_defaults() -> Result<(), WardenError> {
        let settings = WardenSettings::from_json(r#"{ "cache": { "enabled": false } }"#)?;

        assert!(!settings.cache.enabled);
        assert_eq!(settings.cache.prefix, "warden.permissions");
        assert_eq!(settings.gate.mode, GateMode::Before);
        Ok(())
    }

    #[test]
    fn it_rejects_malformed_settings() {
        let result = WardenSettings::from_json(r#"{ "gate": { "mode": "sideways" } }"#);
        assert!(matches!(result, Err(WardenError::Settings(_))));
    }
}
