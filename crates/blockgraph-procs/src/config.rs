//! Runtime configuration.
//!
//! Settings come from a JSON file ([`SyncConfig::from_json_file`]) or from
//! `BLOCKGRAPH_*` environment variables ([`SyncConfig::from_env`]); anything
//! unset keeps its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ProcError;

/// Tunables of the synchronization engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Offset unit for auto-created definitions, so they do not cover the
    /// call that caused them.
    pub snap_radius: f64,
    /// Right-to-left layout mirrors the horizontal offset.
    pub rtl: bool,
    /// Name given to definitions created with an empty name.
    pub unnamed_name: String,
    /// Default name of palette definition templates.
    pub template_name: String,
    /// Warning shown on a conditional return outside any definition.
    pub return_warning: String,
    /// Upper bound on event dispatch passes per user action.
    pub max_reaction_passes: usize,
    /// Number of undo steps kept.
    pub history_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            snap_radius: 28.0,
            rtl: false,
            unnamed_name: "unnamed".into(),
            template_name: "do something".into(),
            return_warning: "Warning: This block may be used only within a function definition."
                .into(),
            max_reaction_passes: 16,
            history_limit: 100,
        }
    }
}

impl SyncConfig {
    /// Reads a JSON config file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProcError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ProcError> {
        let config: SyncConfig = serde_json::from_str(text)?;
        config.validate()
    }

    /// Reads overrides from the environment:
    /// - `BLOCKGRAPH_SNAP_RADIUS`
    /// - `BLOCKGRAPH_RTL` (`true`/`false`)
    /// - `BLOCKGRAPH_MAX_REACTION_PASSES`
    /// - `BLOCKGRAPH_HISTORY_LIMIT`
    pub fn from_env() -> Result<Self, ProcError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProcError> {
        let mut config = SyncConfig::default();
        if let Some(v) = lookup("BLOCKGRAPH_SNAP_RADIUS") {
            config.snap_radius = parse_setting("BLOCKGRAPH_SNAP_RADIUS", &v)?;
        }
        if let Some(v) = lookup("BLOCKGRAPH_RTL") {
            config.rtl = parse_setting("BLOCKGRAPH_RTL", &v)?;
        }
        if let Some(v) = lookup("BLOCKGRAPH_MAX_REACTION_PASSES") {
            config.max_reaction_passes = parse_setting("BLOCKGRAPH_MAX_REACTION_PASSES", &v)?;
        }
        if let Some(v) = lookup("BLOCKGRAPH_HISTORY_LIMIT") {
            config.history_limit = parse_setting("BLOCKGRAPH_HISTORY_LIMIT", &v)?;
        }
        config.validate()
    }

    /// Without at least one dispatch pass no reactive hook would ever run.
    fn validate(self) -> Result<Self, ProcError> {
        if self.max_reaction_passes == 0 {
            return Err(ProcError::Config {
                reason: "maxReactionPasses must be at least 1".into(),
            });
        }
        Ok(self)
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ProcError> {
    value.trim().parse().map_err(|_| ProcError::Config {
        reason: format!("{} has invalid value '{}'", key, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.snap_radius, 28.0);
        assert_eq!(config.unnamed_name, "unnamed");
        assert!(!config.rtl);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"snapRadius": 10, "rtl": true}"#).unwrap();
        assert_eq!(config.snap_radius, 10.0);
        assert!(config.rtl);
        assert_eq!(config.max_reaction_passes, 16);
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BLOCKGRAPH_SNAP_RADIUS", "48"),
            ("BLOCKGRAPH_RTL", "true"),
        ]
        .into_iter()
        .collect();
        let config = SyncConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.snap_radius, 48.0);
        assert!(config.rtl);
    }

    #[test]
    fn env_rejects_garbage() {
        let err = SyncConfig::from_lookup(|k| {
            (k == "BLOCKGRAPH_MAX_REACTION_PASSES").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ProcError::Config { .. }));
    }

    #[test]
    fn zero_reaction_passes_rejected() {
        let err = SyncConfig::from_lookup(|k| {
            (k == "BLOCKGRAPH_MAX_REACTION_PASSES").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ProcError::Config { .. }));

        let err = SyncConfig::from_json_str(r#"{"maxReactionPasses": 0}"#).unwrap_err();
        assert!(matches!(err, ProcError::Config { .. }));
        assert!(SyncConfig::from_json_str(r#"{"maxReactionPasses": 1}"#).is_ok());
    }
}
