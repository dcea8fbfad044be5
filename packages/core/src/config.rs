//! Runtime configuration
//!
//! Configuration is an explicit value passed into every view constructor.
//! There is no global or module-level default; the outermost application
//! boundary decides where the values come from (defaults, a config file
//! deserialized with serde, or environment overrides).

use serde::{Deserialize, Serialize};

/// Tunable rules of the graph engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Permit Analysis nodes with no upstream measurements or analyses.
    ///
    /// Synthetic analyses (simulation or ML output) have no measured
    /// source, so this defaults to `true`. Set to `false` to require at
    /// least one upstream Measurement or Analysis on every Analysis node.
    pub allow_sourceless_analysis: bool,

    /// Enforce unique names for Actors and AnalysisMethods at insert time.
    pub unique_actor_names: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            allow_sourceless_analysis: true,
            unique_actor_names: true,
        }
    }
}

impl CoreConfig {
    /// Defaults with overrides from `LABTRACE_ALLOW_SOURCELESS_ANALYSIS`
    /// and `LABTRACE_UNIQUE_ACTOR_NAMES` ("0"/"false" disable, "1"/"true"
    /// enable). Unset or unparseable variables leave the default in place.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_bool("LABTRACE_ALLOW_SOURCELESS_ANALYSIS") {
            config.allow_sourceless_analysis = v;
        }
        if let Some(v) = env_bool("LABTRACE_UNIQUE_ACTOR_NAMES") {
            config.unique_actor_names = v;
        }
        config
    }
}

fn env_bool(key: &str) -> Option<bool> {
    match std::env::var(key).ok()?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        other => {
            tracing::warn!("ignoring unparseable {key}={other:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_permit_sourceless_analyses() {
        let config = CoreConfig::default();
        assert!(config.allow_sourceless_analysis);
        assert!(config.unique_actor_names);
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: CoreConfig =
            serde_json::from_str(r#"{"allow_sourceless_analysis": false}"#).unwrap();
        assert!(!config.allow_sourceless_analysis);
        assert!(config.unique_actor_names);
    }
}
