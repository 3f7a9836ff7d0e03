use crate::cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use stencil_template_core::{DuplicatePolicy, Encoding, TemplateError};

/// Engine settings, typically deserialized from a configuration file.
///
/// Every field has a default, so `{}` is a valid configuration:
///
/// ```
/// use stencil::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "hot-reload": true, "encoding": "ISO-8859-1" }"#).unwrap();
/// assert!(config.hot_reload);
/// assert!(config.template_dir.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    /// Recompile templates whose source (or any include) changed.
    pub hot_reload: bool,
    pub duplicate_policy: DuplicatePolicy,
    /// Encoding used by [`TemplateEngine::template`](crate::TemplateEngine::template).
    pub encoding: Encoding,
    /// Directory served by a filesystem resolver when no resolver is given.
    pub template_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, TemplateError> {
        serde_json::from_str(json)
            .map_err(|e| TemplateError::config(format!("invalid engine configuration: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, TemplateError> {
        serde_json::to_string_pretty(self).map_err(|e| TemplateError::config(e.to_string()))
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            hot_reload: self.hot_reload,
            duplicate_policy: self.duplicate_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(config.encoding, Encoding::Utf8);
    }

    #[test]
    fn test_kebab_case_fields() {
        let config = EngineConfig::from_json(
            r#"{
                "hot-reload": true,
                "duplicate-policy": "last-wins",
                "encoding": "US-ASCII",
                "template-dir": "templates"
            }"#,
        )
        .unwrap();
        assert!(config.hot_reload);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::LastWins);
        assert_eq!(config.encoding, Encoding::Ascii);
        assert_eq!(config.template_dir, Some(PathBuf::from("templates")));

        let cache = config.cache_config();
        assert!(cache.hot_reload);
        assert_eq!(cache.duplicate_policy, DuplicatePolicy::LastWins);
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = EngineConfig {
            hot_reload: true,
            ..EngineConfig::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_config() {
        let err = EngineConfig::from_json(r#"{ "duplicate-policy": "sometimes" }"#).unwrap_err();
        assert!(matches!(err, TemplateError::Config(_)));
    }
}
