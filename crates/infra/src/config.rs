//! Repository configuration.
//!
//! Sources, later ones winning: the embedded default, an optional TOML file,
//! then `DOCREPO_*` environment variables.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use docrepo_core::{DEFAULT_ITEMS_PER_PAGE, DEFAULT_VERSION_KEY, FormatTranslator, IdFallback};

const ENV_PREFIX: &str = "DOCREPO_";

/// Default configuration embedded in the binary.
pub const DEFAULT_CONFIG: &str = r#"
default_items_per_page = 10
max_items_per_page = 100
version_key = "__v"
id_fallback = "regenerate"
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Page size used by `query_default`.
    pub default_items_per_page: u64,
    /// Larger requested page sizes are clamped to this.
    pub max_items_per_page: u64,
    /// Name of the store's version marker field.
    pub version_key: String,
    pub id_fallback: IdFallback,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_items_per_page: DEFAULT_ITEMS_PER_PAGE,
            max_items_per_page: 100,
            version_key: DEFAULT_VERSION_KEY.to_string(),
            id_fallback: IdFallback::Regenerate,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`{0}` must be greater than zero")]
    ZeroPageSize(&'static str),

    #[error("default_items_per_page ({default}) exceeds max_items_per_page ({max})")]
    DefaultAboveMax { default: u64, max: u64 },

    #[error("version_key must not be empty")]
    EmptyVersionKey,

    #[error("{var}={value}: {reason}")]
    InvalidEnv {
        var: String,
        value: String,
        reason: String,
    },
}

impl RepositoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_items_per_page == 0 {
            return Err(ConfigError::ZeroPageSize("default_items_per_page"));
        }
        if self.max_items_per_page == 0 {
            return Err(ConfigError::ZeroPageSize("max_items_per_page"));
        }
        if self.default_items_per_page > self.max_items_per_page {
            return Err(ConfigError::DefaultAboveMax {
                default: self.default_items_per_page,
                max: self.max_items_per_page,
            });
        }
        if self.version_key.trim().is_empty() {
            return Err(ConfigError::EmptyVersionKey);
        }
        Ok(())
    }

    /// Overlay `DOCREPO_*` variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = var("DEFAULT_ITEMS_PER_PAGE") {
            self.default_items_per_page = parse_u64(&key, &value)?;
        }
        if let Some((key, value)) = var("MAX_ITEMS_PER_PAGE") {
            self.max_items_per_page = parse_u64(&key, &value)?;
        }
        if let Some((_, value)) = var("VERSION_KEY") {
            self.version_key = value;
        }
        if let Some((key, value)) = var("ID_FALLBACK") {
            self.id_fallback = match value.to_ascii_lowercase().as_str() {
                "regenerate" => IdFallback::Regenerate,
                "reject" => IdFallback::Reject,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: key,
                        value,
                        reason: "expected `regenerate` or `reject`".into(),
                    });
                }
            };
        }
        Ok(())
    }

    /// Requested page size, capped at the configured maximum.
    pub fn clamp_items_per_page(&self, requested: u64) -> u64 {
        requested.min(self.max_items_per_page)
    }

    pub fn translator(&self) -> FormatTranslator {
        FormatTranslator::new(self.version_key.clone(), self.id_fallback)
    }
}

fn parse_u64(var: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Load configuration from the embedded default, `path` and the environment.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<RepositoryConfig> {
    let mut config: RepositoryConfig = match path {
        Some(path) => {
            tracing::info!("Loading repository config from: {}", path.display());
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?
        }
        None => {
            tracing::info!("Using default embedded repository configuration");
            toml::from_str(DEFAULT_CONFIG)?
        }
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn embedded_default_matches_default_impl() {
        let config: RepositoryConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, RepositoryConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: RepositoryConfig = toml::from_str("max_items_per_page = 25").unwrap();
        assert_eq!(config.max_items_per_page, 25);
        assert_eq!(config.default_items_per_page, 10);
        assert_eq!(config.clamp_items_per_page(500), 25);
    }

    #[test]
    fn env_overrides_and_rejects_garbage() {
        let vars: HashMap<&str, &str> = [
            ("DOCREPO_VERSION_KEY", "_rev"),
            ("DOCREPO_ID_FALLBACK", "Reject"),
        ]
        .into();
        let mut config = RepositoryConfig::default();
        config
            .apply_env(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.version_key, "_rev");
        assert_eq!(config.id_fallback, IdFallback::Reject);

        let err = config
            .apply_env(|k| (k == "DOCREPO_MAX_ITEMS_PER_PAGE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero = RepositoryConfig {
            default_items_per_page: 0,
            ..RepositoryConfig::default()
        };
        assert_eq!(
            zero.validate(),
            Err(ConfigError::ZeroPageSize("default_items_per_page"))
        );

        let blank = RepositoryConfig {
            version_key: " ".into(),
            ..RepositoryConfig::default()
        };
        assert_eq!(blank.validate(), Err(ConfigError::EmptyVersionKey));
    }

    #[test]
    fn load_config_reads_a_file() {
        let path = std::env::temp_dir().join(format!("docrepo-config-{}.toml", std::process::id()));
        std::fs::write(&path, "default_items_per_page = 5\nid_fallback = \"reject\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.default_items_per_page, 5);
        assert_eq!(config.id_fallback, IdFallback::Reject);
    }
}
