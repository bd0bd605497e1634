use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::git::Protocol;

/// Settings read from `MODPIN_*` environment variables.
pub struct ModpinConfig {
    pub cache_dir: Option<PathBuf>,
    pub default_protocol: Option<Protocol>,
    pub resolve_timeout: Option<Duration>,
}

impl ModpinConfig {
    pub fn load() -> anyhow::Result<Self> {
        Ok(RawConfig::load(None)?.into())
    }
}

impl From<RawConfig> for ModpinConfig {
    fn from(raw_config: RawConfig) -> Self {
        Self {
            cache_dir: raw_config.cache.dir,
            default_protocol: raw_config.git.protocol,
            resolve_timeout: raw_config.resolve.timeout.map(Duration::from_secs),
        }
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    git: GitConfig,
    #[serde(default)]
    resolve: ResolveConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct GitConfig {
    protocol: Option<Protocol>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ResolveConfig {
    /// Seconds.
    timeout: Option<u64>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("MODPIN")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_empty() {
        let env = HashMap::from([]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(config, RawConfig::default())
    }

    #[test]
    fn load_environment() {
        let env = HashMap::from([
            ("MODPIN_CACHE_DIR".to_owned(), "/cache".to_owned()),
            ("MODPIN_GIT_PROTOCOL".to_owned(), "ssh".to_owned()),
            ("MODPIN_RESOLVE_TIMEOUT".to_owned(), "90".to_owned()),
        ]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(
            config,
            RawConfig {
                cache: CacheConfig {
                    dir: Some("/cache".into())
                },
                git: GitConfig {
                    protocol: Some(Protocol::Ssh)
                },
                resolve: ResolveConfig { timeout: Some(90) },
            }
        );

        let config = ModpinConfig::from(config);
        assert_eq!(config.resolve_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn rejects_unknown_protocol() {
        let env = HashMap::from([("MODPIN_GIT_PROTOCOL".to_owned(), "ftp".to_owned())]);
        assert!(RawConfig::load(Some(env)).is_err());
    }
}
