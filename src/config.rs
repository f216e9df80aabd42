//! Runtime configuration.
//!
//! Loaded in priority order (lowest to highest):
//! 1. Struct defaults
//! 2. A yaml file (if it exists)
//! 3. Environment variables with the `SIGCHAIN_` prefix, nested with `__`
//!    (ie `SIGCHAIN_PROOF_CACHE__SIZE=1024`)

use crate::cache::CacheIntervals;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use getset;
use serde_derive::{Deserialize, Serialize};
use std::time::Duration;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "sigchain.yaml";
/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SIGCHAIN_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, getset::Getters, getset::MutGetters)]
#[getset(get = "pub", get_mut = "pub")]
pub struct Config {
    #[serde(default)]
    proof_cache: ProofCacheConfig,
    #[serde(default)]
    statement: StatementConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

/// Settings for the proof result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, getset::Getters, getset::Setters)]
#[getset(get = "pub", set = "pub")]
pub struct ProofCacheConfig {
    /// Max results held in memory.
    #[serde(default = "default_cache_size")]
    size: usize,
    /// How long a successful check stays usable, in seconds.
    #[serde(default = "default_long_interval")]
    long_interval_secs: u64,
    /// How long a hard failure stays usable, in seconds.
    #[serde(default = "default_medium_interval")]
    medium_interval_secs: u64,
}

impl ProofCacheConfig {
    pub fn intervals(&self) -> CacheIntervals {
        CacheIntervals::new(Duration::from_secs(self.long_interval_secs), Duration::from_secs(self.medium_interval_secs))
    }
}

impl Default for ProofCacheConfig {
    fn default() -> Self {
        Self {
            size: default_cache_size(),
            long_interval_secs: default_long_interval(),
            medium_interval_secs: default_medium_interval(),
        }
    }
}

/// Defaults stamped into the statements we build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, getset::Getters, getset::Setters)]
#[getset(get = "pub", set = "pub")]
pub struct StatementConfig {
    /// Validity window used when a statement doesn't set one.
    #[serde(default = "default_expire_in")]
    expire_in_secs: u64,
    #[serde(default = "default_client_name")]
    client_name: String,
    #[serde(default = "default_client_version")]
    client_version: String,
    /// The host identities live on.
    #[serde(default = "default_host")]
    host: String,
}

impl Default for StatementConfig {
    fn default() -> Self {
        Self {
            expire_in_secs: default_expire_in(),
            client_name: default_client_name(),
            client_version: default_client_version(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, getset::Getters, getset::Setters)]
#[getset(get = "pub", set = "pub")]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error, or a full directive like
    /// `sigchain_core=debug`).
    #[serde(default = "default_log_level")]
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

fn default_cache_size() -> usize {
    4096
}

fn default_long_interval() -> u64 {
    6 * 60 * 60
}

fn default_medium_interval() -> u64 {
    30 * 60
}

fn default_expire_in() -> u64 {
    // ten years
    10 * 365 * 24 * 60 * 60
}

fn default_client_name() -> String {
    "sigchain-core".into()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}

fn default_host() -> String {
    "keybase.io".into()
}

fn default_log_level() -> String {
    "info".into()
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl Config {
    /// Load from defaults, `sigchain.yaml`, and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from defaults, the given yaml file, and the environment.
    pub fn load_from(yaml_path: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(yaml_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proof_cache.size == 0 {
            return Err(ConfigError::Validation("proof_cache.size cannot be 0".into()));
        }
        if self.proof_cache.medium_interval_secs >= self.proof_cache.long_interval_secs {
            return Err(ConfigError::Validation(format!(
                "proof_cache.medium_interval_secs ({}) must be less than proof_cache.long_interval_secs ({})",
                self.proof_cache.medium_interval_secs, self.proof_cache.long_interval_secs
            )));
        }
        if self.statement.expire_in_secs == 0 {
            return Err(ConfigError::Validation("statement.expire_in_secs cannot be 0".into()));
        }
        if self.statement.client_name.is_empty() {
            return Err(ConfigError::Validation("statement.client_name is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.proof_cache().size(), &4096);
        assert_eq!(config.proof_cache().intervals(), CacheIntervals::default());
        assert_eq!(config.statement().expire_in_secs(), &315360000);
        assert_eq!(config.statement().host(), "keybase.io");
        assert_eq!(config.logging().level(), "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation() {
        let mut config = Config::default();
        config.proof_cache_mut().set_size(0);
        assert!(config.validate().unwrap_err().to_string().contains("proof_cache.size"));

        let mut config = Config::default();
        config.proof_cache_mut().set_medium_interval_secs(6 * 60 * 60);
        assert!(config.validate().unwrap_err().to_string().contains("medium_interval_secs"));

        let mut config = Config::default();
        config.statement_mut().set_client_name(String::new());
        assert!(config.validate().unwrap_err().to_string().contains("client_name"));

        let mut config = Config::default();
        config.statement_mut().set_expire_in_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn layered_load() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "sigchain.yaml",
                r#"
proof_cache:
  size: 64
statement:
  host: "example.org"
"#,
            )?;
            jail.set_env("SIGCHAIN_PROOF_CACHE__SIZE", "128");
            jail.set_env("SIGCHAIN_LOGGING__LEVEL", "debug");
            let config = Config::load().map_err(|e| e.to_string())?;
            // env beats file, file beats defaults
            assert_eq!(config.proof_cache().size(), &128);
            assert_eq!(config.statement().host(), "example.org");
            assert_eq!(config.logging().level(), "debug");
            assert_eq!(config.proof_cache().long_interval_secs(), &(6 * 60 * 60));
            Ok(())
        });
    }

    #[test]
    fn load_rejects_invalid() {
        Jail::expect_with(|jail| {
            jail.set_env("SIGCHAIN_PROOF_CACHE__LONG_INTERVAL_SECS", "60");
            let res = Config::load_from("missing.yaml");
            assert!(matches!(res, Err(ConfigError::Validation(_))));
            Ok(())
        });
    }
}
