use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::PoolError;
use crate::factory::Factory;
use crate::pool::Pool;

pub const DEFAULT_MAX_TOTAL: usize = 8;
pub const DEFAULT_MAX_IDLE: usize = 8;
pub const DEFAULT_MAX_VALIDATION_RETRIES: usize = 3;

/// Options for configuring a [`Pool`].
///
/// Deserializes from partial JSON; missing keys keep their defaults:
/// ```rust
/// use client_pool::config::PoolConfig;
///
/// let cfg = PoolConfig::from_json_str(r#"{ "max_total": 20, "borrow_timeout": "2s" }"#).unwrap();
/// assert_eq!(cfg.max_total, 20);
/// assert_eq!(cfg.max_idle, 8);
/// assert_eq!(cfg.borrow_timeout, Some(std::time::Duration::from_secs(2)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Hard cap on simultaneously live handles (idle + borrowed + being created).
    pub max_total: usize,
    /// Cap on idle handles retained; extra returns are destroyed.
    pub max_idle: usize,
    /// Validate a reused idle handle before handing it out.
    pub test_on_borrow: bool,
    /// Validate a handle when it is released.
    pub test_on_return: bool,
    /// How long `borrow()` waits for capacity; `None` waits forever.
    #[serde(deserialize_with = "deserialize_opt_duration")]
    pub borrow_timeout: Option<Duration>,
    /// When false, an exhausted pool fails immediately instead of waiting.
    pub block_when_exhausted: bool,
    /// Reuse the most recently returned idle handle first.
    pub lifo: bool,
    /// Retries after a failed validation in one borrow. Idle handles get one
    /// attempt plus this many retries, then only fresh handles are tried.
    pub max_validation_retries: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: DEFAULT_MAX_TOTAL,
            max_idle: DEFAULT_MAX_IDLE,
            test_on_borrow: false,
            test_on_return: false,
            borrow_timeout: None,
            block_when_exhausted: true,
            lifo: true,
            max_validation_retries: DEFAULT_MAX_VALIDATION_RETRIES,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Parse a configuration from JSON.
    ///
    /// # Errors
    /// Returns `PoolError::ConfigError` if the JSON is malformed or the result fails [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> Result<Self, PoolError> {
        let cfg: PoolConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON configuration file.
    ///
    /// # Errors
    /// Returns `PoolError::ConfigError` if the file cannot be read or parsed.
    pub fn from_json_path(path: &Path) -> Result<Self, PoolError> {
        let content = fs::read_to_string(path).map_err(|err| {
            PoolError::ConfigError(format!(
                "failed to read pool config {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&content)
    }

    /// Check the configuration for values the pool cannot honor.
    ///
    /// `max_idle` above `max_total` is accepted; the idle queue can never hold
    /// more than `max_total` handles anyway.
    ///
    /// # Errors
    /// Returns `PoolError::ConfigError` when `max_total` is zero.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_total == 0 {
            return Err(PoolError::ConfigError(
                "max_total must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a handle coming back through `release` is checked first.
    pub(crate) fn validates_on_release(&self) -> bool {
        self.test_on_return || self.test_on_borrow
    }

    pub(crate) fn effective_max_idle(&self) -> usize {
        self.max_idle.min(self.max_total)
    }
}

/// Fluent builder for [`PoolConfig`].
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    cfg: PoolConfig,
}

impl PoolConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_total(mut self, max_total: usize) -> Self {
        self.cfg.max_total = max_total;
        self
    }

    #[must_use]
    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.cfg.max_idle = max_idle;
        self
    }

    #[must_use]
    pub fn test_on_borrow(mut self, enabled: bool) -> Self {
        self.cfg.test_on_borrow = enabled;
        self
    }

    #[must_use]
    pub fn test_on_return(mut self, enabled: bool) -> Self {
        self.cfg.test_on_return = enabled;
        self
    }

    #[must_use]
    pub fn borrow_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.cfg.borrow_timeout = timeout;
        self
    }

    #[must_use]
    pub fn block_when_exhausted(mut self, block: bool) -> Self {
        self.cfg.block_when_exhausted = block;
        self
    }

    #[must_use]
    pub fn lifo(mut self, lifo: bool) -> Self {
        self.cfg.lifo = lifo;
        self
    }

    #[must_use]
    pub fn max_validation_retries(mut self, retries: usize) -> Self {
        self.cfg.max_validation_retries = retries;
        self
    }

    #[must_use]
    pub fn finish(self) -> PoolConfig {
        self.cfg
    }

    /// Build a [`Pool`] around `factory` with this configuration.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ConfigError` if the configuration is invalid.
    pub fn build<F: Factory>(self, factory: F) -> Result<Pool<F>, PoolError> {
        Pool::new(factory, self.finish())
    }
}

fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(text) => humantime::parse_duration(text.trim())
            .map(Some)
            .map_err(|err| serde::de::Error::custom(format!("invalid duration {text:?}: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_field() {
        let cfg = PoolConfig::default();
        assert_eq!(cfg.max_total, 8);
        assert_eq!(cfg.max_idle, 8);
        assert!(!cfg.test_on_borrow);
        assert!(!cfg.test_on_return);
        assert_eq!(cfg.borrow_timeout, None);
        assert!(cfg.block_when_exhausted);
        assert!(cfg.lifo);
        assert_eq!(cfg.max_validation_retries, 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = PoolConfig::from_json_str(
            r#"{ "max_total": 20, "max_idle": 5, "test_on_borrow": true }"#,
        )
        .unwrap();
        assert_eq!(cfg.max_total, 20);
        assert_eq!(cfg.max_idle, 5);
        assert!(cfg.test_on_borrow);
        assert_eq!(cfg.borrow_timeout, None);
        assert!(cfg.validates_on_release());
    }

    #[test]
    fn durations_are_human_readable() {
        let cfg = PoolConfig::from_json_str(r#"{ "borrow_timeout": "250ms" }"#).unwrap();
        assert_eq!(cfg.borrow_timeout, Some(Duration::from_millis(250)));

        let cfg = PoolConfig::from_json_str(r#"{ "borrow_timeout": null }"#).unwrap();
        assert_eq!(cfg.borrow_timeout, None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            PoolConfig::from_json_str(r#"{ "borrow_timeout": "soon" }"#),
            Err(PoolError::ConfigError(_))
        ));
        assert!(matches!(
            PoolConfig::from_json_str(r#"{ "max_total": 0 }"#),
            Err(PoolError::ConfigError(_))
        ));
        assert!(matches!(
            PoolConfig::from_json_str(r#"{ "maxTotal": 3 }"#),
            Err(PoolError::ConfigError(_))
        ));
    }

    #[test]
    fn builder_sets_every_field() {
        let cfg = PoolConfig::builder()
            .max_total(2)
            .max_idle(1)
            .test_on_borrow(true)
            .test_on_return(false)
            .borrow_timeout(Some(Duration::ZERO))
            .block_when_exhausted(false)
            .lifo(false)
            .max_validation_retries(1)
            .finish();
        assert_eq!(cfg.max_total, 2);
        assert_eq!(cfg.effective_max_idle(), 1);
        assert_eq!(cfg.borrow_timeout, Some(Duration::ZERO));
        assert!(!cfg.block_when_exhausted);
        assert!(!cfg.lifo);
        assert_eq!(cfg.max_validation_retries, 1);
    }

    #[test]
    fn max_idle_is_capped_by_max_total() {
        let cfg = PoolConfig::builder().max_total(2).max_idle(10).finish();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.effective_max_idle(), 2);
    }
}
