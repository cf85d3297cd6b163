use async_trait::async_trait;
use elasticsearch::Elasticsearch;
use elasticsearch::http::transport::{BuildError, SingleNodeConnectionPool, TransportBuilder};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::factory::Factory;
use crate::pool::Pool;

pub type EsPool = Pool<EsClientFactory>;

#[derive(Debug, Error)]
pub enum EsFactoryError {
    #[error("invalid Elasticsearch URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build Elasticsearch transport: {0}")]
    Transport(#[from] BuildError),
}

/// Options for connecting to an Elasticsearch node.
#[derive(Debug, Clone)]
pub struct EsOptions {
    pub url: String,
    /// Send a `ping` to check a handle's liveness; when false every handle is
    /// assumed healthy.
    pub validate_with_ping: bool,
}

impl EsOptions {
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            validate_with_ping: true,
        }
    }
}

/// Fluent builder for [`EsOptions`].
#[derive(Debug, Clone)]
pub struct EsOptionsBuilder {
    opts: EsOptions,
}

impl EsOptionsBuilder {
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            opts: EsOptions::new(url),
        }
    }

    #[must_use]
    pub fn validate_with_ping(mut self, enabled: bool) -> Self {
        self.opts.validate_with_ping = enabled;
        self
    }

    #[must_use]
    pub fn finish(self) -> EsOptions {
        self.opts
    }

    /// Build a pool of clients for these options.
    ///
    /// # Errors
    /// Returns `PoolError::ConfigError` for a malformed URL or invalid pool configuration.
    pub fn build(self, config: PoolConfig) -> Result<EsPool, PoolError> {
        let factory = EsClientFactory::new(self.finish())
            .map_err(|err| PoolError::ConfigError(err.to_string()))?;
        Pool::new(factory, config)
    }
}

/// Opens single-node Elasticsearch clients.
#[derive(Debug, Clone)]
pub struct EsClientFactory {
    url: Url,
    validate_with_ping: bool,
}

impl EsClientFactory {
    /// # Errors
    /// Returns `EsFactoryError::Url` if the URL does not parse.
    pub fn new(opts: EsOptions) -> Result<Self, EsFactoryError> {
        let url = Url::parse(&opts.url)?;
        Ok(Self {
            url,
            validate_with_ping: opts.validate_with_ping,
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Factory for EsClientFactory {
    type Handle = Elasticsearch;
    type Error = EsFactoryError;

    async fn create(&self) -> Result<Elasticsearch, EsFactoryError> {
        let conn_pool = SingleNodeConnectionPool::new(self.url.clone());
        let transport = TransportBuilder::new(conn_pool).disable_proxy().build()?;
        debug!(url = %self.url, "opened Elasticsearch client");
        Ok(Elasticsearch::new(transport))
    }

    async fn validate(&self, client: &mut Elasticsearch) -> bool {
        if !self.validate_with_ping {
            return true;
        }
        match client.ping().send().await {
            Ok(response) => response.status_code().is_success(),
            Err(err) => {
                debug!(url = %self.url, error = %err, "Elasticsearch ping failed");
                false
            }
        }
    }
}

impl Pool<EsClientFactory> {
    /// Pool of clients for `url`, validated with a ping.
    ///
    /// # Errors
    /// Returns `PoolError::ConfigError` for a malformed URL or invalid pool configuration.
    pub fn for_url(url: &str, config: PoolConfig) -> Result<Self, PoolError> {
        EsOptionsBuilder::new(url.to_string()).build(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_url() {
        let err = EsClientFactory::new(EsOptions::new("not a url".into())).unwrap_err();
        assert!(matches!(err, EsFactoryError::Url(_)));

        let err = EsPool::for_url("::", PoolConfig::default()).unwrap_err();
        assert!(matches!(err, PoolError::ConfigError(_)));
    }

    #[test]
    fn options_builder_defaults_to_ping() {
        let opts = EsOptionsBuilder::new("http://localhost:9200".into()).finish();
        assert!(opts.validate_with_ping);
        let opts = EsOptionsBuilder::new("http://localhost:9200".into())
            .validate_with_ping(false)
            .finish();
        assert!(!opts.validate_with_ping);
    }
}
