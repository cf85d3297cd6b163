//! Bounded, validating async pool for expensive remote-service clients.
//!
//! A [`Pool`](pool::Pool) hands out at most `max_total` live handles built by
//! a [`Factory`](factory::Factory), reuses idle ones, and can validate them on
//! borrow and return. The optional `elasticsearch` feature adds a factory for
//! `elasticsearch::Elasticsearch` clients plus pooled document helpers.

pub mod config;
pub mod error;
pub mod factory;
pub mod pool;
pub mod prelude;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use error::{BoxError, PoolError, ValidationFailed};
pub use factory::Factory;
pub use pool::{Pool, PoolStatus, Pooled, SlotId, SlotState};
