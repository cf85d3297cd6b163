//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types so that a single
//! `use client_pool::prelude::*;` is enough to build and use a pool.

pub use crate::config::{PoolConfig, PoolConfigBuilder};
pub use crate::error::PoolError;
pub use crate::factory::Factory;
pub use crate::pool::{Pool, PoolStatus, Pooled, SlotState};

#[cfg(feature = "elasticsearch")]
pub use crate::elasticsearch::{EsClientFactory, EsDocError, EsOptions, EsPool};
