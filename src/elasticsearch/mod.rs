//! Elasticsearch adapter: a [`Factory`](crate::factory::Factory) for
//! `elasticsearch::Elasticsearch` clients and pooled document helpers.

mod documents;
mod factory;

pub use documents::{EsDocError, delete_doc, index_json, update_json};
pub use factory::{EsClientFactory, EsFactoryError, EsOptions, EsOptionsBuilder, EsPool};
