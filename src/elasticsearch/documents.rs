use elasticsearch::http::response::Response;
use elasticsearch::{DeleteParts, IndexParts, UpdateParts};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use super::factory::{EsClientFactory, EsPool};
use crate::error::PoolError;
use crate::pool::Pooled;

#[derive(Debug, Error)]
pub enum EsDocError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Elasticsearch request failed: {0}")]
    Request(#[from] elasticsearch::Error),

    #[error("Elasticsearch returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Index (create or replace) document `id` in `index`.
///
/// # Errors
/// Returns `EsDocError` if no client can be borrowed, the request fails, or
/// the node answers with a non-success status.
pub async fn index_json(pool: &EsPool, index: &str, id: &str, body: Value) -> Result<(), EsDocError> {
    let client = pool.borrow().await?;
    let sent = client
        .index(IndexParts::IndexId(index, id))
        .body(body)
        .send()
        .await;
    release_quietly(pool, client).await;
    check_status(sent?, "index", index, id).await
}

/// Merge `partial` into document `id`; sent as `{"doc": partial}`.
///
/// # Errors
/// See [`index_json`].
pub async fn update_json(
    pool: &EsPool,
    index: &str,
    id: &str,
    partial: Value,
) -> Result<(), EsDocError> {
    let client = pool.borrow().await?;
    let sent = client
        .update(UpdateParts::IndexId(index, id))
        .body(json!({ "doc": partial }))
        .send()
        .await;
    release_quietly(pool, client).await;
    check_status(sent?, "update", index, id).await
}

/// Delete document `id` from `index`.
///
/// # Errors
/// See [`index_json`].
pub async fn delete_doc(pool: &EsPool, index: &str, id: &str) -> Result<(), EsDocError> {
    let client = pool.borrow().await?;
    let sent = client.delete(DeleteParts::IndexId(index, id)).send().await;
    release_quietly(pool, client).await;
    check_status(sent?, "delete", index, id).await
}

async fn release_quietly(pool: &EsPool, client: Pooled<EsClientFactory>) {
    if let Err(err) = pool.release(client).await {
        warn!(error = %err, "failed to release Elasticsearch client");
    }
}

async fn check_status(
    response: Response,
    action: &'static str,
    index: &str,
    id: &str,
) -> Result<(), EsDocError> {
    let status = response.status_code();
    if status.is_success() {
        debug!(action, index, id, "document request succeeded");
        return Ok(());
    }
    let body = response.text().await?;
    Err(EsDocError::Status {
        status: status.as_u16(),
        body,
    })
}
