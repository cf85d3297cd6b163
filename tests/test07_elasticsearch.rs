#![cfg(feature = "elasticsearch")]

use client_pool::elasticsearch::{EsDocError, EsOptionsBuilder, EsPool, index_json};
use client_pool::prelude::*;
use serde_json::json;

// Nothing listens on port 1; requests fail fast with connection refused.
const UNREACHABLE: &str = "http://127.0.0.1:1";

#[tokio::test(flavor = "current_thread")]
async fn clients_are_created_without_contacting_the_node() -> Result<(), PoolError> {
    let pool = EsPool::for_url(UNREACHABLE, PoolConfig::builder().max_total(2).finish())?;
    assert_eq!(pool.factory().url().port(), Some(1));

    let client = pool.borrow().await?;
    assert_eq!(pool.status().live, 1);
    pool.release(client).await?;
    assert_eq!(pool.status().idle, 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn failed_ping_destroys_client_on_release() -> Result<(), PoolError> {
    let pool = EsOptionsBuilder::new(UNREACHABLE.to_string())
        .build(PoolConfig::builder().test_on_return(true).finish())?;

    let client = pool.borrow().await?;
    pool.release(client).await?;
    let status = pool.status();
    assert_eq!(status.idle, 0);
    assert_eq!(status.validation_failures, 1);
    assert_eq!(status.destroyed, 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn unreachable_node_fails_borrow_when_testing_on_borrow() -> Result<(), PoolError> {
    let config = PoolConfig::builder()
        .max_total(20)
        .max_idle(5)
        .test_on_borrow(true)
        .finish();
    let pool = EsPool::for_url(UNREACHABLE, config)?;

    let err = pool.borrow().await.unwrap_err();
    assert!(matches!(err, PoolError::CreateFailed(_)), "got {err:?}");
    let status = pool.status();
    assert_eq!(status.live, 0, "every rejected client is destroyed");
    assert_eq!(status.borrowed, 0);
    assert_eq!(status.available, 20);
    let attempts = pool.config().max_validation_retries as u64 + 1;
    assert_eq!(status.created, attempts);
    assert_eq!(status.validation_failures, attempts);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn ping_can_be_turned_off() -> Result<(), PoolError> {
    let pool = EsOptionsBuilder::new(UNREACHABLE.to_string())
        .validate_with_ping(false)
        .build(PoolConfig::builder().test_on_return(true).finish())?;

    let client = pool.borrow().await?;
    pool.release(client).await?;
    assert_eq!(pool.status().idle, 1);
    assert_eq!(pool.status().validation_failures, 0);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn document_helpers_report_transport_and_pool_errors() -> Result<(), PoolError> {
    let pool = EsPool::for_url(UNREACHABLE, PoolConfig::default())?;

    let err = index_json(&pool, "docs", "1", json!({ "title": "hello" }))
        .await
        .unwrap_err();
    assert!(matches!(err, EsDocError::Request(_)), "got {err:?}");
    let status = pool.status();
    assert_eq!(status.borrowed, 0, "client is released even when the request fails");
    assert_eq!(status.idle, 1);

    pool.shutdown().await;
    let err = index_json(&pool, "docs", "1", json!({})).await.unwrap_err();
    assert!(matches!(err, EsDocError::Pool(PoolError::PoolClosed)));
    Ok(())
}
