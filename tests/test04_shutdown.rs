use std::time::Duration;

use client_pool::prelude::*;
use client_pool::test_utils::MockFactory;
use tokio::task::yield_now;

#[tokio::test(flavor = "current_thread")]
async fn shutdown_with_handle_out() -> Result<(), PoolError> {
    let factory = MockFactory::new();
    let pool = PoolConfig::builder().build(factory.clone())?;

    let handle = pool.borrow().await?;
    let id = handle.id;
    pool.shutdown().await;
    assert!(pool.is_closed());

    let err = pool.borrow().await.unwrap_err();
    assert!(matches!(err, PoolError::PoolClosed), "got {err:?}");
    assert!(!err.is_transient());

    pool.release(handle).await?;
    assert_eq!(factory.destroyed_ids(), vec![id], "returned handle is destroyed");

    let status = pool.status();
    assert!(status.closed);
    assert_eq!(status.live, 0);
    assert_eq!(status.idle, 0);
    assert_eq!(status.borrowed, 0);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn shutdown_destroys_idle_handles_once() -> Result<(), PoolError> {
    let factory = MockFactory::new();
    let pool = PoolConfig::builder().max_total(3).build(factory.clone())?;

    let mut held = Vec::new();
    for _ in 0..3 {
        held.push(pool.borrow().await?);
    }
    for handle in held {
        pool.release(handle).await?;
    }
    assert_eq!(pool.status().idle, 3);

    pool.shutdown().await;
    assert_eq!(factory.destroyed(), 3);
    assert_eq!(factory.live(), 0);

    pool.shutdown().await;
    assert_eq!(factory.destroyed(), 3, "second shutdown is a no-op");
    assert_eq!(pool.status().destroyed, 3);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn shutdown_wakes_waiters_with_pool_closed() -> Result<(), PoolError> {
    let factory = MockFactory::new();
    let pool = PoolConfig::builder().max_total(1).build(factory.clone())?;

    let held = pool.borrow().await?;
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.borrow().await.map(|handle| Pooled::id(&handle)) })
    };
    yield_now().await;

    pool.shutdown().await;
    let outcome = waiter.await.expect("waiter task panicked");
    assert!(matches!(outcome, Err(PoolError::PoolClosed)), "got {outcome:?}");

    pool.release(held).await?;
    assert_eq!(factory.destroyed(), 1);
    assert_eq!(factory.created(), 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn shutdown_and_wait_sees_late_release() -> Result<(), PoolError> {
    let factory = MockFactory::new();
    let pool = PoolConfig::builder().build(factory.clone())?;

    let handle = pool.borrow().await?;
    let releaser = {
        let pool = pool.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pool.release(handle).await
        })
    };

    let outstanding = pool.shutdown_and_wait(Duration::from_secs(5)).await;
    assert_eq!(outstanding, 0);
    releaser.await.expect("release task panicked")?;
    assert_eq!(factory.destroyed(), 1);
    assert_eq!(factory.live(), 0);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn shutdown_and_wait_reports_stragglers() -> Result<(), PoolError> {
    let factory = MockFactory::new();
    let pool = PoolConfig::builder().build(factory.clone())?;

    let a = pool.borrow().await?;
    let b = pool.borrow().await?;
    let outstanding = pool.shutdown_and_wait(Duration::from_millis(20)).await;
    assert_eq!(outstanding, 2);

    pool.release(a).await?;
    pool.release(b).await?;
    assert_eq!(factory.destroyed(), 2);
    assert_eq!(pool.shutdown_and_wait(Duration::ZERO).await, 0);
    Ok(())
}
