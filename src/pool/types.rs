use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::connection::Pooled;
use super::slot::{Slot, SlotBook, SlotId, SlotState};
use super::status::PoolStatus;
use crate::config::PoolConfig;
use crate::error::{PoolError, ValidationFailed};
use crate::factory::Factory;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Bounded, validating pool of handles produced by a [`Factory`].
///
/// Cloning is cheap and every clone refers to the same pool. At most
/// `max_total` handles exist at any instant, counting idle ones, borrowed
/// ones and those being created or destroyed.
///
/// ```rust
/// # use client_pool::prelude::*;
/// # use client_pool::test_utils::MockFactory;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), PoolError> {
/// let pool = PoolConfig::builder().max_total(2).build(MockFactory::new())?;
/// let handle = pool.borrow().await?;
/// assert_eq!(pool.status().borrowed, 1);
/// pool.release(handle).await?;
/// assert_eq!(pool.status().idle, 1);
/// pool.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Pool<F: Factory> {
    pub(crate) inner: Arc<PoolInner<F>>,
}

impl<F: Factory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Factory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<F: Factory> Pool<F> {
    /// Build a pool. No handle is created until the first borrow.
    ///
    /// # Errors
    /// Returns `PoolError::ConfigError` if `config` fails validation.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        if config.max_total > Semaphore::MAX_PERMITS {
            return Err(PoolError::ConfigError(format!(
                "max_total must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        let inner = PoolInner {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            permits: Arc::new(Semaphore::new(config.max_total)),
            book: Mutex::new(SlotBook::new(config.max_total)),
            drained: Notify::new(),
            factory,
            config,
        };
        debug!(pool = inner.id, max_total = inner.config.max_total, "created pool");
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// Borrow a handle, waiting up to the configured `borrow_timeout`.
    ///
    /// # Errors
    /// `PoolExhausted` if no capacity frees up in time, `CreateFailed` if the
    /// factory cannot open a handle, `PoolClosed` after [`shutdown`](Self::shutdown).
    pub async fn borrow(&self) -> Result<Pooled<F>, PoolError> {
        self.borrow_timeout(self.inner.config.borrow_timeout).await
    }

    /// Borrow a handle with a per-call wait limit. `None` waits forever and
    /// `Some(Duration::ZERO)` never waits.
    ///
    /// With `test_on_borrow`, every handle is validated before it is handed
    /// out, whether reused or newly created. A failing one is destroyed and
    /// the borrow tries again. Idle handles get one attempt plus
    /// `max_validation_retries` retries; past that the borrow only creates
    /// fresh handles. A fresh handle that fails once more than
    /// `max_validation_retries` checks have failed ends the borrow with
    /// `CreateFailed`, so a dead backend never makes a borrow spin.
    ///
    /// # Errors
    /// See [`borrow`](Self::borrow).
    pub async fn borrow_timeout(&self, timeout: Option<Duration>) -> Result<Pooled<F>, PoolError> {
        let inner = &self.inner;
        if inner.lock_book().is_closed() {
            return Err(PoolError::PoolClosed);
        }
        let permit = inner.acquire_permit(timeout).await?;

        let mut failed_validations = 0usize;
        loop {
            let step = {
                let mut book = inner.lock_book();
                if book.is_closed() {
                    return Err(PoolError::PoolClosed);
                }
                let reuse_idle = failed_validations <= inner.config.max_validation_retries;
                if reuse_idle && let Some(slot) = book.take_idle(inner.config.lifo) {
                    Step::Reuse(slot)
                } else if let Some(id) = book.reserve_create(inner.config.max_total) {
                    Step::Create(id)
                } else if let Some(slot) = book.take_idle(inner.config.lifo) {
                    Step::Evict(slot)
                } else {
                    error!(
                        pool = inner.id,
                        live = book.live(),
                        "permit held but no capacity left; pool accounting is off"
                    );
                    return Err(PoolError::PoolExhausted { waited: timeout });
                }
            };

            match step {
                Step::Reuse(slot) => {
                    if let Some(slot) = inner.revalidate(slot, &mut failed_validations).await {
                        debug!(pool = inner.id, slot = slot.id, "reusing idle handle");
                        return self.hand_out(slot, permit).await;
                    }
                }
                Step::Create(id) => {
                    let slot = inner.create_slot(id).await?;
                    if let Some(slot) = inner.revalidate(slot, &mut failed_validations).await {
                        return self.hand_out(slot, permit).await;
                    }
                    if failed_validations > inner.config.max_validation_retries {
                        warn!(
                            pool = inner.id,
                            failed = failed_validations,
                            "giving up on borrow; new handles fail validation"
                        );
                        return Err(PoolError::create_failed(ValidationFailed {
                            failed: failed_validations,
                        }));
                    }
                }
                Step::Evict(slot) => inner.destroy_slot(slot).await,
            }
        }
    }

    /// Return a borrowed handle.
    ///
    /// The handle goes back to the idle queue unless the pool is closed, the
    /// queue already holds `max_idle` handles, or it fails validation (with
    /// `test_on_return` or `test_on_borrow`); in those cases it is destroyed
    /// and its capacity freed.
    ///
    /// # Errors
    /// `UnknownHandle` if this pool does not track the handle as borrowed. A
    /// handle from another pool is then returned to that pool instead.
    pub async fn release(&self, mut handle: Pooled<F>) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&handle.pool, &self.inner) {
            error!(
                pool = self.inner.id,
                owner = handle.pool.id,
                "released handle belongs to another pool"
            );
            return Err(PoolError::UnknownHandle);
        }
        let (slot, permit) = handle.disarm().ok_or(PoolError::UnknownHandle)?;
        self.inner.check_in(slot, permit).await
    }

    /// Close the pool: destroy idle handles, fail pending and future borrows
    /// with `PoolClosed`, and destroy borrowed handles as they come back.
    /// Calling it again does nothing.
    pub async fn shutdown(&self) {
        let Some(idle) = self.inner.lock_book().close() else {
            debug!(pool = self.inner.id, "pool already shut down");
            return;
        };
        self.inner.permits.close();
        let borrowed = self.inner.lock_book().borrowed_len();
        info!(
            pool = self.inner.id,
            idle = idle.len(),
            borrowed,
            "shutting down pool"
        );
        for slot in idle {
            self.inner.destroy_slot(slot).await;
        }
        if self.inner.lock_book().is_drained() {
            self.inner.drained.notify_waiters();
        }
    }

    /// [`shutdown`](Self::shutdown), then wait up to `grace` for borrowed
    /// handles to be released. Returns how many were still out.
    pub async fn shutdown_and_wait(&self, grace: Duration) -> usize {
        self.shutdown().await;
        let deadline = Instant::now().checked_add(grace);
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let outstanding = self.inner.lock_book().borrowed_len();
            if outstanding == 0 {
                return 0;
            }
            let woke = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, notified).await.is_ok(),
                None => {
                    notified.await;
                    true
                }
            };
            if !woke {
                let outstanding = self.inner.lock_book().borrowed_len();
                if outstanding > 0 {
                    warn!(
                        pool = self.inner.id,
                        outstanding,
                        "shutdown grace period elapsed; borrowed handles will be destroyed on return"
                    );
                }
                return outstanding;
            }
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock_book().is_closed()
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let book = self.inner.lock_book();
        PoolStatus {
            max_total: self.inner.config.max_total,
            max_idle: self.inner.config.effective_max_idle(),
            idle: book.idle_len(),
            borrowed: book.borrowed_len(),
            live: book.live(),
            available: self.inner.permits.available_permits(),
            closed: book.is_closed(),
            created: book.created,
            destroyed: book.destroyed,
            validation_failures: book.validation_failures,
        }
    }

    /// Current state of the slot with `id`. Unknown ids report `Destroyed`.
    #[must_use]
    pub fn slot_state(&self, id: SlotId) -> SlotState {
        self.inner.lock_book().state_of(id)
    }

    async fn hand_out(
        &self,
        mut slot: Slot<F::Handle>,
        permit: OwnedSemaphorePermit,
    ) -> Result<Pooled<F>, PoolError> {
        if self.inner.lock_book().is_closed() {
            self.inner.destroy_slot(slot).await;
            return Err(PoolError::PoolClosed);
        }
        slot.metrics.mark_borrowed();
        Ok(Pooled::new(Arc::clone(&self.inner), slot, permit))
    }
}

enum Step<T> {
    Reuse(Slot<T>),
    Create(SlotId),
    Evict(Slot<T>),
}

pub(crate) struct PoolInner<F: Factory> {
    pub(crate) id: u64,
    factory: F,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    book: Mutex<SlotBook<F::Handle>>,
    drained: Notify,
}

impl<F: Factory> PoolInner<F> {
    fn lock_book(&self) -> MutexGuard<'_, SlotBook<F::Handle>> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire_permit(
        &self,
        timeout: Option<Duration>,
    ) -> Result<OwnedSemaphorePermit, PoolError> {
        let non_blocking =
            !self.config.block_when_exhausted || timeout.is_some_and(|limit| limit.is_zero());
        if non_blocking {
            return Arc::clone(&self.permits)
                .try_acquire_owned()
                .map_err(|err| match err {
                    TryAcquireError::Closed => PoolError::PoolClosed,
                    TryAcquireError::NoPermits => PoolError::PoolExhausted { waited: None },
                });
        }

        let acquire = Arc::clone(&self.permits).acquire_owned();
        match timeout {
            None => acquire.await.map_err(|_| PoolError::PoolClosed),
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(permit) => permit.map_err(|_| PoolError::PoolClosed),
                Err(_) => Err(PoolError::PoolExhausted {
                    waited: Some(limit),
                }),
            },
        }
    }

    async fn create_slot(&self, id: SlotId) -> Result<Slot<F::Handle>, PoolError> {
        let reservation = Reservation::new(self, id, false, None);
        match self.factory.create().await {
            Ok(handle) => {
                reservation.keep();
                self.lock_book().created += 1;
                debug!(pool = self.id, slot = id, "created handle");
                Ok(Slot::new(id, handle))
            }
            Err(err) => {
                warn!(pool = self.id, error = %err, "factory failed to create handle");
                Err(PoolError::create_failed(err))
            }
        }
    }

    /// Validate a slot about to be handed out when `test_on_borrow` is set.
    /// A failing slot is destroyed and `None` returned.
    async fn revalidate(
        &self,
        mut slot: Slot<F::Handle>,
        failed_validations: &mut usize,
    ) -> Option<Slot<F::Handle>> {
        if !self.config.test_on_borrow {
            return Some(slot);
        }
        let reservation = Reservation::new(self, slot.id, true, None);
        if self.factory.validate(&mut slot.handle).await {
            reservation.keep();
            return Some(slot);
        }
        reservation.keep();
        *failed_validations += 1;
        self.lock_book().validation_failures += 1;
        warn!(
            pool = self.id,
            slot = slot.id,
            fresh = slot.metrics.borrow_count == 0,
            failed = *failed_validations,
            "handle failed validation on borrow"
        );
        self.destroy_slot(slot).await;
        None
    }

    /// Borrowed -> Idle or Destroyed.
    pub(crate) async fn check_in(
        &self,
        mut slot: Slot<F::Handle>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<(), PoolError> {
        let id = slot.id;
        let closed = {
            let book = self.lock_book();
            if !book.is_borrowed(id) {
                error!(pool = self.id, slot = id, "released handle is not tracked as borrowed");
                return Err(PoolError::UnknownHandle);
            }
            book.is_closed()
        };
        let reservation = Reservation::new(self, id, true, permit);

        let keep = if closed {
            false
        } else if self.config.validates_on_release() {
            let valid = self.factory.validate(&mut slot.handle).await;
            if !valid {
                self.lock_book().validation_failures += 1;
                warn!(pool = self.id, slot = id, "handle failed validation on release");
            }
            valid
        } else {
            true
        };

        if keep {
            let outcome = self
                .lock_book()
                .check_in(slot, self.config.effective_max_idle());
            match outcome {
                Ok(()) => {
                    drop(reservation.keep());
                    debug!(pool = self.id, slot = id, "handle returned to idle queue");
                    return Ok(());
                }
                Err(rejected) => slot = rejected,
            }
        }

        self.destroy_handle(id, slot.handle).await;
        drop(reservation);
        Ok(())
    }

    /// Destroy a slot that is not idle, then free its capacity.
    pub(crate) async fn destroy_slot(&self, slot: Slot<F::Handle>) {
        let _reservation = Reservation::new(self, slot.id, true, None);
        self.destroy_handle(slot.id, slot.handle).await;
    }

    async fn destroy_handle(&self, id: SlotId, handle: F::Handle) {
        match self.factory.destroy(handle).await {
            Ok(()) => debug!(pool = self.id, slot = id, "destroyed handle"),
            Err(err) => warn!(pool = self.id, slot = id, error = %err, "factory failed to destroy handle"),
        }
    }

    /// Forget a slot and free its capacity.
    pub(crate) fn discard(&self, id: SlotId, destroyed: bool) {
        let drained = {
            let mut book = self.lock_book();
            book.discard(id, destroyed);
            book.is_drained()
        };
        if drained {
            self.drained.notify_waiters();
        }
    }
}

/// Accounting for a slot that is between states. Unless [`keep`](Self::keep)
/// is called, dropping it discards the slot, then releases the permit it
/// carries. Cancelling a borrow or release mid-await therefore never leaks
/// capacity.
struct Reservation<'a, F: Factory> {
    inner: &'a PoolInner<F>,
    id: SlotId,
    destroyed: bool,
    armed: bool,
    permit: Option<OwnedSemaphorePermit>,
}

impl<'a, F: Factory> Reservation<'a, F> {
    fn new(
        inner: &'a PoolInner<F>,
        id: SlotId,
        destroyed: bool,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            inner,
            id,
            destroyed,
            armed: true,
            permit,
        }
    }

    fn keep(mut self) -> Option<OwnedSemaphorePermit> {
        self.armed = false;
        self.permit.take()
    }
}

impl<F: Factory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.discard(self.id, self.destroyed);
        }
    }
}
