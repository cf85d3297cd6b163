use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use super::slot::{Slot, SlotId, SlotMetrics};
use super::types::PoolInner;
use crate::factory::Factory;

/// A handle borrowed from a [`Pool`](super::Pool).
///
/// Dereferences to the factory's handle type. Give it back with
/// [`Pool::release`](super::Pool::release); if it is dropped instead, it is
/// returned on the current tokio runtime in the background.
#[must_use]
pub struct Pooled<F: Factory> {
    pub(crate) pool: Arc<PoolInner<F>>,
    slot: Option<Slot<F::Handle>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl<F: Factory> Pooled<F> {
    pub(crate) fn new(
        pool: Arc<PoolInner<F>>,
        slot: Slot<F::Handle>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            pool,
            slot: Some(slot),
            permit: Some(permit),
        }
    }

    /// Identifier of the slot backing this handle.
    #[must_use]
    pub fn id(this: &Self) -> SlotId {
        this.slot().id
    }

    #[must_use]
    pub fn metrics(this: &Self) -> &SlotMetrics {
        &this.slot().metrics
    }

    /// Take the handle out of the pool for good. Its capacity is freed and the
    /// factory never sees it again.
    #[must_use]
    pub fn detach(mut this: Self) -> F::Handle {
        let slot = this.slot.take().expect("pooled handle already released");
        this.pool.discard(slot.id, false);
        drop(this.permit.take());
        slot.handle
    }

    pub(crate) fn disarm(&mut self) -> Option<(Slot<F::Handle>, Option<OwnedSemaphorePermit>)> {
        let slot = self.slot.take()?;
        Some((slot, self.permit.take()))
    }

    fn slot(&self) -> &Slot<F::Handle> {
        self.slot.as_ref().expect("pooled handle already released")
    }
}

impl<F: Factory> Deref for Pooled<F> {
    type Target = F::Handle;

    fn deref(&self) -> &F::Handle {
        &self.slot().handle
    }
}

impl<F: Factory> DerefMut for Pooled<F> {
    fn deref_mut(&mut self) -> &mut F::Handle {
        &mut self
            .slot
            .as_mut()
            .expect("pooled handle already released")
            .handle
    }
}

impl<F: Factory> AsRef<F::Handle> for Pooled<F> {
    fn as_ref(&self) -> &F::Handle {
        self
    }
}

impl<F: Factory> AsMut<F::Handle> for Pooled<F> {
    fn as_mut(&mut self) -> &mut F::Handle {
        self
    }
}

impl<F> fmt::Debug for Pooled<F>
where
    F: Factory,
    F::Handle: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.slot {
            Some(slot) => f
                .debug_struct("Pooled")
                .field("id", &slot.id)
                .field("handle", &slot.handle)
                .finish(),
            None => f.debug_struct("Pooled").field("released", &true).finish(),
        }
    }
}

impl<F: Factory> Drop for Pooled<F> {
    fn drop(&mut self) {
        let Some((slot, permit)) = self.disarm() else {
            return;
        };
        let pending = PendingReturn {
            pool: Arc::clone(&self.pool),
            slot: Some(slot),
            permit,
        };
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let pool = Arc::clone(&pending.pool);
                    let Some((slot, permit)) = pending.hand_over() else {
                        return;
                    };
                    if let Err(err) = pool.check_in(slot, permit).await {
                        warn!(pool = pool.id, error = %err, "could not return dropped handle");
                    }
                });
            }
            Err(_) => {
                warn!(
                    pool = self.pool.id,
                    "handle dropped outside a tokio runtime; skipping Factory::destroy"
                );
                drop(pending);
            }
        }
    }
}

/// A dropped handle on its way back to the pool. If the return never runs,
/// for instance because the runtime shut down before polling it, dropping
/// this forgets the slot and only then frees its permit.
struct PendingReturn<F: Factory> {
    pool: Arc<PoolInner<F>>,
    slot: Option<Slot<F::Handle>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl<F: Factory> PendingReturn<F> {
    fn hand_over(mut self) -> Option<(Slot<F::Handle>, Option<OwnedSemaphorePermit>)> {
        let slot = self.slot.take()?;
        Some((slot, self.permit.take()))
    }
}

impl<F: Factory> Drop for PendingReturn<F> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            debug!(pool = self.pool.id, slot = slot.id, "dropped handle discarded without check-in");
            self.pool.discard(slot.id, true);
        }
        drop(self.permit.take());
    }
}
