use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::factory::Factory;

/// Handle produced by [`MockFactory`]. Ids start at 1 and are never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockHandle {
    pub id: u64,
    pub uses: u64,
}

impl MockHandle {
    /// Pretend to do some work with the handle.
    pub fn touch(&mut self) -> u64 {
        self.uses += 1;
        self.uses
    }
}

#[derive(Debug, Error)]
#[error("mock factory: {0}")]
pub struct MockError(pub String);

#[derive(Debug, Default)]
struct MockState {
    next_id: AtomicU64,
    created: AtomicUsize,
    validated: AtomicUsize,
    destroyed: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    fail_create: AtomicBool,
    fail_validate: AtomicBool,
    fail_destroy: AtomicBool,
    bad_ids: Mutex<HashSet<u64>>,
    destroyed_ids: Mutex<Vec<u64>>,
    create_delay: Mutex<Option<Duration>>,
}

/// Factory whose behaviour tests can steer. Clones share counters and
/// switches, so keep one clone outside the pool to observe it.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `create` call.
    #[must_use]
    pub fn with_create_delay(self, delay: Duration) -> Self {
        *self
            .state
            .create_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self
    }

    #[must_use]
    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn validated(&self) -> usize {
        self.state.validated.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn destroyed(&self) -> usize {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    /// Handles created and not yet destroyed.
    #[must_use]
    pub fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    /// Highest `live` value ever observed.
    #[must_use]
    pub fn peak_live(&self) -> usize {
        self.state.peak_live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn destroyed_ids(&self) -> Vec<u64> {
        self.state
            .destroyed_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make every validation fail (the backend "went away").
    pub fn set_fail_validate(&self, fail: bool) {
        self.state.fail_validate.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_destroy(&self, fail: bool) {
        self.state.fail_destroy.store(fail, Ordering::SeqCst);
    }

    /// Make validation fail for one handle only.
    pub fn invalidate(&self, id: u64) {
        self.state
            .bad_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    fn is_bad(&self, id: u64) -> bool {
        self.state.fail_validate.load(Ordering::SeqCst)
            || self
                .state
                .bad_ids
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&id)
    }

    fn create_delay(&self) -> Option<Duration> {
        *self
            .state
            .create_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Factory for MockFactory {
    type Handle = MockHandle;
    type Error = MockError;

    async fn create(&self) -> Result<MockHandle, MockError> {
        if let Some(delay) = self.create_delay() {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(MockError("connection refused".into()));
        }
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let live = self.state.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_live.fetch_max(live, Ordering::SeqCst);
        self.state.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockHandle { id, uses: 0 })
    }

    async fn validate(&self, handle: &mut MockHandle) -> bool {
        self.state.validated.fetch_add(1, Ordering::SeqCst);
        !self.is_bad(handle.id)
    }

    async fn destroy(&self, handle: MockHandle) -> Result<(), MockError> {
        self.state.destroyed.fetch_add(1, Ordering::SeqCst);
        self.state.live.fetch_sub(1, Ordering::SeqCst);
        self.state
            .destroyed_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.id);
        if self.state.fail_destroy.load(Ordering::SeqCst) {
            return Err(MockError(format!("close failed for handle {}", handle.id)));
        }
        Ok(())
    }
}
