use std::time::Duration;

use client_pool::test_utils::MockFactory;
use client_pool::{Pool, PoolConfig, PoolError, SlotId};
use tokio::runtime::{Builder, Runtime};

use crate::args::SimConfig;
use crate::model::{Op, TaskState};

/// Expected, recoverable outcomes of a step.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SimError {
    Exhausted,
    CreateFailed,
}

#[derive(Debug, Clone)]
pub(crate) struct StepOutcome {
    pub(crate) result: Result<(), SimError>,
    pub(crate) slot: Option<SlotId>,
}

impl StepOutcome {
    fn ok(slot: Option<SlotId>) -> Self {
        Self {
            result: Ok(()),
            slot,
        }
    }
}

/// Drives a real pool over a [`MockFactory`] on a single-threaded runtime,
/// so every step runs to completion before the next one is chosen.
pub(crate) struct PoolShim {
    pub(crate) pool: Pool<MockFactory>,
    pub(crate) factory: MockFactory,
    runtime: Runtime,
    backend_down: bool,
}

impl PoolShim {
    pub(crate) fn new(config: &SimConfig) -> Result<Self, String> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|err| format!("failed to build runtime: {err}"))?;
        let factory = MockFactory::new();
        let pool = PoolConfig::builder()
            .max_total(config.max_total)
            .max_idle(config.max_idle)
            .test_on_borrow(config.test_on_borrow)
            .build(factory.clone())
            .map_err(|err| format!("failed to build pool: {err}"))?;
        Ok(Self {
            pool,
            factory,
            runtime,
            backend_down: false,
        })
    }

    pub(crate) fn backend_down(&self) -> bool {
        self.backend_down
    }

    pub(crate) fn apply(&mut self, task: &mut TaskState, op: Op) -> Result<StepOutcome, String> {
        match op {
            Op::Sleep(_) => Ok(StepOutcome::ok(task.slot())),
            Op::Borrow => self.borrow(task),
            Op::Use => {
                let handle = task
                    .held
                    .as_mut()
                    .ok_or_else(|| format!("task {} used a handle it does not hold", task.id))?;
                handle.touch();
                Ok(StepOutcome::ok(task.slot()))
            }
            Op::Release => self.release(task),
            Op::Drop => self.drop_handle(task),
            Op::Invalidate => {
                let handle = task
                    .held
                    .as_ref()
                    .ok_or_else(|| format!("task {} invalidated nothing", task.id))?;
                self.factory.invalidate(handle.id);
                Ok(StepOutcome::ok(task.slot()))
            }
            Op::Outage => {
                self.set_backend_down(true);
                Ok(StepOutcome::ok(task.slot()))
            }
            Op::Recover => {
                self.set_backend_down(false);
                Ok(StepOutcome::ok(task.slot()))
            }
        }
    }

    /// Return every outstanding handle, shut the pool down and report how
    /// many handles the factory still considers alive.
    pub(crate) fn finish(&mut self, tasks: &mut [TaskState]) -> Result<usize, String> {
        self.set_backend_down(false);
        for task in tasks.iter_mut() {
            if task.held.is_some() {
                self.release(task)?;
            }
        }
        let pool = self.pool.clone();
        let outstanding = self
            .runtime
            .block_on(async move { pool.shutdown_and_wait(Duration::from_secs(1)).await });
        if outstanding > 0 {
            return Err(format!("{outstanding} handles still borrowed after shutdown"));
        }
        Ok(self.factory.live())
    }

    fn borrow(&mut self, task: &mut TaskState) -> Result<StepOutcome, String> {
        if task.held.is_some() {
            return Err(format!("task {} attempted a double borrow", task.id));
        }
        let pool = self.pool.clone();
        let outcome = self
            .runtime
            .block_on(async move { pool.borrow_timeout(Some(Duration::ZERO)).await });
        match outcome {
            Ok(handle) => {
                task.held = Some(handle);
                Ok(StepOutcome::ok(task.slot()))
            }
            Err(PoolError::PoolExhausted { .. }) => Ok(StepOutcome {
                result: Err(SimError::Exhausted),
                slot: None,
            }),
            Err(PoolError::CreateFailed(_)) if self.backend_down => Ok(StepOutcome {
                result: Err(SimError::CreateFailed),
                slot: None,
            }),
            Err(err) => Err(format!("task {} borrow failed unexpectedly: {err}", task.id)),
        }
    }

    fn release(&mut self, task: &mut TaskState) -> Result<StepOutcome, String> {
        let handle = task
            .held
            .take()
            .ok_or_else(|| format!("task {} released without a handle", task.id))?;
        let slot = Some(client_pool::Pooled::id(&handle));
        let pool = self.pool.clone();
        self.runtime
            .block_on(async move { pool.release(handle).await })
            .map_err(|err| format!("task {} release failed: {err}", task.id))?;
        Ok(StepOutcome::ok(slot))
    }

    fn drop_handle(&mut self, task: &mut TaskState) -> Result<StepOutcome, String> {
        let handle = task
            .held
            .take()
            .ok_or_else(|| format!("task {} dropped without a handle", task.id))?;
        let slot = Some(client_pool::Pooled::id(&handle));
        {
            let _runtime = self.runtime.enter();
            drop(handle);
        }
        // Let the background return finish before the oracle looks.
        self.runtime.block_on(async {
            for _ in 0..16 {
                tokio::task::yield_now().await;
            }
        });
        Ok(StepOutcome::ok(slot))
    }

    fn set_backend_down(&mut self, down: bool) {
        self.backend_down = down;
        self.factory.set_fail_create(down);
        self.factory.set_fail_validate(down);
    }
}
