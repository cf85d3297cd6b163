use std::collections::HashMap;

use client_pool::test_utils::MockFactory;
use client_pool::{Pool, SlotState};

use crate::model::TaskState;

pub(crate) struct Oracle;

impl Oracle {
    /// Checked between steps, when no pool operation is in flight.
    pub(crate) fn check(
        tasks: &[TaskState],
        pool: &Pool<MockFactory>,
        factory: &MockFactory,
    ) -> Result<(), String> {
        let status = pool.status();
        if status.live > status.max_total {
            return Err(format!(
                "live {} exceeds max_total {}",
                status.live, status.max_total
            ));
        }
        if status.idle > status.max_idle {
            return Err(format!(
                "idle {} exceeds max_idle {}",
                status.idle, status.max_idle
            ));
        }
        if status.idle + status.borrowed != status.live {
            return Err(format!(
                "idle {} + borrowed {} != live {} with nothing in flight",
                status.idle, status.borrowed, status.live
            ));
        }
        if status.available != status.max_total - status.borrowed {
            return Err(format!(
                "{} permits available with {} of {} borrowed",
                status.available, status.borrowed, status.max_total
            ));
        }
        if factory.live() != status.live {
            return Err(format!(
                "factory reports {} live handles, pool tracks {}",
                factory.live(),
                status.live
            ));
        }
        if factory.peak_live() > status.max_total {
            return Err(format!(
                "factory peaked at {} live handles, max_total is {}",
                factory.peak_live(),
                status.max_total
            ));
        }

        let mut owners = HashMap::new();
        for task in tasks {
            let Some(slot) = task.slot() else {
                continue;
            };
            if let Some(other) = owners.insert(slot, task.id) {
                return Err(format!(
                    "slot {slot} held by tasks {other} and {} at once",
                    task.id
                ));
            }
            if pool.slot_state(slot) != SlotState::Borrowed {
                return Err(format!(
                    "task {} holds slot {slot} but the pool reports {:?}",
                    task.id,
                    pool.slot_state(slot)
                ));
            }
        }
        if owners.len() != status.borrowed {
            return Err(format!(
                "{} tasks hold handles but the pool counts {} borrowed",
                owners.len(),
                status.borrowed
            ));
        }

        Ok(())
    }
}
