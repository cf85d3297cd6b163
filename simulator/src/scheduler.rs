use std::collections::BTreeMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

pub(crate) type TaskId = usize;

pub(crate) struct FakeClock {
    pub(crate) now_ms: u64,
}

/// Picks the next task to step. Sleeping tasks wait on the fake clock;
/// tasks that found the pool exhausted are parked until someone gives a
/// handle back.
pub(crate) struct Scheduler {
    ready: Vec<TaskId>,
    parked: Vec<TaskId>,
    timers: BTreeMap<u64, Vec<TaskId>>,
    pub(crate) clock: FakeClock,
}

impl Scheduler {
    pub(crate) fn new(task_count: usize) -> Self {
        Self {
            ready: (0..task_count).collect(),
            parked: Vec::new(),
            timers: BTreeMap::new(),
            clock: FakeClock { now_ms: 0 },
        }
    }

    pub(crate) fn sleep(&mut self, task: TaskId, duration_ms: u64) {
        let wake_at = self.clock.now_ms.saturating_add(duration_ms.max(1));
        self.timers.entry(wake_at).or_default().push(task);
    }

    pub(crate) fn park(&mut self, task: TaskId) {
        self.parked.push(task);
    }

    /// Capacity came back; every parked borrower gets another try.
    pub(crate) fn unpark_all(&mut self) {
        self.ready.append(&mut self.parked);
    }

    pub(crate) fn parked_len(&self) -> usize {
        self.parked.len()
    }

    pub(crate) fn mark_ready(&mut self, task: TaskId) {
        self.ready.push(task);
    }

    pub(crate) fn advance_time(&mut self, elapsed_ms: u64) {
        self.clock.now_ms = self.clock.now_ms.saturating_add(elapsed_ms.max(1));
        self.wake_due();
    }

    pub(crate) fn next_ready(&mut self, rng: &mut ChaCha8Rng) -> Option<TaskId> {
        if self.ready.is_empty() {
            let (wake_at, mut tasks) = self.timers.pop_first()?;
            self.clock.now_ms = self.clock.now_ms.max(wake_at);
            self.ready.append(&mut tasks);
            self.wake_due();
        }
        let idx = rng.random_range(0..self.ready.len());
        Some(self.ready.swap_remove(idx))
    }

    fn wake_due(&mut self) {
        while let Some(entry) = self.timers.first_entry() {
            if *entry.key() > self.clock.now_ms {
                break;
            }
            self.ready.append(&mut entry.remove());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sleepers_wake_in_clock_order() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut sched = Scheduler::new(0);
        sched.sleep(0, 30);
        sched.sleep(1, 10);
        assert_eq!(sched.next_ready(&mut rng), Some(1));
        assert_eq!(sched.clock.now_ms, 10);
        assert_eq!(sched.next_ready(&mut rng), Some(0));
        assert_eq!(sched.clock.now_ms, 30);
        assert_eq!(sched.next_ready(&mut rng), None);
    }

    #[test]
    fn parked_tasks_wait_for_unpark() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut sched = Scheduler::new(1);
        let task = sched.next_ready(&mut rng).unwrap();
        sched.park(task);
        assert_eq!(sched.next_ready(&mut rng), None);
        assert_eq!(sched.parked_len(), 1);
        sched.unpark_all();
        assert_eq!(sched.next_ready(&mut rng), Some(task));
    }
}
