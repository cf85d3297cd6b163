use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Pool-unique identifier of one handle.
pub type SlotId = u64;

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Borrowed,
    Destroyed,
}

/// Per-handle statistics.
#[derive(Debug, Clone, Copy)]
pub struct SlotMetrics {
    pub created: Instant,
    pub last_borrowed: Option<Instant>,
    pub borrow_count: u64,
}

impl SlotMetrics {
    fn new() -> Self {
        Self {
            created: Instant::now(),
            last_borrowed: None,
            borrow_count: 0,
        }
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub(crate) fn mark_borrowed(&mut self) {
        self.last_borrowed = Some(Instant::now());
        self.borrow_count += 1;
    }
}

pub(crate) struct Slot<T> {
    pub(crate) id: SlotId,
    pub(crate) handle: T,
    pub(crate) metrics: SlotMetrics,
}

impl<T> Slot<T> {
    pub(crate) fn new(id: SlotId, handle: T) -> Self {
        Self {
            id,
            handle,
            metrics: SlotMetrics::new(),
        }
    }
}

/// Bookkeeping shared by every borrower; always accessed under the pool mutex.
///
/// `live` counts idle slots, borrowed slots, creations in flight and slots
/// whose destroy has not finished yet. It never exceeds `max_total`.
pub(crate) struct SlotBook<T> {
    idle: VecDeque<Slot<T>>,
    borrowed: HashSet<SlotId>,
    live: usize,
    closed: bool,
    next_id: SlotId,
    pub(crate) created: u64,
    pub(crate) destroyed: u64,
    pub(crate) validation_failures: u64,
}

impl<T> SlotBook<T> {
    pub(crate) fn new(max_total: usize) -> Self {
        Self {
            idle: VecDeque::with_capacity(max_total),
            borrowed: HashSet::with_capacity(max_total),
            live: 0,
            closed: false,
            next_id: 1,
            created: 0,
            destroyed: 0,
            validation_failures: 0,
        }
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub(crate) fn borrowed_len(&self) -> usize {
        self.borrowed.len()
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn is_borrowed(&self, id: SlotId) -> bool {
        self.borrowed.contains(&id)
    }

    /// No borrowed handles remain after shutdown.
    pub(crate) fn is_drained(&self) -> bool {
        self.closed && self.borrowed.is_empty()
    }

    pub(crate) fn state_of(&self, id: SlotId) -> SlotState {
        if self.borrowed.contains(&id) {
            SlotState::Borrowed
        } else if self.idle.iter().any(|slot| slot.id == id) {
            SlotState::Idle
        } else {
            SlotState::Destroyed
        }
    }

    /// Idle -> Borrowed.
    pub(crate) fn take_idle(&mut self, lifo: bool) -> Option<Slot<T>> {
        let slot = if lifo {
            self.idle.pop_back()
        } else {
            self.idle.pop_front()
        }?;
        self.borrowed.insert(slot.id);
        Some(slot)
    }

    /// Reserve capacity for one creation. Capacity check and reservation are
    /// one step so concurrent borrowers cannot overshoot `max_total`.
    pub(crate) fn reserve_create(&mut self, max_total: usize) -> Option<SlotId> {
        if self.live >= max_total {
            return None;
        }
        self.live += 1;
        let id = self.next_id;
        self.next_id += 1;
        self.borrowed.insert(id);
        Some(id)
    }

    /// Borrowed -> Idle, unless the pool is closed or the idle queue is full.
    /// A rejected slot stays borrowed; the caller must destroy it.
    pub(crate) fn check_in(&mut self, slot: Slot<T>, max_idle: usize) -> Result<(), Slot<T>> {
        if self.closed || self.idle.len() >= max_idle || !self.borrowed.contains(&slot.id) {
            return Err(slot);
        }
        self.borrowed.remove(&slot.id);
        self.idle.push_back(slot);
        Ok(())
    }

    /// Forget a slot whose handle is gone, freeing its capacity.
    pub(crate) fn discard(&mut self, id: SlotId, destroyed: bool) {
        self.borrowed.remove(&id);
        self.live = self.live.saturating_sub(1);
        if destroyed {
            self.destroyed += 1;
        }
    }

    /// Mark the book closed and hand back every idle slot for destruction.
    /// Returns `None` if it was already closed.
    pub(crate) fn close(&mut self) -> Option<Vec<Slot<T>>> {
        if self.closed {
            return None;
        }
        self.closed = true;
        Some(self.idle.drain(..).collect())
    }
}
