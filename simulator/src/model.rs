use client_pool::Pooled;
use client_pool::test_utils::MockFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Borrow,
    Use,
    Release,
    Drop,
    Invalidate,
    Outage,
    Recover,
    Sleep(u64),
}

pub(crate) struct TaskState {
    pub(crate) id: usize,
    pub(crate) held: Option<Pooled<MockFactory>>,
}

impl TaskState {
    pub(crate) fn new(id: usize) -> Self {
        Self { id, held: None }
    }

    pub(crate) fn slot(&self) -> Option<u64> {
        self.held.as_ref().map(Pooled::id)
    }
}
