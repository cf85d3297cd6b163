/// Point-in-time view of a pool's accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_total: usize,
    pub max_idle: usize,
    /// Handles waiting in the pool for reuse.
    pub idle: usize,
    /// Handles currently owned by callers (including creations in flight).
    pub borrowed: usize,
    /// Every handle that exists or is being created or destroyed.
    pub live: usize,
    /// Capacity permits not held by a borrower.
    pub available: usize,
    pub closed: bool,
    /// Handles created since the pool was built.
    pub created: u64,
    /// Handles handed to `Factory::destroy` (or dropped) since the pool was built.
    pub destroyed: u64,
    pub validation_failures: u64,
}
