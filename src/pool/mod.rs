pub mod connection;
pub mod slot;
pub mod status;
pub mod types;

pub use connection::Pooled;
pub use slot::{SlotId, SlotMetrics, SlotState};
pub use status::PoolStatus;
pub use types::Pool;
