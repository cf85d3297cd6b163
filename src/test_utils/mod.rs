//! Test utilities: an in-memory [`Factory`](crate::factory::Factory) with
//! call counters and failure switches.

pub mod mock;

pub use mock::{MockError, MockFactory, MockHandle};
