//! Adapters for the outbound ports.

pub mod memory_store;

use std::time::Instant;

pub use memory_store::InMemoryPskStore;

use crate::ports::outbound::TimeSource;

/// Wall-clock time source for production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
