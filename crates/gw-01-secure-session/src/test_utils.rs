//! Test utilities for the secure session engine.
//!
//! Enable with the `test-utils` feature flag.
//!
//! - [`ManualTimeSource`]: a clock tests advance by hand
//! - [`PskClient`]: a client-role handshake driver

mod client;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub use client::{ClientStep, PskClient};

use crate::ports::outbound::TimeSource;

/// A time source that only moves when told to.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use gw_01_secure_session::test_utils::ManualTimeSource;
/// use gw_01_secure_session::TimeSource;
///
/// let clock = ManualTimeSource::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.now() - start, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    now: Arc<Mutex<Instant>>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}
