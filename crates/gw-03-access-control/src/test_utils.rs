//! Scripted access authority.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{AccessVerdict, Endpoint, UpstreamError};
use crate::ports::AccessAuthority;

/// Answers from a per-endpoint script and records every call.
///
/// Unscripted endpoints fail as unreachable.
///
/// ```rust
/// use gw_03_access_control::test_utils::ScriptedAuthority;
/// use gw_03_access_control::{AccessVerdict, Endpoint};
///
/// let authority = ScriptedAuthority::new()
///     .respond(Endpoint::Employee, Ok(AccessVerdict::granted()));
/// assert_eq!(authority.call_count(), 0);
/// ```
#[derive(Default)]
pub struct ScriptedAuthority {
    script: HashMap<Endpoint, Result<AccessVerdict, UpstreamError>>,
    delay: Duration,
    calls: Mutex<Vec<(Endpoint, String)>>,
}

impl ScriptedAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(
        mut self,
        endpoint: Endpoint,
        outcome: Result<AccessVerdict, UpstreamError>,
    ) -> Self {
        self.script.insert(endpoint, outcome);
        self
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(Endpoint, String)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl AccessAuthority for ScriptedAuthority {
    async fn request(
        &self,
        endpoint: Endpoint,
        payload: &str,
    ) -> Result<AccessVerdict, UpstreamError> {
        self.calls.lock().push((endpoint, payload.to_owned()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script
            .get(&endpoint)
            .cloned()
            .unwrap_or_else(|| Err(UpstreamError::Unreachable("not scripted".into())))
    }
}
