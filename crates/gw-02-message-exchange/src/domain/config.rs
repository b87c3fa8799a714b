//! Transmission parameters (RFC 7252 §4.8) and the retransmission schedule.

use std::time::Duration;

use rand::Rng;

/// Upper bound accepted for `max_retransmit`.
pub const MAX_RETRANSMIT_LIMIT: u32 = 20;
/// Upper bound accepted for `ack_timeout`.
pub const MAX_ACK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeConfig {
    pub ack_timeout: Duration,
    /// Initial timeout is drawn from `[ack_timeout, ack_timeout * factor]`.
    pub ack_random_factor: f64,
    pub max_retransmit: u32,
    /// How long a message id is remembered for deduplication.
    pub exchange_lifetime: Duration,
    /// How long the handler may run before the request is acknowledged
    /// empty and answered with a separate response.
    pub piggyback_timeout: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            ack_random_factor: 1.5,
            max_retransmit: 4,
            exchange_lifetime: Duration::from_secs(247),
            piggyback_timeout: Duration::from_millis(1500),
        }
    }
}

impl ExchangeConfig {
    /// Create a config suitable for testing (short timers)
    pub fn for_testing() -> Self {
        Self {
            ack_timeout: Duration::from_millis(100),
            ack_random_factor: 1.5,
            max_retransmit: 2,
            exchange_lifetime: Duration::from_secs(5),
            piggyback_timeout: Duration::from_millis(200),
        }
    }

    /// Waits between transmissions of one confirmable message: a random
    /// initial timeout, doubled after every retransmission.
    ///
    /// Out-of-range parameters are clamped, never panic: a non-finite factor
    /// counts as 1.0 and at most [`MAX_RETRANSMIT_LIMIT`] retransmissions
    /// are scheduled.
    pub fn retransmission_schedule(&self) -> Vec<Duration> {
        let ack_timeout = self.ack_timeout.min(MAX_ACK_TIMEOUT);
        let factor = if self.ack_random_factor.is_finite() && self.ack_random_factor > 1.0 {
            rand::thread_rng().gen_range(1.0..=self.ack_random_factor)
        } else {
            1.0
        };
        let initial =
            Duration::try_from_secs_f64(ack_timeout.as_secs_f64() * factor).unwrap_or(ack_timeout);
        (0..=self.max_retransmit.min(MAX_RETRANSMIT_LIMIT))
            .map(|attempt| initial.saturating_mul(2u32.saturating_pow(attempt)))
            .collect()
    }
}
