//! # Deduplication
//!
//! Inbound requests are remembered by `(peer, message id)` for
//! `EXCHANGE_LIFETIME`. A duplicate of an exchange still being handled is
//! dropped; a duplicate of a finished exchange gets the cached response.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupStatus {
    /// First time seen; the caller owns the exchange.
    New,
    /// Seen, response not ready yet.
    InProgress,
    /// Seen and answered; replay these bytes.
    Completed(Vec<u8>),
}

#[derive(Debug)]
struct Exchange {
    response: Option<Vec<u8>>,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct DedupCache {
    exchanges: DashMap<(SocketAddr, u16), Exchange>,
    lifetime: Duration,
}

impl DedupCache {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            exchanges: DashMap::new(),
            lifetime,
        }
    }

    /// Atomically classify `(peer, mid)` and claim it if new.
    pub fn begin(&self, peer: SocketAddr, message_id: u16, now: Instant) -> DedupStatus {
        let fresh = Exchange {
            response: None,
            expires_at: now + self.lifetime,
        };
        match self.exchanges.entry((peer, message_id)) {
            Entry::Occupied(mut entry) if entry.get().expires_at <= now => {
                entry.insert(fresh);
                DedupStatus::New
            }
            Entry::Occupied(entry) => match &entry.get().response {
                Some(bytes) => DedupStatus::Completed(bytes.clone()),
                None => DedupStatus::InProgress,
            },
            Entry::Vacant(entry) => {
                entry.insert(fresh);
                DedupStatus::New
            }
        }
    }

    /// Record the response that duplicates should receive.
    pub fn complete(&self, peer: SocketAddr, message_id: u16, response: Vec<u8>) {
        if let Some(mut exchange) = self.exchanges.get_mut(&(peer, message_id)) {
            exchange.response = Some(response);
        }
    }

    /// Forget everything about a peer (its session ended).
    pub fn forget_peer(&self, peer: SocketAddr) {
        self.exchanges.retain(|(p, _), _| *p != peer);
    }

    /// Drop expired exchanges; returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.exchanges.len();
        self.exchanges.retain(|_, e| e.expires_at > now);
        before - self.exchanges.len()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], 5684))
    }

    #[test]
    fn test_duplicate_lifecycle() {
        let cache = DedupCache::new(Duration::from_secs(247));
        let now = Instant::now();

        assert_eq!(cache.begin(peer(), 1, now), DedupStatus::New);
        assert_eq!(cache.begin(peer(), 1, now), DedupStatus::InProgress);

        cache.complete(peer(), 1, vec![0x60, 0x45, 0, 1]);
        assert_eq!(
            cache.begin(peer(), 1, now),
            DedupStatus::Completed(vec![0x60, 0x45, 0, 1])
        );
        // Different id, same peer
        assert_eq!(cache.begin(peer(), 2, now), DedupStatus::New);
    }

    #[test]
    fn test_expired_exchange_is_new_again() {
        let cache = DedupCache::new(Duration::from_secs(10));
        let now = Instant::now();
        cache.begin(peer(), 9, now);
        cache.complete(peer(), 9, vec![1]);

        let later = now + Duration::from_secs(10);
        assert_eq!(cache.begin(peer(), 9, later), DedupStatus::New);
    }

    #[test]
    fn test_purge_and_forget() {
        let cache = DedupCache::new(Duration::from_secs(10));
        let now = Instant::now();
        let other = SocketAddr::from(([10, 0, 0, 2], 5684));
        cache.begin(peer(), 1, now);
        cache.begin(other, 1, now + Duration::from_secs(5));

        assert_eq!(cache.purge_expired(now + Duration::from_secs(11)), 1);
        assert_eq!(cache.len(), 1);
        cache.forget_peer(other);
        assert!(cache.is_empty());
    }
}
