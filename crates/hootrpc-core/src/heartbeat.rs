//! Heartbeat backend (C4): per-peer liveness tracking.
//!
//! `handle_heartbeat` is called by the peer engine on *every* inbound
//! message from an authenticated peer, not just `HEARTBEAT` frames — "every
//! message is an implicit heartbeat" (invariant 3 in SPEC_FULL.md §3).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The capability set the peer engine depends on from a heartbeat plugin.
pub trait HeartbeatBackend: Send + Sync {
    fn configure(&self) {}
    fn stop(&self) {}

    /// Update `last_seen` for `peer_id`.
    fn handle_heartbeat(&self, peer_id: &[u8]);

    /// Declare a peer unreachable. Eviction policy is backend-specific;
    /// the default noop backend never evicts.
    fn handle_timeout_detection(&self, peer_id: &[u8]);
}

/// Default backend: tracks nothing, evicts nothing. Mandatory fallback
/// when no `heartbeat_plugin` is configured.
#[derive(Debug, Default)]
pub struct NoopHeartbeat;

impl HeartbeatBackend for NoopHeartbeat {
    fn handle_heartbeat(&self, _peer_id: &[u8]) {}
    fn handle_timeout_detection(&self, _peer_id: &[u8]) {}
}

/// Time-based backend: records `last_seen` per peer and considers a peer
/// dead once `handle_timeout_detection` is invoked and more than
/// `eviction_after` has elapsed since it was last seen. The periodic
/// `HEARTBEAT` emission and the scheduling of `handle_timeout_detection`
/// calls are the peer engine's job (it owns the clock/task scheduler);
/// this backend only owns the liveness table.
pub struct IntervalHeartbeat {
    eviction_after: Duration,
    last_seen: Mutex<HashMap<Vec<u8>, Instant>>,
    dead: Mutex<std::collections::HashSet<Vec<u8>>>,
}

impl IntervalHeartbeat {
    pub fn new(eviction_after: Duration) -> Self {
        Self {
            eviction_after,
            last_seen: Mutex::new(HashMap::new()),
            dead: Mutex::new(std::collections::HashSet::new()),
        }
    }

    pub fn is_dead(&self, peer_id: &[u8]) -> bool {
        self.dead.lock().expect("poisoned").contains(peer_id)
    }

    pub fn last_seen(&self, peer_id: &[u8]) -> Option<Instant> {
        self.last_seen.lock().expect("poisoned").get(peer_id).copied()
    }
}

impl HeartbeatBackend for IntervalHeartbeat {
    fn handle_heartbeat(&self, peer_id: &[u8]) {
        self.last_seen
            .lock()
            .expect("poisoned")
            .insert(peer_id.to_vec(), Instant::now());
        self.dead.lock().expect("poisoned").remove(peer_id);
    }

    fn handle_timeout_detection(&self, peer_id: &[u8]) {
        let stale = match self.last_seen.lock().expect("poisoned").get(peer_id) {
            Some(seen) => seen.elapsed() >= self.eviction_after,
            None => true,
        };
        if stale {
            self.dead.lock().expect("poisoned").insert(peer_id.to_vec());
        }
    }
}

/// Explicit factory registry keyed by plugin name (same rationale as
/// [`crate::auth::by_name`]).
pub fn by_name(name: &str) -> Option<Box<dyn HeartbeatBackend>> {
    match name {
        "noop_heartbeat_backend" | "noop" => Some(Box::new(NoopHeartbeat)),
        "interval" => Some(Box::new(IntervalHeartbeat::new(Duration::from_secs(90)))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_backend_tracks_liveness() {
        let hb = IntervalHeartbeat::new(Duration::from_millis(10));
        hb.handle_heartbeat(b"peer-1");
        assert!(hb.last_seen(b"peer-1").is_some());
        assert!(!hb.is_dead(b"peer-1"));
    }

    #[test]
    fn interval_backend_evicts_stale_peers() {
        let hb = IntervalHeartbeat::new(Duration::from_millis(1));
        hb.handle_heartbeat(b"peer-1");
        std::thread::sleep(Duration::from_millis(10));
        hb.handle_timeout_detection(b"peer-1");
        assert!(hb.is_dead(b"peer-1"));
    }

    #[test]
    fn unknown_peer_is_stale() {
        let hb = IntervalHeartbeat::new(Duration::from_secs(60));
        hb.handle_timeout_detection(b"never-seen");
        assert!(hb.is_dead(b"never-seen"));
    }
}
