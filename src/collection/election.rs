//! Leader election across an ordered endpoint list (§4.6).
//!
//! Grounded structurally on `original_source/src/pycounters/reporters/tcpcollection.py`'s
//! `elect_leader` (try to connect, else try to bind, else back off and
//! retry) generalized from a single endpoint to the ordered "levels" list
//! §4.6 calls for, plus the upgrade-to-lower-level background task that
//! has no counterpart in the original source (§9 design note 4: apply
//! hysteresis so a freshly-promoted leader doesn't immediately get
//! preempted again).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::collection::leader::CollectingLeader;
use crate::collection::node::{generate_node_id, CollectingNode};
use crate::error::{PerfCounterError, Result};

/// The backoff schedule between election rounds: 0.1s, 0.2s, then 1s
/// repeated, per §4.6 step 4 / `original_source`'s `elect_leader`.
fn backoff_schedule() -> impl Iterator<Item = Duration> {
    [0.1, 0.2].into_iter().map(Duration::from_secs_f64).chain(std::iter::repeat(Duration::from_secs(1)))
}

/// Minimum time a leader stays at its current level before the upgrade
/// task will try to promote it again, even if a better endpoint frees up
/// sooner (§9 design note 4). Prevents thrashing between two participants
/// racing for the same preferred endpoint.
const MIN_LEADER_DWELL: Duration = Duration::from_secs(5);

/// What this participant currently is, after running [`elect`] (§4.6
/// "State machine").
pub enum Role {
    /// Connected as a node to the leader at level `level`.
    Node { level: usize, node: Arc<CollectingNode> },
    /// Bound as the leader at level `level`.
    Leader { level: usize, leader: Arc<CollectingLeader> },
}

/// Runs the election protocol once: try every endpoint as a node
/// (top-first), then every endpoint as a would-be leader (top-first),
/// backing off and retrying until `timeout_secs` elapses (§4.6 steps 1-4).
pub fn elect(endpoints: &[SocketAddr], timeout_secs: u64) -> Result<Role> {
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let mut attempts: u32 = 0;
    let mut backoff = backoff_schedule();

    loop {
        for (level, endpoint) in endpoints.iter().enumerate() {
            attempts += 1;
            let id = generate_node_id();
            match CollectingNode::connect(*endpoint, id) {
                Ok(node) => return Ok(Role::Node { level, node: Arc::new(node) }),
                Err(_) => continue,
            }
        }

        for (level, endpoint) in endpoints.iter().enumerate() {
            attempts += 1;
            match CollectingLeader::bind(*endpoint) {
                Ok(leader) => {
                    leader.start_accepting()?;
                    return Ok(Role::Leader { level, leader: Arc::new(leader) });
                }
                Err(_) => continue,
            }
        }

        if Instant::now() >= deadline {
            return Err(PerfCounterError::ElectionTimeout { attempts, timeout_secs });
        }

        thread::sleep(backoff.next().unwrap());
    }
}

/// Tries to claim a strictly better (lower-index) endpoint than `own_level`
/// by binding it, top-first. Returns the level and bound listener on
/// success so the caller can hand the listener to a fresh
/// [`CollectingLeader`] without a bind/connect race against anyone else
/// also probing the same endpoint.
///
/// Factored out of [`UpgradeWatcher`] so the upgrade step itself — not just
/// the polling loop around it — can be driven directly in tests.
pub fn try_upgrade_once(endpoints: &[SocketAddr], own_level: usize) -> Option<(usize, std::net::TcpListener)> {
    endpoints
        .iter()
        .enumerate()
        .take(own_level)
        .find_map(|(level, endpoint)| std::net::TcpListener::bind(endpoint).ok().map(|listener| (level, listener)))
}

/// Background task, run on every leader, that periodically tries to claim a
/// strictly better endpoint than the one it currently holds (§4.6
/// "Leader-at-lower-level upgrade"). A freshly-promoted leader will not be
/// upgraded again for [`MIN_LEADER_DWELL`], so two participants racing for
/// the same endpoint can't thrash.
pub struct UpgradeWatcher {
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl UpgradeWatcher {
    /// Spawns the watcher. `on_upgrade` is called (from the watcher's own
    /// thread) with the newly-bound listener the moment a better endpoint
    /// is claimed; it is responsible for shutting down the old leader and
    /// starting a new one from the listener it's handed. The watcher stops
    /// itself after the first successful upgrade — the caller is expected
    /// to spawn a new one for the promoted leader's new level, if desired.
    pub fn spawn(
        endpoints: Vec<SocketAddr>,
        own_level: usize,
        check_interval: Duration,
        on_upgrade: impl Fn(usize, std::net::TcpListener) + Send + 'static,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let became_leader_at = Instant::now();

        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                thread::sleep(check_interval);
                if became_leader_at.elapsed() < MIN_LEADER_DWELL {
                    continue;
                }
                if let Some((level, listener)) = try_upgrade_once(&endpoints, own_level) {
                    on_upgrade(level, listener);
                    return;
                }
            }
        });

        UpgradeWatcher {
            stop,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stops the watcher thread. Does not join it; callers that need to
    /// wait should keep their own handle.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for UpgradeWatcher {
    fn drop(&mut self) {
        self.stop();
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            // `on_upgrade` runs on the watcher's own thread; if it replaces
            // whatever's holding this `UpgradeWatcher` (e.g. to install the
            // next level's watcher after a promotion), this drop runs on
            // that same thread, and joining it here would deadlock.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_participant_becomes_leader_at_level_zero() {
        let endpoints = vec!["127.0.0.1:0".parse().unwrap()];
        // port 0 binds to an ephemeral port, so this always succeeds as a
        // bind (nothing is listening on an unassigned ephemeral port yet).
        let role = elect(&endpoints, 5).unwrap();
        match role {
            Role::Leader { level, .. } => assert_eq!(level, 0),
            Role::Node { .. } => panic!("expected to become leader with no other participant"),
        }
    }

    #[test]
    fn second_participant_joins_as_a_node() {
        let first_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = first_listener.local_addr().unwrap();
        drop(first_listener);

        let leader = CollectingLeader::bind(addr).unwrap();
        leader.start_accepting().unwrap();

        let role = elect(&[addr], 5).unwrap();
        assert!(matches!(role, Role::Node { level: 0, .. }));
    }

    fn free_addr() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    #[test]
    fn try_upgrade_once_claims_the_best_free_endpoint() {
        let preferred = free_addr();
        let fallback = free_addr();
        let _current = std::net::TcpListener::bind(fallback).unwrap();

        let (level, listener) = try_upgrade_once(&[preferred, fallback], 1).unwrap();
        assert_eq!(level, 0);
        assert_eq!(listener.local_addr().unwrap(), preferred);
    }

    #[test]
    fn try_upgrade_once_finds_nothing_when_every_better_endpoint_is_taken() {
        let preferred = free_addr();
        let fallback = free_addr();
        let _occupied = std::net::TcpListener::bind(preferred).unwrap();

        assert!(try_upgrade_once(&[preferred, fallback], 1).is_none());
    }

    /// S7 — a leader serving the lower-priority endpoint later claims the
    /// preferred one, and a node connected through the old endpoint
    /// observes the handoff and reconnects through the new one.
    #[test]
    fn a_promoted_leader_is_reachable_at_its_new_endpoint() {
        let e1 = free_addr();
        let e2 = free_addr();

        // P1 only knows about e2 to start with.
        let p1_old = CollectingLeader::bind(e2).unwrap();
        p1_old.start_accepting().unwrap();

        // P2 knows about both; e1 is free so it tries e1 first, fails, then
        // joins p1 on e2 at level 1.
        let p2_role = elect(&[e1, e2], 2).unwrap();
        assert!(matches!(p2_role, Role::Node { level: 1, .. }));

        // e1 frees up; P1 (now reconfigured to know about it, at level 1 of
        // its own list) claims it.
        let (level, listener) = try_upgrade_once(&[e1, e2], 1).unwrap();
        assert_eq!(level, 0);
        let p1_new = CollectingLeader::from_listener(listener);
        p1_new.start_accepting().unwrap();

        // a fresh election for a third participant now finds P1 at e1.
        let p3_role = elect(&[e1, e2], 2).unwrap();
        assert!(matches!(p3_role, Role::Node { level: 0, .. }));
    }
}
