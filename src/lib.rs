//! Lightweight always-on performance instrumentation (§1).
//!
//! `perfcounters` dispatches `(name, start|end|value)` events to counters
//! that accumulate mergeable values, then periodically hands a snapshot to
//! one or more reporters. Nothing here is opt-in at compile time: counters
//! and reporters are registered at runtime against a single process-wide
//! pipeline, matching `original_source`'s module-level singletons
//! (`pycounters.registry`, `pycounters.reporting`).
//!
//! This crate never installs a [`tracing`] subscriber itself — host
//! binaries wire one up the way the teacher's own examples do.

pub mod clock;
pub mod collection;
pub mod counters;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod registry;
pub mod report;
mod scope;
pub mod timer;
pub mod value;
mod window;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::collection::{CollectingLeader, CollectingNode};
use crate::counters::Counter;
use crate::dispatch::{GlobalDispatcher, ThreadDispatcher};
use crate::error::Result;
use crate::event::Event;
use crate::registry::Registry;
use crate::report::{Reporter, ReportingController};

pub use crate::error::PerfCounterError;
pub use crate::scope::{count, frequency, occurrence, report_start_end, time, value as report_value_scope};
pub use crate::value::{CounterValue, CounterValueCollection};

static GLOBAL_DISPATCHER: Lazy<GlobalDispatcher> = Lazy::new(GlobalDispatcher::new);

static GLOBAL_REGISTRY: Lazy<Arc<Registry>> = Lazy::new(|| {
    let registry = Arc::new(Registry::new());
    GLOBAL_DISPATCHER.add_listener(registry.clone());
    registry
});

static REPORTING_CONTROLLER: Lazy<Arc<ReportingController>> =
    Lazy::new(|| ReportingController::new(GLOBAL_REGISTRY.clone()));

/// The leader this process currently is, if [`configure_multi_process_collection`]
/// elected it as one (§4.6). Read dynamically by the installed merge
/// source so an [`UpgradeWatcher`]-driven promotion can swap it out without
/// tearing down and reinstalling the merge source itself.
static MULTI_PROCESS_LEADER: Lazy<Mutex<Option<Arc<CollectingLeader>>>> = Lazy::new(|| Mutex::new(None));

/// The background upgrade task for the current leader role, if any. Held so
/// it isn't dropped (and stopped) the moment [`configure_multi_process_collection`]
/// returns.
static UPGRADE_WATCHER: Lazy<Mutex<Option<collection::UpgradeWatcher>>> = Lazy::new(|| Mutex::new(None));

/// The process-global dispatcher tier every registered counter is attached
/// to through [`registry`]. Exposed so a host process can build its own
/// standalone [`event::Listener`]s (à la [`counters::ValueAccumulator`]) the
/// way the library's own counter family does.
pub fn global_dispatcher() -> &'static GlobalDispatcher {
    &GLOBAL_DISPATCHER
}

/// The calling thread's dispatcher tier (§4.1). Fans out to
/// [`global_dispatcher`] after its own listeners.
pub fn thread_dispatcher() -> ThreadDispatcher {
    ThreadDispatcher::new()
}

/// The process-wide counter directory (§4.3).
pub fn registry() -> Arc<Registry> {
    GLOBAL_REGISTRY.clone()
}

/// The process-wide reporting controller (§4.4).
pub fn reporting_controller() -> Arc<ReportingController> {
    REPORTING_CONTROLLER.clone()
}

/// Registers `counter`, subscribing it to its event names (§6
/// `register_counter`).
pub fn register_counter(counter: Arc<dyn Counter>) -> Result<()> {
    GLOBAL_REGISTRY.add(counter)
}

/// Unregisters the counter named `name` (§6 `unregister_counter`).
pub fn unregister_counter(name: &str) -> Result<()> {
    GLOBAL_REGISTRY.remove(name)
}

/// Adds `reporter` to the set invoked on every reporting cycle (§6
/// `register_reporter`).
pub fn register_reporter(reporter: Arc<dyn Reporter>) {
    REPORTING_CONTROLLER.add_reporter(reporter);
}

/// Removes a previously-registered reporter (§6 `unregister_reporter`).
pub fn unregister_reporter(reporter: &Arc<dyn Reporter>) {
    REPORTING_CONTROLLER.remove_reporter(reporter);
}

/// Starts periodic reporting every `seconds` (§6 `start_auto_reporting`).
pub fn start_auto_reporting(seconds: u64) {
    REPORTING_CONTROLLER.start_auto_reporting(Duration::from_secs(seconds));
}

/// Stops periodic reporting, if running (§6 `stop_auto_reporting`).
pub fn stop_auto_reporting() {
    REPORTING_CONTROLLER.stop_auto_reporting();
}

/// Forces one reporting cycle right now. Runs inline if auto-reporting
/// isn't running, or as an out-of-band flush of the background thread if it
/// is (§6 `output_report`).
pub fn output_report() -> Result<()> {
    match REPORTING_CONTROLLER.flush() {
        Ok(()) => Ok(()),
        Err(PerfCounterError::NotRunning(_)) => REPORTING_CONTROLLER.report(),
        Err(err) => Err(err),
    }
}

/// Raises a `start` event on the calling thread's dispatcher tier (§6
/// `report_start`).
pub fn report_start(name: impl Into<String>) {
    thread_dispatcher().dispatch_event(&Event::start(name.into()), &GLOBAL_DISPATCHER);
}

/// Raises an `end` event on the calling thread's dispatcher tier (§6
/// `report_end`).
pub fn report_end(name: impl Into<String>) {
    thread_dispatcher().dispatch_event(&Event::end(name.into()), &GLOBAL_DISPATCHER);
}

/// Raises a `value` event on the calling thread's dispatcher tier (§6
/// `report_value`).
pub fn report_value(name: impl Into<String>, v: f64) {
    thread_dispatcher().dispatch_event(&Event::value(name.into(), v), &GLOBAL_DISPATCHER);
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Installs a merge source that reads whichever leader is currently parked
/// in [`MULTI_PROCESS_LEADER`], so [`watch_for_upgrade`] can swap the
/// leader out from under a running report loop without reinstalling the
/// source itself.
fn install_merge_source() {
    REPORTING_CONTROLLER.set_merge_source(Some(Arc::new(|| {
        let leader = MULTI_PROCESS_LEADER.lock().unwrap().clone();
        match leader {
            Some(leader) => leader.collect_from_all_nodes(now_secs()),
            None => Ok(CounterValueCollection::new()),
        }
    })));
}

/// Connects `leader` to itself as an ordinary node (§4.6 step 2: "a leader
/// connects itself as a node to its own listener, so the leader's own
/// counters participate in merges"). Without this, `collect_from_all_nodes`
/// never sees the leader's own values — they'd only reach a final *report*
/// coincidentally, via the reporting controller's separate merge source.
fn connect_leader_to_self(leader: &Arc<CollectingLeader>) -> Result<()> {
    let addr = leader.local_addr()?;
    let node = Arc::new(CollectingNode::connect(addr, collection::generate_node_id())?);
    let registry = GLOBAL_REGISTRY.clone();
    node.start_background_receive(
        Arc::new(move || registry.get_values()),
        Arc::new(|| {
            tracing::warn!("leader's self-connection as a node was lost");
        }),
    );
    Ok(())
}

/// Spawns the background task that promotes `leader` to a better endpoint
/// in `addresses` once one frees up (§4.6 "Leader-at-lower-level upgrade").
/// On promotion, stops the old leader, starts a new one on the claimed
/// endpoint, and re-arms the watcher for the new (lower) level.
fn watch_for_upgrade(addresses: Vec<std::net::SocketAddr>, leader: Arc<CollectingLeader>, level: usize) {
    let watcher = collection::UpgradeWatcher::spawn(addresses.clone(), level, Duration::from_secs(1), move |new_level, listener| {
        leader.stop();
        let promoted = Arc::new(CollectingLeader::from_listener(listener));
        if let Err(err) = promoted.start_accepting() {
            tracing::error!(error = %err, "failed to start accepting on the promoted leader endpoint");
            return;
        }
        if let Err(err) = connect_leader_to_self(&promoted) {
            tracing::error!(error = %err, "promoted leader failed to connect to itself as a node");
        }
        *MULTI_PROCESS_LEADER.lock().unwrap() = Some(promoted.clone());
        watch_for_upgrade(addresses.clone(), promoted, new_level);
    });
    *UPGRADE_WATCHER.lock().unwrap() = Some(watcher);
}

/// Joins (or starts) multi-process collection across `addresses`, the
/// ordered endpoint/"level" list from §4.6, electing a role within
/// `timeout_in_sec`. When this process becomes leader, its
/// [`ReportingController`]'s merge source is wired to
/// [`CollectingLeader::collect_from_all_nodes`] so every local report picks
/// up the other nodes' values automatically, and a background task keeps
/// trying to promote it to a better endpoint as one frees up (§6
/// `configure_multi_process_collection`).
pub fn configure_multi_process_collection(addresses: &[std::net::SocketAddr], timeout_in_sec: u64) -> Result<()> {
    let role = collection::elect(addresses, timeout_in_sec)?;
    match role {
        collection::Role::Leader { leader, level } => {
            connect_leader_to_self(&leader)?;
            *MULTI_PROCESS_LEADER.lock().unwrap() = Some(leader.clone());
            install_merge_source();
            watch_for_upgrade(addresses.to_vec(), leader, level);
        }
        collection::Role::Node { node, .. } => {
            let registry = GLOBAL_REGISTRY.clone();
            node.start_background_receive(
                Arc::new(move || registry.get_values()),
                Arc::new(|| {
                    tracing::warn!("multi-process collection connection lost; not re-electing automatically");
                }),
            );
            REPORTING_CONTROLLER.set_merge_source(None);
            *MULTI_PROCESS_LEADER.lock().unwrap() = None;
            *UPGRADE_WATCHER.lock().unwrap() = None;
        }
    }
    Ok(())
}
