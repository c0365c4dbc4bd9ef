//! The leader side of multi-process collection (§4.6).
//!
//! Grounded on `original_source/src/pycounters/reporters/tcpcollection.py`'s
//! `CollectingLeader`/`CollectingNodeProxy`: bind-and-listen, register one
//! proxy per accepted connection keyed by the node's announced id, and
//! merge whatever `collect_from_all_nodes` gets back using the §3 algebra.
//! A send/receive failure drops that one proxy and collection continues
//! with the rest.

use std::collections::HashMap;
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::collection::protocol::{read_message, write_message, Message};
use crate::error::Result;
use crate::value::{CounterValue, CounterValueCollection};

struct NodeProxy {
    id: String,
    stream: Mutex<TcpStream>,
}

impl NodeProxy {
    fn collect(&self) -> Result<CounterValueCollection> {
        let mut stream = self.stream.lock().unwrap();
        write_message(&mut *stream, &Message::Collect)?;
        let mut reader = BufReader::new(stream.try_clone()?);
        match read_message(&mut reader)? {
            Some(Message::Report(values)) => Ok(values),
            Some(_) | None => Err(crate::error::PerfCounterError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "node did not respond to collect with a report",
            ))),
        }
    }
}

/// Accepts connecting nodes, keeps one [`NodeProxy`] per announced id, and
/// aggregates `collect_from_all_nodes` results with the merge algebra.
pub struct CollectingLeader {
    listener: TcpListener,
    nodes: Arc<Mutex<HashMap<String, Arc<NodeProxy>>>>,
    accept_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CollectingLeader {
    /// Binds `addr`. Fails the way `TcpListener::bind` fails — the caller
    /// (the election state machine, §4.6 step 2-3) is expected to try the
    /// next endpoint on failure rather than treat this as fatal.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        Ok(Self::from_listener(TcpListener::bind(addr)?))
    }

    /// Wraps an already-bound listener. Used by the upgrade path
    /// ([`crate::collection::election::try_upgrade_once`]), which must bind
    /// the better endpoint before it can hand it off, to avoid a second
    /// bind/connect race against whoever else might be probing the same
    /// endpoint at the same moment.
    pub fn from_listener(listener: TcpListener) -> Self {
        CollectingLeader {
            listener,
            nodes: Arc::new(Mutex::new(HashMap::new())),
            accept_thread: Mutex::new(None),
        }
    }

    /// The address actually bound (useful when `addr`'s port was `0`).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Spawns the accept loop: each connection announces its id, gets an
    /// `ack`, and is registered as a proxy (§4.6 "announce/ack").
    pub fn start_accepting(&self) -> Result<()> {
        let listener = self.listener.try_clone()?;
        let nodes = self.nodes.clone();
        let handle = thread::spawn(move || {
            for incoming in listener.incoming() {
                let stream = match incoming {
                    Ok(s) => s,
                    Err(err) => {
                        tracing::warn!(error = %err, "leader accept loop error, stopping");
                        break;
                    }
                };
                let nodes = nodes.clone();
                thread::spawn(move || {
                    if let Err(err) = handle_new_node(stream, nodes) {
                        tracing::warn!(error = %err, "failed to register incoming node");
                    }
                });
            }
        });
        *self.accept_thread.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Sends `collect` to every registered node proxy and merges the
    /// responses with the §3 algebra, annotated with `__node_reports__`
    /// (per-node flat values) and `__collection_time__` (§4.6 "Merge").
    /// Proxies that fail are dropped and collection proceeds with the rest.
    pub fn collect_from_all_nodes(&self, now_secs: f64) -> Result<CounterValueCollection> {
        let snapshot: Vec<Arc<NodeProxy>> = self.nodes.lock().unwrap().values().cloned().collect();

        let mut merged = CounterValueCollection::new();
        let mut node_reports = CounterValueCollection::new();
        let mut failed = Vec::new();

        for proxy in snapshot {
            match proxy.collect() {
                Ok(values) => {
                    merged.merge_with(&values)?;
                    for (name, value) in values.iter() {
                        node_reports.insert(format!("{}.{}", proxy.id, name), value.clone());
                    }
                }
                Err(err) => {
                    tracing::warn!(node = %proxy.id, error = %err, "dropping node proxy after collect failure");
                    failed.push(proxy.id.clone());
                }
            }
        }

        if !failed.is_empty() {
            let mut nodes = self.nodes.lock().unwrap();
            for id in failed {
                nodes.remove(&id);
            }
        }

        // Per-node breakdown, flattened under a `__node_reports__.<node>.<key>`
        // namespace so it rides along in the same flat collection without
        // requiring a nested value type (§4.6 "Merge"). Every reporter that
        // cares only about the merged scalars skips anything under `__`.
        for (name, value) in node_reports.iter() {
            merged.insert(format!("__node_reports__.{name}"), value.clone());
        }
        merged.insert("__collection_time__", CounterValue::Max(Some(now_secs)));

        Ok(merged)
    }

    /// Sends `quit` to every node and drops the proxy set (§4.6
    /// "stop_leading").
    pub fn stop(&self) {
        let mut nodes = self.nodes.lock().unwrap();
        for (_, proxy) in nodes.drain() {
            let mut stream = proxy.stream.lock().unwrap();
            let _ = write_message(&mut *stream, &Message::Quit);
        }
    }
}

fn handle_new_node(stream: TcpStream, nodes: Arc<Mutex<HashMap<String, Arc<NodeProxy>>>>) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let id = match read_message(&mut reader)? {
        Some(Message::Announce(id)) => id,
        _ => {
            return Err(crate::error::PerfCounterError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "expected an announce as the first message from a node",
            )))
        }
    };
    let mut ack_stream = stream.try_clone()?;
    write_message(&mut ack_stream, &Message::Ack)?;
    nodes.lock().unwrap().insert(
        id.clone(),
        Arc::new(NodeProxy {
            id,
            stream: Mutex::new(stream),
        }),
    );
    Ok(())
}
