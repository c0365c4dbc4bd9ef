//! The node side of multi-process collection (§4.6).
//!
//! Grounded on `original_source/src/pycounters/reporters/tcpcollection.py`'s
//! `CollectingNode`: connect, announce, then run a sequential
//! read-command/execute/write-response loop on a background thread until
//! an I/O error or `quit` ends it.

use std::io::BufReader;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::collection::protocol::{read_message, write_message, Message};
use crate::error::{PerfCounterError, Result};
use crate::value::CounterValueCollection;

static NODE_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// A reasonably unique, human-readable node identity: hostname, process id,
/// and a per-process sequence number, matching the shape
/// `original_source`'s `CollectingNode.gen_id` produces
/// (`"<fqdn>_<pid>_<seq>"`).
pub fn generate_node_id() -> String {
    let seq = NODE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let host = nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("{host}_{}_{seq}", std::process::id())
}

/// A source of this process's current counter values, supplied to the
/// leader on every `collect` request.
pub type CollectCallback = dyn Fn() -> CounterValueCollection + Send + Sync;

/// Called when the receive loop observes an I/O error or unexpected EOF.
/// The caller is responsible for re-running the election sequence
/// (§4.6 "Node recovery") — this node does not re-connect itself.
pub type IoErrorCallback = dyn Fn() + Send + Sync;

/// A connection to the elected leader, with a background thread answering
/// its requests.
pub struct CollectingNode {
    pub id: String,
    stream: Mutex<TcpStream>,
    receive_thread: Mutex<Option<JoinHandle<()>>>,
}

impl CollectingNode {
    /// Connects to `leader`, announces `id`, and waits for the leader's
    /// `ack` (§4.6 step 1). Does not start the receive loop — call
    /// [`Self::start_background_receive`] once the caller is ready.
    pub fn connect(leader: std::net::SocketAddr, id: String) -> Result<Self> {
        let mut stream = TcpStream::connect(leader)?;
        write_message(&mut stream, &Message::Announce(id.clone()))?;
        match read_message(&mut BufReader::new(stream.try_clone()?))? {
            Some(Message::Ack) => Ok(CollectingNode {
                id,
                stream: Mutex::new(stream),
                receive_thread: Mutex::new(None),
            }),
            Some(_) => Err(PerfCounterError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "leader did not ack the announce",
            ))),
            None => Err(PerfCounterError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "leader closed the connection before acking",
            ))),
        }
    }

    /// Spawns the background thread that answers the leader's `collect`/
    /// `wait`/`quit` requests, sourcing values from `collect_callback` and
    /// reporting errors to `io_error_callback` (§4.6 "Node recovery").
    pub fn start_background_receive(
        self: &Arc<Self>,
        collect_callback: Arc<CollectCallback>,
        io_error_callback: Arc<IoErrorCallback>,
    ) {
        let node = self.clone();
        let handle = thread::spawn(move || node.execute_commands(collect_callback, io_error_callback));
        *self.receive_thread.lock().unwrap() = Some(handle);
    }

    fn execute_commands(&self, collect_callback: Arc<CollectCallback>, io_error_callback: Arc<IoErrorCallback>) {
        loop {
            let mut reader = match self.stream.lock().unwrap().try_clone() {
                Ok(s) => BufReader::new(s),
                Err(err) => {
                    tracing::warn!(node = %self.id, error = %err, "failed to clone node socket");
                    io_error_callback();
                    return;
                }
            };
            match read_message(&mut reader) {
                Ok(Some(Message::Collect)) => {
                    let values = collect_callback();
                    if let Err(err) = write_message(&mut *self.stream.lock().unwrap(), &Message::Report(values)) {
                        tracing::warn!(node = %self.id, error = %err, "failed to send collect response");
                        io_error_callback();
                        return;
                    }
                }
                Ok(Some(Message::Wait)) => {}
                Ok(Some(Message::Quit)) | Ok(None) => {
                    tracing::debug!(node = %self.id, "leader closed the collection connection");
                    return;
                }
                Ok(Some(other)) => {
                    tracing::warn!(node = %self.id, message = ?other, "unexpected message from leader, ignoring");
                }
                Err(err) => {
                    tracing::warn!(node = %self.id, error = %err, "I/O error in node receive loop");
                    io_error_callback();
                    return;
                }
            }
        }
    }
}
