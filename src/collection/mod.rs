//! TCP-based leader election and multi-process value collection (§4.6).
//!
//! Grounded on `original_source/src/pycounters/reporters/tcpcollection.py`,
//! generalized from its single fixed port to the ordered endpoint/"level"
//! list §4.6 specifies. Enriched with `serde`/`bincode`/`byteorder` for the
//! wire format, since the teacher crate has no networking code of its own
//! to adapt.

mod election;
mod leader;
mod node;
mod protocol;

pub use election::{elect, try_upgrade_once, Role, UpgradeWatcher};
pub use leader::CollectingLeader;
pub use node::{generate_node_id, CollectingNode, CollectCallback, IoErrorCallback};
pub use protocol::{read_message, write_message, Message};
