//! The node<->leader wire protocol (§4.6 "Wire protocol").
//!
//! Grounded on `original_source/src/pycounters/reporters/tcpcollection.py`:
//! a node sends its id unprompted as the very first thing on the socket,
//! the leader replies `"ack"`, and afterwards the leader drives a strict
//! request/response loop (`"collect"`, `"quit"`, `"wait"`). Framing and
//! serialization are implementation-defined per the spec; this crate uses a
//! `u32` big-endian length prefix (`byteorder`) around a `bincode`-encoded
//! payload, so every message is self-delimiting without needing a text
//! protocol.
use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value::CounterValueCollection;

/// Defensive cap on an incoming frame so a corrupt or hostile peer can't
/// make a reader allocate an unbounded buffer.
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Every message exchanged between a node and its leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Node -> leader, sent unprompted on connect: the node's id.
    Announce(String),
    /// Leader -> node, in response to [`Message::Announce`].
    Ack,
    /// Leader -> node: "send me your current counter values".
    Collect,
    /// Node -> leader, in response to [`Message::Collect`].
    Report(CounterValueCollection),
    /// Leader -> node: "close the connection".
    Quit,
    /// Leader -> node: no-op keepalive.
    Wait,
}

/// Writes `message` as a length-prefixed frame.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let payload = bincode::serialize(message)?;
    writer.write_u32::<BigEndian>(payload.len() as u32)?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Reads one length-prefixed frame. Returns `Ok(None)` on a clean EOF
/// before any bytes of the next frame arrive (the peer closed the
/// connection); any other failure is a real I/O or framing error.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Option<Message>> {
    let len = match reader.read_u32::<BigEndian>() {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large").into());
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(Some(bincode::deserialize(&buf)?))
}
