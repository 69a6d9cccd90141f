//! Binary poll payload codec
//!
//! Poll responses travel as a u32 big-endian length prefix followed by a
//! bincode-encoded `PollSnapshot`. The prefix lets a reader validate it
//! received the whole frame before deserializing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use squall_common::prelude::*;

use crate::sink::PollSnapshot;

/// Encode a snapshot into a length-prefixed frame.
pub fn encode_snapshot(snapshot: &PollSnapshot) -> Result<Bytes> {
    let body = bincode::serialize(snapshot)
        .map_err(|e| Error::Serialization(format!("encode poll snapshot: {}", e)))?;
    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Decode a length-prefixed frame back into a snapshot.
pub fn decode_snapshot(mut frame: &[u8]) -> Result<PollSnapshot> {
    if frame.len() < 4 {
        return Err(Error::Serialization(format!(
            "poll frame too short: {} bytes",
            frame.len()
        )));
    }
    let declared = frame.get_u32() as usize;
    if frame.len() != declared {
        return Err(Error::Serialization(format!(
            "poll frame length mismatch: declared {}, got {}",
            declared,
            frame.len()
        )));
    }
    bincode::deserialize(frame)
        .map_err(|e| Error::Serialization(format!("decode poll snapshot: {}", e)))
}
