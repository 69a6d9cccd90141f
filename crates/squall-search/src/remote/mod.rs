//! Remote search protocol
//!
//! Three verbs (`start`, `poll`, `destroy`) let a coordinating node
//! drive a search on a worker node and retrieve incremental serialized
//! results without holding a live connection. Poll payloads are
//! length-prefixed binary; control messages are JSON.

pub mod client;
pub mod codec;
pub mod server;
pub mod transport;

pub use client::RemoteNodeSearch;
pub use codec::{decode_snapshot, encode_snapshot};
pub use server::{RemoteSearchHandle, RemoteSearchManager};
pub use transport::{HttpRemoteTransport, InProcessTransport, RemoteSearchTransport};
