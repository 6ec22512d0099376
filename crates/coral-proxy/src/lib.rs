//! coral-proxy: reply aggregation for the coral sharding proxy.
//!
//! The proxy fans a client command out to the backend shards that own the
//! affected keys and must answer the client exactly once, after every
//! targeted shard has replied. This crate is that aggregation core: the
//! per-command [`WaitReply`] state machine, the [`ReplyCarrier`] handoff
//! from backend I/O, and the [`ClientSession`] send surface.
//!
//! Routing, connection lifecycle, and timeout detection live in the
//! surrounding proxy; this crate only decides what response to render
//! from the replies and error state it is given.

pub mod carrier;
pub mod error;
pub mod session;
pub mod wait;

pub use carrier::ReplyCarrier;
pub use error::ProxyError;
pub use session::ClientSession;
pub use wait::{ReplyGuard, ShardId, WaitReply};
