//! coral-protocol: the backend key-value wire protocol.
//!
//! Provides zero-copy parsing and direct-to-buffer encoding of the
//! size-prefixed block protocol spoken between the proxy and its backend
//! shards (and, for synthesized responses, back to clients).
//!
//! # quick start
//!
//! ```
//! use bytes::Bytes;
//! use coral_protocol::{parse_reply, ReplyEncoder};
//!
//! // encode a reply
//! let mut enc = ReplyEncoder::new();
//! enc.begin();
//! enc.write_str("ok");
//! enc.write_i64(42);
//! let wire = enc.finish();
//! assert_eq!(&wire[..], b"2\nok\n2\n42\n\n");
//!
//! // parse it back
//! let (reply, consumed) = parse_reply(&wire).unwrap().unwrap();
//! assert_eq!(consumed, wire.len());
//! assert_eq!(reply.to_i64(), Some(42));
//! ```

pub mod encode;
pub mod error;
pub mod parse;
pub mod reply;

pub use encode::ReplyEncoder;
pub use error::ProtocolError;
pub use parse::parse_reply;
pub use reply::Reply;
