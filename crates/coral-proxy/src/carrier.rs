//! Handoff value for one backend reply.
//!
//! The backend I/O layer builds a [`ReplyCarrier`] per received message
//! and delivers it to the command's aggregator. The carrier owns the raw
//! message bytes (cheaply transferable, `Bytes` is reference counted) and
//! may carry the reply the I/O layer already parsed while framing the
//! stream, so the aggregator doesn't parse the same bytes twice.

use bytes::Bytes;
use coral_protocol::Reply;

/// One backend shard's response in transit to its aggregator.
///
/// Consumed exactly once: the aggregator takes ownership of the raw
/// buffer (and parsed reply, if present), leaving the carrier empty.
#[derive(Debug, Default)]
pub struct ReplyCarrier {
    raw: Option<Bytes>,
    parsed: Option<Reply>,
}

impl ReplyCarrier {
    /// Wraps a raw backend message that has not been parsed.
    pub fn new(raw: Bytes) -> Self {
        Self {
            raw: Some(raw),
            parsed: None,
        }
    }

    /// Wraps a raw backend message together with its parsed form.
    pub fn with_parsed(raw: Bytes, parsed: Reply) -> Self {
        Self {
            raw: Some(raw),
            parsed: Some(parsed),
        }
    }

    /// Transfers the raw message bytes out of the carrier.
    pub fn take_raw(&mut self) -> Option<Bytes> {
        self.raw.take()
    }

    /// Transfers the parsed reply out of the carrier, if the I/O layer
    /// provided one.
    pub fn take_parsed(&mut self) -> Option<Reply> {
        self.parsed.take()
    }
}
