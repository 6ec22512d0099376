//! Parsed backend replies.
//!
//! A [`Reply`] is the structured view of one message received from a
//! backend shard: an ordered list of byte-string fields. Fields are
//! `Bytes` slices into the received buffer, so a parsed reply keeps the
//! underlying network buffer alive and is freed automatically when the
//! reply (and every other slice holder) is dropped.

use bytes::Bytes;

/// Status field of a successful backend reply.
pub const STATUS_OK: &[u8] = b"ok";

/// Status field of a failed backend reply.
pub const STATUS_ERROR: &[u8] = b"error";

/// A parsed backend reply: one status field followed by zero or more
/// payload fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    fields: Vec<Bytes>,
}

impl Reply {
    pub(crate) fn new(fields: Vec<Bytes>) -> Self {
        Self { fields }
    }

    /// The status field (first field), if the reply has any fields.
    pub fn status(&self) -> Option<&[u8]> {
        self.fields.first().map(|f| f.as_ref())
    }

    /// Returns `true` if the status field is `ok`.
    pub fn is_ok(&self) -> bool {
        self.status() == Some(STATUS_OK)
    }

    /// Reads the reply as a single integer result.
    ///
    /// Returns `Some(n)` iff the status is `ok` and the payload field
    /// parses as a decimal `i64`. Any other shape (error status, missing
    /// payload, non-numeric payload) yields `None`.
    pub fn to_i64(&self) -> Option<i64> {
        if !self.is_ok() {
            return None;
        }
        let field = self.fields.get(1)?;
        std::str::from_utf8(field).ok()?.parse().ok()
    }

    /// Reads the reply as an ordered list of payload fields.
    ///
    /// Returns `Some(fields)` iff the status is `ok`; the slice excludes
    /// the status field and may be empty.
    pub fn values(&self) -> Option<&[Bytes]> {
        if !self.is_ok() {
            return None;
        }
        Some(&self.fields[1..])
    }

    /// All fields including the status, in wire order.
    pub fn fields(&self) -> &[Bytes] {
        &self.fields
    }

    /// Number of fields including the status.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the reply has no fields at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
