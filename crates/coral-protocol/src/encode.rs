//! Direct-to-buffer message encoding.
//!
//! Writes fields directly into a `BytesMut` buffer with no intermediate
//! allocations. Integer-to-string conversion uses `itoa` for fast
//! stack-based formatting.
//!
//! The encoder is reusable: [`ReplyEncoder::finish`] splits the built
//! message off and leaves the internal buffer (and its capacity) ready
//! for the next message, so a long-lived session can encode every
//! response without reallocating.

use bytes::{BufMut, Bytes, BytesMut};

/// Reusable encoder for backend protocol messages.
///
/// Usage: [`begin`](Self::begin), one `write_*` call per field, then
/// [`finish`](Self::finish) to obtain the framed message bytes.
#[derive(Debug, Default)]
pub struct ReplyEncoder {
    buf: BytesMut,
}

impl ReplyEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new message, discarding any partially written fields.
    pub fn begin(&mut self) {
        self.buf.clear();
    }

    /// Appends one byte-string field.
    pub fn write_field(&mut self, data: &[u8]) {
        let mut size = itoa::Buffer::new();
        self.buf.put_slice(size.format(data.len()).as_bytes());
        self.buf.put_u8(b'\n');
        self.buf.put_slice(data);
        self.buf.put_u8(b'\n');
    }

    /// Appends one UTF-8 string field.
    pub fn write_str(&mut self, s: &str) {
        self.write_field(s.as_bytes());
    }

    /// Appends one integer field as its decimal representation.
    pub fn write_i64(&mut self, n: i64) {
        let mut val = itoa::Buffer::new();
        self.write_field(val.format(n).as_bytes());
    }

    /// Terminates the message and returns its wire bytes.
    ///
    /// The encoder is left empty and reusable.
    pub fn finish(&mut self) -> Bytes {
        self.buf.put_u8(b'\n');
        self.buf.split().freeze()
    }
}
