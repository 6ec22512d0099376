//! Zero-copy parser for backend protocol messages.
//!
//! Operates on buffered byte slices. The caller is responsible for reading
//! data from the network into a buffer — this parser is purely synchronous.
//!
//! The parser uses a `Cursor<&[u8]>` to track its position through the
//! input buffer without consuming it, allowing the caller to retry once
//! more data arrives.
//!
//! # Wire format
//!
//! A message is a sequence of blocks, each `<decimal size>\n` followed by
//! `size` bytes of data and a newline, terminated by one empty line:
//!
//! ```text
//! 2\nok\n2\n42\n\n
//! ```
//!
//! `\r\n` is tolerated wherever a bare `\n` is expected.
//!
//! # Zero-copy fields
//!
//! Field data is returned as `Bytes::slice()` into the source buffer, so
//! parsing a reply never copies payload bytes.

use std::io::Cursor;

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::reply::Reply;

/// Maximum length of a single field in bytes (512 MB).
const MAX_BLOCK_LEN: usize = 512 * 1024 * 1024;

/// Maximum number of fields in one message. Prevents memory amplification
/// from a stream of tiny blocks with no terminator.
const MAX_FIELDS: usize = 1_048_576;

/// Cap for Vec::with_capacity when collecting fields. Real replies are
/// small; this keeps the initial allocation bounded regardless of how
/// many blocks the message turns out to contain.
const PREALLOC_CAP: usize = 64;

/// Parses one complete message from the front of `buf`.
///
/// Returns `Ok(Some((reply, consumed)))` if a complete message was parsed,
/// `Ok(None)` if the buffer doesn't contain enough data yet,
/// or `Err(...)` if the data is malformed.
#[inline]
pub fn parse_reply(buf: &Bytes) -> Result<Option<(Reply, usize)>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut cursor = Cursor::new(buf.as_ref());

    match try_parse(&mut cursor, buf) {
        Ok(reply) => {
            let consumed = cursor.position() as usize;
            Ok(Some((reply, consumed)))
        }
        Err(ProtocolError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Parses blocks until the empty terminator line, returning `Incomplete`
/// if the buffer runs out first.
fn try_parse(cursor: &mut Cursor<&[u8]>, src: &Bytes) -> Result<Reply, ProtocolError> {
    let mut fields = Vec::with_capacity(PREALLOC_CAP);

    loop {
        let line = read_line(cursor)?;
        if line.is_empty() {
            // empty line terminates the message
            return Ok(Reply::new(fields));
        }

        if fields.len() >= MAX_FIELDS {
            return Err(ProtocolError::TooManyFields(fields.len() + 1));
        }

        let size = parse_size(line)?;
        if size > MAX_BLOCK_LEN {
            return Err(ProtocolError::BlockTooLarge(size));
        }

        let pos = cursor.position() as usize;
        if cursor.get_ref().len() < pos + size {
            return Err(ProtocolError::Incomplete);
        }
        cursor.set_position((pos + size) as u64);
        consume_newline(cursor)?;

        fields.push(src.slice(pos..pos + size));
    }
}

// ---------------------------------------------------------------------------
// low-level cursor helpers
// ---------------------------------------------------------------------------

/// Returns the slice of bytes up to (but not including) the next `\n`,
/// with a trailing `\r` stripped, advancing the cursor past the newline.
fn read_line<'a>(cursor: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let buf = *cursor.get_ref();
    let start = cursor.position() as usize;

    let Some(offset) = buf[start..].iter().position(|&b| b == b'\n') else {
        return Err(ProtocolError::Incomplete);
    };

    cursor.set_position((start + offset + 1) as u64);

    let mut line = &buf[start..start + offset];
    if let Some((&b'\r', rest)) = line.split_last() {
        line = rest;
    }
    Ok(line)
}

/// Parses a block size line: decimal digits only.
fn parse_size(line: &[u8]) -> Result<usize, ProtocolError> {
    if line.is_empty() || !line.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::InvalidSize);
    }
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ProtocolError::InvalidSize)
}

/// Consumes the `\n` (or `\r\n`) that must follow a data block.
fn consume_newline(cursor: &mut Cursor<&[u8]>) -> Result<(), ProtocolError> {
    let buf = *cursor.get_ref();
    let pos = cursor.position() as usize;

    match buf.get(pos) {
        None => Err(ProtocolError::Incomplete),
        Some(b'\n') => {
            cursor.set_position((pos + 1) as u64);
            Ok(())
        }
        Some(b'\r') => match buf.get(pos + 1) {
            None => Err(ProtocolError::Incomplete),
            Some(b'\n') => {
                cursor.set_position((pos + 2) as u64);
                Ok(())
            }
            Some(_) => Err(ProtocolError::BadTerminator),
        },
        Some(_) => Err(ProtocolError::BadTerminator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Result<Option<(Reply, usize)>, ProtocolError> {
        parse_reply(&Bytes::copy_from_slice(input))
    }

    #[test]
    fn ok_with_integer() {
        let (reply, consumed) = parse(b"2\nok\n2\n42\n\n").unwrap().unwrap();
        assert_eq!(consumed, 11);
        assert!(reply.is_ok());
        assert_eq!(reply.to_i64(), Some(42));
    }

    #[test]
    fn error_reply() {
        let (reply, _) = parse(b"5\nerror\n9\nnot_found\n\n").unwrap().unwrap();
        assert_eq!(reply.status(), Some(&b"error"[..]));
        assert!(!reply.is_ok());
        assert_eq!(reply.to_i64(), None);
    }

    #[test]
    fn multi_field_list() {
        let (reply, _) = parse(b"2\nok\n2\nk1\n2\nv1\n2\nk2\n2\nv2\n\n")
            .unwrap()
            .unwrap();
        let vals = reply.values().unwrap();
        assert_eq!(vals.len(), 4);
        assert_eq!(&vals[0][..], b"k1");
        assert_eq!(&vals[1][..], b"v1");
        assert_eq!(&vals[2][..], b"k2");
        assert_eq!(&vals[3][..], b"v2");
    }

    #[test]
    fn crlf_line_endings() {
        let (reply, consumed) = parse(b"2\r\nok\r\n1\r\n5\r\n\r\n").unwrap().unwrap();
        assert_eq!(consumed, 17);
        assert_eq!(reply.to_i64(), Some(5));
    }

    #[test]
    fn binary_safe_field() {
        let (reply, _) = parse(b"2\nok\n5\na\x00b\r\n\n\n").unwrap().unwrap();
        assert_eq!(&reply.values().unwrap()[0][..], b"a\x00b\r\n");
    }

    #[test]
    fn empty_message() {
        // a lone terminator is a message with zero fields
        let (reply, consumed) = parse(b"\n").unwrap().unwrap();
        assert!(reply.is_empty());
        assert_eq!(consumed, 1);
    }

    #[test]
    fn incomplete_returns_none() {
        assert_eq!(parse(b"").unwrap(), None);
        assert_eq!(parse(b"2").unwrap(), None);
        assert_eq!(parse(b"2\n").unwrap(), None);
        assert_eq!(parse(b"2\nok").unwrap(), None);
        assert_eq!(parse(b"2\nok\n").unwrap(), None);
        // complete blocks but no terminator yet
        assert_eq!(parse(b"2\nok\n2\n42\n").unwrap(), None);
    }

    #[test]
    fn consumed_leaves_trailing_data() {
        let input = b"2\nok\n\n2\nok\n";
        let (reply, consumed) = parse(input).unwrap().unwrap();
        assert!(reply.is_ok());
        assert_eq!(consumed, 6);
    }

    #[test]
    fn invalid_size_line() {
        assert_eq!(parse(b"xy\nok\n\n"), Err(ProtocolError::InvalidSize));
        assert_eq!(parse(b"-1\nok\n\n"), Err(ProtocolError::InvalidSize));
        assert_eq!(parse(b"2x\nok\n\n"), Err(ProtocolError::InvalidSize));
    }

    #[test]
    fn missing_block_terminator() {
        // block data not followed by a newline
        assert_eq!(parse(b"2\nokX\n\n"), Err(ProtocolError::BadTerminator));
        assert_eq!(parse(b"2\nok\rX\n\n"), Err(ProtocolError::BadTerminator));
    }

    #[test]
    fn oversized_block_rejected() {
        let input = format!("{}\n", MAX_BLOCK_LEN + 1);
        assert_eq!(
            parse(input.as_bytes()),
            Err(ProtocolError::BlockTooLarge(MAX_BLOCK_LEN + 1))
        );
    }

    #[test]
    fn zero_copy_slices_share_source() {
        let src = Bytes::from_static(b"2\nok\n2\n42\n\n");
        let (reply, _) = parse_reply(&src).unwrap().unwrap();
        let status = &reply.fields()[0];
        // a slice of a static Bytes stays within the source allocation
        let src_range = src.as_ptr() as usize..src.as_ptr() as usize + src.len();
        assert!(src_range.contains(&(status.as_ptr() as usize)));
    }
}
