//! Protocol error types for the backend wire format.

use thiserror::Error;

/// Errors that can occur when parsing a backend protocol message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The input buffer doesn't contain a complete message yet.
    /// The caller should read more data and try again.
    #[error("incomplete message: need more data")]
    Incomplete,

    /// A block size line contained something other than decimal digits.
    #[error("invalid block size line")]
    InvalidSize,

    /// A block declared a size larger than the allowed maximum.
    #[error("block too large: {0} bytes")]
    BlockTooLarge(usize),

    /// The message declared more fields than the allowed maximum.
    #[error("too many fields in message: {0}")]
    TooManyFields(usize),

    /// A data block was not followed by its newline terminator.
    #[error("missing block terminator")]
    BadTerminator,
}
