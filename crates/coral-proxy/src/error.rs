//! Error types for the aggregation core.

use thiserror::Error;

/// Errors returned by aggregation or session operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// The client session's outbound queue is gone (client disconnected).
    #[error("client session closed")]
    SessionClosed,

    /// `merge_and_send` was called a second time on the same aggregator.
    #[error("reply already merged and sent")]
    AlreadySent,
}
