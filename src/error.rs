//! Canonical error taxonomy for the crate.
//!
//! Every fault an engine can observe falls into one of the [`ObexError`]
//! categories. Client-side, errors abort the in-flight request and surface
//! synchronously from [`crate::client::ClientEngine::request`]. Server-side,
//! nothing is ever raised out of the event dispatcher; every fault is
//! funnelled through the handler's error notification instead.
//!
//! Non-success OBEX response codes are not errors. Only transport, protocol
//! and marshalling failures are.

use thiserror::Error;

use crate::{
    codec::{DecodeError, EncodeError},
    transport::TransportError,
};

/// Top-level error type exposed by `obexcore`.
#[derive(Debug, Error)]
pub enum ObexError {
    /// Link-level failure reported by the transport.
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    /// Malformed data received from the peer.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No progress within the configured bound.
    #[error("request timed out")]
    Timeout,

    /// Header marshalling failed while building a request or response.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Header unmarshalling failed while reading a request or response.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// API misuse: a second concurrent request, a body object of the wrong
    /// capability, or a malformed handler return.
    #[error("usage error: {0}")]
    Usage(String),

    /// A caller-supplied object failed: a body source/sink I/O error or a
    /// panicking handler notification.
    #[error("application error: {0}")]
    Application(String),
}

impl ObexError {
    /// Short category name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Protocol(_) => "protocol",
            Self::Timeout => "timeout",
            Self::Encode(_) => "encode",
            Self::Decode(_) => "decode",
            Self::Usage(_) => "usage",
            Self::Application(_) => "application",
        }
    }
}

/// Canonical result alias used by `obexcore` public APIs.
pub type Result<T> = std::result::Result<T, ObexError>;
