//! Interface to the external OBEX transport.
//!
//! Wire framing, packet assembly and MTU negotiation are owned by a
//! transport library outside this crate. [`ObexTransport`] is the boundary
//! the engines drive: primitive request/response object manipulation plus a
//! bounded input-processing call. The transport queues [`TransportEvent`]s
//! while processing input and the engines drain them with
//! [`ObexTransport::next_event`], so dispatch is pull-style and never
//! re-entrant.
//!
//! A transport implementation holds at most one request object at a time,
//! mirroring the one-in-flight-request rule of the engines.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::{
    header::HeaderId,
    operation::{OpCode, ResponseCode},
};

/// Largest transport MTU the protocol permits. Engines request this at
/// construction and let the transport negotiate downwards.
pub const MAXIMUM_MTU: u16 = 0xffff;

/// Failure reported by a transport primitive.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying link failed.
    #[error("link I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Any other transport-level fault.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Build an [`TransportError::Other`] from a message.
    pub fn other(message: impl Into<String>) -> Self { Self::Other(message.into()) }
}

/// Outcome of one bounded round of input processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// The timeout elapsed with no data.
    Timeout,
    /// Input was consumed; events may be pending.
    Data,
}

/// A header as retrieved from the transport, not yet decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawHeader {
    /// Header identifier.
    pub id: HeaderId,
    /// Wire value, exactly as received.
    pub value: Bytes,
}

impl RawHeader {
    /// Convenience constructor used by transports and tests.
    pub fn new(id: HeaderId, value: impl Into<Bytes>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }
}

/// Event delivered by the transport's input processing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link failed; the current request, if any, is dead.
    LinkError,
    /// The peer sent data the transport could not parse.
    ParseError,
    /// Request headers are about to arrive (server side).
    IncomingHint {
        /// Opcode of the incoming request.
        opcode: OpCode,
    },
    /// A request has been fully parsed (server side).
    RequestReceived {
        /// Opcode of the parsed request.
        opcode: OpCode,
    },
    /// A body chunk is ready to be read with
    /// [`ObexTransport::next_stream_chunk`].
    StreamAvailable,
    /// The transport is ready for the next outgoing chunk via
    /// [`ObexTransport::set_stream_chunk`].
    StreamEmpty,
    /// The request completed; response code and headers are available.
    RequestDone {
        /// Opcode the request carried.
        opcode: OpCode,
        /// Final response code observed (client side) or sent (server side).
        response: ResponseCode,
    },
}

/// Primitive operations the engines require from a transport.
///
/// All methods act on the single request object the transport currently
/// holds. Methods other than [`process_input`](Self::process_input) must
/// not block.
pub trait ObexTransport {
    /// Request the given receive/transmit MTUs.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the sizes.
    fn set_mtu(&mut self, receive: u16, transmit: u16) -> Result<(), TransportError>;

    /// Create a fresh request object for `opcode`.
    ///
    /// # Errors
    ///
    /// Returns an error if a request object already exists or allocation
    /// fails.
    fn new_request(&mut self, opcode: OpCode) -> Result<(), TransportError>;

    /// Discard the request object under construction, releasing its buffers.
    /// Called on every build-failure path before the error propagates.
    fn release_request(&mut self);

    /// Append an already-encoded header to the current object.
    ///
    /// The header must fit in a single packet; this crate does not support
    /// header fragmentation.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be attached.
    fn add_header(&mut self, id: HeaderId, value: &[u8]) -> Result<(), TransportError>;

    /// Attach opaque non-header bytes (for example SETPATH flags).
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be attached.
    fn set_non_header_data(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read the non-header bytes of the received request.
    ///
    /// # Errors
    ///
    /// Returns an error if no request is pending.
    fn non_header_data(&mut self) -> Result<Bytes, TransportError>;

    /// Take the received headers in retrieval order.
    ///
    /// # Errors
    ///
    /// Returns an error if no parsed request or response is available.
    fn take_headers(&mut self) -> Result<Vec<RawHeader>, TransportError>;

    /// Arm streaming-input mode: body data will be delivered chunkwise
    /// through [`StreamAvailable`](TransportEvent::StreamAvailable) events.
    ///
    /// # Errors
    ///
    /// Returns an error if streaming cannot be armed.
    fn arm_stream_input(&mut self) -> Result<(), TransportError>;

    /// Arm streaming-output mode: the transport will request chunks through
    /// [`StreamEmpty`](TransportEvent::StreamEmpty) events.
    ///
    /// # Errors
    ///
    /// Returns an error if streaming cannot be armed.
    fn arm_stream_output(&mut self) -> Result<(), TransportError>;

    /// Fetch the next incoming body chunk, or `None` if nothing is pending
    /// yet. The returned buffer is owned by the caller for exactly one
    /// transport round.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream read fails.
    fn next_stream_chunk(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Hand the transport the next outgoing chunk. `last` marks the
    /// terminal chunk; an empty terminal chunk signals an empty body.
    /// Ownership of the bytes transfers to the transport for this window.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk cannot be queued.
    fn set_stream_chunk(&mut self, data: &[u8], last: bool) -> Result<(), TransportError>;

    /// Submit the request object under construction (client side).
    ///
    /// # Errors
    ///
    /// Returns an error if transmission cannot start.
    fn submit_request(&mut self) -> Result<(), TransportError>;

    /// Set the response codes on the pending request (server side):
    /// `interim` while the transfer continues, `final_code` on the last
    /// packet.
    ///
    /// # Errors
    ///
    /// Returns an error if no request is pending.
    fn set_response(
        &mut self,
        interim: ResponseCode,
        final_code: ResponseCode,
    ) -> Result<(), TransportError>;

    /// Drive one bounded round of input handling. Blocks (suspends) until
    /// data arrives or `timeout` elapses; this is the only method allowed
    /// to block.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails irrecoverably.
    fn process_input(&mut self, timeout: Duration) -> Result<Progress, TransportError>;

    /// Drain the next queued event, if any.
    fn next_event(&mut self) -> Option<TransportEvent>;
}
