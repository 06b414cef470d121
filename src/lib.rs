//! OBEX application-layer transaction engine.
//!
//! This crate implements the Object Exchange request/response layer above a
//! pluggable transport: a typed header codec, a synchronous client request
//! driver, and an event-driven server dispatcher, with streaming PUT/GET
//! bodies moved as bounded chunks through caller-supplied `io::Read` /
//! `io::Write` objects.
//!
//! Wire framing, packet assembly, MTU negotiation and socket setup belong to
//! the transport behind the [`ObexTransport`] trait; this crate drives that
//! boundary and owns the transaction semantics.
//!
//! # Client
//!
//! [`ClientEngine`] issues one request at a time and blocks until the
//! response arrives:
//!
//! ```no_run
//! use obexcore::{Body, ClientEngine, Header, HeaderId, HeaderSet, OpCode};
//! # fn demo<T: obexcore::ObexTransport>(transport: T) -> obexcore::Result<()> {
//! let mut client = ClientEngine::new(transport)?;
//! let headers = HeaderSet::new().with(HeaderId::NAME, Header::text("note.txt"));
//! let mut sink = Vec::new();
//! let (code, response) =
//!     client.request(OpCode::Get, &headers, &[], Some(Body::Sink(&mut sink)))?;
//! # let _ = (code, response);
//! # Ok(())
//! # }
//! ```
//!
//! # Server
//!
//! [`ServerEngine`] pumps transport events into a [`ServerHandler`], which
//! accepts or refuses each request and supplies the body object for the
//! transfer. Handler faults and panics are contained; the dispatcher keeps
//! running.

pub mod client;
pub mod codec;
pub mod error;
pub mod header;
pub mod operation;
pub mod server;
pub mod stream;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use client::{Body, ClientEngine, ClientState};
pub use codec::{DecodeError, EncodeError};
pub use error::{ObexError, Result};
pub use header::{Header, HeaderId, HeaderKind, HeaderSet};
pub use operation::{OpCode, ResponseCode};
pub use server::{IncomingRequest, RequestBody, ServerEngine, ServerHandler, ServerResponse};
pub use transport::{
    MAXIMUM_MTU, ObexTransport, Progress, RawHeader, TransportError, TransportEvent,
};
