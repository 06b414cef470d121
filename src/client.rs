//! Synchronous OBEX client engine.
//!
//! [`ClientEngine`] issues one request at a time and blocks inside the
//! transport's bounded input-processing primitive until a terminal event
//! clears the transaction. The engine is an explicit state machine — Idle,
//! Busy, Errored — with no hidden re-entrancy: transport events are pulled
//! and dispatched from the wait loop itself.
//!
//! Non-success response codes are returned to the caller, never raised.
//! Only transport, protocol and marshalling failures produce errors.

use std::io::{Read, Write};
use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    codec,
    error::{ObexError, Result},
    header::HeaderSet,
    operation::{OpCode, ResponseCode},
    stream,
    transport::{MAXIMUM_MTU, ObexTransport, Progress, TransportError, TransportEvent},
};

/// Default bound on each input-processing round.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default size of each body chunk read from a PUT source.
pub const DEFAULT_SEND_CHUNK_SIZE: usize = 4096;

/// Body object bound to a single request.
///
/// A source is only meaningful for PUT, a sink only for GET; a mismatch is
/// rejected as a usage error before the transport is touched.
pub enum Body<'a> {
    /// Byte source streamed out with a PUT request.
    Source(&'a mut dyn Read),
    /// Byte sink receiving a GET response body.
    Sink(&'a mut dyn Write),
}

/// Engine lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// No request in flight; ready to accept one.
    Idle,
    /// A request is in flight.
    Busy,
    /// Input processing failed or timed out; [`ClientEngine::reset`]
    /// returns the engine to service.
    Errored,
}

/// Running state of one transaction, released when the request completes.
struct Transaction {
    response: ResponseCode,
    headers: HeaderSet,
    error: Option<ObexError>,
    done: bool,
    aborted: bool,
}

impl Transaction {
    fn new() -> Self {
        Self {
            response: ResponseCode::SUCCESS,
            headers: HeaderSet::new(),
            error: None,
            done: false,
            aborted: false,
        }
    }

    /// Record a fault. The first error wins; later faults in the same
    /// transaction are logged and dropped.
    fn record(&mut self, error: ObexError) {
        if let Some(existing) = &self.error {
            debug!(suppressed = %error, first = %existing, "error already recorded");
        } else {
            self.error = Some(error);
        }
    }
}

/// Synchronous OBEX client over an [`ObexTransport`].
///
/// One engine drives one connection; run one instance per connection for
/// concurrent transfers. There is no cancellation for a request already in
/// flight — the protocol's ABORT opcode is not supported for synchronous
/// requests.
pub struct ClientEngine<T: ObexTransport> {
    transport: T,
    state: ClientState,
    timeout: Duration,
    send_chunk_size: usize,
}

impl<T: ObexTransport> ClientEngine<T> {
    /// Wrap a transport, requesting the maximum MTU.
    ///
    /// # Errors
    ///
    /// Returns [`ObexError::Connection`] if the transport rejects the MTU.
    pub fn new(mut transport: T) -> Result<Self> {
        transport.set_mtu(MAXIMUM_MTU, MAXIMUM_MTU)?;
        Ok(Self {
            transport,
            state: ClientState::Idle,
            timeout: DEFAULT_TIMEOUT,
            send_chunk_size: DEFAULT_SEND_CHUNK_SIZE,
        })
    }

    /// Set the per-round input-processing timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the body chunk size used for PUT uploads.
    #[must_use]
    pub fn with_send_chunk_size(mut self, size: usize) -> Self {
        self.send_chunk_size = size;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ClientState { self.state }

    /// Return an Errored engine to Idle so it can accept requests again.
    pub fn reset(&mut self) {
        if self.state == ClientState::Errored {
            self.state = ClientState::Idle;
        }
    }

    /// Issue one OBEX request and block until it completes.
    ///
    /// `non_header_data` carries opaque request bytes (SETPATH flags);
    /// leave it empty for other opcodes. A PUT with no body source is a
    /// Put-Delete: a single terminal empty-body chunk is transmitted and no
    /// streaming follows.
    ///
    /// Returns the server's response code and decoded response headers.
    /// The code may be any value the peer sent, including refusals.
    ///
    /// # Errors
    ///
    /// Returns [`ObexError::Usage`] if a request is already in flight, the
    /// engine is Errored, or the body object does not match the opcode;
    /// [`ObexError::Timeout`] or [`ObexError::Connection`] when input
    /// processing gives out; [`ObexError::Encode`]/[`ObexError::Decode`]
    /// for header marshalling failures; [`ObexError::Application`] when the
    /// body object fails.
    pub fn request(
        &mut self,
        opcode: OpCode,
        headers: &HeaderSet,
        non_header_data: &[u8],
        body: Option<Body<'_>>,
    ) -> Result<(ResponseCode, HeaderSet)> {
        match self.state {
            ClientState::Busy => {
                return Err(ObexError::Usage("another request is in progress".into()));
            }
            ClientState::Errored => {
                return Err(ObexError::Usage(
                    "engine errored by an earlier failure; call reset()".into(),
                ));
            }
            ClientState::Idle => {}
        }

        let mut body = body;
        match (&body, opcode) {
            (Some(Body::Source(_)), OpCode::Put)
            | (Some(Body::Sink(_)), OpCode::Get)
            | (None, _) => {}
            (Some(Body::Source(_)), _) => {
                return Err(ObexError::Usage("a body source is only valid for Put".into()));
            }
            (Some(Body::Sink(_)), _) => {
                return Err(ObexError::Usage("a body sink is only valid for Get".into()));
            }
        }

        self.build_request(opcode, headers, non_header_data, &body)?;

        debug!(%opcode, "request submitted");
        self.state = ClientState::Busy;
        let txn = self.drive(&mut body);

        if txn.aborted {
            self.state = ClientState::Errored;
            return Err(txn.error.unwrap_or(ObexError::Timeout));
        }

        self.state = ClientState::Idle;
        match txn.error {
            Some(error) => Err(error),
            None => Ok((txn.response, txn.headers)),
        }
    }

    /// Build and submit the transport request object. Any failure releases
    /// the object before the error propagates.
    fn build_request(
        &mut self,
        opcode: OpCode,
        headers: &HeaderSet,
        non_header_data: &[u8],
        body: &Option<Body<'_>>,
    ) -> Result<()> {
        self.transport.new_request(opcode)?;
        let built = self.populate_request(opcode, headers, non_header_data, body);
        if let Err(error) = built {
            self.transport.release_request();
            return Err(error);
        }
        if let Err(error) = self.transport.submit_request() {
            self.transport.release_request();
            return Err(error.into());
        }
        Ok(())
    }

    fn populate_request(
        &mut self,
        opcode: OpCode,
        headers: &HeaderSet,
        non_header_data: &[u8],
        body: &Option<Body<'_>>,
    ) -> Result<()> {
        codec::encode_headers(&mut self.transport, headers)?;
        if !non_header_data.is_empty() {
            self.transport.set_non_header_data(non_header_data)?;
        }
        match (opcode, body) {
            (OpCode::Put, Some(Body::Source(_))) => self.transport.arm_stream_output()?,
            // Put-Delete: explicit empty body, no streaming.
            (OpCode::Put, None) => self.transport.set_stream_chunk(&[], true)?,
            (OpCode::Get, Some(Body::Sink(_))) => self.transport.arm_stream_input()?,
            _ => {}
        }
        Ok(())
    }

    /// Wait loop: drive input processing until a terminal event clears the
    /// transaction, the timeout elapses, or processing fails.
    fn drive(&mut self, body: &mut Option<Body<'_>>) -> Transaction {
        let mut txn = Transaction::new();
        while !txn.done {
            match self.transport.process_input(self.timeout) {
                Ok(Progress::Data) => {
                    // Stop draining once a terminal event closed the
                    // transaction; anything after it belongs to no request.
                    while let Some(event) = self.transport.next_event() {
                        self.on_event(event, body, &mut txn);
                        if txn.done {
                            break;
                        }
                    }
                }
                Ok(Progress::Timeout) => {
                    warn!("input processing timed out");
                    txn.record(ObexError::Timeout);
                    txn.aborted = true;
                    return txn;
                }
                Err(error) => {
                    warn!(%error, "input processing failed");
                    txn.record(error.into());
                    txn.aborted = true;
                    return txn;
                }
            }
        }
        txn
    }

    fn on_event(
        &mut self,
        event: TransportEvent,
        body: &mut Option<Body<'_>>,
        txn: &mut Transaction,
    ) {
        debug!(?event, "transport event");
        match event {
            TransportEvent::StreamEmpty => {
                let source = match body {
                    Some(Body::Source(source)) => Some(&mut **source as &mut dyn Read),
                    _ => None,
                };
                if let Err(error) =
                    stream::feed_outgoing(&mut self.transport, source, self.send_chunk_size)
                {
                    txn.record(error);
                }
            }
            TransportEvent::StreamAvailable => match body {
                Some(Body::Sink(sink)) => {
                    if let Err(error) = stream::drain_incoming(&mut self.transport, &mut **sink) {
                        txn.record(error);
                    }
                }
                _ => txn.record(ObexError::Usage(
                    "incoming body data but no sink is bound".into(),
                )),
            },
            TransportEvent::LinkError => {
                txn.record(ObexError::Connection(TransportError::other(
                    "connection error",
                )));
                self.finish(txn);
            }
            TransportEvent::ParseError => {
                txn.record(ObexError::Protocol("parse error".into()));
                self.finish(txn);
            }
            TransportEvent::RequestDone { response, .. } => {
                txn.response = response;
                self.finish(txn);
            }
            // Server-side events; nothing to do on a client link.
            TransportEvent::IncomingHint { .. } | TransportEvent::RequestReceived { .. } => {
                debug!(?event, "ignoring server-side event");
            }
        }
    }

    /// Terminal-event handling: capture response headers and release the
    /// transaction. Header decode failure surfaces to the caller but the
    /// transaction still completes and the engine returns to Idle.
    fn finish(&mut self, txn: &mut Transaction) {
        let decoded = self
            .transport
            .take_headers()
            .map_err(ObexError::from)
            .and_then(|raw| codec::decode_headers(raw).map_err(ObexError::from));
        match decoded {
            Ok(headers) => txn.headers = headers,
            Err(error) => txn.record(error),
        }
        txn.done = true;
    }
}
