//! Event-driven OBEX server engine.
//!
//! [`ServerEngine`] pumps transport events and turns them into
//! [`ServerHandler`] notifications. The handler decides whether to accept
//! each request and supplies the body object for accepted transfers; the
//! engine owns the response-code mechanics, streaming, and the
//! per-request session state.
//!
//! Faults inside dispatch never propagate out of [`ServerEngine::process`];
//! they are reported through [`ServerHandler::on_error`] and answered on the
//! wire with Internal-Server-Error. Only a transport-level input-processing
//! failure surfaces as an error to the caller.

use std::any::Any;
use std::io::{Read, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::{
    codec,
    error::{ObexError, Result},
    header::HeaderSet,
    operation::{OpCode, ResponseCode},
    stream,
    transport::{MAXIMUM_MTU, ObexTransport, Progress, TransportError, TransportEvent},
};

/// Default size of each body chunk read from a GET source.
pub const DEFAULT_SEND_CHUNK_SIZE: usize = 1024;

/// A fully parsed request presented to the handler.
pub struct IncomingRequest<'a> {
    /// Operation the client requested.
    pub opcode: OpCode,
    /// Decoded request headers.
    pub headers: &'a HeaderSet,
    /// Opaque non-header bytes (SETPATH flags), empty for most opcodes.
    pub non_header_data: &'a [u8],
    /// Whether the request carries body data. A PUT without body data is a
    /// deletion request.
    pub has_body_data: bool,
}

/// Body object bound to an accepted request.
pub enum RequestBody {
    /// Sink receiving an incoming PUT body.
    Sink(Box<dyn Write>),
    /// Source streamed out as a GET response body.
    Source(Box<dyn Read>),
}

/// The handler's verdict on a request.
///
/// The request is accepted only when `code` is exactly
/// [`ResponseCode::SUCCESS`] or [`ResponseCode::CONTINUE`]; any other code
/// refuses it and is sent to the client verbatim. An accepted PUT carrying
/// body data must supply a [`RequestBody::Sink`] and an accepted GET a
/// [`RequestBody::Source`].
pub struct ServerResponse {
    /// Response code to answer with.
    pub code: ResponseCode,
    /// Response headers.
    pub headers: HeaderSet,
    /// Body object for the transfer, if any.
    pub body: Option<RequestBody>,
}

impl ServerResponse {
    /// Accept the request with no response headers or body.
    #[must_use]
    pub fn accept() -> Self {
        Self {
            code: ResponseCode::SUCCESS,
            headers: HeaderSet::new(),
            body: None,
        }
    }

    /// Refuse the request with `code`.
    #[must_use]
    pub fn refuse(code: ResponseCode) -> Self {
        Self {
            code,
            headers: HeaderSet::new(),
            body: None,
        }
    }

    /// Attach response headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderSet) -> Self {
        self.headers = headers;
        self
    }

    /// Bind the body object for the transfer.
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }
}

/// Application notifications fired by the server engine.
pub trait ServerHandler {
    /// A fault occurred while serving a request. The engine keeps running.
    fn on_error(&mut self, error: &ObexError);

    /// A request has arrived; decide whether to accept it and supply the
    /// body object for the transfer.
    fn new_request(&mut self, request: IncomingRequest<'_>) -> ServerResponse;

    /// The request completed and its response has been sent.
    fn request_done(&mut self, opcode: OpCode);
}

/// State of the request currently in flight, reset on every completion.
#[derive(Default)]
struct Session {
    opcode: Option<OpCode>,
    has_body_data: bool,
    notified: bool,
    body: Option<RequestBody>,
}

/// Event-driven OBEX server over an [`ObexTransport`].
///
/// One engine serves one connection. The caller drives it by calling
/// [`process`](Self::process) in a loop; each call handles at most one
/// bounded round of transport input.
pub struct ServerEngine<T: ObexTransport, H: ServerHandler> {
    transport: T,
    handler: H,
    send_chunk_size: usize,
    session: Session,
}

impl<T: ObexTransport, H: ServerHandler> ServerEngine<T, H> {
    /// Wrap a transport and handler, requesting the maximum MTU.
    ///
    /// # Errors
    ///
    /// Returns [`ObexError::Connection`] if the transport rejects the MTU.
    pub fn new(mut transport: T, handler: H) -> Result<Self> {
        transport.set_mtu(MAXIMUM_MTU, MAXIMUM_MTU)?;
        Ok(Self {
            transport,
            handler,
            send_chunk_size: DEFAULT_SEND_CHUNK_SIZE,
            session: Session::default(),
        })
    }

    /// Set the body chunk size used for GET downloads.
    #[must_use]
    pub fn with_send_chunk_size(mut self, size: usize) -> Self {
        self.send_chunk_size = size;
        self
    }

    /// Handle one bounded round of transport input.
    ///
    /// Returns [`Progress::Timeout`] when nothing arrived within `timeout`.
    /// Handler and body faults are reported through
    /// [`ServerHandler::on_error`], not returned.
    ///
    /// # Errors
    ///
    /// Returns [`ObexError::Connection`] only when the transport's input
    /// processing itself fails.
    pub fn process(&mut self, timeout: Duration) -> Result<Progress> {
        match self.transport.process_input(timeout)? {
            Progress::Timeout => Ok(Progress::Timeout),
            Progress::Data => {
                while let Some(event) = self.transport.next_event() {
                    self.dispatch(event);
                }
                Ok(Progress::Data)
            }
        }
    }

    fn dispatch(&mut self, event: TransportEvent) {
        debug!(?event, "transport event");
        match event {
            TransportEvent::IncomingHint { opcode } => self.on_incoming_hint(opcode),
            TransportEvent::RequestReceived { opcode } => {
                self.session.opcode = Some(opcode);
                if !self.session.notified {
                    self.notify_new_request(opcode);
                }
            }
            TransportEvent::StreamAvailable => self.on_stream_available(),
            TransportEvent::StreamEmpty => self.on_stream_empty(),
            TransportEvent::RequestDone { opcode, .. } => self.on_request_done(opcode),
            TransportEvent::LinkError => {
                let error = ObexError::Connection(TransportError::other("connection error"));
                self.report_error(&error);
            }
            TransportEvent::ParseError => {
                self.report_error(&ObexError::Protocol("parse error".into()));
            }
        }
    }

    /// Headers for a new request are about to arrive. The request is
    /// accepted by default until the handler has spoken; PUT arms streaming
    /// input so body chunks arrive incrementally.
    fn on_incoming_hint(&mut self, opcode: OpCode) {
        self.session = Session {
            opcode: Some(opcode),
            ..Session::default()
        };
        if opcode == OpCode::Put {
            if let Err(err) = self.transport.arm_stream_input() {
                let error = ObexError::from(err);
                self.report_error(&error);
                self.refuse_internal();
                return;
            }
        }
        self.answer(ResponseCode::CONTINUE, ResponseCode::SUCCESS);
    }

    /// Notify the handler of the parsed request and apply its verdict.
    fn notify_new_request(&mut self, opcode: OpCode) {
        self.session.notified = true;

        let raw = match self.transport.take_headers() {
            Ok(raw) => raw,
            Err(err) => {
                let error = ObexError::from(err);
                self.report_error(&error);
                self.refuse_internal();
                return;
            }
        };
        let headers = match codec::decode_headers(raw) {
            Ok(headers) => headers,
            Err(err) => {
                let error = ObexError::from(err);
                self.report_error(&error);
                self.refuse_internal();
                return;
            }
        };
        let non_header = match self.transport.non_header_data() {
            Ok(data) => data,
            Err(err) => {
                let error = ObexError::from(err);
                self.report_error(&error);
                self.refuse_internal();
                return;
            }
        };

        let request = IncomingRequest {
            opcode,
            headers: &headers,
            non_header_data: &non_header,
            has_body_data: self.session.has_body_data,
        };
        let handler = &mut self.handler;
        let response = match catch_unwind(AssertUnwindSafe(|| handler.new_request(request))) {
            Ok(response) => response,
            Err(payload) => {
                let error = ObexError::Application(format!(
                    "request handler panicked: {}",
                    panic_message(&*payload)
                ));
                self.report_error(&error);
                self.refuse_internal();
                return;
            }
        };

        self.apply_response(opcode, response);
    }

    fn apply_response(&mut self, opcode: OpCode, response: ServerResponse) {
        let accepted = response.code.accepts();
        if accepted {
            if let Some(message) = body_violation(opcode, self.session.has_body_data, &response) {
                self.report_error(&ObexError::Usage(message.into()));
                self.refuse_internal();
                return;
            }
        }

        if let Err(error) = codec::encode_headers(&mut self.transport, &response.headers) {
            self.report_error(&error);
            self.refuse_internal();
            return;
        }

        if !accepted {
            debug!(%opcode, code = %response.code, "request refused");
            self.answer(response.code, response.code);
            return;
        }

        if opcode == OpCode::Get {
            if let Err(err) = self.transport.arm_stream_output() {
                let error = ObexError::from(err);
                self.report_error(&error);
                self.refuse_internal();
                return;
            }
        }
        self.session.body = response.body;
        self.answer(ResponseCode::CONTINUE, ResponseCode::SUCCESS);
    }

    /// A body chunk is pending. The first chunk proves the request carries
    /// a body and triggers the deferred handler notification for PUT.
    fn on_stream_available(&mut self) {
        self.session.has_body_data = true;
        let Some(opcode) = self.session.opcode else {
            self.report_error(&ObexError::Protocol("body data outside a request".into()));
            self.discard_chunk();
            return;
        };
        if !self.session.notified {
            self.notify_new_request(opcode);
        }

        match self.session.body.take() {
            Some(RequestBody::Sink(mut sink)) => {
                match stream::drain_incoming(&mut self.transport, &mut *sink) {
                    Ok(_) => self.session.body = Some(RequestBody::Sink(sink)),
                    Err(error) => {
                        // The sink is dropped; later chunks are discarded.
                        self.report_error(&error);
                        self.refuse_internal();
                    }
                }
            }
            other => {
                self.session.body = other;
                self.discard_chunk();
            }
        }
    }

    /// The transport wants the next outgoing chunk. An absent source ends
    /// the body so the client is never left waiting.
    fn on_stream_empty(&mut self) {
        let result = match &mut self.session.body {
            Some(RequestBody::Source(source)) => stream::feed_outgoing(
                &mut self.transport,
                Some(&mut **source),
                self.send_chunk_size,
            ),
            _ => stream::feed_outgoing(&mut self.transport, None, self.send_chunk_size),
        };
        if let Err(error) = result {
            self.report_error(&error);
            self.refuse_internal();
        }
    }

    fn on_request_done(&mut self, opcode: OpCode) {
        debug!(%opcode, "request done");
        let handler = &mut self.handler;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler.request_done(opcode))) {
            error!(%opcode, panic = %panic_message(&*payload), "completion handler panicked");
        }
        // Releases the body object and any chunk buffers.
        self.session = Session::default();
    }

    fn discard_chunk(&mut self) {
        match self.transport.next_stream_chunk() {
            Ok(Some(chunk)) => debug!(len = chunk.len(), "discarding unclaimed body chunk"),
            Ok(None) => {}
            Err(err) => {
                let error = ObexError::from(err);
                self.report_error(&error);
            }
        }
    }

    fn refuse_internal(&mut self) {
        self.answer(
            ResponseCode::INTERNAL_SERVER_ERROR,
            ResponseCode::INTERNAL_SERVER_ERROR,
        );
    }

    fn answer(&mut self, interim: ResponseCode, final_code: ResponseCode) {
        if let Err(err) = self.transport.set_response(interim, final_code) {
            let error = ObexError::from(err);
            self.report_error(&error);
        }
    }

    /// Report a fault to the handler, containing any panic it raises.
    fn report_error(&mut self, error: &ObexError) {
        warn!(%error, "request fault");
        let handler = &mut self.handler;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler.on_error(error))) {
            error!(
                %error,
                panic = %panic_message(&*payload),
                "error handler panicked while reporting a fault"
            );
        }
    }
}

/// Render a panic payload captured at a handler boundary. Handlers usually
/// panic with a message; anything else degrades to an opaque marker.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        String::from("non-string panic payload")
    }
}

/// Check the handler's body object against the accepted request shape.
fn body_violation(
    opcode: OpCode,
    has_body_data: bool,
    response: &ServerResponse,
) -> Option<&'static str> {
    match (opcode, &response.body) {
        (OpCode::Put, Some(RequestBody::Source(_))) => {
            Some("an accepted Put takes a body sink, not a source")
        }
        (OpCode::Put, None) if has_body_data => {
            Some("an accepted Put with body data requires a sink")
        }
        (OpCode::Get, Some(RequestBody::Sink(_)) | None) => {
            Some("an accepted Get requires a body source")
        }
        (
            OpCode::Connect
            | OpCode::Disconnect
            | OpCode::SetPath
            | OpCode::Session
            | OpCode::Abort,
            Some(_),
        ) => Some("only Put and Get transfer bodies"),
        _ => None,
    }
}
