//! In-memory loopback transport pair for cross-engine tests.
//!
//! [`pair`] yields two connected endpoints: a client end and a server end
//! sharing a pair of message queues behind a mutex and condvar. Each end
//! implements [`ObexTransport`] with just enough sequencing to exercise the
//! engines end to end: requests, chunked bodies in both directions, and
//! final responses travel as queued messages, and `process_input` blocks on
//! the condvar until the peer produces something or the timeout elapses.

use std::collections::VecDeque;
use std::io::{self, Cursor, Write};
use std::mem;
use std::sync::{Arc, Condvar, Mutex, Once};
use std::time::{Duration, Instant};

use bytes::Bytes;

use obexcore::{
    Header, HeaderId, IncomingRequest, ObexError, ObexTransport, OpCode, Progress, RawHeader,
    RequestBody, ResponseCode, ServerEngine, ServerHandler, ServerResponse, TransportError,
    TransportEvent,
};

/// Message exchanged between the two endpoints.
enum Message {
    Request {
        opcode: OpCode,
        headers: Vec<RawHeader>,
        non_header: Vec<u8>,
    },
    Chunk {
        data: Vec<u8>,
        last: bool,
    },
    Response {
        code: ResponseCode,
        headers: Vec<RawHeader>,
    },
}

#[derive(Default)]
struct Shared {
    to_server: VecDeque<Message>,
    to_client: VecDeque<Message>,
}

type Link = Arc<(Mutex<Shared>, Condvar)>;

fn send(link: &Link, message: Message, to_server: bool) {
    let (lock, condvar) = &**link;
    let mut shared = lock.lock().unwrap();
    if to_server {
        shared.to_server.push_back(message);
    } else {
        shared.to_client.push_back(message);
    }
    condvar.notify_all();
}

/// Install a debug-level subscriber writing through the test harness, once
/// per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .init();
    });
}

/// Create a connected client/server transport pair.
pub fn pair() -> (LoopbackClient, LoopbackServer) {
    let link: Link = Arc::new((Mutex::new(Shared::default()), Condvar::new()));
    (
        LoopbackClient {
            link: Arc::clone(&link),
            opcode: None,
            headers: Vec::new(),
            non_header: Vec::new(),
            pending_out: Vec::new(),
            out_armed: false,
            out_finished: false,
            submitted: false,
            incoming: VecDeque::new(),
            response_headers: Vec::new(),
            events: VecDeque::new(),
        },
        LoopbackServer {
            link,
            phase: Phase::Idle,
            opcode: None,
            request_headers: Vec::new(),
            non_header: Vec::new(),
            incoming: VecDeque::new(),
            response_headers: Vec::new(),
            response: None,
            out_armed: false,
            out_finished: false,
            events: VecDeque::new(),
        },
    )
}

/// Client-side endpoint of the loopback link.
pub struct LoopbackClient {
    link: Link,
    opcode: Option<OpCode>,
    headers: Vec<RawHeader>,
    non_header: Vec<u8>,
    pending_out: Vec<(Vec<u8>, bool)>,
    out_armed: bool,
    out_finished: bool,
    submitted: bool,
    incoming: VecDeque<Bytes>,
    response_headers: Vec<RawHeader>,
    events: VecDeque<TransportEvent>,
}

impl ObexTransport for LoopbackClient {
    fn set_mtu(&mut self, _receive: u16, _transmit: u16) -> Result<(), TransportError> {
        Ok(())
    }

    fn new_request(&mut self, opcode: OpCode) -> Result<(), TransportError> {
        self.opcode = Some(opcode);
        self.headers.clear();
        self.non_header.clear();
        self.pending_out.clear();
        self.out_armed = false;
        self.out_finished = false;
        self.submitted = false;
        self.incoming.clear();
        self.response_headers.clear();
        Ok(())
    }

    fn release_request(&mut self) {
        self.opcode = None;
        self.headers.clear();
        self.pending_out.clear();
    }

    fn add_header(&mut self, id: HeaderId, value: &[u8]) -> Result<(), TransportError> {
        self.headers.push(RawHeader::new(id, value.to_vec()));
        Ok(())
    }

    fn set_non_header_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.non_header = data.to_vec();
        Ok(())
    }

    fn non_header_data(&mut self) -> Result<Bytes, TransportError> {
        Ok(Bytes::copy_from_slice(&self.non_header))
    }

    fn take_headers(&mut self) -> Result<Vec<RawHeader>, TransportError> {
        Ok(mem::take(&mut self.response_headers))
    }

    fn arm_stream_input(&mut self) -> Result<(), TransportError> { Ok(()) }

    fn arm_stream_output(&mut self) -> Result<(), TransportError> {
        self.out_armed = true;
        Ok(())
    }

    fn next_stream_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.incoming.pop_front())
    }

    fn set_stream_chunk(&mut self, data: &[u8], last: bool) -> Result<(), TransportError> {
        if self.submitted {
            send(
                &self.link,
                Message::Chunk {
                    data: data.to_vec(),
                    last,
                },
                true,
            );
            if last {
                self.out_finished = true;
            }
        } else {
            // Chunks staged before submission travel with the request.
            self.pending_out.push((data.to_vec(), last));
        }
        Ok(())
    }

    fn submit_request(&mut self) -> Result<(), TransportError> {
        let opcode = self
            .opcode
            .ok_or_else(|| TransportError::other("no request under construction"))?;
        send(
            &self.link,
            Message::Request {
                opcode,
                headers: mem::take(&mut self.headers),
                non_header: self.non_header.clone(),
            },
            true,
        );
        self.submitted = true;
        for (data, last) in mem::take(&mut self.pending_out) {
            if last {
                self.out_finished = true;
            }
            send(&self.link, Message::Chunk { data, last }, true);
        }
        Ok(())
    }

    fn set_response(
        &mut self,
        _interim: ResponseCode,
        _final_code: ResponseCode,
    ) -> Result<(), TransportError> {
        Err(TransportError::other("client endpoint cannot respond"))
    }

    fn process_input(&mut self, timeout: Duration) -> Result<Progress, TransportError> {
        // Outgoing streaming is self-paced: keep asking for chunks until
        // the terminal one has been handed over.
        if self.submitted && self.out_armed && !self.out_finished {
            self.events.push_back(TransportEvent::StreamEmpty);
            return Ok(Progress::Data);
        }

        let deadline = Instant::now() + timeout;
        let (lock, condvar) = &*Arc::clone(&self.link);
        let mut shared = lock.lock().unwrap();
        loop {
            let mut progressed = false;
            while let Some(message) = shared.to_client.pop_front() {
                progressed = true;
                match message {
                    Message::Chunk { data, .. } => {
                        if !data.is_empty() {
                            self.incoming.push_back(data.into());
                            self.events.push_back(TransportEvent::StreamAvailable);
                        }
                    }
                    Message::Response { code, headers } => {
                        self.response_headers = headers;
                        let opcode = self.opcode.unwrap_or(OpCode::Get);
                        self.events.push_back(TransportEvent::RequestDone {
                            opcode,
                            response: code,
                        });
                    }
                    Message::Request { .. } => {}
                }
            }
            if progressed {
                return Ok(Progress::Data);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Progress::Timeout);
            }
            let (guard, _) = condvar.wait_timeout(shared, deadline - now).unwrap();
            shared = guard;
        }
    }

    fn next_event(&mut self) -> Option<TransportEvent> { self.events.pop_front() }
}

enum Phase {
    Idle,
    AwaitingChunks,
    Responding,
    Streaming,
}

/// Server-side endpoint of the loopback link.
pub struct LoopbackServer {
    link: Link,
    phase: Phase,
    opcode: Option<OpCode>,
    request_headers: Vec<RawHeader>,
    non_header: Vec<u8>,
    incoming: VecDeque<Bytes>,
    response_headers: Vec<RawHeader>,
    response: Option<(ResponseCode, ResponseCode)>,
    out_armed: bool,
    out_finished: bool,
    events: VecDeque<TransportEvent>,
}

impl LoopbackServer {
    /// Send the final response and report local completion.
    fn complete(&mut self) -> Result<Progress, TransportError> {
        let (_, final_code) = self.response.take().unwrap_or((
            ResponseCode::INTERNAL_SERVER_ERROR,
            ResponseCode::INTERNAL_SERVER_ERROR,
        ));
        send(
            &self.link,
            Message::Response {
                code: final_code,
                headers: mem::take(&mut self.response_headers),
            },
            false,
        );
        let opcode = self.opcode.unwrap_or(OpCode::Get);
        self.events.push_back(TransportEvent::RequestDone {
            opcode,
            response: final_code,
        });
        self.phase = Phase::Idle;
        self.out_armed = false;
        self.out_finished = false;
        Ok(Progress::Data)
    }
}

impl ObexTransport for LoopbackServer {
    fn set_mtu(&mut self, _receive: u16, _transmit: u16) -> Result<(), TransportError> {
        Ok(())
    }

    fn new_request(&mut self, _opcode: OpCode) -> Result<(), TransportError> {
        Err(TransportError::other("server endpoint cannot originate requests"))
    }

    fn release_request(&mut self) {}

    fn add_header(&mut self, id: HeaderId, value: &[u8]) -> Result<(), TransportError> {
        self.response_headers.push(RawHeader::new(id, value.to_vec()));
        Ok(())
    }

    fn set_non_header_data(&mut self, _data: &[u8]) -> Result<(), TransportError> { Ok(()) }

    fn non_header_data(&mut self) -> Result<Bytes, TransportError> {
        Ok(Bytes::copy_from_slice(&self.non_header))
    }

    fn take_headers(&mut self) -> Result<Vec<RawHeader>, TransportError> {
        Ok(mem::take(&mut self.request_headers))
    }

    fn arm_stream_input(&mut self) -> Result<(), TransportError> { Ok(()) }

    fn arm_stream_output(&mut self) -> Result<(), TransportError> {
        self.out_armed = true;
        Ok(())
    }

    fn next_stream_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.incoming.pop_front())
    }

    fn set_stream_chunk(&mut self, data: &[u8], last: bool) -> Result<(), TransportError> {
        send(
            &self.link,
            Message::Chunk {
                data: data.to_vec(),
                last,
            },
            false,
        );
        if last {
            self.out_finished = true;
        }
        Ok(())
    }

    fn submit_request(&mut self) -> Result<(), TransportError> {
        Err(TransportError::other("server endpoint cannot originate requests"))
    }

    fn set_response(
        &mut self,
        interim: ResponseCode,
        final_code: ResponseCode,
    ) -> Result<(), TransportError> {
        self.response = Some((interim, final_code));
        Ok(())
    }

    fn process_input(&mut self, timeout: Duration) -> Result<Progress, TransportError> {
        // Finish work the engine queued during the previous round before
        // waiting for new messages.
        match self.phase {
            Phase::Responding => {
                if self.out_armed {
                    self.phase = Phase::Streaming;
                    self.events.push_back(TransportEvent::StreamEmpty);
                    return Ok(Progress::Data);
                }
                return self.complete();
            }
            Phase::Streaming => {
                if self.out_finished {
                    return self.complete();
                }
                self.events.push_back(TransportEvent::StreamEmpty);
                return Ok(Progress::Data);
            }
            Phase::Idle | Phase::AwaitingChunks => {}
        }

        let deadline = Instant::now() + timeout;
        let (lock, condvar) = &*Arc::clone(&self.link);
        let mut shared = lock.lock().unwrap();
        loop {
            let mut progressed = false;
            while let Some(message) = shared.to_server.pop_front() {
                progressed = true;
                match message {
                    Message::Request {
                        opcode,
                        headers,
                        non_header,
                    } => {
                        self.opcode = Some(opcode);
                        self.request_headers = headers;
                        self.non_header = non_header;
                        self.incoming.clear();
                        self.response_headers.clear();
                        self.response = None;
                        self.events
                            .push_back(TransportEvent::IncomingHint { opcode });
                        if opcode == OpCode::Put {
                            self.phase = Phase::AwaitingChunks;
                        } else {
                            self.events
                                .push_back(TransportEvent::RequestReceived { opcode });
                            self.phase = Phase::Responding;
                        }
                    }
                    Message::Chunk { data, last } => {
                        if !data.is_empty() {
                            self.incoming.push_back(data.into());
                            self.events.push_back(TransportEvent::StreamAvailable);
                        }
                        if last {
                            let opcode = self.opcode.unwrap_or(OpCode::Put);
                            self.events
                                .push_back(TransportEvent::RequestReceived { opcode });
                            self.phase = Phase::Responding;
                        }
                    }
                    Message::Response { .. } => {}
                }
            }
            if progressed {
                return Ok(Progress::Data);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Progress::Timeout);
            }
            let (guard, _) = condvar.wait_timeout(shared, deadline - now).unwrap();
            shared = guard;
        }
    }

    fn next_event(&mut self) -> Option<TransportEvent> { self.events.pop_front() }
}

/// How the test handler answers incoming requests.
pub enum Serve {
    /// Serve these bytes as the GET object.
    Object(Vec<u8>),
    /// Accept PUT bodies into the shared record.
    Store,
    /// Refuse every request with this code.
    Refuse(ResponseCode),
    /// Accept with no headers or body.
    AcceptBare,
}

/// Observations shared between the handler and the test body.
#[derive(Default)]
pub struct RecordInner {
    pub requests: Vec<(OpCode, bool)>,
    pub names: Vec<Option<String>>,
    pub errors: Vec<String>,
    pub done: Vec<OpCode>,
    pub received: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct SharedRecord(pub Arc<Mutex<RecordInner>>);

struct RecordSink(SharedRecord);

impl Write for RecordSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.0.lock().unwrap().received.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

/// Handler answering every request the same way and recording what it saw.
pub struct LoopbackHandler {
    pub record: SharedRecord,
    pub serve: Serve,
}

impl ServerHandler for LoopbackHandler {
    fn on_error(&mut self, error: &ObexError) {
        self.record.0.lock().unwrap().errors.push(error.to_string());
    }

    fn new_request(&mut self, request: IncomingRequest<'_>) -> ServerResponse {
        let name = match request.headers.get(HeaderId::NAME) {
            Some(Header::Unicode(text)) => Some(text.clone()),
            _ => None,
        };
        {
            let mut record = self.record.0.lock().unwrap();
            record.requests.push((request.opcode, request.has_body_data));
            record.names.push(name);
        }
        match &self.serve {
            Serve::Object(bytes) => {
                let length = u32::try_from(bytes.len()).unwrap();
                ServerResponse::accept()
                    .with_headers(
                        obexcore::HeaderSet::new()
                            .with(HeaderId::LENGTH, Header::FourByteInt(length)),
                    )
                    .with_body(RequestBody::Source(Box::new(Cursor::new(bytes.clone()))))
            }
            Serve::Store => {
                if request.has_body_data {
                    ServerResponse::accept()
                        .with_body(RequestBody::Sink(Box::new(RecordSink(self.record.clone()))))
                } else {
                    ServerResponse::accept()
                }
            }
            Serve::Refuse(code) => ServerResponse::refuse(*code),
            Serve::AcceptBare => ServerResponse::accept(),
        }
    }

    fn request_done(&mut self, opcode: OpCode) {
        self.record.0.lock().unwrap().done.push(opcode);
    }
}

/// Pump the server engine until `count` requests have completed.
pub fn serve_until_done(
    engine: &mut ServerEngine<LoopbackServer, LoopbackHandler>,
    record: &SharedRecord,
    count: usize,
) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while record.0.lock().unwrap().done.len() < count {
        assert!(Instant::now() < deadline, "server did not finish in time");
        engine.process(Duration::from_millis(20)).unwrap();
    }
}
