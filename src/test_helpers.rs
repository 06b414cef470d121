//! Test-only transport double shared by the unit tests.
//!
//! [`ScriptedTransport`] replays a canned sequence of
//! [`process_input`](crate::transport::ObexTransport::process_input)
//! outcomes and records every primitive the engines invoke, so tests can
//! assert on exactly what reached the transport and in what order.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use crate::{
    header::HeaderId,
    operation::{OpCode, ResponseCode},
    transport::{ObexTransport, Progress, RawHeader, TransportError, TransportEvent},
};

/// One scripted outcome of a `process_input` call.
pub enum ScriptStep {
    /// Return progress and queue these events for draining.
    Deliver(Vec<TransportEvent>),
    /// Report a timeout with no data.
    Timeout,
    /// Fail the processing round.
    Fail(&'static str),
}

/// Recording transport double driven by a script.
#[derive(Default)]
pub struct ScriptedTransport {
    /// Outcomes to replay, one per `process_input` call. When exhausted,
    /// further calls report timeouts.
    pub script: VecDeque<ScriptStep>,
    /// Headers attached via `add_header`, in call order.
    pub added_headers: Vec<(HeaderId, Vec<u8>)>,
    /// Chunks handed over via `set_stream_chunk` with their `last` flag.
    pub sent_chunks: Vec<(Vec<u8>, bool)>,
    /// Chunks `next_stream_chunk` will yield, oldest first.
    pub incoming_chunks: VecDeque<Vec<u8>>,
    /// Headers `take_headers` will yield (drained on first call).
    pub headers_to_take: Vec<RawHeader>,
    /// Non-header data of the pending request.
    pub non_header: Vec<u8>,
    /// Response-code pairs recorded from `set_response`.
    pub responses_set: Vec<(ResponseCode, ResponseCode)>,
    /// Every primitive invoked, by name, in call order.
    pub calls: Vec<&'static str>,
    /// Opcode passed to the last `new_request`.
    pub request_opcode: Option<OpCode>,
    /// Whether streaming input was armed.
    pub stream_input_armed: bool,
    /// Whether streaming output was armed.
    pub stream_output_armed: bool,
    /// Whether the request object was submitted.
    pub submitted: bool,
    /// Whether the request object was released.
    pub released: bool,
    /// Force `add_header` to fail.
    pub fail_add_header: bool,
    /// Force `arm_stream_input` to fail.
    pub fail_arm_stream_input: bool,
    /// Force `arm_stream_output` to fail.
    pub fail_arm_stream_output: bool,
    /// Force `submit_request` to fail.
    pub fail_submit: bool,
    /// Force `set_response` to fail.
    pub fail_set_response: bool,

    events: VecDeque<TransportEvent>,
}

impl ScriptedTransport {
    /// Transport that replays `steps` then times out forever.
    pub fn with_script(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: steps.into(),
            ..Self::default()
        }
    }
}

impl ObexTransport for ScriptedTransport {
    fn set_mtu(&mut self, _receive: u16, _transmit: u16) -> Result<(), TransportError> {
        self.calls.push("set_mtu");
        Ok(())
    }

    fn new_request(&mut self, opcode: OpCode) -> Result<(), TransportError> {
        self.calls.push("new_request");
        self.request_opcode = Some(opcode);
        Ok(())
    }

    fn release_request(&mut self) {
        self.calls.push("release_request");
        self.released = true;
    }

    fn add_header(&mut self, id: HeaderId, value: &[u8]) -> Result<(), TransportError> {
        self.calls.push("add_header");
        if self.fail_add_header {
            return Err(TransportError::other("add_header refused"));
        }
        self.added_headers.push((id, value.to_vec()));
        Ok(())
    }

    fn set_non_header_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.calls.push("set_non_header_data");
        self.non_header = data.to_vec();
        Ok(())
    }

    fn non_header_data(&mut self) -> Result<Bytes, TransportError> {
        self.calls.push("non_header_data");
        Ok(Bytes::copy_from_slice(&self.non_header))
    }

    fn take_headers(&mut self) -> Result<Vec<RawHeader>, TransportError> {
        self.calls.push("take_headers");
        Ok(std::mem::take(&mut self.headers_to_take))
    }

    fn arm_stream_input(&mut self) -> Result<(), TransportError> {
        self.calls.push("arm_stream_input");
        if self.fail_arm_stream_input {
            return Err(TransportError::other("cannot arm streaming input"));
        }
        self.stream_input_armed = true;
        Ok(())
    }

    fn arm_stream_output(&mut self) -> Result<(), TransportError> {
        self.calls.push("arm_stream_output");
        if self.fail_arm_stream_output {
            return Err(TransportError::other("cannot arm streaming output"));
        }
        self.stream_output_armed = true;
        Ok(())
    }

    fn next_stream_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.calls.push("next_stream_chunk");
        Ok(self.incoming_chunks.pop_front().map(Bytes::from))
    }

    fn set_stream_chunk(&mut self, data: &[u8], last: bool) -> Result<(), TransportError> {
        self.calls.push("set_stream_chunk");
        self.sent_chunks.push((data.to_vec(), last));
        Ok(())
    }

    fn submit_request(&mut self) -> Result<(), TransportError> {
        self.calls.push("submit_request");
        if self.fail_submit {
            return Err(TransportError::other("submit refused"));
        }
        self.submitted = true;
        Ok(())
    }

    fn set_response(
        &mut self,
        interim: ResponseCode,
        final_code: ResponseCode,
    ) -> Result<(), TransportError> {
        self.calls.push("set_response");
        if self.fail_set_response {
            return Err(TransportError::other("response refused"));
        }
        self.responses_set.push((interim, final_code));
        Ok(())
    }

    fn process_input(&mut self, _timeout: Duration) -> Result<Progress, TransportError> {
        self.calls.push("process_input");
        match self.script.pop_front() {
            Some(ScriptStep::Deliver(events)) => {
                self.events.extend(events);
                Ok(Progress::Data)
            }
            Some(ScriptStep::Timeout) | None => Ok(Progress::Timeout),
            Some(ScriptStep::Fail(message)) => Err(TransportError::other(message)),
        }
    }

    fn next_event(&mut self) -> Option<TransportEvent> { self.events.pop_front() }
}
