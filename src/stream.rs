//! Stream bridge between caller body objects and the transport.
//!
//! Bodies move as bounded chunks. [`feed_outgoing`] pulls one chunk from a
//! caller-supplied reader and hands it to the transport; [`drain_incoming`]
//! takes the transport's next received chunk and pushes it into a
//! caller-supplied writer. Neither loops internally: the engines call them
//! once per `StreamEmpty`/`StreamAvailable` event, so exactly one chunk
//! buffer is live at any time and ownership transfers to the transport (or
//! the sink) within the call.

use std::io::{Read, Write};

use tracing::debug;

use crate::{
    error::{ObexError, Result},
    transport::ObexTransport,
};

/// Read up to `chunk_size` bytes from `source` and hand them to the
/// transport as the next outgoing body chunk.
///
/// An absent source, or a successful zero-byte read, emits a terminal empty
/// chunk (explicit end-of-body) and reports no further data. A read failure
/// also terminates the body on the wire before the error propagates, so the
/// peer is not left waiting for chunks that will never come.
///
/// Returns the number of bytes handed over; `0` means the body is finished.
///
/// # Errors
///
/// Returns [`ObexError::Application`] when the source's `read` fails and
/// [`ObexError::Connection`] when the transport refuses the chunk.
pub fn feed_outgoing<T: ObexTransport + ?Sized>(
    transport: &mut T,
    source: Option<&mut dyn Read>,
    chunk_size: usize,
) -> Result<usize> {
    let Some(source) = source else {
        transport.set_stream_chunk(&[], true)?;
        return Ok(0);
    };

    let mut chunk = vec![0u8; chunk_size];
    match source.read(&mut chunk) {
        Ok(0) => {
            debug!("body source exhausted, sending terminal chunk");
            transport.set_stream_chunk(&[], true)?;
            Ok(0)
        }
        Ok(read) => {
            transport.set_stream_chunk(&chunk[..read], false)?;
            Ok(read)
        }
        Err(err) => {
            // Terminate the transfer before surfacing the fault.
            transport.set_stream_chunk(&[], true)?;
            Err(ObexError::Application(format!(
                "error reading body source: {err}"
            )))
        }
    }
}

/// Take the transport's next received body chunk and write it to `sink`.
///
/// Returns the number of bytes written, or `0` when no chunk is currently
/// pending (not an error; more data may still arrive).
///
/// # Errors
///
/// Returns [`ObexError::Connection`] when the transport's stream read fails
/// and [`ObexError::Application`] when the sink rejects the write.
pub fn drain_incoming<T: ObexTransport + ?Sized>(
    transport: &mut T,
    sink: &mut dyn Write,
) -> Result<usize> {
    let Some(chunk) = transport.next_stream_chunk()? else {
        return Ok(0);
    };
    debug!(len = chunk.len(), "draining body chunk into sink");
    sink.write_all(&chunk)
        .map_err(|err| ObexError::Application(format!("error writing body sink: {err}")))?;
    Ok(chunk.len())
}
