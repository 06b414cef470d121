//! Header-set encoding and decoding against the transport.
//!
//! [`encode_headers`] walks a [`HeaderSet`] and emits each header onto the
//! transport's request object; [`decode_headers`] turns the raw headers the
//! transport retrieved into a typed set. Both are all-or-nothing: the first
//! failure aborts and nothing partially decoded survives. On an encode
//! failure the caller still owns the partially built request object and is
//! responsible for releasing it.
//!
//! `CONNECTION_ID` and `TARGET` establish session and service context, so
//! peers may require them before other headers are interpretable; they are
//! always emitted first, in that order. Both on one request is a caller
//! error the codec passes through untouched.

use thiserror::Error;

use crate::{
    error::Result,
    header::{Header, HeaderId, HeaderKind, HeaderSet},
    transport::{ObexTransport, RawHeader},
};

/// Failure while emitting a header set onto the transport.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// The value's variant does not match the encoding the identifier's top
    /// bits demand.
    #[error("header {id} requires {expected:?} encoding, value is {found:?}")]
    KindMismatch {
        /// Offending identifier.
        id: HeaderId,
        /// Encoding the identifier requires.
        expected: HeaderKind,
        /// Encoding of the supplied value.
        found: HeaderKind,
    },
}

/// Failure while decoding raw headers into typed values.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Text value was not valid big-endian UTF-16.
    #[error("header {id} carries invalid UTF-16 text")]
    Utf16 {
        /// Offending identifier.
        id: HeaderId,
    },

    /// Integer value had the wrong byte width.
    #[error("header {id} value is {found} bytes, expected {expected}")]
    ValueLength {
        /// Offending identifier.
        id: HeaderId,
        /// Width the identifier's kind requires.
        expected: usize,
        /// Width received.
        found: usize,
    },
}

/// Emit `headers` onto the transport's current request object.
///
/// `CONNECTION_ID` is emitted first if present, then `TARGET`, then the
/// remaining headers in set order. Every header is encoded to its wire
/// representation and attached with the transport's one-packet guarantee.
///
/// # Errors
///
/// Returns [`EncodeError::KindMismatch`] wrapped in
/// [`ObexError::Encode`](crate::ObexError::Encode) when a value does not
/// match its identifier's encoding, or
/// [`ObexError::Connection`](crate::ObexError::Connection) when the
/// transport refuses the header. Emission stops at the first failure.
pub fn encode_headers<T: ObexTransport + ?Sized>(
    transport: &mut T,
    headers: &HeaderSet,
) -> Result<()> {
    if let Some(value) = headers.get(HeaderId::CONNECTION_ID) {
        emit(transport, HeaderId::CONNECTION_ID, value)?;
    }
    if let Some(value) = headers.get(HeaderId::TARGET) {
        emit(transport, HeaderId::TARGET, value)?;
    }
    for (id, value) in headers.iter() {
        if id == HeaderId::CONNECTION_ID || id == HeaderId::TARGET {
            continue;
        }
        emit(transport, id, value)?;
    }
    Ok(())
}

fn emit<T: ObexTransport + ?Sized>(
    transport: &mut T,
    id: HeaderId,
    value: &Header,
) -> Result<()> {
    let expected = id.kind();
    let found = value.kind();
    if expected != found {
        return Err(EncodeError::KindMismatch {
            id,
            expected,
            found,
        }
        .into());
    }
    transport.add_header(id, &value.to_wire())?;
    Ok(())
}

/// Decode raw headers, in retrieval order, into a typed [`HeaderSet`].
///
/// # Errors
///
/// Returns the first [`DecodeError`] encountered; headers decoded before
/// the failure are discarded.
pub fn decode_headers<I>(raw: I) -> std::result::Result<HeaderSet, DecodeError>
where
    I: IntoIterator<Item = RawHeader>,
{
    let mut headers = HeaderSet::new();
    for RawHeader { id, value } in raw {
        headers.insert(id, Header::from_wire(id, &value)?);
    }
    Ok(headers)
}
