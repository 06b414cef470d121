//! Typed OBEX headers and the ordered header set.
//!
//! An OBEX header is a tagged value keyed by an 8-bit header identifier
//! (HI). The top two bits of the HI fully determine the wire encoding of
//! the value, so the codec dispatches on [`HeaderKind`] rather than
//! inspecting the value at runtime. Supplying a [`Header`] variant that
//! does not match the HI's kind is a caller error caught at encode time.
//!
//! Unicode header values travel as big-endian UTF-16 with a mandatory
//! two-byte null terminator. The terminator is synthesised on encode and
//! stripped on decode; it is never part of the application-level text.

use bytes::Bytes;

use crate::codec::DecodeError;

/// 8-bit OBEX header identifier.
///
/// The top two bits select the encoding; the rest name the header. The
/// constants below cover the header vocabulary of OBEX 1.x.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeaderId(pub u8);

impl HeaderId {
    pub const COUNT: Self = Self(0xc0);
    pub const NAME: Self = Self(0x01);
    pub const TYPE: Self = Self(0x42);
    pub const LENGTH: Self = Self(0xc3);
    pub const TIME: Self = Self(0x44);
    pub const DESCRIPTION: Self = Self(0x05);
    pub const TARGET: Self = Self(0x46);
    pub const HTTP: Self = Self(0x47);
    pub const BODY: Self = Self(0x48);
    pub const END_OF_BODY: Self = Self(0x49);
    pub const WHO: Self = Self(0x4a);
    pub const CONNECTION_ID: Self = Self(0xcb);
    pub const APP_PARAMETERS: Self = Self(0x4c);
    pub const AUTH_CHALLENGE: Self = Self(0x4d);
    pub const AUTH_RESPONSE: Self = Self(0x4e);
    pub const CREATOR: Self = Self(0xcf);
    pub const WAN_UUID: Self = Self(0x50);
    pub const OBJECT_CLASS: Self = Self(0x51);
    pub const SESSION_PARAMETERS: Self = Self(0x52);
    pub const SESSION_SEQUENCE_NUMBER: Self = Self(0x93);

    /// Encoding selected by the identifier's top two bits.
    #[must_use]
    pub fn kind(self) -> HeaderKind {
        match self.0 >> 6 {
            0b00 => HeaderKind::Unicode,
            0b01 => HeaderKind::ByteSequence,
            0b10 => HeaderKind::Byte,
            _ => HeaderKind::FourByteInt,
        }
    }
}

impl From<u8> for HeaderId {
    fn from(value: u8) -> Self { Self(value) }
}

impl std::fmt::Display for HeaderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Wire encoding of a header value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderKind {
    /// Null-terminated big-endian UTF-16 text.
    Unicode,
    /// Raw byte buffer of exact length.
    ByteSequence,
    /// 8-bit unsigned integer.
    Byte,
    /// 32-bit unsigned integer, big-endian.
    FourByteInt,
}

/// Typed OBEX header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Header {
    /// Text value; encoded as UTF-16BE plus terminator on the wire.
    Unicode(String),
    /// Opaque byte buffer.
    ByteSequence(Bytes),
    /// 8-bit unsigned integer.
    Byte(u8),
    /// 32-bit unsigned integer.
    FourByteInt(u32),
}

impl Header {
    /// Build a text header from anything string-like.
    pub fn text(value: impl Into<String>) -> Self { Self::Unicode(value.into()) }

    /// Build a byte-sequence header from an owned or borrowed buffer.
    pub fn bytes(value: impl Into<Bytes>) -> Self { Self::ByteSequence(value.into()) }

    /// The wire encoding this value requires.
    #[must_use]
    pub fn kind(&self) -> HeaderKind {
        match self {
            Self::Unicode(_) => HeaderKind::Unicode,
            Self::ByteSequence(_) => HeaderKind::ByteSequence,
            Self::Byte(_) => HeaderKind::Byte,
            Self::FourByteInt(_) => HeaderKind::FourByteInt,
        }
    }

    /// Encode the value to its wire representation.
    ///
    /// Unicode text gains the two-byte null terminator here; it must not be
    /// present in the `String` itself.
    #[must_use]
    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            Self::Unicode(text) => {
                let mut units: Vec<u16> = text.encode_utf16().collect();
                units.push(0);
                units.iter().flat_map(|unit| unit.to_be_bytes()).collect()
            }
            Self::ByteSequence(buf) => buf.to_vec(),
            Self::Byte(value) => vec![*value],
            Self::FourByteInt(value) => value.to_be_bytes().to_vec(),
        }
    }

    /// Decode a wire value according to the identifier's kind.
    ///
    /// A Unicode value shorter than its two-byte terminator decodes to the
    /// empty string rather than an error; the final two bytes are otherwise
    /// stripped without inspection.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Utf16`] for text that is not valid big-endian
    /// UTF-16 (including odd byte counts) and [`DecodeError::ValueLength`]
    /// for integer values of the wrong width.
    pub fn from_wire(id: HeaderId, value: &[u8]) -> Result<Self, DecodeError> {
        match id.kind() {
            HeaderKind::Unicode => {
                if value.len() < 2 {
                    return Ok(Self::Unicode(String::new()));
                }
                let text = &value[..value.len() - 2];
                if text.len() % 2 != 0 {
                    return Err(DecodeError::Utf16 { id });
                }
                let units: Vec<u16> = text
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                let decoded =
                    String::from_utf16(&units).map_err(|_| DecodeError::Utf16 { id })?;
                Ok(Self::Unicode(decoded))
            }
            HeaderKind::ByteSequence => Ok(Self::ByteSequence(Bytes::copy_from_slice(value))),
            HeaderKind::Byte => match value {
                [b] => Ok(Self::Byte(*b)),
                _ => Err(DecodeError::ValueLength {
                    id,
                    expected: 1,
                    found: value.len(),
                }),
            },
            HeaderKind::FourByteInt => match value {
                [a, b, c, d] => Ok(Self::FourByteInt(u32::from_be_bytes([*a, *b, *c, *d]))),
                _ => Err(DecodeError::ValueLength {
                    id,
                    expected: 4,
                    found: value.len(),
                }),
            },
        }
    }
}

/// Insertion-ordered map from [`HeaderId`] to [`Header`].
///
/// Keys are unique; inserting an existing identifier replaces its value in
/// place. Iteration order is the set's own order, which the codec reuses
/// for every header other than `CONNECTION_ID` and `TARGET` (those two are
/// always transmitted first).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(HeaderId, Header)>,
}

impl HeaderSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Insert a header, replacing any existing value for the identifier.
    pub fn insert(&mut self, id: HeaderId, value: Header) {
        if let Some(slot) = self.entries.iter_mut().find(|(key, _)| *key == id) {
            slot.1 = value;
        } else {
            self.entries.push((id, value));
        }
    }

    /// Builder-style insertion.
    #[must_use]
    pub fn with(mut self, id: HeaderId, value: Header) -> Self {
        self.insert(id, value);
        self
    }

    /// Look up a header by identifier.
    #[must_use]
    pub fn get(&self, id: HeaderId) -> Option<&Header> {
        self.entries
            .iter()
            .find(|(key, _)| *key == id)
            .map(|(_, value)| value)
    }

    /// Whether the identifier is present.
    #[must_use]
    pub fn contains(&self, id: HeaderId) -> bool { self.get(id).is_some() }

    /// Number of headers in the set.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Iterate over headers in set order.
    pub fn iter(&self) -> impl Iterator<Item = (HeaderId, &Header)> {
        self.entries.iter().map(|(id, value)| (*id, value))
    }
}

impl FromIterator<(HeaderId, Header)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (HeaderId, Header)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (id, value) in iter {
            set.insert(id, value);
        }
        set
    }
}
