//! Opcode and response-code vocabulary.
//!
//! OBEX requests carry one of a small closed set of opcodes, and every
//! completed request yields an 8-bit response code reusing HTTP-like status
//! ranges. Both enumerations are fixed by the protocol; nothing here is
//! extensible.

use crate::error::ObexError;

/// Operation requested by an OBEX client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Establish an OBEX session.
    Connect = 0x00,
    /// Tear down an OBEX session.
    Disconnect = 0x01,
    /// Upload an object, or delete one when no body is supplied.
    Put = 0x02,
    /// Download an object.
    Get = 0x03,
    /// Change the remote working directory.
    SetPath = 0x05,
    /// Manage a reliable OBEX session.
    Session = 0x07,
    /// Abort the operation in progress.
    Abort = 0x7f,
}

impl OpCode {
    /// Wire value of this opcode.
    #[must_use]
    pub fn code(self) -> u8 { self as u8 }
}

impl TryFrom<u8> for OpCode {
    type Error = ObexError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Connect),
            0x01 => Ok(Self::Disconnect),
            0x02 => Ok(Self::Put),
            0x03 => Ok(Self::Get),
            0x05 => Ok(Self::SetPath),
            0x07 => Ok(Self::Session),
            0x7f => Ok(Self::Abort),
            other => Err(ObexError::Protocol(format!("unknown opcode {other:#04x}"))),
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connect => "Connect",
            Self::Disconnect => "Disconnect",
            Self::Put => "Put",
            Self::Get => "Get",
            Self::SetPath => "SetPath",
            Self::Session => "Session",
            Self::Abort => "Abort",
        };
        f.write_str(name)
    }
}

/// Response code returned by an OBEX server.
///
/// The value space mirrors HTTP status classes compressed into one byte:
/// `0x10` continue, `0x20`–`0x26` success, `0x30`+ redirection, `0x40`+
/// client error, `0x50`+ server error. Non-success codes are ordinary
/// return values, not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u8);

impl ResponseCode {
    pub const CONTINUE: Self = Self(0x10);
    pub const SWITCH_PRO: Self = Self(0x11);
    pub const SUCCESS: Self = Self(0x20);
    pub const CREATED: Self = Self(0x21);
    pub const ACCEPTED: Self = Self(0x22);
    pub const NON_AUTHORITATIVE: Self = Self(0x23);
    pub const NO_CONTENT: Self = Self(0x24);
    pub const RESET_CONTENT: Self = Self(0x25);
    pub const PARTIAL_CONTENT: Self = Self(0x26);
    pub const MULTIPLE_CHOICES: Self = Self(0x30);
    pub const MOVED_PERMANENTLY: Self = Self(0x31);
    pub const MOVED_TEMPORARILY: Self = Self(0x32);
    pub const SEE_OTHER: Self = Self(0x33);
    pub const NOT_MODIFIED: Self = Self(0x34);
    pub const USE_PROXY: Self = Self(0x35);
    pub const BAD_REQUEST: Self = Self(0x40);
    pub const UNAUTHORIZED: Self = Self(0x41);
    pub const PAYMENT_REQUIRED: Self = Self(0x42);
    pub const FORBIDDEN: Self = Self(0x43);
    pub const NOT_FOUND: Self = Self(0x44);
    pub const METHOD_NOT_ALLOWED: Self = Self(0x45);
    pub const NOT_ACCEPTABLE: Self = Self(0x46);
    pub const PROXY_AUTH_REQUIRED: Self = Self(0x47);
    pub const REQUEST_TIME_OUT: Self = Self(0x48);
    pub const CONFLICT: Self = Self(0x49);
    pub const GONE: Self = Self(0x4a);
    pub const LENGTH_REQUIRED: Self = Self(0x4b);
    pub const PRECONDITION_FAILED: Self = Self(0x4c);
    pub const REQ_ENTITY_TOO_LARGE: Self = Self(0x4d);
    pub const REQ_URL_TOO_LARGE: Self = Self(0x4e);
    pub const UNSUPPORTED_MEDIA_TYPE: Self = Self(0x4f);
    pub const INTERNAL_SERVER_ERROR: Self = Self(0x50);
    pub const NOT_IMPLEMENTED: Self = Self(0x51);
    pub const BAD_GATEWAY: Self = Self(0x52);
    pub const SERVICE_UNAVAILABLE: Self = Self(0x53);
    pub const GATEWAY_TIMEOUT: Self = Self(0x54);
    pub const VERSION_NOT_SUPPORTED: Self = Self(0x55);
    pub const DATABASE_FULL: Self = Self(0x60);
    pub const DATABASE_LOCKED: Self = Self(0x61);

    /// Wire value of this response code.
    #[must_use]
    pub fn code(self) -> u8 { self.0 }

    /// Whether the code belongs to the `0x20`–`0x26` success family.
    #[must_use]
    pub fn is_success(self) -> bool { (0x20..=0x26).contains(&self.0) }

    /// Whether the code asks the peer to continue the transfer.
    #[must_use]
    pub fn is_continue(self) -> bool { self == Self::CONTINUE }

    /// Whether a server returning this code accepts the request.
    ///
    /// Only the exact `SUCCESS` and `CONTINUE` codes accept; the rest of the
    /// success family is passed through but does not trigger streaming.
    #[must_use]
    pub fn accepts(self) -> bool { self == Self::SUCCESS || self.is_continue() }
}

impl From<u8> for ResponseCode {
    fn from(value: u8) -> Self { Self(value) }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}
