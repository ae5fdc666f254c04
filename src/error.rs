//! Unified error types for the HAP runtime.
//!
//! A single `Error` enum that every subsystem converts into, keeping
//! transport and dispatcher code uniform. `HapStatus` and `PairError` are
//! the two error spaces the HAP wire protocol actually exposes (§7 of the
//! design doc); `Error` is the superset used internally, including the
//! ones that never cross the wire (buffer/crypto boundary failures).

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level runtime error
// ---------------------------------------------------------------------------

/// Every fallible operation in the runtime funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A TLV8 or PDU buffer operation failed (wrong size, capacity exceeded).
    Buffer(BufferError),
    /// A cryptographic primitive was given a malformed input.
    Crypto(CryptoError),
    /// The pairing engine rejected a request; carries the wire error kind.
    Pairing(PairError),
    /// A data-model/transport operation failed; carries the wire status.
    Status(HapStatus),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(e) => write!(f, "buffer: {e}"),
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::Pairing(e) => write!(f, "pairing: {e}"),
            Self::Status(e) => write!(f, "status: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Buffer / arena errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Operand or result would exceed the buffer's declared capacity.
    CapacityExceeded,
    /// A fixed-format property's payload was not the expected width.
    WrongLength,
    /// The TLV8 stream was truncated or malformed.
    Malformed,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded => write!(f, "capacity exceeded"),
            Self::WrongLength => write!(f, "wrong length"),
            Self::Malformed => write!(f, "malformed TLV stream"),
        }
    }
}

impl From<BufferError> for Error {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

// ---------------------------------------------------------------------------
// Crypto errors
// ---------------------------------------------------------------------------

/// The multi-precision engine and every primitive built on it have exactly
/// one failure mode: an operand or result would not fit in its declared
/// capacity. Everything else (tag mismatch, signature mismatch) is a
/// boolean verification result, not an `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    CapacityExceeded,
    InvalidKeyLength,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded => write!(f, "operand exceeds declared capacity"),
            Self::InvalidKeyLength => write!(f, "key has invalid length"),
        }
    }
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        Self::Crypto(e)
    }
}

// ---------------------------------------------------------------------------
// Pairing TLV error space (spec.md §7)
// ---------------------------------------------------------------------------

/// Error kind carried inside a pairing response TLV (`Error` tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PairError {
    Unknown = 0x01,
    Authentication = 0x02,
    Backoff = 0x03,
    MaxPeers = 0x04,
    MaxTries = 0x05,
    Unavailable = 0x06,
    Busy = 0x07,
}

impl fmt::Display for PairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Authentication => write!(f, "authentication failed"),
            Self::Backoff => write!(f, "backoff"),
            Self::MaxPeers => write!(f, "max peers reached"),
            Self::MaxTries => write!(f, "max tries reached"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Busy => write!(f, "busy"),
        }
    }
}

impl From<PairError> for Error {
    fn from(e: PairError) -> Self {
        Self::Pairing(e)
    }
}

// ---------------------------------------------------------------------------
// HAP status space (spec.md §7), used on both transports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum HapStatus {
    Success = 0,
    Busy = -70403,
    InvalidRequest = -70410,
    UnsupportedPdu = -70405,
    InsufficientAuthentication = -70411,
    InsufficientAuthorization = -70401,
    InvalidValue = -70414,
    NotificationNotSupported = -70406,
    CannotRead = -70407,
    CannotWrite = -70408,
    ResourceNotExist = -70409,
    OperationTimedOut = -70402,
    OutOfResources = -70413,
}

impl fmt::Display for HapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Busy => write!(f, "busy"),
            Self::InvalidRequest => write!(f, "invalid request"),
            Self::UnsupportedPdu => write!(f, "unsupported PDU"),
            Self::InsufficientAuthentication => write!(f, "insufficient authentication"),
            Self::InsufficientAuthorization => write!(f, "insufficient authorization"),
            Self::InvalidValue => write!(f, "invalid value"),
            Self::NotificationNotSupported => write!(f, "notification not supported"),
            Self::CannotRead => write!(f, "cannot read"),
            Self::CannotWrite => write!(f, "cannot write"),
            Self::ResourceNotExist => write!(f, "resource does not exist"),
            Self::OperationTimedOut => write!(f, "operation timed out"),
            Self::OutOfResources => write!(f, "out of resources"),
        }
    }
}

impl From<HapStatus> for Error {
    fn from(e: HapStatus) -> Self {
        Self::Status(e)
    }
}

impl From<BufferError> for HapStatus {
    fn from(_: BufferError) -> Self {
        // Out-of-slab / malformed-buffer failures surface as InvalidRequest
        // on IP and as a BLE ATT `Unlikely` error (mapped at the BLE PDU
        // boundary, not here) — spec.md §7.
        HapStatus::InvalidRequest
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Runtime-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
