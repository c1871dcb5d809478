//! Error taxonomy shared by every layer, with stable numeric codes.
//!
//! Codes are grouped in per-subsystem ranges so that a bare number can be
//! routed back to the subsystem that produced it:
//! - generic: 0..=127
//! - files: 128..=255
//! - cables: 256..=383
//! - calcs: 384..=511

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Errors that can occur anywhere in the cable/calculator stack
#[derive(Debug, thiserror::Error)]
pub enum HpError {
    /// A buffer could not be grown
    #[error("memory allocation failed")]
    Malloc,

    /// The handle (or the transport resource behind it) is not usable
    #[error("invalid handle")]
    InvalidHandle,

    /// A malformed or out of range argument
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Unsupported cable or calculator model
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// A file path that cannot be turned into a calculator variable name
    #[error("invalid filename: {0}")]
    Filename(String),

    /// Cable operation attempted while the cable is closed
    #[error("cable not open")]
    CableNotOpen,

    /// Cable opened twice
    #[error("cable already open")]
    CableAlreadyOpen,

    /// Transport write failed
    #[error("cable write error: {0}")]
    CableWrite(String),

    /// Transport read failed
    #[error("cable read error: {0}")]
    CableRead(String),

    /// The cable model does not provide this operation
    #[error("cable does not implement {0}")]
    CableInvalidFncts(&'static str),

    /// The device is not present
    #[error("cable probe failed: device not found")]
    CableProbeFailed,

    /// Calculator operation attempted without an attached cable
    #[error("no cable attached")]
    NoCable,

    /// Another operation is in flight on this calculator handle
    #[error("calculator busy")]
    CalcBusy,

    /// The calculator model does not provide this operation
    #[error("calculator does not implement {0}")]
    CalcInvalidFncts(&'static str),

    /// CRC mismatch, missing version marker, undersized frame, bad markers
    #[error("packet format error: {0}")]
    PacketFormat(String),

    /// Local time could not be broken down into calculator date fields
    #[error("failed to split timestamp into date and time fields")]
    SplitTimestamp,

    /// HID communication error
    #[error("hid error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HpError>;

/// Stable numeric error codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Malloc = 1,
    InvalidHandle = 2,
    InvalidParameter = 3,
    InvalidModel = 4,

    FileFilename = 128,
    FileIo = 129,

    CableNotOpen = 256,
    CableOpen = 257,
    CableWriteError = 259,
    CableReadError = 260,
    CableInvalidFncts = 261,
    CableProbeFailed = 262,
    CableHid = 263,

    CalcNoCable = 384,
    CalcBusy = 386,
    CalcInvalidFncts = 387,
    CalcPacketFormat = 388,
    CalcSplitTimestamp = 389,
}

/// Subsystem owning a range of error codes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subsystem {
    Generic,
    Files,
    Cables,
    Calcs,
}

impl Subsystem {
    fn of(code: u32) -> Option<Self> {
        match code {
            0..=127 => Some(Self::Generic),
            128..=255 => Some(Self::Files),
            256..=383 => Some(Self::Cables),
            384..=511 => Some(Self::Calcs),
            _ => None,
        }
    }
}

impl ErrorCode {
    pub fn subsystem(self) -> Subsystem {
        // every variant is declared inside one of the ranges
        Subsystem::of(self.into()).unwrap_or(Subsystem::Generic)
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "no error",
            Self::Malloc => "memory allocation failed",
            Self::InvalidHandle => "invalid handle",
            Self::InvalidParameter => "invalid parameter",
            Self::InvalidModel => "invalid model",
            Self::FileFilename => "file name cannot be converted to a variable name",
            Self::FileIo => "file input/output error",
            Self::CableNotOpen => "cable not open",
            Self::CableOpen => "cable already open",
            Self::CableWriteError => "error while writing to the cable",
            Self::CableReadError => "error while reading from the cable",
            Self::CableInvalidFncts => "operation not supported by this cable",
            Self::CableProbeFailed => "device not found while probing the cable",
            Self::CableHid => "HID library error",
            Self::CalcNoCable => "no cable attached to the calculator",
            Self::CalcBusy => "calculator busy",
            Self::CalcInvalidFncts => "operation not supported by this calculator",
            Self::CalcPacketFormat => "unexpected packet format",
            Self::CalcSplitTimestamp => "cannot split timestamp into date and time",
        }
    }
}

impl HpError {
    /// Numeric code of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Malloc => ErrorCode::Malloc,
            Self::InvalidHandle => ErrorCode::InvalidHandle,
            Self::InvalidParameter(_) => ErrorCode::InvalidParameter,
            Self::InvalidModel(_) => ErrorCode::InvalidModel,
            Self::Filename(_) => ErrorCode::FileFilename,
            Self::Io(_) => ErrorCode::FileIo,
            Self::CableNotOpen => ErrorCode::CableNotOpen,
            Self::CableAlreadyOpen => ErrorCode::CableOpen,
            Self::CableWrite(_) => ErrorCode::CableWriteError,
            Self::CableRead(_) => ErrorCode::CableReadError,
            Self::CableInvalidFncts(_) => ErrorCode::CableInvalidFncts,
            Self::CableProbeFailed => ErrorCode::CableProbeFailed,
            Self::Hid(_) => ErrorCode::CableHid,
            Self::NoCable => ErrorCode::CalcNoCable,
            Self::CalcBusy => ErrorCode::CalcBusy,
            Self::CalcInvalidFncts(_) => ErrorCode::CalcInvalidFncts,
            Self::PacketFormat(_) => ErrorCode::CalcPacketFormat,
            Self::SplitTimestamp => ErrorCode::CalcSplitTimestamp,
        }
    }
}

fn lookup(code: u32, subsystem: Subsystem) -> Option<&'static str> {
    if Subsystem::of(code) != Some(subsystem) {
        return None;
    }
    ErrorCode::try_from(code).ok().map(ErrorCode::message)
}

/// Message for a generic error code, `None` if the code belongs elsewhere
pub fn generic_error_message(code: u32) -> Option<&'static str> {
    lookup(code, Subsystem::Generic)
}

/// Message for a file error code, `None` if the code belongs elsewhere
pub fn files_error_message(code: u32) -> Option<&'static str> {
    lookup(code, Subsystem::Files)
}

/// Message for a cable error code, `None` if the code belongs elsewhere
pub fn cables_error_message(code: u32) -> Option<&'static str> {
    lookup(code, Subsystem::Cables)
}

/// Message for a calculator error code, `None` if the code belongs elsewhere
pub fn calcs_error_message(code: u32) -> Option<&'static str> {
    lookup(code, Subsystem::Calcs)
}

/// Human readable message for any error code.
///
/// Subsystems are asked in turn until one recognizes the code.
pub fn error_message(code: u32) -> &'static str {
    generic_error_message(code)
        .or_else(|| files_error_message(code))
        .or_else(|| cables_error_message(code))
        .or_else(|| calcs_error_message(code))
        .unwrap_or("unknown error")
}
