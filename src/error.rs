//! Status codes, sentinels and error types for the embedding layer.
//!
//! Errors come in two tiers. Hard failures (malformed call, broken
//! invariant, allocation failure, unexpected collaborator behavior) are
//! [`RosieError`] values and map onto the non-zero function-level status
//! codes. Soft outcomes (no match, unknown handle, compile violations,
//! failed import) are ordinary return values and never use `Err`.

use std::fmt;

use crate::runtime::RuntimeError;

pub type Result<T> = std::result::Result<T, RosieError>;

pub const SUCCESS: i32 = 0;
pub const ERR_OUT_OF_MEMORY: i32 = -2;
pub const ERR_SYSCALL_FAILED: i32 = -3;
pub const ERR_ENGINE_CALL_FAILED: i32 = -4;

pub const ERR_NO_MATCH: u32 = 0;
pub const ERR_NO_PATTERN: u32 = 1;
pub const ERR_NO_ENCODER: u32 = 2;
pub const ERR_NO_FILE: u32 = 3;

/// Reason codes carried in the `len` field of a RosieString whose data
/// pointer is NULL.
///
/// Callers must test the pointer before treating `len` as a byte count.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    NoMatch = ERR_NO_MATCH,
    NoPattern = ERR_NO_PATTERN,
    /// Unknown output encoder, also used for an unknown trace style.
    NoEncoder = ERR_NO_ENCODER,
    NoFile = ERR_NO_FILE,
}

impl Sentinel {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            ERR_NO_MATCH => Some(Sentinel::NoMatch),
            ERR_NO_PATTERN => Some(Sentinel::NoPattern),
            ERR_NO_ENCODER => Some(Sentinel::NoEncoder),
            ERR_NO_FILE => Some(Sentinel::NoFile),
            _ => None,
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentinel::NoMatch => write!(f, "no match"),
            Sentinel::NoPattern => write!(f, "invalid compiled pattern (already freed?)"),
            Sentinel::NoEncoder => write!(f, "invalid encoder or trace style"),
            Sentinel::NoFile => write!(f, "no such file or directory"),
        }
    }
}

/// Hard failures of the embedding layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RosieError {
    /// Bootstrap program missing, unreadable or corrupt.
    Boot(String),
    /// An operating system call failed (library introspection, file I/O).
    Syscall(String),
    OutOfMemory(String),
    /// The pattern runtime failed or returned something unexpected.
    EngineCall(String),
    InvalidArgument(String),
    /// Requested allocation limit is below the minimum and not zero.
    AllocLimitTooLow(u32),
    /// The engine has been finalized or is being torn down.
    EngineFinalized,
    LockPoisoned,
}

impl RosieError {
    /// Function-level status code reported across the C boundary.
    pub fn status(&self) -> i32 {
        match self {
            RosieError::OutOfMemory(_) => ERR_OUT_OF_MEMORY,
            RosieError::Syscall(_) => ERR_SYSCALL_FAILED,
            RosieError::Boot(_)
            | RosieError::EngineCall(_)
            | RosieError::InvalidArgument(_)
            | RosieError::AllocLimitTooLow(_)
            | RosieError::EngineFinalized
            | RosieError::LockPoisoned => ERR_ENGINE_CALL_FAILED,
        }
    }
}

impl fmt::Display for RosieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RosieError::Boot(msg) => write!(f, "Cannot initialize: {msg}"),
            RosieError::Syscall(msg) => write!(f, "System call failed: {msg}"),
            RosieError::OutOfMemory(msg) => write!(f, "Out of memory: {msg}"),
            RosieError::EngineCall(msg) => write!(f, "Engine call failed: {msg}"),
            RosieError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            RosieError::AllocLimitTooLow(mb) => write!(
                f,
                "Allocation limit of {mb} MB is below the minimum of {} MB",
                crate::config::MIN_ALLOC_LIMIT_MB
            ),
            RosieError::EngineFinalized => write!(f, "Engine has been finalized"),
            RosieError::LockPoisoned => write!(f, "Engine lock poisoned by a panicking thread"),
        }
    }
}

impl std::error::Error for RosieError {}

impl From<std::io::Error> for RosieError {
    fn from(err: std::io::Error) -> Self {
        RosieError::Syscall(err.to_string())
    }
}

impl From<RuntimeError> for RosieError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Boot(msg) => RosieError::Boot(msg),
            other => RosieError::EngineCall(other.to_string()),
        }
    }
}
