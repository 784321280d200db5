//! Core types shared by the bridge
//!
//! This module defines the error taxonomy, the opaque handle type used for
//! host-owned memory, and the tag types that travel alongside opaque payloads.
//! None of these types interpret host data - they only carry it.

use std::ffi::c_void;
use std::fmt;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Capability domain served through a service registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceDomain {
    /// Error reporting (push, abort, clear)
    Error,
    /// Key/value dictionary access
    Dictionary,
}

impl fmt::Display for ServiceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceDomain::Error => write!(f, "error"),
            ServiceDomain::Dictionary => write!(f, "dictionary"),
        }
    }
}

/// Errors that can occur while registering or dispatching
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("{table} table is full (capacity {capacity})")]
    CapacityExceeded { table: &'static str, capacity: usize },

    #[error("{table} index {index} out of range ({count} registered)")]
    InvalidIndex {
        table: &'static str,
        index: i64,
        count: usize,
    },

    #[error("no {0} handlers registered")]
    ServiceNotRegistered(ServiceDomain),

    #[error("{what}: expected length {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{operation} failed with platform status {code}")]
    PlatformError { operation: &'static str, code: i32 },

    #[error("stale address key (slot {index}, generation {generation})")]
    StaleHandle { index: u32, generation: u32 },

    #[error("{0} lock poisoned by a panicking caller")]
    RegistryPoisoned(&'static str),

    #[error("null pointer passed for {0}")]
    NullArgument(&'static str),

    #[error("panic inside {0}")]
    Panicked(&'static str),
}

impl BridgeError {
    /// Integer status reported through the C ABI
    ///
    /// Bridge failures map to small negative codes. Platform failures report
    /// the platform's own code unchanged.
    pub fn status_code(&self) -> i32 {
        match self {
            BridgeError::CapacityExceeded { .. } => -1,
            BridgeError::InvalidIndex { .. } => -2,
            BridgeError::ServiceNotRegistered(_) => -3,
            BridgeError::LengthMismatch { .. } => -4,
            BridgeError::StaleHandle { .. } => -5,
            BridgeError::RegistryPoisoned(_) => -6,
            BridgeError::NullArgument(_) => -7,
            BridgeError::Panicked(_) => -8,
            BridgeError::PlatformError { code, .. } => *code,
        }
    }

    /// Build a `PlatformError` from the calling thread's `errno`
    pub(crate) fn last_os_error(operation: &'static str) -> Self {
        let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(-1);
        BridgeError::PlatformError { operation, code }
    }
}

/// Opaque reference to memory owned by the host runtime
///
/// Full pointer width. The bridge never dereferences it; it is handed back to
/// whichever host subroutine knows what it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HostHandle(usize);

impl HostHandle {
    /// The null handle
    pub const NULL: HostHandle = HostHandle(0);

    pub fn from_ptr<T>(ptr: *mut T) -> Self {
        HostHandle(ptr as usize)
    }

    pub fn from_raw(raw: usize) -> Self {
        HostHandle(raw)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn raw(self) -> usize {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Error kind tag understood by the host's error stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    None,
    Unspecified,
    Io,
    IoEof,
    Mpi,
    /// Any code the bridge has no name for
    Other(i32),
}

impl From<i32> for ErrorKind {
    fn from(code: i32) -> Self {
        match code {
            0 => ErrorKind::None,
            1 => ErrorKind::Unspecified,
            2 => ErrorKind::Io,
            3 => ErrorKind::IoEof,
            4 => ErrorKind::Mpi,
            other => ErrorKind::Other(other),
        }
    }
}

impl From<ErrorKind> for i32 {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::None => 0,
            ErrorKind::Unspecified => 1,
            ErrorKind::Io => 2,
            ErrorKind::IoEof => 3,
            ErrorKind::Mpi => 4,
            ErrorKind::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::None => write!(f, "none"),
            ErrorKind::Unspecified => write!(f, "unspecified"),
            ErrorKind::Io => write!(f, "io"),
            ErrorKind::IoEof => write!(f, "io-eof"),
            ErrorKind::Mpi => write!(f, "mpi"),
            ErrorKind::Other(code) => write!(f, "kind {}", code),
        }
    }
}

/// Type tag attached to a dictionary value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    None,
    Integer,
    Real,
    Complex,
    Logical,
    Char,
    IntegerArray,
    RealArray,
    ComplexArray,
    LogicalArray,
    CharArray,
    IntegerArray2,
    RealArray2,
    Dictionary,
    /// Any tag the bridge has no name for
    Other(i32),
}

impl ValueType {
    /// True for tags whose payload is an array (shape is meaningful)
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            ValueType::IntegerArray
                | ValueType::RealArray
                | ValueType::ComplexArray
                | ValueType::LogicalArray
                | ValueType::CharArray
                | ValueType::IntegerArray2
                | ValueType::RealArray2
        )
    }
}

impl From<i32> for ValueType {
    fn from(code: i32) -> Self {
        match code {
            0 => ValueType::None,
            1 => ValueType::Integer,
            2 => ValueType::Real,
            3 => ValueType::Complex,
            4 => ValueType::Logical,
            5 => ValueType::Char,
            6 => ValueType::IntegerArray,
            7 => ValueType::RealArray,
            8 => ValueType::ComplexArray,
            9 => ValueType::LogicalArray,
            10 => ValueType::CharArray,
            11 => ValueType::IntegerArray2,
            12 => ValueType::RealArray2,
            13 => ValueType::Dictionary,
            other => ValueType::Other(other),
        }
    }
}

impl From<ValueType> for i32 {
    fn from(value_type: ValueType) -> Self {
        match value_type {
            ValueType::None => 0,
            ValueType::Integer => 1,
            ValueType::Real => 2,
            ValueType::Complex => 3,
            ValueType::Logical => 4,
            ValueType::Char => 5,
            ValueType::IntegerArray => 6,
            ValueType::RealArray => 7,
            ValueType::ComplexArray => 8,
            ValueType::LogicalArray => 9,
            ValueType::CharArray => 10,
            ValueType::IntegerArray2 => 11,
            ValueType::RealArray2 => 12,
            ValueType::Dictionary => 13,
            ValueType::Other(code) => code,
        }
    }
}

/// A dictionary value as it crosses the bridge: tag, shape and raw buffer
///
/// `data` points into host-owned memory and is only ever forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawValue {
    pub value_type: ValueType,
    /// Array extents; `[0, 0]` for scalars
    pub shape: [i32; 2],
    pub data: *mut c_void,
}

impl RawValue {
    /// A scalar value with no shape
    pub fn scalar(value_type: ValueType, data: *mut c_void) -> Self {
        Self {
            value_type,
            shape: [0, 0],
            data,
        }
    }

    /// An array value with the given extents
    pub fn array(value_type: ValueType, shape: [i32; 2], data: *mut c_void) -> Self {
        Self {
            value_type,
            shape,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        for code in -3..8 {
            assert_eq!(i32::from(ErrorKind::from(code)), code);
        }
        assert_eq!(ErrorKind::from(2), ErrorKind::Io);
        assert_eq!(ErrorKind::from(42), ErrorKind::Other(42));
    }

    #[test]
    fn test_value_type_codes() {
        for code in -1..16 {
            assert_eq!(i32::from(ValueType::from(code)), code);
        }
        assert!(ValueType::RealArray2.is_array());
        assert!(!ValueType::Dictionary.is_array());
        assert!(!ValueType::Other(99).is_array());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            BridgeError::ServiceNotRegistered(ServiceDomain::Error).status_code(),
            -3
        );
        let platform = BridgeError::PlatformError {
            operation: "setrlimit",
            code: 22,
        };
        assert_eq!(platform.status_code(), 22);
    }

    #[test]
    fn test_host_handle_round_trip() {
        let mut slot = 7u64;
        let handle = HostHandle::from_ptr(&mut slot as *mut u64);
        assert!(!handle.is_null());
        assert_eq!(handle.as_ptr() as *mut u64, &mut slot as *mut u64);
        assert!(HostHandle::NULL.is_null());
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::InvalidIndex {
            table: "constraint",
            index: -1,
            count: 2,
        };
        assert_eq!(err.to_string(), "constraint index -1 out of range (2 registered)");
    }
}
