//! Service registries
//!
//! Each registry holds the current handler set for one capability domain.
//! A handler set is installed in a single store and replaced as a whole, so
//! callers can never observe a mix of old and new handlers.

pub mod dictionary;
pub mod error;

pub use dictionary::{DictionaryHandlers, DictionaryService, ForeignDictionaryHandlers};
pub use error::{ErrorHandlers, ErrorService, ForeignErrorHandlers};

/// Longest prefix of `s` that fits in `max_len` bytes without splitting a character
pub(crate) fn truncate_utf8(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Decode a host character buffer: not NUL terminated, blank padded
///
/// # Safety
///
/// `ptr` must be valid for `len` bytes, or `len` must be zero.
pub(crate) unsafe fn host_string(ptr: *const u8, len: usize) -> String {
    if ptr.is_null() || len == 0 {
        return String::new();
    }
    let bytes = std::slice::from_raw_parts(ptr, len);
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}
