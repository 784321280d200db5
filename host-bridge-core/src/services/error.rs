//! Error-domain service registry
//!
//! The host owns the error stack: message formatting, stack depth and the
//! abort policy all live on its side. This registry only remembers which
//! handlers to forward to.

use std::ffi::c_char;
use std::os::raw::c_int;
use std::sync::Arc;

use super::truncate_utf8;
use crate::types::{BridgeError, ErrorKind, Result, ServiceDomain};

/// Handler set for the error domain
pub trait ErrorHandlers: Send + Sync {
    /// Push an error carrying extra context (usually the source file)
    fn push_with_info(&self, message: &str, info: &str, kind: ErrorKind, line: i32);

    /// Push an error
    fn push(&self, message: &str, kind: ErrorKind, line: i32);

    /// Apply the host's abort policy for `kind`
    fn abort_on_error(&self, kind: ErrorKind);

    /// Discard every accumulated error
    fn clear_stack(&self);
}

pub type PushErrorWithInfoFn = unsafe extern "C" fn(
    message: *const c_char,
    info: *const c_char,
    kind: *const c_int,
    line: *const c_int,
    message_len: usize,
    info_len: usize,
);
pub type PushErrorFn =
    unsafe extern "C" fn(message: *const c_char, kind: *const c_int, line: *const c_int, message_len: usize);
pub type ErrorAbortFn = unsafe extern "C" fn(kind: *const c_int);
pub type ErrorClearStackFn = unsafe extern "C" fn();

/// Error handlers living on the host side of the C ABI
///
/// Strings are passed as pointer plus trailing hidden length, never NUL
/// terminated.
#[derive(Debug, Clone, Copy)]
pub struct ForeignErrorHandlers {
    push_with_info: PushErrorWithInfoFn,
    push: PushErrorFn,
    abort: ErrorAbortFn,
    clear_stack: ErrorClearStackFn,
}

impl ForeignErrorHandlers {
    /// # Safety
    ///
    /// All four pointers must stay callable for the rest of the process and
    /// must read no more than the lengths they are given.
    pub unsafe fn new(
        push_with_info: PushErrorWithInfoFn,
        push: PushErrorFn,
        abort: ErrorAbortFn,
        clear_stack: ErrorClearStackFn,
    ) -> Self {
        Self {
            push_with_info,
            push,
            abort,
            clear_stack,
        }
    }
}

impl ErrorHandlers for ForeignErrorHandlers {
    fn push_with_info(&self, message: &str, info: &str, kind: ErrorKind, line: i32) {
        let kind = c_int::from(kind);
        // SAFETY: the contract of `ForeignErrorHandlers::new`
        unsafe {
            (self.push_with_info)(
                message.as_ptr().cast(),
                info.as_ptr().cast(),
                &kind,
                &line,
                message.len(),
                info.len(),
            )
        }
    }

    fn push(&self, message: &str, kind: ErrorKind, line: i32) {
        let kind = c_int::from(kind);
        // SAFETY: the contract of `ForeignErrorHandlers::new`
        unsafe { (self.push)(message.as_ptr().cast(), &kind, &line, message.len()) }
    }

    fn abort_on_error(&self, kind: ErrorKind) {
        let kind = c_int::from(kind);
        // SAFETY: the contract of `ForeignErrorHandlers::new`
        unsafe { (self.abort)(&kind) }
    }

    fn clear_stack(&self) {
        // SAFETY: the contract of `ForeignErrorHandlers::new`
        unsafe { (self.clear_stack)() }
    }
}

/// Single-slot registry for the error domain
///
/// Cloning shares the installed handler set.
#[derive(Clone)]
pub struct ErrorService {
    handlers: Option<Arc<dyn ErrorHandlers>>,
    /// Longest message or context info forwarded, in bytes
    info_len: usize,
}

impl ErrorService {
    pub fn new(info_len: usize) -> Self {
        Self {
            handlers: None,
            info_len,
        }
    }

    /// Install a handler set, replacing any previous one
    pub fn register_error_handlers(&mut self, handlers: Arc<dyn ErrorHandlers>) {
        if self.handlers.replace(handlers).is_some() {
            log::warn!("Replacing previously registered error handlers");
        } else {
            log::debug!("Registered error handlers");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.handlers.is_some()
    }

    /// The current handler set
    pub fn handlers(&self) -> Result<Arc<dyn ErrorHandlers>> {
        self.handlers
            .clone()
            .ok_or(BridgeError::ServiceNotRegistered(ServiceDomain::Error))
    }

    pub fn push_with_info(&self, message: &str, info: &str, kind: ErrorKind, line: i32) -> Result<()> {
        let handlers = self.handlers()?;
        handlers.push_with_info(
            truncate_utf8(message, self.info_len),
            truncate_utf8(info, self.info_len),
            kind,
            line,
        );
        Ok(())
    }

    pub fn push(&self, message: &str, kind: ErrorKind, line: i32) -> Result<()> {
        let handlers = self.handlers()?;
        handlers.push(truncate_utf8(message, self.info_len), kind, line);
        Ok(())
    }

    pub fn abort_on_error(&self, kind: ErrorKind) -> Result<()> {
        let handlers = self.handlers()?;
        log::error!("Handing {} error to the host abort policy", kind);
        handlers.abort_on_error(kind);
        Ok(())
    }

    pub fn clear_stack(&self) -> Result<()> {
        self.handlers()?.clear_stack();
        Ok(())
    }

    /// Report an error raised at `file:line`
    ///
    /// With a `status` slot the kind code is stored there and control returns
    /// to the caller, which is expected to bail out. Without one the host's
    /// abort policy is applied.
    pub fn raise(
        &self,
        message: &str,
        file: &str,
        line: i32,
        kind: ErrorKind,
        status: Option<&mut i32>,
    ) -> Result<()> {
        self.push_with_info(message, file, kind, line)?;
        match status {
            Some(status) => {
                *status = kind.into();
                Ok(())
            }
            None => self.abort_on_error(kind),
        }
    }
}
