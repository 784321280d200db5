//! Fail-fast process termination

use std::backtrace::Backtrace;
use std::io::Write;

/// Terminate the process immediately, logging `reason` and a stack trace
///
/// No destructors run and no unwinding happens; this is the path for
/// unrecoverable numerical errors.
pub fn abort(reason: &str) -> ! {
    let trace = Backtrace::force_capture();
    log::error!("Aborting: {}\n{}", reason, trace);
    eprintln!("host-bridge abort: {}\n{}", reason, trace);
    let _ = std::io::stdout().flush();
    std::process::abort()
}
