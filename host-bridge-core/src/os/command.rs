//! Shell command execution through `system(3)`

use std::ffi::CString;
use std::io::Write;

use crate::types::{BridgeError, Result};

/// Raw wait status returned by the shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus(i32);

impl CommandStatus {
    pub fn from_raw(raw: i32) -> Self {
        CommandStatus(raw)
    }

    /// The status exactly as `system(3)` returned it
    pub fn raw(self) -> i32 {
        self.0
    }

    /// Exit code, if the shell exited normally
    pub fn exit_code(self) -> Option<i32> {
        libc::WIFEXITED(self.0).then(|| libc::WEXITSTATUS(self.0))
    }

    /// Terminating signal, if the shell was killed
    pub fn signal(self) -> Option<i32> {
        libc::WIFSIGNALED(self.0).then(|| libc::WTERMSIG(self.0))
    }

    pub fn success(self) -> bool {
        self.exit_code() == Some(0)
    }
}

/// Run `command` through the shell and wait for it
///
/// At most `buffer_len` bytes of `command` are used, and a NUL byte ends the
/// command early. Overlong commands are cut rather than rejected. Standard
/// output is flushed once the shell returns.
pub fn run_command(command: &[u8], buffer_len: usize) -> Result<CommandStatus> {
    let mut bytes = &command[..command.len().min(buffer_len)];
    if let Some(nul) = bytes.iter().position(|&b| b == 0) {
        bytes = &bytes[..nul];
    }
    if bytes.len() < command.len() {
        log::debug!(
            "Shell command cut from {} to {} bytes",
            command.len(),
            bytes.len()
        );
    }

    let c_command = CString::new(bytes).map_err(|_| BridgeError::PlatformError {
        operation: "system",
        code: libc::EINVAL,
    })?;

    log::debug!("Running shell command: {}", c_command.to_string_lossy());
    // SAFETY: `c_command` is a valid NUL-terminated string
    let raw = unsafe { libc::system(c_command.as_ptr()) };
    let failed = raw == -1;
    let error = failed.then(|| BridgeError::last_os_error("system"));

    let _ = std::io::stdout().flush();
    // SAFETY: a null stream flushes every open C stream
    unsafe { libc::fflush(std::ptr::null_mut()) };

    match error {
        Some(error) => Err(error),
        None => Ok(CommandStatus(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_is_reported() {
        let status = run_command(b"exit 3", 1024).unwrap();
        assert_eq!(status.exit_code(), Some(3));
        assert!(!status.success());
        assert_eq!(status.signal(), None);

        assert!(run_command(b"true", 1024).unwrap().success());
    }

    #[test]
    fn test_overlong_command_is_truncated() {
        // Padding pushes the argument of `exit` past the buffer bound
        let mut command = vec![b' '; 1020];
        command.extend_from_slice(b"exit 5");
        assert_eq!(command.len(), 1026);

        let status = run_command(&command, 1024).unwrap();
        assert_eq!(status.exit_code(), Some(0));

        let status = run_command(&command, 2048).unwrap();
        assert_eq!(status.exit_code(), Some(5));
    }

    #[test]
    fn test_nul_ends_command() {
        let status = run_command(b"exit 4\0; exit 9", 1024).unwrap();
        assert_eq!(status.exit_code(), Some(4));
    }

    #[test]
    fn test_command_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let command = format!("touch '{}'", marker.display());

        assert!(run_command(command.as_bytes(), 1024).unwrap().success());
        assert!(marker.exists());
    }
}
