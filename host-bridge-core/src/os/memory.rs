//! Physical memory query

use crate::types::Result;

/// Physical memory totals in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MemoryInfo {
    pub total: u64,
    /// `None` where the platform gives no free-memory reading
    pub free: Option<u64>,
}

impl MemoryInfo {
    /// Free memory, falling back to the total when it is unknown
    pub fn free_or_total(&self) -> u64 {
        self.free.unwrap_or(self.total)
    }
}

/// Query total and free physical memory
#[cfg(not(target_os = "macos"))]
pub fn mem_info() -> Result<MemoryInfo> {
    use crate::types::BridgeError;

    // SAFETY: sysinfo is plain old data; all-zero is a valid value
    let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
    // SAFETY: `info` is a valid, writable sysinfo
    if unsafe { libc::sysinfo(&mut info) } != 0 {
        return Err(BridgeError::last_os_error("sysinfo"));
    }

    let unit = u64::from(info.mem_unit.max(1));
    Ok(MemoryInfo {
        total: info.totalram as u64 * unit,
        free: Some(info.freeram as u64 * unit),
    })
}

/// Query total physical memory; macOS has no free-memory reading here
#[cfg(target_os = "macos")]
pub fn mem_info() -> Result<MemoryInfo> {
    use crate::types::BridgeError;

    let mut total: u64 = 0;
    let mut size = std::mem::size_of::<u64>();
    // SAFETY: the name is NUL terminated and `total`/`size` describe a valid buffer
    let status = unsafe {
        libc::sysctlbyname(
            b"hw.memsize\0".as_ptr().cast(),
            (&mut total as *mut u64).cast(),
            &mut size,
            std::ptr::null_mut(),
            0,
        )
    };
    if status != 0 {
        return Err(BridgeError::last_os_error("sysctlbyname"));
    }

    Ok(MemoryInfo { total, free: None })
}
