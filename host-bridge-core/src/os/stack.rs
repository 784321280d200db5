//! Stack size limit adjustment

use crate::types::{BridgeError, Result};

/// Soft and hard stack limits in bytes; `libc::RLIM_INFINITY` means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackLimits {
    pub soft: u64,
    pub hard: u64,
}

impl StackLimits {
    /// What raising the soft limit to `requested` bytes would do
    ///
    /// Pure decision; nothing is changed.
    pub fn plan(&self, requested: u64) -> StackOutcome {
        if self.soft >= requested {
            StackOutcome::AlreadySufficient { soft: self.soft }
        } else if self.hard < requested {
            StackOutcome::ExceedsHardLimit { hard: self.hard }
        } else {
            StackOutcome::Raised {
                from: self.soft,
                to: requested,
            }
        }
    }
}

/// What `increase_stack` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOutcome {
    /// The soft limit already covered the request
    AlreadySufficient { soft: u64 },
    /// The soft limit was raised to the requested size
    Raised { from: u64, to: u64 },
    /// The request is above the hard limit; nothing was changed
    ExceedsHardLimit { hard: u64 },
}

impl StackOutcome {
    /// Status reported to the host: 0 on success, the hard limit otherwise
    pub fn status_code(&self) -> u64 {
        match self {
            StackOutcome::AlreadySufficient { .. } | StackOutcome::Raised { .. } => 0,
            StackOutcome::ExceedsHardLimit { hard } => *hard,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code() == 0
    }
}

/// Current stack limits of the process
pub fn stack_limits() -> Result<StackLimits> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit
    if unsafe { libc::getrlimit(libc::RLIMIT_STACK, &mut limit) } != 0 {
        return Err(BridgeError::last_os_error("getrlimit"));
    }
    Ok(StackLimits {
        soft: limit.rlim_cur as u64,
        hard: limit.rlim_max as u64,
    })
}

/// Raise the soft stack limit to at least `requested` bytes
///
/// The soft limit only ever grows, and never past the hard limit.
pub fn increase_stack(requested: u64) -> Result<StackOutcome> {
    let limits = stack_limits()?;

    let outcome = limits.plan(requested);
    match outcome {
        StackOutcome::AlreadySufficient { .. } => return Ok(outcome),
        StackOutcome::ExceedsHardLimit { hard } => {
            log::warn!("Requested stack of {} bytes exceeds hard limit {}", requested, hard);
            return Ok(outcome);
        }
        StackOutcome::Raised { .. } => {}
    }

    let limit = libc::rlimit {
        rlim_cur: requested as libc::rlim_t,
        rlim_max: limits.hard as libc::rlim_t,
    };
    // SAFETY: `limit` is a valid rlimit
    if unsafe { libc::setrlimit(libc::RLIMIT_STACK, &limit) } != 0 {
        return Err(BridgeError::last_os_error("setrlimit"));
    }

    log::debug!("Raised stack soft limit from {} to {} bytes", limits.soft, requested);
    Ok(outcome)
}
