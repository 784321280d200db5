//! Potential callback registration and dispatch
//!
//! A potential callback receives a single opaque handle to an atomic
//! configuration owned by the host and works entirely through it.

use std::ffi::c_void;
use std::sync::Arc;

use super::CallbackTable;
use crate::types::{HostHandle, Result};

/// A potential-evaluation callback
pub trait PotentialCallback: Send + Sync {
    fn call(&self, atoms: HostHandle);
}

impl<F> PotentialCallback for F
where
    F: Fn(HostHandle) + Send + Sync,
{
    fn call(&self, atoms: HostHandle) {
        self(atoms)
    }
}

/// Host-side potential callback taking the configuration handle by reference
pub type ForeignPotentialSub = unsafe extern "C" fn(atoms: *mut c_void);

/// Adapter dispatching to a host callback through its C entry point
#[derive(Debug, Clone, Copy)]
pub struct ForeignPotentialCallback {
    sub: ForeignPotentialSub,
}

impl ForeignPotentialCallback {
    /// Wrap a host callback
    ///
    /// # Safety
    ///
    /// `sub` must stay callable for the rest of the process and accept any
    /// handle the host dispatches with.
    pub unsafe fn new(sub: ForeignPotentialSub) -> Self {
        Self { sub }
    }
}

impl PotentialCallback for ForeignPotentialCallback {
    fn call(&self, atoms: HostHandle) {
        // SAFETY: the contract of `ForeignPotentialCallback::new`
        unsafe { (self.sub)(atoms.as_ptr()) }
    }
}

/// Registers potential callbacks and dispatches to them by index
pub struct PotentialDispatcher {
    table: CallbackTable<Arc<dyn PotentialCallback>>,
}

impl PotentialDispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: CallbackTable::new("potential callback", capacity),
        }
    }

    pub fn register_potential_callback(&mut self, callback: Box<dyn PotentialCallback>) -> Result<usize> {
        self.table.register(Arc::from(callback))
    }

    /// Shared handle to the callback registered at `index`
    pub fn callback(&self, index: i64) -> Result<Arc<dyn PotentialCallback>> {
        self.table.get(index).map(Arc::clone)
    }

    pub fn invoke_potential_callback(&self, index: i64, atoms: HostHandle) -> Result<()> {
        let callback = self.table.get(index)?;
        log::trace!("Dispatching potential callback #{}", index);
        callback.call(atoms);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }
}
