//! Host Bridge Library
//!
//! Interoperability layer between a numerical host runtime and the logic it
//! cannot express itself: callbacks supplied from elsewhere, service handlers
//! living on the other side of a C ABI, and a handful of operating-system
//! calls.
//!
//! # Architecture
//!
//! - Two callback tables (constraint subroutines and potential callbacks),
//!   append-only and addressed by registration index
//! - Two service registries (error reporting and dictionary access), each a
//!   single replaceable handler set
//! - OS utilities: stack limit, memory info, shell commands, NaN test, abort
//! - A C ABI surface ([`ffi`]) over a process-wide context for the host
//!
//! The library does NOT:
//! - Implement the numerical algorithms behind the callbacks
//! - Interpret dictionary values or error messages
//!
//! # Example Usage
//!
//! ```
//! use host_bridge_core::{BridgeConfig, BridgeContext, ConstraintInput, ConstraintOutput};
//!
//! fn sphere(input: &ConstraintInput<'_>, output: &mut ConstraintOutput<'_>) {
//!     let r2: f64 = input.pos.iter().map(|x| x * x).sum();
//!     output.c = r2 - input.data[0] * input.data[0];
//!     for (g, x) in output.dc_dr.iter_mut().zip(input.pos) {
//!         *g = 2.0 * x;
//!     }
//!     output.dc_dt = 0.0;
//! }
//!
//! let mut bridge = BridgeContext::new(BridgeConfig::new());
//! let index = bridge.register_constraint(Box::new(sphere)).unwrap();
//!
//! let pos = [1.0, 2.0, 2.0];
//! let mut grad = [0.0; 3];
//! let mut output = ConstraintOutput::new(&mut grad);
//! let input = ConstraintInput { pos: &pos, velo: &pos, t: 0.0, data: &[3.0] };
//! bridge.invoke_constraint(index as i64, &input, &mut output).unwrap();
//! assert_eq!(output.c, 0.0);
//! ```

// Public modules
pub mod config;
pub mod context;
pub mod ffi;
pub mod os;
pub mod registry;
pub mod services;
pub mod types;

// Re-export main types for convenience
pub use config::BridgeConfig;
pub use context::BridgeContext;
pub use registry::{
    CallbackTable, ConstraintDispatcher, ConstraintEvaluator, ConstraintInput, ConstraintOutput,
    PotentialCallback, PotentialDispatcher,
};
pub use services::{DictionaryHandlers, DictionaryService, ErrorHandlers, ErrorService};
pub use types::{
    BridgeError, ErrorKind, HostHandle, RawValue, Result, ServiceDomain, ValueType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: a fresh context has nothing registered
        let bridge = BridgeContext::default();
        assert!(bridge.constraints().is_empty());
        assert!(bridge.potentials().is_empty());
        assert!(!bridge.errors().is_registered());
        assert!(!bridge.dictionaries().is_registered());
    }
}
