//! Operating-system utilities the host runtime cannot reach portably
//!
//! Most functions here wrap a single platform call. [`AddressTable`] is the
//! exception: it keeps host addresses behind integer keys.

pub mod abort;
pub mod command;
pub mod float;
pub mod handle;
pub mod memory;
pub mod stack;

pub use abort::abort;
pub use command::{run_command, CommandStatus};
pub use float::is_nan;
pub use handle::{AddressKey, AddressTable};
pub use memory::{mem_info, MemoryInfo};
pub use stack::{increase_stack, stack_limits, StackLimits, StackOutcome};
