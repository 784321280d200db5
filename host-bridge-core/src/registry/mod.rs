//! Callback tables and the dispatchers built on them
//!
//! A callback table is a fixed-capacity, append-only list of callables. The
//! position at which an entry was registered is its only name: the host keeps
//! the returned index and later dispatches through it.

use crate::types::{BridgeError, Result};

pub mod constraint;
pub mod potential;

pub use constraint::{
    evaluate_constraint, ConstraintDispatcher, ConstraintEvaluator, ConstraintInput, ConstraintOutput,
    ForeignConstraint, ForeignConstraintSub,
};
pub use potential::{
    ForeignPotentialCallback, ForeignPotentialSub, PotentialCallback, PotentialDispatcher,
};

/// Fixed-capacity, append-only table addressed by registration index
pub struct CallbackTable<T> {
    /// Table name used in errors and log lines
    name: &'static str,
    capacity: usize,
    entries: Vec<T>,
}

impl<T> CallbackTable<T> {
    /// Create an empty table that will accept at most `capacity` entries
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append an entry and return its index
    ///
    /// A full table rejects the entry and is left as it was.
    pub fn register(&mut self, entry: T) -> Result<usize> {
        if self.entries.len() >= self.capacity {
            log::warn!(
                "Rejected {} registration: table full ({} entries)",
                self.name,
                self.capacity
            );
            return Err(BridgeError::CapacityExceeded {
                table: self.name,
                capacity: self.capacity,
            });
        }

        let index = self.entries.len();
        self.entries.push(entry);
        log::debug!("Registered {} #{}", self.name, index);
        Ok(index)
    }

    /// Look up the entry registered at `index`
    ///
    /// Indices are signed because the host passes them as plain integers.
    pub fn get(&self, index: i64) -> Result<&T> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .ok_or(BridgeError::InvalidIndex {
                table: self.name,
                index,
                count: self.entries.len(),
            })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }
}
