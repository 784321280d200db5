//! Generation-checked address table
//!
//! The host sometimes needs to keep an address as a plain integer, for
//! instance as a dictionary value. Instead of squeezing the address into an
//! integer, the table hands out a key that packs a slot index and a
//! generation into 64 bits. Removing an entry bumps its slot's generation, so
//! a key kept past removal resolves to an error instead of a reused address.

use crate::types::{BridgeError, HostHandle, Result};

/// Key for an address stored in an [`AddressTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressKey {
    pub index: u32,
    pub generation: u32,
}

impl AddressKey {
    /// Pack into a single integer: generation in the high half
    pub fn to_u64(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub fn from_u64(packed: u64) -> Self {
        Self {
            index: packed as u32,
            generation: (packed >> 32) as u32,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    handle: Option<HostHandle>,
}

#[derive(Debug, Default)]
pub struct AddressTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl AddressTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` and return the key that resolves to it
    pub fn insert(&mut self, handle: HostHandle) -> AddressKey {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.handle = Some(handle);
            return AddressKey {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            handle: Some(handle),
        });
        AddressKey {
            index,
            generation: 0,
        }
    }

    /// The address stored under `key`
    pub fn resolve(&self, key: AddressKey) -> Result<HostHandle> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.handle)
            .ok_or(BridgeError::StaleHandle {
                index: key.index,
                generation: key.generation,
            })
    }

    /// Drop the entry under `key`, invalidating every copy of the key
    pub fn remove(&mut self, key: AddressKey) -> Result<HostHandle> {
        let handle = self.resolve(key)?;
        let slot = &mut self.slots[key.index as usize];
        slot.handle = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_resolve() {
        let mut table = AddressTable::new();
        let a = table.insert(HostHandle::from_raw(0x1000));
        let b = table.insert(HostHandle::from_raw(0x2000));

        assert_eq!(table.resolve(a).unwrap().raw(), 0x1000);
        assert_eq!(table.resolve(b).unwrap().raw(), 0x2000);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_full_width_addresses_survive() {
        let mut table = AddressTable::new();
        let high = HostHandle::from_raw(usize::MAX - 7);
        let key = table.insert(high);
        let key = AddressKey::from_u64(key.to_u64());
        assert_eq!(table.resolve(key).unwrap(), high);
    }

    #[test]
    fn test_stale_key_after_reuse() {
        let mut table = AddressTable::new();
        let old = table.insert(HostHandle::from_raw(0x1000));
        table.remove(old).unwrap();

        let new = table.insert(HostHandle::from_raw(0x3000));
        assert_eq!(new.index, old.index);
        assert_ne!(new.generation, old.generation);

        assert_eq!(
            table.resolve(old).unwrap_err(),
            BridgeError::StaleHandle {
                index: old.index,
                generation: old.generation
            }
        );
        assert!(table.remove(old).is_err());
        assert_eq!(table.resolve(new).unwrap().raw(), 0x3000);
    }

    #[test]
    fn test_unknown_key() {
        let table = AddressTable::new();
        assert!(table.resolve(AddressKey::from_u64(5)).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_key_packing() {
        let key = AddressKey {
            index: 7,
            generation: 3,
        };
        assert_eq!(key.to_u64(), (3 << 32) | 7);
        assert_eq!(AddressKey::from_u64(key.to_u64()), key);
    }
}
