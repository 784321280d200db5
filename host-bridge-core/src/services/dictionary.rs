//! Dictionary-domain service registry
//!
//! Dictionaries are host objects reached through a [`HostHandle`]. Values come
//! back as [`RawValue`]s (type tag, shape, pointer) and are never read here.

use std::ffi::{c_char, c_void};
use std::os::raw::c_int;
use std::sync::Arc;

use super::host_string;
use crate::types::{BridgeError, HostHandle, RawValue, Result, ServiceDomain, ValueType};

/// Size of the buffer host key names are written into
pub const KEY_BUFFER_LEN: usize = 1024;

/// Handler set for the dictionary domain
///
/// Indices are 0-based.
pub trait DictionaryHandlers: Send + Sync {
    /// Number of keys in the dictionary
    fn get_n(&self, dict: HostHandle) -> usize;

    /// Name of the key at `index`, `None` if there is no such key
    fn get_key(&self, dict: HostHandle, index: usize) -> Option<String>;

    /// Value stored under `key`, `None` if absent
    fn query_key(&self, dict: HostHandle, key: &str) -> Option<RawValue>;

    /// Key name and value at `index`, `None` if out of range
    fn query_index(&self, dict: HostHandle, index: usize) -> Option<(String, RawValue)>;

    /// Store `value` under `key`; false if the host refused it
    fn add_key(&self, dict: HostHandle, key: &str, value: RawValue) -> bool;
}

pub type DictionaryGetNFn = unsafe extern "C" fn(dict: *mut c_void, n: *mut c_int);
pub type DictionaryGetKeyFn = unsafe extern "C" fn(
    dict: *mut c_void,
    index: *const c_int,
    key: *mut c_char,
    key_len: *mut c_int,
    error: *mut c_int,
    key_buf_len: usize,
);
pub type DictionaryQueryKeyFn = unsafe extern "C" fn(
    dict: *mut c_void,
    key: *const c_char,
    value_type: *mut c_int,
    shape: *mut c_int,
    data: *mut *mut c_void,
    error: *mut c_int,
    key_len: usize,
);
pub type DictionaryQueryIndexFn = unsafe extern "C" fn(
    dict: *mut c_void,
    index: *const c_int,
    key: *mut c_char,
    value_type: *mut c_int,
    shape: *mut c_int,
    data: *mut *mut c_void,
    error: *mut c_int,
    key_buf_len: usize,
);
pub type DictionaryAddKeyFn = unsafe extern "C" fn(
    dict: *mut c_void,
    key: *const c_char,
    value_type: *const c_int,
    shape: *const c_int,
    data: *mut c_void,
    error: *mut c_int,
    key_len: usize,
);

/// Dictionary handlers living on the host side of the C ABI
///
/// The host counts keys from 1 and reports failure through an error flag
/// (0 = success).
#[derive(Debug, Clone, Copy)]
pub struct ForeignDictionaryHandlers {
    get_n: DictionaryGetNFn,
    get_key: DictionaryGetKeyFn,
    query_key: DictionaryQueryKeyFn,
    query_index: DictionaryQueryIndexFn,
    add_key: DictionaryAddKeyFn,
}

impl ForeignDictionaryHandlers {
    /// # Safety
    ///
    /// All five pointers must stay callable for the rest of the process, must
    /// write at most `key_buf_len` bytes of key name and at most two shape
    /// entries.
    pub unsafe fn new(
        get_n: DictionaryGetNFn,
        get_key: DictionaryGetKeyFn,
        query_key: DictionaryQueryKeyFn,
        query_index: DictionaryQueryIndexFn,
        add_key: DictionaryAddKeyFn,
    ) -> Self {
        Self {
            get_n,
            get_key,
            query_key,
            query_index,
            add_key,
        }
    }
}

fn host_index(index: usize) -> Option<c_int> {
    c_int::try_from(index).ok()?.checked_add(1)
}

impl DictionaryHandlers for ForeignDictionaryHandlers {
    fn get_n(&self, dict: HostHandle) -> usize {
        let mut n: c_int = 0;
        // SAFETY: the contract of `ForeignDictionaryHandlers::new`
        unsafe { (self.get_n)(dict.as_ptr(), &mut n) };
        usize::try_from(n).unwrap_or(0)
    }

    fn get_key(&self, dict: HostHandle, index: usize) -> Option<String> {
        let index = host_index(index)?;
        let mut key = [0u8; KEY_BUFFER_LEN];
        let mut key_len: c_int = 0;
        let mut error: c_int = 0;
        // SAFETY: the contract of `ForeignDictionaryHandlers::new`
        unsafe {
            (self.get_key)(
                dict.as_ptr(),
                &index,
                key.as_mut_ptr().cast(),
                &mut key_len,
                &mut error,
                key.len(),
            )
        };
        if error != 0 {
            return None;
        }
        let len = usize::try_from(key_len).unwrap_or(0).min(key.len());
        // SAFETY: `len` is bounded by the local buffer
        Some(unsafe { host_string(key.as_ptr(), len) })
    }

    fn query_key(&self, dict: HostHandle, key: &str) -> Option<RawValue> {
        let mut value_type: c_int = 0;
        let mut shape: [c_int; 2] = [0, 0];
        let mut data: *mut c_void = std::ptr::null_mut();
        let mut error: c_int = 0;
        // SAFETY: the contract of `ForeignDictionaryHandlers::new`
        unsafe {
            (self.query_key)(
                dict.as_ptr(),
                key.as_ptr().cast(),
                &mut value_type,
                shape.as_mut_ptr(),
                &mut data,
                &mut error,
                key.len(),
            )
        };
        (error == 0).then(|| RawValue::array(ValueType::from(value_type), shape, data))
    }

    fn query_index(&self, dict: HostHandle, index: usize) -> Option<(String, RawValue)> {
        let index = host_index(index)?;
        let mut key = [0u8; KEY_BUFFER_LEN];
        let mut value_type: c_int = 0;
        let mut shape: [c_int; 2] = [0, 0];
        let mut data: *mut c_void = std::ptr::null_mut();
        let mut error: c_int = 0;
        // SAFETY: the contract of `ForeignDictionaryHandlers::new`
        unsafe {
            (self.query_index)(
                dict.as_ptr(),
                &index,
                key.as_mut_ptr().cast(),
                &mut value_type,
                shape.as_mut_ptr(),
                &mut data,
                &mut error,
                key.len(),
            )
        };
        if error != 0 {
            return None;
        }
        // SAFETY: the buffer is local and fully initialised
        let name = unsafe { host_string(key.as_ptr(), key.len()) };
        Some((name, RawValue::array(ValueType::from(value_type), shape, data)))
    }

    fn add_key(&self, dict: HostHandle, key: &str, value: RawValue) -> bool {
        let value_type = c_int::from(value.value_type);
        let mut error: c_int = 0;
        // SAFETY: the contract of `ForeignDictionaryHandlers::new`
        unsafe {
            (self.add_key)(
                dict.as_ptr(),
                key.as_ptr().cast(),
                &value_type,
                value.shape.as_ptr(),
                value.data,
                &mut error,
                key.len(),
            )
        };
        error == 0
    }
}

/// Single-slot registry for the dictionary domain
///
/// Cloning shares the installed handler set.
#[derive(Clone, Default)]
pub struct DictionaryService {
    handlers: Option<Arc<dyn DictionaryHandlers>>,
}

impl DictionaryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler set, replacing any previous one
    pub fn register_dictionary_handlers(&mut self, handlers: Arc<dyn DictionaryHandlers>) {
        if self.handlers.replace(handlers).is_some() {
            log::warn!("Replacing previously registered dictionary handlers");
        } else {
            log::debug!("Registered dictionary handlers");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.handlers.is_some()
    }

    /// The current handler set
    pub fn handlers(&self) -> Result<Arc<dyn DictionaryHandlers>> {
        self.handlers
            .clone()
            .ok_or(BridgeError::ServiceNotRegistered(ServiceDomain::Dictionary))
    }

    pub fn get_n(&self, dict: HostHandle) -> Result<usize> {
        Ok(self.handlers()?.get_n(dict))
    }

    pub fn get_key(&self, dict: HostHandle, index: usize) -> Result<Option<String>> {
        Ok(self.handlers()?.get_key(dict, index))
    }

    pub fn query_key(&self, dict: HostHandle, key: &str) -> Result<Option<RawValue>> {
        Ok(self.handlers()?.query_key(dict, key))
    }

    pub fn query_index(&self, dict: HostHandle, index: usize) -> Result<Option<(String, RawValue)>> {
        Ok(self.handlers()?.query_index(dict, index))
    }

    pub fn add_key(&self, dict: HostHandle, key: &str, value: RawValue) -> Result<bool> {
        Ok(self.handlers()?.add_key(dict, key, value))
    }

    /// All key names of `dict`, in index order
    pub fn keys(&self, dict: HostHandle) -> Result<Vec<String>> {
        let handlers = self.handlers()?;
        let n = handlers.get_n(dict);
        Ok((0..n).filter_map(|i| handlers.get_key(dict, i)).collect())
    }
}
