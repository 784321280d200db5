//! C ABI surface for the host runtime
//!
//! The host links against these symbols directly. Names keep the host
//! compiler's trailing-underscore convention and every scalar is passed by
//! reference, except array and string lengths, which are passed by value.
//!
//! All entry points share one process-wide [`BridgeContext`] behind a
//! read-write lock: registration takes it exclusively, lookups take it
//! shared. The lock is released before any host code runs, so a callback may
//! call back into any entry point, registration included, while it is being
//! dispatched.
//!
//! Every entry point returns a status (0 on success, see
//! [`BridgeError::status_code`]) and catches panics so none cross the
//! boundary. Registration entry points return the new index instead of 0.

use std::ffi::{c_char, c_void};
use std::os::raw::c_int;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::Lazy;

use crate::context::BridgeContext;
use crate::os::{self, AddressKey, AddressTable, CommandStatus, StackOutcome};
use crate::registry::{
    evaluate_constraint, ConstraintInput, ConstraintOutput, ForeignConstraint,
    ForeignConstraintSub, ForeignPotentialCallback, ForeignPotentialSub,
};
use crate::services::dictionary::{
    DictionaryAddKeyFn, DictionaryGetKeyFn, DictionaryGetNFn, DictionaryQueryIndexFn,
    DictionaryQueryKeyFn,
};
use crate::services::error::{ErrorAbortFn, ErrorClearStackFn, PushErrorFn, PushErrorWithInfoFn};
use crate::services::{
    host_string, DictionaryService, ErrorService, ForeignDictionaryHandlers, ForeignErrorHandlers,
};
use crate::types::{BridgeError, ErrorKind, HostHandle, RawValue, Result, ValueType};

static BRIDGE: Lazy<RwLock<BridgeContext>> = Lazy::new(|| RwLock::new(BridgeContext::default()));

static ADDRESSES: Lazy<Mutex<AddressTable>> = Lazy::new(|| Mutex::new(AddressTable::new()));

fn read_bridge() -> Result<RwLockReadGuard<'static, BridgeContext>> {
    BRIDGE.read().map_err(|_| BridgeError::RegistryPoisoned("bridge"))
}

fn write_bridge() -> Result<RwLockWriteGuard<'static, BridgeContext>> {
    BRIDGE.write().map_err(|_| BridgeError::RegistryPoisoned("bridge"))
}

/// Run `f` against the process-wide context
///
/// Lets Rust code in the same process reach the handlers and callbacks the
/// host registered through the C ABI. The shared lock is held while `f`
/// runs, so `f` must not call a registration entry point.
pub fn with_bridge<R>(f: impl FnOnce(&BridgeContext) -> R) -> Result<R> {
    Ok(f(&*read_bridge()?))
}

/// Snapshot of the error service; the lock is released on return
fn error_service() -> Result<ErrorService> {
    Ok(read_bridge()?.errors().clone())
}

/// Snapshot of the dictionary service; the lock is released on return
fn dictionary_service() -> Result<DictionaryService> {
    Ok(read_bridge()?.dictionaries().clone())
}

/// Run an entry point body, turning errors and panics into a status
fn guarded(entry: &'static str, body: impl FnOnce() -> Result<c_int>) -> c_int {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            log::warn!("{}: {}", entry, e);
            e.status_code()
        }
        Err(_) => {
            log::error!("{}: panic caught at the C boundary", entry);
            BridgeError::Panicked(entry).status_code()
        }
    }
}

fn index_status(index: usize) -> Result<c_int> {
    c_int::try_from(index).map_err(|_| BridgeError::InvalidIndex {
        table: "registration",
        index: index as i64,
        count: index,
    })
}

unsafe fn read_arg<T: Copy>(ptr: *const T, what: &'static str) -> Result<T> {
    ptr.as_ref().copied().ok_or(BridgeError::NullArgument(what))
}

unsafe fn write_arg<T>(ptr: *mut T, value: T) {
    if let Some(slot) = ptr.as_mut() {
        *slot = value;
    }
}

unsafe fn slice_arg<'a>(ptr: *const f64, len: usize, what: &'static str) -> Result<&'a [f64]> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(BridgeError::NullArgument(what));
    }
    Ok(std::slice::from_raw_parts(ptr, len))
}

unsafe fn slice_arg_mut<'a>(ptr: *mut f64, len: usize, what: &'static str) -> Result<&'a mut [f64]> {
    if len == 0 {
        return Ok(&mut []);
    }
    if ptr.is_null() {
        return Err(BridgeError::NullArgument(what));
    }
    Ok(std::slice::from_raw_parts_mut(ptr, len))
}

/// Copy `name` into a host key buffer, blank padded like host strings
unsafe fn write_key(name: &str, key: *mut c_char, key_buf_len: usize) -> usize {
    if key.is_null() || key_buf_len == 0 {
        return 0;
    }
    let buffer = std::slice::from_raw_parts_mut(key.cast::<u8>(), key_buf_len);
    let len = name.len().min(key_buf_len);
    buffer[..len].copy_from_slice(&name.as_bytes()[..len]);
    buffer[len..].fill(b' ');
    len
}

// ---------------------------------------------------------------------------
// Constraint subroutines
// ---------------------------------------------------------------------------

/// Register a constraint subroutine; returns its index
///
/// # Safety
///
/// `sub` must stay callable for the rest of the process.
#[no_mangle]
pub unsafe extern "C" fn register_constraint_sub_(sub: Option<ForeignConstraintSub>) -> c_int {
    guarded("register_constraint_sub_", || {
        let sub = sub.ok_or(BridgeError::NullArgument("constraint subroutine"))?;
        let index = write_bridge()?.register_constraint(Box::new(ForeignConstraint::new(sub)))?;
        index_status(index)
    })
}

/// Evaluate constraint `*i`
///
/// `pos` and `velo` hold `n_pos` values, `data` holds `n_data`, and the
/// gradient buffer `dc_dr` holds `n_dc_dr`, which must equal `n_pos`.
///
/// # Safety
///
/// Every non-null pointer must be valid for the length given with it.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn call_constraint_sub_(
    i: *const c_int,
    pos: *const f64,
    velo: *const f64,
    t: *const f64,
    data: *const f64,
    c: *mut f64,
    dc_dr: *mut f64,
    dc_dt: *mut f64,
    n_pos: usize,
    n_data: usize,
    n_dc_dr: usize,
) -> c_int {
    guarded("call_constraint_sub_", || {
        let index = read_arg(i, "constraint index")?;
        let input = ConstraintInput {
            pos: slice_arg(pos, n_pos, "pos")?,
            velo: slice_arg(velo, n_pos, "velo")?,
            t: read_arg(t, "t")?,
            data: slice_arg(data, n_data, "data")?,
        };
        let mut output = ConstraintOutput::new(slice_arg_mut(dc_dr, n_dc_dr, "dC_dr")?);

        let evaluator = read_bridge()?.constraints().evaluator(i64::from(index))?;
        evaluate_constraint(evaluator.as_ref(), &input, &mut output)?;

        write_arg(c, output.c);
        write_arg(dc_dt, output.dc_dt);
        Ok(0)
    })
}

// ---------------------------------------------------------------------------
// Potential callbacks
// ---------------------------------------------------------------------------

/// Register a potential callback; returns its index
///
/// # Safety
///
/// `sub` must stay callable for the rest of the process.
#[no_mangle]
pub unsafe extern "C" fn register_callbackpot_sub_(sub: Option<ForeignPotentialSub>) -> c_int {
    guarded("register_callbackpot_sub_", || {
        let sub = sub.ok_or(BridgeError::NullArgument("potential callback"))?;
        let index =
            write_bridge()?.register_potential_callback(Box::new(ForeignPotentialCallback::new(sub)))?;
        index_status(index)
    })
}

/// Run potential callback `*i` on the configuration behind `atoms`
///
/// # Safety
///
/// `i` must be valid to read; `atoms` is passed through untouched.
#[no_mangle]
pub unsafe extern "C" fn call_callbackpot_sub_(i: *const c_int, atoms: *mut c_void) -> c_int {
    guarded("call_callbackpot_sub_", || {
        let index = read_arg(i, "callback index")?;
        let callback = read_bridge()?.potentials().callback(i64::from(index))?;
        callback.call(HostHandle::from_ptr(atoms));
        Ok(0)
    })
}

// ---------------------------------------------------------------------------
// Error domain
// ---------------------------------------------------------------------------

/// Install the host's error handlers, replacing any previous set
///
/// # Safety
///
/// See [`ForeignErrorHandlers::new`].
#[no_mangle]
pub unsafe extern "C" fn c_error_register_functions_(
    push_with_info: Option<PushErrorWithInfoFn>,
    push: Option<PushErrorFn>,
    abort: Option<ErrorAbortFn>,
    clear_stack: Option<ErrorClearStackFn>,
) -> c_int {
    guarded("c_error_register_functions_", || {
        let handlers = ForeignErrorHandlers::new(
            push_with_info.ok_or(BridgeError::NullArgument("push_error_with_info"))?,
            push.ok_or(BridgeError::NullArgument("push_error"))?,
            abort.ok_or(BridgeError::NullArgument("error_abort"))?,
            clear_stack.ok_or(BridgeError::NullArgument("error_clear_stack"))?,
        );
        write_bridge()?.register_error_handlers(Arc::new(handlers));
        Ok(0)
    })
}

/// # Safety
///
/// `message` and `info` must be valid for their lengths; `kind` and `line`
/// must be valid to read.
#[no_mangle]
pub unsafe extern "C" fn c_push_error_with_info_(
    message: *const c_char,
    info: *const c_char,
    kind: *const c_int,
    line: *const c_int,
    message_len: usize,
    info_len: usize,
) -> c_int {
    guarded("c_push_error_with_info_", || {
        let message = host_string(message.cast(), message_len);
        let info = host_string(info.cast(), info_len);
        let kind = ErrorKind::from(read_arg(kind, "error kind")?);
        let line = read_arg(line, "line")?;
        error_service()?.push_with_info(&message, &info, kind, line)?;
        Ok(0)
    })
}

/// # Safety
///
/// `message` must be valid for `message_len` bytes; `kind` and `line` must
/// be valid to read.
#[no_mangle]
pub unsafe extern "C" fn c_push_error_(
    message: *const c_char,
    kind: *const c_int,
    line: *const c_int,
    message_len: usize,
) -> c_int {
    guarded("c_push_error_", || {
        let message = host_string(message.cast(), message_len);
        let kind = ErrorKind::from(read_arg(kind, "error kind")?);
        let line = read_arg(line, "line")?;
        error_service()?.push(&message, kind, line)?;
        Ok(0)
    })
}

/// # Safety
///
/// `kind` must be valid to read.
#[no_mangle]
pub unsafe extern "C" fn c_error_abort_(kind: *const c_int) -> c_int {
    guarded("c_error_abort_", || {
        let kind = ErrorKind::from(read_arg(kind, "error kind")?);
        error_service()?.abort_on_error(kind)?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn c_error_clear_stack_() -> c_int {
    guarded("c_error_clear_stack_", || {
        error_service()?.clear_stack()?;
        Ok(0)
    })
}

// ---------------------------------------------------------------------------
// Dictionary domain
// ---------------------------------------------------------------------------

/// Install the host's dictionary handlers, replacing any previous set
///
/// # Safety
///
/// See [`ForeignDictionaryHandlers::new`].
#[no_mangle]
pub unsafe extern "C" fn c_dictionary_register_functions_(
    get_n: Option<DictionaryGetNFn>,
    get_key: Option<DictionaryGetKeyFn>,
    query_key: Option<DictionaryQueryKeyFn>,
    query_index: Option<DictionaryQueryIndexFn>,
    add_key: Option<DictionaryAddKeyFn>,
) -> c_int {
    guarded("c_dictionary_register_functions_", || {
        let handlers = ForeignDictionaryHandlers::new(
            get_n.ok_or(BridgeError::NullArgument("dictionary_get_n"))?,
            get_key.ok_or(BridgeError::NullArgument("dictionary_get_key"))?,
            query_key.ok_or(BridgeError::NullArgument("dictionary_query_key"))?,
            query_index.ok_or(BridgeError::NullArgument("dictionary_query_index"))?,
            add_key.ok_or(BridgeError::NullArgument("dictionary_add_key"))?,
        );
        write_bridge()?.register_dictionary_handlers(Arc::new(handlers));
        Ok(0)
    })
}

/// # Safety
///
/// `n` must be valid to write or null.
#[no_mangle]
pub unsafe extern "C" fn c_dictionary_get_n_(dict: *mut c_void, n: *mut c_int) -> c_int {
    guarded("c_dictionary_get_n_", || {
        let count = dictionary_service()?.get_n(HostHandle::from_ptr(dict))?;
        write_arg(n, c_int::try_from(count).unwrap_or(c_int::MAX));
        Ok(0)
    })
}

/// Name of key `*i` (0-based); `*error` is 0 if found, 1 otherwise
///
/// # Safety
///
/// `key` must be valid for `key_buf_len` bytes; the other pointers must be
/// valid to read or write, or null.
#[no_mangle]
pub unsafe extern "C" fn c_dictionary_get_key_(
    dict: *mut c_void,
    i: *const c_int,
    key: *mut c_char,
    key_len: *mut c_int,
    error: *mut c_int,
    key_buf_len: usize,
) -> c_int {
    guarded("c_dictionary_get_key_", || {
        let index = usize::try_from(read_arg(i, "key index")?).unwrap_or(usize::MAX);
        match dictionary_service()?.get_key(HostHandle::from_ptr(dict), index)? {
            Some(name) => {
                let written = write_key(&name, key, key_buf_len);
                write_arg(key_len, written as c_int);
                write_arg(error, 0);
            }
            None => write_arg(error, 1),
        }
        Ok(0)
    })
}

/// Look up `key`; `*error` is 0 if found, 1 otherwise
///
/// # Safety
///
/// `key` must be valid for `key_len` bytes, `shape` for two ints; the other
/// pointers must be valid to write or null.
#[no_mangle]
pub unsafe extern "C" fn c_dictionary_query_key_(
    dict: *mut c_void,
    key: *const c_char,
    value_type: *mut c_int,
    shape: *mut c_int,
    data: *mut *mut c_void,
    error: *mut c_int,
    key_len: usize,
) -> c_int {
    guarded("c_dictionary_query_key_", || {
        let name = host_string(key.cast(), key_len);
        let found = dictionary_service()?
            .query_key(HostHandle::from_ptr(dict), &name)?;
        write_value(found, value_type, shape, data, error);
        Ok(0)
    })
}

/// Key name and value at index `*i` (0-based)
///
/// # Safety
///
/// As [`c_dictionary_query_key_`], with `key` valid for `key_buf_len` bytes.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn c_dictionary_query_index_(
    dict: *mut c_void,
    i: *const c_int,
    key: *mut c_char,
    value_type: *mut c_int,
    shape: *mut c_int,
    data: *mut *mut c_void,
    error: *mut c_int,
    key_buf_len: usize,
) -> c_int {
    guarded("c_dictionary_query_index_", || {
        let index = usize::try_from(read_arg(i, "key index")?).unwrap_or(usize::MAX);
        let found = dictionary_service()?
            .query_index(HostHandle::from_ptr(dict), index)?;
        let value = found.map(|(name, value)| {
            write_key(&name, key, key_buf_len);
            value
        });
        write_value(value, value_type, shape, data, error);
        Ok(0)
    })
}

unsafe fn write_value(
    value: Option<RawValue>,
    value_type: *mut c_int,
    shape: *mut c_int,
    data: *mut *mut c_void,
    error: *mut c_int,
) {
    match value {
        Some(value) => {
            write_arg(value_type, c_int::from(value.value_type));
            if !shape.is_null() {
                *shape = value.shape[0];
                *shape.add(1) = value.shape[1];
            }
            write_arg(data, value.data);
            write_arg(error, 0);
        }
        None => write_arg(error, 1),
    }
}

/// Store a value under `key`; `*error` is 0 if the host accepted it
///
/// # Safety
///
/// `key` must be valid for `key_len` bytes, `shape` for two ints or null.
#[no_mangle]
pub unsafe extern "C" fn c_dictionary_add_key_(
    dict: *mut c_void,
    key: *const c_char,
    value_type: *const c_int,
    shape: *const c_int,
    data: *mut c_void,
    error: *mut c_int,
    key_len: usize,
) -> c_int {
    guarded("c_dictionary_add_key_", || {
        let name = host_string(key.cast(), key_len);
        let value_type = ValueType::from(read_arg(value_type, "value type")?);
        let shape = if shape.is_null() {
            [0, 0]
        } else {
            [*shape, *shape.add(1)]
        };
        let value = RawValue::array(value_type, shape, data);
        let added = dictionary_service()?
            .add_key(HostHandle::from_ptr(dict), &name, value)?;
        write_arg(error, if added { 0 } else { 1 });
        Ok(0)
    })
}

// ---------------------------------------------------------------------------
// OS utilities
// ---------------------------------------------------------------------------

/// 1 if `*r` is NaN, 0 otherwise (including a null `r`)
///
/// # Safety
///
/// `r` must be valid to read or null.
#[no_mangle]
pub unsafe extern "C" fn fisnan_(r: *const f64) -> c_int {
    r.as_ref().map_or(0, |r| os::is_nan(*r) as c_int)
}

#[no_mangle]
pub extern "C" fn fabort_() -> ! {
    os::abort("abort requested by host")
}

/// Run a shell command of `len` bytes; `*status` receives the raw status
///
/// Commands longer than the configured buffer are cut to it.
///
/// # Safety
///
/// `command` must be valid for `len` bytes; `status` must be valid to write
/// or null.
#[no_mangle]
pub unsafe extern "C" fn system_command_(command: *const c_char, status: *mut c_int, len: c_int) {
    let code = guarded("system_command_", || {
        if command.is_null() {
            return Err(BridgeError::NullArgument("command"));
        }
        let buffer_len = read_bridge()?.config().command_buffer_len;
        let len = usize::try_from(len).unwrap_or(0);
        // Never read past what the buffer could hold
        let bytes = std::slice::from_raw_parts(command.cast::<u8>(), len.min(buffer_len));
        command_status(os::run_command(bytes, buffer_len))
    });
    write_arg(status, code);
}

/// Status written back by `system_command_`
///
/// A failed `system` call reports -1, as `system` itself does, rather than
/// an errno that would read as a wait status.
fn command_status(result: Result<CommandStatus>) -> Result<c_int> {
    match result {
        Ok(status) => Ok(status.raw()),
        Err(BridgeError::PlatformError { operation, code }) => {
            log::warn!("system_command_: {} failed with errno {}", operation, code);
            Ok(-1)
        }
        Err(e) => Err(e),
    }
}

/// Status returned by `c_increase_stack_`: 0, or the hard limit saturated to `c_int`
fn stack_status(outcome: StackOutcome) -> c_int {
    c_int::try_from(outcome.status_code()).unwrap_or(c_int::MAX)
}

/// Raise the stack soft limit to `*stack_size` bytes
///
/// Returns 0 on success, the hard limit if the request exceeds it, or the
/// platform error code.
///
/// # Safety
///
/// `stack_size` must be valid to read.
#[no_mangle]
pub unsafe extern "C" fn c_increase_stack_(stack_size: *const c_int) -> c_int {
    guarded("c_increase_stack_", || {
        let requested = u64::try_from(read_arg(stack_size, "stack size")?).unwrap_or(0);
        Ok(stack_status(os::increase_stack(requested)?))
    })
}

/// Total and free physical memory in bytes; free is -1 when unknown
///
/// # Safety
///
/// Both pointers must be valid to write or null.
#[no_mangle]
pub unsafe extern "C" fn mem_info_(total_mem: *mut f64, free_mem: *mut f64) -> c_int {
    guarded("mem_info_", || {
        let info = os::mem_info()?;
        write_arg(total_mem, info.total as f64);
        write_arg(free_mem, info.free.map_or(-1.0, |free| free as f64));
        Ok(0)
    })
}

/// The address `p` as a full-width integer
#[no_mangle]
pub extern "C" fn pointer_to_(p: *mut c_void) -> isize {
    p as isize
}

/// Store `p` in the address table and return its packed key
#[no_mangle]
pub extern "C" fn c_address_key_(p: *mut c_void) -> u64 {
    match ADDRESSES.lock() {
        Ok(mut table) => table.insert(HostHandle::from_ptr(p)).to_u64(),
        Err(_) => {
            log::error!("c_address_key_: address table poisoned");
            u64::MAX
        }
    }
}

/// Resolve a key from [`c_address_key_`] into `*p`
///
/// # Safety
///
/// `p` must be valid to write or null.
#[no_mangle]
pub unsafe extern "C" fn c_address_resolve_(key: u64, p: *mut *mut c_void) -> c_int {
    guarded("c_address_resolve_", || {
        let table = ADDRESSES
            .lock()
            .map_err(|_| BridgeError::RegistryPoisoned("address table"))?;
        let handle = table.resolve(AddressKey::from_u64(key))?;
        write_arg(p, handle.as_ptr());
        Ok(0)
    })
}

/// Release a key from [`c_address_key_`]; later lookups with it fail
#[no_mangle]
pub extern "C" fn c_address_release_(key: u64) -> c_int {
    guarded("c_address_release_", || {
        let mut table = ADDRESSES
            .lock()
            .map_err(|_| BridgeError::RegistryPoisoned("address table"))?;
        table.remove(AddressKey::from_u64(key))?;
        Ok(0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_status_reports_hard_limit() {
        let over = StackOutcome::ExceedsHardLimit { hard: 64 << 20 };
        assert_eq!(stack_status(over), 64 << 20);

        let raised = StackOutcome::Raised { from: 1, to: 2 };
        assert_eq!(stack_status(raised), 0);

        // An unlimited hard limit does not fit a C int
        let huge = StackOutcome::ExceedsHardLimit { hard: u64::MAX };
        assert_eq!(stack_status(huge), c_int::MAX);
    }

    #[test]
    fn test_failed_system_call_reports_minus_one() {
        let failed = Err(BridgeError::PlatformError {
            operation: "system",
            code: 12,
        });
        assert_eq!(command_status(failed), Ok(-1));

        let exited = CommandStatus::from_raw(3 << 8);
        assert_eq!(command_status(Ok(exited)), Ok(3 << 8));

        let null = Err(BridgeError::NullArgument("command"));
        assert_eq!(command_status(null), Err(BridgeError::NullArgument("command")));
    }
}
