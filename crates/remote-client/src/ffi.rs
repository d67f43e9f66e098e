// SPDX-License-Identifier: MIT
//
// Thin `extern "C"` surface over `Client` (§4.4 "the FFI surface lives in a
// thin `ffi.rs` module that only does pointer/string marshalling and
// delegates to the safe `ClientState` type"). A host `dlopen`s the `cdylib`
// build and resolves these symbols by name.

use std::ffi::{c_char, CStr};
use std::path::PathBuf;

use remote_protocol::Status;

use crate::client::Client;

/// Opaque handle returned to the host; never dereferenced by the caller.
pub struct RemoteHandle(Client);

type HostLoggerFn = extern "C" fn(category: i32, message: *const c_char);

/// Copies a caller-owned C string into an owned `PathBuf`. The source
/// pointer only needs to stay valid for the duration of this call.
unsafe fn path_from_c(ptr: *const c_char) -> Option<PathBuf> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(PathBuf::from)
}

/// Creates a new client in the `New` phase. `logger` is called once per
/// accumulated server log line, forwarding the reply status as `category`
/// (§6 "the client forwards server log lines to it with severity matching
/// the reply status").
///
/// # Safety
/// `logger` must be a valid, ABI-stable function pointer for the lifetime
/// of the returned handle.
#[no_mangle]
pub unsafe extern "C" fn remote_client_create(logger: HostLoggerFn) -> *mut RemoteHandle {
    let boxed_logger = Box::new(move |status: Status, message: &str| {
        if let Ok(c_message) = std::ffi::CString::new(message) {
            logger(status.into(), c_message.as_ptr());
        }
    });
    Box::into_raw(Box::new(RemoteHandle(Client::new(boxed_logger))))
}

/// # Safety
/// `handle` must be a live pointer returned by `remote_client_create` and
/// not yet destroyed; `resource_location`, `module_root`, and `identifier`
/// must be valid null-terminated UTF-8 C strings.
#[no_mangle]
pub unsafe extern "C" fn remote_client_instantiate(
    handle: *mut RemoteHandle,
    resource_location: *const c_char,
    module_root: *const c_char,
    identifier: *const c_char,
) -> i32 {
    let handle = match handle.as_mut() {
        Some(h) => h,
        None => return Status::Error as i32,
    };
    let (Some(resource_location), Some(module_root)) =
        (path_from_c(resource_location), path_from_c(module_root))
    else {
        return Status::Error as i32;
    };
    let identifier = match CStr::from_ptr(identifier).to_str() {
        Ok(s) => s,
        Err(_) => return Status::Error as i32,
    };

    match handle.0.instantiate(&resource_location, &module_root, identifier) {
        Ok(()) => Status::Ok as i32,
        Err(_) => Status::Error as i32,
    }
}

/// # Safety
/// `handle` must be a live pointer returned by `remote_client_create`.
#[no_mangle]
pub unsafe extern "C" fn remote_client_get_real(handle: *mut RemoteHandle, vr: u32, out: *mut f64) -> i32 {
    let handle = match handle.as_ref() {
        Some(h) => h,
        None => return Status::Error as i32,
    };
    match handle.0.get_real(vr) {
        Some(value) => {
            if !out.is_null() {
                *out = value;
            }
            Status::Ok as i32
        }
        None => Status::Error as i32,
    }
}

/// # Safety
/// `handle` must be a live pointer returned by `remote_client_create`.
#[no_mangle]
pub unsafe extern "C" fn remote_client_set_real(handle: *mut RemoteHandle, vr: u32, value: f64) -> i32 {
    match handle.as_mut() {
        Some(h) if h.0.set_real(vr, value) => Status::Ok as i32,
        _ => Status::Error as i32,
    }
}

/// # Safety
/// `handle` must be a live pointer returned by `remote_client_create`.
#[no_mangle]
pub unsafe extern "C" fn remote_client_do_step(
    handle: *mut RemoteHandle,
    current_time: f64,
    step_size: f64,
) -> i32 {
    let handle = match handle.as_mut() {
        Some(h) => h,
        None => return Status::Error as i32,
    };
    match handle.0.do_step(current_time, step_size) {
        Ok(()) => Status::Ok as i32,
        Err(_) => Status::Error as i32,
    }
}

/// # Safety
/// `handle` must be a live pointer returned by `remote_client_create`; the
/// pointer is consumed and must not be used again after this call.
#[no_mangle]
pub unsafe extern "C" fn remote_client_free_instance(handle: *mut RemoteHandle) -> i32 {
    if handle.is_null() {
        return Status::Error as i32;
    }
    let mut boxed = Box::from_raw(handle);
    let result = boxed.0.free_instance();
    drop(boxed);
    match result {
        Ok(()) => Status::Ok as i32,
        Err(_) => Status::Error as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop_logger(_category: i32, _message: *const c_char) {}

    #[test]
    fn create_and_free_round_trips_through_raw_pointers() {
        unsafe {
            let handle = remote_client_create(noop_logger);
            assert!(!handle.is_null());
            // A fresh handle is in `New` phase, so `FreeInstance` is a
            // harmless transition rather than an RPC attempt.
            assert_eq!(remote_client_free_instance(handle), Status::Ok as i32);
        }
    }

    #[test]
    fn null_handle_operations_report_error_without_crashing() {
        unsafe {
            assert_eq!(remote_client_get_real(std::ptr::null_mut(), 0, std::ptr::null_mut()), Status::Error as i32);
            assert_eq!(remote_client_set_real(std::ptr::null_mut(), 0, 1.0), Status::Error as i32);
            assert_eq!(remote_client_do_step(std::ptr::null_mut(), 0.0, 0.1), Status::Error as i32);
            assert_eq!(remote_client_free_instance(std::ptr::null_mut()), Status::Error as i32);
        }
    }

    #[test]
    fn get_real_on_unconfigured_handle_reports_error() {
        unsafe {
            let handle = remote_client_create(noop_logger);
            let mut out = 0.0;
            assert_eq!(remote_client_get_real(handle, 0, &mut out), Status::Error as i32);
            remote_client_free_instance(handle);
        }
    }
}
