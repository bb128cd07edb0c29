// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! C entry point into registered trampolines.

use super::registry::CallbackRegistry;
use super::trampoline::CallbackId;
use crate::config::{CALLBACK_STATUS_FAILED, CALLBACK_STATUS_OK, CALLBACK_STATUS_UNKNOWN};
use std::panic::{self, AssertUnwindSafe};

/// Invoke trampoline `id` from native code.
///
/// Returns [`CALLBACK_STATUS_OK`], [`CALLBACK_STATUS_FAILED`] when the
/// callable failed (the result slot is zeroed), or
/// [`CALLBACK_STATUS_UNKNOWN`] for an unknown id or null slot pointers.
///
/// # Safety
///
/// - `args` points to `nargs` pointers; the first `n` of them (for `n`
///   declared arguments) point to the native bytes of one argument each,
///   sized by the declared argument type
/// - `ret` points to `ret_len` writable bytes, or is null with `ret_len == 0`
/// - none of these regions is written by another thread during the call
#[no_mangle]
pub unsafe extern "C" fn cdata_callback_dispatch(
    id: CallbackId,
    args: *const *const u8,
    nargs: usize,
    ret: *mut u8,
    ret_len: usize,
) -> i32 {
    if (args.is_null() && nargs > 0) || (ret.is_null() && ret_len > 0) {
        return CALLBACK_STATUS_UNKNOWN;
    }
    let Some(trampoline) = CallbackRegistry::global().get(id) else {
        log::error!("[callback] native call to unknown callback #{}", id);
        return CALLBACK_STATUS_UNKNOWN;
    };

    let pointers: &[*const u8] = if nargs == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(args, nargs)
    };
    let mut slots = Vec::with_capacity(trampoline.arg_types().len());
    for (ptr, ty) in pointers.iter().zip(trampoline.arg_types()) {
        if ptr.is_null() {
            return CALLBACK_STATUS_UNKNOWN;
        }
        slots.push(std::slice::from_raw_parts(*ptr, ty.size() as usize));
    }
    let ret_slot: &mut [u8] = if ret_len == 0 {
        &mut []
    } else {
        std::slice::from_raw_parts_mut(ret, ret_len)
    };

    // unwinding across the C boundary is undefined
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| trampoline.invoke(&slots, ret_slot)));
    match outcome {
        Ok(Ok(())) => CALLBACK_STATUS_OK,
        Ok(Err(_)) => CALLBACK_STATUS_FAILED,
        Err(_) => {
            log::error!("[callback] #{} panicked outside the callable", id);
            CALLBACK_STATUS_FAILED
        }
    }
}
