// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Native-callable trampolines back into managed callables.

pub mod ffi;
pub mod registry;
pub mod trampoline;

pub use ffi::cdata_callback_dispatch;
pub use registry::CallbackRegistry;
pub use trampoline::{CallbackId, DispatchFn, ThunkRecord, Trampoline};
