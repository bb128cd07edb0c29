// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! cdata configuration - single source of truth for ABI constants.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: compile-time ABI constants (pointer size, storage alignment)
//! - **Level 2 (Dynamic)**: [`RuntimeConfig`], swapped atomically inside a
//!   [`Context`](crate::Context) and optionally loaded from YAML
//!
//! # Example
//!
//! ```rust
//! use cdata::config::{CallbackErrorPolicy, RuntimeConfig};
//! use cdata::Context;
//!
//! let ctx = Context::new();
//! ctx.set_config(RuntimeConfig {
//!     callback_error_policy: CallbackErrorPolicy::Report,
//!     trace_callbacks: true,
//! });
//! assert!(ctx.config().trace_callbacks);
//! ```

#[cfg(feature = "config-loaders")]
pub mod yaml;

// =======================================================================
// Native ABI constants
// =======================================================================

/// Size of a native data pointer in bytes.
pub const POINTER_SIZE: u32 = std::mem::size_of::<*const u8>() as u32;

/// Alignment of a native data pointer in bytes.
pub const POINTER_ALIGN: u32 = std::mem::align_of::<*const u8>() as u32;

/// Alignment of every owning memory block allocation.
///
/// Large enough for any primitive kind, so that field offsets computed by the
/// layout engine stay aligned when the block address is handed to native code.
pub const STORAGE_ALIGN: usize = 16;

/// Records up to this size that contain arrays get their array members
/// unrolled in the FFI element list (small structs travel in registers).
pub const MAX_STRUCT_SIZE: u32 = 16;

/// Maximum length of a keep-alive path key in characters.
pub const MAX_KEEP_KEY_LEN: usize = 256;

// =======================================================================
// Native callback status codes
// =======================================================================

/// Callback completed and the result slot is valid.
pub const CALLBACK_STATUS_OK: i32 = 0;

/// Callback raised; the result slot was zeroed.
pub const CALLBACK_STATUS_FAILED: i32 = -1;

/// No trampoline registered under the given id, or bad slot pointers.
pub const CALLBACK_STATUS_UNKNOWN: i32 = -2;

// =======================================================================
// Runtime configuration
// =======================================================================

/// What a trampoline does when its managed callable fails under a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackErrorPolicy {
    /// Log the failure, zero the result slot and return a failure status.
    #[default]
    Report,
    /// Log the failure and abort the process.
    Abort,
}

/// Runtime-tunable behaviour of a [`Context`](crate::Context).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuntimeConfig {
    /// Failure handling for callback trampolines.
    pub callback_error_policy: CallbackErrorPolicy,
    /// Emit a debug record for every trampoline invocation.
    pub trace_callbacks: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_constants() {
        assert_eq!(POINTER_SIZE as usize, std::mem::size_of::<usize>());
        assert!(POINTER_ALIGN <= POINTER_SIZE);
        assert_eq!(STORAGE_ALIGN % POINTER_ALIGN as usize, 0);
    }

    #[test]
    fn test_default_config() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.callback_error_policy, CallbackErrorPolicy::Report);
        assert!(!cfg.trace_callbacks);
    }
}
