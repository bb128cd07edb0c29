// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FFI type handles consumed by the native call layer.
//!
//! These mirror the libffi type repertoire: the call engine maps each handle
//! to its own `ffi_type` when preparing a call interface.

use crate::config::{POINTER_ALIGN, POINTER_SIZE};

/// Opaque native-ABI type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FfiType {
    Void,
    UInt8,
    SInt8,
    UInt16,
    SInt16,
    UInt32,
    SInt32,
    UInt64,
    SInt64,
    Float,
    Double,
    Pointer,
    Struct(FfiStruct),
}

/// Aggregate layout handed to the call layer for by-value records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FfiStruct {
    pub size: u32,
    pub align: u32,
    pub elements: Vec<FfiType>,
}

impl FfiType {
    pub fn size(&self) -> u32 {
        match self {
            FfiType::Void => 0,
            FfiType::UInt8 | FfiType::SInt8 => 1,
            FfiType::UInt16 | FfiType::SInt16 => 2,
            FfiType::UInt32 | FfiType::SInt32 | FfiType::Float => 4,
            FfiType::UInt64 | FfiType::SInt64 | FfiType::Double => 8,
            FfiType::Pointer => POINTER_SIZE,
            FfiType::Struct(s) => s.size,
        }
    }

    pub fn align(&self) -> u32 {
        match self {
            FfiType::Void => 1,
            FfiType::Pointer => POINTER_ALIGN,
            FfiType::Struct(s) => s.align,
            other => other.size(),
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, FfiType::Struct(_))
    }

    /// Integer handle that may carry a bit field.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FfiType::UInt8
                | FfiType::SInt8
                | FfiType::UInt16
                | FfiType::SInt16
                | FfiType::UInt32
                | FfiType::SInt32
                | FfiType::UInt64
                | FfiType::SInt64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sizes() {
        assert_eq!(FfiType::SInt8.size(), 1);
        assert_eq!(FfiType::UInt16.align(), 2);
        assert_eq!(FfiType::Double.size(), 8);
        assert_eq!(FfiType::Pointer.size(), POINTER_SIZE);
        assert_eq!(FfiType::Void.align(), 1);
    }

    #[test]
    fn test_struct_handle() {
        let s = FfiType::Struct(FfiStruct {
            size: 8,
            align: 4,
            elements: vec![FfiType::SInt32, FfiType::SInt8],
        });
        assert!(s.is_struct());
        assert!(!s.is_integer());
        assert_eq!(s.size(), 8);
        assert_eq!(s.align(), 4);
    }
}
