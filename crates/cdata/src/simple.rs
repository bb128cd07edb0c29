// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide simple C types (`c_int`, `c_char`, ...).
//!
//! Each accessor returns the same [`TypeRef`] on every call so that derived
//! types (arrays, pointers) are cached against a stable identity.

use crate::types::{CType, PrimitiveKind, TypeRef};
use std::sync::{Arc, OnceLock};

macro_rules! simple_types {
    ($($(#[$doc:meta])* $fn:ident => $kind:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $fn() -> TypeRef {
                static TY: OnceLock<TypeRef> = OnceLock::new();
                Arc::clone(TY.get_or_init(|| CType::simple(stringify!($fn), $kind)))
            }
        )*
    };
}

simple_types! {
    c_bool => PrimitiveKind::Bool;
    c_char => PrimitiveKind::Char;
    /// Platform `wchar_t`.
    c_wchar => PrimitiveKind::WChar;
    c_byte => PrimitiveKind::I8;
    c_ubyte => PrimitiveKind::U8;
    c_short => PrimitiveKind::I16;
    c_ushort => PrimitiveKind::U16;
    c_int => PrimitiveKind::I32;
    c_uint => PrimitiveKind::U32;
    c_long => PrimitiveKind::c_long();
    c_ulong => PrimitiveKind::c_ulong();
    c_longlong => PrimitiveKind::I64;
    c_ulonglong => PrimitiveKind::U64;
    c_size_t => PrimitiveKind::c_size_t();
    c_float => PrimitiveKind::F32;
    c_double => PrimitiveKind::F64;
    /// Untyped pointer; reads and writes raw addresses.
    c_void_p => PrimitiveKind::Pointer;
}
