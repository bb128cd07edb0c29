// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! C type model: kind table, descriptors, layout and derived-type builders.

pub mod array;
pub mod attrs;
pub mod cache;
pub mod descriptor;
pub mod ffi;
pub mod funcptr;
pub mod kind;
pub mod layout;
pub mod pointer;

pub use array::ArrayDef;
pub use attrs::Attributes;
pub use cache::{LookupStats, TypeCache};
pub use descriptor::{
    ArrayFlavor, CType, FieldAccess, FieldDescriptor, StgInfo, TypeFlags, TypeKind, TypeRef,
};
pub use ffi::{FfiStruct, FfiType};
pub use funcptr::{
    ArgType, CallFlags, Converter, FuncPtrDef, NativeArg, ParamType, ReturnType, Signature,
};
pub use kind::{BitField, ByteOrder, PrimitiveKind, WCHAR_SIZE};
pub use layout::{FieldDef, RecordDef, RecordLayout};
pub use pointer::PointerDef;
