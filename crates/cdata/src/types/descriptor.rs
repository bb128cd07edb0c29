// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type descriptors: the layout and marshalling record of one C type.
//!
//! A [`CType`] is the identity-bearing handle ([`TypeRef`]); two types are the
//! same type iff `Arc::ptr_eq`. The layout record ([`StgInfo`]) sits behind a
//! lock because `_fields_` may be assigned after the type is declared.

use crate::config::{POINTER_ALIGN, POINTER_SIZE};
use crate::types::funcptr::Signature;
use crate::types::kind::{BitField, ByteOrder, PrimitiveKind};
use crate::types::layout::RecordLayout;
use crate::types::FfiType;
use crate::value::Callable;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::ops::BitOr;
use std::sync::{Arc, Weak};

/// Shared handle to a type descriptor.
pub type TypeRef = Arc<CType>;

/// Type-level flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeFlags(u32);

impl TypeFlags {
    /// Holds a pointer somewhere inside (keep-alive accounting).
    pub const HAS_POINTER: TypeFlags = TypeFlags(1 << 0);
    /// Is itself a pointer type.
    pub const IS_POINTER: TypeFlags = TypeFlags(1 << 1);
    /// Contains a union.
    pub const HAS_UNION: TypeFlags = TypeFlags(1 << 2);
    /// Contains a bit field.
    pub const HAS_BITFIELD: TypeFlags = TypeFlags(1 << 3);
    /// Layout frozen: used as field, item, base, or instantiated.
    pub const FINAL: TypeFlags = TypeFlags(1 << 4);
    /// Declared but `_fields_` not assigned yet.
    pub const INCOMPLETE: TypeFlags = TypeFlags(1 << 5);

    pub const fn empty() -> Self {
        TypeFlags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: TypeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TypeFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: TypeFlags) {
        self.0 &= !other.0;
    }

    /// Flags a container inherits from one of its members.
    pub(crate) fn inherited(self) -> TypeFlags {
        let mut out = TypeFlags::empty();
        if self.contains(Self::HAS_POINTER) || self.contains(Self::IS_POINTER) {
            out.insert(Self::HAS_POINTER);
        }
        if self.contains(Self::HAS_UNION) {
            out.insert(Self::HAS_UNION);
        }
        if self.contains(Self::HAS_BITFIELD) {
            out.insert(Self::HAS_BITFIELD);
        }
        out
    }
}

impl BitOr for TypeFlags {
    type Output = TypeFlags;

    fn bitor(self, rhs: TypeFlags) -> TypeFlags {
        TypeFlags(self.0 | rhs.0)
    }
}

/// Extra conversions supported by an array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayFlavor {
    Plain,
    /// `char[N]`: byte-string view.
    Bytes,
    /// `wchar_t[N]`: text view.
    Text,
}

/// How a record field is read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccess {
    /// Through the kind table.
    Primitive(PrimitiveKind),
    /// `char` array read as bytes up to the first NUL.
    Bytes,
    /// `wchar_t` array read as text up to the first NUL.
    Text,
    /// Record, array, pointer or function pointer: read as a view.
    Nested,
}

/// One laid-out record member.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub offset: u32,
    /// Declaration index, inherited fields first.
    pub index: u32,
    pub ty: TypeRef,
    pub kind: FieldAccess,
    pub bits: Option<BitField>,
}

impl FieldDescriptor {
    /// Bytes occupied by the field (the storage unit for bit fields).
    pub fn size(&self) -> u32 {
        self.ty.size()
    }
}

/// Kind-specific payload of a descriptor.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Simple(PrimitiveKind),
    Struct(RecordLayout),
    Union(RecordLayout),
    Array {
        item: TypeRef,
        length: u32,
        flavor: ArrayFlavor,
    },
    Pointer {
        target: Option<TypeRef>,
    },
    FunctionPointer(Arc<Signature>),
}

/// Layout and marshalling record.
#[derive(Debug, Clone)]
pub struct StgInfo {
    pub size: u32,
    pub align: u32,
    /// Array dimensions, outermost first; empty for non-arrays.
    pub shape: Vec<u32>,
    pub ffi_type: FfiType,
    /// Buffer format tag.
    pub format: String,
    pub kind: TypeKind,
    pub flags: TypeFlags,
    pub byte_order: ByteOrder,
    /// `_check_retval_` hook run when this type is a return type.
    pub check_retval: Option<Callable>,
}

impl StgInfo {
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Record describing a primitive kind.
    pub fn simple(kind: PrimitiveKind) -> Self {
        let mut flags = TypeFlags::empty();
        if kind == PrimitiveKind::Pointer {
            flags.insert(TypeFlags::HAS_POINTER);
        }
        Self {
            size: kind.size(),
            align: kind.align(),
            shape: Vec::new(),
            ffi_type: kind.ffi_type(),
            format: kind.format(ByteOrder::NATIVE),
            kind: TypeKind::Simple(kind),
            flags,
            byte_order: ByteOrder::NATIVE,
            check_retval: None,
        }
    }

    /// Placeholder for a record declared without `_fields_`.
    pub(crate) fn incomplete(union: bool) -> Self {
        let layout = RecordLayout::default();
        Self {
            size: 0,
            align: 1,
            shape: Vec::new(),
            ffi_type: FfiType::Void,
            format: "B".to_string(),
            kind: if union {
                TypeKind::Union(layout)
            } else {
                TypeKind::Struct(layout)
            },
            flags: TypeFlags::INCOMPLETE,
            byte_order: ByteOrder::NATIVE,
            check_retval: None,
        }
    }

    /// Pointer-sized record shared by pointer and function-pointer types.
    pub(crate) fn pointer_sized(kind: TypeKind, format: String, flags: TypeFlags) -> Self {
        Self {
            size: POINTER_SIZE,
            align: POINTER_ALIGN,
            shape: Vec::new(),
            ffi_type: FfiType::Pointer,
            format,
            kind,
            flags,
            byte_order: ByteOrder::NATIVE,
            check_retval: None,
        }
    }
}

/// A C type descriptor.
pub struct CType {
    name: String,
    info: RwLock<StgInfo>,
    this: Weak<CType>,
}

impl CType {
    pub(crate) fn from_info(name: impl Into<String>, info: StgInfo) -> TypeRef {
        let name = name.into();
        Arc::new_cyclic(|this| Self {
            name,
            info: RwLock::new(info),
            this: this.clone(),
        })
    }

    /// Shared handle to this descriptor.
    pub fn to_ref(&self) -> Option<TypeRef> {
        self.this.upgrade()
    }

    /// Identity comparison against a handle.
    pub fn is(&self, other: &TypeRef) -> bool {
        std::ptr::eq(self, Arc::as_ptr(other))
    }

    /// A simple type backed by one primitive kind.
    pub fn simple(name: impl Into<String>, kind: PrimitiveKind) -> TypeRef {
        Self::from_info(name, StgInfo::simple(kind))
    }

    /// Declare a structure whose `_fields_` come later.
    pub fn declare_struct(name: impl Into<String>) -> TypeRef {
        Self::from_info(name, StgInfo::incomplete(false))
    }

    /// Declare a union whose `_fields_` come later.
    pub fn declare_union(name: impl Into<String>) -> TypeRef {
        Self::from_info(name, StgInfo::incomplete(true))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the layout record. Do not hold the guard across calls into
    /// other types.
    pub fn info(&self) -> RwLockReadGuard<'_, StgInfo> {
        self.info.read()
    }

    /// Copy of the layout record.
    pub fn snapshot(&self) -> StgInfo {
        self.info.read().clone()
    }

    pub(crate) fn info_mut(&self) -> RwLockWriteGuard<'_, StgInfo> {
        self.info.write()
    }

    pub fn size(&self) -> u32 {
        self.info.read().size
    }

    pub fn align(&self) -> u32 {
        self.info.read().align
    }

    pub fn shape(&self) -> Vec<u32> {
        self.info.read().shape.clone()
    }

    pub fn ndim(&self) -> usize {
        self.info.read().ndim()
    }

    pub fn ffi_type(&self) -> FfiType {
        self.info.read().ffi_type.clone()
    }

    pub fn format(&self) -> String {
        self.info.read().format.clone()
    }

    pub fn flags(&self) -> TypeFlags {
        self.info.read().flags
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.info.read().byte_order
    }

    pub fn kind(&self) -> TypeKind {
        self.info.read().kind.clone()
    }

    pub fn is_complete(&self) -> bool {
        !self.flags().contains(TypeFlags::INCOMPLETE)
    }

    pub fn is_final(&self) -> bool {
        self.flags().contains(TypeFlags::FINAL)
    }

    /// Freeze `_fields_`.
    pub fn mark_final(&self) {
        self.info.write().flags.insert(TypeFlags::FINAL);
    }

    pub fn is_union(&self) -> bool {
        matches!(self.info.read().kind, TypeKind::Union(_))
    }

    pub fn is_record(&self) -> bool {
        matches!(
            self.info.read().kind,
            TypeKind::Struct(_) | TypeKind::Union(_)
        )
    }

    pub fn is_array(&self) -> bool {
        matches!(self.info.read().kind, TypeKind::Array { .. })
    }

    pub fn is_pointer(&self) -> bool {
        self.flags().contains(TypeFlags::IS_POINTER)
    }

    /// Any transitive member holds a pointer.
    pub fn has_pointer_payload(&self) -> bool {
        let flags = self.flags();
        flags.contains(TypeFlags::HAS_POINTER) || flags.contains(TypeFlags::IS_POINTER)
    }

    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self.info.read().kind {
            TypeKind::Simple(kind) => Some(kind),
            _ => None,
        }
    }

    /// Element type of an array, or target of a pointer.
    pub fn item_type(&self) -> Option<TypeRef> {
        match &self.info.read().kind {
            TypeKind::Array { item, .. } => Some(Arc::clone(item)),
            TypeKind::Pointer { target } => target.clone(),
            _ => None,
        }
    }

    /// Declared element count for arrays.
    pub fn length(&self) -> Option<u32> {
        match self.info.read().kind {
            TypeKind::Array { length, .. } => Some(length),
            _ => None,
        }
    }

    /// Laid-out record members in declaration order (empty for non-records).
    pub fn fields(&self) -> Vec<FieldDescriptor> {
        match &self.info.read().kind {
            TypeKind::Struct(layout) | TypeKind::Union(layout) => layout.fields.clone(),
            _ => Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<FieldDescriptor> {
        match &self.info.read().kind {
            TypeKind::Struct(layout) | TypeKind::Union(layout) => {
                layout.fields.iter().find(|f| f.name == name).cloned()
            }
            _ => None,
        }
    }

    pub fn signature(&self) -> Option<Arc<Signature>> {
        match &self.info.read().kind {
            TypeKind::FunctionPointer(sig) => Some(Arc::clone(sig)),
            _ => None,
        }
    }

    pub fn check_retval(&self) -> Option<Callable> {
        self.info.read().check_retval.clone()
    }

    /// Install the `_check_retval_` hook.
    pub fn set_check_retval(&self, hook: Option<Callable>) {
        self.info.write().check_retval = hook;
    }
}

impl fmt::Debug for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info.read();
        f.debug_struct("CType")
            .field("name", &self.name)
            .field("size", &info.size)
            .field("align", &info.align)
            .finish_non_exhaustive()
    }
}
