// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! C instances: a type descriptor plus the memory block holding its bytes.
//!
//! Instances are cheap handles; cloning one yields a second handle onto the
//! same bytes. Nested members, array elements and pointer contents are
//! returned as views that write through to the enclosing block.

pub mod buffer;
mod member;
mod sequence;

pub use buffer::BufferView;

use crate::callback::Trampoline;
use crate::error::{Error, Result};
use crate::memory::MemoryBlock;
use crate::types::kind::{read_uint, write_uint};
use crate::types::{ArrayFlavor, ByteOrder, PrimitiveKind, TypeKind, TypeRef, WCHAR_SIZE};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// An instance of a C type.
#[derive(Clone)]
pub struct CData {
    ty: TypeRef,
    block: MemoryBlock,
}

impl CData {
    // =======================================================================
    // Construction
    // =======================================================================

    /// Allocate a zeroed instance of `ty`.
    ///
    /// Freezes the type's `_fields_`.
    pub fn new(ty: &TypeRef) -> Result<Self> {
        check_complete(ty)?;
        if is_abstract(ty) {
            return Err(Error::AbstractType(ty.name().to_string()));
        }
        ty.mark_final();
        let block = MemoryBlock::allocate_owning(ty.size() as usize)?;
        Ok(Self {
            ty: Arc::clone(ty),
            block,
        })
    }

    /// Instance of `ty` sharing `source`'s bytes from `offset` on.
    pub fn from_buffer(ty: &TypeRef, source: &CData, offset: usize) -> Result<Self> {
        check_complete(ty)?;
        let size = ty.size() as usize;
        let available = source.block.size();
        let needed = offset.checked_add(size).ok_or(Error::BufferTooSmall {
            needed: usize::MAX,
            available,
        })?;
        if needed > available {
            return Err(Error::BufferTooSmall { needed, available });
        }
        ty.mark_final();
        Self::view(ty, &source.block, offset, 0)
    }

    /// Instance of `ty` initialized with a copy of `raw[offset..]`.
    pub fn from_buffer_copy(ty: &TypeRef, raw: &[u8], offset: usize) -> Result<Self> {
        check_complete(ty)?;
        let size = ty.size() as usize;
        let needed = offset.checked_add(size).ok_or(Error::BufferTooSmall {
            needed: usize::MAX,
            available: raw.len(),
        })?;
        let bytes = raw.get(offset..needed).ok_or(Error::BufferTooSmall {
            needed,
            available: raw.len(),
        })?;
        ty.mark_final();
        let block = MemoryBlock::allocate_owning(size)?;
        block.write_range(0, bytes)?;
        Ok(Self {
            ty: Arc::clone(ty),
            block,
        })
    }

    /// Instance of `ty` over native memory at `address`.
    ///
    /// # Safety
    ///
    /// `address` must point to `ty.size()` readable and writable bytes that
    /// stay valid while the instance or any view of it is alive.
    pub unsafe fn from_address(ty: &TypeRef, address: usize) -> Result<Self> {
        check_complete(ty)?;
        ty.mark_final();
        let block = MemoryBlock::from_address(address, ty.size() as usize)?;
        Ok(Self {
            ty: Arc::clone(ty),
            block,
        })
    }

    /// Function-pointer instance calling into `trampoline`.
    ///
    /// Stores the trampoline's code address and keeps the trampoline alive
    /// for as long as the instance lives.
    pub fn from_callback(trampoline: &Trampoline) -> Result<Self> {
        let ty = trampoline.ty();
        ty.mark_final();
        let block = MemoryBlock::allocate_owning(ty.size() as usize)?;
        block.with_bytes_mut(|b| {
            write_uint(b, trampoline.code_address() as u64, ByteOrder::NATIVE)
        })?;
        block.retain(0, Arc::new(trampoline.clone()))?;
        Ok(Self::from_block(ty, block))
    }

    /// Trampoline behind an instance made by [`from_callback`](Self::from_callback).
    pub fn trampoline(&self) -> Option<Trampoline> {
        self.block
            .kept(0)
            .and_then(|obj| obj.downcast_ref::<Trampoline>().cloned())
    }

    pub(crate) fn from_block(ty: &TypeRef, block: MemoryBlock) -> Self {
        Self {
            ty: Arc::clone(ty),
            block,
        }
    }

    /// View of `ty` at `offset` inside `parent`, keyed `index` for keep-alive.
    pub(crate) fn view(ty: &TypeRef, parent: &MemoryBlock, offset: usize, index: u32) -> Result<Self> {
        let block = MemoryBlock::view_into(parent, offset, ty.size() as usize, index)?;
        Ok(Self::from_block(ty, block))
    }

    // =======================================================================
    // Accessors
    // =======================================================================

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn block(&self) -> &MemoryBlock {
        &self.block
    }

    pub fn size(&self) -> usize {
        self.block.size()
    }

    /// Copy of the instance bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.block.to_bytes()
    }

    /// Native address of the instance; marks it as handed out.
    pub fn as_pointer(&self) -> usize {
        self.block.as_pointer()
    }

    /// True once the address has been handed to native code.
    pub fn is_pointer(&self) -> bool {
        self.block.is_pointer()
    }

    /// Both handles cover the same bytes.
    pub fn same_memory(&self, other: &CData) -> bool {
        self.block.same_region(&other.block)
    }

    /// Raw buffer surface over the instance bytes.
    pub fn buffer(&self) -> BufferView {
        BufferView::new(self.clone())
    }

    // =======================================================================
    // Value
    // =======================================================================

    /// Managed value of the instance.
    ///
    /// Simple types decode through the kind table; pointers yield their
    /// address; `char[N]` and `wchar_t[N]` yield the NUL-terminated prefix;
    /// other arrays yield a list of their items; records yield themselves.
    pub fn value(&self) -> Result<Value> {
        match self.ty.kind() {
            TypeKind::Simple(kind) => {
                let order = self.ty.byte_order();
                self.block.with_bytes(|b| kind.get(b, 0, order))?
            }
            TypeKind::Pointer { .. } | TypeKind::FunctionPointer(_) => {
                self.read_address().map(Value::Address)
            }
            TypeKind::Array {
                flavor: ArrayFlavor::Bytes,
                ..
            } => Ok(Value::Bytes(nul_terminated(&self.to_bytes()).to_vec())),
            TypeKind::Array {
                flavor: ArrayFlavor::Text,
                ..
            } => self.text().map(Value::Text),
            TypeKind::Array { length, .. } => (0..length)
                .map(|i| self.get_item(i64::from(i)))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            TypeKind::Struct(_) | TypeKind::Union(_) => Ok(Value::Data(self.clone())),
        }
    }

    /// Store `value` into the instance; the bytes are untouched on error.
    ///
    /// Lists are applied to a scratch copy first, so a failing element
    /// leaves every earlier one unwritten too.
    pub fn set_value(&self, value: &Value) -> Result<()> {
        match self.ty.kind() {
            TypeKind::Simple(kind) => {
                let order = self.ty.byte_order();
                let keep = kind == PrimitiveKind::Pointer;
                write_keeping(&self.block, 0, value, keep, |b| kind.set(b, 0, value, order))
            }
            TypeKind::Pointer { .. } => match value {
                Value::Data(target) if !Arc::ptr_eq(&target.ty, &self.ty) => self.set_contents(target),
                other => self.store_address(other),
            },
            TypeKind::FunctionPointer(_) => self.store_address(value),
            TypeKind::Array {
                flavor: ArrayFlavor::Bytes,
                ..
            } => write_bytes(&self.block, 0, self.size(), value),
            TypeKind::Array {
                flavor: ArrayFlavor::Text,
                ..
            } => write_text(&self.block, 0, self.size(), value),
            TypeKind::Array { length, .. } => match value {
                Value::Data(other) if Arc::ptr_eq(&other.ty, &self.ty) => {
                    self.block.copy_from(0, &other.block)
                }
                Value::List(items) if items.len() <= length as usize => {
                    self.write_staged(|scratch| {
                        for (i, item) in items.iter().enumerate() {
                            scratch.set_item(i as i64, item)?;
                        }
                        Ok(())
                    })
                }
                Value::List(items) => Err(Error::IndexOutOfRange {
                    index: items.len() as i64 - 1,
                    length: length as usize,
                }),
                other => Err(self.mismatch(other)),
            },
            TypeKind::Struct(_) | TypeKind::Union(_) => match value {
                Value::Data(other) if Arc::ptr_eq(&other.ty, &self.ty) => {
                    self.block.copy_from(0, &other.block)
                }
                Value::List(items) => self.write_staged(|scratch| scratch.init_fields(items)),
                other => Err(self.mismatch(other)),
            },
        }
    }

    /// Raw bytes of a `char[N]` instance, NULs included.
    pub fn raw(&self) -> Result<Vec<u8>> {
        match self.flavor() {
            Some(ArrayFlavor::Bytes) => Ok(self.to_bytes()),
            _ => Err(self.mismatch_kind("char array")),
        }
    }

    /// Overwrite the leading bytes of a `char[N]` instance; no terminator is added.
    pub fn set_raw(&self, bytes: &[u8]) -> Result<()> {
        if self.flavor() != Some(ArrayFlavor::Bytes) {
            return Err(self.mismatch_kind("char array"));
        }
        if bytes.len() > self.size() {
            return Err(Error::BufferTooSmall {
                needed: bytes.len(),
                available: self.size(),
            });
        }
        self.block.write_range(0, bytes)
    }

    /// NUL-terminated text of a `wchar_t[N]` instance.
    pub fn text(&self) -> Result<String> {
        match self.flavor() {
            Some(ArrayFlavor::Text) => self.block.with_bytes(decode_wide),
            _ => Err(self.mismatch_kind("wchar array")),
        }
    }

    // =======================================================================
    // Internals
    // =======================================================================

    fn flavor(&self) -> Option<ArrayFlavor> {
        match self.ty.kind() {
            TypeKind::Array { flavor, .. } => Some(flavor),
            _ => None,
        }
    }

    fn mismatch(&self, value: &Value) -> Error {
        Error::TypeMismatch {
            expected: self.ty.name().to_string(),
            got: value.type_name(),
        }
    }

    fn mismatch_kind(&self, expected: &str) -> Error {
        Error::TypeMismatch {
            expected: expected.to_string(),
            got: "ctypes instance",
        }
    }

    pub(crate) fn read_address(&self) -> Result<usize> {
        let raw = self
            .block
            .with_bytes(|b| PrimitiveKind::Pointer.get(b, 0, ByteOrder::NATIVE))??;
        match raw {
            Value::Address(addr) => Ok(addr),
            other => Err(self.mismatch(&other)),
        }
    }

    fn store_address(&self, value: &Value) -> Result<()> {
        let address = match value {
            Value::None => 0,
            Value::Address(addr) => *addr,
            Value::Data(d) if d.ty.is_pointer() || d.ty.signature().is_some() => d.read_address()?,
            other => return Err(self.mismatch(other)),
        };
        write_keeping(&self.block, 0, value, true, |b| {
            write_uint(b, address as u64, ByteOrder::NATIVE);
            Ok(())
        })
    }

    /// Run `write` against a scratch copy of this instance; bytes and
    /// keep-alive entries are committed only if it succeeds.
    fn write_staged(&self, write: impl FnOnce(&CData) -> Result<()>) -> Result<()> {
        let scratch = CData::from_block(&self.ty, MemoryBlock::allocate_owning(self.size())?);
        scratch.block.copy_from(0, &self.block)?;
        write(&scratch)?;
        let slots = scratch
            .block
            .take_kept()
            .into_iter()
            .map(|(key, object)| Ok((self.block.reserve_nested(&key)?, object)))
            .collect::<Result<Vec<_>>>()?;
        self.block.copy_from(0, &scratch.block)?;
        for (slot, object) in slots {
            slot.fill(object);
        }
        Ok(())
    }
}

/// Write through `write`, then keep `value` alive in slot `index` of `block`
/// when `keep` is set and `value` is an instance. The slot is resolved
/// first: if it cannot be kept, nothing is written.
pub(crate) fn write_keeping(
    block: &MemoryBlock,
    index: u32,
    value: &Value,
    keep: bool,
    write: impl FnOnce(&mut [u8]) -> Result<()>,
) -> Result<()> {
    let slot = match value {
        Value::Data(_) if keep => Some(block.reserve(index)?),
        _ => None,
    };
    block.with_bytes_mut(write)??;
    if let (Some(slot), Value::Data(d)) = (slot, value) {
        slot.fill(Arc::new(d.clone()));
    }
    Ok(())
}

impl fmt::Debug for CData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CData")
            .field("type", &self.ty.name())
            .field("block", &self.block)
            .finish()
    }
}

fn check_complete(ty: &TypeRef) -> Result<()> {
    if ty.is_complete() {
        Ok(())
    } else {
        Err(Error::IncompleteType(ty.name().to_string()))
    }
}

// Function pointers only come from callbacks or native addresses; untyped
// pointers have nothing to point at.
fn is_abstract(ty: &TypeRef) -> bool {
    match ty.kind() {
        TypeKind::FunctionPointer(_) => true,
        TypeKind::Pointer { target } => target.is_none(),
        _ => false,
    }
}

fn nul_terminated(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

fn write_bytes(block: &MemoryBlock, offset: usize, capacity: usize, value: &Value) -> Result<()> {
    let bytes = value.as_bytes().ok_or(Error::TypeMismatch {
        expected: "bytes".to_string(),
        got: value.type_name(),
    })?;
    if bytes.len() > capacity {
        return Err(Error::BufferTooSmall {
            needed: bytes.len(),
            available: capacity,
        });
    }
    let mut out = bytes.to_vec();
    if out.len() < capacity {
        out.push(0);
    }
    block.write_range(offset, &out)
}

fn encode_wide(text: &str) -> Vec<u32> {
    if WCHAR_SIZE == 2 {
        text.encode_utf16().map(u32::from).collect()
    } else {
        text.chars().map(u32::from).collect()
    }
}

fn decode_wide(bytes: &[u8]) -> String {
    let unit = WCHAR_SIZE as usize;
    let units: Vec<u32> = bytes
        .chunks_exact(unit)
        .map(|c| read_uint(c, ByteOrder::NATIVE) as u32)
        .take_while(|u| *u != 0)
        .collect();
    if unit == 2 {
        char::decode_utf16(units.iter().map(|u| *u as u16))
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    } else {
        units
            .iter()
            .map(|u| char::from_u32(*u).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

fn write_text(block: &MemoryBlock, offset: usize, capacity: usize, value: &Value) -> Result<()> {
    let text = value.as_text().ok_or(Error::TypeMismatch {
        expected: "str".to_string(),
        got: value.type_name(),
    })?;
    let unit = WCHAR_SIZE as usize;
    let units = encode_wide(text);
    let slots = capacity / unit;
    if units.len() > slots {
        return Err(Error::BufferTooSmall {
            needed: units.len() * unit,
            available: capacity,
        });
    }
    let written = units.len() + usize::from(units.len() < slots);
    let mut out = vec![0u8; written * unit];
    for (chunk, u) in out.chunks_exact_mut(unit).zip(&units) {
        write_uint(chunk, u64::from(*u), ByteOrder::NATIVE);
    }
    block.write_range(offset, &out)
}
