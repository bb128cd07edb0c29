// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Indexed access for arrays and pointers, and pointer contents.
//!
//! A pointer only dereferences safely through the instance it was pointed
//! at with [`CData::set_contents`]; that instance is kept alive by the
//! pointer and bounds every index. Arbitrary addresses need
//! [`CData::contents_unchecked`].

use super::{write_keeping, CData};
use crate::error::{Error, Result};
use crate::memory::MemoryBlock;
use crate::types::{ByteOrder, PrimitiveKind, TypeKind, TypeRef};
use crate::value::Value;
use std::sync::Arc;

// keep-alive slot of a pointer's target
const CONTENTS_SLOT: u32 = 1;

impl CData {
    /// Declared element count (0 for non-arrays).
    pub fn len(&self) -> usize {
        self.ty.length().map_or(0, |n| n as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index` of an array (negative counts from the end) or of the
    /// tracked pointee of a pointer.
    pub fn get_item(&self, index: i64) -> Result<Value> {
        let (item, block, slot) = self.locate(index)?;
        read_element(&item, &block, slot)
    }

    /// Store element `index`; the instance is untouched on error.
    pub fn set_item(&self, index: i64, value: &Value) -> Result<()> {
        let (item, block, slot) = self.locate(index)?;
        let offset = slot * item.size() as usize;
        match item.primitive() {
            Some(kind) => {
                let keep = kind == PrimitiveKind::Pointer;
                write_keeping(&block, slot as u32, value, keep, |b| {
                    kind.set(b, offset, value, item.byte_order())
                })
            }
            None => CData::view(&item, &block, offset, slot as u32)?.set_value(value),
        }
    }

    // (item type, block holding the elements, element slot)
    fn locate(&self, index: i64) -> Result<(TypeRef, MemoryBlock, usize)> {
        match self.ty.kind() {
            TypeKind::Array { item, length, .. } => {
                let length = length as usize;
                let resolved = if index < 0 { index + length as i64 } else { index };
                if resolved < 0 || resolved as usize >= length {
                    return Err(Error::IndexOutOfRange { index, length });
                }
                Ok((item, self.block.clone(), resolved as usize))
            }
            TypeKind::Pointer { .. } => {
                let (item, block) = self.pointee_window()?;
                let size = item.size() as usize;
                let length = if size == 0 { 1 } else { block.size() / size };
                if index < 0 || index as usize >= length {
                    return Err(Error::IndexOutOfRange { index, length });
                }
                Ok((item, block, index as usize))
            }
            _ => Err(self.mismatch_kind("array or pointer")),
        }
    }

    // =======================================================================
    // Pointers
    // =======================================================================

    /// New instance of pointer type `ptr_ty` pointing at `target`.
    pub fn pointer_to(ptr_ty: &TypeRef, target: &CData) -> Result<CData> {
        let pointer = CData::new(ptr_ty)?;
        pointer.set_contents(target)?;
        Ok(pointer)
    }

    /// True if the stored address is null.
    pub fn is_null(&self) -> bool {
        self.read_address().map_or(true, |addr| addr == 0)
    }

    /// Point at `target`, keeping it alive.
    ///
    /// `target` must be an instance of the pointer's target type, or an
    /// array of it (the pointer then addresses the first element).
    pub fn set_contents(&self, target: &CData) -> Result<()> {
        let expected = match self.ty.kind() {
            TypeKind::Pointer { target: declared } => declared,
            _ => return Err(self.mismatch_kind("pointer")),
        };
        if let Some(expected) = &expected {
            let element = target.ty.item_type().filter(|_| target.ty.is_array());
            let matches = Arc::ptr_eq(expected, &target.ty)
                || element.is_some_and(|e| Arc::ptr_eq(expected, &e));
            if !matches {
                return Err(Error::TypeMismatch {
                    expected: expected.name().to_string(),
                    got: "ctypes instance",
                });
            }
        }
        let slot = self.block.reserve(CONTENTS_SLOT)?;
        let address = target.as_pointer();
        self.block.with_bytes_mut(|b| {
            PrimitiveKind::Pointer.set(b, 0, &Value::Address(address), ByteOrder::NATIVE)
        })??;
        slot.fill(Arc::new(target.clone()));
        Ok(())
    }

    /// The instance this pointer addresses.
    pub fn contents(&self) -> Result<CData> {
        let (item, block) = self.pointee_window()?;
        if item.size() as usize == block.size() {
            return Ok(CData::from_block(&item, block));
        }
        CData::view(&item, &block, 0, 0)
    }

    /// Instance of the target type at the stored address, tracked or not.
    ///
    /// # Safety
    ///
    /// The stored address must point to a live instance of the target type
    /// that outlives the returned instance.
    pub unsafe fn contents_unchecked(&self) -> Result<CData> {
        let target = self.pointer_target()?;
        match self.read_address()? {
            0 => Err(Error::NullPointer),
            addr => CData::from_address(&target, addr),
        }
    }

    fn pointer_target(&self) -> Result<TypeRef> {
        match self.ty.kind() {
            TypeKind::Pointer {
                target: Some(target),
            } => Ok(target),
            TypeKind::Pointer { target: None } => Err(Error::AbstractType(self.ty.name().to_string())),
            _ => Err(self.mismatch_kind("pointer")),
        }
    }

    // Element type and the tracked target's block.
    fn pointee_window(&self) -> Result<(TypeRef, MemoryBlock)> {
        let item = self.pointer_target()?;
        let address = match self.read_address()? {
            0 => return Err(Error::NullPointer),
            addr => addr,
        };
        let kept = self
            .block
            .kept(CONTENTS_SLOT)
            .and_then(|obj| obj.downcast_ref::<CData>().cloned())
            .filter(|target| target.block.address() == address);
        match kept {
            Some(target) => Ok((item, target.block)),
            None => Err(Error::UntrackedAddress(address)),
        }
    }
}

fn read_element(item: &TypeRef, block: &MemoryBlock, slot: usize) -> Result<Value> {
    let offset = slot * item.size() as usize;
    match item.primitive() {
        Some(kind) => block.with_bytes(|b| kind.get(b, offset, item.byte_order()))?,
        None => CData::view(item, block, offset, slot as u32).map(Value::Data),
    }
}
