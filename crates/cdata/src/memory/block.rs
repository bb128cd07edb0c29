// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Memory blocks: the raw bytes behind one instance.
//!
//! A block either owns its storage, views a sub-range of a parent block
//! (array element, record field, pointer contents), or wraps foreign memory.
//! A view holds a strong handle to its parent, so the parent's storage
//! outlives every view taken from it.
//!
//! Objects a block must keep alive (values stored into pointer fields, the
//! target of a pointer) are recorded in the keep-alive map of the root block
//! under a path key made of the hex indices from the view up to the root.

use crate::config::{MAX_KEEP_KEY_LEN, POINTER_SIZE};
use crate::error::{Error, Result};
use crate::memory::storage::Storage;
use crate::value::ObjectRef;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where a block's bytes come from.
#[derive(Clone)]
pub enum Origin {
    /// Allocated by this block.
    Owned,
    /// Borrowed from `base` at position `index`.
    View { base: MemoryBlock, index: u32 },
    /// Native memory wrapped by address.
    Foreign,
}

struct BlockInner {
    storage: Arc<Storage>,
    offset: usize,
    size: usize,
    origin: Origin,
    keep_alive: Mutex<BTreeMap<String, ObjectRef>>,
    materialized: AtomicBool,
}

/// Shared handle to one block.
#[derive(Clone)]
pub struct MemoryBlock(Arc<BlockInner>);

impl MemoryBlock {
    fn from_parts(storage: Arc<Storage>, offset: usize, size: usize, origin: Origin) -> Self {
        let foreign = matches!(origin, Origin::Foreign);
        Self(Arc::new(BlockInner {
            storage,
            offset,
            size,
            origin,
            keep_alive: Mutex::new(BTreeMap::new()),
            materialized: AtomicBool::new(foreign),
        }))
    }

    /// Allocate a zeroed owning block.
    pub fn allocate_owning(size: usize) -> Result<Self> {
        let storage = Arc::new(Storage::allocate(size)?);
        Ok(Self::from_parts(storage, 0, size, Origin::Owned))
    }

    /// Borrow `[offset, offset + size)` of `parent`.
    ///
    /// Writes through the view land in the parent's storage.
    pub fn view_into(parent: &MemoryBlock, offset: usize, size: usize, index: u32) -> Result<Self> {
        match offset.checked_add(size) {
            Some(end) if end <= parent.size() => {}
            _ => {
                return Err(Error::OutOfBounds {
                    offset,
                    len: size,
                    size: parent.size(),
                })
            }
        }
        Ok(Self::from_parts(
            Arc::clone(&parent.0.storage),
            parent.0.offset + offset,
            size,
            Origin::View {
                base: parent.clone(),
                index,
            },
        ))
    }

    /// Wrap native memory.
    ///
    /// # Safety
    ///
    /// `address` must point to `size` readable and writable bytes that stay
    /// valid while the returned block or any view of it is alive.
    pub unsafe fn from_address(address: usize, size: usize) -> Result<Self> {
        let storage = Arc::new(Storage::foreign(address, size)?);
        Ok(Self::from_parts(storage, 0, size, Origin::Foreign))
    }

    pub fn size(&self) -> usize {
        self.0.size
    }

    pub fn origin(&self) -> &Origin {
        &self.0.origin
    }

    /// True if this block allocated its storage and releases it on drop.
    pub fn owns_storage(&self) -> bool {
        matches!(self.0.origin, Origin::Owned)
    }

    /// Parent block of a view.
    pub fn base(&self) -> Option<&MemoryBlock> {
        match &self.0.origin {
            Origin::View { base, .. } => Some(base),
            _ => None,
        }
    }

    /// Position of a view inside its parent.
    pub fn index(&self) -> Option<u32> {
        match &self.0.origin {
            Origin::View { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Outermost block of the view chain.
    pub fn root(&self) -> MemoryBlock {
        let mut current = self.clone();
        while let Some(base) = current.base().cloned() {
            current = base;
        }
        current
    }

    /// Native address without marking the block as handed out.
    pub(crate) fn address(&self) -> usize {
        self.0.storage.address() + self.0.offset
    }

    /// Native address of the first byte; marks the block as materialized.
    pub fn as_pointer(&self) -> usize {
        self.0.materialized.store(true, Ordering::Release);
        self.address()
    }

    /// True once the block's address has been handed to native code.
    pub fn is_pointer(&self) -> bool {
        self.0.materialized.load(Ordering::Acquire)
    }

    /// Same bytes (same storage, offset and size).
    pub fn same_region(&self, other: &MemoryBlock) -> bool {
        Arc::ptr_eq(&self.0.storage, &other.0.storage)
            && self.0.offset == other.0.offset
            && self.0.size == other.0.size
    }

    fn check(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.0.size => Ok(()),
            _ => Err(Error::OutOfBounds {
                offset,
                len,
                size: self.0.size,
            }),
        }
    }

    pub fn read_byte(&self, offset: usize) -> Result<u8> {
        self.check(offset, 1)?;
        self.0.storage.with_slice(self.0.offset + offset, 1, |b| b[0])
    }

    pub fn write_byte(&self, offset: usize, value: u8) -> Result<()> {
        self.check(offset, 1)?;
        self.0
            .storage
            .with_slice_mut(self.0.offset + offset, 1, |b| b[0] = value)
    }

    pub fn read_range(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.check(offset, len)?;
        self.0
            .storage
            .with_slice(self.0.offset + offset, len, <[u8]>::to_vec)
    }

    /// Write all of `bytes` at `offset`, or nothing.
    pub fn write_range(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check(offset, bytes.len())?;
        self.0
            .storage
            .with_slice_mut(self.0.offset + offset, bytes.len(), |b| {
                b.copy_from_slice(bytes)
            })
    }

    /// Copy the contents of `src` into this block at `offset`.
    pub fn copy_from(&self, offset: usize, src: &MemoryBlock) -> Result<()> {
        self.check(offset, src.size())?;
        if Arc::ptr_eq(&self.0.storage, &src.0.storage) {
            return self
                .0
                .storage
                .copy_within(src.0.offset, self.0.offset + offset, src.size());
        }
        let bytes = src.read_range(0, src.size())?;
        self.write_range(offset, &bytes)
    }

    /// Whole block contents.
    pub fn to_bytes(&self) -> Vec<u8> {
        // the full range is always in bounds
        self.read_range(0, self.0.size).unwrap_or_default()
    }

    pub(crate) fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        self.0.storage.with_slice(self.0.offset, self.0.size, f)
    }

    pub(crate) fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        self.0.storage.with_slice_mut(self.0.offset, self.0.size, f)
    }

    // =======================================================================
    // Keep-alive
    // =======================================================================

    /// Path key for slot `index` of this block, as stored in the root.
    ///
    /// `index` first, then the index of each view up to the root, all in
    /// hex and joined by `:`.
    pub fn keep_key(&self, index: u32) -> Result<String> {
        let mut key = format!("{:x}", index);
        let mut current = self.clone();
        while let Some((base, view_index)) = current.base().cloned().zip(current.index()) {
            let left = MAX_KEEP_KEY_LEN.saturating_sub(key.len() + 1);
            if left < POINTER_SIZE as usize * 2 + 1 {
                return Err(Error::StructureTooDeep);
            }
            key.push_str(&format!(":{:x}", view_index));
            current = base;
        }
        Ok(key)
    }

    /// Keep `object` alive for as long as the root block lives.
    pub fn retain(&self, index: u32, object: ObjectRef) -> Result<()> {
        self.reserve(index)?.fill(object);
        Ok(())
    }

    /// Resolve the keep-alive slot for `index` without storing anything.
    ///
    /// Fails exactly when [`retain`](Self::retain) would, so callers can
    /// check before touching any bytes.
    pub fn reserve(&self, index: u32) -> Result<KeepSlot> {
        Ok(KeepSlot {
            key: self.keep_key(index)?,
            root: self.root(),
        })
    }

    /// Slot for `key`, a key relative to this block (as produced by a root
    /// standing in for it), rewritten to be relative to the real root.
    pub fn reserve_nested(&self, key: &str) -> Result<KeepSlot> {
        let own = self.keep_key(0)?;
        // own is "0" followed by the path of this block up to its root
        let key = format!("{}{}", key, &own[1..]);
        if key.len() > MAX_KEEP_KEY_LEN {
            return Err(Error::StructureTooDeep);
        }
        Ok(KeepSlot {
            key,
            root: self.root(),
        })
    }

    /// Empty the keep-alive map of this block, returning its entries.
    pub(crate) fn take_kept(&self) -> Vec<(String, ObjectRef)> {
        std::mem::take(&mut *self.0.keep_alive.lock()).into_iter().collect()
    }

    /// Object retained for slot `index` of this block.
    pub fn kept(&self, index: u32) -> Option<ObjectRef> {
        let key = self.keep_key(index).ok()?;
        self.root().0.keep_alive.lock().get(&key).cloned()
    }

    /// Number of objects kept alive by this block (meaningful on roots).
    pub fn kept_count(&self) -> usize {
        self.0.keep_alive.lock().len()
    }
}

/// A resolved keep-alive slot; filling it cannot fail.
#[must_use]
pub struct KeepSlot {
    key: String,
    root: MemoryBlock,
}

impl KeepSlot {
    pub fn fill(self, object: ObjectRef) {
        self.root.0.keep_alive.lock().insert(self.key, object);
    }
}

impl fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match &self.0.origin {
            Origin::Owned => "owned",
            Origin::View { .. } => "view",
            Origin::Foreign => "foreign",
        };
        f.debug_struct("MemoryBlock")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("size", &self.0.size)
            .field("origin", &origin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owning_block_is_zeroed() {
        let block = MemoryBlock::allocate_owning(16).expect("alloc");
        assert!(block.owns_storage());
        assert!(block.base().is_none());
        assert_eq!(block.to_bytes(), vec![0u8; 16]);
    }

    #[test]
    fn test_view_writes_reach_parent() {
        let parent = MemoryBlock::allocate_owning(8).expect("alloc");
        let view = MemoryBlock::view_into(&parent, 4, 4, 1).expect("view");
        assert!(!view.owns_storage());
        assert_eq!(view.index(), Some(1));
        view.write_range(0, &[1, 2, 3, 4]).expect("write");
        assert_eq!(parent.read_range(4, 4).expect("read"), vec![1, 2, 3, 4]);
        assert_eq!(view.as_pointer(), parent.as_pointer() + 4);
    }

    #[test]
    fn test_view_outlives_parent_handle() {
        let view = {
            let parent = MemoryBlock::allocate_owning(4).expect("alloc");
            parent.write_byte(3, 9).expect("write");
            MemoryBlock::view_into(&parent, 2, 2, 0).expect("view")
        };
        assert_eq!(view.read_byte(1).expect("read"), 9);
    }

    #[test]
    fn test_view_bounds() {
        let parent = MemoryBlock::allocate_owning(8).expect("alloc");
        let err = MemoryBlock::view_into(&parent, 6, 4, 0).expect_err("oob");
        assert!(matches!(err, Error::OutOfBounds { offset: 6, len: 4, size: 8 }));
    }

    #[test]
    fn test_out_of_bounds_write_leaves_block_untouched() {
        let block = MemoryBlock::allocate_owning(4).expect("alloc");
        block.write_range(0, &[7, 7, 7, 7]).expect("write");
        assert!(block.write_range(2, &[1, 1, 1]).is_err());
        assert!(block.write_byte(4, 1).is_err());
        assert!(block.read_byte(4).is_err());
        assert_eq!(block.to_bytes(), vec![7, 7, 7, 7]);
    }

    #[test]
    fn test_materialization() {
        let block = MemoryBlock::allocate_owning(4).expect("alloc");
        assert!(!block.is_pointer());
        let addr = block.as_pointer();
        assert!(block.is_pointer());
        assert_ne!(addr, 0);
    }

    #[test]
    fn test_keep_alive_goes_to_root() {
        let root = MemoryBlock::allocate_owning(32).expect("alloc");
        let outer = MemoryBlock::view_into(&root, 8, 16, 2).expect("view");
        let inner = MemoryBlock::view_into(&outer, 4, 8, 10).expect("view");
        assert_eq!(inner.keep_key(1).expect("key"), "1:a:2");

        let obj: ObjectRef = Arc::new(42u32);
        inner.retain(1, Arc::clone(&obj)).expect("retain");
        assert_eq!(root.kept_count(), 1);
        assert_eq!(inner.kept_count(), 0);
        let kept = inner.kept(1).expect("kept");
        assert_eq!(kept.downcast_ref::<u32>(), Some(&42));
        assert!(outer.kept(1).is_none());
    }

    #[test]
    fn test_structure_too_deep() {
        let mut block = MemoryBlock::allocate_owning(1).expect("alloc");
        for i in 0..200u32 {
            block = MemoryBlock::view_into(&block, 0, 1, i + 0x1000).expect("view");
        }
        assert!(matches!(block.keep_key(0), Err(Error::StructureTooDeep)));
        assert!(block.retain(0, Arc::new(())).is_err());
    }

    #[test]
    fn test_reserve_checks_depth_before_storing() {
        let mut block = MemoryBlock::allocate_owning(1).expect("alloc");
        for i in 0..200u32 {
            block = MemoryBlock::view_into(&block, 0, 1, i + 0x1000).expect("view");
        }
        assert!(matches!(block.reserve(0), Err(Error::StructureTooDeep)));
        assert_eq!(block.root().kept_count(), 0);
    }

    #[test]
    fn test_nested_key_is_rebased_on_root() {
        let root = MemoryBlock::allocate_owning(16).expect("alloc");
        let field = MemoryBlock::view_into(&root, 8, 8, 3).expect("view");
        field
            .reserve_nested("1:2")
            .expect("slot")
            .fill(Arc::new(7u8));
        assert_eq!(root.kept_count(), 1);
        let inner = MemoryBlock::view_into(&field, 0, 4, 2).expect("view");
        assert!(inner.kept(1).is_some());

        root.reserve_nested("5").expect("slot").fill(Arc::new(()));
        assert!(root.kept(5).is_some());
        assert_eq!(root.take_kept().len(), 2);
        assert_eq!(root.kept_count(), 0);
    }

    #[test]
    fn test_copy_from_overlapping() {
        let block = MemoryBlock::allocate_owning(4).expect("alloc");
        block.write_range(0, &[1, 2, 3, 4]).expect("write");
        let head = MemoryBlock::view_into(&block, 0, 2, 0).expect("view");
        block.copy_from(1, &head).expect("copy");
        assert_eq!(block.to_bytes(), vec![1, 1, 2, 4]);
    }

    #[test]
    fn test_foreign_block() {
        let mut backing = [5u8, 6, 7];
        // SAFETY: backing outlives the block, which is dropped at scope end
        let block = unsafe { MemoryBlock::from_address(backing.as_mut_ptr() as usize, 3) }
            .expect("foreign");
        assert!(!block.owns_storage());
        assert!(block.is_pointer());
        block.write_byte(0, 1).expect("write");
        drop(block);
        assert_eq!(backing, [1, 6, 7]);
    }
}
