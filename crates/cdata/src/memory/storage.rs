// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw byte storage shared by a block and all of its views.

use crate::config::STORAGE_ALIGN;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

/// Contiguous native bytes.
///
/// Owned storage is allocated zeroed with [`STORAGE_ALIGN`] alignment and
/// released on drop. Foreign storage wraps memory owned by native code and
/// is never released here.
pub(crate) struct Storage {
    ptr: NonNull<u8>,
    size: usize,
    layout: Option<Layout>,
    // Byte copies through safe APIs hold this; native code writing through
    // a handed-out address does not.
    guard: RwLock<()>,
}

// SAFETY: Storage exclusively owns (or, for foreign memory, was promised by
// the caller of `foreign`) the region [ptr, ptr + size). Every access from
// safe code goes through `guard`, so concurrent readers and writers on
// different threads never race inside this crate.
unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

impl Storage {
    /// Allocate `size` zeroed bytes.
    pub(crate) fn allocate(size: usize) -> Result<Self> {
        // zero-sized types still get a distinct, valid address
        let layout = Layout::from_size_align(size.max(1), STORAGE_ALIGN).map_err(|_| {
            Error::Overflow {
                item_size: 1,
                length: size as u64,
            }
        })?;
        // SAFETY:
        // - layout has a non-zero size (size.max(1) above)
        // - STORAGE_ALIGN is a power of two, validated by Layout::from_size_align
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        Ok(Self {
            ptr,
            size,
            layout: Some(layout),
            guard: RwLock::new(()),
        })
    }

    /// Wrap native memory.
    ///
    /// # Safety
    ///
    /// `address` must point to `size` readable and writable bytes that stay
    /// valid for as long as this storage (or any block built on it) exists.
    pub(crate) unsafe fn foreign(address: usize, size: usize) -> Result<Self> {
        let ptr = NonNull::new(address as *mut u8).ok_or(Error::NullPointer)?;
        Ok(Self {
            ptr,
            size,
            layout: None,
            guard: RwLock::new(()),
        })
    }

    pub(crate) fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub(crate) fn len(&self) -> usize {
        self.size
    }

    pub(crate) fn is_owned(&self) -> bool {
        self.layout.is_some()
    }

    fn check(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::OutOfBounds {
                offset,
                len,
                size: self.size,
            }),
        }
    }

    /// Run `f` over `[offset, offset + len)`.
    pub(crate) fn with_slice<R>(&self, offset: usize, len: usize, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        self.check(offset, len)?;
        let _read = self.guard.read();
        // SAFETY:
        // - [offset, offset + len) lies inside the region (checked above)
        // - the region is valid for the lifetime of self (allocation or caller contract)
        // - no safe writer can run while the read guard is held
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), len) };
        Ok(f(bytes))
    }

    /// Run `f` over `[offset, offset + len)` mutably.
    pub(crate) fn with_slice_mut<R>(
        &self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R> {
        self.check(offset, len)?;
        let _write = self.guard.write();
        // SAFETY:
        // - [offset, offset + len) lies inside the region (checked above)
        // - the write guard excludes every other safe reader and writer
        let bytes = unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), len) };
        Ok(f(bytes))
    }

    /// Copy `len` bytes within this storage (ranges may overlap).
    pub(crate) fn copy_within(&self, src: usize, dst: usize, len: usize) -> Result<()> {
        self.check(src, len)?;
        self.check(dst, len)?;
        let _write = self.guard.write();
        // SAFETY:
        // - both ranges were bounds-checked above
        // - ptr::copy handles overlapping ranges
        unsafe {
            ptr::copy(self.ptr.as_ptr().add(src), self.ptr.as_ptr().add(dst), len);
        }
        Ok(())
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            // SAFETY:
            // - ptr was returned by alloc_zeroed with exactly this layout
            // - Storage is dropped once, after the last Arc holder is gone
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_zeroed_and_aligned() {
        let storage = Storage::allocate(24).expect("alloc");
        assert_eq!(storage.len(), 24);
        assert_eq!(storage.address() % STORAGE_ALIGN, 0);
        assert!(storage.is_owned());
        let bytes = storage.with_slice(0, 24, <[u8]>::to_vec).expect("read");
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_zero_size_has_address() {
        let storage = Storage::allocate(0).expect("alloc");
        assert_ne!(storage.address(), 0);
        assert!(storage.with_slice(0, 1, |_| ()).is_err());
        assert!(storage.with_slice(0, 0, |b| b.len()).is_ok());
    }

    #[test]
    fn test_bounds() {
        let storage = Storage::allocate(4).expect("alloc");
        let err = storage.with_slice_mut(2, 4, |_| ()).expect_err("oob");
        assert!(matches!(err, Error::OutOfBounds { offset: 2, len: 4, size: 4 }));
        assert!(storage.with_slice(usize::MAX, 2, |_| ()).is_err());
    }

    #[test]
    fn test_copy_within() {
        let storage = Storage::allocate(4).expect("alloc");
        storage
            .with_slice_mut(0, 2, |b| b.copy_from_slice(&[1, 2]))
            .expect("write");
        storage.copy_within(0, 1, 2).expect("copy");
        let bytes = storage.with_slice(0, 4, <[u8]>::to_vec).expect("read");
        assert_eq!(bytes, vec![1, 1, 2, 0]);
    }

    #[test]
    fn test_foreign_null_rejected() {
        // SAFETY: a null address is rejected before any access
        let result = unsafe { Storage::foreign(0, 4) };
        assert!(matches!(result, Err(Error::NullPointer)));
    }
}
