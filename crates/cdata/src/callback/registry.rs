// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Callback registry: id -> trampoline.
//!
//! Kept apart from the type cache. Native code reaches trampolines through
//! the process-wide registry, since the ids it holds are process-wide too.

use super::trampoline::{CallbackId, Entries, Trampoline};
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::types::TypeRef;
use crate::value::Callable;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

static GLOBAL_CALLBACKS: OnceLock<CallbackRegistry> = OnceLock::new();

/// Registered trampolines.
///
/// An entry lives as long as some handle to its trampoline does: the one
/// returned by [`register`](Self::register), or a function-pointer instance
/// created from it.
pub struct CallbackRegistry {
    entries: Arc<Entries>,
    next_id: AtomicU64,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry consulted by [`cdata_callback_dispatch`](super::cdata_callback_dispatch).
    pub fn global() -> &'static CallbackRegistry {
        GLOBAL_CALLBACKS.get_or_init(CallbackRegistry::new)
    }

    /// Bind `callable` to function-pointer type `ty`.
    ///
    /// Every declared argument type must be a C type.
    pub fn register(
        &self,
        ty: &TypeRef,
        callable: Callable,
        config: Arc<ArcSwap<RuntimeConfig>>,
    ) -> Result<Trampoline> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let trampoline = Trampoline::new(id, ty, callable, config, Arc::downgrade(&self.entries))?;
        self.entries.insert(id, trampoline.downgrade());
        log::debug!("[callback] registered #{} for '{}'", id, ty.name());
        Ok(trampoline)
    }

    pub fn get(&self, id: CallbackId) -> Option<Trampoline> {
        let weak = self.entries.get(&id).map(|e| e.value().clone())?;
        Trampoline::upgrade(&weak)
    }

    /// Stop routing native calls for `id`; live handles stay usable.
    pub fn unregister(&self, id: CallbackId) -> Option<Trampoline> {
        let (_, weak) = self.entries.remove(&id)?;
        log::debug!("[callback] unregistered #{}", id);
        Trampoline::upgrade(&weak)
    }

    /// Invoke trampoline `id` on native argument slots.
    pub fn invoke(&self, id: CallbackId, args: &[&[u8]], ret: &mut [u8]) -> Result<()> {
        let trampoline = self.get(id).ok_or(Error::UnknownCallback(id))?;
        trampoline.invoke(args, ret)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
