// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Concurrent cache of derived types.
//!
//! Derived array types are memoized per `(item type identity, length)` and
//! pointer types per target identity, so that deriving the same type twice
//! yields the same [`TypeRef`]. Builds are serialized behind a reentrant
//! lock and re-checked once it is held, so two threads racing on one key run
//! the builder once and observe the same handle. No map shard lock is held
//! while a builder runs, so a builder may derive further types through the
//! same cache.
//!
//! Entries are never evicted. Each cached type holds a strong reference to
//! its item/target, so the address used as key cannot be reused while the
//! entry exists.

use crate::error::Result;
use crate::types::TypeRef;
use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};
use std::convert::Infallible;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ArrayKey {
    item: usize,
    length: u32,
}

/// Cache hit/miss statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct LookupStats {
    pub hits: u64,
    pub misses: u64,
    /// Time spent building the most recent missed type.
    pub last_build_ns: u64,
}

/// Derived-type cache.
#[derive(Default)]
pub struct TypeCache {
    arrays: DashMap<ArrayKey, TypeRef>,
    pointers: DashMap<usize, TypeRef>,
    stats: RwLock<LookupStats>,
    build_lock: ReentrantMutex<()>,
}

impl TypeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the array type cached for `(item, length)`, building it with
    /// `build` on first use.
    ///
    /// `build` runs at most once per key. A failed build inserts nothing.
    pub fn get_or_create<F>(&self, item: &TypeRef, length: u32, build: F) -> Result<TypeRef>
    where
        F: FnOnce() -> Result<TypeRef>,
    {
        let key = ArrayKey {
            item: Arc::as_ptr(item) as usize,
            length,
        };
        self.lookup_or_build(&self.arrays, key, "array", build)
    }

    /// Pointer-type counterpart of [`get_or_create`](Self::get_or_create),
    /// keyed by target identity (`None` for the untyped pointer).
    pub fn get_or_create_pointer<F>(&self, target: Option<&TypeRef>, build: F) -> TypeRef
    where
        F: FnOnce() -> TypeRef,
    {
        let key = target.map_or(0, |t| Arc::as_ptr(t) as usize);
        match self.lookup_or_build::<_, Infallible>(&self.pointers, key, "pointer", || Ok(build())) {
            Ok(ty) => ty,
            Err(never) => match never {},
        }
    }

    fn lookup_or_build<K, E>(
        &self,
        map: &DashMap<K, TypeRef>,
        key: K,
        what: &str,
        build: impl FnOnce() -> std::result::Result<TypeRef, E>,
    ) -> std::result::Result<TypeRef, E>
    where
        K: Eq + Hash,
    {
        if let Some(hit) = map.get(&key) {
            self.record_hit();
            return Ok(Arc::clone(hit.value()));
        }

        let _building = self.build_lock.lock();
        if let Some(hit) = map.get(&key) {
            self.record_hit();
            return Ok(Arc::clone(hit.value()));
        }
        let start = Instant::now();
        let built = build()?;
        let stored = Arc::clone(map.entry(key).or_insert(built).value());
        self.record_miss(start);
        log::debug!("[type_cache] cached {} type '{}'", what, stored.name());
        Ok(stored)
    }

    /// Cached array type, if any.
    pub fn peek(&self, item: &TypeRef, length: u32) -> Option<TypeRef> {
        let key = ArrayKey {
            item: Arc::as_ptr(item) as usize,
            length,
        };
        self.arrays.get(&key).map(|e| Arc::clone(e.value()))
    }

    /// Number of cached derived types.
    pub fn len(&self) -> usize {
        self.arrays.len() + self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> LookupStats {
        *self.stats.read()
    }

    fn record_hit(&self) {
        let mut stats = self.stats.write();
        stats.hits = stats.hits.saturating_add(1);
    }

    fn record_miss(&self, start: Instant) {
        let mut stats = self.stats.write();
        stats.misses = stats.misses.saturating_add(1);
        stats.last_build_ns = start.elapsed().as_nanos() as u64;
    }
}
