// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime context: derived-type cache, callbacks and runtime configuration.
//!
//! A host embedding normally uses [`Context::global`]; separate contexts
//! are useful in tests or to isolate caches. Callback ids are process-wide,
//! so every context registers trampolines in the global registry.

use crate::callback::{CallbackId, CallbackRegistry, Trampoline};
use crate::config::RuntimeConfig;
use crate::data::CData;
use crate::error::Result;
use crate::types::{ArrayDef, FuncPtrDef, PointerDef, TypeCache, TypeRef};
use crate::value::Callable;
use arc_swap::ArcSwap;
use std::sync::{Arc, OnceLock};

static GLOBAL_CONTEXT: OnceLock<Context> = OnceLock::new();

/// Shared runtime state.
pub struct Context {
    types: TypeCache,
    callbacks: &'static CallbackRegistry,
    config: Arc<ArcSwap<RuntimeConfig>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::with_config(RuntimeConfig::default())
    }
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            types: TypeCache::new(),
            callbacks: CallbackRegistry::global(),
            config: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Process-wide context (created on first use).
    pub fn global() -> &'static Context {
        GLOBAL_CONTEXT.get_or_init(Context::new)
    }

    // =======================================================================
    // Configuration
    // =======================================================================

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<RuntimeConfig> {
        self.config.load_full()
    }

    /// Replace the configuration; running trampolines see it on their next call.
    pub fn set_config(&self, config: RuntimeConfig) {
        log::debug!("[context] runtime config updated: {:?}", config);
        self.config.store(Arc::new(config));
    }

    /// Load the configuration from a YAML file.
    #[cfg(feature = "config-loaders")]
    pub fn load_config(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let config = crate::config::yaml::YamlLoader::load_file(path)?;
        self.set_config(config);
        Ok(())
    }

    // =======================================================================
    // Derived types
    // =======================================================================

    pub fn type_cache(&self) -> &TypeCache {
        &self.types
    }

    /// `item * length`, cached per item identity and length.
    pub fn array_type(&self, item: &TypeRef, length: u32) -> Result<TypeRef> {
        self.types
            .get_or_create(item, length, || ArrayDef::new(item, length).build())
    }

    /// `POINTER(target)`, cached per target identity (`None` for `void *`).
    pub fn pointer_type(&self, target: Option<&TypeRef>) -> TypeRef {
        self.types.get_or_create_pointer(target, || match target {
            Some(t) => PointerDef::new(t).build(),
            None => PointerDef::untyped().build(),
        })
    }

    /// `pointer(obj)`: a new pointer instance addressing `target`.
    pub fn pointer(&self, target: &CData) -> Result<CData> {
        let ty = self.pointer_type(Some(target.ty()));
        CData::pointer_to(&ty, target)
    }

    /// Function-pointer type from a validated definition (not cached).
    pub fn function_type(&self, def: &FuncPtrDef) -> Result<TypeRef> {
        def.build()
    }

    // =======================================================================
    // Callbacks
    // =======================================================================

    /// Bind `callable` to function-pointer type `ty`.
    pub fn register_callback(&self, ty: &TypeRef, callable: Callable) -> Result<Trampoline> {
        self.callbacks
            .register(ty, callable, Arc::clone(&self.config))
    }

    /// Register `callable` and wrap it in a function-pointer instance.
    pub fn callback(&self, ty: &TypeRef, callable: Callable) -> Result<CData> {
        let trampoline = self.register_callback(ty, callable)?;
        CData::from_callback(&trampoline)
    }

    pub fn unregister_callback(&self, id: CallbackId) -> Option<Trampoline> {
        self.callbacks.unregister(id)
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        self.callbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CallbackErrorPolicy;
    use crate::simple::{c_char, c_int};
    use crate::types::ReturnType;
    use crate::value::Value;

    #[test]
    fn test_array_types_are_cached() {
        let ctx = Context::new();
        let a = ctx.array_type(&c_int(), 4).expect("array");
        let b = ctx.array_type(&c_int(), 4).expect("array");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.size(), 16);
        assert_eq!(ctx.type_cache().stats().hits, 1);
    }

    #[test]
    fn test_contexts_do_not_share_caches() {
        let one = Context::new();
        let two = Context::new();
        let a = one.array_type(&c_char(), 3).expect("array");
        let b = two.array_type(&c_char(), 3).expect("array");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_pointer_helper() {
        let ctx = Context::new();
        let target = CData::new(&c_int()).expect("int");
        target.set_value(&Value::Int(8)).expect("set");
        let p = ctx.pointer(&target).expect("pointer");
        assert!(Arc::ptr_eq(p.ty(), &ctx.pointer_type(Some(&c_int()))));
        assert_eq!(p.contents().expect("contents").value().expect("value"), Value::Int(8));
    }

    #[test]
    fn test_config_swap() {
        let ctx = Context::new();
        assert_eq!(ctx.config().callback_error_policy, CallbackErrorPolicy::Report);
        ctx.set_config(RuntimeConfig {
            callback_error_policy: CallbackErrorPolicy::Report,
            trace_callbacks: true,
        });
        assert!(ctx.config().trace_callbacks);
    }

    #[test]
    fn test_callback_instance_keeps_trampoline() {
        let ctx = Context::new();
        let ty = ctx
            .function_type(
                &FuncPtrDef::new(0)
                    .with_args(&[c_int()])
                    .with_restype(ReturnType::Type(c_int())),
            )
            .expect("funcptr");
        let double = Callable::new(|args| Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2)));
        let f = ctx.callback(&ty, double).expect("callback");
        let tr = f.trampoline().expect("trampoline");
        assert_eq!(f.value().expect("address"), Value::Address(tr.code_address()));

        ctx.unregister_callback(tr.id());
        let arg = 21i32.to_ne_bytes();
        let mut ret = [0u8; 4];
        f.trampoline()
            .expect("still alive")
            .invoke(&[&arg], &mut ret)
            .expect("invoke");
        assert_eq!(i32::from_ne_bytes(ret), 42);
    }
}
