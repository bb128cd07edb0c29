// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Trampolines: managed callables invoked from native code.
//!
//! A trampoline binds a function-pointer type to a [`Callable`]. Native
//! arguments are decoded through the declared argument types, the callable
//! runs, and its result is encoded into the native result slot. Failures
//! (including panics) never cross back into native code: they are logged,
//! the result slot is zeroed, and the configured [`CallbackErrorPolicy`]
//! decides what happens next.

use crate::config::{CallbackErrorPolicy, RuntimeConfig};
use crate::error::{Error, Result};
use crate::types::funcptr::decode_result;
use crate::types::{ByteOrder, PrimitiveKind, ReturnType, Signature, TypeRef};
use crate::value::{Callable, Value};
use arc_swap::ArcSwap;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use dashmap::DashMap;
use std::sync::{Arc, Weak};

/// Registry key of a trampoline.
pub type CallbackId = u64;

/// Native entry point signature: `(id, args, nargs, ret, ret_len) -> status`.
pub type DispatchFn = unsafe extern "C" fn(CallbackId, *const *const u8, usize, *mut u8, usize) -> i32;

/// What a function-pointer instance created from a callback points at.
///
/// Native glue calls `dispatch(id, ...)` to reach the trampoline.
#[repr(C)]
#[derive(Debug)]
pub struct ThunkRecord {
    pub dispatch: DispatchFn,
    pub id: CallbackId,
}

/// Registry entries: trampolines are held weakly and drop out of the map
/// with their last handle.
pub(super) type Entries = DashMap<CallbackId, Weak<TrampolineInner>>;

pub(super) struct TrampolineInner {
    id: CallbackId,
    registry: Weak<Entries>,
    ty: TypeRef,
    signature: Arc<Signature>,
    arg_types: Vec<TypeRef>,
    callable: Callable,
    config: Arc<ArcSwap<RuntimeConfig>>,
    thunk: Box<ThunkRecord>,
}

/// A registered callback.
#[derive(Clone)]
pub struct Trampoline(Arc<TrampolineInner>);

impl Trampoline {
    pub(crate) fn new(
        id: CallbackId,
        ty: &TypeRef,
        callable: Callable,
        config: Arc<ArcSwap<RuntimeConfig>>,
        registry: Weak<Entries>,
    ) -> Result<Self> {
        let signature = ty.signature().ok_or_else(|| Error::TypeMismatch {
            expected: "function pointer type".to_string(),
            got: "ctypes type",
        })?;
        let mut arg_types = Vec::new();
        for (i, arg) in signature.arg_types.iter().flatten().enumerate() {
            let c_type = arg
                .c_type()
                .ok_or(Error::NoConverterCapability { position: i + 1 })?;
            arg_types.push(c_type);
        }
        let thunk = Box::new(ThunkRecord {
            dispatch: super::ffi::cdata_callback_dispatch,
            id,
        });
        Ok(Self(Arc::new(TrampolineInner {
            id,
            registry,
            ty: Arc::clone(ty),
            signature,
            arg_types,
            callable,
            config,
            thunk,
        })))
    }

    pub fn id(&self) -> CallbackId {
        self.0.id
    }

    pub(super) fn downgrade(&self) -> Weak<TrampolineInner> {
        Arc::downgrade(&self.0)
    }

    pub(super) fn upgrade(weak: &Weak<TrampolineInner>) -> Option<Self> {
        weak.upgrade().map(Self)
    }

    /// The function-pointer type this trampoline implements.
    pub fn ty(&self) -> &TypeRef {
        &self.0.ty
    }

    /// Declared argument types, in order.
    pub fn arg_types(&self) -> &[TypeRef] {
        &self.0.arg_types
    }

    /// Bytes the native caller must provide for the result.
    pub fn result_size(&self) -> usize {
        self.0.signature.result_size()
    }

    /// Address native code calls through (a [`ThunkRecord`]).
    pub fn code_address(&self) -> usize {
        &*self.0.thunk as *const ThunkRecord as usize
    }

    /// Run the callable on native argument slots and fill `ret`.
    ///
    /// `args[i]` holds the native bytes of argument `i`. Only the slots that
    /// have a declared type are decoded; arity is left to the callable, which
    /// sees however many of them arrived. On failure `ret` is zeroed; under
    /// [`CallbackErrorPolicy::Abort`] the process aborts.
    pub fn invoke(&self, args: &[&[u8]], ret: &mut [u8]) -> Result<()> {
        let config = self.0.config.load();
        if config.trace_callbacks {
            log::debug!(
                "[callback] invoking #{} '{}' with {} arg(s)",
                self.0.id,
                self.0.ty.name(),
                args.len()
            );
        }
        let err = match self.run(args, ret) {
            Ok(()) => return Ok(()),
            Err(Error::CallbackFailed(msg)) => msg,
            Err(other) => other.to_string(),
        };
        ret.fill(0);
        log::error!(
            "[callback] #{} '{}' failed: {}",
            self.0.id,
            self.0.ty.name(),
            err
        );
        match config.callback_error_policy {
            CallbackErrorPolicy::Report => Err(Error::CallbackFailed(err)),
            CallbackErrorPolicy::Abort => std::process::abort(),
        }
    }

    fn run(&self, args: &[&[u8]], ret: &mut [u8]) -> Result<()> {
        let values = self
            .0
            .arg_types
            .iter()
            .zip(args)
            .map(|(ty, raw)| decode_result(ty, raw))
            .collect::<Result<Vec<_>>>()?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.0.callable.call(&values)));
        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => return Err(Error::CallbackFailed(err.message)),
            Err(payload) => return Err(Error::CallbackFailed(panic_message(&*payload))),
        };
        self.store_result(&value, ret)
    }

    fn store_result(&self, value: &Value, ret: &mut [u8]) -> Result<()> {
        let ty = match &self.0.signature.restype {
            ReturnType::None => return Ok(()),
            ReturnType::Callable(_) => {
                return PrimitiveKind::I32.set(ret, 0, value, ByteOrder::NATIVE)
            }
            ReturnType::Type(ty) => ty,
        };
        let size = ty.size() as usize;
        if ret.len() < size {
            return Err(Error::BufferTooSmall {
                needed: size,
                available: ret.len(),
            });
        }
        if let Some(kind) = ty.primitive() {
            return kind.set(ret, 0, value, ByteOrder::NATIVE);
        }
        match value {
            Value::Data(d) if Arc::ptr_eq(d.ty(), ty) => {
                ret[..size].copy_from_slice(&d.to_bytes());
                Ok(())
            }
            other if ty.is_pointer() => PrimitiveKind::Pointer.set(ret, 0, other, ByteOrder::NATIVE),
            other => Err(Error::TypeMismatch {
                expected: ty.name().to_string(),
                got: other.type_name(),
            }),
        }
    }
}

impl Drop for TrampolineInner {
    fn drop(&mut self) {
        let Some(entries) = self.registry.upgrade() else {
            return;
        };
        if entries.remove(&self.id).is_some() {
            log::debug!("[callback] released #{}", self.id);
        }
    }
}

impl fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline")
            .field("id", &self.0.id)
            .field("type", &self.0.ty.name())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}
