// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # cdata - C-ABI type descriptors and memory marshalling
//!
//! Lets a managed runtime describe C types at run time (structs, unions,
//! fixed-size arrays, pointers, function pointers), compute their native
//! layout, and read and write instances of them in raw memory.
//!
//! ## Quick Start
//!
//! ```rust
//! use cdata::simple::c_int;
//! use cdata::{CData, CType, FieldDef, RecordDef, Result, Value};
//!
//! fn main() -> Result<()> {
//!     let point = CType::define_struct(
//!         "POINT",
//!         RecordDef::new(vec![FieldDef::new("x", &c_int()), FieldDef::new("y", &c_int())]),
//!     )?;
//!     assert_eq!(point.size(), 8);
//!
//!     let p = CData::new(&point)?;
//!     p.write_member("y", &Value::Int(7))?;
//!     assert_eq!(p.read_member("y")?, Value::Int(7));
//!     assert_eq!(&p.to_bytes()[4..], &7i32.to_ne_bytes());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  Definitions: Attributes -> RecordDef / ArrayDef / PointerDef /     |
//! |               FuncPtrDef (validated up front)                       |
//! +---------------------------------------------------------------------+
//! |  Types: CType + StgInfo (size, align, shape, FFI type, format)      |
//! |         layout engine | kind table | TypeCache (per Context)        |
//! +---------------------------------------------------------------------+
//! |  Instances: CData = TypeRef + MemoryBlock (owned | view | foreign)  |
//! |             members | items | pointers | BufferView | keep-alive    |
//! +---------------------------------------------------------------------+
//! |  Callbacks: Trampoline + CallbackRegistry + cdata_callback_dispatch |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CType`] | Type descriptor; identity is the `Arc` |
//! | [`CData`] | An instance: type plus memory block |
//! | [`MemoryBlock`] | Owned, borrowed or foreign native bytes |
//! | [`Context`] | Derived-type cache, callbacks, runtime config |
//! | [`Value`] | Managed value exchanged with native memory |
//!
//! ## Modules Overview
//!
//! - [`types`] - kind table, descriptors, layout and type builders
//! - [`data`] - instances and their member/sequence/buffer surfaces
//! - [`memory`] - memory blocks and keep-alive
//! - [`callback`] - native-callable trampolines
//! - [`config`] - ABI constants and runtime configuration

/// Native-callable trampolines into managed callables.
pub mod callback;
/// ABI constants and runtime configuration.
pub mod config;
/// Runtime context (type cache, callbacks, config).
pub mod context;
/// C instances.
pub mod data;
/// Error type.
pub mod error;
/// Memory blocks backing instances.
pub mod memory;
/// Process-wide simple types.
pub mod simple;
/// C type model.
pub mod types;
/// Managed values.
pub mod value;

pub use callback::{cdata_callback_dispatch, CallbackId, CallbackRegistry, Trampoline};
pub use config::{CallbackErrorPolicy, RuntimeConfig};
pub use context::Context;
pub use data::{BufferView, CData};
pub use error::{CallbackError, Error, Result};
pub use memory::MemoryBlock;
pub use types::{
    ArgType, ArrayDef, Attributes, ByteOrder, CType, CallFlags, FieldDef, FuncPtrDef, PointerDef,
    PrimitiveKind, RecordDef, ReturnType, TypeFlags, TypeRef,
};
pub use value::{Callable, ObjectRef, Value};
