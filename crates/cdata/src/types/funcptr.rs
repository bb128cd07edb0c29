// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Function-pointer type builder and call marshalling contract.
//!
//! A function-pointer type does not encode its signature structurally: the
//! argument types only need to supply a value converter (`from_param`), not
//! a native layout. The descriptor itself is an opaque pointer (`X{}`).

use crate::data::CData;
use crate::error::{Error, Result};
use crate::types::descriptor::{CType, StgInfo, TypeFlags, TypeKind, TypeRef};
use crate::types::kind::{write_uint, ByteOrder, PrimitiveKind};
use crate::types::{Attributes, FfiType};
use crate::value::{Callable, Value};
use std::fmt;
use std::sync::Arc;

// =======================================================================
// Argument conversion
// =======================================================================

/// A native argument ready for the call layer.
#[derive(Debug, Clone)]
pub struct NativeArg {
    pub ffi_type: FfiType,
    /// Argument bytes in native order.
    pub bytes: Vec<u8>,
    /// Managed object that must outlive the call.
    pub keep: Option<Value>,
}

impl NativeArg {
    fn pointer(address: usize, keep: Option<Value>) -> Self {
        Self {
            ffi_type: FfiType::Pointer,
            bytes: address.to_ne_bytes().to_vec(),
            keep,
        }
    }
}

type ConvertFn = dyn Fn(&Value) -> Result<NativeArg> + Send + Sync;

/// Value-to-native converter (`from_param`).
#[derive(Clone)]
pub struct Converter(Arc<ConvertFn>);

impl Converter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<NativeArg> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn convert(&self, value: &Value) -> Result<NativeArg> {
        (self.0)(value)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Converter({:p})", Arc::as_ptr(&self.0))
    }
}

/// Anything usable in `_argtypes_`.
///
/// C types implement it; host types that only know how to convert call
/// arguments can implement it too and travel as [`Value::Param`].
pub trait ParamType: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;

    /// Build the argument converter, or `None` when the type has no
    /// conversion capability.
    fn param_converter(&self) -> Option<Converter>;

    /// The C type behind this entry, if any. Callbacks decode native
    /// arguments through it.
    fn c_type(&self) -> Option<TypeRef> {
        None
    }
}

/// Shared `_argtypes_` entry.
pub type ArgType = Arc<dyn ParamType>;

fn mismatch(ty: &CType, value: &Value) -> Error {
    Error::TypeMismatch {
        expected: ty.name().to_string(),
        got: value.type_name(),
    }
}

fn encode_simple(kind: PrimitiveKind, value: &Value) -> Result<NativeArg> {
    let raw = kind.encode(value)?;
    let mut bytes = vec![0u8; kind.size() as usize];
    write_uint(&mut bytes, raw, ByteOrder::NATIVE);
    let keep = matches!(value, Value::Data(_)).then(|| value.clone());
    Ok(NativeArg {
        ffi_type: kind.ffi_type(),
        bytes,
        keep,
    })
}

// Instances of pointer-like types hand over the address they store.
fn stored_address(data: &CData) -> Result<usize> {
    match data.value()? {
        Value::Address(addr) => Ok(addr),
        Value::None => Ok(0),
        other => Err(Error::TypeMismatch {
            expected: "pointer".to_string(),
            got: other.type_name(),
        }),
    }
}

fn convert_for(ty: &TypeRef, value: &Value) -> Result<NativeArg> {
    match (ty.kind(), value) {
        (TypeKind::Simple(kind), Value::Data(d)) if d.ty().primitive() == Some(kind) => {
            encode_simple(kind, &d.value()?)
        }
        (TypeKind::Simple(kind), _) => encode_simple(kind, value),
        (TypeKind::Struct(_) | TypeKind::Union(_), Value::Data(d)) if Arc::ptr_eq(d.ty(), ty) => {
            Ok(NativeArg {
                ffi_type: ty.ffi_type(),
                bytes: d.to_bytes(),
                keep: Some(value.clone()),
            })
        }
        (TypeKind::Array { .. }, Value::Data(d)) if Arc::ptr_eq(d.ty(), ty) => {
            Ok(NativeArg::pointer(d.as_pointer(), Some(value.clone())))
        }
        (TypeKind::Pointer { target }, Value::Data(d)) => {
            if Arc::ptr_eq(d.ty(), ty) {
                return Ok(NativeArg::pointer(stored_address(d)?, Some(value.clone())));
            }
            let item = d.ty().item_type().filter(|_| d.ty().is_array());
            let pointee_matches = target
                .as_ref()
                .is_some_and(|t| Arc::ptr_eq(t, d.ty()) || item.as_ref().is_some_and(|i| Arc::ptr_eq(i, t)));
            if pointee_matches {
                // byref: pass the instance's own address
                Ok(NativeArg::pointer(d.as_pointer(), Some(value.clone())))
            } else {
                Err(mismatch(ty, value))
            }
        }
        (TypeKind::FunctionPointer(_), Value::Data(d)) if d.ty().signature().is_some() => {
            Ok(NativeArg::pointer(stored_address(d)?, Some(value.clone())))
        }
        (
            TypeKind::Array { .. } | TypeKind::Pointer { .. } | TypeKind::FunctionPointer(_),
            Value::None,
        ) => Ok(NativeArg::pointer(0, None)),
        (TypeKind::Pointer { .. } | TypeKind::FunctionPointer(_), Value::Address(addr)) => {
            Ok(NativeArg::pointer(*addr, None))
        }
        _ => Err(mismatch(ty, value)),
    }
}

impl ParamType for CType {
    fn type_name(&self) -> &str {
        self.name()
    }

    fn param_converter(&self) -> Option<Converter> {
        let ty = self.to_ref()?;
        Some(Converter::new(move |value| convert_for(&ty, value)))
    }

    fn c_type(&self) -> Option<TypeRef> {
        self.to_ref()
    }
}

// Conversion used for arguments with no declared type.
fn default_arg(value: &Value) -> Result<NativeArg> {
    match value {
        Value::Int(_) | Value::Bool(_) => encode_simple(PrimitiveKind::I32, value),
        Value::Float(_) => encode_simple(PrimitiveKind::F64, value),
        Value::None => Ok(NativeArg::pointer(0, None)),
        Value::Address(addr) => Ok(NativeArg::pointer(*addr, None)),
        Value::Data(d) => convert_for(d.ty(), value),
        other => Err(Error::TypeMismatch {
            expected: "int, float, None, address or ctypes instance".to_string(),
            got: other.type_name(),
        }),
    }
}

// =======================================================================
// Signature
// =======================================================================

/// Calling convention and special-behaviour bits (`_flags_`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CallFlags(u32);

impl CallFlags {
    pub const STDCALL: u32 = 0x0;
    pub const CDECL: u32 = 0x1;
    pub const HRESULT: u32 = 0x2;
    pub const PYTHONAPI: u32 = 0x4;
    pub const USE_ERRNO: u32 = 0x8;
    pub const USE_LASTERROR: u32 = 0x10;

    pub const fn from_bits(bits: u32) -> Self {
        CallFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Caller-cleanup convention; allows extra variadic arguments.
    pub const fn is_cdecl(self) -> bool {
        self.0 & Self::CDECL != 0
    }

    pub const fn is_hresult(self) -> bool {
        self.0 & Self::HRESULT != 0
    }

    pub const fn uses_errno(self) -> bool {
        self.0 & Self::USE_ERRNO != 0
    }

    pub const fn uses_last_error(self) -> bool {
        self.0 & Self::USE_LASTERROR != 0
    }

    pub const fn is_pythonapi(self) -> bool {
        self.0 & Self::PYTHONAPI != 0
    }
}

/// `_restype_`.
#[derive(Debug, Clone, Default)]
pub enum ReturnType {
    /// `void`.
    #[default]
    None,
    Type(TypeRef),
    /// Applied to the raw `int` result.
    Callable(Callable),
}

/// Marshalling contract of a function-pointer type.
pub struct Signature {
    /// `None` when `_argtypes_` was not given: no arity check, default conversions.
    pub arg_types: Option<Vec<ArgType>>,
    /// One per declared argument type.
    pub converters: Vec<Converter>,
    pub restype: ReturnType,
    /// `_check_retval_` of the return type.
    pub return_checker: Option<Callable>,
    pub flags: CallFlags,
}

impl Signature {
    pub fn arg_count(&self) -> Option<usize> {
        self.arg_types.as_ref().map(Vec::len)
    }

    /// Convert call arguments.
    ///
    /// Requires exactly one argument per declared type; `CDECL` signatures
    /// accept extra trailing arguments, converted with the default rules.
    pub fn convert_args(&self, args: &[Value]) -> Result<Vec<NativeArg>> {
        let declared = self.converters.len();
        if self.arg_types.is_some() {
            let too_few = args.len() < declared;
            let too_many = args.len() > declared && !self.flags.is_cdecl();
            if too_few || too_many {
                return Err(Error::ArgumentCount {
                    expected: declared,
                    given: args.len(),
                });
            }
        }
        let mut out = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let converted = match self.converters.get(i) {
                Some(conv) => conv.convert(arg)?,
                None => default_arg(arg)?,
            };
            out.push(converted);
        }
        Ok(out)
    }

    /// Native size of the result slot.
    pub fn result_size(&self) -> usize {
        match &self.restype {
            ReturnType::None => 0,
            ReturnType::Type(ty) => ty.size() as usize,
            ReturnType::Callable(_) => PrimitiveKind::I32.size() as usize,
        }
    }

    /// Decode a raw result and run the return checker.
    pub fn convert_result(&self, raw: &[u8]) -> Result<Value> {
        let value = match &self.restype {
            ReturnType::None => return Ok(Value::None),
            ReturnType::Type(ty) => decode_result(ty, raw)?,
            ReturnType::Callable(hook) => {
                let status = PrimitiveKind::I32.get(raw, 0, ByteOrder::NATIVE)?;
                return hook
                    .call(&[status])
                    .map_err(|e| Error::CallbackFailed(e.message));
            }
        };
        match &self.return_checker {
            Some(check) => check
                .call(&[value])
                .map_err(|e| Error::CallbackFailed(e.message)),
            None => Ok(value),
        }
    }
}

pub(crate) fn decode_result(ty: &TypeRef, raw: &[u8]) -> Result<Value> {
    match ty.primitive() {
        Some(kind) => kind.get(raw, 0, ByteOrder::NATIVE),
        None => CData::from_buffer_copy(ty, raw, 0).map(Value::Data),
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Option<Vec<&str>> = self
            .arg_types
            .as_ref()
            .map(|types| types.iter().map(|t| t.type_name()).collect());
        f.debug_struct("Signature")
            .field("arg_types", &args)
            .field("restype", &self.restype)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

// =======================================================================
// Builder
// =======================================================================

/// Validated function-pointer definition.
#[derive(Debug, Clone)]
pub struct FuncPtrDef {
    pub name: String,
    pub flags: CallFlags,
    pub argtypes: Option<Vec<ArgType>>,
    pub restype: ReturnType,
}

impl FuncPtrDef {
    pub fn new(flags: u32) -> Self {
        Self {
            name: "CFunctionType".to_string(),
            flags: CallFlags::from_bits(flags),
            argtypes: None,
            restype: ReturnType::None,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_argtypes(mut self, argtypes: Vec<ArgType>) -> Self {
        self.argtypes = Some(argtypes);
        self
    }

    /// Declared C argument types.
    #[must_use]
    pub fn with_args(self, args: &[TypeRef]) -> Self {
        let argtypes = args.iter().map(|t| Arc::clone(t) as ArgType).collect();
        self.with_argtypes(argtypes)
    }

    #[must_use]
    pub fn with_restype(mut self, restype: ReturnType) -> Self {
        self.restype = restype;
        self
    }

    /// Parse `_flags_`, `_argtypes_` and `_restype_`.
    pub fn from_attributes(attrs: &Attributes) -> Result<Self> {
        let flags = attrs.require_int("_flags_")?;
        let flags = u32::try_from(flags).map_err(|_| Error::InvalidAttributeType {
            attribute: "_flags_",
            expected: "a non-negative integer",
        })?;
        let mut def = Self::new(flags);

        match attrs.get("_argtypes_") {
            None | Some(Value::None) => {}
            Some(Value::List(items)) => {
                let mut argtypes = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let arg: ArgType = match item {
                        Value::Type(ty) => Arc::clone(ty) as ArgType,
                        Value::Param(p) => Arc::clone(p),
                        _ => return Err(Error::NoConverterCapability { position: i + 1 }),
                    };
                    argtypes.push(arg);
                }
                def.argtypes = Some(argtypes);
            }
            Some(_) => {
                return Err(Error::InvalidAttributeType {
                    attribute: "_argtypes_",
                    expected: "a sequence of types",
                })
            }
        }

        def.restype = match attrs.get("_restype_") {
            None | Some(Value::None) => ReturnType::None,
            Some(Value::Type(ty)) => ReturnType::Type(Arc::clone(ty)),
            Some(Value::Callable(c)) => ReturnType::Callable(c.clone()),
            Some(_) => return Err(Error::InvalidReturnType),
        };
        Ok(def)
    }

    /// Build the signature without wrapping it in a type.
    pub fn signature(&self) -> Result<Signature> {
        let mut converters = Vec::new();
        if let Some(argtypes) = &self.argtypes {
            converters.reserve(argtypes.len());
            for (i, arg) in argtypes.iter().enumerate() {
                let conv = arg
                    .param_converter()
                    .ok_or(Error::NoConverterCapability { position: i + 1 })?;
                converters.push(conv);
            }
        }
        let return_checker = match &self.restype {
            ReturnType::Type(ty) => ty.check_retval(),
            _ => None,
        };
        Ok(Signature {
            arg_types: self.argtypes.clone(),
            converters,
            restype: self.restype.clone(),
            return_checker,
            flags: self.flags,
        })
    }

    /// Build the function-pointer type.
    pub fn build(&self) -> Result<TypeRef> {
        let signature = Arc::new(self.signature()?);
        log::debug!(
            "[funcptr] derived '{}' ({} converters, flags={:#x})",
            self.name,
            signature.converters.len(),
            self.flags.bits()
        );
        let info = StgInfo::pointer_sized(
            TypeKind::FunctionPointer(signature),
            "X{}".to_string(),
            TypeFlags::IS_POINTER,
        );
        Ok(CType::from_info(self.name.clone(), info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::POINTER_SIZE;
    use crate::error::CallbackError;
    use crate::simple::{c_double, c_int};
    use crate::types::{FieldDef, PointerDef, RecordDef};

    #[derive(Debug)]
    struct Opaque;

    impl ParamType for Opaque {
        fn type_name(&self) -> &str {
            "Opaque"
        }

        fn param_converter(&self) -> Option<Converter> {
            None
        }
    }

    #[test]
    fn test_int_int_to_int() {
        let ty = FuncPtrDef::new(0)
            .with_args(&[c_int(), c_int()])
            .with_restype(ReturnType::Type(c_int()))
            .build()
            .expect("build");
        let sig = ty.signature().expect("signature");
        assert_eq!(sig.converters.len(), 2);
        assert!(sig.return_checker.is_none());
        assert_eq!(ty.size(), POINTER_SIZE);
        assert_eq!(ty.format(), "X{}");
        assert_eq!(ty.ffi_type(), FfiType::Pointer);
    }

    #[test]
    fn test_missing_flags() {
        let attrs = Attributes::new().with("_argtypes_", Value::List(vec![]));
        assert!(matches!(
            FuncPtrDef::from_attributes(&attrs),
            Err(Error::MissingAttribute("_flags_"))
        ));
        let attrs = Attributes::new().with("_flags_", 1.5f64);
        assert!(matches!(
            FuncPtrDef::from_attributes(&attrs),
            Err(Error::InvalidAttributeType { attribute: "_flags_", .. })
        ));
    }

    #[test]
    fn test_no_converter_position_is_one_based() {
        let attrs = Attributes::new().with("_flags_", 1i32).with(
            "_argtypes_",
            Value::List(vec![Value::Type(c_int()), Value::Int(3)]),
        );
        assert!(matches!(
            FuncPtrDef::from_attributes(&attrs),
            Err(Error::NoConverterCapability { position: 2 })
        ));

        let opaque: ArgType = Arc::new(Opaque);
        let def = FuncPtrDef::new(0).with_argtypes(vec![Arc::clone(&c_int()) as ArgType, opaque]);
        assert!(matches!(
            def.build(),
            Err(Error::NoConverterCapability { position: 2 })
        ));
    }

    #[test]
    fn test_invalid_restype() {
        let attrs = Attributes::new().with("_flags_", 0i32).with("_restype_", 42i32);
        assert!(matches!(
            FuncPtrDef::from_attributes(&attrs),
            Err(Error::InvalidReturnType)
        ));
    }

    #[test]
    fn test_return_checker_from_restype() {
        let checked = CType::simple("HRESULT", PrimitiveKind::I32);
        checked.set_check_retval(Some(Callable::new(|args| match args.first() {
            Some(Value::Int(n)) if *n < 0 => Err(CallbackError::new("failed HRESULT")),
            Some(v) => Ok(v.clone()),
            None => Ok(Value::None),
        })));
        let sig = FuncPtrDef::new(CallFlags::HRESULT)
            .with_restype(ReturnType::Type(Arc::clone(&checked)))
            .signature()
            .expect("signature");
        assert!(sig.return_checker.is_some());
        assert_eq!(
            sig.convert_result(&5i32.to_ne_bytes()).expect("ok"),
            Value::Int(5)
        );
        assert!(matches!(
            sig.convert_result(&(-1i32).to_ne_bytes()),
            Err(Error::CallbackFailed(_))
        ));
    }

    #[test]
    fn test_convert_args_arity() {
        let stdcall = FuncPtrDef::new(CallFlags::STDCALL)
            .with_args(&[c_int()])
            .signature()
            .expect("sig");
        assert!(matches!(
            stdcall.convert_args(&[Value::Int(1), Value::Int(2)]),
            Err(Error::ArgumentCount { expected: 1, given: 2 })
        ));
        assert!(matches!(
            stdcall.convert_args(&[]),
            Err(Error::ArgumentCount { expected: 1, given: 0 })
        ));

        let variadic = FuncPtrDef::new(CallFlags::CDECL)
            .with_args(&[c_int()])
            .signature()
            .expect("sig");
        let args = variadic
            .convert_args(&[Value::Int(1), Value::Float(2.5)])
            .expect("variadic");
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].bytes, 1i32.to_ne_bytes().to_vec());
        assert_eq!(args[1].ffi_type, FfiType::Double);
    }

    #[test]
    fn test_converters_encode_natively() {
        let sig = FuncPtrDef::new(0)
            .with_args(&[c_double()])
            .signature()
            .expect("sig");
        let args = sig.convert_args(&[Value::Int(2)]).expect("convert");
        assert_eq!(args[0].bytes, 2.0f64.to_ne_bytes().to_vec());
        assert!(sig.convert_args(&[Value::Text("x".into())]).is_err());
    }

    #[test]
    fn test_struct_by_value_and_byref() {
        let point = CType::define_struct(
            "Point",
            RecordDef::new(vec![FieldDef::new("x", &c_int()), FieldDef::new("y", &c_int())]),
        )
        .expect("layout");
        let lp = PointerDef::new(&point).build();
        let sig = FuncPtrDef::new(0)
            .with_args(&[Arc::clone(&point), Arc::clone(&lp)])
            .signature()
            .expect("sig");
        let p = CData::new(&point).expect("instance");
        p.write_member("x", &Value::Int(7)).expect("write");
        let args = sig
            .convert_args(&[Value::Data(p.clone()), Value::Data(p.clone())])
            .expect("convert");
        assert_eq!(&args[0].bytes[..4], &7i32.to_ne_bytes());
        assert!(args[0].ffi_type.is_struct());
        assert_eq!(args[1].bytes, p.as_pointer().to_ne_bytes().to_vec());
        assert!(args[1].keep.is_some());
    }

    #[test]
    fn test_callable_restype() {
        let sig = FuncPtrDef::new(0)
            .with_restype(ReturnType::Callable(Callable::new(|args| {
                Ok(Value::Bool(args.first() == Some(&Value::Int(0))))
            })))
            .signature()
            .expect("sig");
        assert_eq!(
            sig.convert_result(&0i32.to_ne_bytes()).expect("result"),
            Value::Bool(true)
        );
        assert_eq!(sig.result_size(), 4);
    }
}
