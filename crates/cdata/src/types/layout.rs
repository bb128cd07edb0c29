// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Layout engine for structures and unions.
//!
//! Fields are placed in declaration order following the native C rules:
//! each field starts at the running offset rounded up to its alignment
//! (capped by `_pack_`), and the record size is rounded up to the largest
//! alignment seen. Union members all sit at offset 0.
//!
//! Bit fields are packed LSB-first into storage units the way GCC does it:
//! a field continues the open unit when it fits, widens the unit when its
//! type is wider and the bits still fit, and starts a new unit otherwise.

use crate::config::MAX_STRUCT_SIZE;
use crate::error::{Error, Result};
use crate::types::descriptor::{
    ArrayFlavor, CType, FieldAccess, FieldDescriptor, StgInfo, TypeFlags, TypeKind, TypeRef,
};
use crate::types::kind::{BitField, ByteOrder};
use crate::types::{Attributes, FfiStruct, FfiType};
use crate::value::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// One `_fields_` entry.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    /// Bit width for bit fields.
    pub bits: Option<u32>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: &TypeRef) -> Self {
        Self {
            name: name.into(),
            ty: Arc::clone(ty),
            bits: None,
        }
    }

    pub fn bits(name: impl Into<String>, ty: &TypeRef, bits: u32) -> Self {
        Self {
            name: name.into(),
            ty: Arc::clone(ty),
            bits: Some(bits),
        }
    }
}

/// Validated structure/union definition.
#[derive(Debug, Clone, Default)]
pub struct RecordDef {
    pub fields: Vec<FieldDef>,
    /// `_pack_`; `None` or `Some(0)` means natural alignment.
    pub pack: Option<u32>,
    /// Parent record whose fields come first.
    pub base: Option<TypeRef>,
    /// `_swappedbytes_`: fields use the non-native byte order.
    pub swapped: bool,
}

impl RecordDef {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_pack(mut self, pack: u32) -> Self {
        self.pack = Some(pack);
        self
    }

    #[must_use]
    pub fn with_base(mut self, base: &TypeRef) -> Self {
        self.base = Some(Arc::clone(base));
        self
    }

    #[must_use]
    pub fn swapped(mut self) -> Self {
        self.swapped = true;
        self
    }

    /// Parse `_fields_`, `_pack_`, `_swappedbytes_` and `_base_`.
    ///
    /// Each `_fields_` entry is a list `[name, type]` or `[name, type, bits]`.
    pub fn from_attributes(attrs: &Attributes) -> Result<Self> {
        if attrs.contains("_anonymous_") {
            return Err(Error::InvalidAttributeType {
                attribute: "_anonymous_",
                expected: "absent (anonymous members are not supported)",
            });
        }
        let entries = match attrs.get("_fields_") {
            None => return Err(Error::MissingAttribute("_fields_")),
            Some(Value::List(entries)) => entries,
            Some(_) => return Err(fields_error()),
        };
        let mut fields = Vec::with_capacity(entries.len());
        for entry in entries {
            fields.push(parse_field(entry)?);
        }

        let pack = match attrs.get("_pack_") {
            None => None,
            Some(Value::Int(n)) => Some(u32::try_from(*n).map_err(|_| Error::InvalidAttributeType {
                attribute: "_pack_",
                expected: "a non-negative integer",
            })?),
            Some(_) => {
                return Err(Error::InvalidAttributeType {
                    attribute: "_pack_",
                    expected: "a non-negative integer",
                })
            }
        };
        let base = match attrs.get("_base_") {
            None | Some(Value::None) => None,
            Some(Value::Type(ty)) if ty.is_record() => Some(Arc::clone(ty)),
            Some(_) => {
                return Err(Error::InvalidAttributeType {
                    attribute: "_base_",
                    expected: "a structure or union type",
                })
            }
        };
        Ok(Self {
            fields,
            pack,
            base,
            swapped: attrs.get("_swappedbytes_").is_some_and(Value::is_truthy),
        })
    }
}

fn fields_error() -> Error {
    Error::InvalidAttributeType {
        attribute: "_fields_",
        expected: "a sequence of (name, C type[, bits]) entries",
    }
}

fn parse_field(entry: &Value) -> Result<FieldDef> {
    let Value::List(parts) = entry else {
        return Err(fields_error());
    };
    match parts.as_slice() {
        [Value::Text(name), Value::Type(ty)] => Ok(FieldDef::new(name.clone(), ty)),
        [Value::Text(name), Value::Type(ty), Value::Int(bits)] => {
            let bits = u32::try_from(*bits).map_err(|_| Error::InvalidBitField {
                field: name.clone(),
                reason: "number of bits invalid for bit field",
            })?;
            Ok(FieldDef::bits(name.clone(), ty, bits))
        }
        _ => Err(fields_error()),
    }
}

/// Laid-out members of a record.
#[derive(Debug, Clone, Default)]
pub struct RecordLayout {
    /// Inherited fields first, then own fields.
    pub fields: Vec<FieldDescriptor>,
    pub pack: Option<u32>,
    pub base: Option<TypeRef>,
}

// Currently open bit-field storage unit.
struct OpenUnit {
    start: u32,
    width: u32,
    used: u32,
}

struct StructCursor {
    offset: u32,
    align: u32,
    pack: Option<u32>,
    order: ByteOrder,
    open: Option<OpenUnit>,
}

impl StructCursor {
    fn field_align(&self, align: u32) -> u32 {
        self.pack.map_or(align, |p| p.min(align)).max(1)
    }

    fn advance(&mut self, size: u32, align: u32) -> Result<u32> {
        let align = self.field_align(align);
        let at = round_up(self.offset, align).ok_or(Error::Overflow {
            item_size: size,
            length: 1,
        })?;
        self.offset = at.checked_add(size).ok_or(Error::Overflow {
            item_size: size,
            length: 1,
        })?;
        self.align = self.align.max(align);
        Ok(at)
    }

    fn place(&mut self, size: u32, align: u32, bits: Option<u32>) -> Result<(u32, Option<BitField>)> {
        let Some(bits) = bits else {
            self.open = None;
            return Ok((self.advance(size, align)?, None));
        };
        let width = size * 8;
        let little = self.order == ByteOrder::Little;
        let expand_align = self.field_align(align);

        if let Some(unit) = self.open.as_mut() {
            if width <= unit.width && unit.used + bits <= unit.width {
                if width == unit.width {
                    let shift = if little {
                        unit.used
                    } else {
                        unit.width - unit.used - bits
                    };
                    unit.used += bits;
                    return Ok((unit.start, Some(bit_field(shift, bits))));
                }
                // narrower type: first window of its own size with room;
                // a field never straddles a window boundary
                let first = unit.used / width;
                let (window, bit) = if unit.used % width + bits <= width {
                    (first, unit.used)
                } else {
                    (first + 1, (first + 1) * width)
                };
                if little && window < unit.width / width {
                    let at = unit.start + window * size;
                    unit.used = bit + bits;
                    return Ok((at, Some(bit_field(bit - window * width, bits))));
                }
            } else if little && width > unit.width && unit.used + bits <= width {
                let grow = size - unit.width / 8;
                self.offset += grow;
                self.align = self.align.max(expand_align);
                unit.width = width;
                let shift = unit.used;
                unit.used += bits;
                return Ok((unit.start, Some(bit_field(shift, bits))));
            }
        }

        let at = self.advance(size, align)?;
        self.open = Some(OpenUnit {
            start: at,
            width,
            used: bits,
        });
        let shift = if little { 0 } else { width - bits };
        Ok((at, Some(bit_field(shift, bits))))
    }
}

fn bit_field(shift: u32, bits: u32) -> BitField {
    BitField {
        bit_offset: shift as u16,
        bit_size: bits as u16,
    }
}

pub(crate) fn round_up(value: u32, align: u32) -> Option<u32> {
    if align <= 1 {
        return Some(value);
    }
    let rem = value % align;
    if rem == 0 {
        Some(value)
    } else {
        value.checked_add(align - rem)
    }
}

fn field_access(info: &StgInfo) -> FieldAccess {
    match &info.kind {
        TypeKind::Simple(kind) => FieldAccess::Primitive(*kind),
        TypeKind::Array {
            flavor: ArrayFlavor::Bytes,
            ..
        } => FieldAccess::Bytes,
        TypeKind::Array {
            flavor: ArrayFlavor::Text,
            ..
        } => FieldAccess::Text,
        _ => FieldAccess::Nested,
    }
}

// "(2,3)" prefix for array members of a structured format.
fn shape_prefix(shape: &[u32]) -> String {
    if shape.is_empty() {
        return String::new();
    }
    let dims: Vec<String> = shape.iter().map(u32::to_string).collect();
    format!("({})", dims.join(","))
}

// Innermost element FFI type and total element count of an array.
fn unrolled_array(info: &StgInfo) -> Option<FfiType> {
    let TypeKind::Array { item, .. } = &info.kind else {
        return None;
    };
    let mut inner = Arc::clone(item);
    while let Some(next) = inner.length().and_then(|_| inner.item_type()) {
        inner = next;
    }
    let count: u32 = info.shape.iter().product();
    Some(FfiType::Struct(FfiStruct {
        size: info.size,
        align: info.align,
        elements: vec![inner.ffi_type(); count as usize],
    }))
}

/// Compute the layout record for a structure or union.
///
/// Reads the field types but does not modify them.
pub(crate) fn compute_layout(def: &RecordDef, union: bool) -> Result<StgInfo> {
    let order = if def.swapped {
        ByteOrder::swapped()
    } else {
        ByteOrder::NATIVE
    };
    let pack = def.pack.filter(|p| *p > 0);
    let mut flags = TypeFlags::empty();
    let mut fields: Vec<FieldDescriptor> = Vec::with_capacity(def.fields.len());
    let mut base_elements = Vec::new();
    let mut cursor = StructCursor {
        offset: 0,
        align: 1,
        pack,
        order,
        open: None,
    };
    let mut union_size = 0u32;

    if let Some(base) = &def.base {
        let info = base.snapshot();
        if info.flags.contains(TypeFlags::INCOMPLETE) {
            return Err(Error::IncompleteType(base.name().to_string()));
        }
        if let TypeKind::Struct(layout) | TypeKind::Union(layout) = &info.kind {
            fields.extend(layout.fields.iter().cloned());
        }
        if let FfiType::Struct(s) = &info.ffi_type {
            base_elements.extend(s.elements.iter().cloned());
        }
        cursor.offset = info.size;
        cursor.align = info.align.max(1);
        union_size = info.size;
        flags.insert(info.flags.inherited());
    }

    let structured = !union && pack.is_none();
    let mut format = String::from("T{");
    let mut own_elements: Vec<(FfiType, Option<FfiType>)> = Vec::with_capacity(def.fields.len());
    let mut names = HashSet::new();

    for field in &def.fields {
        if !names.insert(field.name.as_str()) {
            return Err(Error::DuplicateField(field.name.clone()));
        }
        let info = field.ty.snapshot();
        if info.flags.contains(TypeFlags::INCOMPLETE) {
            return Err(Error::IncompleteType(field.ty.name().to_string()));
        }
        flags.insert(info.flags.inherited());

        if let Some(bits) = field.bits {
            let allowed = matches!(&info.kind, TypeKind::Simple(k) if k.allows_bitfield());
            if !allowed {
                return Err(Error::InvalidBitField {
                    field: field.name.clone(),
                    reason: "bit fields not allowed for type",
                });
            }
            if bits == 0 || bits > info.size * 8 {
                return Err(Error::InvalidBitField {
                    field: field.name.clone(),
                    reason: "number of bits invalid for bit field",
                });
            }
            flags.insert(TypeFlags::HAS_BITFIELD);
        }

        if structured {
            let field_format = match &info.kind {
                TypeKind::Simple(kind) => kind.format(order),
                _ => info.format.clone(),
            };
            format.push_str(&shape_prefix(&info.shape));
            format.push_str(&field_format);
            format.push(':');
            format.push_str(&field.name);
            format.push(':');
        }

        let (offset, bits) = if union {
            let align = cursor.field_align(info.align);
            cursor.align = cursor.align.max(align);
            union_size = union_size.max(info.size);
            let bits = field.bits.map(|b| {
                let shift = if order == ByteOrder::Little {
                    0
                } else {
                    info.size * 8 - b
                };
                bit_field(shift, b)
            });
            (0, bits)
        } else {
            cursor.place(info.size, info.align, field.bits)?
        };

        own_elements.push((info.ffi_type.clone(), unrolled_array(&info)));
        fields.push(FieldDescriptor {
            name: field.name.clone(),
            offset,
            index: fields.len() as u32,
            ty: Arc::clone(&field.ty),
            kind: field_access(&info),
            bits,
        });
    }

    if union {
        flags.insert(TypeFlags::HAS_UNION);
    }
    if structured {
        format.push('}');
    } else {
        format = "B".to_string();
    }

    let align = cursor.align.max(1);
    let raw_size = if union { union_size } else { cursor.offset };
    let size = round_up(raw_size, align).ok_or(Error::Overflow {
        item_size: raw_size,
        length: 1,
    })?;

    // small records carry their arrays element by element (register passing)
    let unroll = size <= MAX_STRUCT_SIZE;
    let mut elements = base_elements;
    elements.extend(own_elements.into_iter().map(|(ffi, unrolled)| match unrolled {
        Some(expanded) if unroll => expanded,
        _ => ffi,
    }));

    let layout = RecordLayout {
        fields,
        pack,
        base: def.base.clone(),
    };
    Ok(StgInfo {
        size,
        align,
        shape: Vec::new(),
        ffi_type: FfiType::Struct(FfiStruct {
            size,
            align,
            elements,
        }),
        format,
        kind: if union {
            TypeKind::Union(layout)
        } else {
            TypeKind::Struct(layout)
        },
        flags,
        byte_order: order,
        check_retval: None,
    })
}

impl CType {
    /// Declare and lay out a structure in one step.
    pub fn define_struct(name: impl Into<String>, def: RecordDef) -> Result<TypeRef> {
        let ty = CType::declare_struct(name);
        ty.set_fields(def)?;
        Ok(ty)
    }

    /// Declare and lay out a union in one step.
    pub fn define_union(name: impl Into<String>, def: RecordDef) -> Result<TypeRef> {
        let ty = CType::declare_union(name);
        ty.set_fields(def)?;
        Ok(ty)
    }

    /// Assign `_fields_`.
    ///
    /// Runs the layout engine and replaces this descriptor's layout in place.
    /// Fails with [`Error::FieldsFinal`] once the type has been used as a
    /// field, array item, base or instance. Nothing is modified on error.
    pub fn set_fields(&self, def: RecordDef) -> Result<()> {
        let union = match self.info().kind {
            TypeKind::Struct(_) => false,
            TypeKind::Union(_) => true,
            _ => {
                return Err(Error::InvalidAttributeType {
                    attribute: "_fields_",
                    expected: "set on a structure or union type",
                })
            }
        };
        if self.is_final() {
            return Err(Error::FieldsFinal(self.name().to_string()));
        }
        let is_self = |ty: &TypeRef| self.is(ty);
        if def.fields.iter().any(|f| is_self(&f.ty)) || def.base.as_ref().is_some_and(is_self) {
            return Err(Error::IncompleteType(self.name().to_string()));
        }

        let mut info = compute_layout(&def, union)?;
        let redefined = {
            let mut current = self.info_mut();
            if current.flags.contains(TypeFlags::FINAL) {
                return Err(Error::FieldsFinal(self.name().to_string()));
            }
            let redefined = !current.flags.contains(TypeFlags::INCOMPLETE);
            info.check_retval = current.check_retval.take();
            *current = info;
            redefined
        };

        for field in &def.fields {
            field.ty.mark_final();
        }
        if let Some(base) = &def.base {
            base.mark_final();
        }
        if redefined {
            log::warn!(
                "[layout] _fields_ of '{}' reassigned; types derived earlier keep the old layout",
                self.name()
            );
        }
        log::debug!(
            "[layout] {} '{}': {} fields, size={} align={}",
            if union { "union" } else { "struct" },
            self.name(),
            def.fields.len(),
            self.size(),
            self.align()
        );
        Ok(())
    }
}
