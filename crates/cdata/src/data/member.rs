// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Named member access on struct and union instances.

use super::{write_keeping, CData};
use crate::error::{Error, Result};
use crate::types::{FieldAccess, FieldDescriptor, PrimitiveKind};
use crate::value::Value;

impl CData {
    pub fn has_members(&self) -> bool {
        self.ty.is_record()
    }

    /// Member names in declaration order, inherited members first.
    pub fn members(&self) -> Vec<String> {
        self.ty.fields().into_iter().map(|f| f.name).collect()
    }

    pub fn is_member_readable(&self, name: &str) -> bool {
        self.ty.field(name).is_some()
    }

    pub fn is_member_modifiable(&self, name: &str) -> bool {
        self.ty.field(name).is_some()
    }

    fn member(&self, name: &str) -> Result<FieldDescriptor> {
        self.ty
            .field(name)
            .ok_or_else(|| Error::UnknownMember(name.to_string()))
    }

    fn field_view(&self, field: &FieldDescriptor) -> Result<CData> {
        CData::view(&field.ty, &self.block, field.offset as usize, field.index)
    }

    /// Read member `name`.
    ///
    /// Scalars and bit fields decode to values; `char`/`wchar_t` arrays to
    /// bytes/text; records, arrays and pointers to views into this instance.
    pub fn read_member(&self, name: &str) -> Result<Value> {
        let field = self.member(name)?;
        let offset = field.offset as usize;
        let order = self.ty.byte_order();
        match field.kind {
            FieldAccess::Primitive(kind) => self.block.with_bytes(|b| match field.bits {
                Some(bits) => kind.get_bits(b, offset, bits, order),
                None => kind.get(b, offset, order),
            })?,
            FieldAccess::Bytes | FieldAccess::Text => self.field_view(&field)?.value(),
            FieldAccess::Nested => self.field_view(&field).map(Value::Data),
        }
    }

    /// Write member `name`; the instance is untouched on error.
    pub fn write_member(&self, name: &str, value: &Value) -> Result<()> {
        let field = self.member(name)?;
        let offset = field.offset as usize;
        let order = self.ty.byte_order();
        match field.kind {
            FieldAccess::Primitive(kind) => {
                let keep = kind == PrimitiveKind::Pointer;
                write_keeping(&self.block, field.index, value, keep, |b| match field.bits {
                    Some(bits) => kind.set_bits(b, offset, bits, value, order),
                    None => kind.set(b, offset, value, order),
                })
            }
            FieldAccess::Bytes | FieldAccess::Text | FieldAccess::Nested => {
                self.field_view(&field)?.set_value(value)
            }
        }
    }

    /// Positional initialization of the leading members.
    pub(super) fn init_fields(&self, values: &[Value]) -> Result<()> {
        let fields = self.ty.fields();
        if values.len() > fields.len() {
            return Err(Error::ArgumentCount {
                expected: fields.len(),
                given: values.len(),
            });
        }
        for (field, value) in fields.iter().zip(values) {
            self.write_member(&field.name, value)?;
        }
        Ok(())
    }
}
