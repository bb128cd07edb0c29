// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Array type builder: derives `T[N]` from an item type.

use crate::error::{Error, Result};
use crate::types::descriptor::{ArrayFlavor, CType, StgInfo, TypeFlags, TypeKind, TypeRef};
use crate::types::kind::PrimitiveKind;
use crate::types::{Attributes, FfiType};
use std::sync::Arc;

/// Validated array definition (`_type_` and `_length_`).
#[derive(Debug, Clone)]
pub struct ArrayDef {
    pub item: TypeRef,
    pub length: u32,
}

impl ArrayDef {
    pub fn new(item: &TypeRef, length: u32) -> Self {
        Self {
            item: Arc::clone(item),
            length,
        }
    }

    /// Validate `_length_` then `_type_`.
    pub fn from_attributes(attrs: &Attributes) -> Result<Self> {
        let length = attrs.require_int("_length_")?;
        if length < 0 {
            return Err(Error::NegativeLength(
                i64::try_from(length).unwrap_or(i64::MIN),
            ));
        }
        let item = attrs.require_type("_type_")?;
        let length = u32::try_from(length).map_err(|_| Error::Overflow {
            item_size: item.size(),
            length: u64::try_from(length).unwrap_or(u64::MAX),
        })?;
        Ok(Self { item, length })
    }

    /// Build a fresh (uncached) array type.
    ///
    /// Use [`Context::array_type`](crate::Context::array_type) to get the
    /// shared instance for `(item, length)`.
    pub fn build(&self) -> Result<TypeRef> {
        let item = self.item.snapshot();
        if item.flags.contains(TypeFlags::INCOMPLETE) {
            return Err(Error::IncompleteType(self.item.name().to_string()));
        }
        let size = item
            .size
            .checked_mul(self.length)
            .ok_or(Error::Overflow {
                item_size: item.size,
                length: u64::from(self.length),
            })?;

        let mut shape = Vec::with_capacity(item.shape.len() + 1);
        shape.push(self.length);
        shape.extend_from_slice(&item.shape);

        let flavor = match item.kind {
            TypeKind::Simple(PrimitiveKind::Char) => ArrayFlavor::Bytes,
            TypeKind::Simple(PrimitiveKind::WChar) => ArrayFlavor::Text,
            _ => ArrayFlavor::Plain,
        };

        let info = StgInfo {
            size,
            align: item.align,
            shape,
            // arrays decay to pointers in calls
            ffi_type: FfiType::Pointer,
            format: item.format.clone(),
            kind: TypeKind::Array {
                item: Arc::clone(&self.item),
                length: self.length,
                flavor,
            },
            flags: item.flags.inherited(),
            byte_order: item.byte_order,
            check_retval: None,
        };
        let name = format!("{}_Array_{}", self.item.name(), self.length);
        self.item.mark_final();
        log::debug!("[array] derived '{}' size={} align={}", name, size, item.align);
        Ok(CType::from_info(name, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::{c_char, c_double, c_int, c_void_p, c_wchar};
    use crate::types::{FieldDef, RecordDef};
    use crate::value::Value;

    #[test]
    fn test_size_and_alignment() {
        let arr = ArrayDef::new(&c_int(), 5).build().expect("array");
        assert_eq!(arr.size(), 20);
        assert_eq!(arr.align(), 4);
        assert_eq!(arr.shape(), vec![5]);
        assert_eq!(arr.ffi_type(), FfiType::Pointer);
        assert_eq!(arr.format(), c_int().format());
        assert_eq!(arr.name(), "c_int_Array_5");
        assert_eq!(arr.length(), Some(5));
    }

    #[test]
    fn test_nested_shape() {
        let row = ArrayDef::new(&c_double(), 3).build().expect("row");
        let grid = ArrayDef::new(&row, 2).build().expect("grid");
        assert_eq!(grid.shape(), vec![2, 3]);
        assert_eq!(grid.ndim(), 2);
        assert_eq!(grid.size(), 48);
        assert!(row.is_final());
    }

    #[test]
    fn test_overflow() {
        let err = ArrayDef::new(&c_int(), u32::MAX / 4 + 1)
            .build()
            .expect_err("overflow");
        assert!(matches!(err, Error::Overflow { item_size: 4, .. }));
        assert!(ArrayDef::new(&c_int(), u32::MAX / 4).build().is_ok());
    }

    #[test]
    fn test_zero_sized_item_never_overflows() {
        let empty = CType::define_struct("Empty", RecordDef::new(Vec::new())).expect("empty");
        let arr = ArrayDef::new(&empty, u32::MAX).build().expect("array");
        assert_eq!(arr.size(), 0);
    }

    #[test]
    fn test_flavors_and_pointer_flag() {
        let text = ArrayDef::new(&c_char(), 8).build().expect("array");
        assert!(matches!(
            text.kind(),
            TypeKind::Array { flavor: ArrayFlavor::Bytes, .. }
        ));
        let wide = ArrayDef::new(&c_wchar(), 8).build().expect("array");
        assert!(matches!(
            wide.kind(),
            TypeKind::Array { flavor: ArrayFlavor::Text, .. }
        ));
        let ptrs = ArrayDef::new(&c_void_p(), 2).build().expect("array");
        assert!(ptrs.has_pointer_payload());
    }

    #[test]
    fn test_incomplete_item() {
        let fwd = CType::declare_struct("Later");
        assert!(matches!(
            ArrayDef::new(&fwd, 2).build(),
            Err(Error::IncompleteType(_))
        ));
        fwd.set_fields(RecordDef::new(vec![FieldDef::new("x", &c_int())]))
            .expect("still assignable");
    }

    #[test]
    fn test_from_attributes() {
        let attrs = Attributes::new()
            .with("_length_", 4i32)
            .with("_type_", Value::Type(c_int()));
        let def = ArrayDef::from_attributes(&attrs).expect("valid");
        assert_eq!(def.length, 4);

        let negative = Attributes::new()
            .with("_length_", Value::Int(-1))
            .with("_type_", Value::Type(c_int()));
        assert!(matches!(
            ArrayDef::from_attributes(&negative),
            Err(Error::NegativeLength(-1))
        ));

        let missing = Attributes::new().with("_type_", Value::Type(c_int()));
        assert!(matches!(
            ArrayDef::from_attributes(&missing),
            Err(Error::MissingAttribute("_length_"))
        ));

        let no_type = Attributes::new().with("_length_", 1i32);
        assert!(matches!(
            ArrayDef::from_attributes(&no_type),
            Err(Error::MissingAttribute("_type_"))
        ));

        let bad_type = Attributes::new().with("_length_", 1i32).with("_type_", 3i32);
        assert!(matches!(
            ArrayDef::from_attributes(&bad_type),
            Err(Error::InvalidAttributeType { attribute: "_type_", .. })
        ));

        let huge = Attributes::new()
            .with("_length_", Value::Int(i128::from(u32::MAX) + 1))
            .with("_type_", Value::Type(c_int()));
        assert!(matches!(
            ArrayDef::from_attributes(&huge),
            Err(Error::Overflow { .. })
        ));
    }
}
