// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pointer type builder.

use crate::error::{Error, Result};
use crate::types::descriptor::{CType, StgInfo, TypeFlags, TypeKind, TypeRef};
use crate::types::Attributes;
use crate::value::Value;
use std::sync::Arc;

/// Validated pointer definition (`_type_`, optional).
///
/// The target may still be incomplete: `POINTER(Node)` inside `Node`'s own
/// `_fields_` is the usual linked-list idiom.
#[derive(Debug, Clone, Default)]
pub struct PointerDef {
    pub target: Option<TypeRef>,
}

impl PointerDef {
    pub fn new(target: &TypeRef) -> Self {
        Self {
            target: Some(Arc::clone(target)),
        }
    }

    /// A pointer with no declared target (abstract).
    pub fn untyped() -> Self {
        Self::default()
    }

    pub fn from_attributes(attrs: &Attributes) -> Result<Self> {
        match attrs.get("_type_") {
            None | Some(Value::None) => Ok(Self::untyped()),
            Some(Value::Type(ty)) => Ok(Self::new(ty)),
            Some(_) => Err(Error::InvalidAttributeType {
                attribute: "_type_",
                expected: "a ctypes type",
            }),
        }
    }

    /// Build a fresh (uncached) pointer type.
    pub fn build(&self) -> TypeRef {
        let (name, format) = match &self.target {
            Some(target) => (
                format!("LP_{}", target.name()),
                format!("&{}", target.format()),
            ),
            None => ("LP_void".to_string(), "&B".to_string()),
        };
        let info = StgInfo::pointer_sized(
            TypeKind::Pointer {
                target: self.target.clone(),
            },
            format,
            TypeFlags::IS_POINTER,
        );
        log::debug!("[pointer] derived '{}'", name);
        CType::from_info(name, info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{POINTER_ALIGN, POINTER_SIZE};
    use crate::simple::c_int;
    use crate::types::{FfiType, FieldDef, RecordDef};

    #[test]
    fn test_pointer_is_pointer_sized() {
        let ptr = PointerDef::new(&c_int()).build();
        assert_eq!(ptr.size(), POINTER_SIZE);
        assert_eq!(ptr.align(), POINTER_ALIGN);
        assert_eq!(ptr.ffi_type(), FfiType::Pointer);
        assert_eq!(ptr.name(), "LP_c_int");
        assert_eq!(ptr.format(), format!("&{}", c_int().format()));
        assert!(ptr.is_pointer());
        assert!(Arc::ptr_eq(&ptr.item_type().expect("target"), &c_int()));
    }

    #[test]
    fn test_pointer_to_incomplete_record() {
        let node = CType::declare_struct("Node");
        let next = PointerDef::new(&node).build();
        node.set_fields(RecordDef::new(vec![
            FieldDef::new("value", &c_int()),
            FieldDef::new("next", &next),
        ]))
        .expect("self-referential list");
        assert!(node.has_pointer_payload());
        assert_eq!(node.size(), 2 * POINTER_SIZE.max(4));
    }

    #[test]
    fn test_from_attributes() {
        let def = PointerDef::from_attributes(&Attributes::new()).expect("untyped");
        assert!(def.target.is_none());
        let bad = Attributes::new().with("_type_", 1i32);
        assert!(PointerDef::from_attributes(&bad).is_err());
    }
}
