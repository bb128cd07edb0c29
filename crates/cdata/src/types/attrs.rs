// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type-definition attribute namespace (`_fields_`, `_length_`, `_type_`, ...).

use crate::error::{Error, Result};
use crate::types::TypeRef;
use crate::value::Value;

/// Ordered attribute set handed over by the host's class statement.
///
/// The typed definitions ([`RecordDef`](crate::RecordDef),
/// [`ArrayDef`](crate::ArrayDef), [`PointerDef`](crate::PointerDef),
/// [`FuncPtrDef`](crate::FuncPtrDef)) validate the keys they recognise up
/// front; unknown keys are ignored.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    entries: Vec<(String, Value)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Required type attribute.
    pub(crate) fn require_type(&self, key: &'static str) -> Result<TypeRef> {
        match self.get(key) {
            None => Err(Error::MissingAttribute(key)),
            Some(Value::Type(ty)) => Ok(ty.clone()),
            Some(_) => Err(Error::InvalidAttributeType {
                attribute: key,
                expected: "a ctypes type",
            }),
        }
    }

    /// Required integer attribute.
    pub(crate) fn require_int(&self, key: &'static str) -> Result<i128> {
        match self.get(key) {
            None => Err(Error::MissingAttribute(key)),
            Some(Value::Int(n)) => Ok(*n),
            Some(_) => Err(Error::InvalidAttributeType {
                attribute: key,
                expected: "an integer",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order_and_replaces() {
        let mut attrs = Attributes::new().with("_length_", 3i32).with("_pack_", 1i32);
        attrs.insert("_length_", 4i32);
        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["_length_", "_pack_"]);
        assert_eq!(attrs.get("_length_"), Some(&Value::Int(4)));
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn test_require_int() {
        let attrs = Attributes::new().with("_flags_", "cdecl");
        assert!(matches!(
            attrs.require_int("_flags_"),
            Err(Error::InvalidAttributeType { attribute: "_flags_", .. })
        ));
        assert!(matches!(
            attrs.require_int("_length_"),
            Err(Error::MissingAttribute("_length_"))
        ));
    }
}
