// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw buffer surface of an instance.
//!
//! Exposes the bytes together with the PEP-3118 style description that
//! buffer consumers need: format tag, item size, shape and strides.
//! Arrays are described by their innermost element; everything else is a
//! single item.

use super::CData;
use crate::error::Result;
use crate::types::TypeRef;
use std::sync::Arc;

/// Writable byte view over one instance.
#[derive(Debug, Clone)]
pub struct BufferView {
    data: CData,
}

impl BufferView {
    pub(crate) fn new(data: CData) -> Self {
        Self { data }
    }

    /// Instance the view was taken from.
    pub fn data(&self) -> &CData {
        &self.data
    }

    /// Total byte length.
    pub fn len(&self) -> usize {
        self.data.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Instances are always writable.
    pub fn readonly(&self) -> bool {
        false
    }

    pub fn format(&self) -> String {
        self.data.ty().format()
    }

    /// Element size, drilling through nested arrays.
    pub fn item_size(&self) -> usize {
        innermost(self.data.ty()).size() as usize
    }

    pub fn ndim(&self) -> usize {
        self.data.ty().ndim()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.data.ty().shape().into_iter().map(|d| d as usize).collect()
    }

    /// C-contiguous strides in bytes.
    pub fn strides(&self) -> Vec<usize> {
        let shape = self.shape();
        let mut strides = vec![0; shape.len()];
        let mut step = self.item_size();
        for (stride, dim) in strides.iter_mut().zip(&shape).rev() {
            *stride = step;
            step *= dim;
        }
        strides
    }

    pub fn read_byte(&self, offset: usize) -> Result<u8> {
        self.data.block().read_byte(offset)
    }

    pub fn write_byte(&self, offset: usize, value: u8) -> Result<()> {
        self.data.block().write_byte(offset, value)
    }

    pub fn read_range(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.data.block().read_range(offset, len)
    }

    pub fn write_range(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.data.block().write_range(offset, bytes)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_bytes()
    }
}

fn innermost(ty: &TypeRef) -> TypeRef {
    let mut current = Arc::clone(ty);
    while current.is_array() {
        match current.item_type() {
            Some(item) => current = item,
            None => break,
        }
    }
    current
}
