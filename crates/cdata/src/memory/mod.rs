// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Memory blocks backing C instances.

pub mod block;
mod storage;

pub use block::{KeepSlot, MemoryBlock, Origin};
