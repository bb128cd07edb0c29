// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field kind table: primitive native kinds and their get/set conversions.

use crate::config::{POINTER_ALIGN, POINTER_SIZE};
use crate::error::{Error, Result};
use crate::types::FfiType;
use crate::value::Value;

/// Size of the platform `wchar_t`.
pub const WCHAR_SIZE: u32 = std::mem::size_of::<libc::wchar_t>() as u32;

/// Byte order used by a kind accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::Little;
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::Big;

    /// The non-native order (`_swappedbytes_` records).
    pub const fn swapped() -> ByteOrder {
        match Self::NATIVE {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }

    /// Buffer-format prefix character.
    pub fn prefix(self) -> char {
        match self {
            ByteOrder::Little => '<',
            ByteOrder::Big => '>',
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::NATIVE
    }
}

/// Placement of a bit field inside its storage unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    /// Shift of the lowest bit inside the unit.
    pub bit_offset: u16,
    /// Width in bits.
    pub bit_size: u16,
}

impl BitField {
    fn mask(&self) -> u64 {
        if self.bit_size >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bit_size) - 1
        }
    }
}

/// Primitive native kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Char,
    WChar,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Pointer,
}

impl PrimitiveKind {
    /// Kind matching the platform `long`.
    pub fn c_long() -> Self {
        match std::mem::size_of::<libc::c_long>() {
            4 => Self::I32,
            _ => Self::I64,
        }
    }

    /// Kind matching the platform `unsigned long`.
    pub fn c_ulong() -> Self {
        match std::mem::size_of::<libc::c_ulong>() {
            4 => Self::U32,
            _ => Self::U64,
        }
    }

    /// Kind matching the platform `size_t`.
    pub fn c_size_t() -> Self {
        match std::mem::size_of::<libc::size_t>() {
            4 => Self::U32,
            _ => Self::U64,
        }
    }

    /// Size in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Bool | Self::Char | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::WChar => WCHAR_SIZE,
            Self::Pointer => POINTER_SIZE,
        }
    }

    /// Native alignment in bytes.
    pub fn align(self) -> u32 {
        match self {
            Self::Pointer => POINTER_ALIGN,
            Self::I64 => std::mem::align_of::<i64>() as u32,
            Self::U64 => std::mem::align_of::<u64>() as u32,
            Self::F64 => std::mem::align_of::<f64>() as u32,
            Self::WChar => std::mem::align_of::<libc::wchar_t>() as u32,
            other => other.size(),
        }
    }

    pub fn ffi_type(self) -> FfiType {
        match self {
            Self::Bool | Self::U8 => FfiType::UInt8,
            Self::Char | Self::I8 => FfiType::SInt8,
            Self::I16 => FfiType::SInt16,
            Self::U16 => FfiType::UInt16,
            Self::I32 => FfiType::SInt32,
            Self::U32 => FfiType::UInt32,
            Self::I64 => FfiType::SInt64,
            Self::U64 => FfiType::UInt64,
            Self::F32 => FfiType::Float,
            Self::F64 => FfiType::Double,
            Self::Pointer => FfiType::Pointer,
            Self::WChar => match WCHAR_SIZE {
                2 => FfiType::UInt16,
                _ => FfiType::SInt32,
            },
        }
    }

    /// Struct-module format letter.
    pub fn format_code(self) -> char {
        match self {
            Self::Bool => '?',
            Self::Char => 'c',
            Self::WChar => 'u',
            Self::I8 => 'b',
            Self::U8 => 'B',
            Self::I16 => 'h',
            Self::U16 => 'H',
            Self::I32 => 'i',
            Self::U32 => 'I',
            Self::I64 => 'q',
            Self::U64 => 'Q',
            Self::F32 => 'f',
            Self::F64 => 'd',
            Self::Pointer => 'P',
        }
    }

    /// Full buffer-format tag (`"<i"` for a little-endian int).
    pub fn format(self, order: ByteOrder) -> String {
        format!("{}{}", order.prefix(), self.format_code())
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::U8 | Self::I16 | Self::U16 | Self::I32 | Self::U32 | Self::I64 | Self::U64
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::Char)
    }

    /// Kinds allowed to carry a bit width.
    pub fn allows_bitfield(self) -> bool {
        self.is_integer() || self == Self::Bool
    }

    fn type_label(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Char => "char",
            Self::WChar => "wchar",
            Self::I8 => "int8",
            Self::U8 => "uint8",
            Self::I16 => "int16",
            Self::U16 => "uint16",
            Self::I32 => "int32",
            Self::U32 => "uint32",
            Self::I64 => "int64",
            Self::U64 => "uint64",
            Self::F32 => "float",
            Self::F64 => "double",
            Self::Pointer => "pointer",
        }
    }

    fn int_range(self) -> (i128, i128) {
        match self {
            Self::I8 => (i128::from(i8::MIN), i128::from(i8::MAX)),
            Self::U8 => (0, i128::from(u8::MAX)),
            Self::I16 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            Self::U16 => (0, i128::from(u16::MAX)),
            Self::I32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            Self::U32 => (0, i128::from(u32::MAX)),
            Self::I64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
            Self::U64 => (0, i128::from(u64::MAX)),
            Self::Pointer => (0, usize::MAX as i128),
            Self::Bool => (0, 1),
            Self::Char => (0, i128::from(u8::MAX)),
            Self::WChar | Self::F32 | Self::F64 => (0, 0),
        }
    }

    fn mismatch(self, value: &Value) -> Error {
        Error::TypeMismatch {
            expected: self.type_label().to_string(),
            got: value.type_name(),
        }
    }

    /// Read a value at `offset`.
    pub fn get(self, buf: &[u8], offset: usize, order: ByteOrder) -> Result<Value> {
        let bytes = slot(buf, offset, self.size())?;
        let raw = read_uint(bytes, order);
        let value = match self {
            Self::Bool => Value::Bool(raw != 0),
            Self::Char => Value::Bytes(vec![raw as u8]),
            Self::WChar => {
                let c = char::from_u32(raw as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
                Value::Text(c.to_string())
            }
            Self::I8 => Value::Int(i128::from(raw as u8 as i8)),
            Self::I16 => Value::Int(i128::from(raw as u16 as i16)),
            Self::I32 => Value::Int(i128::from(raw as u32 as i32)),
            Self::I64 => Value::Int(i128::from(raw as i64)),
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => Value::Int(i128::from(raw)),
            Self::F32 => Value::Float(f64::from(f32::from_bits(raw as u32))),
            Self::F64 => Value::Float(f64::from_bits(raw)),
            Self::Pointer => Value::Address(raw as usize),
        };
        Ok(value)
    }

    /// Write `value` at `offset`; the buffer is untouched on error.
    pub fn set(self, buf: &mut [u8], offset: usize, value: &Value, order: ByteOrder) -> Result<()> {
        let raw = self.encode(value)?;
        let bytes = slot_mut(buf, offset, self.size())?;
        write_uint(bytes, raw, order);
        Ok(())
    }

    /// Convert `value` to the kind's raw bit pattern.
    pub fn encode(self, value: &Value) -> Result<u64> {
        match self {
            Self::Bool => Ok(u64::from(value.is_truthy())),
            Self::F32 => value
                .as_f64()
                .map(|x| u64::from((x as f32).to_bits()))
                .ok_or_else(|| self.mismatch(value)),
            Self::F64 => value
                .as_f64()
                .map(f64::to_bits)
                .ok_or_else(|| self.mismatch(value)),
            Self::Char => match value {
                Value::Bytes(b) if b.len() == 1 => Ok(u64::from(b[0])),
                Value::Int(_) => self.encode_int(value),
                _ => Err(self.mismatch(value)),
            },
            Self::WChar => {
                let mut chars = value.as_text().map(str::chars).ok_or_else(|| self.mismatch(value))?;
                match (chars.next(), chars.next()) {
                    (Some(c), None) if WCHAR_SIZE >= 4 || c.len_utf16() == 1 => {
                        Ok(u64::from(u32::from(c)))
                    }
                    _ => Err(self.mismatch(value)),
                }
            }
            Self::Pointer => match value {
                Value::None => Ok(0),
                Value::Address(a) => Ok(*a as u64),
                Value::Data(d) => Ok(d.as_pointer() as u64),
                Value::Int(_) => self.encode_int(value),
                _ => Err(self.mismatch(value)),
            },
            _ => self.encode_int(value),
        }
    }

    fn encode_int(self, value: &Value) -> Result<u64> {
        let v = value.as_int().ok_or_else(|| self.mismatch(value))?;
        let (min, max) = self.int_range();
        if v < min || v > max {
            return Err(self.mismatch(value));
        }
        // two's complement truncation to the kind's width
        Ok(v as u64)
    }

    /// Read a bit field stored in a unit of this kind.
    pub fn get_bits(self, buf: &[u8], offset: usize, bits: BitField, order: ByteOrder) -> Result<Value> {
        let bytes = slot(buf, offset, self.size())?;
        let raw = (read_uint(bytes, order) >> bits.bit_offset) & bits.mask();
        if self == Self::Bool {
            return Ok(Value::Bool(raw != 0));
        }
        if self.is_signed() && bits.bit_size < 64 && raw & (1u64 << (bits.bit_size - 1)) != 0 {
            // sign-extend
            let extended = raw | !bits.mask();
            return Ok(Value::Int(i128::from(extended as i64)));
        }
        Ok(Value::Int(i128::from(raw)))
    }

    /// Store the low `bit_size` bits of `value` into the field.
    pub fn set_bits(
        self,
        buf: &mut [u8],
        offset: usize,
        bits: BitField,
        value: &Value,
        order: ByteOrder,
    ) -> Result<()> {
        let encoded = self.encode(value)? & bits.mask();
        let bytes = slot_mut(buf, offset, self.size())?;
        let current = read_uint(bytes, order);
        let cleared = current & !(bits.mask() << bits.bit_offset);
        write_uint(bytes, cleared | (encoded << bits.bit_offset), order);
        Ok(())
    }
}

fn slot(buf: &[u8], offset: usize, size: u32) -> Result<&[u8]> {
    let len = size as usize;
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or(Error::OutOfBounds {
            offset,
            len,
            size: buf.len(),
        })
}

fn slot_mut(buf: &mut [u8], offset: usize, size: u32) -> Result<&mut [u8]> {
    let len = size as usize;
    let total = buf.len();
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= total)
        .ok_or(Error::OutOfBounds {
            offset,
            len,
            size: total,
        })?;
    Ok(&mut buf[offset..end])
}

pub(crate) fn read_uint(bytes: &[u8], order: ByteOrder) -> u64 {
    match order {
        ByteOrder::Little => bytes
            .iter()
            .rev()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
        ByteOrder::Big => bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
    }
}

pub(crate) fn write_uint(bytes: &mut [u8], mut value: u64, order: ByteOrder) {
    let n = bytes.len();
    for i in 0..n {
        let idx = match order {
            ByteOrder::Little => i,
            ByteOrder::Big => n - 1 - i,
        };
        bytes[idx] = value as u8;
        value >>= 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [PrimitiveKind; 14] = [
        PrimitiveKind::Bool,
        PrimitiveKind::Char,
        PrimitiveKind::WChar,
        PrimitiveKind::I8,
        PrimitiveKind::U8,
        PrimitiveKind::I16,
        PrimitiveKind::U16,
        PrimitiveKind::I32,
        PrimitiveKind::U32,
        PrimitiveKind::I64,
        PrimitiveKind::U64,
        PrimitiveKind::F32,
        PrimitiveKind::F64,
        PrimitiveKind::Pointer,
    ];

    #[test]
    fn test_sizes_and_alignment() {
        assert_eq!(PrimitiveKind::I8.size(), 1);
        assert_eq!(PrimitiveKind::U16.size(), 2);
        assert_eq!(PrimitiveKind::I32.align(), 4);
        assert_eq!(PrimitiveKind::F64.size(), 8);
        assert_eq!(PrimitiveKind::Pointer.size(), POINTER_SIZE);
        for kind in ALL {
            assert!(kind.align() <= kind.size(), "{:?}", kind);
            assert_eq!(kind.ffi_type().size(), kind.size(), "{:?}", kind);
        }
    }

    #[test]
    fn test_int32_little_endian_bytes() {
        let mut buf = [0u8; 8];
        PrimitiveKind::I32
            .set(&mut buf, 0, &Value::Int(0x1122_3344), ByteOrder::Little)
            .expect("set");
        assert_eq!(&buf[..4], &[0x44, 0x33, 0x22, 0x11]);
        PrimitiveKind::I32
            .set(&mut buf, 4, &Value::Int(0x1122_3344), ByteOrder::Big)
            .expect("set");
        assert_eq!(&buf[4..], &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_round_trip_extremes() {
        let cases: Vec<(PrimitiveKind, Value)> = vec![
            (PrimitiveKind::I8, Value::Int(-128)),
            (PrimitiveKind::U8, Value::Int(255)),
            (PrimitiveKind::I16, Value::Int(i128::from(i16::MIN))),
            (PrimitiveKind::U16, Value::Int(i128::from(u16::MAX))),
            (PrimitiveKind::I32, Value::Int(i128::from(i32::MIN))),
            (PrimitiveKind::U32, Value::Int(i128::from(u32::MAX))),
            (PrimitiveKind::I64, Value::Int(i128::from(i64::MIN))),
            (PrimitiveKind::U64, Value::Int(i128::from(u64::MAX))),
            (PrimitiveKind::F32, Value::Float(1.5)),
            (PrimitiveKind::F64, Value::Float(-2.25e300)),
            (PrimitiveKind::Bool, Value::Bool(true)),
            (PrimitiveKind::Char, Value::Bytes(vec![b'x'])),
            (PrimitiveKind::WChar, Value::Text("\u{e9}".into())),
            (PrimitiveKind::Pointer, Value::Address(0xdead_beef)),
        ];
        for order in [ByteOrder::Little, ByteOrder::Big] {
            for (kind, value) in &cases {
                let mut buf = vec![0u8; 16];
                kind.set(&mut buf, 3, value, order).expect("set");
                assert_eq!(&kind.get(&buf, 3, order).expect("get"), value, "{:?}", kind);
            }
        }
    }

    #[test]
    fn test_out_of_range_rejected_without_write() {
        let mut buf = [0xAAu8; 4];
        let err = PrimitiveKind::U8
            .set(&mut buf, 0, &Value::Int(256), ByteOrder::Little)
            .expect_err("range");
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert!(PrimitiveKind::I8
            .set(&mut buf, 0, &Value::Int(-129), ByteOrder::Little)
            .is_err());
        assert!(PrimitiveKind::U32
            .set(&mut buf, 0, &Value::Int(-1), ByteOrder::Little)
            .is_err());
        assert_eq!(buf, [0xAA; 4]);
    }

    #[test]
    fn test_float_rejected_for_integers() {
        let mut buf = [0u8; 4];
        let err = PrimitiveKind::I32
            .set(&mut buf, 0, &Value::Float(1.0), ByteOrder::Little)
            .expect_err("float");
        assert!(matches!(err, Error::TypeMismatch { got: "float", .. }));
    }

    #[test]
    fn test_ints_accepted_for_floats() {
        let mut buf = [0u8; 8];
        PrimitiveKind::F64
            .set(&mut buf, 0, &Value::Int(3), ByteOrder::Little)
            .expect("set");
        assert_eq!(
            PrimitiveKind::F64.get(&buf, 0, ByteOrder::Little).expect("get"),
            Value::Float(3.0)
        );
    }

    #[test]
    fn test_char_conversions() {
        let mut buf = [0u8; 1];
        PrimitiveKind::Char
            .set(&mut buf, 0, &Value::Int(65), ByteOrder::Little)
            .expect("set");
        assert_eq!(buf[0], b'A');
        assert!(PrimitiveKind::Char
            .set(&mut buf, 0, &Value::Bytes(b"ab".to_vec()), ByteOrder::Little)
            .is_err());
        assert!(PrimitiveKind::WChar
            .set(&mut [0u8; 4], 0, &Value::Text("ab".into()), ByteOrder::Little)
            .is_err());
    }

    #[test]
    fn test_out_of_bounds() {
        let buf = [0u8; 3];
        let err = PrimitiveKind::I32
            .get(&buf, 0, ByteOrder::Little)
            .expect_err("too small");
        assert!(matches!(err, Error::OutOfBounds { offset: 0, len: 4, size: 3 }));
        assert!(PrimitiveKind::U8.get(&buf, usize::MAX, ByteOrder::Little).is_err());
    }

    #[test]
    fn test_bitfields() {
        let mut buf = [0u8; 4];
        let low = BitField { bit_offset: 0, bit_size: 3 };
        let high = BitField { bit_offset: 3, bit_size: 5 };
        let order = ByteOrder::Little;
        PrimitiveKind::I32.set_bits(&mut buf, 0, low, &Value::Int(-1), order).expect("set");
        PrimitiveKind::I32.set_bits(&mut buf, 0, high, &Value::Int(9), order).expect("set");
        assert_eq!(PrimitiveKind::I32.get_bits(&buf, 0, low, order).expect("get"), Value::Int(-1));
        assert_eq!(PrimitiveKind::I32.get_bits(&buf, 0, high, order).expect("get"), Value::Int(9));
        assert_eq!(buf[0], 0b0100_1111);

        let mut ubuf = [0u8; 2];
        let field = BitField { bit_offset: 4, bit_size: 4 };
        PrimitiveKind::U16.set_bits(&mut ubuf, 0, field, &Value::Int(0xF), order).expect("set");
        assert_eq!(PrimitiveKind::U16.get_bits(&ubuf, 0, field, order).expect("get"), Value::Int(15));
    }

    #[test]
    fn test_platform_aliases() {
        assert_eq!(
            PrimitiveKind::c_long().size() as usize,
            std::mem::size_of::<libc::c_long>()
        );
        assert_eq!(
            PrimitiveKind::c_size_t().size() as usize,
            std::mem::size_of::<libc::size_t>()
        );
        assert!(!PrimitiveKind::c_ulong().is_signed());
    }

    #[test]
    fn test_format_tags() {
        assert_eq!(PrimitiveKind::I32.format(ByteOrder::Little), "<i");
        assert_eq!(PrimitiveKind::F64.format(ByteOrder::Big), ">d");
        assert_eq!(ByteOrder::swapped(), match ByteOrder::NATIVE {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        });
    }
}
