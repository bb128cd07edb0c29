// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Randomized layout checks: alignment, ordering and padding rules hold for
//! arbitrary member lists.

use cdata::simple::{
    c_bool, c_char, c_double, c_float, c_int, c_longlong, c_short, c_ubyte, c_void_p,
};
use cdata::{CType, Context, FieldDef, RecordDef, TypeRef};

const ROUNDS: usize = 200;

fn scalars() -> Vec<TypeRef> {
    vec![
        c_bool(),
        c_char(),
        c_ubyte(),
        c_short(),
        c_int(),
        c_float(),
        c_longlong(),
        c_double(),
        c_void_p(),
    ]
}

fn random_fields(rng: &mut fastrand::Rng, ctx: &Context) -> Vec<FieldDef> {
    let pool = scalars();
    let count = rng.usize(1..8);
    (0..count)
        .map(|i| {
            let scalar = &pool[rng.usize(..pool.len())];
            let ty = if rng.u8(..4) == 0 {
                ctx.array_type(scalar, rng.u32(1..5)).expect("array")
            } else {
                scalar.clone()
            };
            FieldDef::new(format!("f{}", i), &ty)
        })
        .collect()
}

fn round_up(n: u32, align: u32) -> u32 {
    n.div_ceil(align) * align
}

#[test]
fn struct_layout_invariants() {
    let mut rng = fastrand::Rng::with_seed(0x5eed_c0de);
    let ctx = Context::new();
    for round in 0..ROUNDS {
        let fields = random_fields(&mut rng, &ctx);
        let ty = CType::define_struct(format!("S{}", round), RecordDef::new(fields.clone()))
            .expect("layout");
        let laid = ty.fields();
        assert_eq!(laid.len(), fields.len());

        let mut end = 0;
        let mut max_align = 1;
        for f in &laid {
            let align = f.ty.align();
            assert_eq!(f.offset % align, 0, "round {}: '{}' misaligned", round, f.name);
            assert!(f.offset >= end, "round {}: '{}' overlaps", round, f.name);
            assert!(f.offset - end < align, "round {}: '{}' overpadded", round, f.name);
            end = f.offset + f.size();
            max_align = max_align.max(align);
        }
        assert_eq!(ty.align(), max_align);
        assert_eq!(ty.size(), round_up(end, max_align));
    }
}

#[test]
fn union_layout_invariants() {
    let mut rng = fastrand::Rng::with_seed(42);
    let ctx = Context::new();
    for round in 0..ROUNDS {
        let fields = random_fields(&mut rng, &ctx);
        let ty = CType::define_union(format!("U{}", round), RecordDef::new(fields))
            .expect("layout");
        let laid = ty.fields();
        assert!(laid.iter().all(|f| f.offset == 0));
        let largest = laid.iter().map(|f| f.size()).max().unwrap_or(0);
        let align = laid.iter().map(|f| f.ty.align()).max().unwrap_or(1);
        assert_eq!(ty.align(), align);
        assert_eq!(ty.size(), round_up(largest, align));
    }
}

#[test]
fn packed_layout_invariants() {
    let mut rng = fastrand::Rng::with_seed(7);
    let ctx = Context::new();
    for round in 0..ROUNDS {
        let pack = [1u32, 2, 4][rng.usize(..3)];
        let fields = random_fields(&mut rng, &ctx);
        let ty = CType::define_struct(
            format!("P{}", round),
            RecordDef::new(fields).with_pack(pack),
        )
        .expect("layout");
        assert!(ty.align() <= pack);
        for f in ty.fields() {
            assert_eq!(f.offset % f.ty.align().min(pack), 0);
        }
        assert_eq!(ty.size() % ty.align(), 0);
    }
}

#[test]
fn array_size_is_item_times_length() {
    let mut rng = fastrand::Rng::with_seed(99);
    let ctx = Context::new();
    for _ in 0..ROUNDS {
        let pool = scalars();
        let item = &pool[rng.usize(..pool.len())];
        let length = rng.u32(0..64);
        let ty = ctx.array_type(item, length).expect("array");
        assert_eq!(ty.size(), item.size() * length);
        assert_eq!(ty.align(), item.align());
        assert_eq!(ty.length(), Some(length));
    }
}
