// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Layout and Marshalling Benchmark
//!
//! Measures the hot paths a host runtime hits on every access:
//! - struct layout computation for a mixed member list
//! - member read/write through the kind table
//! - cached array-type lookup
//! - callback dispatch through the native entry point

#![allow(clippy::uninlined_format_args)]

use cdata::simple::{c_char, c_double, c_int, c_short, c_void_p};
use cdata::{
    cdata_callback_dispatch, CData, CType, Callable, Context, FieldDef, FuncPtrDef, RecordDef,
    ReturnType, Value,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn mixed_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::new("tag", &c_char()),
        FieldDef::new("count", &c_int()),
        FieldDef::new("small", &c_short()),
        FieldDef::new("ratio", &c_double()),
        FieldDef::new("next", &c_void_p()),
    ]
}

fn bench_struct_layout(c: &mut Criterion) {
    c.bench_function("layout_struct_5_fields", |b| {
        b.iter(|| {
            let ty = CType::define_struct("Mixed", RecordDef::new(black_box(mixed_fields())))
                .expect("layout");
            black_box(ty.size())
        });
    });
}

fn bench_member_access(c: &mut Criterion) {
    let ty = CType::define_struct("Mixed", RecordDef::new(mixed_fields())).expect("layout");
    let inst = CData::new(&ty).expect("instance");

    c.bench_function("member_write_int", |b| {
        let value = Value::Int(42);
        b.iter(|| inst.write_member(black_box("count"), &value).expect("write"));
    });
    c.bench_function("member_read_double", |b| {
        b.iter(|| black_box(inst.read_member(black_box("ratio")).expect("read")));
    });
}

fn bench_cached_array_type(c: &mut Criterion) {
    let ctx = Context::new();
    let item = c_int();
    ctx.array_type(&item, 16).expect("warm");
    c.bench_function("array_type_cache_hit", |b| {
        b.iter(|| black_box(ctx.array_type(&item, black_box(16)).expect("array")));
    });
}

fn bench_callback_dispatch(c: &mut Criterion) {
    let ctx = Context::new();
    let ty = ctx
        .function_type(
            &FuncPtrDef::new(0)
                .with_args(&[c_int(), c_int()])
                .with_restype(ReturnType::Type(c_int())),
        )
        .expect("funcptr");
    let add = Callable::new(|args| match args {
        [Value::Int(a), Value::Int(b)] => Ok(Value::Int(a + b)),
        _ => Ok(Value::Int(0)),
    });
    let tr = ctx.register_callback(&ty, add).expect("register");
    let (a, b) = (3i32.to_ne_bytes(), 4i32.to_ne_bytes());
    let args = [a.as_ptr(), b.as_ptr()];

    c.bench_function("callback_dispatch_int_add", |bench| {
        let mut ret = [0u8; 4];
        bench.iter(|| {
            // SAFETY: two 4-byte argument slots and a 4-byte result slot
            let status =
                unsafe { cdata_callback_dispatch(tr.id(), args.as_ptr(), 2, ret.as_mut_ptr(), 4) };
            black_box(status)
        });
    });
    ctx.unregister_callback(tr.id());
}

criterion_group!(
    benches,
    bench_struct_layout,
    bench_member_access,
    bench_cached_array_type,
    bench_callback_dispatch
);
criterion_main!(benches);
