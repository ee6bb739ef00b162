//! Benchmarks for name pattern compilation and matching.
//!
//! Patterns are evaluated once per type or member of every patched module, so matching cost
//! scales with module size:
//! - Compiling pattern lists
//! - Matching type names against literal and glob patterns
//! - Running the member rules over a module with many types

extern crate dotpatch;

use criterion::{criterion_group, criterion_main, Criterion};
use dotpatch::{
    model::{Module, TypeAttributes},
    patch::{MutationRule, NamePredicate, UnsealTypes, VirtualizeMembers},
};
use std::hint::black_box;

/// A module with `count` sealed types of four methods each
fn build_module(count: usize) -> Module {
    let mut module = Module::new("Bench");
    for index in 0..count {
        let ty = module.add_type(
            "Bench.Generated",
            &format!("Type{index}Options"),
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
        );
        for method in ["Run", "Stop", "get_Value", "set_Value"] {
            // public hidebysig
            let _ = module.add_method(ty, method, 0x0086);
        }
    }
    module
}

/// Benchmark compiling a pattern list with globs and literals.
fn bench_compile(c: &mut Criterion) {
    let patterns = "MyApp.*Options;MyApp.Service::*;MyApp.Exact.Type;*.Internal.*";

    c.bench_function("pattern_compile", |b| {
        b.iter(|| black_box(NamePredicate::compile(black_box(Some(patterns)))));
    });
}

/// Benchmark matching a literal pattern list.
fn bench_match_literal(c: &mut Criterion) {
    let predicate = NamePredicate::compile(Some("MyApp.Foo;MyApp.Bar;MyApp.Baz"));

    c.bench_function("pattern_match_literal", |b| {
        b.iter(|| black_box(predicate.matches(black_box("MyApp.Baz"))));
    });
}

/// Benchmark matching a glob pattern list, hit and miss.
fn bench_match_glob(c: &mut Criterion) {
    let predicate = NamePredicate::compile(Some("MyApp.*Options;*.Internal.*"));

    c.bench_function("pattern_match_glob_hit", |b| {
        b.iter(|| black_box(predicate.matches(black_box("MyApp.Configuration.ServerOptions"))));
    });
    c.bench_function("pattern_match_glob_miss", |b| {
        b.iter(|| black_box(predicate.matches(black_box("Other.Configuration.Server"))));
    });
}

/// Benchmark unsealing every matching type of a 1000 type module.
fn bench_unseal_module(c: &mut Criterion) {
    let module = build_module(1000);
    let rule = UnsealTypes::new(NamePredicate::compile(Some("Bench.Generated.*Options")));

    c.bench_function("rule_unseal_1000_types", |b| {
        b.iter_batched(
            || module.clone(),
            |mut module| black_box(rule.apply(&mut module)),
            criterion::BatchSize::LargeInput,
        );
    });
}

/// Benchmark virtualizing the members of a 1000 type module.
fn bench_virtualize_module(c: &mut Criterion) {
    let module = build_module(1000);
    let rule = VirtualizeMembers::new(NamePredicate::compile(Some("Bench.Generated.*::Run")));

    c.bench_function("rule_virtualize_1000_types", |b| {
        b.iter_batched(
            || module.clone(),
            |mut module| black_box(rule.apply(&mut module)),
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_compile,
    bench_match_literal,
    bench_match_glob,
    bench_unseal_module,
    bench_virtualize_module,
);
criterion_main!(benches);
