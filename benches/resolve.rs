//! Benchmarks for entity resolution.
//!
//! Fuzzy matching scans every entity of the hinted type, so resolution
//! cost scales with registry size. These benches track exact-name,
//! alias, and near-miss lookups across growing registries.

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fabula::services::EntityRegistry;
use fabula::storage::MemoryStore;
use fabula::{CreationSource, EntityType};
use std::sync::Arc;

const GIVEN: &[&str] = &[
    "Mira", "Talan", "Oska", "Vash", "Ileni", "Corvin", "Sarra", "Dren", "Yole", "Petra",
];
const FAMILY: &[&str] = &[
    "Kessler", "Vael", "Orin", "Thorne", "Maret", "Caldus", "Ren", "Obel", "Fenn", "Ashgrove",
];

/// Populates a registry with `count` characters with distinct full names,
/// each carrying one alias.
fn build_registry(count: usize) -> EntityRegistry<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let registry = EntityRegistry::new(store);
    for i in 0..count {
        let name = format!(
            "{} {} {}",
            GIVEN[i % GIVEN.len()],
            FAMILY[(i / GIVEN.len()) % FAMILY.len()],
            i
        );
        let entity = registry
            .resolve_or_create(&name, EntityType::Character, CreationSource::Human)
            .unwrap();
        registry
            .register_aliases(entity.id(), &[format!("the {i}th")])
            .unwrap();
    }
    registry
}

fn bench_resolve_exact(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_exact");
    for count in [100usize, 1_000, 10_000] {
        let registry = build_registry(count);
        let target = format!("{} {} {}", GIVEN[0], FAMILY[0], 0);
        group.bench_with_input(BenchmarkId::from_parameter(count), &target, |b, name| {
            b.iter(|| {
                registry
                    .resolve(std::hint::black_box(name), Some(EntityType::Character))
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_resolve_alias(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_alias");
    for count in [100usize, 1_000] {
        let registry = build_registry(count);
        let alias = format!("the {}th", count / 2);
        group.bench_with_input(BenchmarkId::from_parameter(count), &alias, |b, name| {
            b.iter(|| {
                registry
                    .resolve(std::hint::black_box(name), Some(EntityType::Character))
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_resolve_fuzzy_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_fuzzy_miss");
    group.sample_size(30);
    for count in [100usize, 1_000] {
        let registry = build_registry(count);
        // One trailing typo: forces the full similarity scan.
        let near = format!("{} {} {}x", GIVEN[0], FAMILY[0], 0);
        group.bench_with_input(BenchmarkId::from_parameter(count), &near, |b, name| {
            b.iter(|| {
                registry
                    .resolve(std::hint::black_box(name), Some(EntityType::Character))
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_resolve_exact,
    bench_resolve_alias,
    bench_resolve_fuzzy_miss
);
criterion_main!(benches);
