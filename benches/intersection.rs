//! Benchmarks for the oblivious intersection
//!
//! Cost must not depend on set sizes or overlap: every case below performs
//! the same 1024 comparisons and should land in the same time bucket.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mutuals::compute::intersect;
use mutuals::crypto::{decrypt_set, encrypt_set, SharedCipher};
use mutuals::fingerprint::{build_contact_set, ContactSet};
use subtle::Choice;

fn contacts(prefix: &str, count: usize) -> ContactSet {
    let raw: Vec<String> = (0..count)
        .map(|i| format!("{}{}@example.com", prefix, i))
        .collect();
    build_contact_set(&raw).unwrap()
}

fn bench_intersection(c: &mut Criterion) {
    let mut group = c.benchmark_group("intersect");

    let cases = [
        ("empty", contacts("a", 0), contacts("b", 0)),
        ("single_disjoint", contacts("a", 1), contacts("b", 1)),
        ("full_disjoint", contacts("a", 32), contacts("b", 32)),
        ("full_overlap", contacts("a", 32), contacts("a", 32)),
        ("half_overlap", contacts("a", 32), contacts("a", 16)),
    ];

    for (name, first, second) in &cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), &(first, second), |b, (first, second)| {
            b.iter(|| intersect(black_box(first), black_box(second), Choice::from(1)))
        });
    }

    group.finish();
}

fn bench_slot_cipher(c: &mut Criterion) {
    let cipher = SharedCipher::from_shared_secret([9u8; 32], [7u8; 32]);
    let set = contacts("a", 32);
    let nonce = [3u8; 16];

    c.bench_function("encrypt_set_32", |b| {
        b.iter(|| encrypt_set(black_box(&cipher), black_box(&set), nonce).unwrap())
    });

    let payload = encrypt_set(&cipher, &set, nonce).unwrap();
    c.bench_function("decrypt_set_32", |b| {
        b.iter(|| decrypt_set(black_box(&cipher), black_box(&payload)).unwrap())
    });
}

criterion_group!(benches, bench_intersection, bench_slot_cipher);
criterion_main!(benches);
