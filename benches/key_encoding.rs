//! Key encoding benchmarks.
//!
//! The codec sits on the hot path of every tree descent; these
//! benchmarks track segment encoding, full-key composition and filter
//! selection cost.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use larchdb::{Key, KeyFilter, Segment, Term};

fn bench_segment_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_encode");

    let values: Vec<(Segment, &str)> = vec![
        (Segment::Int(0), "int_zero"),
        (Segment::Int(125), "int_small"),
        (Segment::Int(-4_000_000_000), "int_negative_wide"),
        (Segment::Double(1.3), "double"),
        (Segment::Text("atlantic".into()), "text_short"),
        (Segment::Text("a\0b\0c".repeat(20)), "text_escaped"),
    ];

    for (value, name) in values {
        group.bench_with_input(BenchmarkId::new("encode", name), &value, |b, value| {
            let mut buf = Vec::with_capacity(256);
            b.iter(|| {
                buf.clear();
                black_box(value).encode_into(&mut buf);
                black_box(buf.len())
            });
        });
    }

    group.finish();
}

fn bench_key_composition(c: &mut Criterion) {
    c.bench_function("key_append_three_segments", |b| {
        b.iter(|| {
            let mut key = Key::new();
            key.append(black_box("atlantic"))
                .append(black_box(1.3f32))
                .append(black_box(125i64));
            black_box(key.encoded_len())
        });
    });

    let mut key = Key::new();
    key.append("atlantic").append(1.3f32).append(125i64);
    c.bench_function("key_cursor_decode", |b| {
        b.iter(|| {
            let mut cursor = black_box(&key).cursor();
            let a = cursor.decode_text().unwrap();
            let f = cursor.decode_float().unwrap();
            let i = cursor.decode_int().unwrap();
            black_box((a, f, i))
        });
    });
}

fn bench_filter_selected(c: &mut Criterion) {
    let filter = KeyFilter::new()
        .append(Term::simple("atlantic"))
        .append(Term::range("x", "z"))
        .append(
            Term::or(vec![
                Term::range(100, 150),
                Term::range(200, 250),
                Term::range(300, 350),
            ])
            .unwrap(),
        )
        .limit(1, 4);

    let mut hit = Key::new();
    hit.append("atlantic").append("y").append(225i64);
    let mut miss = Key::new();
    miss.append("atlantic").append("y").append(175i64);

    c.bench_function("filter_selected_hit", |b| {
        b.iter(|| black_box(filter.selected(black_box(&hit))))
    });
    c.bench_function("filter_selected_miss", |b| {
        b.iter(|| black_box(filter.selected(black_box(&miss))))
    });
    c.bench_function("filter_traverse_miss", |b| {
        b.iter(|| {
            let mut key = miss.clone();
            black_box(filter.traverse(&mut key, true))
        })
    });
}

criterion_group!(
    benches,
    bench_segment_encode,
    bench_key_composition,
    bench_filter_selected
);
criterion_main!(benches);
