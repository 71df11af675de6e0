use criterion::{Criterion, criterion_group, criterion_main};
use pdf_rag::embeddings::{ChunkingConfig, TextChunker};
use std::fmt::Write as _;
use std::hint::black_box;

/// Policy-like text: short and long lines, plus one line longer than a chunk
fn sample_document() -> String {
    let mut text = String::new();
    for section in 0..400 {
        writeln!(text, "Section {}: Leave entitlements", section).expect("write to string");
        for clause in 0..6 {
            writeln!(
                text,
                "{}.{} Employees accrue paid leave at the rate set out in schedule {} of this agreement.",
                section, clause, clause
            )
            .expect("write to string");
        }
    }
    text.push_str(&"x".repeat(2500));
    text
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let text = sample_document();
    let chunker = TextChunker::new(ChunkingConfig::default()).expect("default config is valid");

    c.bench_function("chunking", |b| b.iter(|| chunker.split(black_box(&text))));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
