use criterion::{criterion_group, criterion_main, Criterion};
use postings::merge::intersect_all;
use postings::tokenizer::tokenize;
use postings::{intersect, phrase_adjacent, union, PostingsList, PostingsListBuilder};

fn strided(step: u32, n: u32) -> PostingsList {
    let mut b = PostingsListBuilder::new();
    for i in 0..n {
        let doc = i * step;
        b.add_occurrence(doc, doc % 7).unwrap();
        b.add_occurrence(doc, doc % 7 + 1).unwrap();
    }
    b.finish().unwrap()
}

fn bench_merges(c: &mut Criterion) {
    let a = strided(2, 100_000);
    let b = strided(3, 100_000);
    let d = strided(5, 100_000);
    c.bench_function("intersect_100k", |bch| bch.iter(|| intersect(&a, &b)));
    c.bench_function("union_100k", |bch| bch.iter(|| union(&a, &b)));
    c.bench_function("phrase_adjacent_100k", |bch| bch.iter(|| phrase_adjacent(&a, &b, 1)));
    c.bench_function("intersect_all_3x100k", |bch| bch.iter(|| intersect_all(&[&a, &b, &d])));
}

fn bench_tokenize(c: &mut Criterion) {
    let text = include_str!("../src/merge.rs");
    c.bench_function("tokenize_source", |b| b.iter(|| tokenize(text)));
}

criterion_group!(benches, bench_merges, bench_tokenize);
criterion_main!(benches);
