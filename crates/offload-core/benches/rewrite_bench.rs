//! # Rewrite Benchmarks
//!
//! Performance benchmarks for offload-core rewriting.
//!
//! Run with: `cargo bench -p offload-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use offload_core::{
    BlockRef, ChainField, ChainNormalizer, ChainRewriter, CompilationRule, Context, Fragment,
    RewriteOptions, StaticBlock, ThreadPool, create_config, offload,
};
use serde_json::{Value, json};
use std::hint::black_box;
use std::sync::Arc;

const STEPS: [&str; 5] = [
    "style-loader",
    "css-loader",
    "postcss-loader",
    "babel-loader",
    "eslint-loader",
];

/// A rule whose chain has `len` steps, cycling through common loaders.
fn create_rule(index: usize, len: usize) -> CompilationRule {
    let chain: Vec<Value> = (0..len)
        .map(|i| Value::String(STEPS[i % STEPS.len()].to_string()))
        .collect();
    CompilationRule::new(format!("\\.ext{index}$")).with_chain(ChainField::Use, Value::Array(chain))
}

/// A fragment with `size` rules.
fn create_fragment(size: usize) -> Fragment {
    (0..size).fold(Fragment::new(), |fragment, i| {
        fragment.with_rule(create_rule(i, 4))
    })
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_normalize(c: &mut Criterion) {
    let rule = CompilationRule::new("\\.css$").with_chain(
        ChainField::Use,
        json!(["style!css!postcss", {"loader": "sass-loader", "options": {"sourceMap": true}}]),
    );

    c.bench_function("normalize_mixed_chain", |b| {
        b.iter(|| black_box(ChainNormalizer::normalize(black_box(&rule))))
    });
}

fn bench_rewrite_rule(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite_rule");
    let rewriter = ChainRewriter::new(&RewriteOptions::default()).expect("rewriter");

    for len in [2, 8, 32].iter() {
        let rule = create_rule(0, *len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &rule, |b, rule| {
            b.iter(|| black_box(rewriter.process(rule)))
        });
    }

    group.finish();
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");

    for size in [10, 100, 1000].iter() {
        let block: BlockRef = Arc::new(StaticBlock::new("bench", create_fragment(*size)));
        let wrapped = offload(
            vec![block],
            &RewriteOptions::default(),
            Arc::new(ThreadPool::new(4)),
        )
        .expect("offload");
        let blocks: Vec<BlockRef> = vec![Arc::new(wrapped)];

        group.bench_with_input(BenchmarkId::from_parameter(size), &blocks, |b, blocks| {
            b.iter(|| black_box(create_config(blocks, Context::new())))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_rewrite_rule, bench_assemble);
criterion_main!(benches);
