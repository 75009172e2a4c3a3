//! Merge-path benchmarks over synthetic graphs.
//!
//! Measures the pure core every merge pays for: conflict detection,
//! keyed union, and the structural delta, across graph sizes. All
//! three walk the same keyed maps, so they should scale together; a
//! regression in one of them shows up here first.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench merge_reduce
//! # With a custom filter:
//! cargo bench --bench merge_reduce -- detect
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use vellum::model::conflict::detect;
use vellum::model::diff::delta;
use vellum::model::graph::{Edge, Node};
use vellum::model::merge::union_graph;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A chain of `n` service nodes: `svc-0 -> svc-1 -> ...`.
fn base_graph(n: usize) -> (Vec<Node>, Vec<Edge>) {
    let nodes = (0..n)
        .map(|i| Node::new(format!("svc-{i}"), "service").with_label(format!("service {i}")))
        .collect();
    let edges = (1..n)
        .map(|i| Edge::new(format!("svc-{}", i - 1), format!("svc-{i}")).with_protocol("grpc"))
        .collect();
    (nodes, edges)
}

/// A clean candidate: relabels the first half of the base graph and
/// appends half as many fresh nodes. The common shape of one
/// contributor iterating on a region.
fn clean_candidate(n: usize) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes: Vec<Node> = (0..n / 2)
        .map(|i| Node::new(format!("svc-{i}"), "service").with_label(format!("service {i} v2")))
        .collect();
    nodes.extend((n..n + n / 2).map(|i| Node::new(format!("svc-{i}"), "service")));
    let edges = (n + 1..n + n / 2)
        .map(|i| Edge::new(format!("svc-{}", i - 1), format!("svc-{i}")))
        .collect();
    (nodes, edges)
}

/// A candidate that disagrees on every tenth node's type.
fn conflicted_candidate(n: usize) -> Vec<Node> {
    (0..n)
        .step_by(10)
        .map(|i| Node::new(format!("svc-{i}"), "queue"))
        .collect()
}

const SIZES: [usize; 3] = [100, 1_000, 5_000];

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_detect_clean(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_clean");
    for n in SIZES {
        let (base_nodes, base_edges) = base_graph(n);
        let (cand_nodes, cand_edges) = clean_candidate(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| detect(&base_nodes, &cand_nodes, &base_edges, &cand_edges));
        });
    }
    group.finish();
}

fn bench_detect_conflicted(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_conflicted");
    for n in SIZES {
        let (base_nodes, base_edges) = base_graph(n);
        let cand_nodes = conflicted_candidate(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| detect(&base_nodes, &cand_nodes, &base_edges, &[]));
        });
    }
    group.finish();
}

fn bench_union(c: &mut Criterion) {
    let mut group = c.benchmark_group("union_graph");
    for n in SIZES {
        let (base_nodes, base_edges) = base_graph(n);
        let (cand_nodes, cand_edges) = clean_candidate(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| union_graph(&base_nodes, &base_edges, &cand_nodes, &cand_edges));
        });
    }
    group.finish();
}

fn bench_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta");
    for n in SIZES {
        let (base_nodes, base_edges) = base_graph(n);
        let (merged_nodes, merged_edges) =
            union_graph(&base_nodes, &base_edges, &clean_candidate(n).0, &[]);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| delta(&base_nodes, &base_edges, &merged_nodes, &merged_edges));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_detect_clean,
    bench_detect_conflicted,
    bench_union,
    bench_delta
);
criterion_main!(benches);
