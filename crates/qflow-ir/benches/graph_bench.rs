//! Benchmarks for graph construction, validation and encoding
//!
//! Run with: cargo bench -p qflow-ir

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use qflow_ir::{Document, Graph, NodeKind, Port, RegionKind, Type};

/// Build a function that threads one qubit through `len` gates.
fn gate_chain(len: usize) -> Graph {
    let mut graph = Graph::new();
    let func = graph.add_node(
        NodeKind::Function {
            name: "chain".into(),
            function: 0,
        },
        vec![],
        vec![],
        None,
    );
    let root = graph.add_region(
        RegionKind::Function,
        "chain",
        None,
        func,
        vec![Port::labelled(Type::Qubit, "q")],
        vec![Port::new(Type::Qubit)],
    );
    let region = graph.region(root).unwrap().clone();
    let mut prev = region.input;
    for i in 0..len {
        let op = if i % 2 == 0 { "h" } else { "t" };
        let gate = graph.add_node(
            NodeKind::Gate { op: op.into() },
            vec![Port::new(Type::Qubit)],
            vec![Port::new(Type::Qubit)],
            Some(root),
        );
        graph.connect(prev, 0, gate, 0).unwrap();
        prev = gate;
    }
    graph.connect(prev, 0, region.output, 0).unwrap();
    graph
}

/// Benchmark building gate chains
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for len in &[10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("gate_chain", len), len, |b, &n| {
            b.iter(|| gate_chain(black_box(n)));
        });
    }
    group.finish();
}

/// Benchmark validation plus document encoding
fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize");
    for len in &[10, 100, 1000] {
        let graph = gate_chain(*len);
        group.bench_with_input(BenchmarkId::new("document", len), &graph, |b, g| {
            b.iter(|| {
                Document::from_graph("bench", black_box(g))
                    .unwrap()
                    .to_json(false)
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_serialize);
criterion_main!(benches);
