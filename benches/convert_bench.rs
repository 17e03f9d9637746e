//! Benchmark for graph conversion
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use torch2lite::prelude::*;

/// A small convnet-shaped trace: conv / relu blocks, a flatten, a classifier.
fn make_convnet(blocks: usize) -> SourceGraph {
    let mut g = SourceGraph::new();
    let input = g.add_input(ValueKind::Tensor);

    let stride = g.add_constant(Constant::IntList(vec![1, 1]));
    let padding = g.add_constant(Constant::IntList(vec![1, 1]));
    let dilation = g.add_constant(Constant::IntList(vec![1, 1]));
    let groups = g.add_constant(Constant::Int(1));

    let mut x = input;
    for _ in 0..blocks {
        let w = g.add_constant(Constant::tensor(&[8, 8, 3, 3], vec![0.01; 576]).unwrap());
        let b = g.add_constant(Constant::None);
        let conv = g.add_node(
            "aten::conv2d",
            &[x.id, w.id, b.id, stride.id, padding.id, dilation.id, groups.id],
            &[ValueKind::Tensor],
        );
        let relu = g.add_node("aten::relu_", &[conv[0].id], &[ValueKind::Tensor]);
        x = relu[0];
    }

    let shape = g.add_constant(Constant::IntList(vec![1, -1]));
    let flat = g.add_node("aten::view", &[x.id, shape.id], &[ValueKind::Tensor]);
    let w = g.add_constant(Constant::tensor(&[10, 8], vec![0.01; 80]).unwrap());
    let b = g.add_constant(Constant::tensor(&[10], vec![0.0; 10]).unwrap());
    let fc = g.add_node(
        "aten::linear",
        &[flat[0].id, w.id, b.id],
        &[ValueKind::Tensor],
    );
    g.set_outputs(&[fc[0].id]);
    g
}

fn convert_benchmark(c: &mut Criterion) {
    let small = make_convnet(4);
    let large = make_convnet(64);

    c.bench_function("convert_convnet_4", |b| {
        b.iter(|| convert_graph(black_box(&small)).unwrap())
    });

    c.bench_function("convert_convnet_64", |b| {
        b.iter(|| convert_graph(black_box(&large)).unwrap())
    });

    c.bench_function("registry_lookup", |b| {
        let registry = Registry::global();
        let name = OpName::new("quantized::conv2d_relu");
        b.iter(|| registry.lookup(black_box(&name)).unwrap())
    });
}

criterion_group!(benches, convert_benchmark);
criterion_main!(benches);
