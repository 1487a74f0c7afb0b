use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use zlgraph::{CCtx, Compressor, StandardGraph, StandardNode, Stream};

// Structured numeric corpus: slowly drifting 32 bit timestamps
fn timestamps(n: usize) -> Vec<u32> {
    let mut v = Vec::with_capacity(n);
    let mut t = 1_700_000_000u32;
    for i in 0..n {
        t = t.wrapping_add(1 + (i as u32 * 2_654_435_761) % 17);
        v.push(t);
    }
    v
}

fn serial_corpus(n: usize) -> Vec<u8> {
    (0..n).map(|i| ((i * 31) % 251) as u8).collect()
}

fn generic_compression(c: &mut Criterion) {
    let mut compressor = Compressor::new();
    let generic = compressor.standard_graph(StandardGraph::Generic);
    compressor.set_start(generic);

    let data = serial_corpus(1 << 20);
    let mut cctx = CCtx::new();

    let mut group = c.benchmark_group("generic_compression");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("serial_1MiB", |b| {
        b.iter(|| {
            let input = Stream::ref_serial(black_box(&data));
            cctx.compress(&compressor, &[input]).unwrap()
        });
    });
    group.finish();
}

fn graph_compression(c: &mut Criterion) {
    let mut compressor = Compressor::new();
    let delta = compressor.standard_node(StandardNode::Delta);
    let transpose = compressor.standard_node(StandardNode::TransposeSplit);
    let generic = compressor.standard_graph(StandardGraph::Generic);
    let planes = compressor
        .register_static_graph("planes", transpose, &[generic])
        .unwrap();
    let graph = compressor
        .register_static_graph("delta_planes", delta, &[planes])
        .unwrap();
    compressor.set_start(graph);

    let values = timestamps(1 << 18);
    let mut cctx = CCtx::new();

    let mut group = c.benchmark_group("graph_compression");
    group.throughput(Throughput::Bytes((values.len() * 4) as u64));
    group.bench_function("delta_transpose_timestamps", |b| {
        b.iter(|| {
            let input = Stream::from_u32s(black_box(&values));
            cctx.compress(&compressor, &[input]).unwrap()
        });
    });
    group.finish();
}

criterion_group!(benches, generic_compression, graph_compression);
criterion_main!(benches);
