use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use zlgraph::{CCtx, Compressor, DCtx, StandardGraph, StandardNode, Stream};

fn timestamps(n: usize) -> Vec<u32> {
    let mut v = Vec::with_capacity(n);
    let mut t = 1_700_000_000u32;
    for i in 0..n {
        t = t.wrapping_add(1 + (i as u32 * 2_654_435_761) % 17);
        v.push(t);
    }
    v
}

fn generic_decompression(c: &mut Criterion) {
    let mut compressor = Compressor::new();
    let generic = compressor.standard_graph(StandardGraph::Generic);
    compressor.set_start(generic);

    let data: Vec<u8> = (0..1 << 20).map(|i: usize| ((i * 31) % 251) as u8).collect();
    let frame = CCtx::new()
        .compress(&compressor, &[Stream::ref_serial(&data)])
        .unwrap();
    let dctx = DCtx::new();

    let mut group = c.benchmark_group("generic_decompression");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("serial_1MiB", |b| {
        b.iter(|| dctx.decompress(black_box(&frame)).unwrap());
    });
    group.finish();
}

fn graph_decompression(c: &mut Criterion) {
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
    let frame = CCtx::new()
        .compress(&compressor, &[Stream::from_u32s(&values)])
        .unwrap();
    let dctx = DCtx::new();

    let mut group = c.benchmark_group("graph_decompression");
    group.throughput(Throughput::Bytes((values.len() * 4) as u64));
    group.bench_function("delta_transpose_timestamps", |b| {
        b.iter(|| dctx.decompress(black_box(&frame)).unwrap());
    });
    group.finish();
}

criterion_group!(benches, generic_decompression, graph_decompression);
criterion_main!(benches);
