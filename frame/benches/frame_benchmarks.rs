use criterion::{Criterion, black_box, criterion_group, criterion_main};

use lumen_frame::{
    BufferVisibility, ComputePass, FramePacer, GraphicsDevice, PassGraph, RenderPass,
    TransientAllocator,
};

// ---------------------------------------------------------------------------
// Transient allocation
// ---------------------------------------------------------------------------

fn bench_allocate_and_reset(c: &mut Criterion) {
    let device = GraphicsDevice::dummy();
    let mut arena =
        TransientAllocator::new(&device, 1 << 20, BufferVisibility::Private, "bench").unwrap();

    c.bench_function("transient_allocate_256_then_reset", |b| {
        b.iter(|| {
            for _ in 0..256 {
                black_box(arena.allocate(black_box(48)));
            }
            arena.reset();
        });
    });
}

fn bench_allocate_slice(c: &mut Criterion) {
    let device = GraphicsDevice::dummy();
    let mut arena =
        TransientAllocator::new(&device, 1 << 20, BufferVisibility::Shared, "bench").unwrap();
    let data = [1.0f32; 64];

    c.bench_function("transient_allocate_slice_64_floats", |b| {
        b.iter(|| {
            if !arena.can_allocate(256, TransientAllocator::DEFAULT_ALIGNMENT) {
                arena.reset();
            }
            black_box(arena.allocate_slice(black_box(&data)));
        });
    });
}

// ---------------------------------------------------------------------------
// Pass graph compilation
// ---------------------------------------------------------------------------

fn chain_graph(len: usize) -> PassGraph {
    let mut graph = PassGraph::new();
    let mut prev = graph.register_node(RenderPass::new("pass_0", |_| {}), &[]);
    for i in 1..len {
        prev = graph.register_node(RenderPass::new(format!("pass_{i}"), |_| {}), &[prev]);
    }
    graph
}

fn bench_graph_compile_chain(c: &mut Criterion) {
    let graph = chain_graph(32);
    c.bench_function("pass_graph_compile_32_chain", |b| {
        b.iter(|| black_box(graph.compile()));
    });
}

fn bench_graph_compile_fan(c: &mut Criterion) {
    let mut graph = PassGraph::new();
    let roots: Vec<_> = (0..8)
        .map(|i| graph.register_node(ComputePass::new(format!("cull_{i}"), |_| {}), &[]))
        .collect();
    for i in 0..8 {
        graph.register_node(RenderPass::new(format!("draw_{i}"), |_| {}), &roots);
    }

    c.bench_function("pass_graph_compile_8x8_fan", |b| {
        b.iter(|| black_box(graph.compile()));
    });
}

// ---------------------------------------------------------------------------
// Frame pacing
// ---------------------------------------------------------------------------

fn bench_pacer_acquire_release(c: &mut Criterion) {
    let pacer = FramePacer::new(3);
    c.bench_function("frame_pacer_acquire_release", |b| {
        b.iter(|| {
            let slot = pacer.wait_for_slot();
            pacer.release_slot(black_box(slot));
        });
    });
}

criterion_group!(
    benches,
    bench_allocate_and_reset,
    bench_allocate_slice,
    bench_graph_compile_chain,
    bench_graph_compile_fan,
    bench_pacer_acquire_release,
);
criterion_main!(benches);
