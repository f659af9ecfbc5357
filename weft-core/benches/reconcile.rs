//! Benchmarks for the reconciler and the scheduler
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use weft_core::{h, props, HeadlessHost, ObjectRef, Renderer, Runtime, VNode};

fn keyed_list(keys: &[usize]) -> VNode {
    h(
        "ul",
        None,
        keys.iter()
            .map(|key| h("li", props! { "key" => *key }, *key))
            .collect::<Vec<_>>(),
    )
}

// =============================================================================
// KEYED DIFF
// =============================================================================

fn bench_keyed_reorder(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_reorder");
    for size in [10usize, 100, 1000] {
        let forward: Vec<usize> = (0..size).collect();
        let mut rotated = forward.clone();
        rotated.rotate_right(1);
        let mut reversed = forward.clone();
        reversed.reverse();

        group.bench_with_input(BenchmarkId::new("rotate", size), &size, |b, _| {
            let host = Arc::new(HeadlessHost::new());
            let root = host.create_container("div");
            let renderer = Renderer::new(host.clone(), Runtime::new());
            let mut flip = false;
            b.iter(|| {
                let keys = if flip { &forward } else { &rotated };
                flip = !flip;
                renderer.render(Some(keyed_list(keys)), root).unwrap();
                host.clear_ops();
            })
        });

        group.bench_with_input(BenchmarkId::new("reverse", size), &size, |b, _| {
            let host = Arc::new(HeadlessHost::new());
            let root = host.create_container("div");
            let renderer = Renderer::new(host.clone(), Runtime::new());
            let mut flip = false;
            b.iter(|| {
                let keys = if flip { &forward } else { &reversed };
                flip = !flip;
                renderer.render(Some(keyed_list(keys)), root).unwrap();
                host.clear_ops();
            })
        });
    }
    group.finish();
}

fn bench_identical_rerender(c: &mut Criterion) {
    let keys: Vec<usize> = (0..500).collect();
    let host = Arc::new(HeadlessHost::new());
    let root = host.create_container("div");
    let renderer = Renderer::new(host.clone(), Runtime::new());
    renderer.render(Some(keyed_list(&keys)), root).unwrap();

    c.bench_function("identical_rerender_500", |b| {
        b.iter(|| {
            renderer
                .render(Some(black_box(keyed_list(&keys))), root)
                .unwrap();
        })
    });
}

fn bench_lis(c: &mut Criterion) {
    let values: Vec<Option<usize>> = (0..1000)
        .map(|i| if i % 7 == 0 { None } else { Some((i * 7919) % 1000) })
        .collect();
    c.bench_function("lis_1000", |b| {
        b.iter(|| black_box(weft_core::render::longest_increasing_subsequence(&values)))
    });
}

// =============================================================================
// SCHEDULER
// =============================================================================

fn bench_batched_component_update(c: &mut Criterion) {
    let rt = Runtime::new();
    let host = Arc::new(HeadlessHost::new());
    let root = host.create_container("div");
    let renderer = Renderer::new(host.clone(), rt.clone());
    let state = rt.reactive(ObjectRef::from_entries([("n", 0)]));

    let view = weft_core::ComponentDef::builder("view")
        .render({
            let state = state.clone();
            move |_| h("span", None, state.get_value("n"))
        })
        .build();
    renderer.render(Some(h(&view, None, ())), root).unwrap();

    let mut n = 0;
    c.bench_function("batched_component_update", |b| {
        b.iter(|| {
            for _ in 0..10 {
                n += 1;
                state.set("n", n);
            }
            rt.flush_jobs().unwrap();
            host.clear_ops();
        })
    });
}

criterion_group!(
    reconcile_benches,
    bench_keyed_reorder,
    bench_identical_rerender,
    bench_lis,
);

criterion_group!(scheduler_benches, bench_batched_component_update);

criterion_main!(reconcile_benches, scheduler_benches);
