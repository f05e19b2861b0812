//! Incremental update benchmarks
//!
//! Measures query and push-based invalidation performance of the
//! environment stack on synthetic module sets.
//!
//! Run with: cargo bench --bench incremental

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use lamina::{create_env_stack, EnvStack, ROOT_QUERY};

/// Fan-out sizes exercised by the scaling benchmarks
const FAN_OUT: &[usize] = &[8, 64, 256];

/// Honor `RUST_LOG` so propagation internals can be traced during a run
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// One hub module plus `spokes` modules whose classes all inherit from it
fn fan_out_modules(spokes: usize) -> BTreeMap<String, String> {
    let mut code = BTreeMap::new();
    code.insert("hub".to_string(), "class H(hub.Root): pass\nclass Root: pass".to_string());
    for i in 0..spokes {
        code.insert(format!("m{i}"), format!("class C{i}(hub.H): pass"));
    }
    code
}

/// One module containing `classes` class definitions in an inheritance chain
fn wide_module(classes: usize) -> String {
    let mut text = String::from("class C0: pass\n");
    for i in 1..classes {
        text.push_str(&format!("class C{i}(w.C{}): pass\n", i - 1));
    }
    text
}

/// Stack with every spoke's grandparents already queried
fn warm_fan_out(spokes: usize) -> EnvStack {
    let stack = create_env_stack(fan_out_modules(spokes));
    for i in 0..spokes {
        stack
            .class_grandparents
            .get(&format!("m{i}.C{i}"), ROOT_QUERY)
            .expect("warm query");
    }
    stack
}

fn bench_cold_query(c: &mut Criterion) {
    init_tracing();
    let mut group = c.benchmark_group("cold_query");
    for &size in FAN_OUT {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let mut code = BTreeMap::new();
                    code.insert("w".to_string(), wide_module(size));
                    create_env_stack(code)
                },
                |stack| {
                    let key = format!("w.C{}", size - 1);
                    black_box(
                        stack
                            .class_grandparents
                            .get(&key, ROOT_QUERY)
                            .expect("cold query"),
                    );
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_warm_query(c: &mut Criterion) {
    let stack = warm_fan_out(64);
    c.bench_function("warm_query", |b| {
        b.iter(|| {
            black_box(
                stack
                    .class_grandparents
                    .get("m7.C7", ROOT_QUERY)
                    .expect("warm query"),
            );
        });
    });
}

fn bench_saved_edit_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("saved_edit_propagation");
    for &size in FAN_OUT {
        let stack = warm_fan_out(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            // Every spoke's grandparents entry depends on hub.H, so each
            // update recomputes the full dependent set.
            b.iter(|| {
                black_box(
                    stack
                        .update("hub", "class H(hub.Root): pass\nclass Root: pass", false)
                        .expect("saved update"),
                );
            });
        });
    }
    group.finish();
}

fn bench_overlay_edit(c: &mut Criterion) {
    let stack = warm_fan_out(64);
    stack
        .update("hub", "class H: pass\nclass Root: pass", true)
        .expect("create overlay");
    c.bench_function("overlay_edit", |b| {
        b.iter(|| {
            black_box(
                stack
                    .update("hub", "class H: pass\nclass Root: pass", true)
                    .expect("overlay update"),
            );
        });
    });
}

criterion_group!(
    benches,
    bench_cold_query,
    bench_warm_query,
    bench_saved_edit_propagation,
    bench_overlay_edit
);
criterion_main!(benches);
