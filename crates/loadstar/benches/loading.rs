use criterion::{Criterion, criterion_group, criterion_main};
use loadstar::bundler::{BundleEntry, render_bundle, rewrite_requires};
use loadstar::graph::Registry;
use loadstar::{Exports, Loader, ModuleTable};
use std::hint::black_box;
use std::sync::Arc;

const CHAIN_LENGTH: usize = 200;

/// A chain of modules where module `n` requires module `n + 1`
fn chain_table(length: usize) -> ModuleTable {
    let table = ModuleTable::new();
    for n in 0..length {
        let body = move |_: &Loader| {
            let exports = Exports::new(n);
            anyhow::Ok(Some(if n + 1 < length {
                exports.with_dependencies([format!("chain/{}", n + 1)])
            } else {
                exports
            }))
        };
        table.insert(format!("chain/{n}.js"), body);
    }
    table
}

/// Benchmark preloading a long required chain on a fresh loader
fn benchmark_preload_chain(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Failed to build runtime");
    let table = Arc::new(chain_table(CHAIN_LENGTH));

    c.bench_function("preload_chain", |b| {
        b.iter(|| {
            let loader = Loader::new(table.clone());
            runtime
                .block_on(loader.preload(black_box("chain/0")))
                .expect("Preload should succeed");
        });
    });
}

/// Benchmark concurrent resolves joining one in-flight load
fn benchmark_single_flight(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Failed to build runtime");
    let table = Arc::new(chain_table(1));

    c.bench_function("single_flight_resolve", |b| {
        b.iter(|| {
            let loader = Loader::new(table.clone());
            runtime.block_on(async {
                let results =
                    futures::future::join_all((0..64).map(|_| loader.resolve("chain/0"))).await;
                black_box(results);
            });
        });
    });
}

/// Benchmark deep dependency traversal over a wide graph
fn benchmark_deep_dependencies(c: &mut Criterion) {
    let mut registry = Registry::new();
    for n in 0..CHAIN_LENGTH {
        let id = format!("m{n}");
        registry.add_dependency(&id, &format!("m{}", (n + 1) % CHAIN_LENGTH), true);
        registry.add_dependency(&id, &format!("m{}", (n * 7 + 3) % CHAIN_LENGTH), false);
    }

    c.bench_function("deep_dependencies", |b| {
        b.iter(|| black_box(registry.deep_dependencies(black_box("m0")).len()));
    });
}

/// Benchmark rendering and require rewriting of a bundle
fn benchmark_render_bundle(c: &mut Criterion) {
    let entries: Vec<BundleEntry> = (0..CHAIN_LENGTH)
        .map(|n| BundleEntry {
            id: format!("chain/{n}"),
            source: format!(
                "class Module{n} {{\n  static async init() {{\n    this.next = await loader.require('chain/{}');\n  }}\n}}\nmodule.exports = Module{n};\n",
                n + 1
            ),
            has_init: n % 2 == 0,
        })
        .collect();

    c.bench_function("render_bundle", |b| {
        b.iter(|| {
            let bundle = render_bundle(black_box(&entries), "Bench", "// bench");
            black_box(rewrite_requires(&bundle).len())
        });
    });
}

criterion_group!(
    benches,
    benchmark_preload_chain,
    benchmark_single_flight,
    benchmark_deep_dependencies,
    benchmark_render_bundle
);
criterion_main!(benches);
