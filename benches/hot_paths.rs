//! Hot path benchmarks for the projection layer.
//!
//! Run with: `cargo bench --bench hot_paths`
//! Compare baselines: `cargo bench --bench hot_paths -- --baseline main`
//!
//! Every page edit flows model -> mirror, and every `page` event rebuilds
//! the collection mirror, so these two paths dominate bridge overhead.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use editor_bridge::engine::{AttributeModel, Model, ModelCollection};
use editor_bridge::reactive::Attributes;
use editor_bridge::{reactive_collection, reactive_model};
use serde_json::{json, Value};
use std::sync::Arc;

fn page(id: usize, fields: usize) -> Arc<dyn Model> {
    let mut attributes = Attributes::new();
    for i in 0..fields {
        attributes.insert(format!("field_{}", i), json!(format!("value {}", i)));
    }
    Arc::new(AttributeModel::new(format!("page-{}", id), attributes))
}

/// Benchmark one attribute change reaching a live mirror
fn bench_model_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_propagation");
    group.throughput(Throughput::Elements(1));

    for fields in [4, 32, 256] {
        let model = page(0, fields);
        let projection = reactive_model(model.clone());

        group.bench_function(format!("fields_{}", fields), |b| {
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                model.set("field_0", Value::from(black_box(n)));
            })
        });
        projection.decouple();
    }

    group.finish();
}

/// Benchmark rebuilding a collection mirror after a structural change
fn bench_collection_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_rebuild");

    for pages in [1, 16, 128] {
        let collection = ModelCollection::new();
        for id in 0..pages {
            collection.add(page(id, 8), None);
        }
        group.throughput(Throughput::Elements(pages as u64));

        group.bench_function(format!("pages_{}", pages), |b| {
            b.iter(|| {
                let mirror = reactive_collection(black_box(&collection));
                mirror.decouple_all()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_model_propagation, bench_collection_rebuild);
criterion_main!(benches);
