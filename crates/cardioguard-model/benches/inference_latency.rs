//! Latency benchmarks for vectorization and batched inference
//!
//! Uses the sample artifact under `models/artifacts`.
//!
//! Run with: cargo bench -p cardioguard-model

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

use cardioguard_core::{vectorize, ClinicalRecord, Validator};
use cardioguard_model::{explain, predict_offloaded, ModelPaths, ModelSnapshot};

fn sample_paths() -> ModelPaths {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../models");
    ModelPaths::new(root.join("artifacts/best_model.json"))
        .with_metadata(root.join("training_metadata.json"))
}

fn sample_record() -> ClinicalRecord {
    Validator::default()
        .validate(&serde_json::json!({
            "age": 63, "sex": 1, "cp": 3, "trestbps": 145, "chol": 233, "fbs": 1,
            "restecg": 0, "thalach": 150, "exang": 0, "oldpeak": 2.3, "slope": 0,
            "ca": 0, "thal": 1
        }))
        .unwrap()
}

fn benchmark_single(c: &mut Criterion) {
    let snapshot = ModelSnapshot::load(&sample_paths()).expect("Failed to load sample artifact");
    let record = sample_record();

    let mut group = c.benchmark_group("single_record");
    group.bench_function("vectorize", |b| b.iter(|| vectorize(black_box(&record))));
    group.bench_function("vectorize_predict_explain", |b| {
        b.iter(|| {
            let vector = vectorize(black_box(&record));
            let raw = snapshot.predict(std::slice::from_ref(&vector)).unwrap();
            (raw, explain(&snapshot, &vector))
        })
    });
    group.finish();
}

fn benchmark_batches(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let snapshot = Arc::new(ModelSnapshot::load(&sample_paths()).expect("Failed to load sample artifact"));
    let vector = vectorize(&sample_record());

    let mut group = c.benchmark_group("batch_inference");
    for size in [1usize, 10, 100] {
        let vectors = vec![vector.clone(); size];
        group.bench_with_input(BenchmarkId::new("predict", size), &vectors, |b, vectors| {
            b.iter(|| snapshot.predict(black_box(vectors)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("predict_offloaded", size), &vectors, |b, vectors| {
            b.iter(|| {
                rt.block_on(predict_offloaded(snapshot.clone(), vectors.clone()))
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_single, benchmark_batches);
criterion_main!(benches);
