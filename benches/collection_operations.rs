/*
 * Copyright 2025 Vijaykumar Singh
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Collection hot paths: fingerprinting, staged writes and exact search.

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use pgcollection::storage::{content_fingerprint, sql};
use pgcollection::{
    Collection, CollectionOptions, DistanceMetric, Document, Embedder, GraphIndex, IndexPolicy,
    MemoryBackend, Result, TableSpec,
};
use pgcollection::query::SearchRequest;

const DIMENSION: usize = 128;

struct SpreadEmbedder;

#[async_trait]
impl Embedder for SpreadEmbedder {
    fn dimensions(&self) -> usize {
        DIMENSION
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let seed = text.bytes().fold(17u64, |acc, b| acc.wrapping_mul(131).wrapping_add(b as u64));
        Ok((0..DIMENSION)
            .map(|i| ((seed.rotate_left(i as u32) % 1000) as f32) / 1000.0)
            .collect())
    }
}

fn documents(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| Document::new(format!("benchmark document {} about vectors", i)))
        .collect()
}

async fn loaded_collection(count: usize) -> Collection {
    let backend = Arc::new(MemoryBackend::new(TableSpec::new("ai", "bench", DIMENSION).unwrap()));
    let collection = Collection::new(
        backend,
        Arc::new(SpreadEmbedder),
        CollectionOptions {
            distance: DistanceMetric::Cosine,
            index: Some(IndexPolicy::Graph(GraphIndex::default())),
        },
    )
    .unwrap();
    collection.provision().await.unwrap();
    collection.insert(&mut documents(count), 100).await.unwrap();
    collection
}

fn benchmark_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    for &size in &[64usize, 1024, 16 * 1024] {
        let content = "a".repeat(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("sha256", size), &content, |b, content| {
            b.iter(|| content_fingerprint(black_box(content)))
        });
    }
    group.finish();
}

fn benchmark_insert(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("insert");
    group.measurement_time(Duration::from_secs(10));

    for &batch_size in &[10usize, 100] {
        group.throughput(Throughput::Elements(1_000));
        group.bench_with_input(BenchmarkId::new("memory", batch_size), &batch_size, |b, &batch_size| {
            b.to_async(&runtime).iter(|| async move {
                let collection = loaded_collection(0).await;
                let mut docs = documents(1_000);
                collection.insert(&mut docs, batch_size).await.unwrap()
            });
        });
    }
    group.finish();
}

fn benchmark_search(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("search");

    for &rows in &[1_000usize, 10_000] {
        let collection = runtime.block_on(loaded_collection(rows));
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("exact_cosine", rows), &collection, |b, collection| {
            b.to_async(&runtime)
                .iter(|| async { collection.search(black_box("vectors"), 10, None).await })
        });
    }
    group.finish();
}

fn benchmark_render(c: &mut Criterion) {
    let table = TableSpec::new("ai", "bench", DIMENSION).unwrap();
    let request = SearchRequest::new(
        vec![0.25; DIMENSION],
        10,
        DistanceMetric::L2,
        None,
        Some(&IndexPolicy::Graph(GraphIndex::default())),
    );
    c.bench_function("render_search_statement", |b| {
        b.iter(|| sql::search(black_box(&table), black_box(&request)))
    });
}

criterion_group!(
    collection_benches,
    benchmark_fingerprint,
    benchmark_insert,
    benchmark_search,
    benchmark_render
);
criterion_main!(collection_benches);
