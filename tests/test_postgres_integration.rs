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

//! Round trips against a live PostgreSQL with the vector extension.
//!
//! Skipped unless PGCOLLECTION_TEST_DATABASE_URL points at a database the
//! test user may create schemas and extensions in.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use pgcollection::core::config::DatabaseConfig;
use pgcollection::{
    Collection, CollectionBackend, CollectionError, CollectionOptions, DistanceMetric, Document,
    Embedder, Filters, IndexPolicy, ListIndex, PostgresBackend, Result, TableSpec,
};

const TEST_URL_ENV: &str = "PGCOLLECTION_TEST_DATABASE_URL";

struct AxisEmbedder;

#[async_trait]
impl Embedder for AxisEmbedder {
    fn dimensions(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(match text {
            "x" => vec![1.0, 0.0, 0.0],
            "y" => vec![0.0, 1.0, 0.0],
            "z" => vec![0.0, 0.0, 1.0],
            other => vec![other.len() as f32, 1.0, 1.0],
        })
    }
}

async fn open(index: Option<IndexPolicy>) -> Option<(Collection, Arc<PostgresBackend>)> {
    let Ok(url) = std::env::var(TEST_URL_ENV) else {
        eprintln!("{} not set, skipping", TEST_URL_ENV);
        return None;
    };
    let config = DatabaseConfig {
        url: Some(url),
        max_connections: 4,
        ..Default::default()
    };
    let name = format!(
        "it_{}",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    let table = TableSpec::new("pgcollection_test", name, 3).unwrap();
    let backend = Arc::new(PostgresBackend::connect(&config, table).await.unwrap());
    let collection = Collection::new(
        backend.clone(),
        Arc::new(AxisEmbedder),
        CollectionOptions {
            distance: DistanceMetric::L2,
            index,
        },
    )
    .unwrap();
    Some((collection, backend))
}

#[tokio::test]
async fn test_lifecycle_round_trip() {
    let Some((collection, backend)) = open(Some(IndexPolicy::List(ListIndex::default()))).await else {
        return;
    };

    assert!(collection.search("x", 3, None).await.is_empty());
    assert!(collection.exists().await);

    let mut batch = vec![
        Document::new("x").with_name("first"),
        Document::new("y").with_metadata(json!({"k": "v"}).as_object().cloned().unwrap()),
        Document::new("z\0nul"),
    ];
    let summary = collection.insert(&mut batch, 2).await.unwrap();
    assert_eq!(summary.batches, 2);
    assert_eq!(collection.count().await.unwrap(), 3);
    assert!(collection.exists_by_name("first").await);
    assert!(collection.exists_by_content(&Document::new("z\0nul")).await);

    let err = collection.insert(&mut vec![Document::new("x")], 5).await.unwrap_err();
    assert!(matches!(err, CollectionError::Conflict(_)));

    let results = collection.search("x", 3, None).await;
    assert_eq!(results[0].content, "x");
    assert!(results.iter().all(|d| d.id.is_some()));

    let mut filters = Filters::new();
    filters.insert("metadata".to_string(), json!({"k": "v"}));
    filters.insert("not_a_column".to_string(), json!(1));
    let filtered = collection.search("x", 3, Some(&filters)).await;
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].content, "y");

    collection.upsert(&mut vec![Document::new("x").with_name("renamed")], 5).await.unwrap();
    assert!(collection.exists_by_name("renamed").await);
    assert_eq!(collection.count().await.unwrap(), 3);

    collection.optimize().await.unwrap();
    collection.optimize().await.unwrap();
    assert_eq!(collection.search("y", 1, None).await[0].content, "y");

    assert_eq!(collection.truncate().await.unwrap(), 3);
    collection.drop().await.unwrap();
    assert!(!collection.exists().await);
    assert!(backend.stats().await.committed_batches >= 3);
}
