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

//! In-Memory Collection Backend
//!
//! Fast in-process table for embedded use, development and testing.
//! Mirrors the PostgreSQL backend's transactional behavior: a write batch is
//! all-or-nothing, insert conflicts on an existing id, upsert replaces the
//! whole row, and queries against a missing table fail.
//! Provides no durability guarantees.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use super::{BackendStats, CollectionBackend, WriteMode};
use crate::core::error::{CollectionError, Result};
use crate::core::types::{Column, StoredRecord};
use crate::index::{IndexBuildPlan, SessionSetting};
use crate::query::{FilterPredicate, FilterValue, SearchRequest};
use crate::storage::sql::{self, TableSpec};

/// In-memory backend bound to a single collection table
pub struct MemoryBackend {
    table: TableSpec,

    /// Table contents; `None` until provisioned
    state: RwLock<Option<MemoryTable>>,

    /// Session settings seen by each search, oldest first
    search_settings: Mutex<Vec<Vec<SessionSetting>>>,

    /// Refuse `create_storage`, as an engine without the vector extension would
    reject_provisioning: AtomicBool,

    /// Performance statistics
    stats: Mutex<BackendStats>,
}

#[derive(Debug, Default)]
struct MemoryTable {
    rows: HashMap<String, StoredRecord>,
    indexes: BTreeSet<String>,
    builds: Vec<IndexBuildPlan>,
}

impl MemoryBackend {
    pub fn new(table: TableSpec) -> Self {
        Self {
            table,
            state: RwLock::new(None),
            search_settings: Mutex::new(Vec::new()),
            reject_provisioning: AtomicBool::new(false),
            stats: Mutex::new(BackendStats::default()),
        }
    }

    pub fn set_reject_provisioning(&self, reject: bool) {
        self.reject_provisioning.store(reject, Ordering::SeqCst);
    }

    /// Snapshot of all rows, ordered by id.
    pub fn rows(&self) -> Vec<StoredRecord> {
        let state = self.state.read();
        let mut rows: Vec<StoredRecord> = state
            .as_ref()
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }

    pub fn get(&self, id: &str) -> Option<StoredRecord> {
        self.state.read().as_ref().and_then(|t| t.rows.get(id).cloned())
    }

    /// Index builds that actually created an index.
    pub fn index_builds(&self) -> Vec<IndexBuildPlan> {
        self.state.read().as_ref().map(|t| t.builds.clone()).unwrap_or_default()
    }

    pub fn search_settings(&self) -> Vec<Vec<SessionSetting>> {
        self.search_settings.lock().clone()
    }

    fn statement(&self) {
        self.stats.lock().statements += 1;
    }

    fn fail<T>(&self, err: CollectionError) -> Result<T> {
        let mut stats = self.stats.lock();
        stats.statements += 1;
        stats.failed_statements += 1;
        Err(err)
    }

    fn missing_table(&self) -> CollectionError {
        CollectionError::TableNotFound(format!(
            "relation {} does not exist",
            self.table.qualified_name()
        ))
    }
}

fn matches(record: &StoredRecord, predicate: &FilterPredicate) -> bool {
    match (&predicate.value, predicate.column) {
        (FilterValue::Text(text), Column::Id) => &record.id == text,
        (FilterValue::Text(text), Column::Name) => record.name.as_ref() == Some(text),
        (FilterValue::Text(text), Column::Content) => &record.content == text,
        (FilterValue::Text(text), Column::ContentHash) => &record.content_hash == text,
        (FilterValue::Document(value), Column::Metadata) => {
            value.as_object() == Some(&record.metadata)
        }
        (FilterValue::Document(value), Column::Usage) => {
            record.usage.is_some() && value.as_object() == record.usage.as_ref()
        }
        (FilterValue::Vector(vector), Column::Embedding) => &record.embedding == vector,
        (FilterValue::Timestamp(ts), Column::CreatedAt) => record.created_at == Some(*ts),
        (FilterValue::Timestamp(ts), Column::UpdatedAt) => record.updated_at == Some(*ts),
        _ => false,
    }
}

#[async_trait]
impl CollectionBackend for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn table(&self) -> &TableSpec {
        &self.table
    }

    async fn table_exists(&self) -> Result<bool> {
        self.statement();
        Ok(self.state.read().is_some())
    }

    async fn create_storage(&self) -> Result<()> {
        if self.reject_provisioning.load(Ordering::SeqCst) {
            return self.fail(CollectionError::Provisioning(
                "extension \"vector\" is not available".to_string(),
            ));
        }
        self.statement();
        let mut state = self.state.write();
        if state.is_none() {
            *state = Some(MemoryTable::default());
            info!("✅ Provisioned in-memory {}", self.table.qualified_name());
        }
        Ok(())
    }

    async fn drop_table(&self) -> Result<()> {
        self.statement();
        self.state.write().take();
        Ok(())
    }

    async fn truncate(&self) -> Result<u64> {
        let mut state = self.state.write();
        let Some(table) = state.as_mut() else {
            return self.fail(self.missing_table());
        };
        let removed = table.rows.len() as u64;
        table.rows.clear();
        drop(state);
        self.statement();
        Ok(removed)
    }

    async fn write_batch(&self, rows: &[StoredRecord], mode: WriteMode) -> Result<()> {
        let mut state = self.state.write();
        let Some(table) = state.as_mut() else {
            return self.fail(self.missing_table());
        };

        let now = Utc::now();
        let mut staged: HashMap<String, StoredRecord> = HashMap::new();
        for row in rows {
            if row.embedding.len() != self.table.dimensions() {
                let err = CollectionError::DimensionMismatch {
                    expected: self.table.dimensions(),
                    actual: row.embedding.len(),
                };
                return self.fail(err);
            }

            let previous = staged.get(&row.id).or_else(|| table.rows.get(&row.id));
            let record = match (previous, mode) {
                (Some(_), WriteMode::Insert) => {
                    let err = CollectionError::Conflict(format!(
                        "duplicate key value violates unique constraint: id={}",
                        row.id
                    ));
                    return self.fail(err);
                }
                (Some(existing), WriteMode::Upsert) => StoredRecord {
                    created_at: existing.created_at,
                    updated_at: Some(now),
                    ..row.clone()
                },
                (None, _) => StoredRecord {
                    created_at: Some(now),
                    updated_at: None,
                    ..row.clone()
                },
            };
            staged.insert(row.id.clone(), record);
        }

        table.rows.extend(staged);
        drop(state);

        let mut stats = self.stats.lock();
        stats.statements += rows.len() as u64;
        stats.committed_batches += 1;
        debug!("💾 Committed {} rows ({:?})", rows.len(), mode);
        Ok(())
    }

    async fn exists_where(&self, column: Column, value: &str) -> Result<bool> {
        let state = self.state.read();
        let Some(table) = state.as_ref() else {
            return self.fail(self.missing_table());
        };
        let predicate = FilterPredicate {
            column,
            value: FilterValue::Text(value.to_string()),
        };
        let found = match column {
            Column::Id => table.rows.contains_key(value),
            _ => table.rows.values().any(|r| matches(r, &predicate)),
        };
        drop(state);
        self.statement();
        Ok(found)
    }

    async fn count(&self) -> Result<u64> {
        let count = self.state.read().as_ref().map(|t| t.rows.len() as u64);
        match count {
            Some(count) => {
                self.statement();
                Ok(count)
            }
            None => self.fail(self.missing_table()),
        }
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<StoredRecord>> {
        for setting in &request.settings {
            sql::set_local(setting)?;
        }

        let state = self.state.read();
        let Some(table) = state.as_ref() else {
            return self.fail(self.missing_table());
        };
        if request.embedding.len() != self.table.dimensions() {
            let err = CollectionError::DimensionMismatch {
                expected: self.table.dimensions(),
                actual: request.embedding.len(),
            };
            return self.fail(err);
        }

        let mut scored: Vec<(f32, &StoredRecord)> = table
            .rows
            .values()
            .filter(|record| request.predicates.iter().all(|p| matches(record, p)))
            .map(|record| (request.metric.distance(&record.embedding, &request.embedding), record))
            .collect();
        scored.sort_by(|(da, a), (db, b)| {
            da.partial_cmp(db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        let results: Vec<StoredRecord> = scored
            .into_iter()
            .take(request.limit)
            .map(|(_, record)| record.clone())
            .collect();
        drop(state);

        self.search_settings.lock().push(request.settings.clone());
        let mut stats = self.stats.lock();
        stats.statements += 1 + request.settings.len() as u64;
        stats.searches += 1;
        Ok(results)
    }

    async fn build_index(&self, plan: &IndexBuildPlan) -> Result<()> {
        for setting in &plan.settings {
            sql::set_local(setting).map_err(|e| CollectionError::IndexBuild(e.to_string()))?;
        }
        let statement = sql::create_index(&self.table, plan)
            .map_err(|e| CollectionError::IndexBuild(e.to_string()))?;

        let mut state = self.state.write();
        let Some(table) = state.as_mut() else {
            let err = CollectionError::IndexBuild(self.missing_table().to_string());
            return self.fail(err);
        };
        if table.indexes.insert(plan.index_name.clone()) {
            table.builds.push(plan.clone());
            info!("🏗️ {}", statement);
        } else {
            debug!("Index {} already exists, skipping", plan.index_name);
        }
        drop(state);

        self.stats.lock().statements += 1 + plan.settings.len() as u64;
        Ok(())
    }

    async fn stats(&self) -> BackendStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DistanceMetric, Metadata};

    fn record(id: &str, embedding: Vec<f32>) -> StoredRecord {
        StoredRecord {
            id: id.to_string(),
            name: Some(format!("name-{}", id)),
            metadata: Metadata::new(),
            content: format!("content-{}", id),
            embedding,
            usage: None,
            content_hash: format!("hash-{}", id),
            created_at: None,
            updated_at: None,
        }
    }

    fn backend() -> MemoryBackend {
        MemoryBackend::new(TableSpec::new("ai", "docs", 2).unwrap())
    }

    #[tokio::test]
    async fn test_operations_on_missing_table_fail() {
        let backend = backend();
        assert!(!backend.table_exists().await.unwrap());
        assert!(backend.count().await.unwrap_err().is_missing_storage());
        assert!(backend
            .write_batch(&[record("a", vec![1.0, 0.0])], WriteMode::Insert)
            .await
            .unwrap_err()
            .is_missing_storage());
        assert_eq!(backend.stats().await.failed_statements, 2);
    }

    #[tokio::test]
    async fn test_batch_is_atomic_on_conflict() {
        let backend = backend();
        backend.create_storage().await.unwrap();
        backend
            .write_batch(&[record("a", vec![1.0, 0.0])], WriteMode::Insert)
            .await
            .unwrap();

        let err = backend
            .write_batch(
                &[record("b", vec![0.0, 1.0]), record("a", vec![1.0, 1.0])],
                WriteMode::Insert,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionError::Conflict(_)));
        assert_eq!(backend.count().await.unwrap(), 1);
        assert_eq!(backend.stats().await.committed_batches, 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at_and_stamps_updated_at() {
        let backend = backend();
        backend.create_storage().await.unwrap();
        backend
            .write_batch(&[record("a", vec![1.0, 0.0])], WriteMode::Upsert)
            .await
            .unwrap();
        let first = backend.get("a").unwrap();
        assert!(first.created_at.is_some());
        assert!(first.updated_at.is_none());

        let mut replacement = record("a", vec![0.0, 1.0]);
        replacement.content = "changed".to_string();
        backend.write_batch(&[replacement], WriteMode::Upsert).await.unwrap();

        let second = backend.get("a").unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at.is_some());
        assert_eq!(second.content, "changed");
        assert_eq!(second.embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_search_orders_and_limits() {
        let backend = backend();
        backend.create_storage().await.unwrap();
        backend
            .write_batch(
                &[
                    record("far", vec![-1.0, 0.0]),
                    record("near", vec![1.0, 0.1]),
                    record("mid", vec![0.0, 1.0]),
                ],
                WriteMode::Insert,
            )
            .await
            .unwrap();

        let request = SearchRequest::new(vec![1.0, 0.0], 2, DistanceMetric::Cosine, None, None);
        let ids: Vec<String> = backend
            .search(&request)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["near", "mid"]);
    }

    #[tokio::test]
    async fn test_index_created_once() {
        let backend = backend();
        backend.create_storage().await.unwrap();
        let plan = IndexBuildPlan {
            index_name: "docs_hnsw_index".to_string(),
            method: crate::index::IndexMethod::Hnsw,
            ops_class: "vector_cosine_ops",
            parameters: vec![("m".to_string(), 16)],
            settings: vec![],
        };
        backend.build_index(&plan).await.unwrap();
        backend.build_index(&plan).await.unwrap();
        assert_eq!(backend.index_builds().len(), 1);
    }
}
