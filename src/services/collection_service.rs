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

//! Collection Service - document collections over a vector-capable table
//!
//! A [`Collection`] binds one table to a distance metric, an optional ANN
//! index policy and an embedding provider. It handles:
//! - idempotent provisioning of the backing table
//! - fingerprinted, batch-committed insert and upsert
//! - similarity search that degrades to "no results" on a cold collection
//! - index builds sized from the live row count
//!
//! The handle holds no mutable state; every operation is its own
//! transaction, so a `Collection` can be shared freely across tasks.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::core::config::CollectionConfig;
use crate::core::error::{CollectionError, Result};
use crate::core::types::{Column, DistanceMetric, Document, Filters, StoredRecord};
use crate::embedding::Embedder;
use crate::index::{GraphIndex, IndexPolicy};
use crate::query::SearchRequest;
use crate::storage::backends::{BackendStats, CollectionBackend, PostgresBackend, WriteMode};
use crate::storage::fingerprint::{content_fingerprint, normalize_content, resolve_identity};
use crate::storage::sql::TableSpec;

/// Query-shaping options fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionOptions {
    pub distance: DistanceMetric,
    pub index: Option<IndexPolicy>,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            distance: DistanceMetric::Cosine,
            index: Some(IndexPolicy::Graph(GraphIndex::default())),
        }
    }
}

/// Outcome of an insert or upsert run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub documents: usize,
    pub batches: usize,
}

pub struct Collection {
    backend: Arc<dyn CollectionBackend>,
    embedder: Arc<dyn Embedder>,
    distance: DistanceMetric,
    index: Option<IndexPolicy>,
}

impl Collection {
    /// Bind a backend to an embedding provider.
    ///
    /// The backend's table must be sized to the provider's dimensionality.
    pub fn new(
        backend: Arc<dyn CollectionBackend>,
        embedder: Arc<dyn Embedder>,
        options: CollectionOptions,
    ) -> Result<Self> {
        let table_dims = backend.table().dimensions();
        if table_dims != embedder.dimensions() {
            return Err(CollectionError::Config(format!(
                "table {} is sized for {} dimensions but the embedder produces {}",
                backend.table().qualified_name(),
                table_dims,
                embedder.dimensions()
            )));
        }
        if let Some(policy) = &options.index {
            policy.validate()?;
        }

        Ok(Self {
            backend,
            embedder,
            distance: options.distance,
            index: options.index,
        })
    }

    /// Connect to PostgreSQL using the `[database]` section.
    pub async fn from_config(config: &CollectionConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let table = TableSpec::new(
            config.collection.schema.clone(),
            config.collection.name.clone(),
            embedder.dimensions(),
        )?;
        let backend = PostgresBackend::connect(&config.database, table).await?;
        Self::new(
            Arc::new(backend),
            embedder,
            CollectionOptions {
                distance: config.collection.distance,
                index: config.index.policy(),
            },
        )
    }

    pub fn name(&self) -> &str {
        self.backend.table().name()
    }

    pub fn schema(&self) -> &str {
        self.backend.table().schema()
    }

    pub fn dimensions(&self) -> usize {
        self.backend.table().dimensions()
    }

    pub fn distance(&self) -> DistanceMetric {
        self.distance
    }

    pub fn index_policy(&self) -> Option<&IndexPolicy> {
        self.index.as_ref()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn backend(&self) -> &Arc<dyn CollectionBackend> {
        &self.backend
    }

    pub fn supports_upsert(&self) -> bool {
        true
    }

    pub async fn stats(&self) -> BackendStats {
        self.backend.stats().await
    }

    // ---------------------------------------------------------------------
    // Schema lifecycle
    // ---------------------------------------------------------------------

    /// Table presence. Probe failures read as "absent".
    pub async fn exists(&self) -> bool {
        match self.backend.table_exists().await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("⚠️ Existence check for {} failed: {}", self.name(), e);
                false
            }
        }
    }

    /// Create extension, namespace and table if the table is missing.
    #[instrument(skip(self), fields(collection = %self.name()))]
    pub async fn provision(&self) -> Result<()> {
        if self.exists().await {
            debug!("Collection {} already provisioned", self.name());
            return Ok(());
        }
        info!("🆕 Provisioning collection: {}", self.name());
        self.backend.create_storage().await
    }

    /// Drop the table if present.
    #[instrument(skip(self), fields(collection = %self.name()))]
    pub async fn drop(&self) -> Result<()> {
        if self.exists().await {
            self.backend.drop_table().await?;
        }
        Ok(())
    }

    /// Delete all rows, keeping the table. Returns the number removed.
    #[instrument(skip(self), fields(collection = %self.name()))]
    pub async fn truncate(&self) -> Result<u64> {
        self.backend.truncate().await
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Plain insert; an existing identity fails the current batch as a conflict.
    #[instrument(skip(self, documents), fields(collection = %self.name(), documents = documents.len()))]
    pub async fn insert(&self, documents: &mut [Document], batch_size: usize) -> Result<WriteSummary> {
        self.write(documents, batch_size, WriteMode::Insert).await
    }

    /// Insert-or-replace keyed on identity; last write wins, no field merge.
    #[instrument(skip(self, documents), fields(collection = %self.name(), documents = documents.len()))]
    pub async fn upsert(&self, documents: &mut [Document], batch_size: usize) -> Result<WriteSummary> {
        self.write(documents, batch_size, WriteMode::Upsert).await
    }

    async fn write(
        &self,
        documents: &mut [Document],
        batch_size: usize,
        mode: WriteMode,
    ) -> Result<WriteSummary> {
        if batch_size == 0 {
            return Err(CollectionError::Config("batch size must be greater than zero".to_string()));
        }

        let start = Instant::now();
        let total = documents.len();
        let mut summary = WriteSummary::default();
        let mut staged: Vec<StoredRecord> = Vec::with_capacity(batch_size.min(total));

        for document in documents.iter_mut() {
            staged.push(self.stage(document).await?);
            if staged.len() >= batch_size {
                self.flush(&mut staged, mode, &mut summary, total).await?;
            }
        }
        if !staged.is_empty() {
            self.flush(&mut staged, mode, &mut summary, total).await?;
        }

        info!(
            "✅ {:?} of {} documents into {} finished in {} batches ({}ms)",
            mode,
            summary.documents,
            self.name(),
            summary.batches,
            start.elapsed().as_millis()
        );
        Ok(summary)
    }

    async fn flush(
        &self,
        staged: &mut Vec<StoredRecord>,
        mode: WriteMode,
        summary: &mut WriteSummary,
        total: usize,
    ) -> Result<()> {
        self.backend.write_batch(staged, mode).await?;
        summary.batches += 1;
        summary.documents += staged.len();
        staged.clear();
        info!(
            "📦 {}: committed batch {} ({}/{} documents)",
            self.name(),
            summary.batches,
            summary.documents,
            total
        );
        Ok(())
    }

    /// Embed, normalize, fingerprint and assign identity.
    async fn stage(&self, document: &mut Document) -> Result<StoredRecord> {
        document.embed(self.embedder.as_ref()).await?;
        let embedding = document.embedding.clone().unwrap_or_default();
        if embedding.len() != self.dimensions() {
            return Err(CollectionError::DimensionMismatch {
                expected: self.dimensions(),
                actual: embedding.len(),
            });
        }

        let content = normalize_content(&document.content);
        let content_hash = content_fingerprint(&content);
        let id = resolve_identity(document.id.as_deref(), &content_hash);

        Ok(StoredRecord {
            id,
            name: document.name.clone(),
            metadata: document.metadata.clone(),
            content,
            embedding,
            usage: document.usage.clone(),
            content_hash,
            created_at: None,
            updated_at: None,
        })
    }

    // ---------------------------------------------------------------------
    // Existence and counting
    // ---------------------------------------------------------------------

    /// True if a stored row carries this document's content fingerprint.
    pub async fn exists_by_content(&self, document: &Document) -> bool {
        let fingerprint = content_fingerprint(&document.content);
        self.probe(Column::ContentHash, &fingerprint).await
    }

    pub async fn exists_by_name(&self, name: &str) -> bool {
        self.probe(Column::Name, name).await
    }

    pub async fn exists_by_id(&self, id: &str) -> bool {
        self.probe(Column::Id, id).await
    }

    async fn probe(&self, column: Column, value: &str) -> bool {
        match self.backend.exists_where(column, value).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    "⚠️ Lookup on {}.{} failed, treating as absent: {}",
                    self.name(),
                    column.name(),
                    e
                );
                false
            }
        }
    }

    pub async fn count(&self) -> Result<u64> {
        self.backend.count().await
    }

    // ---------------------------------------------------------------------
    // Search
    // ---------------------------------------------------------------------

    /// Nearest documents to `query` under the collection's metric.
    ///
    /// Never fails: an unavailable embedding yields no results, and a failed
    /// query triggers provisioning and yields no results.
    #[instrument(skip(self, query, filters), fields(collection = %self.name()))]
    pub async fn search(&self, query: &str, limit: usize, filters: Option<&Filters>) -> Vec<Document> {
        let embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("⚠️ No query embedding for search on {}: {}", self.name(), e);
                return Vec::new();
            }
        };

        let request = SearchRequest::new(embedding, limit, self.distance, filters, self.index.as_ref());
        match self.backend.search(&request).await {
            Ok(records) => {
                debug!("🔍 {} results from {}", records.len(), self.name());
                records
                    .into_iter()
                    .map(|record| record.into_document(Some(Arc::clone(&self.embedder))))
                    .collect()
            }
            Err(e) => {
                warn!("⚠️ Search on {} failed, provisioning: {}", self.name(), e);
                if let Err(e) = self.provision().await {
                    warn!("⚠️ Recovery provisioning of {} failed: {}", self.name(), e);
                }
                Vec::new()
            }
        }
    }

    // ---------------------------------------------------------------------
    // Index management
    // ---------------------------------------------------------------------

    /// Build the configured ANN index if it does not exist yet.
    #[instrument(skip(self), fields(collection = %self.name()))]
    pub async fn optimize(&self) -> Result<()> {
        let Some(policy) = &self.index else {
            debug!("No index policy for {}, nothing to optimize", self.name());
            return Ok(());
        };

        let row_count = if policy.needs_row_count() {
            Some(self.count().await?)
        } else {
            None
        };
        let plan = policy.build_plan(self.name(), self.distance, row_count);
        info!(
            "🏗️ Building {} index {} on {} with {:?}",
            plan.method.as_str(),
            plan.index_name,
            self.name(),
            plan.parameters
        );
        self.backend.build_index(&plan).await
    }
}
