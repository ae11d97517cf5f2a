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

//! PostgreSQL Collection Backend
//!
//! Stores one collection in a pgvector-enabled PostgreSQL table.
//! Every operation runs in its own transaction taken from a shared pool;
//! search-time and build-time tuning is applied with `SET LOCAL` so it never
//! outlives the transaction that needed it.

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::{BackendStats, CollectionBackend, WriteMode};
use crate::core::config::DatabaseConfig;
use crate::core::error::{CollectionError, Result};
use crate::core::types::{Column, Metadata, StoredRecord};
use crate::index::{IndexBuildPlan, SessionSetting};
use crate::query::SearchRequest;
use crate::storage::sql::{self, TableSpec};

/// PostgreSQL backend bound to a single collection table
pub struct PostgresBackend {
    /// Connection pool shared by all operations
    pool: PgPool,

    /// Target table
    table: TableSpec,

    /// Performance statistics
    stats: Mutex<BackendStats>,
}

impl PostgresBackend {
    /// Wrap a pre-built pool.
    pub fn from_pool(pool: PgPool, table: TableSpec) -> Self {
        Self {
            pool,
            table,
            stats: Mutex::new(BackendStats::default()),
        }
    }

    /// Open a pool from a connection descriptor.
    pub async fn connect(config: &DatabaseConfig, table: TableSpec) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            CollectionError::Config("a database url or a pre-built pool is required".to_string())
        })?;

        info!("🔗 Connecting PostgreSQL pool for {}", table.qualified_name());
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(url)
            .await
            .map_err(|e| CollectionError::Database(e.to_string()))?;

        Ok(Self::from_pool(pool, table))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Count a statement outcome and classify its error.
    fn track<T>(&self, result: std::result::Result<T, sqlx::Error>) -> Result<T> {
        let mut stats = self.stats.lock();
        stats.statements += 1;
        result.map_err(|e| {
            stats.failed_statements += 1;
            CollectionError::from_sqlx(e)
        })
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let tx = self.pool.begin().await;
        self.track(tx)
    }

    async fn apply_settings(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        settings: &[SessionSetting],
    ) -> Result<()> {
        for setting in settings {
            let statement = sql::set_local(setting)?;
            debug!("⚙️ {}", statement);
            let result = sqlx::query(&statement).execute(&mut **tx).await;
            self.track(result)?;
        }
        Ok(())
    }

    fn record_from_row(&self, row: &PgRow) -> std::result::Result<StoredRecord, sqlx::Error> {
        let embedding: Option<String> = row.try_get("embedding")?;
        let embedding = match embedding {
            Some(text) => sql::parse_vector(&text).map_err(|e| sqlx::Error::ColumnDecode {
                index: "embedding".to_string(),
                source: Box::new(e),
            })?,
            None => Vec::new(),
        };
        let metadata: Option<Json<Metadata>> = row.try_get("metadata")?;
        let usage: Option<Json<Metadata>> = row.try_get("usage")?;

        Ok(StoredRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            metadata: metadata.map(|m| m.0).unwrap_or_default(),
            content: row.try_get::<Option<String>, _>("content")?.unwrap_or_default(),
            embedding,
            usage: usage.map(|u| u.0),
            content_hash: row.try_get::<Option<String>, _>("content_hash")?.unwrap_or_default(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl CollectionBackend for PostgresBackend {
    fn backend_name(&self) -> &'static str {
        "postgresql"
    }

    fn table(&self) -> &TableSpec {
        &self.table
    }

    async fn table_exists(&self) -> Result<bool> {
        let result = sqlx::query_scalar::<_, bool>(sql::table_exists())
            .bind(self.table.schema())
            .bind(self.table.name())
            .fetch_one(&self.pool)
            .await;
        self.track(result)
    }

    #[instrument(skip(self), fields(table = %self.table.name()))]
    async fn create_storage(&self) -> Result<()> {
        let provisioning = |e: CollectionError| CollectionError::Provisioning(e.to_string());
        let mut tx = self.begin().await.map_err(provisioning)?;

        for statement in [
            sql::create_extension().to_string(),
            sql::create_schema(&self.table),
            sql::create_table(&self.table),
        ] {
            debug!("📋 {}", statement);
            let result = sqlx::query(&statement).execute(&mut *tx).await;
            self.track(result).map_err(provisioning)?;
        }

        let result = tx.commit().await;
        self.track(result).map_err(provisioning)?;
        info!("✅ Provisioned {} (vector({}))", self.table.qualified_name(), self.table.dimensions());
        Ok(())
    }

    async fn drop_table(&self) -> Result<()> {
        let result = sqlx::query(&sql::drop_table(&self.table)).execute(&self.pool).await;
        self.track(result)?;
        info!("🗑️ Dropped {}", self.table.qualified_name());
        Ok(())
    }

    async fn truncate(&self) -> Result<u64> {
        let result = sqlx::query(&sql::delete_all(&self.table)).execute(&self.pool).await;
        let removed = self.track(result)?.rows_affected();
        info!("🧹 Cleared {} rows from {}", removed, self.table.qualified_name());
        Ok(removed)
    }

    #[instrument(skip(self, rows), fields(table = %self.table.name(), rows = rows.len()))]
    async fn write_batch(&self, rows: &[StoredRecord], mode: WriteMode) -> Result<()> {
        for row in rows {
            if row.embedding.len() != self.table.dimensions() {
                return Err(CollectionError::DimensionMismatch {
                    expected: self.table.dimensions(),
                    actual: row.embedding.len(),
                });
            }
        }

        let statement = sql::write_row(&self.table, mode == WriteMode::Upsert);
        let start = Instant::now();
        // Dropping the transaction on error rolls the whole batch back.
        let mut tx = self.begin().await?;
        for row in rows {
            let metadata = serde_json::to_string(&row.metadata)?;
            let usage = row.usage.as_ref().map(serde_json::to_string).transpose()?;
            let result = sqlx::query(&statement)
                .bind(&row.id)
                .bind(&row.name)
                .bind(metadata)
                .bind(&row.content)
                .bind(sql::vector_literal(&row.embedding))
                .bind(usage)
                .bind(&row.content_hash)
                .execute(&mut *tx)
                .await;
            self.track(result)?;
        }
        let result = tx.commit().await;
        self.track(result)?;

        self.stats.lock().committed_batches += 1;
        debug!(
            "💾 Committed {} rows ({:?}) in {}ms",
            rows.len(),
            mode,
            start.elapsed().as_millis()
        );
        Ok(())
    }

    async fn exists_where(&self, column: Column, value: &str) -> Result<bool> {
        let result = sqlx::query_scalar::<_, bool>(&sql::exists_where(&self.table, column))
            .bind(value)
            .fetch_one(&self.pool)
            .await;
        self.track(result)
    }

    async fn count(&self) -> Result<u64> {
        let result = sqlx::query_scalar::<_, i64>(&sql::count_rows(&self.table))
            .fetch_one(&self.pool)
            .await;
        Ok(self.track(result)?.max(0) as u64)
    }

    #[instrument(skip(self, request), fields(table = %self.table.name(), limit = request.limit))]
    async fn search(&self, request: &SearchRequest) -> Result<Vec<StoredRecord>> {
        if request.embedding.len() != self.table.dimensions() {
            return Err(CollectionError::DimensionMismatch {
                expected: self.table.dimensions(),
                actual: request.embedding.len(),
            });
        }

        let statement = sql::search(&self.table, request);
        let mut tx = self.begin().await?;
        self.apply_settings(&mut tx, &request.settings).await?;

        debug!("🔍 {}", statement.sql);
        let mut query = sqlx::query(&statement.sql);
        for bind in &statement.binds {
            query = query.bind(bind.as_str());
        }
        let result = query.fetch_all(&mut *tx).await;
        let rows = self.track(result)?;
        let result = tx.commit().await;
        self.track(result)?;
        self.stats.lock().searches += 1;

        rows.iter()
            .map(|row| self.record_from_row(row))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CollectionError::Database(e.to_string()))
    }

    #[instrument(skip(self, plan), fields(table = %self.table.name(), index = %plan.index_name))]
    async fn build_index(&self, plan: &IndexBuildPlan) -> Result<()> {
        let statement = sql::create_index(&self.table, plan)?;
        let index_build = |e: CollectionError| CollectionError::IndexBuild(e.to_string());

        let mut tx = self.begin().await.map_err(index_build)?;
        self.apply_settings(&mut tx, &plan.settings).await.map_err(index_build)?;
        info!("🏗️ {}", statement);
        let result = sqlx::query(&statement).execute(&mut *tx).await;
        if let Err(e) = self.track(result) {
            warn!("Index build for {} failed: {}", plan.index_name, e);
            return Err(index_build(e));
        }
        let result = tx.commit().await;
        self.track(result).map_err(index_build)?;
        Ok(())
    }

    async fn stats(&self) -> BackendStats {
        self.stats.lock().clone()
    }
}
