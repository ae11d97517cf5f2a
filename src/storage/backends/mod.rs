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

//! Collection Storage Backends
//!
//! Every backend owns exactly one collection table:
//! - PostgreSQL + pgvector - the production store, reached through a sqlx pool
//! - Memory - transactional in-process table for embedded use and tests
//!
//! Each trait call is one short-lived transaction. Callers get no ordering
//! guarantee across concurrent calls beyond the backend's isolation.

pub mod memory_backend;
pub mod postgres_backend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::{Column, StoredRecord};
use crate::index::IndexBuildPlan;
use crate::query::SearchRequest;
use crate::storage::sql::TableSpec;

pub use memory_backend::MemoryBackend;
pub use postgres_backend::PostgresBackend;

/// How staged rows treat an existing identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    /// Existing identity is a conflict.
    Insert,
    /// Existing identity has every non-key column replaced.
    Upsert,
}

/// Statistics for backend monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStats {
    /// Statements sent to the store
    pub statements: u64,

    /// Statements that returned an error
    pub failed_statements: u64,

    /// Write transactions that committed
    pub committed_batches: u64,

    /// Similarity queries executed
    pub searches: u64,
}

#[async_trait]
pub trait CollectionBackend: Send + Sync {
    /// Backend name for identification
    fn backend_name(&self) -> &'static str;

    /// The table this backend serves
    fn table(&self) -> &TableSpec;

    async fn table_exists(&self) -> Result<bool>;

    /// Ensure the vector extension, the namespace and the table exist.
    async fn create_storage(&self) -> Result<()>;

    async fn drop_table(&self) -> Result<()>;

    /// Delete every row, keeping the table. Returns rows removed.
    async fn truncate(&self) -> Result<u64>;

    /// Write `rows` in order inside a single transaction; all or nothing.
    async fn write_batch(&self, rows: &[StoredRecord], mode: WriteMode) -> Result<()>;

    /// Exact-match point lookup on a text column.
    async fn exists_where(&self, column: Column, value: &str) -> Result<bool>;

    async fn count(&self) -> Result<u64>;

    /// Run a similarity query with its session settings applied.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<StoredRecord>>;

    /// Apply the plan's settings and create the index if absent, in one transaction.
    async fn build_index(&self, plan: &IndexBuildPlan) -> Result<()>;

    async fn stats(&self) -> BackendStats;
}
