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

//! # pgcollection - document collections on PostgreSQL + pgvector
//!
//! A collection is one table holding documents, their embeddings and
//! payloads. The crate provides:
//!
//! - **Provisioning**: vector extension, namespace and table created on demand
//! - **Deduplication**: SHA-256 content fingerprints double as default identity
//! - **Batched writes**: insert or upsert, committed every N documents
//! - **Similarity search**: L2, cosine or inner-product ordering with
//!   per-transaction index tuning and equality filters
//! - **Index management**: ivfflat with list counts sized from the live table,
//!   or hnsw
//!
//! Storage goes through the [`CollectionBackend`] trait; PostgreSQL is the
//! production backend and an in-memory backend mirrors its semantics.

pub mod core;
pub mod embedding;
pub mod index;
pub mod query;
pub mod services;
pub mod storage;

pub use crate::core::config::CollectionConfig;
pub use crate::core::error::{CollectionError, Result};
pub use crate::core::types::{Column, DistanceMetric, Document, Filters, Metadata, StoredRecord};
pub use embedding::{Embedder, Embedding, HttpEmbedder};
pub use index::{GraphIndex, IndexPolicy, ListIndex};
pub use services::{Collection, CollectionOptions, WriteSummary};
pub use storage::{BackendStats, CollectionBackend, MemoryBackend, PostgresBackend, TableSpec};
