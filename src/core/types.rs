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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::core::error::Result;
use crate::embedding::Embedder;

/// Open key-value payload stored as a JSON document column.
pub type Metadata = serde_json::Map<String, Value>;

/// Equality filters applied to a similarity search, keyed by column name.
pub type Filters = serde_json::Map<String, Value>;

pub type RecordId = String;
pub type Vector = Vec<f32>;

/// Distance metrics for vector similarity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean (L2) distance
    L2,
    /// Cosine distance (1 - cosine similarity)
    #[default]
    Cosine,
    /// Negative inner product
    MaxInnerProduct,
}

impl DistanceMetric {
    /// pgvector ordering operator for this metric.
    pub fn order_operator(&self) -> &'static str {
        match self {
            Self::L2 => "<->",
            Self::Cosine => "<=>",
            Self::MaxInnerProduct => "<#>",
        }
    }

    /// Operator class used when building an ANN index.
    pub fn ops_class(&self) -> &'static str {
        match self {
            Self::L2 => "vector_l2_ops",
            Self::Cosine => "vector_cosine_ops",
            Self::MaxInnerProduct => "vector_ip_ops",
        }
    }

    /// Distance between two vectors as the engine computes it; smaller is closer.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Self::MaxInnerProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    // pgvector yields NaN here; sort it last
                    return f32::MAX;
                }
                1.0 - dot / (norm_a * norm_b)
            }
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::L2 => "l2",
            Self::Cosine => "cosine",
            Self::MaxInnerProduct => "max_inner_product",
        };
        f.write_str(name)
    }
}

/// Physical columns of a collection table, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Name,
    Metadata,
    Content,
    Embedding,
    Usage,
    CreatedAt,
    UpdatedAt,
    ContentHash,
}

/// Storage class of a column, which decides how filter values are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Document,
    Vector,
    Timestamp,
}

impl Column {
    pub const ALL: [Column; 9] = [
        Column::Id,
        Column::Name,
        Column::Metadata,
        Column::Content,
        Column::Embedding,
        Column::Usage,
        Column::CreatedAt,
        Column::UpdatedAt,
        Column::ContentHash,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Metadata => "metadata",
            Self::Content => "content",
            Self::Embedding => "embedding",
            Self::Usage => "usage",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::ContentHash => "content_hash",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Id | Self::Name | Self::Content | Self::ContentHash => ColumnKind::Text,
            Self::Metadata | Self::Usage => ColumnKind::Document,
            Self::Embedding => ColumnKind::Vector,
            Self::CreatedAt | Self::UpdatedAt => ColumnKind::Timestamp,
        }
    }
}

/// A document as seen by callers: content plus optional identity and payloads.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub name: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub usage: Option<Metadata>,
    #[serde(default)]
    pub embedding: Option<Vector>,
    /// Provider attached to search results for downstream re-embedding.
    #[serde(skip)]
    pub embedder: Option<Arc<dyn Embedder>>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Populate `embedding` (and `usage`, when the provider reports it) in place.
    pub async fn embed(&mut self, embedder: &dyn Embedder) -> Result<()> {
        let embedding = embedder.embed_with_usage(&self.content).await?;
        self.embedding = Some(embedding.vector);
        if embedding.usage.is_some() {
            self.usage = embedding.usage;
        }
        Ok(())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("content", &self.content)
            .field("metadata", &self.metadata)
            .field("usage", &self.usage)
            .field("embedding_dims", &self.embedding.as_ref().map(Vec::len))
            .field("has_embedder", &self.embedder.is_some())
            .finish()
    }
}

/// One row of a collection table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub name: Option<String>,
    pub metadata: Metadata,
    pub content: String,
    pub embedding: Vector,
    pub usage: Option<Metadata>,
    pub content_hash: String,
    /// Assigned by the backend on first write.
    pub created_at: Option<DateTime<Utc>>,
    /// Assigned by the backend whenever an upsert replaces the row.
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    /// Rehydrate a search row into a caller-facing document.
    pub fn into_document(self, embedder: Option<Arc<dyn Embedder>>) -> Document {
        Document {
            id: Some(self.id),
            name: self.name,
            content: self.content,
            metadata: self.metadata,
            usage: self.usage,
            embedding: Some(self.embedding),
            embedder,
        }
    }
}
