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

//! Embedding providers
//!
//! A provider turns text into a fixed-dimension vector. Collections query
//! the dimensionality once at construction and treat every failure as
//! [`CollectionError::EmbeddingUnavailable`](crate::CollectionError).

pub mod http_embedder;

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::types::{Metadata, Vector};

pub use http_embedder::HttpEmbedder;

/// Vector plus whatever accounting the provider reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vector,
    pub usage: Option<Metadata>,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Output dimensionality; constant for the provider's lifetime.
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vector>;

    async fn embed_with_usage(&self, text: &str) -> Result<Embedding> {
        Ok(Embedding {
            vector: self.embed(text).await?,
            usage: None,
        })
    }
}
