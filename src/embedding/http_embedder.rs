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

//! OpenAI-compatible `/embeddings` client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Embedder, Embedding};
use crate::core::config::EmbedderConfig;
use crate::core::error::{CollectionError, Result};
use crate::core::types::{Metadata, Vector};

pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    request_dimensions: bool,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Metadata>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vector,
}

impl HttpEmbedder {
    pub fn new(config: &EmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CollectionError::Config(format!("cannot build HTTP client: {}", e)))?;
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty());

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
            request_dimensions: config.request_dimensions,
            api_key,
        })
    }

    async fn request(&self, text: &str) -> Result<EmbeddingResponse> {
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            input: text,
            model: &self.model,
            dimensions: self.request_dimensions.then_some(self.dimensions),
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CollectionError::EmbeddingUnavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            warn!("Embedding request to {} failed with {}", self.endpoint, status);
            return Err(CollectionError::EmbeddingUnavailable(format!(
                "provider returned {}",
                status
            )));
        }
        response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| CollectionError::EmbeddingUnavailable(e.to_string()))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vector> {
        Ok(self.embed_with_usage(text).await?.vector)
    }

    async fn embed_with_usage(&self, text: &str) -> Result<Embedding> {
        let response = self.request(text).await?;
        let vector = response
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|vector| !vector.is_empty())
            .ok_or_else(|| {
                CollectionError::EmbeddingUnavailable("provider returned no embedding".to_string())
            })?;
        if vector.len() != self.dimensions {
            warn!(
                "Embedding from {} has {} dims, expected {}",
                self.endpoint,
                vector.len(),
                self.dimensions
            );
            return Err(CollectionError::EmbeddingUnavailable(format!(
                "provider returned {} dimensions, expected {}",
                vector.len(),
                self.dimensions
            )));
        }
        debug!("Embedded {} chars into {} dims", text.len(), vector.len());
        Ok(Embedding {
            vector,
            usage: response.usage,
        })
    }
}
