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

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::error::{CollectionError, Result};
use crate::core::types::DistanceMetric;
use crate::index::{GraphIndex, IndexPolicy, ListIndex};
use crate::storage::sql::validate_identifier;

pub const ENV_DATABASE_URL: &str = "PGCOLLECTION_DATABASE_URL";
pub const ENV_LOG_LEVEL: &str = "PGCOLLECTION_LOG_LEVEL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub collection: CollectionSettings,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection descriptor and pool sizing for the backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSettings {
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub distance: DistanceMetric,
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

/// `[index]` section; omitting it selects the graph index with defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexConfig {
    None,
    Ivfflat(ListIndex),
    Hnsw(GraphIndex),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    /// Environment variable holding the bearer token, if the endpoint needs one.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    /// Ask the provider for `dimensions`-wide output; off for fixed-width models.
    pub request_dimensions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_schema() -> String {
    "ai".to_string()
}

fn default_insert_batch_size() -> usize {
    10
}

fn default_upsert_batch_size() -> usize {
    20
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::Hnsw(GraphIndex::default())
    }
}

impl IndexConfig {
    pub fn policy(&self) -> Option<IndexPolicy> {
        match self {
            Self::None => None,
            Self::Ivfflat(list) => Some(IndexPolicy::List(list.clone())),
            Self::Hnsw(graph) => Some(IndexPolicy::Graph(graph.clone())),
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            timeout_secs: 30,
            request_dimensions: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CollectionSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: default_schema(),
            distance: DistanceMetric::default(),
            insert_batch_size: default_insert_batch_size(),
            upsert_batch_size: default_upsert_batch_size(),
        }
    }
}

impl CollectionConfig {
    pub fn new(collection: CollectionSettings) -> Self {
        Self {
            database: DatabaseConfig::default(),
            collection,
            index: IndexConfig::default(),
            embedder: EmbedderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load a TOML file, apply environment overrides and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CollectionError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(raw).map_err(|e| CollectionError::Config(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            if !url.is_empty() {
                self.database.url = Some(url);
            }
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.collection.name)?;
        validate_identifier(&self.collection.schema)?;
        if self.collection.insert_batch_size == 0 || self.collection.upsert_batch_size == 0 {
            return Err(CollectionError::Config(
                "batch sizes must be greater than zero".to_string(),
            ));
        }
        if let Some(policy) = self.index.policy() {
            policy.validate()?;
        }
        if self.embedder.dimensions == 0 {
            return Err(CollectionError::Config(
                "embedder dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: CollectionConfig = toml::from_str(
            r#"
            [collection]
            name = "recipes"
            "#,
        )
        .unwrap();

        assert_eq!(config.collection.schema, "ai");
        assert_eq!(config.collection.distance, DistanceMetric::Cosine);
        assert_eq!(config.collection.insert_batch_size, 10);
        assert_eq!(config.collection.upsert_batch_size, 20);
        assert!(config.database.url.is_none());
        match config.index.policy() {
            Some(IndexPolicy::Graph(graph)) => {
                assert_eq!(graph.m, 16);
                assert_eq!(graph.ef_search, 5);
                assert_eq!(graph.ef_construction, 200);
            }
            other => panic!("unexpected default policy: {:?}", other),
        }
    }

    #[test]
    fn test_list_index_section() {
        let config: CollectionConfig = toml::from_str(
            r#"
            [collection]
            name = "recipes"
            distance = "l2"

            [index]
            type = "ivfflat"
            lists = 50
            probes = 4
            dynamic_lists = false

            [index.configuration]
            maintenance_work_mem = "512MB"
            work_mem = 65536
            "#,
        )
        .unwrap();

        assert_eq!(config.collection.distance, DistanceMetric::L2);
        match config.index.policy() {
            Some(IndexPolicy::List(list)) => {
                assert_eq!(list.lists, 50);
                assert_eq!(list.probes, 4);
                assert!(!list.dynamic_lists);
                assert_eq!(list.configuration["maintenance_work_mem"], "512MB");
                assert_eq!(list.configuration["work_mem"], 65536);
            }
            other => panic!("unexpected policy: {:?}", other),
        }
    }

    #[test]
    fn test_index_can_be_disabled() {
        let config: CollectionConfig = toml::from_str(
            r#"
            [collection]
            name = "recipes"

            [index]
            type = "none"
            "#,
        )
        .unwrap();
        assert!(config.index.policy().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_identifiers() {
        let mut config = CollectionConfig::new(CollectionSettings::new("recipes; drop table x"));
        assert!(matches!(config.validate(), Err(CollectionError::Config(_))));

        config.collection.name = "recipes".to_string();
        assert!(config.validate().is_ok());

        config.collection.insert_batch_size = 0;
        assert!(matches!(config.validate(), Err(CollectionError::Config(_))));
    }
}
