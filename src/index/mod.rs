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

//! ANN index policies and build planning
//!
//! A collection carries at most one [`IndexPolicy`]. The policy decides two
//! things:
//! - the session parameter applied before every similarity query
//!   (`ivfflat.probes` or `hnsw.ef_search`)
//! - the construction parameters used by `optimize`
//!
//! List-index sizing can follow the live row count: below one million rows
//! the list count is `rows / 1000`, from one million upwards it is
//! `sqrt(rows)`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::error::{CollectionError, Result};
use crate::core::types::DistanceMetric;
use crate::storage::fingerprint::content_fingerprint;
use crate::storage::sql::{validate_identifier, validate_setting_key, MAX_IDENTIFIER_LEN};

/// Row count at which dynamic list sizing switches from linear to sqrt.
pub const DYNAMIC_LISTS_SQRT_THRESHOLD: u64 = 1_000_000;

/// Engine tuning overrides applied as session settings during a build.
///
/// Values may be strings, numbers or booleans (`work_mem = 65536`).
pub type EngineConfiguration = BTreeMap<String, Value>;

fn default_configuration() -> EngineConfiguration {
    let mut configuration = EngineConfiguration::new();
    configuration.insert("maintenance_work_mem".to_string(), Value::from("2GB"));
    configuration
}

/// Setting value as the engine reads it; strings are taken unquoted.
pub fn setting_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Hex digits of the collection fingerprint kept in shortened index names.
const INDEX_NAME_SUFFIX_LEN: usize = 8;

/// Inverted-file (ivfflat) index parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListIndex {
    pub name: Option<String>,
    pub lists: u32,
    pub probes: u32,
    pub dynamic_lists: bool,
    pub configuration: EngineConfiguration,
}

impl Default for ListIndex {
    fn default() -> Self {
        Self {
            name: None,
            lists: 100,
            probes: 10,
            dynamic_lists: true,
            configuration: default_configuration(),
        }
    }
}

/// Proximity-graph (hnsw) index parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphIndex {
    pub name: Option<String>,
    pub m: u32,
    pub ef_search: u32,
    pub ef_construction: u32,
    pub configuration: EngineConfiguration,
}

impl Default for GraphIndex {
    fn default() -> Self {
        Self {
            name: None,
            m: 16,
            ef_search: 5,
            ef_construction: 200,
            configuration: default_configuration(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexPolicy {
    List(ListIndex),
    Graph(GraphIndex),
}

/// Index access method understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMethod {
    IvfFlat,
    Hnsw,
}

impl IndexMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IvfFlat => "ivfflat",
            Self::Hnsw => "hnsw",
        }
    }
}

/// A `SET LOCAL name = value` applied inside a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetting {
    pub name: String,
    pub value: String,
}

impl SessionSetting {
    pub fn new(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
        }
    }
}

/// Everything a backend needs to issue one conditional index build.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBuildPlan {
    pub index_name: String,
    pub method: IndexMethod,
    pub ops_class: &'static str,
    /// Storage parameters rendered in the `WITH (...)` clause, in order.
    pub parameters: Vec<(String, u64)>,
    /// Settings applied before the build, in order.
    pub settings: Vec<SessionSetting>,
}

/// Nominal list count for a table with `row_count` rows.
///
/// The engine rejects zero lists, so small tables get a single list.
pub fn dynamic_list_count(row_count: u64) -> u32 {
    let lists = if row_count < DYNAMIC_LISTS_SQRT_THRESHOLD {
        row_count / 1000
    } else {
        (row_count as f64).sqrt() as u64
    };
    lists.clamp(1, u32::MAX as u64) as u32
}

impl IndexPolicy {
    pub fn method(&self) -> IndexMethod {
        match self {
            Self::List(_) => IndexMethod::IvfFlat,
            Self::Graph(_) => IndexMethod::Hnsw,
        }
    }

    pub fn configuration(&self) -> &EngineConfiguration {
        match self {
            Self::List(list) => &list.configuration,
            Self::Graph(graph) => &graph.configuration,
        }
    }

    /// Configured name, or `<collection>_<kind>_index`.
    ///
    /// A default name past the identifier limit keeps a truncated collection
    /// prefix followed by a fingerprint of the full collection name.
    pub fn index_name(&self, collection: &str) -> String {
        let configured = match self {
            Self::List(list) => list.name.as_ref(),
            Self::Graph(graph) => graph.name.as_ref(),
        };
        if let Some(name) = configured {
            return name.clone();
        }

        let suffix = format!("_{}_index", self.method().as_str());
        let name = format!("{}{}", collection, suffix);
        if name.len() <= MAX_IDENTIFIER_LEN {
            return name;
        }
        let digest = content_fingerprint(collection);
        let digest = &digest[..INDEX_NAME_SUFFIX_LEN];
        let keep = MAX_IDENTIFIER_LEN - suffix.len() - digest.len() - 1;
        let prefix: String = collection.chars().take(keep).collect();
        format!("{}_{}{}", prefix, digest, suffix)
    }

    /// Parameter set before each similarity query.
    pub fn search_setting(&self) -> SessionSetting {
        match self {
            Self::List(list) => SessionSetting::new("ivfflat.probes", list.probes),
            Self::Graph(graph) => SessionSetting::new("hnsw.ef_search", graph.ef_search),
        }
    }

    /// True when `optimize` needs the live row count.
    pub fn needs_row_count(&self) -> bool {
        matches!(self, Self::List(list) if list.dynamic_lists)
    }

    /// Build plan for `collection`. `row_count` is consulted only for
    /// dynamically sized list indexes.
    pub fn build_plan(
        &self,
        collection: &str,
        metric: DistanceMetric,
        row_count: Option<u64>,
    ) -> IndexBuildPlan {
        let mut settings: Vec<SessionSetting> = self
            .configuration()
            .iter()
            .map(|(key, value)| SessionSetting::new(key.clone(), setting_value(value)))
            .collect();

        let parameters = match self {
            Self::List(list) => {
                let lists = match (list.dynamic_lists, row_count) {
                    (true, Some(rows)) => dynamic_list_count(rows),
                    _ => list.lists,
                };
                settings.push(SessionSetting::new("ivfflat.probes", list.probes));
                vec![("lists".to_string(), lists as u64)]
            }
            Self::Graph(graph) => vec![
                ("m".to_string(), graph.m as u64),
                ("ef_construction".to_string(), graph.ef_construction as u64),
            ],
        };

        IndexBuildPlan {
            index_name: self.index_name(collection),
            method: self.method(),
            ops_class: metric.ops_class(),
            parameters,
            settings,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let name = match self {
            Self::List(list) => list.name.as_deref(),
            Self::Graph(graph) => graph.name.as_deref(),
        };
        if let Some(name) = name {
            validate_identifier(name)?;
        }
        for key in self.configuration().keys() {
            validate_setting_key(key)?;
        }
        match self {
            Self::List(list) if list.lists == 0 || list.probes == 0 => Err(
                CollectionError::Config("ivfflat lists and probes must be positive".to_string()),
            ),
            Self::Graph(graph) if graph.m < 2 || graph.ef_search == 0 || graph.ef_construction == 0 => {
                Err(CollectionError::Config(
                    "hnsw m must be at least 2 and ef values positive".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}
