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

//! Similarity query construction
//!
//! Filters arrive as an open key/value map. Only keys naming a real column
//! become equality predicates; anything else is dropped with a warning so
//! that callers passing application-level keys keep getting results.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::core::types::{Column, ColumnKind, DistanceMetric, Filters, Vector};
use crate::index::{IndexPolicy, SessionSetting};

/// Typed filter operand, shaped by the column it targets.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Document(Value),
    Vector(Vector),
    Timestamp(DateTime<Utc>),
    /// Operand that can never equal the column (e.g. a string against a vector).
    Unmatchable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    pub column: Column,
    pub value: FilterValue,
}

/// A fully resolved similarity query, ready for a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub embedding: Vector,
    pub limit: usize,
    pub metric: DistanceMetric,
    pub predicates: Vec<FilterPredicate>,
    /// Applied with transaction scope right before the query runs.
    pub settings: Vec<SessionSetting>,
}

impl SearchRequest {
    pub fn new(
        embedding: Vector,
        limit: usize,
        metric: DistanceMetric,
        filters: Option<&Filters>,
        index: Option<&IndexPolicy>,
    ) -> Self {
        Self {
            embedding,
            limit,
            metric,
            predicates: filters.map(resolve_filters).unwrap_or_default(),
            settings: index.map(|policy| vec![policy.search_setting()]).unwrap_or_default(),
        }
    }
}

/// Map filter keys to column predicates, ignoring unknown keys.
pub fn resolve_filters(filters: &Filters) -> Vec<FilterPredicate> {
    filters
        .iter()
        .filter_map(|(key, value)| match Column::from_name(key) {
            Some(column) => Some(FilterPredicate {
                column,
                value: coerce(column, value),
            }),
            None => {
                warn!("🔍 Ignoring filter on unknown column '{}'", key);
                None
            }
        })
        .collect()
}

fn coerce(column: Column, value: &Value) -> FilterValue {
    match column.kind() {
        ColumnKind::Text => match value {
            Value::String(s) => FilterValue::Text(s.clone()),
            Value::Null | Value::Array(_) | Value::Object(_) => FilterValue::Unmatchable,
            other => FilterValue::Text(other.to_string()),
        },
        ColumnKind::Document => FilterValue::Document(value.clone()),
        ColumnKind::Vector => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_f64().map(|f| f as f32))
                .collect::<Option<Vector>>()
                .map(FilterValue::Vector)
                .unwrap_or(FilterValue::Unmatchable),
            _ => FilterValue::Unmatchable,
        },
        ColumnKind::Timestamp => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| FilterValue::Timestamp(ts.with_timezone(&Utc)))
            .unwrap_or(FilterValue::Unmatchable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{GraphIndex, ListIndex};
    use serde_json::json;

    fn filters(value: Value) -> Filters {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_unknown_filter_keys_are_ignored() {
        let predicates = resolve_filters(&filters(json!({
            "name": "guide",
            "author": "someone",
            "page": 3,
        })));
        assert_eq!(
            predicates,
            vec![FilterPredicate {
                column: Column::Name,
                value: FilterValue::Text("guide".to_string()),
            }]
        );
    }

    #[test]
    fn test_values_are_shaped_by_column() {
        let predicates = resolve_filters(&filters(json!({
            "content_hash": 12,
            "metadata": {"lang": "en"},
            "embedding": [1, 2.5],
            "created_at": "2024-07-31T10:02:00Z",
            "updated_at": "yesterday",
            "id": null,
        })));

        let by_column = |column: Column| {
            predicates
                .iter()
                .find(|p| p.column == column)
                .map(|p| p.value.clone())
                .unwrap()
        };
        assert_eq!(by_column(Column::ContentHash), FilterValue::Text("12".to_string()));
        assert_eq!(by_column(Column::Metadata), FilterValue::Document(json!({"lang": "en"})));
        assert_eq!(by_column(Column::Embedding), FilterValue::Vector(vec![1.0, 2.5]));
        assert!(matches!(by_column(Column::CreatedAt), FilterValue::Timestamp(_)));
        assert_eq!(by_column(Column::UpdatedAt), FilterValue::Unmatchable);
        assert_eq!(by_column(Column::Id), FilterValue::Unmatchable);
    }

    #[test]
    fn test_request_carries_index_search_setting() {
        let graph = IndexPolicy::Graph(GraphIndex::default());
        let request = SearchRequest::new(vec![1.0], 3, DistanceMetric::Cosine, None, Some(&graph));
        assert_eq!(request.settings, vec![SessionSetting::new("hnsw.ef_search", 5)]);
        assert!(request.predicates.is_empty());

        let list = IndexPolicy::List(ListIndex::default());
        let request = SearchRequest::new(vec![1.0], 3, DistanceMetric::Cosine, None, Some(&list));
        assert_eq!(request.settings, vec![SessionSetting::new("ivfflat.probes", 10)]);

        let request = SearchRequest::new(vec![1.0], 3, DistanceMetric::Cosine, None, None);
        assert!(request.settings.is_empty());
    }
}
