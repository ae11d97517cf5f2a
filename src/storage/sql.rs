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

//! SQL rendering for pgvector-backed collection tables
//!
//! Identifiers are validated once and double-quoted when rendered. Values
//! always travel as bind parameters; vectors use the pgvector text form
//! (`[1,2,3]`) with an explicit `::vector` cast.

use crate::core::error::{CollectionError, Result};
use crate::core::types::{Column, ColumnKind};
use crate::index::{IndexBuildPlan, SessionSetting};
use crate::query::{FilterValue, SearchRequest};

pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Accepts `[A-Za-z_][A-Za-z0-9_]*` up to the engine's identifier limit.
pub fn validate_identifier(ident: &str) -> Result<()> {
    let mut chars = ident.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_start && valid_rest && ident.len() <= MAX_IDENTIFIER_LEN {
        Ok(())
    } else {
        Err(CollectionError::Config(format!("invalid SQL identifier: {:?}", ident)))
    }
}

/// Setting keys are identifiers optionally namespaced with dots (`ivfflat.probes`).
pub fn validate_setting_key(key: &str) -> Result<()> {
    if key.split('.').all(|part| validate_identifier(part).is_ok()) {
        Ok(())
    } else {
        Err(CollectionError::Config(format!("invalid setting name: {:?}", key)))
    }
}

pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident)
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Location and shape of one collection table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    schema: String,
    name: String,
    dimensions: usize,
}

impl TableSpec {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, dimensions: usize) -> Result<Self> {
        let schema = schema.into();
        let name = name.into();
        validate_identifier(&schema)?;
        validate_identifier(&name)?;
        if dimensions == 0 {
            return Err(CollectionError::Config(
                "vector dimensionality must be greater than zero".to_string(),
            ));
        }
        Ok(Self { schema, name, dimensions })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(&self.name))
    }
}

/// Render a vector in pgvector's text input format.
pub fn vector_literal(vector: &[f32]) -> String {
    let values: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

/// Parse pgvector's text output format.
pub fn parse_vector(text: &str) -> Result<Vec<f32>> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| CollectionError::Database(format!("malformed vector: {}", text)))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| CollectionError::Database(format!("malformed vector element {:?}: {}", part, e)))
        })
        .collect()
}

pub fn create_extension() -> &'static str {
    "CREATE EXTENSION IF NOT EXISTS vector"
}

pub fn create_schema(table: &TableSpec) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_identifier(table.schema()))
}

pub fn table_exists() -> &'static str {
    "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2)"
}

pub fn create_table(table: &TableSpec) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
    id TEXT PRIMARY KEY,
    name TEXT,
    metadata JSONB DEFAULT '{{}}'::jsonb,
    content TEXT,
    embedding vector({}),
    usage JSONB,
    created_at TIMESTAMPTZ DEFAULT now(),
    updated_at TIMESTAMPTZ,
    content_hash TEXT
)"#,
        table.qualified_name(),
        table.dimensions()
    )
}

pub fn drop_table(table: &TableSpec) -> String {
    format!("DROP TABLE IF EXISTS {}", table.qualified_name())
}

pub fn delete_all(table: &TableSpec) -> String {
    format!("DELETE FROM {}", table.qualified_name())
}

pub fn count_rows(table: &TableSpec) -> String {
    format!("SELECT count(*) FROM {}", table.qualified_name())
}

/// Point lookup on a text column; binds the value as `$1`.
pub fn exists_where(table: &TableSpec, column: Column) -> String {
    format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
        table.qualified_name(),
        quote_identifier(column.name())
    )
}

/// Single-row write. Binds: id, name, metadata, content, embedding, usage, content_hash.
///
/// With `upsert`, a conflicting id has every non-key column replaced and
/// `updated_at` stamped.
pub fn write_row(table: &TableSpec, upsert: bool) -> String {
    let mut sql = format!(
        "INSERT INTO {} (id, name, metadata, content, embedding, usage, content_hash) \
         VALUES ($1, $2, $3::jsonb, $4, $5::vector, $6::jsonb, $7)",
        table.qualified_name()
    );
    if upsert {
        sql.push_str(
            " ON CONFLICT (id) DO UPDATE SET \
             name = EXCLUDED.name, \
             metadata = EXCLUDED.metadata, \
             content = EXCLUDED.content, \
             embedding = EXCLUDED.embedding, \
             usage = EXCLUDED.usage, \
             content_hash = EXCLUDED.content_hash, \
             updated_at = now()",
        );
    }
    sql
}

/// `SET LOCAL`, scoped to the enclosing transaction.
pub fn set_local(setting: &SessionSetting) -> Result<String> {
    validate_setting_key(&setting.name)?;
    Ok(format!("SET LOCAL {} = {}", setting.name, quote_literal(&setting.value)))
}

/// Rendered similarity query plus its text binds (`$1` is the query vector).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchStatement {
    pub sql: String,
    pub binds: Vec<String>,
}

pub fn search(table: &TableSpec, request: &SearchRequest) -> SearchStatement {
    let mut binds = vec![vector_literal(&request.embedding)];
    let mut predicates = Vec::with_capacity(request.predicates.len());

    for predicate in &request.predicates {
        let column = quote_identifier(predicate.column.name());
        let cast = match predicate.column.kind() {
            ColumnKind::Text => "",
            ColumnKind::Document => "::jsonb",
            ColumnKind::Vector => "::vector",
            ColumnKind::Timestamp => "::timestamptz",
        };
        let bind = match &predicate.value {
            FilterValue::Text(text) => Some(text.clone()),
            FilterValue::Document(value) => Some(value.to_string()),
            FilterValue::Vector(vector) => Some(vector_literal(vector)),
            FilterValue::Timestamp(ts) => Some(ts.to_rfc3339()),
            FilterValue::Unmatchable => None,
        };
        match bind {
            Some(value) => {
                binds.push(value);
                predicates.push(format!("{} = ${}{}", column, binds.len(), cast));
            }
            None => predicates.push("FALSE".to_string()),
        }
    }

    let mut sql = format!(
        "SELECT id, name, metadata, content, embedding::text AS embedding, usage, \
         content_hash, created_at, updated_at FROM {}",
        table.qualified_name()
    );
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }
    sql.push_str(&format!(
        " ORDER BY embedding {} $1::vector LIMIT {}",
        request.metric.order_operator(),
        request.limit
    ));

    SearchStatement { sql, binds }
}

pub fn create_index(table: &TableSpec, plan: &IndexBuildPlan) -> Result<String> {
    validate_identifier(&plan.index_name)?;
    let parameters: Vec<String> = plan
        .parameters
        .iter()
        .map(|(key, value)| format!("{} = {}", key, value))
        .collect();
    Ok(format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} USING {} (embedding {}) WITH ({})",
        quote_identifier(&plan.index_name),
        table.qualified_name(),
        plan.method.as_str(),
        plan.ops_class,
        parameters.join(", ")
    ))
}
