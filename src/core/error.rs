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

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CollectionError>;

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Index build failed: {0}")]
    IndexBuild(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CollectionError {
    /// Classify a driver error at the backend boundary.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::Conflict(db_err.message().to_string());
            }
            // 42P01 = undefined_table, 3F000 = invalid_schema_name
            match db_err.code().as_deref() {
                Some("42P01") | Some("3F000") => {
                    return Self::TableNotFound(db_err.message().to_string())
                }
                _ => {}
            }
        }
        Self::Database(err.to_string())
    }

    /// True for failures caused by a cold (unprovisioned) collection.
    pub fn is_missing_storage(&self) -> bool {
        matches!(self, Self::TableNotFound(_))
    }
}
