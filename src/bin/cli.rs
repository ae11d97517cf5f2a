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

//! pgcollection CLI - administer a single collection from the shell

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pgcollection::{Collection, CollectionConfig, Document, Filters, HttpEmbedder};

#[derive(Parser)]
#[command(name = "pgcollection-cli")]
#[command(about = "Manage a pgvector-backed document collection")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the extension, namespace and table if missing
    Provision,
    /// Drop the collection table
    Drop,
    /// Delete all rows, keeping the table
    Truncate,
    /// Print the number of stored documents
    Count,
    /// Build the configured ANN index
    Optimize,
    /// Check whether a document with the given id or name is stored
    Exists {
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Insert documents from a JSON-lines file
    Insert {
        file: PathBuf,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Insert or replace documents from a JSON-lines file
    Upsert {
        file: PathBuf,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Similarity search
    Search {
        query: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
        /// Equality filter as key=value; repeatable
        #[arg(short, long = "filter")]
        filters: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CollectionConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    let embedder = Arc::new(HttpEmbedder::new(&config.embedder)?);
    let collection = Collection::from_config(&config, embedder).await?;
    info!("📚 Opened collection {}.{}", collection.schema(), collection.name());

    match cli.command {
        Commands::Provision => {
            collection.provision().await?;
            println!("provisioned {}", collection.name());
        }
        Commands::Drop => {
            collection.drop().await?;
            println!("dropped {}", collection.name());
        }
        Commands::Truncate => {
            let removed = collection.truncate().await?;
            println!("removed {} documents", removed);
        }
        Commands::Count => {
            println!("{}", collection.count().await?);
        }
        Commands::Optimize => {
            collection.optimize().await?;
            println!("index ready on {}", collection.name());
        }
        Commands::Exists { id, name } => {
            let found = match (id, name) {
                (Some(id), _) => collection.exists_by_id(&id).await,
                (None, Some(name)) => collection.exists_by_name(&name).await,
                (None, None) => bail!("either --id or --name is required"),
            };
            println!("{}", found);
        }
        Commands::Insert { file, batch_size } => {
            let mut documents = read_documents(&file)?;
            let batch_size = batch_size.unwrap_or(config.collection.insert_batch_size);
            let summary = collection.insert(&mut documents, batch_size).await?;
            println!("inserted {} documents in {} batches", summary.documents, summary.batches);
        }
        Commands::Upsert { file, batch_size } => {
            let mut documents = read_documents(&file)?;
            let batch_size = batch_size.unwrap_or(config.collection.upsert_batch_size);
            let summary = collection.upsert(&mut documents, batch_size).await?;
            println!("upserted {} documents in {} batches", summary.documents, summary.batches);
        }
        Commands::Search { query, limit, filters } => {
            let filters = parse_filters(&filters)?;
            let filters = (!filters.is_empty()).then_some(&filters);
            for document in collection.search(&query, limit, filters).await {
                let line = json!({
                    "id": document.id,
                    "name": document.name,
                    "content": document.content,
                    "metadata": document.metadata,
                });
                println!("{}", line);
            }
        }
    }

    Ok(())
}

/// One JSON document per non-blank line.
fn read_documents(path: &Path) -> anyhow::Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Document>(line)
                .with_context(|| format!("{}:{}: invalid document", path.display(), n + 1))
        })
        .collect()
}

/// `key=value` pairs; values that parse as JSON keep their JSON type.
fn parse_filters(pairs: &[String]) -> anyhow::Result<Filters> {
    let mut filters = Filters::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("filter '{}' is not of the form key=value", pair);
        };
        let value = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
        filters.insert(key.to_string(), value);
    }
    Ok(filters)
}
