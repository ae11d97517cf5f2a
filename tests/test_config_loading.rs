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

use std::io::Write;
use tempfile::NamedTempFile;

use pgcollection::{CollectionConfig, CollectionError, DistanceMetric, IndexPolicy};

fn write_config(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config_from_file() {
    let file = write_config(
        r#"
        [database]
        url = "postgres://localhost/ai"
        max_connections = 4

        [collection]
        name = "recipes"
        schema = "kitchen"
        distance = "max_inner_product"
        insert_batch_size = 50

        [index]
        type = "hnsw"
        m = 32
        ef_search = 40

        [embedder]
        base_url = "http://localhost:9000/v1"
        dimensions = 384

        [logging]
        level = "debug"
        "#,
    );

    let config = CollectionConfig::from_file(file.path()).unwrap();
    assert_eq!(config.database.max_connections, 4);
    assert_eq!(config.database.min_connections, 1);
    assert_eq!(config.collection.schema, "kitchen");
    assert_eq!(config.collection.distance, DistanceMetric::MaxInnerProduct);
    assert_eq!(config.collection.insert_batch_size, 50);
    assert_eq!(config.collection.upsert_batch_size, 20);
    assert_eq!(config.embedder.dimensions, 384);
    assert_eq!(config.embedder.model, "text-embedding-3-small");
    match config.index.policy() {
        Some(IndexPolicy::Graph(graph)) => {
            assert_eq!(graph.m, 32);
            assert_eq!(graph.ef_search, 40);
            assert_eq!(graph.ef_construction, 200);
        }
        other => panic!("unexpected policy: {:?}", other),
    }
}

#[test]
fn test_index_configuration_accepts_numbers() {
    let file = write_config(
        r#"
        [collection]
        name = "recipes"

        [index]
        type = "ivfflat"

        [index.configuration]
        work_mem = 65536
        maintenance_work_mem = "1GB"
        "#,
    );

    let config = CollectionConfig::from_file(file.path()).unwrap();
    let policy = config.index.policy().unwrap();
    let plan = policy.build_plan("recipes", DistanceMetric::L2, Some(10));
    let settings: Vec<(String, String)> = plan
        .settings
        .into_iter()
        .map(|s| (s.name, s.value))
        .collect();
    assert_eq!(
        settings,
        vec![
            ("maintenance_work_mem".to_string(), "1GB".to_string()),
            ("work_mem".to_string(), "65536".to_string()),
            ("ivfflat.probes".to_string(), "10".to_string()),
        ]
    );
}

#[test]
fn test_invalid_files_are_config_errors() {
    let missing = CollectionConfig::from_file("/nonexistent/pgcollection.toml");
    assert!(matches!(missing, Err(CollectionError::Config(_))));

    let unknown_index = write_config(
        r#"
        [collection]
        name = "recipes"

        [index]
        type = "annoy"
        "#,
    );
    assert!(matches!(
        CollectionConfig::from_file(unknown_index.path()),
        Err(CollectionError::Config(_))
    ));

    let zero_batch = write_config(
        r#"
        [collection]
        name = "recipes"
        upsert_batch_size = 0
        "#,
    );
    assert!(matches!(
        CollectionConfig::from_file(zero_batch.path()),
        Err(CollectionError::Config(_))
    ));

    let bad_probes = write_config(
        r#"
        [collection]
        name = "recipes"

        [index]
        type = "ivfflat"
        probes = 0
        "#,
    );
    assert!(matches!(
        CollectionConfig::from_file(bad_probes.path()),
        Err(CollectionError::Config(_))
    ));
}
