use etl::pipeline::Pipeline;
use etl::state::{JsonFileStorage, StateStorage, Watermark, keys};
use etl::test_utils::destination::FlakyDestination;
use etl::test_utils::fixtures::{film_work_row, source_row, watermark};
use etl::test_utils::source::MockSource;
use serde_json::json;
use telemetry::init_test_tracing;
use tempfile::tempdir;

use crate::{read_state, test_pipeline_config, wait_for_drained_batch};

#[tokio::test(flavor = "multi_thread")]
async fn restart_resumes_from_persisted_watermark() {
    init_test_tracing();

    let dir = tempdir().unwrap();
    let state_path = dir.path().join("state").join("state.json");

    let source = MockSource::new();
    source
        .upsert_film_works([
            source_row("fw-1", "2021-01-01 00:00:00"),
            source_row("fw-2", "2021-01-02 00:00:00"),
        ])
        .await;
    let destination = FlakyDestination::new();
    let delivered = destination.wait_for_documents(2).await;

    let mut pipeline = Pipeline::new(
        test_pipeline_config(&state_path, 100),
        source.clone(),
        JsonFileStorage::new(&state_path),
        destination.clone(),
    );
    pipeline.start().await.unwrap();
    delivered.notified().await;
    wait_for_drained_batch(&state_path).await;
    pipeline.shutdown_and_wait().await.unwrap();

    let first_run = read_state(&state_path).await;
    let timestamp = first_run[keys::TIMESTAMP].clone();

    // A new film work shows up while the replicator is down.
    let restarted_source = MockSource::new();
    restarted_source
        .upsert_film_works([
            source_row("fw-1", "2021-01-01 00:00:00"),
            source_row("fw-2", "2021-01-02 00:00:00"),
            source_row("fw-3", "2021-01-03 00:00:00"),
        ])
        .await;
    let delivered = destination.wait_for_documents(3).await;

    let mut pipeline = Pipeline::new(
        test_pipeline_config(&state_path, 100),
        restarted_source.clone(),
        JsonFileStorage::new(&state_path),
        destination.clone(),
    );
    pipeline.start().await.unwrap();
    delivered.notified().await;
    wait_for_drained_batch(&state_path).await;
    pipeline.shutdown_and_wait().await.unwrap();

    // Only fw-3 is extracted again.
    let primary_queries = restarted_source.primary_queries().await;
    assert_eq!(primary_queries[0].0, watermark("2021-01-02 00:00:00"));
    assert_eq!(destination.upserts().await, 3);

    let second_run = read_state(&state_path).await;
    assert_eq!(second_run[keys::FW_MODIFIED], json!("2021-01-03 00:00:00.000000"));
    assert_eq!(second_run[keys::TIMESTAMP], timestamp);
}

#[tokio::test(flavor = "multi_thread")]
async fn persisted_batch_is_recovered_without_querying_source() {
    init_test_tracing();

    let dir = tempdir().unwrap();
    let state_path = dir.path().join("state.json");

    // State left behind by a crash right after extraction.
    let mut crashed = serde_json::Map::new();
    crashed.insert(keys::TIMESTAMP.to_string(), json!("2021-01-01 00:00:00.000000"));
    crashed.insert(keys::FW_MODIFIED.to_string(), json!("2021-02-01 00:00:00.000000"));
    crashed.insert(
        keys::EXTRACTED_DATA.to_string(),
        serde_json::to_value(vec![film_work_row("fw-lost")]).unwrap(),
    );
    JsonFileStorage::new(&state_path)
        .persist(&crashed)
        .await
        .unwrap();

    let source = MockSource::new();
    let destination = FlakyDestination::new();
    let delivered = destination.wait_for_documents(1).await;

    let mut pipeline = Pipeline::new(
        test_pipeline_config(&state_path, 100),
        source.clone(),
        JsonFileStorage::new(&state_path),
        destination.clone(),
    );
    pipeline.start().await.unwrap();
    delivered.notified().await;
    wait_for_drained_batch(&state_path).await;
    pipeline.shutdown_and_wait().await.unwrap();

    assert!(destination.documents().await.contains_key("fw-lost"));

    // Once the batch drained, extraction resumed after the persisted watermark.
    let primary_queries = source.primary_queries().await;
    assert!(
        primary_queries
            .iter()
            .all(|(since, _)| *since == watermark("2021-02-01 00:00:00"))
    );

    let state = read_state(&state_path).await;
    let fw_modified: Watermark = serde_json::from_value(state[keys::FW_MODIFIED].clone()).unwrap();
    assert_eq!(fw_modified, watermark("2021-02-01 00:00:00"));
}
