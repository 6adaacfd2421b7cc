use etl::error::ErrorKind;
use etl::pipeline::Pipeline;
use etl::state::{JsonFileStorage, keys};
use etl::test_utils::destination::FlakyDestination;
use etl::test_utils::fixtures::{bare_film_work_row, source_row, watermark};
use etl::test_utils::source::MockSource;
use etl::types::SourceRow;
use serde_json::{Value, json};
use telemetry::init_test_tracing;
use tempfile::tempdir;

use crate::{read_state, test_pipeline_config, wait_for_drained_batch};

#[tokio::test(flavor = "multi_thread")]
async fn film_works_are_replicated_in_chunks() {
    init_test_tracing();

    let dir = tempdir().unwrap();
    let state_path = dir.path().join("state.json");

    let source = MockSource::new();
    source
        .upsert_film_works((1..=5).map(|n| source_row(&format!("fw-{n}"), &format!("2021-01-0{n} 12:00:00"))))
        .await;
    source
        .upsert_film_works([SourceRow::new(
            watermark("2021-01-06 12:00:00"),
            bare_film_work_row("fw-bare"),
        )])
        .await;
    let destination = FlakyDestination::new();
    let delivered = destination.wait_for_documents(6).await;

    let mut pipeline = Pipeline::new(
        test_pipeline_config(&state_path, 2),
        source.clone(),
        JsonFileStorage::new(&state_path),
        destination.clone(),
    );
    pipeline.start().await.unwrap();
    delivered.notified().await;

    wait_for_drained_batch(&state_path).await;
    pipeline.shutdown_and_wait().await.unwrap();

    let documents = destination.documents().await;
    assert_eq!(documents.len(), 6);
    assert_eq!(documents["fw-3"].title, "Film fw-3");
    assert!(documents["fw-bare"].genre.is_empty());
    assert!(documents["fw-bare"].writers.is_empty());

    let state = read_state(&state_path).await;
    assert_eq!(state[keys::FW_MODIFIED], json!("2021-01-06 12:00:00.000000"));
    assert!(state[keys::EXTRACTED_DATA].is_null());
    assert!(state[keys::TIMESTAMP].is_string());

    // Chunks of two, each resuming after the previous watermark.
    let primary_queries = source.primary_queries().await;
    assert!(primary_queries.iter().all(|(_, limit)| *limit == 2));
    assert_eq!(primary_queries[1].0, watermark("2021-01-02 12:00:00"));
}

#[tokio::test(flavor = "multi_thread")]
async fn dependency_changes_are_replicated_again() {
    init_test_tracing();

    let dir = tempdir().unwrap();
    let state_path = dir.path().join("state.json");

    let source = MockSource::new();
    source
        .upsert_film_works([source_row("fw-1", "2021-01-01 00:00:00")])
        .await;
    let destination = FlakyDestination::new();
    let first_delivery = destination.wait_for_documents(1).await;

    let mut pipeline = Pipeline::new(
        test_pipeline_config(&state_path, 100),
        source.clone(),
        JsonFileStorage::new(&state_path),
        destination.clone(),
    );
    pipeline.start().await.unwrap();
    first_delivery.notified().await;

    // A person linked to fw-1 was renamed; the row itself did not change.
    let mut renamed = source_row("fw-1", "2021-01-01 00:00:00");
    if let Some(actors) = renamed.row.actors.as_mut() {
        actors[0].name = "Renamed Actor".to_string();
    }
    let redelivered = destination
        .notify_on_documents(|documents| {
            documents
                .get("fw-1")
                .is_some_and(|document| document.actors[0].name == "Renamed Actor")
        })
        .await;
    source.push_dependency_changes(vec![renamed]).await;
    redelivered.notified().await;

    pipeline.shutdown_and_wait().await.unwrap();

    // The primary watermark is untouched by the dependency sweep.
    let state = read_state(&state_path).await;
    assert_eq!(state[keys::FW_MODIFIED], json!("2021-01-01 00:00:00.000000"));
    assert_eq!(destination.documents().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn outage_redelivers_whole_batch() {
    init_test_tracing();

    let dir = tempdir().unwrap();
    let state_path = dir.path().join("state.json");

    let source = MockSource::new();
    source
        .upsert_film_works([
            source_row("fw-1", "2021-01-01 00:00:00"),
            source_row("fw-2", "2021-01-02 00:00:00"),
        ])
        .await;
    let destination = FlakyDestination::new();
    destination.outage_on("fw-2", 3).await;
    let delivered = destination.wait_for_documents(2).await;

    let mut pipeline = Pipeline::new(
        test_pipeline_config(&state_path, 100),
        source,
        JsonFileStorage::new(&state_path),
        destination.clone(),
    );
    pipeline.start().await.unwrap();
    delivered.notified().await;

    pipeline.shutdown_and_wait().await.unwrap();

    // fw-1 was sent once per cycle: three failed cycles plus the successful one.
    let attempts = destination.attempts().await;
    assert_eq!(attempts.iter().filter(|id| *id == "fw-1").count(), 4);
    assert_eq!(attempts.iter().filter(|id| *id == "fw-2").count(), 4);
    assert_eq!(destination.upserts().await, 5);
    assert_eq!(destination.documents().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn source_outage_is_retried_until_it_recovers() {
    init_test_tracing();

    let dir = tempdir().unwrap();
    let state_path = dir.path().join("state.json");

    let source = MockSource::new();
    source
        .upsert_film_works([source_row("fw-1", "2021-01-01 00:00:00")])
        .await;
    source
        .fail_connects(ErrorKind::SourceConnectionFailed, 3)
        .await;
    source.fail_queries(ErrorKind::SourceQueryFailed, 2).await;
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

    pipeline.shutdown_and_wait().await.unwrap();

    assert!(source.connect_calls().await >= 4);
    assert_eq!(
        read_state(&state_path).await[keys::FW_MODIFIED],
        Value::String("2021-01-01 00:00:00.000000".to_string())
    );
}
