mod common;

use retail_etl::config::EtlConfig;
use retail_etl::error::EtlError;
use retail_etl::pipeline::storage::{DocumentCollection, InMemoryCollection, SqliteCollection};
use retail_etl::pipeline::PipelineOrchestrator;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn config_in(dir: &Path) -> EtlConfig {
    let mut config = EtlConfig::default();
    config.data_dir = dir.join("data");
    config.log_dir = dir.join("logs");
    config.store.database_path = dir.join("retail.db");
    config.loader.chunk_size = 3;
    config
}

fn write_raw(config: &EtlConfig, contents: &str) {
    fs::create_dir_all(&config.data_dir).unwrap();
    fs::write(config.raw_path(), contents).unwrap();
}

#[tokio::test]
async fn test_stage_by_stage_run_against_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    write_raw(&config, &common::sample_raw_csv());

    let collection = Arc::new(
        SqliteCollection::open(&config.store.database_path, &config.store.collection).unwrap(),
    );
    let orchestrator = PipelineOrchestrator::new(config.clone()).with_collection(collection.clone());

    let cleaned = orchestrator.clean().unwrap();
    assert_eq!(cleaned.normalize.rows, 8);
    assert_eq!(cleaned.normalize.descriptions_imputed, 1);
    assert_eq!(cleaned.normalize.customer_ids_defaulted, 1);
    assert_eq!(cleaned.dedupe.dropped, 1);
    assert!(config.cleaned_path().exists());

    // the blank description on 85123A takes the most frequent one
    let imputed = cleaned
        .rows
        .iter()
        .find(|r| r.invoice_no == "536366")
        .unwrap();
    assert_eq!(
        imputed.description.as_deref(),
        Some("WHITE HANGING HEART T-LIGHT HOLDER")
    );

    let enriched = orchestrator.transform().unwrap();
    assert_eq!(enriched.len(), 7);
    let transformed = fs::read_to_string(config.transformed_path()).unwrap();
    assert!(transformed.lines().next().unwrap().ends_with("TotalPrice"));
    assert!(transformed.contains("C536379"));
    assert!(transformed.contains("-27.50"));

    let totals = orchestrator.load().await.unwrap();
    assert_eq!(totals.inserted, 7);
    assert_eq!(totals.duplicates, 0);
    assert_eq!(totals.batches, 3);
    assert_eq!(collection.count_documents().await.unwrap(), 7);
}

#[tokio::test]
async fn test_rerun_against_same_database_only_counts_duplicates() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    write_raw(&config, &common::sample_raw_csv());

    {
        let collection = Arc::new(
            SqliteCollection::open(&config.store.database_path, &config.store.collection)
                .unwrap(),
        );
        let summary = PipelineOrchestrator::new(config.clone())
            .with_collection(collection)
            .run()
            .await
            .unwrap();
        assert_eq!(summary.inserted, 7);
        assert_eq!(summary.duplicates, 0);
    }

    let reopened = Arc::new(
        SqliteCollection::open(&config.store.database_path, &config.store.collection).unwrap(),
    );
    let summary = PipelineOrchestrator::new(config.clone())
        .with_collection(reopened.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.rows_read, 8);
    assert_eq!(summary.rows_after_dedupe, 7);
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.duplicates, 7);
    assert_eq!(reopened.count_documents().await.unwrap(), 7);
    assert!(summary.notification_message().contains("0 new documents"));
}

#[tokio::test]
async fn test_single_process_run_with_in_memory_collection() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config_in(temp_dir.path());
    config.loader.chunk_size = 1;
    config.loader.workers = 3;
    write_raw(&config, &common::sample_raw_csv());

    let collection = InMemoryCollection::new("retail_transactions");
    let summary = PipelineOrchestrator::new(config.clone())
        .with_collection(Arc::new(collection.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.inserted, 7);
    assert_eq!(summary.descriptions_imputed, 1);
    assert!(config.cleaned_path().exists());
    assert!(config.transformed_path().exists());

    let documents = collection.documents();
    let orphan = documents
        .iter()
        .find(|d| d.invoice_no == "536414")
        .unwrap();
    assert_eq!(orphan.description, None);
    assert_eq!(orphan.customer_id, "nan");
}

#[tokio::test]
async fn test_malformed_quantity_stops_before_cleaned_artifact() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    let contents = format!(
        "{}536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,six,12/1/2010 8:26,2.55,17850,United Kingdom\n",
        common::RAW_HEADER
    );
    write_raw(&config, &contents);

    let orchestrator = PipelineOrchestrator::new(config.clone());
    let err = orchestrator.clean().unwrap_err();

    assert!(matches!(err, EtlError::MalformedInput { line: 2, .. }));
    assert!(!config.cleaned_path().exists());
}

#[tokio::test]
async fn test_load_without_collection_is_a_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    write_raw(&config, &common::sample_raw_csv());

    let orchestrator = PipelineOrchestrator::new(config);
    orchestrator.clean().unwrap();
    orchestrator.transform().unwrap();

    let err = orchestrator.load().await.unwrap_err();
    assert!(matches!(err, EtlError::Config(_)));
}
