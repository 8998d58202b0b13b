//! Table extraction and orchestration tests with a canned legacy reader

mod common;

use common::{institutions_csv, FakeReader};
use ipeds_pipeline::extract::{Compression, DataType, ExtractionOrchestrator, TableExtractor, TableSelection};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A container path that exists; the fake reader never opens it
fn container(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("IPEDS202223.accdb");
    std::fs::write(&path, b"not really access").unwrap();
    path
}

fn extractor(reader: FakeReader, dir: &TempDir) -> TableExtractor {
    TableExtractor::new(Arc::new(reader), Compression::Snappy, dir.path().join("scratch"))
}

#[tokio::test]
async fn test_extract_table_infers_schema() {
    let dir = TempDir::new().unwrap();
    let mdb = container(&dir);
    let extractor = extractor(FakeReader::new().with_table("HD2022", institutions_csv()), &dir);

    let output = dir.path().join("out").join("HD2022.parquet");
    let record = extractor.extract_table(&mdb, "HD2022", Some(output.as_path())).await.unwrap();

    assert_eq!(record.table_name, "HD2022");
    assert_eq!(record.row_count, 2);
    assert_eq!(record.column_count, 5);
    assert!(record.storage_location.is_empty());

    let described: Vec<(&str, DataType, bool)> = record
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.data_type, c.nullable))
        .collect();
    assert_eq!(
        described,
        vec![
            ("UNITID", DataType::Integer, false),
            ("INSTNM", DataType::String, false),
            ("Open_Date", DataType::Date, false),
            ("Tuition_2022", DataType::Float, true),
            ("IS_PUBLIC", DataType::Boolean, false),
        ]
    );

    let on_disk = std::fs::metadata(&output).unwrap().len();
    assert!(on_disk > 0);
    assert_eq!(record.artifact_size_bytes, on_disk);
}

#[tokio::test]
async fn test_extract_table_defaults_to_scratch_dir() {
    let dir = TempDir::new().unwrap();
    let mdb = container(&dir);
    let extractor = extractor(FakeReader::new().with_table("IC2022", institutions_csv()), &dir);

    extractor.extract_table(&mdb, "IC2022", None).await.unwrap();
    assert!(dir.path().join("scratch/extraction/IC2022.parquet").exists());
}

#[tokio::test]
async fn test_missing_container_is_not_found() {
    let dir = TempDir::new().unwrap();
    let extractor = extractor(FakeReader::new().with_table("HD2022", institutions_csv()), &dir);
    let missing = dir.path().join("IPEDS1990.accdb");

    assert_eq!(extractor.list_tables(&missing).await.unwrap_err().kind(), "not_found");
    assert_eq!(
        extractor.extract_table(&missing, "HD2022", None).await.unwrap_err().kind(),
        "not_found"
    );
}

#[tokio::test]
async fn test_zero_row_table_is_empty_table_error() {
    let dir = TempDir::new().unwrap();
    let mdb = container(&dir);
    let extractor = extractor(FakeReader::new().with_table("Tables22", "TableName,Description\n"), &dir);

    let err = extractor.extract_table(&mdb, "Tables22", None).await.unwrap_err();
    assert_eq!(err.kind(), "empty_table");
}

#[tokio::test]
async fn test_reader_failure_is_extraction_error() {
    let dir = TempDir::new().unwrap();
    let mdb = container(&dir);
    let extractor = extractor(FakeReader::new().with_broken_table("EF2022A", "mdb-export crashed"), &dir);

    let err = extractor.extract_table(&mdb, "EF2022A", None).await.unwrap_err();
    assert_eq!(err.kind(), "extraction");
    assert!(err.to_string().contains("mdb-export crashed"));
}

#[tokio::test]
async fn test_extract_all_partitions_and_tolerates_failures() {
    let dir = TempDir::new().unwrap();
    let mdb = container(&dir);
    let reader = FakeReader::new()
        .with_table("HD2022", institutions_csv())
        .with_table("IC2022", institutions_csv())
        .with_table("IC2022_AY", institutions_csv())
        .with_table("EF2022A", institutions_csv())
        .with_table("FLAGS2022", institutions_csv())
        .with_table("Tables22", "TableName,Description\n");
    let orchestrator = ExtractionOrchestrator::new(extractor(reader, &dir));

    // include matches 4 of 6, exclude removes 1 of those
    let selection = TableSelection::new(Some("HD|IC|Tables"), Some("IC2022_")).unwrap();
    let output_dir = dir.path().join("parquet");
    let manifest = orchestrator
        .extract_all(&mdb, &selection, Some(output_dir.as_path()))
        .await
        .unwrap();

    assert_eq!(manifest.total_tables, 6);
    assert_eq!(manifest.extracted_tables + manifest.failed_tables.len(), 3);
    assert_eq!(manifest.skipped_tables, vec!["IC2022_AY", "EF2022A", "FLAGS2022"]);
    assert_eq!(manifest.failed_tables, vec!["Tables22"]);
    assert_eq!(manifest.extracted_tables, 2);
    assert!(manifest.is_consistent());

    let extracted: Vec<&str> = manifest.table_metadata.iter().map(|t| t.table_name.as_str()).collect();
    assert_eq!(extracted, vec!["HD2022", "IC2022"]);
    assert!(output_dir.join("HD2022.parquet").exists());
    assert!(output_dir.join("IC2022.parquet").exists());
    assert!(!output_dir.join("Tables22.parquet").exists());
    assert_eq!(manifest.total_rows(), 4);

    let on_disk: u64 = ["HD2022", "IC2022"]
        .iter()
        .map(|t| std::fs::metadata(output_dir.join(format!("{}.parquet", t))).unwrap().len())
        .sum();
    assert_eq!(manifest.total_artifact_bytes(), on_disk);
}

#[tokio::test]
async fn test_extract_all_continues_after_reader_failure() {
    let dir = TempDir::new().unwrap();
    let mdb = container(&dir);
    let reader = FakeReader::new()
        .with_broken_table("C2022_A", "corrupt page")
        .with_table("HD2022", institutions_csv());
    let orchestrator = ExtractionOrchestrator::new(extractor(reader, &dir));

    let manifest = orchestrator.extract_all(&mdb, &TableSelection::all(), None).await.unwrap();

    assert_eq!(manifest.failed_tables, vec!["C2022_A"]);
    assert_eq!(manifest.extracted_tables, 1);
    assert!(manifest.skipped_tables.is_empty());
    assert!(manifest.is_consistent());
    assert!(orchestrator
        .default_output_dir(&mdb)
        .join("HD2022.parquet")
        .exists());
}

#[tokio::test]
async fn test_extract_all_on_missing_container_fails() {
    let dir = TempDir::new().unwrap();
    let orchestrator = ExtractionOrchestrator::new(extractor(FakeReader::new(), &dir));

    let err = orchestrator
        .extract_all(&dir.path().join("missing.accdb"), &TableSelection::all(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
