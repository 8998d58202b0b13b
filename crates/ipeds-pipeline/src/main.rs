//! ipeds - download and extract IPEDS data

use anyhow::{bail, Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use ipeds_common::logging::{init_logging, LogConfig, LogLevel, WorkerGuard};
use ipeds_common::PipelineError;
use ipeds_pipeline::config::PipelineConfig;
use ipeds_pipeline::download::{ArchiveFetcher, ArchiveVersion, FetchOutcome, HttpTransfer};
use ipeds_pipeline::extract::{ExtractionOrchestrator, MdbToolsReader, TableExtractor, TableSelection};
use ipeds_pipeline::publish::Publisher;
use ipeds_pipeline::storage::{self, stage_locally, RemoteLocation};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ipeds")]
#[command(author, version, about = "IPEDS pipeline - download and extract IPEDS data")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, global = true)]
    log_level: Option<String>,

    /// Configuration file (default: config/pipeline.toml)
    #[arg(short, long, global = true, env = "IPEDS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the archive for one academic year
    Download {
        /// Academic year, e.g. 2023
        year: u16,

        /// Data version: final, provisional or revised
        #[arg(short = 'v', long = "version", default_value = "final")]
        archive_version: ArchiveVersion,

        /// Re-download even if the archive is already stored
        #[arg(short, long)]
        force: bool,
    },

    /// Extract tables from an IPEDS Access database
    Extract {
        /// Path to the MDB/ACCDB file, or an s3:// / gs:// object location
        file: PathBuf,

        /// Extract only this table
        #[arg(short, long)]
        table: Option<String>,

        /// Directory for the Parquet files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Regex for tables to include (matched from the start of the name)
        #[arg(short, long)]
        include: Option<String>,

        /// Regex for tables to exclude (matched from the start of the name)
        #[arg(short, long)]
        exclude: Option<String>,

        /// Skip uploading results
        #[arg(long = "no-upload")]
        no_upload: bool,
    },

    /// List all tables in an IPEDS Access database
    ListTables {
        /// Path to the MDB/ACCDB file, or an s3:// / gs:// object location
        file: PathBuf,
    },

    /// Show configuration and check storage access
    Info,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(cli.log_level.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        },
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind = e
                .downcast_ref::<PipelineError>()
                .map(PipelineError::kind)
                .unwrap_or("internal");
            error!(kind, "{:#}", e);
            eprintln!("Error [{}]: {:#}", kind, e);
            ExitCode::FAILURE
        },
    }
}

fn setup_logging(level: Option<&str>) -> Result<Option<WorkerGuard>> {
    let mut config = LogConfig::from_env()?;
    if let Some(level) = level {
        config = config.with_level(level.parse::<LogLevel>()?);
    }
    init_logging(&config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Download {
            year,
            archive_version,
            force,
        } => download(&config, year, archive_version, force).await,
        Command::Extract {
            file,
            table,
            output_dir,
            include,
            exclude,
            no_upload,
        } => {
            let options = ExtractOptions {
                table,
                output_dir,
                include,
                exclude,
                upload: !no_upload,
            };
            extract(&config, &file, options).await
        },
        Command::ListTables { file } => list_tables(&config, &file).await,
        Command::Info => show_info(&config).await,
    }
}

fn upload_timeout(config: &PipelineConfig) -> Duration {
    Duration::from_secs(config.storage.upload_timeout_secs)
}

async fn download(config: &PipelineConfig, year: u16, version: ArchiveVersion, force: bool) -> Result<()> {
    let current_year = chrono::Utc::now().year();
    if !(2000..=current_year).contains(&i32::from(year)) {
        bail!(PipelineError::configuration(format!(
            "Year must be between 2000 and {}",
            current_year
        )));
    }

    let store = storage::connect(&config.storage).await?;
    let publisher = Publisher::new(store, upload_timeout(config));
    let transfer = HttpTransfer::new(config.downloader.transfer_options(), config.downloader.retry_policy())?;
    let fetcher = ArchiveFetcher::new(&config.source.base_url, &config.paths.temp_dir, transfer, publisher);

    println!("Downloading IPEDS data for year {} (version: {})", year, version);

    match fetcher.fetch_archive(year, version, force).await? {
        FetchOutcome::Exists { location, .. } => {
            println!("File already exists in storage: {}", location);
            println!("Use --force to re-download");
        },
        FetchOutcome::Success { record, location } => {
            println!("Download successful!");
            println!("  File: {}", record.filename);
            println!("  Size: {} bytes", record.file_size_bytes);
            println!("  SHA-256: {}", record.checksum_sha256);
            println!("  Duration: {:.1} seconds", record.download_duration_seconds);
            println!("  Location: {}", location);
        },
    }

    Ok(())
}

struct ExtractOptions {
    table: Option<String>,
    output_dir: Option<PathBuf>,
    include: Option<String>,
    exclude: Option<String>,
    upload: bool,
}

async fn table_extractor(config: &PipelineConfig) -> Result<TableExtractor> {
    let reader = MdbToolsReader::detect().await?;
    Ok(TableExtractor::new(
        Arc::new(reader),
        config.extractor.compression,
        &config.paths.temp_dir,
    ))
}

/// Local path of the container, copying it from object storage first when
/// `file` is a bucket location
async fn resolve_container(config: &PipelineConfig, file: &Path) -> Result<PathBuf> {
    let Some(location) = file.to_str().and_then(RemoteLocation::parse) else {
        return Ok(file.to_path_buf());
    };

    let mut storage_config = config.storage.clone();
    storage_config.bucket = location.bucket.clone();
    let store = storage::connect(&storage_config).await?;

    println!("Downloading {}...", store.uri(&location.key));
    let local = stage_locally(
        store.as_ref(),
        &location.key,
        &config.paths.temp_dir,
        upload_timeout(config),
    )
    .await?;
    println!("Downloaded to {}", local.display());
    Ok(local)
}

async fn extract(config: &PipelineConfig, file: &Path, options: ExtractOptions) -> Result<()> {
    let selection = TableSelection::new(options.include.as_deref(), options.exclude.as_deref())?;
    let extractor = table_extractor(config).await?;
    let file = resolve_container(config, file).await?;
    let file = file.as_path();

    if let Some(table) = options.table {
        println!("Extracting table '{}'...", table);
        let output = options
            .output_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.parquet", table)));
        let record = extractor.extract_table(file, &table, output.as_deref()).await?;

        println!("Extracted {}:", table);
        println!("  Rows: {}", record.row_count);
        println!("  Columns: {}", record.column_count);
        println!("  Size: {} bytes", record.artifact_size_bytes);
        return Ok(());
    }

    println!("Extracting all tables from {}...", file.display());
    let orchestrator = ExtractionOrchestrator::new(extractor);
    let mut manifest = orchestrator
        .extract_all(file, &selection, options.output_dir.as_deref())
        .await?;

    println!("Extraction complete:");
    println!("  Total tables: {}", manifest.total_tables);
    println!("  Extracted: {}", manifest.extracted_tables);
    println!("  Skipped: {}", manifest.skipped_tables.len());
    println!("  Failed: {}", manifest.failed_tables.len());
    println!("  Rows: {}", manifest.total_rows());
    println!("  Size: {} bytes", manifest.total_artifact_bytes());
    println!("  Duration: {:.1} seconds", manifest.total_duration_seconds);
    for table in &manifest.failed_tables {
        println!("  - failed: {}", table);
    }

    let Some(output_dir) = options.output_dir.filter(|_| options.upload) else {
        return Ok(());
    };

    let Some(year) = year_from_filename(file) else {
        println!("Could not determine year from filename; skipping upload");
        return Ok(());
    };

    let store = storage::connect(&config.storage).await?;
    let publisher = Publisher::new(store, upload_timeout(config));
    let result = publisher
        .publish_extraction(&output_dir, &mut manifest, &year.to_string())
        .await?;

    println!("Uploaded {} files", result.uploaded_locations.len());
    println!("  Manifest: {}", result.manifest_location);
    Ok(())
}

/// Year from an `IPEDS<yyyy>` fragment of the file name
fn year_from_filename(file: &Path) -> Option<u16> {
    let name = file.file_name()?.to_string_lossy();
    let pattern = Regex::new(r"IPEDS(\d{4})").ok()?;
    pattern.captures(&name)?.get(1)?.as_str().parse().ok()
}

async fn list_tables(config: &PipelineConfig, file: &Path) -> Result<()> {
    let extractor = table_extractor(config).await?;
    let file = resolve_container(config, file).await?;
    let mut tables = extractor.list_tables(&file).await?;
    tables.sort();

    println!("Found {} tables:", tables.len());
    for table in tables {
        println!("  {}", table);
    }
    Ok(())
}

async fn show_info(config: &PipelineConfig) -> Result<()> {
    println!("IPEDS Pipeline Configuration");
    println!("  Base URL: {}", config.source.base_url);
    println!("  Temp dir: {}", config.paths.temp_dir.display());
    println!("  Storage backend: {:?}", config.storage.backend);
    println!("  Bucket: {}", config.storage.bucket_name());
    println!("  Compression: {}", config.extractor.compression);
    println!(
        "  Downloader: timeout {}s, {} attempts, backoff {}",
        config.downloader.timeout_secs, config.downloader.retry_attempts, config.downloader.backoff_factor
    );

    let store = storage::connect(&config.storage)
        .await
        .context("Failed to initialize storage client")?;
    match store.list_some("", 1).await {
        Ok(_) => println!("Storage access verified: {}", store.uri("")),
        Err(e) => println!("Storage access failed: {}", e),
    }

    info!("Info command finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_from_filename() {
        assert_eq!(year_from_filename(Path::new("/data/IPEDS2022_23.accdb")), Some(2022));
        assert_eq!(year_from_filename(Path::new("IPEDS202122.accdb")), Some(2021));
        assert_eq!(year_from_filename(Path::new("hd2022.accdb")), None);
    }

    #[tokio::test]
    async fn test_local_container_is_used_in_place() {
        let config = PipelineConfig::default();
        let file = Path::new("/data/IPEDS202223.accdb");
        let resolved = resolve_container(&config, file).await;
        assert!(matches!(resolved, Ok(path) if path == file));
    }

    #[test]
    fn test_cli_accepts_bucket_location() {
        let cli = Cli::try_parse_from(["ipeds", "list-tables", "gs://ipeds-raw/2022/IPEDS202223.accdb"]);
        let Ok(Cli {
            command: Command::ListTables { file },
            ..
        }) = cli
        else {
            panic!("list-tables arguments should parse");
        };
        assert!(file.to_str().and_then(RemoteLocation::parse).is_some());
    }

    #[test]
    fn test_cli_parses_download() {
        let cli = Cli::try_parse_from(["ipeds", "download", "2023", "--version", "provisional", "--force"]);
        let Ok(cli) = cli else {
            panic!("download arguments should parse");
        };
        match cli.command {
            Command::Download {
                year,
                archive_version,
                force,
            } => {
                assert_eq!(year, 2023);
                assert_eq!(archive_version, ArchiveVersion::Provisional);
                assert!(force);
            },
            other => panic!("unexpected command {:?}", other),
        }
    }
}
