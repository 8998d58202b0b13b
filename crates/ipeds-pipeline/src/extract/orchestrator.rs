// Whole-container extraction

use chrono::Utc;
use ipeds_common::{PipelineError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, instrument};

use super::models::ExtractionManifest;
use super::table::TableExtractor;

/// Include/exclude rules, each matched from the start of the table name
#[derive(Debug, Clone, Default)]
pub struct TableSelection {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl TableSelection {
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self> {
        Ok(Self {
            include: include.map(anchored).transpose()?,
            exclude: exclude.map(anchored).transpose()?,
        })
    }

    pub fn all() -> Self {
        Self::default()
    }

    /// Included unless the include rule misses or the exclude rule hits
    pub fn is_selected(&self, table: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(table) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(table) {
                return false;
            }
        }
        true
    }

    /// Split into (selected, skipped), both in listing order
    pub fn partition(&self, tables: &[String]) -> (Vec<String>, Vec<String>) {
        tables.iter().cloned().partition(|t| self.is_selected(t))
    }
}

fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})", pattern))
        .map_err(|e| PipelineError::configuration(format!("Invalid table pattern '{}': {}", pattern, e)))
}

/// Runs every selected table of a container through a [`TableExtractor`]
pub struct ExtractionOrchestrator {
    extractor: TableExtractor,
}

impl ExtractionOrchestrator {
    pub fn new(extractor: TableExtractor) -> Self {
        Self { extractor }
    }

    /// Default artifact directory for a container: `<scratch>/extraction/<stem>`
    pub fn default_output_dir(&self, container: &Path) -> PathBuf {
        let stem = container
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "container".to_string());
        self.extractor.scratch_dir().join("extraction").join(stem)
    }

    /// Extract every selected table sequentially.
    ///
    /// Only listing failures abort the run. A table that fails to extract is
    /// recorded in `failed_tables` and the run continues.
    #[instrument(skip(self, selection))]
    pub async fn extract_all(
        &self,
        container: &Path,
        selection: &TableSelection,
        output_dir: Option<&Path>,
    ) -> Result<ExtractionManifest> {
        let started = Instant::now();
        let extraction_timestamp = Utc::now();

        let all_tables = self.extractor.list_tables(container).await?;
        let (selected, skipped_tables) = selection.partition(&all_tables);
        info!("Extracting {} tables, skipping {}", selected.len(), skipped_tables.len());

        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => self.default_output_dir(container),
        };
        tokio::fs::create_dir_all(&output_dir).await?;

        let mut table_metadata = Vec::with_capacity(selected.len());
        let mut failed_tables = Vec::new();

        for table in selected {
            let output = output_dir.join(format!("{}.parquet", table));
            match self.extractor.extract_table(container, &table, Some(output.as_path())).await {
                Ok(record) => table_metadata.push(record),
                Err(e) => {
                    error!(kind = e.kind(), "Failed to extract table '{}': {}", table, e);
                    failed_tables.push(table);
                },
            }
        }

        let manifest = ExtractionManifest {
            source_file: container.display().to_string(),
            extraction_timestamp,
            total_tables: all_tables.len(),
            extracted_tables: table_metadata.len(),
            skipped_tables,
            failed_tables,
            table_metadata,
            total_duration_seconds: started.elapsed().as_secs_f64(),
        };

        info!(
            "Extraction complete: {} tables extracted, {} failed, {} skipped",
            manifest.extracted_tables,
            manifest.failed_tables.len(),
            manifest.skipped_tables.len()
        );

        Ok(manifest)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_include_is_anchored_at_start() {
        let selection = TableSelection::new(Some("HD"), None).unwrap();
        assert!(selection.is_selected("HD2022"));
        assert!(!selection.is_selected("FLAGSHD2022"));
    }

    #[test]
    fn test_exclude_after_include() {
        let selection = TableSelection::new(Some("HD|IC"), Some("IC2022_")).unwrap();
        let (selected, skipped) = selection.partition(&names(&["HD2022", "IC2022", "IC2022_AY", "EF2022A"]));
        assert_eq!(selected, names(&["HD2022", "IC2022"]));
        assert_eq!(skipped, names(&["IC2022_AY", "EF2022A"]));
    }

    #[test]
    fn test_no_rules_selects_everything() {
        let (selected, skipped) = TableSelection::all().partition(&names(&["A", "B"]));
        assert_eq!(selected.len(), 2);
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let err = TableSelection::new(Some("(unclosed"), None).unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }
}
