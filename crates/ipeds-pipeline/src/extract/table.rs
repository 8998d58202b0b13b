// Single-table extraction to Parquet

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType as ArrowType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, Utc};
use ipeds_common::{PipelineError, Result};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use super::inference::{infer_column_types, normalize_column_names, parse_date, CellValue, Column};
use super::models::{ColumnDescriptor, DataType, TableExtractionRecord};
use super::reader::LegacyReader;
use super::Compression;

/// Converts tables of one container into Parquet artifacts
pub struct TableExtractor {
    reader: Arc<dyn LegacyReader>,
    compression: Compression,
    scratch_dir: PathBuf,
}

impl TableExtractor {
    /// `scratch_dir` receives artifacts when no output path is given
    pub fn new(reader: Arc<dyn LegacyReader>, compression: Compression, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            compression,
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    #[instrument(skip(self))]
    pub async fn list_tables(&self, container: &Path) -> Result<Vec<String>> {
        ensure_exists(container).await?;
        let tables = self.reader.list_tables(container).await?;
        info!("Found {} tables in {}", tables.len(), display_name(container));
        Ok(tables)
    }

    /// Export `table`, type its columns and write it as Parquet.
    ///
    /// Writes to `<scratch_dir>/extraction/<table>.parquet` unless `output`
    /// is given.
    #[instrument(skip(self, output))]
    pub async fn extract_table(
        &self,
        container: &Path,
        table: &str,
        output: Option<&Path>,
    ) -> Result<TableExtractionRecord> {
        let started = Instant::now();
        ensure_exists(container).await?;

        let output = match output {
            Some(path) => path.to_path_buf(),
            None => self.scratch_dir.join("extraction").join(format!("{}.parquet", table)),
        };
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Extracting table '{}' from {}", table, display_name(container));

        let text = self
            .reader
            .export_table(container, table)
            .await
            .map_err(|e| PipelineError::extraction(table, e.to_string()))?;

        let (columns, row_count) = read_delimited(table, &text)?;
        if row_count == 0 {
            return Err(PipelineError::EmptyTable(table.to_string()));
        }

        let descriptors = infer_column_types(&columns);
        let batch = build_record_batch(table, &columns, &descriptors)?;

        let compression = self.compression;
        let artifact = output.clone();
        let table_name = table.to_string();
        tokio::task::spawn_blocking(move || write_parquet(&table_name, &artifact, &batch, compression))
            .await
            .map_err(|e| PipelineError::extraction(table, e.to_string()))??;

        let artifact_size_bytes = tokio::fs::metadata(&output).await?.len();

        info!("Extracted {}: {} rows, {} columns", table, row_count, descriptors.len());

        Ok(TableExtractionRecord {
            source_file: container.display().to_string(),
            table_name: table.to_string(),
            extraction_timestamp: Utc::now(),
            row_count,
            column_count: descriptors.len(),
            columns: descriptors,
            artifact_size_bytes,
            storage_location: String::new(),
            extraction_duration_seconds: started.elapsed().as_secs_f64(),
        })
    }
}

async fn ensure_exists(container: &Path) -> Result<()> {
    if tokio::fs::try_exists(container).await? {
        Ok(())
    } else {
        Err(PipelineError::not_found(format!("MDB file not found: {}", container.display())))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Parse CSV with a header row into normalized, typed columns
pub fn read_delimited(table: &str, text: &str) -> Result<(Vec<Column>, usize)> {
    if text.trim().is_empty() {
        return Err(PipelineError::EmptyTable(table.to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::extraction(table, format!("unreadable header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    let names = normalize_column_names(&headers);
    let mut fields: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    let mut row_count = 0;

    for record in reader.records() {
        let record = record.map_err(|e| PipelineError::extraction(table, e.to_string()))?;
        for (index, column) in fields.iter_mut().enumerate() {
            column.push(record.get(index).unwrap_or_default().to_string());
        }
        row_count += 1;
    }

    let columns = names
        .into_iter()
        .zip(fields)
        .map(|(name, fields)| Column::from_text(name, fields))
        .collect();

    Ok((columns, row_count))
}

pub fn arrow_type(data_type: DataType) -> ArrowType {
    match data_type {
        DataType::Integer => ArrowType::Int64,
        DataType::Float => ArrowType::Float64,
        DataType::Boolean => ArrowType::Boolean,
        DataType::Timestamp => ArrowType::Timestamp(TimeUnit::Microsecond, None),
        DataType::Date => ArrowType::Date32,
        DataType::String => ArrowType::Utf8,
    }
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    i32::try_from(date.signed_duration_since(epoch).num_days()).unwrap_or(i32::MAX)
}

fn build_array(column: &Column, data_type: DataType) -> (ArrayRef, usize) {
    let values = &column.values;
    let mut unparsed = 0;

    let array: ArrayRef = match data_type {
        DataType::Integer => Arc::new(Int64Array::from_iter(values.iter().map(|v| match v {
            CellValue::Integer(i) => Some(*i),
            _ => None,
        }))),
        DataType::Float => Arc::new(Float64Array::from_iter(values.iter().map(|v| match v {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            _ => None,
        }))),
        DataType::Boolean => Arc::new(BooleanArray::from_iter(values.iter().map(|v| match v {
            CellValue::Boolean(b) => Some(*b),
            _ => None,
        }))),
        DataType::Timestamp => Arc::new(TimestampMicrosecondArray::from_iter(values.iter().map(|v| match v {
            CellValue::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
            _ => None,
        }))),
        DataType::Date => Arc::new(Date32Array::from_iter(column.text_cells().map(|cell| {
            let text = cell?;
            let parsed = parse_date(text).map(days_since_epoch);
            if parsed.is_none() {
                unparsed += 1;
            }
            parsed
        }))),
        // Exported text as-is, so `02139` stays `02139`
        DataType::String => Arc::new(StringArray::from_iter(column.text_cells())),
    };

    (array, unparsed)
}

/// Assemble one Arrow batch; date cells that fail to parse become nulls
pub fn build_record_batch(table: &str, columns: &[Column], descriptors: &[ColumnDescriptor]) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());

    for (column, descriptor) in columns.iter().zip(descriptors) {
        let (array, unparsed) = build_array(column, descriptor.data_type);
        if unparsed > 0 {
            warn!("{}.{}: {} values could not be parsed as dates", table, descriptor.name, unparsed);
        }
        let nullable = descriptor.nullable || unparsed > 0;
        fields.push(Field::new(&descriptor.name, arrow_type(descriptor.data_type), nullable));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, arrays).map_err(|e| PipelineError::extraction(table, e.to_string()))
}

fn write_parquet(table: &str, path: &Path, batch: &RecordBatch, compression: Compression) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(compression.to_parquet())
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| PipelineError::extraction(table, e.to_string()))?;
    writer
        .write(batch)
        .map_err(|e| PipelineError::extraction(table, e.to_string()))?;
    writer
        .close()
        .map_err(|e| PipelineError::extraction(table, e.to_string()))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use arrow::array::Array;

    #[test]
    fn test_read_delimited() {
        let csv = "UNITID,INSTNM,Tuition 2023,OPENED\n100654,\"Alabama A & M University\",9857.5,1875-01-01\n100663,\"University of Alabama at Birmingham\",,\n";
        let (columns, rows) = read_delimited("HD2023", csv).unwrap();
        assert_eq!(rows, 2);
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["UNITID", "INSTNM", "Tuition_2023", "OPENED"]);
        assert_eq!(columns[2].values[1], CellValue::Missing);
    }

    #[test]
    fn test_header_only_is_zero_rows() {
        let (columns, rows) = read_delimited("EMPTY", "A,B\n").unwrap();
        assert_eq!(rows, 0);
        assert_eq!(columns.len(), 2);
        assert_eq!(read_delimited("EMPTY", "  \n").unwrap_err().kind(), "empty_table");
    }

    #[test]
    fn test_record_batch_types_and_bad_dates() {
        let columns = vec![
            Column::new("ID", vec![CellValue::Integer(1), CellValue::Integer(2)]),
            Column::new(
                "OPENED",
                vec![CellValue::Text("2023-02-30".to_string()), CellValue::Text("2023-03-01".to_string())],
            ),
        ];
        let descriptors = vec![
            ColumnDescriptor {
                name: "ID".to_string(),
                data_type: DataType::Integer,
                nullable: false,
            },
            ColumnDescriptor {
                name: "OPENED".to_string(),
                data_type: DataType::Date,
                nullable: false,
            },
        ];

        let batch = build_record_batch("T", &columns, &descriptors).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).data_type(), &ArrowType::Int64);
        assert_eq!(batch.schema().field(1).data_type(), &ArrowType::Date32);

        let dates = batch.column(1).as_any().downcast_ref::<Date32Array>().unwrap();
        assert!(dates.is_null(0));
        assert_eq!(dates.value(1), days_since_epoch(NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()));
    }

    #[test]
    fn test_string_columns_keep_exported_text() {
        let csv = "ZIP,CODE,FLAG,UPDATED\n02139,3.0,TRUE,01/15/23 00:00:00\n35294-0110,abc,x,n/a\n";
        let (columns, _) = read_delimited("HD2022", csv).unwrap();
        let descriptors = infer_column_types(&columns);
        assert!(descriptors.iter().all(|d| d.data_type == DataType::String));

        let batch = build_record_batch("HD2022", &columns, &descriptors).unwrap();
        let text = |index: usize| -> Vec<String> {
            let array = batch.column(index).as_any().downcast_ref::<StringArray>().unwrap();
            (0..array.len()).map(|row| array.value(row).to_string()).collect()
        };
        assert_eq!(text(0), vec!["02139", "35294-0110"]);
        assert_eq!(text(1), vec!["3.0", "abc"]);
        assert_eq!(text(2), vec!["TRUE", "x"]);
        assert_eq!(text(3), vec!["01/15/23 00:00:00", "n/a"]);
    }

    #[test]
    fn test_write_parquet() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("T.parquet");
        let columns = vec![Column::new("NAME", vec![CellValue::Text("a".to_string()), CellValue::Missing])];
        let descriptors = infer_column_types(&columns);
        let batch = build_record_batch("T", &columns, &descriptors).unwrap();

        write_parquet("T", &path, &batch, Compression::Zstd).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PAR1"));
        assert!(bytes.ends_with(b"PAR1"));
    }
}
