//! Parquet read/write for staged partitions and mart tables
//!
//! Uses Arrow record batches for columnar storage. Staged raw records have a
//! fixed schema; daily and summary tables derive theirs from the table's
//! column list (numbers as Float64, text as Utf8, dates as Date32).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::*;
use arrow::datatypes::{DataType, Date32Type, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{debug, info, warn};

use crate::error::{HealthlakeError, Result};
use crate::models::{
    Column, DailyRow, DailyTable, Domain, MetricValue, NaturalKey, RawRecord, SummaryTable, ValueKind,
};
use crate::transform::{deduplicate, ExerciseRecord, QualityReport};

use super::partitions::{Dataset, MartTable};

/// Parquet storage rooted at the data directory
#[derive(Debug, Clone)]
pub struct ParquetStore {
    base_path: PathBuf,
}

impl ParquetStore {
    /// Create a new ParquetStore at the given base path
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Get the full path for a partition file
    pub fn partition_path(&self, dataset: Dataset, partition_key: &str) -> PathBuf {
        self.base_path.join(dataset.relative_path(partition_key))
    }

    /// Path of a mart table file
    pub fn mart_path(&self, dataset: Dataset) -> PathBuf {
        match dataset {
            Dataset::Mart(table) | Dataset::RecentMart(table) => {
                self.partition_path(dataset, table.name())
            }
            _ => self.base_path.join(dataset.dir_name()),
        }
    }

    /// Ensure the directory for a dataset exists
    fn ensure_dir(&self, dataset: Dataset) -> Result<()> {
        let dir = self.base_path.join(dataset.dir_name());
        fs::create_dir_all(&dir).map_err(|e| {
            HealthlakeError::storage(format!("Failed to create directory {:?}: {}", dir, e))
        })
    }

    /// Write a record batch to a partition file atomically
    fn write_batch(&self, path: &Path, batch: &RecordBatch) -> Result<()> {
        // Write to temp file first
        let temp_path = path.with_extension("parquet.tmp");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                HealthlakeError::storage(format!("Failed to create directory: {}", e))
            })?;
        }

        let file = File::create(&temp_path)
            .map_err(|e| HealthlakeError::storage(format!("Failed to create temp file: {}", e)))?;

        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(Default::default()))
            .build();

        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props)).map_err(|e| {
            HealthlakeError::storage(format!("Failed to create Parquet writer: {}", e))
        })?;

        writer
            .write(batch)
            .map_err(|e| HealthlakeError::storage(format!("Failed to write batch: {}", e)))?;

        writer
            .close()
            .map_err(|e| HealthlakeError::storage(format!("Failed to close writer: {}", e)))?;

        // Atomic rename
        fs::rename(&temp_path, path)
            .map_err(|e| HealthlakeError::storage(format!("Failed to rename temp file: {}", e)))?;

        Ok(())
    }

    /// Read the schema and all record batches of a file
    fn read_table(&self, path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
        let file = File::open(path)
            .map_err(|e| HealthlakeError::storage(format!("Failed to open file: {}", e)))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| HealthlakeError::storage(format!("Failed to create reader: {}", e)))?;
        let schema = builder.schema().clone();

        let reader = builder
            .build()
            .map_err(|e| HealthlakeError::storage(format!("Failed to build reader: {}", e)))?;

        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| HealthlakeError::storage(format!("Failed to read batches: {}", e)))?;

        Ok((schema, batches))
    }

    /// Read all record batches from a partition file
    fn read_batches(&self, path: &Path) -> Result<Vec<RecordBatch>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(self.read_table(path)?.1)
    }

    /// Row count from the file footer, without decoding data pages
    pub fn count_rows(&self, path: &Path) -> Result<usize> {
        let file = File::open(path)
            .map_err(|e| HealthlakeError::storage(format!("Failed to open file: {}", e)))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| HealthlakeError::storage(format!("Failed to create reader: {}", e)))?;
        Ok(builder.metadata().file_metadata().num_rows().max(0) as usize)
    }

    // =========================================================================
    // Staged raw records
    // =========================================================================

    /// Partition files of a staged domain, in key order
    pub fn staged_partitions(&self, domain: Domain) -> Result<Vec<PathBuf>> {
        let dir = self.base_path.join(Dataset::Staged(domain).dir_name());
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "parquet"))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Upsert records into monthly partitions.
    ///
    /// Each affected partition is read back, merged with the incoming
    /// records and deduplicated again, so a redelivered or updated record
    /// replaces its predecessor under the usual tie-break. Records without a
    /// date cannot be partitioned and are counted as malformed. Returns the
    /// number of rows in the rewritten partitions.
    pub fn upsert_staged(
        &self,
        domain: Domain,
        records: Vec<RawRecord>,
        report: &mut QualityReport,
    ) -> Result<usize> {
        let dataset = Dataset::Staged(domain);
        self.ensure_dir(dataset)?;

        let mut partitions: BTreeMap<String, Vec<RawRecord>> = BTreeMap::new();
        for record in records {
            match record.date {
                Some(date) => partitions
                    .entry(dataset.partition_key(date))
                    .or_default()
                    .push(record),
                None => {
                    report.malformed += 1;
                    warn!(%domain, key = %record.key, "Record has no date; not staged");
                }
            }
        }

        let mut written = 0;
        for (key, incoming) in partitions {
            let path = self.partition_path(dataset, &key);
            let mut merged = self.read_records_from_path(&path)?;
            let existing = merged.len();
            merged.extend(incoming);

            let survivors = deduplicate(merged, report);
            let batch = Self::records_to_batch(&survivors)?;
            self.write_batch(&path, &batch)?;

            debug!(%domain, partition = %key, existing, rows = survivors.len(), "Upserted staged partition");
            written += survivors.len();
        }

        info!(%domain, rows = written, "Staged records");
        Ok(written)
    }

    /// All staged records of a domain
    pub fn read_staged(&self, domain: Domain) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        for path in self.staged_partitions(domain)? {
            records.extend(self.read_records_from_path(&path)?);
        }
        Ok(records)
    }

    fn read_records_from_path(&self, path: &Path) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        for batch in self.read_batches(path)? {
            records.extend(Self::batch_to_records(&batch)?);
        }
        Ok(records)
    }

    fn records_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("key", DataType::Utf8, false),
            Field::new("date", DataType::Date32, true),
            Field::new("value", DataType::Utf8, true),
            Field::new("payload", DataType::Utf8, false),
            Field::new("updated_at", DataType::Timestamp(TimeUnit::Microsecond, None), true),
            Field::new("loaded_at", DataType::Timestamp(TimeUnit::Microsecond, None), true),
            Field::new("load_id", DataType::Utf8, true),
        ]))
    }

    fn records_to_batch(records: &[RawRecord]) -> Result<RecordBatch> {
        let key = records
            .iter()
            .map(|r| serde_json::to_string(&r.key))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let value = records
            .iter()
            .map(|r| r.value.as_ref().map(serde_json::to_string).transpose())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let payload = records
            .iter()
            .map(|r| serde_json::to_string(&r.payload))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let date: Date32Array = records
            .iter()
            .map(|r| r.date.map(Date32Type::from_naive_date))
            .collect();
        let updated_at: TimestampMicrosecondArray = records
            .iter()
            .map(|r| r.updated_at.map(|t| t.timestamp_micros()))
            .collect();
        let loaded_at: TimestampMicrosecondArray = records
            .iter()
            .map(|r| r.loaded_at.map(|t| t.timestamp_micros()))
            .collect();
        let load_id: StringArray = records.iter().map(|r| r.load_id.as_deref()).collect();

        RecordBatch::try_new(
            Self::records_schema(),
            vec![
                Arc::new(StringArray::from(key)),
                Arc::new(date),
                Arc::new(StringArray::from(value)),
                Arc::new(StringArray::from(payload)),
                Arc::new(updated_at),
                Arc::new(loaded_at),
                Arc::new(load_id),
            ],
        )
        .map_err(|e| HealthlakeError::storage(format!("Failed to create record batch: {}", e)))
    }

    fn batch_to_records(batch: &RecordBatch) -> Result<Vec<RawRecord>> {
        let key = column::<StringArray>(batch, "key")?;
        let date = column::<Date32Array>(batch, "date")?;
        let value = column::<StringArray>(batch, "value")?;
        let payload = column::<StringArray>(batch, "payload")?;
        let updated_at = column::<TimestampMicrosecondArray>(batch, "updated_at")?;
        let loaded_at = column::<TimestampMicrosecondArray>(batch, "loaded_at")?;
        let load_id = column::<StringArray>(batch, "load_id")?;

        let mut records = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let natural_key: NaturalKey = serde_json::from_str(key.value(i))?;
            let mut record = RawRecord::new(natural_key, serde_json::from_str(payload.value(i))?);
            record.date = date.is_valid(i).then(|| date.value_as_date(i)).flatten();
            record.value = if value.is_valid(i) {
                Some(serde_json::from_str(value.value(i))?)
            } else {
                None
            };
            record.updated_at = timestamp_at(updated_at, i);
            record.loaded_at = timestamp_at(loaded_at, i);
            record.load_id = load_id.is_valid(i).then(|| load_id.value(i).to_string());
            records.push(record);
        }
        Ok(records)
    }

    // =========================================================================
    // Daily tables
    // =========================================================================

    pub fn write_daily_table(&self, dataset: Dataset, table: &DailyTable) -> Result<()> {
        self.ensure_dir(dataset)?;

        let mut fields = vec![
            Field::new("entity", DataType::Utf8, false),
            Field::new("date", DataType::Date32, false),
        ];
        let mut arrays: Vec<ArrayRef> = vec![
            Arc::new(table.rows.iter().map(|r| Some(r.entity.as_str())).collect::<StringArray>()),
            Arc::new(
                table
                    .rows
                    .iter()
                    .map(|r| Some(Date32Type::from_naive_date(r.date)))
                    .collect::<Date32Array>(),
            ),
        ];

        for (idx, column) in table.columns.iter().enumerate() {
            let cells = table.rows.iter().map(|r| r.values.get(idx).and_then(Option::as_ref));
            let (field, array) = metric_column(column, cells);
            fields.push(field);
            arrays.push(array);
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).map_err(|e| {
            HealthlakeError::storage(format!("Failed to create record batch: {}", e))
        })?;
        self.write_batch(&self.mart_path(dataset), &batch)?;

        debug!(table = %table.name, rows = table.rows.len(), "Wrote daily table");
        Ok(())
    }

    pub fn read_daily_table(&self, dataset: Dataset) -> Result<DailyTable> {
        let path = self.mart_path(dataset);
        let name = match dataset {
            Dataset::Mart(table) | Dataset::RecentMart(table) => table.name(),
            _ => return Err(HealthlakeError::invalid_param("not a mart dataset")),
        };
        if !path.exists() {
            return Err(HealthlakeError::NotFound(format!("table '{}'", name)));
        }

        let (schema, batches) = self.read_table(&path)?;
        let columns = metric_columns(&schema, 2)?;
        let mut table = DailyTable::new(name, columns);

        for batch in &batches {
            let entity = column::<StringArray>(batch, "entity")?;
            let date = column::<Date32Array>(batch, "date")?;
            for i in 0..batch.num_rows() {
                let Some(day) = date.value_as_date(i) else {
                    continue;
                };
                table.rows.push(DailyRow {
                    entity: entity.value(i).to_string(),
                    date: day,
                    values: read_metric_cells(batch, &table.columns, 2, i),
                });
            }
        }
        Ok(table)
    }

    // =========================================================================
    // Daily summary
    // =========================================================================

    pub fn write_summary(&self, dataset: Dataset, entity: &str, summary: &SummaryTable) -> Result<()> {
        self.ensure_dir(dataset)?;

        let mut fields = vec![
            Field::new("date", DataType::Date32, false),
            Field::new("entity", DataType::Utf8, false),
        ];
        let mut arrays: Vec<ArrayRef> = vec![
            Arc::new(
                summary
                    .rows
                    .iter()
                    .map(|r| Some(Date32Type::from_naive_date(r.date)))
                    .collect::<Date32Array>(),
            ),
            Arc::new(summary.rows.iter().map(|_| Some(entity)).collect::<StringArray>()),
        ];

        for (idx, column) in summary.columns.iter().enumerate() {
            let cells = summary.rows.iter().map(|r| r.values.get(idx).and_then(Option::as_ref));
            let (field, array) = metric_column(column, cells);
            fields.push(field);
            arrays.push(array);
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).map_err(|e| {
            HealthlakeError::storage(format!("Failed to create record batch: {}", e))
        })?;
        self.write_batch(&self.mart_path(dataset), &batch)?;

        debug!(rows = summary.rows.len(), "Wrote daily summary");
        Ok(())
    }

    // =========================================================================
    // Exercise records
    // =========================================================================

    pub fn write_exercise_records(&self, dataset: Dataset, records: &[ExerciseRecord]) -> Result<()> {
        self.ensure_dir(dataset)?;

        let exercise: StringArray = records.iter().map(|r| Some(r.exercise.as_str())).collect();
        let date: Date32Array = records
            .iter()
            .map(|r| Some(Date32Type::from_naive_date(r.date)))
            .collect();
        let workout_id: StringArray = records.iter().map(|r| Some(r.workout_id.as_str())).collect();
        let e1rm: Float64Array = records.iter().map(|r| Some(r.e1rm_kg)).collect();
        let running_max: Float64Array = records.iter().map(|r| Some(r.running_max_kg)).collect();
        let previous: Float64Array = records.iter().map(|r| r.previous_e1rm_kg).collect();
        let delta: Float64Array = records.iter().map(|r| r.delta_kg).collect();
        let is_new_record: BooleanArray = records.iter().map(|r| Some(r.is_new_record)).collect();

        let schema = Arc::new(Schema::new(vec![
            Field::new("exercise", DataType::Utf8, false),
            Field::new("date", DataType::Date32, false),
            Field::new("workout_id", DataType::Utf8, false),
            Field::new("e1rm_kg", DataType::Float64, false),
            Field::new("running_max_kg", DataType::Float64, false),
            Field::new("previous_e1rm_kg", DataType::Float64, true),
            Field::new("delta_kg", DataType::Float64, true),
            Field::new("is_new_record", DataType::Boolean, false),
        ]));

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(exercise),
                Arc::new(date),
                Arc::new(workout_id),
                Arc::new(e1rm),
                Arc::new(running_max),
                Arc::new(previous),
                Arc::new(delta),
                Arc::new(is_new_record),
            ],
        )
        .map_err(|e| HealthlakeError::storage(format!("Failed to create record batch: {}", e)))?;

        self.write_batch(&self.mart_path(dataset), &batch)
    }

    pub fn read_exercise_records(&self, dataset: Dataset) -> Result<Vec<ExerciseRecord>> {
        let path = self.mart_path(dataset);
        if !path.exists() {
            return Err(HealthlakeError::NotFound(format!(
                "table '{}'",
                MartTable::ExerciseRecords.name()
            )));
        }

        let mut records = Vec::new();
        for batch in self.read_batches(&path)? {
            let exercise = column::<StringArray>(&batch, "exercise")?;
            let date = column::<Date32Array>(&batch, "date")?;
            let workout_id = column::<StringArray>(&batch, "workout_id")?;
            let e1rm = column::<Float64Array>(&batch, "e1rm_kg")?;
            let running_max = column::<Float64Array>(&batch, "running_max_kg")?;
            let previous = column::<Float64Array>(&batch, "previous_e1rm_kg")?;
            let delta = column::<Float64Array>(&batch, "delta_kg")?;
            let is_new_record = column::<BooleanArray>(&batch, "is_new_record")?;

            for i in 0..batch.num_rows() {
                let Some(day) = date.value_as_date(i) else {
                    continue;
                };
                records.push(ExerciseRecord {
                    exercise: exercise.value(i).to_string(),
                    date: day,
                    workout_id: workout_id.value(i).to_string(),
                    e1rm_kg: e1rm.value(i),
                    running_max_kg: running_max.value(i),
                    previous_e1rm_kg: previous.is_valid(i).then(|| previous.value(i)),
                    delta_kg: delta.is_valid(i).then(|| delta.value(i)),
                    is_new_record: is_new_record.value(i),
                });
            }
        }
        Ok(records)
    }

    /// Get the base path for external readers
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// Look up a column by name with the expected array type
fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| HealthlakeError::storage(format!("Missing or mistyped column '{}'", name)))
}

fn timestamp_at(array: &TimestampMicrosecondArray, i: usize) -> Option<DateTime<Utc>> {
    array
        .is_valid(i)
        .then(|| DateTime::from_timestamp_micros(array.value(i)))
        .flatten()
}

fn metric_column<'a, I>(column: &Column, cells: I) -> (Field, ArrayRef)
where
    I: Iterator<Item = Option<&'a MetricValue>>,
{
    match column.kind {
        ValueKind::Number => (
            Field::new(&column.name, DataType::Float64, true),
            Arc::new(cells.map(|v| v.and_then(MetricValue::as_f64)).collect::<Float64Array>()),
        ),
        ValueKind::Text => (
            Field::new(&column.name, DataType::Utf8, true),
            Arc::new(cells.map(|v| v.and_then(MetricValue::as_str)).collect::<StringArray>()),
        ),
    }
}

/// Metric columns of a schema, skipping the leading key columns
fn metric_columns(schema: &Schema, skip: usize) -> Result<Vec<Column>> {
    schema
        .fields()
        .iter()
        .skip(skip)
        .map(|field| match field.data_type() {
            DataType::Float64 => Ok(Column::number(field.name())),
            DataType::Utf8 => Ok(Column::text(field.name())),
            other => Err(HealthlakeError::storage(format!(
                "Unsupported metric column type {} for '{}'",
                other,
                field.name()
            ))),
        })
        .collect()
}

fn read_metric_cells(
    batch: &RecordBatch,
    columns: &[Column],
    skip: usize,
    row: usize,
) -> Vec<Option<MetricValue>> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let array = batch.column(idx + skip);
            if array.is_null(row) {
                return None;
            }
            match column.kind {
                ValueKind::Number => array
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .map(|a| MetricValue::Number(a.value(row))),
                ValueKind::Text => array
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .map(|a| MetricValue::Text(a.value(row).to_string())),
            }
        })
        .collect()
}
