use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::WriterProperties;

use crate::error::{Result, VerifyError};
use crate::models::{LevelBucket, MetricsRow};
use crate::processors::aggregation_spec::ParamKind;
use crate::utils::constants::{DEFAULT_ROW_GROUP_SIZE, KEY_COLUMN};

pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            "snappy" => Compression::SNAPPY,
            "gzip" => Compression::GZIP(GzipLevel::default()),
            "lz4" => Compression::LZ4,
            "zstd" => Compression::ZSTD(parquet::basic::ZstdLevel::default()),
            "none" => Compression::UNCOMPRESSED,
            _ => {
                return Err(VerifyError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build()
    }

    /// Write the merged metrics table. An empty table still produces a valid
    /// Parquet file carrying the schema and zero rows.
    pub fn write_metrics(
        &self,
        rows: &[MetricsRow],
        kind: ParamKind,
        path: &Path,
    ) -> Result<()> {
        let schema = self.metrics_schema(kind);
        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(self.writer_properties()))?;

        if !rows.is_empty() {
            for chunk in rows.chunks(self.row_group_size) {
                let batch = self.metrics_to_batch(chunk, kind, schema.clone())?;
                writer.write(&batch)?;
            }
        }

        writer.close()?;
        Ok(())
    }

    /// Arrow schema for the metrics table. The level column depends on the
    /// bucketing mode: a bracket label for profile parameters, the raw
    /// channel id for brightness temperature.
    fn metrics_schema(&self, kind: ParamKind) -> Arc<Schema> {
        let level_field = match kind {
            ParamKind::Pressure => Field::new("pressure_bracket", DataType::Utf8, false),
            ParamKind::BrightnessTemperature => Field::new("channel", DataType::Int64, false),
        };

        let fields = vec![
            Field::new(
                "vt_hour",
                DataType::Timestamp(TimeUnit::Second, None),
                false,
            ),
            Field::new("cycle_hour", DataType::UInt32, false),
            level_field,
            Field::new("lead_time", DataType::Int64, true),
            Field::new("fcst_model", DataType::Utf8, true),
            Field::new("n", DataType::UInt64, false),
            Field::new("bias", DataType::Float64, false),
            Field::new("mae", DataType::Float64, false),
            Field::new("rmse", DataType::Float64, false),
            Field::new("experiment", DataType::Utf8, false),
            Field::new("obstypevar", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
        ];

        Arc::new(Schema::new(fields))
    }

    fn metrics_to_batch(
        &self,
        rows: &[MetricsRow],
        kind: ParamKind,
        schema: Arc<Schema>,
    ) -> Result<RecordBatch> {
        let vt_hours: Vec<i64> = rows
            .iter()
            .map(|r| r.group.vt_hour.and_utc().timestamp())
            .collect();
        let cycle_hours: Vec<u32> = rows.iter().map(|r| r.group.cycle_hour).collect();
        let lead_times: Vec<Option<i64>> = rows.iter().map(|r| r.group.lead_time).collect();
        let models: Vec<Option<String>> =
            rows.iter().map(|r| r.group.fcst_model.clone()).collect();
        let counts: Vec<u64> = rows.iter().map(|r| r.n).collect();
        let biases: Vec<f64> = rows.iter().map(|r| r.bias).collect();
        let maes: Vec<f64> = rows.iter().map(|r| r.mae).collect();
        let rmses: Vec<f64> = rows.iter().map(|r| r.rmse).collect();
        let experiments: Vec<String> = rows.iter().map(|r| r.experiment.clone()).collect();
        let obstypevars: Vec<String> = rows.iter().map(|r| r.obstypevar.clone()).collect();
        let sources: Vec<String> = rows.iter().map(|r| r.source.clone()).collect();

        let level_array: ArrayRef = match kind {
            ParamKind::Pressure => {
                let brackets: Vec<String> =
                    rows.iter().map(|r| r.group.level.label()).collect();
                Arc::new(StringArray::from(brackets))
            }
            ParamKind::BrightnessTemperature => {
                let channels: Vec<i64> = rows
                    .iter()
                    .map(|r| match r.group.level {
                        LevelBucket::Channel(channel) => Ok(channel),
                        LevelBucket::Pressure(_) => Err(VerifyError::Config(
                            "pressure bracket row in channel-mode output".to_string(),
                        )),
                    })
                    .collect::<Result<_>>()?;
                Arc::new(Int64Array::from(channels))
            }
        };

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(TimestampSecondArray::from(vt_hours)),
                Arc::new(UInt32Array::from(cycle_hours)),
                level_array,
                Arc::new(Int64Array::from(lead_times)),
                Arc::new(StringArray::from(models)),
                Arc::new(UInt64Array::from(counts)),
                Arc::new(Float64Array::from(biases)),
                Arc::new(Float64Array::from(maes)),
                Arc::new(Float64Array::from(rmses)),
                Arc::new(StringArray::from(experiments)),
                Arc::new(StringArray::from(obstypevars)),
                Arc::new(StringArray::from(sources)),
            ],
        )?;

        Ok(batch)
    }

    /// Persist a key set as the single-column common-key artifact. Keys are
    /// 16-byte little-endian values (Parquet has no unsigned 128-bit integer
    /// type) written in sorted order for a reproducible artifact.
    pub fn write_keys(&self, keys: &HashSet<u128>, path: &Path) -> Result<()> {
        let mut sorted: Vec<u128> = keys.iter().copied().collect();
        sorted.sort_unstable();

        let mut builder = FixedSizeBinaryBuilder::with_capacity(sorted.len(), 16);
        for key in &sorted {
            builder.append_value(key.to_le_bytes())?;
        }
        let array = builder.finish();

        let schema = Arc::new(Schema::new(vec![Field::new(
            KEY_COLUMN,
            DataType::FixedSizeBinary(16),
            false,
        )]));
        let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(array)])?;

        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema, Some(self.writer_properties()))?;
        if batch.num_rows() > 0 {
            writer.write(&batch)?;
        }
        writer.close()?;
        Ok(())
    }

    /// Load a common-key artifact back into a key set.
    pub fn read_keys(&self, path: &Path) -> Result<HashSet<u128>> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut keys = HashSet::new();
        for batch_result in reader {
            let batch = batch_result?;
            let column = batch.column_by_name(KEY_COLUMN).ok_or_else(|| {
                VerifyError::KeyArtifact(format!(
                    "missing '{}' column in {}",
                    KEY_COLUMN,
                    path.display()
                ))
            })?;
            let array = column
                .as_any()
                .downcast_ref::<FixedSizeBinaryArray>()
                .ok_or_else(|| {
                    VerifyError::KeyArtifact(format!(
                        "'{}' column in {} is not 16-byte binary",
                        KEY_COLUMN,
                        path.display()
                    ))
                })?;
            for i in 0..array.len() {
                let bytes: [u8; 16] = array.value(i).try_into().map_err(|_| {
                    VerifyError::KeyArtifact(format!(
                        "key of unexpected width in {}",
                        path.display()
                    ))
                })?;
                keys.insert(u128::from_le_bytes(bytes));
            }
        }

        Ok(keys)
    }

    /// Get file statistics
    pub fn get_file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let file_metadata = metadata.file_metadata();
        let row_groups = metadata.num_row_groups();
        let total_rows = file_metadata.num_rows();
        let file_size = std::fs::metadata(path)?.len();

        Ok(ParquetFileInfo {
            total_rows,
            row_groups: row_groups as i32,
            file_size,
            compression: self.compression,
        })
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: i32,
    pub file_size: u64,
    pub compression: Compression,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} KB\n\
            - Compression: {:?}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1024.0,
            self.compression,
        )
    }
}
