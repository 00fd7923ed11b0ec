//! Columnar kline table
//!
//! A thin wrapper over an Arrow [`RecordBatch`] whose first column, `Time`, is
//! the row key (UTC open time, millisecond precision). The remaining columns are
//! `Open`, `High`, `Low`, `Close` and `Volume`.

use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, TimestampMillisecondType};
use arrow_array::{Array, ArrayRef, Float64Array, RecordBatch, TimestampMillisecondArray};
use arrow_cast::cast::cast;
use arrow_schema::{ArrowError, DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use std::sync::Arc;

use crate::compactor::{Compaction, CompactionReport};
use crate::error::Result;
use crate::types::Kline;

/// Name of the row-key column
pub const TIME_COLUMN: &str = "Time";

/// Value columns, in order
pub const VALUE_COLUMNS: [&str; 5] = ["Open", "High", "Low", "Close", "Volume"];

/// Table of klines keyed by open time
#[derive(Debug, Clone)]
pub struct KlineTable {
    batch: RecordBatch,
}

impl KlineTable {
    pub fn time_type() -> DataType {
        DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
    }

    /// Build a table from parsed klines
    pub fn from_klines(klines: &[Kline]) -> Result<Self> {
        let time = TimestampMillisecondArray::from_iter_values(klines.iter().map(|k| k.open_time))
            .with_timezone("UTC");
        let value = |f: fn(&Kline) -> f64| -> ArrayRef {
            Arc::new(Float64Array::from_iter_values(klines.iter().map(f)))
        };

        let schema = Schema::new(vec![
            Field::new(TIME_COLUMN, Self::time_type(), false),
            Field::new(VALUE_COLUMNS[0], DataType::Float64, false),
            Field::new(VALUE_COLUMNS[1], DataType::Float64, false),
            Field::new(VALUE_COLUMNS[2], DataType::Float64, false),
            Field::new(VALUE_COLUMNS[3], DataType::Float64, false),
            Field::new(VALUE_COLUMNS[4], DataType::Float64, false),
        ]);

        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(time) as ArrayRef,
                value(|k| k.open),
                value(|k| k.high),
                value(|k| k.low),
                value(|k| k.close),
                value(|k| k.volume),
            ],
        )?;

        Ok(KlineTable { batch })
    }

    /// Wrap an existing batch. The first column must be the `Time` key.
    pub fn from_batch(batch: RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let key = schema
            .fields()
            .first()
            .ok_or_else(|| ArrowError::SchemaError("kline table has no columns".to_string()))?;

        if key.name() != TIME_COLUMN || key.data_type() != &Self::time_type() {
            return Err(ArrowError::SchemaError(format!(
                "first column must be {} {}, found {} {}",
                TIME_COLUMN,
                Self::time_type(),
                key.name(),
                key.data_type()
            ))
            .into());
        }

        Ok(KlineTable { batch })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// Column names after the key
    pub fn value_columns(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .skip(1)
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    fn time_array(&self) -> &TimestampMillisecondArray {
        self.batch.column(0).as_primitive::<TimestampMillisecondType>()
    }

    /// Row keys as UTC date-times
    pub fn index(&self) -> Vec<DateTime<Utc>> {
        self.time_array()
            .values()
            .iter()
            .filter_map(|ms| DateTime::from_timestamp_millis(*ms))
            .collect()
    }

    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.index().first().copied()
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.index().last().copied()
    }

    /// Largest distance between consecutive rows
    pub fn max_gap(&self) -> Option<Duration> {
        self.time_array()
            .values()
            .iter()
            .tuple_windows()
            .map(|(a, b)| Duration::milliseconds(b - a))
            .max()
    }

    /// Read a value column as f64 regardless of its storage width
    pub fn values_f64(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let column = self
            .column(name)
            .ok_or_else(|| ArrowError::SchemaError(format!("no column named {}", name)))?;
        let widened = match column.data_type() {
            DataType::Dictionary(_, value_type) => {
                let dense = cast(column, value_type)?;
                cast(&dense, &DataType::Float64)?
            }
            _ => cast(column, &DataType::Float64)?,
        };
        Ok(widened.as_primitive::<Float64Type>().iter().collect())
    }

    /// Heap bytes held by the table's arrays
    pub fn memory_usage(&self) -> usize {
        self.batch.get_array_memory_size()
    }

    /// Run a compaction strategy over the table
    pub fn compact(self, compaction: &dyn Compaction) -> Result<(Self, CompactionReport)> {
        let compacted = compaction.compact(self.batch);
        Ok((Self::from_batch(compacted.batch)?, compacted.report))
    }
}
