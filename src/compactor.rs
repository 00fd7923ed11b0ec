//! Memory compaction for Arrow record batches
//!
//! Every column is retyped independently to the narrowest type that covers the
//! values it actually holds:
//!
//! - a column named `timestamp` becomes a UTC timestamp,
//! - float columns cascade Float16 -> Float32 -> Float64,
//! - integer columns cascade Int8 -> Int16 -> Int32 -> Int64,
//! - date-time and dictionary columns are left alone,
//! - everything else is dictionary-encoded.
//!
//! Range checks are strict (`min > T::MIN && max < T::MAX`), so a column whose
//! values touch a type's limit moves up one width. Compaction is best-effort: a
//! column Arrow cannot cast keeps its original type and no error is raised.
//! Casts never turn out-of-range values into nulls; an overflow fails that
//! column's cast and leaves the column as it was.

use arrow_arith::aggregate::{max, min};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Float16Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::{Array, ArrayRef, ArrowNumericType, RecordBatch};
use arrow_cast::cast::{cast_with_options, CastOptions};
use arrow_schema::{ArrowError, DataType, Field, Schema, TimeUnit};
use half::f16;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Column name that is always converted to a date-time
pub const TIMESTAMP_COLUMN: &str = "timestamp";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Retyping applied to one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChange {
    pub name: String,
    pub from: DataType,
    pub to: DataType,
}

/// Memory footprint before and after a compaction pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompactionReport {
    pub bytes_before: usize,
    pub bytes_after: usize,
    pub changes: Vec<ColumnChange>,
}

impl CompactionReport {
    /// Share of the original footprint that was released, in percent
    pub fn reduction_pct(&self) -> f64 {
        if self.bytes_before == 0 {
            return 0.0;
        }
        (self.bytes_before as f64 - self.bytes_after as f64) / self.bytes_before as f64 * 100.0
    }

    pub fn mb_before(&self) -> f64 {
        self.bytes_before as f64 / BYTES_PER_MB
    }

    pub fn mb_after(&self) -> f64 {
        self.bytes_after as f64 / BYTES_PER_MB
    }
}

/// Output of a compaction pass
#[derive(Debug, Clone)]
pub struct Compacted {
    pub batch: RecordBatch,
    pub report: CompactionReport,
}

/// Strategy applied to freshly built tables
pub trait Compaction: Send + Sync {
    fn compact(&self, batch: RecordBatch) -> Compacted;
}

/// Leaves the batch untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompaction;

impl Compaction for NoCompaction {
    fn compact(&self, batch: RecordBatch) -> Compacted {
        let bytes = batch.get_array_memory_size();
        Compacted {
            batch,
            report: CompactionReport {
                bytes_before: bytes,
                bytes_after: bytes,
                changes: Vec::new(),
            },
        }
    }
}

/// Narrows column types to their observed value range
#[derive(Debug, Clone, Copy)]
pub struct MemoryCompactor {
    /// Unit assumed for integer values in a `timestamp` column
    pub timestamp_unit: TimeUnit,
}

impl Default for MemoryCompactor {
    fn default() -> Self {
        MemoryCompactor {
            timestamp_unit: TimeUnit::Millisecond,
        }
    }
}

/// Compact a batch with the default [`MemoryCompactor`]
pub fn reduce_mem_usage(batch: RecordBatch) -> Compacted {
    MemoryCompactor::default().compact(batch)
}

impl Compaction for MemoryCompactor {
    fn compact(&self, batch: RecordBatch) -> Compacted {
        let bytes_before = batch.get_array_memory_size();
        let schema = batch.schema();

        let mut fields = Vec::with_capacity(schema.fields().len());
        let mut columns = Vec::with_capacity(batch.num_columns());
        let mut changes = Vec::new();

        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            let compacted = self.compact_column(field.name(), column);
            if compacted.data_type() != column.data_type() {
                changes.push(ColumnChange {
                    name: field.name().clone(),
                    from: column.data_type().clone(),
                    to: compacted.data_type().clone(),
                });
            }
            fields.push(Field::clone(field).with_data_type(compacted.data_type().clone()));
            columns.push(compacted);
        }

        let new_schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
        let compacted = match RecordBatch::try_new(new_schema, columns) {
            Ok(compacted) => compacted,
            Err(e) => {
                warn!("Compaction produced an invalid batch, keeping original: {}", e);
                return NoCompaction.compact(batch);
            }
        };

        let report = CompactionReport {
            bytes_before,
            bytes_after: compacted.get_array_memory_size(),
            changes,
        };
        info!(
            "Mem. usage decreased from {:.3} MB to {:.3} MB ({:.1}% reduction)",
            report.mb_before(),
            report.mb_after(),
            report.reduction_pct()
        );

        Compacted {
            batch: compacted,
            report,
        }
    }
}

impl MemoryCompactor {
    pub fn new(timestamp_unit: TimeUnit) -> Self {
        MemoryCompactor { timestamp_unit }
    }

    /// Retype one column, returning the original array when nothing applies or a cast fails.
    pub fn compact_column(&self, name: &str, column: &ArrayRef) -> ArrayRef {
        let result = if name == TIMESTAMP_COLUMN {
            self.to_timestamp(column)
        } else {
            match column_kind(column.data_type()) {
                ColumnKind::Float => narrow_float(column),
                ColumnKind::Integer => narrow_integer(column),
                ColumnKind::DateTime | ColumnKind::Categorical => Ok(None),
                ColumnKind::Other => to_categorical(column),
            }
        };

        match result {
            Ok(Some(array)) => array,
            Ok(None) => Arc::clone(column),
            Err(e) => {
                debug!(
                    "Leaving column '{}' as {}: {}",
                    name,
                    column.data_type(),
                    e
                );
                Arc::clone(column)
            }
        }
    }

    fn to_timestamp(&self, column: &ArrayRef) -> Result<Option<ArrayRef>, ArrowError> {
        let target = DataType::Timestamp(self.timestamp_unit, Some("UTC".into()));
        match column_kind(column.data_type()) {
            ColumnKind::DateTime if matches!(column.data_type(), DataType::Timestamp(..)) => {
                Ok(None)
            }
            ColumnKind::Integer | ColumnKind::Float => {
                let epoch = strict_cast(column, &DataType::Int64)?;
                strict_cast(&epoch, &target).map(Some)
            }
            _ => strict_cast(column, &target).map(Some),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Float,
    Integer,
    DateTime,
    Categorical,
    Other,
}

fn column_kind(data_type: &DataType) -> ColumnKind {
    match data_type {
        DataType::Float16 | DataType::Float32 | DataType::Float64 => ColumnKind::Float,
        dt if dt.is_integer() => ColumnKind::Integer,
        DataType::Timestamp(..) | DataType::Date32 | DataType::Date64 => ColumnKind::DateTime,
        DataType::Dictionary(..) => ColumnKind::Categorical,
        _ => ColumnKind::Other,
    }
}

fn narrow_float(column: &ArrayRef) -> Result<Option<ArrayRef>, ArrowError> {
    let target = match float_bounds(column) {
        Some((lo, hi)) if lo > f16::MIN.to_f64() && hi < f16::MAX.to_f64() => DataType::Float16,
        Some((lo, hi)) if lo > f32::MIN as f64 && hi < f32::MAX as f64 => DataType::Float32,
        _ => DataType::Float64,
    };
    retype(column, target)
}

fn narrow_integer(column: &ArrayRef) -> Result<Option<ArrayRef>, ArrowError> {
    let Some((lo, hi)) = integer_bounds(column) else {
        return Ok(None);
    };
    let fits = |type_min: i64, type_max: i64| lo > type_min as i128 && hi < type_max as i128;

    let target = if fits(i8::MIN as i64, i8::MAX as i64) {
        DataType::Int8
    } else if fits(i16::MIN as i64, i16::MAX as i64) {
        DataType::Int16
    } else if fits(i32::MIN as i64, i32::MAX as i64) {
        DataType::Int32
    } else if fits(i64::MIN, i64::MAX) {
        DataType::Int64
    } else {
        return Ok(None);
    };
    retype(column, target)
}

fn to_categorical(column: &ArrayRef) -> Result<Option<ArrayRef>, ArrowError> {
    let value_type = column.data_type().clone();
    let wide = strict_cast(
        column,
        &DataType::Dictionary(Box::new(DataType::Int32), Box::new(value_type.clone())),
    )?;

    let distinct = wide.as_any_dictionary().values().len();
    let key_type = if distinct <= i8::MAX as usize {
        DataType::Int8
    } else if distinct <= i16::MAX as usize {
        DataType::Int16
    } else {
        return Ok(Some(wide));
    };
    strict_cast(
        &wide,
        &DataType::Dictionary(Box::new(key_type), Box::new(value_type)),
    )
    .map(Some)
}

fn retype(column: &ArrayRef, target: DataType) -> Result<Option<ArrayRef>, ArrowError> {
    if column.data_type() == &target {
        return Ok(None);
    }
    strict_cast(column, &target).map(Some)
}

/// Cast that errors on overflow instead of writing nulls
fn strict_cast(column: &ArrayRef, target: &DataType) -> Result<ArrayRef, ArrowError> {
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(column, target, &options)
}

/// Observed `[min, max]` of a float column, skipping nulls and NaN
fn float_bounds(column: &ArrayRef) -> Option<(f64, f64)> {
    let values: Vec<f64> = match column.data_type() {
        DataType::Float16 => column
            .as_primitive::<Float16Type>()
            .iter()
            .flatten()
            .map(|v| v.to_f64())
            .collect(),
        DataType::Float32 => column
            .as_primitive::<Float32Type>()
            .iter()
            .flatten()
            .map(f64::from)
            .collect(),
        DataType::Float64 => column
            .as_primitive::<Float64Type>()
            .iter()
            .flatten()
            .collect(),
        _ => return None,
    };

    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Observed `[min, max]` of an integer column, widened to i128 so unsigned 64-bit fits
fn integer_bounds(column: &ArrayRef) -> Option<(i128, i128)> {
    match column.data_type() {
        DataType::Int8 => bounds::<Int8Type>(column),
        DataType::Int16 => bounds::<Int16Type>(column),
        DataType::Int32 => bounds::<Int32Type>(column),
        DataType::Int64 => bounds::<Int64Type>(column),
        DataType::UInt8 => bounds::<UInt8Type>(column),
        DataType::UInt16 => bounds::<UInt16Type>(column),
        DataType::UInt32 => bounds::<UInt32Type>(column),
        DataType::UInt64 => bounds::<UInt64Type>(column),
        _ => None,
    }
}

fn bounds<T>(column: &ArrayRef) -> Option<(i128, i128)>
where
    T: ArrowNumericType,
    T::Native: Into<i128>,
{
    let array = column.as_primitive_opt::<T>()?;
    Some((min(array)?.into(), max(array)?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{
        BooleanArray, Date32Array, DictionaryArray, Float32Array, Float64Array, Int16Array,
        Int32Array, Int64Array, StringArray, TimestampMillisecondArray, UInt64Array,
    };
    use arrow_array::types::TimestampMillisecondType;

    fn single(name: &str, column: ArrayRef) -> RecordBatch {
        RecordBatch::try_from_iter(vec![(name, column)]).unwrap()
    }

    fn compacted_type(name: &str, column: ArrayRef) -> DataType {
        let batch = reduce_mem_usage(single(name, column)).batch;
        batch.schema().field(0).data_type().clone()
    }

    #[test]
    fn test_small_ints_become_int8() {
        let column: ArrayRef = Arc::new(Int64Array::from(vec![-5, 0, 12, 100]));
        assert_eq!(compacted_type("count", column), DataType::Int8);
    }

    #[test]
    fn test_int8_limits_fall_through_to_int16() {
        let column: ArrayRef = Arc::new(Int64Array::from(vec![-128, 0, 127]));
        assert_eq!(compacted_type("count", column), DataType::Int16);
    }

    #[test]
    fn test_integer_cascade() {
        let column: ArrayRef = Arc::new(Int64Array::from(vec![0, 40_000]));
        assert_eq!(compacted_type("a", column), DataType::Int32);

        let column: ArrayRef = Arc::new(Int64Array::from(vec![0, 1_672_531_200_000]));
        assert_eq!(compacted_type("b", column), DataType::Int64);

        let column: ArrayRef = Arc::new(Int16Array::from(vec![1, 2, 3]));
        assert_eq!(compacted_type("c", column), DataType::Int8);
    }

    #[test]
    fn test_int64_limit_left_unchanged() {
        let column: ArrayRef = Arc::new(Int64Array::from(vec![0, i64::MAX]));
        assert_eq!(compacted_type("big", column), DataType::Int64);
    }

    #[test]
    fn test_beyond_signed_64_bit_left_unchanged() {
        let column: ArrayRef = Arc::new(UInt64Array::from(vec![1, u64::MAX]));
        let compacted = reduce_mem_usage(single("big", column));
        assert_eq!(
            compacted.batch.schema().field(0).data_type(),
            &DataType::UInt64
        );
        assert!(compacted.report.changes.is_empty());
    }

    #[test]
    fn test_small_unsigned_narrowed_to_signed() {
        let column: ArrayRef = Arc::new(UInt64Array::from(vec![1, 200]));
        assert_eq!(compacted_type("trades", column), DataType::Int16);
    }

    #[test]
    fn test_floats_within_f16_range() {
        let column: ArrayRef = Arc::new(Float64Array::from(vec![16541.77, 16545.7, -3.5]));
        assert_eq!(compacted_type("close", column), DataType::Float16);
    }

    #[test]
    fn test_float_above_f16_max_becomes_float32() {
        let column: ArrayRef = Arc::new(Float64Array::from(vec![1.0, 65520.0]));
        assert_eq!(compacted_type("close", column), DataType::Float32);

        let column: ArrayRef = Arc::new(Float64Array::from(vec![1.0, 65504.0]));
        assert_eq!(compacted_type("close", column), DataType::Float32);
    }

    #[test]
    fn test_float_beyond_f32_stays_float64() {
        let column: ArrayRef = Arc::new(Float32Array::from(vec![1.0, f32::MAX]));
        assert_eq!(compacted_type("x", column), DataType::Float64);

        let column: ArrayRef = Arc::new(Float64Array::from(vec![1e300]));
        assert_eq!(compacted_type("y", column), DataType::Float64);
    }

    #[test]
    fn test_float_nan_and_nulls_ignored() {
        let column: ArrayRef = Arc::new(Float64Array::from(vec![Some(1.5), None, Some(f64::NAN)]));
        assert_eq!(compacted_type("x", column), DataType::Float16);
    }

    #[test]
    fn test_empty_float_column_is_float64() {
        let column: ArrayRef = Arc::new(Float32Array::from(Vec::<f32>::new()));
        assert_eq!(compacted_type("x", column), DataType::Float64);
    }

    #[test]
    fn test_empty_int_column_unchanged() {
        let column: ArrayRef = Arc::new(Int32Array::from(Vec::<i32>::new()));
        assert_eq!(compacted_type("x", column), DataType::Int32);
    }

    #[test]
    fn test_timestamp_column_becomes_datetime() {
        let column: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        let batch = reduce_mem_usage(single("timestamp", column)).batch;
        assert_eq!(
            batch.schema().field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
        );
        let times = batch.column(0).as_primitive::<TimestampMillisecondType>();
        assert_eq!(times.value(2), 3);
    }

    #[test]
    fn test_timestamp_name_is_case_sensitive() {
        let column: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        assert_eq!(compacted_type("Timestamp", column), DataType::Int8);
    }

    #[test]
    fn test_timestamp_strings_are_parsed() {
        let column: ArrayRef = Arc::new(StringArray::from(vec![
            "2023-01-01T00:00:00Z",
            "2023-01-01T00:05:00Z",
        ]));
        let batch = reduce_mem_usage(single("timestamp", column)).batch;
        let times = batch
            .column(0)
            .as_primitive::<TimestampMillisecondType>();
        assert_eq!(times.value(1) - times.value(0), 300_000);
    }

    #[test]
    fn test_timestamp_unit_is_configurable() {
        let column: ArrayRef = Arc::new(Int64Array::from(vec![1_672_531_200]));
        let compacted = MemoryCompactor::new(TimeUnit::Second).compact(single("timestamp", column));
        assert_eq!(
            compacted.batch.schema().field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Second, Some("UTC".into()))
        );
    }

    #[test]
    fn test_datetime_columns_untouched() {
        let column: ArrayRef = Arc::new(
            TimestampMillisecondArray::from(vec![0, 300_000]).with_timezone("UTC"),
        );
        let compacted = reduce_mem_usage(single("Time", column));
        assert!(compacted.report.changes.is_empty());

        let column: ArrayRef = Arc::new(Date32Array::from(vec![19358]));
        assert_eq!(compacted_type("day", column), DataType::Date32);
    }

    #[test]
    fn test_strings_become_categorical() {
        let column: ArrayRef = Arc::new(StringArray::from(vec!["BTC", "ETH", "BTC", "BTC"]));
        let batch = reduce_mem_usage(single("pair", column)).batch;
        assert_eq!(
            batch.schema().field(0).data_type(),
            &DataType::Dictionary(Box::new(DataType::Int8), Box::new(DataType::Utf8))
        );
        let dict = batch
            .column(0)
            .as_any()
            .downcast_ref::<DictionaryArray<Int8Type>>()
            .unwrap();
        assert_eq!(dict.values().len(), 2);
        assert_eq!(dict.len(), 4);
    }

    #[test]
    fn test_uncastable_column_left_unchanged() {
        let column: ArrayRef = Arc::new(BooleanArray::from(vec![true, false]));
        let compacted = reduce_mem_usage(single("flag", column));
        assert_eq!(
            compacted.batch.schema().field(0).data_type(),
            &DataType::Boolean
        );
        assert!(compacted.report.changes.is_empty());
    }

    #[test]
    fn test_overflowing_timestamp_only_skips_that_column() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("close", DataType::Float64, false),
            Field::new("timestamp", DataType::UInt64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![1.5, 2.5])) as ArrayRef,
                Arc::new(UInt64Array::from(vec![1, u64::MAX])) as ArrayRef,
            ],
        )
        .unwrap();

        let compacted = reduce_mem_usage(batch);
        let schema = compacted.batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Float16);
        assert_eq!(schema.field(1).data_type(), &DataType::UInt64);
        assert_eq!(compacted.report.changes.len(), 1);

        let timestamps = compacted.batch.column(1).as_primitive::<UInt64Type>();
        assert_eq!(timestamps.null_count(), 0);
        assert_eq!(timestamps.value(1), u64::MAX);
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let batch = RecordBatch::try_from_iter(vec![
            ("pair", Arc::new(StringArray::from(vec!["BTC", "ETH"])) as ArrayRef),
            ("close", Arc::new(Float64Array::from(vec![1.5, 2.5])) as ArrayRef),
            ("count", Arc::new(Int64Array::from(vec![3, 4])) as ArrayRef),
            ("timestamp", Arc::new(Int64Array::from(vec![0, 300_000])) as ArrayRef),
        ])
        .unwrap();

        let first = reduce_mem_usage(batch);
        assert_eq!(first.report.changes.len(), 4);

        let second = reduce_mem_usage(first.batch.clone());
        assert!(second.report.changes.is_empty());
        assert_eq!(first.batch.schema(), second.batch.schema());
    }

    #[test]
    fn test_report_tracks_memory() {
        let values: Vec<f64> = (0..10_000).map(|i| (i % 100) as f64).collect();
        let batch = single("close", Arc::new(Float64Array::from(values)));
        let report = reduce_mem_usage(batch).report;

        assert!(report.bytes_after < report.bytes_before);
        assert!(report.reduction_pct() > 50.0);
        assert_eq!(
            report.changes,
            vec![ColumnChange {
                name: "close".to_string(),
                from: DataType::Float64,
                to: DataType::Float16,
            }]
        );
    }

    #[test]
    fn test_no_compaction_reports_identity() {
        let batch = single("close", Arc::new(Float64Array::from(vec![1.0, 2.0])));
        let compacted = NoCompaction.compact(batch);
        assert_eq!(compacted.report.bytes_before, compacted.report.bytes_after);
        assert_eq!(compacted.report.reduction_pct(), 0.0);
    }
}
