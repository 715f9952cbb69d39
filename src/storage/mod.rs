//! Storage backend (Arrow/Parquet)
//!
//! Tables are held as append-only lists of Arrow record batches. Scans walk
//! the batches in bounded morsels so that a discretization pass never has to
//! materialize a concatenated copy of the table.
//!
//! Toyota Way Principles:
//! - Poka-Yoke: Schema validated on every append
//! - Muda elimination: Morsel scans instead of `concat_batches`

use crate::{Error, Result};
use arrow::array::ArrayRef;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::path::Path;

/// Morsel size for scans (16MB chunks)
/// Based on: Leis et al. (2014) morsel-driven parallelism
pub const MORSEL_SIZE_BYTES: usize = 16 * 1024 * 1024; // 16MB

/// Storage engine for Arrow/Parquet data
#[derive(Debug, Clone, Default)]
pub struct StorageEngine {
    batches: Vec<RecordBatch>,
}

impl StorageEngine {
    /// Create a new storage engine from existing batches
    ///
    /// # Errors
    /// Returns error if the batches do not share one schema
    pub fn new(batches: Vec<RecordBatch>) -> Result<Self> {
        let mut storage = Self::default();
        for batch in batches {
            storage.append_batch(batch)?;
        }
        Ok(storage)
    }

    /// Load table from Parquet file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::fs::File;

        let file = File::open(path.as_ref()).map_err(|e| {
            Error::StorageError(format!("Failed to open Parquet file: {e}"))
        })?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
            Error::StorageError(format!("Failed to parse Parquet file: {e}"))
        })?;

        let reader = builder.build().map_err(|e| {
            Error::StorageError(format!("Failed to create Parquet reader: {e}"))
        })?;

        let mut storage = Self::default();
        for batch in reader {
            let batch = batch.map_err(|e| {
                Error::StorageError(format!("Failed to read record batch: {e}"))
            })?;
            storage.append_batch(batch)?;
        }

        tracing::debug!(
            batches = storage.batches.len(),
            rows = storage.num_rows(),
            "loaded parquet table"
        );
        Ok(storage)
    }

    /// Get all record batches
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Schema shared by all batches, `None` while empty
    #[must_use]
    pub fn schema(&self) -> Option<SchemaRef> {
        self.batches.first().map(RecordBatch::schema)
    }

    /// Total number of rows across batches
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Create iterator over morsels
    #[must_use]
    pub fn morsels(&self) -> MorselIterator<'_> {
        MorselIterator::new(&self.batches)
    }

    /// Iterate over the chunks of one column, morsel by morsel
    ///
    /// # Errors
    /// Returns error if the column does not exist
    pub fn column_chunks<'a>(
        &'a self,
        name: &'a str,
    ) -> Result<impl Iterator<Item = ArrayRef> + 'a> {
        let schema = self
            .schema()
            .ok_or_else(|| Error::StorageError("No data in storage".to_string()))?;
        let index = schema
            .index_of(name)
            .map_err(|_| Error::UnknownAttribute(name.to_string()))?;
        Ok(self.morsels().map(move |morsel| morsel.column(index).clone()))
    }

    /// Append batches to storage
    ///
    /// # Example
    ///
    /// ```rust
    /// # use trueno_dp::storage::StorageEngine;
    /// # use arrow::array::{Int32Array, RecordBatch};
    /// # use arrow::datatypes::{DataType, Field, Schema};
    /// # use std::sync::Arc;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let schema = Arc::new(Schema::new(vec![
    ///     Field::new("age", DataType::Int32, false),
    /// ]));
    /// let batch = RecordBatch::try_new(
    ///     schema,
    ///     vec![Arc::new(Int32Array::from(vec![31, 47, 22]))],
    /// )?;
    ///
    /// let mut storage = StorageEngine::default();
    /// storage.append_batch(batch)?;
    /// assert_eq!(storage.num_rows(), 3);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns error if batch schema doesn't match existing batches
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if let Some(existing_schema) = self.schema() {
            if batch.schema() != existing_schema {
                return Err(Error::StorageError(format!(
                    "Schema mismatch: expected {:?}, got {:?}",
                    existing_schema,
                    batch.schema()
                )));
            }
        }

        self.batches.push(batch);
        Ok(())
    }
}

/// Iterator over bounded-size morsels of data
pub struct MorselIterator<'a> {
    batches: &'a [RecordBatch],
    current_batch_idx: usize,
    current_offset: usize,
    morsel_rows: usize,
}

impl<'a> MorselIterator<'a> {
    fn new(batches: &'a [RecordBatch]) -> Self {
        let morsel_rows = batches.first().map_or(0, Self::calculate_morsel_rows);

        Self {
            batches,
            current_batch_idx: 0,
            current_offset: 0,
            morsel_rows,
        }
    }

    /// Calculate how many rows fit in one morsel
    fn calculate_morsel_rows(batch: &RecordBatch) -> usize {
        let num_rows = batch.num_rows();
        if num_rows == 0 {
            return 0;
        }

        let bytes_per_row = batch.get_array_memory_size() / num_rows;
        if bytes_per_row == 0 {
            return num_rows;
        }

        (MORSEL_SIZE_BYTES / bytes_per_row).max(1)
    }
}

impl Iterator for MorselIterator<'_> {
    type Item = RecordBatch;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let current_batch = self.batches.get(self.current_batch_idx)?;

            if self.current_offset >= current_batch.num_rows() {
                self.current_batch_idx += 1;
                self.current_offset = 0;
                // Later batches may be larger than the first; never stall on a zero estimate
                if self.morsel_rows == 0 {
                    self.morsel_rows = self
                        .batches
                        .get(self.current_batch_idx)
                        .map_or(0, Self::calculate_morsel_rows);
                }
                continue;
            }

            let remaining_rows = current_batch.num_rows() - self.current_offset;
            let slice_length = remaining_rows.min(self.morsel_rows.max(1));

            let morsel = current_batch.slice(self.current_offset, slice_length);
            self.current_offset += slice_length;

            return Some(morsel);
        }
    }
}
