//! One Parquet output file per writer instance.

use crate::encoding::{writer_properties, WRITE_BATCH_SIZE};
use crate::error::{Result, WriterError};
use crate::row::{ColumnBuffer, Row};
use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parquet::arrow::ArrowWriter;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Closed,
    Failed,
}

/// Writes rows of a single partition into `<dir>/<uuid>.parquet`.
///
/// Rows are validated and buffered per column, encoded into a record batch
/// every `batch_size` rows and flushed into row groups by the Parquet writer.
/// A malformed row is logged and counted as dropped; the writer stays usable.
/// The file is finalized exactly once, by [`PartitionWriter::close`] or on drop.
pub struct PartitionWriter {
    path: PathBuf,
    schema: SchemaRef,
    writer: Option<ArrowWriter<File>>,
    columns: Vec<ColumnBuffer>,
    buffered: usize,
    batch_size: usize,
    rows: u64,
    dropped: u64,
    state: WriterState,
}

impl PartitionWriter {
    /// Create the partition directory (if needed) and open a fresh file in it.
    pub fn create(dir: impl AsRef<Path>, schema: SchemaRef) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| WriterError::output_unavailable(dir, e))?;

        let columns = schema
            .fields()
            .iter()
            .map(|field| ColumnBuffer::for_field(field))
            .collect::<Result<Vec<_>>>()?;

        let path = dir.join(format!("{}.parquet", Uuid::new_v4()));
        let file = File::create(&path).map_err(|e| WriterError::output_unavailable(&path, e))?;
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(writer_properties().clone()))
            .map_err(|e| WriterError::encode(&path, e))?;

        debug!(path = %path.display(), "Opened partition file");

        Ok(Self {
            path,
            schema,
            writer: Some(writer),
            columns,
            buffered: 0,
            batch_size: WRITE_BATCH_SIZE,
            rows: 0,
            dropped: 0,
            state: WriterState::Open,
        })
    }

    /// Override how many rows are buffered before a record batch is encoded.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Append one row. Returns `false` when the row was dropped.
    pub fn write(&mut self, row: &Row) -> bool {
        if self.state != WriterState::Open {
            warn!(path = %self.path.display(), "Write after close, dropping row");
            self.dropped += 1;
            return false;
        }

        if let Err(e) = row.validate(&self.schema) {
            error!(
                path = %self.path.display(),
                row = self.rows + self.dropped,
                error = %e,
                "Dropping malformed record"
            );
            self.dropped += 1;
            return false;
        }

        for (column, value) in self.columns.iter_mut().zip(row.values()) {
            column.append(value);
        }
        self.buffered += 1;
        self.rows += 1;

        if self.buffered >= self.batch_size {
            self.flush_buffered();
        }
        true
    }

    fn flush_buffered(&mut self) {
        if self.buffered == 0 {
            return;
        }

        let pending = self.buffered;
        self.buffered = 0;
        let arrays = self.columns.iter_mut().map(|c| c.finish()).collect();

        let result = RecordBatch::try_new(self.schema.clone(), arrays)
            .map_err(|e| WriterError::encode(&self.path, e))
            .and_then(|batch| match self.writer.as_mut() {
                Some(writer) => writer
                    .write(&batch)
                    .map_err(|e| WriterError::encode(&self.path, e)),
                None => Err(WriterError::encode(&self.path, "writer already released")),
            });

        if let Err(e) = result {
            error!(
                path = %self.path.display(),
                rows = pending,
                error = %e,
                "Failed to encode buffered rows"
            );
            self.rows -= pending as u64;
            self.dropped += pending as u64;
        }
    }

    /// Flush remaining rows and write the footer.
    ///
    /// Errors are logged, never returned. Returns whether the file is complete.
    /// Calling it again is a no-op that reports the same result.
    pub fn close(&mut self) -> bool {
        if self.state != WriterState::Open {
            return self.state == WriterState::Closed;
        }

        self.flush_buffered();

        let Some(writer) = self.writer.take() else {
            self.state = WriterState::Failed;
            return false;
        };

        match writer.close() {
            Ok(_) => {
                self.state = WriterState::Closed;
                debug!(
                    path = %self.path.display(),
                    rows = self.rows,
                    dropped = self.dropped,
                    "Closed partition file"
                );
                true
            }
            Err(e) => {
                self.state = WriterState::Failed;
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to close partition file"
                );
                false
            }
        }
    }

    /// Rows accepted and encoded so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Rows rejected as malformed or lost to an encode failure.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.state != WriterState::Open
    }
}

impl Drop for PartitionWriter {
    fn drop(&mut self) {
        if self.state == WriterState::Open {
            self.close();
        }
    }
}

impl std::fmt::Debug for PartitionWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionWriter")
            .field("path", &self.path)
            .field("rows", &self.rows)
            .field("dropped", &self.dropped)
            .field("state", &self.state)
            .finish()
    }
}
