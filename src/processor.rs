//! Per-source processing: decode, enrich, route rows to partition writers.

use crate::context::SourceContext;
use crate::decode::{archive_input, RecordDecoder};
use crate::enrich::Enricher;
use crate::record::{dns_schema, DnsRecord, EnrichedRecord};
use anyhow::{bail, Context, Result};
use arrow::datatypes::SchemaRef;
use dns2parquet_engine::{Partition, TablePartition};
use dns2parquet_writer::{PartitionKey, PartitionWriter};
use metrics::counter;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Aggregate outcome of one processor run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub files: usize,
    pub rows_written: u64,
    pub rows_dropped: u64,
    /// Partitions that received a complete file in this run.
    pub partitions: Vec<TablePartition>,
}

/// Processes everything currently available for one source.
pub trait Processor: Send {
    fn execute(&mut self) -> Result<RunStats>;
}

/// Hands out a fresh processor per source and cycle.
pub trait ProcessorFactory: Send + Sync {
    fn create(&self, ctx: &SourceContext) -> Result<Box<dyn Processor>>;
}

/// Where processed rows go.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    pub location: PathBuf,
    pub table: String,
}

impl OutputTarget {
    fn table_partition(&self, key: &PartitionKey) -> TablePartition {
        TablePartition::new(
            self.table.clone(),
            vec![
                Partition::int("year", i64::from(key.year)),
                Partition::int("month", i64::from(key.month)),
                Partition::int("day", i64::from(key.day)),
                Partition::string("server", key.server.clone()),
            ],
            key.directory(&self.location, &self.table)
                .to_string_lossy()
                .into_owned(),
        )
    }
}

pub struct PacketProcessorFactory {
    decoder: Arc<dyn RecordDecoder>,
    enricher: Arc<Enricher>,
    output: OutputTarget,
}

impl PacketProcessorFactory {
    pub fn new(
        decoder: Arc<dyn RecordDecoder>,
        enricher: Arc<Enricher>,
        output: OutputTarget,
    ) -> Self {
        Self {
            decoder,
            enricher,
            output,
        }
    }
}

impl ProcessorFactory for PacketProcessorFactory {
    fn create(&self, ctx: &SourceContext) -> Result<Box<dyn Processor>> {
        Ok(Box::new(PacketProcessor {
            ctx: ctx.clone(),
            decoder: self.decoder.clone(),
            enricher: self.enricher.clone(),
            output: self.output.clone(),
            schema: dns_schema(),
            writers: BTreeMap::new(),
        }))
    }
}

/// Drains a source's input files into one writer per partition.
///
/// Writers are opened lazily on the first row of a partition and are all
/// closed before input files are archived. A run either keeps all of its
/// partition files and archives its input, or fails, removes every file it
/// wrote and leaves the input for the next cycle.
pub struct PacketProcessor {
    ctx: SourceContext,
    decoder: Arc<dyn RecordDecoder>,
    enricher: Arc<Enricher>,
    output: OutputTarget,
    schema: SchemaRef,
    writers: BTreeMap<PartitionKey, PartitionWriter>,
}

impl PacketProcessor {
    fn drain(&mut self, files: &[PathBuf], stats: &mut RunStats) -> Result<Vec<PathBuf>> {
        let mut processed = Vec::with_capacity(files.len());
        for file in files {
            let records = match self.decoder.decode(file) {
                Ok(records) => records,
                Err(e) => {
                    warn!(
                        server = self.ctx.server_label(),
                        file = %file.display(),
                        error = %format!("{:#}", e),
                        "Skipping unreadable input file"
                    );
                    continue;
                }
            };

            for record in records {
                match record {
                    Ok(record) => self.route(record, stats)?,
                    Err(e) => {
                        warn!(
                            server = self.ctx.server_label(),
                            file = %file.display(),
                            error = %e,
                            "Dropping undecodable record"
                        );
                        stats.rows_dropped += 1;
                    }
                }
            }
            processed.push(file.clone());
        }
        Ok(processed)
    }

    fn route(&mut self, record: DnsRecord, stats: &mut RunStats) -> Result<()> {
        let server = self.ctx.server_label();
        let Some(key) = PartitionKey::from_timestamp_millis(record.time, server) else {
            warn!(server = %server, time = record.time, "Dropping record with invalid timestamp");
            stats.rows_dropped += 1;
            return Ok(());
        };

        let enriched = EnrichedRecord {
            enrichment: self.enricher.enrich(record.src),
            record,
        };

        let writer = match self.writers.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let dir = entry.key().directory(&self.output.location, &self.output.table);
                let writer = PartitionWriter::create(&dir, self.schema.clone())
                    .with_context(|| format!("Failed to open partition writer in {}", dir.display()))?;
                debug!(partition = %entry.key(), path = %writer.path().display(), "Opened partition writer");
                entry.insert(writer)
            }
        };
        writer.write(&enriched.to_row());
        Ok(())
    }

    /// Close every open writer. Returns whether all of them closed cleanly,
    /// plus the files written in this run.
    fn close_all(&mut self, stats: &mut RunStats) -> (bool, Vec<PathBuf>) {
        let mut clean = true;
        let mut files = Vec::with_capacity(self.writers.len());
        for (key, mut writer) in std::mem::take(&mut self.writers) {
            let closed = writer.close();
            stats.rows_written += writer.rows();
            stats.rows_dropped += writer.dropped();
            files.push(writer.path().to_path_buf());

            if !closed {
                clean = false;
            } else if writer.rows() > 0 {
                stats.partitions.push(self.output.table_partition(&key));
            }
        }
        (clean, files)
    }

    /// Remove the output of a failed run. The input stays in place and is
    /// read again next cycle, so keeping these files would duplicate rows.
    fn discard(&self, files: &[PathBuf]) {
        for file in files {
            match fs::remove_file(file) {
                Ok(()) => debug!(path = %file.display(), "Discarded partition file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    server = self.ctx.server_label(),
                    path = %file.display(),
                    error = %e,
                    "Failed to discard partition file"
                ),
            }
        }
    }

    fn archive(&self, files: &[PathBuf]) {
        for file in files {
            if let Err(e) = archive_input(&self.ctx, file) {
                warn!(
                    server = self.ctx.server_label(),
                    file = %file.display(),
                    error = %format!("{:#}", e),
                    "Failed to archive input file"
                );
            }
        }
    }
}

impl Processor for PacketProcessor {
    fn execute(&mut self) -> Result<RunStats> {
        let mut stats = RunStats::default();
        let files = self.decoder.input_files(&self.ctx)?;
        if files.is_empty() {
            info!(server = self.ctx.server_label(), "No new input files");
            return Ok(stats);
        }

        let drained = self.drain(&files, &mut stats);
        let (clean, written) = self.close_all(&mut stats);
        let processed = match drained {
            Ok(processed) if clean => processed,
            Ok(_) => {
                self.discard(&written);
                bail!(
                    "a partition file failed to close, discarded {} file(s) of this run",
                    written.len()
                );
            }
            Err(e) => {
                self.discard(&written);
                return Err(e);
            }
        };
        stats.files = processed.len();

        let server = self.ctx.server_label().to_string();
        counter!("processor.rows.written", "server" => server.clone()).increment(stats.rows_written);
        counter!("processor.rows.dropped", "server" => server).increment(stats.rows_dropped);

        self.archive(&processed);
        Ok(stats)
    }
}
