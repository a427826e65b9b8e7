//! Input discovery, record decoding and archiving of processed files.

use crate::context::SourceContext;
use crate::record::DnsRecord;
use anyhow::{Context, Result};
use dns2parquet_config::ArchiveMode;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// A single record that could not be decoded. The rest of the file is still read.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line {line}: read failed: {source}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type RecordIter = Box<dyn Iterator<Item = std::result::Result<DnsRecord, DecodeError>> + Send>;

/// Turns the raw input of one source into DNS records.
pub trait RecordDecoder: Send + Sync {
    /// Files waiting to be processed for this source, in processing order.
    fn input_files(&self, ctx: &SourceContext) -> Result<Vec<PathBuf>>;

    /// Open `path`; per-record failures are yielded by the iterator.
    fn decode(&self, path: &Path) -> Result<RecordIter>;
}

/// Reads pre-decoded records, one JSON object per line, from `*.jsonl` files.
#[derive(Debug, Default, Clone)]
pub struct JsonLinesDecoder;

impl JsonLinesDecoder {
    pub const EXTENSION: &'static str = "jsonl";
}

impl RecordDecoder for JsonLinesDecoder {
    fn input_files(&self, ctx: &SourceContext) -> Result<Vec<PathBuf>> {
        let dir = ctx.input_dir();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read input directory {}", dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("Failed to list {}", dir.display()))?
                .path();
            if path.is_file() && path.extension().is_some_and(|e| e == Self::EXTENSION) {
                files.push(path);
            }
        }
        files.sort();

        debug!(server = ctx.server_label(), files = files.len(), "Found input files");
        Ok(files)
    }

    fn decode(&self, path: &Path) -> Result<RecordIter> {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let lines = BufReader::new(file).lines().enumerate();

        let records = lines.filter_map(|(index, line)| {
            let line_no = index + 1;
            match line {
                Err(source) => Some(Err(DecodeError::Io {
                    line: line_no,
                    source,
                })),
                Ok(text) if text.trim().is_empty() => None,
                Ok(text) => Some(
                    serde_json::from_str::<DnsRecord>(&text).map_err(|source| DecodeError::Json {
                        line: line_no,
                        source,
                    }),
                ),
            }
        });

        Ok(Box::new(records))
    }
}

/// Apply the source's archive mode to a fully processed input file.
pub fn archive_input(ctx: &SourceContext, path: &Path) -> Result<()> {
    match ctx.archive_mode() {
        ArchiveMode::None => Ok(()),
        ArchiveMode::Delete => {
            fs::remove_file(path).with_context(|| format!("Failed to delete {}", path.display()))
        }
        ArchiveMode::Archive => {
            let dir = ctx.archive_dir();
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create archive directory {}", dir.display()))?;
            let file_name = path
                .file_name()
                .with_context(|| format!("Input path has no file name: {}", path.display()))?;
            let target = dir.join(file_name);

            // rename fails across filesystems
            if fs::rename(path, &target).is_err() {
                fs::copy(path, &target).with_context(|| {
                    format!("Failed to archive {} to {}", path.display(), target.display())
                })?;
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            debug!(from = %path.display(), to = %target.display(), "Archived input file");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns2parquet_config::InputConfig;

    const LINE: &str = r#"{"time":1705329000000,"src":"192.0.2.10","dst":"192.0.2.53","qname":"example.nl.","qtype":1,"rcode":0,"protocol":"udp","len":40,"id":7}"#;

    fn context(root: &Path, mode: ArchiveMode) -> SourceContext {
        let input = InputConfig {
            location: root.join("input").to_string_lossy().into_owned(),
            name_servers: String::new(),
            archive: root.join("archive").to_string_lossy().into_owned(),
            archive_mode: mode,
        };
        SourceContext::new("ns1", &input)
    }

    #[test]
    fn test_bad_lines_do_not_stop_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jsonl");
        fs::write(&path, format!("{LINE}\nnot json\n\n{LINE}\n")).unwrap();

        let results: Vec<_> = JsonLinesDecoder.decode(&path).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DecodeError::Json { line: 2, .. })));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_input_files_are_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), ArchiveMode::None);
        fs::create_dir_all(ctx.input_dir()).unwrap();
        fs::write(ctx.input_dir().join("b.jsonl"), LINE).unwrap();
        fs::write(ctx.input_dir().join("a.jsonl"), LINE).unwrap();
        fs::write(ctx.input_dir().join("notes.txt"), "x").unwrap();

        let files = JsonLinesDecoder.input_files(&ctx).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);
    }

    #[test]
    fn test_missing_input_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), ArchiveMode::None);
        assert!(JsonLinesDecoder.input_files(&ctx).is_err());
    }

    #[test]
    fn test_archive_modes() {
        let dir = tempfile::tempdir().unwrap();

        let ctx = context(dir.path(), ArchiveMode::Archive);
        fs::create_dir_all(ctx.input_dir()).unwrap();
        let moved = ctx.input_dir().join("moved.jsonl");
        fs::write(&moved, LINE).unwrap();
        archive_input(&ctx, &moved).unwrap();
        assert!(!moved.exists());
        assert!(ctx.archive_dir().join("moved.jsonl").exists());

        let ctx = context(dir.path(), ArchiveMode::Delete);
        let deleted = ctx.input_dir().join("deleted.jsonl");
        fs::write(&deleted, LINE).unwrap();
        archive_input(&ctx, &deleted).unwrap();
        assert!(!deleted.exists());
        assert!(!ctx.archive_dir().join("deleted.jsonl").exists());

        let ctx = context(dir.path(), ArchiveMode::None);
        let kept = ctx.input_dir().join("kept.jsonl");
        fs::write(&kept, LINE).unwrap();
        archive_input(&ctx, &kept).unwrap();
        assert!(kept.exists());
    }
}
