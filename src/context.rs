use dns2parquet_config::{ArchiveMode, InputConfig};
use std::path::{Path, PathBuf};

/// Label used for the partition `server` value of the default source.
pub const DEFAULT_SERVER_LABEL: &str = "default";

/// Everything a processor needs to know about the source it works on.
///
/// Built once per source per cycle and passed explicitly to the processor
/// and decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    name: String,
    input_dir: PathBuf,
    archive_dir: PathBuf,
    archive_mode: ArchiveMode,
}

impl SourceContext {
    /// `name` is a name server, or empty for the input base directory itself.
    pub fn new(name: &str, input: &InputConfig) -> Self {
        let base = Path::new(&input.location);
        let archive = Path::new(&input.archive);
        let (input_dir, archive_dir) = if name.is_empty() {
            (base.to_path_buf(), archive.to_path_buf())
        } else {
            (base.join(name), archive.join(name))
        };

        Self {
            name: name.to_string(),
            input_dir,
            archive_dir,
            archive_mode: input.archive_mode,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    /// Value of the `server` partition column.
    pub fn server_label(&self) -> &str {
        if self.is_default() {
            DEFAULT_SERVER_LABEL
        } else {
            &self.name
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn archive_mode(&self) -> ArchiveMode {
        self.archive_mode
    }
}

/// Split the configured name server list.
///
/// Entries are trimmed and empty entries dropped. A list without any entry
/// yields the single default source `""`.
pub fn resolve_sources(name_servers: &str) -> Vec<String> {
    let sources: Vec<String> = name_servers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if sources.is_empty() {
        vec![String::new()]
    } else {
        sources
    }
}
