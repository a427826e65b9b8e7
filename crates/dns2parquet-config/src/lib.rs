// dns2parquet-config - Unified configuration for the loader
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from DNS2PARQUET_CONFIG env var
// 3. Config file contents from DNS2PARQUET_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.dns2parquet.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

/// Default number of rows per Parquet row group.
pub const DEFAULT_ROW_GROUP_SIZE: usize = 512 * 1024;

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Delay between the end of one cycle and the start of the next.
    pub delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { delay_secs: 60 }
    }
}

/// Capture input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Base directory holding one subdirectory per name server.
    pub location: String,

    /// Comma-separated list of name servers. Blank means the base
    /// directory itself is the only source.
    pub name_servers: String,

    /// Where processed input files are moved when `archive_mode = "archive"`.
    pub archive: String,

    pub archive_mode: ArchiveMode,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            location: "./input".to_string(),
            name_servers: String::new(),
            archive: "./archive".to_string(),
            archive_mode: ArchiveMode::default(),
        }
    }
}

/// What happens to an input file once all of its records were processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveMode {
    #[default]
    Archive,
    Delete,
    None,
}

impl std::fmt::Display for ArchiveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveMode::Archive => write!(f, "archive"),
            ArchiveMode::Delete => write!(f, "delete"),
            ArchiveMode::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for ArchiveMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "archive" | "move" => Ok(ArchiveMode::Archive),
            "delete" => Ok(ArchiveMode::Delete),
            "none" | "keep" => Ok(ArchiveMode::None),
            _ => anyhow::bail!("Unsupported archive mode: {}. Supported: archive, delete, none", s),
        }
    }
}

/// Parquet output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory of the partitioned tables.
    pub location: String,

    /// Table name; also the first path segment below `location`.
    pub table: String,

    pub row_group_size: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            location: "./output".to_string(),
            table: "dns".to_string(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }
}

/// Reference data used to enrich records. Unset paths disable the lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_country_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_asn_file: Option<String>,

    /// Directory with one `<provider>.txt` CIDR list per public resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver_dir: Option<String>,
}

/// Query engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    pub database: String,

    pub user: String,

    pub max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::None,
            endpoint: None,
            database: "dns".to_string(),
            user: "dns2parquet".to_string(),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Log statements without contacting an engine.
    None,
    /// Post statements to an HTTP statement endpoint.
    Http,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::None => write!(f, "none"),
            EngineKind::Http => write!(f, "http"),
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "log" => Ok(EngineKind::None),
            "http" => Ok(EngineKind::Http),
            _ => anyhow::bail!("Unsupported engine kind: {}. Supported: none, http", s),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Load configuration with graceful fallback to defaults.
    /// Does not fail if config file is missing - uses defaults instead.
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default()
    }

    /// Merge another config into this one (used for TOML layering).
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.schedule = other.schedule;
        self.input = other.input;
        self.output = other.output;
        self.enrichment = other.enrichment;
        self.engine = other.engine;
        self.logging = other.logging;
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Build a configuration from inline TOML plus overrides supplied by an
    /// `EnvSource`.
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        let mut config = RuntimeConfig::default();

        if let Some(inline) = inline_config {
            let file_config: RuntimeConfig =
                toml::from_str(inline).context("Failed to parse inline config content")?;
            config.merge(file_config);
        }

        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_mode_from_str() {
        assert_eq!("archive".parse::<ArchiveMode>().unwrap(), ArchiveMode::Archive);
        assert_eq!("move".parse::<ArchiveMode>().unwrap(), ArchiveMode::Archive);
        assert_eq!("DELETE".parse::<ArchiveMode>().unwrap(), ArchiveMode::Delete);
        assert_eq!("keep".parse::<ArchiveMode>().unwrap(), ArchiveMode::None);
        assert!("shred".parse::<ArchiveMode>().is_err());
    }

    #[test]
    fn test_engine_kind_from_str() {
        assert_eq!("none".parse::<EngineKind>().unwrap(), EngineKind::None);
        assert_eq!("HTTP".parse::<EngineKind>().unwrap(), EngineKind::Http);
        assert!("impala".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_default_configs() {
        let config = RuntimeConfig::default();
        assert_eq!(config.schedule.delay_secs, 60);
        assert!(config.input.name_servers.is_empty());
        assert_eq!(config.output.table, "dns");
        assert_eq!(config.output.row_group_size, DEFAULT_ROW_GROUP_SIZE);
        assert_eq!(config.engine.kind, EngineKind::None);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_partial_sections_fill_missing_fields() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [input]
            name_servers = "ns1,ns2"

            [output]
            table = "queries"

            [engine]
            kind = "http"
            endpoint = "http://engine:8080"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.input.name_servers, "ns1,ns2");
        assert_eq!(config.input.location, "./input");
        assert_eq!(config.input.archive, "./archive");
        assert_eq!(config.output.table, "queries");
        assert_eq!(config.output.location, "./output");
        assert_eq!(config.output.row_group_size, DEFAULT_ROW_GROUP_SIZE);
        assert_eq!(config.engine.kind, EngineKind::Http);
        assert_eq!(config.engine.database, "dns");
        assert_eq!(config.engine.user, "dns2parquet");
        assert_eq!(config.engine.max_retries, 3);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [input]
            location = "/data/pcap"
            archive = "/data/archive"
            name_servers = "ns1,ns2"
            "#,
        )
        .unwrap();

        assert_eq!(config.input.location, "/data/pcap");
        assert_eq!(config.input.name_servers, "ns1,ns2");
        assert_eq!(config.input.archive_mode, ArchiveMode::Archive);
        assert_eq!(config.schedule.delay_secs, 60);
        assert_eq!(config.output.location, "./output");
    }
}
