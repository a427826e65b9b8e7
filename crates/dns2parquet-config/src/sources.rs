// Configuration source loading.
//
// Priority order:
// 1. Environment variables (DNS2PARQUET_* prefix)
// 2. Config file path from DNS2PARQUET_CONFIG
// 3. Inline config content from DNS2PARQUET_CONFIG_CONTENT
// 4. Default config files (./config.toml, ./.dns2parquet.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::RuntimeConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

/// Load configuration using native environment/file access.
pub fn load_config() -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(file_config) = load_from_file()? {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<RuntimeConfig>> {
    file_config(
        env::var("DNS2PARQUET_CONFIG").ok(),
        env::var("DNS2PARQUET_CONFIG_CONTENT").ok(),
        &["./config.toml", "./.dns2parquet.toml"],
    )
}

/// Resolve the file layer. `None` only when no file is configured or present;
/// unreadable or unparseable files are errors.
fn file_config(
    path: Option<String>,
    content: Option<String>,
    default_paths: &[&str],
) -> Result<Option<RuntimeConfig>> {
    if let Some(path) = path {
        return read_config_file(Path::new(&path)).map(Some);
    }

    if let Some(content) = content {
        let config: RuntimeConfig = toml::from_str(&content)
            .context("Failed to parse inline config from DNS2PARQUET_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in default_paths {
        let path = Path::new(path);
        if path.exists() {
            return read_config_file(path).map(Some);
        }
    }

    Ok(None)
}

fn read_config_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let file_config = read_config_file(path.as_ref())?;

    let mut config = RuntimeConfig::default();
    config.merge(file_config);

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;

    config.validate()?;
    Ok(config)
}

/// Load configuration with graceful fallback to defaults.
/// Tries standard config file locations, returns defaults if none found.
/// A config file that exists but cannot be read or parsed is an error.
pub fn load_or_default() -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(file_config) = load_from_file()? {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;

    config.validate()?;
    Ok(config)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineKind;
    use std::io::Write;

    #[test]
    fn explicit_file_is_layered_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [schedule]
            delay_secs = 300

            [engine]
            kind = "http"
            endpoint = "http://engine:8080"
            database = "dns"
            user = "loader"
            "#
        )
        .unwrap();

        let config = load_from_file_path(file.path()).unwrap();
        assert_eq!(config.schedule.delay_secs, 300);
        assert_eq!(config.engine.kind, EngineKind::Http);
        assert_eq!(config.engine.max_retries, 3);
        assert_eq!(config.output.table, "dns");
    }

    #[test]
    fn inline_partial_section_is_applied() {
        let config = file_config(
            None,
            Some("[input]\nname_servers = \"ns1,ns2\"".to_string()),
            &[],
        )
        .unwrap()
        .unwrap();

        assert_eq!(config.input.name_servers, "ns1,ns2");
        assert_eq!(config.input.location, "./input");
    }

    #[test]
    fn broken_file_layer_is_an_error_not_defaults() {
        let err = file_config(None, Some("[input\nname_servers =".to_string()), &[]).unwrap_err();
        assert!(format!("{:#}", err).contains("DNS2PARQUET_CONFIG_CONTENT"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nkind = \"impala\"").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        assert!(file_config(None, None, &[path.as_str()]).is_err());
    }

    #[test]
    fn no_file_layer_falls_back() {
        let config = file_config(None, None, &["/definitely/not/here.toml"]).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let err = load_from_file_path("/definitely/not/here.toml").unwrap_err();
        assert!(format!("{:#}", err).contains("/definitely/not/here.toml"));
    }
}
