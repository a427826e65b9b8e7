// Configuration validation
//
// Validates that required fields are present and values are sensible

use super::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_schedule_config(&config.schedule)?;
    validate_input_config(&config.input)?;
    validate_output_config(&config.output)?;
    validate_engine_config(&config.engine)?;

    Ok(())
}

fn validate_schedule_config(config: &ScheduleConfig) -> Result<()> {
    if config.delay_secs == 0 {
        bail!("schedule.delay_secs must be greater than 0");
    }

    if config.delay_secs < 5 {
        warn!(
            delay_secs = config.delay_secs,
            "schedule.delay_secs is very small; cycles will run almost back to back"
        );
    }

    Ok(())
}

fn validate_input_config(config: &InputConfig) -> Result<()> {
    if config.location.trim().is_empty() {
        bail!(
            "Input location is required\n\n\
            How to fix:\n\
              • Environment: export {}INPUT_LOCATION=/data/capture\n\
              • TOML: [input]\n              location = \"/data/capture\"\n",
            ENV_PREFIX
        );
    }

    if config.archive_mode == ArchiveMode::Archive && config.archive.trim().is_empty() {
        bail!(
            "Archive location is required when input.archive_mode = \"archive\"\n\n\
            How to fix:\n\
              • Environment: export {}INPUT_ARCHIVE=/data/archive\n\
              • Or set input.archive_mode to \"delete\" or \"none\"\n",
            ENV_PREFIX
        );
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<()> {
    if config.location.trim().is_empty() {
        bail!(
            "Output location is required\n\n\
            How to fix:\n\
              • Environment: export {}OUTPUT_LOCATION=/data/parquet\n\
              • TOML: [output]\n              location = \"/data/parquet\"\n",
            ENV_PREFIX
        );
    }

    if !is_identifier(&config.table) {
        bail!(
            "output.table '{}' must start with a letter and contain only letters, digits and '_'",
            config.table
        );
    }

    if config.row_group_size == 0 {
        bail!("output.row_group_size must be greater than 0");
    }

    if config.row_group_size > 16 * 1024 * 1024 {
        warn!(
            row_group_size = config.row_group_size,
            "output.row_group_size is very large; may cause memory issues"
        );
    }

    Ok(())
}

fn validate_engine_config(config: &EngineConfig) -> Result<()> {
    if !is_identifier(&config.database) {
        bail!(
            "engine.database '{}' must start with a letter and contain only letters, digits and '_'",
            config.database
        );
    }

    if config.kind == EngineKind::Http {
        let endpoint = config.endpoint.as_deref().unwrap_or_default();
        if endpoint.is_empty() {
            bail!(
                "Query engine endpoint is required for engine.kind = \"http\"\n\n\
                How to fix:\n\
                  • Environment: export {}ENGINE_ENDPOINT=http://engine:8080\n\
                  • TOML: [engine]\n              endpoint = \"http://engine:8080\"\n",
                ENV_PREFIX
            );
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            bail!("engine.endpoint must be an http:// or https:// URL");
        }
        if config.user.trim().is_empty() {
            bail!("engine.user must not be empty");
        }
    }

    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
