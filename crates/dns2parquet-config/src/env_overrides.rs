use super::{ArchiveMode, EngineKind, LogFormat, RuntimeConfig};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "DNS2PARQUET_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    /// Look up `key` with the `DNS2PARQUET_` prefix applied.
    fn get(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Schedule
    if let Some(val) = get_env_u64(env, "DELAY_SECS")? {
        config.schedule.delay_secs = val;
    }

    // Input
    if let Some(servers) = get_env_string(env, "NAME_SERVERS")? {
        config.input.name_servers = servers;
    }
    if let Some(location) = get_env_string(env, "INPUT_LOCATION")? {
        config.input.location = location;
    }
    if let Some(archive) = get_env_string(env, "INPUT_ARCHIVE")? {
        config.input.archive = archive;
    }
    if let Some(mode) = get_env_string(env, "ARCHIVE_MODE")? {
        config.input.archive_mode = mode
            .parse::<ArchiveMode>()
            .context("Invalid DNS2PARQUET_ARCHIVE_MODE value")?;
    }

    // Output
    if let Some(location) = get_env_string(env, "OUTPUT_LOCATION")? {
        config.output.location = location;
    }
    if let Some(table) = get_env_string(env, "OUTPUT_TABLE")? {
        config.output.table = table;
    }
    if let Some(val) = get_env_usize(env, "ROW_GROUP_SIZE")? {
        config.output.row_group_size = val;
    }

    // Enrichment
    if let Some(path) = get_env_string(env, "GEO_COUNTRY_FILE")? {
        config.enrichment.geo_country_file = non_empty(path);
    }
    if let Some(path) = get_env_string(env, "GEO_ASN_FILE")? {
        config.enrichment.geo_asn_file = non_empty(path);
    }
    if let Some(path) = get_env_string(env, "RESOLVER_DIR")? {
        config.enrichment.resolver_dir = non_empty(path);
    }

    // Query engine
    if let Some(kind) = get_env_string(env, "ENGINE_KIND")? {
        config.engine.kind = kind
            .parse::<EngineKind>()
            .context("Invalid DNS2PARQUET_ENGINE_KIND value")?;
    }
    if let Some(endpoint) = get_env_string(env, "ENGINE_ENDPOINT")? {
        config.engine.endpoint = non_empty(endpoint);
    }
    if let Some(database) = get_env_string(env, "ENGINE_DATABASE")? {
        config.engine.database = database;
    }
    if let Some(user) = get_env_string(env, "ENGINE_USER")? {
        config.engine.user = user;
    }
    if let Some(val) = get_env_u64(env, "ENGINE_MAX_RETRIES")? {
        config.engine.max_retries = u32::try_from(val)
            .map_err(|_| anyhow!("{}ENGINE_MAX_RETRIES is out of range", ENV_PREFIX))?;
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL")? {
        config.logging.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT")? {
        config.logging.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get(key))
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
