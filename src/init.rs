// Initialization utilities
//
// Logging, query engine and enrichment setup from RuntimeConfig

use crate::decode::JsonLinesDecoder;
use crate::enrich::{
    discover_resolver_checks, Enricher, GeoIpService, RefreshGate, ResolverCheck,
    TableGeoIpService,
};
use crate::processor::{OutputTarget, PacketProcessorFactory};
use crate::record::data_columns;
use crate::scheduler::Scheduler;
use anyhow::{Context, Result};
use dns2parquet_config::{EngineKind, LogFormat, RuntimeConfig};
use dns2parquet_engine::{
    HttpQueryEngine, LoggingEngine, QueryEngine, RegistrationSupervisor, ReqwestHttpClient,
    SqlRenderer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const ENGINE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Ignore the error if a subscriber is already set (idempotent)
    let _ = match config.logging.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}

/// Build the query engine selected by `engine.kind`.
pub(crate) fn build_engine(config: &RuntimeConfig) -> Result<Arc<dyn QueryEngine>> {
    let renderer = SqlRenderer::new(&config.engine.database, data_columns())
        .context("Invalid query engine database name")?;

    let engine: Arc<dyn QueryEngine> = match config.engine.kind {
        EngineKind::None => {
            info!("No query engine configured, partitions will only be logged");
            Arc::new(LoggingEngine::new(renderer))
        }
        EngineKind::Http => {
            let endpoint = config
                .engine
                .endpoint
                .clone()
                .context("engine.endpoint is required for the http engine")?;
            info!(endpoint = %endpoint, database = %config.engine.database, "Using HTTP query engine");
            let client = ReqwestHttpClient::new(ENGINE_REQUEST_TIMEOUT)?;
            Arc::new(HttpQueryEngine::new(
                client,
                endpoint,
                config.engine.user.clone(),
                renderer,
            ))
        }
    };
    Ok(engine)
}

/// Build the enrichment providers and the gate that refreshes them.
pub(crate) fn build_enrichment(config: &RuntimeConfig) -> Result<(RefreshGate, Arc<Enricher>)> {
    let mut gate = RefreshGate::new();
    let enrichment = &config.enrichment;

    let geo = if enrichment.geo_country_file.is_some() || enrichment.geo_asn_file.is_some() {
        let service = Arc::new(TableGeoIpService::new(
            enrichment.geo_country_file.as_ref().map(PathBuf::from),
            enrichment.geo_asn_file.as_ref().map(PathBuf::from),
        ));
        gate.register(service.clone());
        Some(service as Arc<dyn GeoIpService>)
    } else {
        None
    };

    let mut resolvers: Vec<Arc<dyn ResolverCheck>> = Vec::new();
    if let Some(dir) = &enrichment.resolver_dir {
        for check in discover_resolver_checks(Path::new(dir))? {
            gate.register(check.clone());
            resolvers.push(check);
        }
    }

    info!(
        geoip = geo.is_some(),
        resolvers = resolvers.len(),
        "Configured enrichment providers"
    );
    Ok((gate, Arc::new(Enricher::new(geo, resolvers))))
}

/// Wire decoder, enrichment and processor factory into a scheduler.
pub fn build_scheduler(
    config: &RuntimeConfig,
    supervisor: Option<Arc<RegistrationSupervisor>>,
) -> Result<Scheduler> {
    let (gate, enricher) = build_enrichment(config)?;
    let output = OutputTarget {
        location: PathBuf::from(&config.output.location),
        table: config.output.table.clone(),
    };
    let factory = PacketProcessorFactory::new(Arc::new(JsonLinesDecoder), enricher, output);

    Ok(Scheduler::new(
        config.input.clone(),
        gate,
        Arc::new(factory),
        supervisor,
    ))
}
