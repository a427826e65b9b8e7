//! Enrichment providers and the refresh gate run at the start of every cycle.

mod cidr;
mod geoip;
mod resolver;

pub use cidr::CidrTable;
pub use geoip::{GeoIpService, GeoLocation, TableGeoIpService};
pub use resolver::{discover_resolver_checks, ResolverCheck, TableResolverCheck};

use anyhow::Result;
use metrics::counter;
use parking_lot::RwLock;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// A provider whose reference data can be reloaded on demand.
pub trait Refresh: Send + Sync {
    fn name(&self) -> &str;

    /// Load a new generation. On error the previous generation stays active.
    fn refresh(&self) -> Result<()>;
}

/// Current generation of a provider's data. Readers get either the old or
/// the new value, never a partially loaded one.
pub(crate) struct Generation<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Generation<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    pub(crate) fn current(&self) -> Arc<T> {
        self.current.read().clone()
    }

    pub(crate) fn replace(&self, value: T) {
        *self.current.write() = Arc::new(value);
    }
}

impl<T: Default> Default for Generation<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Refreshes every registered provider once per cycle.
#[derive(Default)]
pub struct RefreshGate {
    providers: Vec<Arc<dyn Refresh>>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Refresh>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Refresh all providers. A failing provider is logged and keeps serving
    /// its previous data; the others are still refreshed. Returns the number
    /// of failures.
    pub fn refresh_all(&self) -> usize {
        let mut failures = 0;
        for provider in &self.providers {
            match provider.refresh() {
                Ok(()) => debug!(provider = provider.name(), "Refreshed enrichment provider"),
                Err(e) => {
                    failures += 1;
                    counter!("enrichment.refresh.failures", "provider" => provider.name().to_string())
                        .increment(1);
                    warn!(
                        provider = provider.name(),
                        error = %format!("{:#}", e),
                        "Enrichment refresh failed, keeping previous data"
                    );
                }
            }
        }
        failures
    }
}

/// Per-record lookup results. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub country: Option<String>,
    pub asn: Option<String>,
    pub resolver: Option<String>,
}

/// Combines the configured lookups for a client address.
#[derive(Default)]
pub struct Enricher {
    geo: Option<Arc<dyn GeoIpService>>,
    resolvers: Vec<Arc<dyn ResolverCheck>>,
}

impl Enricher {
    pub fn new(geo: Option<Arc<dyn GeoIpService>>, resolvers: Vec<Arc<dyn ResolverCheck>>) -> Self {
        Self { geo, resolvers }
    }

    pub fn enrich(&self, ip: IpAddr) -> Enrichment {
        let GeoLocation { country, asn } = self
            .geo
            .as_ref()
            .map(|geo| geo.lookup(ip))
            .unwrap_or_default();
        let resolver = self
            .resolvers
            .iter()
            .find(|r| r.matches(ip))
            .map(|r| r.name().to_string());

        Enrichment {
            country,
            asn,
            resolver,
        }
    }
}
