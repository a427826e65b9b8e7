use super::cidr::CidrTable;
use super::{Generation, Refresh};
use anyhow::Result;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::info;

/// Geographic and network-operator lookup.
pub trait GeoIpService: Send + Sync {
    /// ISO country code of the network containing `ip`.
    fn lookup_country(&self, ip: IpAddr) -> Option<String>;

    /// Autonomous system of the network containing `ip`.
    fn lookup_asn(&self, ip: IpAddr) -> Option<String>;

    /// Country and ASN from the same generation of reference data.
    fn lookup(&self, ip: IpAddr) -> GeoLocation {
        GeoLocation {
            country: self.lookup_country(ip),
            asn: self.lookup_asn(ip),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub asn: Option<String>,
}

/// Country and ASN tables, always swapped together.
#[derive(Default)]
struct GeoTables {
    country: CidrTable,
    asn: CidrTable,
}

impl GeoTables {
    fn locate(&self, ip: IpAddr) -> GeoLocation {
        GeoLocation {
            country: non_empty(self.country.lookup(ip)),
            asn: non_empty(self.asn.lookup(ip)),
        }
    }
}

/// GeoIP service backed by two CIDR tables (`cidr,country` and `cidr,asn`).
pub struct TableGeoIpService {
    country_file: Option<PathBuf>,
    asn_file: Option<PathBuf>,
    tables: Generation<GeoTables>,
}

impl TableGeoIpService {
    /// Tables start empty until the first refresh.
    pub fn new(country_file: Option<PathBuf>, asn_file: Option<PathBuf>) -> Self {
        Self {
            country_file,
            asn_file,
            tables: Generation::default(),
        }
    }

    fn load(path: Option<&PathBuf>) -> Result<CidrTable> {
        match path {
            Some(path) => CidrTable::load(path),
            None => Ok(CidrTable::default()),
        }
    }
}

impl GeoIpService for TableGeoIpService {
    fn lookup_country(&self, ip: IpAddr) -> Option<String> {
        non_empty(self.tables.current().country.lookup(ip))
    }

    fn lookup_asn(&self, ip: IpAddr) -> Option<String> {
        non_empty(self.tables.current().asn.lookup(ip))
    }

    fn lookup(&self, ip: IpAddr) -> GeoLocation {
        self.tables.current().locate(ip)
    }
}

impl Refresh for TableGeoIpService {
    fn name(&self) -> &str {
        "geoip"
    }

    /// Both tables are loaded, then swapped in as one generation.
    fn refresh(&self) -> Result<()> {
        let country = Self::load(self.country_file.as_ref())?;
        let asn = Self::load(self.asn_file.as_ref())?;
        info!(
            countries = country.len(),
            asns = asn.len(),
            "Loaded GeoIP tables"
        );
        self.tables.replace(GeoTables { country, asn });
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_after_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let country = dir.path().join("country.csv");
        let asn = dir.path().join("asn.csv");
        std::fs::write(&country, "192.0.2.0/24,NL\n2001:db8::/32,DE\n").unwrap();
        std::fs::write(&asn, "192.0.2.0/24,AS1140\n").unwrap();

        let service = TableGeoIpService::new(Some(country), Some(asn));
        let ip: IpAddr = "192.0.2.7".parse().unwrap();
        assert_eq!(service.lookup_country(ip), None);

        service.refresh().unwrap();
        assert_eq!(service.lookup_country(ip).as_deref(), Some("NL"));
        assert_eq!(service.lookup_asn(ip).as_deref(), Some("AS1140"));
        assert_eq!(
            service
                .lookup_country("2001:db8::1".parse().unwrap())
                .as_deref(),
            Some("DE")
        );
        assert_eq!(service.lookup_asn("2001:db8::1".parse().unwrap()), None);
    }

    #[test]
    fn test_reader_sees_one_generation_across_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let country = dir.path().join("country.csv");
        let asn = dir.path().join("asn.csv");
        std::fs::write(&country, "192.0.2.0/24,NL\n").unwrap();
        std::fs::write(&asn, "192.0.2.0/24,AS1140\n").unwrap();

        let service = TableGeoIpService::new(Some(country.clone()), Some(asn.clone()));
        service.refresh().unwrap();
        let ip: IpAddr = "192.0.2.1".parse().unwrap();

        let snapshot = service.tables.current();
        std::fs::write(&country, "192.0.2.0/24,BE\n").unwrap();
        std::fs::write(&asn, "192.0.2.0/24,AS2611\n").unwrap();
        service.refresh().unwrap();

        assert_eq!(
            snapshot.locate(ip),
            GeoLocation {
                country: Some("NL".into()),
                asn: Some("AS1140".into()),
            }
        );
        assert_eq!(
            service.lookup(ip),
            GeoLocation {
                country: Some("BE".into()),
                asn: Some("AS2611".into()),
            }
        );
    }

    #[test]
    fn test_failed_refresh_keeps_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let country = dir.path().join("country.csv");
        std::fs::write(&country, "192.0.2.0/24,NL\n").unwrap();

        let service = TableGeoIpService::new(Some(country.clone()), None);
        service.refresh().unwrap();

        std::fs::write(&country, "192.0.2.0/99,XX\n").unwrap();
        assert!(service.refresh().is_err());
        assert_eq!(
            service
                .lookup_country("192.0.2.1".parse().unwrap())
                .as_deref(),
            Some("NL")
        );
    }
}
