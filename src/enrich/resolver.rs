use super::cidr::CidrTable;
use super::{Generation, Refresh};
use anyhow::{Context, Result};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recognizes the address ranges of one public resolver provider.
pub trait ResolverCheck: Send + Sync {
    fn name(&self) -> &str;

    fn matches(&self, ip: IpAddr) -> bool;
}

/// Resolver check backed by a CIDR list file.
pub struct TableResolverCheck {
    name: String,
    file: PathBuf,
    table: Generation<CidrTable>,
}

impl TableResolverCheck {
    pub fn new(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            table: Generation::default(),
        }
    }
}

impl ResolverCheck for TableResolverCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, ip: IpAddr) -> bool {
        self.table.current().contains(ip)
    }
}

impl Refresh for TableResolverCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn refresh(&self) -> Result<()> {
        let table = CidrTable::load(&self.file)?;
        tracing::debug!(resolver = %self.name, networks = table.len(), "Loaded resolver networks");
        self.table.replace(table);
        Ok(())
    }
}

/// One check per `<provider>.txt` file in `dir`, sorted by provider name.
/// A missing directory yields no checks.
pub fn discover_resolver_checks(dir: &Path) -> Result<Vec<Arc<TableResolverCheck>>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut checks = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read resolver directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "txt") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                checks.push(Arc::new(TableResolverCheck::new(stem, path.clone())));
            }
        }
    }
    checks.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(checks)
}
