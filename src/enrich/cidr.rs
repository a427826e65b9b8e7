//! Longest-prefix lookup tables loaded from plain text.
//!
//! One entry per line: `<cidr>[,<value>]`. Blank lines and lines starting
//! with `#` are ignored. A bare address is a host route.

use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct CidrTable {
    // prefix length -> masked network -> value
    v4: BTreeMap<u8, HashMap<u32, String>>,
    v6: BTreeMap<u8, HashMap<u128, String>>,
}

impl CidrTable {
    pub fn parse(content: &str) -> Result<Self> {
        let mut table = Self::default();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (cidr, value) = match line.split_once(',') {
                Some((cidr, value)) => (cidr.trim(), value.trim()),
                None => (line, ""),
            };
            table
                .insert(cidr, value)
                .with_context(|| format!("line {}: '{}'", index + 1, line))?;
        }
        Ok(table)
    }

    /// Load `path`; a missing file yields an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn insert(&mut self, cidr: &str, value: &str) -> Result<()> {
        let (addr, prefix) = match cidr.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr, None),
        };
        let addr: IpAddr = addr.parse().context("invalid address")?;
        let prefix = match prefix {
            Some(p) => Some(p.parse::<u8>().context("invalid prefix length")?),
            None => None,
        };

        match addr {
            IpAddr::V4(v4) => {
                let len = prefix.unwrap_or(32);
                if len > 32 {
                    bail!("prefix length {} exceeds 32", len);
                }
                self.v4
                    .entry(len)
                    .or_default()
                    .insert(u32::from(v4) & mask_v4(len), value.to_string());
            }
            IpAddr::V6(v6) => {
                let len = prefix.unwrap_or(128);
                if len > 128 {
                    bail!("prefix length {} exceeds 128", len);
                }
                self.v6
                    .entry(len)
                    .or_default()
                    .insert(u128::from(v6) & mask_v6(len), value.to_string());
            }
        }
        Ok(())
    }

    /// Value of the most specific network containing `ip`.
    pub fn lookup(&self, ip: IpAddr) -> Option<&str> {
        let value = match ip {
            IpAddr::V4(v4) => {
                let bits = u32::from(v4);
                self.v4
                    .iter()
                    .rev()
                    .find_map(|(len, nets)| nets.get(&(bits & mask_v4(*len))))
            }
            IpAddr::V6(v6) => {
                let bits = u128::from(v6);
                self.v6
                    .iter()
                    .rev()
                    .find_map(|(len, nets)| nets.get(&(bits & mask_v6(*len))))
            }
        };
        value.map(String::as_str)
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.lookup(ip).is_some()
    }

    pub fn len(&self) -> usize {
        self.v4.values().map(HashMap::len).sum::<usize>()
            + self.v6.values().map(HashMap::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn mask_v4(len: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(len)).unwrap_or(0)
}

fn mask_v6(len: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(len)).unwrap_or(0)
}
