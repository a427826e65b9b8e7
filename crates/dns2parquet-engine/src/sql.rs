//! SQL rendering for partition registration and compaction.

use crate::engine::{Partition, PartitionValue, TablePartition};
use crate::error::{EngineError, Result};

/// Renders statements against `<database>.<table>`.
///
/// `columns` are the data columns, in table order, selected when a
/// partition is rewritten.
#[derive(Debug, Clone)]
pub struct SqlRenderer {
    database: String,
    columns: Vec<String>,
}

impl SqlRenderer {
    pub fn new(database: impl Into<String>, columns: Vec<String>) -> Result<Self> {
        let database = database.into();
        identifier(&database)?;
        for column in &columns {
            identifier(column)?;
        }
        Ok(Self { database, columns })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// `ALTER TABLE db.t ADD IF NOT EXISTS PARTITION (...) LOCATION '...'`
    pub fn add_partition(
        &self,
        table: &str,
        partitions: &[Partition],
        location: &str,
    ) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {}.{} ADD IF NOT EXISTS PARTITION ({}) LOCATION {}",
            self.database,
            identifier(table)?,
            assignments(partitions, ", ")?,
            quote(location)
        ))
    }

    /// Rewrite all files of one partition in place.
    pub fn compact(&self, partition: &TablePartition) -> Result<String> {
        let table = identifier(&partition.table)?;
        if self.columns.is_empty() {
            return Err(EngineError::Protocol(
                "no data columns configured for compaction".to_string(),
            ));
        }

        Ok(format!(
            "INSERT OVERWRITE TABLE {db}.{table} PARTITION ({spec}) SELECT {cols} FROM {db}.{table} WHERE {filter}",
            db = self.database,
            table = table,
            spec = assignments(&partition.partitions, ", ")?,
            cols = self.columns.join(", "),
            filter = assignments(&partition.partitions, " AND ")?,
        ))
    }
}

fn assignments(partitions: &[Partition], separator: &str) -> Result<String> {
    let mut parts = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let value = match &partition.value {
            PartitionValue::Int(v) => v.to_string(),
            PartitionValue::Str(s) => quote(s),
        };
        parts.push(format!("{}={}", identifier(&partition.name)?, value));
    }
    if parts.is_empty() {
        return Err(EngineError::MissingPartitionValue("<none>".to_string()));
    }
    Ok(parts.join(separator))
}

fn identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(EngineError::InvalidIdentifier(name.to_string()))
    }
}

/// Single-quoted SQL string literal.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> SqlRenderer {
        SqlRenderer::new("dns", vec!["time".into(), "qname".into()]).unwrap()
    }

    fn day(server: &str) -> Vec<Partition> {
        vec![
            Partition::int("year", 2024),
            Partition::int("month", 1),
            Partition::int("day", 15),
            Partition::string("server", server),
        ]
    }

    #[test]
    fn test_add_partition() {
        let sql = renderer()
            .add_partition("queries", &day("ns1.example.nl"), "/data/dns/queries/year=2024")
            .unwrap();
        assert_eq!(
            sql,
            "ALTER TABLE dns.queries ADD IF NOT EXISTS PARTITION (year=2024, month=1, day=15, server='ns1.example.nl') LOCATION '/data/dns/queries/year=2024'"
        );
    }

    #[test]
    fn test_compact() {
        let partition = TablePartition::new("queries", day("ns1"), "/data");
        let sql = renderer().compact(&partition).unwrap();
        assert_eq!(
            sql,
            "INSERT OVERWRITE TABLE dns.queries PARTITION (year=2024, month=1, day=15, server='ns1') SELECT time, qname FROM dns.queries WHERE year=2024 AND month=1 AND day=15 AND server='ns1'"
        );
    }

    #[test]
    fn test_literals_are_escaped() {
        let sql = renderer()
            .add_partition("queries", &day("o'brien"), "/tmp/it's")
            .unwrap();
        assert!(sql.contains("server='o''brien'"));
        assert!(sql.ends_with("LOCATION '/tmp/it''s'"));
    }

    #[test]
    fn test_identifiers_are_validated() {
        assert!(SqlRenderer::new("dns;drop", vec![]).is_err());
        assert!(renderer()
            .add_partition("queries x", &day("ns1"), "/data")
            .is_err());

        let bad = vec![Partition::int("year) --", 2024)];
        assert!(matches!(
            renderer().add_partition("queries", &bad, "/data"),
            Err(EngineError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_empty_partition_spec_is_rejected() {
        assert!(renderer().add_partition("queries", &[], "/data").is_err());
    }
}
