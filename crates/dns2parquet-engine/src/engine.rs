use crate::error::Result;
use crate::sql::SqlRenderer;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionValue {
    Int(i64),
    Str(String),
}

/// One `name=value` component of a partition spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    pub name: String,
    pub value: PartitionValue,
}

impl Partition {
    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value: PartitionValue::Int(value),
        }
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: PartitionValue::Str(value.into()),
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            PartitionValue::Int(v) => write!(f, "{}={}", self.name, v),
            PartitionValue::Str(v) => write!(f, "{}={}", self.name, v),
        }
    }
}

/// A table partition together with its storage location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TablePartition {
    pub table: String,
    pub partitions: Vec<Partition>,
    pub location: String,
}

impl TablePartition {
    pub fn new(
        table: impl Into<String>,
        partitions: Vec<Partition>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            partitions,
            location: location.into(),
        }
    }

    /// Stable identity used by the partition registry.
    pub fn key(&self) -> String {
        let spec = self
            .partitions
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.table, spec)
    }

    fn int_value(&self, name: &str) -> Option<i64> {
        self.partitions
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| match p.value {
                PartitionValue::Int(v) => Some(v),
                PartitionValue::Str(_) => None,
            })
    }

    /// Calendar day covered by the partition, from its `year`/`month`/`day` values.
    pub fn date(&self) -> Option<NaiveDate> {
        let year = i32::try_from(self.int_value("year")?).ok()?;
        let month = u32::try_from(self.int_value("month")?).ok()?;
        let day = u32::try_from(self.int_value("day")?).ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

impl fmt::Display for TablePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// The analytical engine that serves the written tables.
///
/// `execute` returns `Ok(false)` when the engine ran the statement and
/// reported a failure, and `Err` when the engine could not be reached or
/// answered with something unexpected.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    fn name(&self) -> &str;

    fn renderer(&self) -> &SqlRenderer;

    async fn execute(&self, statement: &str) -> Result<bool>;

    /// Make a partition visible. Safe to repeat.
    async fn add_partition(
        &self,
        table: &str,
        partitions: &[Partition],
        location: &str,
    ) -> Result<bool> {
        let statement = self.renderer().add_partition(table, partitions, location)?;
        self.execute(&statement).await
    }

    /// Rewrite a partition's small files into fewer large ones.
    async fn compact(&self, partition: &TablePartition) -> Result<bool> {
        let statement = self.renderer().compact(partition)?;
        self.execute(&statement).await
    }
}
