//! Decoded DNS records and their Parquet row layout.

use crate::enrich::Enrichment;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use dns2parquet_writer::{Row, Value};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
        }
    }
}

/// One DNS exchange as produced by the decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Capture time in milliseconds since the Unix epoch.
    pub time: i64,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub qname: String,
    pub qtype: u16,
    /// Absent when no response was captured.
    #[serde(default)]
    pub rcode: Option<u16>,
    pub protocol: Protocol,
    /// DNS message length in bytes.
    #[serde(default)]
    pub len: Option<u32>,
    pub id: u16,
}

/// A record plus its lookup results.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub record: DnsRecord,
    pub enrichment: Enrichment,
}

impl EnrichedRecord {
    /// Row matching [`dns_schema`]. Partition columns are not part of the row.
    pub fn to_row(&self) -> Row {
        let r = &self.record;
        Row::new(vec![
            Value::TimestampMillis(r.time),
            Value::Int32(i32::from(r.id)),
            Value::Utf8(r.qname.clone()),
            Value::Int32(i32::from(r.qtype)),
            r.rcode.map(i32::from).into(),
            Value::Utf8(r.src.to_string()),
            Value::Utf8(r.dst.to_string()),
            Value::Utf8(r.protocol.as_str().to_string()),
            r.len.and_then(|l| i32::try_from(l).ok()).into(),
            self.enrichment.country.clone().into(),
            self.enrichment.asn.clone().into(),
            self.enrichment.resolver.clone().into(),
        ])
    }
}

/// Schema of the data files. `year`, `month`, `day` and `server` live in the
/// directory layout.
pub fn dns_schema() -> SchemaRef {
    static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            Arc::new(Schema::new(vec![
                Field::new(
                    "time",
                    DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
                    false,
                ),
                Field::new("id", DataType::Int32, false),
                Field::new("qname", DataType::Utf8, false),
                Field::new("qtype", DataType::Int32, false),
                Field::new("rcode", DataType::Int32, true),
                Field::new("src", DataType::Utf8, false),
                Field::new("dst", DataType::Utf8, false),
                Field::new("protocol", DataType::Utf8, false),
                Field::new("len", DataType::Int32, true),
                Field::new("country", DataType::Utf8, true),
                Field::new("asn", DataType::Utf8, true),
                Field::new("resolver", DataType::Utf8, true),
            ]))
        })
        .clone()
}

/// Data column names in file order.
pub fn data_columns() -> Vec<String> {
    dns_schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}
