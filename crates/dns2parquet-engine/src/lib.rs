//! Query engine adapter for dns2parquet
//!
//! Newly written partitions are registered with an external analytical
//! engine and compacted once their day is over. The engine sits behind the
//! [`QueryEngine`] trait; [`RegistrationSupervisor`] drives it from
//! background tasks so the processing cycle never waits on it.

mod engine;
mod error;
mod http;
mod logging;
mod sql;
mod statement;
mod supervisor;

pub use engine::{Partition, PartitionValue, QueryEngine, TablePartition};
pub use error::{EngineError, Result};
pub use http::{HttpClient, HttpResponse, ReqwestHttpClient};
pub use logging::LoggingEngine;
pub use sql::SqlRenderer;
pub use statement::HttpQueryEngine;
pub use supervisor::{RegistrationSupervisor, RetryPolicy};
