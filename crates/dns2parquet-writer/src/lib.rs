//! Bounded Parquet output for dns2parquet
//!
//! A [`PartitionWriter`] owns exactly one `<uuid>.parquet` file inside a
//! Hive-style partition directory. It accepts one [`Row`] at a time, survives
//! malformed rows and releases the file exactly once.

mod encoding;
mod error;
mod partition;
mod row;
mod writer;

pub use encoding::{
    configured_row_group_size, set_parquet_row_group_size, DEFAULT_ROW_GROUP_SIZE,
    WRITE_BATCH_SIZE,
};
pub use error::{ErrorCode, Result, WriterError};
pub use partition::{sanitize_server_name, PartitionKey};
pub use row::{Row, Value};
pub use writer::PartitionWriter;
