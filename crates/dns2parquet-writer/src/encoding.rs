use parquet::basic::Compression;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use parquet::format::KeyValue;
use std::sync::OnceLock;

pub use dns2parquet_config::DEFAULT_ROW_GROUP_SIZE;

/// Rows buffered in memory before they are encoded as one record batch.
pub const WRITE_BATCH_SIZE: usize = 32 * 1024;

static ROW_GROUP_SIZE: OnceLock<usize> = OnceLock::new();

/// Configure the process-wide Parquet row group size.
///
/// Must be called before the first partition writer is created. Subsequent
/// calls are ignored so every file of a process shares one layout.
pub fn set_parquet_row_group_size(row_group_size: usize) {
    if row_group_size == 0 {
        return;
    }

    let _ = ROW_GROUP_SIZE.set(row_group_size);
}

pub fn configured_row_group_size() -> usize {
    ROW_GROUP_SIZE
        .get()
        .copied()
        .unwrap_or(DEFAULT_ROW_GROUP_SIZE)
}

/// Shared writer properties (cached)
///
/// - Snappy compression
/// - Dictionary encoding enabled
/// - Page level statistics
/// - Loader version embedded in the file metadata
pub(crate) fn writer_properties() -> &'static WriterProperties {
    static PROPERTIES: OnceLock<WriterProperties> = OnceLock::new();
    PROPERTIES.get_or_init(|| {
        let metadata = vec![KeyValue {
            key: "dns2parquet.version".to_string(),
            value: Some(env!("CARGO_PKG_VERSION").to_string()),
        }];

        WriterProperties::builder()
            .set_dictionary_enabled(true)
            .set_statistics_enabled(EnabledStatistics::Page)
            .set_compression(Compression::SNAPPY)
            .set_data_page_size_limit(256 * 1024)
            .set_write_batch_size(WRITE_BATCH_SIZE)
            .set_max_row_group_size(configured_row_group_size())
            .set_dictionary_page_size_limit(128 * 1024)
            .set_key_value_metadata(Some(metadata))
            .build()
    })
}
