use crate::engine::QueryEngine;
use crate::error::Result;
use crate::sql::SqlRenderer;
use async_trait::async_trait;
use tracing::info;

/// Engine used when no query engine is configured: statements are logged
/// and reported as successful.
pub struct LoggingEngine {
    renderer: SqlRenderer,
}

impl LoggingEngine {
    pub fn new(renderer: SqlRenderer) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl QueryEngine for LoggingEngine {
    fn name(&self) -> &str {
        "none"
    }

    fn renderer(&self) -> &SqlRenderer {
        &self.renderer
    }

    async fn execute(&self, statement: &str) -> Result<bool> {
        info!(statement, "Query engine disabled, skipping statement");
        Ok(true)
    }
}
