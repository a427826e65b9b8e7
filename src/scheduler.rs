//! One processing cycle across all configured name servers.

use crate::context::{resolve_sources, SourceContext};
use crate::enrich::RefreshGate;
use crate::processor::{ProcessorFactory, RunStats};
use chrono::Utc;
use dns2parquet_config::InputConfig;
use dns2parquet_engine::RegistrationSupervisor;
use metrics::histogram;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Result of processing one source in one cycle.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Source name; empty for the default source.
    pub source: String,
    pub elapsed: Duration,
    pub stats: RunStats,
    /// Error or panic message when the run failed.
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub outcomes: Vec<RunOutcome>,
    pub refresh_failures: usize,
    pub submitted_partitions: usize,
    pub compactions: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }

    pub fn rows_written(&self) -> u64 {
        self.outcomes.iter().map(|o| o.stats.rows_written).sum()
    }
}

pub struct Scheduler {
    input: InputConfig,
    gate: RefreshGate,
    factory: Arc<dyn ProcessorFactory>,
    supervisor: Option<Arc<RegistrationSupervisor>>,
}

impl Scheduler {
    pub fn new(
        input: InputConfig,
        gate: RefreshGate,
        factory: Arc<dyn ProcessorFactory>,
        supervisor: Option<Arc<RegistrationSupervisor>>,
    ) -> Self {
        Self {
            input,
            gate,
            factory,
            supervisor,
        }
    }

    /// Refresh enrichment, then process every source in turn.
    ///
    /// A failing or panicking source is logged and the next one still runs.
    /// Blocks on file I/O; run it off the async executor.
    pub fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport {
            refresh_failures: self.gate.refresh_all(),
            ..CycleReport::default()
        };

        for source in resolve_sources(&self.input.name_servers) {
            let outcome = self.run_source(&source);
            report.outcomes.push(outcome);
        }

        if let Some(supervisor) = &self.supervisor {
            for partition in report
                .outcomes
                .iter()
                .flat_map(|o| o.stats.partitions.iter())
            {
                if supervisor.submit(partition.clone()) {
                    report.submitted_partitions += 1;
                }
            }
            report.compactions = supervisor.compact_due(Utc::now().date_naive());
        }

        report.elapsed = start.elapsed();
        info!(
            sources = report.outcomes.len(),
            failed = report.failed(),
            rows = report.rows_written(),
            partitions = report.submitted_partitions,
            compactions = report.compactions,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Completed loading data for name servers"
        );
        report
    }

    fn run_source(&self, source: &str) -> RunOutcome {
        let ctx = SourceContext::new(source, &self.input);
        let server = ctx.server_label().to_string();
        info!(server = %server, input = %ctx.input_dir().display(), "Start loading data for name server");

        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut processor = self.factory.create(&ctx)?;
            processor.execute()
        }));
        let elapsed = start.elapsed();

        histogram!("processor.execution.time", "server" => server.clone())
            .record(elapsed.as_secs_f64());

        let (stats, error) = match result {
            Ok(Ok(stats)) => {
                info!(
                    server = %server,
                    files = stats.files,
                    rows = stats.rows_written,
                    dropped = stats.rows_dropped,
                    partitions = stats.partitions.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Completed loading data for name server"
                );
                (stats, None)
            }
            Ok(Err(e)) => {
                let message = format!("{:#}", e);
                error!(server = %server, error = %message, "Error while processing name server");
                (RunStats::default(), Some(message))
            }
            Err(payload) => {
                let message = format!("panic: {}", panic_message(payload.as_ref()));
                error!(server = %server, error = %message, "Processing name server panicked");
                (RunStats::default(), Some(message))
            }
        };

        RunOutcome {
            source: source.to_string(),
            elapsed,
            stats,
            error,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
