//! Background registration and compaction of written partitions.
//!
//! The processing cycle hands every new partition to the supervisor and moves
//! on. Registration and compaction run as tokio tasks with bounded retries;
//! a final failure is logged and counted, never propagated.

use crate::engine::{QueryEngine, TablePartition};
use chrono::NaiveDate;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Base backoff between attempts.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Maximum backoff between attempts.
const BACKOFF_MAX: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: BACKOFF_BASE,
            max_delay: BACKOFF_MAX,
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Compacted partitions older than this many days are dropped from the
/// registry. Late files for them are registered again, which is idempotent.
const REGISTRY_RETENTION_DAYS: i64 = 7;

#[derive(Debug)]
struct RegistryEntry {
    partition: TablePartition,
    registered: bool,
    /// Bumped whenever new files arrive for a registered partition.
    generation: u64,
    /// Generation covered by the last successful compaction.
    compacted_generation: Option<u64>,
    in_flight: bool,
}

impl RegistryEntry {
    fn is_compacted(&self) -> bool {
        self.compacted_generation == Some(self.generation)
    }
}

type Registry = Arc<Mutex<HashMap<String, RegistryEntry>>>;

#[derive(Clone, Copy)]
enum Operation {
    Register,
    /// Compaction of the given registry generation.
    Compact(u64),
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::Compact(_) => "compact",
        }
    }
}

pub struct RegistrationSupervisor {
    engine: Arc<dyn QueryEngine>,
    handle: Handle,
    retry: RetryPolicy,
    registry: Registry,
    tasks: Mutex<Vec<JoinHandle<bool>>>,
}

impl RegistrationSupervisor {
    pub fn new(engine: Arc<dyn QueryEngine>, handle: Handle, retry: RetryPolicy) -> Self {
        Self {
            engine,
            handle,
            retry,
            registry: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Schedule registration of `partition`. Returns whether a task was spawned.
    ///
    /// A partition already registered in this process is not registered
    /// again, but new files make it eligible for another compaction, also
    /// when a compaction is running right now.
    pub fn submit(&self, partition: TablePartition) -> bool {
        let key = partition.key();
        {
            let mut registry = self.registry.lock();
            match registry.get_mut(&key) {
                Some(entry) if entry.registered => {
                    entry.generation += 1;
                    debug!(partition = %key, "Partition already registered");
                    return false;
                }
                Some(entry) if entry.in_flight => return false,
                Some(entry) => entry.in_flight = true,
                None => {
                    registry.insert(
                        key.clone(),
                        RegistryEntry {
                            partition: partition.clone(),
                            registered: false,
                            generation: 0,
                            compacted_generation: None,
                            in_flight: true,
                        },
                    );
                }
            }
        }

        self.spawn(Operation::Register, key, partition);
        true
    }

    /// Schedule compaction of every registered, uncompacted partition whose
    /// day ended before `today`. Returns the number of tasks spawned.
    ///
    /// Compacted partitions older than the retention window are evicted.
    pub fn compact_due(&self, today: NaiveDate) -> usize {
        let horizon = today - chrono::Duration::days(REGISTRY_RETENTION_DAYS);
        let due: Vec<(String, TablePartition, u64)> = {
            let mut registry = self.registry.lock();
            let before = registry.len();
            registry.retain(|_, e| {
                e.in_flight || !e.is_compacted() || e.partition.date().is_some_and(|d| d >= horizon)
            });
            let evicted = before - registry.len();
            if evicted > 0 {
                debug!(evicted, "Evicted compacted partitions from registry");
            }

            registry
                .iter_mut()
                .filter(|(_, e)| e.registered && !e.is_compacted() && !e.in_flight)
                .filter(|(_, e)| e.partition.date().is_some_and(|d| d < today))
                .map(|(key, e)| {
                    e.in_flight = true;
                    (key.clone(), e.partition.clone(), e.generation)
                })
                .collect()
        };

        let count = due.len();
        for (key, partition, generation) in due {
            self.spawn(Operation::Compact(generation), key, partition);
        }
        count
    }

    fn spawn(&self, operation: Operation, key: String, partition: TablePartition) {
        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let retry = self.retry;

        let task = self.handle.spawn(async move {
            let ok = run_with_retry(engine.as_ref(), operation, &partition, retry).await;

            if let Some(entry) = registry.lock().get_mut(&key) {
                entry.in_flight = false;
                match operation {
                    Operation::Register => entry.registered |= ok,
                    Operation::Compact(generation) if ok => {
                        entry.compacted_generation = Some(generation)
                    }
                    Operation::Compact(_) => {}
                }
            }
            ok
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    pub fn is_registered(&self, partition: &TablePartition) -> bool {
        self.registry
            .lock()
            .get(&partition.key())
            .is_some_and(|e| e.registered)
    }

    pub fn is_compacted(&self, partition: &TablePartition) -> bool {
        self.registry
            .lock()
            .get(&partition.key())
            .is_some_and(|e| e.is_compacted())
    }

    /// Partitions currently tracked by the registry.
    pub fn tracked(&self) -> usize {
        self.registry.lock().len()
    }

    /// Tasks spawned and not yet finished.
    pub fn pending(&self) -> usize {
        self.tasks.lock().iter().filter(|t| !t.is_finished()).count()
    }

    /// Wait up to `timeout` for outstanding tasks. Returns `true` when all
    /// of them finished in time; stragglers are aborted.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let tasks: Vec<JoinHandle<bool>> = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return true;
        }

        info!(tasks = tasks.len(), "Waiting for query engine tasks");
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        let wait = async {
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "Query engine task did not complete");
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(()) => true,
            Err(_) => {
                warn!(?timeout, "Timed out waiting for query engine tasks");
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }
}

async fn run_with_retry(
    engine: &dyn QueryEngine,
    operation: Operation,
    partition: &TablePartition,
    retry: RetryPolicy,
) -> bool {
    let mut attempt = 0;
    loop {
        let result = match operation {
            Operation::Register => {
                engine
                    .add_partition(&partition.table, &partition.partitions, &partition.location)
                    .await
            }
            Operation::Compact(_) => engine.compact(partition).await,
        };

        match result {
            Ok(true) => {
                match operation {
                    Operation::Register => {
                        counter!("engine.partition.registered", "table" => partition.table.clone())
                            .increment(1);
                        info!(partition = %partition, "Registered partition");
                    }
                    Operation::Compact(_) => {
                        counter!("engine.partition.compacted", "table" => partition.table.clone())
                            .increment(1);
                        info!(partition = %partition, "Compacted partition");
                    }
                }
                return true;
            }
            Ok(false) => {
                warn!(
                    partition = %partition,
                    operation = operation.as_str(),
                    attempt,
                    "Query engine reported failure"
                );
            }
            Err(e) => {
                warn!(
                    partition = %partition,
                    operation = operation.as_str(),
                    attempt,
                    error = %e,
                    "Query engine call failed"
                );
            }
        }

        if attempt >= retry.max_retries {
            break;
        }
        attempt += 1;
        tokio::time::sleep(retry.delay_for(attempt)).await;
    }

    counter!(
        "engine.partition.failed",
        "table" => partition.table.clone(),
        "operation" => operation.as_str()
    )
    .increment(1);
    error!(
        partition = %partition,
        operation = operation.as_str(),
        attempts = attempt + 1,
        "Giving up on partition"
    );
    false
}
