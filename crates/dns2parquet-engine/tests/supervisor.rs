use async_trait::async_trait;
use chrono::NaiveDate;
use dns2parquet_engine::{
    EngineError, LoggingEngine, Partition, QueryEngine, RegistrationSupervisor, RetryPolicy,
    SqlRenderer, TablePartition,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every statement and fails the first `failures` of them.
struct FlakyEngine {
    renderer: SqlRenderer,
    failures: AtomicUsize,
    statements: Mutex<Vec<String>>,
    compact_delay: Duration,
}

impl FlakyEngine {
    fn new(failures: usize) -> Self {
        Self {
            renderer: SqlRenderer::new("dns", vec!["time".into(), "qname".into()]).unwrap(),
            failures: AtomicUsize::new(failures),
            statements: Mutex::new(Vec::new()),
            compact_delay: Duration::ZERO,
        }
    }

    fn with_compact_delay(mut self, delay: Duration) -> Self {
        self.compact_delay = delay;
        self
    }

    fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryEngine for FlakyEngine {
    fn name(&self) -> &str {
        "flaky"
    }

    fn renderer(&self) -> &SqlRenderer {
        &self.renderer
    }

    async fn execute(&self, statement: &str) -> dns2parquet_engine::Result<bool> {
        self.statements.lock().unwrap().push(statement.to_string());
        if statement.starts_with("INSERT OVERWRITE") && !self.compact_delay.is_zero() {
            tokio::time::sleep(self.compact_delay).await;
        }
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::Protocol("engine unavailable".into()));
        }
        Ok(true)
    }
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

fn partition(day: i64, server: &str) -> TablePartition {
    TablePartition::new(
        "dns",
        vec![
            Partition::int("year", 2024),
            Partition::int("month", 1),
            Partition::int("day", day),
            Partition::string("server", server),
        ],
        format!("/out/dns/year=2024/month=1/day={}/server={}", day, server),
    )
}

fn supervisor(engine: Arc<FlakyEngine>, max_retries: u32) -> RegistrationSupervisor {
    RegistrationSupervisor::new(
        engine,
        tokio::runtime::Handle::current(),
        fast_retry(max_retries),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registration_is_retried_until_it_succeeds() {
    let engine = Arc::new(FlakyEngine::new(2));
    let supervisor = supervisor(engine.clone(), 3);
    let p = partition(15, "ns1");

    assert!(supervisor.submit(p.clone()));
    assert!(supervisor.shutdown(Duration::from_secs(5)).await);

    assert!(supervisor.is_registered(&p));
    let statements = engine.statements();
    assert_eq!(statements.len(), 3);
    assert!(statements
        .iter()
        .all(|s| s.starts_with("ALTER TABLE dns.dns ADD IF NOT EXISTS PARTITION")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registration_gives_up_after_max_retries() {
    let engine = Arc::new(FlakyEngine::new(10));
    let supervisor = supervisor(engine.clone(), 2);
    let p = partition(15, "ns1");

    supervisor.submit(p.clone());
    assert!(supervisor.shutdown(Duration::from_secs(5)).await);

    assert!(!supervisor.is_registered(&p));
    assert_eq!(engine.statements().len(), 3);

    // A later cycle may try again.
    assert!(supervisor.submit(p));
    supervisor.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registered_partition_is_not_registered_twice() {
    let engine = Arc::new(FlakyEngine::new(0));
    let supervisor = supervisor(engine.clone(), 0);
    let p = partition(15, "ns1");

    assert!(supervisor.submit(p.clone()));
    supervisor.shutdown(Duration::from_secs(5)).await;
    assert!(!supervisor.submit(p.clone()));
    supervisor.shutdown(Duration::from_secs(5)).await;

    assert_eq!(engine.statements().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn only_finished_days_are_compacted_once() {
    let engine = Arc::new(FlakyEngine::new(0));
    let supervisor = supervisor(engine.clone(), 0);
    let yesterday = partition(14, "ns1");
    let today = partition(15, "ns1");

    supervisor.submit(yesterday.clone());
    supervisor.submit(today.clone());
    supervisor.shutdown(Duration::from_secs(5)).await;

    let today_date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    assert_eq!(supervisor.compact_due(today_date), 1);
    supervisor.shutdown(Duration::from_secs(5)).await;

    assert!(supervisor.is_compacted(&yesterday));
    assert!(!supervisor.is_compacted(&today));
    assert_eq!(supervisor.compact_due(today_date), 0);

    let compactions: Vec<_> = engine
        .statements()
        .into_iter()
        .filter(|s| s.starts_with("INSERT OVERWRITE"))
        .collect();
    assert_eq!(compactions.len(), 1);
    assert!(compactions[0].contains("day=14"));

    // New files for a compacted day make it due again.
    supervisor.submit(yesterday.clone());
    assert_eq!(supervisor.compact_due(today_date), 1);
    supervisor.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn files_added_during_compaction_keep_partition_due() {
    let engine = Arc::new(FlakyEngine::new(0).with_compact_delay(Duration::from_millis(200)));
    let supervisor = supervisor(engine.clone(), 0);
    let yesterday = partition(14, "ns1");
    let today_date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

    supervisor.submit(yesterday.clone());
    supervisor.shutdown(Duration::from_secs(5)).await;

    assert_eq!(supervisor.compact_due(today_date), 1);
    // New files while the compaction is still running
    assert!(!supervisor.submit(yesterday.clone()));
    assert!(supervisor.shutdown(Duration::from_secs(5)).await);

    assert!(!supervisor.is_compacted(&yesterday));
    assert_eq!(supervisor.compact_due(today_date), 1);
    assert!(supervisor.shutdown(Duration::from_secs(5)).await);
    assert!(supervisor.is_compacted(&yesterday));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn compacted_partitions_are_evicted_after_retention() {
    let engine = Arc::new(FlakyEngine::new(0));
    let supervisor = supervisor(engine.clone(), 0);
    let old = partition(1, "ns1");
    let uncompacted = partition(2, "ns1");

    supervisor.submit(old.clone());
    supervisor.shutdown(Duration::from_secs(5)).await;
    assert_eq!(
        supervisor.compact_due(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
        1
    );
    supervisor.shutdown(Duration::from_secs(5)).await;
    assert!(supervisor.is_compacted(&old));

    // Registered but not yet due when the retention window passes
    supervisor.submit(uncompacted.clone());
    supervisor.shutdown(Duration::from_secs(5)).await;
    assert_eq!(supervisor.tracked(), 2);

    let later = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
    assert_eq!(supervisor.compact_due(later), 1);
    supervisor.shutdown(Duration::from_secs(5)).await;
    assert_eq!(supervisor.tracked(), 1);
    assert!(!supervisor.is_registered(&old));
    assert!(supervisor.is_compacted(&uncompacted));

    // Late files for an evicted day register again
    assert!(supervisor.submit(old));
    supervisor.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logging_engine_always_succeeds() {
    let renderer = SqlRenderer::new("dns", vec!["qname".into()]).unwrap();
    let engine: Arc<dyn QueryEngine> = Arc::new(LoggingEngine::new(renderer));
    let supervisor = RegistrationSupervisor::new(
        engine,
        tokio::runtime::Handle::current(),
        fast_retry(0),
    );
    let p = partition(1, "default");

    supervisor.submit(p.clone());
    assert!(supervisor.shutdown(Duration::from_secs(5)).await);
    assert!(supervisor.is_registered(&p));
    assert_eq!(supervisor.pending(), 0);
}
