//! Scan scheduler - one supervised background worker per clone.
//!
//! Each worker loops detection + remediation against the current facts,
//! sleeps for its clone's scan interval, and retries after a short
//! backoff on failure instead of dying. Stopping trips an AtomicBool +
//! Notify pair and joins with a bounded timeout; a worker that fails to
//! observe the signal in time is aborted. Workers for different clones
//! share no locks.

use dolly_common::{CloneStatus, ScanStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::clone::CloneHandle;
use crate::config::DaemonConfig;
use crate::snapshot::SnapshotSource;

/// Scheduler tuning knobs
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Fallback interval for clones configured with zero seconds
    pub default_interval_secs: u64,
    /// Delay before retrying after a failed cycle
    pub backoff_secs: u64,
    /// Bound on waiting for a worker to observe its stop signal
    pub stop_timeout_secs: u64,
}

impl From<&DaemonConfig> for ScanConfig {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            default_interval_secs: config.scan_interval_secs,
            backoff_secs: config.scan_backoff_secs,
            stop_timeout_secs: config.stop_timeout_secs,
        }
    }
}

struct Worker {
    stopping: Arc<AtomicBool>,
    notify: Arc<Notify>,
    handle: JoinHandle<()>,
}

pub struct ScanScheduler {
    workers: Mutex<HashMap<String, Worker>>,
    source: Arc<dyn SnapshotSource>,
    config: ScanConfig,
}

impl ScanScheduler {
    pub fn new(source: Arc<dyn SnapshotSource>, config: ScanConfig) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            source,
            config,
        }
    }

    /// Launch the scan worker for a clone. At most one worker runs per
    /// clone; an existing one is stopped first.
    pub async fn start_scan(&self, clone: CloneHandle) {
        self.stop_scan(&clone.id).await;

        let stopping = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());

        let handle = tokio::spawn(scan_loop(
            clone.clone(),
            self.source.clone(),
            self.config.clone(),
            stopping.clone(),
            notify.clone(),
        ));

        info!("Started scan worker for clone {}", clone.id);
        let replaced = self.workers.lock().await.insert(
            clone.id.clone(),
            Worker {
                stopping,
                notify,
                handle,
            },
        );

        // Two racing starts can both pass stop_scan; the loser is aborted
        if let Some(old) = replaced {
            old.stopping.store(true, Ordering::SeqCst);
            old.handle.abort();
        }
    }

    /// Stop the worker for a clone, waiting a bounded time for it to
    /// observe the signal before force-terminating it. Returns whether a
    /// worker existed.
    pub async fn stop_scan(&self, clone_id: &str) -> bool {
        let worker = self.workers.lock().await.remove(clone_id);
        let worker = match worker {
            Some(w) => w,
            None => return false,
        };

        worker.stopping.store(true, Ordering::SeqCst);
        worker.notify.notify_one();

        let mut handle = worker.handle;
        let wait = Duration::from_secs(self.config.stop_timeout_secs);
        if timeout(wait, &mut handle).await.is_err() {
            warn!("Scan worker for {} missed stop signal, aborting", clone_id);
            handle.abort();
        }

        info!("Stopped scan worker for clone {}", clone_id);
        true
    }

    /// Stop every worker, used on daemon shutdown
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.workers.lock().await.keys().cloned().collect();
        for id in ids {
            self.stop_scan(&id).await;
        }
    }

    /// Whether a worker is registered for this clone
    pub async fn is_scanning(&self, clone_id: &str) -> bool {
        self.workers.lock().await.contains_key(clone_id)
    }
}

async fn scan_loop(
    clone: CloneHandle,
    source: Arc<dyn SnapshotSource>,
    config: ScanConfig,
    stopping: Arc<AtomicBool>,
    notify: Arc<Notify>,
) {
    debug!("Scan worker for {} running", clone.id);

    loop {
        if stopping.load(Ordering::SeqCst) {
            break;
        }

        let mut interval_secs = config.default_interval_secs;
        let cycle = run_cycle(&clone, &source, &mut interval_secs).await;

        let sleep_secs = match cycle {
            Ok(Some((findings, solutions))) => {
                debug!(
                    "Scan cycle for {}: {} findings, {} solutions",
                    clone.id, findings, solutions
                );
                interval_secs
            }
            // Clone left the fleet's working set; the worker retires
            Ok(None) => break,
            Err(e) => {
                error!("Scan cycle for {} failed: {}. Backing off", clone.id, e);
                let mut state = clone.lock().await;
                state.record.scan_status = ScanStatus::Error;
                config.backoff_secs
            }
        };

        if stopping.load(Ordering::SeqCst) {
            break;
        }
        // Interruptible sleep: the stop signal cuts it short
        let _ = timeout(Duration::from_secs(sleep_secs.max(1)), notify.notified()).await;
    }

    debug!("Scan worker for {} exited", clone.id);
}

/// One detection + remediation cycle. Returns None when the clone has
/// been stopped and the worker should retire.
async fn run_cycle(
    clone: &CloneHandle,
    source: &Arc<dyn SnapshotSource>,
    interval_secs: &mut u64,
) -> anyhow::Result<Option<(usize, usize)>> {
    {
        let mut state = clone.lock().await;
        if state.record.status == CloneStatus::Stopped {
            info!("Clone {} is stopped, retiring its scan worker", clone.id);
            return Ok(None);
        }
        state.record.scan_status = ScanStatus::Scanning;
        if state.record.scan_interval_secs > 0 {
            *interval_secs = state.record.scan_interval_secs;
        }
    }

    // Fact gathering happens outside the clone lock
    let snapshot = source.snapshot()?;
    let log_lines = source.log_lines()?;

    let mut state = clone.lock().await;
    let counts = state.run_scan(&snapshot, &log_lines);
    state.record.scan_status = ScanStatus::Idle;
    Ok(Some(counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternRegistry;
    use crate::snapshot::StaticSource;
    use dolly_common::{CloneRecord, Device, NetworkSnapshot, Specialization};

    fn test_config() -> ScanConfig {
        ScanConfig {
            default_interval_secs: 1,
            backoff_secs: 1,
            stop_timeout_secs: 2,
        }
    }

    fn clone_handle(interval_secs: u64) -> CloneHandle {
        let mut record = CloneRecord::new("Scanner", Specialization::Network, 0.5, 0.7);
        record.scan_interval_secs = interval_secs;
        CloneHandle::new(record, Arc::new(PatternRegistry::builtin()), 100)
    }

    fn source_with_finding() -> Arc<StaticSource> {
        Arc::new(StaticSource::new(
            NetworkSnapshot {
                captured_at: None,
                devices: vec![Device {
                    id: "dev1".to_string(),
                    name: "Router".to_string(),
                    kind: "router".to_string(),
                    firmware_updated: false,
                    security_score: 90,
                }],
                connections: vec![],
            },
            vec![],
        ))
    }

    async fn wait_for_scan(clone: &CloneHandle) -> bool {
        for _ in 0..50 {
            if clone.record().await.last_scan_at.is_some() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_worker_scans_and_stops_bounded() {
        let scheduler = ScanScheduler::new(source_with_finding(), test_config());
        let clone = clone_handle(3600);

        scheduler.start_scan(clone.clone()).await;
        assert!(wait_for_scan(&clone).await, "worker never completed a cycle");

        let record = clone.record().await;
        assert_eq!(record.scan_status, ScanStatus::Idle);
        {
            let state = clone.lock().await;
            assert_eq!(state.detector.history().len(), 1);
            assert_eq!(state.remediation.solutions().len(), 1);
        }

        let started = std::time::Instant::now();
        assert!(scheduler.stop_scan(&clone.id).await);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!scheduler.is_scanning(&clone.id).await);
    }

    #[tokio::test]
    async fn test_stop_without_worker_is_false() {
        let scheduler = ScanScheduler::new(source_with_finding(), test_config());
        assert!(!scheduler.stop_scan("clone_ghost").await);
    }

    #[tokio::test]
    async fn test_restart_replaces_worker() {
        let scheduler = ScanScheduler::new(source_with_finding(), test_config());
        let clone = clone_handle(3600);

        scheduler.start_scan(clone.clone()).await;
        scheduler.start_scan(clone.clone()).await;
        assert!(scheduler.is_scanning(&clone.id).await);

        scheduler.stop_scan(&clone.id).await;
        assert!(!scheduler.is_scanning(&clone.id).await);
    }

    #[tokio::test]
    async fn test_worker_retires_when_clone_stopped() {
        let scheduler = ScanScheduler::new(source_with_finding(), test_config());
        let clone = clone_handle(1);

        {
            let mut state = clone.lock().await;
            state.record.status = CloneStatus::Stopped;
        }

        scheduler.start_scan(clone.clone()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        // The worker saw the stopped status and never ran a cycle
        assert!(clone.record().await.last_scan_at.is_none());
    }
}
