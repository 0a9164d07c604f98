//! Shared test harness: a scriptable in-memory driver, a recording state
//! updater, and supervisor assembly helpers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::oneshot;

use allocvisor::{
    state_label, Allocation, ClientConfig, Driver, DriverContext, DriverError, DriverFactory,
    DriverHandle, DriverRef, ExecContext, HandleRef, NoopSink, ResourceUsage, RestartPolicy,
    StateUpdater, StatsError, Supervisor, TaskDefinition, TaskEvent, TaskState, WaitResult,
};

/// One recorded updater invocation.
#[derive(Clone, Debug)]
pub struct Update {
    pub state: Option<TaskState>,
    pub event: Option<TaskEvent>,
}

/// Updater that records every transition for later assertions.
#[derive(Default)]
pub struct RecordingUpdater {
    updates: Mutex<Vec<Update>>,
}

impl RecordingUpdater {
    pub fn snapshot(&self) -> Vec<Update> {
        self.updates.lock().unwrap().clone()
    }

    /// Polls until at least `count` updates have been recorded. Relies on
    /// paused-time auto-advance, so this never sleeps in real time; the
    /// virtual-time budget comfortably covers the full kill backoff.
    pub async fn wait_for(&self, count: usize) -> Vec<Update> {
        for _ in 0..10_000 {
            {
                let updates = self.updates.lock().unwrap();
                if updates.len() >= count {
                    return updates.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!(
            "timed out waiting for {count} updates; got {:?}",
            labels(&self.snapshot())
        );
    }
}

impl StateUpdater for RecordingUpdater {
    fn update(&self, _task_name: &str, state: Option<TaskState>, event: Option<TaskEvent>) {
        self.updates.lock().unwrap().push(Update { state, event });
    }
}

/// Collapses updates to `(state_label, event_label)` pairs for assertions.
pub fn labels(updates: &[Update]) -> Vec<(String, String)> {
    updates
        .iter()
        .map(|u| {
            (
                state_label(u.state).to_string(),
                u.event
                    .as_ref()
                    .map(|e| e.kind.as_label().to_string())
                    .unwrap_or_default(),
            )
        })
        .collect()
}

pub fn label_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(s, e)| (s.to_string(), e.to_string()))
        .collect()
}

struct HandleInner {
    result: Option<WaitResult>,
    waiters: Vec<oneshot::Sender<WaitResult>>,
}

/// A handle whose termination, shutdown, and stats behavior the test
/// scripts explicitly.
pub struct MockHandle {
    id: String,
    inner: Mutex<HandleInner>,
    shutdown_failures: Mutex<u32>,
    stats_result: Mutex<Result<ResourceUsage, StatsError>>,
}

impl MockHandle {
    fn new(id: String, shutdown_failures: u32, stats_result: Result<ResourceUsage, StatsError>) -> Arc<Self> {
        Arc::new(Self {
            id,
            inner: Mutex::new(HandleInner {
                result: None,
                waiters: Vec::new(),
            }),
            shutdown_failures: Mutex::new(shutdown_failures),
            stats_result: Mutex::new(stats_result),
        })
    }

    /// Delivers the terminal result to every waiter, past and future.
    pub fn complete(&self, result: WaitResult) {
        let mut inner = self.inner.lock().unwrap();
        if inner.result.is_some() {
            return;
        }
        inner.result = Some(result.clone());
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }
}

#[async_trait]
impl DriverHandle for MockHandle {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn wait_ch(&self) -> oneshot::Receiver<WaitResult> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap();
        match &inner.result {
            Some(result) => {
                let _ = tx.send(result.clone());
            }
            None => inner.waiters.push(tx),
        }
        rx
    }

    async fn stats(&self) -> Result<ResourceUsage, StatsError> {
        self.stats_result.lock().unwrap().clone()
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        {
            let mut failures = self.shutdown_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(DriverError::new("shutdown refused"));
            }
        }
        self.complete(WaitResult::failed("task killed"));
        Ok(())
    }
}

/// Driver whose start outcomes and handle behavior are scripted per test.
#[derive(Default)]
pub struct MockDriver {
    start_failures: Mutex<VecDeque<DriverError>>,
    handles: Mutex<Vec<Arc<MockHandle>>>,
    shutdown_failures: Mutex<u32>,
    stats_result: Mutex<Option<ResourceUsage>>,
}

impl MockDriver {
    /// Queues `times` start failures before starts succeed again.
    pub fn fail_next_starts(&self, err: DriverError, times: usize) {
        let mut failures = self.start_failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(err.clone());
        }
    }

    /// Newly created handles will refuse shutdown `n` times.
    pub fn set_shutdown_failures(&self, n: u32) {
        *self.shutdown_failures.lock().unwrap() = n;
    }

    /// Newly created handles will report this usage instead of
    /// `StatsError::NotImplemented`.
    pub fn set_stats(&self, usage: ResourceUsage) {
        *self.stats_result.lock().unwrap() = Some(usage);
    }

    pub fn last_handle(&self) -> Option<Arc<MockHandle>> {
        self.handles.lock().unwrap().last().cloned()
    }

    pub fn handles_created(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    fn make_handle(&self, id: String) -> Arc<MockHandle> {
        let stats = self
            .stats_result
            .lock()
            .unwrap()
            .clone()
            .map(Ok)
            .unwrap_or(Err(StatsError::NotImplemented));
        let handle = MockHandle::new(id, *self.shutdown_failures.lock().unwrap(), stats);
        self.handles.lock().unwrap().push(Arc::clone(&handle));
        handle
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn start(
        &self,
        _ctx: &ExecContext,
        _task: &TaskDefinition,
    ) -> Result<HandleRef, DriverError> {
        if let Some(err) = self.start_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let id = format!("h{}", self.handles_created() + 1);
        Ok(self.make_handle(id))
    }

    async fn open(&self, _ctx: &ExecContext, handle_id: &str) -> Result<HandleRef, DriverError> {
        Ok(self.make_handle(handle_id.to_string()))
    }
}

/// Factory returning the shared mock driver, optionally failing instead.
pub struct MockFactory {
    pub driver: Arc<MockDriver>,
    pub fail_with: Mutex<Option<DriverError>>,
}

impl DriverFactory for MockFactory {
    fn create(&self, _ctx: &DriverContext) -> Result<DriverRef, DriverError> {
        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(Arc::clone(&self.driver) as DriverRef)
    }
}

/// A fully wired supervisor over the mock driver.
pub struct Harness {
    pub supervisor: Arc<Supervisor>,
    pub updater: Arc<RecordingUpdater>,
    pub driver: Arc<MockDriver>,
    pub factory: Arc<MockFactory>,
    // Keeps the state directory alive for the supervisor's lifetime.
    pub state_dir: TempDir,
}

pub fn harness(restart_policy: RestartPolicy) -> Harness {
    let state_dir = TempDir::new().unwrap();
    harness_in(restart_policy, state_dir)
}

pub fn harness_in(restart_policy: RestartPolicy, state_dir: TempDir) -> Harness {
    let config = ClientConfig {
        state_dir: state_dir.path().to_path_buf(),
        restart_policy,
        ..ClientConfig::default()
    };

    let updater = Arc::new(RecordingUpdater::default());
    let driver = Arc::new(MockDriver::default());
    let factory = Arc::new(MockFactory {
        driver: Arc::clone(&driver),
        fail_with: Mutex::new(None),
    });

    let supervisor = Supervisor::new(
        config,
        Arc::clone(&updater) as Arc<dyn StateUpdater>,
        Allocation::new("a1", "migrate-orders", "src"),
        TaskDefinition::new("extract", "mysql"),
        Arc::clone(&factory) as Arc<dyn DriverFactory>,
        Arc::new(NoopSink),
    );

    Harness {
        supervisor,
        updater,
        driver,
        factory,
        state_dir,
    }
}

/// A policy with a short deterministic delay, handy for scenario tests.
pub fn quick_policy(attempts: u32) -> RestartPolicy {
    RestartPolicy {
        attempts,
        interval: Duration::from_secs(300),
        delay: Duration::from_millis(50),
        ..RestartPolicy::default()
    }
}
