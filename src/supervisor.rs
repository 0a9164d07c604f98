//! # Single-task lifecycle supervision.
//!
//! [`Supervisor`] wraps one task within an allocation and provides its
//! execution context: it builds a driver, starts a handle, samples stats,
//! and drives the task through start, restart, kill, and destroy.
//!
//! # High-level architecture
//!
//! ```text
//!  allocation runner ──► Supervisor::run()
//!                             │
//!              ┌──────────────┼─────────────────┐
//!           prestart      WAIT select       StatsCollector
//!         (start signal)      │              (side channel)
//!                             ▼
//!         start_ch / handle wait / restart_ch / destroy_ch
//!                             │
//!                       RESTART gate ──► RestartTracker
//! ```
//!
//! External actors reach in through the thread-safe command methods
//! ([`Supervisor::restart`], [`Supervisor::kill`], [`Supervisor::destroy`],
//! [`Supervisor::unblock_start`]); every state transition flows out through
//! the injected [`StateUpdater`], with the snapshot persisted first.
//!
//! ## Ordering
//! All state emissions happen on the run-loop task, so the updater observes
//! a total order ending in `Dead`. The destroy token is the sole global
//! cancellation primitive; the kill executor's backoff sleeps deliberately
//! ignore it, bounding worst-case destroy latency instead of cutting
//! shutdown attempts short.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, RwLock,
};
use std::time::Duration;

use tokio::{
    sync::mpsc,
    time,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    alloc::{Allocation, TaskDefinition},
    config::ClientConfig,
    driver::{DriverContext, DriverFactory, DriverRef, ExecContext, HandleRef},
    error::{DriverError, PersistError, RestoreError},
    event::{StateUpdater, TaskEvent, TaskEventKind, TaskState},
    metrics::SinkHandle,
    persist::{PersistedSnapshot, StatePersistor},
    restart::{RestartState, RestartTracker},
    stats::{ResourceUsage, StatsCollector, StatsLabels},
};

/// Baseline for the exponential backoff while killing a task.
const KILL_BACKOFF_BASELINE: Duration = Duration::from_secs(5);

/// Cap on the kill backoff.
const KILL_BACKOFF_LIMIT: Duration = Duration::from_secs(120);

/// How many times a kill is attempted before giving up and potentially
/// leaking resources.
const KILL_FAILURE_LIMIT: u32 = 5;

/// Backoff before retry `attempt` (zero-based) of a failed kill.
fn kill_backoff(attempt: u32) -> Duration {
    KILL_BACKOFF_BASELINE
        .saturating_mul(4u32.saturating_pow(attempt))
        .min(KILL_BACKOFF_LIMIT)
}

/// One-shot destroy latch with its associated event.
#[derive(Default)]
struct DestroyLatch {
    destroyed: bool,
    event: Option<TaskEvent>,
}

/// Supervises the lifecycle of a single task within an allocation.
pub struct Supervisor {
    config: Arc<ClientConfig>,
    updater: Arc<dyn StateUpdater>,
    alloc: Arc<Allocation>,
    factory: Arc<dyn DriverFactory>,
    sink: SinkHandle,

    tracker: Mutex<RestartTracker>,
    task: RwLock<TaskDefinition>,
    handle: Mutex<Option<HandleRef>>,
    running: AtomicBool,
    payload_rendered: AtomicBool,
    latest_stats: Arc<RwLock<Option<ResourceUsage>>>,

    // Serializes snapshot i/o together with the fields it reads.
    persistor: Mutex<StatePersistor>,

    start_tx: mpsc::Sender<()>,
    start_rx: Mutex<Option<mpsc::Receiver<()>>>,
    restart_tx: mpsc::Sender<TaskEvent>,
    restart_rx: Mutex<Option<mpsc::Receiver<TaskEvent>>>,

    unblocked: Mutex<bool>,
    unblock_token: CancellationToken,
    destroy: Mutex<DestroyLatch>,
    destroy_token: CancellationToken,
    done_token: CancellationToken,
}

impl Supervisor {
    /// Creates a supervisor for `task` inside `alloc`.
    ///
    /// Nothing happens until [`Supervisor::run`] is driven on its own task;
    /// call [`Supervisor::mark_received`] first and optionally
    /// [`Supervisor::restore_state`] in between.
    pub fn new(
        config: ClientConfig,
        updater: Arc<dyn StateUpdater>,
        alloc: Allocation,
        task: TaskDefinition,
        factory: Arc<dyn DriverFactory>,
        sink: SinkHandle,
    ) -> Arc<Self> {
        // The start signal coalesces: pending requests collapse to at most
        // one buffered send.
        let (start_tx, start_rx) = mpsc::channel(1);
        let (restart_tx, restart_rx) = mpsc::channel(1);

        let persistor = StatePersistor::for_task(&config.state_dir, &alloc.id, &task.task_type);
        let tracker = RestartTracker::new(config.restart_policy);

        Arc::new(Self {
            config: Arc::new(config),
            updater,
            alloc: Arc::new(alloc),
            factory,
            sink,
            tracker: Mutex::new(tracker),
            task: RwLock::new(task),
            handle: Mutex::new(None),
            running: AtomicBool::new(false),
            payload_rendered: AtomicBool::new(false),
            latest_stats: Arc::new(RwLock::new(None)),
            persistor: Mutex::new(persistor),
            start_tx,
            start_rx: Mutex::new(Some(start_rx)),
            restart_tx,
            restart_rx: Mutex::new(Some(restart_rx)),
            unblocked: Mutex::new(false),
            unblock_token: CancellationToken::new(),
            destroy: Mutex::new(DestroyLatch::default()),
            destroy_token: CancellationToken::new(),
            done_token: CancellationToken::new(),
        })
    }

    /// Reports the task as received. Called exactly once by the allocation
    /// runner before [`Supervisor::run`].
    pub fn mark_received(&self) {
        self.updater.update(
            &self.task_type(),
            Some(TaskState::Pending),
            Some(TaskEvent::new(TaskEventKind::Received)),
        );
    }

    /// Returns a token that is cancelled when [`Supervisor::run`] exits.
    pub fn wait_token(&self) -> CancellationToken {
        self.done_token.child_token()
    }

    /// Whether the task currently has a live handle that has not reported
    /// termination.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the last resource usage sample, if the task is running.
    pub fn latest_task_stats(&self) -> Option<ResourceUsage> {
        if !self.is_running() {
            return None;
        }
        self.latest_stats.read().unwrap().clone()
    }

    /// Requests a graceful restart of the running task.
    ///
    /// Returns without effect if the supervisor has already exited. A
    /// triggered restart does not consume the restart budget.
    pub async fn restart(&self, source: &str, reason: &str) {
        let reason = format!("{source}: {reason}");
        let event = TaskEvent::new(TaskEventKind::RestartSignal).with_restart_reason(reason);

        tokio::select! {
            _ = self.restart_tx.send(event) => {}
            _ = self.done_token.cancelled() => {}
        }
    }

    /// Kills the task and stops restarting it. With `fail` set, the task is
    /// additionally marked as failed.
    pub fn kill(&self, source: &str, reason: &str, fail: bool) {
        let reason = format!("{source}: {reason}");
        let mut event = TaskEvent::new(TaskEventKind::Killing).with_kill_reason(reason.clone());
        if fail {
            event = event.fails_task();
        }

        debug!(
            task = %self.task_type(),
            alloc = %self.alloc.id,
            %reason,
            "killing task"
        );
        self.destroy(event);
    }

    /// Requests permanent teardown. Idempotent; only the first event is
    /// kept as the destroy context.
    pub fn destroy(&self, event: TaskEvent) {
        let mut latch = self.destroy.lock().unwrap();
        if latch.destroyed {
            return;
        }
        latch.destroyed = true;
        latch.event = Some(event);
        self.destroy_token.cancel();
    }

    /// Unblocks the starting of the task once prerequisite rendering has
    /// completed. Idempotent.
    pub fn unblock_start(&self, source: &str) {
        let mut unblocked = self.unblocked.lock().unwrap();
        if *unblocked {
            return;
        }

        debug!(
            task = %self.task_type(),
            alloc = %self.alloc.id,
            %source,
            "unblocking task start"
        );
        *unblocked = true;
        self.unblock_token.cancel();
    }

    /// Restores durable state from the snapshot, replacing the task
    /// definition and re-opening the persisted handle when there is one.
    ///
    /// A handle that fails to open is not an error: the run loop will
    /// simply create a fresh one.
    pub async fn restore_state(&self) -> Result<(), RestoreError> {
        let snapshot = self.persistor.lock().unwrap().restore()?;

        {
            let mut task = self.task.write().unwrap();
            *task = snapshot.task;
        }
        self.payload_rendered
            .store(snapshot.payload_rendered, Ordering::SeqCst);

        // The restored definition may carry a different type; re-derive the
        // snapshot path so later saves follow it.
        {
            let mut persistor = self.persistor.lock().unwrap();
            *persistor = StatePersistor::for_task(
                &self.config.state_dir,
                &self.alloc.id,
                &self.task_type(),
            );
        }

        if !snapshot.handle_id.is_empty() {
            let driver = self.create_driver()?;
            let ctx = self.exec_context();
            match driver.open(&ctx, &snapshot.handle_id).await {
                Ok(handle) => {
                    *self.handle.lock().unwrap() = Some(handle);
                    self.running.store(true, Ordering::SeqCst);
                }
                Err(err) => {
                    error!(
                        task = %self.task_type(),
                        alloc = %self.alloc.id,
                        handle_id = %snapshot.handle_id,
                        error = %err,
                        "failed to open persisted handle, task will be relaunched"
                    );
                }
            }
        }
        Ok(())
    }

    /// Writes the current snapshot.
    pub fn save_state(&self) -> Result<(), PersistError> {
        let persistor = self.persistor.lock().unwrap();

        let snapshot = {
            let task = self.task.read().unwrap();
            let handle_id = self
                .handle
                .lock()
                .unwrap()
                .as_ref()
                .map(|h| h.id())
                .unwrap_or_default();
            PersistedSnapshot {
                version: self.config.version.clone(),
                task: task.clone(),
                handle_id,
                payload_rendered: self.payload_rendered.load(Ordering::SeqCst),
            }
        };

        persistor.persist(&snapshot)
    }

    /// Removes the snapshot from disk.
    pub fn destroy_state(&self) -> Result<(), PersistError> {
        self.persistor.lock().unwrap().destroy()
    }

    /// Runs the task to completion. Must be driven on its own concurrent
    /// task; everything else talks to the supervisor through the command
    /// methods.
    pub async fn run(self: Arc<Self>) {
        let _done = self.done_token.clone().drop_guard();

        debug!(
            task = %self.task_type(),
            alloc = %self.alloc.id,
            "starting task supervision"
        );

        // Build a throwaway driver to prove the task is viable at all.
        if let Err(err) = self.create_driver() {
            self.set_state(
                Some(TaskState::Dead),
                Some(
                    TaskEvent::new(TaskEventKind::SetupFailure)
                        .with_setup_error(err.to_string())
                        .fails_task(),
                ),
            );
            return;
        }

        self.run_loop().await;
    }

    /// The main run loop: multiplexes start requests, handle termination,
    /// restart requests, and destroy, then consults the restart gate.
    async fn run_loop(&self) {
        let mut start_rx = self
            .start_rx
            .lock()
            .unwrap()
            .take()
            .expect("run may only be called once");
        let mut restart_rx = self
            .restart_rx
            .lock()
            .unwrap()
            .take()
            .expect("run may only be called once");

        let mut wait_rx = None;
        let mut stop_collection: Option<CancellationToken> = None;

        // A restored handle already exists; start sampling it and take its
        // wait channel so the invariants below hold from the first select.
        if let Some(handle) = self.current_handle() {
            stop_collection = Some(self.spawn_collector(&handle));
            wait_rx = Some(handle.wait_ch());
        }

        loop {
            let (prestart_tx, mut prestart_rx) = mpsc::channel(1);
            self.spawn_prestart(prestart_tx);
            let mut prestart_done = false;

            // WAIT
            loop {
                tokio::select! {
                    result = prestart_rx.recv(), if !prestart_done => {
                        match result {
                            Some(true) => prestart_done = true,
                            _ => {
                                self.set_state(Some(TaskState::Dead), None);
                                return;
                            }
                        }
                    }

                    _ = start_rx.recv() => {
                        // Only act when no handle exists yet; after a
                        // restore the start signal is a no-op.
                        if self.current_handle().is_none() {
                            match self.start_task().await {
                                Err(err) => {
                                    self.tracker.lock().unwrap().set_start_error(err.clone());
                                    self.set_state(
                                        None,
                                        Some(
                                            TaskEvent::new(TaskEventKind::DriverFailure)
                                                .with_driver_error(err.to_string()),
                                        ),
                                    );
                                    break;
                                }
                                Ok(()) => {
                                    self.set_state(
                                        Some(TaskState::Running),
                                        Some(TaskEvent::new(TaskEventKind::Started)),
                                    );
                                    self.running.store(true, Ordering::SeqCst);

                                    let handle = self
                                        .current_handle()
                                        .expect("handle installed by start_task");
                                    if stop_collection.is_none() {
                                        stop_collection = Some(self.spawn_collector(&handle));
                                    }
                                    wait_rx = Some(handle.wait_ch());
                                }
                            }
                        }
                    }

                    result = async { wait_rx.as_mut().expect("guarded by is_some").await },
                        if wait_rx.is_some() =>
                    {
                        let result = match result {
                            Ok(result) => result,
                            Err(_) => panic!("driver wait channel closed without a result"),
                        };

                        self.running.store(false, Ordering::SeqCst);
                        if let Some(stop) = stop_collection.take() {
                            stop.cancel();
                        }

                        self.tracker.lock().unwrap().set_wait_result(result.clone());
                        self.set_state(
                            None,
                            Some(
                                TaskEvent::new(TaskEventKind::Terminated)
                                    .with_exit_message(result.message.clone()),
                            ),
                        );
                        if result.successful {
                            info!(
                                task = %self.task_type(),
                                alloc = %self.alloc.id,
                                message = %result.message,
                                "task exited"
                            );
                        } else {
                            error!(
                                task = %self.task_type(),
                                alloc = %self.alloc.id,
                                message = %result.message,
                                "task failed"
                            );
                        }
                        break;
                    }

                    event = restart_rx.recv() => {
                        let Some(event) = event else { continue };
                        if !self.is_running() {
                            debug!(
                                task = %self.task_type(),
                                alloc = %self.alloc.id,
                                "skipping restart, task is not running"
                            );
                            continue;
                        }

                        debug!(
                            task = %self.task_type(),
                            alloc = %self.alloc.id,
                            reason = ?event.restart_reason,
                            "restarting task"
                        );
                        self.set_state(Some(TaskState::Running), Some(event));
                        self.kill_task(None).await;

                        if let Some(stop) = stop_collection.take() {
                            stop.cancel();
                        }
                        if let Some(rx) = wait_rx.take() {
                            let _ = rx.await;
                        }

                        // The restart is not caused by a failure; restart
                        // immediately without consuming the budget.
                        self.tracker.lock().unwrap().set_restart_triggered();
                        break;
                    }

                    _ = self.destroy_token.cancelled() => {
                        let destroy_event = self.destroy_event();
                        if !self.is_running() {
                            self.set_state(Some(TaskState::Dead), destroy_event);
                            return;
                        }

                        // A Killed event comes from the allocation runner and
                        // adds no detail; a Killing event doubles as the kill
                        // context; anything else is surfaced on its own
                        // before a plain kill.
                        let mut kill_event = None;
                        if let Some(event) = destroy_event {
                            match event.kind {
                                TaskEventKind::Killed => {}
                                TaskEventKind::Killing => kill_event = Some(event),
                                _ => self.set_state(Some(TaskState::Running), Some(event)),
                            }
                        }

                        self.kill_task(kill_event).await;
                        if let Some(stop) = stop_collection.take() {
                            stop.cancel();
                        }
                        // Wait for the handle to exit before reporting Dead.
                        if let Some(rx) = wait_rx.take() {
                            let _ = rx.await;
                        }

                        self.set_state(Some(TaskState::Dead), None);
                        return;
                    }
                }
            }

            // RESTART
            if !self.should_restart().await {
                return;
            }

            // Clear the handle so a fresh driver start is performed.
            *self.handle.lock().unwrap() = None;
            wait_rx = None;
            stop_collection = None;
        }
    }

    /// Consults the restart tracker and applies its decision, including the
    /// interruptible delay. Returns whether the outer loop should continue.
    async fn should_restart(&self) -> bool {
        let (state, delay, reason) = {
            let mut tracker = self.tracker.lock().unwrap();
            let (state, delay) = tracker.get_state();
            (state, delay, tracker.get_reason().to_string())
        };

        match state {
            RestartState::NotRestarting => {
                info!(
                    task = %self.task_type(),
                    alloc = %self.alloc.id,
                    %reason,
                    "not restarting task"
                );
                self.set_state(
                    Some(TaskState::Dead),
                    Some(
                        TaskEvent::new(TaskEventKind::NotRestarting)
                            .with_restart_reason(reason)
                            .fails_task(),
                    ),
                );
                false
            }
            RestartState::Terminated => {
                info!(
                    task = %self.task_type(),
                    alloc = %self.alloc.id,
                    "task terminated, not restarting"
                );
                self.set_state(Some(TaskState::Dead), None);
                false
            }
            RestartState::Restarting => {
                info!(
                    task = %self.task_type(),
                    alloc = %self.alloc.id,
                    delay = ?delay,
                    "restarting task"
                );
                self.set_state(
                    Some(TaskState::Pending),
                    Some(
                        TaskEvent::new(TaskEventKind::Restarting)
                            .with_restart_delay(delay)
                            .with_restart_reason(reason),
                    ),
                );

                // Sleep, but watch for destroy. A new restart request does
                // not interrupt this delay.
                tokio::select! {
                    _ = time::sleep(delay) => {}
                    _ = self.destroy_token.cancelled() => {}
                }

                // Destroyed while waiting to restart; abort.
                if self.is_destroyed() {
                    debug!(
                        task = %self.task_type(),
                        "not restarting task, it has been destroyed"
                    );
                    self.set_state(Some(TaskState::Dead), self.destroy_event());
                    return false;
                }
                true
            }
        }
    }

    /// Builds a fresh driver and starts the task, installing the returned
    /// handle. Start failures are wrapped preserving recoverability.
    async fn start_task(&self) -> Result<(), DriverError> {
        let driver = self.create_driver()?;
        let ctx = self.exec_context();
        let task = self.task.read().unwrap().clone();

        match driver.start(&ctx, &task).await {
            Ok(handle) => {
                *self.handle.lock().unwrap() = Some(handle);
                Ok(())
            }
            Err(err) => {
                let wrapped = format!(
                    "failed to start task '{}' for alloc '{}': {}",
                    task.task_type, self.alloc.id, err.message
                );
                warn!("{wrapped}");
                Err(DriverError {
                    message: wrapped,
                    recoverable: err.recoverable,
                })
            }
        }
    }

    /// Kills the running task. A killing event may be passed to carry extra
    /// context; its kind is forced to `Killing`.
    async fn kill_task(&self, killing_event: Option<TaskEvent>) {
        if !self.is_running() {
            return;
        }

        let event = killing_event
            .map(|e| e.with_kind(TaskEventKind::Killing))
            .unwrap_or_else(|| TaskEvent::new(TaskEventKind::Killing))
            .with_kill_timeout(self.config.max_kill_timeout);

        // Mark that the kill was received before attempting it.
        self.set_state(Some(TaskState::Running), Some(event));

        let (destroyed, err) = self.handle_destroy().await;
        if !destroyed {
            error!(
                task = %self.task_type(),
                alloc = %self.alloc.id,
                error = ?err.as_ref().map(|e| e.to_string()),
                "failed to kill task, resources may have been leaked"
            );
        }

        self.running.store(false, Ordering::SeqCst);

        let mut killed = TaskEvent::new(TaskEventKind::Killed);
        if let Some(err) = err {
            killed = killed.with_kill_error(err.to_string());
        }
        self.set_state(None, Some(killed));
    }

    /// Shuts the handle down with bounded retries and exponential backoff.
    ///
    /// Returns whether the task was destroyed and the error of the last
    /// attempt. The backoff sleeps are deliberately not cancellable.
    async fn handle_destroy(&self) -> (bool, Option<DriverError>) {
        let handle = self.current_handle().expect("running task has a handle");

        let mut last_err = None;
        for attempt in 0..KILL_FAILURE_LIMIT {
            match handle.shutdown().await {
                Ok(()) => return (true, None),
                Err(err) => {
                    let backoff = kill_backoff(attempt);
                    error!(
                        task = %self.task_type(),
                        alloc = %self.alloc.id,
                        error = %err,
                        retry_in = ?backoff,
                        "failed to kill task, retrying"
                    );
                    last_err = Some(err);
                    time::sleep(backoff).await;
                }
            }
        }
        (false, last_err)
    }

    /// Spawns the prestart routine feeding the start signal.
    fn spawn_prestart(&self, result_tx: mpsc::Sender<bool>) {
        let start_tx = self.start_tx.clone();
        tokio::spawn(async move {
            // Prerequisite rendering is meant to gate this on the unblock
            // signal before requesting a start, reporting failure when the
            // run loop exits first. That gating was never wired through, so
            // the start request is issued immediately.
            let _ = start_tx.try_send(());
            let _ = result_tx.send(true).await;
        });
    }

    /// Spawns a stats collector for `handle` and returns its stop token.
    fn spawn_collector(&self, handle: &HandleRef) -> CancellationToken {
        let stop = CancellationToken::new();
        let collector = StatsCollector {
            handle: Arc::clone(handle),
            interval: self.config.stats_collection_interval,
            latest: Arc::clone(&self.latest_stats),
            sink: Arc::clone(&self.sink),
            labels: StatsLabels {
                job_name: self.alloc.job_name.clone(),
                task_key: self.alloc.task_key.clone(),
                alloc_id: self.alloc.id.clone(),
                task_type: self.task_type(),
            },
            publish: self.config.publish_allocation_metrics,
        };
        tokio::spawn(collector.run(stop.clone()));
        stop
    }

    /// Persists the snapshot, then reports the transition to the updater.
    fn set_state(&self, state: Option<TaskState>, event: Option<TaskEvent>) {
        if let Err(err) = self.save_state() {
            error!(
                task = %self.task_type(),
                error = %err,
                "failed to save supervisor state"
            );
        }
        self.updater.update(&self.task_type(), state, event);
    }

    /// Builds a driver for the current task definition.
    fn create_driver(&self) -> Result<DriverRef, DriverError> {
        let ctx = {
            let task = self.task.read().unwrap();
            DriverContext::new(
                task.driver.clone(),
                task.task_type.clone(),
                self.alloc.id.clone(),
                Arc::clone(&self.config),
            )
        };

        self.factory.create(&ctx).map_err(|err| DriverError {
            message: format!(
                "failed to create driver '{}' for alloc '{}': {}",
                ctx.driver, self.alloc.id, err.message
            ),
            recoverable: err.recoverable,
        })
    }

    fn exec_context(&self) -> ExecContext {
        ExecContext::new(self.alloc.job_name.clone(), self.task_type())
    }

    fn current_handle(&self) -> Option<HandleRef> {
        self.handle.lock().unwrap().clone()
    }

    fn destroy_event(&self) -> Option<TaskEvent> {
        self.destroy.lock().unwrap().event.clone()
    }

    fn is_destroyed(&self) -> bool {
        self.destroy.lock().unwrap().destroyed
    }

    fn task_type(&self) -> String {
        self.task.read().unwrap().task_type.clone()
    }
}
