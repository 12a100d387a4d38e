use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

use crate::loader::LoaderError;
use crate::pipeline::{BundlingPipeline, ReloadSummary};

/// Something changed below the watched paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Script sources were created, modified or removed
    Files(Vec<PathBuf>),
    /// A reload was requested explicitly (e.g. SIGHUP)
    Signal,
}

/// Stream of change notifications plus whatever keeps it alive
///
/// Watchers and background tasks feeding the stream are owned here and are
/// released when the source is dropped. Once the controller takes the source
/// the stream ends when every sender handed out has been dropped.
pub struct ChangeSource {
    tx: Option<mpsc::UnboundedSender<ChangeEvent>>,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    watchers: Vec<Box<dyn Any + Send>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChangeSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            rx,
            watchers: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Sender feeding this source
    ///
    /// After [`close`](Self::close) the returned sender is disconnected.
    pub fn sender(&self) -> mpsc::UnboundedSender<ChangeEvent> {
        match &self.tx {
            Some(tx) => tx.clone(),
            None => mpsc::unbounded_channel().0,
        }
    }

    /// Stop handing out senders and drop the one kept here
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Keep a watch handle alive for as long as the source exists
    pub fn with_watcher<W: Send + 'static>(mut self, watcher: W) -> Self {
        self.watchers.push(Box::new(watcher));
        self
    }

    /// Abort a background task when the source is dropped
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Forward SIGHUP as a reload request
    #[cfg(unix)]
    pub fn with_reload_signal(self) -> Self {
        let tx = self.sender();

        let handle = tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sighup = match signal(SignalKind::hangup()) {
                Ok(s) => s,
                Err(e) => {
                    error!(target: "scripting", "Failed to register SIGHUP handler: {}", e);
                    return;
                }
            };

            while sighup.recv().await.is_some() {
                info!(target: "scripting", "Received SIGHUP - triggering script reload");
                if tx.send(ChangeEvent::Signal).is_err() {
                    break;
                }
            }
        });

        self.with_task(handle)
    }

    /// SIGHUP is not available on this platform
    #[cfg(not(unix))]
    pub fn with_reload_signal(self) -> Self {
        tracing::warn!(target: "scripting", "SIGHUP reload not supported on this platform");
        self
    }

    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Default for ChangeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChangeSource {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        debug!(
            target: "scripting",
            "Released {} watcher(s) and {} task(s)",
            self.watchers.len(),
            self.tasks.len()
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Nothing,
    StartRun,
}

/// Trailing debounce plus run serialization
///
/// Every notification pushes the deadline out by the debounce window. When
/// the deadline passes, a run starts if none is active; otherwise one more
/// run is queued and starts as soon as the active run finishes.
#[derive(Debug)]
pub struct ReloadSchedule {
    debounce: Duration,
    state: ReloadState,
    queued: bool,
    deadline: Option<Instant>,
}

impl ReloadSchedule {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            state: ReloadState::Idle,
            queued: false,
            deadline: None,
        }
    }

    pub fn state(&self) -> ReloadState {
        self.state
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn notify(&mut self, now: Instant) {
        self.deadline = Some(now + self.debounce);
    }

    pub fn timer_fired(&mut self) -> Action {
        self.deadline = None;
        match self.state {
            ReloadState::Idle => {
                self.state = ReloadState::Running;
                Action::StartRun
            }
            ReloadState::Running => {
                self.queued = true;
                Action::Nothing
            }
        }
    }

    pub fn run_finished(&mut self) -> Action {
        if self.queued {
            self.queued = false;
            Action::StartRun
        } else {
            self.state = ReloadState::Idle;
            Action::Nothing
        }
    }
}

/// Counters reported when the controller stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadStats {
    pub notifications: usize,
    pub runs: usize,
    pub failed_runs: usize,
}

type RunHandle = JoinHandle<Result<ReloadSummary, LoaderError>>;

/// Re-runs the pipeline after source changes, one run at a time
pub struct ReloadController {
    pipeline: Arc<BundlingPipeline>,
    debounce: Duration,
}

impl ReloadController {
    pub fn new(pipeline: Arc<BundlingPipeline>, debounce: Duration) -> Self {
        Self { pipeline, debounce }
    }

    /// Run the controller on its own task
    pub fn spawn(
        self,
        source: ChangeSource,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<ReloadStats> {
        tokio::spawn(self.run(source, shutdown))
    }

    /// Watch for changes until shutdown is signalled (or its sender dropped)
    /// or every producer of the change source has gone away.
    ///
    /// On shutdown no new run is scheduled, but a run already in progress is
    /// awaited so its result is committed. The change source is dropped
    /// before returning.
    pub async fn run(
        self,
        mut source: ChangeSource,
        mut shutdown: watch::Receiver<bool>,
    ) -> ReloadStats {
        info!(target: "scripting", debounce = ?self.debounce, "initializing watcher");
        source.close();

        let mut schedule = ReloadSchedule::new(self.debounce);
        let mut in_flight: Option<RunHandle> = None;
        let mut stats = ReloadStats::default();

        loop {
            let deadline = schedule.deadline();

            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown) => {
                    info!(target: "scripting", "Shutdown requested, stopping watcher");
                    break;
                }
                result = join_run(&mut in_flight) => {
                    in_flight = None;
                    record_run(&mut stats, result);
                    if schedule.run_finished() == Action::StartRun {
                        debug!(target: "scripting", "Starting queued reload");
                        in_flight = Some(self.start_run());
                    }
                }
                // Polled before the timer so a notification landing on the
                // deadline still extends the window
                event = source.recv() => match event {
                    Some(event) => {
                        stats.notifications += 1;
                        debug!(target: "scripting", ?event, "change notification");
                        schedule.notify(Instant::now());
                    }
                    None => {
                        info!(target: "scripting", "Change source closed, stopping watcher");
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    debug!(target: "scripting", "change detected");
                    if schedule.timer_fired() == Action::StartRun {
                        in_flight = Some(self.start_run());
                    } else {
                        debug!(target: "scripting", "Reload already running, queued another");
                    }
                }
            }
        }

        if let Some(handle) = in_flight.take() {
            info!(target: "scripting", "Waiting for in-flight reload to finish");
            record_run(&mut stats, handle.await);
        }

        drop(source);
        info!(
            target: "scripting",
            runs = stats.runs,
            failed = stats.failed_runs,
            "watcher stopped"
        );
        stats
    }

    fn start_run(&self) -> RunHandle {
        let pipeline = self.pipeline.clone();
        tokio::spawn(async move { pipeline.run().await })
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn join_run(
    handle: &mut Option<RunHandle>,
) -> Result<Result<ReloadSummary, LoaderError>, JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn record_run(
    stats: &mut ReloadStats,
    result: Result<Result<ReloadSummary, LoaderError>, JoinError>,
) {
    stats.runs += 1;
    match result {
        Ok(Ok(summary)) => {
            debug!(target: "scripting", ?summary, "reload finished");
        }
        // Already logged by the pipeline
        Ok(Err(_)) => stats.failed_runs += 1,
        Err(e) => {
            error!(target: "scripting", "Reload task failed: {}", e);
            stats.failed_runs += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_starts_run_when_idle() {
        let mut schedule = ReloadSchedule::new(Duration::from_millis(500));
        let now = Instant::now();

        schedule.notify(now);
        assert_eq!(schedule.deadline(), Some(now + Duration::from_millis(500)));

        assert_eq!(schedule.timer_fired(), Action::StartRun);
        assert_eq!(schedule.state(), ReloadState::Running);
        assert_eq!(schedule.deadline(), None);
    }

    #[test]
    fn test_notify_extends_deadline() {
        let mut schedule = ReloadSchedule::new(Duration::from_millis(500));
        let start = Instant::now();

        schedule.notify(start);
        schedule.notify(start + Duration::from_millis(500));
        assert_eq!(
            schedule.deadline(),
            Some(start + Duration::from_millis(1000))
        );
    }

    #[test]
    fn test_timer_while_running_queues_once() {
        let mut schedule = ReloadSchedule::new(Duration::from_millis(500));

        assert_eq!(schedule.timer_fired(), Action::StartRun);
        assert_eq!(schedule.timer_fired(), Action::Nothing);
        assert_eq!(schedule.timer_fired(), Action::Nothing);
        assert!(schedule.is_queued());

        // Queued run starts right away, only once
        assert_eq!(schedule.run_finished(), Action::StartRun);
        assert_eq!(schedule.state(), ReloadState::Running);
        assert_eq!(schedule.run_finished(), Action::Nothing);
        assert_eq!(schedule.state(), ReloadState::Idle);
    }

    #[tokio::test]
    async fn test_closed_source_ends_with_last_sender() {
        let mut source = ChangeSource::new();
        let tx = source.sender();
        source.close();
        assert!(source.sender().send(ChangeEvent::Signal).is_err());

        tx.send(ChangeEvent::Signal).unwrap();
        drop(tx);
        assert_eq!(source.recv().await, Some(ChangeEvent::Signal));
        assert_eq!(source.recv().await, None);
    }
}
