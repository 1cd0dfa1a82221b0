use crate::constants::MIN_MONITOR_INTERVAL;
use crate::engine::Engine;
use crate::model::{CleanupResult, Project};
use crate::size::{self, format_bytes};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
    StopRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotMonitored,
    Open,
    NoLimit,
    NothingSelected,
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Skipped(SkipReason),
    /// Monitored without permission to clean: size reported only.
    Observed(u64),
    WithinLimit(u64),
    Cleaned { result: CleanupResult, size_after: u64 },
}

impl MonitorOutcome {
    pub fn measured_size(&self) -> Option<u64> {
        match self {
            Self::Skipped(_) => None,
            Self::Observed(bytes) | Self::WithinLimit(bytes) => Some(*bytes),
            Self::Cleaned { size_after, .. } => Some(*size_after),
        }
    }

    pub fn bytes_freed(&self) -> u64 {
        match self {
            Self::Cleaned { result, .. } => result.bytes_freed,
            _ => 0,
        }
    }
}

pub fn effective_interval(requested: Duration) -> Duration {
    requested.max(MIN_MONITOR_INTERVAL)
}

impl Engine {
    pub fn monitor_project(&self, project: &Project) -> MonitorOutcome {
        let root = &project.root;
        let settings = &project.settings;
        let selected: Vec<String> = settings.selected_items.iter().cloned().collect();

        if !settings.monitor_automatically {
            return MonitorOutcome::Skipped(SkipReason::NotMonitored);
        }

        if !settings.allow_automatic_cleanup {
            if selected.is_empty() {
                self.report(root, "Cache: (auto) nothing selected");
                return MonitorOutcome::Skipped(SkipReason::NothingSelected);
            }
            let bytes = size::size_of_selection(root, &selected);
            self.report(root, &format!("Cache: {} (auto monitored)", format_bytes(bytes)));
            return MonitorOutcome::Observed(bytes);
        }

        if self.is_open(root) {
            tracing::info!(project = %project.name, "open in editor, skipping");
            self.report(root, "Cache: (auto) skipped, project is open");
            return MonitorOutcome::Skipped(SkipReason::Open);
        }

        let Some(limit) = settings.byte_limit() else {
            self.report(root, "Cache: (auto) no valid GB limit");
            return MonitorOutcome::Skipped(SkipReason::NoLimit);
        };

        if selected.is_empty() {
            self.report(root, "Cache: (auto) nothing selected");
            return MonitorOutcome::Skipped(SkipReason::NothingSelected);
        }

        let current = size::size_of_selection(root, &selected);
        tracing::debug!(
            project = %project.name,
            current = %format_bytes(current),
            limit = %format_bytes(limit),
            "checked cache size"
        );

        if current <= limit {
            self.report(root, &format!("Cache: {} (auto OK)", format_bytes(current)));
            return MonitorOutcome::WithinLimit(current);
        }

        tracing::info!(project = %project.name, "over limit, cleaning");
        match self.clean_selection(project, true) {
            Ok(result) => MonitorOutcome::Cleaned {
                size_after: size::size_of_selection(root, &selected),
                result,
            },
            Err(_) => MonitorOutcome::Skipped(SkipReason::Busy),
        }
    }

    pub fn monitor_pass(&self, stop: &AtomicBool) -> Vec<(PathBuf, MonitorOutcome)> {
        let mut outcomes = Vec::new();
        for project in self.registry.list_all() {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            let outcome = self.monitor_project(&project);
            outcomes.push((project.root.clone(), outcome));
        }
        outcomes
    }
}

struct Shared {
    state: Mutex<MonitorState>,
    stop: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: MonitorState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

struct Worker {
    handle: JoinHandle<()>,
    stop_tx: mpsc::Sender<()>,
}

pub struct Monitor {
    engine: Arc<Engine>,
    config: Option<PathBuf>,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Monitor {
    pub fn with_config(engine: Arc<Engine>, config: Option<PathBuf>) -> Self {
        Self {
            engine,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(MonitorState::Stopped),
                stop: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the worker. Returns `false` if it is already running.
    pub fn start(&self, interval: Duration) -> bool {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        match self.state() {
            MonitorState::Running => {
                tracing::info!("monitoring already active");
                return false;
            }
            // Let the previous worker finish its in-flight cleanup first.
            MonitorState::StopRequested | MonitorState::Stopped => {
                if let Some(previous) = worker.take() {
                    let _ = previous.handle.join();
                }
            }
        }

        let interval = effective_interval(interval);
        let (stop_tx, stop_rx) = mpsc::channel();
        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.set_state(MonitorState::Running);

        let engine = Arc::clone(&self.engine);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let handle = thread::spawn(move || {
            run(&engine, &shared, config.as_deref(), &stop_rx, interval);
        });

        *worker = Some(Worker { handle, stop_tx });
        tracing::info!(interval_secs = interval.as_secs(), "monitoring started");
        true
    }

    pub fn stop(&self) {
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let current = *state;
            match current {
                MonitorState::Running => *state = MonitorState::StopRequested,
                // The worker reports "stopped" itself once it exits.
                MonitorState::StopRequested => return,
                MonitorState::Stopped => {
                    drop(state);
                    self.engine.report_global("Monitoring: stopped");
                    return;
                }
            }
        }

        self.shared.stop.store(true, Ordering::SeqCst);
        self.engine.report_global("Monitoring: stopping...");
        if let Some(worker) = worker.as_ref() {
            let _ = worker.stop_tx.send(());
        }
    }

    pub fn join(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            let _ = worker.handle.join();
        }
    }
}

fn run(
    engine: &Engine,
    shared: &Shared,
    config: Option<&Path>,
    stop_rx: &mpsc::Receiver<()>,
    interval: Duration,
) {
    engine.report_global("Monitoring: active");

    while !shared.stop.load(Ordering::SeqCst) {
        engine.report_global("Monitoring: checking...");
        if let Some(path) = config {
            engine.reload_config(path);
        }
        let outcomes = engine.monitor_pass(&shared.stop);
        for (root, outcome) in &outcomes {
            if let MonitorOutcome::Skipped(reason) = outcome {
                tracing::debug!(project = %root.display(), ?reason, "skipped");
            }
        }
        let freed: u64 = outcomes.iter().map(|(_, o)| o.bytes_freed()).sum();
        let measured: u64 = outcomes.iter().filter_map(|(_, o)| o.measured_size()).sum();
        tracing::debug!(
            projects = outcomes.len(),
            freed = %format_bytes(freed),
            remaining = %format_bytes(measured),
            "monitoring pass finished"
        );

        if shared.stop.load(Ordering::SeqCst) {
            break;
        }

        engine.report_global("Monitoring: waiting...");
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    shared.set_state(MonitorState::Stopped);
    tracing::info!("monitoring stopped");
    engine.report_global("Monitoring: stopped");
}
