use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use radar_agents::{Orchestrator, RunObserver, RunOutcome};
use radar_memory::MemoryError;
use radar_models::analysis::{AnalysisState, Phase, RunStatus};
use radar_models::events::LifecycleEvent;
use radar_models::request::{AnalysisRequest, InvalidInput};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Buffered lifecycle events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Snapshot of a run's progress.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RunStatusView {
    pub status: RunStatus,
    pub current_phase: Phase,
}

#[derive(Debug)]
struct RunEntry {
    view: RunStatusView,
    result: Option<AnalysisState>,
}

/// Every known run, plus finished runs in completion order for eviction.
#[derive(Debug)]
struct Runs {
    entries: HashMap<Uuid, RunEntry>,
    finished: VecDeque<Uuid>,
    retained: usize,
}

impl Runs {
    fn new(retained: usize) -> Self {
        Self {
            entries: HashMap::new(),
            finished: VecDeque::new(),
            retained: retained.max(1),
        }
    }

    fn finish(&mut self, run_id: Uuid, state: AnalysisState) {
        let Some(entry) = self.entries.get_mut(&run_id) else {
            return;
        };
        entry.view = RunStatusView {
            status: state.status,
            current_phase: state.phase,
        };
        entry.result = Some(state);
        self.finished.push_back(run_id);

        while self.finished.len() > self.retained {
            if let Some(evicted) = self.finished.pop_front() {
                self.entries.remove(&evicted);
                debug!(run_id = %evicted, "Evicted finished run");
            }
        }
    }

    fn forget(&mut self, run_id: Uuid) -> Option<AnalysisState> {
        if !self.entries.get(&run_id)?.view.status.is_terminal() {
            return None;
        }
        self.finished.retain(|id| *id != run_id);
        self.entries.remove(&run_id)?.result
    }
}

type RunTable = Arc<RwLock<Runs>>;

/// Accepts analysis requests, runs them in the background and keeps their
/// results.
pub struct AnalysisService {
    orchestrator: Arc<Orchestrator>,
    runs: RunTable,
    events: broadcast::Sender<LifecycleEvent>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl AnalysisService {
    /// Keeps up to `run.retained_runs` finished runs from the orchestrator's
    /// configuration.
    pub fn new(orchestrator: Orchestrator) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let retained = orchestrator.config().run.retained_runs;
        Self {
            orchestrator: Arc::new(orchestrator),
            runs: Arc::new(RwLock::new(Runs::new(retained))),
            events,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Validate and start a run. Returns as soon as the run is scheduled.
    ///
    /// Each submission runs under a fresh id that replaces `request.id`.
    pub fn submit_analysis(&self, mut request: AnalysisRequest) -> Result<Uuid, InvalidInput> {
        request.validate()?;
        let run_id = Uuid::new_v4();
        request.id = run_id;

        update_runs(&self.runs, |runs| {
            runs.entries.insert(
                run_id,
                RunEntry {
                    view: RunStatusView {
                        status: RunStatus::Pending,
                        current_phase: Phase::Init,
                    },
                    result: None,
                },
            );
        });
        info!(run_id = %run_id, instrument = %request.instrument, "Analysis submitted");

        let orchestrator = Arc::clone(&self.orchestrator);
        let observer = ServiceObserver {
            runs: Arc::clone(&self.runs),
            events: self.events.clone(),
            terminal: Mutex::new(None),
        };
        let cancel = self.shutdown.child_token();

        self.tasks.spawn(async move {
            let RunOutcome {
                mut state,
                pending_memory,
            } = orchestrator
                .execute_cancellable(&request, &observer, cancel)
                .await;

            if let Some(handle) = pending_memory {
                match handle.await {
                    Ok(Ok(record_id)) => state.attach_memory_record(record_id),
                    Ok(Err(e)) => warn!(run_id = %run_id, error = %e, "Memory append failed"),
                    Err(e) => error!(run_id = %run_id, error = %e, "Memory append task panicked"),
                }
            }

            update_runs(&observer.runs, |runs| runs.finish(run_id, state));
            observer.publish_terminal();
        });

        Ok(run_id)
    }

    pub fn get_status(&self, run_id: Uuid) -> Option<RunStatusView> {
        self.runs
            .read()
            .ok()
            .and_then(|runs| runs.entries.get(&run_id).map(|entry| entry.view))
    }

    /// The final state, once the run is Decided or Failed.
    pub fn get_result(&self, run_id: Uuid) -> Option<AnalysisState> {
        let runs = self.runs.read().ok()?;
        let entry = runs.entries.get(&run_id)?;
        if !entry.view.status.is_terminal() {
            return None;
        }
        entry.result.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Wait until the run reaches a terminal state. `None` for an unknown run.
    pub async fn wait_for_result(&self, run_id: Uuid) -> Option<AnalysisState> {
        let mut events = self.subscribe();
        loop {
            if let Some(state) = self.get_result(run_id) {
                return Some(state);
            }
            self.get_status(run_id)?;
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.get_result(run_id),
            }
        }
    }

    /// Label the realised outcome of a remembered analysis. Fails for an
    /// unknown record or one already labelled.
    pub fn record_outcome(&self, record_id: Uuid, label: &str) -> Result<(), MemoryError> {
        self.orchestrator.memory().update_outcome(record_id, label)
    }

    /// Drop a finished run and hand back its result. In-flight runs stay.
    pub fn forget(&self, run_id: Uuid) -> Option<AnalysisState> {
        let mut runs = self.runs.write().ok()?;
        runs.forget(run_id)
    }

    /// Cancel in-flight runs and wait for them to settle.
    pub async fn shutdown(&self) {
        let in_flight = self.tasks.len();
        info!(in_flight, "Shutting down analysis service");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

/// Mirrors run progress into the run table and the event channel.
///
/// The terminal event is held back until the final state is stored, so a
/// subscriber reacting to it always finds the result.
struct ServiceObserver {
    runs: RunTable,
    events: broadcast::Sender<LifecycleEvent>,
    terminal: Mutex<Option<LifecycleEvent>>,
}

impl ServiceObserver {
    fn send(&self, event: LifecycleEvent) {
        // No subscribers is fine
        if self.events.send(event).is_err() {
            debug!("No lifecycle subscribers");
        }
    }

    fn publish_terminal(&self) {
        let event = self.terminal.lock().ok().and_then(|mut held| held.take());
        if let Some(event) = event {
            self.send(event);
        }
    }
}

impl RunObserver for ServiceObserver {
    fn phase_entered(&self, run_id: Uuid, phase: Phase) {
        update_runs(&self.runs, |runs| {
            if let Some(entry) = runs.entries.get_mut(&run_id) {
                if !entry.view.status.is_terminal() {
                    entry.view = RunStatusView {
                        status: RunStatus::InProgress,
                        current_phase: phase,
                    };
                }
            }
        });
    }

    fn event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::DecisionReady { .. } | LifecycleEvent::Failed { .. } => {
                if let Ok(mut held) = self.terminal.lock() {
                    *held = Some(event.clone());
                }
            }
            _ => self.send(event.clone()),
        }
    }
}

fn update_runs(runs: &RunTable, f: impl FnOnce(&mut Runs)) {
    match runs.write() {
        Ok(mut guard) => f(&mut guard),
        Err(e) => error!(error = %e, "Run table lock poisoned"),
    }
}
