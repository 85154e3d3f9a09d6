//! Run coordinator.
//!
//! Drives one run through `Scanning -> Probing -> Matching -> Merging` and
//! produces a [`RunReport`]. The coordinator never renders anything; callers
//! observe progress through [`RunEvent`]s and read the report at the end.

use chrono::{Local, Utc};
use muxpair_av::{Muxer, Prober};
use muxpair_core::{
    Config, Error, Event, EventBus, MergeOutcome, MergeStatus, Pair, ProbeResult, Result, RunEvent,
    RunReport, RunState, StreamKind,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::matcher::{match_pairs, MatchPolicy};
use crate::merge::{MergeExecutor, CANCELLED_REASON};
use crate::naming::OutputNamer;
use crate::scanner::{scan_all, ExtensionFilter};

/// Clamp a configured worker count to `1..=available CPUs`.
pub fn effective_workers(configured: usize) -> usize {
    configured.clamp(1, num_cpus::get().max(1))
}

/// Orchestrates a single run.
pub struct RunCoordinator {
    config: Config,
    prober: Arc<dyn Prober>,
    muxer: Arc<dyn Muxer>,
    events: EventBus,
    state: Arc<Mutex<RunState>>,
}

impl RunCoordinator {
    /// Create a coordinator for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration fails
    /// validation.
    pub fn new(config: Config, prober: Arc<dyn Prober>, muxer: Arc<dyn Muxer>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            prober,
            muxer,
            events: EventBus::default(),
            state: Arc::new(Mutex::new(RunState::Idle)),
        })
    }

    /// Subscribe to run events. Subscribe before [`start`](Self::start) to
    /// see every event of the run.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Spawn the run on the current tokio runtime.
    pub fn start(self) -> RunHandle {
        let cancel = CancellationToken::new();
        let events = self.events.clone();
        let state = Arc::clone(&self.state);
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });

        RunHandle {
            cancel,
            events,
            state,
            task,
        }
    }

    /// Execute the run to completion on the calling task.
    pub async fn run(self, cancel: CancellationToken) -> RunReport {
        let started_at = Utc::now();
        let run_time = Local::now();

        // --- Scanning ---
        self.set_state(RunState::Scanning);
        if cancel.is_cancelled() {
            return self.finish(RunState::Cancelled, Vec::new(), Vec::new(), None, started_at);
        }

        let dirs = self.config.input_dirs.clone();
        let filter = ExtensionFilter::new(&self.config.scan.extensions);
        let scanned = tokio::task::spawn_blocking(move || scan_all(&dirs, &filter)).await;
        let files = match scanned {
            Ok(Ok(files)) => files,
            Ok(Err(e)) => {
                error!(error = %e, "Scan failed");
                return self.finish(
                    RunState::Failed,
                    Vec::new(),
                    Vec::new(),
                    Some(e.to_string()),
                    started_at,
                );
            }
            Err(e) => {
                error!(error = %e, "Scan task failed");
                return self.finish(
                    RunState::Failed,
                    Vec::new(),
                    Vec::new(),
                    Some(format!("scan task failed: {e}")),
                    started_at,
                );
            }
        };
        info!(files = files.len(), "Scan complete");
        self.events.emit(RunEvent::ScanComplete { files: files.len() });

        if cancel.is_cancelled() {
            return self.finish(RunState::Cancelled, Vec::new(), Vec::new(), None, started_at);
        }

        // --- Probing ---
        self.set_state(RunState::Probing);
        let probed = self.probe_all(files, &cancel).await;
        if cancel.is_cancelled() {
            return self.finish(RunState::Cancelled, Vec::new(), probed, None, started_at);
        }

        // --- Matching ---
        self.set_state(RunState::Matching);
        let policy = MatchPolicy {
            max_duration_diff: self.config.matching.max_duration_diff,
        };
        let matched = match_pairs(&probed, &policy);
        info!(
            pairs = matched.pairs.len(),
            unmatched = matched.unmatched.len(),
            "Match complete"
        );
        self.events.emit(RunEvent::MatchComplete {
            pairs: matched.pairs.len(),
            unmatched: matched.unmatched.len(),
        });

        let output_dir = self
            .config
            .effective_output_dir()
            .unwrap_or_else(|| PathBuf::from("."));
        let mut namer = OutputNamer::new(
            &output_dir,
            &self.config.naming,
            &self.config.merge.container,
            run_time,
        );
        let planned: Vec<Planned> = matched
            .pairs
            .into_iter()
            .enumerate()
            .map(|(i, pair)| Planned::new(&mut namer, i + 1, pair))
            .collect();

        if cancel.is_cancelled() {
            let outcomes = planned.into_iter().map(Planned::into_skipped).collect();
            return self.finish(
                RunState::Cancelled,
                outcomes,
                matched.unmatched,
                None,
                started_at,
            );
        }

        // --- Merging ---
        self.set_state(RunState::Merging);
        let outcomes = if self.config.dry_run {
            info!("Dry run; no merges will be performed");
            planned.into_iter().map(Planned::into_skipped).collect()
        } else {
            if let Err(e) = std::fs::create_dir_all(&output_dir) {
                warn!(dir = %output_dir.display(), error = %e, "Cannot create output directory");
            }
            self.merge_all(planned, &cancel).await
        };

        let state = if cancel.is_cancelled() {
            RunState::Cancelled
        } else {
            RunState::Done
        };
        self.finish(state, outcomes, matched.unmatched, None, started_at)
    }

    async fn probe_all(
        &self,
        files: Vec<muxpair_core::MediaFile>,
        cancel: &CancellationToken,
    ) -> Vec<Arc<ProbeResult>> {
        let workers = effective_workers(self.config.concurrency.probe_workers);
        debug!(workers, files = files.len(), "Probing");
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(files.len());

        for file in files {
            let file = Arc::new(file);
            let sem = Arc::clone(&semaphore);
            let prober = Arc::clone(&self.prober);
            let events = self.events.clone();
            let cancel = cancel.clone();
            let task_file = Arc::clone(&file);

            let handle = tokio::spawn(async move {
                let file = task_file;
                let Some(_permit) = acquire(&sem, &cancel).await else {
                    return Arc::new(ProbeResult::failed(file, CANCELLED_REASON));
                };

                let result = match prober.probe(Arc::clone(&file), &cancel).await {
                    Ok(r) => {
                        debug!(
                            file = %file.path.display(),
                            kind = %r.kind,
                            duration = ?r.duration,
                            "Probed"
                        );
                        events.emit(RunEvent::ProbeComplete {
                            path: file.path.clone(),
                            kind: r.kind,
                            duration: r.duration,
                        });
                        r
                    }
                    Err(Error::Cancelled) => {
                        debug!(file = %file.path.display(), "Probe cancelled");
                        ProbeResult::failed(file, CANCELLED_REASON)
                    }
                    Err(e) => {
                        warn!(file = %file.path.display(), error = %e, "Probe failed");
                        events.emit(RunEvent::ProbeFailed {
                            path: file.path.clone(),
                            error: e.to_string(),
                        });
                        ProbeResult::failed(file, e.to_string())
                    }
                };
                Arc::new(result)
            });
            handles.push((file, handle));
        }

        // Every scanned file yields a result, even when its task never ran.
        let mut results = Vec::with_capacity(handles.len());
        for (file, handle) in handles {
            match handle.await {
                Ok(r) => results.push(r),
                Err(e) => {
                    error!(error = %e, "Probe task failed");
                    let reason = format!("probe task failed: {e}");
                    results.push(Arc::new(ProbeResult::failed(file, reason)));
                }
            }
        }
        results
    }

    async fn merge_all(&self, planned: Vec<Planned>, cancel: &CancellationToken) -> Vec<MergeOutcome> {
        let workers = effective_workers(self.config.concurrency.merge_workers);
        let executor = MergeExecutor::new(
            Arc::clone(&self.muxer),
            self.config.effective_retries(),
            self.config.merge.delete_sources,
        );
        debug!(workers, pairs = planned.len(), "Merging");
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut slots = Vec::with_capacity(planned.len());

        for (i, plan) in planned.into_iter().enumerate() {
            let index = i + 1;
            let (pair, output) = match plan {
                Planned::Ready { pair, output } => (pair, output),
                unnamed => {
                    slots.push(Slot::Done(unnamed.into_failed()));
                    continue;
                }
            };

            let sem = Arc::clone(&semaphore);
            let executor = executor.clone();
            let events = self.events.clone();
            let cancel = cancel.clone();
            let task_pair = pair.clone();
            let task_output = output.clone();

            let handle = tokio::spawn(async move {
                let Some(_permit) = acquire(&sem, &cancel).await else {
                    return MergeOutcome::skipped(task_pair, task_output);
                };

                let outcome = executor.execute(task_pair, task_output, &cancel).await;
                match &outcome.status {
                    MergeStatus::Success => events.emit(RunEvent::MergeComplete {
                        index,
                        output: outcome.output.clone(),
                        attempts: outcome.attempts,
                    }),
                    MergeStatus::Failed { reason } => events.emit(RunEvent::MergeFailed {
                        index,
                        output: outcome.output.clone(),
                        attempts: outcome.attempts,
                        error: reason.clone(),
                    }),
                    MergeStatus::Skipped => {}
                }
                outcome
            });
            slots.push(Slot::Pending {
                pair,
                output,
                handle,
            });
        }

        // Await in submission order so the report order is stable.
        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            let outcome = match slot {
                Slot::Done(outcome) => outcome,
                Slot::Pending {
                    pair,
                    output,
                    handle,
                } => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(error = %e, "Merge task failed");
                        MergeOutcome {
                            pair,
                            output,
                            status: MergeStatus::Failed {
                                reason: format!("merge task failed: {e}"),
                            },
                            attempts: 0,
                            deleted_sources: false,
                        }
                    }
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock() = state;
        debug!(%state, "Run state changed");
        self.events.emit(RunEvent::StateChanged { state });
    }

    fn finish(
        &self,
        state: RunState,
        outcomes: Vec<MergeOutcome>,
        unmatched: Vec<Arc<ProbeResult>>,
        error: Option<String>,
        started_at: chrono::DateTime<Utc>,
    ) -> RunReport {
        let report = RunReport {
            state,
            outcomes,
            unmatched,
            error,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            %state,
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            unmatched = report.unmatched.len(),
            "Run finished"
        );
        self.set_state(state);
        self.events.emit(RunEvent::RunComplete {
            report: Box::new(report.clone()),
        });
        report
    }
}

/// Wait for a worker slot unless the run is cancelled first.
async fn acquire(
    semaphore: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> Option<tokio::sync::OwnedSemaphorePermit> {
    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
    };
    if cancel.is_cancelled() {
        return None;
    }
    permit
}

/// A pair with its output path decided, or the reason no path could be found.
enum Planned {
    Ready {
        pair: Pair,
        output: PathBuf,
    },
    Unnamed {
        pair: Pair,
        output: PathBuf,
        reason: String,
    },
}

impl Planned {
    /// Reserve an output path for the `index`-th pair.
    fn new(namer: &mut OutputNamer, index: usize, pair: Pair) -> Self {
        match namer.next_path(index, &pair) {
            Ok(output) => Planned::Ready { pair, output },
            Err(e) => {
                warn!(error = %e, "No output name available");
                let output = match &e {
                    Error::OutputPathCollision { path, .. } => path.clone(),
                    _ => namer.output_dir().join(namer.render(index, &pair)),
                };
                Planned::Unnamed {
                    pair,
                    output,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn into_skipped(self) -> MergeOutcome {
        match self {
            Planned::Ready { pair, output } => MergeOutcome::skipped(pair, output),
            unnamed => unnamed.into_failed(),
        }
    }

    fn into_failed(self) -> MergeOutcome {
        let (pair, output, reason) = match self {
            Planned::Ready { pair, output } => (pair, output, CANCELLED_REASON.to_string()),
            Planned::Unnamed {
                pair,
                output,
                reason,
            } => (pair, output, reason),
        };
        MergeOutcome {
            pair,
            output,
            status: MergeStatus::Failed { reason },
            attempts: 0,
            deleted_sources: false,
        }
    }
}

enum Slot {
    Done(MergeOutcome),
    Pending {
        pair: Pair,
        output: PathBuf,
        handle: JoinHandle<MergeOutcome>,
    },
}

/// Handle to a run started with [`RunCoordinator::start`].
pub struct RunHandle {
    cancel: CancellationToken,
    events: EventBus,
    state: Arc<Mutex<RunState>>,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() && !self.state().is_terminal() {
            info!("Cancellation requested");
        }
        self.cancel.cancel();
    }

    /// A clone of the run's cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current state of the run.
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Wait for the run to finish and return its report.
    pub async fn wait(self) -> Result<RunReport> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("run task failed: {e}")))
    }
}

/// Kinds counted in a report's unmatched list, for summaries.
pub fn unmatched_by_kind(report: &RunReport) -> (usize, usize, usize) {
    report
        .unmatched
        .iter()
        .fold((0, 0, 0), |(v, a, u), r| match r.kind {
            StreamKind::Video => (v + 1, a, u),
            StreamKind::Audio => (v, a + 1, u),
            StreamKind::Unknown => (v, a, u + 1),
        })
}
