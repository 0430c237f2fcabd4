//! Run lifecycle controller.
//!
//! Owns submission, the recurring poll timer, re-open and delete, and turns
//! remote status into `RunEvent`s for presentation layers.

use super::registry::RunRegistry;
use super::session::{Session, Transition};
use crate::error::PortalError;
use crate::model::{AssessmentConfig, ResultManifest, RunEvent, RunHandle, RunStatus, RunSummary};
use crate::portal::PortalApi;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};

/// Messages sent back to the manager by the timer and poll tasks.
enum Signal {
    Tick(u64),
    Polled {
        generation: u64,
        result: Result<RunStatus, PortalError>,
    },
    Manifest {
        generation: u64,
        status: RunStatus,
        result: Result<ResultManifest, PortalError>,
    },
}

/// The recurring poll timer. Dropping it aborts the task.
struct PollTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeleteOutcome {
    Deleted,
    Declined,
}

pub(crate) struct LifecycleManager<A: PortalApi> {
    api: Arc<A>,
    poll_interval: Duration,
    session: Session,
    registry: RunRegistry,
    timer: Option<PollTimer>,
    pending: VecDeque<RunEvent>,
    signal_tx: UnboundedSender<Signal>,
    signal_rx: UnboundedReceiver<Signal>,
}

impl<A: PortalApi> LifecycleManager<A> {
    pub fn new(api: Arc<A>, poll_interval: Duration) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            api,
            poll_interval,
            session: Session::default(),
            registry: RunRegistry::default(),
            timer: None,
            pending: VecDeque::new(),
            signal_tx,
            signal_rx,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn runs(&self) -> &[RunSummary] {
        self.registry.runs()
    }

    #[cfg(test)]
    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Launch a run. The gate is checked before any network call.
    pub async fn submit(&mut self, config: &AssessmentConfig) -> Result<RunHandle, PortalError> {
        self.session.check_submittable(config)?;
        let handle = self.api.submit(config).await?;
        log::info!(
            "RUN_SUBMITTED run_id={} subscriptions={} lookback_days={}",
            handle,
            config.subscription_ids.len(),
            config.metrics_lookback_days
        );
        self.track(handle.clone());
        self.pending.push_back(RunEvent::Submitted {
            run_id: handle.clone(),
        });
        self.registry.refresh_quietly(self.api.as_ref()).await;
        Ok(handle)
    }

    /// Resume polling a run launched earlier, e.g. by another process.
    pub fn attach(&mut self, handle: RunHandle) -> Result<(), PortalError> {
        self.session.check_free()?;
        log::info!("RUN_ATTACHED run_id={}", handle);
        self.track(handle);
        Ok(())
    }

    fn track(&mut self, handle: RunHandle) {
        self.cancel_timer();
        self.pending.clear();
        let generation = self.session.begin(handle);
        self.arm_timer(generation);
    }

    /// Stop tracking the current run. The run itself continues remotely.
    pub fn detach(&mut self) {
        self.cancel_timer();
        self.pending.clear();
        if let Some(run_id) = self.session.active() {
            log::info!(
                "RUN_DETACHED run_id={} phase={:?}",
                run_id,
                self.session.phase()
            );
        }
        self.session.release();
    }

    fn arm_timer(&mut self, generation: u64) {
        self.cancel_timer();
        let tx = self.signal_tx.clone();
        let period = self.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(Signal::Tick(generation)).is_err() {
                    break;
                }
            }
        });
        log::debug!(
            "TIMER_ARMED generation={} period_ms={}",
            generation,
            period.as_millis()
        );
        self.timer = Some(PollTimer { generation, handle });
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            log::debug!("TIMER_CANCELLED generation={}", timer.generation);
        }
    }

    /// Drive the state machine until something worth reporting happens.
    /// Returns `None` when no run is in flight and nothing is queued.
    ///
    /// Cancel safe: remote calls run in spawned tasks that report back over
    /// the signal channel, and events are queued before any await, so a
    /// dropped call loses nothing and the next call picks up where it left off.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if !self.session.is_busy() {
                return None;
            }
            match self.signal_rx.recv().await? {
                Signal::Tick(generation) => self.on_tick(generation),
                Signal::Polled { generation, result } => self.on_polled(generation, result).await,
                Signal::Manifest {
                    generation,
                    status,
                    result,
                } => self.on_manifest(generation, status, result).await,
            }
        }
    }

    fn on_tick(&mut self, generation: u64) {
        if generation != self.session.generation() || !self.session.is_busy() {
            return;
        }
        let Some(run_id) = self.session.active().cloned() else {
            return;
        };
        // Detached so a slow response never holds back the next tick.
        let api = Arc::clone(&self.api);
        let tx = self.signal_tx.clone();
        tokio::spawn(async move {
            let result = api.status(&run_id).await;
            let _ = tx.send(Signal::Polled { generation, result });
        });
    }

    async fn on_polled(&mut self, generation: u64, result: Result<RunStatus, PortalError>) {
        let Some(run_id) = self.session.active().cloned() else {
            log::debug!("POLL_DISCARDED generation={} reason=idle", generation);
            return;
        };
        let status = match result {
            Ok(status) => status,
            Err(e) => {
                if generation == self.session.generation() {
                    log::warn!("POLL_FAILED run_id={} error={}", run_id, e);
                }
                return;
            }
        };

        match self.session.apply(generation, status) {
            Transition::Stale => {
                log::debug!("POLL_DISCARDED generation={} reason=stale", generation);
            }
            Transition::Progress(status) => {
                log::debug!(
                    "RUN_PROGRESS run_id={} status={} elapsed_s={}",
                    run_id,
                    status.status.as_str(),
                    status.elapsed_seconds
                );
                self.pending
                    .push_back(RunEvent::StatusChanged { run_id, status });
            }
            Transition::Failed(status) => {
                self.cancel_timer();
                log::info!(
                    "RUN_FAILED run_id={} error={}",
                    run_id,
                    status.error.as_deref().unwrap_or("-")
                );
                self.pending.push_back(RunEvent::Failed { run_id, status });
                self.registry.refresh_quietly(self.api.as_ref()).await;
            }
            Transition::Completing(status) => {
                // The session refuses further polls until `complete`.
                self.cancel_timer();
                log::debug!("MANIFEST_REQUESTED run_id={}", run_id);
                let api = Arc::clone(&self.api);
                let tx = self.signal_tx.clone();
                tokio::spawn(async move {
                    let result = api.manifest(&run_id).await;
                    let _ = tx.send(Signal::Manifest {
                        generation,
                        status,
                        result,
                    });
                });
            }
        }
    }

    async fn on_manifest(
        &mut self,
        generation: u64,
        status: RunStatus,
        result: Result<ResultManifest, PortalError>,
    ) {
        if generation != self.session.generation() {
            log::debug!("MANIFEST_DISCARDED generation={} reason=stale", generation);
            return;
        }
        let Some(run_id) = self.session.active().cloned() else {
            return;
        };
        let event = match result {
            Ok(manifest) => {
                log::info!(
                    "RUN_COMPLETED run_id={} files={}",
                    run_id,
                    manifest.files.len()
                );
                self.session
                    .complete(generation, status.clone(), Some(manifest.clone()));
                RunEvent::Completed {
                    run_id,
                    status,
                    manifest,
                }
            }
            Err(e) => {
                log::warn!("MANIFEST_UNAVAILABLE run_id={} error={}", run_id, e);
                self.session.complete(generation, status.clone(), None);
                RunEvent::ManifestUnavailable {
                    run_id,
                    status,
                    error: e.to_string(),
                }
            }
        };
        self.pending.push_back(event);
        self.registry.refresh_quietly(self.api.as_ref()).await;
    }

    /// Show a historical run as completed straight from a fresh manifest.
    pub async fn reopen(&mut self, run_id: &RunHandle) -> Result<ResultManifest, PortalError> {
        self.session.check_free()?;
        let manifest = self.api.manifest(run_id).await?;
        self.cancel_timer();
        self.pending.clear();
        self.session.reopen(manifest.clone());
        log::info!("RUN_REOPENED run_id={} files={}", run_id, manifest.files.len());
        Ok(manifest)
    }

    /// Delete a run after `confirm` approves it. Clears the slot when the
    /// deleted run is the displayed one.
    pub async fn delete(
        &mut self,
        run_id: &RunHandle,
        confirm: impl FnOnce(&RunHandle) -> bool,
    ) -> Result<DeleteOutcome, PortalError> {
        if !confirm(run_id) {
            log::info!("DELETE_DECLINED run_id={}", run_id);
            return Ok(DeleteOutcome::Declined);
        }
        self.api.delete_run(run_id).await?;
        if self.session.clear_if_active(run_id) {
            self.cancel_timer();
            self.pending.clear();
        }
        log::info!("RUN_DELETED run_id={}", run_id);
        self.registry.forget(run_id);
        self.registry.refresh_quietly(self.api.as_ref()).await;
        Ok(DeleteOutcome::Deleted)
    }

    pub async fn refresh_runs(&mut self) -> Result<&[RunSummary], PortalError> {
        self.registry.refresh(self.api.as_ref()).await
    }
}
