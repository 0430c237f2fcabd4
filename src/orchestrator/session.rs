//! Single active-run slot and the status state machine that guards it.
//!
//! Every (re)arm of the slot bumps a generation counter. Timer ticks and poll
//! results carry the generation they were issued under, so anything arriving
//! for a superseded or cleared run is recognised as stale and dropped.

use crate::assembler::validate_required;
use crate::error::PortalError;
use crate::model::{AssessmentConfig, ResultManifest, RunHandle, RunState, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Started,
    Running,
    Completed,
    Failed,
}

/// What the driver must do after a poll result has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Result belongs to a superseded run or arrived after a terminal state.
    Stale,
    /// Non-terminal update; keep polling.
    Progress(RunStatus),
    /// Remote reports completion. Status is withheld until the manifest is in.
    Completing(RunStatus),
    Failed(RunStatus),
}

#[derive(Debug)]
pub(crate) struct Session {
    phase: SessionPhase,
    active: Option<RunHandle>,
    status: Option<RunStatus>,
    manifest: Option<ResultManifest>,
    generation: u64,
    /// Completion seen, manifest fetch outstanding.
    completing: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            active: None,
            status: None,
            manifest: None,
            generation: 0,
            completing: false,
        }
    }
}

impl Session {
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn active(&self) -> Option<&RunHandle> {
        self.active.as_ref()
    }

    pub fn status(&self) -> Option<&RunStatus> {
        self.status.as_ref()
    }

    pub fn manifest(&self) -> Option<&ResultManifest> {
        self.manifest.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A run is in flight: submitted and not yet terminal.
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, SessionPhase::Started | SessionPhase::Running)
    }

    fn occupied(&self) -> Result<(), PortalError> {
        match (&self.active, self.is_busy()) {
            (Some(handle), true) => Err(PortalError::RunActive(handle.clone())),
            _ => Ok(()),
        }
    }

    /// Submit gate: required fields present and the slot free.
    pub fn check_submittable(&self, config: &AssessmentConfig) -> Result<(), PortalError> {
        validate_required(&config.tenant_id, config.subscription_ids.len())?;
        self.occupied()
    }

    /// Slot check for operations that replace the displayed run.
    pub fn check_free(&self) -> Result<(), PortalError> {
        self.occupied()
    }

    /// Occupy the slot with a freshly launched run in `Started`.
    pub fn begin(&mut self, handle: RunHandle) -> u64 {
        self.generation += 1;
        self.phase = SessionPhase::Started;
        self.active = Some(handle);
        self.status = Some(RunStatus::started());
        self.manifest = None;
        self.completing = false;
        self.generation
    }

    pub fn apply(&mut self, generation: u64, status: RunStatus) -> Transition {
        if generation != self.generation || !self.is_busy() || self.completing {
            return Transition::Stale;
        }
        let status = status.normalized();
        match status.status {
            RunState::Started | RunState::Running => {
                self.phase = if status.status == RunState::Started {
                    SessionPhase::Started
                } else {
                    SessionPhase::Running
                };
                self.status = Some(status.clone());
                Transition::Progress(status)
            }
            RunState::Completed => {
                self.completing = true;
                Transition::Completing(status)
            }
            RunState::Failed => {
                self.phase = SessionPhase::Failed;
                self.status = Some(status.clone());
                Transition::Failed(status)
            }
        }
    }

    /// Publish completion together with its manifest (or without one when the
    /// single fetch failed).
    pub fn complete(&mut self, generation: u64, status: RunStatus, manifest: Option<ResultManifest>) {
        if generation != self.generation {
            return;
        }
        self.phase = SessionPhase::Completed;
        self.status = Some(status);
        self.manifest = manifest;
        self.completing = false;
    }

    /// Show a historical run as completed, bypassing the poll states.
    pub fn reopen(&mut self, manifest: ResultManifest) {
        self.generation += 1;
        self.phase = SessionPhase::Completed;
        self.active = Some(manifest.run_id.clone());
        self.status = Some(RunStatus::completed());
        self.manifest = Some(manifest);
        self.completing = false;
    }

    /// Drop everything held for `run_id` if it is the displayed run.
    pub fn clear_if_active(&mut self, run_id: &RunHandle) -> bool {
        if self.active.as_ref() != Some(run_id) {
            return false;
        }
        self.release();
        true
    }

    pub fn release(&mut self) {
        self.generation += 1;
        self.phase = SessionPhase::Idle;
        self.active = None;
        self.status = None;
        self.manifest = None;
        self.completing = false;
    }
}
