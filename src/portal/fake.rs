//! Scripted in-memory portal used by lifecycle tests.

use super::PortalApi;
use crate::error::PortalError;
use crate::model::{
    AssessmentConfig, HealthContext, OutputFile, ResultManifest, RunHandle, RunState, RunStatus,
    RunSummary, Subscription,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Calls {
    pub submit: usize,
    pub status: usize,
    pub manifest: usize,
    pub list_runs: usize,
    pub delete: usize,
}

/// One scripted answer to a status poll.
pub(crate) enum Poll {
    Status(RunStatus),
    TransportError,
}

#[derive(Default)]
struct State {
    run_ids: VecDeque<String>,
    polls: VecDeque<Poll>,
    status_delay: Duration,
    manifest_delay: Duration,
    manifests: HashMap<String, Vec<OutputFile>>,
    manifest_unavailable: bool,
    runs: Vec<RunSummary>,
    calls: Calls,
}

#[derive(Default)]
pub(crate) struct FakePortal {
    state: Mutex<State>,
}

pub(crate) fn status(state: RunState, elapsed_seconds: u64) -> Poll {
    Poll::Status(RunStatus {
        status: state,
        elapsed_seconds,
        error: None,
    })
}

pub(crate) fn failed(error: &str) -> Poll {
    Poll::Status(RunStatus {
        status: RunState::Failed,
        elapsed_seconds: 9,
        error: Some(error.to_string()),
    })
}

pub(crate) fn file(name: &str, size: u64) -> OutputFile {
    OutputFile {
        name: name.to_string(),
        size,
        url: format!("/files/{name}"),
    }
}

pub(crate) fn summary(id: &str) -> RunSummary {
    RunSummary {
        run_id: RunHandle::new(id),
        files: 2,
        total_size: 2048,
    }
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn next_run_ids(self, ids: &[&str]) -> Self {
        self.with(|s| s.run_ids.extend(ids.iter().map(|id| id.to_string())));
        self
    }

    pub fn polls(self, polls: Vec<Poll>) -> Self {
        self.with(|s| s.polls.extend(polls));
        self
    }

    pub fn status_delay(self, delay: Duration) -> Self {
        self.with(|s| s.status_delay = delay);
        self
    }

    pub fn manifest_delay(self, delay: Duration) -> Self {
        self.with(|s| s.manifest_delay = delay);
        self
    }

    pub fn manifest(self, run_id: &str, files: Vec<OutputFile>) -> Self {
        self.with(|s| {
            s.manifests.insert(run_id.to_string(), files);
        });
        self
    }

    pub fn manifest_unavailable(self) -> Self {
        self.with(|s| s.manifest_unavailable = true);
        self
    }

    pub fn runs(self, runs: Vec<RunSummary>) -> Self {
        self.with(|s| s.runs = runs);
        self
    }

    pub fn push_run(&self, run: RunSummary) {
        self.with(|s| s.runs.push(run));
    }

    pub fn calls(&self) -> Calls {
        self.with(|s| s.calls)
    }
}

impl PortalApi for FakePortal {
    async fn health(&self) -> Result<HealthContext, PortalError> {
        Ok(HealthContext {
            status: "healthy".into(),
            tenant_id: Some("tenant-auto".into()),
            script_exists: true,
            storage_configured: true,
            identity_configured: true,
        })
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>, PortalError> {
        Ok(vec![Subscription {
            id: "sub-1".into(),
            name: "Production".into(),
        }])
    }

    async fn submit(&self, _config: &AssessmentConfig) -> Result<RunHandle, PortalError> {
        self.with(|s| {
            s.calls.submit += 1;
            s.run_ids
                .pop_front()
                .map(RunHandle::new)
                .ok_or_else(|| PortalError::Submission("no capacity".into()))
        })
    }

    async fn status(&self, _run_id: &RunHandle) -> Result<RunStatus, PortalError> {
        let (delay, poll) = self.with(|s| {
            s.calls.status += 1;
            (s.status_delay, s.polls.pop_front())
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match poll {
            Some(Poll::Status(st)) => Ok(st),
            Some(Poll::TransportError) => Err(PortalError::Transport("connection reset".into())),
            None => Ok(RunStatus {
                status: RunState::Running,
                elapsed_seconds: 0,
                error: None,
            }),
        }
    }

    async fn manifest(&self, run_id: &RunHandle) -> Result<ResultManifest, PortalError> {
        let delay = self.with(|s| {
            s.calls.manifest += 1;
            s.manifest_delay
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.with(|s| {
            if s.manifest_unavailable {
                return Err(PortalError::Transport("storage timeout".into()));
            }
            s.manifests
                .get(run_id.as_str())
                .cloned()
                .map(|files| ResultManifest::new(run_id.clone(), files))
                .ok_or_else(|| PortalError::NotFound(run_id.clone()))
        })
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>, PortalError> {
        self.with(|s| {
            s.calls.list_runs += 1;
            Ok(s.runs.clone())
        })
    }

    async fn delete_run(&self, run_id: &RunHandle) -> Result<(), PortalError> {
        self.with(|s| {
            s.calls.delete += 1;
            let before = s.runs.len();
            s.runs.retain(|r| &r.run_id != run_id);
            s.manifests.remove(run_id.as_str());
            if s.runs.len() == before {
                Err(PortalError::NotFound(run_id.clone()))
            } else {
                Ok(())
            }
        })
    }
}
