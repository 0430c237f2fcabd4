use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// File suffix that marks an artifact as an inline-viewable report.
pub const REPORT_EXTENSION: &str = ".html";

/// Job request assembled from operator input and sent to the launch endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentConfig {
    pub tenant_id: String,
    pub subscription_ids: BTreeSet<String>,
    #[serde(default)]
    pub log_analytics_workspace_ids: Vec<String>,
    pub metrics_lookback_days: u32,
    pub include_advisor: bool,
    pub include_reservations: bool,
    pub skip_costs: bool,
    #[serde(rename = "scrubPII")]
    pub scrub_pii: bool,
    pub quick_summary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyst_name: Option<String>,
}

/// Opaque run identifier handed out by the launch endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHandle(String);

impl RunHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Started,
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Started => "started",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

/// Latest status reported by the remote executor for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub status: RunState,
    #[serde(default)]
    pub elapsed_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunStatus {
    /// Local pseudostatus shown right after a successful submission.
    pub fn started() -> Self {
        Self {
            status: RunState::Started,
            elapsed_seconds: 0,
            error: None,
        }
    }

    /// Status synthesized when a historical run is re-opened.
    pub fn completed() -> Self {
        Self {
            status: RunState::Completed,
            elapsed_seconds: 0,
            error: None,
        }
    }

    /// Drop an `error` that arrived alongside a non-failed status.
    pub fn normalized(mut self) -> Self {
        if self.status != RunState::Failed {
            self.error = None;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub url: String,
}

impl OutputFile {
    pub fn is_report(&self) -> bool {
        self.name.ends_with(REPORT_EXTENSION)
    }
}

/// Artifacts produced by one run, in the order the source returned them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultManifest {
    pub run_id: RunHandle,
    pub files: Vec<OutputFile>,
}

impl ResultManifest {
    pub fn new(run_id: RunHandle, files: Vec<OutputFile>) -> Self {
        Self { run_id, files }
    }

    pub fn has_viewable_report(&self) -> bool {
        self.files.iter().any(OutputFile::is_report)
    }

    pub fn viewable(&self) -> impl Iterator<Item = &OutputFile> {
        self.files.iter().filter(|f| f.is_report())
    }

    /// The report opened by the "view" affordance: the first viewable file.
    pub fn report(&self) -> Option<&OutputFile> {
        self.viewable().next()
    }

    /// Every file is downloadable, viewable or not.
    pub fn downloads(&self) -> impl Iterator<Item = &OutputFile> {
        self.files.iter()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// History entry as listed by the registry endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: RunHandle,
    #[serde(default)]
    pub files: u64,
    #[serde(default)]
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Remote readiness as reported by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthContext {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub script_exists: bool,
    #[serde(default)]
    pub storage_configured: bool,
    #[serde(default)]
    pub identity_configured: bool,
}

impl HealthContext {
    /// Placeholder used when the health endpoint cannot be reached.
    pub fn unreachable() -> Self {
        Self {
            status: "error".to_string(),
            tenant_id: None,
            script_exists: false,
            storage_configured: false,
            identity_configured: false,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Wire body of the launch endpoint. The portal answers `{error}` instead of
/// `{runId}` when it cannot allocate a run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitResponse {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ManifestResponse {
    #[serde(default)]
    pub files: Vec<OutputFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RunsResponse {
    #[serde(default)]
    pub runs: Vec<RunSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SubscriptionsResponse {
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

/// Lifecycle events surfaced to presentation layers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RunEvent {
    Submitted {
        run_id: RunHandle,
    },
    StatusChanged {
        run_id: RunHandle,
        status: RunStatus,
    },
    Completed {
        run_id: RunHandle,
        status: RunStatus,
        manifest: ResultManifest,
    },
    Failed {
        run_id: RunHandle,
        status: RunStatus,
    },
    /// The run completed but its single manifest fetch failed.
    ManifestUnavailable {
        run_id: RunHandle,
        status: RunStatus,
        error: String,
    },
}
