use super::PortalApi;
use crate::error::PortalError;
use crate::model::{
    AssessmentConfig, HealthContext, ManifestResponse, OutputFile, ResultManifest, RunHandle,
    RunStatus, RunSummary, RunsResponse, Subscription, SubmitResponse, SubscriptionsResponse,
};
use crate::settings::Settings;
use anyhow::Context;
use futures::StreamExt;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Artifacts can be large; the regular request timeout would cut them off.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// HTTP client for the portal's `/api` endpoints.
#[derive(Debug, Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    base: Url,
}

impl PortalClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let base = Url::parse(&settings.base_url)
            .with_context(|| format!("invalid base url {}", settings.base_url))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("base url {} cannot carry a path", settings.base_url);
        }
        let http = reqwest::Client::builder()
            .user_agent(format!("avd-assess/{}", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout)
            .build()
            .context("build http client")?;
        Ok(Self { http, base })
    }

    /// Build an endpoint URL from path segments; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        run_id: Option<&RunHandle>,
    ) -> Result<T, PortalError> {
        let resp = self.http.get(url).send().await?;
        let resp = check_status(resp, run_id)?;
        Ok(resp.json::<T>().await?)
    }

    /// Stream one artifact into `dest_dir`, keeping only the final path
    /// component of its name.
    pub async fn download(&self, file: &OutputFile, dest_dir: &Path) -> anyhow::Result<PathBuf> {
        let url = self
            .base
            .join(&file.url)
            .with_context(|| format!("invalid artifact url {}", file.url))?;
        let name = Path::new(&file.name)
            .file_name()
            .with_context(|| format!("artifact {:?} has no file name", file.name))?;
        let path = dest_dir.join(name);

        let resp = self
            .http
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("request {}", file.name))?
            .error_for_status()
            .with_context(|| format!("download {}", file.name))?;

        let mut out = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("create {}", path.display()))?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("read body of {}", file.name))?;
            out.write_all(&chunk)
                .await
                .with_context(|| format!("write {}", path.display()))?;
        }
        out.flush().await?;
        Ok(path)
    }
}

/// 404 on a run-scoped endpoint means the id is unknown to the portal; any
/// other non-success status is a transport-level failure.
fn check_status(resp: Response, run_id: Option<&RunHandle>) -> Result<Response, PortalError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = run_id {
            return Err(PortalError::NotFound(id.clone()));
        }
    }
    if !status.is_success() {
        return Err(PortalError::Transport(format!(
            "{} returned {}",
            resp.url().path(),
            status
        )));
    }
    Ok(resp)
}

impl PortalApi for PortalClient {
    async fn health(&self) -> Result<HealthContext, PortalError> {
        self.get_json(self.endpoint(&["api", "health"]), None).await
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>, PortalError> {
        let body: SubscriptionsResponse = self
            .get_json(self.endpoint(&["api", "subscriptions"]), None)
            .await?;
        Ok(body.subscriptions)
    }

    async fn submit(&self, config: &AssessmentConfig) -> Result<RunHandle, PortalError> {
        let resp = self
            .http
            .post(self.endpoint(&["api", "assess"]))
            .json(config)
            .send()
            .await?;
        let status = resp.status();
        // The request was delivered; from here on failures are rejections.
        let body: SubmitResponse = match resp.json().await {
            Ok(b) => b,
            Err(e) if status.is_success() => {
                return Err(PortalError::Submission(format!("unreadable response: {e}")))
            }
            Err(_) => SubmitResponse::default(),
        };
        match body.run_id.filter(|id| !id.trim().is_empty()) {
            Some(id) if status.is_success() => Ok(RunHandle::new(id)),
            _ => Err(PortalError::Submission(
                body.error
                    .unwrap_or_else(|| format!("portal returned {status} without a run id")),
            )),
        }
    }

    async fn status(&self, run_id: &RunHandle) -> Result<RunStatus, PortalError> {
        self.get_json(self.endpoint(&["api", "assess", run_id.as_str()]), Some(run_id))
            .await
    }

    async fn manifest(&self, run_id: &RunHandle) -> Result<ResultManifest, PortalError> {
        let body: ManifestResponse = self
            .get_json(self.endpoint(&["api", "results", run_id.as_str()]), Some(run_id))
            .await?;
        Ok(ResultManifest::new(run_id.clone(), body.files))
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>, PortalError> {
        let body: RunsResponse = self.get_json(self.endpoint(&["api", "runs"]), None).await?;
        Ok(body.runs)
    }

    async fn delete_run(&self, run_id: &RunHandle) -> Result<(), PortalError> {
        let resp = self
            .http
            .delete(self.endpoint(&["api", "runs", run_id.as_str()]))
            .send()
            .await?;
        check_status(resp, Some(run_id))?;
        Ok(())
    }
}
