//! Remote portal contract consumed by the lifecycle manager.

mod http;
#[cfg(test)]
pub(crate) mod fake;
#[cfg(test)]
pub(crate) mod stub;

pub use http::PortalClient;

use crate::error::PortalError;
use crate::model::{
    AssessmentConfig, HealthContext, ResultManifest, RunHandle, RunStatus, RunSummary,
    Subscription,
};
use std::future::Future;

/// Operations the assessment portal exposes. Futures are `Send` so poll
/// requests can run as detached tasks.
pub trait PortalApi: Send + Sync + 'static {
    fn health(&self) -> impl Future<Output = Result<HealthContext, PortalError>> + Send;

    fn subscriptions(&self) -> impl Future<Output = Result<Vec<Subscription>, PortalError>> + Send;

    fn submit(
        &self,
        config: &AssessmentConfig,
    ) -> impl Future<Output = Result<RunHandle, PortalError>> + Send;

    fn status(
        &self,
        run_id: &RunHandle,
    ) -> impl Future<Output = Result<RunStatus, PortalError>> + Send;

    fn manifest(
        &self,
        run_id: &RunHandle,
    ) -> impl Future<Output = Result<ResultManifest, PortalError>> + Send;

    fn list_runs(&self) -> impl Future<Output = Result<Vec<RunSummary>, PortalError>> + Send;

    fn delete_run(&self, run_id: &RunHandle) -> impl Future<Output = Result<(), PortalError>> + Send;
}
