//! Historical run listing. The remote listing is the source of truth; local
//! edits only bridge the gap until the next refresh.

use crate::error::PortalError;
use crate::model::{RunHandle, RunSummary};
use crate::portal::PortalApi;

#[derive(Debug, Default)]
pub(crate) struct RunRegistry {
    runs: Vec<RunSummary>,
}

impl RunRegistry {
    /// Replace the listing with the remote one, keeping remote order.
    pub async fn refresh<A: PortalApi>(&mut self, api: &A) -> Result<&[RunSummary], PortalError> {
        self.runs = api.list_runs().await?;
        log::debug!("REGISTRY_REFRESHED runs={}", self.runs.len());
        Ok(&self.runs)
    }

    /// Refresh, logging instead of propagating failures.
    pub async fn refresh_quietly<A: PortalApi>(&mut self, api: &A) {
        if let Err(e) = self.refresh(api).await {
            log::warn!("REGISTRY_REFRESH_FAILED error={}", e);
        }
    }

    pub fn runs(&self) -> &[RunSummary] {
        &self.runs
    }

    pub(super) fn forget(&mut self, run_id: &RunHandle) {
        self.runs.retain(|r| &r.run_id != run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::fake::{summary, FakePortal};

    #[tokio::test]
    async fn refresh_keeps_remote_order() {
        let api = FakePortal::new().runs(vec![summary("b"), summary("a"), summary("c")]);
        let mut reg = RunRegistry::default();
        let ids: Vec<String> = reg
            .refresh(&api)
            .await
            .unwrap()
            .iter()
            .map(|r| r.run_id.to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn forget_is_overwritten_by_refresh() {
        let api = FakePortal::new().runs(vec![summary("a")]);
        let mut reg = RunRegistry::default();
        reg.refresh(&api).await.unwrap();
        reg.forget(&RunHandle::new("a"));
        assert!(reg.runs().is_empty());
        reg.refresh_quietly(&api).await;
        assert_eq!(reg.runs().len(), 1);
    }
}
