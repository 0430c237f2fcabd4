//! Post-run processing utilities.
//!
//! Handles artifact downloads once a manifest is available, for both freshly
//! completed runs and re-opened ones.

use crate::model::ResultManifest;
use crate::portal::PortalClient;
use std::path::{Path, PathBuf};

/// Result of post-run processing, ready for presentation layers.
#[derive(Debug, Default)]
pub(crate) struct ProcessedRun {
    pub downloaded: Vec<PathBuf>,
    pub messages: Vec<String>,
}

/// Download every artifact of `manifest` into `download_dir`, if one was given.
/// Individual failures are reported as messages and do not stop the rest.
pub(crate) async fn process_run_completion(
    client: &PortalClient,
    manifest: &ResultManifest,
    download_dir: Option<&Path>,
) -> ProcessedRun {
    let mut processed = ProcessedRun::default();
    log::debug!(
        "RUN_POST_PROCESS run_id={} files={} report={}",
        manifest.run_id,
        manifest.files.len(),
        manifest.has_viewable_report()
    );
    let Some(dir) = download_dir else {
        return processed;
    };

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        processed
            .messages
            .push(format!("Create {} failed: {e}", dir.display()));
        return processed;
    }

    for file in manifest.downloads() {
        match client.download(file, dir).await {
            Ok(path) => {
                log::info!(
                    "ARTIFACT_SAVED run_id={} name={} path={}",
                    manifest.run_id,
                    file.name,
                    path.display()
                );
                processed.messages.push(format!("Saved: {}", path.display()));
                processed.downloaded.push(path);
            }
            Err(e) => {
                log::warn!(
                    "ARTIFACT_FAILED run_id={} name={} error={:#}",
                    manifest.run_id,
                    file.name,
                    e
                );
                processed
                    .messages
                    .push(format!("Download {} failed: {e:#}", file.name));
            }
        }
    }
    processed
}
