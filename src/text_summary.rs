//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for run status, manifests, history and health.

use crate::model::{HealthContext, ResultManifest, RunHandle, RunStatus, RunSummary, Subscription};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Human-readable size in powers of 1024, one decimal with a trailing `.0` dropped.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{:.0} {}", rounded, UNITS[unit])
    } else {
        format!("{:.1} {}", rounded, UNITS[unit])
    }
}

pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    format!("{}m {}s", seconds / 60, seconds % 60)
}

pub(crate) fn status_line(run_id: &RunHandle, status: &RunStatus) -> String {
    let mut line = format!(
        "{run_id}: {} ({})",
        status.status.as_str(),
        format_duration(status.elapsed_seconds)
    );
    if let Some(error) = status.error.as_deref() {
        line.push_str(&format!(" error: {error}"));
    }
    line
}

pub(crate) fn build_manifest_summary(manifest: &ResultManifest) -> TextSummary {
    let mut lines = vec![format!(
        "Assessment {} complete: {} files generated ({})",
        manifest.run_id,
        manifest.files.len(),
        format_bytes(manifest.total_size())
    )];
    match manifest.report() {
        Some(report) => lines.push(format!("View report: {}", report.url)),
        None => lines.push("No viewable report".to_string()),
    }
    for file in manifest.downloads() {
        let tag = if file.is_report() { " [view]" } else { "" };
        lines.push(format!(
            "  {}  {}  {}{}",
            file.name,
            format_bytes(file.size),
            file.url,
            tag
        ));
    }
    TextSummary { lines }
}

pub(crate) fn build_runs_summary(runs: &[RunSummary]) -> TextSummary {
    if runs.is_empty() {
        return TextSummary {
            lines: vec!["No past runs".to_string()],
        };
    }
    let lines = runs
        .iter()
        .map(|r| {
            format!(
                "{}  {} files · {}",
                r.run_id,
                r.files,
                format_bytes(r.total_size)
            )
        })
        .collect();
    TextSummary { lines }
}

pub(crate) fn build_health_summary(health: &HealthContext) -> TextSummary {
    let check = |ok: bool| if ok { "ok " } else { "!! " };
    let lines = vec![
        format!("{}Backend: {}", check(health.is_healthy()), health.status),
        format!(
            "{}Assessment script: {}",
            check(health.script_exists),
            if health.script_exists { "Found" } else { "Missing" }
        ),
        format!(
            "{}Storage account: {}",
            check(health.storage_configured),
            if health.storage_configured { "Configured" } else { "Not set" }
        ),
        format!(
            "{}Managed identity: {}",
            check(health.identity_configured),
            if health.identity_configured { "Configured" } else { "Not set" }
        ),
        format!(
            "   Tenant: {}",
            health.tenant_id.as_deref().unwrap_or("-")
        ),
    ];
    TextSummary { lines }
}

pub(crate) fn build_subscriptions_summary(subscriptions: &[Subscription]) -> TextSummary {
    let lines = subscriptions
        .iter()
        .map(|s| format!("{}  {}", s.id, s.name))
        .collect();
    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OutputFile, RunState};

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 * 1024), "3072 GB");
    }

    #[test]
    fn durations_switch_to_minutes() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(60), "1m 0s");
        assert_eq!(format_duration(125), "2m 5s");
    }

    #[test]
    fn failed_status_line_carries_error_verbatim() {
        let status = RunStatus {
            status: RunState::Failed,
            elapsed_seconds: 75,
            error: Some("quota exceeded".into()),
        };
        assert_eq!(
            status_line(&RunHandle::new("run-1"), &status),
            "run-1: failed (1m 15s) error: quota exceeded"
        );
    }

    #[test]
    fn manifest_summary_offers_view_only_for_reports() {
        let manifest = ResultManifest::new(
            RunHandle::new("run-1"),
            vec![
                OutputFile {
                    name: "data.csv".into(),
                    size: 2048,
                    url: "/f/data.csv".into(),
                },
                OutputFile {
                    name: "dash.html".into(),
                    size: 1024,
                    url: "/f/dash.html".into(),
                },
            ],
        );
        let lines = build_manifest_summary(&manifest).lines;
        assert_eq!(lines[0], "Assessment run-1 complete: 2 files generated (3 KB)");
        assert_eq!(lines[1], "View report: /f/dash.html");
        assert!(!lines[2].ends_with("[view]"));
        assert!(lines[3].ends_with("[view]"));

        let no_report = ResultManifest::new(RunHandle::new("run-2"), manifest.files[..1].to_vec());
        let lines = build_manifest_summary(&no_report).lines;
        assert!(!lines.iter().any(|l| l.starts_with("View report")));
    }

    #[test]
    fn empty_history_has_placeholder() {
        assert_eq!(build_runs_summary(&[]).lines, vec!["No past runs"]);
    }
}
