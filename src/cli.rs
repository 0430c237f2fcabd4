use crate::assembler::{self, RawInputs};
use crate::error::PortalError;
use crate::model::{HealthContext, RunEvent, RunHandle};
use crate::orchestrator::{process_run_completion, DeleteOutcome, LifecycleManager, ProcessedRun};
use crate::portal::{PortalApi, PortalClient};
use crate::selector::SubscriptionSelector;
use crate::settings::{self, Settings};
use crate::text_summary::{self, TextSummary};
use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
/// The std locks are taken per line; the logger writes to stderr too.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(std::io::stdout().lock(), "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(std::io::stderr().lock(), "{}", msg);
                }
            }
        }

        let _ = std::io::stdout().lock().flush();
    });
    (tx, handle)
}

/// Presentation sink: text lines, or pretty JSON documents with `--json`.
struct Output {
    tx: mpsc::UnboundedSender<OutputLine>,
    as_json: bool,
}

impl Output {
    fn line(&self, msg: impl Into<String>) {
        let _ = self.tx.send(OutputLine::Stdout(msg.into()));
    }

    /// Progress and side-channel messages go to stderr in every mode.
    fn note(&self, msg: impl Into<String>) {
        let _ = self.tx.send(OutputLine::Stderr(msg.into()));
    }

    fn summary(&self, summary: TextSummary) {
        for line in summary.lines {
            self.line(line);
        }
    }

    fn json<T: Serialize>(&self, value: &T) -> Result<()> {
        self.line(serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "avd-assess",
    version,
    about = "Launch, monitor and browse AVD assessment runs"
)]
pub struct Cli {
    /// Base URL of the assessment portal (overrides the settings file)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Settings file (default: <config dir>/avd-assess/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Interval between status polls
    #[arg(long, global = true)]
    pub poll_interval: Option<humantime::Duration>,

    /// Per-request timeout
    #[arg(long, global = true)]
    pub timeout: Option<humantime::Duration>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Show portal readiness
    Health,
    /// List subscriptions visible to the portal identity
    Subscriptions,
    /// Submit a new assessment and wait for it to finish
    Assess(AssessArgs),
    /// Resume watching a run submitted earlier
    Watch {
        run_id: String,
        /// Download all artifacts into this directory on completion
        #[arg(long)]
        download: Option<PathBuf>,
    },
    /// Query the current status of a run once
    Status { run_id: String },
    /// Show the artifacts of a finished run
    Results {
        run_id: String,
        /// Download all artifacts into this directory
        #[arg(long)]
        download: Option<PathBuf>,
    },
    /// List past runs
    Runs,
    /// Delete a run and all of its files
    Delete {
        run_id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Args, Clone)]
pub struct AssessArgs {
    /// Tenant to assess (falls back to settings, then the detected tenant)
    #[arg(long)]
    pub tenant_id: Option<String>,

    /// Subscription id to toggle; repeat for several. With
    /// --all-subscriptions a listed id is excluded instead
    #[arg(long = "subscription", value_name = "ID")]
    pub subscriptions: Vec<String>,

    /// Include every subscription visible to the portal
    #[arg(long)]
    pub all_subscriptions: bool,

    /// Comma-separated Log Analytics workspace ids
    #[arg(long, default_value = "")]
    pub workspaces: String,

    /// Metrics lookback in days (1-90)
    #[arg(long, default_value = "7", allow_hyphen_values = true)]
    pub lookback_days: String,

    /// Skip Azure Advisor recommendations
    #[arg(long)]
    pub no_advisor: bool,

    /// Include reservation analysis
    #[arg(long)]
    pub include_reservations: bool,

    /// Skip Cost Management queries (uses PAYG estimates)
    #[arg(long)]
    pub skip_costs: bool,

    /// Scrub personally identifiable information from outputs
    #[arg(long)]
    pub scrub_pii: bool,

    /// Produce a short summary instead of the full evidence pack
    #[arg(long)]
    pub quick_summary: bool,

    /// Company name printed on the report
    #[arg(long)]
    pub company: Option<String>,

    /// Analyst name printed on the report
    #[arg(long)]
    pub analyst: Option<String>,

    /// Print the run id and exit without waiting
    #[arg(long)]
    pub no_wait: bool,

    /// Download all artifacts into this directory on completion
    #[arg(long)]
    pub download: Option<PathBuf>,
}

/// Merge the settings file with command-line overrides.
pub fn resolve_settings(args: &Cli) -> Result<Settings> {
    let mut settings = settings::load(args.config.as_deref())?;
    if let Some(url) = &args.base_url {
        settings.base_url = url.clone();
    }
    if let Some(interval) = args.poll_interval {
        settings.poll_interval = Duration::from(interval);
    }
    if let Some(timeout) = args.timeout {
        settings.request_timeout = Duration::from(timeout);
    }
    if settings.poll_interval.is_zero() {
        anyhow::bail!("--poll-interval must be greater than zero");
    }
    Ok(settings)
}

pub async fn run(args: Cli) -> Result<()> {
    let settings = resolve_settings(&args)?;
    let client = Arc::new(PortalClient::new(&settings)?);
    let (tx, out_handle) = spawn_output_writer();
    let out = Output {
        tx,
        as_json: args.json,
    };

    let res = dispatch(args.command, client, &settings, &out).await;

    drop(out);
    let _ = out_handle.await;
    res
}

async fn dispatch(
    command: Command,
    client: Arc<PortalClient>,
    settings: &Settings,
    out: &Output,
) -> Result<()> {
    match command {
        Command::Health => run_health(&client, out).await,
        Command::Subscriptions => run_subscriptions(&client, out).await,
        Command::Assess(a) => run_assess(client, settings, a, out).await,
        Command::Watch { run_id, download } => {
            let mut mgr = LifecycleManager::new(client, settings.poll_interval);
            mgr.attach(RunHandle::new(run_id))?;
            watch_until_terminal(&mut mgr, download.as_deref(), out).await
        }
        Command::Status { run_id } => run_status(&client, &RunHandle::new(run_id), out).await,
        Command::Results { run_id, download } => {
            let mut mgr = LifecycleManager::new(client, settings.poll_interval);
            run_results(&mut mgr, &RunHandle::new(run_id), download.as_deref(), out).await
        }
        Command::Runs => {
            let mut mgr = LifecycleManager::new(client, settings.poll_interval);
            let runs = mgr.refresh_runs().await.context("list runs")?;
            if out.as_json {
                out.json(&runs)
            } else {
                out.summary(text_summary::build_runs_summary(runs));
                Ok(())
            }
        }
        Command::Delete { run_id, yes } => {
            let mut mgr = LifecycleManager::new(client, settings.poll_interval);
            run_delete(&mut mgr, &RunHandle::new(run_id), yes, out).await
        }
    }
}

async fn run_health(client: &PortalClient, out: &Output) -> Result<()> {
    let health = fetch_health(client).await;
    if out.as_json {
        out.json(&health)
    } else {
        out.summary(text_summary::build_health_summary(&health));
        Ok(())
    }
}

/// Health is advisory: an unreachable portal yields an `error` context.
async fn fetch_health(client: &PortalClient) -> HealthContext {
    match client.health().await {
        Ok(h) => h,
        Err(e) => {
            log::warn!("HEALTH_UNREACHABLE error={}", e);
            HealthContext::unreachable()
        }
    }
}

async fn run_subscriptions(client: &PortalClient, out: &Output) -> Result<()> {
    let subs = client
        .subscriptions()
        .await
        .context("list subscriptions")?;
    if out.as_json {
        out.json(&subs)
    } else {
        out.summary(text_summary::build_subscriptions_summary(&subs));
        Ok(())
    }
}

async fn run_assess(
    client: Arc<PortalClient>,
    settings: &Settings,
    a: AssessArgs,
    out: &Output,
) -> Result<()> {
    let mut raw = RawInputs {
        tenant_id: a
            .tenant_id
            .or_else(|| settings.tenant_id.clone())
            .unwrap_or_default(),
        workspaces: a.workspaces,
        lookback_days: a.lookback_days,
        include_advisor: !a.no_advisor,
        include_reservations: a.include_reservations,
        skip_costs: a.skip_costs,
        scrub_pii: a.scrub_pii,
        quick_summary: a.quick_summary,
        company_name: a
            .company
            .or_else(|| settings.company_name.clone())
            .unwrap_or_default(),
        analyst_name: a
            .analyst
            .or_else(|| settings.analyst_name.clone())
            .unwrap_or_default(),
    };

    let health = fetch_health(&client).await;
    if !health.is_healthy() {
        out.note(format!("Portal reports status '{}'", health.status));
    } else if !health.script_exists {
        out.note("Portal reports the assessment script is missing");
    }
    if raw.prefill_tenant(&health) {
        out.note(format!("Using detected tenant {}", raw.tenant_id));
    }

    let mut selector = SubscriptionSelector::new();
    if a.all_subscriptions {
        let subs = client
            .subscriptions()
            .await
            .context("list subscriptions")?;
        selector.select_all(&subs);
    }
    for id in &a.subscriptions {
        selector.toggle(id);
    }
    for id in a.subscriptions.iter().filter(|id| !selector.is_selected(id)) {
        out.note(format!("Excluding subscription {id}"));
    }

    let config = assembler::assemble(&raw, &selector)?;
    let mut mgr = LifecycleManager::new(client, settings.poll_interval);
    let run_id = mgr.submit(&config).await.context("submit assessment")?;

    if a.no_wait {
        if out.as_json {
            out.json(&serde_json::json!({ "runId": run_id }))?;
        } else {
            out.line(run_id.to_string());
        }
        return Ok(());
    }
    watch_until_terminal(&mut mgr, a.download.as_deref(), out).await
}

/// Follow the active run until a terminal event. Ctrl-C detaches; the run
/// keeps going on the portal and can be resumed with `watch`.
async fn watch_until_terminal(
    mgr: &mut LifecycleManager<PortalClient>,
    download: Option<&Path>,
    out: &Output,
) -> Result<()> {
    loop {
        let event = tokio::select! {
            ev = mgr.next_event() => ev,
            _ = tokio::signal::ctrl_c() => {
                if let (Some(run_id), Some(status)) = (mgr.session().active(), mgr.session().status()) {
                    out.note(format!(
                        "Detached at {}. The run continues remotely; resume with: avd-assess watch {run_id}",
                        text_summary::status_line(run_id, status)
                    ));
                }
                mgr.detach();
                return Ok(());
            }
        };
        let Some(event) = event else {
            return Ok(());
        };
        emit_event(&event, out)?;

        match event {
            RunEvent::Completed { manifest, .. } => {
                let processed = process_run_completion(mgr.api(), &manifest, download).await;
                report_processed(processed, out);
                return Ok(());
            }
            RunEvent::Failed { run_id, status } => {
                return Err(PortalError::RemoteJob {
                    run_id,
                    message: status
                        .error
                        .unwrap_or_else(|| "no error detail reported".to_string()),
                }
                .into());
            }
            RunEvent::ManifestUnavailable { run_id, .. } => {
                out.note(format!(
                    "Run {run_id} completed but its files could not be listed. Retry with: avd-assess results {run_id}"
                ));
                return Ok(());
            }
            RunEvent::Submitted { .. } | RunEvent::StatusChanged { .. } => {}
        }
    }
}

fn emit_event(event: &RunEvent, out: &Output) -> Result<()> {
    if out.as_json {
        return out.json(event);
    }
    match event {
        RunEvent::Submitted { run_id } => out.note(format!("Submitted run {run_id}")),
        RunEvent::StatusChanged { run_id, status } => {
            out.note(text_summary::status_line(run_id, status))
        }
        RunEvent::Completed { manifest, .. } => {
            out.summary(text_summary::build_manifest_summary(manifest))
        }
        RunEvent::Failed { run_id, status } => {
            out.note(text_summary::status_line(run_id, status))
        }
        RunEvent::ManifestUnavailable { run_id, error, .. } => {
            out.note(format!("{run_id}: completed, manifest unavailable: {error}"))
        }
    }
    Ok(())
}

async fn run_status(client: &PortalClient, run_id: &RunHandle, out: &Output) -> Result<()> {
    let status = client
        .status(run_id)
        .await
        .with_context(|| format!("query status of {run_id}"))?
        .normalized();
    if out.as_json {
        out.json(&status)
    } else {
        out.line(text_summary::status_line(run_id, &status));
        Ok(())
    }
}

async fn run_results(
    mgr: &mut LifecycleManager<PortalClient>,
    run_id: &RunHandle,
    download: Option<&Path>,
    out: &Output,
) -> Result<()> {
    let manifest = mgr
        .reopen(run_id)
        .await
        .with_context(|| format!("load results of {run_id}"))?;
    if out.as_json {
        out.json(&manifest)?;
    } else {
        out.summary(text_summary::build_manifest_summary(&manifest));
    }
    let processed = process_run_completion(mgr.api(), &manifest, download).await;
    report_processed(processed, out);
    Ok(())
}

fn report_processed(processed: ProcessedRun, out: &Output) {
    for msg in processed.messages {
        out.note(msg);
    }
    if !processed.downloaded.is_empty() {
        out.note(format!("Downloaded {} files", processed.downloaded.len()));
    }
}

async fn run_delete(
    mgr: &mut LifecycleManager<PortalClient>,
    run_id: &RunHandle,
    assume_yes: bool,
    out: &Output,
) -> Result<()> {
    let approved = assume_yes || confirm_delete(run_id, out).await;
    let outcome = mgr
        .delete(run_id, |_| approved)
        .await
        .with_context(|| format!("delete {run_id}"))?;
    let deleted = outcome == DeleteOutcome::Deleted;
    if out.as_json {
        out.json(&serde_json::json!({ "runId": run_id, "deleted": deleted }))?;
    } else if deleted {
        out.line(format!("Deleted {run_id}"));
        out.summary(text_summary::build_runs_summary(mgr.runs()));
    } else {
        out.note("Cancelled");
    }
    Ok(())
}

/// Interactive confirmation; anything but `y`/`yes` declines, as does a
/// closed or unreadable stdin.
async fn confirm_delete(run_id: &RunHandle, out: &Output) -> bool {
    out.note(format!("Delete run {run_id} and all its files? [y/N]"));
    let answer = tokio::task::spawn_blocking(|| {
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer).map(|_| answer)
    })
    .await;
    match answer {
        Ok(Ok(answer)) => is_affirmative(&answer),
        _ => false,
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn assess_flags_map_to_args() {
        let cli = Cli::try_parse_from([
            "avd-assess",
            "--json",
            "assess",
            "--tenant-id",
            "t-1",
            "--subscription",
            "s1",
            "--subscription",
            "s2",
            "--lookback-days",
            "-5",
            "--no-advisor",
            "--scrub-pii",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Command::Assess(a) => {
                assert_eq!(a.tenant_id.as_deref(), Some("t-1"));
                assert_eq!(a.subscriptions, vec!["s1", "s2"]);
                assert_eq!(a.lookback_days, "-5");
                assert!(a.no_advisor);
                assert!(a.scrub_pii);
                assert!(!a.skip_costs);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn overrides_win_over_settings_file() {
        let path = std::env::temp_dir().join(format!(
            "avd-assess-cli-test-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{"base_url":"http://from-file:8080","poll_interval":"5s","tenant_id":"t-file"}"#,
        )
        .unwrap();

        let path_arg = path.to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "avd-assess",
            "--config",
            path_arg.as_str(),
            "--poll-interval",
            "10s",
            "runs",
        ])
        .unwrap();
        let settings = resolve_settings(&cli).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(settings.base_url, "http://from-file:8080");
        assert_eq!(settings.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.tenant_id.as_deref(), Some("t-file"));
    }

    #[tokio::test]
    async fn stderr_stays_writable_while_writer_runs() {
        let _ = env_logger::Builder::new()
            .filter_level(log::LevelFilter::Warn)
            .try_init();
        let (tx, handle) = spawn_output_writer();
        let _ = tx.send(OutputLine::Stderr("run-1: running (3s)".into()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let direct = tokio::task::spawn_blocking(|| {
            let _ = writeln!(std::io::stderr(), "Delete run run-1 and all its files? [y/N]");
            log::warn!("POLL_FAILED run_id=run-1 error=connection reset");
        });
        let joined = tokio::time::timeout(Duration::from_secs(3), direct).await;
        assert!(joined.is_ok(), "stderr write blocked while the writer was alive");

        let _ = tx.send(OutputLine::Stdout("done".into()));
        drop(tx);
        handle.await.unwrap();
    }

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative("yep"));
    }
}
