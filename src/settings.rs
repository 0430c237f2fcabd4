//! Persistent client settings.
//!
//! Read from `<config dir>/avd-assess/config.json` when present; command-line
//! flags override individual values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed poll period used against the status endpoint.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub tenant_id: Option<String>,
    pub company_name: Option<String>,
    pub analyst_name: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(30),
            tenant_id: None,
            company_name: None,
            analyst_name: None,
        }
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("avd-assess").join("config.json"))
}

/// Load settings from `path`, or from the default location when `None`.
/// A missing file yields defaults; an explicitly named file must exist.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_path() {
            Some(p) => (p, false),
            None => return Ok(Settings::default()),
        },
    };

    if !required && !path.exists() {
        log::debug!("SETTINGS_DEFAULTS path={}", path.display());
        return Ok(Settings::default());
    }

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("read settings {}", path.display()))?;
    let settings = parse(&raw).with_context(|| format!("parse settings {}", path.display()))?;
    log::debug!("SETTINGS_LOADED path={}", path.display());
    Ok(settings)
}

fn parse(raw: &str) -> Result<Settings> {
    let settings: Settings = serde_json::from_str(raw)?;
    if settings.poll_interval.is_zero() {
        anyhow::bail!("poll_interval must be greater than zero");
    }
    Ok(settings)
}
