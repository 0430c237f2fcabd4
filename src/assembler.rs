//! Turns free-form operator input into a well-formed `AssessmentConfig`.

use crate::error::ValidationError;
use crate::model::{AssessmentConfig, HealthContext};
use crate::selector::SubscriptionSelector;
use std::ops::RangeInclusive;

pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;
/// Advisory only; the remote executor may enforce it.
pub const LOOKBACK_RANGE: RangeInclusive<u32> = 1..=90;

/// Unvalidated form values as typed by the operator.
#[derive(Debug, Clone)]
pub struct RawInputs {
    pub tenant_id: String,
    pub workspaces: String,
    pub lookback_days: String,
    pub include_advisor: bool,
    pub include_reservations: bool,
    pub skip_costs: bool,
    pub scrub_pii: bool,
    pub quick_summary: bool,
    pub company_name: String,
    pub analyst_name: String,
}

impl Default for RawInputs {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            workspaces: String::new(),
            lookback_days: DEFAULT_LOOKBACK_DAYS.to_string(),
            include_advisor: true,
            include_reservations: false,
            skip_costs: false,
            scrub_pii: false,
            quick_summary: false,
            company_name: String::new(),
            analyst_name: String::new(),
        }
    }
}

impl RawInputs {
    /// Fill the tenant from the health context unless the operator already set one.
    pub fn prefill_tenant(&mut self, health: &HealthContext) -> bool {
        if !self.tenant_id.trim().is_empty() {
            return false;
        }
        match health.tenant_id.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => {
                self.tenant_id = t.to_string();
                true
            }
            _ => false,
        }
    }
}

/// Required-field check shared by `assemble` and the submit gate.
pub fn validate_required(tenant_id: &str, subscription_count: usize) -> Result<(), ValidationError> {
    if tenant_id.trim().is_empty() {
        return Err(ValidationError::MissingTenant);
    }
    if subscription_count == 0 {
        return Err(ValidationError::NoSubscriptions);
    }
    Ok(())
}

pub fn assemble(
    raw: &RawInputs,
    selector: &SubscriptionSelector,
) -> Result<AssessmentConfig, ValidationError> {
    validate_required(&raw.tenant_id, selector.len())?;

    Ok(AssessmentConfig {
        tenant_id: raw.tenant_id.trim().to_string(),
        subscription_ids: selector.ids().map(str::to_string).collect(),
        log_analytics_workspace_ids: parse_workspace_ids(&raw.workspaces),
        metrics_lookback_days: normalize_lookback(&raw.lookback_days),
        include_advisor: raw.include_advisor,
        include_reservations: raw.include_reservations,
        skip_costs: raw.skip_costs,
        scrub_pii: raw.scrub_pii,
        quick_summary: raw.quick_summary,
        company_name: non_empty(&raw.company_name),
        analyst_name: non_empty(&raw.analyst_name),
    })
}

/// Comma-separated workspace ids, trimmed, empties dropped, order kept.
pub fn parse_workspace_ids(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Anything that is not a positive integer falls back to the default.
pub fn normalize_lookback(text: &str) -> u32 {
    let days = match text.trim().parse::<u32>() {
        Ok(d) if d > 0 => d,
        _ => return DEFAULT_LOOKBACK_DAYS,
    };
    if !LOOKBACK_RANGE.contains(&days) {
        log::warn!(
            "LOOKBACK_OUT_OF_RANGE days={} min={} max={}",
            days,
            LOOKBACK_RANGE.start(),
            LOOKBACK_RANGE.end()
        );
    }
    days
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
