//! Run lifecycle orchestration.
//!
//! The controller owns the single active-run slot and its poll timer; the
//! registry mirrors the portal's run history; post-processing fetches artifacts
//! once a manifest is in hand. The CLI only consumes the events produced here.

mod controller;
mod post_process;
mod registry;
mod session;

pub(crate) use controller::{DeleteOutcome, LifecycleManager};
pub(crate) use post_process::{process_run_completion, ProcessedRun};
