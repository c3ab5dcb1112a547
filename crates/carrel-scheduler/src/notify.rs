//! Pending notifications and the typed responses scheduler operations
//! return to external collaborators (the HTTP/presentation layer).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// An item queued to be surfaced to the user, awaiting acknowledgment.
/// The queue holds at most one of these per item id.
#[derive(Debug, Clone, Serialize)]
pub struct PendingNotification {
    pub id: String,
    pub title: String,
    /// Store-relative record path at enqueue time.
    pub path: PathBuf,
    /// The trigger this notification fired for.
    pub trigger_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of a visibility switch.
#[derive(Debug, Clone, Serialize)]
pub struct VisibilityChange {
    pub check_interval_secs: u64,
    /// True on a hidden-to-visible transition: the caller owes the loop an
    /// out-of-band immediate tick.
    #[serde(skip)]
    pub immediate_tick: bool,
}

/// Result of resetting interval baselines (at start() or on demand).
#[derive(Debug, Clone, Default, Serialize)]
pub struct BaselineReset {
    pub reset_count: usize,
    pub tasks: Vec<ResetEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetEntry {
    pub id: String,
    pub last_notified: DateTime<Utc>,
}
