//! # Carrel Scheduler
//!
//! Recurring-task notification engine: notifies exactly once per due
//! cycle, across restarts, crashes, and sleep/resume.
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio loop, rearmed after each tick settles)
//!   └── tick:
//!         scan store ──► all tasks not in trash
//!         drop stale pending entries
//!         for each task: resolve next trigger
//!           ├── Interval: baseline + N minutes
//!           ├── Daily:    today at HH:MM
//!           ├── Weekly:   most recent matching weekday
//!           ├── Monthly:  most recent valid day-of-month
//!           └── One-shot: scheduled_time
//!         due? ──► persist last_notified ──► enqueue pending
//!
//! acknowledge / notifyTask / setVisibility / resetIntervalBaselines
//!   mutate the same queue from the same logical thread.
//! ```
//!
//! The due decision is a pure function of (rule, baseline, now); the only
//! persisted scheduling state is `last_notified` on the item itself.

pub mod engine;
pub mod notify;
pub mod resolve;
pub mod service;

pub use engine::SchedulerEngine;
pub use notify::{BaselineReset, PendingNotification, ResetEntry, VisibilityChange};
pub use service::Scheduler;
