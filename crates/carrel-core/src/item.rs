//! Item records: the note/task data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recurrence::Recurrence;

/// What kind of record this is. Only tasks participate in scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Note,
    Task,
}

/// Item metadata, persisted as the `meta.json` half of a record. The body
/// text lives in a sibling plain-text file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Opaque stable id, unique across the store, immutable once created.
    pub id: String,
    pub title: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every store write.
    pub updated_at: DateTime<Utc>,
    /// One-shot due date; used only when no recurrence rule is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
    /// Most recent moment this task was marked notified. Monotonically
    /// non-decreasing; advance only through [`Item::stamp_notified`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified: Option<DateTime<Utc>>,
    /// Original location, present only while the item sits in the trash
    /// container; cleared on restore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_path: Option<String>,
}

impl Item {
    pub fn new(title: &str, kind: ItemKind) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            kind,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            scheduled_time: None,
            recurrence: None,
            last_notified: None,
            original_path: None,
        }
    }

    pub fn note(title: &str) -> Self {
        Self::new(title, ItemKind::Note)
    }

    pub fn task(title: &str) -> Self {
        Self::new(title, ItemKind::Task)
    }

    /// The timestamp the next trigger is computed from.
    pub fn baseline(&self) -> DateTime<Utc> {
        self.last_notified.unwrap_or(self.created_at)
    }

    /// Advance `last_notified`, never moving it backward.
    pub fn stamp_notified(&mut self, now: DateTime<Utc>) {
        self.last_notified = Some(match self.last_notified {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }

    /// True when the manual notify-now operation may target this item.
    pub fn has_active_interval(&self) -> bool {
        self.kind == ItemKind::Task
            && self
                .recurrence
                .as_ref()
                .is_some_and(Recurrence::is_active_interval)
    }
}
