//! Scheduler engine: the due-check state machine behind the tick loop.
//!
//! The engine is synchronous and single-owner; the async loop in
//! [`crate::service`] drives it behind an `Arc<Mutex<_>>`. Each tick
//! rescans the store, drops stale queue entries, resolves every live task
//! and enqueues the due ones. `last_notified` is persisted through the
//! record store before an entry is enqueued, so a crash-and-rescan can
//! never re-fire the same cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use carrel_core::{CarrelError, Recurrence, Result, SchedulerConfig};
use carrel_store::{Record, RecordStore};
use chrono::{DateTime, Utc};

use crate::notify::{BaselineReset, PendingNotification, ResetEntry, VisibilityChange};
use crate::resolve;

/// The due-check engine. All mutation happens on one logical thread; the
/// pending queue is exposed only through the operations below, never by
/// reference.
pub struct SchedulerEngine {
    store: Arc<RecordStore>,
    config: SchedulerConfig,
    /// At most one entry per item id.
    pending: HashMap<String, PendingNotification>,
    visible: bool,
    running: bool,
    /// Ticks before this instant evaluate nothing (post-start grace).
    grace_until: Option<DateTime<Utc>>,
}

impl SchedulerEngine {
    pub fn new(store: Arc<RecordStore>, config: SchedulerConfig) -> Self {
        Self {
            store,
            config,
            pending: HashMap::new(),
            visible: true,
            running: false,
            grace_until: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Current tick interval (foreground or background).
    pub fn check_interval(&self) -> Duration {
        let secs = if self.visible {
            self.config.foreground_check_secs
        } else {
            self.config.background_check_secs
        };
        Duration::from_secs(secs)
    }

    /// Transition to Running: restart every enabled interval task's
    /// countdown and open the startup grace window.
    pub fn on_start(&mut self) -> BaselineReset {
        let now = Utc::now();
        self.running = true;
        self.grace_until = Some(now + chrono::Duration::seconds(self.config.startup_grace_secs as i64));
        let reset = self.reset_interval_baselines();
        tracing::info!(
            "⏰ Scheduler running ({} interval baselines reset, check every {:?})",
            reset.reset_count,
            self.check_interval()
        );
        reset
    }

    pub fn on_stop(&mut self) {
        self.running = false;
    }

    /// One due-check cycle. Returns the newly enqueued notifications.
    ///
    /// Errors local to a single item are logged and skipped; a failed
    /// `last_notified` write defers that task to the next tick instead of
    /// enqueuing it (at-least-once, never duplicated).
    pub fn tick(&mut self) -> Vec<PendingNotification> {
        if !self.running {
            return Vec::new();
        }
        let now = Utc::now();
        if self.grace_until.is_some_and(|g| now < g) {
            tracing::debug!("tick inside startup grace window, skipping");
            return Vec::new();
        }

        let tree = match self.store.scan() {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!("⚠️ store scan failed, deferring tick: {e}");
                return Vec::new();
            }
        };
        let records: Vec<Record> = tree.flatten().into_iter().cloned().collect();

        // Stale-entry cleanup: pending items that vanished or were trashed.
        self.pending.retain(|id, _| {
            records
                .iter()
                .any(|r| r.item.id == *id && r.is_schedulable())
        });

        let mut fired = Vec::new();
        for record in records.iter().filter(|r| r.is_schedulable()) {
            if self.pending.contains_key(&record.item.id) {
                continue;
            }
            let Some(trigger) = resolve::next_trigger_utc(&record.item, now) else {
                continue;
            };
            if !resolve::is_due(&trigger, record.item.last_notified.as_ref(), &now) {
                continue;
            }

            // Persist the stamp before enqueuing; on failure the task is
            // simply retried next tick.
            let mut item = record.item.clone();
            item.stamp_notified(now);
            if let Err(e) = self.store.write_meta(&record.path, &item) {
                tracing::warn!(
                    "⚠️ could not persist last_notified for '{}', deferring: {e}",
                    item.title
                );
                continue;
            }

            tracing::info!("🔔 Task due: '{}' ({})", item.title, item.id);
            let notification = PendingNotification {
                id: item.id.clone(),
                title: item.title.clone(),
                path: record.path.clone(),
                trigger_at: trigger,
                enqueued_at: now,
            };
            self.pending.insert(item.id, notification.clone());
            fired.push(notification);
        }
        fired
    }

    /// Snapshot of the pending queue, oldest first.
    pub fn pending_notifications(&self) -> Vec<PendingNotification> {
        let mut list: Vec<_> = self.pending.values().cloned().collect();
        list.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at).then(a.id.cmp(&b.id)));
        list
    }

    /// Remove a pending notification. For interval tasks whose next cycle
    /// is already overdue at acknowledgment time, the baseline advances to
    /// now as well; otherwise the dismissed notification would re-fire on
    /// the very next tick.
    pub fn acknowledge(&mut self, id: &str) -> Result<()> {
        if self.pending.remove(id).is_none() {
            return Err(CarrelError::NotFound(id.to_string()));
        }
        match self.store.find(id) {
            Ok(record) => {
                if let Some(Recurrence::Interval { minutes, enabled: true }) =
                    &record.item.recurrence
                {
                    let now = Utc::now();
                    let next = record.item.baseline() + chrono::Duration::minutes(i64::from(*minutes));
                    if now >= next {
                        let mut item = record.item;
                        item.stamp_notified(now);
                        if let Err(e) = self.store.write_meta(&record.path, &item) {
                            tracing::warn!("⚠️ could not advance baseline on acknowledge: {e}");
                        }
                    }
                }
            }
            // The record may have been trashed since it fired; the queue
            // entry is gone either way.
            Err(e) => tracing::debug!("acknowledged '{id}' but record lookup failed: {e}"),
        }
        Ok(())
    }

    /// Manual, front-end-driven trigger for an enabled interval task (a
    /// presentation-layer countdown reached zero before the next backend
    /// tick). No-op while already pending.
    pub fn notify_task(&mut self, id: &str) -> Result<PendingNotification> {
        let record = self.store.find(id)?;
        if record.in_trash {
            // Trashed items are invisible to scheduling, manual or not.
            return Err(CarrelError::NotFound(id.to_string()));
        }
        if !record.item.has_active_interval() {
            return Err(CarrelError::NotIntervalTask(id.to_string()));
        }
        if let Some(existing) = self.pending.get(id) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let mut item = record.item.clone();
        item.stamp_notified(now);
        self.store.write_meta(&record.path, &item)?;

        tracing::info!("🔔 Manual notify: '{}' ({})", item.title, item.id);
        let notification = PendingNotification {
            id: item.id.clone(),
            title: item.title.clone(),
            path: record.path.clone(),
            trigger_at: now,
            enqueued_at: now,
        };
        self.pending.insert(item.id, notification.clone());
        Ok(notification)
    }

    /// Switch between foreground and background tick intervals. The caller
    /// owes the loop an immediate tick on a hidden-to-visible transition.
    pub fn set_visibility(&mut self, visible: bool) -> VisibilityChange {
        let became_visible = visible && !self.visible;
        self.visible = visible;
        VisibilityChange {
            check_interval_secs: self.check_interval().as_secs(),
            immediate_tick: became_visible,
        }
    }

    /// Restart the countdown of every enabled interval task: stamp its
    /// baseline to now and drop any pending entry for it.
    pub fn reset_interval_baselines(&mut self) -> BaselineReset {
        let now = Utc::now();
        let mut reset = BaselineReset::default();
        let records: Vec<Record> = match self.store.scan() {
            Ok(tree) => tree.flatten().into_iter().cloned().collect(),
            Err(e) => {
                tracing::warn!("⚠️ scan failed during baseline reset: {e}");
                return reset;
            }
        };
        for record in records {
            if !record.is_schedulable() || !record.item.has_active_interval() {
                continue;
            }
            self.pending.remove(&record.item.id);
            let mut item = record.item;
            item.stamp_notified(now);
            match self.store.write_meta(&record.path, &item) {
                Ok(updated) => {
                    reset.reset_count += 1;
                    reset.tasks.push(ResetEntry {
                        id: updated.id,
                        // stamp_notified always sets the field
                        last_notified: updated.last_notified.unwrap_or(now),
                    });
                }
                Err(e) => {
                    tracing::warn!("⚠️ baseline reset skipped for '{}': {e}", item.title)
                }
            }
        }
        reset
    }

    /// Next trigger for one item, or None if nothing is scheduled.
    pub fn next_trigger_time(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        let record = self.store.find(id)?;
        Ok(resolve::next_trigger_utc(&record.item, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carrel_core::{Item, StoreConfig};
    use std::path::{Path, PathBuf};

    fn test_env(name: &str) -> (PathBuf, Arc<RecordStore>, SchedulerEngine) {
        test_env_with(
            name,
            SchedulerConfig {
                foreground_check_secs: 1,
                background_check_secs: 60,
                startup_grace_secs: 0,
            },
        )
    }

    fn test_env_with(
        name: &str,
        config: SchedulerConfig,
    ) -> (PathBuf, Arc<RecordStore>, SchedulerEngine) {
        let dir = std::env::temp_dir().join(format!("carrel-test-engine-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        let store = Arc::new(RecordStore::new(&dir, StoreConfig::default()).unwrap());
        let engine = SchedulerEngine::new(store.clone(), config);
        (dir, store, engine)
    }

    fn interval_task(store: &RecordStore, title: &str, minutes: u32) -> Record {
        let mut item = Item::task(title);
        item.recurrence = Some(Recurrence::Interval {
            minutes,
            enabled: true,
        });
        store.create(Path::new("tasks"), item, "").unwrap()
    }

    /// Rewind a task's baseline so its next interval trigger is overdue.
    fn backdate(store: &RecordStore, record: &Record, minutes_ago: i64) {
        let mut item = store.read(&record.path).unwrap().item;
        item.last_notified = Some(Utc::now() - chrono::Duration::minutes(minutes_ago));
        store.write_meta(&record.path, &item).unwrap();
    }

    #[test]
    fn test_tick_enqueues_due_task_exactly_once() {
        let (dir, store, mut engine) = test_env("once");
        engine.on_start();
        let task = interval_task(&store, "stand up", 5);
        backdate(&store, &task, 10);

        let fired = engine.tick();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, task.item.id);
        let stamped = store.read(&task.path).unwrap().item.last_notified.unwrap();

        // Re-running the tick neither enqueues again nor advances the stamp.
        assert!(engine.tick().is_empty());
        assert!(engine.tick().is_empty());
        assert_eq!(engine.pending_notifications().len(), 1);
        assert_eq!(
            store.read(&task.path).unwrap().item.last_notified.unwrap(),
            stamped
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_grace_window_suppresses_triggers() {
        let (dir, store, mut engine) = test_env_with(
            "grace",
            SchedulerConfig {
                foreground_check_secs: 1,
                background_check_secs: 60,
                startup_grace_secs: 3600,
            },
        );
        engine.on_start();
        let task = interval_task(&store, "burst", 1);
        backdate(&store, &task, 30);
        assert!(engine.tick().is_empty());
        assert!(engine.pending_notifications().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_tick_is_noop_while_stopped() {
        let (dir, store, mut engine) = test_env("stopped");
        let task = interval_task(&store, "idle", 1);
        backdate(&store, &task, 30);
        assert!(engine.tick().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_trashed_item_drops_from_queue_and_scheduling() {
        let (dir, store, mut engine) = test_env("trash");
        engine.on_start();
        let task = interval_task(&store, "doomed", 5);
        backdate(&store, &task, 10);
        assert_eq!(engine.tick().len(), 1);

        store.trash(&task.path).unwrap();
        assert!(engine.tick().is_empty());
        assert!(engine.pending_notifications().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_acknowledge_unknown_is_not_found() {
        let (dir, _store, mut engine) = test_env("ack-unknown");
        engine.on_start();
        assert!(matches!(
            engine.acknowledge("no-such-id").unwrap_err(),
            CarrelError::NotFound(_)
        ));
        assert!(engine.pending_notifications().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_acknowledge_removes_pending_and_second_ack_is_not_found() {
        let (dir, store, mut engine) = test_env("ack");
        engine.on_start();
        let task = interval_task(&store, "ping", 5);
        backdate(&store, &task, 10);
        engine.tick();

        engine.acknowledge(&task.item.id).unwrap();
        assert!(engine.pending_notifications().is_empty());
        // Second acknowledge of the same id: typed NotFound, no mutation.
        assert!(matches!(
            engine.acknowledge(&task.item.id).unwrap_err(),
            CarrelError::NotFound(_)
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_acknowledge_advances_overdue_interval_baseline() {
        let (dir, store, mut engine) = test_env("ack-overdue");
        engine.on_start();
        let task = interval_task(&store, "nag", 5);
        backdate(&store, &task, 10);
        engine.tick();

        // The user sat on the notification long enough that the next cycle
        // is due too; acknowledging must not let it re-fire immediately.
        backdate(&store, &task, 10);
        let before_ack = Utc::now();
        engine.acknowledge(&task.item.id).unwrap();
        let stamped = store.read(&task.path).unwrap().item.last_notified.unwrap();
        assert!(stamped >= before_ack);
        assert!(engine.tick().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_notify_task_rules() {
        let (dir, store, mut engine) = test_env("manual");
        engine.on_start();
        let task = interval_task(&store, "pomodoro", 25);
        let note = store.create(Path::new(""), Item::note("memo"), "").unwrap();

        let n = engine.notify_task(&task.item.id).unwrap();
        assert_eq!(n.id, task.item.id);
        assert!(store.read(&task.path).unwrap().item.last_notified.is_some());
        // No-op while already pending.
        engine.notify_task(&task.item.id).unwrap();
        assert_eq!(engine.pending_notifications().len(), 1);

        assert!(matches!(
            engine.notify_task(&note.item.id).unwrap_err(),
            CarrelError::NotIntervalTask(_)
        ));
        assert!(matches!(
            engine.notify_task("ghost").unwrap_err(),
            CarrelError::NotFound(_)
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_notify_task_rejects_trashed_task() {
        let (dir, store, mut engine) = test_env("manual-trashed");
        engine.on_start();
        let task = interval_task(&store, "shredded", 5);
        store.trash(&task.path).unwrap();

        // A trashed interval task must not be manually triggerable: no
        // queue entry, no last_notified stamp.
        assert!(matches!(
            engine.notify_task(&task.item.id).unwrap_err(),
            CarrelError::NotFound(_)
        ));
        assert!(engine.pending_notifications().is_empty());
        assert!(
            store
                .find(&task.item.id)
                .unwrap()
                .item
                .last_notified
                .is_none()
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_visibility_switches_check_interval() {
        let (dir, _store, mut engine) = test_env("visibility");
        let hidden = engine.set_visibility(false);
        let visible = engine.set_visibility(true);
        assert!(hidden.check_interval_secs > visible.check_interval_secs);
        assert!(visible.immediate_tick);
        // Repeating the same state is not a transition.
        assert!(!engine.set_visibility(true).immediate_tick);
        assert!(!engine.set_visibility(false).immediate_tick);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_reset_interval_baselines() {
        let (dir, store, mut engine) = test_env("reset");
        engine.on_start();
        let a = interval_task(&store, "a", 30);
        let b = interval_task(&store, "b", 45);
        let mut daily = Item::task("daily");
        daily.recurrence = Some(Recurrence::Daily {
            time: "09:00".parse().unwrap(),
            enabled: true,
        });
        store.create(Path::new("tasks"), daily, "").unwrap();
        engine.notify_task(&a.item.id).unwrap();

        let before = Utc::now();
        let reset = engine.reset_interval_baselines();
        assert_eq!(reset.reset_count, 2);
        assert!(reset.tasks.iter().all(|t| t.last_notified >= before));
        // Pending entries for interval tasks are purged.
        assert!(engine.pending_notifications().is_empty());

        // Restart-safe countdown: next trigger lands within (now, now + M].
        let next = engine.next_trigger_time(&b.item.id).unwrap().unwrap();
        let now = Utc::now();
        assert!(next > now);
        assert!(next <= now + chrono::Duration::minutes(45));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_one_shot_task_fires_once() {
        let (dir, store, mut engine) = test_env("one-shot");
        engine.on_start();
        let mut item = Item::task("dentist");
        item.scheduled_time = Some(Utc::now() - chrono::Duration::minutes(1));
        let record = store.create(Path::new(""), item, "").unwrap();

        let fired = engine.tick();
        assert_eq!(fired.len(), 1);
        engine.acknowledge(&record.item.id).unwrap();
        assert!(engine.tick().is_empty());
        assert!(engine.pending_notifications().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_next_trigger_time() {
        let (dir, store, engine) = test_env("next-trigger");
        let note = store.create(Path::new(""), Item::note("plain"), "").unwrap();
        assert!(engine.next_trigger_time(&note.item.id).unwrap().is_none());
        assert!(matches!(
            engine.next_trigger_time("missing").unwrap_err(),
            CarrelError::NotFound(_)
        ));
        std::fs::remove_dir_all(&dir).ok();
    }
}
