//! The running scheduler: an explicit tick loop around the engine.
//!
//! One spawned tokio task drives [`SchedulerEngine::tick`]; the next timer
//! is armed only after the current tick settles, so re-entrancy is
//! impossible by construction. Cancellation goes through a watch-channel
//! stop token; an in-flight tick always completes (writes are never
//! aborted midway). A hidden-to-visible transition kicks one out-of-band
//! tick through a `Notify`.

use std::sync::Arc;

use carrel_core::{Result, SchedulerConfig};
use carrel_store::RecordStore;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;

use crate::engine::SchedulerEngine;
use crate::notify::{BaselineReset, PendingNotification, VisibilityChange};

/// Handle to the scheduler: constructs the engine, owns the loop task.
/// Explicitly instantiated with its store so tests run isolated instances.
pub struct Scheduler {
    engine: Arc<Mutex<SchedulerEngine>>,
    kick: Arc<Notify>,
    loop_ctl: Option<LoopCtl>,
}

struct LoopCtl {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    pub fn new(store: Arc<RecordStore>, config: SchedulerConfig) -> Self {
        Self {
            engine: Arc::new(Mutex::new(SchedulerEngine::new(store, config))),
            kick: Arc::new(Notify::new()),
            loop_ctl: None,
        }
    }

    /// Transition to Running: reset interval baselines, then spawn the
    /// tick loop. Calling start on a running scheduler only re-runs the
    /// baseline reset.
    pub async fn start(&mut self) -> BaselineReset {
        if self.loop_ctl.is_some() {
            tracing::debug!("start() while already running, resetting baselines only");
            return self.engine.lock().await.reset_interval_baselines();
        }
        let reset = self.engine.lock().await.on_start();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(self.engine.clone(), self.kick.clone(), stop_rx));
        self.loop_ctl = Some(LoopCtl {
            stop: stop_tx,
            handle,
        });
        reset
    }

    /// Cancel the pending timer and transition to Stopped. An in-flight
    /// tick is allowed to complete first.
    pub async fn stop(&mut self) {
        if let Some(ctl) = self.loop_ctl.take() {
            ctl.stop.send(true).ok();
            ctl.handle.await.ok();
        }
        self.engine.lock().await.on_stop();
        tracing::info!("⏹️ Scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.engine.lock().await.is_running()
    }

    pub async fn pending_notifications(&self) -> Vec<PendingNotification> {
        self.engine.lock().await.pending_notifications()
    }

    pub async fn acknowledge(&self, id: &str) -> Result<()> {
        self.engine.lock().await.acknowledge(id)
    }

    pub async fn notify_task(&self, id: &str) -> Result<PendingNotification> {
        self.engine.lock().await.notify_task(id)
    }

    pub async fn next_trigger_time(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        self.engine.lock().await.next_trigger_time(id)
    }

    pub async fn reset_interval_baselines(&self) -> BaselineReset {
        self.engine.lock().await.reset_interval_baselines()
    }

    pub async fn set_visibility(&self, visible: bool) -> VisibilityChange {
        let change = self.engine.lock().await.set_visibility(visible);
        if change.immediate_tick {
            self.kick.notify_one();
        }
        change
    }
}

async fn run_loop(
    engine: Arc<Mutex<SchedulerEngine>>,
    kick: Arc<Notify>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        let interval = engine.lock().await.check_interval();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = kick.notified() => {
                tracing::debug!("out-of-band tick requested");
            }
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
                continue;
            }
        }
        // The next timer is armed only after this tick settles: at most
        // one tick in flight, ever.
        let fired = {
            let mut engine = engine.lock().await;
            engine.tick()
        };
        for n in &fired {
            tracing::info!("📣 Pending: '{}' ({})", n.title, n.id);
        }
    }
}
