//! Update scheduler
//!
//! One task per mounted container. Commits arrive as owned snapshots over an
//! unbounded channel; the task coalesces them with [`DebounceMachine`] and
//! awaits the adapter once per window. Because every container has its own
//! task, dispatches for one container never overlap, while different
//! containers proceed independently.

mod machine;

pub use machine::{CommitOutcome, DebounceMachine, SchedulerConfig, SchedulerPhase};

use crate::adapter::Adapter;
use crate::events::{ListenerRegistry, RenderEvent};
use crate::snapshot::ContainerSnapshot;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, trace};

enum Command {
    Commit(ContainerSnapshot),
    Shutdown,
}

/// Cheap handle for feeding one container's scheduler
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    key: Arc<str>,
    tx: mpsc::UnboundedSender<Command>,
    phase: watch::Receiver<SchedulerPhase>,
}

impl SchedulerHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Hand a commit to the task; false if the task has stopped
    pub fn schedule(&self, snapshot: ContainerSnapshot) -> bool {
        self.tx.send(Command::Commit(snapshot)).is_ok()
    }

    pub fn phase(&self) -> SchedulerPhase {
        *self.phase.borrow()
    }

    /// Resolve once the scheduler reports `phase`
    pub async fn wait_for_phase(&self, phase: SchedulerPhase) -> bool {
        let mut rx = self.phase.clone();
        // The borrowed `Ref` has to drop before `rx` does
        let reached = rx.wait_for(|current| *current == phase).await.is_ok();
        reached
    }

    /// Ask the task to stop; an undispatched snapshot is dropped
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

/// The per-container task
pub struct UpdateScheduler {
    key: Arc<str>,
    machine: DebounceMachine,
    adapter: Arc<dyn Adapter>,
    listeners: Arc<ListenerRegistry>,
    rx: mpsc::UnboundedReceiver<Command>,
    phase_tx: watch::Sender<SchedulerPhase>,
}

impl UpdateScheduler {
    /// Start the task for `key` on the current runtime
    pub fn spawn(
        key: &str,
        config: SchedulerConfig,
        adapter: Arc<dyn Adapter>,
        listeners: Arc<ListenerRegistry>,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let key: Arc<str> = Arc::from(key);
        let (tx, rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(SchedulerPhase::Idle);

        let scheduler = Self {
            key: key.clone(),
            machine: DebounceMachine::new(config),
            adapter,
            listeners,
            rx,
            phase_tx,
        };
        let task = tokio::spawn(scheduler.run());

        let handle = SchedulerHandle {
            key,
            tx,
            phase: phase_rx,
        };
        (handle, task)
    }

    async fn run(mut self) {
        debug!(container = %self.key, adapter = self.adapter.name(), "scheduler started");

        loop {
            let deadline = self.machine.deadline();
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(Command::Commit(snapshot)) => self.commit(snapshot),
                    Some(Command::Shutdown) | None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if !self.dispatch().await {
                        break;
                    }
                }
            }
        }

        if let Some(pending) = self.machine.take_pending() {
            debug!(
                container = %self.key,
                taken_at = %pending.taken_at,
                "scheduler stopped with an undispatched snapshot, dropping it"
            );
        }
        self.publish_phase();
        debug!(container = %self.key, "scheduler stopped");
    }

    fn commit(&mut self, snapshot: ContainerSnapshot) {
        let outcome = self.machine.on_commit(snapshot, Instant::now());
        trace!(container = %self.key, ?outcome, "commit received");
        self.publish_phase();
    }

    /// Run one adapter call; false if a shutdown arrived meanwhile
    async fn dispatch(&mut self) -> bool {
        let Some(snapshot) = self.machine.begin_dispatch(Instant::now()) else {
            return true;
        };
        self.publish_phase();
        snapshot.update_flag.take();

        let result = self.adapter.adapt(&snapshot, true).await;

        // Commits that queued up while the adapter was busy
        let mut keep_running = true;
        loop {
            match self.rx.try_recv() {
                Ok(Command::Commit(next)) => self.commit(next),
                Ok(Command::Shutdown) => {
                    keep_running = false;
                    break;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    keep_running = false;
                    break;
                }
            }
        }

        match result {
            Ok(_) => debug!(container = %self.key, "container dispatched"),
            Err(e) => {
                error!(container = %self.key, "dispatch failed: {:#}", e);
                self.listeners
                    .emit(RenderEvent::dispatch_failed(self.key.as_ref(), &e));
            }
        }

        let phase = self.machine.finish_dispatch(Instant::now());
        self.publish_phase();
        if phase == SchedulerPhase::Idle {
            self.listeners.emit(RenderEvent::update(snapshot));
        }
        keep_running
    }

    fn publish_phase(&self) {
        let phase = self.machine.phase();
        self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            *current = phase;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::testing::RecordingAdapter;
    use crate::tree::ComponentJson;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    fn snapshot(label: &str, suspended: bool) -> ContainerSnapshot {
        let children: Vec<ComponentJson> = serde_json::from_value(serde_json::json!([
            { "id": "s", "type": "suspendable", "props": { "shouldSuspend": suspended } },
            { "id": "t", "type": "text", "props": { "value": label } }
        ]))
        .unwrap();
        ContainerSnapshot::from_parts("chat", children).unwrap()
    }

    fn label(snapshot: &ContainerSnapshot) -> String {
        snapshot
            .find("t")
            .and_then(|t| t.props.get("value"))
            .and_then(|v| v.as_str())
            .unwrap()
            .to_string()
    }

    fn start(adapter: Arc<RecordingAdapter>) -> (SchedulerHandle, Arc<ListenerRegistry>) {
        let listeners = Arc::new(ListenerRegistry::new());
        let (handle, _task) = UpdateScheduler::spawn(
            "chat",
            SchedulerConfig::production(),
            adapter,
            listeners.clone(),
        );
        (handle, listeners)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_dispatch() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (handle, _) = start(adapter.clone());

        for label in ["one", "two", "three"] {
            assert!(handle.schedule(snapshot(label, false)));
            sleep(Duration::from_millis(30)).await;
        }
        sleep(Duration::from_millis(500)).await;

        let calls = adapter.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(label(&calls[0].snapshot), "three");
        assert!(calls[0].is_update);
        assert_eq!(handle.phase(), SchedulerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_happens_after_quiet_period() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (handle, _) = start(adapter.clone());
        let started = Instant::now();

        handle.schedule(snapshot("only", false));
        sleep(Duration::from_millis(50)).await;
        assert_eq!(adapter.call_count(), 0);
        assert_eq!(handle.phase(), SchedulerPhase::Debouncing);

        sleep(Duration::from_millis(100)).await;
        let calls = adapter.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].at - started, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspended_container_is_never_dispatched() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (handle, _) = start(adapter.clone());

        for _ in 0..5 {
            handle.schedule(snapshot("hidden", true));
            sleep(Duration::from_millis(40)).await;
        }
        sleep(Duration::from_secs(5)).await;

        assert_eq!(adapter.call_count(), 0);
        assert_eq!(handle.phase(), SchedulerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_churn_is_flushed_at_max_wait() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (handle, _) = start(adapter.clone());
        let started = Instant::now();

        // Commit every 50ms for three seconds; the quiet period never elapses
        for i in 0..60 {
            handle.schedule(snapshot(&format!("tick-{i}"), false));
            sleep(Duration::from_millis(50)).await;
        }
        sleep(Duration::from_millis(500)).await;

        let calls = adapter.calls();
        assert!(calls.len() >= 2, "expected a forced flush plus a trailing one");
        assert!(calls[0].at - started <= Duration::from_millis(2000));
        assert_eq!(label(&calls.last().unwrap().snapshot), "tick-59");
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_during_dispatch_gets_its_own_window() {
        let adapter = Arc::new(RecordingAdapter::slow(Duration::from_millis(300)));
        let (handle, _) = start(adapter.clone());

        handle.schedule(snapshot("first", false));
        sleep(Duration::from_millis(150)).await;
        assert_eq!(handle.phase(), SchedulerPhase::Dispatching);

        handle.schedule(snapshot("second", false));
        sleep(Duration::from_millis(50)).await;
        assert_eq!(adapter.call_count(), 1);

        sleep(Duration::from_secs(1)).await;
        let calls = adapter.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(label(&calls[1].snapshot), "second");
        // Second window opens only after the first call returned (t=400)
        assert!(calls[1].at - calls[0].at >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_during_dispatch_drops_follow_up() {
        let adapter = Arc::new(RecordingAdapter::slow(Duration::from_millis(300)));
        let (handle, _) = start(adapter.clone());

        handle.schedule(snapshot("first", false));
        sleep(Duration::from_millis(150)).await;
        handle.schedule(snapshot("second", false));
        handle.schedule(snapshot("paused", true));
        sleep(Duration::from_secs(2)).await;

        assert_eq!(adapter.call_count(), 1);
        assert_eq!(handle.phase(), SchedulerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_emits_event_and_returns_to_idle() {
        let adapter = Arc::new(RecordingAdapter::default());
        adapter.fail.store(true, Ordering::SeqCst);
        let (handle, listeners) = start(adapter.clone());

        let failures = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(AtomicUsize::new(0));
        let (f, u) = (failures.clone(), updates.clone());
        listeners.on("chat", move |event| match event {
            RenderEvent::DispatchFailed { .. } => {
                f.fetch_add(1, Ordering::SeqCst);
            }
            RenderEvent::Update { .. } => {
                u.fetch_add(1, Ordering::SeqCst);
            }
            RenderEvent::Mounted { .. } => {}
        });
        let waiter = listeners.wait("chat");

        handle.schedule(snapshot("doomed", false));
        sleep(Duration::from_millis(200)).await;

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert!(waiter.await.unwrap().is_err());
        assert_eq!(handle.phase(), SchedulerPhase::Idle);

        // Still alive for the next window
        adapter.fail.store(false, Ordering::SeqCst);
        handle.schedule(snapshot("retry", false));
        sleep(Duration::from_millis(200)).await;
        assert_eq!(adapter.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_clears_update_flag() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (handle, _) = start(adapter.clone());

        let snap = snapshot("flagged", false);
        snap.update_flag.mark();
        let flag = snap.update_flag.clone();
        handle.schedule(snap);
        assert!(flag.is_set());

        sleep(Duration::from_millis(200)).await;
        assert!(!flag.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_pending_snapshot() {
        let adapter = Arc::new(RecordingAdapter::default());
        let listeners = Arc::new(ListenerRegistry::new());
        let (handle, task) = UpdateScheduler::spawn(
            "chat",
            SchedulerConfig::production(),
            adapter.clone(),
            listeners,
        );

        handle.schedule(snapshot("never", false));
        sleep(Duration::from_millis(10)).await;
        handle.shutdown();
        task.await.unwrap();

        sleep(Duration::from_secs(1)).await;
        assert_eq!(adapter.call_count(), 0);
        assert!(!handle.schedule(snapshot("late", false)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_phase() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (handle, _) = start(adapter.clone());

        handle.schedule(snapshot("x", false));
        assert!(handle.wait_for_phase(SchedulerPhase::Debouncing).await);
        assert!(handle.wait_for_phase(SchedulerPhase::Idle).await);
        assert_eq!(adapter.call_count(), 1);
    }
}
