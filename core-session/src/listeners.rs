//! # Listener Registrar
//!
//! Binds native SDK events to store mutations exactly once per process.
//!
//! [`ListenerRegistrar::initialize`] spawns a single consumer task over the
//! event bus and hands back a [`ListenerGuard`]; calling it again while the
//! task is alive returns a clone of the same guard instead of wiring a
//! second consumer, so event handlers never run twice per event.
//! [`ListenerRegistrar::teardown`] stops the task and re-arms the
//! registrar for a fresh `initialize`.
//!
//! Event-driven mutations are last-writer-wins field updates; they never
//! check preconditions, because the native layer already observed the fact
//! being reported.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use core_runtime::events::{EventBus, RecvError, SleepEvent};
use core_runtime::normalize::camelize_keys;

use crate::report::AnalysisResult;
use crate::store::SessionStore;

/// Handle to the running event-consumer task. Cloneable; dropping guards
/// does not stop the task, only [`ListenerRegistrar::teardown`] does.
#[derive(Clone)]
pub struct ListenerGuard {
    task: Arc<JoinHandle<()>>,
}

impl ListenerGuard {
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

/// One-per-process wiring of the event bus into the store.
pub struct ListenerRegistrar {
    guard: Mutex<Option<ListenerGuard>>,
}

impl ListenerRegistrar {
    pub fn new() -> Self {
        Self {
            guard: Mutex::new(None),
        }
    }

    /// Start consuming events into `store`. Idempotent: while a consumer
    /// task is alive, returns a clone of its guard without spawning
    /// another.
    pub fn initialize(&self, store: Arc<SessionStore>, bus: &EventBus) -> ListenerGuard {
        let mut slot = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = slot.as_ref() {
            if existing.is_active() {
                debug!("event listeners already initialized, reusing");
                return existing.clone();
            }
        }

        let mut subscriber = bus.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match subscriber.recv().await {
                    Ok(event) => apply_event(&store, event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "event consumer lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        let guard = ListenerGuard {
            task: Arc::new(task),
        };
        *slot = Some(guard.clone());
        info!("event listeners initialized");
        guard
    }

    /// Stop the consumer task and clear the slot so a later `initialize`
    /// wires a fresh consumer.
    pub fn teardown(&self) {
        let mut slot = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(guard) = slot.take() {
            guard.task.abort();
            info!("event listeners torn down");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.guard
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(ListenerGuard::is_active)
            .unwrap_or(false)
    }
}

impl Default for ListenerRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply one native event to the store.
///
/// Handlers are unconditional field writes plus the rolling log line; the
/// upload handler additionally drives the auto-analysis policy.
pub(crate) fn apply_event(store: &Arc<SessionStore>, event: SleepEvent) {
    // Rolling log lines carry the native callback name.
    let name = event.name();
    match event {
        SleepEvent::UserJoined { user_id } => {
            store.add_log(format!("[{name}] {user_id}"));
            store.update(|s| s.user_id = Some(user_id));
        }
        SleepEvent::UserJoinFailed { error } => {
            store.add_log(format!("[{name}] {error}"));
            store.update(|s| s.error = Some(error));
        }
        SleepEvent::UserDeleted { user_id } => {
            store.add_log(format!("[{name}] {user_id}"));
            store.update(|s| s.user_id = None);
        }
        SleepEvent::TrackingCreated { session_id } => {
            store.add_log(format!("[{name}]"));
            store.update(|s| {
                s.is_tracking = true;
                s.did_close = false;
                if session_id.is_some() {
                    s.session_id = session_id;
                }
            });
        }
        SleepEvent::TrackingUploaded { sequence } => {
            store.add_log(format!("[{name}] sequence {sequence}"));
            maybe_trigger_analysis(store, sequence);
        }
        SleepEvent::TrackingClosed { session_id } => {
            store.add_log(format!("[{name}] {session_id}"));
            store.update(|s| {
                s.did_close = true;
                s.session_id = Some(session_id);
                s.is_tracking = false;
                s.is_analyzing = false;
                s.tracking_start_time = None;
            });
        }
        SleepEvent::TrackingFailed { error } => {
            store.add_log(format!("[{name}] {error}"));
            store.update(|s| {
                s.error = Some(error);
                s.is_tracking = false;
                s.is_analyzing = false;
                s.tracking_start_time = None;
            });
        }
        SleepEvent::TrackingInterrupted => {
            store.add_log(format!("[{name}]"));
            store.update(|s| s.is_tracking_paused = true);
        }
        SleepEvent::TrackingResumed => {
            store.add_log(format!("[{name}]"));
            store.update(|s| s.is_tracking_paused = false);
        }
        // Log-only: the store action that needed the microphone reports its
        // own, more specific error.
        SleepEvent::MicPermissionDenied => {
            store.add_log(format!("[{name}]"));
        }
        SleepEvent::SetupInProgress { progress } => {
            store.add_log(format!("[{name}] {progress}%"));
            store.update(|s| {
                s.is_setup_in_progress = true;
                s.is_setup_complete = false;
            });
        }
        SleepEvent::SetupDidComplete => {
            store.add_log(format!("[{name}]"));
            store.update(|s| {
                s.is_setup_in_progress = false;
                s.is_setup_complete = true;
            });
        }
        SleepEvent::SetupDidFail { error } => {
            store.add_log(format!("[{name}] {error}"));
            store.update(|s| {
                s.is_setup_in_progress = false;
                s.is_setup_complete = false;
                s.error = Some(error);
            });
        }
        SleepEvent::AnalysisResult { payload } => {
            store.add_log(format!("[{name}]"));
            apply_analysis_result(store, payload);
        }
        SleepEvent::DebugLog { message } => {
            store.add_log(format!("[{name}] {message}"));
        }
    }
}

fn apply_analysis_result(store: &SessionStore, payload: Value) {
    match serde_json::from_value::<AnalysisResult>(camelize_keys(payload)) {
        Ok(result) => store.update(|s| {
            s.analysis_result = Some(result);
            s.is_analyzing = false;
        }),
        Err(e) => store.update(|s| {
            s.error = Some(format!("Malformed analysis payload: {e}"));
            s.is_analyzing = false;
        }),
    }
}

/// Auto-analysis policy on upload progress.
///
/// With on-device analysis enabled every upload while tracking triggers a
/// pass. Without it, passes run on a sparse schedule: the first at sequence
/// 11 and every tenth upload after (21, 31, ...).
fn maybe_trigger_analysis(store: &Arc<SessionStore>, sequence: u32) {
    let (oda, tracking) = {
        let state = store.snapshot();
        (state.is_oda_enabled, state.is_tracking)
    };
    let should_run = if oda {
        tracking
    } else {
        tracking && sequence >= 10 && sequence % 10 == 1
    };
    if !should_run {
        return;
    }
    debug!(sequence, "triggering automatic analysis");
    let store = store.clone();
    // Detached on purpose: analysis outcome lands in state, failures only
    // in the error slot.
    tokio::spawn(async move {
        let _ = store.request_analysis().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::testing::{AnalysisScript, FakeBridge};
    use bridge_traits::SystemClock;
    use serde_json::json;
    use std::time::Duration;

    fn wired() -> (Arc<FakeBridge>, Arc<SessionStore>, ListenerRegistrar, EventBus) {
        let bridge = Arc::new(FakeBridge::android());
        let store = Arc::new(SessionStore::new(bridge.clone(), Arc::new(SystemClock)));
        (bridge, store, ListenerRegistrar::new(), EventBus::default())
    }

    async fn settle() {
        // Let the consumer task drain the bus.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let (_bridge, store, registrar, bus) = wired();
        registrar.initialize(store.clone(), &bus);
        registrar.initialize(store.clone(), &bus);
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(SleepEvent::UserJoined {
            user_id: "user-1".into(),
        })
        .unwrap();
        settle().await;
        // A duplicate consumer would not change the final value, so the
        // subscriber count above is the real assertion; this confirms the
        // single consumer works.
        assert_eq!(store.snapshot().user_id.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn teardown_then_initialize_rewires() {
        let (_bridge, store, registrar, bus) = wired();
        registrar.initialize(store.clone(), &bus);
        assert!(registrar.is_initialized());

        registrar.teardown();
        assert!(!registrar.is_initialized());

        registrar.initialize(store.clone(), &bus);
        bus.emit(SleepEvent::UserJoined {
            user_id: "user-2".into(),
        })
        .unwrap();
        settle().await;
        assert_eq!(store.snapshot().user_id.as_deref(), Some("user-2"));
    }

    #[tokio::test]
    async fn tracking_events_update_lifecycle_fields() {
        let (_bridge, store, registrar, bus) = wired();
        registrar.initialize(store.clone(), &bus);

        bus.emit(SleepEvent::TrackingCreated {
            session_id: Some("sess-1".into()),
        })
        .unwrap();
        settle().await;
        let state = store.snapshot();
        assert!(state.is_tracking);
        assert!(!state.did_close);
        assert_eq!(state.session_id.as_deref(), Some("sess-1"));

        bus.emit(SleepEvent::TrackingInterrupted).unwrap();
        settle().await;
        assert!(store.snapshot().is_tracking_paused);

        bus.emit(SleepEvent::TrackingResumed).unwrap();
        settle().await;
        assert!(!store.snapshot().is_tracking_paused);

        bus.emit(SleepEvent::TrackingClosed {
            session_id: "sess-1".into(),
        })
        .unwrap();
        settle().await;
        let state = store.snapshot();
        assert!(state.did_close);
        assert!(!state.is_tracking);
        assert!(state.tracking_start_time.is_none());
    }

    #[tokio::test]
    async fn native_close_mid_analysis_clears_analyzing() {
        let (_bridge, store, registrar, bus) = wired();
        registrar.initialize(store.clone(), &bus);
        store.update(|s| {
            s.is_tracking = true;
            s.is_analyzing = true;
        });

        bus.emit(SleepEvent::TrackingClosed {
            session_id: "sess-1".into(),
        })
        .unwrap();
        settle().await;
        let state = store.snapshot();
        assert!(!state.is_tracking);
        assert!(!state.is_analyzing);
    }

    #[tokio::test]
    async fn tracking_failure_resets_and_records_error() {
        let (_bridge, store, registrar, bus) = wired();
        registrar.initialize(store.clone(), &bus);
        store.update(|s| {
            s.is_tracking = true;
            s.is_analyzing = true;
        });

        bus.emit(SleepEvent::TrackingFailed {
            error: "audio pipeline died".into(),
        })
        .unwrap();
        settle().await;
        let state = store.snapshot();
        assert!(!state.is_tracking);
        assert!(!state.is_analyzing);
        assert_eq!(state.error.as_deref(), Some("audio pipeline died"));
    }

    #[tokio::test]
    async fn setup_events_drive_setup_flags() {
        let (_bridge, store, registrar, bus) = wired();
        registrar.initialize(store.clone(), &bus);

        bus.emit(SleepEvent::SetupInProgress { progress: 40 }).unwrap();
        settle().await;
        let state = store.snapshot();
        assert!(state.is_setup_in_progress);
        assert!(!state.is_setup_complete);
        assert!(state.log.as_deref().unwrap().contains("40%"));

        bus.emit(SleepEvent::SetupDidComplete).unwrap();
        settle().await;
        let state = store.snapshot();
        assert!(!state.is_setup_in_progress);
        assert!(state.is_setup_complete);

        // A failed re-setup must not leave the stale complete flag behind.
        bus.emit(SleepEvent::SetupDidFail {
            error: "model download failed".into(),
        })
        .unwrap();
        settle().await;
        let state = store.snapshot();
        assert!(!state.is_setup_in_progress);
        assert!(!state.is_setup_complete);
        assert_eq!(state.error.as_deref(), Some("model download failed"));
    }

    #[tokio::test]
    async fn mic_permission_denied_is_log_only() {
        let (_bridge, store, registrar, bus) = wired();
        registrar.initialize(store.clone(), &bus);
        store.update(|s| s.error = Some("audio device busy".into()));

        bus.emit(SleepEvent::MicPermissionDenied).unwrap();
        settle().await;
        let state = store.snapshot();
        assert_eq!(state.error.as_deref(), Some("audio device busy"));
        assert!(state.log.unwrap().contains("onMicPermissionDenied"));
    }

    #[tokio::test]
    async fn analysis_result_event_lands_in_state() {
        let (_bridge, store, registrar, bus) = wired();
        registrar.initialize(store.clone(), &bus);
        store.update(|s| s.is_analyzing = true);

        bus.emit(SleepEvent::AnalysisResult {
            payload: json!({ "id": "sess-1", "sleep_stages": [2, 2, 1] }),
        })
        .unwrap();
        settle().await;
        let state = store.snapshot();
        assert!(!state.is_analyzing);
        let result = state.analysis_result.unwrap();
        assert_eq!(result.id.as_deref(), Some("sess-1"));
        assert_eq!(result.sleep_stages, Some(vec![2, 2, 1]));
    }

    #[tokio::test]
    async fn oda_upload_triggers_analysis_from_sequence_one() {
        let (bridge, store, registrar, bus) = wired();
        bridge.set_analysis(AnalysisScript::Completed(json!({ "id": "sess-1" })));
        store.update(|s| {
            s.is_oda_enabled = true;
            s.is_tracking = true;
        });
        registrar.initialize(store.clone(), &bus);

        bus.emit(SleepEvent::TrackingUploaded { sequence: 1 }).unwrap();
        settle().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bridge.call_count("request_analysis"), 1);
    }

    #[tokio::test]
    async fn non_oda_upload_triggers_on_sparse_schedule() {
        let (bridge, store, registrar, bus) = wired();
        bridge.set_analysis(AnalysisScript::Completed(json!({ "id": "sess-1" })));
        store.update(|s| s.is_tracking = true);
        registrar.initialize(store.clone(), &bus);

        for sequence in [1, 9, 10, 12, 20] {
            bus.emit(SleepEvent::TrackingUploaded { sequence }).unwrap();
        }
        settle().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bridge.call_count("request_analysis"), 0);

        for sequence in [11, 21] {
            bus.emit(SleepEvent::TrackingUploaded { sequence }).unwrap();
        }
        settle().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bridge.call_count("request_analysis"), 2);
    }

    #[tokio::test]
    async fn upload_while_not_tracking_never_triggers() {
        let (bridge, store, registrar, bus) = wired();
        store.update(|s| s.is_oda_enabled = true);
        registrar.initialize(store.clone(), &bus);

        bus.emit(SleepEvent::TrackingUploaded { sequence: 11 }).unwrap();
        settle().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bridge.call_count("request_analysis"), 0);
    }

    #[tokio::test]
    async fn debug_log_event_fills_rolling_slot() {
        let (_bridge, store, registrar, bus) = wired();
        registrar.initialize(store.clone(), &bus);

        bus.emit(SleepEvent::DebugLog {
            message: "native: first".into(),
        })
        .unwrap();
        bus.emit(SleepEvent::DebugLog {
            message: "native: second".into(),
        })
        .unwrap();
        settle().await;
        // Rolling slot: only the newest line survives.
        let log = store.snapshot().log.unwrap();
        assert!(log.contains("native: second"));
        assert!(!log.contains("first"));
    }

    #[tokio::test]
    async fn user_events_manage_identity() {
        let (_bridge, store, registrar, bus) = wired();
        registrar.initialize(store.clone(), &bus);

        bus.emit(SleepEvent::UserJoined {
            user_id: "user-1".into(),
        })
        .unwrap();
        settle().await;
        assert_eq!(store.snapshot().user_id.as_deref(), Some("user-1"));

        bus.emit(SleepEvent::UserDeleted {
            user_id: "user-1".into(),
        })
        .unwrap();
        settle().await;
        assert!(store.snapshot().user_id.is_none());

        bus.emit(SleepEvent::UserJoinFailed {
            error: "expired key".into(),
        })
        .unwrap();
        settle().await;
        assert_eq!(store.snapshot().error.as_deref(), Some("expired key"));
    }
}
