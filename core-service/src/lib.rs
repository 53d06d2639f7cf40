//! Sleep service façade.
//!
//! This crate wires a host-provided native bridge into the shared core:
//! it owns the event bus, the session store, and the listener registrar,
//! and exposes one handle with everything application code needs.
//!
//! The native adapter publishes its callbacks into
//! [`SleepService::event_bus`]; application code calls the action methods
//! and observes [`SleepService::state`] (or subscribes to raw events via
//! [`SleepService::events`]).
//!
//! ```no_run
//! # async fn example(bridge: std::sync::Arc<dyn bridge_traits::SleepBridge>) -> Result<(), Box<dyn std::error::Error>> {
//! use core_runtime::config::CoreConfig;
//! use core_service::SleepService;
//!
//! let config = CoreConfig::builder().sleep_bridge(bridge).build()?;
//! let service = SleepService::new(config);
//! service.initialize_listeners();
//!
//! service.check_and_restore_tracking().await;
//! service.check_battery_optimization().await;
//! service.start_tracking(None).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use bridge_traits::{InitConfig, InitResponse, Platform, SetupConfig, TrackingOptions};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_session::{
    AnalysisResult, BatteryCheck, ListenerGuard, ListenerRegistrar, Report, RestoreOutcome,
    SessionState, SessionStore, SessionSummary,
};

pub use core_runtime::{CoreError, Result as RuntimeResult};
pub use core_session::{Result, SessionError};

/// Primary façade exposed to host applications. Cloneable; all clones share
/// the same store, bus, and registrar.
#[derive(Clone)]
pub struct SleepService {
    store: Arc<SessionStore>,
    bus: Arc<EventBus>,
    registrar: Arc<ListenerRegistrar>,
}

impl SleepService {
    /// Create a service from a validated configuration. Event listeners are
    /// not wired yet; call [`initialize_listeners`](Self::initialize_listeners)
    /// once the host is ready to receive native callbacks.
    pub fn new(config: CoreConfig) -> Self {
        let store = Arc::new(SessionStore::new(config.sleep_bridge, config.clock));
        Self {
            store,
            bus: Arc::new(EventBus::new(config.event_buffer_size)),
            registrar: Arc::new(ListenerRegistrar::new()),
        }
    }

    // -- wiring ---------------------------------------------------------

    /// Start consuming native events into the store. Idempotent per process:
    /// repeated calls return the same running consumer's guard.
    pub fn initialize_listeners(&self) -> ListenerGuard {
        self.registrar.initialize(self.store.clone(), &self.bus)
    }

    /// Stop the event consumer. A later
    /// [`initialize_listeners`](Self::initialize_listeners) wires a fresh one.
    pub fn teardown_listeners(&self) {
        self.registrar.teardown();
    }

    /// The bus native adapters publish their callbacks into.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to the raw event feed, e.g. for UI toasts or diagnostics.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.bus.subscribe())
    }

    /// Observe state snapshots. Every committed mutation is published;
    /// slow observers see the latest value.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.store.snapshot()
    }

    pub fn platform(&self) -> Platform {
        self.store.platform()
    }

    // -- actions (delegated to the store) -------------------------------

    pub async fn setup(&self, config: SetupConfig) -> Result<()> {
        self.store.setup(config).await
    }

    pub async fn init_config(&self, config: InitConfig) -> Result<InitResponse> {
        self.store.init_config(config).await
    }

    pub async fn check_and_restore_tracking(&self) -> RestoreOutcome {
        self.store.check_and_restore_tracking().await
    }

    pub async fn check_battery_optimization(&self) -> BatteryCheck {
        self.store.check_battery_optimization().await
    }

    pub async fn request_battery_optimization_exemption(&self) -> Result<bool> {
        self.store.request_battery_optimization_exemption().await
    }

    pub async fn start_tracking(&self, options: Option<TrackingOptions>) -> Result<()> {
        self.store.start_tracking(options).await
    }

    pub async fn stop_tracking(&self) -> Result<String> {
        self.store.stop_tracking().await
    }

    pub fn tracking_duration_minutes(&self) -> u64 {
        self.store.tracking_duration_minutes()
    }

    pub async fn get_report(&self, session_id: &str) -> Option<Report> {
        self.store.get_report(session_id).await
    }

    pub async fn get_report_list(&self, from_date: &str, to_date: &str) -> Vec<SessionSummary> {
        self.store.get_report_list(from_date, to_date).await
    }

    pub async fn get_average_report(&self, from_date: &str, to_date: &str) -> Option<Value> {
        self.store.get_average_report(from_date, to_date).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.store.delete_session(session_id).await
    }

    pub async fn request_analysis(&self) -> Option<AnalysisResult> {
        self.store.request_analysis().await
    }

    pub async fn set_custom_notification(&self, title: &str, text: &str) -> Result<()> {
        self.store.set_custom_notification(title, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::testing::FakeBridge;
    use core_runtime::events::SleepEvent;

    fn service(bridge: FakeBridge) -> (Arc<FakeBridge>, SleepService) {
        let bridge = Arc::new(bridge);
        let config = CoreConfig::builder()
            .sleep_bridge(bridge.clone())
            .build()
            .unwrap();
        (bridge, SleepService::new(config))
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn full_session_flow_through_facade() {
        let bridge = FakeBridge::android();
        bridge.set_stop_session_id("sess-final");
        let (_fake, service) = service(bridge);
        service.initialize_listeners();

        service
            .setup(SetupConfig::new("api-key").with_oda(true))
            .await
            .unwrap();
        service.check_and_restore_tracking().await;
        let check = service.check_battery_optimization().await;
        assert!(check.exempted);

        service.start_tracking(None).await.unwrap();
        assert!(service.snapshot().is_tracking);

        let id = service.stop_tracking().await.unwrap();
        assert_eq!(id, "sess-final");
        assert!(service.snapshot().did_close);
    }

    #[tokio::test]
    async fn native_events_flow_into_observed_state() {
        let (_fake, service) = service(FakeBridge::android());
        service.initialize_listeners();
        let mut state = service.state();

        service
            .event_bus()
            .emit(SleepEvent::UserJoined {
                user_id: "user-1".into(),
            })
            .unwrap();
        settle().await;

        state.changed().await.unwrap();
        assert_eq!(state.borrow().user_id.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn event_stream_filter_sees_published_events() {
        let (_fake, service) = service(FakeBridge::ios());
        let mut failures = service.events().for_event("onTrackingFailed");

        service
            .event_bus()
            .emit(SleepEvent::TrackingCreated { session_id: None })
            .unwrap();
        service
            .event_bus()
            .emit(SleepEvent::TrackingFailed {
                error: "mic lost".into(),
            })
            .unwrap();

        let event = failures.recv().await.unwrap();
        assert!(matches!(event, SleepEvent::TrackingFailed { .. }));
    }

    #[tokio::test]
    async fn clones_share_one_listener_wiring() {
        let (_fake, service) = service(FakeBridge::android());
        let clone = service.clone();
        service.initialize_listeners();
        clone.initialize_listeners();
        assert_eq!(service.event_bus().subscriber_count(), 1);

        service.teardown_listeners();
        settle().await;
        assert_eq!(clone.event_bus().subscriber_count(), 0);
    }
}
