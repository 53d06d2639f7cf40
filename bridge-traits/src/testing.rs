//! Scriptable test doubles for the bridge traits.
//!
//! [`FakeBridge`] is a fully in-memory [`SleepBridge`] whose behavior is
//! scripted per test: canned payloads, per-method failure injection, a call
//! log for interaction assertions, and a gate that holds `setup` open so
//! concurrent-entry preconditions can be exercised deterministically.
//!
//! Only available with the `test-util` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::error::{BridgeError, Result};
use crate::sleep::{
    AnalysisResponse, InitConfig, InitResponse, Platform, SetupConfig, SleepBridge,
    TrackingOptions,
};

/// How the fake answers `request_analysis`.
#[derive(Debug, Clone)]
pub enum AnalysisScript {
    /// Resolve with this payload (Android-style).
    Completed(Value),
    /// Acknowledge only; the test emits the result event itself (iOS-style).
    Accepted,
}

/// In-memory scriptable [`SleepBridge`].
pub struct FakeBridge {
    platform: Platform,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, String>>,
    tracking: AtomicBool,
    tracking_alive: AtomicBool,
    battery_exempted: AtomicBool,
    permissions_granted: AtomicBool,
    block_setup: AtomicBool,
    setup_release: Notify,
    start_session_id: Mutex<Option<String>>,
    stop_session_id: Mutex<String>,
    report: Mutex<Value>,
    report_list: Mutex<Vec<Value>>,
    average_report: Mutex<Value>,
    analysis: Mutex<AnalysisScript>,
}

impl FakeBridge {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            tracking: AtomicBool::new(false),
            tracking_alive: AtomicBool::new(false),
            battery_exempted: AtomicBool::new(true),
            permissions_granted: AtomicBool::new(true),
            block_setup: AtomicBool::new(false),
            setup_release: Notify::new(),
            start_session_id: Mutex::new(None),
            stop_session_id: Mutex::new("session-fake".to_string()),
            report: Mutex::new(Value::Null),
            report_list: Mutex::new(Vec::new()),
            average_report: Mutex::new(Value::Null),
            analysis: Mutex::new(AnalysisScript::Accepted),
        }
    }

    pub fn android() -> Self {
        Self::new(Platform::Android)
    }

    pub fn ios() -> Self {
        Self::new(Platform::Ios)
    }

    // -- scripting ----------------------------------------------------------

    /// Make `method` fail with `message` until cleared.
    pub fn fail(&self, method: &'static str, message: impl Into<String>) {
        self.failures.lock().unwrap().insert(method, message.into());
    }

    pub fn clear_failure(&self, method: &'static str) {
        self.failures.lock().unwrap().remove(method);
    }

    /// Hold the next `setup` call open until [`release_setup`](Self::release_setup).
    pub fn block_setup(&self) {
        self.block_setup.store(true, Ordering::SeqCst);
    }

    pub fn release_setup(&self) {
        self.block_setup.store(false, Ordering::SeqCst);
        self.setup_release.notify_waiters();
    }

    pub fn set_tracking(&self, tracking: bool) {
        self.tracking.store(tracking, Ordering::SeqCst);
    }

    pub fn set_tracking_alive(&self, alive: bool) {
        self.tracking_alive.store(alive, Ordering::SeqCst);
    }

    pub fn set_battery_exempted(&self, exempted: bool) {
        self.battery_exempted.store(exempted, Ordering::SeqCst);
    }

    pub fn set_permissions_granted(&self, granted: bool) {
        self.permissions_granted.store(granted, Ordering::SeqCst);
    }

    pub fn set_start_session_id(&self, session_id: impl Into<String>) {
        *self.start_session_id.lock().unwrap() = Some(session_id.into());
    }

    pub fn set_stop_session_id(&self, session_id: impl Into<String>) {
        *self.stop_session_id.lock().unwrap() = session_id.into();
    }

    pub fn set_report(&self, report: Value) {
        *self.report.lock().unwrap() = report;
    }

    pub fn set_report_list(&self, list: Vec<Value>) {
        *self.report_list.lock().unwrap() = list;
    }

    pub fn set_average_report(&self, report: Value) {
        *self.average_report.lock().unwrap() = report;
    }

    pub fn set_analysis(&self, script: AnalysisScript) {
        *self.analysis.lock().unwrap() = script;
    }

    // -- assertions ---------------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Forget recorded calls, e.g. after a test's arrange phase.
    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == method)
            .count()
    }

    // -- internals ----------------------------------------------------------

    fn record(&self, method: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(method.to_string());
        match self.failures.lock().unwrap().get(method) {
            Some(message) => Err(BridgeError::OperationFailed(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SleepBridge for FakeBridge {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn setup(&self, _config: SetupConfig) -> Result<()> {
        self.record("setup")?;
        loop {
            let mut released = std::pin::pin!(self.setup_release.notified());
            released.as_mut().enable();
            if !self.block_setup.load(Ordering::SeqCst) {
                break;
            }
            released.await;
        }
        Ok(())
    }

    async fn init_config(&self, config: InitConfig) -> Result<InitResponse> {
        self.record("init_config")?;
        Ok(InitResponse {
            user_id: config.user_id,
        })
    }

    async fn is_tracking_alive(&self) -> Result<bool> {
        self.record("is_tracking_alive")?;
        Ok(self.tracking_alive.load(Ordering::SeqCst))
    }

    async fn connect_tracking(&self) -> Result<bool> {
        self.record("connect_tracking")?;
        match self.platform {
            Platform::Android => Ok(self.tracking_alive.load(Ordering::SeqCst)),
            Platform::Ios => Err(BridgeError::NotAvailable(
                "connect_tracking is Android-only".to_string(),
            )),
        }
    }

    async fn start_tracking(&self, _options: Option<TrackingOptions>) -> Result<Option<String>> {
        self.record("start_tracking")?;
        self.tracking.store(true, Ordering::SeqCst);
        Ok(self.start_session_id.lock().unwrap().clone())
    }

    async fn stop_tracking(&self) -> Result<String> {
        self.record("stop_tracking")?;
        self.tracking.store(false, Ordering::SeqCst);
        Ok(self.stop_session_id.lock().unwrap().clone())
    }

    fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    async fn get_report(&self, _session_id: &str) -> Result<Value> {
        self.record("get_report")?;
        Ok(self.report.lock().unwrap().clone())
    }

    async fn get_report_list(&self, _from_date: &str, _to_date: &str) -> Result<Vec<Value>> {
        self.record("get_report_list")?;
        Ok(self.report_list.lock().unwrap().clone())
    }

    async fn get_average_report(&self, _from_date: &str, _to_date: &str) -> Result<Value> {
        self.record("get_average_report")?;
        Ok(self.average_report.lock().unwrap().clone())
    }

    async fn delete_session(&self, _session_id: &str) -> Result<()> {
        self.record("delete_session")
    }

    async fn request_analysis(&self) -> Result<AnalysisResponse> {
        self.record("request_analysis")?;
        Ok(match self.analysis.lock().unwrap().clone() {
            AnalysisScript::Completed(payload) => AnalysisResponse::Completed(payload),
            AnalysisScript::Accepted => AnalysisResponse::Accepted,
        })
    }

    async fn request_required_permissions(&self) -> Result<bool> {
        self.record("request_required_permissions")?;
        Ok(self.permissions_granted.load(Ordering::SeqCst))
    }

    async fn is_battery_optimization_exempted(&self) -> Result<bool> {
        self.record("is_battery_optimization_exempted")?;
        match self.platform {
            Platform::Android => Ok(self.battery_exempted.load(Ordering::SeqCst)),
            Platform::Ios => Ok(true),
        }
    }

    async fn request_battery_optimization_exemption(&self) -> Result<bool> {
        self.record("request_battery_optimization_exemption")?;
        match self.platform {
            Platform::Android => Ok(self.battery_exempted.load(Ordering::SeqCst)),
            Platform::Ios => Ok(true),
        }
    }

    async fn set_custom_notification(&self, _title: &str, _text: &str) -> Result<()> {
        self.record("set_custom_notification")
    }
}
