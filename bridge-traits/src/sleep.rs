//! Native Sleep-Tracking SDK Capability Surface
//!
//! [`SleepBridge`] is the single trait the core consumes. Host platforms wrap
//! their native SDK binding (Kotlin on Android, Swift on iOS) in an adapter
//! implementing it, and forward every named SDK callback as a
//! `SleepEvent` on the core's event bus.
//!
//! The trait is deliberately dumb: no ordering rules, no state. Ordering
//! invariants ("setup before init", "battery check before start") live in the
//! core's session store, which is the only caller.
//!
//! # Raw payloads
//!
//! Report and analysis payloads cross this boundary as [`serde_json::Value`]
//! in whatever key casing the native SDK produced (typically snake_case).
//! The core normalizes and types them; adapters must not reshape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Host platform the bridge adapter runs on.
///
/// Several capabilities only exist on one platform; the core consults this
/// to decide between a native call and a documented no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Android => write!(f, "android"),
            Platform::Ios => write!(f, "ios"),
        }
    }
}

/// Parameters for the capability-flag setup call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub callback_url: Option<String>,
    /// Native service label; the SDK defaults this to "SleepTracking".
    pub service: Option<String>,
    /// Enable on-device analysis (ODA) mode.
    pub enable_oda: bool,
}

impl SetupConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_oda(mut self, enable: bool) -> Self {
        self.enable_oda = enable;
        self
    }
}

/// Parameters for the plain config-init call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConfig {
    pub api_key: String,
    /// Existing user identity, if any. When absent the backend assigns one
    /// and announces it via a user-joined event.
    pub user_id: Option<String>,
    pub base_url: Option<String>,
    pub callback_url: Option<String>,
}

impl InitConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }
}

/// Result of the config-init call.
///
/// `user_id` here is advisory: on both platforms the authoritative identity
/// arrives asynchronously via the user-joined event, and callers must not
/// assume it is populated on return.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    pub user_id: Option<String>,
}

/// Foreground-service notification content (Android).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSpec {
    pub title: Option<String>,
    pub text: Option<String>,
    /// Drawable resource name looked up in the host app.
    pub icon: Option<String>,
}

/// Optional knobs for starting a tracking run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingOptions {
    pub notification: Option<NotificationSpec>,
}

/// Outcome of an analysis request.
///
/// The two platforms diverge here: Android resolves with the final
/// session-shaped payload (and also emits the analysis-result event), while
/// iOS only acknowledges receipt and delivers the result exclusively through
/// the later event. The core supports both.
#[derive(Debug, Clone)]
pub enum AnalysisResponse {
    /// The call resolved with the final payload (Android).
    Completed(Value),
    /// The call only acknowledged the request; result arrives via event (iOS).
    Accepted,
}

/// Native sleep-tracking SDK capability surface.
///
/// One long-lived instance per process, shared behind an `Arc`. Each method
/// maps 1:1 to a native SDK entry point and resolves exactly once.
///
/// # Events
///
/// Adapters also own event delivery: every named native callback
/// (tracking created/uploaded/closed/failed, setup progress, user joined,
/// analysis result, ...) must be forwarded onto the event bus handed to the
/// adapter at wiring time. The core's listener registrar consumes them.
///
/// # Retry policy
///
/// The core does not retry bridge calls. Adapters that retry internally
/// (the Android binding retries an analysis request issued while tracking is
/// not yet active) must keep it bounded: max 3 attempts with a fixed delay.
#[async_trait]
pub trait SleepBridge: Send + Sync {
    /// Which platform this adapter runs on.
    fn platform(&self) -> Platform;

    /// Initialize the SDK with capability flags. Resolves when the native
    /// setup listener completes; setup progress arrives via events.
    async fn setup(&self, config: SetupConfig) -> Result<()>;

    /// Initialize the SDK config and join (or rejoin) a user.
    async fn init_config(&self, config: InitConfig) -> Result<InitResponse>;

    /// Whether a native tracking session survived a process restart.
    async fn is_tracking_alive(&self) -> Result<bool>;

    /// Reattach to a tracking session that is already running natively.
    ///
    /// Android only; adapters for other platforms return
    /// [`BridgeError::NotAvailable`](crate::BridgeError::NotAvailable).
    async fn connect_tracking(&self) -> Result<bool>;

    /// Begin a tracking run. May resolve with the assigned session id
    /// (Android resolves once the session is created; iOS resolves
    /// immediately with `None`).
    async fn start_tracking(&self, options: Option<TrackingOptions>) -> Result<Option<String>>;

    /// End the tracking run, returning the finalized session id.
    async fn stop_tracking(&self) -> Result<String>;

    /// Synchronous native tracking flag.
    fn is_tracking(&self) -> bool;

    /// Fetch a single report, raw and unnormalized.
    async fn get_report(&self, session_id: &str) -> Result<Value>;

    /// Fetch session summaries between two `YYYY-MM-DD` dates, raw.
    async fn get_report_list(&self, from_date: &str, to_date: &str) -> Result<Vec<Value>>;

    /// Fetch the averaged report between two `YYYY-MM-DD` dates, raw.
    async fn get_average_report(&self, from_date: &str, to_date: &str) -> Result<Value>;

    /// Delete a session and its report.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Request an on-device analysis pass over the current session.
    async fn request_analysis(&self) -> Result<AnalysisResponse>;

    /// Request the runtime permissions tracking needs (microphone, plus a
    /// post-notification permission on newer OS versions). Resolves `true`
    /// only when everything required is granted.
    async fn request_required_permissions(&self) -> Result<bool>;

    /// Whether the app is currently exempt from battery optimization.
    ///
    /// Android only; other platforms return `true` (nothing to exempt).
    async fn is_battery_optimization_exempted(&self) -> Result<bool>;

    /// Open system settings for a battery-optimization exemption. Returns
    /// whether the app is *already* exempted; `false` means settings were
    /// opened and the caller must re-check later.
    async fn request_battery_optimization_exemption(&self) -> Result<bool>;

    /// Update the foreground-service notification. Android only.
    async fn set_custom_notification(&self, title: &str, text: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_config_builder_defaults() {
        let config = SetupConfig::new("key").with_oda(true);
        assert_eq!(config.api_key, "key");
        assert!(config.enable_oda);
        assert!(config.service.is_none());
    }

    #[test]
    fn platform_display_is_lowercase() {
        assert_eq!(Platform::Android.to_string(), "android");
        assert_eq!(Platform::Ios.to_string(), "ios");
    }

    #[test]
    fn configs_serialize_camel_case() {
        let json = serde_json::to_value(InitConfig::new("k")).unwrap();
        assert!(json.get("apiKey").is_some());
        assert!(json.get("userId").is_some());
    }
}
