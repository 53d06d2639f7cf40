//! Session state snapshot.
//!
//! One cloneable struct holds everything the application can observe about
//! the SDK: tracking/setup/analysis status, derived flags, the one-shot
//! gates, and the single latest-error and latest-log slots. A
//! `tokio::sync::watch` channel publishes it; every mutation replaces the
//! snapshot wholesale, so readers never see a half-applied transition.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::report::AnalysisResult;

/// Observable SDK status.
///
/// Created with defaults at process start and mutated only by store actions
/// and the listener registrar; lives for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Latch set when a close/stop fires, cleared on the next start.
    pub did_close: bool,
    /// A tracking run is active (optimistically set before native
    /// confirmation, corrected on failure).
    pub is_tracking: bool,
    /// True during a native-reported interruption (e.g. call audio focus
    /// loss); distinct from a full stop.
    pub is_tracking_paused: bool,
    /// Latest error message; overwritten by any failing action or failure
    /// event, never accumulated.
    pub error: Option<String>,
    /// Identity announced by the user-joined event.
    pub user_id: Option<String>,
    /// Session identifier assigned by the native layer once tracking starts.
    pub session_id: Option<String>,
    /// Most recent formatted log line (rolling slot, not a history).
    pub log: Option<String>,
    /// Latest on-device analysis payload.
    pub analysis_result: Option<AnalysisResult>,
    /// On-device-analysis capability flag recorded at setup time.
    pub is_oda_enabled: bool,
    /// An analysis request is in flight.
    pub is_analyzing: bool,
    /// When the current tracking run started. Always `None` while
    /// `is_tracking` is false.
    pub tracking_start_time: Option<DateTime<Utc>>,
    /// Either setup or config-init has resolved.
    pub is_initialized: bool,
    /// Setup (model download) is running. Never true together with
    /// `is_setup_complete`.
    pub is_setup_in_progress: bool,
    pub is_setup_complete: bool,
    /// One-shot gate: `check_and_restore_tracking` ran this process.
    pub has_checked_status: bool,
    /// One-shot gate: `check_battery_optimization` ran this process.
    pub has_checked_battery_optimization: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_idle() {
        let state = SessionState::default();
        assert!(!state.is_tracking);
        assert!(state.tracking_start_time.is_none());
        assert!(!state.is_initialized);
        assert!(!state.has_checked_status);
        assert!(state.error.is_none());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(SessionState::default()).unwrap();
        assert!(json.get("isTracking").is_some());
        assert!(json.get("hasCheckedBatteryOptimization").is_some());
    }
}
