//! # Session State Store
//!
//! Single authoritative record of SDK status. Every native call the
//! application can trigger goes through an action method here, which:
//!
//! 1. validates preconditions against the current snapshot,
//! 2. applies the optimistic state change,
//! 3. awaits the bridge,
//! 4. commits the outcome, or rolls the optimistic change back and records
//!    the error in the single latest-error slot.
//!
//! Steps 1 and 2 run inside one `watch::Sender::send_if_modified` closure
//! with no await point, so they are a single non-preemptible step relative
//! to every other store mutation: two racing `start_tracking` calls can
//! never both observe `is_tracking == false`.
//!
//! Event-driven mutations (native callbacks) come in through
//! [`ListenerRegistrar`](crate::listeners::ListenerRegistrar) as
//! last-writer-wins field updates and may interleave with in-flight actions
//! at any await boundary.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use bridge_traits::{
    AnalysisResponse, Clock, InitConfig, InitResponse, Platform, SetupConfig, SleepBridge,
    TrackingOptions,
};
use core_runtime::normalize::camelize_keys;

use crate::error::{Result, SessionError};
use crate::report::{reshape_report, AnalysisResult, Report, SessionSummary};
use crate::state::SessionState;

/// Outcome of the startup status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// A native tracking session is still running from before this process.
    pub has_active_session: bool,
}

/// Outcome of the battery-optimization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatteryCheck {
    pub exempted: bool,
    pub platform: Platform,
    pub message: Option<String>,
}

/// Reactive session store. One instance per process, shared behind an
/// `Arc`; construct it through the facade or directly for tests.
pub struct SessionStore {
    bridge: Arc<dyn SleepBridge>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<SessionState>,
}

impl SessionStore {
    /// Create a store with default (idle) state. `is_tracking` is seeded
    /// from the bridge's synchronous query so a process attaching to a
    /// still-running native session starts from truth.
    pub fn new(bridge: Arc<dyn SleepBridge>, clock: Arc<dyn Clock>) -> Self {
        let state = SessionState {
            is_tracking: bridge.is_tracking(),
            ..SessionState::default()
        };
        let (tx, _) = watch::channel(state);
        Self {
            bridge,
            clock,
            state: tx,
        }
    }

    /// Subscribe to state snapshots. The receiver sees every committed
    /// mutation (possibly coalesced, latest-wins).
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn platform(&self) -> Platform {
        self.bridge.platform()
    }

    // ------------------------------------------------------------------
    // setup / init
    // ------------------------------------------------------------------

    /// Initialize the SDK with capability flags.
    ///
    /// Rejects while another setup is pending or while tracking is running;
    /// on success records the ODA capability flag and marks the store
    /// initialized.
    #[instrument(skip_all)]
    pub async fn setup(&self, config: SetupConfig) -> Result<()> {
        self.begin_setup()?;
        let enable_oda = config.enable_oda;
        info!(enable_oda, "starting SDK setup");

        match self.bridge.setup(config).await {
            Ok(()) => {
                self.update(|s| {
                    s.is_oda_enabled = enable_oda;
                    s.is_initialized = true;
                    s.is_setup_in_progress = false;
                    s.is_setup_complete = true;
                });
                info!("SDK setup complete");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "SDK setup failed");
                self.update(|s| {
                    s.error = Some(message);
                    s.is_setup_in_progress = false;
                });
                Err(e.into())
            }
        }
    }

    /// Initialize the SDK config and join a user.
    ///
    /// The returned `user_id` is advisory only: the authoritative identity
    /// arrives via the user-joined event and lands in
    /// [`SessionState::user_id`]. Callers must not assume it is populated
    /// here.
    #[instrument(skip_all)]
    pub async fn init_config(&self, config: InitConfig) -> Result<InitResponse> {
        match self.bridge.init_config(config).await {
            Ok(response) => {
                self.update(|s| s.is_initialized = true);
                info!("SDK config initialized");
                Ok(response)
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    // ------------------------------------------------------------------
    // startup gates
    // ------------------------------------------------------------------

    /// Query whether a native tracking session survived a process restart
    /// and, where the platform supports it, reattach to it.
    ///
    /// Must be called once at process start; `start_tracking` rejects until
    /// it has run. Never throws: failures land in the error slot and the
    /// outcome reports no active session.
    #[instrument(skip_all)]
    pub async fn check_and_restore_tracking(&self) -> RestoreOutcome {
        // The gate opens regardless of what the query finds.
        self.update(|s| s.has_checked_status = true);

        let alive = match self.bridge.is_tracking_alive().await {
            Ok(alive) => alive,
            Err(e) => {
                self.record_failure(e);
                return RestoreOutcome {
                    has_active_session: false,
                };
            }
        };
        if !alive {
            return RestoreOutcome {
                has_active_session: false,
            };
        }

        if self.bridge.platform() == Platform::Android {
            match self.bridge.connect_tracking().await {
                Ok(true) => {
                    info!("reattached to running tracking session");
                    self.update(|s| s.is_tracking = true);
                }
                Ok(false) => warn!("native session alive but reconnection was refused"),
                Err(e) => {
                    self.record_failure(e);
                }
            }
        }

        RestoreOutcome {
            has_active_session: true,
        }
    }

    /// Check battery-optimization exemption status.
    ///
    /// Opens the battery gate unconditionally; on platforms without the
    /// concept the underlying check is a no-op that reports exempted.
    #[instrument(skip_all)]
    pub async fn check_battery_optimization(&self) -> BatteryCheck {
        self.update(|s| s.has_checked_battery_optimization = true);

        let platform = self.bridge.platform();
        if platform == Platform::Ios {
            return BatteryCheck {
                exempted: true,
                platform,
                message: Some("Battery optimization is not applicable on this platform".into()),
            };
        }
        match self.bridge.is_battery_optimization_exempted().await {
            Ok(exempted) => BatteryCheck {
                exempted,
                platform,
                message: None,
            },
            Err(e) => {
                let message = e.to_string();
                self.record_failure(e);
                BatteryCheck {
                    exempted: false,
                    platform,
                    message: Some(message),
                }
            }
        }
    }

    /// Open system settings for a battery-optimization exemption.
    ///
    /// Returns whether the app is *already* exempted; `false` means settings
    /// were opened and the caller must re-check later. No-op returning
    /// `true` where not applicable.
    pub async fn request_battery_optimization_exemption(&self) -> Result<bool> {
        if self.bridge.platform() == Platform::Ios {
            return Ok(true);
        }
        self.bridge
            .request_battery_optimization_exemption()
            .await
            .map_err(|e| self.record_failure(e))
    }

    // ------------------------------------------------------------------
    // tracking lifecycle
    // ------------------------------------------------------------------

    /// Begin a tracking run.
    ///
    /// Precondition order, each with a distinct error: status gate, battery
    /// gate, no setup in flight, not already tracking. Then runtime
    /// permissions are requested and the *current* exemption status is
    /// re-verified before the native start. State is set optimistically and
    /// rolled back if the native call fails.
    #[instrument(skip_all)]
    pub async fn start_tracking(&self, options: Option<TrackingOptions>) -> Result<()> {
        check_start_preconditions(&self.state.borrow())?;

        let granted = self
            .bridge
            .request_required_permissions()
            .await
            .map_err(|e| self.record_failure(e))?;
        if !granted {
            let err = SessionError::PermissionDenied(missing_permissions(self.bridge.platform()));
            self.set_error(err.to_string());
            return Err(err);
        }

        // The gate only proves the check ran; exemption can be revoked from
        // system settings at any time, so verify the current status.
        if self.bridge.platform() == Platform::Android {
            let exempted = self
                .bridge
                .is_battery_optimization_exempted()
                .await
                .map_err(|e| self.record_failure(e))?;
            if !exempted {
                let err = SessionError::BatteryNotExempted;
                self.set_error(err.to_string());
                return Err(err);
            }
        }

        self.begin_tracking(self.clock.now())?;
        debug!("tracking state set optimistically, calling native start");

        match self.bridge.start_tracking(options).await {
            Ok(session_id) => {
                if let Some(id) = session_id {
                    self.update(|s| s.session_id = Some(id));
                }
                info!("tracking started");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "native start failed, rolling back");
                self.update(|s| {
                    s.error = Some(message);
                    s.is_tracking = false;
                    s.is_analyzing = false;
                    s.tracking_start_time = None;
                });
                Err(e.into())
            }
        }
    }

    /// End the tracking run, returning the finalized session id.
    #[instrument(skip_all)]
    pub async fn stop_tracking(&self) -> Result<String> {
        let session_id = self
            .bridge
            .stop_tracking()
            .await
            .map_err(|e| self.record_failure(e))?;
        self.update(|s| {
            s.did_close = true;
            s.session_id = Some(session_id.clone());
            s.is_tracking = false;
            s.is_analyzing = false;
            s.tracking_start_time = None;
        });
        info!(session_id = %session_id, "tracking stopped");
        Ok(session_id)
    }

    /// Minutes elapsed since tracking started; 0 when not tracking.
    pub fn tracking_duration_minutes(&self) -> u64 {
        let start = {
            let state = self.state.borrow();
            if !state.is_tracking {
                return 0;
            }
            match state.tracking_start_time {
                Some(start) => start,
                None => return 0,
            }
        };
        let elapsed_ms = self
            .clock
            .now()
            .signed_duration_since(start)
            .num_milliseconds()
            .max(0);
        (elapsed_ms / 60_000) as u64
    }

    // ------------------------------------------------------------------
    // reports
    // ------------------------------------------------------------------

    /// Fetch one report, normalized and typed.
    ///
    /// Read-only fetches never throw: failures are recorded in the error
    /// slot and resolve to `None`.
    #[instrument(skip(self))]
    pub async fn get_report(&self, session_id: &str) -> Option<Report> {
        let raw = match self.bridge.get_report(session_id).await {
            Ok(raw) => raw,
            Err(e) => {
                self.record_failure(e);
                return None;
            }
        };
        let reshaped = reshape_report(camelize_keys(raw));
        match serde_json::from_value::<Report>(reshaped) {
            Ok(report) => Some(report),
            Err(e) => {
                self.set_error(format!("Malformed report payload: {e}"));
                None
            }
        }
    }

    /// Fetch session summaries between two `YYYY-MM-DD` dates.
    ///
    /// Resolves to an empty list on any failure (recorded in the error
    /// slot); entries that fail to parse are dropped individually.
    #[instrument(skip(self))]
    pub async fn get_report_list(&self, from_date: &str, to_date: &str) -> Vec<SessionSummary> {
        if let Err(e) = validate_date_range(from_date, to_date) {
            self.set_error(e.to_string());
            return Vec::new();
        }
        let raw = match self.bridge.get_report_list(from_date, to_date).await {
            Ok(raw) => raw,
            Err(e) => {
                self.record_failure(e);
                return Vec::new();
            }
        };
        raw.into_iter()
            .filter_map(|entry| {
                let normalized = camelize_keys(entry);
                match serde_json::from_value::<SessionSummary>(normalized) {
                    Ok(summary) => Some(summary),
                    Err(e) => {
                        debug!(error = %e, "dropping malformed report-list entry");
                        None
                    }
                }
            })
            .collect()
    }

    /// Fetch the averaged report between two `YYYY-MM-DD` dates.
    ///
    /// The averaged projection's schema varies by backend version, so it is
    /// returned as normalized JSON. Resolves to `None` on failure.
    #[instrument(skip(self))]
    pub async fn get_average_report(&self, from_date: &str, to_date: &str) -> Option<Value> {
        if let Err(e) = validate_date_range(from_date, to_date) {
            self.set_error(e.to_string());
            return None;
        }
        match self.bridge.get_average_report(from_date, to_date).await {
            Ok(raw) => Some(camelize_keys(raw)),
            Err(e) => {
                self.record_failure(e);
                None
            }
        }
    }

    /// Delete a session and its report.
    ///
    /// Unlike the read-only fetches this rethrows: the caller needs the
    /// failure signal to avoid falsely confirming deletion.
    #[instrument(skip(self))]
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.bridge
            .delete_session(session_id)
            .await
            .map_err(|e| self.record_failure(e))?;
        info!(session_id, "session deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // analysis
    // ------------------------------------------------------------------

    /// Request an on-device analysis pass.
    ///
    /// Platform divergence: Android resolves with the final payload (also
    /// mirrored to the analysis-result event); iOS only acknowledges and
    /// the result arrives exclusively via the event. Consumers should read
    /// [`SessionState::analysis_result`] rather than rely on this return
    /// value being final.
    #[instrument(skip_all)]
    pub async fn request_analysis(&self) -> Option<AnalysisResult> {
        self.update(|s| s.is_analyzing = true);

        match self.bridge.request_analysis().await {
            Ok(AnalysisResponse::Completed(raw)) => {
                match serde_json::from_value::<AnalysisResult>(camelize_keys(raw)) {
                    Ok(result) => {
                        self.update(|s| {
                            s.analysis_result = Some(result.clone());
                            s.is_analyzing = false;
                        });
                        Some(result)
                    }
                    Err(e) => {
                        self.update(|s| {
                            s.error = Some(format!("Malformed analysis payload: {e}"));
                            s.is_analyzing = false;
                        });
                        None
                    }
                }
            }
            // Result arrives via the analysis-result event; stay analyzing.
            Ok(AnalysisResponse::Accepted) => None,
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "analysis request failed");
                self.update(|s| {
                    s.error = Some(message);
                    s.is_analyzing = false;
                });
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // misc
    // ------------------------------------------------------------------

    /// Update the foreground-service notification. Warn-level no-op off
    /// Android.
    pub async fn set_custom_notification(&self, title: &str, text: &str) -> Result<()> {
        if self.bridge.platform() != Platform::Android {
            warn!("set_custom_notification is not supported on this platform");
            return Ok(());
        }
        self.bridge
            .set_custom_notification(title, text)
            .await
            .map_err(|e| self.record_failure(e))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // internal mutation helpers (also used by the listener registrar)
    // ------------------------------------------------------------------

    /// Last-writer-wins state mutation.
    pub(crate) fn update(&self, f: impl FnOnce(&mut SessionState)) {
        self.state.send_modify(f);
    }

    pub(crate) fn set_error(&self, message: String) {
        self.update(|s| s.error = Some(message));
    }

    /// Record a bridge failure in the error slot and convert it.
    fn record_failure(&self, e: bridge_traits::BridgeError) -> SessionError {
        self.set_error(e.to_string());
        SessionError::from(e)
    }

    /// Store the formatted line in the rolling log slot.
    pub(crate) fn add_log(&self, line: String) {
        let stamped = format!("[{}] {}", self.clock.now().format("%H:%M:%S"), line);
        debug!("{stamped}");
        self.update(|s| s.log = Some(stamped));
    }

    /// Atomically check setup preconditions and mark setup pending.
    fn begin_setup(&self) -> Result<()> {
        let mut violation = None;
        self.state.send_if_modified(|s| {
            if s.is_setup_in_progress {
                violation = Some(SessionError::SetupAlreadyInProgress);
                return false;
            }
            if s.is_tracking {
                violation = Some(SessionError::SetupWhileTracking);
                return false;
            }
            s.is_setup_in_progress = true;
            s.is_setup_complete = false;
            s.error = None;
            true
        });
        match violation {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Atomically re-check start preconditions and apply the optimistic
    /// tracking state. The re-check closes the window opened by the
    /// permission/battery awaits above.
    fn begin_tracking(&self, started_at: DateTime<Utc>) -> Result<()> {
        let mut violation = None;
        self.state.send_if_modified(|s| {
            if let Err(e) = check_start_preconditions(s) {
                violation = Some(e);
                return false;
            }
            s.did_close = false;
            s.is_tracking = true;
            s.is_analyzing = false;
            s.tracking_start_time = Some(started_at);
            true
        });
        match violation {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// The four start gates, in their mandated order.
fn check_start_preconditions(s: &SessionState) -> Result<()> {
    if !s.has_checked_status {
        return Err(SessionError::TrackingStatusNotChecked);
    }
    if !s.has_checked_battery_optimization {
        return Err(SessionError::BatteryOptimizationNotChecked);
    }
    if s.is_setup_in_progress {
        return Err(SessionError::StartDuringSetup);
    }
    if s.is_tracking {
        return Err(SessionError::TrackingAlreadyInProgress);
    }
    Ok(())
}

fn missing_permissions(platform: Platform) -> String {
    match platform {
        Platform::Android => "microphone and post-notification permissions".to_string(),
        Platform::Ios => "microphone permission".to_string(),
    }
}

fn validate_date_range(from_date: &str, to_date: &str) -> Result<()> {
    for date in [from_date, to_date] {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| SessionError::InvalidDate(date.to_string()))?;
    }
    Ok(())
}
