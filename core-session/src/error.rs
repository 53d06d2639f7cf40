use bridge_traits::BridgeError;
use thiserror::Error;

/// Failures surfaced by [`SessionStore`](crate::store::SessionStore) actions.
///
/// Precondition violations are raised before any native call; every message
/// names the violated invariant so application code can show it directly.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Setup is already in progress")]
    SetupAlreadyInProgress,

    #[error("Cannot execute setup while tracking is in progress")]
    SetupWhileTracking,

    #[error("Must call check_and_restore_tracking() at app startup before starting tracking")]
    TrackingStatusNotChecked,

    #[error("Must call check_battery_optimization() before starting tracking")]
    BatteryOptimizationNotChecked,

    #[error("Cannot start tracking while setup is in progress")]
    StartDuringSetup,

    #[error("Tracking is already in progress")]
    TrackingAlreadyInProgress,

    #[error("Required permissions denied: {0}")]
    PermissionDenied(String),

    #[error("Battery optimization exemption is required before tracking can start")]
    BatteryNotExempted,

    #[error("Invalid date: {0} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
