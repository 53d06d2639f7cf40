//! # Core Configuration Module
//!
//! Configuration entry point for the sleep platform core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`CoreConfig`] holding the injected host capabilities and tuning knobs.
//! It enforces fail-fast validation: a missing required bridge produces an
//! actionable [`CoreError::CapabilityMissing`] at build time rather than a
//! panic at first use.
//!
//! ## Required Dependencies
//!
//! - [`SleepBridge`] - adapter over the platform's native sleep SDK binding
//!
//! ## Optional Dependencies (with defaults)
//!
//! - [`Clock`] - time source (default: [`SystemClock`])
//! - event buffer size (default: [`DEFAULT_EVENT_BUFFER_SIZE`])
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .sleep_bridge(Arc::new(AndroidSleepBridge::new(..)))
//!     .build()?;
//! ```

use std::sync::Arc;

use bridge_traits::{Clock, SleepBridge, SystemClock};

use crate::error::{CoreError, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;

/// Core configuration for the sleep platform core.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Adapter over the native sleep-tracking SDK.
    pub sleep_bridge: Arc<dyn SleepBridge>,
    /// Time source for durations and log timestamps.
    pub clock: Arc<dyn Clock>,
    /// Buffer size of the broadcast event channel.
    pub event_buffer_size: usize,
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("platform", &self.sleep_bridge.platform())
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    sleep_bridge: Option<Arc<dyn SleepBridge>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Inject the host's native SDK adapter. Required.
    pub fn sleep_bridge(mut self, bridge: Arc<dyn SleepBridge>) -> Self {
        self.sleep_bridge = Some(bridge);
        self
    }

    /// Override the time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Override the event channel buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// - [`CoreError::CapabilityMissing`] when no sleep bridge was injected
    /// - [`CoreError::Config`] when the event buffer size is zero
    pub fn build(self) -> Result<CoreConfig> {
        let sleep_bridge = self
            .sleep_bridge
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "SleepBridge".to_string(),
                message: "No native sleep SDK adapter provided. \
                          Android: inject the Kotlin-binding adapter. \
                          iOS: inject the Swift-binding adapter."
                    .to_string(),
            })?;

        let event_buffer_size = self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        if event_buffer_size == 0 {
            return Err(CoreError::Config(
                "event_buffer_size must be greater than zero".to_string(),
            ));
        }

        Ok(CoreConfig {
            sleep_bridge,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::testing::FakeBridge;

    #[test]
    fn missing_bridge_fails_fast() {
        let err = CoreConfig::builder().build().unwrap_err();
        match err {
            CoreError::CapabilityMissing { capability, .. } => {
                assert_eq!(capability, "SleepBridge");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn defaults_are_applied() {
        let config = CoreConfig::builder()
            .sleep_bridge(Arc::new(FakeBridge::android()))
            .build()
            .unwrap();
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn zero_buffer_size_is_rejected() {
        let err = CoreConfig::builder()
            .sleep_bridge(Arc::new(FakeBridge::android()))
            .event_buffer_size(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
