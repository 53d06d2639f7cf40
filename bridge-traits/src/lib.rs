//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the sleep platform core and the
//! native sleep-tracking SDK bindings. The core never talks to the SDK
//! directly; every capability it needs (setup, tracking lifecycle, report
//! retrieval, on-device analysis, permission and battery-optimization
//! queries) is expressed as a method on [`SleepBridge`](sleep::SleepBridge)
//! and injected by the host at startup.
//!
//! ## Traits
//!
//! - [`SleepBridge`](sleep::SleepBridge) - the native SDK capability surface
//! - [`Clock`](time::Clock) - time source for deterministic testing
//!
//! ## Platform Requirements
//!
//! Each supported platform ships a concrete adapter over its native SDK
//! binding:
//!
//! | Platform | Adapter lives in | Notes |
//! |----------|------------------|-------|
//! | Android  | host app (Kotlin binding + FFI shim) | full capability set |
//! | iOS      | host app (Swift binding + FFI shim)  | no reconnection/battery surface |
//!
//! Methods that only exist on one platform ([`connect_tracking`],
//! [`is_battery_optimization_exempted`], [`set_custom_notification`]) are
//! documented no-ops elsewhere; [`SleepBridge::platform`] lets the core pick
//! the right behavior.
//!
//! [`connect_tracking`]: sleep::SleepBridge::connect_tracking
//! [`is_battery_optimization_exempted`]: sleep::SleepBridge::is_battery_optimization_exempted
//! [`set_custom_notification`]: sleep::SleepBridge::set_custom_notification
//!
//! ## Error Handling
//!
//! All bridge methods use the [`BridgeError`](error::BridgeError) type.
//! Adapters should convert native error codes into descriptive messages;
//! the core records them verbatim in its error slot.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.

pub mod error;
pub mod sleep;
pub mod time;

#[cfg(feature = "test-util")]
pub mod testing;

pub use error::{BridgeError, Result};
pub use sleep::{
    AnalysisResponse, InitConfig, InitResponse, NotificationSpec, Platform, SetupConfig,
    SleepBridge, TrackingOptions,
};
pub use time::{Clock, SystemClock};
