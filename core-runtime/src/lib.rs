//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the sleep platform core:
//! - Typed event bus bridging native SDK callbacks to the core
//! - Key normalization for payloads crossing the native boundary
//! - Configuration management with fail-fast capability validation
//! - Logging and tracing infrastructure
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the session layer depends on.
//! It establishes the event broadcasting mechanism, the logging conventions,
//! and the configuration entry point used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod normalize;

pub use error::{CoreError, Result};
