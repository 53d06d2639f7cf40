//! # Session State Layer
//!
//! The reconciliation core of the sleep platform: a single authoritative,
//! observable record of SDK status, plus the policy that keeps it in sync
//! with the native layer's asynchronous events.
//!
//! ## Components
//!
//! - [`SessionStore`](store::SessionStore) - reactive state container whose
//!   action methods wrap every native call with precondition checks,
//!   optimistic updates, and rollback on failure
//! - [`ListenerRegistrar`](listeners::ListenerRegistrar) - binds the event
//!   bus to store mutations exactly once per process lifetime
//! - [`SessionState`](state::SessionState) - the cloneable state snapshot
//!   published through a `tokio::sync::watch` channel
//! - report projections ([`Report`](report::Report) and friends) with the
//!   flat-to-nested reshape for cross-platform payload drift
//!
//! ## Ordering invariants
//!
//! The store is where "setup before start", "status check before start" and
//! "no start while tracking" live. Each action validates its preconditions
//! and applies its optimistic state change inside a single non-preemptible
//! step, so two racing `start_tracking` calls can never both pass the
//! not-tracking check.

pub mod error;
pub mod listeners;
pub mod report;
pub mod state;
pub mod store;

pub use error::{Result, SessionError};
pub use listeners::{ListenerGuard, ListenerRegistrar};
pub use report::{AnalysisResult, Report, ReportSession, SessionSummary, SleepStat};
pub use state::SessionState;
pub use store::{BatteryCheck, RestoreOutcome, SessionStore};
