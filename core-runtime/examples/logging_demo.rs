//! Logging and event-bus demonstration.
//!
//! Run with:
//! ```bash
//! # Pretty format (default)
//! cargo run --example logging_demo
//!
//! # JSON format
//! cargo run --example logging_demo -- json
//!
//! # With a custom filter
//! cargo run --example logging_demo -- pretty "core_runtime=trace"
//! ```

use std::env;

use core_runtime::events::{EventBus, SleepEvent};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    let mut config = LoggingConfig::default().with_format(format);
    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }
    if let Err(e) = init_logging(config) {
        eprintln!("failed to initialize logging: {e}");
        return;
    }

    info!("sleep core logging initialized");

    let bus = EventBus::default();
    let mut events = bus.subscribe();

    bus.emit(SleepEvent::TrackingCreated {
        session_id: Some("demo-session".to_string()),
    })
    .ok();
    bus.emit(SleepEvent::TrackingUploaded { sequence: 1 }).ok();
    bus.emit(SleepEvent::TrackingClosed {
        session_id: "demo-session".to_string(),
    })
    .ok();
    drop(bus);

    while let Ok(event) = events.recv().await {
        match event.severity() {
            core_runtime::events::EventSeverity::Warning => {
                warn!(event = event.name(), "received event")
            }
            _ => info!(event = event.name(), "received event"),
        }
    }

    info!("event bus closed, demo complete");
}
