//! Observability subsystem
//!
//! - Structured logging (JSON, one line per event)
//! - Replication counters
//! - Begin/complete scopes around blocking steps
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on replication
//! 3. No background threads
//!
//! # Usage
//!
//! ```ignore
//! use aeroha::observability::{log_event, Event, ReplicationMetrics};
//!
//! log_event(Event::RoleTransition, &[("from", "REPLICA"), ("to", "LEADER")]);
//!
//! let metrics = ReplicationMetrics::new();
//! metrics.increment_commits();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, ReplicationMetrics};
pub use scope::ObservationScope;

/// Log an event at its own severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
