//! Replication Configuration
//!
//! Read-only inputs of the consumer, fixed for the node lifetime:
//! - events and control topic names
//! - poll timeout
//! - on-demand snapshot policy and periodic snapshot interval
//! - consumer group names, suffixed with the node id
//!
//! Loaded from a JSON file; every field has a default.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{ReplicationError, ReplicationResult};
use crate::stream::DEFAULT_POLL_TIMEOUT;

/// Replication consumer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Node identity, used to keep consumer groups per node (default: random)
    #[serde(default = "Uuid::new_v4")]
    pub node_id: Uuid,

    /// Events stream topic (default: "events")
    #[serde(default = "default_events_topic")]
    pub events_topic: String,

    /// Control stream topic (default: "control")
    #[serde(default = "default_control_topic")]
    pub control_topic: String,

    /// Upper bound of a single poll in milliseconds (default: 1000)
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Skip the bootstrap snapshot and snapshot periodically instead
    /// (default: false)
    #[serde(default)]
    pub skip_on_demand_snapshot: bool,

    /// Items processed between periodic snapshots (default: 10)
    #[serde(default = "default_iterations_between_snapshot")]
    pub iterations_between_snapshot: u64,

    /// Emit extra buffer diagnostics (default: false)
    #[serde(default)]
    pub under_test: bool,

    /// Group name prefix of the events subscription (default: "PrimaryConsumer")
    #[serde(default = "default_primary_group")]
    pub primary_group: String,

    /// Group name prefix of the control subscription (default: "SecondaryConsumer")
    #[serde(default = "default_secondary_group")]
    pub secondary_group: String,
}

fn default_events_topic() -> String {
    "events".to_string()
}

fn default_control_topic() -> String {
    "control".to_string()
}

fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT.as_millis() as u64
}

fn default_iterations_between_snapshot() -> u64 {
    10
}

fn default_primary_group() -> String {
    "PrimaryConsumer".to_string()
}

fn default_secondary_group() -> String {
    "SecondaryConsumer".to_string()
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            node_id: Uuid::new_v4(),
            events_topic: default_events_topic(),
            control_topic: default_control_topic(),
            poll_timeout_ms: default_poll_timeout_ms(),
            skip_on_demand_snapshot: false,
            iterations_between_snapshot: default_iterations_between_snapshot(),
            under_test: false,
            primary_group: default_primary_group(),
            secondary_group: default_secondary_group(),
        }
    }
}

impl ReplicationConfig {
    /// Create a configuration for the given topics, defaults elsewhere.
    pub fn new(events_topic: impl Into<String>, control_topic: impl Into<String>) -> Self {
        Self {
            events_topic: events_topic.into(),
            control_topic: control_topic.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> ReplicationResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ReplicationError::configuration(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from JSON.
    pub fn from_json(json: &str) -> ReplicationResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            ReplicationError::configuration(format!("Invalid config JSON: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.events_topic.is_empty() || self.control_topic.is_empty() {
            return Err(ReplicationError::configuration(
                "events_topic and control_topic must be non-empty",
            ));
        }
        if self.events_topic == self.control_topic {
            return Err(ReplicationError::configuration(format!(
                "events_topic and control_topic must differ, both are '{}'",
                self.events_topic
            )));
        }
        if self.poll_timeout_ms == 0 {
            return Err(ReplicationError::configuration(
                "poll_timeout_ms must be > 0",
            ));
        }
        if self.skip_on_demand_snapshot && self.iterations_between_snapshot == 0 {
            return Err(ReplicationError::configuration(
                "iterations_between_snapshot must be > 0 when periodic snapshots are enabled",
            ));
        }
        if self.primary_group.is_empty() || self.secondary_group.is_empty() {
            return Err(ReplicationError::configuration(
                "consumer group names must be non-empty",
            ));
        }
        Ok(())
    }

    /// Bound of a single poll.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Consumer group of the events subscription.
    pub fn events_group(&self) -> String {
        format!("{}-{}", self.primary_group, self.node_id)
    }

    /// Consumer group of the control subscription.
    pub fn control_group(&self) -> String {
        format!("{}-{}", self.secondary_group, self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ReplicationConfig::default();
        assert_eq!(config.events_topic, "events");
        assert_eq!(config.control_topic, "control");
        assert_eq!(config.poll_timeout(), Duration::from_millis(1000));
        assert!(!config.skip_on_demand_snapshot);
        assert_eq!(config.iterations_between_snapshot, 10);
        assert!(!config.under_test);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = ReplicationConfig::from_json("{}").unwrap();
        assert_eq!(config.events_topic, "events");
        assert_eq!(config.primary_group, "PrimaryConsumer");
    }

    #[test]
    fn test_groups_are_per_node() {
        let a = ReplicationConfig::default();
        let b = ReplicationConfig::default();
        assert_ne!(a.events_group(), b.events_group());
        assert!(a.events_group().starts_with("PrimaryConsumer-"));
        assert!(a.control_group().starts_with("SecondaryConsumer-"));
    }

    #[test]
    fn test_node_id_from_json() {
        let id = Uuid::new_v4();
        let config =
            ReplicationConfig::from_json(&format!(r#"{{"node_id": "{}"}}"#, id)).unwrap();
        assert_eq!(config.node_id, id);
        assert_eq!(config.control_group(), format!("SecondaryConsumer-{}", id));
    }

    #[test]
    fn test_rejects_same_topic() {
        let config = ReplicationConfig::new("log", "log");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_rejects_zero_poll_timeout() {
        let result = ReplicationConfig::from_json(r#"{"poll_timeout_ms": 0}"#);
        assert!(matches!(result, Err(ReplicationError::Configuration(_))));
    }

    #[test]
    fn test_zero_interval_only_matters_with_periodic_snapshots() {
        let mut config = ReplicationConfig::default();
        config.iterations_between_snapshot = 0;
        assert!(config.validate().is_ok());

        config.skip_on_demand_snapshot = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("replication.json");
        fs::write(
            &path,
            r#"{"events_topic": "orders", "control_topic": "orders-control", "under_test": true}"#,
        )
        .unwrap();

        let config = ReplicationConfig::load(&path).unwrap();
        assert_eq!(config.events_topic, "orders");
        assert!(config.under_test);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ReplicationConfig::load(Path::new("/nonexistent/replication.json"));
        assert!(matches!(result, Err(ReplicationError::Configuration(_))));
    }
}
