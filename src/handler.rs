//! Processing handler capability
//!
//! The engine behind the consumer is reached only through
//! `ProcessingHandler`. The consumer never interprets item payloads or
//! side effects itself.

use thiserror::Error;

use crate::control::{Item, SideEffect};
use crate::replication::{ReplicationConfig, Role};
use crate::snapshot::SnapshotInfo;

/// Result type for handler operations
pub type HandlerResult<T> = Result<T, HandlerError>;

/// The engine failed to apply an item or its side effects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler failed: {message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Applies work to the engine.
///
/// All methods run on the consumer loop thread, one record at a time.
pub trait ProcessingHandler: Send {
    /// Apply an item.
    ///
    /// As leader, the returned side effects are published to the control
    /// stream. As replica, they are discarded.
    fn process(&mut self, item: &Item, role: Role) -> HandlerResult<Vec<SideEffect>>;

    /// Apply an item, then persist a snapshot of the engine state.
    fn process_with_snapshot(&mut self, item: &Item, role: Role)
        -> HandlerResult<Vec<SideEffect>>;

    /// Apply side effects computed by the leader.
    fn process_side_effects_on_replica(&mut self, side_effects: &[SideEffect])
        -> HandlerResult<()>;

    /// Replace the engine state with a snapshot.
    ///
    /// Returns `false` if the snapshot cannot be used.
    fn initialize_from_snapshot(
        &mut self,
        config: &ReplicationConfig,
        snapshot: &SnapshotInfo,
    ) -> bool;

    /// Release engine resources on shutdown.
    fn stop(&mut self) {}
}
