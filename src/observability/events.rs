//! Observable replication events
//!
//! Events are explicit and typed. Each carries the severity it is logged
//! at, so call sites never pick a level ad hoc.

use std::fmt;

use super::logger::Severity;

/// Observable events of the replication consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Consumption enabled for a role
    ConsumerStart,
    /// Role change requested on a running consumer
    RoleTransition,
    /// Subscriptions rebuilt and offsets reseeked
    ConsumerRestart,
    /// Processing position seeded from the control stream tail
    ProcessingKeySeeded,
    /// Stop requested
    ShutdownStart,
    /// Streams closed, handler stopped
    ShutdownComplete,

    // Snapshots
    /// Snapshot restored into the engine
    SnapshotRestored,
    /// Leader persisted a periodic snapshot
    PeriodicSnapshot,

    // Record flow
    /// Replica applied a control message
    ControlApplied,
    /// Replica skipped a control record at or below its position
    ControlSkipped,
    /// Replica adopted a control record past a gap
    ControlGap,
    /// Record applied from the events stream
    EventApplied,
    /// Leader published a control message
    ControlPublished,
    /// Buffer diagnostics (under test)
    BufferState,

    // Supervision
    /// Leader idle, control tail checked
    LeaderIdlePeek,
    /// Control stream grew without this leader publishing
    LeaderSupersededSuspected,
    /// A stream resolved to more than one partition (FATAL)
    PartitionViolation,
    /// Transient poll failure
    PollFailed,
    /// Offset commit failed
    CommitFailed,
    /// Committed offset did not advance past the previous commit
    CommitRegression,
    /// A role change or restart request failed without stopping the loop
    CommandFailed,
    /// Consumer stopped on a fatal error (FATAL)
    ConsumerFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConsumerStart => "CONSUMER_START",
            Event::RoleTransition => "ROLE_TRANSITION",
            Event::ConsumerRestart => "CONSUMER_RESTART",
            Event::ProcessingKeySeeded => "PROCESSING_KEY_SEEDED",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",

            Event::SnapshotRestored => "SNAPSHOT_RESTORED",
            Event::PeriodicSnapshot => "PERIODIC_SNAPSHOT",

            Event::ControlApplied => "CONTROL_APPLIED",
            Event::ControlSkipped => "CONTROL_SKIPPED",
            Event::ControlGap => "CONTROL_GAP",
            Event::EventApplied => "EVENT_APPLIED",
            Event::ControlPublished => "CONTROL_PUBLISHED",
            Event::BufferState => "BUFFER_STATE",

            Event::LeaderIdlePeek => "LEADER_IDLE_PEEK",
            Event::LeaderSupersededSuspected => "LEADER_SUPERSEDED_SUSPECTED",
            Event::PartitionViolation => "PARTITION_VIOLATION",
            Event::PollFailed => "POLL_FAILED",
            Event::CommitFailed => "COMMIT_FAILED",
            Event::CommitRegression => "COMMIT_REGRESSION",
            Event::CommandFailed => "COMMAND_FAILED",
            Event::ConsumerFailed => "CONSUMER_FAILED",
        }
    }

    /// The severity this event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Event::ControlApplied
            | Event::ControlSkipped
            | Event::EventApplied
            | Event::ControlPublished
            | Event::LeaderIdlePeek => Severity::Trace,

            Event::ControlGap
            | Event::LeaderSupersededSuspected
            | Event::PollFailed
            | Event::CommitFailed
            | Event::CommitRegression
            | Event::CommandFailed => Severity::Warn,

            Event::PartitionViolation | Event::ConsumerFailed => Severity::Fatal,

            _ => Severity::Info,
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
