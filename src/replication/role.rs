//! Role State Machine
//!
//! States:
//! - Replica: follows the control stream (default at startup)
//! - BecomingLeader: holding state, never starts consumption
//! - Leader: sole consumer of new events, publishes control messages
//!
//! Role changes are requested externally through `update_status`; this
//! module only decides what a request means for the consumer loop.

use std::fmt;

/// Node role, decided by an external election
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Sole node processing new events and publishing decisions
    Leader,
    /// Hot standby following the leader's decisions
    #[default]
    Replica,
    /// Transient: promotion in progress, consumption does not start
    BecomingLeader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Leader => "LEADER",
            Role::Replica => "REPLICA",
            Role::BecomingLeader => "BECOMING_LEADER",
        }
    }

    /// Check if this role may run the consumer loop.
    pub fn is_serving(&self) -> bool {
        matches!(self, Role::Leader | Role::Replica)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream drained by the next replica cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolledTarget {
    Events,
    #[default]
    Control,
}

impl PolledTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolledTarget::Events => "EVENTS",
            PolledTarget::Control => "CONTROL",
        }
    }
}

impl fmt::Display for PolledTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a role request means for the consumer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleTransition {
    /// BecomingLeader: keep whatever is running, start nothing
    Hold,
    /// Same role as before: nothing to do
    Unchanged,
    /// First serving role: one-time bootstrap, then start consuming
    Bootstrap(Role),
    /// Serving role changed on a running consumer: rebuild subscriptions
    Restart { from: Role, to: Role },
}

impl RoleTransition {
    /// Decide the transition for `requested`.
    ///
    /// `serving` is the role the running subscriptions were built for, or
    /// `None` before the first start.
    pub fn decide(serving: Option<Role>, requested: Role) -> Self {
        match (serving, requested) {
            (_, Role::BecomingLeader) => RoleTransition::Hold,
            (None, role) => RoleTransition::Bootstrap(role),
            (Some(from), to) if from == to => RoleTransition::Unchanged,
            (Some(from), to) => RoleTransition::Restart { from, to },
        }
    }
}

/// Role bookkeeping owned by the consumer loop
#[derive(Debug, Clone, Default)]
pub struct RoleState {
    /// Last requested role
    role: Role,
    /// Role the subscriptions are built for; `None` until started
    serving: Option<Role>,
    /// Replica cycle target
    target: PolledTarget,
}

impl RoleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request and decide what it means.
    pub fn request(&mut self, requested: Role) -> RoleTransition {
        self.role = requested;
        RoleTransition::decide(self.serving, requested)
    }

    /// Subscriptions are now built for `role`.
    pub fn start_serving(&mut self, role: Role, target: PolledTarget) {
        self.serving = Some(role);
        self.target = target;
    }

    /// Consumption suspended (subscriptions being rebuilt or closed).
    pub fn suspend(&mut self) {
        self.serving = None;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn serving(&self) -> Option<Role> {
        self.serving
    }

    pub fn is_started(&self) -> bool {
        self.serving.is_some()
    }

    pub fn target(&self) -> PolledTarget {
        self.target
    }

    pub fn poll_events(&mut self) {
        self.target = PolledTarget::Events;
    }

    pub fn poll_control(&mut self) {
        self.target = PolledTarget::Control;
    }
}
