//! Dual-Stream Consumer Loop
//!
//! One thread owns both subscriptions and applies one record at a time:
//! - Leader: poll events, apply, publish a control message, commit
//! - Replica: follow control messages, replay the matching events
//!
//! Every applied record is committed on its own stream (`offset + 1`)
//! before the next one is touched, so a crash redelivers at most the
//! records that were never applied.
//!
//! Blocking polls are the only suspension points. They are bounded by the
//! configured timeout and interrupted by wakeups on shutdown or when a
//! command arrives.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::assignment::{assign_stream, seek_or_committed, single_partition};
use super::buffer::RecordBuffer;
use super::config::ReplicationConfig;
use super::errors::{ReplicationError, ReplicationResult};
use super::handle::{Command, ConsumerHandle, RunningConsumer, SharedState};
use super::offsets::{ControlOrder, OffsetTracker};
use super::role::{PolledTarget, Role, RoleState, RoleTransition};
use super::snapshot::SnapshotCoordinator;
use crate::control::{ControlMessage, Item};
use crate::handler::ProcessingHandler;
use crate::observability::{log_event, Event, ReplicationMetrics};
use crate::stream::{ClientFactory, OffsetMap, Producer, Record, StreamClient, TopicPartition};

/// A stream client with the single partition it reads
struct Subscription<C> {
    client: C,
    partition: TopicPartition,
}

/// Outcome of one poll
enum Polled {
    Records(Vec<Record>),
    Empty,
    /// Wakeup or transient failure: nothing to apply this cycle
    Interrupted,
}

fn poll_subscription<C: StreamClient>(
    subscription: &mut Subscription<C>,
    timeout: Duration,
    metrics: &ReplicationMetrics,
) -> ReplicationResult<Polled> {
    match subscription.client.poll(timeout) {
        Ok(records) if records.is_empty() => Ok(Polled::Empty),
        Ok(records) => Ok(Polled::Records(records)),
        Err(e) if e.is_wakeup() => Ok(Polled::Interrupted),
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            metrics.increment_poll_failures();
            log_event(
                Event::PollFailed,
                &[
                    ("partition", &subscription.partition.to_string()),
                    ("reason", &e.to_string()),
                ],
            );
            Ok(Polled::Interrupted)
        }
    }
}

/// Commit `record.offset + 1` on the record's own partition.
///
/// A failed commit is logged and the loop continues: the record is
/// redelivered after a crash, which at-least-once delivery allows.
fn commit_record<C: StreamClient>(
    client: &mut C,
    record: &Record,
    offsets: &mut OffsetTracker,
    metrics: &ReplicationMetrics,
) -> ReplicationResult<()> {
    let partition = record.topic_partition();
    let next = record.next_offset();
    let mut commit = OffsetMap::new();
    commit.insert(partition.clone(), next);
    offsets.record_consumed(&partition, next);

    match client.commit_sync(&commit) {
        Ok(()) => {
            metrics.increment_commits();
            if !offsets.record_commit(&partition, next) {
                log_event(
                    Event::CommitRegression,
                    &[
                        ("partition", &partition.to_string()),
                        ("offset", &next.to_string()),
                    ],
                );
            }
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            metrics.increment_commit_failures();
            log_event(
                Event::CommitFailed,
                &[
                    ("partition", &partition.to_string()),
                    ("offset", &next.to_string()),
                    ("reason", &e.to_string()),
                ],
            );
            Ok(())
        }
    }
}

fn decode_control(record: &Record) -> ReplicationResult<ControlMessage> {
    ControlMessage::decode(&record.value).map_err(|e| ReplicationError::Codec {
        offset: record.offset,
        message: e.to_string(),
    })
}

/// Leader/replica consumer of the events and control streams
pub struct ReplicationConsumer<F: ClientFactory, H, P> {
    config: ReplicationConfig,
    factory: F,
    handler: H,
    producer: P,
    snapshots: SnapshotCoordinator,
    events: Option<Subscription<F::Client>>,
    control: Option<Subscription<F::Client>>,
    events_buffer: RecordBuffer,
    control_buffer: RecordBuffer,
    roles: RoleState,
    offsets: OffsetTracker,
    metrics: Arc<ReplicationMetrics>,
    shared: Arc<SharedState>,
    commands: Receiver<Command>,
    command_tx: Sender<Command>,
    superseded_suspected: bool,
    /// Events offset of the last decision published before this leader
    /// started; events up to it are applied without publishing.
    decided_through: Option<i64>,
    closed: bool,
}

impl<F, H, P> ReplicationConsumer<F, H, P>
where
    F: ClientFactory,
    H: ProcessingHandler,
    P: Producer,
{
    /// Create a consumer. Nothing is consumed until a serving role is
    /// set through `update_status`.
    pub fn new(
        config: ReplicationConfig,
        factory: F,
        handler: H,
        producer: P,
        snapshots: SnapshotCoordinator,
    ) -> ReplicationResult<Self> {
        config.validate()?;
        let (command_tx, commands) = mpsc::channel();
        Ok(Self {
            config,
            factory,
            handler,
            producer,
            snapshots,
            events: None,
            control: None,
            events_buffer: RecordBuffer::new(),
            control_buffer: RecordBuffer::new(),
            roles: RoleState::new(),
            offsets: OffsetTracker::new(),
            metrics: Arc::new(ReplicationMetrics::new()),
            shared: Arc::new(SharedState::default()),
            commands,
            command_tx,
            superseded_suspected: false,
            decided_through: None,
            closed: false,
        })
    }

    /// Handle for other threads: role changes, restart, stop.
    pub fn handle(&self) -> ConsumerHandle {
        ConsumerHandle::new(Arc::clone(&self.shared), self.command_tx.clone())
    }

    pub fn metrics(&self) -> Arc<ReplicationMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Last requested role.
    pub fn role(&self) -> Role {
        self.roles.role()
    }

    /// Role the running subscriptions serve, `None` when not consuming.
    pub fn serving(&self) -> Option<Role> {
        self.roles.serving()
    }

    pub fn is_started(&self) -> bool {
        self.roles.is_started()
    }

    pub fn target(&self) -> PolledTarget {
        self.roles.target()
    }

    pub fn processing_key(&self) -> Option<&str> {
        self.offsets.processing_key()
    }

    pub fn offsets(&self) -> &OffsetTracker {
        &self.offsets
    }

    /// Polled events not yet applied, oldest first.
    pub fn pending_events(&self) -> Vec<Record> {
        self.events_buffer
            .peek_batch(self.events_buffer.remaining())
            .cloned()
            .collect()
    }

    /// Polled control records not yet applied, oldest first.
    pub fn pending_controls(&self) -> Vec<Record> {
        self.control_buffer
            .peek_batch(self.control_buffer.remaining())
            .cloned()
            .collect()
    }

    /// True once an idle leader saw the control stream grow without it.
    pub fn superseded_suspected(&self) -> bool {
        self.superseded_suspected
    }

    // ===================================================================
    // Role transitions
    // ===================================================================

    /// Move to `requested`.
    ///
    /// The first serving role bootstraps the node (on-demand snapshot for
    /// a replica) and starts consuming. A later change of serving role
    /// rebuilds both subscriptions and reseeks from tracked offsets.
    /// `BecomingLeader` keeps whatever is running.
    pub fn update_status(&mut self, requested: Role) -> ReplicationResult<()> {
        if self.closed {
            return Err(ReplicationError::LoopTerminated);
        }
        match self.roles.request(requested) {
            RoleTransition::Hold => {
                log_event(
                    Event::RoleTransition,
                    &[("to", requested.as_str()), ("action", "hold")],
                );
                Ok(())
            }
            RoleTransition::Unchanged => Ok(()),
            RoleTransition::Bootstrap(role) => {
                if role == Role::Replica {
                    self.snapshots
                        .bootstrap(&self.config, &mut self.producer, &mut self.handler)?;
                }
                self.enable(role)
            }
            RoleTransition::Restart { from, to } => {
                log_event(
                    Event::RoleTransition,
                    &[("from", from.as_str()), ("to", to.as_str())],
                );
                self.rebuild(to, "role change")
            }
        }
    }

    /// Reload the latest persisted snapshot and reseek both streams to
    /// its offset instead of the tracked offsets.
    pub fn restart_consumer(&mut self) -> ReplicationResult<()> {
        let role = self.roles.serving().ok_or(ReplicationError::NotStarted)?;
        self.snapshots
            .restore_latest(&self.config, &mut self.handler)?;
        self.offsets.reset();
        self.rebuild(role, "forced restart")
    }

    fn rebuild(&mut self, role: Role, reason: &str) -> ReplicationResult<()> {
        self.roles.suspend();
        self.close_subscriptions();
        self.events_buffer.clear();
        self.control_buffer.clear();
        self.metrics.increment_restarts();
        log_event(
            Event::ConsumerRestart,
            &[("role", role.as_str()), ("reason", reason)],
        );
        self.enable(role)
    }

    fn close_subscriptions(&mut self) {
        self.shared.set_wakers(Vec::new());
        for mut subscription in [self.events.take(), self.control.take()]
            .into_iter()
            .flatten()
        {
            subscription.client.close();
        }
    }

    /// Build subscriptions for `role`, seek them and start consuming.
    fn enable(&mut self, role: Role) -> ReplicationResult<()> {
        let mut events_client = self.factory.create(&self.config.events_group())?;
        let events_partition = assign_stream(&mut events_client, &self.config.events_topic)?;
        let mut control_client = self.factory.create(&self.config.control_group())?;
        let control_partition = single_partition(&mut control_client, &self.config.control_topic)?;

        self.shared
            .set_wakers(vec![events_client.waker(), control_client.waker()]);
        self.events = Some(Subscription {
            client: events_client,
            partition: events_partition,
        });
        self.control = Some(Subscription {
            client: control_client,
            partition: control_partition,
        });

        let seeded_event = self.set_last_processed_key(role)?;

        let (events_seek, control_seek) = match self.snapshots.take_pending_seek() {
            Some(offset) => (Some(offset), Some(offset)),
            None => (
                self.offsets.events_seek_offset(),
                self.offsets.control_seek_offset(),
            ),
        };
        self.decided_through = match role {
            Role::Leader => seeded_event,
            _ => None,
        };

        let events = self.events.as_mut().ok_or(ReplicationError::NotStarted)?;
        let events_position =
            seek_or_committed(&mut events.client, &events.partition, events_seek)?;

        let control = self.control.as_mut().ok_or(ReplicationError::NotStarted)?;
        let control_position = if role == Role::Replica {
            control
                .client
                .assign(std::slice::from_ref(&control.partition))?;
            Some(seek_or_committed(
                &mut control.client,
                &control.partition,
                control_seek,
            )?)
        } else {
            // The leader only reads the control tail
            control.client.assign(&[])?;
            None
        };

        let target = match (role, seeded_event) {
            (Role::Leader, _) => PolledTarget::Events,
            // The seeded decision's event is still ahead: replay up to it
            (_, Some(event_offset)) if events_position <= event_offset => PolledTarget::Events,
            _ => PolledTarget::Control,
        };
        self.roles.start_serving(role, target);
        self.superseded_suspected = false;

        let events_position = events_position.to_string();
        let control_position = control_position.map_or_else(|| "-".to_string(), |p| p.to_string());
        log_event(
            Event::ConsumerStart,
            &[
                ("role", role.as_str()),
                ("target", target.as_str()),
                ("events_position", &events_position),
                ("control_position", &control_position),
            ],
        );
        Ok(())
    }

    /// Seed the processing position from the last control message.
    ///
    /// Only a node without a position and without a pending snapshot seek
    /// is seeded. Always records the control tail as the baseline for the
    /// leader's idle check. Returns the events offset of the seeded
    /// decision.
    fn set_last_processed_key(&mut self, role: Role) -> ReplicationResult<Option<i64>> {
        let control = self.control.as_mut().ok_or(ReplicationError::NotStarted)?;
        let end = control.client.end_offset(&control.partition)?;
        self.offsets.set_control_baseline(end);

        if end == 0 || self.offsets.processing().is_some() || self.snapshots.pending_seek().is_some()
        {
            return Ok(None);
        }

        control
            .client
            .assign(std::slice::from_ref(&control.partition))?;
        control.client.seek(&control.partition, end - 1)?;
        let polled = control.client.poll(self.config.poll_timeout());
        if role != Role::Replica {
            control.client.assign(&[])?;
        }

        let record = match polled {
            Ok(records) => records.into_iter().find(|r| r.offset == end - 1),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                if !e.is_wakeup() {
                    log_event(
                        Event::PollFailed,
                        &[
                            ("partition", &control.partition.to_string()),
                            ("reason", &e.to_string()),
                        ],
                    );
                }
                None
            }
        };
        let Some(record) = record else {
            return Ok(None);
        };

        let message = decode_control(&record)?;
        let control_offset = record.offset.to_string();
        let event_offset = message.offset.to_string();
        log_event(
            Event::ProcessingKeySeeded,
            &[
                ("key", message.id.as_str()),
                ("control_offset", &control_offset),
                ("event_offset", &event_offset),
            ],
        );
        self.offsets.set_processing(message.id, record.offset);
        Ok(Some(message.offset))
    }

    // ===================================================================
    // Consumption
    // ===================================================================

    /// Run one cycle for the serving role. No-op when not consuming.
    pub fn consume_once(&mut self) -> ReplicationResult<()> {
        match self.roles.serving() {
            None | Some(Role::BecomingLeader) => Ok(()),
            Some(Role::Leader) => self.lead_once(),
            Some(Role::Replica) => match self.roles.target() {
                PolledTarget::Events => self.replicate_events_once(),
                PolledTarget::Control => self.replicate_control_once(),
            },
        }
    }

    fn log_buffer(&self, stream: PolledTarget, remaining: usize) {
        if self.config.under_test {
            log_event(
                Event::BufferState,
                &[
                    ("stream", stream.as_str()),
                    ("remaining", &remaining.to_string()),
                ],
            );
        }
    }

    fn lead_once(&mut self) -> ReplicationResult<()> {
        if !self.events_buffer.is_empty() {
            self.drain_as_leader()?;
            if !self.events_buffer.is_empty() {
                return Ok(());
            }
        }
        if self.shared.is_stopped() {
            return Ok(());
        }

        let timeout = self.config.poll_timeout();
        let events = self.events.as_mut().ok_or(ReplicationError::NotStarted)?;
        match poll_subscription(events, timeout, &self.metrics)? {
            Polled::Records(records) => {
                self.events_buffer.fill(records);
                self.drain_as_leader()
            }
            Polled::Empty => self.peek_control(),
            Polled::Interrupted => Ok(()),
        }
    }

    fn drain_as_leader(&mut self) -> ReplicationResult<()> {
        self.log_buffer(PolledTarget::Events, self.events_buffer.remaining());
        while !self.shared.is_stopped() {
            let Some(record) = self.events_buffer.peek().cloned() else {
                break;
            };
            self.process_as_leader(&record)?;
            self.events_buffer.consume_one();
        }
        Ok(())
    }

    fn process_as_leader(&mut self, record: &Record) -> ReplicationResult<()> {
        if self.decided_through.is_some_and(|last| record.offset <= last) {
            return self.replay_decided(record);
        }
        let item = Item::from_record(record);
        let side_effects = if self.snapshots.periodic_due(&self.config) {
            let side_effects = self.handler.process_with_snapshot(&item, Role::Leader)?;
            self.metrics.increment_snapshots();
            log_event(
                Event::PeriodicSnapshot,
                &[("key", item.key.as_str()), ("offset", &record.offset.to_string())],
            );
            side_effects
        } else {
            self.handler.process(&item, Role::Leader)?
        };

        let message = ControlMessage::new(item.key.clone(), record.offset, side_effects);
        let payload = message.encode().map_err(|e| ReplicationError::Codec {
            offset: record.offset,
            message: e.to_string(),
        })?;
        let control_offset = self
            .producer
            .send(&self.config.control_topic, &item.key, payload)
            .map_err(ReplicationError::Publish)?;

        self.offsets.set_processing(item.key, control_offset);
        self.offsets.record_published(control_offset);
        self.offsets.mark_event_processed(record.offset);
        self.metrics.increment_events_applied();
        self.metrics.increment_controls_published();
        log_event(
            Event::ControlPublished,
            &[
                ("key", record.key.as_str()),
                ("event_offset", &record.offset.to_string()),
                ("control_offset", &control_offset.to_string()),
            ],
        );

        let events = self.events.as_mut().ok_or(ReplicationError::NotStarted)?;
        commit_record(&mut events.client, record, &mut self.offsets, &self.metrics)
    }

    /// Apply an event a previous leader already decided.
    ///
    /// The engine catches up on the history; nothing is published.
    fn replay_decided(&mut self, record: &Record) -> ReplicationResult<()> {
        let item = Item::from_record(record);
        self.handler.process(&item, Role::Replica)?;
        self.offsets.mark_event_processed(record.offset);
        self.metrics.increment_events_applied();
        log_event(
            Event::EventApplied,
            &[
                ("key", record.key.as_str()),
                ("offset", &record.offset.to_string()),
                ("decided", "true"),
            ],
        );

        let events = self.events.as_mut().ok_or(ReplicationError::NotStarted)?;
        commit_record(&mut events.client, record, &mut self.offsets, &self.metrics)
    }

    /// Idle leader: compare the control tail with what this node wrote.
    ///
    /// Read-only. Growth nobody here published means another node is
    /// writing decisions; it is flagged and logged, never acted on.
    fn peek_control(&mut self) -> ReplicationResult<()> {
        let control = self.control.as_mut().ok_or(ReplicationError::NotStarted)?;
        let end = match control.client.end_offset(&control.partition) {
            Ok(end) => end,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(_) => return Ok(()),
        };
        let Some(expected) = self.offsets.expected_control_end() else {
            return Ok(());
        };

        let end_str = end.to_string();
        let expected_str = expected.to_string();
        log_event(
            Event::LeaderIdlePeek,
            &[("control_end", &end_str), ("expected_end", &expected_str)],
        );
        if end > expected && !self.superseded_suspected {
            self.superseded_suspected = true;
            log_event(
                Event::LeaderSupersededSuspected,
                &[("control_end", &end_str), ("expected_end", &expected_str)],
            );
        }
        Ok(())
    }

    fn replicate_events_once(&mut self) -> ReplicationResult<()> {
        if !self.events_buffer.is_empty() {
            self.drain_events_as_replica()?;
        }
        if !self.events_buffer.is_empty()
            || self.roles.target() != PolledTarget::Events
            || self.shared.is_stopped()
        {
            return Ok(());
        }

        let timeout = self.config.poll_timeout();
        let events = self.events.as_mut().ok_or(ReplicationError::NotStarted)?;
        match poll_subscription(events, timeout, &self.metrics)? {
            Polled::Records(records) => {
                self.events_buffer.fill(records);
                self.drain_events_as_replica()
            }
            Polled::Empty => {
                self.roles.poll_control();
                Ok(())
            }
            Polled::Interrupted => Ok(()),
        }
    }

    /// Apply buffered events until the processing key comes up.
    fn drain_events_as_replica(&mut self) -> ReplicationResult<()> {
        self.log_buffer(PolledTarget::Events, self.events_buffer.remaining());
        while !self.shared.is_stopped() && self.roles.target() == PolledTarget::Events {
            let Some(record) = self.events_buffer.peek().cloned() else {
                break;
            };
            self.apply_event_as_replica(&record)?;
            self.events_buffer.consume_one();
        }
        Ok(())
    }

    fn apply_event_as_replica(&mut self, record: &Record) -> ReplicationResult<()> {
        let item = Item::from_record(record);
        let matched = self.offsets.processing_key() == Some(record.key.as_str());

        // Side effects of the item belong to the leader
        self.handler.process(&item, Role::Replica)?;
        self.offsets.mark_event_processed(record.offset);
        self.metrics.increment_events_applied();
        log_event(
            Event::EventApplied,
            &[
                ("key", record.key.as_str()),
                ("offset", &record.offset.to_string()),
                ("matched", if matched { "true" } else { "false" }),
            ],
        );

        let events = self.events.as_mut().ok_or(ReplicationError::NotStarted)?;
        commit_record(&mut events.client, record, &mut self.offsets, &self.metrics)?;

        if matched {
            self.roles.poll_control();
        }
        Ok(())
    }

    fn replicate_control_once(&mut self) -> ReplicationResult<()> {
        if !self.control_buffer.is_empty() {
            self.drain_control_as_replica()?;
        }
        if !self.control_buffer.is_empty()
            || self.roles.target() != PolledTarget::Control
            || self.shared.is_stopped()
        {
            return Ok(());
        }

        let timeout = self.config.poll_timeout();
        let control = self.control.as_mut().ok_or(ReplicationError::NotStarted)?;
        match poll_subscription(control, timeout, &self.metrics)? {
            Polled::Records(records) => {
                self.control_buffer.fill(records);
                self.drain_control_as_replica()
            }
            Polled::Empty | Polled::Interrupted => Ok(()),
        }
    }

    /// Apply buffered control records until one points at an event.
    fn drain_control_as_replica(&mut self) -> ReplicationResult<()> {
        self.log_buffer(PolledTarget::Control, self.control_buffer.remaining());
        while !self.shared.is_stopped() && self.roles.target() == PolledTarget::Control {
            let Some(record) = self.control_buffer.peek().cloned() else {
                break;
            };
            self.apply_control_as_replica(&record)?;
            self.control_buffer.consume_one();
        }
        Ok(())
    }

    fn apply_control_as_replica(&mut self, record: &Record) -> ReplicationResult<()> {
        let offset = record.offset.to_string();
        match self.offsets.classify_control(record.offset) {
            ControlOrder::AlreadyApplied => {
                log_event(
                    Event::ControlSkipped,
                    &[("key", record.key.as_str()), ("offset", &offset)],
                );
                return self.commit_control(record);
            }
            ControlOrder::Gap { expected } => {
                log_event(
                    Event::ControlGap,
                    &[("expected", &expected.to_string()), ("offset", &offset)],
                );
            }
            ControlOrder::First | ControlOrder::Next => {}
        }

        let message = decode_control(record)?;
        self.handler
            .process_side_effects_on_replica(&message.side_effects)?;
        log_event(
            Event::ControlApplied,
            &[("key", message.id.as_str()), ("offset", &offset)],
        );
        self.offsets.set_processing(message.id, record.offset);
        self.offsets.mark_control_processed(record.offset);
        self.metrics.increment_controls_applied();

        self.commit_control(record)?;
        self.roles.poll_events();
        Ok(())
    }

    fn commit_control(&mut self, record: &Record) -> ReplicationResult<()> {
        let control = self.control.as_mut().ok_or(ReplicationError::NotStarted)?;
        commit_record(&mut control.client, record, &mut self.offsets, &self.metrics)
    }

    // ===================================================================
    // Loop and shutdown
    // ===================================================================

    /// Consume until stopped, then flush commits and close.
    ///
    /// Returns the fatal error that ended the loop, if any.
    pub fn run(&mut self) -> ReplicationResult<()> {
        let outcome = self.run_until_stopped();
        if let Err(e) = &outcome {
            log_event(Event::ConsumerFailed, &[("error", &e.to_string())]);
        }
        let stopped = self.stop();
        outcome.and(stopped)
    }

    fn run_until_stopped(&mut self) -> ReplicationResult<()> {
        while !self.shared.is_stopped() {
            while let Ok(command) = self.commands.try_recv() {
                self.execute(command)?;
            }

            if !self.roles.is_started() {
                match self.commands.recv_timeout(self.config.poll_timeout()) {
                    Ok(command) => self.execute(command)?,
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
                }
                continue;
            }

            match self.consume_once() {
                Ok(()) => {}
                Err(e) if e.is_wakeup() => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => log_event(Event::PollFailed, &[("reason", &e.to_string())]),
            }
        }
        Ok(())
    }

    fn execute(&mut self, command: Command) -> ReplicationResult<()> {
        let result = match command {
            Command::UpdateStatus(role) => self.update_status(role),
            Command::RestartConsumer => self.restart_consumer(),
            Command::Stop => {
                self.shared.request_stop();
                Ok(())
            }
        };
        match result {
            Err(e) if !e.is_fatal() => {
                log_event(
                    Event::CommandFailed,
                    &[("command", &format!("{:?}", command)), ("reason", &e.to_string())],
                );
                Ok(())
            }
            other => other,
        }
    }

    /// Stop consuming: final commit of both streams, close them, stop the
    /// handler. Idempotent.
    ///
    /// Commit failures are logged and never prevent the close.
    pub fn stop(&mut self) -> ReplicationResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.shared.request_stop();
        log_event(Event::ShutdownStart, &[]);

        self.shared.set_wakers(Vec::new());
        for mut subscription in [self.events.take(), self.control.take()]
            .into_iter()
            .flatten()
        {
            let consumed = self.offsets.consumed_for_topic(&subscription.partition.topic);
            if !consumed.is_empty() {
                if let Err(e) = subscription.client.commit_sync(&consumed) {
                    self.metrics.increment_commit_failures();
                    log_event(
                        Event::CommitFailed,
                        &[
                            ("partition", &subscription.partition.to_string()),
                            ("reason", &e.to_string()),
                        ],
                    );
                }
            }
            subscription.client.close();
        }

        self.roles.suspend();
        self.events_buffer.clear();
        self.control_buffer.clear();
        self.handler.stop();
        log_event(Event::ShutdownComplete, &[("metrics", &self.metrics.to_json())]);
        Ok(())
    }
}

impl<F, H, P> ReplicationConsumer<F, H, P>
where
    F: ClientFactory + 'static,
    F::Client: 'static,
    H: ProcessingHandler + 'static,
    P: Producer + 'static,
{
    /// Run the loop on a dedicated thread.
    pub fn spawn(self) -> ReplicationResult<RunningConsumer> {
        let handle = self.handle();
        let thread = thread::Builder::new()
            .name("aeroha-consumer".to_string())
            .spawn(move || {
                let mut consumer = self;
                consumer.run()
            })
            .map_err(ReplicationError::Spawn)?;
        Ok(RunningConsumer::new(handle, thread))
    }
}
