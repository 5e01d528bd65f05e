//! Cross-thread control of a consumer loop
//!
//! The loop thread owns every piece of replication state. Other threads
//! reach it only through:
//! - a stop flag plus wakeups for blocking polls (shutdown)
//! - a command channel (role changes, forced restart)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use super::errors::{ReplicationError, ReplicationResult};
use super::role::Role;
use crate::stream::Wakeup;

/// Requests executed by the loop thread between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    UpdateStatus(Role),
    RestartConsumer,
    /// Ends an idle wait; the loop exits on the stop flag
    Stop,
}

/// State visible to both the loop and its handles
#[derive(Default)]
pub(crate) struct SharedState {
    stopped: AtomicBool,
    wakers: Mutex<Vec<Arc<dyn Wakeup>>>,
}

impl SharedState {
    pub(crate) fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Replace the wakers with those of freshly built clients.
    pub(crate) fn set_wakers(&self, wakers: Vec<Arc<dyn Wakeup>>) {
        *self.wakers.lock().unwrap_or_else(|p| p.into_inner()) = wakers;
    }

    /// Interrupt any blocking poll of the loop.
    pub(crate) fn wake_all(&self) {
        let wakers = self.wakers.lock().unwrap_or_else(|p| p.into_inner());
        for waker in wakers.iter() {
            waker.wakeup();
        }
    }
}

/// Cloneable handle to a consumer loop
#[derive(Clone)]
pub struct ConsumerHandle {
    shared: Arc<SharedState>,
    commands: Sender<Command>,
}

impl ConsumerHandle {
    pub(crate) fn new(shared: Arc<SharedState>, commands: Sender<Command>) -> Self {
        Self { shared, commands }
    }

    fn send(&self, command: Command) -> ReplicationResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ReplicationError::LoopTerminated)?;
        // Cut the current poll short so the command runs promptly
        self.shared.wake_all();
        Ok(())
    }

    /// Ask the loop to move to `role`.
    pub fn update_status(&self, role: Role) -> ReplicationResult<()> {
        self.send(Command::UpdateStatus(role))
    }

    /// Ask the loop to reload the latest snapshot and rebuild its
    /// subscriptions.
    pub fn restart_consumer(&self) -> ReplicationResult<()> {
        self.send(Command::RestartConsumer)
    }

    /// Ask the loop to stop after the record in progress.
    pub fn stop(&self) {
        self.shared.request_stop();
        self.shared.wake_all();
        // A loop that is not consuming waits on the channel, not on a poll.
        // The loop may already be gone.
        let _ = self.commands.send(Command::Stop);
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }
}

/// A consumer loop running on its own thread
pub struct RunningConsumer {
    handle: ConsumerHandle,
    thread: JoinHandle<ReplicationResult<()>>,
}

impl RunningConsumer {
    pub(crate) fn new(handle: ConsumerHandle, thread: JoinHandle<ReplicationResult<()>>) -> Self {
        Self { handle, thread }
    }

    pub fn handle(&self) -> &ConsumerHandle {
        &self.handle
    }

    /// Wait for the loop to exit and return its outcome.
    pub fn join(self) -> ReplicationResult<()> {
        self.thread
            .join()
            .unwrap_or(Err(ReplicationError::LoopTerminated))
    }

    /// Stop the loop and wait for it: final commits, streams closed.
    pub fn shutdown(self) -> ReplicationResult<()> {
        self.handle.stop();
        self.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[derive(Default)]
    struct CountingWaker(AtomicUsize);

    impl Wakeup for CountingWaker {
        fn wakeup(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_stop_sets_flag_and_wakes() {
        let shared = Arc::new(SharedState::default());
        let waker = Arc::new(CountingWaker::default());
        shared.set_wakers(vec![waker.clone(), waker.clone()]);
        let (tx, _rx) = mpsc::channel();
        let handle = ConsumerHandle::new(shared.clone(), tx);

        handle.stop();
        assert!(handle.is_stopped());
        assert!(shared.is_stopped());
        assert_eq!(waker.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_commands_reach_the_loop() {
        let shared = Arc::new(SharedState::default());
        let (tx, rx) = mpsc::channel();
        let handle = ConsumerHandle::new(shared, tx);

        handle.update_status(Role::Leader).unwrap();
        handle.restart_consumer().unwrap();
        assert_eq!(rx.recv().unwrap(), Command::UpdateStatus(Role::Leader));
        assert_eq!(rx.recv().unwrap(), Command::RestartConsumer);
    }

    #[test]
    fn test_stop_reaches_an_idle_loop() {
        let shared = Arc::new(SharedState::default());
        let (tx, rx) = mpsc::channel();
        let handle = ConsumerHandle::new(shared, tx);

        handle.stop();
        assert_eq!(rx.recv().unwrap(), Command::Stop);
    }

    #[test]
    fn test_send_after_loop_exit_fails() {
        let shared = Arc::new(SharedState::default());
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let handle = ConsumerHandle::new(shared, tx);

        assert!(matches!(
            handle.update_status(Role::Replica),
            Err(ReplicationError::LoopTerminated)
        ));
    }
}
