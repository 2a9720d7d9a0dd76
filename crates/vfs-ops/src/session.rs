//! A shared run context for a tree of operations: session-default policy,
//! cancellation, buffer pool, and the event log/observer fan-out every
//! operation records into.

use std::sync::{Arc, Mutex};

use crate::cancel::CancellationToken;
use crate::policy::Policy;
use crate::pool::BlockPool;
use crate::state::OperationState;

/// One recorded happening in an [`OperationSession`]'s event log.
#[derive(Debug, Clone)]
pub enum OperationEvent {
    /// An operation's [`OperationState`] changed.
    StateChanged(OperationState),
    /// Progress against an operation's estimated total.
    Progress {
        /// Units of work completed so far.
        done: i64,
        /// Estimated total units of work, or `-1` if unknown.
        total: i64,
    },
    /// An operation failed; the message is the error's `Display` text.
    Error(String),
}

/// Receives [`OperationEvent`]s as they are recorded, when a session's
/// policy has `dispatch_events` set.
///
/// Implementations must not block indefinitely: a slow observer stalls the
/// operation recording the event.
pub trait OperationObserver: Send + Sync {
    /// Called once per recorded event, in recording order.
    fn on_event(&self, event: &OperationEvent);
}

/// The shared context every operation in a run is constructed against:
/// session-default [`Policy`], a [`CancellationToken`] all of them share, a
/// [`BlockPool`] for file transfers, and an append-only event log.
pub struct OperationSession {
    policy: Policy,
    cancellation: CancellationToken,
    pool: BlockPool,
    progress_interval: u64,
    log: Mutex<Vec<OperationEvent>>,
    observers: Mutex<Vec<Arc<dyn OperationObserver>>>,
}

impl OperationSession {
    /// Builds a session with the given session-default policy and transfer
    /// buffer pool, reporting progress no more often than every
    /// `progress_interval` bytes transferred.
    #[must_use]
    pub fn new(policy: Policy, pool: BlockPool, progress_interval: u64) -> Self {
        Self {
            policy,
            cancellation: CancellationToken::new(),
            pool,
            progress_interval,
            log: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// The session-default policy; individual operations resolve their own
    /// [`crate::PolicyOverride`] against this.
    #[must_use]
    pub const fn policy(&self) -> &Policy {
        &self.policy
    }

    /// The cancellation token shared by every operation run against this
    /// session.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The transfer buffer pool shared by every `CopyFile` run against this
    /// session.
    #[must_use]
    pub const fn pool(&self) -> &BlockPool {
        &self.pool
    }

    /// The byte interval at which `CopyFile` dispatches a
    /// [`OperationEvent::Progress`].
    #[must_use]
    pub const fn progress_interval(&self) -> u64 {
        self.progress_interval
    }

    /// Subscribes `observer` to every future recorded event.
    pub fn subscribe(&self, observer: Arc<dyn OperationObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(observer);
    }

    /// Every event recorded so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<OperationEvent> {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Appends `event` to the log and, per `policy`, logs it through
    /// `tracing` and/or forwards it to subscribed observers.
    pub fn record(&self, policy: &Policy, event: OperationEvent) {
        if policy.log_events {
            log_event(&event);
        }
        if policy.dispatch_events {
            let observers = self
                .observers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for observer in observers.iter() {
                observer.on_event(&event);
            }
        }
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn log_event(event: &OperationEvent) {
    #[cfg(feature = "tracing")]
    match event {
        OperationEvent::StateChanged(state) => tracing::debug!(state = ?state, "operation state changed"),
        OperationEvent::Progress { done, total } => tracing::trace!(done, total, "operation progress"),
        OperationEvent::Error(message) => tracing::warn!(message = %message, "operation error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct Recording(StdMutex<Vec<String>>);

    impl OperationObserver for Recording {
        fn on_event(&self, event: &OperationEvent) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{event:?}"));
        }
    }

    #[test]
    fn record_appends_to_log_and_notifies_observers() {
        let session = OperationSession::new(Policy::session_default(), BlockPool::new(16, 1), 0);
        let recording = Arc::new(Recording(StdMutex::new(Vec::new())));
        session.subscribe(recording.clone());
        session.record(session.policy(), OperationEvent::StateChanged(OperationState::Running));
        assert_eq!(session.events().len(), 1);
        assert_eq!(recording.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn record_skips_dispatch_when_policy_disables_it() {
        let mut policy = Policy::session_default();
        policy.dispatch_events = false;
        let session = OperationSession::new(policy, BlockPool::new(16, 1), 0);
        let recording = Arc::new(Recording(StdMutex::new(Vec::new())));
        session.subscribe(recording.clone());
        session.record(session.policy(), OperationEvent::StateChanged(OperationState::Running));
        assert!(recording.0.lock().unwrap().is_empty());
        assert_eq!(session.events().len(), 1);
    }
}
