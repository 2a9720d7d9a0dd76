//! Dispatcher abstractions: how a subscription's merged event stream reaches
//! its caller.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use vfs_error::VfsResult;
use vfs_model::EventEnvelope;

/// A unit delivered to a [`Dispatcher`]: either a spliced event or the
/// one-time signal that a subscription has finished disposing.
#[derive(Debug)]
pub enum Notification {
    /// A change event, already rewritten into the subscribing filesystem's
    /// namespace.
    Event(EventEnvelope),
    /// Emitted exactly once, after every child observer for a subscription
    /// has stopped and the subscription has been disposed.
    Completed,
}

/// Receives the merged, rewritten event stream for one subscription.
///
/// Implementations must not block indefinitely: [`InlineDispatcher`] runs its
/// sink on whichever thread calls [`Dispatcher::dispatch`] (a child adapter
/// thread for spliced events, the subscribing thread for the synthetic
/// `Start`); [`TaskDispatcher`] hands the notification to a single background
/// worker instead, so a slow sink never stalls a child adapter.
pub trait Dispatcher: Send + Sync {
    /// Delivers one notification.
    fn dispatch(&self, notification: Notification);
}

/// Runs its sink synchronously on the dispatching thread.
///
/// A sink error is recorded rather than propagated, since the thread that
/// produced the notification has nowhere to return it to; call
/// [`InlineDispatcher::errors`] to inspect what went wrong.
pub struct InlineDispatcher<F> {
    sink: F,
    errors: Mutex<Vec<String>>,
}

impl<F> InlineDispatcher<F>
where
    F: Fn(Notification) -> VfsResult<()> + Send + Sync,
{
    /// Wraps `sink`, called once per dispatched notification.
    #[must_use]
    pub fn new(sink: F) -> Self {
        Self {
            sink,
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Every sink error recorded so far, oldest first.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl<F> Dispatcher for InlineDispatcher<F>
where
    F: Fn(Notification) -> VfsResult<()> + Send + Sync,
{
    fn dispatch(&self, notification: Notification) {
        if let Err(err) = (self.sink)(notification) {
            self.errors
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(err.to_string());
        }
    }
}

/// Hands each notification to a single background worker thread, in delivery
/// order, so a slow or blocking sink never stalls the child adapter thread
/// that produced the event.
pub struct TaskDispatcher {
    sender: Option<crossbeam_channel::Sender<Notification>>,
    worker: Option<JoinHandle<()>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl TaskDispatcher {
    /// Spawns a worker thread that calls `sink` for every dispatched
    /// notification.
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(Notification) -> VfsResult<()> + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::unbounded::<Notification>();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let worker_errors = Arc::clone(&errors);
        let worker = thread::spawn(move || {
            for notification in receiver {
                if let Err(err) = sink(notification) {
                    worker_errors
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .push(err.to_string());
                }
            }
        });
        Self {
            sender: Some(sender),
            worker: Some(worker),
            errors,
        }
    }

    /// Every sink error recorded so far, oldest first.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Dispatcher for TaskDispatcher {
    fn dispatch(&self, notification: Notification) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(notification);
        }
    }
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        // Close the channel before joining, or the worker blocks forever
        // waiting for a sender that's never coming.
        self.sender.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;
    use vfs_model::{Event, ObserverId};

    fn sample_envelope() -> EventEnvelope {
        EventEnvelope::new(Event::Start, ObserverId(1), UNIX_EPOCH)
    }

    #[test]
    fn inline_dispatcher_runs_sink_on_calling_thread() {
        let seen = Arc::new(Mutex::new(0u32));
        let sink_seen = Arc::clone(&seen);
        let dispatcher = InlineDispatcher::new(move |_| {
            *sink_seen.lock().unwrap() += 1;
            Ok(())
        });
        dispatcher.dispatch(Notification::Event(sample_envelope()));
        assert_eq!(*seen.lock().unwrap(), 1);
        assert!(dispatcher.errors().is_empty());
    }

    #[test]
    fn inline_dispatcher_records_sink_errors() {
        let dispatcher = InlineDispatcher::new(|_| Err(vfs_error::VfsError::Cancelled));
        dispatcher.dispatch(Notification::Event(sample_envelope()));
        assert_eq!(dispatcher.errors(), vec!["cancelled".to_string()]);
    }

    #[test]
    fn task_dispatcher_delivers_asynchronously_and_joins_on_drop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let dispatcher = TaskDispatcher::new(move |n| {
            sink_seen.lock().unwrap().push(matches!(n, Notification::Completed));
            Ok(())
        });
        dispatcher.dispatch(Notification::Event(sample_envelope()));
        dispatcher.dispatch(Notification::Completed);
        drop(dispatcher);
        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }
}
