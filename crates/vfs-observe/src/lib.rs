#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The observer network: glob-filtered change subscriptions layered over a
//! [`vfs_mount::MountTree`]. [`ObserverNetwork::subscribe`] fans a single
//! subscription out to every assignment whose mounted sub-tree intersects the
//! caller's [`GlobFilter`], splices each child back-end's events back into
//! the parent namespace, and delivers the merged stream through a
//! caller-chosen [`Dispatcher`].
//!
//! # Design
//!
//! A back-end's [`BackendSubscription`] is a pull-based channel, not a
//! callback, so each child back-end gets its own adapter thread: it blocks on
//! the child's event receiver (racing against a cancellation channel),
//! rewrites every incoming [`Event`]'s path(s) from the child's own namespace
//! into the parent filesystem's namespace via [`PathConverter`], and forwards
//! the result through the subscription's [`Dispatcher`]. Path conversion
//! failures drop the event rather than propagating an error, since a
//! left-behind child observer outliving a mount-tree reshape is expected, not
//! exceptional.
//!
//! [`Subscription`] is reference-counted disposal: dropping it (or calling
//! [`Subscription::dispose`] explicitly) cancels every child adapter thread,
//! delivers [`Notification::Completed`] to the dispatcher exactly once, and
//! removes the subscription from the network's registry. The "exactly once"
//! guarantee is enforced by a `completed_emitted` flag checked under
//! [`std::sync::atomic::Ordering::SeqCst`] by both the disposing thread and
//! whichever child adapter thread happens to be the last one to finish.
//!
//! # Invariants
//!
//! - Every subscription receives a synthetic [`Event::Start`] before any
//!   other event.
//! - Disposing a subscription emits [`Notification::Completed`] to its
//!   dispatcher exactly once, even if no child observer was ever attached.
//! - A child observer whose back-end does not advertise
//!   [`vfs_backend::BackendCapabilities::observe`] is skipped, not
//!   subscribed with an error.
//! - [`ObserverNetwork::notify_mount`]/[`ObserverNetwork::notify_unmount`]
//!   reach every live subscription whose filter intersects the affected
//!   path, not just ones created after the mount change; a subscription
//!   attached before a later `mount` call still sees that mount's `Mount`
//!   and synthesized `Create` events.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::SystemTime;

use dashmap::DashMap;
use vfs_backend::{Backend, BackendSubscription};
use vfs_error::{VfsError, VfsResult};
use vfs_model::{Event, EventEnvelope, MountAssignment, ObserverId};
use vfs_mount::{LiveAssignment, MountTree};
use vfs_options::OptionBag;
use vfs_path::{CaseSensitivity, GlobFilter, PathConverter, VPath};

mod dispatch;
mod splice;

pub use dispatch::{Dispatcher, InlineDispatcher, Notification, TaskDispatcher};

/// A glob-filtered observer network layered over a shared mount tree.
///
/// Cheap to clone: every clone shares the same subscription registry and
/// mount tree handle.
#[derive(Clone)]
pub struct ObserverNetwork {
    inner: Arc<NetworkInner>,
}

struct NetworkInner {
    tree: Arc<MountTree>,
    next_id: AtomicU64,
    subscriptions: DashMap<ObserverId, Arc<SubscriptionState>>,
}

struct SubscriptionState {
    dispose_requested: AtomicBool,
    completed_emitted: AtomicBool,
    child_observer_count: AtomicUsize,
    // Tagged with the mount path each sender's child adapter was attached
    // under, so a later `notify_unmount` can cancel only the adapters that
    // belong to the departing mount instead of every adapter this
    // subscription has ever attached.
    cancel_senders: Mutex<Vec<(VPath, crossbeam_channel::Sender<()>)>>,
    dispatcher: Arc<dyn Dispatcher>,
    filter: GlobFilter,
    option: OptionBag,
}

impl SubscriptionState {
    fn try_emit_completed(self: &Arc<Self>) {
        if self.dispose_requested.load(Ordering::SeqCst)
            && self.child_observer_count.load(Ordering::SeqCst) == 0
            && !self.completed_emitted.swap(true, Ordering::SeqCst)
        {
            self.dispatcher.dispatch(Notification::Completed);
        }
    }
}

impl ObserverNetwork {
    /// Builds a network over `tree`, sharing it with the composer that
    /// drives the same mount points.
    #[must_use]
    pub fn new(tree: Arc<MountTree>) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                tree,
                next_id: AtomicU64::new(1),
                subscriptions: DashMap::new(),
            }),
        }
    }

    /// Subscribes to changes under the paths matched by `filter`, dispatched
    /// through `dispatcher`.
    ///
    /// For every mounted assignment whose sub-tree intersects `filter`, and
    /// whose back-end advertises observation support, a child adapter thread
    /// is started against that back-end's own `observe` subscription. A
    /// synthetic [`Event::Start`] is dispatched before this call returns.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::OptionOperationNotSupported`] if `option` cannot
    /// be intersected with a candidate assignment's own option bag; this
    /// aborts the whole subscribe call rather than leaving a partial set of
    /// child observers running.
    pub fn subscribe(
        &self,
        filter: GlobFilter,
        dispatcher: Arc<dyn Dispatcher>,
        option: &OptionBag,
    ) -> VfsResult<Subscription> {
        let id = ObserverId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let state = Arc::new(SubscriptionState {
            dispose_requested: AtomicBool::new(false),
            completed_emitted: AtomicBool::new(false),
            child_observer_count: AtomicUsize::new(0),
            cancel_senders: Mutex::new(Vec::new()),
            dispatcher: Arc::clone(&dispatcher),
            filter: filter.clone(),
            option: option.clone(),
        });
        self.inner.subscriptions.insert(id, Arc::clone(&state));

        for mount_path in self.inner.tree.list_mountpoints() {
            if !filter.intersects_subtree(mount_path.as_str()) {
                continue;
            }
            let Some(resolved) = self.inner.tree.resolve(&mount_path) else {
                continue;
            };
            self.attach_assignments(&mount_path, &resolved.assignments, &filter, option, id, &dispatcher, &state)?;
        }

        dispatcher.dispatch(Notification::Event(EventEnvelope::new(Event::Start, id, SystemTime::now())));

        Ok(Subscription {
            id,
            state,
            network: self.clone(),
        })
    }

    /// Attaches a child observer, per `assignment`, for every assignment
    /// whose back-end advertises observation support, tagging each attached
    /// adapter with `mount_path` so a later [`ObserverNetwork::notify_unmount`]
    /// can cancel exactly the adapters that belong to that mount.
    ///
    /// Shared between [`ObserverNetwork::subscribe`] (attaching to mounts
    /// that already existed) and [`ObserverNetwork::notify_mount`] (attaching
    /// to a mount introduced after the subscription began).
    fn attach_assignments(
        &self,
        mount_path: &VPath,
        assignments: &[LiveAssignment],
        filter: &GlobFilter,
        option: &OptionBag,
        id: ObserverId,
        dispatcher: &Arc<dyn Dispatcher>,
        state: &Arc<SubscriptionState>,
    ) -> VfsResult<()> {
        for assignment in assignments {
            if !assignment.backend.capabilities().observe {
                continue;
            }
            let combined = option.intersect_with(&assignment.option)?;
            let child_filter = splice::restrict_filter(filter, mount_path, assignment.option.sub_path());
            let child_sub = match assignment.backend.observe(&child_filter, &combined) {
                Ok(sub) => sub,
                Err(VfsError::NotSupported) => continue,
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(mount = %mount_path, label = %assignment.label, error = %_err, "child observer subscribe failed");
                    continue;
                }
            };
            let converter = PathConverter::new(
                VPath::from(assignment.option.sub_path().unwrap_or("")),
                mount_path.clone(),
            )
            .with_case(self.inner.tree.case());
            spawn_child_adapter(
                child_sub,
                converter,
                id,
                Arc::clone(dispatcher),
                Arc::clone(state),
                mount_path.clone(),
            );
        }
        Ok(())
    }

    /// Notifies every live subscription whose filter intersects `path` that
    /// `assignments` was just mounted there: attaches a child observer per
    /// assignment (§4.5 insertion step 3), dispatches `Mount(path, ..)`
    /// (step 4), then walks each new back-end's sub-tree and dispatches a
    /// synthetic `Create` for every entry the filter admits, bounded by a
    /// symlink-cycle guard keyed on `physical_path` (step 5).
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::OptionOperationNotSupported`] if a subscription's
    /// own option bag cannot be intersected with one of `assignments`'; this
    /// aborts notification for that subscription but does not undo the
    /// mount itself, which has already taken effect in the tree.
    pub fn notify_mount(&self, path: &VPath, assignments: &[LiveAssignment], option: &OptionBag) -> VfsResult<()> {
        let model_assignments: Vec<MountAssignment> = assignments.iter().map(LiveAssignment::to_model).collect();
        let case = self.inner.tree.case();
        for entry in &self.inner.subscriptions {
            let id = *entry.key();
            let state = entry.value();
            if !state.filter.intersects_subtree(path.as_str()) {
                continue;
            }
            self.attach_assignments(path, assignments, &state.filter, &state.option, id, &state.dispatcher, state)?;
            state.dispatcher.dispatch(Notification::Event(EventEnvelope::new(
                Event::Mount(path.clone(), model_assignments.clone(), option.clone()),
                id,
                SystemTime::now(),
            )));
            for created in synthesize_entry_paths(assignments, path, &state.filter, &state.option, case) {
                state
                    .dispatcher
                    .dispatch(Notification::Event(EventEnvelope::new(Event::Create(created), id, SystemTime::now())));
            }
        }
        Ok(())
    }

    /// Notifies every live subscription whose filter intersects `path` that
    /// `removed` was just unmounted from there: dispatches a `Delete` for
    /// every entry the departing back-ends exposed (§4.5 removal step 1),
    /// dispatches `Unmount(path)` (step 2), then cancels the child observers
    /// attached under `path` (step 3). `removed`'s back-end handles stay
    /// alive (and queryable) through their own `Arc` regardless of whether
    /// the mount tree still lists them, so the walk runs after the tree-level
    /// removal has already happened.
    pub fn notify_unmount(&self, path: &VPath, removed: &[LiveAssignment]) {
        let case = self.inner.tree.case();
        for entry in &self.inner.subscriptions {
            let id = *entry.key();
            let state = entry.value();
            if !state.filter.intersects_subtree(path.as_str()) {
                continue;
            }
            for deleted in synthesize_entry_paths(removed, path, &state.filter, &state.option, case) {
                state
                    .dispatcher
                    .dispatch(Notification::Event(EventEnvelope::new(Event::Delete(deleted), id, SystemTime::now())));
            }
            state
                .dispatcher
                .dispatch(Notification::Event(EventEnvelope::new(Event::Unmount(path.clone()), id, SystemTime::now())));
            cancel_child_observers_under(state, path, case);
        }
    }
}

/// Walks every assignment's back-end sub-tree, converting each discovered
/// entry's back-end-local path into the parent namespace and keeping only
/// the ones `filter` admits. A directory revisited by its own
/// `physical_path` (a symlink loop) is not recursed into twice.
fn synthesize_entry_paths(
    assignments: &[LiveAssignment],
    mount_path: &VPath,
    filter: &GlobFilter,
    option: &OptionBag,
    case: CaseSensitivity,
) -> Vec<VPath> {
    let mut out = Vec::new();
    for assignment in assignments {
        let Ok(combined) = option.intersect_with(&assignment.option) else {
            continue;
        };
        let converter = PathConverter::new(
            VPath::from(assignment.option.sub_path().unwrap_or("")),
            mount_path.clone(),
        )
        .with_case(case);
        let local_root = VPath::from(assignment.option.sub_path().unwrap_or(""));
        let mut visited = HashSet::new();
        walk_backend_entries(&assignment.backend, &local_root, &combined, &converter, filter, &mut visited, &mut out);
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn walk_backend_entries(
    backend: &Arc<dyn Backend>,
    local_path: &VPath,
    option: &OptionBag,
    converter: &PathConverter,
    filter: &GlobFilter,
    visited: &mut HashSet<String>,
    out: &mut Vec<VPath>,
) {
    let Ok(entry) = backend.get_entry(local_path, option) else {
        return;
    };
    if let Some(directory) = entry.directory() {
        if let Some(physical) = &directory.physical_path {
            if !visited.insert(physical.clone()) {
                return;
            }
        }
    }
    if let Ok(parent_path) = converter.convert(local_path.as_str()) {
        let parent_path = VPath::from(parent_path);
        if filter.is_match(parent_path.as_str()) {
            out.push(parent_path);
        }
    }
    if entry.is_directory() {
        let Ok(children) = backend.browse(local_path, option) else {
            return;
        };
        for child in children {
            walk_backend_entries(backend, child.path(), option, converter, filter, visited, out);
        }
    }
}

/// Cancels every child adapter this subscription attached under `mount_path`
/// (itself or a descendant), removing their senders from `state` so a
/// subsequent unmount of an unrelated path does not touch them again.
fn cancel_child_observers_under(state: &Arc<SubscriptionState>, mount_path: &VPath, case: CaseSensitivity) {
    let mut guard = state.cancel_senders.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let previous = std::mem::take(&mut *guard);
    let mut remaining = Vec::with_capacity(previous.len());
    let mut to_cancel = Vec::new();
    for (attached_at, sender) in previous {
        if attached_at.is_under(mount_path, case) {
            to_cancel.push(sender);
        } else {
            remaining.push((attached_at, sender));
        }
    }
    *guard = remaining;
    drop(guard);
    for sender in to_cancel {
        let _ = sender.send(());
    }
}

fn spawn_child_adapter(
    child_sub: Box<dyn BackendSubscription>,
    converter: PathConverter,
    observer: ObserverId,
    dispatcher: Arc<dyn Dispatcher>,
    state: Arc<SubscriptionState>,
    mount_path: VPath,
) {
    state.child_observer_count.fetch_add(1, Ordering::SeqCst);
    let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);
    state
        .cancel_senders
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .push((mount_path, cancel_tx));

    thread::spawn(move || {
        let events = child_sub.events().clone();
        loop {
            crossbeam_channel::select! {
                recv(events) -> msg => match msg {
                    Ok(event) => {
                        if let Some(rewritten) = splice::rewrite_event(event, &converter) {
                            let envelope = EventEnvelope::new(rewritten, observer, SystemTime::now());
                            dispatcher.dispatch(Notification::Event(envelope));
                        }
                    }
                    Err(_) => break,
                },
                recv(cancel_rx) -> _ => break,
            }
        }
        drop(child_sub);
        state.child_observer_count.fetch_sub(1, Ordering::SeqCst);
        state.try_emit_completed();
    });
}

/// A live subscription handle returned by [`ObserverNetwork::subscribe`].
///
/// Dropping this handle disposes the subscription if [`Subscription::dispose`]
/// was not already called explicitly.
pub struct Subscription {
    id: ObserverId,
    state: Arc<SubscriptionState>,
    network: ObserverNetwork,
}

impl Subscription {
    /// This subscription's identity, as carried by every event it delivers.
    #[must_use]
    pub const fn id(&self) -> ObserverId {
        self.id
    }

    /// Cancels every child observer, delivers [`Notification::Completed`]
    /// exactly once, and removes this subscription from the network.
    /// Idempotent: a second call is a no-op.
    pub fn dispose(&self) {
        if self.state.dispose_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        let senders = std::mem::take(
            &mut *self
                .state
                .cancel_senders
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for sender in senders {
            let _ = sender.send(());
        }
        self.state.try_emit_completed();
        self.network.inner.subscriptions.remove(&self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch::InlineDispatcher;
    use std::sync::Mutex as StdMutex;
    use vfs_backend::Backend;
    use vfs_mount::LiveAssignment;
    use vfs_test_support::MemoryBackend;

    fn tree_with_memory_mount(mount_path: &str) -> (Arc<MountTree>, Arc<MemoryBackend>) {
        let tree = Arc::new(MountTree::new(CaseSensitivity::Sensitive));
        let backend = Arc::new(MemoryBackend::new());
        tree.mount(
            &VPath::from(mount_path),
            vec![LiveAssignment::new("mem", Arc::clone(&backend) as Arc<dyn Backend>, OptionBag::new())],
        )
        .unwrap();
        (tree, backend)
    }

    fn collecting_dispatcher() -> (Arc<dyn Dispatcher>, Arc<StdMutex<Vec<Notification>>>) {
        let collected = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(InlineDispatcher::new(move |n| {
            sink.lock().unwrap().push(n);
            Ok(())
        }));
        (dispatcher, collected)
    }

    #[test]
    fn subscribe_delivers_synthetic_start_immediately() {
        let (tree, _backend) = tree_with_memory_mount("data");
        let network = ObserverNetwork::new(tree);
        let (dispatcher, collected) = collecting_dispatcher();
        let _sub = network
            .subscribe(GlobFilter::match_all(), dispatcher, &OptionBag::new())
            .unwrap();
        let events = collected.lock().unwrap();
        assert!(matches!(events.first(), Some(Notification::Event(env)) if matches!(env.event, vfs_model::Event::Start)));
    }

    #[test]
    fn child_event_paths_are_rewritten_into_parent_namespace() {
        let (tree, backend) = tree_with_memory_mount("data");
        let network = ObserverNetwork::new(tree);
        let (dispatcher, collected) = collecting_dispatcher();
        let _sub = network
            .subscribe(GlobFilter::match_all(), dispatcher, &OptionBag::new())
            .unwrap();

        backend.create_directory(&VPath::from("sub"), &OptionBag::new()).unwrap();

        let mut saw_rewritten = false;
        for _ in 0..50 {
            let events = collected.lock().unwrap();
            if events.iter().any(|n| {
                matches!(n, Notification::Event(env) if env.event.path() == Some(&VPath::from("data/sub")))
            }) {
                saw_rewritten = true;
                break;
            }
            drop(events);
            thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(saw_rewritten, "expected a Create(data/sub) event after path splicing");
    }

    #[test]
    fn dispose_emits_completed_exactly_once_with_no_children() {
        let tree = Arc::new(MountTree::new(CaseSensitivity::Sensitive));
        let network = ObserverNetwork::new(tree);
        let (dispatcher, collected) = collecting_dispatcher();
        let sub = network
            .subscribe(GlobFilter::match_all(), dispatcher, &OptionBag::new())
            .unwrap();
        sub.dispose();
        sub.dispose();
        let completed = collected.lock().unwrap().iter().filter(|n| matches!(n, Notification::Completed)).count();
        assert_eq!(completed, 1);
    }

    #[test]
    fn dropping_subscription_removes_it_from_the_network() {
        let (tree, _backend) = tree_with_memory_mount("data");
        let network = ObserverNetwork::new(Arc::clone(&tree));
        let (dispatcher, _collected) = collecting_dispatcher();
        let sub = network
            .subscribe(GlobFilter::match_all(), dispatcher, &OptionBag::new())
            .unwrap();
        let id = sub.id();
        drop(sub);
        assert!(!network.inner.subscriptions.contains_key(&id));
    }

    #[test]
    fn notify_mount_reaches_a_subscription_created_before_the_mount() {
        let tree = Arc::new(MountTree::new(CaseSensitivity::Sensitive));
        let network = ObserverNetwork::new(Arc::clone(&tree));
        let (dispatcher, collected) = collecting_dispatcher();
        let _sub = network
            .subscribe(GlobFilter::match_all(), dispatcher, &OptionBag::new())
            .unwrap();

        let backend = Arc::new(MemoryBackend::new());
        backend.seed_file("pre-existing.txt", b"hi".to_vec());
        let assignments = vec![LiveAssignment::new("mem", Arc::clone(&backend) as Arc<dyn Backend>, OptionBag::new())];
        tree.mount(&VPath::from("late"), assignments.clone()).unwrap();
        network.notify_mount(&VPath::from("late"), &assignments, &OptionBag::new()).unwrap();

        let events = collected.lock().unwrap();
        assert!(events.iter().any(|n| matches!(n, Notification::Event(env) if matches!(&env.event, Event::Mount(p, _, _) if p == &VPath::from("late")))));
        assert!(events.iter().any(|n| {
            matches!(n, Notification::Event(env) if matches!(&env.event, Event::Create(p) if p == &VPath::from("late/pre-existing.txt")))
        }));
    }

    #[test]
    fn notify_unmount_delivers_delete_then_unmount_and_cancels_child_observers() {
        let (tree, backend) = tree_with_memory_mount("data");
        backend.seed_file("a.txt", b"hi".to_vec());
        let network = ObserverNetwork::new(Arc::clone(&tree));
        let (dispatcher, collected) = collecting_dispatcher();
        let _sub = network
            .subscribe(GlobFilter::match_all(), dispatcher, &OptionBag::new())
            .unwrap();

        let removed = tree.unmount(&VPath::from("data")).unwrap();
        network.notify_unmount(&VPath::from("data"), &removed);

        let events = collected.lock().unwrap();
        let delete_index = events.iter().position(|n| {
            matches!(n, Notification::Event(env) if matches!(&env.event, Event::Delete(p) if p == &VPath::from("data/a.txt")))
        });
        let unmount_index = events
            .iter()
            .position(|n| matches!(n, Notification::Event(env) if matches!(&env.event, Event::Unmount(p) if p == &VPath::from("data"))));
        assert!(delete_index.is_some(), "expected a Delete(data/a.txt) event");
        assert!(unmount_index.is_some(), "expected an Unmount(data) event");
        assert!(delete_index.unwrap() < unmount_index.unwrap());
    }
}
