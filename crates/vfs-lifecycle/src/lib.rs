#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Scoped resource disposal shared by every long-lived handle in the
//! workspace: byte-streams, observer subscriptions, operation sessions, and
//! the virtual filesystem itself. A [`Scope`] collects the disposable
//! objects and teardown actions owned by one such resource and releases
//! them exactly once, on whichever thread first asks for disposal.
//!
//! # Design
//!
//! [`Scope::belate_dispose`] covers the one case plain reference-counting
//! (`Arc`) doesn't: a resource handed off to a worker thread that must
//! outlive the caller's own scope, but whose owner may still ask to dispose
//! it before the worker is done. A [`BelateHandle`] postpones the effective
//! teardown requested through [`Scope::dispose`] until every outstanding
//! handle has itself been released; the last one out performs the release.
//! Both sides can race to call `dispose`/`release` in any order: a counter
//! and a request flag, both updated under
//! [`std::sync::atomic::Ordering::SeqCst`], make disposal run exactly once
//! regardless of which side finishes last.
//!
//! # Invariants
//!
//! - [`Scope::dispose`] is idempotent: calling it twice, from any thread,
//!   runs the registered disposables and actions exactly once.
//! - Disposal never runs while a [`BelateHandle`] issued by
//!   [`Scope::belate_dispose`] is still outstanding.
//! - Disposables and actions run in the order they were registered.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// An object that releases some resource exactly once when asked.
///
/// Implementors should make `dispose` idempotent on their own if they can
/// be reached through any path other than their owning [`Scope`]; the scope
/// itself only ever calls it once per object.
pub trait Disposable: Send + Sync {
    /// Releases the resource this object owns.
    fn dispose(&self);
}

enum Entry {
    Object(Arc<dyn Disposable>),
    Action(Box<dyn FnOnce() + Send>),
}

struct ScopeState {
    disposed: AtomicBool,
    dispose_requested: AtomicBool,
    belate_count: AtomicUsize,
    // `None` once disposal has run; taking it out of the mutex and the
    // "already disposed" check happen under the same lock, so a disposable
    // registered concurrently with disposal either joins the batch being
    // drained or sees `None` and is released immediately — it can never be
    // queued after the batch has already been taken.
    entries: Mutex<Option<Vec<Entry>>>,
}

impl ScopeState {
    fn try_finalize(self: &Arc<Self>) {
        if !self.dispose_requested.load(Ordering::SeqCst) {
            return;
        }
        if self.belate_count.load(Ordering::SeqCst) != 0 {
            return;
        }
        let taken = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let Some(entries) = taken else {
            return;
        };
        self.disposed.store(true, Ordering::SeqCst);
        for entry in entries {
            match entry {
                Entry::Object(disposable) => disposable.dispose(),
                Entry::Action(action) => action(),
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("scope disposed");
    }
}

/// A registry of disposable objects and teardown actions released together.
///
/// Cheap to clone: every clone shares the same underlying state and the
/// same disposal outcome.
#[derive(Clone)]
pub struct Scope {
    state: Arc<ScopeState>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// Builds an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(ScopeState {
                disposed: AtomicBool::new(false),
                dispose_requested: AtomicBool::new(false),
                belate_count: AtomicUsize::new(0),
                entries: Mutex::new(Some(Vec::new())),
            }),
        }
    }

    /// Registers `disposable` to be released when this scope is disposed.
    ///
    /// A disposable added after disposal has already run is released
    /// immediately, matching the expectation that every resource added to a
    /// scope is eventually released exactly once.
    pub fn add_disposable(&self, disposable: Arc<dyn Disposable>) {
        let mut guard = self.state.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.as_mut() {
            Some(entries) => entries.push(Entry::Object(disposable)),
            None => {
                drop(guard);
                disposable.dispose();
            }
        }
    }

    /// Registers `action` to run once when this scope is disposed.
    ///
    /// Like [`Scope::add_disposable`], an action added after disposal has
    /// already run is invoked immediately instead of being lost.
    pub fn add_dispose_action(&self, action: impl FnOnce() + Send + 'static) {
        let mut guard = self.state.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.as_mut() {
            Some(entries) => entries.push(Entry::Action(Box::new(action))),
            None => {
                drop(guard);
                action();
            }
        }
    }

    /// Requests disposal: releases every registered disposable and action,
    /// in registration order, unless an outstanding [`BelateHandle`] defers
    /// the release until it too is dropped.
    ///
    /// Idempotent; a second call is a no-op.
    pub fn dispose(&self) {
        if self.state.dispose_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.try_finalize();
    }

    /// Reports whether disposal has actually run.
    ///
    /// Returns `false` while disposal is requested but postponed by an
    /// outstanding [`BelateHandle`].
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::SeqCst)
    }

    /// Reports whether [`Scope::dispose`] has been called, regardless of
    /// whether the release itself has run yet.
    #[must_use]
    pub fn is_dispose_requested(&self) -> bool {
        self.state.dispose_requested.load(Ordering::SeqCst)
    }

    /// Takes out a handle that postpones this scope's effective disposal
    /// until the handle is released, even if [`Scope::dispose`] is called
    /// while it is outstanding.
    ///
    /// Intended for handing a resource off to a worker thread: the worker
    /// holds the handle for as long as it still needs the resource, and
    /// releases it (explicitly, or by dropping it) when done.
    #[must_use]
    pub fn belate_dispose(&self) -> BelateHandle {
        self.state.belate_count.fetch_add(1, Ordering::SeqCst);
        BelateHandle {
            state: Arc::clone(&self.state),
            released: AtomicBool::new(false),
        }
    }
}

/// A reference-counted postponement of a [`Scope`]'s disposal.
///
/// Releasing the last outstanding handle while disposal is pending runs the
/// scope's disposal on the releasing thread.
pub struct BelateHandle {
    state: Arc<ScopeState>,
    released: AtomicBool,
}

impl BelateHandle {
    /// Releases this handle, allowing disposal to proceed once every other
    /// outstanding handle has also been released.
    ///
    /// Idempotent; a second call (or a subsequent drop) is a no-op.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.belate_count.fetch_sub(1, Ordering::SeqCst);
        self.state.try_finalize();
    }
}

impl Drop for BelateHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct Counted(Arc<AtomicU32>);

    impl Disposable for Counted {
        fn dispose(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispose_runs_disposables_and_actions_in_order() {
        let scope = Scope::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&order);
        scope.add_dispose_action(move || first.lock().unwrap().push(1));
        let counted = Arc::new(AtomicU32::new(0));
        scope.add_disposable(Arc::new(Counted(Arc::clone(&counted))));
        let second = Arc::clone(&order);
        scope.add_dispose_action(move || second.lock().unwrap().push(3));

        scope.dispose();

        assert!(scope.is_disposed());
        assert_eq!(counted.load(Ordering::SeqCst), 1);
        assert_eq!(*order.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn dispose_is_idempotent() {
        let scope = Scope::new();
        let counted = Arc::new(AtomicU32::new(0));
        scope.add_disposable(Arc::new(Counted(Arc::clone(&counted))));
        scope.dispose();
        scope.dispose();
        assert_eq!(counted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn belate_dispose_postpones_release_until_every_handle_is_gone() {
        let scope = Scope::new();
        let counted = Arc::new(AtomicU32::new(0));
        scope.add_disposable(Arc::new(Counted(Arc::clone(&counted))));

        let first = scope.belate_dispose();
        let second = scope.belate_dispose();

        scope.dispose();
        assert!(scope.is_dispose_requested());
        assert!(!scope.is_disposed());

        first.release();
        assert!(!scope.is_disposed());

        second.release();
        assert!(scope.is_disposed());
        assert_eq!(counted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_a_belate_handle_releases_it() {
        let scope = Scope::new();
        scope.dispose();
        assert!(scope.is_disposed());

        let handle = scope.belate_dispose();
        drop(handle);
    }

    #[test]
    fn registering_after_disposal_runs_immediately() {
        let scope = Scope::new();
        scope.dispose();

        let counted = Arc::new(AtomicU32::new(0));
        scope.add_disposable(Arc::new(Counted(Arc::clone(&counted))));
        assert_eq!(counted.load(Ordering::SeqCst), 1);

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        scope.add_dispose_action(move || flag.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }
}
