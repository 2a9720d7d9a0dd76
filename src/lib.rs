#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Public facade over the composable virtual filesystem workspace: one
//! [`Vfs`] handle ties together a [`vfs_compose::Composer`] (mount tree +
//! dispatch), a [`vfs_observe::ObserverNetwork`] (glob-filtered change
//! subscriptions over the same tree), and a [`vfs_lifecycle::Scope`]
//! (disposal of whatever the caller registers against this handle). The
//! operation engine in [`vfs_ops`] is exposed through constructor methods
//! that bind a fresh operation to this handle's composer; running it still
//! takes an explicit [`vfs_ops::OperationSession`], since a session (its
//! policy, cancellation token, and byte-block pool) is shared across many
//! operations rather than owned by one.
//!
//! # Design
//!
//! [`Vfs`] is cheap to clone: it shares its composer, observer network, and
//! lifecycle scope with every clone, the same way [`vfs_compose::Composer`]
//! shares its mount tree and [`vfs_observe::ObserverNetwork`] shares its
//! subscription registry. [`new_url_vfs`] builds a [`Vfs`] pre-mounted under
//! the fixed scheme table in [`URL_SCHEMES`]; since concrete back-ends are a
//! contract this workspace consumes rather than ships (`vfs-backend`
//! defines the trait, `vfs-test-support`'s in-memory back-end is test-only),
//! [`UrlVfsBuilder`] only mounts the schemes the caller actually supplies a
//! back-end for, leaving the rest absent exactly as a host without that
//! back-end would.
//!
//! # Errors
//!
//! Every fallible method returns [`vfs_error::VfsResult`]; see the error
//! taxonomy in [`vfs_error::VfsError`].

use std::sync::Arc;

pub use vfs_backend::{Backend, BackendCapabilities, OpenMode, VfsFile};
pub use vfs_compose::Composer;
pub use vfs_error::{ExistsKind, VfsError, VfsResult};
pub use vfs_lifecycle::{BelateHandle, Disposable, Scope};
pub use vfs_model::{Entry, Event, EventEnvelope, FilesystemId, ObserverId};
pub use vfs_mount::LiveAssignment;
pub use vfs_observe::{Dispatcher, InlineDispatcher, Notification, ObserverNetwork, Subscription, TaskDispatcher};
pub use vfs_ops::{
    Batch, BlockPool, CancellationToken, CopyFile, CopyTree, CreateDirectory, Delete, DeleteTree, DestinationPolicy,
    EstimateTiming, Move, Operation, OperationEvent, OperationObserver, OperationSession, OperationState, Policy,
    PolicyOverride, RollbackPolicy, SourcePolicy, TransferTree,
};
pub use vfs_options::{CompositionOp, OptionBag, OptionKind, OptionValue};
pub use vfs_path::{CaseSensitivity, GlobFilter, PathConverter, VPath};

mod url;

pub use url::{new_url_vfs, resolve_url, UrlVfsBuilder, URL_SCHEMES};

/// A virtual filesystem: a composed mount tree, its observer network, and a
/// disposal scope, sharing state across every clone.
#[derive(Clone)]
pub struct Vfs {
    composer: Arc<Composer>,
    observers: ObserverNetwork,
    lifecycle: Scope,
}

impl Vfs {
    /// Builds an empty virtual filesystem identified by `label`, comparing
    /// paths under `case`.
    #[must_use]
    pub fn new(label: impl Into<Arc<str>>, case: CaseSensitivity) -> Self {
        let composer = Arc::new(Composer::new(label, case));
        let observers = ObserverNetwork::new(composer.mount_tree_handle());
        Self {
            composer,
            observers,
            lifecycle: Scope::new(),
        }
    }

    /// This filesystem's composed dispatch surface, for callers that need
    /// direct access alongside the convenience methods below (the operation
    /// engine's `run`/`estimate` calls take one by reference).
    #[must_use]
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// This filesystem's observer network, for subscribing through
    /// [`ObserverNetwork::subscribe`] directly instead of through
    /// [`Vfs::observe`].
    #[must_use]
    pub const fn observers(&self) -> &ObserverNetwork {
        &self.observers
    }

    /// This filesystem's disposal scope, shared by every clone.
    #[must_use]
    pub const fn lifecycle(&self) -> &Scope {
        &self.lifecycle
    }

    /// Atomically replaces any existing mount at `path` with `assignments`,
    /// then notifies every live subscription whose filter reaches `path`:
    /// each gets a child observer attached to the new assignments, a
    /// `Mount` event, and a synthetic `Create` for every entry the new
    /// back-ends already hold that the subscription's filter admits.
    ///
    /// # Errors
    ///
    /// See [`vfs_mount::MountTree::mount`]. Once the mount itself has
    /// succeeded, a failure notifying observers is also returned, but the
    /// mount is not rolled back — the tree already reflects the new
    /// assignments.
    pub fn mount(&self, path: &VPath, assignments: Vec<LiveAssignment>) -> VfsResult<()> {
        self.composer.mount(path, assignments.clone())?;
        self.observers.notify_mount(path, &assignments, &OptionBag::new())
    }

    /// Removes the mount at `path`, returning the assignments that were
    /// there, and notifies every live subscription whose filter reached
    /// `path`: each gets a `Delete` for every entry the departing back-ends
    /// exposed, an `Unmount` event, and cancellation of the child observers
    /// that were attached under `path`.
    ///
    /// # Errors
    ///
    /// See [`vfs_mount::MountTree::unmount`].
    pub fn unmount(&self, path: &VPath) -> VfsResult<Vec<LiveAssignment>> {
        let removed = self.composer.unmount(path)?;
        self.observers.notify_unmount(path, &removed);
        Ok(removed)
    }

    /// Lists every mountpoint's synthesized mount entry.
    ///
    /// # Errors
    ///
    /// Propagates a failure from [`Vfs::get_entry`] on any listed
    /// mountpoint; this should not happen for a path the tree itself just
    /// reported as mounted.
    pub fn list_mountpoints(&self) -> VfsResult<Vec<Entry>> {
        self.composer
            .list_mountpoints()
            .iter()
            .map(|path| self.get_entry(path, &OptionBag::new()))
            .collect()
    }

    /// Returns a snapshot of the entry at `path`.
    ///
    /// # Errors
    ///
    /// See [`Composer::get_entry`].
    pub fn get_entry(&self, path: &VPath, option: &OptionBag) -> VfsResult<Entry> {
        self.composer.get_entry(path, option)
    }

    /// Lists the immediate children of `path`.
    ///
    /// # Errors
    ///
    /// See [`Composer::browse`].
    pub fn browse(&self, path: &VPath, option: &OptionBag) -> VfsResult<Vec<Entry>> {
        self.composer.browse(path, option)
    }

    /// Opens `path` for reading, writing, or both, per `mode`.
    ///
    /// # Errors
    ///
    /// See [`Composer::open`].
    pub fn open(&self, path: &VPath, mode: OpenMode, option: &OptionBag) -> VfsResult<Box<dyn VfsFile>> {
        self.composer.open(path, mode, option)
    }

    /// Creates a directory at `path`.
    ///
    /// # Errors
    ///
    /// See [`Composer::create_directory`].
    pub fn create_directory(&self, path: &VPath, option: &OptionBag) -> VfsResult<()> {
        self.composer.create_directory(path, option)
    }

    /// Deletes the entry at `path`.
    ///
    /// # Errors
    ///
    /// See [`Composer::delete`].
    pub fn delete(&self, path: &VPath, option: &OptionBag) -> VfsResult<()> {
        self.composer.delete(path, option)
    }

    /// Moves `from` to `to`.
    ///
    /// # Errors
    ///
    /// See [`Composer::move_entry`].
    pub fn move_entry(&self, from: &VPath, to: &VPath, option: &OptionBag) -> VfsResult<()> {
        self.composer.move_entry(from, to, option)
    }

    /// Subscribes to changes under the paths matched by `filter`, delivered
    /// through `dispatcher`.
    ///
    /// # Errors
    ///
    /// See [`ObserverNetwork::subscribe`].
    pub fn observe(&self, filter: GlobFilter, dispatcher: Arc<dyn Dispatcher>, option: &OptionBag) -> VfsResult<Subscription> {
        self.observers.subscribe(filter, dispatcher, option)
    }

    /// Registers `disposable` to be released when this filesystem's
    /// lifecycle scope is disposed.
    pub fn add_disposable(&self, disposable: Arc<dyn Disposable>) {
        self.lifecycle.add_disposable(disposable);
    }

    /// Registers `action` to run once when this filesystem's lifecycle
    /// scope is disposed.
    pub fn add_dispose_action(&self, action: impl FnOnce() + Send + 'static) {
        self.lifecycle.add_dispose_action(action);
    }

    /// Takes out a handle that postpones this filesystem's effective
    /// disposal until the handle is released, letting a worker thread
    /// outlive the caller's own scope without racing a concurrent
    /// [`Vfs::dispose`].
    #[must_use]
    pub fn belate_dispose(&self) -> BelateHandle {
        self.lifecycle.belate_dispose()
    }

    /// Disposes every disposable and action registered against this
    /// filesystem, once every outstanding belate handle has been released.
    /// Idempotent.
    pub fn dispose(&self) {
        self.lifecycle.dispose();
    }

    /// Builds a [`CopyFile`] operation copying `source` to `destination`,
    /// bound to this filesystem's composer.
    #[must_use]
    pub fn copy_file(&self, source: VPath, destination: VPath, option: OptionBag) -> CopyFile {
        CopyFile::new(source, destination, option)
    }

    /// Builds a [`CopyTree`] operation recursively copying `source_root` to
    /// `destination_root`.
    #[must_use]
    pub fn copy_tree(&self, source_root: VPath, destination_root: VPath, option: OptionBag) -> CopyTree {
        CopyTree::new(source_root, destination_root, option)
    }

    /// Builds a [`Move`] operation relocating `from` to `to`.
    #[must_use]
    pub fn move_op(&self, from: VPath, to: VPath, option: OptionBag) -> Move {
        Move::new(from, to, option)
    }

    /// Builds a [`TransferTree`] operation recursively moving `source_root`
    /// to `destination_root`.
    #[must_use]
    pub fn transfer_tree(&self, source_root: VPath, destination_root: VPath, option: OptionBag) -> TransferTree {
        TransferTree::new(source_root, destination_root, option)
    }

    /// Builds a [`Delete`] operation removing `target`.
    #[must_use]
    pub fn delete_op(&self, target: VPath, option: OptionBag) -> Delete {
        Delete::new(target, option)
    }

    /// Builds a [`DeleteTree`] operation recursively removing `root`.
    #[must_use]
    pub fn delete_tree(&self, root: VPath, option: OptionBag) -> DeleteTree {
        DeleteTree::new(root, option)
    }

    /// Builds a [`CreateDirectory`] operation creating `target` and any
    /// missing ancestors.
    #[must_use]
    pub fn create_directory_op(&self, target: VPath, option: OptionBag) -> CreateDirectory {
        CreateDirectory::new(target, option)
    }

    /// Builds a [`Batch`] running `operations` in order.
    #[must_use]
    pub fn batch(&self, operations: Vec<Box<dyn Operation>>) -> Batch {
        Batch::new(operations)
    }

    /// Runs `operation` against this filesystem's composer.
    ///
    /// # Errors
    ///
    /// See [`Operation::run`].
    pub fn run(&self, operation: &mut dyn Operation, session: &OperationSession) -> VfsResult<()> {
        operation.run(&self.composer, session)
    }

    /// Sizes `operation`'s work against this filesystem's composer, without
    /// performing it.
    ///
    /// # Errors
    ///
    /// See [`Operation::estimate`].
    pub fn estimate(&self, operation: &mut dyn Operation, session: &OperationSession) -> VfsResult<()> {
        operation.estimate(&self.composer, session)
    }
}

/// Builds an empty virtual filesystem identified by `label`, comparing
/// paths under `case`. Equivalent to [`Vfs::new`]; a free function matching
/// the workspace's `new_vfs` naming for callers that prefer it.
#[must_use]
pub fn new_vfs(label: impl Into<Arc<str>>, case: CaseSensitivity) -> Vfs {
    Vfs::new(label, case)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vfs_test_support::MemoryBackend;

    fn seeded_vfs(path: &str, contents: &[u8]) -> Vfs {
        let vfs = Vfs::new("t", CaseSensitivity::Sensitive);
        let backend = MemoryBackend::new();
        backend.seed_file(path, contents.to_vec());
        vfs.mount(&VPath::root(), vec![LiveAssignment::new("mem", Arc::new(backend), OptionBag::new())])
            .unwrap();
        vfs
    }

    #[test]
    fn empty_vfs_browses_to_an_empty_root() {
        let vfs = Vfs::new("t", CaseSensitivity::Sensitive);
        let entry = vfs.get_entry(&VPath::root(), &OptionBag::new()).unwrap();
        assert!(entry.is_directory());
        assert!(vfs.browse(&VPath::root(), &OptionBag::new()).unwrap().is_empty());
    }

    #[test]
    fn mount_and_read_a_file_through_the_facade() {
        let vfs = seeded_vfs("a.txt", b"hello");
        let mut file = vfs.open(&VPath::from("a.txt"), OpenMode::read(), &OptionBag::new()).unwrap();
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn copy_file_operation_runs_against_the_facades_composer() {
        let vfs = seeded_vfs("a.txt", b"hello");
        let session = OperationSession::new(Policy::session_default(), BlockPool::new(1024, 4), 0);
        let mut op = vfs.copy_file(VPath::from("a.txt"), VPath::from("b.txt"), OptionBag::new());
        vfs.run(&mut op, &session).unwrap();
        assert_eq!(op.state(), OperationState::Completed);
        assert!(vfs.get_entry(&VPath::from("b.txt"), &OptionBag::new()).is_ok());
    }

    #[test]
    fn dispose_releases_registered_actions_exactly_once() {
        let vfs = Vfs::new("t", CaseSensitivity::Sensitive);
        let count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counted = Arc::clone(&count);
        vfs.add_dispose_action(move || {
            counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        vfs.dispose();
        vfs.dispose();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn list_mountpoints_reports_the_root_mount() {
        let vfs = seeded_vfs("a.txt", b"hello");
        let mounts = vfs.list_mountpoints().unwrap();
        assert_eq!(mounts.len(), 1);
        assert!(mounts[0].is_mountpoint());
    }
}
