#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The composer: the single entry point that turns a [`vfs_mount::MountTree`]
//! plus a set of [`vfs_backend::Backend`] assignments into one coherent
//! filesystem. [`Composer`] dispatches every read/write operation across the
//! tree's dispatch set, merges overlapping directory listings, and
//! synthesizes the mount-role entries that make a mountpoint visible as an
//! ordinary directory entry.
//!
//! # Design
//!
//! Every dispatched back-end call carries the intersection of the caller's
//! option bag and the assignment's own mount-time option bag, so a mount
//! granted only `Read` never lets a caller through to `Write` regardless of
//! what the caller asks for. [`Composer::browse`] and [`Composer::get_entry`]
//! fold results across the whole dispatch set (not just the single deepest
//! mount) because a shallower mount can still be visible through a gap left
//! by a deeper one's `sub-path` reshaping or partial failure.
//!
//! When every back-end in a dispatch set refuses an `open`, the composer
//! raises the most informative of the refusals: not-found is preferred over
//! unauthorized, which is preferred over not-supported, on the theory that
//! "the path doesn't exist" is more actionable to a caller than "something,
//! somewhere, said no."
//!
//! # Invariants
//!
//! - A path that is itself a mountpoint resolves to a synthesized entry
//!   carrying a mount role, which takes precedence over anything a back-end
//!   might separately report at that path.
//! - [`Composer::browse`] merges children across the dispatch set by name:
//!   the first (highest-precedence) back-end to report a name wins
//!   field-for-field, with later occurrences only filling gaps, via
//!   [`vfs_model::Entry::merge`].
//! - [`Composer::browse`] and [`Composer::get_entry`] on an entirely empty
//!   tree return a synthetic, childless root directory rather than an error.
//! - `create_directory`, `delete`, and `move` are routed to the
//!   highest-precedence **writable** back-end in the dispatch set; if none
//!   is writable, the call fails with [`vfs_error::VfsError::NotSupported`].

use std::collections::BTreeMap;
use std::time::SystemTime;

use vfs_backend::{OpenMode, VfsFile};
use vfs_error::{VfsError, VfsResult};
use vfs_model::{DirectoryRole, Entry, FilesystemId, MountRole};
use vfs_mount::{LiveAssignment, MountTree, ResolvedMount};
use vfs_options::OptionBag;
use vfs_path::{CaseSensitivity, VPath};

/// Dispatches filesystem operations across a [`MountTree`]'s dispatch set,
/// presenting the result as a single filesystem identified by `filesystem`.
pub struct Composer {
    filesystem: FilesystemId,
    tree: std::sync::Arc<MountTree>,
}

impl Composer {
    /// Builds a composer over an empty mount tree, identified by `label` and
    /// comparing paths under `case`.
    #[must_use]
    pub fn new(label: impl Into<std::sync::Arc<str>>, case: CaseSensitivity) -> Self {
        Self {
            filesystem: FilesystemId::new(label),
            tree: std::sync::Arc::new(MountTree::new(case)),
        }
    }

    /// This composer's filesystem identity, stamped onto every entry it
    /// returns.
    #[must_use]
    pub const fn filesystem(&self) -> &FilesystemId {
        &self.filesystem
    }

    /// Borrows the underlying mount tree, for callers (the operation engine,
    /// the observer network) that need direct tree access alongside
    /// composed dispatch.
    #[must_use]
    pub fn mount_tree(&self) -> &MountTree {
        &self.tree
    }

    /// Clones a shared handle to the underlying mount tree, for callers (the
    /// observer network) that need to outlive this composer while still
    /// observing the same tree.
    #[must_use]
    pub fn mount_tree_handle(&self) -> std::sync::Arc<MountTree> {
        std::sync::Arc::clone(&self.tree)
    }

    /// Mounts `assignments` at `path`. See [`MountTree::mount`].
    ///
    /// # Errors
    ///
    /// See [`MountTree::mount`].
    pub fn mount(&self, path: &VPath, assignments: Vec<LiveAssignment>) -> VfsResult<()> {
        self.tree.mount(path, assignments)
    }

    /// Unmounts `path`. See [`MountTree::unmount`].
    ///
    /// # Errors
    ///
    /// See [`MountTree::unmount`].
    pub fn unmount(&self, path: &VPath) -> VfsResult<Vec<LiveAssignment>> {
        self.tree.unmount(path)
    }

    /// Lists every mountpoint. See [`MountTree::list_mountpoints`].
    #[must_use]
    pub fn list_mountpoints(&self) -> Vec<VPath> {
        self.tree.list_mountpoints()
    }

    /// Returns a snapshot of the entry at `path`, synthesizing a mount-role
    /// entry if `path` is itself a mountpoint and a synthetic root for an
    /// empty tree.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] if `path` is not covered by any mount
    /// and is not the root, or the most informative error raised by a
    /// dispatched back-end otherwise.
    pub fn get_entry(&self, path: &VPath, option: &OptionBag) -> VfsResult<Entry> {
        let dispatch = self.tree.dispatch_set(path);
        if let Some(top) = dispatch.first() {
            if top.mount_path == *path && !top.assignments.is_empty() {
                return Ok(self.synthesize_mount_entry(path, top));
            }
        }
        if dispatch.is_empty() {
            return if path.is_root() {
                Ok(self.synthesize_root_entry())
            } else {
                Err(VfsError::NotFound(path.as_str().to_owned()))
            };
        }
        let mut errors = Vec::new();
        for resolved in &dispatch {
            for assignment in &resolved.assignments {
                let combined = match option.intersect_with(&assignment.option) {
                    Ok(combined) => combined,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };
                let backend_path = match resolved.backend_path(assignment) {
                    Ok(p) => p,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };
                match assignment.backend.get_entry(&backend_path, &combined) {
                    Ok(entry) => {
                        return Ok(entry.with_new_filesystem_and_path(self.filesystem.clone(), path.clone()));
                    }
                    Err(e) => errors.push(e),
                }
            }
        }
        Err(most_informative(errors, path))
    }

    /// Lists the immediate children of `path`, merged across the dispatch
    /// set and spliced with synthesized stubs for any direct child
    /// mountpoints.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] if `path` is not covered by any mount
    /// and is not the root, or the most informative error raised by a
    /// dispatched back-end otherwise.
    pub fn browse(&self, path: &VPath, option: &OptionBag) -> VfsResult<Vec<Entry>> {
        let dispatch = self.tree.dispatch_set(path);
        let mut merged: BTreeMap<String, Entry> = BTreeMap::new();
        let mut errors = Vec::new();
        let mut any_success = false;
        for resolved in &dispatch {
            for assignment in &resolved.assignments {
                let combined = match option.intersect_with(&assignment.option) {
                    Ok(combined) => combined,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };
                let backend_path = match resolved.backend_path(assignment) {
                    Ok(p) => p,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };
                match assignment.backend.browse(&backend_path, &combined) {
                    Ok(children) => {
                        any_success = true;
                        for child in children {
                            let Some(name) = child.name().map(str::to_owned) else {
                                continue;
                            };
                            let rewritten = child
                                .with_new_filesystem_and_path(self.filesystem.clone(), path.join(&name));
                            match merged.get_mut(&name) {
                                Some(existing) => *existing = Entry::merge(existing, &rewritten),
                                None => {
                                    merged.insert(name, rewritten);
                                }
                            }
                        }
                    }
                    Err(e) => errors.push(e),
                }
            }
        }
        for stub in self.direct_child_mountpoints(path) {
            let Some(name) = stub.leaf().map(str::to_owned) else {
                continue;
            };
            if merged.contains_key(&name) {
                continue;
            }
            let entry = self.get_entry(&stub, option).unwrap_or_else(|_| {
                let now = SystemTime::now();
                Entry::new(self.filesystem.clone(), stub, now, now).with_directory(DirectoryRole::default())
            });
            merged.insert(name, entry);
        }
        if !any_success && merged.is_empty() {
            return if path.is_root() {
                Ok(Vec::new())
            } else if dispatch.is_empty() {
                Err(VfsError::NotFound(path.as_str().to_owned()))
            } else {
                Err(most_informative(errors, path))
            };
        }
        Ok(merged.into_values().collect())
    }

    /// Opens `path`, trying each assignment in the dispatch set in
    /// precedence order.
    ///
    /// # Errors
    ///
    /// Returns the most informative error across every refusal in the
    /// dispatch set: not-found over unauthorized over not-supported.
    pub fn open(&self, path: &VPath, mode: OpenMode, option: &OptionBag) -> VfsResult<Box<dyn VfsFile>> {
        let dispatch = self.tree.dispatch_set(path);
        let mut errors = Vec::new();
        for resolved in &dispatch {
            for assignment in &resolved.assignments {
                if mode.write && !assignment.backend.capabilities().writable {
                    errors.push(VfsError::Unauthorized(format!("{path} is read-only")));
                    continue;
                }
                let combined = match option.intersect_with(&assignment.option) {
                    Ok(combined) => combined,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };
                let backend_path = match resolved.backend_path(assignment) {
                    Ok(p) => p,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };
                match assignment.backend.open(&backend_path, mode, &combined) {
                    Ok(file) => return Ok(file),
                    Err(e) => errors.push(e),
                }
            }
        }
        Err(most_informative(errors, path))
    }

    /// Creates a directory at `path` on the highest-precedence writable
    /// back-end covering it.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] if nothing covers `path`, or
    /// [`VfsError::NotSupported`] if every covering back-end is read-only.
    pub fn create_directory(&self, path: &VPath, option: &OptionBag) -> VfsResult<()> {
        let (resolved, assignment) = self.writable_target(path)?;
        let combined = option.intersect_with(&assignment.option)?;
        let backend_path = resolved.backend_path(&assignment)?;
        assignment.backend.create_directory(&backend_path, &combined)
    }

    /// Deletes the entry at `path` on the highest-precedence writable
    /// back-end covering it.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] if nothing covers `path`, or
    /// [`VfsError::NotSupported`] if every covering back-end is read-only.
    pub fn delete(&self, path: &VPath, option: &OptionBag) -> VfsResult<()> {
        let (resolved, assignment) = self.writable_target(path)?;
        let combined = option.intersect_with(&assignment.option)?;
        let backend_path = resolved.backend_path(&assignment)?;
        assignment.backend.delete(&backend_path, &combined)
    }

    /// Moves `from` to `to`, both resolved against the same mountpoint as
    /// `from`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] if nothing covers `from`,
    /// [`VfsError::NotSupported`] if every covering back-end is read-only,
    /// or [`VfsError::PathInvalid`] if `to` does not fall under `from`'s
    /// mountpoint.
    pub fn move_entry(&self, from: &VPath, to: &VPath, option: &OptionBag) -> VfsResult<()> {
        let (resolved, assignment) = self.writable_target(from)?;
        let combined = option.intersect_with(&assignment.option)?;
        let from_backend_path = resolved.backend_path(&assignment)?;
        let to_backend_path = resolved.backend_path_for(&assignment, to, self.tree.case())?;
        assignment
            .backend
            .move_entry(&from_backend_path, &to_backend_path, &combined)
    }

    fn writable_target(&self, path: &VPath) -> VfsResult<(ResolvedMount, LiveAssignment)> {
        let dispatch = self.tree.dispatch_set(path);
        if dispatch.is_empty() {
            return Err(VfsError::NotFound(path.as_str().to_owned()));
        }
        for resolved in dispatch {
            if let Some(assignment) = resolved
                .assignments
                .iter()
                .find(|a| a.backend.capabilities().writable)
                .cloned()
            {
                return Ok((resolved, assignment));
            }
        }
        Err(VfsError::NotSupported)
    }

    fn direct_child_mountpoints(&self, path: &VPath) -> Vec<VPath> {
        let prefix_depth = path.segments().count();
        self.tree
            .nested_mountpoints(path)
            .into_iter()
            .filter(|candidate| candidate.segments().count() == prefix_depth + 1)
            .collect()
    }

    fn synthesize_root_entry(&self) -> Entry {
        let now = SystemTime::now();
        Entry::new(self.filesystem.clone(), VPath::root(), now, now).with_directory(DirectoryRole::default())
    }

    fn synthesize_mount_entry(&self, path: &VPath, resolved: &ResolvedMount) -> Entry {
        let now = SystemTime::now();
        let assignments = resolved.assignments.iter().map(LiveAssignment::to_model).collect();
        Entry::new(self.filesystem.clone(), path.clone(), now, now)
            .with_directory(DirectoryRole::default())
            .with_mount(MountRole { assignments })
    }
}

/// Ranks an error by how actionable it is to a caller: lower is more
/// informative. Ties among several refusals in a dispatch set are broken in
/// favor of the most specific failure.
const fn rank_error(err: &VfsError) -> u8 {
    match err {
        VfsError::NotFound(_) => 0,
        VfsError::Unauthorized(_) => 1,
        VfsError::NotSupported => 2,
        VfsError::PathInvalid(_)
        | VfsError::PathTooLong(_)
        | VfsError::AlreadyExists { .. }
        | VfsError::NotEmpty(_) => 3,
        VfsError::OptionOperationNotSupported(_) | VfsError::OutOfDiskSpace => 4,
        VfsError::Cancelled => 5,
        VfsError::Io(_) | VfsError::Disposed => 6,
        _ => 7,
    }
}

fn most_informative(errors: Vec<VfsError>, path: &VPath) -> VfsError {
    errors
        .into_iter()
        .min_by_key(rank_error)
        .unwrap_or_else(|| VfsError::NotFound(path.as_str().to_owned()))
}
