#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The mount tree: a path-keyed tree of [`Backend`] assignments with
//! insertion ([`MountTree::mount`]), lookup ([`MountTree::resolve`],
//! [`MountTree::dispatch_set`]), and path splicing (rewriting a virtual
//! filesystem path into a back-end's own namespace, honoring a `sub-path`
//! assignment).
//!
//! # Design
//!
//! The whole tree lives behind one [`std::sync::RwLock`]: mount and unmount
//! take the write side, every read (`resolve`, `dispatch_set`,
//! `list_mountpoints`, `nested_mountpoints`) takes the read side. A single
//! lock keeps mount/unmount atomic with respect to concurrent lookups
//! without requiring a lock per node, at the cost of serializing all
//! mount-tree reads during a mutation — acceptable since mounting is rare
//! compared to lookup.
//!
//! [`MountTree::mount`] takes the *whole* list of assignments for a
//! mountpoint and atomically replaces whatever was there, rather than
//! stacking on top of a prior call; [`MountTree::unmount`] removes that
//! entire list in one step. Layering several back-ends at one mountpoint is
//! expressed by passing more than one [`LiveAssignment`] to a single
//! `mount` call, with list order doubling as precedence order (first
//! element highest precedence).
//!
//! # Invariants
//!
//! - [`MountTree::resolve`] returns the assignments of the *deepest*
//!   ancestor-or-self mountpoint of the queried path; an uncovered path
//!   resolves to `None`.
//! - [`MountTree::dispatch_set`] returns every ancestor-or-self mountpoint
//!   along the queried path, deepest (highest-precedence) first.
//! - A `sub-path` option on an assignment shifts the back-end-local path
//!   handed to the back-end, never the virtual filesystem path the caller
//!   supplied.
//! - `mount` fully supersedes any prior assignment list at the same path;
//!   `unmount` removes the whole list and prunes the node if it now has no
//!   children.

use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;
use vfs_backend::Backend;
use vfs_error::{VfsError, VfsResult};
use vfs_options::OptionBag;
use vfs_path::{CaseSensitivity, PathConverter, VPath};

/// A single back-end assignment at a mountpoint, with its live handle.
#[derive(Clone)]
pub struct LiveAssignment {
    /// A human-readable label, surfaced on [`vfs_model::MountAssignment`]
    /// snapshots.
    pub label: String,
    /// The live back-end handle.
    pub backend: Arc<dyn Backend>,
    /// The option bag granted to this assignment.
    pub option: OptionBag,
}

impl LiveAssignment {
    /// Builds a new assignment.
    #[must_use]
    pub fn new(label: impl Into<String>, backend: Arc<dyn Backend>, option: OptionBag) -> Self {
        Self {
            label: label.into(),
            backend,
            option,
        }
    }

    /// Projects this assignment onto the value type carried by an
    /// [`vfs_model::Entry`]'s mount role, dropping the live back-end handle.
    #[must_use]
    pub fn to_model(&self) -> vfs_model::MountAssignment {
        vfs_model::MountAssignment {
            backend_label: self.label.clone(),
            option: self.option.clone(),
        }
    }
}

/// The outcome of resolving a virtual filesystem path against one
/// mountpoint in the tree.
#[derive(Clone)]
pub struct ResolvedMount {
    /// The path of the mountpoint that covers the queried path.
    pub mount_path: VPath,
    /// The queried path, rewritten relative to `mount_path` (before any
    /// `sub-path` shift).
    pub relative_path: VPath,
    /// The assignments active at `mount_path`, in precedence order (first
    /// highest).
    pub assignments: Vec<LiveAssignment>,
}

impl ResolvedMount {
    /// Computes the back-end-local path for `assignment`, honoring its
    /// `sub-path` option if declared.
    ///
    /// # Errors
    ///
    /// Propagates [`VfsError::PathInvalid`] from [`PathConverter::convert`]
    /// in the extremely unlikely case `relative_path` is not under the
    /// virtual root (it always is, by construction).
    pub fn backend_path(&self, assignment: &LiveAssignment) -> VfsResult<VPath> {
        Self::apply_sub_path(assignment, self.relative_path.as_str())
    }

    /// Computes the back-end-local path for an arbitrary full virtual path
    /// known to fall under this mountpoint, honoring `assignment`'s
    /// `sub-path` option. Used when an operation (e.g. a move destination)
    /// needs a path under this same mount that was not the path originally
    /// resolved.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PathInvalid`] if `full_path` does not fall under
    /// [`ResolvedMount::mount_path`].
    pub fn backend_path_for(
        &self,
        assignment: &LiveAssignment,
        full_path: &VPath,
        case: CaseSensitivity,
    ) -> VfsResult<VPath> {
        if !full_path.is_under(&self.mount_path, case) {
            return Err(VfsError::PathInvalid(format!(
                "{full_path} is not under {}",
                self.mount_path
            )));
        }
        let relative = PathConverter::new(self.mount_path.clone(), VPath::root())
            .with_case(case)
            .convert(full_path.as_str())?;
        Self::apply_sub_path(assignment, &relative)
    }

    fn apply_sub_path(assignment: &LiveAssignment, relative: &str) -> VfsResult<VPath> {
        match assignment.option.sub_path() {
            Some(sub_path) => {
                let converter = PathConverter::new(VPath::root(), VPath::from(sub_path));
                Ok(VPath::from(converter.convert(relative)?))
            }
            None => Ok(VPath::from(relative)),
        }
    }
}

#[derive(Default)]
struct Node {
    children: FxHashMap<String, Node>,
    mounts: Vec<LiveAssignment>,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.mounts.is_empty() && self.children.is_empty()
    }
}

/// A path-keyed tree of back-end assignments.
pub struct MountTree {
    root: RwLock<Node>,
    case: CaseSensitivity,
}

impl MountTree {
    /// Builds an empty mount tree comparing paths under `case`.
    #[must_use]
    pub fn new(case: CaseSensitivity) -> Self {
        Self {
            root: RwLock::new(Node::default()),
            case,
        }
    }

    /// The case-sensitivity rule this tree compares path segments under.
    #[must_use]
    pub const fn case(&self) -> CaseSensitivity {
        self.case
    }

    /// Mounts `assignments` at `path`, atomically replacing whatever
    /// assignment list was there before.
    ///
    /// # Errors
    ///
    /// This call currently never fails; the `Result` return keeps the
    /// signature stable for back-ends whose mount hook can reject the
    /// assignment (e.g. a capability probe failure) once one exists.
    #[cfg_attr(not(feature = "tracing"), allow(clippy::unnecessary_wraps))]
    pub fn mount(&self, path: &VPath, assignments: Vec<LiveAssignment>) -> VfsResult<()> {
        let mut root = self.root.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let node = Self::node_mut(&mut root, path);
        node.mounts = assignments;
        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path, assignments = node.mounts.len(), "mounted back-ends");
        Ok(())
    }

    /// Removes every assignment mounted at `path`, returning the removed
    /// list in its former precedence order.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] if nothing is mounted at `path`.
    pub fn unmount(&self, path: &VPath) -> VfsResult<Vec<LiveAssignment>> {
        let mut root = self.root.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let segments: Vec<&str> = path.segments().collect();
        let removed = Self::remove_all(&mut root, &segments)
            .ok_or_else(|| VfsError::NotFound(path.as_str().to_owned()))?;
        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path, assignments = removed.len(), "unmounted back-ends");
        Ok(removed)
    }

    /// Resolves `path` against the tree, returning the deepest
    /// ancestor-or-self mountpoint's assignments.
    #[must_use]
    pub fn resolve(&self, path: &VPath) -> Option<ResolvedMount> {
        self.dispatch_set(path).into_iter().next()
    }

    /// Resolves `path` against every ancestor-or-self mountpoint, deepest
    /// (highest-precedence) first — the dispatch set a composer iterates
    /// to merge or fail over across overlapping mounts.
    #[must_use]
    pub fn dispatch_set(&self, path: &VPath) -> Vec<ResolvedMount> {
        let root = self.root.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let segments: Vec<&str> = path.segments().collect();
        let mut node = &*root;
        let mut hits: Vec<(usize, &Node)> = Vec::new();
        if !node.mounts.is_empty() {
            hits.push((0, node));
        }
        for (depth, segment) in segments.iter().enumerate() {
            let Some(child) = Self::find_child(node, segment, self.case) else {
                break;
            };
            node = child;
            if !node.mounts.is_empty() {
                hits.push((depth + 1, node));
            }
        }
        hits.iter()
            .rev()
            .map(|&(depth, node)| {
                let relative = segments[depth..].join("/");
                ResolvedMount {
                    mount_path: VPath::from(segments[..depth].join("/")),
                    relative_path: VPath::from(relative),
                    assignments: node.mounts.clone(),
                }
            })
            .collect()
    }

    /// Lists every mountpoint in the tree, in depth-first pre-order.
    #[must_use]
    pub fn list_mountpoints(&self) -> Vec<VPath> {
        let root = self.root.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut out = Vec::new();
        Self::collect(&root, String::new(), &mut out);
        out
    }

    /// Lists the mountpoints strictly beneath `path`, used by the composer
    /// to splice mount stubs into a parent back-end's directory listing.
    #[must_use]
    pub fn nested_mountpoints(&self, path: &VPath) -> Vec<VPath> {
        let root = self.root.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let segments: Vec<&str> = path.segments().collect();
        let mut node = &*root;
        for segment in &segments {
            let Some(child) = Self::find_child(node, segment, self.case) else {
                return Vec::new();
            };
            node = child;
        }
        let mut out = Vec::new();
        for (name, child) in &node.children {
            Self::collect(child, path.join(name).as_str().to_owned(), &mut out);
        }
        out
    }

    fn find_child<'a>(node: &'a Node, segment: &str, case: CaseSensitivity) -> Option<&'a Node> {
        match case {
            CaseSensitivity::Sensitive => node.children.get(segment),
            CaseSensitivity::Insensitive => node
                .children
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(segment))
                .map(|(_, child)| child),
        }
    }

    fn node_mut<'a>(node: &'a mut Node, path: &VPath) -> &'a mut Node {
        let mut current = node;
        for segment in path.segments() {
            current = current.children.entry(segment.to_owned()).or_default();
        }
        current
    }

    fn remove_all(node: &mut Node, segments: &[&str]) -> Option<Vec<LiveAssignment>> {
        if segments.is_empty() {
            if node.mounts.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut node.mounts));
        }
        let (head, tail) = (segments[0], &segments[1..]);
        let child = node.children.get_mut(head)?;
        let removed = Self::remove_all(child, tail);
        if child.is_empty() {
            node.children.remove(head);
        }
        removed
    }

    fn collect(node: &Node, prefix: String, out: &mut Vec<VPath>) {
        if !node.mounts.is_empty() {
            out.push(VPath::from(prefix.clone()));
        }
        for (name, child) in &node.children {
            let child_path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            Self::collect(child, child_path, out);
        }
    }
}
