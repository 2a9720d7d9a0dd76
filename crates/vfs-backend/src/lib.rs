#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The contract a storage back-end implements to plug into the mount tree:
//! [`Backend`] is the object-safe trait every back-end (in-memory, local
//! disk, archive, network share, ...) implements, advertising its
//! capabilities through [`BackendCapabilities`] and its files through the
//! [`VfsFile`] object returned from [`Backend::open`].
//!
//! # Design
//!
//! Every fallible [`Backend`] method takes an [`OptionBag`] so a caller's
//! capability grant (from the option algebra in `vfs-options`) reaches the
//! back-end without a parallel parameter list per call. [`Backend::observe`]
//! returns a [`BackendSubscription`] backed by a `crossbeam_channel`
//! receiver rather than a callback, matching how this workspace's transport
//! layer elsewhere favors channels over callback registration for
//! long-lived streams.
//!
//! # Invariants
//!
//! - A [`Backend`] never blocks indefinitely inside a trait method without
//!   an explicit, caller-controlled cancellation path; [`Backend::observe`]
//!   subscriptions are torn down by dropping the returned
//!   [`BackendSubscription`].
//! - [`Backend::capabilities`] is stable for the lifetime of a mounted
//!   back-end; a capability change requires unmounting and remounting.

use std::io::{Read, Seek, Write};

use crossbeam_channel::Receiver;
use vfs_error::VfsResult;
use vfs_model::{Entry, Event};
use vfs_options::OptionBag;
use vfs_path::{CaseSensitivity, GlobFilter, VPath};

/// Static capabilities a back-end advertises at mount time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// The back-end supports seeking within an open file.
    pub random_access: bool,
    /// The back-end can deliver change events through [`Backend::observe`].
    pub observe: bool,
    /// The back-end preserves and reports symbolic links.
    pub symlinks: bool,
    /// The back-end's storage is writable (otherwise every mutating method
    /// returns [`vfs_error::VfsError::Unauthorized`]).
    pub writable: bool,
    /// The longest path the back-end accepts, if bounded.
    pub max_path_length: Option<usize>,
    /// The path comparison rule the back-end applies to its own namespace.
    pub case_sensitivity: CaseSensitivity,
}

impl BackendCapabilities {
    /// A conservative default: read-only, case-sensitive, no observation,
    /// no bound on path length.
    #[must_use]
    pub const fn read_only() -> Self {
        Self {
            random_access: true,
            observe: false,
            symlinks: false,
            writable: false,
            max_path_length: None,
            case_sensitivity: CaseSensitivity::Sensitive,
        }
    }

    /// A read-write, observable default.
    #[must_use]
    pub const fn read_write() -> Self {
        Self {
            random_access: true,
            observe: true,
            symlinks: false,
            writable: true,
            max_path_length: None,
            case_sensitivity: CaseSensitivity::Sensitive,
        }
    }
}

/// The access mode requested of [`Backend::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenMode {
    /// Open for reading.
    pub read: bool,
    /// Open for writing.
    pub write: bool,
    /// Create the file if it does not exist.
    pub create: bool,
    /// Truncate an existing file to zero length.
    pub truncate: bool,
    /// Append writes to the end of the file.
    pub append: bool,
}

impl OpenMode {
    /// A read-only open mode.
    #[must_use]
    pub const fn read() -> Self {
        Self {
            read: true,
            write: false,
            create: false,
            truncate: false,
            append: false,
        }
    }

    /// A write mode that creates the file if absent and truncates if
    /// present.
    #[must_use]
    pub const fn write_truncate() -> Self {
        Self {
            read: false,
            write: true,
            create: true,
            truncate: true,
            append: false,
        }
    }

    /// A write mode that creates the file if absent and appends otherwise.
    #[must_use]
    pub const fn write_append() -> Self {
        Self {
            read: false,
            write: true,
            create: true,
            truncate: false,
            append: true,
        }
    }
}

/// An open file handle returned by [`Backend::open`].
///
/// Combines the standard I/O traits rather than inventing a parallel async
/// read/write surface; back-ends that need non-blocking I/O run it on their
/// own worker and present a blocking handle here.
pub trait VfsFile: Read + Write + Seek + Send {
    /// Flushes and releases any back-end-held resources for this handle.
    /// The default forwards to [`Write::flush`].
    ///
    /// # Errors
    ///
    /// Returns [`vfs_error::VfsError::Io`] if the underlying flush fails.
    fn close(&mut self) -> VfsResult<()> {
        self.flush().map_err(vfs_error::VfsError::io)
    }
}

/// A live subscription returned by [`Backend::observe`].
///
/// Dropping the subscription is the cancellation mechanism: back-ends must
/// stop producing events and release any dispatch thread once every
/// [`BackendSubscription`] and its receiver clone have been dropped.
pub trait BackendSubscription: Send {
    /// The channel events are delivered on.
    fn events(&self) -> &Receiver<Event>;
}

/// The contract a storage back-end implements to plug into the mount tree.
///
/// Every method is scoped to the back-end's own root namespace: paths
/// passed in and returned are relative to wherever the back-end is
/// eventually mounted, not to the composed virtual filesystem's root. The
/// mount tree and composer are responsible for path translation at the
/// mount boundary.
pub trait Backend: Send + Sync {
    /// This back-end's static capabilities.
    fn capabilities(&self) -> BackendCapabilities;

    /// Lists the immediate children of a directory.
    ///
    /// # Errors
    ///
    /// Returns [`vfs_error::VfsError::NotFound`] if `path` does not exist,
    /// or [`vfs_error::VfsError::Unauthorized`] if `options` does not grant
    /// [`vfs_options::OptionKind::Browse`].
    fn browse(&self, path: &VPath, options: &OptionBag) -> VfsResult<Vec<Entry>>;

    /// Returns a snapshot of the entry at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`vfs_error::VfsError::NotFound`] if `path` does not exist.
    fn get_entry(&self, path: &VPath, options: &OptionBag) -> VfsResult<Entry>;

    /// Opens `path` for I/O under `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`vfs_error::VfsError::NotFound`] if `path` does not exist
    /// and `mode.create` is `false`, [`vfs_error::VfsError::Unauthorized`]
    /// if `options` does not grant the requested access, or
    /// [`vfs_error::VfsError::OutOfDiskSpace`] if the back-end cannot
    /// allocate storage for a new or growing file.
    fn open(&self, path: &VPath, mode: OpenMode, options: &OptionBag) -> VfsResult<Box<dyn VfsFile>>;

    /// Creates a directory at `path`. Does not create missing ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`vfs_error::VfsError::AlreadyExists`] if an entry already
    /// occupies `path`, or [`vfs_error::VfsError::NotFound`] if `path`'s
    /// parent does not exist.
    fn create_directory(&self, path: &VPath, options: &OptionBag) -> VfsResult<()>;

    /// Deletes the entry at `path`. Deleting a non-empty directory fails.
    ///
    /// # Errors
    ///
    /// Returns [`vfs_error::VfsError::NotFound`] if `path` does not exist,
    /// or [`vfs_error::VfsError::NotEmpty`] if `path` is a non-empty
    /// directory.
    fn delete(&self, path: &VPath, options: &OptionBag) -> VfsResult<()>;

    /// Moves (renames) the entry at `from` to `to`, both within this
    /// back-end's namespace.
    ///
    /// # Errors
    ///
    /// Returns [`vfs_error::VfsError::NotFound`] if `from` does not exist,
    /// or [`vfs_error::VfsError::AlreadyExists`] if `to` is already
    /// occupied.
    fn move_entry(&self, from: &VPath, to: &VPath, options: &OptionBag) -> VfsResult<()>;

    /// Subscribes to change events under the paths matched by `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`vfs_error::VfsError::NotSupported`] if
    /// [`BackendCapabilities::observe`] is `false`.
    fn observe(
        &self,
        filter: &GlobFilter,
        options: &OptionBag,
    ) -> VfsResult<Box<dyn BackendSubscription>>;
}
