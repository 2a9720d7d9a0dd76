#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Shared error taxonomy consumed by every crate in the virtual filesystem
//! workspace. Back-ends, the mount tree, the composer, the observer network,
//! and the operation engine all report failures through [`VfsError`] rather
//! than inventing parallel per-crate error enums, so a caller several layers
//! up never needs to know which crate a failure originated in.
//!
//! # Design
//!
//! [`VfsError`] is a closed, non-exhaustive enum covering capability
//! refusals, path validation, entry-existence conflicts, option-algebra
//! incompatibilities, cancellation, and opaque I/O failures from a back-end.
//! [`VfsResult`] is the workspace-wide `Result` alias.
//!
//! # Errors
//!
//! This crate defines errors; it does not produce them. See [`VfsError`] for
//! the full variant list and which operations raise each one.
//!
//! # See also
//!
//! - `vfs-backend` for the capability contract whose refusals surface as
//!   [`VfsError::NotSupported`].
//! - `vfs-ops` for the operation engine's policy-driven translation of these
//!   errors into fatal/observed/absorbed outcomes.

use std::fmt;
use std::io;

/// Result alias used throughout the virtual filesystem workspace.
pub type VfsResult<T> = Result<T, VfsError>;

/// The kind of already-existing entry a create/move operation collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExistsKind {
    /// A regular file already occupies the destination path.
    File,
    /// A directory already occupies the destination path.
    Directory,
    /// An entry of unspecified or mixed role already occupies the path.
    Entry,
}

impl fmt::Display for ExistsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Entry => "entry",
        };
        f.write_str(label)
    }
}

/// The workspace-wide error taxonomy.
///
/// Every variant corresponds to a distinct failure kind raised by the mount
/// tree, composer, observer network, or operation engine. Back-ends report
/// their own failures by constructing [`VfsError::Io`] with the underlying
/// cause, or by returning one of the more specific variants when they can
/// identify the failure precisely (e.g. [`VfsError::NotFound`]).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VfsError {
    /// No routable back-end in the dispatch set advertises the requested
    /// capability.
    #[error("capability not supported by any routable back-end")]
    NotSupported,

    /// The supplied path failed grammar validation.
    #[error("invalid path: {0}")]
    PathInvalid(String),

    /// The supplied path exceeded a back-end- or platform-imposed length
    /// limit.
    #[error("path too long: {0}")]
    PathTooLong(String),

    /// The file, directory, or path addressed by the operation does not
    /// exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The destination of a create/move operation already exists.
    #[error("{kind} already exists: {path}")]
    AlreadyExists {
        /// The role of the pre-existing entry.
        kind: ExistsKind,
        /// The path that already existed.
        path: String,
    },

    /// A recursive delete was refused because `recurse = false` and the
    /// target directory was non-empty.
    #[error("not empty: {0}")]
    NotEmpty(String),

    /// A back-end refused the operation based on its option set.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The byte-block pool or an underlying back-end ran out of storage.
    #[error("out of disk space")]
    OutOfDiskSpace,

    /// Two option values of the same kind could not be combined (e.g.
    /// intersecting differing `sub-path` values).
    #[error("option operation not supported: {0}")]
    OptionOperationNotSupported(String),

    /// The operation's cancellation token was triggered.
    #[error("cancelled")]
    Cancelled,

    /// Any other back-end I/O failure, carrying the back-end's own error as
    /// the cause.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// A method was called on a resource after it was disposed (observer
    /// subscription, byte-stream, operation session, or filesystem handle).
    #[error("disposed")]
    Disposed,
}

impl VfsError {
    /// Builds an [`Io`](VfsError::Io) variant from any [`std::io::Error`].
    #[must_use]
    pub fn io(source: io::Error) -> Self {
        Self::Io(source)
    }

    /// Returns `true` for errors that the operation engine treats as fatal
    /// under every policy: cancellation, unsupported
    /// capability, and disk exhaustion.
    #[must_use]
    pub const fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::NotSupported | Self::OutOfDiskSpace
        )
    }
}

impl From<io::Error> for VfsError {
    fn from(source: io::Error) -> Self {
        Self::Io(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_formats_kind_and_path() {
        let err = VfsError::AlreadyExists {
            kind: ExistsKind::Directory,
            path: "/a/b".to_owned(),
        };
        assert_eq!(err.to_string(), "directory already exists: /a/b");
    }

    #[test]
    fn io_error_roundtrips_through_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let vfs_err: VfsError = io_err.into();
        assert!(matches!(vfs_err, VfsError::Io(_)));
    }

    #[test]
    fn always_fatal_matches_spec_list() {
        assert!(VfsError::Cancelled.is_always_fatal());
        assert!(VfsError::NotSupported.is_always_fatal());
        assert!(VfsError::OutOfDiskSpace.is_always_fatal());
        assert!(!VfsError::NotEmpty("x".into()).is_always_fatal());
    }

    #[test]
    fn exists_kind_display() {
        assert_eq!(ExistsKind::File.to_string(), "file");
        assert_eq!(ExistsKind::Entry.to_string(), "entry");
    }
}
