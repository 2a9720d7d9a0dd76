//! The URL singleton: a [`Vfs`](crate::Vfs) pre-mounted under a fixed
//! scheme table, and the `scheme://path` parsing that keeps lookups from
//! crossing scheme boundaries.

use std::sync::Arc;

use vfs_backend::Backend;
use vfs_error::{VfsError, VfsResult};
use vfs_mount::LiveAssignment;
use vfs_options::OptionBag;
use vfs_path::{CaseSensitivity, VPath};

use crate::Vfs;

/// The fixed scheme table a URL-singleton [`Vfs`] is built from.
///
/// Every scheme names a top-level mountpoint; a path never crosses from one
/// scheme's sub-tree into another's, since each is mounted at its own
/// disjoint root segment.
pub const URL_SCHEMES: &[&str] = &[
    "file",
    "tmp",
    "ram",
    "home",
    "document",
    "desktop",
    "picture",
    "video",
    "music",
    "config",
    "data",
    "program-data",
    "application",
    "http",
    "https",
];

/// Builds a [`Vfs`] one scheme at a time, mounting a caller-supplied
/// back-end under each.
///
/// Only schemes a back-end is actually supplied for end up mounted; a host
/// without, say, a `picture://` back-end simply never calls
/// [`UrlVfsBuilder::with_backend`] for it; [`Vfs::get_entry`] and friends
/// then see it as `not-found`, the same outcome the back-end contract
/// already uses for anything out of scope.
pub struct UrlVfsBuilder {
    vfs: Vfs,
}

impl Default for UrlVfsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlVfsBuilder {
    /// Starts building a URL singleton with no scheme mounted yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vfs: Vfs::new("url", CaseSensitivity::Sensitive),
        }
    }

    /// Mounts `backend` under `scheme`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotSupported`] if `scheme` is not one of
    /// [`URL_SCHEMES`]. Propagates [`Vfs::mount`]'s own errors otherwise.
    pub fn with_backend(self, scheme: &str, backend: Arc<dyn Backend>, option: OptionBag) -> VfsResult<Self> {
        if !URL_SCHEMES.contains(&scheme) {
            return Err(VfsError::NotSupported);
        }
        self.vfs
            .mount(&VPath::new(scheme.to_owned()), vec![LiveAssignment::new(scheme.to_owned(), backend, option)])?;
        Ok(self)
    }

    /// Finishes building, returning the assembled [`Vfs`].
    #[must_use]
    pub fn build(self) -> Vfs {
        self.vfs
    }
}

/// Builds a URL singleton with no scheme mounted; equivalent to
/// `UrlVfsBuilder::new().build()`, for callers that will add back-ends
/// through [`Vfs::mount`] directly rather than [`UrlVfsBuilder`].
#[must_use]
pub fn new_url_vfs() -> Vfs {
    UrlVfsBuilder::new().build()
}

/// Parses a `scheme://path` URL into the [`VPath`] a [`UrlVfsBuilder`]-built
/// [`Vfs`] mounts that scheme's back-end under.
///
/// # Errors
///
/// Returns [`VfsError::PathInvalid`] if `url` has no `://` separator, and
/// [`VfsError::NotFound`] if the scheme is not one of [`URL_SCHEMES`] —
/// the same error a cross-scheme path lookup would raise once resolved.
pub fn resolve_url(url: &str) -> VfsResult<VPath> {
    let (scheme, rest) = url.split_once("://").ok_or_else(|| VfsError::PathInvalid(url.to_owned()))?;
    if !URL_SCHEMES.contains(&scheme) {
        return Err(VfsError::NotFound(url.to_owned()));
    }
    let mut path = VPath::new(scheme.to_owned());
    for segment in rest.split('/').filter(|s| !s.is_empty()) {
        path = path.join(segment);
    }
    Ok(path)
}
