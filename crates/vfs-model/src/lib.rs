#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Immutable entry and event value types and their
//! decorators. An [`Entry`] is a point-in-time snapshot that may
//! simultaneously carry a file, directory, drive, mount, and/or option role;
//! an [`Event`] is one of the sealed variants a filesystem reports through
//! the observer network.
//!
//! # Design
//!
//! Rather than a deep decorator-inheritance chain, [`EventDecorator`] and
//! [`EntryDecorator`] each wrap the original value and override only the
//! fields the decoration changes (observer/path/new-path for events;
//! filesystem/path/option-modifier for entries), forwarding every other
//! accessor to the inner value so downcasting consumers keep working.
//!
//! # Invariants
//!
//! - Decorating a value never drops a role: every accessor on the original
//!   remains reachable through the decorator.
//! - [`EntryDecorator::option`] exposes the **intersection** of its option
//!   modifier and the wrapped entry's own option role.
//! - [`MergedEntry`] takes field values from its primary entry, falling back
//!   to the secondary only where the primary's field is absent.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use vfs_error::VfsError;
use vfs_options::OptionBag;

/// Identifies the filesystem (VFS instance) that produced a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilesystemId(Arc<str>);

impl FilesystemId {
    /// Creates a new filesystem identity from a human-readable label.
    #[must_use]
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self(label.into())
    }
}

impl fmt::Display for FilesystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A virtual filesystem path, re-exported here so downstream crates depend
/// on a single canonical path type.
pub use vfs_path::VPath;

/// Bit-level file attributes. Modeled as discrete booleans (rather than a
/// packed bitmask) since back-ends rarely need every bit and the fields read
/// clearly at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttributes {
    /// The entry is read-only.
    pub readonly: bool,
    /// The entry is hidden from ordinary listings.
    pub hidden: bool,
    /// The entry is a back-end-internal/system object.
    pub system: bool,
    /// The entry has been modified since its last archival.
    pub archive: bool,
    /// The entry is a symbolic link.
    pub symlink: bool,
}

/// The file role of an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileRole {
    /// The file's length in bytes, or `-1` if unknown.
    pub length: i64,
    /// Optional file-attribute bits.
    pub attributes: Option<FileAttributes>,
    /// Optional physical (back-end-native) path.
    pub physical_path: Option<String>,
}

/// The directory role of an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryRole {
    /// Optional physical (back-end-native) path.
    pub physical_path: Option<String>,
}

/// The kind of storage device a drive role describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveType {
    /// A fixed, locally attached drive.
    Fixed,
    /// A removable drive (USB, SD card, etc.).
    Removable,
    /// A network-attached share.
    Network,
    /// An in-memory (RAM-backed) drive.
    Ram,
    /// An optical drive.
    Cdrom,
    /// A drive of unknown or unclassified type.
    Unknown,
}

/// The drive role of an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveRole {
    /// The drive's storage class.
    pub drive_type: DriveType,
    /// Free space in bytes, or `-1` if unknown.
    pub free_space: i64,
    /// Total capacity in bytes, or `-1` if unknown.
    pub total_size: i64,
    /// Optional volume label.
    pub label: Option<String>,
    /// Optional filesystem format name (e.g. `"ext4"`).
    pub format: Option<String>,
}

/// A single `(back-end, option)` assignment as it appears on a [`MountRole`].
///
/// The back-end itself is identified by a display label rather than a trait
/// object: `vfs-model` has no dependency on `vfs-backend`, keeping the
/// snapshot types free of the mount tree's live back-end handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountAssignment {
    /// A human-readable identifier for the assigned back-end.
    pub backend_label: String,
    /// The mount-time option bag attached to this assignment.
    pub option: OptionBag,
}

/// The mount role of an [`Entry`]: carries the assignment list
/// active at a mountpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRole {
    /// The assignments mounted at this path, in precedence order.
    pub assignments: Vec<MountAssignment>,
}

/// The option role of an [`Entry`]: per-entry option overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionRole {
    /// The option bag attached directly to this entry.
    pub option: OptionBag,
}

/// An immutable point-in-time snapshot of a file, directory, drive, mount,
/// or any combination thereof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    filesystem: FilesystemId,
    path: VPath,
    last_modified: SystemTime,
    last_access: SystemTime,
    file: Option<FileRole>,
    directory: Option<DirectoryRole>,
    drive: Option<DriveRole>,
    mount: Option<MountRole>,
    option: Option<OptionRole>,
}

impl Entry {
    /// Builds a bare entry carrying only the fields every entry must have.
    #[must_use]
    pub fn new(
        filesystem: FilesystemId,
        path: VPath,
        last_modified: SystemTime,
        last_access: SystemTime,
    ) -> Self {
        Self {
            filesystem,
            path,
            last_modified,
            last_access,
            file: None,
            directory: None,
            drive: None,
            mount: None,
            option: None,
        }
    }

    /// Attaches a file role.
    #[must_use]
    pub fn with_file(mut self, role: FileRole) -> Self {
        self.file = Some(role);
        self
    }

    /// Attaches a directory role.
    #[must_use]
    pub fn with_directory(mut self, role: DirectoryRole) -> Self {
        self.directory = Some(role);
        self
    }

    /// Attaches a drive role.
    #[must_use]
    pub fn with_drive(mut self, role: DriveRole) -> Self {
        self.drive = Some(role);
        self
    }

    /// Attaches a mount role.
    #[must_use]
    pub fn with_mount(mut self, role: MountRole) -> Self {
        self.mount = Some(role);
        self
    }

    /// Attaches an option role.
    #[must_use]
    pub fn with_option(mut self, role: OptionRole) -> Self {
        self.option = Some(role);
        self
    }

    /// The owning filesystem's identity.
    #[must_use]
    pub const fn filesystem(&self) -> &FilesystemId {
        &self.filesystem
    }

    /// The entry's path.
    #[must_use]
    pub const fn path(&self) -> &VPath {
        &self.path
    }

    /// The entry's leaf (final segment) name, or `None` at the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.path.leaf()
    }

    /// Last-modified timestamp.
    #[must_use]
    pub const fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    /// Last-access timestamp.
    #[must_use]
    pub const fn last_access(&self) -> SystemTime {
        self.last_access
    }

    /// The file role, if present.
    #[must_use]
    pub const fn file(&self) -> Option<&FileRole> {
        self.file.as_ref()
    }

    /// The directory role, if present.
    #[must_use]
    pub const fn directory(&self) -> Option<&DirectoryRole> {
        self.directory.as_ref()
    }

    /// The drive role, if present.
    #[must_use]
    pub const fn drive(&self) -> Option<&DriveRole> {
        self.drive.as_ref()
    }

    /// The mount role, if present. A non-`None` value means this entry's
    /// path is a mountpoint.
    #[must_use]
    pub const fn mount(&self) -> Option<&MountRole> {
        self.mount.as_ref()
    }

    /// The option role, if present.
    #[must_use]
    pub const fn option(&self) -> Option<&OptionRole> {
        self.option.as_ref()
    }

    /// Convenience check: does this entry carry a directory role?
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        self.directory.is_some()
    }

    /// Convenience check: does this entry carry a file role?
    #[must_use]
    pub const fn is_file(&self) -> bool {
        self.file.is_some()
    }

    /// Convenience check: is this entry a mountpoint?
    #[must_use]
    pub const fn is_mountpoint(&self) -> bool {
        self.mount.is_some()
    }

    /// Builds a new owned entry that takes non-null fields from `primary`,
    /// falling back to `secondary`.
    #[must_use]
    pub fn merge(primary: &Self, secondary: &Self) -> Self {
        Self {
            filesystem: primary.filesystem.clone(),
            path: primary.path.clone(),
            last_modified: primary.last_modified,
            last_access: primary.last_access,
            file: primary.file.clone().or_else(|| secondary.file.clone()),
            directory: primary
                .directory
                .clone()
                .or_else(|| secondary.directory.clone()),
            drive: primary.drive.clone().or_else(|| secondary.drive.clone()),
            mount: primary.mount.clone().or_else(|| secondary.mount.clone()),
            option: primary.option.clone().or_else(|| secondary.option.clone()),
        }
    }

    /// Re-publishes this entry under a new filesystem identity.
    #[must_use]
    pub fn with_new_filesystem(mut self, filesystem: FilesystemId) -> Self {
        self.filesystem = filesystem;
        self
    }

    /// Re-publishes this entry under a new filesystem identity and path.
    #[must_use]
    pub fn with_new_filesystem_and_path(mut self, filesystem: FilesystemId, path: VPath) -> Self {
        self.filesystem = filesystem;
        self.path = path;
        self
    }

    /// Re-publishes this entry under a new filesystem identity, path, and
    /// option modifier, exposing the **intersection** of `option_modifier`
    /// and this entry's own option role.
    ///
    /// # Errors
    ///
    /// Propagates [`VfsError::OptionOperationNotSupported`] if the modifier
    /// cannot be intersected with the entry's existing option role.
    pub fn with_new_filesystem_path_and_option_modifier(
        mut self,
        filesystem: FilesystemId,
        path: VPath,
        option_modifier: OptionBag,
    ) -> Result<Self, VfsError> {
        self.filesystem = filesystem;
        self.path = path;
        let combined = match &self.option {
            Some(existing) => existing.option.intersect_with(&option_modifier)?,
            None => option_modifier,
        };
        self.option = Some(OptionRole { option: combined });
        Ok(self)
    }
}

/// The sealed set of filesystem change-event variants.
#[derive(Debug)]
#[non_exhaustive]
pub enum Event {
    /// Emitted exactly once, before any other event, when a subscription
    /// begins delivering.
    Start,
    /// An entry was created at `path`.
    Create(VPath),
    /// An entry at `path` changed.
    Change(VPath),
    /// An entry at `path` was deleted.
    Delete(VPath),
    /// An entry was renamed from `old_path` to `new_path`.
    Rename(VPath, VPath),
    /// A back-end or dispatch error occurred, optionally attributable to a
    /// path.
    Error(VfsError, Option<VPath>),
    /// A mount was installed at `path`.
    Mount(VPath, Vec<MountAssignment>, OptionBag),
    /// A mount was removed from `path`.
    Unmount(VPath),
}

impl Event {
    /// The primary path carried by this event, if any. `Start` carries no
    /// path; `Rename` reports its *old* path here (see
    /// [`Event::new_path`] for the destination).
    #[must_use]
    pub const fn path(&self) -> Option<&VPath> {
        match self {
            Self::Create(p) | Self::Change(p) | Self::Delete(p) | Self::Mount(p, _, _) | Self::Unmount(p) => {
                Some(p)
            }
            Self::Rename(old, _) => Some(old),
            Self::Error(_, p) => p.as_ref(),
            Self::Start => None,
        }
    }

    /// The destination path of a [`Event::Rename`], if this is one.
    #[must_use]
    pub const fn new_path(&self) -> Option<&VPath> {
        match self {
            Self::Rename(_, new) => Some(new),
            _ => None,
        }
    }

    /// The carried error, if this is an [`Event::Error`].
    #[must_use]
    pub const fn error(&self) -> Option<&VfsError> {
        match self {
            Self::Error(e, _) => Some(e),
            _ => None,
        }
    }
}

/// Opaque identifier for an observer subscription, carried by every
/// dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// An [`Event`] together with the observer that emitted it and the
/// event-time.
#[derive(Debug)]
pub struct EventEnvelope {
    /// The underlying event.
    pub event: Event,
    /// The observer subscription that emitted this event.
    pub observer: ObserverId,
    /// The wall-clock time the event was produced.
    pub time: SystemTime,
}

impl EventEnvelope {
    /// Builds a new envelope.
    #[must_use]
    pub fn new(event: Event, observer: ObserverId, time: SystemTime) -> Self {
        Self { event, observer, time }
    }
}

/// Re-publishes an [`EventEnvelope`] under a new observer identity and/or
/// rewritten path(s), without copying the underlying event.
#[derive(Debug)]
pub struct EventDecorator {
    inner: Box<EventEnvelope>,
    observer_override: Option<ObserverId>,
    path_override: Option<VPath>,
    new_path_override: Option<VPath>,
}

impl EventDecorator {
    /// Wraps `inner` with no overrides yet applied.
    #[must_use]
    pub fn new(inner: EventEnvelope) -> Self {
        Self {
            inner: Box::new(inner),
            observer_override: None,
            path_override: None,
            new_path_override: None,
        }
    }

    /// Re-identifies the observer that appears to have emitted this event.
    #[must_use]
    pub fn with_observer(mut self, observer: ObserverId) -> Self {
        self.observer_override = Some(observer);
        self
    }

    /// Rewrites the primary path.
    #[must_use]
    pub fn with_path(mut self, path: VPath) -> Self {
        self.path_override = Some(path);
        self
    }

    /// Rewrites the rename destination path.
    #[must_use]
    pub fn with_new_path(mut self, new_path: VPath) -> Self {
        self.new_path_override = Some(new_path);
        self
    }

    /// The effective observer identity.
    #[must_use]
    pub fn observer(&self) -> ObserverId {
        self.observer_override.unwrap_or(self.inner.observer)
    }

    /// The effective primary path.
    #[must_use]
    pub fn path(&self) -> Option<&VPath> {
        self.path_override.as_ref().or_else(|| self.inner.event.path())
    }

    /// The effective rename destination path.
    #[must_use]
    pub fn new_path(&self) -> Option<&VPath> {
        self.new_path_override
            .as_ref()
            .or_else(|| self.inner.event.new_path())
    }

    /// The event-time, unaffected by decoration.
    #[must_use]
    pub fn time(&self) -> SystemTime {
        self.inner.time
    }

    /// The carried error, if the underlying event is an [`Event::Error`].
    #[must_use]
    pub fn error(&self) -> Option<&VfsError> {
        self.inner.event.error()
    }

    /// Borrows the underlying event, unaffected by decoration.
    #[must_use]
    pub fn inner_event(&self) -> &Event {
        &self.inner.event
    }

    /// Consumes the decorator, yielding its underlying envelope.
    #[must_use]
    pub fn into_inner(self) -> EventEnvelope {
        *self.inner
    }
}

/// Re-publishes an [`Entry`] under a new filesystem identity, path, and/or
/// option modifier without mutating the original.
#[derive(Debug)]
pub struct EntryDecorator {
    inner: Box<Entry>,
    filesystem_override: Option<FilesystemId>,
    path_override: Option<VPath>,
    option_modifier: Option<OptionBag>,
}

impl EntryDecorator {
    /// Wraps `inner` with no overrides yet applied.
    #[must_use]
    pub fn new(inner: Entry) -> Self {
        Self {
            inner: Box::new(inner),
            filesystem_override: None,
            path_override: None,
            option_modifier: None,
        }
    }

    /// Re-identifies the owning filesystem.
    #[must_use]
    pub fn with_new_filesystem(mut self, filesystem: FilesystemId) -> Self {
        self.filesystem_override = Some(filesystem);
        self
    }

    /// Rewrites the path.
    #[must_use]
    pub fn with_path(mut self, path: VPath) -> Self {
        self.path_override = Some(path);
        self
    }

    /// Attaches an option modifier whose effective value is the
    /// intersection of the modifier and the wrapped entry's own option role.
    #[must_use]
    pub fn with_option_modifier(mut self, modifier: OptionBag) -> Self {
        self.option_modifier = Some(modifier);
        self
    }

    /// The effective filesystem identity.
    #[must_use]
    pub fn filesystem(&self) -> &FilesystemId {
        self.filesystem_override.as_ref().unwrap_or_else(|| self.inner.filesystem())
    }

    /// The effective path.
    #[must_use]
    pub fn path(&self) -> &VPath {
        self.path_override.as_ref().unwrap_or_else(|| self.inner.path())
    }

    /// The effective option, computed as the intersection of the attached
    /// modifier and the wrapped entry's option role, if any.
    ///
    /// # Errors
    ///
    /// Propagates [`VfsError::OptionOperationNotSupported`] when the
    /// modifier cannot be intersected with the wrapped entry's option role.
    pub fn option(&self) -> Result<Option<OptionBag>, VfsError> {
        match (&self.option_modifier, self.inner.option()) {
            (Some(modifier), Some(role)) => Ok(Some(role.option.intersect_with(modifier)?)),
            (Some(modifier), None) => Ok(Some(modifier.clone())),
            (None, Some(role)) => Ok(Some(role.option.clone())),
            (None, None) => Ok(None),
        }
    }

    /// Materializes a concrete, owned [`Entry`] reflecting every override.
    ///
    /// # Errors
    ///
    /// Propagates [`VfsError::OptionOperationNotSupported`] from
    /// [`EntryDecorator::option`].
    pub fn materialize(self) -> Result<Entry, VfsError> {
        let option = self.option()?;
        let mut entry = *self.inner;
        if let Some(fs) = self.filesystem_override {
            entry = entry.with_new_filesystem(fs);
        }
        if let Some(path) = self.path_override {
            entry.path = path;
        }
        if let Some(option) = option {
            entry = entry.with_option(OptionRole { option });
        }
        Ok(entry)
    }
}

/// A view that takes field values from `primary`, falling back to
/// `secondary` for absent fields, without eagerly materializing a merged
/// [`Entry`].
#[derive(Debug)]
pub struct MergedEntry<'a> {
    primary: &'a Entry,
    secondary: &'a Entry,
}

impl<'a> MergedEntry<'a> {
    /// Builds a merged view over two entries.
    #[must_use]
    pub fn new(primary: &'a Entry, secondary: &'a Entry) -> Self {
        Self { primary, secondary }
    }

    /// The file role, preferring `primary`.
    #[must_use]
    pub fn file(&self) -> Option<&FileRole> {
        self.primary.file().or_else(|| self.secondary.file())
    }

    /// The directory role, preferring `primary`.
    #[must_use]
    pub fn directory(&self) -> Option<&DirectoryRole> {
        self.primary.directory().or_else(|| self.secondary.directory())
    }

    /// The drive role, preferring `primary`.
    #[must_use]
    pub fn drive(&self) -> Option<&DriveRole> {
        self.primary.drive().or_else(|| self.secondary.drive())
    }

    /// Materializes the merge into a concrete, owned [`Entry`].
    #[must_use]
    pub fn materialize(&self) -> Entry {
        Entry::merge(self.primary, self.secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn fs() -> FilesystemId {
        FilesystemId::new("test-fs")
    }

    fn sample_entry(path: &str) -> Entry {
        Entry::new(fs(), VPath::from(path), UNIX_EPOCH, UNIX_EPOCH)
    }

    #[test]
    fn merge_prefers_primary_file_role() {
        let primary = sample_entry("/a").with_file(FileRole {
            length: 10,
            ..Default::default()
        });
        let secondary = sample_entry("/a").with_file(FileRole {
            length: 99,
            ..Default::default()
        });
        let merged = Entry::merge(&primary, &secondary);
        assert_eq!(merged.file().unwrap().length, 10);
    }

    #[test]
    fn merge_falls_back_to_secondary_when_primary_absent() {
        let primary = sample_entry("/a");
        let secondary = sample_entry("/a").with_directory(DirectoryRole::default());
        let merged = Entry::merge(&primary, &secondary);
        assert!(merged.is_directory());
    }

    #[test]
    fn merged_entry_view_matches_materialized_entry() {
        let primary = sample_entry("/a");
        let secondary = sample_entry("/a").with_directory(DirectoryRole::default());
        let view = MergedEntry::new(&primary, &secondary);
        assert!(view.directory().is_some());
        assert!(view.materialize().is_directory());
    }

    #[test]
    fn event_decorator_rewrites_path_without_consuming_original_fields() {
        let envelope = EventEnvelope::new(Event::Create(VPath::from("/child/a")), ObserverId(1), UNIX_EPOCH);
        let decorated = EventDecorator::new(envelope)
            .with_observer(ObserverId(2))
            .with_path(VPath::from("/parent/a"));
        assert_eq!(decorated.observer(), ObserverId(2));
        assert_eq!(decorated.path(), Some(&VPath::from("/parent/a")));
        assert!(matches!(decorated.inner_event(), Event::Create(_)));
    }

    #[test]
    fn event_decorator_preserves_rename_new_path_when_undecorated() {
        let envelope = EventEnvelope::new(
            Event::Rename(VPath::from("/a"), VPath::from("/b")),
            ObserverId(1),
            UNIX_EPOCH,
        );
        let decorated = EventDecorator::new(envelope);
        assert_eq!(decorated.new_path(), Some(&VPath::from("/b")));
    }

    #[test]
    fn entry_decorator_intersects_option_modifier_with_existing_role() {
        use vfs_options::{OptionBag as Bag, OptionKind, OptionValue};

        let existing = Bag::new().with(OptionKind::Write, OptionValue::bool(true));
        let entry = sample_entry("/a").with_option(OptionRole { option: existing });
        let modifier = Bag::new().with(OptionKind::Write, OptionValue::bool(false));
        let decorated = EntryDecorator::new(entry).with_option_modifier(modifier);
        let option = decorated.option().unwrap().unwrap();
        assert!(!option.is_enabled(OptionKind::Write));
    }

    #[test]
    fn entry_decorator_materialize_applies_all_overrides() {
        let entry = sample_entry("/a");
        let decorated = EntryDecorator::new(entry)
            .with_new_filesystem(FilesystemId::new("other-fs"))
            .with_path(VPath::from("/b"));
        let materialized = decorated.materialize().unwrap();
        assert_eq!(materialized.filesystem(), &FilesystemId::new("other-fs"));
        assert_eq!(materialized.path(), &VPath::from("/b"));
    }
}
