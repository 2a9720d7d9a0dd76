#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! An in-memory [`vfs_backend::Backend`] implementation, [`MemoryBackend`],
//! used only by this workspace's own test suites. It is not exported to
//! downstream users of the virtual filesystem facade.
//!
//! # Design
//!
//! The whole tree lives behind one `Mutex<MemNode>`, mirroring the mount
//! tree's single-lock discipline: a test back-end has no need for
//! finer-grained locking, and keeping the locking story identical to the
//! production mount tree makes concurrency bugs in composer code reproduce
//! reliably under test.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use vfs_backend::{Backend, BackendCapabilities, BackendSubscription, OpenMode, VfsFile};
use vfs_error::{VfsError, VfsResult};
use vfs_model::{DirectoryRole, Entry, Event, FileRole, FilesystemId};
use vfs_options::OptionBag;
use vfs_path::{GlobFilter, VPath};

enum MemKind {
    File(Vec<u8>),
    Directory(BTreeMap<String, MemNode>),
}

struct MemNode {
    kind: MemKind,
    modified: SystemTime,
}

impl MemNode {
    fn new_directory() -> Self {
        Self {
            kind: MemKind::Directory(BTreeMap::new()),
            modified: SystemTime::now(),
        }
    }

    fn new_file(contents: Vec<u8>) -> Self {
        Self {
            kind: MemKind::File(contents),
            modified: SystemTime::now(),
        }
    }

    fn as_directory(&self) -> VfsResult<&BTreeMap<String, MemNode>> {
        match &self.kind {
            MemKind::Directory(children) => Ok(children),
            MemKind::File(_) => Err(VfsError::PathInvalid("not a directory".to_owned())),
        }
    }

    fn as_directory_mut(&mut self) -> VfsResult<&mut BTreeMap<String, MemNode>> {
        match &mut self.kind {
            MemKind::Directory(children) => Ok(children),
            MemKind::File(_) => Err(VfsError::PathInvalid("not a directory".to_owned())),
        }
    }
}

fn navigate<'a>(root: &'a MemNode, segments: &[&str]) -> VfsResult<&'a MemNode> {
    let mut node = root;
    for segment in segments {
        let children = node.as_directory()?;
        node = children
            .get(*segment)
            .ok_or_else(|| VfsError::NotFound(segment.to_string()))?;
    }
    Ok(node)
}

fn navigate_mut<'a>(root: &'a mut MemNode, segments: &[&str]) -> VfsResult<&'a mut MemNode> {
    let mut node = root;
    for segment in segments {
        let children = node.as_directory_mut()?;
        node = children
            .get_mut(*segment)
            .ok_or_else(|| VfsError::NotFound(segment.to_string()))?;
    }
    Ok(node)
}

fn entry_from_node(node: &MemNode, path: &VPath, fs: &FilesystemId) -> Entry {
    let entry = Entry::new(fs.clone(), path.clone(), node.modified, node.modified);
    match &node.kind {
        MemKind::Directory(_) => entry.with_directory(DirectoryRole::default()),
        MemKind::File(data) => entry.with_file(FileRole {
            length: data.len() as i64,
            attributes: None,
            physical_path: None,
        }),
    }
}

struct Subscriber {
    filter: GlobFilter,
    sender: crossbeam_channel::Sender<Event>,
}

/// An in-memory storage back-end, suitable for exercising the mount tree,
/// composer, and operation engine without touching the real filesystem.
pub struct MemoryBackend {
    fs: FilesystemId,
    root: Arc<Mutex<MemNode>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Builds an empty in-memory back-end.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fs: FilesystemId::new("memory"),
            root: Arc::new(Mutex::new(MemNode::new_directory())),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Seeds a file at `path` with `contents`, creating parent directories
    /// that do not yet exist. Intended for test fixture setup.
    ///
    /// # Panics
    ///
    /// Panics if an ancestor of `path` already exists as a file.
    pub fn seed_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let mut root = self.root.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let segments: Vec<&str> = VPath::from(path).segments().collect();
        let Some((leaf, ancestors)) = segments.split_last() else {
            return;
        };
        let mut node = &mut *root;
        for segment in ancestors {
            let children = node.as_directory_mut().expect("ancestor is a directory");
            node = children
                .entry((*segment).to_owned())
                .or_insert_with(MemNode::new_directory);
        }
        let children = node.as_directory_mut().expect("parent is a directory");
        children.insert((*leaf).to_owned(), MemNode::new_file(contents.into()));
    }

    /// Seeds an empty directory at `path`, creating missing ancestors.
    pub fn seed_directory(&self, path: &str) {
        let mut root = self.root.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut node = &mut *root;
        for segment in VPath::from(path).segments() {
            let children = node.as_directory_mut().expect("ancestor is a directory");
            node = children
                .entry(segment.to_owned())
                .or_insert_with(MemNode::new_directory);
        }
    }

    fn emit(&self, path: &VPath, make: impl Fn(VPath) -> Event) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subscribers.retain(|sub| {
            if sub.filter.is_match(path.as_str()) {
                sub.sender.send(make(path.clone())).is_ok()
            } else {
                true
            }
        });
    }
}

struct MemorySubscription {
    receiver: crossbeam_channel::Receiver<Event>,
}

impl BackendSubscription for MemorySubscription {
    fn events(&self) -> &crossbeam_channel::Receiver<Event> {
        &self.receiver
    }
}

/// An open handle onto a [`MemoryBackend`] file.
///
/// Writes accumulate in a private buffer and are committed back into the
/// tree on [`VfsFile::close`] (or when the handle is dropped after a prior
/// `close`), matching the copy-on-write discipline a buffered file handle
/// would use against a remote back-end.
pub struct MemoryFile {
    tree: Arc<Mutex<MemNode>>,
    path: VPath,
    buffer: Cursor<Vec<u8>>,
    write: bool,
    dirty: bool,
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.write {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file not opened for writing"));
        }
        self.dirty = true;
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit().map_err(|e| io::Error::other(e.to_string()))
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer.seek(pos)
    }
}

impl MemoryFile {
    fn commit(&mut self) -> VfsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut root = self.tree.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let segments: Vec<&str> = self.path.segments().collect();
        let Some((leaf, ancestors)) = segments.split_last() else {
            return Err(VfsError::PathInvalid("cannot write to the root".to_owned()));
        };
        let parent = navigate_mut(&mut root, ancestors)?;
        let children = parent.as_directory_mut()?;
        let contents = self.buffer.get_ref().clone();
        children.insert((*leaf).to_owned(), MemNode::new_file(contents));
        self.dirty = false;
        Ok(())
    }
}

impl VfsFile for MemoryFile {
    fn close(&mut self) -> VfsResult<()> {
        self.commit()
    }
}

impl Drop for MemoryFile {
    fn drop(&mut self) {
        let _ = self.commit();
    }
}

impl Backend for MemoryBackend {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::read_write()
    }

    fn browse(&self, path: &VPath, _options: &OptionBag) -> VfsResult<Vec<Entry>> {
        let root = self.root.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let segments: Vec<&str> = path.segments().collect();
        let node = navigate(&root, &segments)?;
        let children = node.as_directory()?;
        Ok(children
            .iter()
            .map(|(name, child)| entry_from_node(child, &path.join(name), &self.fs))
            .collect())
    }

    fn get_entry(&self, path: &VPath, _options: &OptionBag) -> VfsResult<Entry> {
        let root = self.root.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if path.is_root() {
            return Ok(entry_from_node(&root, path, &self.fs));
        }
        let segments: Vec<&str> = path.segments().collect();
        let node = navigate(&root, &segments)?;
        Ok(entry_from_node(node, path, &self.fs))
    }

    fn open(&self, path: &VPath, mode: OpenMode, _options: &OptionBag) -> VfsResult<Box<dyn VfsFile>> {
        let initial = {
            let mut root = self.root.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let segments: Vec<&str> = path.segments().collect();
            match navigate(&root, &segments) {
                Ok(node) => match &node.kind {
                    MemKind::File(data) => {
                        if mode.truncate {
                            Vec::new()
                        } else {
                            data.clone()
                        }
                    }
                    MemKind::Directory(_) => {
                        return Err(VfsError::PathInvalid(format!("{path} is a directory")));
                    }
                },
                Err(_) if mode.create => {
                    let Some((leaf, ancestors)) = segments.split_last() else {
                        return Err(VfsError::PathInvalid("cannot create the root".to_owned()));
                    };
                    let parent = navigate_mut(&mut root, ancestors)?;
                    let children = parent.as_directory_mut()?;
                    children.insert((*leaf).to_owned(), MemNode::new_file(Vec::new()));
                    Vec::new()
                }
                Err(e) => return Err(e),
            }
        };
        let mut buffer = Cursor::new(initial);
        if mode.append {
            buffer.seek(SeekFrom::End(0)).map_err(VfsError::io)?;
        }
        Ok(Box::new(MemoryFile {
            tree: Arc::clone(&self.root),
            path: path.clone(),
            buffer,
            write: mode.write,
            dirty: false,
        }) as Box<dyn VfsFile>)
    }

    fn create_directory(&self, path: &VPath, _options: &OptionBag) -> VfsResult<()> {
        let mut root = self.root.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let segments: Vec<&str> = path.segments().collect();
        let Some((leaf, ancestors)) = segments.split_last() else {
            return Err(VfsError::AlreadyExists {
                kind: vfs_error::ExistsKind::Directory,
                path: path.as_str().to_owned(),
            });
        };
        let parent = navigate_mut(&mut root, ancestors)?;
        let children = parent.as_directory_mut()?;
        if children.contains_key(*leaf) {
            return Err(VfsError::AlreadyExists {
                kind: vfs_error::ExistsKind::Directory,
                path: path.as_str().to_owned(),
            });
        }
        children.insert((*leaf).to_owned(), MemNode::new_directory());
        drop(root);
        self.emit(path, Event::Create);
        Ok(())
    }

    fn delete(&self, path: &VPath, _options: &OptionBag) -> VfsResult<()> {
        let mut root = self.root.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let segments: Vec<&str> = path.segments().collect();
        let Some((leaf, ancestors)) = segments.split_last() else {
            return Err(VfsError::PathInvalid("cannot delete the root".to_owned()));
        };
        let parent = navigate_mut(&mut root, ancestors)?;
        let children = parent.as_directory_mut()?;
        match children.get(*leaf) {
            Some(node) => {
                if let MemKind::Directory(inner) = &node.kind {
                    if !inner.is_empty() {
                        return Err(VfsError::NotEmpty(path.as_str().to_owned()));
                    }
                }
            }
            None => return Err(VfsError::NotFound(path.as_str().to_owned())),
        }
        children.remove(*leaf);
        drop(root);
        self.emit(path, Event::Delete);
        Ok(())
    }

    fn move_entry(&self, from: &VPath, to: &VPath, _options: &OptionBag) -> VfsResult<()> {
        let mut root = self.root.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let from_segments: Vec<&str> = from.segments().collect();
        let to_segments: Vec<&str> = to.segments().collect();
        let Some((from_leaf, from_ancestors)) = from_segments.split_last() else {
            return Err(VfsError::PathInvalid("cannot move the root".to_owned()));
        };
        let Some((to_leaf, to_ancestors)) = to_segments.split_last() else {
            return Err(VfsError::PathInvalid("cannot move onto the root".to_owned()));
        };
        let from_parent = navigate_mut(&mut root, from_ancestors)?;
        let removed = from_parent
            .as_directory_mut()?
            .remove(*from_leaf)
            .ok_or_else(|| VfsError::NotFound(from.as_str().to_owned()))?;
        let to_parent = navigate_mut(&mut root, to_ancestors)?;
        let to_children = to_parent.as_directory_mut()?;
        if to_children.contains_key(*to_leaf) {
            return Err(VfsError::AlreadyExists {
                kind: vfs_error::ExistsKind::Entry,
                path: to.as_str().to_owned(),
            });
        }
        to_children.insert((*to_leaf).to_owned(), removed);
        drop(root);
        let (from_clone, to_clone) = (from.clone(), to.clone());
        self.emit(to, move |_| Event::Rename(from_clone.clone(), to_clone.clone()));
        Ok(())
    }

    fn observe(&self, filter: &GlobFilter, _options: &OptionBag) -> VfsResult<Box<dyn BackendSubscription>> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subscribers.push(Subscriber {
            filter: filter.clone(),
            sender,
        });
        Ok(Box::new(MemorySubscription { receiver }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_and_browse_lists_children() {
        let backend = MemoryBackend::new();
        backend.seed_file("a.txt", b"hi".to_vec());
        backend.seed_directory("sub");
        let entries = backend.browse(&VPath::root(), &OptionBag::new()).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn open_read_returns_seeded_contents() {
        let backend = MemoryBackend::new();
        backend.seed_file("a.txt", b"hello".to_vec());
        let mut file = backend
            .open(&VPath::from("a.txt"), OpenMode::read(), &OptionBag::new())
            .unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn open_write_then_read_round_trips() {
        let backend = MemoryBackend::new();
        {
            let mut file = backend
                .open(&VPath::from("b.txt"), OpenMode::write_truncate(), &OptionBag::new())
                .unwrap();
            file.write_all(b"world").unwrap();
            file.close().unwrap();
        }
        let mut file = backend
            .open(&VPath::from("b.txt"), OpenMode::read(), &OptionBag::new())
            .unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"world");
    }

    #[test]
    fn delete_nonempty_directory_fails() {
        let backend = MemoryBackend::new();
        backend.seed_file("dir/a.txt", b"x".to_vec());
        assert!(backend.delete(&VPath::from("dir"), &OptionBag::new()).is_err());
    }

    #[test]
    fn move_entry_relocates_and_emits_rename() {
        let backend = MemoryBackend::new();
        backend.seed_file("a.txt", b"x".to_vec());
        let sub = backend
            .observe(&GlobFilter::match_all(), &OptionBag::new())
            .unwrap();
        backend
            .move_entry(&VPath::from("a.txt"), &VPath::from("b.txt"), &OptionBag::new())
            .unwrap();
        assert!(backend.get_entry(&VPath::from("b.txt"), &OptionBag::new()).is_ok());
        let event = sub.events().recv().unwrap();
        assert!(matches!(event, Event::Rename(_, _)));
    }
}
