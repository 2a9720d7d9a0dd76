//! Recursively moves a directory tree: the destination is built up by copy,
//! and the source is removed behind it, directory by directory, bottom-up.

use std::collections::HashSet;

use vfs_compose::Composer;
use vfs_error::VfsResult;
use vfs_options::OptionBag;
use vfs_path::{PathConverter, VPath};

use super::batch::Batch;
use super::copy_file::CopyFile;
use super::create_directory::CreateDirectory;
use super::delete::Delete;
use crate::operation::Operation;
use crate::policy::PolicyOverride;
use crate::session::OperationSession;
use crate::state::OperationState;

/// Recursively transfers everything under `source_root` to
/// `destination_root`: each file is copied then its source deleted, and
/// once a directory's children are all transferred its own now-empty source
/// directory is deleted too — a post-order walk, so a directory's source is
/// never removed before everything under it has been moved out.
///
/// Every `Delete` in the plan carries a reconstruction (a reverse `CopyFile`
/// for a transferred file, a `CreateDirectory` for a removed directory), so
/// rolling back a completed transfer restores the source tree and removes
/// the destination tree it built, in the reverse of the order it ran.
pub struct TransferTree {
    override_: PolicyOverride,
    source_root: VPath,
    destination_root: VPath,
    option: OptionBag,
    plan: Option<Batch>,
}

impl TransferTree {
    /// Transfers everything under `source_root` to `destination_root`.
    #[must_use]
    pub fn new(source_root: VPath, destination_root: VPath, option: OptionBag) -> Self {
        Self::with_override(source_root, destination_root, option, PolicyOverride::none())
    }

    /// Like [`TransferTree::new`], with an explicit policy override applied
    /// to every discovered operation.
    #[must_use]
    pub fn with_override(source_root: VPath, destination_root: VPath, option: OptionBag, override_: PolicyOverride) -> Self {
        Self {
            override_,
            source_root,
            destination_root,
            option,
            plan: None,
        }
    }

    fn build_plan(&self, composer: &Composer, omit_mounted: bool) -> VfsResult<Batch> {
        let converter = PathConverter::new(self.source_root.clone(), self.destination_root.clone());
        let mut ops: Vec<Box<dyn Operation>> = Vec::new();
        let mut visited = HashSet::new();
        walk(
            composer,
            &self.option,
            &converter,
            &self.source_root,
            &self.override_,
            omit_mounted,
            &mut visited,
            &mut ops,
        )?;
        Ok(Batch::new(ops))
    }

    fn ensure_plan(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<&mut Batch> {
        if self.plan.is_none() {
            let policy = session.policy().resolve(&self.override_);
            self.plan = Some(self.build_plan(composer, policy.omit_mounted_packages)?);
        }
        Ok(self.plan.as_mut().expect("just initialized"))
    }
}

#[allow(clippy::too_many_arguments)]
fn walk(
    composer: &Composer,
    option: &OptionBag,
    converter: &PathConverter,
    source: &VPath,
    override_: &PolicyOverride,
    omit_mounted: bool,
    visited: &mut HashSet<String>,
    ops: &mut Vec<Box<dyn Operation>>,
) -> VfsResult<()> {
    let entry = composer.get_entry(source, option)?;
    let Some(directory) = entry.directory() else {
        return Ok(());
    };
    if let Some(physical) = &directory.physical_path {
        if !visited.insert(physical.clone()) {
            return Ok(());
        }
    }

    let destination = VPath::from(converter.convert(source.as_str())?);
    ops.push(Box::new(CreateDirectory::with_override(
        destination.clone(),
        option.clone(),
        *override_,
    )));

    for child in composer.browse(source, option)? {
        if omit_mounted && child.is_mountpoint() {
            continue;
        }
        if child.is_directory() {
            walk(composer, option, converter, child.path(), override_, omit_mounted, visited, ops)?;
        } else if child.is_file() {
            let child_destination = VPath::from(converter.convert(child.path().as_str())?);
            ops.push(Box::new(CopyFile::with_override(
                child.path().clone(),
                child_destination.clone(),
                option.clone(),
                *override_,
            )));
            let reconstruction: Box<dyn Operation> = Box::new(CopyFile::with_override(
                child_destination,
                child.path().clone(),
                option.clone(),
                *override_,
            ));
            ops.push(Box::new(
                Delete::with_override(child.path().clone(), option.clone(), *override_).with_reconstruction(reconstruction),
            ));
        }
    }

    let reconstruction: Box<dyn Operation> = Box::new(CreateDirectory::with_override(source.clone(), option.clone(), *override_));
    ops.push(Box::new(
        Delete::with_override(source.clone(), option.clone(), *override_).with_reconstruction(reconstruction),
    ));
    Ok(())
}

impl Operation for TransferTree {
    fn state(&self) -> OperationState {
        self.plan.as_ref().map_or(OperationState::Initialized, Operation::state)
    }

    fn progress(&self) -> (i64, i64) {
        self.plan.as_ref().map_or((0, 0), Operation::progress)
    }

    fn estimate(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let plan = self.ensure_plan(composer, session)?;
        plan.estimate(composer, session)
    }

    fn run(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let plan = self.ensure_plan(composer, session)?;
        plan.run(composer, session)
    }

    fn rollback(&mut self) -> Option<Box<dyn Operation>> {
        self.plan.as_mut()?.rollback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;
    use crate::pool::BlockPool;
    use vfs_path::CaseSensitivity;
    use vfs_test_support::MemoryBackend;

    fn session() -> OperationSession {
        OperationSession::new(Policy::session_default(), BlockPool::new(1024, 4), 0)
    }

    fn composer_with_tree() -> Composer {
        let composer = Composer::new("t", CaseSensitivity::Sensitive);
        let backend = MemoryBackend::new();
        backend.seed_file("src/a.txt", b"one".to_vec());
        backend.seed_file("src/sub/b.txt", b"two".to_vec());
        composer
            .mount(
                &VPath::root(),
                vec![vfs_mount::LiveAssignment::new("mem", std::sync::Arc::new(backend), OptionBag::new())],
            )
            .unwrap();
        composer
    }

    #[test]
    fn transfer_tree_moves_content_and_removes_source_bottom_up() {
        let composer = composer_with_tree();
        let session = session();
        let mut op = TransferTree::new(VPath::from("src"), VPath::from("dst"), OptionBag::new());
        op.run(&composer, &session).unwrap();
        assert_eq!(op.state(), OperationState::Completed);
        assert!(composer.get_entry(&VPath::from("dst/a.txt"), &OptionBag::new()).is_ok());
        assert!(composer.get_entry(&VPath::from("dst/sub/b.txt"), &OptionBag::new()).is_ok());
        assert!(composer.get_entry(&VPath::from("src"), &OptionBag::new()).is_err());
    }

    #[test]
    fn rollback_restores_source_tree_and_removes_destination() {
        let composer = composer_with_tree();
        let session = session();
        let mut op = TransferTree::new(VPath::from("src"), VPath::from("dst"), OptionBag::new());
        op.run(&composer, &session).unwrap();

        let mut rollback = op.rollback().expect("completed transfer is reversible");
        rollback.run(&composer, &session).unwrap();

        assert!(composer.get_entry(&VPath::from("src/a.txt"), &OptionBag::new()).is_ok());
        assert!(composer.get_entry(&VPath::from("src/sub/b.txt"), &OptionBag::new()).is_ok());
        assert!(composer.get_entry(&VPath::from("dst"), &OptionBag::new()).is_err());
    }

    /// A back-end whose `a` and `a/b` directories report the same
    /// `physical_path`, standing in for a symlink loop: `a/b` is really a
    /// link back to (something that resolves to the same inode as) `a`.
    struct CyclicBackend;

    impl vfs_backend::Backend for CyclicBackend {
        fn capabilities(&self) -> vfs_backend::BackendCapabilities {
            vfs_backend::BackendCapabilities::read_only()
        }

        fn browse(&self, path: &VPath, _options: &OptionBag) -> VfsResult<Vec<vfs_model::Entry>> {
            let fs = vfs_model::FilesystemId::new("cyclic");
            let now = std::time::SystemTime::now();
            match path.as_str() {
                "a" => Ok(vec![vfs_model::Entry::new(fs, VPath::from("a/b"), now, now).with_directory(
                    vfs_model::DirectoryRole {
                        physical_path: Some("loop".to_owned()),
                    },
                )]),
                _ => Ok(Vec::new()),
            }
        }

        fn get_entry(&self, path: &VPath, _options: &OptionBag) -> VfsResult<vfs_model::Entry> {
            let fs = vfs_model::FilesystemId::new("cyclic");
            let now = std::time::SystemTime::now();
            match path.as_str() {
                "a" | "a/b" => Ok(vfs_model::Entry::new(fs, path.clone(), now, now).with_directory(vfs_model::DirectoryRole {
                    physical_path: Some("loop".to_owned()),
                })),
                _ => Err(vfs_error::VfsError::NotFound(path.as_str().to_owned())),
            }
        }

        fn open(&self, path: &VPath, _mode: vfs_backend::OpenMode, _options: &OptionBag) -> VfsResult<Box<dyn vfs_backend::VfsFile>> {
            Err(vfs_error::VfsError::NotFound(path.as_str().to_owned()))
        }

        fn create_directory(&self, _path: &VPath, _options: &OptionBag) -> VfsResult<()> {
            Err(vfs_error::VfsError::Unauthorized("read-only back-end".to_owned()))
        }

        fn delete(&self, _path: &VPath, _options: &OptionBag) -> VfsResult<()> {
            Err(vfs_error::VfsError::Unauthorized("read-only back-end".to_owned()))
        }

        fn move_entry(&self, _from: &VPath, _to: &VPath, _options: &OptionBag) -> VfsResult<()> {
            Err(vfs_error::VfsError::Unauthorized("read-only back-end".to_owned()))
        }

        fn observe(&self, _filter: &vfs_path::GlobFilter, _options: &OptionBag) -> VfsResult<Box<dyn vfs_backend::BackendSubscription>> {
            Err(vfs_error::VfsError::NotSupported)
        }
    }

    #[test]
    fn transfer_tree_does_not_recurse_through_a_symlink_loop() {
        let composer = Composer::new("t", CaseSensitivity::Sensitive);
        composer
            .mount(
                &VPath::root(),
                vec![vfs_mount::LiveAssignment::new("cyclic", std::sync::Arc::new(CyclicBackend), OptionBag::new())],
            )
            .unwrap();
        let session = session();
        let mut op = TransferTree::new(VPath::from("a"), VPath::from("dst"), OptionBag::new());

        // Only estimate: `a/b` is read-only and reports the same physical
        // path as `a`, so running the plan against it is not the point of
        // this test — what matters is that planning itself terminates with
        // a bounded op count instead of recursing through the loop forever.
        op.estimate(&composer, &session).unwrap();

        // One `CreateDirectory` for `a` plus its matching `Delete`; `a/b` is
        // rejected as a re-visit of the same physical path and contributes
        // nothing further to the plan.
        assert_eq!(op.progress(), (0, 2));
    }
}
