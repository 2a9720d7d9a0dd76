//! Recursively deletes a directory tree.

use vfs_compose::Composer;
use vfs_error::VfsResult;
use vfs_options::OptionBag;
use vfs_path::VPath;

use super::batch::Batch;
use super::delete::Delete;
use crate::operation::Operation;
use crate::policy::PolicyOverride;
use crate::session::OperationSession;
use crate::state::OperationState;

/// Recursively deletes everything under and including `root`.
///
/// Discovery order is pre-order (a directory before its children); deletion
/// order reverses that so every file is gone before the directory holding
/// it, and every child directory is gone before its parent. Rollback is
/// `None`: without caller-supplied reconstruction the engine has no way to
/// recreate content it has deleted.
pub struct DeleteTree {
    override_: PolicyOverride,
    root: VPath,
    option: OptionBag,
    plan: Option<Batch>,
}

impl DeleteTree {
    /// Deletes everything under and including `root`.
    #[must_use]
    pub fn new(root: VPath, option: OptionBag) -> Self {
        Self::with_override(root, option, PolicyOverride::none())
    }

    /// Like [`DeleteTree::new`], with an explicit policy override applied to
    /// every discovered `Delete`.
    #[must_use]
    pub fn with_override(root: VPath, option: OptionBag, override_: PolicyOverride) -> Self {
        Self {
            override_,
            root,
            option,
            plan: None,
        }
    }

    fn build_plan(&self, composer: &Composer) -> VfsResult<Batch> {
        let mut directories = Vec::new();
        let mut files = Vec::new();
        discover(composer, &self.option, &self.root, &mut directories, &mut files)?;

        let mut ops: Vec<Box<dyn Operation>> = files
            .into_iter()
            .map(|path| Box::new(Delete::with_override(path, self.option.clone(), self.override_)) as Box<dyn Operation>)
            .collect();
        ops.extend(
            directories
                .into_iter()
                .rev()
                .map(|path| Box::new(Delete::with_override(path, self.option.clone(), self.override_)) as Box<dyn Operation>),
        );
        Ok(Batch::new(ops))
    }

    fn ensure_plan(&mut self, composer: &Composer) -> VfsResult<&mut Batch> {
        if self.plan.is_none() {
            self.plan = Some(self.build_plan(composer)?);
        }
        Ok(self.plan.as_mut().expect("just initialized"))
    }
}

fn discover(composer: &Composer, option: &OptionBag, path: &VPath, directories: &mut Vec<VPath>, files: &mut Vec<VPath>) -> VfsResult<()> {
    let entry = composer.get_entry(path, option)?;
    if entry.is_directory() {
        directories.push(path.clone());
        for child in composer.browse(path, option)? {
            if child.is_directory() {
                discover(composer, option, child.path(), directories, files)?;
            } else if child.is_file() {
                files.push(child.path().clone());
            }
        }
    } else {
        files.push(path.clone());
    }
    Ok(())
}

impl Operation for DeleteTree {
    fn state(&self) -> OperationState {
        self.plan.as_ref().map_or(OperationState::Initialized, Operation::state)
    }

    fn progress(&self) -> (i64, i64) {
        self.plan.as_ref().map_or((0, 0), Operation::progress)
    }

    fn estimate(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let plan = self.ensure_plan(composer)?;
        plan.estimate(composer, session)
    }

    fn run(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let plan = self.ensure_plan(composer)?;
        plan.run(composer, session)
    }

    fn rollback(&mut self) -> Option<Box<dyn Operation>> {
        None
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
    fn delete_tree_removes_files_then_directories_bottom_up() {
        let composer = composer_with_tree();
        let session = session();
        let mut op = DeleteTree::new(VPath::from("src"), OptionBag::new());
        op.run(&composer, &session).unwrap();
        assert_eq!(op.state(), OperationState::Completed);
        assert!(composer.get_entry(&VPath::from("src"), &OptionBag::new()).is_err());
    }

    #[test]
    fn delete_tree_rollback_is_unavailable() {
        let composer = composer_with_tree();
        let session = session();
        let mut op = DeleteTree::new(VPath::from("src"), OptionBag::new());
        op.run(&composer, &session).unwrap();
        assert!(op.rollback().is_none());
    }
}
