//! Deletes a single entry, optionally carrying a caller-supplied
//! reconstruction to hand back from `rollback`.

use vfs_compose::Composer;
use vfs_error::{VfsError, VfsResult};
use vfs_options::OptionBag;
use vfs_path::VPath;

use crate::operation::Operation;
use crate::policy::{DestinationPolicy, Policy, PolicyOverride};
use crate::session::{OperationEvent, OperationSession};
use crate::state::OperationState;

/// Deletes the entry at `target`.
///
/// The engine cannot synthesize the deleted content on its own; callers that
/// need `rollback` to actually restore it attach a reconstruction with
/// [`Delete::with_reconstruction`] (typically a `CopyFile` or
/// `CreateDirectory` captured before the delete runs).
pub struct Delete {
    state: OperationState,
    override_: PolicyOverride,
    target: VPath,
    option: OptionBag,
    reconstruction: Option<Box<dyn Operation>>,
}

impl Delete {
    /// Deletes `target` using `option` for the underlying back-end call.
    #[must_use]
    pub fn new(target: VPath, option: OptionBag) -> Self {
        Self::with_override(target, option, PolicyOverride::none())
    }

    /// Like [`Delete::new`], with an explicit policy override.
    #[must_use]
    pub fn with_override(target: VPath, option: OptionBag, override_: PolicyOverride) -> Self {
        Self {
            state: OperationState::Initialized,
            override_,
            target,
            option,
            reconstruction: None,
        }
    }

    /// Attaches an operation that, if run, recreates what this delete is
    /// about to remove. Consumed by [`Operation::rollback`].
    #[must_use]
    pub fn with_reconstruction(mut self, reconstruction: Box<dyn Operation>) -> Self {
        self.reconstruction = Some(reconstruction);
        self
    }

    fn fail(&mut self, session: &OperationSession, policy: &Policy, err: &VfsError) {
        self.state = OperationState::Error;
        session.record(policy, OperationEvent::StateChanged(self.state));
        session.record(policy, OperationEvent::Error(err.to_string()));
    }
}

impl Operation for Delete {
    fn state(&self) -> OperationState {
        self.state
    }

    fn progress(&self) -> (i64, i64) {
        match self.state {
            OperationState::Completed | OperationState::Skipped => (1, 1),
            _ => (0, 1),
        }
    }

    fn estimate(&mut self, _composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let policy = session.policy().resolve(&self.override_);
        self.state = OperationState::Estimated;
        session.record(&policy, OperationEvent::StateChanged(self.state));
        Ok(())
    }

    fn run(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let policy = session.policy().resolve(&self.override_);
        self.state = OperationState::Running;
        session.record(&policy, OperationEvent::StateChanged(self.state));

        if session.cancellation().is_cancelled() {
            self.state = OperationState::Cancelled;
            session.record(&policy, OperationEvent::StateChanged(self.state));
            return Ok(());
        }

        match composer.delete(&self.target, &self.option) {
            Ok(()) => {
                self.state = OperationState::Completed;
                session.record(&policy, OperationEvent::StateChanged(self.state));
                Ok(())
            }
            Err(VfsError::NotFound(_)) if !matches!(policy.destination, DestinationPolicy::Throw) => {
                self.state = OperationState::Skipped;
                session.record(&policy, OperationEvent::StateChanged(self.state));
                Ok(())
            }
            Err(err) => {
                self.fail(session, &policy, &err);
                if policy.suppress_exception {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    fn rollback(&mut self) -> Option<Box<dyn Operation>> {
        if self.state != OperationState::Completed {
            return None;
        }
        self.reconstruction.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BlockPool;
    use vfs_path::CaseSensitivity;
    use vfs_test_support::MemoryBackend;

    fn session() -> OperationSession {
        OperationSession::new(Policy::session_default(), BlockPool::new(1024, 2), 0)
    }

    fn composer_with_file(path: &str) -> Composer {
        let composer = Composer::new("t", CaseSensitivity::Sensitive);
        let backend = MemoryBackend::new();
        backend.seed_file(path, b"hi");
        composer
            .mount(
                &VPath::root(),
                vec![vfs_mount::LiveAssignment::new("mem", std::sync::Arc::new(backend), OptionBag::new())],
            )
            .unwrap();
        composer
    }

    #[test]
    fn delete_removes_existing_entry() {
        let composer = composer_with_file("a.txt");
        let session = session();
        let mut op = Delete::new(VPath::from("a.txt"), OptionBag::new());
        op.run(&composer, &session).unwrap();
        assert_eq!(op.state(), OperationState::Completed);
        assert!(composer.get_entry(&VPath::from("a.txt"), &OptionBag::new()).is_err());
    }

    #[test]
    fn delete_absorbs_missing_target_under_non_throw_policy() {
        let composer = composer_with_file("a.txt");
        let session = session();
        let override_ = PolicyOverride::none().with_destination(DestinationPolicy::Skip);
        let mut op = Delete::with_override(VPath::from("missing.txt"), OptionBag::new(), override_);
        op.run(&composer, &session).unwrap();
        assert_eq!(op.state(), OperationState::Skipped);
    }

    #[test]
    fn rollback_returns_reconstruction_only_after_completion() {
        let composer = composer_with_file("a.txt");
        let session = session();
        let reconstruction: Box<dyn Operation> = Box::new(Delete::new(VPath::from("noop"), OptionBag::new()));
        let mut op = Delete::new(VPath::from("a.txt"), OptionBag::new()).with_reconstruction(reconstruction);
        assert!(op.rollback().is_none());
        op.run(&composer, &session).unwrap();
        assert!(op.rollback().is_some());
        assert!(op.rollback().is_none());
    }
}
