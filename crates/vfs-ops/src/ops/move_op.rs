//! Moves (renames) a single entry.

use vfs_compose::Composer;
use vfs_error::{VfsError, VfsResult};
use vfs_options::OptionBag;
use vfs_path::VPath;

use crate::operation::Operation;
use crate::policy::{DestinationPolicy, Policy, PolicyOverride};
use crate::session::{OperationEvent, OperationSession};
use crate::state::OperationState;

/// Moves `from` to `to` within the composed virtual filesystem.
pub struct Move {
    state: OperationState,
    override_: PolicyOverride,
    from: VPath,
    to: VPath,
    option: OptionBag,
}

impl Move {
    /// Moves `from` to `to` using `option` for the underlying back-end call.
    #[must_use]
    pub fn new(from: VPath, to: VPath, option: OptionBag) -> Self {
        Self::with_override(from, to, option, PolicyOverride::none())
    }

    /// Like [`Move::new`], with an explicit policy override.
    #[must_use]
    pub fn with_override(from: VPath, to: VPath, option: OptionBag, override_: PolicyOverride) -> Self {
        Self {
            state: OperationState::Initialized,
            override_,
            from,
            to,
            option,
        }
    }

    fn fail(&mut self, session: &OperationSession, policy: &Policy, err: &VfsError) {
        self.state = OperationState::Error;
        session.record(policy, OperationEvent::StateChanged(self.state));
        session.record(policy, OperationEvent::Error(err.to_string()));
    }
}

impl Operation for Move {
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

        match composer.move_entry(&self.from, &self.to, &self.option) {
            Ok(()) => {
                self.state = OperationState::Completed;
                session.record(&policy, OperationEvent::StateChanged(self.state));
                Ok(())
            }
            Err(VfsError::AlreadyExists { .. }) if !matches!(policy.destination, DestinationPolicy::Throw) => {
                self.state = OperationState::Skipped;
                session.record(&policy, OperationEvent::StateChanged(self.state));
                Ok(())
            }
            Err(VfsError::NotFound(_)) if matches!(policy.source, crate::policy::SourcePolicy::Skip) => {
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
        Some(Box::new(Move::new(self.to.clone(), self.from.clone(), self.option.clone())))
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
        OperationSession::new(Policy::session_default(), BlockPool::new(1024, 2), 0)
    }

    fn composer_with_file(path: &str) -> Composer {
        let composer = Composer::new("t", CaseSensitivity::Sensitive);
        let backend = MemoryBackend::new();
        backend.seed_file(path, b"hi".to_vec());
        composer
            .mount(
                &VPath::root(),
                vec![vfs_mount::LiveAssignment::new("mem", std::sync::Arc::new(backend), OptionBag::new())],
            )
            .unwrap();
        composer
    }

    #[test]
    fn move_relocates_entry_and_rollback_moves_it_back() {
        let composer = composer_with_file("a.txt");
        let session = session();
        let mut op = Move::new(VPath::from("a.txt"), VPath::from("b.txt"), OptionBag::new());
        op.run(&composer, &session).unwrap();
        assert!(composer.get_entry(&VPath::from("b.txt"), &OptionBag::new()).is_ok());
        assert!(composer.get_entry(&VPath::from("a.txt"), &OptionBag::new()).is_err());

        let mut rollback = op.rollback().expect("completed move is reversible");
        rollback.run(&composer, &session).unwrap();
        assert!(composer.get_entry(&VPath::from("a.txt"), &OptionBag::new()).is_ok());
    }
}
