//! Runs a fixed sequence of operations as one unit.

use vfs_compose::Composer;
use vfs_error::VfsResult;

use crate::operation::Operation;
use crate::session::{OperationEvent, OperationSession};
use crate::state::OperationState;

/// A sequence of operations run in order.
///
/// Under `batch_continue_on_error`, a failing child does not stop the
/// remaining children from running; otherwise the first error stops the
/// batch, and the children after it are simply never run (they stay in
/// whatever state they were constructed in, satisfying the partial-failure
/// invariant without any extra bookkeeping). `rollback` builds a fresh batch
/// of the children's own rollbacks in reverse order, skipping any child that
/// has none.
pub struct Batch {
    state: OperationState,
    children: Vec<Box<dyn Operation>>,
}

impl Batch {
    /// Wraps `children`, run in the given order.
    #[must_use]
    pub fn new(children: Vec<Box<dyn Operation>>) -> Self {
        Self {
            state: OperationState::Initialized,
            children,
        }
    }
}

impl Operation for Batch {
    fn state(&self) -> OperationState {
        self.state
    }

    fn progress(&self) -> (i64, i64) {
        self.children
            .iter()
            .map(|child| child.progress())
            .fold((0, 0), |(done, total), (d, t)| (done + d, total + t))
    }

    fn estimate(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let policy = session.policy().resolve(&crate::policy::PolicyOverride::none());
        self.state = OperationState::Estimating;
        session.record(&policy, OperationEvent::StateChanged(self.state));

        for child in &mut self.children {
            match child.estimate(composer, session) {
                Ok(()) => {}
                Err(err) if policy.batch_continue_on_error => {
                    session.record(&policy, OperationEvent::Error(err.to_string()));
                }
                Err(err) => return Err(err),
            }
        }

        self.state = OperationState::Estimated;
        session.record(&policy, OperationEvent::StateChanged(self.state));
        Ok(())
    }

    fn run(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let policy = session.policy().resolve(&crate::policy::PolicyOverride::none());
        self.state = OperationState::Running;
        session.record(&policy, OperationEvent::StateChanged(self.state));

        let mut first_error: Option<vfs_error::VfsError> = None;
        for child in &mut self.children {
            if session.cancellation().is_cancelled() {
                self.state = OperationState::Cancelled;
                session.record(&policy, OperationEvent::StateChanged(self.state));
                return Ok(());
            }
            match child.run(composer, session) {
                Ok(()) => {}
                Err(err) => {
                    session.record(&policy, OperationEvent::Error(err.to_string()));
                    if policy.batch_continue_on_error {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    } else {
                        self.state = OperationState::Error;
                        session.record(&policy, OperationEvent::StateChanged(self.state));
                        return if policy.suppress_exception { Ok(()) } else { Err(err) };
                    }
                }
            }
        }

        if let Some(err) = first_error {
            self.state = OperationState::Error;
            session.record(&policy, OperationEvent::StateChanged(self.state));
            return if policy.suppress_exception { Ok(()) } else { Err(err) };
        }

        self.state = OperationState::Completed;
        session.record(&policy, OperationEvent::StateChanged(self.state));
        Ok(())
    }

    fn rollback(&mut self) -> Option<Box<dyn Operation>> {
        let reversed: Vec<Box<dyn Operation>> = self
            .children
            .iter_mut()
            .rev()
            .filter_map(|child| child.rollback())
            .collect();
        if reversed.is_empty() {
            None
        } else {
            Some(Box::new(Batch::new(reversed)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::delete::Delete;
    use crate::policy::Policy;
    use crate::pool::BlockPool;
    use vfs_options::OptionBag;
    use vfs_path::{CaseSensitivity, VPath};
    use vfs_test_support::MemoryBackend;

    fn session_with(policy: Policy) -> OperationSession {
        OperationSession::new(policy, BlockPool::new(1024, 2), 0)
    }

    fn composer_with(paths: &[&str]) -> Composer {
        let composer = Composer::new("t", CaseSensitivity::Sensitive);
        let backend = MemoryBackend::new();
        for path in paths {
            backend.seed_file(path, b"x");
        }
        composer
            .mount(
                &VPath::root(),
                vec![vfs_mount::LiveAssignment::new("mem", std::sync::Arc::new(backend), OptionBag::new())],
            )
            .unwrap();
        composer
    }

    #[test]
    fn batch_stops_at_first_error_by_default() {
        let composer = composer_with(&["a.txt"]);
        let session = session_with(Policy::session_default());
        let mut batch = Batch::new(vec![
            Box::new(Delete::new(VPath::from("missing.txt"), OptionBag::new())),
            Box::new(Delete::new(VPath::from("a.txt"), OptionBag::new())),
        ]);
        assert!(batch.run(&composer, &session).is_err());
        assert_eq!(batch.state(), OperationState::Error);
        assert!(composer.get_entry(&VPath::from("a.txt"), &OptionBag::new()).is_ok());
    }

    #[test]
    fn batch_continues_past_errors_when_policy_allows() {
        let composer = composer_with(&["a.txt"]);
        let mut policy = Policy::session_default();
        policy.batch_continue_on_error = true;
        let session = session_with(policy);
        let mut batch = Batch::new(vec![
            Box::new(Delete::new(VPath::from("missing.txt"), OptionBag::new())),
            Box::new(Delete::new(VPath::from("a.txt"), OptionBag::new())),
        ]);
        assert!(batch.run(&composer, &session).is_err());
        assert!(composer.get_entry(&VPath::from("a.txt"), &OptionBag::new()).is_err());
    }
}
