//! Creates a directory and any missing ancestors.

use vfs_compose::Composer;
use vfs_error::{VfsError, VfsResult};
use vfs_options::OptionBag;
use vfs_path::VPath;

use super::batch::Batch;
use super::delete::Delete;
use crate::operation::Operation;
use crate::policy::{DestinationPolicy, Policy, PolicyOverride};
use crate::session::{OperationEvent, OperationSession};
use crate::state::OperationState;

/// Creates `target`, creating any ancestor directories that do not already
/// exist.
///
/// `estimate` records only the prefixes that are missing at estimate time;
/// `run` creates exactly those, swallowing `AlreadyExists` for any prefix
/// that another operation created in the meantime (unless policy demands
/// otherwise). Rollback deletes the prefixes this operation actually
/// created, deepest first.
pub struct CreateDirectory {
    state: OperationState,
    override_: PolicyOverride,
    target: VPath,
    option: OptionBag,
    to_create: Vec<VPath>,
    created: Vec<VPath>,
    total: i64,
    done: i64,
}

impl CreateDirectory {
    /// Creates `target` using `option` for every underlying back-end call.
    #[must_use]
    pub fn new(target: VPath, option: OptionBag) -> Self {
        Self::with_override(target, option, PolicyOverride::none())
    }

    /// Like [`CreateDirectory::new`], with an explicit policy override.
    #[must_use]
    pub fn with_override(target: VPath, option: OptionBag, override_: PolicyOverride) -> Self {
        Self {
            state: OperationState::Initialized,
            override_,
            target,
            option,
            to_create: Vec::new(),
            created: Vec::new(),
            total: 0,
            done: 0,
        }
    }

    fn fail(&mut self, session: &OperationSession, policy: &Policy, err: &VfsError) {
        self.state = OperationState::Error;
        session.record(policy, OperationEvent::StateChanged(self.state));
        session.record(policy, OperationEvent::Error(err.to_string()));
    }
}

fn prefixes(target: &VPath) -> Vec<VPath> {
    let mut path = VPath::root();
    let mut out = Vec::new();
    for segment in target.segments() {
        path = path.join(segment);
        out.push(path.clone());
    }
    out
}

impl Operation for CreateDirectory {
    fn state(&self) -> OperationState {
        self.state
    }

    fn progress(&self) -> (i64, i64) {
        (self.done, self.total)
    }

    fn estimate(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let policy = session.policy().resolve(&self.override_);
        self.state = OperationState::Estimating;
        session.record(&policy, OperationEvent::StateChanged(self.state));

        self.to_create = prefixes(&self.target)
            .into_iter()
            .filter(|path| composer.get_entry(path, &self.option).is_err())
            .collect();
        self.total = self.to_create.len() as i64;

        self.state = OperationState::Estimated;
        session.record(&policy, OperationEvent::StateChanged(self.state));
        Ok(())
    }

    fn run(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let policy = session.policy().resolve(&self.override_);
        self.state = OperationState::Running;
        session.record(&policy, OperationEvent::StateChanged(self.state));

        if self.to_create.is_empty() && self.total == 0 && self.done == 0 {
            self.to_create = prefixes(&self.target)
                .into_iter()
                .filter(|path| composer.get_entry(path, &self.option).is_err())
                .collect();
            self.total = self.to_create.len() as i64;
        }

        for path in std::mem::take(&mut self.to_create) {
            if session.cancellation().is_cancelled() {
                self.state = OperationState::Cancelled;
                session.record(&policy, OperationEvent::StateChanged(self.state));
                return Ok(());
            }
            match composer.create_directory(&path, &self.option) {
                Ok(()) => {
                    self.created.push(path);
                    self.done += 1;
                    session.record(&policy, OperationEvent::Progress { done: self.done, total: self.total });
                }
                Err(VfsError::AlreadyExists { .. }) if !matches!(policy.destination, DestinationPolicy::Throw) => {
                    self.done += 1;
                }
                Err(err) => {
                    self.fail(session, &policy, &err);
                    return if policy.suppress_exception { Ok(()) } else { Err(err) };
                }
            }
        }

        self.state = OperationState::Completed;
        session.record(&policy, OperationEvent::StateChanged(self.state));
        Ok(())
    }

    fn rollback(&mut self) -> Option<Box<dyn Operation>> {
        if self.state != OperationState::Completed || self.created.is_empty() {
            return None;
        }
        let children = std::mem::take(&mut self.created)
            .into_iter()
            .rev()
            .map(|path| Box::new(Delete::new(path, self.option.clone())) as Box<dyn Operation>)
            .collect();
        Some(Box::new(Batch::new(children)))
    }
}
