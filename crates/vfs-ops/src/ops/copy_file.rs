//! Copies a single file's contents from one virtual path to another.
//!
//! The transfer runs a background reader thread pulling blocks from the
//! source through the session's [`crate::BlockPool`] while the calling
//! thread writes them to the destination, mirroring the double-buffered
//! producer/consumer split the workspace's checksum pipeline uses for bulk
//! reads.

use std::io::{Read, Write};
use std::thread;

use vfs_compose::Composer;
use vfs_error::{ExistsKind, VfsError, VfsResult};
use vfs_options::OptionBag;
use vfs_path::VPath;

use crate::operation::{BlockMessage, Operation, QUEUE_CAPACITY};
use crate::policy::{DestinationPolicy, Policy, PolicyOverride, SourcePolicy};
use crate::session::{OperationEvent, OperationSession};
use crate::state::OperationState;
use crate::ops::delete::Delete;

use vfs_backend::OpenMode;

/// Copies `source` to `destination`, byte for byte.
pub struct CopyFile {
    state: OperationState,
    override_: PolicyOverride,
    effective_policy: Option<Policy>,
    source: VPath,
    destination: VPath,
    option: OptionBag,
    total: i64,
    done: i64,
    overwritten: bool,
    created: bool,
}

impl CopyFile {
    /// Copies `source` to `destination` using `option` for every underlying
    /// back-end call.
    #[must_use]
    pub fn new(source: VPath, destination: VPath, option: OptionBag) -> Self {
        Self::with_override(source, destination, option, PolicyOverride::none())
    }

    /// Like [`CopyFile::new`], with an explicit policy override.
    #[must_use]
    pub fn with_override(source: VPath, destination: VPath, option: OptionBag, override_: PolicyOverride) -> Self {
        Self {
            state: OperationState::Initialized,
            override_,
            effective_policy: None,
            source,
            destination,
            option,
            total: -1,
            done: 0,
            overwritten: false,
            created: false,
        }
    }

    fn resolved_policy(&mut self, session: &OperationSession) -> Policy {
        if let Some(policy) = self.effective_policy {
            return policy;
        }
        let policy = session.policy().resolve(&self.override_);
        self.effective_policy = Some(policy);
        policy
    }

    fn fail(&mut self, session: &OperationSession, policy: &Policy, err: &VfsError) {
        self.state = OperationState::Error;
        session.record(policy, OperationEvent::StateChanged(self.state));
        session.record(policy, OperationEvent::Error(err.to_string()));
    }
}

impl Operation for CopyFile {
    fn state(&self) -> OperationState {
        self.state
    }

    fn progress(&self) -> (i64, i64) {
        (self.done, self.total)
    }

    fn estimate(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let policy = self.resolved_policy(session);
        self.state = OperationState::Estimating;
        session.record(&policy, OperationEvent::StateChanged(self.state));

        match composer.get_entry(&self.source, &self.option) {
            Ok(entry) => {
                self.total = entry.file().map_or(-1, |file| file.length);
            }
            Err(err) => {
                if matches!(err, VfsError::NotFound(_)) && matches!(policy.source, SourcePolicy::Skip) {
                    self.state = OperationState::Skipped;
                    session.record(&policy, OperationEvent::StateChanged(self.state));
                    return Ok(());
                }
                self.fail(session, &policy, &err);
                return if policy.suppress_exception { Ok(()) } else { Err(err) };
            }
        }

        self.state = OperationState::Estimated;
        session.record(&policy, OperationEvent::StateChanged(self.state));
        Ok(())
    }

    fn run(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()> {
        let policy = self.resolved_policy(session);
        self.state = OperationState::Running;
        session.record(&policy, OperationEvent::StateChanged(self.state));

        if session.cancellation().is_cancelled() {
            self.state = OperationState::Cancelled;
            session.record(&policy, OperationEvent::StateChanged(self.state));
            return Ok(());
        }

        let dest_exists = composer.get_entry(&self.destination, &self.option).is_ok();
        if dest_exists {
            match policy.destination {
                DestinationPolicy::Throw => {
                    let err = VfsError::AlreadyExists {
                        kind: ExistsKind::File,
                        path: self.destination.as_str().to_owned(),
                    };
                    self.fail(session, &policy, &err);
                    return if policy.suppress_exception { Ok(()) } else { Err(err) };
                }
                DestinationPolicy::Skip => {
                    self.state = OperationState::Skipped;
                    session.record(&policy, OperationEvent::StateChanged(self.state));
                    return Ok(());
                }
                DestinationPolicy::Overwrite => self.overwritten = true,
            }
        }

        let mut source_file = match composer.open(&self.source, OpenMode::read(), &self.option) {
            Ok(file) => file,
            Err(err) => {
                if matches!(err, VfsError::NotFound(_)) && matches!(policy.source, SourcePolicy::Skip) {
                    self.state = OperationState::Skipped;
                    session.record(&policy, OperationEvent::StateChanged(self.state));
                    return Ok(());
                }
                self.fail(session, &policy, &err);
                return if policy.suppress_exception { Ok(()) } else { Err(err) };
            }
        };

        let mut destination_file = match composer.open(&self.destination, OpenMode::write_truncate(), &self.option) {
            Ok(file) => file,
            Err(err) => {
                self.fail(session, &policy, &err);
                return if policy.suppress_exception { Ok(()) } else { Err(err) };
            }
        };
        self.created = !dest_exists;

        let pool = session.pool().clone();
        let cancellation = session.cancellation().clone();
        let block_size = pool.block_size();
        let (sender, receiver) = crossbeam_channel::bounded::<BlockMessage>(QUEUE_CAPACITY);

        let reader = thread::spawn(move || {
            loop {
                if cancellation.is_cancelled() {
                    let _ = sender.send(BlockMessage::Cancelled);
                    break;
                }
                let mut buf = match pool.allocate() {
                    Ok(buf) => buf,
                    Err(err) => {
                        let _ = sender.send(BlockMessage::Error(err));
                        break;
                    }
                };
                if buf.len() != block_size {
                    buf.resize(block_size, 0);
                }
                match source_file.read(&mut buf) {
                    Ok(0) => {
                        pool.release(buf);
                        let _ = sender.send(BlockMessage::Eof);
                        break;
                    }
                    Ok(read) => {
                        if sender.send(BlockMessage::Data(buf, read)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        pool.release(buf);
                        let _ = sender.send(BlockMessage::Error(VfsError::io(err)));
                        break;
                    }
                }
            }
            let _ = source_file.close();
        });

        let mut result: VfsResult<()> = Ok(());
        let mut cancelled = false;
        let mut last_reported = self.done;
        for message in &receiver {
            match message {
                BlockMessage::Data(buf, len) => {
                    if let Err(err) = destination_file.write_all(&buf[..len]) {
                        result = Err(VfsError::io(err));
                        session.pool().release(buf);
                        break;
                    }
                    self.done += len as i64;
                    session.pool().release(buf);
                    let interval = i64::try_from(session.progress_interval()).unwrap_or(i64::MAX);
                    if self.done - last_reported >= interval || self.done == self.total {
                        last_reported = self.done;
                        session.record(&policy, OperationEvent::Progress { done: self.done, total: self.total });
                    }
                }
                BlockMessage::Eof => break,
                BlockMessage::Cancelled => {
                    cancelled = true;
                    break;
                }
                BlockMessage::Error(err) => {
                    result = Err(err);
                    break;
                }
            }
        }

        // Keep draining so the reader thread's next send (if any) lands in
        // an open channel instead of blocking forever on a bounded queue
        // nobody is reading anymore.
        for message in &receiver {
            if let BlockMessage::Data(buf, _) = message {
                session.pool().release(buf);
            }
        }
        let _ = reader.join();

        if let Err(err) = destination_file.close() {
            if result.is_ok() {
                result = Err(err);
            }
        }

        if cancelled || session.cancellation().is_cancelled() {
            self.state = OperationState::Cancelled;
            session.record(&policy, OperationEvent::StateChanged(self.state));
            return Ok(());
        }

        match result {
            Ok(()) => {
                self.state = OperationState::Completed;
                session.record(&policy, OperationEvent::StateChanged(self.state));
                Ok(())
            }
            Err(err) => {
                // A failed transfer into a file we created leaves a partial
                // write behind; clean it up now rather than waiting for a
                // caller to notice and roll back a run that never finished.
                if self.created && !self.overwritten {
                    let _ = composer.delete(&self.destination, &self.option);
                }
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
        let policy = self.effective_policy?;
        if !matches!(policy.rollback, crate::policy::RollbackPolicy::Enabled) {
            return None;
        }
        if self.state != OperationState::Completed || !self.created {
            return None;
        }
        Some(Box::new(Delete::new(self.destination.clone(), self.option.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BlockPool;
    use vfs_path::CaseSensitivity;
    use vfs_test_support::MemoryBackend;

    fn session_with_pool(block_size: usize, capacity: usize) -> OperationSession {
        OperationSession::new(Policy::session_default(), BlockPool::new(block_size, capacity), 0)
    }

    fn composer_with_file(path: &str, contents: &[u8]) -> Composer {
        let composer = Composer::new("t", CaseSensitivity::Sensitive);
        let backend = MemoryBackend::new();
        backend.seed_file(path, contents.to_vec());
        composer
            .mount(
                &VPath::root(),
                vec![vfs_mount::LiveAssignment::new("mem", std::sync::Arc::new(backend), OptionBag::new())],
            )
            .unwrap();
        composer
    }

    #[test]
    fn copy_file_transfers_full_contents_across_several_blocks() {
        let payload = vec![7u8; 3000];
        let composer = composer_with_file("src.bin", &payload);
        let session = session_with_pool(1024, 4);
        let mut op = CopyFile::new(VPath::from("src.bin"), VPath::from("dst.bin"), OptionBag::new());
        op.estimate(&composer, &session).unwrap();
        op.run(&composer, &session).unwrap();
        assert_eq!(op.state(), OperationState::Completed);
        assert_eq!(op.progress(), (3000, 3000));

        let mut file = composer.open(&VPath::from("dst.bin"), OpenMode::read(), &OptionBag::new()).unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn copy_file_reports_out_of_disk_space_and_cleans_up_on_quota_exhaustion() {
        let payload = vec![1u8; 3072];
        let composer = composer_with_file("src.bin", &payload);
        // An exhausted pool (zero buffers) forces the very first allocate
        // to fail, so the outcome is deterministic rather than racing the
        // reader thread against the writer's release-after-write.
        let session = session_with_pool(1024, 0);
        let mut op = CopyFile::new(VPath::from("src.bin"), VPath::from("dst.bin"), OptionBag::new());
        op.estimate(&composer, &session).unwrap();
        let result = op.run(&composer, &session);
        assert!(matches!(result, Err(VfsError::OutOfDiskSpace)));
        assert_eq!(op.state(), OperationState::Error);
        assert!(!op.overwritten);
        assert!(composer.get_entry(&VPath::from("dst.bin"), &OptionBag::new()).is_err());
    }

    #[test]
    fn rollback_deletes_created_destination_after_completion() {
        let composer = composer_with_file("src.bin", b"hello");
        let session = session_with_pool(1024, 2);
        let mut op = CopyFile::new(VPath::from("src.bin"), VPath::from("dst.bin"), OptionBag::new());
        op.run(&composer, &session).unwrap();
        assert!(op.created);
        let mut rollback = op.rollback().expect("freshly created destination is reversible");
        rollback.run(&composer, &session).unwrap();
        assert!(composer.get_entry(&VPath::from("dst.bin"), &OptionBag::new()).is_err());
    }
}
