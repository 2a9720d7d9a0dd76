//! The common trait every operation implements, and the block-transfer
//! message type `CopyFile`'s reader and writer halves exchange.

use vfs_compose::Composer;
use vfs_error::{VfsError, VfsResult};

use crate::session::OperationSession;
use crate::state::OperationState;

/// Depth of the bounded channel between a `CopyFile`'s background reader
/// thread and the thread driving `run`. Small enough to bound memory to a
/// handful of in-flight blocks, large enough that the reader rarely stalls
/// waiting for the writer to keep up.
pub const QUEUE_CAPACITY: usize = 4;

/// One message sent from a `CopyFile`'s reader thread to its writer side.
pub enum BlockMessage {
    /// `len` bytes of `buf` are valid payload.
    Data(Vec<u8>, usize),
    /// The source was fully read.
    Eof,
    /// The session was cancelled; the reader stopped without finishing.
    Cancelled,
    /// Reading the source, or allocating a buffer to read into, failed; the
    /// writer should surface this error.
    Error(VfsError),
}

/// A unit of work that can be sized, executed, and — if its policy allows —
/// reversed.
///
/// `estimate` and `run` are idempotent to call again after `Error` once the
/// underlying conflict is resolved; `rollback` consumes any state it needs
/// to reconstruct pre-run conditions, so it can only meaningfully be called
/// once after a `Completed` run.
pub trait Operation: Send {
    /// The operation's current lifecycle stage.
    fn state(&self) -> OperationState;

    /// `(done, total)` against the last `estimate`, in whatever unit the
    /// operation counts (bytes for `CopyFile`, entries for tree operations).
    /// `total` is `-1` if no estimate has run yet.
    fn progress(&self) -> (i64, i64);

    /// Computes `total` without performing any mutation. Composite
    /// operations also build their internal plan here.
    fn estimate(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()>;

    /// Performs the operation's effect. Must tolerate being called without a
    /// prior `estimate` when the operation's resolved policy uses
    /// [`crate::EstimateTiming::OnRun`].
    fn run(&mut self, composer: &Composer, session: &OperationSession) -> VfsResult<()>;

    /// Returns an operation that, if run, would undo this operation's
    /// effect — or `None` if rollback is disabled by policy, this operation
    /// never completed, or this kind of operation cannot be reversed.
    fn rollback(&mut self) -> Option<Box<dyn Operation>>;
}
