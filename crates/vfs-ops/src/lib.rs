#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The operation engine: policy-parameterized, cancellable, rollback-aware
//! units of work (copy, move, delete, and their recursive tree forms)
//! layered on top of `vfs-compose`'s [`Composer`](vfs_compose::Composer).
//!
//! # Design
//!
//! Every operation implements [`Operation`]: `estimate` sizes the work
//! without mutating anything, `run` performs it, and `rollback` — when the
//! resolved [`Policy`] allows it — returns a fresh operation that undoes
//! what just happened. An [`OperationSession`] is the shared context a tree
//! of operations runs against: the session-default policy every operation's
//! own [`PolicyOverride`] resolves against, a [`CancellationToken`] they all
//! poll, a [`BlockPool`] that bounds how much transfer-buffer memory a
//! `CopyFile` can hold at once, and an append-only event log that forwards
//! to subscribed [`OperationObserver`]s.
//!
//! `CopyFile` mirrors the workspace's checksum pipeline: a background
//! thread reads blocks from the source into pool-allocated buffers and
//! sends them down a bounded channel, while the thread driving `run` writes
//! them to the destination and returns buffers to the pool as it goes.
//! Composite operations ([`CopyTree`], [`TransferTree`], [`DeleteTree`])
//! discover their work once by walking the composed namespace, build a
//! [`Batch`] of concrete leaf operations, and delegate every trait method to
//! it.
//!
//! # Errors
//!
//! Every fallible method returns [`vfs_error::VfsResult`]. Whether a
//! particular failure propagates as `Err`, is absorbed into
//! [`OperationState::Skipped`], or surfaces only through the session's
//! event log is controlled entirely by the resolved [`Policy`]; see its
//! field documentation for the exact rules.
//!
//! # See also
//!
//! - `vfs-compose` for the composed virtual filesystem this engine runs
//!   its operations against.
//! - `vfs-backend` for the byte-block pool's buffer contract and the
//!   checksum crate's `pipelined` module, whose reader/writer split this
//!   crate's `CopyFile` follows.

mod cancel;
mod ops;
mod operation;
mod policy;
mod pool;
mod session;
mod state;

pub use cancel::CancellationToken;
pub use operation::{BlockMessage, Operation, QUEUE_CAPACITY};
pub use ops::{Batch, CopyFile, CopyTree, CreateDirectory, Delete, DeleteTree, Move, TransferTree};
pub use policy::{DestinationPolicy, EstimateTiming, Policy, PolicyOverride, RollbackPolicy, SourcePolicy};
pub use pool::BlockPool;
pub use session::{OperationEvent, OperationObserver, OperationSession};
pub use state::OperationState;
