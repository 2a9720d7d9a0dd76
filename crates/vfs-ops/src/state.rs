//! The lifecycle every [`crate::Operation`] passes through.

/// The current lifecycle stage of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Constructed, never estimated or run.
    Initialized,
    /// [`crate::Operation::estimate`] is in progress.
    Estimating,
    /// [`crate::Operation::estimate`] finished; `total` reflects the work
    /// found.
    Estimated,
    /// [`crate::Operation::run`] is in progress.
    Running,
    /// Ran to completion without error or cancellation.
    Completed,
    /// The source or destination policy absorbed a conflict instead of
    /// running the operation.
    Skipped,
    /// Cancelled via a [`crate::CancellationToken`] before completion.
    Cancelled,
    /// Failed and was not absorbed by policy.
    Error,
}

impl OperationState {
    /// Whether the operation reached a state it will not leave on its own:
    /// no further progress will be made without re-running it.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Skipped | Self::Cancelled | Self::Error
        )
    }
}
