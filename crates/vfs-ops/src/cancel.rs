//! Cooperative cancellation shared by every operation in a session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheap-to-clone handle that lets any holder request cancellation and any
/// other holder observe it.
///
/// Cancellation is cooperative: operations poll [`CancellationToken::is_cancelled`]
/// between units of work (blocks copied, entries visited) and transition to
/// [`crate::OperationState::Cancelled`] on the next check, rather than being
/// interrupted mid-syscall.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether [`CancellationToken::cancel`] has been called on this token or
    /// any clone of it.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::CancellationToken;

    #[test]
    fn cancellation_is_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
