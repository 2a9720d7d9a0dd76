//! The policy bitmask that parameterizes every operation: how a missing
//! source, an occupied destination, rollback, and estimate timing are
//! handled, plus a handful of independent flags.

/// How an operation reacts to a missing or unreadable source entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePolicy {
    /// Raise the error to the caller.
    Throw,
    /// Transition the operation to [`crate::OperationState::Skipped`] instead
    /// of raising.
    Skip,
}

/// How an operation reacts to an already-occupied destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationPolicy {
    /// Raise the error to the caller.
    Throw,
    /// Transition the operation to [`crate::OperationState::Skipped`].
    Skip,
    /// Proceed, replacing the destination's contents.
    Overwrite,
}

/// Whether a completed operation may be asked for a reverse-order rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackPolicy {
    /// [`crate::Operation::rollback`] may return a reconstructive operation.
    Enabled,
    /// [`crate::Operation::rollback`] always returns `None`.
    Disabled,
}

/// When a composite operation computes its `(done, total)` progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateTiming {
    /// Estimate once, before any sub-operation runs.
    Upfront,
    /// Estimate lazily, folded into the first `run` call.
    OnRun,
    /// Re-run estimate before every retry of a failed sub-operation.
    ReEstimate,
}

/// A fully resolved policy: every category has a concrete value and every
/// flag its final boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Handling of a missing/unreadable source.
    pub source: SourcePolicy,
    /// Handling of an occupied destination.
    pub destination: DestinationPolicy,
    /// Whether completed operations may be rolled back.
    pub rollback: RollbackPolicy,
    /// When totals are computed.
    pub estimate_timing: EstimateTiming,
    /// A failing child of a [`crate::Batch`] does not abort the remaining
    /// children.
    pub batch_continue_on_error: bool,
    /// Errors transition the operation to `Error` without propagating a
    /// `Result::Err` to the caller; inspect [`crate::OperationState`] and the
    /// session's event log instead.
    pub suppress_exception: bool,
    /// A child error cancels the whole session rather than only the
    /// enclosing batch.
    pub cancel_on_error: bool,
    /// State-change and error events are recorded through `tracing` when the
    /// `tracing` feature is enabled.
    pub log_events: bool,
    /// State-change and error events are forwarded to subscribed
    /// [`crate::OperationObserver`]s.
    pub dispatch_events: bool,
    /// `CopyTree`/`TransferTree` skip entries that are themselves mountpoint
    /// roots.
    pub omit_mounted_packages: bool,
}

impl Policy {
    /// The session-wide default: throw on conflict, rollback enabled,
    /// estimate upfront, events logged and dispatched, nothing else.
    #[must_use]
    pub const fn session_default() -> Self {
        Self {
            source: SourcePolicy::Throw,
            destination: DestinationPolicy::Throw,
            rollback: RollbackPolicy::Enabled,
            estimate_timing: EstimateTiming::Upfront,
            batch_continue_on_error: false,
            suppress_exception: false,
            cancel_on_error: false,
            log_events: true,
            dispatch_events: true,
            omit_mounted_packages: false,
        }
    }

    /// Resolves `self` (the session default) against a per-operation
    /// `override_`: the override's category bits win when present, and every
    /// standalone flag is the union (logical OR) of both.
    #[must_use]
    pub const fn resolve(&self, override_: &PolicyOverride) -> Self {
        Self {
            source: match override_.source {
                Some(s) => s,
                None => self.source,
            },
            destination: match override_.destination {
                Some(d) => d,
                None => self.destination,
            },
            rollback: match override_.rollback {
                Some(r) => r,
                None => self.rollback,
            },
            estimate_timing: match override_.estimate_timing {
                Some(e) => e,
                None => self.estimate_timing,
            },
            batch_continue_on_error: self.batch_continue_on_error || override_.batch_continue_on_error,
            suppress_exception: self.suppress_exception || override_.suppress_exception,
            cancel_on_error: self.cancel_on_error || override_.cancel_on_error,
            log_events: self.log_events || override_.log_events,
            dispatch_events: self.dispatch_events || override_.dispatch_events,
            omit_mounted_packages: self.omit_mounted_packages || override_.omit_mounted_packages,
        }
    }
}

/// A per-operation override of the session's default [`Policy`].
///
/// Every category field is `None` (defer to the session) unless explicitly
/// set via a builder method; every flag starts `false` since flags only ever
/// widen the session default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOverride {
    /// Overrides [`Policy::source`] when set.
    pub source: Option<SourcePolicy>,
    /// Overrides [`Policy::destination`] when set.
    pub destination: Option<DestinationPolicy>,
    /// Overrides [`Policy::rollback`] when set.
    pub rollback: Option<RollbackPolicy>,
    /// Overrides [`Policy::estimate_timing`] when set.
    pub estimate_timing: Option<EstimateTiming>,
    /// Widens [`Policy::batch_continue_on_error`].
    pub batch_continue_on_error: bool,
    /// Widens [`Policy::suppress_exception`].
    pub suppress_exception: bool,
    /// Widens [`Policy::cancel_on_error`].
    pub cancel_on_error: bool,
    /// Widens [`Policy::log_events`].
    pub log_events: bool,
    /// Widens [`Policy::dispatch_events`].
    pub dispatch_events: bool,
    /// Widens [`Policy::omit_mounted_packages`].
    pub omit_mounted_packages: bool,
}

impl PolicyOverride {
    /// No overrides: every category defers to the session, every flag is
    /// `false`.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            source: None,
            destination: None,
            rollback: None,
            estimate_timing: None,
            batch_continue_on_error: false,
            suppress_exception: false,
            cancel_on_error: false,
            log_events: false,
            dispatch_events: false,
            omit_mounted_packages: false,
        }
    }

    /// Overrides the source policy.
    #[must_use]
    pub const fn with_source(mut self, policy: SourcePolicy) -> Self {
        self.source = Some(policy);
        self
    }

    /// Overrides the destination policy.
    #[must_use]
    pub const fn with_destination(mut self, policy: DestinationPolicy) -> Self {
        self.destination = Some(policy);
        self
    }

    /// Overrides the rollback policy.
    #[must_use]
    pub const fn with_rollback(mut self, policy: RollbackPolicy) -> Self {
        self.rollback = Some(policy);
        self
    }

    /// Overrides the estimate-timing policy.
    #[must_use]
    pub const fn with_estimate_timing(mut self, timing: EstimateTiming) -> Self {
        self.estimate_timing = Some(timing);
        self
    }

    /// Sets `batch_continue_on_error`.
    #[must_use]
    pub const fn with_batch_continue_on_error(mut self, value: bool) -> Self {
        self.batch_continue_on_error = value;
        self
    }

    /// Sets `suppress_exception`.
    #[must_use]
    pub const fn with_suppress_exception(mut self, value: bool) -> Self {
        self.suppress_exception = value;
        self
    }

    /// Sets `cancel_on_error`.
    #[must_use]
    pub const fn with_cancel_on_error(mut self, value: bool) -> Self {
        self.cancel_on_error = value;
        self
    }

    /// Sets `omit_mounted_packages`.
    #[must_use]
    pub const fn with_omit_mounted_packages(mut self, value: bool) -> Self {
        self.omit_mounted_packages = value;
        self
    }
}
