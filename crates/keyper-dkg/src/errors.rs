use keyper_pairing::errors::DegreeMismatchError;
use keyper_pairing::poly::{Idx, PolyError};
use thiserror::Error;

pub type DkgResult<A> = Result<A, DkgError>;

/// Errors raised while driving the pure DKG state machine. Validation
/// errors here are contained at the handler boundary by the caller (the
/// orchestrator draining the observed log): they are returned so the
/// caller can log them, but an invalid peer message never aborts a step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DkgError {
    /// A message arrived outside the phase that accepts it. Dropped, not an
    /// abort.
    #[error("message arrived in wrong phase")]
    WrongPhase,

    /// The sender's address is not part of this DKG's roster. A
    /// non-keyper's message is not an error and should be dropped silently
    /// by the caller.
    #[error("sender is not part of the roster")]
    UnknownSender,

    /// A commitment did not have the expected number of entries.
    #[error("commitment has wrong length: {0}")]
    DegreeMismatch(#[from] DegreeMismatchError),

    /// A received polynomial evaluation failed verification against the
    /// sender's commitment. Bookkeeping still records the dealer as
    /// evaluation-failed so that Phase 2 accuses it regardless of whether
    /// the caller surfaces this error.
    #[error("evaluation from dealer {0} failed verification")]
    BadEvaluation(Idx),

    /// Finalization was attempted with fewer than `threshold` qualified
    /// dealers.
    #[error("only {0}/{1} dealers qualified")]
    ThresholdNotMet(usize, usize),

    /// A condition provable impossible by construction, e.g. a participant
    /// appearing as its own dealer target. Reserved for
    /// `debug_assert!`/`unreachable!` call sites, never returned from
    /// normal validation paths.
    #[error("state invariant violated: {0}")]
    StateInvariantViolation(&'static str),
}

pub type EpochKeygenResult<A> = Result<A, EpochKeygenError>;

/// Errors raised by the epoch key generator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EpochKeygenError {
    /// A share failed the pairing-check verification against the sender's
    /// eon public key share.
    #[error("share from keyper {0} failed verification")]
    BadShare(Idx),

    /// The epoch secret key was requested before threshold shares had been
    /// collected.
    #[error("only {0}/{1} shares collected")]
    ThresholdNotMet(usize, usize),

    #[error("sender is not part of the roster")]
    UnknownSender,

    #[error("lagrange recovery failed: {0}")]
    InvalidRecovery(#[from] PolyError),
}
