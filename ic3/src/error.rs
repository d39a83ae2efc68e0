//! Recoverable error conditions (§7).
//!
//! Everything in [`IcError`] is a condition the caller can be expected to hit in normal use:
//! a deadline expiring, a malformed circuit, a claimed invariant that does not actually verify.
//! Conditions that instead imply a programming defect in the engine itself — a scope imbalance on
//! `untest`, priming an unknown literal, SAT returning sat where unsat was proven a line earlier —
//! are `panic!`/`debug_assert!` and deliberately have no variant here; see the module docs on
//! `driver` for where each panic site lives.
use thiserror::Error;

use ic3_formula::AigError;

/// Recoverable error conditions surfaced to the caller of the engine.
#[derive(Debug, Error)]
pub enum IcError {
    /// A SAT call (and therefore the run as a whole) exceeded its deadline.
    #[error("reached the solving deadline before a result could be determined")]
    Timeout,

    /// The input circuit was malformed (e.g. a latch's next-function references an undeclared
    /// variable). No engine state was built.
    #[error("malformed input circuit: {0}")]
    MalformedAig(#[from] AigError),

    /// After claiming `unreachable`, the produced invariant failed to verify.
    #[error("invariant verification failed: {reason}")]
    VerificationFailed {
        /// Human-readable description of which check failed (initiation, consecution, or the
        /// `I ⇒ ¬bad` implication) and, where applicable, the offending clause id.
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, IcError>;

/// Outcome of an operation bounded by a deadline.
///
/// Every routine that can observe SAT timing out partway through (`block`, `prop`, `gnrl`,
/// `conSift`, trace build — see §5 cancellation) returns this instead of its plain result, so a
/// timeout can never be silently swallowed by a caller that only looks at the happy path.
#[derive(Debug)]
pub enum Outcome<T> {
    Done(T),
    Timeout,
}

impl<T> Outcome<T> {
    /// Converts a timeout into `IcError::Timeout`, keeping `Done` values unwrapped.
    pub fn into_result(self) -> Result<T> {
        match self {
            Outcome::Done(v) => Ok(v),
            Outcome::Timeout => Err(IcError::Timeout),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Outcome::Timeout)
    }
}
