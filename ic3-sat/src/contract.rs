//! The SAT solver contract the ic3 engine is built against.
//!
//! The engine never depends on a concrete CDCL implementation; every component that needs a
//! satisfiability answer is generic over (or holds a boxed) [`SatSolver`]. This mirrors the
//! original system's treatment of its SAT backend as an external collaborator reached only
//! through a small, deliberately narrow interface.
use std::time::{Duration, Instant};

use ic3_formula::Lit;

/// Outcome of a bounded `solve` call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SolveResult {
    Sat,
    Unsat,
    Timeout,
}

/// A point in time a SAT call must not run past.
///
/// `Deadline::none()` never expires. Every routine that can observe a timeout must propagate
/// `SolveResult::Timeout` rather than silently ignoring it (see the concurrency and resource
/// model: cancellation is deadline expiry, not a side channel).
#[derive(Copy, Clone, Debug)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Deadline {
        Deadline { at: None }
    }

    /// A deadline `dur` from now.
    pub fn after(dur: Duration) -> Deadline {
        Deadline {
            at: Some(Instant::now() + dur),
        }
    }

    /// Time remaining, or `None` if the deadline never expires.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has already passed.
    pub fn expired(&self) -> bool {
        self.at.map_or(false, |at| Instant::now() >= at)
    }
}

/// The operations the ic3 engine requires of a SAT solver.
///
/// Implementations are incremental: clauses and activation literals accumulate across calls, and
/// `test`/`untest` nest scoped assumption frames on top of that persistent state. See the
/// concurrency and resource model for the scoping contract `test`/`untest` must satisfy; use
/// [`scoped`] to acquire it safely rather than calling `test`/`untest` directly.
pub trait SatSolver {
    /// Appends `lit` to the clause under construction, or (when `lit` is `None`) terminates it,
    /// committing the clause built up since the previous terminator.
    fn add(&mut self, lit: Option<Lit>);

    /// Allocates a fresh activation literal gating every clause added since the previous call to
    /// `activate` (or since construction, for the first call). Assuming the activation literal
    /// makes those clauses visible to the solver.
    fn activate(&mut self) -> Lit;

    /// Permanently forces `lit` to false, soft-deleting every clause gated by it.
    fn deactivate(&mut self, lit: Lit);

    /// Assumes `lit` for subsequent solving, within the innermost open scope.
    fn assume(&mut self, lit: Lit);

    /// Opens a new assumption scope. Every `assume` call made before the matching `untest` is
    /// undone when that `untest` runs.
    fn test(&mut self);

    /// Closes the innermost open scope, undoing every assumption made within it.
    ///
    /// Panics if no scope is open: an unmatched `untest` is a scope imbalance, which §5/§7 class
    /// as a programming defect rather than a recoverable condition.
    fn untest(&mut self);

    /// Solves under the current assumptions, bounded by `deadline`.
    fn solve(&mut self, deadline: Deadline) -> SolveResult;

    /// Appends the unsat core of the most recent `Unsat` result to `out`.
    fn why(&mut self, out: &mut Vec<Lit>);

    /// The model value of `lit`, valid after a `Sat` result until the next mutating call.
    fn value(&self, lit: Lit) -> bool;
}

/// An RAII guard over an open assumption scope.
///
/// Dropping the guard calls `untest`, so a scope is closed on every exit path — including `?`
/// early returns and panics unwinding through it — without each call site repeating that
/// bookkeeping. This is the idiomatic replacement for routines that would otherwise need a
/// `defer`-style "undo on every exit" discipline.
pub struct TestScope<'s, S: SatSolver + ?Sized> {
    solver: &'s mut S,
}

impl<'s, S: SatSolver + ?Sized> Drop for TestScope<'s, S> {
    fn drop(&mut self) {
        self.solver.untest();
    }
}

impl<'s, S: SatSolver + ?Sized> TestScope<'s, S> {
    /// Access the wrapped solver for `assume`/`solve`/`why`/`value` calls within the scope.
    pub fn solver(&mut self) -> &mut S {
        self.solver
    }
}

/// Opens a scoped assumption frame over `solver`, returning a guard that closes it on drop.
pub fn scoped<S: SatSolver + ?Sized>(solver: &mut S) -> TestScope<'_, S> {
    solver.test();
    TestScope { solver }
}
