//! A thin accounting shim over a [`SatSolver`], tracking call counts and time spent.
use std::time::{Duration, Instant};

use ic3_formula::Lit;

use crate::contract::{Deadline, SatSolver, SolveResult};

/// Call-count and timing statistics for one [`SatMonitor`].
#[derive(Copy, Clone, Debug, Default)]
pub struct Stats {
    pub calls: u64,
    pub sat_results: u64,
    pub unsat_results: u64,
    pub timeouts: u64,
    pub time: Duration,
}

/// Wraps a [`SatSolver`], counting `solve` calls by outcome and accumulating the time spent in
/// them, and enforcing the scoped-assumption-frame invariant (an `untest` with no matching open
/// `test` panics) uniformly regardless of what the wrapped backend itself does.
///
/// Grounded on the original system's per-instance SAT call accounting shim, used to report
/// per-component statistics at the end of a run without threading a counter through every call
/// site by hand.
pub struct SatMonitor<S> {
    name: &'static str,
    solver: S,
    stats: Stats,
    scope_depth: usize,
}

impl<S: SatSolver> SatMonitor<S> {
    pub fn new(name: &'static str, solver: S) -> Self {
        SatMonitor {
            name,
            solver,
            stats: Stats::default(),
            scope_depth: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn into_inner(self) -> S {
        self.solver
    }
}

impl<S: SatSolver> SatSolver for SatMonitor<S> {
    fn add(&mut self, lit: Option<Lit>) {
        self.solver.add(lit)
    }

    fn activate(&mut self) -> Lit {
        self.solver.activate()
    }

    fn deactivate(&mut self, lit: Lit) {
        self.solver.deactivate(lit)
    }

    fn assume(&mut self, lit: Lit) {
        self.solver.assume(lit)
    }

    fn test(&mut self) {
        self.scope_depth += 1;
        self.solver.test()
    }

    fn untest(&mut self) {
        assert!(
            self.scope_depth > 0,
            "untest called on {:?} with no matching open test scope",
            self.name
        );
        self.scope_depth -= 1;
        self.solver.untest();
    }

    fn solve(&mut self, deadline: Deadline) -> SolveResult {
        let start = Instant::now();
        let result = self.solver.solve(deadline);
        self.stats.calls += 1;
        self.stats.time += start.elapsed();
        match result {
            SolveResult::Sat => self.stats.sat_results += 1,
            SolveResult::Unsat => self.stats.unsat_results += 1,
            SolveResult::Timeout => self.stats.timeouts += 1,
        }
        log::debug!(
            "{}: solve #{} -> {:?} ({:?} elapsed)",
            self.name,
            self.stats.calls,
            result,
            self.stats.time
        );
        result
    }

    fn why(&mut self, out: &mut Vec<Lit>) {
        self.solver.why(out)
    }

    fn value(&self, lit: Lit) -> bool {
        self.solver.value(lit)
    }
}
