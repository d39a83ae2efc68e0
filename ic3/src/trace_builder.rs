//! Replays a counterexample's proof-obligation chain through SAT to materialize a concrete,
//! checkable [`Trace`] (§4.11).
use ic3_formula::{Aig, Trace, Var};
use ic3_sat::{contract::scoped, Deadline, SatSolver, SolveResult};

use crate::error::Outcome;
use crate::obligations::{ObId, Obligations};
use crate::preprocessor::Preprocessor;
use crate::primer::Primer;

/// Call-count statistics for one [`TraceBuilder`].
#[derive(Copy, Clone, Debug, Default)]
pub struct Stats {
    pub traces_built: u64,
    pub steps_appended: u64,
}

/// Walks a chain of proof obligations from a leaf (an obligation satisfying the initial predicate)
/// up through its ancestors to the one step away from `bad`, re-solving each link to pull out a
/// fully concrete variable assignment per step.
///
/// Does not touch the obligation forest's priority structure — only `cube`/`parent`/`is_root`,
/// which remain valid for any obligation reachable from a counterexample regardless of what has
/// since been pushed back into a heap or retired.
#[derive(Default)]
pub struct TraceBuilder {
    stats: Stats,
}

impl TraceBuilder {
    pub fn new() -> Self {
        TraceBuilder::default()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Builds a trace from `leaf` (an obligation whose own cube already satisfies the initial
    /// predicate, or sits at frame `0`) up through its ancestors to the obligation one step from
    /// `bad`, then appends one final step in which `bad` itself holds.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &mut self,
        sat: &mut dyn SatSolver,
        aig: &Aig,
        primer: &Primer,
        preprocessor: &Preprocessor,
        obligations: &Obligations,
        leaf: ObId,
        deadline: Deadline,
    ) -> Outcome<Trace> {
        let mut chain = vec![leaf];
        let mut cur = leaf;
        loop {
            let parent = obligations
                .parent(cur)
                .expect("every non-root obligation in a counterexample chain has a parent");
            if obligations.is_root(parent) {
                break;
            }
            chain.push(parent);
            cur = parent;
        }

        let mut trace = Trace::new(aig.var_count());
        for (i, &ob) in chain.iter().enumerate() {
            let cube = obligations.cube(ob).to_vec();
            let is_last = i + 1 == chain.len();
            let result = {
                let mut scope = scoped(sat);
                if i == 0 {
                    // The leaf sits at frame 0: its own cube only carries whatever literals were
                    // needed to justify consecution, not every constrained latch, so the initial
                    // predicate is asserted in full here to pin the rest for `Trace::verify`.
                    for clause in aig.init_clauses() {
                        debug_assert_eq!(clause.len(), 1);
                        scope.solver().assume(clause[0]);
                    }
                }
                for &l in &cube {
                    scope.solver().assume(l);
                }
                if is_last {
                    let primed_bad = primer.primed(aig.bad());
                    scope.solver().assume(primed_bad);
                } else {
                    let next_cube = obligations.cube(chain[i + 1]);
                    for &l in next_cube {
                        scope.solver().assume(primer.primed(l));
                    }
                }
                scope.solver().solve(deadline)
            };
            match result {
                SolveResult::Timeout => return Outcome::Timeout,
                SolveResult::Unsat => {
                    unreachable!("counterexample chain step failed to replay through SAT")
                }
                SolveResult::Sat => {}
            }

            let view = preprocessor.model_view(sat, aig);
            let step: Vec<bool> = (0..aig.var_count())
                .map(|idx| view.value(Var::from_index(idx).positive()))
                .collect();
            trace.append(step);
            self.stats.steps_appended += 1;
        }

        match self.append_bad_step(sat, aig, primer, preprocessor, &mut trace, deadline) {
            Outcome::Done(()) => {}
            Outcome::Timeout => return Outcome::Timeout,
        }

        self.stats.traces_built += 1;
        Outcome::Done(trace)
    }

    /// Slides from the latch values of the most recent solve's model (read through their primed
    /// literals) into one more, final step, then replays that state with `bad` itself asserted to
    /// fill in the remaining (gate, input) values concretely.
    ///
    /// Shared by [`TraceBuilder::build`]'s tail and the driver's own length-1/length-2 traces for
    /// the initial-state checks, which reach a bad state without ever touching the obligation
    /// forest.
    pub fn append_bad_step(
        &mut self,
        sat: &mut dyn SatSolver,
        aig: &Aig,
        primer: &Primer,
        preprocessor: &Preprocessor,
        trace: &mut Trace,
        deadline: Deadline,
    ) -> Outcome<()> {
        let next_latches: Vec<(Var, bool)> = {
            let view = preprocessor.model_view(sat, aig);
            aig.latches()
                .iter()
                .map(|l| (l.var, view.value(primer.primed(l.var.positive()))))
                .collect()
        };

        let result = {
            let mut scope = scoped(sat);
            for &(var, val) in &next_latches {
                scope.solver().assume(var.lit(val));
            }
            scope.solver().assume(aig.bad());
            scope.solver().solve(deadline)
        };
        match result {
            SolveResult::Timeout => return Outcome::Timeout,
            SolveResult::Unsat => unreachable!("final bad state failed to replay through SAT"),
            SolveResult::Sat => {}
        }

        let view = preprocessor.model_view(sat, aig);
        let step: Vec<bool> = (0..aig.var_count())
            .map(|idx| view.value(Var::from_index(idx).positive()))
            .collect();
        trace.append(step);
        self.stats.steps_appended += 1;
        Outcome::Done(())
    }
}
