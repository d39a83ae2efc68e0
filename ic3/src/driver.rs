//! The main proof-obligation loop (§4.10).
//!
//! [`Driver::new`] primes every latch's own variable, every latch's `next`, and `bad` up front so
//! [`Primer::primed`] never misses later, loads the circuit's initial predicate into frame 0, and
//! opens two empty frames above it. [`Driver::run`] then repeats: pick the most urgent proof
//! obligation, check whether it has a predecessor one frame down, and either extend the
//! obligation chain one step closer to the initial states or block it with a freshly generalized
//! clause. Root (the obligation that stands for `bad` itself at the current frontier `k*`) is
//! handled the same way except a successful block triggers a propagation pass, and a propagation
//! pass reaching a fixed point is how the search terminates with a proof.
//!
//! Every panic site here is a driver bug, never a caller-facing [`IcError`]: an obligation chain
//! whose replay through SAT comes back unsat (`trace_builder`), a root obligation with `k* == 0`
//! (construction always opens at least two frames), or a predecessor search on an obligation the
//! forest has already retired.
use rand::rngs::StdRng;
use rand::SeedableRng;

use ic3_formula::{Aig, Lit, Trace};
use ic3_sat::{contract::scoped, Deadline, SatMonitor, SatSolver, SatMonitorStats, SolveResult};

use crate::cnf::{Cnf, CnfStats};
use crate::config::Config;
use crate::error::{IcError, Outcome, Result};
use crate::generalizer::Generalizer;
use crate::justifier::Justifier;
use crate::obligations::{ObId, Obligations};
use crate::preprocessor::Preprocessor;
use crate::primer::Primer;
use crate::pusher::Pusher;
use crate::trace_builder::TraceBuilder;

/// Outcome of a completed run: either a trace witnessing `bad`, or an inductive invariant proving
/// it unreachable, or "gave up" (deadline or `max_depth` reached without either).
#[derive(Debug)]
pub enum Status {
    /// `bad` is unreachable; `invariant` is a set of clauses over latch literals, inductive and
    /// sufficient to imply `¬bad`.
    Unreachable { invariant: Vec<Vec<Lit>> },
    /// `bad` is reachable; `trace` is a concrete witness (see [`Trace::verify`]).
    Reachable { trace: Trace },
    /// Neither was established before `max_depth` was reached.
    Unknown,
}

/// Aggregated call-count statistics across every subsystem a [`Driver`] owns.
#[derive(Copy, Clone, Debug, Default)]
pub struct Stats {
    pub sat: SatMonitorStats,
    pub cnf: CnfStats,
    pub generalizer: crate::generalizer::Stats,
    pub pusher: crate::pusher::Stats,
    pub preprocessor: crate::preprocessor::Stats,
    pub trace_builder: crate::trace_builder::Stats,
}

/// Owns every subsystem and drives them through the main loop against one fixed circuit.
pub struct Driver<S: SatSolver> {
    config: Config,
    aig: Aig,
    sat: SatMonitor<S>,
    primer: Primer,
    cnf: Cnf,
    obligations: Obligations,
    generalizer: Generalizer,
    justifier: Justifier,
    pusher: Pusher,
    preprocessor: Preprocessor,
    trace_builder: TraceBuilder,
    rng: StdRng,
    deadline: Deadline,
}

/// Turns a model satisfying `prime(targets)` into a predecessor cube over current-state latches,
/// either via the circuit justifier or, when disabled, by reading every latch's primed value
/// straight off the model. Shared by the root's and every non-root obligation's predecessor
/// search, which differ only in what `targets` is (`[bad]` for root, an obligation's own cube
/// otherwise).
fn justify_predecessor(
    sat: &mut dyn SatSolver,
    aig: &Aig,
    primer: &mut Primer,
    justifier: &mut Justifier,
    justify: bool,
    targets: &[Lit],
    rng: &mut StdRng,
) -> Vec<Lit> {
    if justify {
        let mut pred = Vec::new();
        for &target in targets {
            pred.extend(justifier.justify_next(sat, aig, primer, target, rng));
        }
        pred.sort_unstable();
        pred.dedup();
        pred
    } else {
        aig.latches()
            .iter()
            .map(|l| {
                let p = primer.primed(l.var.positive());
                l.var.lit(sat.value(p))
            })
            .collect()
    }
}

impl<S: SatSolver> Driver<S> {
    pub fn new(config: Config, aig: Aig, solver: S, deadline: Deadline) -> Driver<S> {
        let mut sat = SatMonitor::new("ic3", solver);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut primer = Primer::new();

        for latch in aig.latches() {
            primer.prime(&mut sat, &aig, latch.var.positive());
            primer.prime(&mut sat, &aig, latch.next);
        }
        primer.prime(&mut sat, &aig, aig.bad());

        let justifier = Justifier::new(&aig);

        let mut preprocessor = Preprocessor::new();
        if config.preprocess {
            preprocessor.run(&mut sat, &aig, &mut rng, deadline);
        } else {
            preprocessor.passthrough(&mut sat, &aig);
        }

        let mut cnf = Cnf::new();
        for clause in aig.init_clauses() {
            cnf.add(&mut sat, clause, 0);
        }
        cnf.push_k();
        cnf.push_k();

        let obligations = Obligations::new(cnf.max_level(), config.requeue_policy);
        let mut pusher = Pusher::new();
        pusher.new_frame(&cnf);

        log::info!("ic3: initialized, k* = {}", obligations.k_star());

        Driver {
            config,
            aig,
            sat,
            primer,
            cnf,
            obligations,
            generalizer: Generalizer::new(),
            justifier,
            pusher,
            preprocessor,
            trace_builder: TraceBuilder::new(),
            rng,
            deadline,
        }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            sat: self.sat.stats(),
            cnf: self.cnf.stats(),
            generalizer: self.generalizer.stats(),
            pusher: self.pusher.stats(),
            preprocessor: self.preprocessor.stats(),
            trace_builder: self.trace_builder.stats(),
        }
    }

    /// Runs the main loop to completion, then (if `unreachable` and `config.verify_invariant`)
    /// re-checks the produced invariant from scratch before returning it.
    pub fn solve(&mut self) -> Result<Status> {
        let status = self.run().into_result()?;
        if let Status::Unreachable { invariant } = &status {
            if self.config.verify_invariant {
                match self.verify_invariant(invariant) {
                    Outcome::Timeout => return Err(IcError::Timeout),
                    Outcome::Done(Ok(())) => {}
                    Outcome::Done(Err(reason)) => return Err(IcError::VerificationFailed { reason }),
                }
            }
        }
        Ok(status)
    }

    pub fn run(&mut self) -> Outcome<Status> {
        match self.init_check() {
            Outcome::Timeout => return Outcome::Timeout,
            Outcome::Done(Some(trace)) => return Outcome::Done(Status::Reachable { trace }),
            Outcome::Done(None) => {}
        }

        loop {
            if self.deadline.expired() {
                return Outcome::Timeout;
            }

            let Some(o) = self.obligations.choose() else {
                continue;
            };

            let outcome = if self.obligations.is_root(o) {
                self.handle_root(o)
            } else {
                self.handle_obligation(o)
            };
            match outcome {
                Outcome::Done(Some(status)) => return Outcome::Done(status),
                Outcome::Done(None) => {}
                Outcome::Timeout => return Outcome::Timeout,
            }
        }
    }

    /// Checks whether `bad` already holds at an initial state, the trivial zero-step
    /// counterexample that never touches the obligation forest.
    fn init_check(&mut self) -> Outcome<Option<Trace>> {
        let bad = self.aig.bad();
        let result = {
            let mut scope = scoped(&mut self.sat);
            self.cnf.assume_level(scope.solver(), 0);
            scope.solver().assume(bad);
            scope.solver().solve(self.deadline)
        };
        match result {
            SolveResult::Timeout => Outcome::Timeout,
            SolveResult::Unsat => Outcome::Done(None),
            SolveResult::Sat => {
                let view = self.preprocessor.model_view(&self.sat, &self.aig);
                let step: Vec<bool> = (0..self.aig.var_count())
                    .map(|idx| view.value(ic3_formula::Var::from_index(idx).positive()))
                    .collect();
                let mut trace = Trace::new(self.aig.var_count());
                trace.append(step);
                Outcome::Done(Some(trace))
            }
        }
    }

    /// Processes the root obligation: is there a predecessor of `bad` within `F_{k*-1}`?
    fn handle_root(&mut self, root: ObId) -> Outcome<Option<Status>> {
        let k = self.obligations.k_star();
        debug_assert_eq!(k, self.cnf.max_level());
        assert!(k > 0, "root obligation reached k* == 0, construction always opens at least two frames");
        let from = k - 1;
        let bad = self.aig.bad();
        let primed_bad = self.primer.primed(bad);

        let (result, pred) = {
            let mut scope = scoped(&mut self.sat);
            self.cnf.assume_level(scope.solver(), from);
            scope.solver().assume(!bad);
            scope.solver().assume(primed_bad);
            let result = scope.solver().solve(self.deadline);
            let pred = if result == SolveResult::Sat {
                justify_predecessor(
                    scope.solver(),
                    &self.aig,
                    &mut self.primer,
                    &mut self.justifier,
                    self.config.justify,
                    &[bad],
                    &mut self.rng,
                )
            } else {
                Vec::new()
            };
            (result, pred)
        };

        match result {
            SolveResult::Timeout => Outcome::Timeout,
            SolveResult::Sat => {
                let init_witness = pred.iter().copied().find(|&l| self.aig.violates_init(l)).unwrap_or(Lit::NONE);
                self.obligations.extend(root, pred, init_witness);
                Outcome::Done(None)
            }
            SolveResult::Unsat => match self.pusher.prop(
                &mut self.sat,
                &mut self.cnf,
                &mut self.primer,
                &self.aig,
                &mut self.obligations,
                self.cnf.max_level(),
                self.deadline,
            ) {
                Outcome::Timeout => Outcome::Timeout,
                Outcome::Done(fixed_point) => {
                    if fixed_point {
                        log::info!("ic3: reached a fixed point at k* = {}", self.obligations.k_star());
                        Outcome::Done(Some(Status::Unreachable { invariant: self.collect_invariant() }))
                    } else if self.obligations.k_star() >= self.config.max_depth {
                        Outcome::Done(Some(Status::Unknown))
                    } else {
                        self.cnf.push_k();
                        self.pusher.new_frame(&self.cnf);
                        self.obligations.grow();
                        log::info!("ic3: grew to k* = {}", self.obligations.k_star());
                        Outcome::Done(None)
                    }
                }
            },
        }
    }

    /// Processes a non-root obligation at frame `k`: base case (`k == 0`, consistency with the
    /// initial predicate alone) or the general predecessor search against `F_{k-1}`.
    fn handle_obligation(&mut self, o: ObId) -> Outcome<Option<Trace>> {
        let k = self.obligations.k(o);
        let cube = self.obligations.cube(o).to_vec();

        if k == 0 {
            return match cube.iter().copied().find(|&l| self.aig.violates_init(l)) {
                Some(witness) => {
                    self.cnf.add(&mut self.sat, vec![!witness], 0);
                    self.obligations.block(o, &[witness]);
                    Outcome::Done(None)
                }
                None => match self.trace_builder.build(
                    &mut self.sat,
                    &self.aig,
                    &self.primer,
                    &self.preprocessor,
                    &self.obligations,
                    o,
                    self.deadline,
                ) {
                    Outcome::Done(trace) => Outcome::Done(Some(trace)),
                    Outcome::Timeout => Outcome::Timeout,
                },
            };
        }

        let from = k - 1;
        let bad = self.aig.bad();
        let (result, pred) = {
            let mut scope = scoped(&mut self.sat);
            self.cnf.assume_level(scope.solver(), from);
            scope.solver().assume(!bad);
            let mut primed_cube = Vec::with_capacity(cube.len());
            for &l in &cube {
                primed_cube.push(self.primer.prime(scope.solver(), &self.aig, l));
            }
            for &p in &primed_cube {
                scope.solver().assume(p);
            }
            let result = scope.solver().solve(self.deadline);
            let pred = if result == SolveResult::Sat {
                justify_predecessor(
                    scope.solver(),
                    &self.aig,
                    &mut self.primer,
                    &mut self.justifier,
                    self.config.justify,
                    &cube,
                    &mut self.rng,
                )
            } else {
                Vec::new()
            };
            (result, pred)
        };

        match result {
            SolveResult::Timeout => Outcome::Timeout,
            SolveResult::Sat => {
                let init_witness = pred.iter().copied().find(|&l| self.aig.violates_init(l)).unwrap_or(Lit::NONE);
                self.obligations.extend(o, pred, init_witness);
                Outcome::Done(None)
            }
            SolveResult::Unsat => match self.generalize_and_block(o, k, &cube) {
                Outcome::Done(()) => Outcome::Done(None),
                Outcome::Timeout => Outcome::Timeout,
            },
        }
    }

    /// Shrinks `cube` into a clause known to hold at frame `k` (having just shown it has no
    /// predecessor in `F_{k-1}`), stores it, and marks `o` blocked.
    fn generalize_and_block(&mut self, o: ObId, k: u32, cube: &[Lit]) -> Outcome<()> {
        let from = k - 1;
        let bad = self.aig.bad();
        let init_witness = self.obligations.init_witness(o);
        let cnf = &self.cnf;
        let assume_scope = |s: &mut dyn SatSolver| {
            cnf.assume_level(s, from);
            s.assume(!bad);
        };

        let clause = match self.generalizer.generalize(
            &mut self.sat,
            &mut self.primer,
            &self.aig,
            assume_scope,
            cube,
            init_witness,
            &self.config,
            &mut self.rng,
            self.deadline,
        ) {
            Outcome::Done(c) => c,
            Outcome::Timeout => return Outcome::Timeout,
        };

        let ms: Vec<Lit> = clause.iter().map(|&l| !l).collect();
        self.cnf.add(&mut self.sat, clause, k);
        self.obligations.block(o, &ms);
        self.pusher.on_block(
            &mut self.sat,
            &mut self.cnf,
            &mut self.primer,
            &self.aig,
            &mut self.obligations,
            &mut self.generalizer,
            &self.config,
            &mut self.rng,
            k,
            self.deadline,
        )
    }

    /// Union of every clause currently live in `cnf`, across every frame. Sound as the final
    /// invariant once `handle_root` has observed a fixed point: every clause below the saturated
    /// level has, by then, either been pushed up through it or is itself still part of the
    /// accumulated knowledge the fixed point was checked against.
    fn collect_invariant(&self) -> Vec<Vec<Lit>> {
        let mut out = Vec::new();
        for level in 0..=self.cnf.max_level() {
            self.cnf.for_all(level, |_, lits| out.push(lits.to_vec()));
        }
        out
    }

    /// Independently re-checks a claimed invariant: initiation (every clause holds at every
    /// initial state), consecution (the invariant as a whole implies each of its own clauses one
    /// step later), and `invariant ⇒ ¬bad`.
    fn verify_invariant(&mut self, invariant: &[Vec<Lit>]) -> Outcome<std::result::Result<(), String>> {
        for (idx, clause) in invariant.iter().enumerate() {
            let mut scope = scoped(&mut self.sat);
            self.cnf.assume_level(scope.solver(), 0);
            for &lit in clause {
                scope.solver().assume(!lit);
            }
            match scope.solver().solve(self.deadline) {
                SolveResult::Timeout => return Outcome::Timeout,
                SolveResult::Sat => {
                    return Outcome::Done(Err(format!("initiation failed for invariant clause {idx}: {clause:?}")));
                }
                SolveResult::Unsat => {}
            }
        }

        let bad = self.aig.bad();
        for (idx, clause) in invariant.iter().enumerate() {
            let mut scope = scoped(&mut self.sat);
            self.cnf.assume_level(scope.solver(), 0);
            scope.solver().assume(!bad);
            for &lit in clause {
                let p = self.primer.prime(scope.solver(), &self.aig, lit);
                scope.solver().assume(!p);
            }
            match scope.solver().solve(self.deadline) {
                SolveResult::Timeout => return Outcome::Timeout,
                SolveResult::Sat => {
                    return Outcome::Done(Err(format!("consecution failed for invariant clause {idx}: {clause:?}")));
                }
                SolveResult::Unsat => {}
            }
        }

        let mut scope = scoped(&mut self.sat);
        self.cnf.assume_level(scope.solver(), 0);
        scope.solver().assume(bad);
        match scope.solver().solve(self.deadline) {
            SolveResult::Timeout => Outcome::Timeout,
            SolveResult::Sat => Outcome::Done(Err("invariant does not imply bad's negation".to_string())),
            SolveResult::Unsat => Outcome::Done(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic3_formula::AigBuilder;
    use ic3_sat::RefSolver;

    fn driver(aig: Aig) -> Driver<RefSolver> {
        Driver::new(Config::default(), aig, RefSolver::new(), Deadline::none())
    }

    #[test]
    fn never_changing_latch_is_unreachable() {
        let mut b = AigBuilder::new();
        let m = b.latch(Some(false));
        b.set_next(m, m);
        let aig = b.build(m).unwrap();

        let mut d = driver(aig);
        match d.run() {
            Outcome::Done(Status::Unreachable { invariant }) => assert!(!invariant.is_empty()),
            other => panic!("expected Unreachable, got {:?}", other),
        }
    }

    #[test]
    fn input_driven_latch_is_reachable_in_one_step() {
        let mut b = AigBuilder::new();
        let x = b.input();
        let m = b.latch(Some(false));
        b.set_next(m, x);
        let aig = b.build(m).unwrap();

        let mut d = driver(aig.clone());
        match d.run() {
            Outcome::Done(Status::Reachable { trace }) => {
                assert!(trace.verify(&aig));
                assert_eq!(trace.depth(), 2);
            }
            other => panic!("expected Reachable, got {:?}", other),
        }
    }

    #[test]
    fn shift_register_needs_depth_before_reporting_reachable() {
        // next(m0) = x, next(m1) = m0, bad = m1: takes two steps from init for `x` to reach `m1`.
        let mut b = AigBuilder::new();
        let x = b.input();
        let m0 = b.latch(Some(false));
        let m1 = b.latch(Some(false));
        b.set_next(m0, x);
        b.set_next(m1, m0);
        let aig = b.build(m1).unwrap();

        let mut d = driver(aig.clone());
        match d.run() {
            Outcome::Done(Status::Reachable { trace }) => {
                assert!(trace.verify(&aig));
                assert_eq!(trace.depth(), 3);
            }
            other => panic!("expected Reachable, got {:?}", other),
        }
    }

    #[test]
    fn second_latch_held_off_init_is_unreachable() {
        // m1 can never become true: its only driver, m0, never leaves false.
        let mut b = AigBuilder::new();
        let m0 = b.latch(Some(false));
        let m1 = b.latch(Some(false));
        b.set_next(m0, m0);
        b.set_next(m1, m0);
        let aig = b.build(m1).unwrap();

        let mut d = driver(aig);
        let status = d.solve().expect("run should not error");
        assert!(matches!(status, Status::Unreachable { .. }));
    }

    #[test]
    fn solve_reports_a_reachable_trace_too() {
        let mut b = AigBuilder::new();
        let x = b.input();
        let m = b.latch(Some(false));
        b.set_next(m, x);
        let aig = b.build(m).unwrap();

        let mut d = driver(aig.clone());
        match d.solve().expect("run should not error") {
            Status::Reachable { trace } => assert!(trace.verify(&aig)),
            other => panic!("expected Reachable, got {:?}", other),
        }
    }

    #[test]
    fn without_preprocessing_or_justification_still_decides_correctly() {
        let config = Config {
            preprocess: false,
            justify: false,
            ..Config::default()
        };
        let mut b = AigBuilder::new();
        let m = b.latch(Some(false));
        b.set_next(m, m);
        let aig = b.build(m).unwrap();

        let mut d = Driver::new(config, aig, RefSolver::new(), Deadline::none());
        match d.run() {
            Outcome::Done(Status::Unreachable { .. }) => {}
            other => panic!("expected Unreachable, got {:?}", other),
        }
    }
}
