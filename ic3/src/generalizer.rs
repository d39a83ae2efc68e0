//! Two-phase inductive cube reduction: unsat-core shrinking plus optional literal dropping
//! (§4.5).
use rand::Rng;
use rustc_hash::FxHashSet;

use ic3_formula::{Aig, Lit};
use ic3_sat::{contract::scoped, Deadline, SatSolver, SolveResult};

use crate::config::Config;
use crate::error::Outcome;
use crate::primer::Primer;

/// Call-count statistics for one [`Generalizer`], logged at the end of each call.
#[derive(Copy, Clone, Debug, Default)]
pub struct Stats {
    pub calls: u64,
    pub shrink_iterations: u64,
    pub drop_attempts: u64,
    pub drop_successes: u64,
    pub literals_in: u64,
    pub literals_out: u64,
}

/// Shrinks a cube known to be unreachable into a smaller (therefore stronger once negated)
/// unreachable cube.
///
/// Every SAT call this makes re-establishes its own assumption scope: the frame being tested
/// against, `¬bad`, and the primed literals of the cube under test. The caller is expected to have
/// already confirmed that the *full* cube is unsat in this scope (that is how it ended up here);
/// [`Generalizer::generalize`] re-derives that same fact as its first iteration so it can read a
/// fresh `why()` core for it.
#[derive(Default)]
pub struct Generalizer {
    stats: Stats,
}

impl Generalizer {
    pub fn new() -> Self {
        Generalizer::default()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Shrinks `cube` (sorted literals over latches) into a clause (the negation of a sub-cube)
    /// that is still unsat in the scope established by `assume_scope`, and intersects the negated
    /// initial predicate.
    ///
    /// `assume_scope` is called once per SAT attempt to set up everything but the primed cube
    /// literals themselves (the frame assumption and `¬bad`); this keeps the generalizer agnostic
    /// of how the caller represents "the current frame".
    #[allow(clippy::too_many_arguments)]
    pub fn generalize(
        &mut self,
        sat: &mut dyn SatSolver,
        primer: &mut Primer,
        aig: &Aig,
        mut assume_scope: impl FnMut(&mut dyn SatSolver),
        cube: &[Lit],
        init_witness: Lit,
        config: &Config,
        rng: &mut impl Rng,
        deadline: Deadline,
    ) -> Outcome<Vec<Lit>> {
        self.stats.calls += 1;
        self.stats.literals_in += cube.len() as u64;

        let mut current = match self.shrink_to_core(sat, primer, aig, &mut assume_scope, cube, init_witness, deadline) {
            Outcome::Done(c) => c,
            Outcome::Timeout => return Outcome::Timeout,
        };

        if config.generalizer_remove_lits {
            match self.drop_literals(sat, primer, aig, &mut assume_scope, current, init_witness, rng, deadline) {
                Outcome::Done(shrunk) => current = shrunk,
                Outcome::Timeout => return Outcome::Timeout,
            }
        }

        self.stats.literals_out += current.len() as u64;

        let mut clause: Vec<Lit> = current.iter().map(|&l| !l).collect();
        if !clause.contains(&!init_witness) && current.iter().all(|&l| !aig.violates_init(l)) {
            clause.push(!init_witness);
        }
        clause.sort_unstable();
        clause.dedup();

        log::debug!(
            "generalize: {} -> {} literals ({} shrink iterations, {}/{} drops)",
            cube.len(),
            clause.len(),
            self.stats.shrink_iterations,
            self.stats.drop_successes,
            self.stats.drop_attempts,
        );
        Outcome::Done(clause)
    }

    /// Phase 1 alone: repeatedly re-solve under the primed cube and intersect with the unsat core,
    /// until a fixpoint, keeping at least one literal that violates the initial predicate.
    ///
    /// Factored out so the pusher's consecutive-sifting pass — which shrinks a clause already
    /// known to hold at a frame using exactly this same core-intersection loop, just without the
    /// random-drop phase — can reuse it instead of re-deriving the loop.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn shrink_to_core(
        &mut self,
        sat: &mut dyn SatSolver,
        primer: &mut Primer,
        aig: &Aig,
        assume_scope: &mut impl FnMut(&mut dyn SatSolver),
        cube: &[Lit],
        init_witness: Lit,
        deadline: Deadline,
    ) -> Outcome<Vec<Lit>> {
        let mut current = cube.to_vec();
        loop {
            let (result, why_primed) = {
                let mut scope = scoped(sat);
                assume_scope(scope.solver());
                let mut primed = Vec::with_capacity(current.len());
                for &l in &current {
                    let p = primer.prime(scope.solver(), aig, l);
                    primed.push(p);
                    scope.solver().assume(p);
                }
                let result = scope.solver().solve(deadline);
                if result == SolveResult::Timeout {
                    (result, Vec::new())
                } else {
                    assert_eq!(
                        result,
                        SolveResult::Unsat,
                        "generalizer invoked on a cube that is not actually unsat in this scope"
                    );
                    let mut why = Vec::new();
                    scope.solver().why(&mut why);
                    (result, why)
                }
            };
            if result == SolveResult::Timeout {
                return Outcome::Timeout;
            }
            self.stats.shrink_iterations += 1;

            let why_set: FxHashSet<Lit> = why_primed.into_iter().collect();
            let mut next: Vec<Lit> = current
                .iter()
                .copied()
                .filter(|&l| why_set.contains(&primer.prime(sat, aig, l)))
                .collect();

            if !next.iter().any(|&l| aig.violates_init(l)) {
                assert!(
                    !init_witness.is_none(),
                    "generalizer shrunk a cube past its init witness with none recorded"
                );
                if !next.contains(&init_witness) {
                    next.push(init_witness);
                    next.sort_unstable();
                }
            }

            if next.len() == current.len() {
                current = next;
                break;
            }
            current = next;
        }
        Outcome::Done(current)
    }

    /// Phase 2: starting from `cube` with `init_witness` pinned, repeatedly try dropping one
    /// random non-pinned literal; on a successful (unsat) re-solve, intersect the surviving cube
    /// with the new unsat core. Capped at `cube.len() / 3` failures. Disabled by default — see
    /// §9's resolution of the literal-dropping open question for the invariant this relies on.
    #[allow(clippy::too_many_arguments)]
    fn drop_literals(
        &mut self,
        sat: &mut dyn SatSolver,
        primer: &mut Primer,
        aig: &Aig,
        assume_scope: &mut impl FnMut(&mut dyn SatSolver),
        mut cube: Vec<Lit>,
        init_witness: Lit,
        rng: &mut impl Rng,
        deadline: Deadline,
    ) -> Outcome<Vec<Lit>> {
        let cap = cube.len() / 3;
        let mut failures = 0;
        while failures < cap {
            let candidates: Vec<usize> = (0..cube.len()).filter(|&i| cube[i] != init_witness).collect();
            if candidates.is_empty() {
                break;
            }
            let pick = candidates[rng.gen_range(0, candidates.len())];
            let dropped = cube[pick];
            let mut trial: Vec<Lit> = cube.iter().copied().filter(|&l| l != dropped).collect();

            self.stats.drop_attempts += 1;
            let (result, why_primed) = {
                let mut scope = scoped(sat);
                assume_scope(scope.solver());
                for &l in &trial {
                    let p = primer.prime(scope.solver(), aig, l);
                    scope.solver().assume(p);
                }
                let result = scope.solver().solve(deadline);
                if result == SolveResult::Timeout {
                    (result, Vec::new())
                } else {
                    let mut why = Vec::new();
                    if result == SolveResult::Unsat {
                        scope.solver().why(&mut why);
                    }
                    (result, why)
                }
            };
            match result {
                SolveResult::Timeout => return Outcome::Timeout,
                SolveResult::Sat => {
                    failures += 1;
                }
                SolveResult::Unsat => {
                    self.stats.drop_successes += 1;
                    let why_set: FxHashSet<Lit> = why_primed.into_iter().collect();
                    trial.retain(|&l| why_set.contains(&primer.prime(sat, aig, l)) || l == init_witness);
                    cube = trial;
                }
            }
        }
        Outcome::Done(cube)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic3_formula::AigBuilder;
    use ic3_sat::RefSolver;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn shrinks_cube_to_core_and_keeps_init_cut() {
        // m0, m1 both held at init false; a clause blocking {m0, m1, extra} should shrink down to
        // something that still violates init (here, m0 alone already does).
        let mut b = AigBuilder::new();
        let m0 = b.latch(Some(false));
        let m1 = b.latch(Some(false));
        let extra = b.latch(None);
        b.set_next(m0, m0);
        b.set_next(m1, m1);
        b.set_next(extra, extra);
        let aig = b.build(m0).unwrap();

        let mut sat = RefSolver::new();
        let mut primer = Primer::new();
        let config = Config::default();
        let mut rng = StdRng::seed_from_u64(1);

        // Frame 0 is just "init": force m0, m1, extra's primed value inconsistent with any
        // assumption of m0 true lets us witness unsat trivially by forcing the contradiction
        // directly at the propositional level (no frame/pusher machinery needed for this test).
        sat.add(Some(!m0));
        sat.add(None);

        let mut gnrl = Generalizer::new();
        let cube = vec![m0, m1, extra];
        let result = gnrl.generalize(
            &mut sat,
            &mut primer,
            &aig,
            |_sat| {},
            &cube,
            m0,
            &config,
            &mut rng,
            Deadline::none(),
        );
        let clause = match result {
            Outcome::Done(c) => c,
            Outcome::Timeout => panic!("unexpected timeout"),
        };
        assert!(clause.contains(&!m0));
        assert!(clause.iter().any(|&l| aig.violates_init(!l)));
    }
}
