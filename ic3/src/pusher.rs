//! Forward propagation of frame clauses and consecutive sifting (§4.8).
use rand::seq::SliceRandom;
use rand::Rng;

use ic3_formula::{Aig, Lit};
use ic3_sat::{contract::scoped, Deadline, SatSolver, SolveResult};

use crate::cnf::{Cnf, ClauseId};
use crate::config::Config;
use crate::error::Outcome;
use crate::generalizer::Generalizer;
use crate::obligations::Obligations;
use crate::primer::Primer;

/// Call-count statistics for one [`Pusher`].
#[derive(Copy, Clone, Debug, Default)]
pub struct Stats {
    pub clauses_examined: u64,
    pub clauses_pushed: u64,
    pub sift_attempts: u64,
    pub sift_reduced: u64,
    pub pulls: u64,
}

/// Forward-pushes frame clauses level by level and, on request, re-shrinks an over-grown frame's
/// clauses in place ("consecutive sifting").
///
/// `last_sift_len[i]` records `Cnf::len_k(i)` as of the last time frame `i` was sifted (or
/// created); `on_block` compares the live count against it, discounted exponentially by distance
/// from the current top frame, to decide whether this particular block is the one that should
/// trigger a sift rather than just letting the frame keep growing.
pub struct Pusher {
    stats: Stats,
    last_sift_len: Vec<usize>,
    /// The highest level fully propagated as of the last `prop` call. Reset to zero every time a
    /// new top frame opens: a new frame can make previously-unpushable lower clauses pushable, so
    /// the next `prop` re-sweeps every level rather than resuming from where it left off.
    cursor: u32,
}

impl Default for Pusher {
    fn default() -> Self {
        Pusher::new()
    }
}

impl Pusher {
    pub fn new() -> Self {
        Pusher {
            stats: Stats::default(),
            last_sift_len: Vec::new(),
            cursor: 0,
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    fn ensure_level(&mut self, level: u32) {
        while self.last_sift_len.len() <= level as usize {
            self.last_sift_len.push(0);
        }
    }

    /// Call once after `Cnf::push_k` opens a new top frame: records sift baselines for every live
    /// level and resets the propagation cursor to the bottom.
    pub fn new_frame(&mut self, cnf: &Cnf) {
        self.ensure_level(cnf.max_level());
        for level in 0..=cnf.max_level() {
            self.last_sift_len[level as usize] = cnf.len_k(level);
        }
        self.cursor = 0;
    }

    /// Propagates every level from the internal cursor up to `to` (exclusive), then reports
    /// whether the last level processed (`to - 1`) reached a fixed point: every clause that was
    /// there got promoted forward, so the frame is now empty and equal to the one above it.
    #[allow(clippy::too_many_arguments)]
    pub fn prop(
        &mut self,
        sat: &mut dyn SatSolver,
        cnf: &mut Cnf,
        primer: &mut Primer,
        aig: &Aig,
        obligations: &mut Obligations,
        to: u32,
        deadline: Deadline,
    ) -> Outcome<bool> {
        let from = self.cursor;
        for level in from..to {
            match self.propagate_level(sat, cnf, primer, aig, obligations, level, deadline) {
                Outcome::Done(()) => {}
                Outcome::Timeout => return Outcome::Timeout,
            }
        }
        self.cursor = to;
        Outcome::Done(to > 0 && cnf.len_k(to - 1) == 0)
    }

    /// Pushes every clause currently at exactly `level` one level forward: a clause survives
    /// consecution (`F_level ∧ transition ⇒ clause'`) when assuming `F_level`, `¬bad`, and the
    /// negated primed literals of the clause is unsat.
    #[allow(clippy::too_many_arguments)]
    pub fn propagate_level(
        &mut self,
        sat: &mut dyn SatSolver,
        cnf: &mut Cnf,
        primer: &mut Primer,
        aig: &Aig,
        obligations: &mut Obligations,
        level: u32,
        deadline: Deadline,
    ) -> Outcome<()> {
        let ids: Vec<ClauseId> = {
            let mut ids = Vec::new();
            cnf.for_all(level, |id, _| ids.push(id));
            ids
        };

        for id in ids {
            self.stats.clauses_examined += 1;
            let lits = cnf.literals(id).to_vec();
            let pushable = {
                let mut scope = scoped(sat);
                cnf.assume_level(scope.solver(), level);
                scope.solver().assume(!aig.bad());
                for &l in &lits {
                    let p = primer.prime(scope.solver(), aig, l);
                    scope.solver().assume(!p);
                }
                scope.solver().solve(deadline)
            };
            match pushable {
                SolveResult::Timeout => return Outcome::Timeout,
                SolveResult::Sat => {}
                SolveResult::Unsat => {
                    let new_level = cnf.push(id);
                    self.stats.clauses_pushed += 1;
                    let blocked_cube: Vec<Lit> = lits.iter().map(|&l| !l).collect();
                    obligations.block_at(new_level, &blocked_cube);
                }
            }
        }
        cnf.simplify(sat, level, |_, _| {});
        Outcome::Done(())
    }

    /// Called by the driver immediately after a clause is added to frame `level` via `block`. If
    /// the frame has grown enough since its last sift to clear the discounted-growth threshold,
    /// re-shrinks every clause at `level` in place, then (if enabled) immediately propagates the
    /// frame below so the newly-stronger clauses can migrate up without waiting for the next full
    /// propagation phase.
    #[allow(clippy::too_many_arguments)]
    pub fn on_block(
        &mut self,
        sat: &mut dyn SatSolver,
        cnf: &mut Cnf,
        primer: &mut Primer,
        aig: &Aig,
        obligations: &mut Obligations,
        generalizer: &mut Generalizer,
        config: &Config,
        rng: &mut impl Rng,
        level: u32,
        deadline: Deadline,
    ) -> Outcome<()> {
        self.ensure_level(level);
        if !config.consecutive_sift && !config.consecutive_sift_pull {
            return Outcome::Done(());
        }
        if !self.should_sift(cnf, level) {
            return Outcome::Done(());
        }

        if config.consecutive_sift {
            match self.sift_level(sat, cnf, primer, aig, obligations, generalizer, rng, level, deadline) {
                Outcome::Done(()) => {}
                Outcome::Timeout => return Outcome::Timeout,
            }
            self.last_sift_len[level as usize] = cnf.len_k(level);
        }
        if config.consecutive_sift_pull && level > 0 {
            match self.propagate_level(sat, cnf, primer, aig, obligations, level - 1, deadline) {
                Outcome::Done(()) => {}
                Outcome::Timeout => return Outcome::Timeout,
            }
            self.stats.pulls += 1;
        }
        Outcome::Done(())
    }

    /// Whether `level`'s live clause count has grown past `0.95^(k* - level)` of itself (scaled by
    /// three) since the last sift, the threshold past which re-shrinking is judged worth its cost.
    fn should_sift(&self, cnf: &Cnf, level: u32) -> bool {
        let k_star = cnf.max_level();
        let cnf_len = cnf.len_k(level) as i64;
        let last = self.last_sift_len.get(level as usize).copied().unwrap_or(0) as i64;
        let potential = cnf_len - last;
        let target = cnf_len as f64 * 0.95f64.powi((k_star - level) as i32);
        let rounded_target = (target + 0.5).floor() as i64;
        potential * 3 > rounded_target
    }

    /// Re-shrinks every clause at `level` using the same unsat-core intersection loop the
    /// generalizer uses on a fresh proof obligation, just without the random-drop phase: each
    /// clause's literals, read as a cube, are shuffled and shrunk against the frames from
    /// `level - 1` upward. A strictly smaller result is added as a new clause at `level`; the
    /// original is left for the next `simplify` to subsume away.
    #[allow(clippy::too_many_arguments)]
    fn sift_level(
        &mut self,
        sat: &mut dyn SatSolver,
        cnf: &mut Cnf,
        primer: &mut Primer,
        aig: &Aig,
        obligations: &mut Obligations,
        generalizer: &mut Generalizer,
        rng: &mut impl Rng,
        level: u32,
        deadline: Deadline,
    ) -> Outcome<()> {
        let start = level.saturating_sub(1);
        let ids: Vec<ClauseId> = {
            let mut ids = Vec::new();
            cnf.for_all(level, |id, _| ids.push(id));
            ids
        };

        for id in ids {
            self.stats.sift_attempts += 1;
            let clause_lits = cnf.literals(id).to_vec();
            if clause_lits.len() <= 1 {
                continue;
            }
            let mut cube: Vec<Lit> = clause_lits.iter().map(|&l| !l).collect();
            cube.shuffle(rng);
            let init_witness = cube.iter().copied().find(|&l| aig.violates_init(l)).unwrap_or(Lit::NONE);

            let mut assume_scope = |s: &mut dyn SatSolver| {
                cnf.assume_level(s, start);
                s.assume(!aig.bad());
            };
            let shrunk = match generalizer.shrink_to_core(sat, primer, aig, &mut assume_scope, &cube, init_witness, deadline) {
                Outcome::Done(c) => c,
                Outcome::Timeout => return Outcome::Timeout,
            };

            if shrunk.len() < cube.len() {
                self.stats.sift_reduced += 1;
                let mut new_clause: Vec<Lit> = shrunk.iter().map(|&l| !l).collect();
                new_clause.sort_unstable();
                new_clause.dedup();
                cnf.add(sat, new_clause, level);
                obligations.block_at(level, &shrunk);
            }
        }
        cnf.simplify(sat, level, |_, _| {});
        Outcome::Done(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic3_formula::AigBuilder;
    use ic3_sat::RefSolver;
    use rand::{rngs::StdRng, SeedableRng};

    /// A latch that never changes value, used as a `bad` literal that can never interfere with
    /// whatever actual behavior a test circuit is exercising via `!aig.bad()`.
    fn neutral_bad(b: &mut AigBuilder) -> Lit {
        let bad = b.latch(Some(false));
        b.set_next(bad, bad);
        bad
    }

    #[test]
    fn pushable_clause_is_promoted() {
        // m held at init=false with next(m) = m (a self-loop): once false, forever false, so the
        // clause blocking cube {m} (stored as `{!m}`) should push to every frame.
        let mut b = AigBuilder::new();
        let m = b.latch(Some(false));
        b.set_next(m, m);
        let bad = neutral_bad(&mut b);
        let aig = b.build(bad).unwrap();

        let mut sat = RefSolver::new();
        let mut primer = Primer::new();
        let mut cnf = Cnf::new();
        cnf.push_k();
        let mut obligations = crate::obligations::Obligations::new(1, crate::config::RequeuePolicy::Long);
        let id = cnf.add(&mut sat, vec![!m], 0);

        let mut pusher = Pusher::new();
        let outcome = pusher.propagate_level(&mut sat, &mut cnf, &mut primer, &aig, &mut obligations, 0, Deadline::none());
        assert!(matches!(outcome, Outcome::Done(())));
        assert_eq!(cnf.level(id), 1);
        assert_eq!(pusher.stats().clauses_pushed, 1);
    }

    #[test]
    fn unpushable_clause_stays_put() {
        // n held at init=true with next(n) = !n (flips every step): the clause {n} holds at frame
        // 0 but not the step after, so it must not push.
        let mut b = AigBuilder::new();
        let n = b.latch(Some(true));
        b.set_next(n, !n);
        let bad = neutral_bad(&mut b);
        let aig = b.build(bad).unwrap();

        let mut sat = RefSolver::new();
        let mut primer = Primer::new();
        let mut cnf = Cnf::new();
        cnf.push_k();
        let mut obligations = crate::obligations::Obligations::new(1, crate::config::RequeuePolicy::Long);
        let id = cnf.add(&mut sat, vec![n], 0);

        let mut pusher = Pusher::new();
        let outcome = pusher.propagate_level(&mut sat, &mut cnf, &mut primer, &aig, &mut obligations, 0, Deadline::none());
        assert!(matches!(outcome, Outcome::Done(())));
        assert_eq!(cnf.level(id), 0, "n holds at level 0 (init) but not in the next step");
    }

    #[test]
    fn sift_level_runs_to_completion_without_shrinking_below_the_core() {
        // RefSolver's `why()` reports every literal assumed so far rather than a minimized core
        // (see its own doc comment), so this exercises that sifting a multi-literal clause
        // terminates and leaves a still-valid (if not strictly smaller) clause in place, without
        // asserting an exact reduction the reference solver cannot actually produce.
        let mut b = AigBuilder::new();
        let m = b.latch(Some(false));
        b.set_next(m, m);
        let u = b.latch(Some(false));
        b.set_next(u, u);
        let bad = neutral_bad(&mut b);
        let aig = b.build(bad).unwrap();

        let mut sat = RefSolver::new();
        let mut primer = Primer::new();
        let mut cnf = Cnf::new();
        cnf.push_k();
        let mut obligations = crate::obligations::Obligations::new(1, crate::config::RequeuePolicy::Long);
        let mut generalizer = Generalizer::new();
        let mut rng = StdRng::seed_from_u64(7);

        cnf.add(&mut sat, vec![!u], 0); // u's own init fact, as the driver would install it
        let clause_id = cnf.add(&mut sat, vec![!m, !u], 0);
        let before = cnf.literals(clause_id).len();

        let mut pusher = Pusher::new();
        pusher.new_frame(&cnf);
        let outcome = pusher.sift_level(
            &mut sat,
            &mut cnf,
            &mut primer,
            &aig,
            &mut obligations,
            &mut generalizer,
            &mut rng,
            0,
            Deadline::none(),
        );
        assert!(matches!(outcome, Outcome::Done(())));
        // the original clause is untouched; any smaller replacement is added alongside it, left
        // for the next `simplify` to subsume.
        assert_eq!(cnf.literals(clause_id).len(), before);
    }

    #[test]
    fn should_sift_triggers_past_the_discounted_growth_threshold() {
        let mut sat = RefSolver::new();
        let mut cnf = Cnf::new();
        cnf.push_k(); // levels 0, 1
        for i in 0..10 {
            cnf.add(&mut sat, vec![ic3_formula::Lit::from_dimacs(i + 1)], 0);
        }
        let mut pusher = Pusher::new();
        pusher.new_frame(&cnf); // baseline = 10 at level 0
        for i in 10..30 {
            cnf.add(&mut sat, vec![ic3_formula::Lit::from_dimacs(i + 1)], 0);
        }
        assert!(pusher.should_sift(&cnf, 0), "tripled in size since the baseline, well past threshold");
    }
}
