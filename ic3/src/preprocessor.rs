//! Variable elimination and self-subsuming resolution over the circuit's own gate CNF (§4.9).
use std::collections::VecDeque;

use rand::Rng;
use rustc_hash::FxHashSet;

use ic3_formula::{Aig, Lit, NodeKind, Var};
use ic3_sat::{Deadline, SatSolver, SolveResult};

use crate::cnf::contains_sorted;
use crate::resolver::Resolver;

/// Call-count statistics for one [`Preprocessor`] run, logged once at the end.
#[derive(Copy, Clone, Debug, Default)]
pub struct Stats {
    pub clauses_in: u64,
    pub clauses_out: u64,
    pub eliminated: u64,
    pub resolvents_added: u64,
    pub ssr_removed: u64,
}

fn signature(lits: &[Lit]) -> u64 {
    lits.iter().fold(0u64, |sig, lit| sig | (1u64 << (lit.var().index() % 64)))
}

/// `a` (sorted) contains every literal of `b` (sorted) except `b`'s occurrence of `except`.
fn contains_sorted_except(a: &[Lit], b: &[Lit], except: Lit) -> bool {
    let mut bi = b.iter();
    'outer: for &la in a {
        if la == except {
            continue;
        }
        for &lb in &mut bi {
            if lb == la {
                continue 'outer;
            }
            if lb > la {
                return false;
            }
        }
        return false;
    }
    true
}

struct ClauseRec {
    lits: Vec<Lit>,
    sig: u64,
}

/// Reduces the circuit's own Tseitin CNF (the AND-gate definitions reachable from every latch's
/// next-function and from `bad`) by resolution before the main loop ever sees it.
///
/// Owns a private clause database, separate from [`crate::cnf::Cnf`]: elimination has no notion of
/// frame levels, and the clauses it works with are discarded once the reduced result is dumped
/// into the live solver as permanent facts. Latch current/next variables and `bad` are frozen
/// (never chosen as an elimination pivot), matching the original's `findFrozen`.
#[derive(Default)]
pub struct Preprocessor {
    stats: Stats,
    clauses: Vec<Option<ClauseRec>>,
    free_ids: Vec<u32>,
    occs: Vec<Vec<u32>>,
    frozen: Vec<bool>,
    /// `to_try[v]` is cleared only when `v`'s elimination delta is (re)computed, and set again
    /// only when a clause mentioning `v` is removed — never on `add`. This is the "recompute on
    /// use, never invalidate on touch" policy: no cached delta is ever stale, because none is
    /// cached across a mutation that could have changed it without also clearing it.
    to_try: Vec<bool>,
    dcs: Vec<i64>,
    dms: Vec<i64>,
    todo: VecDeque<u32>,
    /// Gate variables resolved away. Their defining clauses no longer appear anywhere in the
    /// dumped CNF, so the live solver never assigns them a meaningful value; see
    /// [`Preprocessor::model_view`].
    eliminated: FxHashSet<Var>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Preprocessor::default()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Gate variables the elimination phase resolved away.
    pub fn eliminated(&self) -> &FxHashSet<Var> {
        &self.eliminated
    }

    /// Runs candidate selection / elimination / self-subsuming resolution to a fixed point (or
    /// until `deadline` expires), then loads the reduced clause set into `sat` as permanent
    /// clauses (no activation literal: these are circuit facts, not learned clauses tied to a
    /// frame).
    pub fn run(&mut self, sat: &mut dyn SatSolver, aig: &Aig, rng: &mut impl Rng, deadline: Deadline) -> Stats {
        self.init(aig);
        let mut marks = vec![false; aig.var_count()];
        let mut resolver = Resolver::new();

        loop {
            let (candidate, dc, dm) = self.select_best_elim(aig, &mut marks, &mut resolver, rng, deadline);
            let Some(var) = candidate else { break };
            if dc > 1 || (dc == 1 && dm > 10) {
                break;
            }
            self.elim(var, &mut resolver);
            self.ssr(&mut resolver);
            if deadline.expired() {
                break;
            }
        }

        self.dump(sat);
        self.stats
    }

    /// Loads the circuit's Tseitin CNF into `sat` verbatim, without running candidate selection,
    /// elimination, or self-subsuming resolution. Used in place of [`Preprocessor::run`] when
    /// `Config::preprocess` is disabled: the driver still needs the transition relation's defining
    /// clauses installed as permanent facts, just without the clause-count reduction pass.
    pub fn passthrough(&mut self, sat: &mut dyn SatSolver, aig: &Aig) -> Stats {
        self.init(aig);
        self.dump(sat);
        self.stats
    }

    /// Constructs a read-only model view over `sat` that reconstructs eliminated gate variables'
    /// values by simulating their definition, rather than reading a value the live solver no
    /// longer assigns them. Pass this (instead of `sat` directly) to the circuit justifier and the
    /// trace builder once preprocessing has run.
    pub fn model_view<'a>(&'a self, sat: &'a dyn SatSolver, aig: &'a Aig) -> EliminatedModel<'a> {
        EliminatedModel {
            sat,
            aig,
            eliminated: &self.eliminated,
        }
    }

    fn init(&mut self, aig: &Aig) {
        let n = aig.var_count();
        self.frozen = vec![false; n];
        self.to_try = vec![true; n];
        self.dcs = vec![0; n];
        self.dms = vec![0; n];
        self.occs = vec![Vec::new(); n * 2];
        self.eliminated = FxHashSet::default();

        for latch in aig.latches() {
            self.frozen[latch.var.index()] = true;
            self.frozen[latch.next.var().index()] = true;
        }
        self.frozen[aig.bad().var().index()] = true;

        let mut visited = vec![false; n];
        for latch in aig.latches() {
            self.encode_reachable(aig, &mut visited, latch.next);
        }
        self.encode_reachable(aig, &mut visited, aig.bad());

        self.stats.clauses_in = self.clauses.iter().flatten().count() as u64;
    }

    /// Tseitin-encodes every AND gate reachable from `lit`, using the gate's own AIG variable as
    /// its output (unlike [`crate::primer::Primer`], no fresh variable is needed: this is the
    /// current-state encoding, and the AIG already assigns each gate its own variable).
    fn encode_reachable(&mut self, aig: &Aig, visited: &mut [bool], lit: Lit) {
        let var = lit.var();
        if visited[var.index()] {
            return;
        }
        visited[var.index()] = true;
        if aig.kind(var) == NodeKind::And {
            let (a, b) = aig.and_inputs(var);
            self.encode_reachable(aig, visited, a);
            self.encode_reachable(aig, visited, b);
            let g = var.positive();
            self.add_clause(vec![!g, a]);
            self.add_clause(vec![!g, b]);
            self.add_clause(vec![g, !a, !b]);
        }
    }

    fn add_clause(&mut self, mut lits: Vec<Lit>) -> u32 {
        lits.sort_unstable();
        lits.dedup();
        let sig = signature(&lits);
        let id = if let Some(id) = self.free_ids.pop() {
            id
        } else {
            self.clauses.push(None);
            (self.clauses.len() - 1) as u32
        };
        for &l in &lits {
            self.occs[l.code()].push(id);
        }
        self.clauses[id as usize] = Some(ClauseRec { lits, sig });
        self.todo.push_back(id);
        id
    }

    fn remove_clause(&mut self, id: u32) {
        let Some(rec) = self.clauses[id as usize].take() else {
            return;
        };
        for &l in &rec.lits {
            self.to_try[l.var().index()] = true;
            self.occs[l.code()].retain(|&x| x != id);
        }
        self.free_ids.push(id);
    }

    /// Walks the AIG from every latch's next-function and from `bad`, evaluating (and caching) the
    /// elimination delta of every unfrozen gate variable reached, eagerly eliminating any variable
    /// whose delta is already known to reduce the clause count (`dc < 0`) rather than waiting to
    /// compare it against the rest of the walk.
    fn select_best_elim(
        &mut self,
        aig: &Aig,
        marks: &mut [bool],
        resolver: &mut Resolver,
        rng: &mut impl Rng,
        deadline: Deadline,
    ) -> (Option<Var>, i64, i64) {
        marks.iter_mut().for_each(|m| *m = false);
        let mut best_dc = i64::MAX;
        let mut best_dm = i64::MAX;
        let mut best_var = None;

        for latch in aig.latches() {
            self.select_elim_rec(aig, marks, resolver, latch.next, &mut best_dc, &mut best_dm, &mut best_var, rng, deadline);
        }
        self.select_elim_rec(aig, marks, resolver, aig.bad(), &mut best_dc, &mut best_dm, &mut best_var, rng, deadline);

        (best_var, best_dc, best_dm)
    }

    #[allow(clippy::too_many_arguments)]
    fn select_elim_rec(
        &mut self,
        aig: &Aig,
        marks: &mut [bool],
        resolver: &mut Resolver,
        lit: Lit,
        best_dc: &mut i64,
        best_dm: &mut i64,
        best_var: &mut Option<Var>,
        rng: &mut impl Rng,
        deadline: Deadline,
    ) {
        let var = lit.var();
        if marks[var.index()] {
            return;
        }
        marks[var.index()] = true;

        if aig.kind(var) == NodeKind::And {
            let (a, b) = aig.and_inputs(var);
            self.select_elim_rec(aig, marks, resolver, a, best_dc, best_dm, best_var, rng, deadline);
            self.select_elim_rec(aig, marks, resolver, b, best_dc, best_dm, best_var, rng, deadline);
        }
        if self.frozen[var.index()] || deadline.expired() {
            return;
        }

        let (dc, dm) = if self.to_try[var.index()] {
            self.to_try[var.index()] = false;
            let delta = self.try_elim(var, resolver);
            self.dcs[var.index()] = delta.0;
            self.dms[var.index()] = delta.1;
            delta
        } else {
            (self.dcs[var.index()], self.dms[var.index()])
        };

        if dc < 0 {
            self.elim(var, resolver);
            return;
        }
        if dc < *best_dc || (dc == *best_dc && dm < *best_dm) {
            *best_dc = dc;
            *best_dm = dm;
            *best_var = Some(var);
        } else if dc == *best_dc && dm == *best_dm && rng.gen_range(0, 3) == 1 {
            *best_var = Some(var);
        }
    }

    /// The `(Δclauses, Δliterals)` of resolving every positive occurrence of `var` against every
    /// negative occurrence, relative to simply deleting both occurrence sets outright.
    fn try_elim(&self, var: Var, resolver: &mut Resolver) -> (i64, i64) {
        let pos_occ = &self.occs[var.positive().code()];
        let neg_occ = &self.occs[var.negative().code()];
        let mut dc = 0i64;
        let mut dm = 0i64;

        for &pid in pos_occ {
            let Some(pc) = &self.clauses[pid as usize] else { continue };
            resolver.set_pivot(&pc.lits, var);
            for &nid in neg_occ {
                let Some(nc) = &self.clauses[nid as usize] else { continue };
                if let Some(resolvent) = resolver.resolve(&nc.lits) {
                    dc += 1;
                    dm += resolvent.len() as i64;
                }
            }
        }
        for &pid in pos_occ {
            if let Some(pc) = &self.clauses[pid as usize] {
                dc -= 1;
                dm -= pc.lits.len() as i64;
            }
        }
        for &nid in neg_occ {
            if let Some(nc) = &self.clauses[nid as usize] {
                dc -= 1;
                dm -= nc.lits.len() as i64;
            }
        }
        (dc, dm)
    }

    /// Adds every non-tautological resolvent of `var`'s positive and negative occurrences, removes
    /// both occurrence sets, and freezes `var` so it is never retried.
    fn elim(&mut self, var: Var, resolver: &mut Resolver) {
        let pos_occ = self.occs[var.positive().code()].clone();
        let neg_occ = self.occs[var.negative().code()].clone();

        for &pid in &pos_occ {
            let Some(pivot_lits) = self.clauses[pid as usize].as_ref().map(|c| c.lits.clone()) else {
                continue;
            };
            resolver.set_pivot(&pivot_lits, var);
            for &nid in &neg_occ {
                let Some(other_lits) = self.clauses[nid as usize].as_ref().map(|c| c.lits.clone()) else {
                    continue;
                };
                if let Some(resolvent) = resolver.resolve(&other_lits) {
                    self.add_clause(resolvent);
                    self.stats.resolvents_added += 1;
                }
            }
        }
        for &pid in &pos_occ {
            if self.clauses[pid as usize].is_some() {
                self.remove_clause(pid);
            }
        }
        for &nid in &neg_occ {
            if self.clauses[nid as usize].is_some() {
                self.remove_clause(nid);
            }
        }
        self.frozen[var.index()] = true;
        self.eliminated.insert(var);
        self.stats.eliminated += 1;
    }

    /// Self-subsuming resolution: drains the work queue of recently added/touched clauses, each
    /// time first removing clauses it strictly subsumes, then trying to shrink other clauses by
    /// resolving this one against them on each of its literals in turn.
    fn ssr(&mut self, resolver: &mut Resolver) {
        while let Some(id) = self.todo.pop_front() {
            let Some(rec) = self.clauses[id as usize].as_ref() else {
                continue;
            };
            let lits = rec.lits.clone();
            let sig = rec.sig;

            self.rm_subsumed(id, &lits, sig);
            if self.clauses[id as usize].is_none() {
                continue;
            }
            for &m in &lits {
                self.add_ssrs(&lits, sig, m, resolver);
            }
        }
    }

    /// Removes every other clause that `lits` (the clause at `id`) is a subset of.
    fn rm_subsumed(&mut self, id: u32, lits: &[Lit], sig: u64) {
        let Some(&min_lit) = lits.iter().min_by_key(|&&l| self.occs[l.code()].len()) else {
            return;
        };
        let candidates = self.occs[min_lit.code()].clone();
        let mut to_remove = Vec::new();
        for oid in candidates {
            if oid == id {
                continue;
            }
            let Some(oc) = &self.clauses[oid as usize] else { continue };
            if oc.sig & sig != sig || oc.lits.len() < lits.len() {
                continue;
            }
            if contains_sorted(&oc.lits, lits) {
                to_remove.push(oid);
            }
        }
        for oid in to_remove {
            self.remove_clause(oid);
            self.stats.ssr_removed += 1;
        }
    }

    /// For literal `m` of `lits`, resolves against every clause containing `¬m` that is a
    /// superset of `lits` except at `m`; such a resolvent strictly subsumes its source, which is
    /// then removed.
    fn add_ssrs(&mut self, lits: &[Lit], sig: u64, m: Lit, resolver: &mut Resolver) {
        resolver.set_pivot(lits, m.var());
        let candidates = self.occs[(!m).code()].clone();
        let mut to_remove = Vec::new();
        let mut resolvents = Vec::new();

        for oid in candidates {
            let Some(oc) = &self.clauses[oid as usize] else { continue };
            if oc.sig & sig != sig || oc.lits.len() < lits.len() {
                continue;
            }
            if !contains_sorted_except(lits, &oc.lits, m) {
                continue;
            }
            let Some(resolvent) = resolver.resolve(&oc.lits) else {
                continue;
            };
            to_remove.push(oid);
            resolvents.push(resolvent);
        }
        for oid in to_remove {
            self.remove_clause(oid);
            self.stats.ssr_removed += 1;
        }
        for resolvent in resolvents {
            self.add_clause(resolvent);
        }
    }

    fn dump(&mut self, sat: &mut dyn SatSolver) {
        for rec in self.clauses.iter().flatten() {
            for &lit in &rec.lits {
                sat.add(Some(lit));
            }
            sat.add(None);
            self.stats.clauses_out += 1;
        }
        log::debug!(
            "preprocess: {} -> {} clauses ({} eliminated, {} resolvents, {} ssr removals)",
            self.stats.clauses_in,
            self.stats.clauses_out,
            self.stats.eliminated,
            self.stats.resolvents_added,
            self.stats.ssr_removed,
        );
    }
}

/// A read-only model view that reconstructs the value of a preprocessor-eliminated AND-gate
/// variable by evaluating its definition, rather than reading a value the live solver no longer
/// assigns it. Every other variable reads straight through.
///
/// Only [`SatSolver::value`] is meaningful here; every mutating method panics; nothing in this
/// engine is meant to call them through a model view.
pub struct EliminatedModel<'a> {
    sat: &'a dyn SatSolver,
    aig: &'a Aig,
    eliminated: &'a FxHashSet<Var>,
}

impl<'a> EliminatedModel<'a> {
    fn eval(&self, var: Var) -> bool {
        if self.eliminated.contains(&var) {
            let (a, b) = self.aig.and_inputs(var);
            self.value(a) && self.value(b)
        } else {
            self.sat.value(var.positive())
        }
    }
}

impl<'a> SatSolver for EliminatedModel<'a> {
    fn add(&mut self, _lit: Option<Lit>) {
        unreachable!("EliminatedModel is a read-only model view")
    }
    fn activate(&mut self) -> Lit {
        unreachable!("EliminatedModel is a read-only model view")
    }
    fn deactivate(&mut self, _lit: Lit) {
        unreachable!("EliminatedModel is a read-only model view")
    }
    fn assume(&mut self, _lit: Lit) {
        unreachable!("EliminatedModel is a read-only model view")
    }
    fn test(&mut self) {
        unreachable!("EliminatedModel is a read-only model view")
    }
    fn untest(&mut self) {
        unreachable!("EliminatedModel is a read-only model view")
    }
    fn solve(&mut self, _deadline: Deadline) -> SolveResult {
        unreachable!("EliminatedModel is a read-only model view")
    }
    fn why(&mut self, _out: &mut Vec<Lit>) {
        unreachable!("EliminatedModel is a read-only model view")
    }
    fn value(&self, lit: Lit) -> bool {
        self.eval(lit.var()) ^ lit.is_negative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic3_formula::AigBuilder;
    use ic3_sat::RefSolver;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn eliminates_intermediate_gate_and_preserves_functional_equivalence() {
        // bad = (m0 & m1) & m2, with the inner gate used nowhere else: eliminating it should
        // flatten bad's definition down to a direct 3-way AND over the latches.
        let mut b = AigBuilder::new();
        let m0 = b.latch(Some(false));
        let m1 = b.latch(Some(false));
        let m2 = b.latch(Some(false));
        b.set_next(m0, m0);
        b.set_next(m1, m1);
        b.set_next(m2, m2);
        let g = b.and(m0, m1);
        let bad = b.and(g, m2);
        let aig = b.build(bad).unwrap();

        let mut sat = RefSolver::new();
        let mut pp = Preprocessor::new();
        let mut rng = StdRng::seed_from_u64(1);
        let stats = pp.run(&mut sat, &aig, &mut rng, Deadline::none());

        assert!(pp.eliminated().contains(&g.var()));
        assert!(stats.eliminated >= 1);

        sat.add(Some(m0));
        sat.add(None);
        sat.add(Some(m1));
        sat.add(None);
        sat.add(Some(!m2));
        sat.add(None);
        assert_eq!(sat.solve(Deadline::none()), SolveResult::Sat);
        assert!(!sat.value(bad), "bad must be false whenever any conjunct is false");
    }

    #[test]
    fn frozen_variables_are_never_eliminated() {
        let mut b = AigBuilder::new();
        let m0 = b.latch(Some(false));
        let x = b.input();
        b.set_next(m0, x);
        let bad = b.and(m0, x);
        let aig = b.build(bad).unwrap();

        let mut sat = RefSolver::new();
        let mut pp = Preprocessor::new();
        let mut rng = StdRng::seed_from_u64(2);
        pp.run(&mut sat, &aig, &mut rng, Deadline::none());

        assert!(!pp.eliminated().contains(&m0.var()));
        assert!(!pp.eliminated().contains(&x.var()));
        assert!(!pp.eliminated().contains(&bad.var()));
    }

    #[test]
    fn model_view_reconstructs_eliminated_gate_value() {
        let mut b = AigBuilder::new();
        let m0 = b.latch(Some(false));
        let m1 = b.latch(Some(false));
        let m2 = b.latch(Some(false));
        b.set_next(m0, m0);
        b.set_next(m1, m1);
        b.set_next(m2, m2);
        let g = b.and(m0, m1);
        let bad = b.and(g, m2);
        let aig = b.build(bad).unwrap();

        let mut sat = RefSolver::new();
        let mut pp = Preprocessor::new();
        let mut rng = StdRng::seed_from_u64(3);
        pp.run(&mut sat, &aig, &mut rng, Deadline::none());
        assert!(pp.eliminated().contains(&g.var()));

        sat.add(Some(m0));
        sat.add(None);
        sat.add(Some(!m1));
        sat.add(None);
        sat.add(Some(m2));
        sat.add(None);
        assert_eq!(sat.solve(Deadline::none()), SolveResult::Sat);

        let view = pp.model_view(&sat, &aig);
        assert!(!view.value(g), "m0 & m1 is false since m1 is false");
    }
}
