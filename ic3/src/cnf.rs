//! Clauses tagged by frame level, activation-literal backed, with subsumption (§4.3).
use rustc_hash::FxHashMap;

use ic3_formula::{Lit, Var};
use ic3_sat::SatSolver;

use crate::arena::{LitArena, Span};

/// A stable integer identifier for a clause stored in a [`Cnf`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClauseId(u32);

struct ClauseMeta {
    span: Span,
    level: u32,
    sig: u64,
    act: Lit,
    removed: bool,
}

fn signature(lits: &[Lit]) -> u64 {
    lits.iter().fold(0u64, |sig, lit| sig | (1u64 << (lit.var().index() % 64)))
}

/// `a` (sorted) contains every literal of `b` (sorted).
pub(crate) fn contains_sorted(a: &[Lit], b: &[Lit]) -> bool {
    let mut ai = a.iter();
    'outer: for &lb in b {
        for la in &mut ai {
            if *la == lb {
                continue 'outer;
            }
            if *la > lb {
                return false;
            }
        }
        return false;
    }
    true
}

/// The frame database: clauses tagged by the greatest frame level they are known to hold at.
///
/// Owns its own literal arena, matching the original system's separation of the clause database's
/// span storage from the proof-obligation set's (they track different things and there is no
/// reason for them to share one).
#[derive(Default)]
pub struct Cnf {
    arena: LitArena,
    clauses: Vec<ClauseMeta>,
    free_ids: Vec<u32>,
    levels: Vec<Vec<u32>>,
    removed_total: u64,
    added_total: u64,
}

impl Cnf {
    pub fn new() -> Self {
        Cnf {
            arena: LitArena::new(),
            clauses: Vec::new(),
            free_ids: Vec::new(),
            // level 0 always exists ("F0 represents initial states only").
            levels: vec![Vec::new()],
            removed_total: 0,
            added_total: 0,
        }
    }

    /// Appends a new, empty top level and returns its index.
    pub fn push_k(&mut self) -> u32 {
        self.levels.push(Vec::new());
        (self.levels.len() - 1) as u32
    }

    /// The greatest frame level currently allocated.
    pub fn max_level(&self) -> u32 {
        (self.levels.len() - 1) as u32
    }

    /// Live clause count at exactly `level`.
    pub fn len_k(&self, level: u32) -> usize {
        self.levels[level as usize]
            .iter()
            .filter(|&&id| !self.clauses[id as usize].removed)
            .count()
    }

    /// Live clause count across every level.
    pub fn num_clauses(&self) -> usize {
        self.clauses.iter().filter(|c| !c.removed).count()
    }

    pub fn level(&self, id: ClauseId) -> u32 {
        self.clauses[id.0 as usize].level
    }

    pub fn act_lit(&self, id: ClauseId) -> Lit {
        self.clauses[id.0 as usize].act
    }

    pub fn literals(&self, id: ClauseId) -> &[Lit] {
        self.arena.get(self.clauses[id.0 as usize].span)
    }

    fn alloc_id(&mut self, meta: ClauseMeta) -> ClauseId {
        if let Some(id) = self.free_ids.pop() {
            self.clauses[id as usize] = meta;
            ClauseId(id)
        } else {
            let id = self.clauses.len() as u32;
            self.clauses.push(meta);
            ClauseId(id)
        }
    }

    /// Sorts and deduplicates `literals`, registers the clause with `sat` (under a freshly
    /// allocated activation literal), and adds it at `level`.
    ///
    /// Debug builds assert the clause is not a syntactic tautology.
    pub fn add(&mut self, sat: &mut dyn SatSolver, mut literals: Vec<Lit>, level: u32) -> ClauseId {
        literals.sort_unstable();
        literals.dedup();
        debug_assert!(
            !literals.windows(2).any(|w| w[0].var() == w[1].var()),
            "tautological clause passed to Cnf::add"
        );
        while level as usize >= self.levels.len() {
            self.push_k();
        }

        for &lit in &literals {
            sat.add(Some(lit));
        }
        sat.add(None);
        let act = sat.activate();

        let span = self.arena.put(&literals);
        let sig = signature(&literals);
        let id = self.alloc_id(ClauseMeta {
            span,
            level,
            sig,
            act,
            removed: false,
        });
        self.levels[level as usize].push(id.0);
        self.added_total += 1;
        id
    }

    /// Same as [`Cnf::add`] but via a streaming `Adder` (used by the preprocessor, which builds
    /// resolvents literal by literal).
    pub fn adder(&mut self) -> Adder {
        Adder { literals: Vec::new() }
    }

    pub fn commit(&mut self, sat: &mut dyn SatSolver, adder: Adder, level: u32) -> ClauseId {
        self.add(sat, adder.literals, level)
    }

    /// Promotes `id` to the next frame level, allocating a new top level if needed.
    ///
    /// Returns the clause's new level.
    pub fn push(&mut self, id: ClauseId) -> u32 {
        let old_level = self.clauses[id.0 as usize].level;
        let new_level = old_level + 1;
        if new_level as usize >= self.levels.len() {
            self.push_k();
        }
        self.levels[old_level as usize].retain(|&x| x != id.0);
        self.levels[new_level as usize].push(id.0);
        self.clauses[id.0 as usize].level = new_level;
        new_level
    }

    /// Instructs `sat` to assume the activation literal of every live clause at frames `>= k`.
    pub fn assume_level(&self, sat: &mut dyn SatSolver, k: u32) {
        for level in k as usize..self.levels.len() {
            for &id in &self.levels[level] {
                let meta = &self.clauses[id as usize];
                if !meta.removed {
                    sat.assume(meta.act);
                }
            }
        }
    }

    fn remove_clause(&mut self, sat: &mut dyn SatSolver, id: ClauseId) {
        let meta = &mut self.clauses[id.0 as usize];
        debug_assert!(!meta.removed);
        meta.removed = true;
        let act = meta.act;
        let span = meta.span;
        sat.deactivate(act);
        self.arena.remove(span);
        self.levels[meta.level as usize].retain(|&x| x != id.0);
        self.free_ids.push(id.0);
        self.removed_total += 1;
    }

    /// Removes every clause at `level` that is a superset (or duplicate) of another clause at the
    /// same level, using a per-variable occurrence list keyed on the candidate's
    /// minimum-occurrence variable (P2: this never increases `len_k(level)` and only removes
    /// clauses that are actually subsumed).
    ///
    /// `on_remove` is called once for every clause removed this way, before its slot is reused.
    pub fn simplify(&mut self, sat: &mut dyn SatSolver, level: u32, mut on_remove: impl FnMut(ClauseId, &[Lit])) {
        let ids: Vec<u32> = self.levels[level as usize].clone();
        let mut occ: FxHashMap<Var, Vec<u32>> = FxHashMap::default();
        for &id in &ids {
            if self.clauses[id as usize].removed {
                continue;
            }
            for &lit in self.arena.get(self.clauses[id as usize].span) {
                occ.entry(lit.var()).or_default().push(id);
            }
        }

        for &id in &ids {
            if self.clauses[id as usize].removed {
                continue;
            }
            let sig = self.clauses[id as usize].sig;
            let lits = self.arena.get(self.clauses[id as usize].span).to_vec();
            if lits.is_empty() {
                continue;
            }
            let pivot_var = lits
                .iter()
                .map(|l| l.var())
                .min_by_key(|v| occ.get(v).map_or(0, Vec::len))
                .unwrap();
            let Some(candidates) = occ.get(&pivot_var).cloned() else {
                continue;
            };
            for other_id in candidates {
                if other_id == id || self.clauses[other_id as usize].removed {
                    continue;
                }
                let other_sig = self.clauses[other_id as usize].sig;
                if other_sig & sig != sig {
                    // `lits` can't be a subset of `other` if a variable in `lits` never occurs in
                    // `other` (the signature is a 64-bucket occurrence pre-filter).
                    continue;
                }
                let other_lits = self.arena.get(self.clauses[other_id as usize].span).to_vec();
                if contains_sorted(&other_lits, &lits) {
                    self.remove_clause(sat, ClauseId(other_id));
                    on_remove(ClauseId(other_id), &other_lits);
                }
            }
        }
    }

    /// Calls `f` for every surviving (non-removed) clause at `level`.
    pub fn for_all(&self, level: u32, mut f: impl FnMut(ClauseId, &[Lit])) {
        for &id in &self.levels[level as usize] {
            let meta = &self.clauses[id as usize];
            if !meta.removed {
                f(ClauseId(id), self.arena.get(meta.span));
            }
        }
    }

    pub fn stats(&self) -> CnfStats {
        CnfStats {
            live_clauses: self.num_clauses(),
            levels: self.levels.len(),
            added_total: self.added_total,
            removed_total: self.removed_total,
        }
    }
}

/// Streaming clause builder: append literals one at a time, then commit with [`Cnf::commit`].
#[derive(Default)]
pub struct Adder {
    literals: Vec<Lit>,
}

impl Adder {
    pub fn push(&mut self, lit: Lit) {
        self.literals.push(lit);
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct CnfStats {
    pub live_clauses: usize,
    pub levels: usize,
    pub added_total: u64,
    pub removed_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic3_formula::lits;
    use ic3_sat::RefSolver;

    #[test]
    fn add_sets_level() {
        let mut sat = RefSolver::new();
        let mut cnf = Cnf::new();
        cnf.push_k();
        let id = cnf.add(&mut sat, lits![1, 2].to_vec(), 1);
        assert_eq!(cnf.level(id), 1);
        assert_eq!(cnf.literals(id), &lits![1, 2]);
    }

    #[test]
    fn push_strictly_increases_level() {
        let mut sat = RefSolver::new();
        let mut cnf = Cnf::new();
        let id = cnf.add(&mut sat, lits![1].to_vec(), 0);
        let before = cnf.level(id);
        let after = cnf.push(id);
        assert!(after > before);
        assert_eq!(cnf.level(id), after);
    }

    #[test]
    fn simplify_removes_supersets_only() {
        let mut sat = RefSolver::new();
        let mut cnf = Cnf::new();
        let small = cnf.add(&mut sat, lits![1, 2].to_vec(), 0);
        let superset = cnf.add(&mut sat, lits![1, 2, 3].to_vec(), 0);
        let unrelated = cnf.add(&mut sat, lits![4, 5].to_vec(), 0);

        let mut removed = Vec::new();
        cnf.simplify(&mut sat, 0, |id, _| removed.push(id));

        assert_eq!(removed, vec![superset]);
        assert_eq!(cnf.len_k(0), 2);
        assert_eq!(cnf.literals(small), &lits![1, 2]);
        assert_eq!(cnf.literals(unrelated), &lits![4, 5]);
    }
}
