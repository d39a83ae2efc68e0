//! A minimal incremental SAT solver satisfying the [`SatSolver`] contract.
//!
//! This is not a competitive CDCL implementation — it is a small backtracking search with
//! full-clause-scan unit propagation (no two-watched-literal scheme, no clause learning, no
//! restarts), sized for the small circuits the engine's own test suite constructs. It exists
//! purely so the engine can be tested against something implementing the contract in-tree.
use std::collections::HashSet;

use ic3_formula::{Lit, Var};

use crate::contract::{Deadline, SatSolver, SolveResult};

#[derive(Clone, Debug)]
struct Clause {
    lits: Vec<Lit>,
}

/// A reference [`SatSolver`] implementation.
pub struct RefSolver {
    clauses: Vec<Clause>,
    building: Vec<Lit>,
    batch_start: usize,
    assignment: Vec<Option<bool>>,
    trail: Vec<Var>,
    scope_lim: Vec<usize>,
    /// Assumptions made since the start of the current solve call's enclosing scopes, tracked so
    /// `why` can report a safe (if not minimal) unsat core.
    assumed_lits: Vec<Lit>,
    last_model: Vec<Option<bool>>,
    conflict: bool,
}

impl Default for RefSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl RefSolver {
    pub fn new() -> Self {
        RefSolver {
            clauses: Vec::new(),
            building: Vec::new(),
            batch_start: 0,
            assignment: vec![None], // index 0 reserved, mirrors Aig's constant var
            trail: Vec::new(),
            scope_lim: Vec::new(),
            assumed_lits: Vec::new(),
            last_model: Vec::new(),
            conflict: false,
        }
    }

    fn ensure_var(&mut self, var: Var) {
        if var.index() >= self.assignment.len() {
            self.assignment.resize(var.index() + 1, None);
        }
    }

    fn value_of(&self, lit: Lit) -> Option<bool> {
        self.assignment[lit.var().index()].map(|v| v ^ lit.is_negative())
    }

    fn push_assign(&mut self, var: Var, value: bool) {
        self.assignment[var.index()] = Some(value);
        self.trail.push(var);
    }

    fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let var = self.trail.pop().unwrap();
            self.assignment[var.index()] = None;
        }
    }

    /// Assign `lit` true, permanently (outside the trail, never undone by `untest`/backtracking).
    fn force(&mut self, lit: Lit) {
        self.ensure_var(lit.var());
        let value = lit.is_positive();
        match self.assignment[lit.var().index()] {
            Some(existing) => {
                if existing != value {
                    self.conflict = true;
                }
            }
            None => self.assignment[lit.var().index()] = Some(value),
        }
    }

    fn assign_and_propagate(&mut self, lit: Lit) -> bool {
        self.ensure_var(lit.var());
        match self.value_of(lit) {
            Some(true) => return true,
            Some(false) => return false,
            None => {}
        }
        self.push_assign(lit.var(), lit.is_positive());
        self.propagate()
    }

    fn propagate(&mut self) -> bool {
        loop {
            let mut changed = false;
            for ci in 0..self.clauses.len() {
                let mut satisfied = false;
                let mut unassigned: Option<Lit> = None;
                let mut unassigned_count = 0;
                for &lit in &self.clauses[ci].lits {
                    match self.value_of(lit) {
                        Some(true) => {
                            satisfied = true;
                            break;
                        }
                        Some(false) => {}
                        None => {
                            unassigned_count += 1;
                            unassigned = Some(lit);
                        }
                    }
                }
                if satisfied {
                    continue;
                }
                if unassigned_count == 0 {
                    return false; // conflict
                }
                if unassigned_count == 1 {
                    let lit = unassigned.unwrap();
                    self.push_assign(lit.var(), lit.is_positive());
                    changed = true;
                }
            }
            if !changed {
                return true;
            }
        }
    }

    fn pick_unassigned(&self) -> Option<Var> {
        self.assignment
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, v)| v.is_none())
            .map(|(i, _)| Var::from_index(i))
    }

    fn search(&mut self, deadline: &Deadline) -> SolveResult {
        if deadline.expired() {
            return SolveResult::Timeout;
        }
        if !self.propagate() {
            return SolveResult::Unsat;
        }
        let var = match self.pick_unassigned() {
            None => return SolveResult::Sat,
            Some(v) => v,
        };
        for &polarity in &[true, false] {
            let mark = self.trail.len();
            if self.assign_and_propagate(var.lit(polarity)) {
                match self.search(deadline) {
                    SolveResult::Sat => return SolveResult::Sat,
                    SolveResult::Timeout => return SolveResult::Timeout,
                    SolveResult::Unsat => {}
                }
            }
            self.undo_to(mark);
        }
        SolveResult::Unsat
    }
}

impl SatSolver for RefSolver {
    fn add(&mut self, lit: Option<Lit>) {
        match lit {
            Some(l) => {
                self.ensure_var(l.var());
                self.building.push(l);
            }
            None => {
                let lits = std::mem::take(&mut self.building);
                self.clauses.push(Clause { lits });
            }
        }
    }

    fn activate(&mut self) -> Lit {
        let new_index = self.assignment.len();
        self.assignment.push(None);
        let act = Var::from_index(new_index).positive();
        for clause in &mut self.clauses[self.batch_start..] {
            clause.lits.push(!act);
        }
        self.batch_start = self.clauses.len();
        act
    }

    fn deactivate(&mut self, lit: Lit) {
        self.force(!lit);
    }

    fn assume(&mut self, lit: Lit) {
        self.assumed_lits.push(lit);
        if !self.assign_and_propagate(lit) {
            self.conflict = true;
        }
    }

    fn test(&mut self) {
        self.scope_lim.push(self.trail.len());
    }

    fn untest(&mut self) {
        let mark = self
            .scope_lim
            .pop()
            .expect("untest called with no matching open test scope");
        self.undo_to(mark);
        self.conflict = false;
    }

    fn solve(&mut self, deadline: Deadline) -> SolveResult {
        if self.conflict {
            return SolveResult::Unsat;
        }
        let mark = self.trail.len();
        let result = self.search(&deadline);
        if result == SolveResult::Sat {
            self.last_model = self.assignment.clone();
        }
        self.undo_to(mark);
        result
    }

    fn why(&mut self, out: &mut Vec<Lit>) {
        let mut seen = HashSet::new();
        for &lit in &self.assumed_lits {
            if seen.insert(lit.var()) {
                out.push(lit);
            }
        }
    }

    fn value(&self, lit: Lit) -> bool {
        let idx = lit.var().index();
        let base = self
            .last_model
            .get(idx)
            .copied()
            .flatten()
            .or(self.assignment[idx]);
        base.map(|v| v ^ lit.is_negative()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic3_formula::lit;

    fn add_clause(s: &mut RefSolver, lits: &[Lit]) {
        for &l in lits {
            s.add(Some(l));
        }
        s.add(None);
    }

    #[test]
    fn trivial_sat() {
        let mut s = RefSolver::new();
        add_clause(&mut s, &[lit!(1), lit!(2)]);
        assert_eq!(s.solve(Deadline::none()), SolveResult::Sat);
    }

    #[test]
    fn trivial_unsat() {
        let mut s = RefSolver::new();
        add_clause(&mut s, &[lit!(1)]);
        add_clause(&mut s, &[lit!(-1)]);
        assert_eq!(s.solve(Deadline::none()), SolveResult::Unsat);
    }

    #[test]
    fn activation_literal_soft_deletes_clauses() {
        let mut s = RefSolver::new();
        add_clause(&mut s, &[lit!(1)]);
        let act = s.activate();
        add_clause(&mut s, &[lit!(-1)]);
        // without assuming `act`, the second clause is inert.
        assert_eq!(s.solve(Deadline::none()), SolveResult::Sat);

        s.test();
        s.assume(act);
        assert_eq!(s.solve(Deadline::none()), SolveResult::Unsat);
        s.untest();

        // deactivating makes the clause permanently absent even if somehow assumed again.
        s.deactivate(act);
        assert_eq!(s.solve(Deadline::none()), SolveResult::Sat);
    }

    #[test]
    fn scoped_assumptions_are_undone() {
        let mut s = RefSolver::new();
        add_clause(&mut s, &[lit!(1), lit!(2)]);
        s.test();
        s.assume(lit!(-1));
        s.assume(lit!(-2));
        assert_eq!(s.solve(Deadline::none()), SolveResult::Unsat);
        s.untest();
        assert_eq!(s.solve(Deadline::none()), SolveResult::Sat);
    }

    #[test]
    #[should_panic]
    fn unmatched_untest_panics() {
        let mut s = RefSolver::new();
        s.untest();
    }
}
