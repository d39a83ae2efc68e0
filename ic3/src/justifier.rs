//! Circuit-structural minimization of a SAT model down to latch literals (§4.6).
use rand::Rng;

use ic3_formula::{Aig, Lit, NodeKind, Var};
use ic3_sat::SatSolver;

use crate::primer::Primer;

/// Projects a SAT model down to a near-minimal set of latch literals that structurally justify a
/// target literal under the AIG.
///
/// The walk is purely structural (it never calls the SAT solver except to read the model it was
/// handed): at a latch it records the signed literal and stops; at an input or the constant it
/// stops without recording anything; at an AND gate whose justified polarity is positive it
/// recurses into both inputs (both must hold); at an AND gate whose justified polarity is negative
/// it is really an OR, and exactly one input that is false under the model is enough to justify
/// it — the one with fewer transitive latch dependencies is preferred, since following it tends to
/// produce a smaller cube.
pub struct Justifier {
    /// `latch_influence[v.index()]` is the number of latches reachable from `v` through AND-gate
    /// inputs, computed once at construction (AND-gate inputs always reference lower-indexed
    /// variables, so a single forward pass over all variables suffices).
    latch_influence: Vec<u32>,
    marks: Vec<bool>,
}

impl Justifier {
    pub fn new(aig: &Aig) -> Self {
        let mut latch_influence = vec![0u32; aig.var_count()];
        for index in 0..aig.var_count() {
            let var = Var::from_index(index);
            latch_influence[index] = match aig.kind(var) {
                NodeKind::Const | NodeKind::Input => 0,
                NodeKind::Latch => 1,
                NodeKind::And => {
                    let (a, b) = aig.and_inputs(var);
                    latch_influence[a.var().index()] + latch_influence[b.var().index()]
                }
            };
        }
        Justifier {
            latch_influence,
            marks: vec![false; aig.var_count()],
        }
    }

    /// Justifies `target` under the model currently held by `sat`, appending one signed literal
    /// per latch that participates in the justification to the returned cube.
    ///
    /// `rng` breaks ties between two AND-gate inputs with equal transitive latch dependency
    /// counts; it is never consulted when the original has fewer dependencies on one side.
    pub fn justify(&mut self, sat: &dyn SatSolver, aig: &Aig, target: Lit, rng: &mut impl Rng) -> Vec<Lit> {
        self.marks.iter_mut().for_each(|m| *m = false);
        let mut out = Vec::new();
        self.walk(sat, aig, target, &mut out, rng);
        out
    }

    /// Justifies `target`'s *primed* (next-state) value under the model currently held by `sat`,
    /// producing a cube over the *current*-state latches that force it.
    ///
    /// Mirrors `target`'s own AIG structure (not a separately-encoded primed circuit): at an AND
    /// gate it reads the primed value of each input via `primer` and recurses the same way
    /// [`Justifier::justify`] would over the unprimed structure; at a latch, priming is exactly one
    /// hop to its next-function (see [`Primer`]), so justifying it further is just justifying that
    /// next-function's own (unprimed, current-state) truth value with the ordinary structural walk.
    /// Inputs and the constant prime to themselves and contribute nothing either way.
    pub fn justify_next(
        &mut self,
        sat: &mut dyn SatSolver,
        aig: &Aig,
        primer: &mut Primer,
        target: Lit,
        rng: &mut impl Rng,
    ) -> Vec<Lit> {
        self.marks.iter_mut().for_each(|m| *m = false);
        let mut out = Vec::new();
        self.walk_next(sat, aig, primer, target, &mut out, rng);
        out
    }

    fn walk_next(
        &mut self,
        sat: &mut dyn SatSolver,
        aig: &Aig,
        primer: &mut Primer,
        lit: Lit,
        out: &mut Vec<Lit>,
        rng: &mut impl Rng,
    ) {
        let var = lit.var();
        if self.marks[var.index()] {
            return;
        }
        self.marks[var.index()] = true;

        match aig.kind(var) {
            NodeKind::Const | NodeKind::Input => {}
            NodeKind::Latch => {
                let next = aig.latch(var).next ^ lit.is_negative();
                self.walk(&*sat, aig, next, out, rng);
            }
            NodeKind::And => {
                let (a, b) = aig.and_inputs(var);
                if lit.is_positive() {
                    self.walk_next(sat, aig, primer, a, out, rng);
                    self.walk_next(sat, aig, primer, b, out, rng);
                } else {
                    let pa = primer.prime(sat, aig, a);
                    let pb = primer.prime(sat, aig, b);
                    let a_false = !sat.value(pa);
                    let b_false = !sat.value(pb);
                    let follow_a = match (a_false, b_false) {
                        (true, false) => true,
                        (false, true) => false,
                        (true, true) => {
                            let ia = self.latch_influence[a.var().index()];
                            let ib = self.latch_influence[b.var().index()];
                            if ia != ib {
                                ia < ib
                            } else {
                                rng.gen_bool(0.5)
                            }
                        }
                        (false, false) => {
                            unreachable!("primed and-gate {:?} is false under the model but neither primed input is", var)
                        }
                    };
                    if follow_a {
                        self.walk_next(sat, aig, primer, !a, out, rng);
                    } else {
                        self.walk_next(sat, aig, primer, !b, out, rng);
                    }
                }
            }
        }
    }

    fn walk(&mut self, sat: &dyn SatSolver, aig: &Aig, lit: Lit, out: &mut Vec<Lit>, rng: &mut impl Rng) {
        let var = lit.var();
        if self.marks[var.index()] {
            return;
        }
        self.marks[var.index()] = true;

        match aig.kind(var) {
            NodeKind::Const | NodeKind::Input => {}
            NodeKind::Latch => out.push(var.lit(sat.value(var.positive()))),
            NodeKind::And => {
                let (a, b) = aig.and_inputs(var);
                if lit.is_positive() {
                    self.walk(sat, aig, a, out, rng);
                    self.walk(sat, aig, b, out, rng);
                } else {
                    let a_false = !sat.value(a);
                    let b_false = !sat.value(b);
                    let follow_a = match (a_false, b_false) {
                        (true, false) => true,
                        (false, true) => false,
                        (true, true) => {
                            let ia = self.latch_influence[a.var().index()];
                            let ib = self.latch_influence[b.var().index()];
                            if ia != ib {
                                ia < ib
                            } else {
                                rng.gen_bool(0.5)
                            }
                        }
                        (false, false) => {
                            unreachable!("and-gate {:?} is false under the model but neither input is", var)
                        }
                    };
                    if follow_a {
                        self.walk(sat, aig, !a, out, rng);
                    } else {
                        self.walk(sat, aig, !b, out, rng);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic3_formula::AigBuilder;
    use ic3_sat::RefSolver;
    use rand::{rngs::StdRng, SeedableRng};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    #[test]
    fn and_gate_true_justifies_both_latches() {
        let mut b = AigBuilder::new();
        let m0 = b.latch(Some(false));
        let m1 = b.latch(Some(false));
        let g = b.and(m0, m1);
        b.set_next(m0, m0);
        b.set_next(m1, m1);
        let aig = b.build(g).unwrap();

        let mut sat = RefSolver::new();
        sat.add(Some(m0));
        sat.add(None);
        sat.add(Some(m1));
        sat.add(None);
        assert_eq!(sat.solve(ic3_sat::Deadline::none()), ic3_sat::SolveResult::Sat);

        let mut j = Justifier::new(&aig);
        let mut cube = j.justify(&sat, &aig, g, &mut rng());
        cube.sort();
        let mut expected = vec![m0, m1];
        expected.sort();
        assert_eq!(cube, expected);
    }

    #[test]
    fn or_in_disguise_picks_one_false_input() {
        // !g with g = m0 & m1 is satisfied by making just one of them false.
        let mut b = AigBuilder::new();
        let m0 = b.latch(Some(false));
        let m1 = b.latch(Some(false));
        let g = b.and(m0, m1);
        b.set_next(m0, m0);
        b.set_next(m1, m1);
        let aig = b.build(g).unwrap();

        let mut sat = RefSolver::new();
        sat.add(Some(m0));
        sat.add(None);
        sat.add(Some(!m1));
        sat.add(None);
        assert_eq!(sat.solve(ic3_sat::Deadline::none()), ic3_sat::SolveResult::Sat);

        let mut j = Justifier::new(&aig);
        let cube = j.justify(&sat, &aig, !g, &mut rng());
        assert_eq!(cube, vec![!m1]);
    }

    #[test]
    fn inputs_are_not_recorded() {
        let mut b = AigBuilder::new();
        let x = b.input();
        let m = b.latch(Some(false));
        let g = b.and(x, m);
        b.set_next(m, m);
        let aig = b.build(g).unwrap();

        let mut sat = RefSolver::new();
        sat.add(Some(x));
        sat.add(None);
        sat.add(Some(m));
        sat.add(None);
        assert_eq!(sat.solve(ic3_sat::Deadline::none()), ic3_sat::SolveResult::Sat);

        let mut j = Justifier::new(&aig);
        let cube = j.justify(&sat, &aig, g, &mut rng());
        assert_eq!(cube, vec![m]);
    }

    #[test]
    fn justify_next_finds_a_predecessor_cube_for_a_primed_target() {
        // next(m0) = x, next(m1) = m0: justifying prime(m1) (true) should land on m0 (one hop,
        // since priming a latch is its next-function verbatim), and justifying prime(m0) (true)
        // should land on x.
        let mut b = AigBuilder::new();
        let x = b.input();
        let m0 = b.latch(Some(false));
        let m1 = b.latch(Some(false));
        b.set_next(m0, x);
        b.set_next(m1, m0);
        let aig = b.build(m1).unwrap();

        let mut sat = RefSolver::new();
        let mut primer = Primer::new();
        let primed_m1 = primer.prime(&mut sat, &aig, m1);
        sat.add(Some(x));
        sat.add(None);
        sat.add(Some(primed_m1));
        sat.add(None);
        assert_eq!(sat.solve(ic3_sat::Deadline::none()), ic3_sat::SolveResult::Sat);

        let mut j = Justifier::new(&aig);
        let cube = j.justify_next(&mut sat, &aig, &mut primer, m1, &mut rng());
        assert_eq!(cube, vec![m0]);
    }
}
