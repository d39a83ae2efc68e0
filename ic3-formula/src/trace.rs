//! An in-memory witness trace and its re-simulation against an [`Aig`].
use crate::aig::{Aig, NodeKind};
use crate::lit::Var;

/// A concrete, step-by-step witness for a reachability result.
///
/// Each step records the value of every declared variable (including gates, for convenience when
/// verifying): `values[step][var.index()]`. Encoding this to the packed binary trace file format
/// is out of scope for this crate; only the in-memory structure and its self-check are provided.
#[derive(Clone, Debug)]
pub struct Trace {
    var_count: usize,
    values: Vec<Vec<bool>>,
}

impl Trace {
    /// Creates an empty trace over a circuit with `var_count` declared variables.
    pub fn new(var_count: usize) -> Trace {
        Trace {
            var_count,
            values: Vec::new(),
        }
    }

    /// Appends one step's full variable assignment (positive-literal values, indexed by
    /// `Var::index`).
    pub fn append(&mut self, step: Vec<bool>) {
        assert_eq!(step.len(), self.var_count);
        self.values.push(step);
    }

    /// Number of steps recorded.
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    /// The recorded value of `var` at `step`.
    pub fn value(&self, step: usize, var: Var) -> bool {
        self.values[step][var.index()]
    }

    /// Re-simulates the trace against `aig` and confirms:
    ///
    /// - every latch's value at step `i+1` equals its next-function evaluated at step `i`,
    /// - latch values at step `0` honor each latch's initial value (when constrained),
    /// - `bad` holds at the final step.
    ///
    /// This is the mechanism behind trace soundness (every reported counterexample is checked
    /// before being trusted).
    pub fn verify(&self, aig: &Aig) -> bool {
        if self.values.is_empty() {
            return false;
        }
        for (step, values) in self.values.iter().enumerate() {
            for var_index in 0..self.var_count {
                let var = Var::from_index(var_index);
                let expected = match aig.kind(var) {
                    NodeKind::Const => false,
                    NodeKind::Input => continue,
                    NodeKind::Latch if step == 0 => {
                        let info = aig.latch(var);
                        match info.init {
                            Some(init) => init,
                            None => continue,
                        }
                    }
                    NodeKind::Latch => {
                        let info = aig.latch(var);
                        let prev = &self.values[step - 1];
                        aig_eval(prev, info.next)
                    }
                    NodeKind::And => {
                        let (a, b) = aig.and_inputs(var);
                        aig_eval(values, a) && aig_eval(values, b)
                    }
                };
                if values[var_index] != expected {
                    return false;
                }
            }
        }
        let last = &self.values[self.values.len() - 1];
        aig_eval(last, aig.bad())
    }
}

fn aig_eval(values: &[bool], lit: crate::lit::Lit) -> bool {
    values[lit.var().index()] ^ lit.is_negative()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aig::AigBuilder;

    #[test]
    fn verifies_trivial_reachable_trace() {
        // init(m) = false, next(m) = ¬m (toggling), bad = m. Reachable in one step.
        let mut b = AigBuilder::new();
        let m = b.latch(Some(false));
        let not_m = !m;
        b.set_next(m, not_m);
        let aig = b.build(m).unwrap();

        let mut trace = Trace::new(aig.var_count());
        trace.append(vec![false, false]); // var 0 = const, var 1(m) = false
        trace.append(vec![false, true]);
        assert!(trace.verify(&aig));
    }

    #[test]
    fn rejects_trace_violating_consecution() {
        let mut b = AigBuilder::new();
        let m = b.latch(Some(false));
        b.set_next(m, m);
        let aig = b.build(m).unwrap();

        let mut trace = Trace::new(aig.var_count());
        trace.append(vec![false, false]);
        trace.append(vec![false, true]); // next(m) = m should keep it false
        assert!(!trace.verify(&aig));
    }
}
