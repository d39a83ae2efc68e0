//! Priming: mapping a current-state literal to its next-state counterpart (§4.4).
use rustc_hash::FxHashMap;

use ic3_formula::{Aig, Lit, NodeKind, Var};
use ic3_sat::SatSolver;

/// Maps literals over current-state (latch/input) variables to literals representing their value
/// one step later, memoizing the Tseitin encoding of every AND gate reached along the way.
///
/// A latch primes to its declared next-function literal directly, used as-is: that literal is
/// already defined over the current state (its own AND-gate structure, if any, carries its
/// defining clauses elsewhere), so a latch primes in exactly one hop no matter how its
/// next-function is built, and a latch whose next-function is itself (or part of a cycle among
/// several latches, as in a shift register) primes without recursing into any other latch's
/// next-function at all. An input or constant primes to itself (inputs are shared between the
/// current and next step of a single transition assertion, not duplicated). An AND gate's primed
/// form — reached only when priming a non-latch literal such as `bad`, or an AND gate nested
/// inside one — is a fresh SAT variable Tseitin-encoded against the primed form of its two inputs
/// the first time it is reached, and reused from the cache afterwards, since two AND gates can
/// only refer to one another acyclically.
///
/// Fresh variables are minted via [`SatSolver::activate`], whose only externally visible contract
/// is "returns the literal of a variable not previously used" — this is exactly what a Tseitin
/// gate output needs, and the clauses defining it are added directly via `add`/`add(None)` without
/// ever calling `deactivate`, so they are permanent, matching a combinational gate definition that
/// must hold unconditionally rather than a retractable learned clause.
#[derive(Default)]
pub struct Primer {
    cache: FxHashMap<Var, Lit>,
}

impl Primer {
    pub fn new() -> Self {
        Primer::default()
    }

    /// Maps `lit` to its next-state literal, descending into the AIG as needed.
    ///
    /// Panics if `lit`'s variable was never declared in `aig` (an internal consistency error: every
    /// literal handed to the engine is expected to have been validated against the circuit it
    /// describes before reaching here).
    pub fn prime(&mut self, sat: &mut dyn SatSolver, aig: &Aig, lit: Lit) -> Lit {
        debug_assert!(!lit.is_none(), "prime() called on the none-literal");
        let primed_var_lit = self.prime_var(sat, aig, lit.var());
        primed_var_lit ^ lit.is_negative()
    }

    fn prime_var(&mut self, sat: &mut dyn SatSolver, aig: &Aig, var: Var) -> Lit {
        if let Some(&cached) = self.cache.get(&var) {
            return cached;
        }
        assert!(var.index() < aig.var_count(), "prime() of a variable unknown to the circuit");

        let primed = match aig.kind(var) {
            NodeKind::Const => Aig::false_lit(),
            NodeKind::Input => var.positive(),
            // One hop only: `next` is already a literal over the current state, so it is used
            // as-is rather than fed back through `prime`. Latches whose next-function refers to
            // another latch (directly, or transitively in a cycle) would otherwise recurse
            // forever — a latch held by a self-loop (`next(m) = m`) is the minimal such case.
            NodeKind::Latch => aig.latch(var).next,
            NodeKind::And => {
                let (a, b) = aig.and_inputs(var);
                let pa = self.prime(sat, aig, a);
                let pb = self.prime(sat, aig, b);
                self.encode_and(sat, pa, pb)
            }
        };
        self.cache.insert(var, primed);
        primed
    }

    fn encode_and(&mut self, sat: &mut dyn SatSolver, a: Lit, b: Lit) -> Lit {
        let g = sat.activate();
        sat.add(Some(!g));
        sat.add(Some(a));
        sat.add(None);
        sat.add(Some(!g));
        sat.add(Some(b));
        sat.add(None);
        sat.add(Some(g));
        sat.add(Some(!a));
        sat.add(Some(!b));
        sat.add(None);
        g
    }

    /// Reads back the primed literal of `lit` without mutating anything.
    ///
    /// Panics if `lit`'s variable has never been primed — callers that need this (the driver, when
    /// reading back a transition's next-state values for a trace step) are expected to have primed
    /// every variable they will later read this way up front, so a cache miss here is a driver bug,
    /// not a malformed circuit.
    pub fn primed(&self, lit: Lit) -> Lit {
        let cached = *self
            .cache
            .get(&lit.var())
            .expect("primed() of a variable that was never prime()'d");
        cached ^ lit.is_negative()
    }

    /// Number of AIG variables primed (and therefore cached) so far.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic3_formula::AigBuilder;
    use ic3_sat::RefSolver;

    #[test]
    fn input_primes_to_itself() {
        let mut b = AigBuilder::new();
        let x = b.input();
        let aig = b.build(x.positive()).unwrap();
        let mut primer = Primer::new();
        let mut sat = RefSolver::new();
        assert_eq!(primer.prime(&mut sat, &aig, x.positive()), x.positive());
    }

    #[test]
    fn latch_primes_to_its_next_function() {
        let mut b = AigBuilder::new();
        let l = b.latch(Some(false));
        let x = b.input();
        b.set_next(l, x);
        let aig = b.build(l).unwrap();
        let mut primer = Primer::new();
        let mut sat = RefSolver::new();
        assert_eq!(primer.prime(&mut sat, &aig, l), x);
    }

    #[test]
    fn and_gate_primes_once_per_shared_subgraph() {
        let mut b = AigBuilder::new();
        let x = b.input();
        let y = b.input();
        let g = b.and(x, y);
        let l1 = b.latch(Some(false));
        let l2 = b.latch(Some(false));
        b.set_next(l1, g);
        b.set_next(l2, g);
        let aig = b.build(l1).unwrap();

        let mut primer = Primer::new();
        let mut sat = RefSolver::new();
        let p1 = primer.prime(&mut sat, &aig, l1);
        let p2 = primer.prime(&mut sat, &aig, l2);
        assert_eq!(p1, p2, "both latches share the same next-function gate");
        assert_eq!(p1, g, "priming a latch is just its next-function literal, no new variable");
        assert_eq!(primer.len(), 2); // l1, l2 — g itself is never primed directly here
    }

    #[test]
    fn self_looping_latch_primes_without_recursion() {
        // next(m) = m: the minimal case that would infinite-loop under a primer that re-primes
        // whatever a latch's next-function points to instead of using it as-is.
        let mut b = AigBuilder::new();
        let m = b.latch(Some(false));
        b.set_next(m, m);
        let aig = b.build(m).unwrap();
        let mut primer = Primer::new();
        let mut sat = RefSolver::new();
        assert_eq!(primer.prime(&mut sat, &aig, m), m);
        assert_eq!(primer.prime(&mut sat, &aig, !m), !m);
    }

    #[test]
    fn latch_chain_primes_one_hop_per_call() {
        // A two-latch shift: next(m1) = m0, next(m0) = x. Priming m1 must land on m0's *current*
        // literal, not on m0's own next-function (that would be priming m1 two steps ahead).
        let mut b = AigBuilder::new();
        let x = b.input();
        let m0 = b.latch(Some(false));
        let m1 = b.latch(Some(false));
        b.set_next(m0, x);
        b.set_next(m1, m0);
        let aig = b.build(m1).unwrap();
        let mut primer = Primer::new();
        let mut sat = RefSolver::new();
        assert_eq!(primer.prime(&mut sat, &aig, m1), m0);
        assert_eq!(primer.prime(&mut sat, &aig, m0), x);
    }

    #[test]
    fn priming_and_gate_over_latches_substitutes_each_ones_hop() {
        // bad = m0 & m1, both latches held steady. prime(bad) must be a fresh gate over each
        // latch's own next-function, not an alias of `bad` itself.
        let mut b = AigBuilder::new();
        let m0 = b.latch(Some(false));
        let m1 = b.latch(Some(false));
        let x = b.input();
        b.set_next(m0, x);
        b.set_next(m1, m0);
        let bad = b.and(m0, m1);
        let aig = b.build(bad).unwrap();

        let mut primer = Primer::new();
        let mut sat = RefSolver::new();
        let primed_bad = primer.prime(&mut sat, &aig, bad);
        assert_ne!(primed_bad, bad, "prime(bad) must not alias bad's own current-state gate");

        // prime(bad) = AND(prime(m0), prime(m1)) = AND(x, m0). Forcing x and prime(bad) true
        // should force m0 (and transitively nothing about m1, which is unconstrained) true.
        sat.add(Some(x));
        sat.add(None);
        sat.add(Some(primed_bad));
        sat.add(None);
        assert_eq!(sat.solve(ic3_sat::Deadline::none()), ic3_sat::SolveResult::Sat);
        assert!(sat.value(m0));
    }

    #[test]
    #[should_panic]
    fn priming_unknown_variable_panics() {
        let mut b = AigBuilder::new();
        let l = b.latch(Some(false));
        let aig = b.build(l).unwrap();
        let mut primer = Primer::new();
        let mut sat = RefSolver::new();
        let bogus = Var::from_index(aig.var_count() + 5).positive();
        primer.prime(&mut sat, &aig, bogus);
    }
}
