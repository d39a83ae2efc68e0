//! The And-Inverter-Graph transition system consumed by the ic3 engine.
//!
//! An [`Aig`] is a flat, array-of-nodes circuit representation indexed by variable: variable `0`
//! is the reserved constant-false node, every other variable is either a primary input, a latch,
//! or a two-input AND gate. Latches additionally carry a next-state function (itself a literal
//! over the same variable space) and an optional initial value. A single designated literal marks
//! the "bad" states the engine searches for.
//!
//! Parsing or writing an on-disk circuit format (AIGER or otherwise) is out of scope for this
//! crate; circuits are built in memory, either by an external ingester or, for tests, via
//! [`AigBuilder`].
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::lit::{Lit, Var};

/// What kind of node a variable denotes in an [`Aig`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// The reserved variable `0`, whose positive literal is constant false.
    Const,
    /// A primary input: an unconstrained per-step boolean.
    Input,
    /// A latch (state-holding variable). See [`Aig::latch`] for its next-function and init value.
    Latch,
    /// A two-input AND gate. See [`Aig::and_inputs`] for its two inputs.
    And,
}

/// The next-function and initial value of a single latch.
#[derive(Copy, Clone, Debug)]
pub struct LatchInfo {
    /// The latch's current-state variable.
    pub var: Var,
    /// The literal computing the latch's value in the next step.
    pub next: Lit,
    /// The latch's initial value, or `None` if unconstrained (either initial value is possible).
    pub init: Option<bool>,
}

#[derive(Copy, Clone, Debug)]
enum Node {
    Const,
    Input,
    Latch { next: Lit, init: Option<bool> },
    And { a: Lit, b: Lit },
}

/// Errors constructing or validating an [`Aig`].
///
/// These correspond to malformed input handed to the engine by its caller — not to an internal
/// programming defect — and are therefore returned rather than panicked on.
#[derive(Debug, Error)]
pub enum AigError {
    #[error("literal {0:?} references an undeclared variable")]
    UndeclaredVariable(Lit),
    #[error("no bad-state literal was declared")]
    MissingBad,
    #[error("variable {0:?} is declared more than once")]
    DuplicateDeclaration(Var),
}

/// A finite-state transition system expressed as an And-Inverter-Graph.
///
/// Variable `0` is always the constant. Every other variable is exactly one of input, latch, or
/// AND gate, discovered via [`Aig::kind`].
#[derive(Clone, Debug)]
pub struct Aig {
    nodes: Vec<Node>,
    inputs: Vec<Var>,
    latches: Vec<LatchInfo>,
    bad: Lit,
}

impl Aig {
    /// The literal denoting the constant `false`.
    pub fn false_lit() -> Lit {
        Lit::positive(Var::from_index(0))
    }

    /// The literal denoting the constant `true`.
    pub fn true_lit() -> Lit {
        !Self::false_lit()
    }

    /// Number of declared variables, including the reserved constant.
    pub fn var_count(&self) -> usize {
        self.nodes.len()
    }

    /// The node kind of a variable.
    pub fn kind(&self, var: Var) -> NodeKind {
        match self.nodes[var.index()] {
            Node::Const => NodeKind::Const,
            Node::Input => NodeKind::Input,
            Node::Latch { .. } => NodeKind::Latch,
            Node::And { .. } => NodeKind::And,
        }
    }

    /// The two (possibly negated) inputs of an AND-gate variable.
    ///
    /// Panics if `var` is not an AND gate.
    pub fn and_inputs(&self, var: Var) -> (Lit, Lit) {
        match self.nodes[var.index()] {
            Node::And { a, b } => (a, b),
            _ => panic!("{:?} is not an and-gate", var),
        }
    }

    /// The latch info for a latch variable.
    ///
    /// Panics if `var` is not a latch.
    pub fn latch(&self, var: Var) -> LatchInfo {
        match self.nodes[var.index()] {
            Node::Latch { next, init } => LatchInfo { var, next, init },
            _ => panic!("{:?} is not a latch", var),
        }
    }

    /// All primary inputs, in declaration order.
    pub fn inputs(&self) -> &[Var] {
        &self.inputs
    }

    /// All latches, in declaration order.
    pub fn latches(&self) -> &[LatchInfo] {
        &self.latches
    }

    /// The designated bad-state literal.
    pub fn bad(&self) -> Lit {
        self.bad
    }

    /// Evaluate a literal given a complete assignment of every variable's positive polarity.
    ///
    /// `values[v.index()]` must hold the value of the positive literal of `v` for every declared
    /// variable, including latches (their *current*-state value) and the constant (ignored).
    pub fn eval(&self, values: &[bool], lit: Lit) -> bool {
        let v = values[lit.var().index()];
        v ^ lit.is_negative()
    }

    /// Whether `lit` is falsified by every initial state, i.e. `lit`'s variable is a latch with a
    /// constrained initial value and `lit` asserts the opposite of it.
    ///
    /// Used to pick an `initWitness` literal out of a cube, and by the generalizer to confirm a
    /// shrunk cube still intersects the negation of the initial predicate.
    pub fn violates_init(&self, lit: Lit) -> bool {
        match self.nodes[lit.var().index()] {
            Node::Latch { init: Some(init), .. } => lit.is_positive() != init,
            _ => false,
        }
    }

    /// The initial-state CNF: one unit clause per latch with a constrained initial value.
    pub fn init_clauses(&self) -> Vec<Vec<Lit>> {
        self.latches
            .iter()
            .filter_map(|l| l.init.map(|init| vec![l.var.lit(init)]))
            .collect()
    }
}

/// Incrementally constructs an [`Aig`].
///
/// This is not an AIGER parser: it is a direct, programmatic way to build small circuits, the
/// same role `CnfFormula::from` plays for hand-built CNF in tests that never touch the DIMACS
/// parser.
pub struct AigBuilder {
    nodes: Vec<Node>,
    inputs: Vec<Var>,
    latch_vars: Vec<Var>,
    and_cache: FxHashMap<(Lit, Lit), Var>,
}

impl Default for AigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AigBuilder {
    pub fn new() -> Self {
        AigBuilder {
            nodes: vec![Node::Const],
            inputs: Vec::new(),
            latch_vars: Vec::new(),
            and_cache: FxHashMap::default(),
        }
    }

    fn alloc(&mut self, node: Node) -> Var {
        let var = Var::from_index(self.nodes.len());
        self.nodes.push(node);
        var
    }

    /// Declares a new primary input and returns its positive literal.
    pub fn input(&mut self) -> Lit {
        let var = self.alloc(Node::Input);
        self.inputs.push(var);
        var.positive()
    }

    /// Declares a new latch with an initial value and returns its current-state positive literal.
    ///
    /// The next-state function must be supplied with [`AigBuilder::set_next`] before
    /// [`AigBuilder::build`] is called; every latch must have its next function set exactly once.
    pub fn latch(&mut self, init: Option<bool>) -> Lit {
        let var = self.alloc(Node::Latch {
            next: Aig::false_lit(),
            init,
        });
        self.latch_vars.push(var);
        var.positive()
    }

    /// Sets (or overwrites) the next-state function of a latch literal (sign ignored).
    pub fn set_next(&mut self, latch: Lit, next: Lit) {
        match &mut self.nodes[latch.var().index()] {
            Node::Latch { next: slot, .. } => *slot = next,
            _ => panic!("{:?} is not a latch", latch.var()),
        }
    }

    /// Builds (or reuses, if an equal gate already exists) an AND gate `a ∧ b`.
    ///
    /// Performs constant folding and literal-ordering normalization so structurally identical
    /// gates are shared.
    pub fn and(&mut self, a: Lit, b: Lit) -> Lit {
        if a == Aig::false_lit() || b == Aig::false_lit() || a == !b {
            return Aig::false_lit();
        }
        if a == Aig::true_lit() {
            return b;
        }
        if b == Aig::true_lit() || a == b {
            return a;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(&var) = self.and_cache.get(&key) {
            return var.positive();
        }
        let var = self.alloc(Node::And { a: key.0, b: key.1 });
        self.and_cache.insert(key, var);
        var.positive()
    }

    /// Builds the disjunction `a ∨ b` as `¬(¬a ∧ ¬b)`.
    pub fn or(&mut self, a: Lit, b: Lit) -> Lit {
        !self.and(!a, !b)
    }

    /// Finalizes the circuit with the given bad-state literal.
    pub fn build(self, bad: Lit) -> Result<Aig, AigError> {
        if bad.var().index() >= self.nodes.len() {
            return Err(AigError::UndeclaredVariable(bad));
        }
        let latches = self
            .latch_vars
            .iter()
            .map(|&var| match self.nodes[var.index()] {
                Node::Latch { next, init } => {
                    if next.var().index() >= self.nodes.len() {
                        return Err(AigError::UndeclaredVariable(next));
                    }
                    Ok(LatchInfo { var, next, init })
                }
                _ => unreachable!(),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Aig {
            nodes: self.nodes,
            inputs: self.inputs,
            latches,
            bad,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_latch_circuit() {
        // init(m) = false, next(m) = m, bad = m
        let mut b = AigBuilder::new();
        let m = b.latch(Some(false));
        b.set_next(m, m);
        let aig = b.build(m).unwrap();

        assert_eq!(aig.latches().len(), 1);
        assert_eq!(aig.kind(m.var()), NodeKind::Latch);
        let info = aig.latch(m.var());
        assert_eq!(info.init, Some(false));
        assert_eq!(info.next, m);
    }

    #[test]
    fn and_gate_constant_folding() {
        let mut b = AigBuilder::new();
        let x = b.input();
        assert_eq!(b.and(x, Aig::false_lit()), Aig::false_lit());
        assert_eq!(b.and(x, Aig::true_lit()), x);
        assert_eq!(b.and(x, !x), Aig::false_lit());
        assert_eq!(b.and(x, x), x);
    }

    #[test]
    fn violates_init_only_for_constrained_latches() {
        let mut b = AigBuilder::new();
        let m = b.latch(Some(false));
        let u = b.latch(None);
        let x = b.input();
        b.set_next(m, m);
        b.set_next(u, u);
        let aig = b.build(m).unwrap();

        assert!(aig.violates_init(m));
        assert!(!aig.violates_init(!m));
        assert!(!aig.violates_init(u));
        assert!(!aig.violates_init(!u));
        assert!(!aig.violates_init(x));
    }

    #[test]
    fn shared_and_gates_are_deduplicated() {
        let mut b = AigBuilder::new();
        let x = b.input();
        let y = b.input();
        let g1 = b.and(x, y);
        let g2 = b.and(y, x);
        assert_eq!(g1, g2);
    }
}
