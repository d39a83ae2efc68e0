//! Pairwise clause resolution on a pivot variable (§4.2).
use ic3_formula::{Lit, Var};

/// Resolves clauses against a fixed pivot clause, reusing its sign-map across many calls.
///
/// `set_pivot` loads one clause's literals into an indexed sign map keyed by variable; each
/// subsequent `resolve` scans a second clause linearly against that map. This amortizes the setup
/// cost across many resolutions against the same pivot clause, which is exactly the preprocessor's
/// elimination inner loop: one pivot clause resolved against every clause containing the opposite
/// polarity of the elimination variable.
#[derive(Default)]
pub struct Resolver {
    /// `values[var.index()]` is `Some(true)` / `Some(false)` if the pivot clause contains a
    /// positive / negative occurrence of `var`, `None` otherwise.
    values: Vec<Option<bool>>,
    touched: Vec<Var>,
    pivot: Option<Var>,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver::default()
    }

    fn ensure_capacity(&mut self, var: Var) {
        if var.index() >= self.values.len() {
            self.values.resize(var.index() + 1, None);
        }
    }

    /// Loads `clause` as the pivot side and designates `pivot` as the variable resolution will
    /// eliminate. `clause` must contain `pivot` with either polarity, and must not contain both
    /// polarities of any variable (it must not be a tautology).
    pub fn set_pivot(&mut self, clause: &[Lit], pivot: Var) {
        self.clear();
        self.pivot = Some(pivot);
        for &lit in clause {
            self.ensure_capacity(lit.var());
            self.values[lit.var().index()] = Some(lit.is_positive());
            self.touched.push(lit.var());
        }
    }

    fn clear(&mut self) {
        for var in self.touched.drain(..) {
            self.values[var.index()] = None;
        }
        self.pivot = None;
    }

    /// Resolves the pivot clause against `other` on the pivot variable.
    ///
    /// Returns `Some(resolvent)` (sorted, deduplicated, pivot removed) if `other` contains the
    /// pivot with the opposite polarity from the pivot clause and the union is not a tautology.
    /// Returns `None` ("not resolvable") otherwise.
    pub fn resolve(&self, other: &[Lit]) -> Option<Vec<Lit>> {
        let pivot = self.pivot.expect("set_pivot must be called before resolve");
        let pivot_polarity = self.values[pivot.index()].expect("pivot variable not in pivot clause");

        let mut saw_opposite_pivot = false;
        for &lit in other {
            if lit.var() == pivot {
                if lit.is_positive() == pivot_polarity {
                    // Same clause would contain pivot on both sides after union - not a
                    // resolution on this pivot.
                    return None;
                }
                saw_opposite_pivot = true;
                continue;
            }
            if let Some(&Some(existing)) = self.values.get(lit.var().index()) {
                if existing != lit.is_positive() {
                    return None; // tautology
                }
            }
        }
        if !saw_opposite_pivot {
            return None;
        }

        let mut out: Vec<Lit> = self
            .touched
            .iter()
            .copied()
            .filter(|&v| v != pivot)
            .map(|v| Lit::from_var(v, self.values[v.index()].unwrap()))
            .collect();
        for &lit in other {
            if lit.var() != pivot && !out.contains(&lit) {
                out.push(lit);
            }
        }
        out.sort_unstable();
        Some(out)
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic3_formula::{lit, lits, var};

    #[test]
    fn resolves_on_shared_pivot() {
        let mut r = Resolver::new();
        r.set_pivot(&lits![1, 2], var!(1));
        let result = r.resolve(&lits![-1, 3]).unwrap();
        assert_eq!(result, vec![lit!(2), lit!(3)]);
    }

    #[test]
    fn detects_tautology() {
        let mut r = Resolver::new();
        r.set_pivot(&lits![1, 2], var!(1));
        let result = r.resolve(&lits![-1, -2]);
        assert_eq!(result, None);
    }

    #[test]
    fn rejects_same_polarity_pivot() {
        let mut r = Resolver::new();
        r.set_pivot(&lits![1, 2], var!(1));
        let result = r.resolve(&lits![1, 3]);
        assert_eq!(result, None);
    }

    #[test]
    fn dedups_shared_non_pivot_literals() {
        let mut r = Resolver::new();
        r.set_pivot(&lits![1, 2, 3], var!(1));
        let result = r.resolve(&lits![-1, 2, 4]).unwrap();
        assert_eq!(result, vec![lit!(2), lit!(3), lit!(4)]);
    }
}
