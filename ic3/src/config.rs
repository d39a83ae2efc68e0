//! Engine configuration.
//!
//! A single immutable value threaded by reference into every subsystem constructor (§9 "Global
//! configuration"). There is no process-wide mutable state and no process-wide RNG: every source
//! of randomness is seeded from [`Config::seed`].

/// Which proof obligations `k < k*` (the live heap, deep counterexamples) versus `k + d < k*`
/// (shortest counterexamples only) are re-queued after being blocked once.
///
/// See the obligation set's `requeue` policies and §9's resolution of the requeue-policy open
/// question.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RequeuePolicy {
    /// Accepts `k < k*`: keeps searching for counterexamples at any depth. Complete with respect
    /// to counterexample depth; the default.
    Long,
    /// Accepts `k + d < k*`: only the shortest counterexamples are pursued. Faster, but can miss
    /// deeper ones — not complete with respect to depth.
    Short,
}

/// Immutable engine configuration.
///
/// Every field's doc comment states its default inline, matching the style the default engine
/// configuration in this workspace uses.
#[derive(Clone, Debug)]
pub struct Config {
    /// Run the variable-elimination and self-subsuming-resolution preprocessor on the initial
    /// CNF before starting the main loop. (Default: true)
    pub preprocess: bool,

    /// Maximum frame depth `K` the driver will grow to before giving up with an `unknown` result.
    /// (Default: 2^30)
    pub max_depth: u32,

    /// Requeue policy for blocked, non-subsumed proof obligations. (Default: Long)
    pub requeue_policy: RequeuePolicy,

    /// Verify the claimed inductive invariant (initiation, consecution, `⇒ ¬bad`) before
    /// reporting `unreachable`. (Default: true)
    pub verify_invariant: bool,

    /// Filter (retire) proof obligations subsumed by a newly blocked clause. (Default: true)
    pub filter_obligations: bool,

    /// Run consecutive sifting (on-block intra-frame clause re-shrinking) during the main loop.
    /// (Default: true)
    pub consecutive_sift: bool,

    /// After consecutive sifting strengthens a frame, also trigger a single-level propagation
    /// pass at the frame below. (Default: true)
    pub consecutive_sift_pull: bool,

    /// Use the circuit justifier to shrink a SAT model to latch literals before generalizing.
    /// When disabled, the raw latch values from the model are used unshrunk. (Default: true)
    pub justify: bool,

    /// Prefer re-queuing obligations at greater remaining depth over immediately retrying the
    /// shallowest one (`DeepObs` in the original configuration). (Default: true)
    pub deep_obligations: bool,

    /// Run the generalizer's second phase (random literal dropping beyond the unsat-core shrink).
    /// See §9's resolution of the literal-dropping open question for why this defaults to off.
    /// (Default: false)
    pub generalizer_remove_lits: bool,

    /// Seed for every pseudo-random tie-break in the engine (generalizer literal drop order,
    /// justifier OR-gate tie-break, consecutive-sift shuffle order, preprocessor candidate tie
    /// break). (Default: 0)
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            preprocess: true,
            max_depth: 1 << 30,
            requeue_policy: RequeuePolicy::Long,
            verify_invariant: true,
            filter_obligations: true,
            consecutive_sift: true,
            consecutive_sift_pull: true,
            justify: true,
            deep_obligations: true,
            generalizer_remove_lits: false,
            seed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert!(config.preprocess);
        assert_eq!(config.max_depth, 1 << 30);
        assert_eq!(config.requeue_policy, RequeuePolicy::Long);
        assert!(!config.generalizer_remove_lits);
        assert_eq!(config.seed, 0);
    }
}
