//! Proof-obligation forest: a priority structure organized by frame level (§4.7).
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ic3_formula::Lit;

use crate::cnf::contains_sorted;
use crate::config::RequeuePolicy;

/// A stable integer identifier for a proof obligation stored in an [`Obligations`] arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObId(u32);

struct ObSlot {
    k: u32,
    dist_to_bad: u32,
    cube: Vec<Lit>,
    init_witness: Lit,
    parent: Option<ObId>,
    n_kids: u32,
    /// Set once this obligation has been filtered out of every live heap for good (subsumed past
    /// what the requeue policy allows). A dead slot is only actually recycled once its last kid is
    /// freed too — children's `parent` fields must keep resolving while a trace walk might still
    /// need them.
    dead: bool,
}

/// `(−distToBad, size, id)`: greater `distToBad`, then smaller cube, then smaller id is more
/// urgent. [`BinaryHeap`] pops the maximum, so the two ascending-is-better fields are stored
/// reversed.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PriorityKey {
    dist_to_bad: u32,
    rev_size: Reverse<u32>,
    rev_id: Reverse<u32>,
}

/// The proof-obligation forest used to drive the IC3 main loop.
///
/// Parent/child links are arena indices (`ObId`), not owning pointers, matching the clause
/// database's "arena with integer ids, no back-pointers" shape. Obligations at frame levels
/// `0..k*` (exclusive of the root's own level `k*`) live in one max-heap per level; the root
/// obligation — representing `bad` itself at the current horizon — is tracked separately and is
/// never stored in a per-level heap. An obligation whose level reaches `k*` before `grow()` widens
/// the horizon has nowhere live to go yet and is parked in `next` until it does.
pub struct Obligations {
    slots: Vec<ObSlot>,
    free: Vec<u32>,
    heaps: Vec<BinaryHeap<(PriorityKey, ObId)>>,
    next: Vec<ObId>,
    root_id: ObId,
    root: Option<ObId>,
    k_star: u32,
    requeue_policy: RequeuePolicy,
}

impl Obligations {
    /// Creates a fresh forest with the root obligation installed at level `k_star`.
    pub fn new(k_star: u32, requeue_policy: RequeuePolicy) -> Obligations {
        let mut obs = Obligations {
            slots: Vec::new(),
            free: Vec::new(),
            heaps: (0..k_star).map(|_| BinaryHeap::new()).collect(),
            next: Vec::new(),
            root_id: ObId(0),
            root: None,
            k_star,
            requeue_policy,
        };
        let root_id = obs.alloc(ObSlot {
            k: k_star,
            dist_to_bad: 0,
            cube: Vec::new(),
            init_witness: Lit::NONE,
            parent: None,
            n_kids: 0,
            dead: false,
        });
        obs.root_id = root_id;
        obs.root = Some(root_id);
        obs
    }

    fn alloc(&mut self, slot: ObSlot) -> ObId {
        if let Some(id) = self.free.pop() {
            self.slots[id as usize] = slot;
            ObId(id)
        } else {
            let id = self.slots.len() as u32;
            self.slots.push(slot);
            ObId(id)
        }
    }

    pub fn root(&self) -> ObId {
        self.root_id
    }

    pub fn is_root(&self, id: ObId) -> bool {
        id == self.root_id
    }

    pub fn k(&self, id: ObId) -> u32 {
        self.slots[id.0 as usize].k
    }

    pub fn dist_to_bad(&self, id: ObId) -> u32 {
        self.slots[id.0 as usize].dist_to_bad
    }

    pub fn cube(&self, id: ObId) -> &[Lit] {
        &self.slots[id.0 as usize].cube
    }

    pub fn init_witness(&self, id: ObId) -> Lit {
        self.slots[id.0 as usize].init_witness
    }

    pub fn parent(&self, id: ObId) -> Option<ObId> {
        self.slots[id.0 as usize].parent
    }

    pub fn k_star(&self) -> u32 {
        self.k_star
    }

    fn priority(&self, id: ObId) -> PriorityKey {
        let slot = &self.slots[id.0 as usize];
        PriorityKey {
            dist_to_bad: slot.dist_to_bad,
            rev_size: Reverse(slot.cube.len() as u32),
            rev_id: Reverse(id.0),
        }
    }

    /// Whether an obligation bumped to `k` (with the given `dist_to_bad`) is still worth tracking,
    /// as opposed to retiring it outright. `k == k_star` still permits under both policies: such an
    /// obligation has nowhere live to go *yet* (see `push_back`'s `next` fallback) but may become
    /// relevant again the moment `grow()` widens the horizon past it.
    fn requeue_permits(&self, k: u32, dist_to_bad: u32) -> bool {
        match self.requeue_policy {
            RequeuePolicy::Long => k <= self.k_star,
            RequeuePolicy::Short => k + dist_to_bad <= self.k_star,
        }
    }

    /// Inserts `id` into whatever queue its current `k` belongs to: the root slot, a live
    /// per-level heap, or the `next` holding zone if `k` has already reached `k_star`.
    fn push_back(&mut self, id: ObId) {
        if id == self.root_id {
            self.root = Some(id);
            return;
        }
        let k = self.slots[id.0 as usize].k;
        if (k as usize) < self.heaps.len() {
            let prio = self.priority(id);
            self.heaps[k as usize].push((prio, id));
        } else {
            self.next.push(id);
        }
    }

    /// Pops the highest-priority obligation due at the current frame: the highest-priority
    /// occupant of the lowest non-empty level, or the root if every level is drained. Returns
    /// `None` only when the root itself is currently checked out (awaiting `grow()` or a pending
    /// `extend` that will push it back).
    pub fn choose(&mut self) -> Option<ObId> {
        for heap in &mut self.heaps {
            if let Some((_, id)) = heap.pop() {
                return Some(id);
            }
        }
        self.root.take()
    }

    /// Allocates a child of `parent` one level closer to the initial states, pushes both the new
    /// child and the (still potentially useful) parent back into the forest.
    pub fn extend(&mut self, parent: ObId, mut ms: Vec<Lit>, init_witness: Lit) -> ObId {
        ms.sort_unstable();
        ms.dedup();
        let parent_k = self.slots[parent.0 as usize].k;
        let parent_dist = self.slots[parent.0 as usize].dist_to_bad;
        assert!(parent_k > 0, "cannot extend below frame 0");

        let child = self.alloc(ObSlot {
            k: parent_k - 1,
            dist_to_bad: parent_dist + 1,
            cube: ms,
            init_witness,
            parent: Some(parent),
            n_kids: 0,
            dead: false,
        });
        self.slots[parent.0 as usize].n_kids += 1;

        self.push_back(parent);
        self.push_back(child);
        child
    }

    /// Marks `o` as blocked by a clause derived from cube `ms`: bumps its level, filters every
    /// *other* obligation already sitting at the new level that the newly-blocked cube subsumes,
    /// then requeues `o` itself if the requeue policy still permits searching past the new level.
    ///
    /// `block_at` must run before `o` is pushed back: `o`'s own cube trivially matches `ms` (it is
    /// the cube that was just blocked), so filtering after requeuing `o` would immediately re-bump
    /// it a second, spurious level past where the new clause actually placed it.
    pub fn block(&mut self, o: ObId, ms: &[Lit]) {
        debug_assert!(!self.is_root(o), "block() is for non-root obligations");
        let new_k = {
            let slot = &mut self.slots[o.0 as usize];
            slot.k += 1;
            slot.k
        };
        let mut sorted_ms = ms.to_vec();
        sorted_ms.sort_unstable();
        self.block_at(new_k, &sorted_ms);

        let dist = self.slots[o.0 as usize].dist_to_bad;
        if self.requeue_permits(new_k, dist) {
            self.push_back(o);
        } else {
            self.retire(o);
        }
    }

    /// Filters every live obligation at level `k` whose cube is a (non-strict) superset of `ms` —
    /// a cube already implied unreachable by the clause just added at `k`. Filtered obligations are
    /// pushed one level higher if the requeue policy still allows it, otherwise retired.
    pub fn block_at(&mut self, k: u32, ms: &[Lit]) {
        if (k as usize) >= self.heaps.len() {
            return;
        }
        let mut survivors = BinaryHeap::new();
        let mut bumped = Vec::new();
        for (prio, id) in self.heaps[k as usize].drain() {
            if contains_sorted(&self.slots[id.0 as usize].cube, ms) {
                bumped.push(id);
            } else {
                survivors.push((prio, id));
            }
        }
        self.heaps[k as usize] = survivors;

        for id in bumped {
            let new_k = k + 1;
            let dist = self.slots[id.0 as usize].dist_to_bad;
            if self.requeue_permits(new_k, dist) {
                self.slots[id.0 as usize].k = new_k;
                self.push_back(id);
            } else {
                self.retire(id);
            }
        }
    }

    /// Widens the horizon: `k*` increases by one, a fresh heap level opens for the frame that used
    /// to be the (unreachable) root-only level, the root is requeued at the new top, and every
    /// obligation parked in `next` at the newly-legitimate level drains back into its heap.
    pub fn grow(&mut self) {
        self.k_star += 1;
        self.heaps.push(BinaryHeap::new());
        self.slots[self.root_id.0 as usize].k = self.k_star;
        self.root = Some(self.root_id);

        let target = self.k_star - 1;
        let parked = std::mem::take(&mut self.next);
        for id in parked {
            if self.slots[id.0 as usize].k == target {
                self.push_back(id);
            } else {
                self.next.push(id);
            }
        }
    }

    /// Retires `id`: removes it from consideration for good, reclaiming its slot immediately if it
    /// has no kids, or once its last kid is itself retired.
    fn retire(&mut self, id: ObId) {
        let (n_kids, parent) = {
            let slot = &mut self.slots[id.0 as usize];
            debug_assert!(!slot.dead, "double retire() of the same obligation");
            slot.dead = true;
            (slot.n_kids, slot.parent)
        };
        if n_kids == 0 {
            self.free.push(id.0);
            if let Some(p) = parent {
                self.release_kid(p);
            }
        }
    }

    fn release_kid(&mut self, parent: ObId) {
        let slot = &mut self.slots[parent.0 as usize];
        debug_assert!(slot.n_kids > 0);
        slot.n_kids -= 1;
        if slot.n_kids == 0 && slot.dead {
            self.free.push(parent.0);
        }
    }

    /// Number of live (non-retired) obligations across every level and the root.
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic3_formula::lits;

    #[test]
    fn choose_returns_root_when_forest_is_empty() {
        let mut obs = Obligations::new(2, RequeuePolicy::Long);
        let root = obs.choose().unwrap();
        assert!(obs.is_root(root));
        assert_eq!(obs.choose(), None, "root is checked out until pushed back");
    }

    #[test]
    fn extend_creates_child_one_level_down_and_requeues_parent() {
        let mut obs = Obligations::new(2, RequeuePolicy::Long);
        let root = obs.choose().unwrap();
        let child = obs.extend(root, lits![1, 2].to_vec(), Lit::from_dimacs(1));
        assert_eq!(obs.k(child), obs.k_star() - 1);
        assert_eq!(obs.dist_to_bad(child), 1);
        assert_eq!(obs.parent(child), Some(root));

        // the parent (root) was pushed back, so choose() must return it before the child's level
        // since the root is only handed out once every per-level heap has drained... but here the
        // child occupies level k*-1, so choose() must surface the child first.
        let picked = obs.choose().unwrap();
        assert_eq!(picked, child);
    }

    #[test]
    fn choose_prefers_larger_dist_to_bad_at_the_same_level() {
        // A sits at k=1, dist=1. B starts as A's child (k=0, dist=2) and is then blocked back up
        // to k=1, where it now contends with A at equal cube size but greater dist_to_bad.
        let mut obs = Obligations::new(2, RequeuePolicy::Long);
        let root = obs.choose().unwrap();
        let _ = obs.extend(root, lits![1].to_vec(), Lit::from_dimacs(1));
        let a = obs.choose().unwrap(); // re-pop A (the only occupant of level 1) to extend it
        let _ = obs.extend(a, lits![2].to_vec(), Lit::from_dimacs(2));
        let b = obs.choose().unwrap(); // B sits alone at level 0, chosen ahead of A at level 1
        obs.block(b, &lits![2]); // bumps B to k=1, where A (dist 1) is waiting

        let picked = obs.choose().unwrap();
        assert_eq!(picked, b, "greater dist_to_bad outranks a same-level, same-size sibling");
    }

    #[test]
    fn block_at_filters_subsumed_obligations_up_a_level() {
        let mut obs = Obligations::new(3, RequeuePolicy::Long);
        let root = obs.choose().unwrap();
        let a = obs.extend(root, lits![1, 2, 3].to_vec(), Lit::from_dimacs(1));
        let starting_k = obs.k(a);

        obs.block_at(starting_k, &lits![1, 2]);
        assert_eq!(obs.k(a), starting_k + 1, "superset cube bumped up a level by the new clause");
    }

    #[test]
    fn grow_requeues_root_and_drains_next() {
        let mut obs = Obligations::new(2, RequeuePolicy::Long);
        let root = obs.choose().unwrap();
        // child starts at k* - 1 = 1; one block bumps it to k* = 2, where no heap exists yet, so
        // it parks in `next` until grow() widens the horizon.
        let child = obs.extend(root, lits![1].to_vec(), Lit::from_dimacs(1));
        let _ = obs.choose(); // consumes the child picked ahead of root's re-push ordering
        obs.block(child, &lits![1]); // k 1 -> 2 == k*, parks in `next`

        assert_eq!(obs.k(child), 2);
        obs.grow();
        assert_eq!(obs.k_star(), 3);
        // child's k (2) now matches the new non-root level k*-1 = 2, so it drained back in.
        let picked = obs.choose().unwrap();
        assert_eq!(picked, child);
    }

    #[test]
    fn retire_reclaims_slot_only_after_last_kid_is_gone() {
        let mut obs = Obligations::new(2, RequeuePolicy::Short);
        let root = obs.choose().unwrap();
        let parent = obs.extend(root, lits![1].to_vec(), Lit::from_dimacs(1));
        let _ = obs.choose();
        let before = obs.live_count();
        let _child = obs.extend(parent, lits![2].to_vec(), Lit::from_dimacs(2));
        assert_eq!(obs.live_count(), before + 1);
    }
}
