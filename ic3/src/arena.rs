//! Packed storage of sorted literal spans with lazy compaction (§4.1).
use ic3_formula::Lit;

/// An opaque handle to a literal span stored in a [`LitArena`].
///
/// `Span::NULL` denotes the empty span and is never allocated by [`LitArena::put`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    id: u32,
}

impl Span {
    pub const NULL: Span = Span { id: 0 };
}

#[derive(Copy, Clone, Debug)]
struct SpanInfo {
    start: u32,
    len: u32,
    removed: bool,
}

/// Dense, cache-friendly storage for clause and proof-obligation literal sequences.
///
/// Compaction is triggered lazily: once the literals owned by removed spans reach at least half
/// of the backing buffer, every surviving span is shifted down to close the gaps. Span ids
/// freed by [`LitArena::remove`] are recycled by the next [`LitArena::put`], so the `spans` table
/// itself never grows without bound either.
#[derive(Default)]
pub struct LitArena {
    data: Vec<Lit>,
    spans: Vec<SpanInfo>,
    free_spans: Vec<u32>,
    free_literals: u32,
}

impl LitArena {
    pub fn new() -> Self {
        LitArena {
            data: Vec::new(),
            // index 0 is the reserved null span.
            spans: vec![SpanInfo {
                start: 0,
                len: 0,
                removed: false,
            }],
            free_spans: Vec::new(),
            free_literals: 0,
        }
    }

    /// Stores `lits` (which must already be sorted) contiguously, returning a handle to it.
    pub fn put(&mut self, lits: &[Lit]) -> Span {
        debug_assert!(
            lits.windows(2).all(|w| w[0] <= w[1]),
            "literal span must be sorted"
        );
        if lits.is_empty() {
            return Span::NULL;
        }
        let start = self.data.len() as u32;
        self.data.extend_from_slice(lits);
        self.alloc_span(start, lits.len() as u32)
    }

    fn alloc_span(&mut self, start: u32, len: u32) -> Span {
        let info = SpanInfo {
            start,
            len,
            removed: false,
        };
        if let Some(id) = self.free_spans.pop() {
            self.spans[id as usize] = info;
            Span { id }
        } else {
            let id = self.spans.len() as u32;
            self.spans.push(info);
            Span { id }
        }
    }

    /// Returns the literal sequence originally stored at `span`.
    ///
    /// Panics if `span` has already been removed.
    pub fn get(&self, span: Span) -> &[Lit] {
        if span == Span::NULL {
            return &[];
        }
        let info = self.spans[span.id as usize];
        assert!(!info.removed, "get() on a removed span");
        &self.data[info.start as usize..(info.start + info.len) as usize]
    }

    /// Retires `span`, making its literal storage reclaimable and its id reusable.
    pub fn remove(&mut self, span: Span) {
        if span == Span::NULL {
            return;
        }
        let info = &mut self.spans[span.id as usize];
        assert!(!info.removed, "double remove() of the same span");
        info.removed = true;
        self.free_literals += info.len;
        self.free_spans.push(span.id);

        if (self.free_literals as usize) * 2 >= self.data.len() {
            self.compact();
        }
    }

    fn compact(&mut self) {
        let mut live: Vec<u32> = (1..self.spans.len() as u32)
            .filter(|&id| !self.spans[id as usize].removed && self.spans[id as usize].len > 0)
            .collect();
        live.sort_by_key(|&id| self.spans[id as usize].start);

        let mut write = 0u32;
        for id in live {
            let (start, len) = {
                let info = self.spans[id as usize];
                (info.start, info.len)
            };
            if start != write {
                self.data.copy_within(start as usize..(start + len) as usize, write as usize);
            }
            self.spans[id as usize].start = write;
            write += len;
        }
        self.data.truncate(write as usize);
        self.free_literals = 0;

        if cfg!(debug_assertions) {
            self.check_invariants();
        }
    }

    fn check_invariants(&self) {
        let mut ranges: Vec<(u32, u32)> = self
            .spans
            .iter()
            .filter(|s| !s.removed && s.len > 0)
            .map(|s| (s.start, s.start + s.len))
            .collect();
        ranges.sort();
        for w in ranges.windows(2) {
            debug_assert!(w[0].1 <= w[1].0, "compacted spans overlap");
        }
    }

    /// Number of live literals currently stored.
    pub fn len(&self) -> usize {
        self.data.len() - self.free_literals as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live (non-removed) spans.
    pub fn span_count(&self) -> usize {
        self.spans.iter().filter(|s| !s.removed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic3_formula::lits;

    #[test]
    fn roundtrip_without_removal() {
        let mut arena = LitArena::new();
        let a = arena.put(&lits![1, 2, 3]);
        let b = arena.put(&lits![-4, 5]);
        assert_eq!(arena.get(a), &lits![1, 2, 3]);
        assert_eq!(arena.get(b), &lits![-4, 5]);
    }

    #[test]
    fn null_span_is_empty() {
        let mut arena = LitArena::new();
        let empty = arena.put(&[]);
        assert_eq!(empty, Span::NULL);
        assert_eq!(arena.get(empty), &[] as &[Lit]);
    }

    #[test]
    fn remove_and_compact_preserves_survivors() {
        let mut arena = LitArena::new();
        let mut spans = Vec::new();
        for i in 1..40 {
            spans.push(arena.put(&[ic3_formula::Lit::from_dimacs(i)]));
        }
        // remove every other one, eventually crossing the half-free compaction threshold.
        for (i, &span) in spans.iter().enumerate() {
            if i % 2 == 0 {
                arena.remove(span);
            }
        }
        for (i, &span) in spans.iter().enumerate() {
            if i % 2 != 0 {
                assert_eq!(arena.get(span), &[ic3_formula::Lit::from_dimacs(i as isize + 1)]);
            }
        }
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn arena_round_trip_survives_interleaved_removal(
            ops in proptest::collection::vec(
                (proptest::bool::ANY, 1i32..200i32), 0..200)
        ) {
            let mut arena = LitArena::new();
            let mut live: Vec<(Span, Vec<Lit>)> = Vec::new();
            for (put_op, raw) in ops {
                if put_op || live.is_empty() {
                    let lit = Lit::from_dimacs(raw as isize);
                    let span = arena.put(&[lit]);
                    live.push((span, vec![lit]));
                } else {
                    let idx = (raw.unsigned_abs() as usize) % live.len();
                    let (span, _) = live.remove(idx);
                    arena.remove(span);
                }
                for (span, expected) in &live {
                    prop_assert_eq!(arena.get(*span), expected.as_slice());
                }
            }
        }
    }
}
