use rustc_hash::FxHashMap;

/// Interned symbol identifier.
pub(crate) type SymbolId = u32;

/// Adjacent symbol pair.
pub(crate) type Pair = (SymbolId, SymbolId);

/// Pair count changes produced by merging a pair inside one or more words.
#[derive(Default)]
pub(crate) struct MergeOutcome {
    /// Number of pair occurrences replaced, weighted by word frequency.
    pub merges: u64,
    /// Pair count deltas. Negative values are removals, positive values newly formed pairs.
    pub deltas: FxHashMap<Pair, i64>,
}

impl MergeOutcome {
    fn record(&mut self, pair: Pair, delta: i64) {
        *self.deltas.entry(pair).or_insert(0) += delta;
    }

    /// Folds `other` into `self`.
    pub(crate) fn absorb(&mut self, other: Self) {
        self.merges += other.merges;
        for (pair, delta) in other.deltas {
            self.record(pair, delta);
        }
    }
}

/// A distinct corpus word as a symbol sequence, with its frequency.
#[derive(Clone, Debug)]
pub(crate) struct Word {
    symbols: Vec<SymbolId>,
    count: u64,
}

impl Word {
    pub(crate) fn new(symbols: Vec<SymbolId>, count: u64) -> Self {
        Self { symbols, count }
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    pub(crate) fn symbols(&self) -> &[SymbolId] {
        &self.symbols
    }

    /// Invokes `f` for each adjacent pair.
    pub(crate) fn for_each_pair<F>(&self, mut f: F)
    where
        F: FnMut(Pair),
    {
        for window in self.symbols.windows(2) {
            f((window[0], window[1]));
        }
    }

    /// Replaces every non-overlapping occurrence of `pair`, scanning left to right, and
    /// reports the resulting pair count changes.
    pub(crate) fn merge(&mut self, pair: Pair, replacement: SymbolId) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let len = self.symbols.len();
        if len < 2 {
            return outcome;
        }
        let weight = i64::try_from(self.count).unwrap_or(i64::MAX);

        let mut read = 0usize;
        let mut write = 0usize;
        while read < len {
            if read + 1 < len && self.symbols[read] == pair.0 && self.symbols[read + 1] == pair.1 {
                let prev = (write > 0).then(|| self.symbols[write - 1]);
                let next = (read + 2 < len).then(|| self.symbols[read + 2]);

                if let Some(prev) = prev {
                    outcome.record((prev, pair.0), -weight);
                }
                outcome.record(pair, -weight);
                if let Some(next) = next {
                    outcome.record((pair.1, next), -weight);
                }

                self.symbols[write] = replacement;
                write += 1;
                read += 2;
                outcome.merges += self.count;

                if let Some(prev) = prev {
                    outcome.record((prev, replacement), weight);
                }
                if let Some(next) = next {
                    outcome.record((replacement, next), weight);
                }
            } else {
                self.symbols[write] = self.symbols[read];
                write += 1;
                read += 1;
            }
        }
        self.symbols.truncate(write);
        outcome.deltas.retain(|_, delta| *delta != 0);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_replaces_all_pairs() {
        let mut word = Word::new(vec![1, 2, 1, 2, 3], 2);
        let outcome = word.merge((1, 2), 9);
        assert_eq!(word.symbols(), &[9, 9, 3]);
        assert_eq!(outcome.merges, 4);
        assert_eq!(outcome.deltas.get(&(1, 2)), Some(&-4));
        assert_eq!(outcome.deltas.get(&(2, 1)), Some(&-2));
        assert_eq!(outcome.deltas.get(&(9, 9)), Some(&2));
        assert_eq!(outcome.deltas.get(&(9, 3)), Some(&2));
    }

    #[test]
    fn overlapping_pairs_merge_left_to_right() {
        let mut word = Word::new(vec![5, 5, 5, 5], 1);
        let outcome = word.merge((5, 5), 7);
        assert_eq!(word.symbols(), &[7, 7]);
        assert_eq!(outcome.deltas.get(&(5, 5)), Some(&-3));
        assert_eq!(outcome.deltas.get(&(7, 7)), Some(&1));
        assert!(!outcome.deltas.contains_key(&(7, 5)));
    }

    #[test]
    fn single_symbol_words_are_untouched() {
        let mut word = Word::new(vec![3], 10);
        let outcome = word.merge((3, 3), 4);
        assert_eq!(word.symbols(), &[3]);
        assert_eq!(outcome.merges, 0);
    }
}
