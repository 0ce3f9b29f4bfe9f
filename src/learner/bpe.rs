//! BPE merge learning over word counts.

use std::cmp::Ordering;
use std::collections::{hash_map::Entry, BinaryHeap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::word::{MergeOutcome, Pair, SymbolId, Word};
use super::{ingest_tokenized, ingestion_tokenizer, write_description, SubwordLearner};
use crate::config::{BpeLearnerConfig, TokenizerOptions};
use crate::error::{Result, RtokError};
use crate::metrics::{sample_rss_kb, LearningMetrics, MergeMetrics, StopReason};
use crate::subword::bpe::{Bpe, END_OF_WORD};
use crate::tokenizer::Tokenizer;

/// Learns BPE merge operations from ingested text.
#[derive(Debug, Clone)]
pub struct BpeLearner {
    cfg: BpeLearnerConfig,
    tokenizer: Tokenizer,
    vocab: FxHashMap<String, u64>,
    metrics: Option<LearningMetrics>,
}

/// Result of a learning run.
#[must_use]
#[derive(Debug, Clone)]
pub struct BpeArtifacts {
    /// Learned merges in application order.
    pub merges: Vec<(String, String)>,
    /// Metrics captured while learning.
    pub metrics: LearningMetrics,
}

impl BpeLearner {
    /// Creates a learner. Ingested text is split with `tokenizer_options`, or on spaces when
    /// none are given.
    pub fn new(cfg: BpeLearnerConfig, tokenizer_options: Option<TokenizerOptions>) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            tokenizer: ingestion_tokenizer(tokenizer_options)?,
            vocab: FxHashMap::default(),
            metrics: None,
        })
    }

    /// Returns the learner configuration.
    #[must_use]
    pub fn config(&self) -> &BpeLearnerConfig {
        &self.cfg
    }

    /// Number of distinct words ingested so far.
    #[must_use]
    pub fn distinct_words(&self) -> usize {
        self.vocab.len()
    }

    /// Ingested frequency of `word`.
    #[must_use]
    pub fn word_count(&self, word: &str) -> u64 {
        self.vocab.get(word).copied().unwrap_or(0)
    }

    /// Metrics of the last call to [`SubwordLearner::learn_to_writer`].
    #[must_use]
    pub fn last_metrics(&self) -> Option<&LearningMetrics> {
        self.metrics.as_ref()
    }

    fn add_word(&mut self, word: &str, count: u64) {
        if word.is_empty() || count == 0 {
            return;
        }
        *self.vocab.entry(word.to_owned()).or_insert(0) += count;
    }

    fn ingest_dict_line(&mut self, line: &str) -> Result<()> {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (None, _, _) => Ok(()),
            (Some(word), Some(count), None) => {
                let count = count.parse::<u64>().map_err(|err| {
                    RtokError::Learner(format!("invalid count in dictionary line {line:?}: {err}"))
                })?;
                self.add_word(word, count);
                Ok(())
            }
            _ => Err(RtokError::Learner(format!(
                "dictionary lines must be `word count`, got {line:?}"
            ))),
        }
    }

    /// Runs BPE over the ingested words.
    pub fn learn_merges(&self) -> BpeArtifacts {
        let start = Instant::now();
        let mut table = SymbolTable::default();

        let mut entries: Vec<(&str, u64)> = self
            .vocab
            .iter()
            .map(|(word, &count)| (word.as_str(), count))
            .collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut words: Vec<Word> = entries
            .iter()
            .map(|&(word, count)| {
                let mut symbols: Vec<String> = word.chars().map(String::from).collect();
                if let Some(last) = symbols.last_mut() {
                    last.push_str(END_OF_WORD);
                }
                let ids = symbols.into_iter().map(|s| table.intern(&s)).collect();
                Word::new(ids, count)
            })
            .collect();

        let mut symbols = self.cfg.symbols;
        if self.cfg.total_symbols {
            let mut internal = BTreeSet::new();
            let mut finals = BTreeSet::new();
            for word in &words {
                if let Some((last, rest)) = word.symbols().split_last() {
                    internal.extend(rest.iter().copied());
                    finals.insert(*last);
                }
            }
            let reduction = internal.len() + finals.len();
            if self.cfg.verbose {
                info!(
                    "{} word-internal and {} word-final characters; reducing merges by {}",
                    internal.len(),
                    finals.len(),
                    reduction
                );
            }
            symbols = symbols.saturating_sub(reduction);
        }

        let mut pair_counts = compute_pair_counts(&words);
        let mut heap = BinaryHeap::with_capacity(pair_counts.len().max(1));
        for (&pair, &count) in &pair_counts {
            heap.push(PairScore::new(pair, count, &table));
        }

        let mut merges = Vec::with_capacity(symbols.min(65_536));
        let mut metrics = LearningMetrics::new(words.len(), symbols.min(16_384));

        while merges.len() < symbols {
            let iteration_start = Instant::now();
            let best = loop {
                match heap.pop() {
                    Some(score) => {
                        let current = pair_counts.get(&score.pair).copied().unwrap_or(0);
                        if current == 0 || current != score.frequency {
                            continue;
                        }
                        break Some(score);
                    }
                    None => break None,
                }
            };

            let Some(best) = best else {
                metrics.stop_reason = StopReason::NoPairsLeft;
                break;
            };
            if best.frequency < self.cfg.min_frequency {
                if self.cfg.verbose {
                    info!(
                        "no pair has frequency >= {}; stopping",
                        self.cfg.min_frequency
                    );
                }
                metrics.stop_reason = StopReason::BelowMinFrequency;
                break;
            }

            let merged = format!("{}{}", best.left, best.right);
            let replacement = table.intern(&merged);
            let outcome = words
                .par_iter_mut()
                .map(|word| word.merge(best.pair, replacement))
                .reduce(MergeOutcome::default, |mut acc, local| {
                    acc.absorb(local);
                    acc
                });
            for (pair, delta) in outcome.deltas {
                apply_delta(&mut pair_counts, &mut heap, &table, pair, delta);
            }

            let iteration = merges.len() + 1;
            if self.cfg.verbose {
                debug!(
                    "pair {}: {} {} -> {} (frequency {})",
                    iteration - 1,
                    best.left,
                    best.right,
                    merged,
                    best.frequency
                );
            }
            metrics.merges.push(MergeMetrics {
                iteration,
                frequency: best.frequency,
                distinct_pairs: pair_counts.len(),
                elapsed_iteration: iteration_start.elapsed(),
                elapsed_total: start.elapsed(),
                rss_kb: sample_rss_kb(),
            });
            merges.push((best.left.to_string(), best.right.to_string()));
        }

        metrics.total_duration = start.elapsed();
        if self.cfg.verbose {
            info!(
                "learned {} merges from {} words in {:.2?}",
                merges.len(),
                words.len(),
                metrics.total_duration
            );
        }
        BpeArtifacts { merges, metrics }
    }
}

impl BpeArtifacts {
    /// Writes the merges in the `#version: 0.2` format.
    pub fn write_to(&self, out: &mut dyn Write, description: Option<&str>) -> Result<()> {
        let io = |err| RtokError::io(err, None);
        writeln!(out, "#version: 0.2").map_err(io)?;
        write_description(out, description)?;
        for (left, right) in &self.merges {
            writeln!(out, "{left} {right}").map_err(io)?;
        }
        Ok(())
    }

    /// Builds an encoder from the learned merges.
    #[must_use]
    pub fn to_model(&self) -> Bpe {
        Bpe::from_merges(self.merges.iter().map(|(l, r)| (l.as_str(), r.as_str())))
    }
}

impl fmt::Display for BpeArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BPE model with {} merges", self.merges.len())?;
        writeln!(f, "Distinct words: {}", self.metrics.distinct_words)?;
        writeln!(f, "Stop reason: {:?}", self.metrics.stop_reason)?;
        writeln!(f, "Total duration: {:?}", self.metrics.total_duration)?;
        Ok(())
    }
}

impl SubwordLearner for BpeLearner {
    fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    fn ingest_token(&mut self, token: &str) {
        self.add_word(token, 1);
    }

    fn ingest_line(&mut self, line: &str) -> Result<()> {
        if self.cfg.dict_input {
            self.ingest_dict_line(line)
        } else {
            ingest_tokenized(self, line);
            Ok(())
        }
    }

    fn learn_to_writer(&mut self, out: &mut dyn Write, description: Option<&str>) -> Result<()> {
        if self.vocab.is_empty() {
            warn!("learning BPE from an empty corpus");
        }
        let artifacts = self.learn_merges();
        if self.cfg.verbose {
            info!("{artifacts}");
        }
        artifacts.write_to(out, description)?;
        self.metrics = Some(artifacts.metrics);
        Ok(())
    }
}

#[derive(Default)]
struct SymbolTable {
    names: Vec<Arc<str>>,
    ids: FxHashMap<Arc<str>, SymbolId>,
}

impl SymbolTable {
    fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = SymbolId::try_from(self.names.len()).unwrap_or(SymbolId::MAX);
        let name: Arc<str> = Arc::from(name);
        self.names.push(Arc::clone(&name));
        self.ids.insert(name, id);
        id
    }

    fn name(&self, id: SymbolId) -> Arc<str> {
        Arc::clone(&self.names[id as usize])
    }
}

/// Heap entry; the highest frequency wins, then the lexicographically smallest pair.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PairScore {
    frequency: u64,
    left: Arc<str>,
    right: Arc<str>,
    pair: Pair,
}

impl PairScore {
    fn new(pair: Pair, frequency: u64, table: &SymbolTable) -> Self {
        Self {
            frequency,
            left: table.name(pair.0),
            right: table.name(pair.1),
            pair,
        }
    }
}

impl Ord for PairScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.frequency.cmp(&other.frequency).then_with(|| {
            (&*other.left, &*other.right).cmp(&(&*self.left, &*self.right))
        })
    }
}

impl PartialOrd for PairScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compute_pair_counts(words: &[Word]) -> FxHashMap<Pair, u64> {
    words
        .par_iter()
        .map(|word| {
            let mut local = FxHashMap::default();
            word.for_each_pair(|pair| *local.entry(pair).or_insert(0) += word.count());
            local
        })
        .reduce(FxHashMap::default, |mut acc, local| {
            for (pair, count) in local {
                *acc.entry(pair).or_insert(0) += count;
            }
            acc
        })
}

fn apply_delta(
    pair_counts: &mut FxHashMap<Pair, u64>,
    heap: &mut BinaryHeap<PairScore>,
    table: &SymbolTable,
    pair: Pair,
    delta: i64,
) {
    match delta.cmp(&0) {
        Ordering::Greater => {
            let count = pair_counts.entry(pair).or_insert(0);
            *count += delta.unsigned_abs();
            heap.push(PairScore::new(pair, *count, table));
        }
        Ordering::Less => {
            if let Entry::Occupied(mut occupied) = pair_counts.entry(pair) {
                let remaining = occupied.get().saturating_sub(delta.unsigned_abs());
                if remaining == 0 {
                    occupied.remove();
                } else {
                    *occupied.get_mut() = remaining;
                    heap.push(PairScore::new(pair, remaining, table));
                }
            }
        }
        Ordering::Equal => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn learner(symbols: usize, min_frequency: u64) -> BpeLearner {
        let cfg = BpeLearnerConfig::builder()
            .symbols(symbols)
            .min_frequency(min_frequency)
            .build()
            .unwrap();
        BpeLearner::new(cfg, None).unwrap()
    }

    fn learned(learner: &mut BpeLearner) -> String {
        let mut out = Vec::new();
        learner.learn_to_writer(&mut out, None).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn ties_prefer_the_smallest_pair() {
        let mut learner = learner(2, 1);
        learner.ingest_text("hello world").unwrap();
        assert_eq!(learned(&mut learner), "#version: 0.2\ne l\nel l\n");
    }

    #[test]
    fn most_frequent_pair_wins() {
        let mut learner = learner(10, 2);
        learner.ingest_text("low low low lower newest newest").unwrap();
        let artifacts = learner.learn_merges();
        assert_eq!(artifacts.merges[0], ("l".to_owned(), "o".to_owned()));
        assert_eq!(artifacts.merges[1], ("lo".to_owned(), "w</w>".to_owned()));
        assert_eq!(artifacts.merges[2], ("w".to_owned(), "e".to_owned()));
        assert_eq!(artifacts.merges.len(), 7);
        assert_eq!(artifacts.metrics.stop_reason, StopReason::BelowMinFrequency);

        let model = artifacts.to_model();
        assert_eq!(model.encode("low", 0.0, &mut rand::thread_rng()), vec!["low"]);
    }

    #[test]
    fn stops_after_requested_symbols() {
        let mut learner = learner(1, 1);
        learner.ingest_text("aaaa aaaa").unwrap();
        let artifacts = learner.learn_merges();
        assert_eq!(artifacts.merges, vec![("a".to_owned(), "a".to_owned())]);
        assert_eq!(artifacts.metrics.stop_reason, StopReason::SymbolsReached);
    }

    #[test]
    fn exhausted_words_stop_learning() {
        let mut learner = learner(100, 1);
        learner.ingest_text("ab").unwrap();
        let artifacts = learner.learn_merges();
        assert_eq!(artifacts.merges, vec![("a".to_owned(), "b</w>".to_owned())]);
        assert_eq!(artifacts.metrics.stop_reason, StopReason::NoPairsLeft);
    }

    #[test]
    fn dictionary_input_reads_counts() {
        let cfg = BpeLearnerConfig::builder()
            .symbols(1)
            .min_frequency(1)
            .dict_input(true)
            .build()
            .unwrap();
        let mut learner = BpeLearner::new(cfg, None).unwrap();
        learner.ingest_text("ab 1\ncd 5\n\nab 1").unwrap();
        assert_eq!(learner.word_count("cd"), 5);
        assert_eq!(learner.word_count("ab"), 2);
        assert_eq!(learned(&mut learner), "#version: 0.2\nc d</w>\n");

        let err = learner.ingest_line("ab").expect_err("missing count");
        assert!(matches!(err, RtokError::Learner(_)));
        let err = learner.ingest_line("ab x").expect_err("bad count");
        assert!(matches!(err, RtokError::Learner(_)));
    }

    #[test]
    fn total_symbols_reduces_the_budget() {
        let cfg = BpeLearnerConfig::builder()
            .symbols(4)
            .min_frequency(1)
            .total_symbols(true)
            .build()
            .unwrap();
        let mut learner = BpeLearner::new(cfg, None).unwrap();
        learner.ingest_text("abc").unwrap();
        // internal {a, b} and final {c</w>} leave a single merge
        assert_eq!(learner.learn_merges().merges.len(), 1);
    }

    #[test]
    fn placeholders_are_not_ingested() {
        let mut learner = learner(10, 1);
        learner.ingest_text("｟tag｠ word").unwrap();
        assert_eq!(learner.distinct_words(), 1);
        assert_eq!(learner.word_count("word"), 1);
    }

    #[test]
    fn learns_to_file_with_description() {
        let dir = tempdir().unwrap();
        let corpus = dir.path().join("corpus.txt");
        std::fs::write(&corpus, "abab abab\nab\n").unwrap();
        let model_path = dir.path().join("codes.bpe");

        let mut learner = learner(2, 1);
        learner.ingest_file(&corpus).unwrap();
        learner.learn(&model_path, Some("toy model")).unwrap();

        let written = std::fs::read_to_string(&model_path).unwrap();
        assert_eq!(written, "#version: 0.2\n# toy model\na b</w>\na b\n");
        let model = Bpe::from_file(&model_path).unwrap();
        assert_eq!(model.len(), 2);
        assert!(learner.last_metrics().is_some());
    }
}
