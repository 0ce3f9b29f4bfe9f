//! Metrics describing a BPE learning run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reason a learning run terminated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// The requested number of merges was learned.
    SymbolsReached,
    /// The most frequent remaining pair fell below the minimum frequency.
    BelowMinFrequency,
    /// Every word was reduced to a single symbol.
    NoPairsLeft,
}

/// Snapshot captured after each merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeMetrics {
    /// Sequential merge number (1-indexed).
    pub iteration: usize,
    /// Frequency of the merged pair.
    pub frequency: u64,
    /// Count of distinct pairs remaining after the merge.
    pub distinct_pairs: usize,
    /// Execution time of the merge.
    pub elapsed_iteration: Duration,
    /// Total time elapsed since learning started.
    pub elapsed_total: Duration,
    /// Resident set size sample captured from `/proc/self/status` on Linux.
    pub rss_kb: Option<usize>,
}

/// Aggregate metrics of a learning run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningMetrics {
    /// Distinct words in the corpus.
    pub distinct_words: usize,
    /// Per-merge snapshots.
    pub merges: Vec<MergeMetrics>,
    /// Total duration of the run.
    pub total_duration: Duration,
    /// Reason learning terminated.
    pub stop_reason: StopReason,
}

impl LearningMetrics {
    /// Creates an empty container with pre-allocated capacity.
    #[must_use]
    pub fn new(distinct_words: usize, capacity: usize) -> Self {
        Self {
            distinct_words,
            merges: Vec::with_capacity(capacity),
            total_duration: Duration::ZERO,
            stop_reason: StopReason::SymbolsReached,
        }
    }
}

#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .find_map(|line| {
            line.strip_prefix("VmRSS:")?
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok())
        })
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<usize> {
    None
}

/// Samples the current resident set size on supported platforms.
pub fn sample_rss_kb() -> Option<usize> {
    current_rss_kb()
}
