//! Byte-pair encoding over characters, driven by a ranked merge table.

use std::fs;
use std::path::Path;

use log::debug;
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::casing::lowercase_token;
use crate::error::{Result, RtokError};
use crate::unicode::{explode_with_marks, to_lower};

/// Default end-of-word marker.
pub const END_OF_WORD: &str = "</w>";
/// Default begin-of-word marker of legacy models.
pub const BEGIN_OF_WORD: &str = "<w>";

/// Layout of the merge file, which decides where the end-of-word marker lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpeFormat {
    /// `#version: 0.1` or no header: the marker is a symbol of its own.
    V01,
    /// `#version: 0.2`: the marker is glued to the last character.
    V02,
    /// `v3;prefix;suffix;case_insensitive;begin;end` header.
    Legacy {
        /// Begin-of-word marker is inserted as a symbol.
        prefix: bool,
        /// End-of-word marker is appended as a symbol.
        suffix: bool,
    },
}

/// A loaded BPE model.
#[derive(Debug, Clone)]
pub struct Bpe {
    format: BpeFormat,
    begin_of_word: String,
    end_of_word: String,
    case_insensitive: bool,
    codes: FxHashMap<String, usize>,
    codes_reverse: FxHashMap<String, (String, String)>,
    vocabulary: FxHashSet<String>,
    vocabulary_joiner: String,
}

impl Bpe {
    /// Loads a merge file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| {
            RtokError::model_load(path, format!("unable to open BPE model: {err}"))
        })?;
        let model = Self::parse(&content).map_err(|reason| RtokError::model_load(path, reason))?;
        debug!("loaded BPE model {path:?} with {} merges", model.len());
        Ok(model)
    }

    /// Builds a version 0.2 model from merges in application order.
    pub fn from_merges<I, L, R>(merges: I) -> Self
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        let mut model = Self::empty(BpeFormat::V02);
        for (left, right) in merges {
            model.add_merge(left.into(), right.into());
        }
        model
    }

    fn empty(format: BpeFormat) -> Self {
        Self {
            format,
            begin_of_word: BEGIN_OF_WORD.to_owned(),
            end_of_word: END_OF_WORD.to_owned(),
            case_insensitive: false,
            codes: FxHashMap::default(),
            codes_reverse: FxHashMap::default(),
            vocabulary: FxHashSet::default(),
            vocabulary_joiner: String::new(),
        }
    }

    fn add_merge(&mut self, left: String, right: String) {
        let pair = format!("{left}{right}");
        let rank = self.codes.len();
        self.codes.entry(pair.clone()).or_insert(rank);
        self.codes_reverse.entry(pair).or_insert((left, right));
    }

    /// Parses the content of a merge file.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut lines = content.lines().peekable();
        let first = lines.peek().copied().unwrap_or_default();

        let mut model = if let Some(version) = first.strip_prefix("#version:") {
            let format = match version.trim() {
                "0.1" => BpeFormat::V01,
                "0.2" => BpeFormat::V02,
                other => return Err(format!("unsupported BPE version {other}")),
            };
            lines.next();
            Self::empty(format)
        } else {
            let fields: Vec<&str> = first.split(';').collect();
            if fields.len() == 6 && fields[0] == "v3" {
                lines.next();
                let mut model = Self::empty(BpeFormat::Legacy {
                    prefix: fields[1] == "true",
                    suffix: fields[2] == "true",
                });
                model.case_insensitive = fields[3] == "true";
                model.begin_of_word = fields[4].to_owned();
                model.end_of_word = fields[5].to_owned();
                model
            } else {
                Self::empty(BpeFormat::V01)
            }
        };

        let mut header = true;
        for (number, line) in lines.enumerate() {
            if header && line.starts_with('#') {
                continue;
            }
            header = false;
            if line.is_empty() {
                continue;
            }
            match line.split_once(' ') {
                Some((left, right)) if !left.is_empty() && !right.is_empty() && !right.contains(' ') => {
                    model.add_merge(left.to_owned(), right.to_owned());
                }
                _ => return Err(format!("invalid merge on line {}: {line:?}", number + 2)),
            }
        }
        Ok(model)
    }

    /// Number of distinct merges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns `true` when the model has no merges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Merge file layout.
    #[must_use]
    pub fn format(&self) -> BpeFormat {
        self.format
    }

    /// Whether merges are matched on lowercased input.
    #[must_use]
    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Restricts the output to `vocabulary`. Non-final pieces are looked up with `joiner`
    /// appended; pieces outside the vocabulary are split by reverting merges.
    #[must_use]
    pub fn with_vocabulary<I, S>(mut self, vocabulary: I, joiner: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vocabulary = vocabulary.into_iter().map(Into::into).collect();
        self.vocabulary_joiner = joiner.into();
        self
    }

    fn rank(&self, left: &str, right: &str) -> Option<usize> {
        let mut pair = String::with_capacity(left.len() + right.len());
        pair.push_str(left);
        pair.push_str(right);
        self.codes.get(&pair).copied()
    }

    /// Splits `word` into pieces. Each candidate merge is skipped with probability `dropout`.
    pub fn encode<R: Rng + ?Sized>(&self, word: &str, dropout: f32, rng: &mut R) -> Vec<String> {
        let lowered;
        let source = if self.case_insensitive {
            lowered = lowercase_token(word).0;
            lowered.as_str()
        } else {
            word
        };

        let mut symbols: Vec<String> = explode_with_marks(source)
            .into_iter()
            .map(str::to_owned)
            .collect();
        if symbols.len() <= 1 {
            return vec![word.to_owned()];
        }

        let mut prefix = false;
        match self.format {
            BpeFormat::V01 => symbols.push(self.end_of_word.clone()),
            BpeFormat::V02 => {
                if let Some(last) = symbols.last_mut() {
                    last.push_str(&self.end_of_word);
                }
            }
            BpeFormat::Legacy {
                prefix: with_prefix,
                suffix,
            } => {
                prefix = with_prefix;
                if with_prefix {
                    symbols.insert(0, self.begin_of_word.clone());
                }
                if suffix {
                    symbols.push(self.end_of_word.clone());
                }
            }
        }

        self.apply_merges(&mut symbols, dropout, rng);
        self.strip_markers(&mut symbols, prefix);

        if self.case_insensitive {
            symbols = restore_true_case(word, &symbols);
        }

        if self.vocabulary.is_empty() {
            symbols
        } else {
            self.check_vocabulary_and_split(&symbols)
        }
    }

    fn apply_merges<R: Rng + ?Sized>(&self, symbols: &mut Vec<String>, dropout: f32, rng: &mut R) {
        let mut ranks: Vec<Option<usize>> = symbols
            .windows(2)
            .map(|pair| self.rank(&pair[0], &pair[1]))
            .collect();

        loop {
            let mut best: Option<(usize, usize)> = None;
            for (index, rank) in ranks.iter().enumerate() {
                if dropout > 0.0 && rng.gen::<f32>() < dropout {
                    continue;
                }
                if let Some(rank) = *rank {
                    if best.map_or(true, |(best_rank, _)| rank < best_rank) {
                        best = Some((rank, index));
                    }
                }
            }
            let Some((_, index)) = best else {
                break;
            };

            let right = symbols.remove(index + 1);
            symbols[index].push_str(&right);
            if symbols.len() == 1 {
                break;
            }

            ranks.remove(index);
            if index > 0 {
                ranks[index - 1] = self.rank(&symbols[index - 1], &symbols[index]);
            }
            if index < ranks.len() {
                ranks[index] = self.rank(&symbols[index], &symbols[index + 1]);
            }
        }
    }

    fn strip_markers(&self, symbols: &mut Vec<String>, prefix: bool) {
        if prefix {
            if let Some(first) = symbols.first_mut() {
                if *first == self.begin_of_word {
                    symbols.remove(0);
                } else if first.starts_with(&self.begin_of_word) {
                    first.drain(..self.begin_of_word.len());
                }
            }
        }
        if let Some(last) = symbols.last_mut() {
            if *last == self.end_of_word {
                symbols.pop();
            } else if last.len() > self.end_of_word.len() && last.ends_with(&self.end_of_word) {
                last.truncate(last.len() - self.end_of_word.len());
            }
        }
    }

    fn in_vocabulary(&self, segment: &str, is_final: bool) -> bool {
        if is_final {
            self.vocabulary.contains(segment)
        } else {
            self.vocabulary
                .contains(&format!("{segment}{}", self.vocabulary_joiner))
        }
    }

    fn check_vocabulary_and_split(&self, pieces: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(pieces.len());
        for (index, segment) in pieces.iter().enumerate() {
            let is_final = index + 1 == pieces.len();
            if self.in_vocabulary(segment, is_final) {
                out.push(segment.clone());
            } else {
                self.recursive_split(segment, is_final, &mut out);
            }
        }
        out
    }

    fn recursive_split(&self, segment: &str, is_final: bool, out: &mut Vec<String>) {
        let key = if is_final {
            format!("{segment}{}", self.end_of_word)
        } else {
            segment.to_owned()
        };
        let Some((left, right)) = self.codes_reverse.get(&key) else {
            out.push(segment.to_owned());
            return;
        };

        let right = if is_final {
            right.strip_suffix(self.end_of_word.as_str()).unwrap_or(right)
        } else {
            right.as_str()
        };

        if self.in_vocabulary(left, false) {
            out.push(left.clone());
        } else {
            self.recursive_split(left, false, out);
        }
        if self.in_vocabulary(right, is_final) {
            out.push(right.to_owned());
        } else {
            self.recursive_split(right, is_final, out);
        }
    }
}

// Maps lowercase pieces back onto the characters of the original word.
fn restore_true_case(word: &str, pieces: &[String]) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut index = 0;
    pieces
        .iter()
        .map(|piece| {
            let mut restored = String::new();
            let mut length = 0;
            while index < chars.len() && length < piece.len() {
                length += to_lower(chars[index]).len_utf8();
                restored.push(chars[index]);
                index += 1;
            }
            restored
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn encode(model: &Bpe, word: &str) -> Vec<String> {
        model.encode(word, 0.0, &mut StdRng::seed_from_u64(0))
    }

    #[test]
    fn applies_lowest_rank_merges() {
        let model = Bpe::parse("#version: 0.2\ne l\nel l\nh ell\nl o\nhell o</w>\n").unwrap();
        assert_eq!(model.format(), BpeFormat::V02);
        assert_eq!(encode(&model, "hello"), vec!["hello"]);
        assert_eq!(encode(&model, "yellow"), vec!["y", "ell", "o", "w"]);
        assert_eq!(encode(&model, "a"), vec!["a"]);
    }

    #[test]
    fn version_one_uses_a_separate_end_marker() {
        let model = Bpe::parse("#version: 0.1\nl o\nlo </w>\n").unwrap();
        assert_eq!(model.format(), BpeFormat::V01);
        assert_eq!(encode(&model, "lo"), vec!["lo"]);
        assert_eq!(encode(&model, "low"), vec!["lo", "w"]);

        let headerless = Bpe::parse("l o\nlo </w>\n").unwrap();
        assert_eq!(headerless.format(), BpeFormat::V01);
        assert_eq!(encode(&headerless, "lo"), vec!["lo"]);
    }

    #[test]
    fn legacy_header_is_read() {
        let model = Bpe::parse("v3;true;true;true;<w>;</w>\n<w> h\n<w>h i\n").unwrap();
        assert!(model.is_case_insensitive());
        assert_eq!(encode(&model, "Hi"), vec!["Hi"]);
        assert_eq!(encode(&model, "HIT"), vec!["HI", "T"]);
    }

    #[test]
    fn rejects_malformed_models() {
        assert!(Bpe::parse("#version: 0.3\na b\n").is_err());
        assert!(Bpe::parse("#version: 0.2\nab\n").is_err());
    }

    #[test]
    fn duplicate_merges_keep_their_first_rank() {
        let model = Bpe::parse("#version: 0.2\na b\nb c\na b\n").unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(model.rank("a", "b"), Some(0));
    }

    #[test]
    fn full_dropout_prevents_merges() {
        let model = Bpe::parse("#version: 0.2\ne l\nel l\n").unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(model.encode("ell", 0.999_999, &mut rng), vec!["e", "l", "l"]);
        let sampled: FxHashSet<Vec<String>> =
            (0..64).map(|_| model.encode("ell", 0.5, &mut rng)).collect();
        assert!(sampled.len() > 1);
    }

    #[test]
    fn vocabulary_restriction_reverts_merges() {
        let model = Bpe::parse("#version: 0.2\ne l\nel l</w>\n")
            .unwrap()
            .with_vocabulary(["e￭", "l", "l￭"], "￭");
        assert_eq!(encode(&model, "ell"), vec!["e", "l", "l"]);
    }
}
