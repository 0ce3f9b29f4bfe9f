//! The tokenizer façade: segmentation, casing, subword encoding, and annotation.

use std::collections::BTreeMap;

use rand::{thread_rng, Rng};
use rayon::prelude::*;

use crate::annotation::{parse_tokens, serialize_tokens};
use crate::casing::restore_token_casing;
use crate::config::TokenizerOptions;
use crate::error::Result;
use crate::segmenter::{escape_whitespace, unescape_characters, AlphabetCounts, Segmenter};
use crate::subword::{Regularization, SubwordEncoder};
use crate::token::{Casing, Token, FEATURE_MARKER};

/// Inclusive `(start, end)` spans keyed by token index.
pub type Ranges = BTreeMap<usize, (usize, usize)>;

/// Tokens in their string form: words plus feature columns aligned with them.
pub type Words = (Vec<String>, Vec<Vec<String>>);

/// Reversible tokenizer built from [`TokenizerOptions`] and an optional subword model.
///
/// A tokenizer is immutable and can be shared across threads; subword models are reference
/// counted so clones are cheap.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    options: TokenizerOptions,
    segmenter: Segmenter,
    subword: Option<SubwordEncoder>,
    regularization: Regularization,
}

impl Tokenizer {
    /// Builds a tokenizer, loading the subword model and vocabulary named in `options`.
    pub fn new(options: TokenizerOptions) -> Result<Self> {
        let options = options.normalized()?;
        let subword = SubwordEncoder::from_options(&options)?;
        Self::assemble(options, subword)
    }

    /// Builds a tokenizer around an already loaded subword model. Model paths in `options` are
    /// ignored.
    pub fn with_subword_encoder(
        options: TokenizerOptions,
        encoder: impl Into<SubwordEncoder>,
    ) -> Result<Self> {
        let options = options.normalized()?;
        Self::assemble(options, Some(encoder.into()))
    }

    fn assemble(mut options: TokenizerOptions, subword: Option<SubwordEncoder>) -> Result<Self> {
        if let Some(encoder) = &subword {
            encoder.adjust_options(&mut options);
        }
        let segmenter = Segmenter::new(&options)?;
        let regularization = Regularization::from_options(&options);
        Ok(Self {
            options,
            segmenter,
            subword,
            regularization,
        })
    }

    /// Effective options, after normalization.
    #[must_use]
    pub fn options(&self) -> &TokenizerOptions {
        &self.options
    }

    /// The attached subword model, if any.
    #[must_use]
    pub fn subword_encoder(&self) -> Option<&SubwordEncoder> {
        self.subword.as_ref()
    }

    fn run<R: Rng + ?Sized>(
        &self,
        text: &str,
        training: bool,
        rng: &mut R,
        alphabets: Option<&mut AlphabetCounts>,
    ) -> Vec<Token> {
        let mut tokens = match alphabets {
            Some(counts) => self.segmenter.segment_with_alphabets(text, counts),
            None => self.segmenter.segment(text),
        };

        if self.options.case_feature || self.options.case_markup {
            tokens.iter_mut().for_each(Token::lowercase);
        } else {
            for token in &mut tokens {
                token.casing = Casing::None;
            }
        }

        if let Some(encoder) = &self.subword {
            tokens = encoder.encode_and_annotate(tokens, &self.regularization, training, rng);
        }

        if let Some(first) = tokens.first_mut() {
            first.join_left = false;
        }
        if let Some(last) = tokens.last_mut() {
            last.join_right = false;
        }
        tokens
    }

    /// Tokenizes `text` into annotated tokens, applying subword regularization when configured.
    #[must_use]
    pub fn tokenize_to_tokens(&self, text: &str) -> Vec<Token> {
        self.run(text, true, &mut thread_rng(), None)
    }

    /// Tokenizes `text` with an explicit random generator. With `training` unset, subword
    /// regularization is disabled and the output is deterministic.
    pub fn tokenize_with_rng<R: Rng + ?Sized>(
        &self,
        text: &str,
        training: bool,
        rng: &mut R,
    ) -> Vec<Token> {
        self.run(text, training, rng, None)
    }

    /// Tokenizes `text` into words and feature columns.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Words {
        self.serialize_tokens(&self.tokenize_to_tokens(text))
    }

    /// Tokenizes `text` and counts the characters seen per script.
    #[must_use]
    pub fn tokenize_with_alphabets(&self, text: &str, alphabets: &mut AlphabetCounts) -> Words {
        let tokens = self.run(text, true, &mut thread_rng(), Some(alphabets));
        self.serialize_tokens(&tokens)
    }

    /// Tokenizes each text in parallel, preserving order.
    #[must_use]
    pub fn tokenize_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<Vec<Token>> {
        texts
            .par_iter()
            .map(|text| self.tokenize_to_tokens(text.as_ref()))
            .collect()
    }

    /// Tokenizes `text` into a single line: words separated by a space, features appended to
    /// each word with `￨`.
    #[must_use]
    pub fn tokenize_str(&self, text: &str) -> String {
        let (words, features) = self.tokenize(text);
        join_words(&words, &features, " ")
    }

    /// Materializes tokens as words and feature columns.
    #[must_use]
    pub fn serialize_tokens(&self, tokens: &[Token]) -> Words {
        serialize_tokens(tokens, &self.options)
    }

    /// Reads words and feature columns back into tokens.
    ///
    /// Standalone markers are folded into their neighbours. With a subword model attached, the
    /// text is rebuilt and tokenized again without regularization so that subword types and
    /// preservation flags are recovered.
    pub fn deserialize_tokens<S: AsRef<str>>(
        &self,
        words: &[S],
        features: &[Vec<String>],
    ) -> Result<Vec<Token>> {
        let parsed = parse_tokens(words, features, &self.options)?;

        if self.subword.is_some() {
            let text = self.detokenize(&parsed.tokens);
            let mut tokens = self.run(&text, false, &mut thread_rng(), None);
            let sources: Vec<&Token> = parsed.tokens.iter().filter(|t| !t.is_empty()).collect();
            if sources.len() == tokens.len() && sources.iter().any(|t| t.has_features()) {
                for (token, source) in tokens.iter_mut().zip(sources) {
                    token.features.clone_from(&source.features);
                }
            }
            return Ok(tokens);
        }

        Ok(fold_markers(parsed.tokens))
    }

    /// Rebuilds text from tokens.
    #[must_use]
    pub fn detokenize(&self, tokens: &[Token]) -> String {
        self.detokenize_impl(tokens, None, None)
    }

    /// Rebuilds text from tokens and reports the span of each non-empty token.
    ///
    /// Spans are byte offsets, or character offsets with `unicode_ranges`. With `merge_ranges`,
    /// contiguous spans forming a single word are merged and shared by all their tokens.
    #[must_use]
    pub fn detokenize_with_ranges(
        &self,
        tokens: &[Token],
        unicode_ranges: bool,
        merge_ranges: bool,
    ) -> (String, Ranges) {
        let mut ranges = Ranges::new();
        let text = self.detokenize_impl(tokens, Some(&mut ranges), None);
        finish_ranges(text, ranges, unicode_ranges, merge_ranges)
    }

    /// Rebuilds text from words and feature columns.
    pub fn detokenize_words<S: AsRef<str>>(
        &self,
        words: &[S],
        features: &[Vec<String>],
    ) -> Result<String> {
        let parsed = parse_tokens(words, features, &self.options)?;
        Ok(self.detokenize_impl(&parsed.tokens, None, None))
    }

    /// Rebuilds text from words and reports spans keyed by word index.
    pub fn detokenize_words_with_ranges<S: AsRef<str>>(
        &self,
        words: &[S],
        features: &[Vec<String>],
        unicode_ranges: bool,
        merge_ranges: bool,
    ) -> Result<(String, Ranges)> {
        let parsed = parse_tokens(words, features, &self.options)?;
        let mut ranges = Ranges::new();
        let text = self.detokenize_impl(&parsed.tokens, Some(&mut ranges), Some(&parsed.index_map));
        Ok(finish_ranges(text, ranges, unicode_ranges, merge_ranges))
    }

    /// Detokenizes each token list in parallel, preserving order.
    #[must_use]
    pub fn detokenize_batch(&self, batch: &[Vec<Token>]) -> Vec<String> {
        batch.par_iter().map(|tokens| self.detokenize(tokens)).collect()
    }

    /// Detokenizes a line produced by [`Tokenizer::tokenize_str`].
    pub fn detokenize_str(&self, line: &str) -> Result<String> {
        let (words, features) = split_words(line, " ");
        self.detokenize_words(&words, &features)
    }

    fn detokenize_impl(
        &self,
        tokens: &[Token],
        mut ranges: Option<&mut Ranges>,
        index_map: Option<&[usize]>,
    ) -> String {
        let mut line = String::with_capacity(tokens.len() * 8);
        let spaced = !self.options.with_separators;

        for (i, token) in tokens.iter().enumerate() {
            if spaced && i > 0 && !tokens[i - 1].join_right && !token.join_left {
                line.push(' ');
            }

            let word = if token.is_placeholder() {
                token.surface.clone()
            } else {
                let recased = match token.casing {
                    Casing::None | Casing::Lowercase => token.surface.clone(),
                    casing => restore_token_casing(&token.surface, casing),
                };
                unescape_characters(&recased)
            };

            if word.is_empty() {
                continue;
            }
            if let Some(ranges) = ranges.as_deref_mut() {
                let index = index_map.and_then(|map| map.get(i).copied()).unwrap_or(i);
                ranges.insert(index, (line.len(), line.len() + word.len() - 1));
            }
            line.push_str(&word);
        }
        line
    }
}

fn finish_ranges(
    text: String,
    ranges: Ranges,
    unicode_ranges: bool,
    merge_ranges: bool,
) -> (String, Ranges) {
    let ranges = if merge_ranges {
        merge_consecutive_ranges(&text, &ranges)
    } else {
        ranges
    };
    let ranges = if unicode_ranges {
        ranges
            .into_iter()
            .map(|(index, (start, end))| {
                let prefix = text[..start].chars().count();
                let length = text[start..=end].chars().count();
                (index, (prefix, prefix + length - 1))
            })
            .collect()
    } else {
        ranges
    };
    (text, ranges)
}

// Contiguous spans are merged unless a conservative segmentation of the joined text splits it.
fn merge_consecutive_ranges(text: &str, ranges: &Ranges) -> Ranges {
    let segmenter = Segmenter::conservative();
    let mut merged = Ranges::new();
    let mut group: Vec<usize> = Vec::new();
    let mut start = 0usize;
    let mut end: Option<usize> = None;
    let mut previous: Option<(usize, usize)> = None;

    for (&index, &range) in ranges {
        let mut split = end.map_or(true, |end| range.0 != end + 1);
        if !split {
            if let Some(prev) = previous {
                split = segmenter.segment(&text[prev.0..=range.1]).len() > 1;
            }
        }

        if split {
            if let Some(end) = end {
                for id in group.drain(..) {
                    merged.insert(id, (start, end));
                }
            }
            start = range.0;
        }

        end = Some(range.1);
        previous = Some(range);
        group.push(index);
    }

    if let Some(end) = end {
        for id in group {
            merged.insert(id, (start, end));
        }
    }
    merged
}

// Standalone joiners glue their neighbours; standalone spacers separate them.
fn fold_markers(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut pending_join_left: Option<bool> = None;

    for mut token in tokens {
        if token.is_empty() {
            if token.join_right {
                if let Some(previous) = out.last_mut() {
                    previous.join_right = true;
                }
            }
            pending_join_left = Some(token.join_left);
            continue;
        }
        if let Some(join_left) = pending_join_left.take() {
            token.join_left = join_left;
        }
        out.push(token);
    }

    if let Some(first) = out.first_mut() {
        first.join_left = false;
    }
    if let Some(last) = out.last_mut() {
        last.join_right = false;
    }
    out
}

/// Joins words with `delimiter`, appending each feature column with `￨`.
///
/// Whitespace inside a word, such as a separator token, is written as a `％XXXX` escape which
/// detokenization reads back.
#[must_use]
pub fn join_words(words: &[String], features: &[Vec<String>], delimiter: &str) -> String {
    let mut line = String::new();
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            line.push_str(delimiter);
        }
        line.push_str(&escape_whitespace(word));
        for column in features {
            line.push_str(FEATURE_MARKER);
            if let Some(value) = column.get(i) {
                line.push_str(value);
            }
        }
    }
    line
}

/// Splits a line produced by [`join_words`] into words and feature columns.
#[must_use]
pub fn split_words(line: &str, delimiter: &str) -> Words {
    let mut words = Vec::new();
    let mut features: Vec<Vec<String>> = Vec::new();
    for chunk in line.split(delimiter).filter(|chunk| !chunk.is_empty()) {
        let mut fields = chunk.split(FEATURE_MARKER);
        words.push(fields.next().unwrap_or_default().to_owned());
        for (j, value) in fields.enumerate() {
            if features.len() <= j {
                features.push(Vec::new());
            }
            features[j].push(value.to_owned());
        }
    }
    (words, features)
}
