//! Token vocabulary with frequencies, built from tokenized text.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ahash::AHashMap;

use crate::error::{Result, RtokError};
use crate::stream::for_each_line;
use crate::tokenizer::Tokenizer;

/// Token returned for out-of-range identifiers and used as the default lookup target.
pub const UNK_TOKEN: &str = "<unk>";

/// Ordered token inventory.
///
/// Identifiers follow insertion order until [`Vocab::resize`] reorders tokens by frequency.
/// Special tokens are pinned at the maximum frequency so they survive any resize.
#[derive(Debug, Clone, Default)]
pub struct Vocab {
    ids: AHashMap<String, usize>,
    tokens: Vec<String>,
    frequencies: Vec<u64>,
    default_id: Option<usize>,
}

impl Vocab {
    /// Creates a vocabulary starting with `special_tokens`.
    pub fn new<I, S>(special_tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::default();
        for token in special_tokens {
            vocab.add_token(token);
        }
        vocab.frequencies.fill(u64::MAX);
        vocab
    }

    /// Adds one occurrence of `token`.
    pub fn add_token(&mut self, token: impl Into<String>) {
        let token = token.into();
        if let Some(&id) = self.ids.get(&token) {
            self.frequencies[id] = self.frequencies[id].saturating_add(1);
            return;
        }
        let id = self.tokens.len();
        self.ids.insert(token.clone(), id);
        self.tokens.push(token);
        self.frequencies.push(1);
    }

    /// Adds the tokens of `text`. Without a tokenizer, `text` is split on single spaces.
    pub fn add_from_text(&mut self, text: &str, tokenizer: Option<&Tokenizer>) {
        match tokenizer {
            Some(tokenizer) => {
                let (words, _) = tokenizer.tokenize(text);
                for word in words {
                    self.add_token(word);
                }
            }
            None => {
                for word in text.split(' ').filter(|word| !word.is_empty()) {
                    self.add_token(word);
                }
            }
        }
    }

    /// Adds the tokens of every line read from `reader`.
    pub fn add_from_reader(
        &mut self,
        reader: &mut dyn BufRead,
        tokenizer: Option<&Tokenizer>,
    ) -> Result<()> {
        for_each_line(reader, |line| {
            self.add_from_text(line, tokenizer);
            Ok(())
        })
    }

    /// Identifier of `token`, or the default identifier when it is unknown.
    #[must_use]
    pub fn lookup_token(&self, token: &str) -> usize {
        self.ids
            .get(token)
            .copied()
            .unwrap_or_else(|| self.default_id())
    }

    /// Token with identifier `id`, or [`UNK_TOKEN`] when out of range.
    #[must_use]
    pub fn lookup_id(&self, id: usize) -> &str {
        self.tokens.get(id).map_or(UNK_TOKEN, String::as_str)
    }

    /// Returns `true` when `token` is in the vocabulary.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` when the vocabulary has no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Recorded frequency of `token`; zero when unknown.
    #[must_use]
    pub fn frequency(&self, token: &str) -> u64 {
        self.ids.get(token).map_or(0, |&id| self.frequencies[id])
    }

    /// Tokens in identifier order.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Identifier returned for unknown tokens: the explicit default if set, otherwise the
    /// identifier of [`UNK_TOKEN`], otherwise the vocabulary size.
    #[must_use]
    pub fn default_id(&self) -> usize {
        self.default_id
            .or_else(|| self.ids.get(UNK_TOKEN).copied())
            .unwrap_or(self.tokens.len())
    }

    /// Overrides the identifier returned for unknown tokens.
    pub fn set_default_id(&mut self, id: usize) {
        self.default_id = Some(id);
    }

    /// Keeps at most `maximum_size` tokens (`0` means no limit) seen at least
    /// `minimum_frequency` times, reordering identifiers by decreasing frequency. Ties keep
    /// their current order. Special tokens are always kept, even beyond `maximum_size`.
    pub fn resize(&mut self, maximum_size: usize, minimum_frequency: u64) {
        if maximum_size == 0 && minimum_frequency <= 1 {
            return;
        }
        let specials = self
            .frequencies
            .iter()
            .take_while(|&&frequency| frequency == u64::MAX)
            .count();

        let mut order: Vec<usize> = (0..self.tokens.len()).collect();
        order.sort_by(|&a, &b| self.frequencies[b].cmp(&self.frequencies[a]));
        order.retain(|&id| self.frequencies[id] >= minimum_frequency);
        if maximum_size > 0 {
            order.truncate(maximum_size.max(specials));
        }

        let mut tokens = std::mem::take(&mut self.tokens);
        let frequencies = std::mem::take(&mut self.frequencies);
        self.ids.clear();
        for (new_id, old_id) in order.into_iter().enumerate() {
            let token = std::mem::take(&mut tokens[old_id]);
            self.ids.insert(token.clone(), new_id);
            self.tokens.push(token);
            self.frequencies.push(frequencies[old_id]);
        }
    }

    /// Writes one token per line.
    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        for token in &self.tokens {
            writeln!(out, "{token}").map_err(|err| RtokError::io(err, None))?;
        }
        Ok(())
    }

    /// Writes the vocabulary to `path`, one token per line.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let io = |err| RtokError::io(err, Some(path.to_path_buf()));
        let mut out = BufWriter::new(File::create(path).map_err(io)?);
        self.write_to(&mut out)?;
        out.flush().map_err(io)
    }

    /// Reads a vocabulary written by [`Vocab::save`]. Every line is a token.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|err| RtokError::model_load(path, format!("unable to open vocabulary: {err}")))?;
        let mut vocab = Self::default();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|err| RtokError::io(err, Some(path.to_path_buf())))?;
            vocab.add_token(line);
        }
        log::debug!("loaded vocabulary {path:?} with {} tokens", vocab.len());
        Ok(vocab)
    }
}
