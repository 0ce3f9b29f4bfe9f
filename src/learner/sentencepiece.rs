//! Unigram SentencePiece learning through the `tokenizers` unigram trainer.
//!
//! The learned inventory is written as a SentencePiece `ModelProto`, the format
//! [`SentencePiece::from_file`] loads.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde_json::Value;
use tokenizers::models::unigram::{Unigram, UnigramTrainerBuilder};
use tokenizers::{AddedToken, Model, Trainer};

use super::{ingestion_tokenizer, SubwordLearner};
use crate::config::{SentencePieceLearnerConfig, TokenizerOptions};
use crate::error::{Result, RtokError};
use crate::subword::sentencepiece::unigram_model_proto;
use crate::subword::SentencePiece;
use crate::token::SPACER_MARKER;
use crate::tokenizer::Tokenizer;

/// Learns a unigram piece inventory from ingested text.
#[derive(Debug, Clone)]
pub struct SentencePieceLearner {
    cfg: SentencePieceLearnerConfig,
    tokenizer: Tokenizer,
    counts: BTreeMap<String, u64>,
}

impl SentencePieceLearner {
    /// Creates a learner. Ingested text is split with `tokenizer_options`, or on spaces when
    /// none are given.
    pub fn new(
        cfg: SentencePieceLearnerConfig,
        tokenizer_options: Option<TokenizerOptions>,
    ) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            tokenizer: ingestion_tokenizer(tokenizer_options)?,
            counts: BTreeMap::new(),
        })
    }

    /// Returns the learner configuration.
    #[must_use]
    pub fn config(&self) -> &SentencePieceLearnerConfig {
        &self.cfg
    }

    /// Number of distinct words ingested so far.
    #[must_use]
    pub fn distinct_words(&self) -> usize {
        self.counts.len()
    }

    /// Trains the unigram model and returns its pieces with their scores, along with the index
    /// of the unknown piece.
    pub fn train(&self) -> Result<(Vec<(String, f32)>, usize)> {
        if self.counts.is_empty() {
            return Err(RtokError::Learner(
                "SentencePiece learning requires a non-empty corpus".into(),
            ));
        }

        let special_tokens = self
            .cfg
            .special_tokens
            .iter()
            .map(|token| AddedToken::from(token.clone(), true))
            .collect();
        let mut trainer = UnigramTrainerBuilder::default()
            .vocab_size(self.cfg.vocab_size)
            .show_progress(self.cfg.verbose)
            .unk_token(Some(self.cfg.unk_token.clone()))
            .special_tokens(special_tokens)
            .max_piece_length(self.cfg.max_piece_length)
            .n_sub_iterations(self.cfg.n_sub_iterations)
            .shrinking_factor(self.cfg.shrinking_factor)
            .build()
            .map_err(|err| RtokError::Learner(err.to_string()))?;

        let sequences = self.counts.iter().flat_map(|(word, &count)| {
            let repeat = usize::try_from(count).unwrap_or(usize::MAX);
            std::iter::repeat(word.as_str()).take(repeat)
        });
        trainer.feed(sequences, |sequence| Ok(vec![sequence.to_owned()]))?;

        let mut model = Unigram::default();
        trainer.train(&mut model)?;
        if self.cfg.verbose {
            info!(
                "learned {} pieces from {} words",
                model.get_vocab_size(),
                self.counts.len()
            );
        }
        unigram_pieces(&serde_json::to_value(&model)?)
    }

    /// Trains the model and returns it as a serialized SentencePiece `ModelProto`.
    pub fn train_proto(&self) -> Result<Vec<u8>> {
        let (pieces, unk_id) = self.train()?;
        unigram_model_proto(&pieces, unk_id, &self.cfg.special_tokens)
    }

    /// Trains the model and loads it into an encoder.
    pub fn train_model(&self) -> Result<SentencePiece> {
        SentencePiece::from_serialized_proto(&self.train_proto()?)
    }
}

// Reads the pieces of a unigram model in its `tokenizers` JSON layout.
fn unigram_pieces(model: &Value) -> Result<(Vec<(String, f32)>, usize)> {
    let unusable = |what: &str| RtokError::Learner(format!("trained model is unusable: {what}"));
    let entries = model
        .get("vocab")
        .and_then(Value::as_array)
        .ok_or_else(|| unusable("no vocab"))?;
    let unk_id = model
        .get("unk_id")
        .and_then(Value::as_u64)
        .and_then(|id| usize::try_from(id).ok())
        .ok_or_else(|| unusable("no unknown piece"))?;

    let mut pieces = Vec::with_capacity(entries.len());
    for entry in entries {
        match (
            entry.get(0).and_then(Value::as_str),
            entry.get(1).and_then(Value::as_f64),
        ) {
            (Some(piece), Some(score)) => pieces.push((piece.to_owned(), score as f32)),
            _ => return Err(unusable("malformed vocab entry")),
        }
    }
    Ok((pieces, unk_id))
}

fn vocab_path(model_path: &Path) -> PathBuf {
    let mut path = model_path.as_os_str().to_owned();
    path.push(".vocab");
    PathBuf::from(path)
}

fn write_vocab(path: &Path, pieces: &[(String, f32)]) -> Result<()> {
    let io = |err| RtokError::io(err, Some(path.to_path_buf()));
    let file = File::create(path).map_err(io)?;
    let mut out = BufWriter::new(file);
    for (piece, score) in pieces {
        writeln!(out, "{piece}\t{score}").map_err(io)?;
    }
    out.flush().map_err(io)
}

impl SubwordLearner for SentencePieceLearner {
    fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    fn ingest_token(&mut self, token: &str) {
        if token.is_empty() {
            return;
        }
        *self
            .counts
            .entry(format!("{SPACER_MARKER}{token}"))
            .or_insert(0) += 1;
    }

    /// Writes the serialized model. The vocabulary can't be kept when writing to a stream.
    fn learn_to_writer(&mut self, out: &mut dyn Write, _description: Option<&str>) -> Result<()> {
        if self.cfg.keep_vocab {
            return Err(RtokError::InvalidConfig(
                "keep_vocab requires learning to a file".into(),
            ));
        }
        let model = self.train_proto()?;
        out.write_all(&model)
            .map_err(|err| RtokError::io(err, None))
    }

    fn learn(&mut self, path: &Path, _description: Option<&str>) -> Result<()> {
        let (pieces, unk_id) = self.train()?;
        let model = unigram_model_proto(&pieces, unk_id, &self.cfg.special_tokens)?;
        fs::write(path, model).map_err(|err| RtokError::io(err, Some(path.to_path_buf())))?;
        if self.cfg.keep_vocab {
            write_vocab(&vocab_path(path), &pieces)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CORPUS: &str = "the cat sat on the mat\n\
                          the dog sat on the log\n\
                          a cat and a dog met on a mat\n";

    fn learner(keep_vocab: bool) -> SentencePieceLearner {
        let cfg = SentencePieceLearnerConfig::builder()
            .vocab_size(40)
            .keep_vocab(keep_vocab)
            .build()
            .unwrap();
        SentencePieceLearner::new(cfg, None).unwrap()
    }

    #[test]
    fn words_are_fed_with_a_leading_spacer() {
        let mut learner = learner(false);
        learner.ingest_text("the cat the").unwrap();
        assert_eq!(learner.distinct_words(), 2);
        assert_eq!(learner.counts.get("▁the"), Some(&2));
    }

    #[test]
    fn empty_corpus_is_an_error() {
        let mut learner = learner(false);
        let err = learner
            .learn_to_writer(&mut Vec::new(), None)
            .expect_err("empty corpus");
        assert!(matches!(err, RtokError::Learner(_)));
    }

    #[test]
    fn learned_model_segments_ingested_words() {
        let mut learner = learner(false);
        learner.ingest_text(CORPUS).unwrap();
        let (pieces, unk_id) = learner.train().unwrap();
        assert_eq!(pieces[unk_id].0, "<unk>");

        let model = learner.train_model().unwrap();
        assert_eq!(model.len(), pieces.len());
        assert_eq!(model.unk_id() as usize, unk_id);
        assert_eq!(model.encode_best("the cat").concat(), "▁the▁cat");
    }

    #[test]
    fn keep_vocab_writes_a_listing() {
        let dir = tempdir().unwrap();
        let model_path = dir.path().join("sp.model");
        let mut learner = learner(true);
        learner.ingest_text(CORPUS).unwrap();
        learner.learn(&model_path, None).unwrap();

        let model = SentencePiece::from_file(&model_path).unwrap();
        let listing = fs::read_to_string(dir.path().join("sp.model.vocab")).unwrap();
        assert_eq!(model.len(), listing.lines().count());
        assert!(listing.lines().all(|line| line.split('\t').count() == 2));

        let err = learner
            .learn_to_writer(&mut Vec::new(), None)
            .expect_err("stream with keep_vocab");
        assert!(matches!(err, RtokError::InvalidConfig(_)));
    }
}
