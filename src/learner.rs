//! Subword learners and the corpus ingestion they share.
//!
//! Learners consume raw text through a tokenizer that splits but does not annotate, count the
//! resulting word surfaces, and write a model file that [`crate::subword`] can load back.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use rand::thread_rng;

use crate::config::{CorpusConfig, Mode, TokenizerOptions};
use crate::corpus::collect_paths;
use crate::error::{Result, RtokError};
use crate::stream::for_each_line;
use crate::tokenizer::Tokenizer;

pub mod bpe;
pub mod sentencepiece;
mod word;

pub use bpe::BpeLearner;
pub use sentencepiece::SentencePieceLearner;

/// Common ingestion and output interface of the subword learners.
pub trait SubwordLearner {
    /// Tokenizer used to split ingested text.
    fn tokenizer(&self) -> &Tokenizer;

    /// Records a single pre-split token.
    fn ingest_token(&mut self, token: &str);

    /// Writes the learned model to `out`. `description` lines are written as comments where the
    /// model format allows it.
    fn learn_to_writer(&mut self, out: &mut dyn Write, description: Option<&str>) -> Result<()>;

    /// Splits one line of text and records its tokens. Placeholders are skipped.
    fn ingest_line(&mut self, line: &str) -> Result<()> {
        ingest_tokenized(self, line);
        Ok(())
    }

    /// Records every line of `text`.
    fn ingest_text(&mut self, text: &str) -> Result<()> {
        for line in text.lines() {
            self.ingest_line(line)?;
        }
        Ok(())
    }

    /// Records every line read from `reader`; invalid UTF-8 is replaced.
    fn ingest_reader(&mut self, reader: &mut dyn BufRead) -> Result<()> {
        for_each_line(reader, |line| self.ingest_line(line))
    }

    /// Records every line of the file at `path`.
    fn ingest_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|err| RtokError::io(err, Some(path.to_path_buf())))?;
        log::debug!("ingesting {}", path.display());
        self.ingest_reader(&mut BufReader::new(file))
    }

    /// Records every file found under `inputs`, walking directories according to `corpus`.
    fn ingest_paths(&mut self, inputs: &[&Path], corpus: &CorpusConfig) -> Result<()> {
        for path in collect_paths(inputs, corpus)? {
            self.ingest_file(&path)?;
        }
        Ok(())
    }

    /// Writes the learned model to the file at `path`.
    fn learn(&mut self, path: &Path, description: Option<&str>) -> Result<()> {
        let file =
            File::create(path).map_err(|err| RtokError::io(err, Some(path.to_path_buf())))?;
        let mut out = BufWriter::new(file);
        self.learn_to_writer(&mut out, description)?;
        out.flush()
            .map_err(|err| RtokError::io(err, Some(path.to_path_buf())))
    }
}

/// Splits `line` with the learner's tokenizer and records the surfaces of non-placeholder tokens.
pub(crate) fn ingest_tokenized<L: SubwordLearner + ?Sized>(learner: &mut L, line: &str) {
    let tokens = learner
        .tokenizer()
        .tokenize_with_rng(line, false, &mut thread_rng());
    for token in tokens {
        if token.is_empty() || token.is_placeholder() {
            continue;
        }
        learner.ingest_token(&token.surface);
    }
}

/// Builds the tokenizer a learner splits its corpus with.
///
/// Without explicit options the corpus is split on spaces. Annotation and subword models are
/// always switched off since learners count plain surfaces.
pub(crate) fn ingestion_tokenizer(options: Option<TokenizerOptions>) -> Result<Tokenizer> {
    let mut options = options.unwrap_or_else(|| TokenizerOptions::with_mode(Mode::Space));
    options.joiner_annotate = false;
    options.joiner_new = false;
    options.spacer_annotate = false;
    options.spacer_new = false;
    options.bpe_model_path = None;
    options.sp_model_path = None;
    options.vocabulary_path = None;
    Tokenizer::new(options)
}

/// Writes `description` as `# `-prefixed comment lines.
pub(crate) fn write_description(out: &mut dyn Write, description: Option<&str>) -> Result<()> {
    if let Some(description) = description {
        for line in description.lines() {
            writeln!(out, "# {line}").map_err(|err| RtokError::io(err, None))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingestion_tokenizer_never_annotates() {
        let options = TokenizerOptions::builder()
            .mode(Mode::Aggressive)
            .joiner_annotate(true)
            .build()
            .unwrap();
        let tokenizer = ingestion_tokenizer(Some(options)).unwrap();
        assert_eq!(tokenizer.options().mode, Mode::Aggressive);
        assert!(!tokenizer.options().annotates());
        assert_eq!(tokenizer.tokenize_str("so-called"), "so - called");
    }

    #[test]
    fn description_lines_become_comments() {
        let mut out = Vec::new();
        write_description(&mut out, Some("first\nsecond")).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "# first\n# second\n");
    }
}
