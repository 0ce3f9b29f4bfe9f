//! Subword encoders applied to segmented tokens.
//!
//! Both encoders are immutable once loaded and shared through [`Arc`]; the sampling parameters
//! travel with each call so concurrent callers never contend on model state.

pub mod bpe;
pub mod sentencepiece;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use rand::Rng;

use crate::casing::lowercase_token;
use crate::config::{Mode, TokenizerOptions};
use crate::error::{Result, RtokError};
use crate::token::{Casing, Token, TokenType, SPACER_MARKER};

pub use self::bpe::Bpe;
pub use self::sentencepiece::SentencePiece;

/// Subword regularization parameters, read from [`TokenizerOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Regularization {
    /// Probability of dropping a BPE merge.
    pub bpe_dropout: f32,
    /// SentencePiece sampling size.
    pub sp_nbest_size: i32,
    /// SentencePiece sampling smoothing.
    pub sp_alpha: f32,
}

impl Regularization {
    /// Parameters configured in `options`.
    #[must_use]
    pub fn from_options(options: &TokenizerOptions) -> Self {
        Self {
            bpe_dropout: options.bpe_dropout,
            sp_nbest_size: options.sp_nbest_size,
            sp_alpha: options.sp_alpha,
        }
    }
}

/// A loaded subword model.
#[derive(Debug, Clone)]
pub enum SubwordEncoder {
    /// Merge-table byte-pair encoding.
    Bpe(Arc<Bpe>),
    /// Unigram SentencePiece model.
    SentencePiece(Arc<SentencePiece>),
}

impl From<Bpe> for SubwordEncoder {
    fn from(model: Bpe) -> Self {
        Self::Bpe(Arc::new(model))
    }
}

impl From<SentencePiece> for SubwordEncoder {
    fn from(model: SentencePiece) -> Self {
        Self::SentencePiece(Arc::new(model))
    }
}

impl SubwordEncoder {
    /// Loads the subword model configured in `options`, restricted to its vocabulary if one is
    /// set. Returns `None` when no model is configured.
    pub fn from_options(options: &TokenizerOptions) -> Result<Option<Self>> {
        let vocabulary = match &options.vocabulary_path {
            Some(path) => Some(load_vocabulary(path, options.vocabulary_threshold)?),
            None => None,
        };

        if let Some(path) = &options.bpe_model_path {
            let mut model = Bpe::from_file(path)?;
            if let Some(vocabulary) = vocabulary {
                let joiner = if options.joiner_annotate {
                    options.joiner.as_str()
                } else {
                    ""
                };
                model = model.with_vocabulary(vocabulary, joiner);
            }
            return Ok(Some(model.into()));
        }

        if let Some(path) = &options.sp_model_path {
            let mut model = SentencePiece::from_file(path)?;
            if let Some(vocabulary) = vocabulary {
                model = model.with_vocabulary(vocabulary);
            }
            return Ok(Some(model.into()));
        }

        if vocabulary.is_some() {
            return Err(RtokError::InvalidConfig(
                "vocabulary_path requires a subword model".into(),
            ));
        }
        Ok(None)
    }

    /// Adjusts options that depend on the encoder.
    ///
    /// SentencePiece output relies on spacers: without segmentation and annotation, spacer
    /// annotation is switched on and reserved characters are kept verbatim.
    pub fn adjust_options(&self, options: &mut TokenizerOptions) {
        if matches!(self, Self::SentencePiece(_))
            && options.mode == Mode::None
            && !options.annotates()
        {
            options.spacer_annotate = true;
            options.no_substitution = true;
        }
    }

    /// Splits a single word into piece strings.
    pub fn encode<R: Rng + ?Sized>(
        &self,
        word: &str,
        params: &Regularization,
        training: bool,
        rng: &mut R,
    ) -> Vec<String> {
        match self {
            Self::Bpe(model) => {
                let dropout = if training { params.bpe_dropout } else { 0.0 };
                model.encode(word, dropout, rng)
            }
            Self::SentencePiece(model) => {
                let nbest = if training { params.sp_nbest_size } else { 0 };
                model.encode(word, nbest, params.sp_alpha)
            }
        }
    }

    /// Encodes every eligible token and annotates the resulting pieces.
    ///
    /// Placeholders, preserved tokens and empty tokens are passed through.
    pub fn encode_and_annotate<R: Rng + ?Sized>(
        &self,
        tokens: Vec<Token>,
        params: &Regularization,
        training: bool,
        rng: &mut R,
    ) -> Vec<Token> {
        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            if token.is_empty() || token.is_placeholder() || token.preserve {
                out.push(token);
                continue;
            }
            let pieces = self.encode(&token.surface, params, training, rng);
            match self {
                Self::Bpe(_) => annotate_pieces(token, pieces, &mut out),
                Self::SentencePiece(_) => annotate_spm_pieces(token, pieces, &mut out),
            }
        }
        out
    }
}

fn annotate_pieces(token: Token, pieces: Vec<String>, out: &mut Vec<Token>) {
    if pieces.len() <= 1 {
        out.push(token);
        return;
    }
    let last = pieces.len() - 1;
    let mut encoded: Vec<Token> = pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Token {
            join_right: i < last,
            ..Token::new(piece)
        })
        .collect();
    propagate(&token, &mut encoded);
    out.append(&mut encoded);
}

fn annotate_spm_pieces(token: Token, pieces: Vec<String>, out: &mut Vec<Token>) {
    if pieces.is_empty() {
        out.push(token);
        return;
    }

    let mut encoded: Vec<Token> = Vec::with_capacity(pieces.len());
    let mut spacer_on_next = false;
    for piece in pieces {
        if piece == SPACER_MARKER {
            spacer_on_next = true;
            continue;
        }
        let mut sub = match piece.strip_prefix(SPACER_MARKER) {
            Some(rest) => Token {
                spacer: true,
                ..Token::new(rest)
            },
            None => Token::new(piece),
        };
        if spacer_on_next {
            sub.spacer = true;
            sub.preserve = true;
            spacer_on_next = false;
        } else if !sub.spacer && !encoded.is_empty() {
            sub.join_left = true;
        }
        encoded.push(sub);
    }

    if encoded.is_empty() {
        out.push(token);
        return;
    }
    propagate(&token, &mut encoded);
    out.append(&mut encoded);
}

// Moves word-level annotations onto the pieces.
fn propagate(token: &Token, pieces: &mut [Token]) {
    let count = pieces.len();
    if token.join_left {
        if let Some(first) = pieces.first_mut() {
            first.join_left = true;
        }
    }
    if token.join_right {
        if let Some(last) = pieces.last_mut() {
            last.join_right = true;
        }
    }

    for (i, piece) in pieces.iter_mut().enumerate() {
        piece.casing = match token.casing {
            Casing::Capitalized if i > 0 => Casing::Lowercase,
            Casing::Mixed => lowercase_token(&piece.surface).1,
            casing => casing,
        };
        if count > 1 {
            piece.token_type = if i == 0 {
                TokenType::LeadingSubword
            } else {
                TokenType::TrailingSubword
            };
        }
        piece.features.clone_from(&token.features);
    }
}

/// Reads a vocabulary file of `token [frequency]` lines.
///
/// Entries below `threshold` are dropped; entries without a frequency are kept only when the
/// threshold is at most one.
pub fn load_vocabulary(path: impl AsRef<Path>, threshold: u64) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        RtokError::model_load(path, format!("unable to open vocabulary: {err}"))
    })?;

    let mut vocabulary = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|err| RtokError::io(err, Some(path.into())))?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        match line.rsplit_once(' ') {
            Some((token, frequency)) if !token.is_empty() => {
                let frequency: u64 = frequency.parse().map_err(|_| {
                    RtokError::model_load(
                        path,
                        format!("invalid frequency on line {}: {frequency:?}", number + 1),
                    )
                })?;
                if frequency >= threshold {
                    vocabulary.push(token.to_owned());
                }
            }
            _ => {
                if threshold <= 1 {
                    vocabulary.push(line.to_owned());
                }
            }
        }
    }
    Ok(vocabulary)
}
