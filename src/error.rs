//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = RtokError> = std::result::Result<T, E>;

/// Domain-specific error describing failures during configuration, model loading, IO, or learning.
#[derive(Debug, Error)]
pub enum RtokError {
    /// Tokenizer or learner options failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A subword model or vocabulary file is missing or malformed.
    #[error("unable to load model {path:?}: {reason}")]
    ModelLoad {
        /// Path of the model file that failed to load.
        path: PathBuf,
        /// Human readable description of the problem.
        reason: String,
    },
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
    /// A subword learner could not ingest its corpus or produce a model.
    #[error("learner error: {0}")]
    Learner(String),
    /// Detokenization required a feature column that was not supplied.
    #[error("missing feature: {0}")]
    MissingFeature(String),
    /// Error bubbled up from the `tokenizers` crate.
    #[error("huggingface tokenizers error: {0}")]
    Tokenizers(String),
    /// Error reported by the SentencePiece processor.
    #[error("sentencepiece error: {0}")]
    SentencePiece(#[from] sentencepiece::SentencePieceError),
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Catch-all variant for invariants that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokenizers::Error> for RtokError {
    fn from(err: tokenizers::Error) -> Self {
        Self::Tokenizers(err.to_string())
    }
}

impl From<serde_json::Error> for RtokError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl RtokError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }

    /// Helper constructor for model loading failures.
    pub fn model_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
