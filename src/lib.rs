//! Reversible tokenization with joiner/spacer annotations, case markup and subword models.
//!
//! The crate exposes both a library API and an `rtok` command line interface. A
//! [`Tokenizer`] segments text according to a [`Mode`], records how tokens attach to their
//! neighbours, optionally lowers and marks casing, and splits words further with a BPE or
//! unigram SentencePiece model. Every step is reversible: detokenizing the produced tokens
//! gives back the input text.
//!
//! ```no_run
//! use rtok::{Mode, Tokenizer, TokenizerOptions};
//!
//! # fn main() -> rtok::Result<()> {
//! let options = TokenizerOptions::builder()
//!     .mode(Mode::Aggressive)
//!     .joiner_annotate(true)
//!     .bpe_model_path("codes.bpe")
//!     .build()?;
//! let tokenizer = Tokenizer::new(options)?;
//! let line = tokenizer.tokenize_str("Isn't it so-greatly working?");
//! assert_eq!(tokenizer.detokenize_str(&line)?, "Isn't it so-greatly working?");
//! # Ok(())
//! # }
//! ```
//!
//! Models are learned with [`BpeLearner`] and [`SentencePieceLearner`], both driven through
//! the [`SubwordLearner`] trait.
//!
//! The CLI is enabled by default through the `cli` feature. Users targeting the library only
//! can disable default features: `rtok = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions
)]

pub mod annotation;
pub mod casing;
pub mod config;
pub mod corpus;
pub mod error;
pub mod learner;
pub mod metrics;
pub mod segmenter;
pub mod stream;
pub mod subword;
pub mod token;
pub mod tokenizer;
pub mod unicode;
pub mod vocab;

pub use config::{
    BpeLearnerConfig, CorpusConfig, Mode, SentencePieceLearnerConfig, TokenizerOptions,
    TokenizerOptionsBuilder,
};
pub use error::{Result, RtokError};
pub use learner::{BpeLearner, SentencePieceLearner, SubwordLearner};
pub use metrics::{LearningMetrics, StopReason};
pub use subword::{Bpe, SentencePiece, SubwordEncoder};
pub use token::{Casing, Token, TokenType};
pub use tokenizer::{Ranges, Tokenizer, Words};
pub use vocab::Vocab;
