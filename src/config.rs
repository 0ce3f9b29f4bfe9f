//! Tokenizer options, learner configurations, and their builders.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RtokError};
use crate::token::JOINER_MARKER;
use crate::unicode::Script;

/// Segmentation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Split on whitespace only; placeholders are split out of chunks.
    None,
    /// Split on the ASCII space only, with inline feature columns.
    Space,
    /// Split on character class changes, keeping common constructs together.
    #[default]
    Conservative,
    /// Split on every character class change.
    Aggressive,
    /// Every character is a token.
    Char,
}

impl Mode {
    /// Lowercase name of the mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Space => "space",
            Self::Conservative => "conservative",
            Self::Aggressive => "aggressive",
            Self::Char => "char",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = RtokError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "none" => Ok(Self::None),
            "space" => Ok(Self::Space),
            "conservative" => Ok(Self::Conservative),
            "aggressive" => Ok(Self::Aggressive),
            "char" => Ok(Self::Char),
            other => Err(RtokError::InvalidConfig(format!(
                "invalid tokenization mode: {other}"
            ))),
        }
    }
}

/// Options controlling segmentation, casing, annotation, and subword encoding.
///
/// Options are immutable once a [`crate::Tokenizer`] is built from them. The tokenizer
/// normalizes and validates them on construction; [`TokenizerOptionsBuilder::build`] does the
/// same eagerly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TokenizerOptions {
    /// Segmentation mode.
    pub mode: Mode,
    /// ISO language code, informational.
    pub lang: String,
    /// Keeps reserved characters verbatim instead of substituting them.
    pub no_substitution: bool,
    /// Emits whitespace as standalone tokens.
    pub with_separators: bool,
    /// Marks the absence of whitespace with the joiner.
    pub joiner_annotate: bool,
    /// Joiner string; an empty value selects [`JOINER_MARKER`].
    pub joiner: String,
    /// Emits joiners as standalone tokens.
    pub joiner_new: bool,
    /// Marks the presence of whitespace with the spacer.
    pub spacer_annotate: bool,
    /// Emits spacers as standalone tokens.
    pub spacer_new: bool,
    /// Marks placeholders as preserved.
    pub preserve_placeholders: bool,
    /// Marks tokens produced by `segment_*` rules as preserved.
    pub preserve_segmented_tokens: bool,
    /// Reads joiners already present in the input as join marks.
    pub support_prior_joiners: bool,
    /// Lowercases tokens and exposes the casing as the last feature column.
    pub case_feature: bool,
    /// Lowercases tokens and exposes the casing as markup tokens.
    pub case_markup: bool,
    /// Lets case regions span case invariant tokens.
    pub soft_case_regions: bool,
    /// Splits tokens whose casing becomes mixed.
    pub segment_case: bool,
    /// Splits numbers digit by digit.
    pub segment_numbers: bool,
    /// Scripts whose characters become single-character tokens.
    pub segment_alphabet: Vec<String>,
    /// Splits letter runs where the script changes.
    pub segment_alphabet_change: bool,
    /// Probability of dropping a BPE merge while encoding.
    pub bpe_dropout: f32,
    /// SentencePiece sampling size: `0` or `1` disables sampling, `< 0` samples the full lattice.
    pub sp_nbest_size: i32,
    /// SentencePiece sampling smoothing.
    pub sp_alpha: f32,
    /// BPE model loaded by [`crate::Tokenizer::new`].
    pub bpe_model_path: Option<PathBuf>,
    /// SentencePiece model loaded by [`crate::Tokenizer::new`].
    pub sp_model_path: Option<PathBuf>,
    /// Vocabulary restricting subword output.
    pub vocabulary_path: Option<PathBuf>,
    /// Minimum frequency for vocabulary entries.
    pub vocabulary_threshold: u64,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Conservative,
            lang: String::new(),
            no_substitution: false,
            with_separators: false,
            joiner_annotate: false,
            joiner: JOINER_MARKER.to_owned(),
            joiner_new: false,
            spacer_annotate: false,
            spacer_new: false,
            preserve_placeholders: false,
            preserve_segmented_tokens: false,
            support_prior_joiners: false,
            case_feature: false,
            case_markup: false,
            soft_case_regions: false,
            segment_case: false,
            segment_numbers: false,
            segment_alphabet: Vec::new(),
            segment_alphabet_change: false,
            bpe_dropout: 0.0,
            sp_nbest_size: 0,
            sp_alpha: 0.1,
            bpe_model_path: None,
            sp_model_path: None,
            vocabulary_path: None,
            vocabulary_threshold: 0,
        }
    }
}

impl TokenizerOptions {
    /// Returns a builder initialised with [`TokenizerOptions::default`].
    #[must_use]
    pub fn builder() -> TokenizerOptionsBuilder {
        TokenizerOptionsBuilder::default()
    }

    /// Options for the given mode, everything else at its default.
    #[must_use]
    pub fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Reads options from a JSON file. Missing fields take their default value.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| RtokError::io(err, Some(path.into())))?;
        let options: Self = serde_json::from_str(&raw)?;
        options.normalized()
    }

    /// Returns a normalized and validated copy.
    pub fn normalized(mut self) -> Result<Self> {
        self.normalize();
        self.validate()?;
        Ok(self)
    }

    pub(crate) fn normalize(&mut self) {
        if self.joiner.is_empty() {
            self.joiner = JOINER_MARKER.to_owned();
        }
        if self.case_markup {
            self.segment_case = true;
        }
        self.segment_alphabet.sort();
        self.segment_alphabet.dedup();
    }

    /// Resolved scripts of `segment_alphabet`.
    pub fn segment_scripts(&self) -> Result<Vec<Script>> {
        self.segment_alphabet
            .iter()
            .map(|name| {
                Script::from_name(name).ok_or_else(|| {
                    RtokError::InvalidConfig(format!("unsupported alphabet: {name}"))
                })
            })
            .collect()
    }

    /// Rejects invalid option combinations.
    pub fn validate(&self) -> Result<()> {
        if self.case_feature && self.case_markup {
            return Err(RtokError::InvalidConfig(
                "case_feature and case_markup can't be set at the same time".into(),
            ));
        }
        if self.joiner_annotate && self.spacer_annotate {
            return Err(RtokError::InvalidConfig(
                "joiner_annotate and spacer_annotate can't be set at the same time".into(),
            ));
        }
        if self.joiner_new && !self.joiner_annotate {
            return Err(RtokError::InvalidConfig(
                "joiner_new requires joiner_annotate".into(),
            ));
        }
        if self.spacer_new && !self.spacer_annotate {
            return Err(RtokError::InvalidConfig(
                "spacer_new requires spacer_annotate".into(),
            ));
        }
        if self.support_prior_joiners && self.joiner_char().is_none() {
            return Err(RtokError::InvalidConfig(format!(
                "support_prior_joiners requires a single-character joiner, got {:?}",
                self.joiner
            )));
        }
        self.segment_scripts()?;
        if !(0.0..1.0).contains(&self.bpe_dropout) {
            return Err(RtokError::InvalidConfig(format!(
                "bpe_dropout ({}) must be in [0, 1)",
                self.bpe_dropout
            )));
        }
        if !self.sp_alpha.is_finite() {
            return Err(RtokError::InvalidConfig(format!(
                "sp_alpha ({}) must be finite",
                self.sp_alpha
            )));
        }
        if self.bpe_model_path.is_some() && self.sp_model_path.is_some() {
            return Err(RtokError::InvalidConfig(
                "bpe_model_path and sp_model_path can't be set at the same time".into(),
            ));
        }
        if self.sp_model_path.is_some()
            && self.vocabulary_path.is_some()
            && (self.joiner_annotate || self.spacer_new)
        {
            return Err(RtokError::InvalidConfig(
                "a SentencePiece vocabulary restriction requires spacer_annotate without spacer_new"
                    .into(),
            ));
        }
        Ok(())
    }

    /// The joiner as a single character, if it is one.
    #[must_use]
    pub fn joiner_char(&self) -> Option<char> {
        let mut chars = self.joiner.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }

    /// Returns `true` when either annotation scheme is enabled.
    #[must_use]
    pub fn annotates(&self) -> bool {
        self.joiner_annotate || self.spacer_annotate
    }
}

/// Builder for [`TokenizerOptions`].
#[derive(Debug, Default, Clone)]
pub struct TokenizerOptionsBuilder {
    cfg: TokenizerOptions,
}

macro_rules! bool_setters {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $name(mut self, enabled: bool) -> Self {
                self.cfg.$name = enabled;
                self
            }
        )*
    };
}

impl TokenizerOptionsBuilder {
    /// Creates a builder with [`TokenizerOptions::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the segmentation mode.
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.cfg.mode = mode;
        self
    }

    /// Sets the informational language code.
    #[must_use]
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.cfg.lang = lang.into();
        self
    }

    /// Overrides the joiner string.
    #[must_use]
    pub fn joiner(mut self, joiner: impl Into<String>) -> Self {
        self.cfg.joiner = joiner.into();
        self
    }

    bool_setters! {
        /// Keeps reserved characters verbatim.
        no_substitution,
        /// Emits whitespace as tokens.
        with_separators,
        /// Enables the joiner scheme.
        joiner_annotate,
        /// Emits joiners as standalone tokens.
        joiner_new,
        /// Enables the spacer scheme.
        spacer_annotate,
        /// Emits spacers as standalone tokens.
        spacer_new,
        /// Marks placeholders as preserved.
        preserve_placeholders,
        /// Marks segmented tokens as preserved.
        preserve_segmented_tokens,
        /// Reads joiners present in the input.
        support_prior_joiners,
        /// Exposes casing as a feature column.
        case_feature,
        /// Exposes casing as markup tokens.
        case_markup,
        /// Lets case regions span case invariant tokens.
        soft_case_regions,
        /// Splits on casing changes.
        segment_case,
        /// Splits numbers digit by digit.
        segment_numbers,
        /// Splits letter runs on script changes.
        segment_alphabet_change,
    }

    /// Sets the scripts segmented character by character.
    #[must_use]
    pub fn segment_alphabet<I, S>(mut self, scripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cfg.segment_alphabet = scripts.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the BPE dropout probability.
    #[must_use]
    pub fn bpe_dropout(mut self, dropout: f32) -> Self {
        self.cfg.bpe_dropout = dropout;
        self
    }

    /// Configures SentencePiece sampling.
    #[must_use]
    pub fn sp_sampling(mut self, nbest_size: i32, alpha: f32) -> Self {
        self.cfg.sp_nbest_size = nbest_size;
        self.cfg.sp_alpha = alpha;
        self
    }

    /// Sets the BPE model path.
    #[must_use]
    pub fn bpe_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cfg.bpe_model_path = Some(path.into());
        self
    }

    /// Sets the SentencePiece model path.
    #[must_use]
    pub fn sp_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cfg.sp_model_path = Some(path.into());
        self
    }

    /// Sets the vocabulary restricting subword output.
    #[must_use]
    pub fn vocabulary(mut self, path: impl Into<PathBuf>, threshold: u64) -> Self {
        self.cfg.vocabulary_path = Some(path.into());
        self.cfg.vocabulary_threshold = threshold;
        self
    }

    /// Finalises the builder, returning normalized and validated [`TokenizerOptions`].
    pub fn build(self) -> Result<TokenizerOptions> {
        self.cfg.normalized()
    }
}

/// Configuration for the BPE learner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BpeLearnerConfig {
    /// Number of merges to learn.
    pub symbols: usize,
    /// Pairs seen fewer times than this end learning.
    pub min_frequency: u64,
    /// Ingested lines are `word count` pairs instead of raw text.
    pub dict_input: bool,
    /// Counts the initial characters against `symbols`.
    pub total_symbols: bool,
    /// Logs progress through the `log` facade.
    pub verbose: bool,
}

impl Default for BpeLearnerConfig {
    fn default() -> Self {
        Self {
            symbols: 10_000,
            min_frequency: 2,
            dict_input: false,
            total_symbols: false,
            verbose: false,
        }
    }
}

impl BpeLearnerConfig {
    /// Returns a builder initialised with [`BpeLearnerConfig::default`].
    #[must_use]
    pub fn builder() -> BpeLearnerBuilder {
        BpeLearnerBuilder::default()
    }

    /// Validates the learner configuration.
    pub fn validate(&self) -> Result<()> {
        if self.symbols == 0 {
            return Err(RtokError::InvalidConfig(
                "symbols must be greater than zero".into(),
            ));
        }
        if self.min_frequency == 0 {
            return Err(RtokError::InvalidConfig(
                "min_frequency must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`BpeLearnerConfig`].
#[derive(Debug, Default, Clone)]
pub struct BpeLearnerBuilder {
    cfg: BpeLearnerConfig,
}

impl BpeLearnerBuilder {
    /// Sets the number of merges to learn.
    #[must_use]
    pub fn symbols(mut self, value: usize) -> Self {
        self.cfg.symbols = value;
        self
    }

    /// Sets the minimum pair frequency.
    #[must_use]
    pub fn min_frequency(mut self, value: u64) -> Self {
        self.cfg.min_frequency = value;
        self
    }

    /// Reads `word count` lines instead of text.
    #[must_use]
    pub fn dict_input(mut self, enabled: bool) -> Self {
        self.cfg.dict_input = enabled;
        self
    }

    /// Counts the initial characters against `symbols`.
    #[must_use]
    pub fn total_symbols(mut self, enabled: bool) -> Self {
        self.cfg.total_symbols = enabled;
        self
    }

    /// Enables progress logging.
    #[must_use]
    pub fn verbose(mut self, enabled: bool) -> Self {
        self.cfg.verbose = enabled;
        self
    }

    /// Finalises the builder, returning a validated [`BpeLearnerConfig`].
    pub fn build(self) -> Result<BpeLearnerConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Configuration for the SentencePiece (unigram) learner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SentencePieceLearnerConfig {
    /// Target number of pieces.
    pub vocab_size: u32,
    /// Longest piece considered, in characters.
    pub max_piece_length: usize,
    /// EM sub-iterations per pruning round.
    pub n_sub_iterations: u32,
    /// Fraction of pieces kept at each pruning round.
    pub shrinking_factor: f64,
    /// Piece standing for unknown characters.
    pub unk_token: String,
    /// Pieces always part of the inventory.
    pub special_tokens: Vec<String>,
    /// Also writes a `piece<TAB>score` vocabulary next to the model.
    pub keep_vocab: bool,
    /// Shows trainer progress.
    pub verbose: bool,
}

impl Default for SentencePieceLearnerConfig {
    fn default() -> Self {
        Self {
            vocab_size: 8000,
            max_piece_length: 16,
            n_sub_iterations: 2,
            shrinking_factor: 0.75,
            unk_token: "<unk>".into(),
            special_tokens: Vec::new(),
            keep_vocab: false,
            verbose: false,
        }
    }
}

impl SentencePieceLearnerConfig {
    /// Returns a builder initialised with [`SentencePieceLearnerConfig::default`].
    #[must_use]
    pub fn builder() -> SentencePieceLearnerBuilder {
        SentencePieceLearnerBuilder::default()
    }

    /// Validates the learner configuration.
    pub fn validate(&self) -> Result<()> {
        if self.vocab_size == 0 {
            return Err(RtokError::InvalidConfig(
                "vocab_size must be greater than zero".into(),
            ));
        }
        if self.max_piece_length == 0 {
            return Err(RtokError::InvalidConfig(
                "max_piece_length must be greater than zero".into(),
            ));
        }
        if !(self.shrinking_factor > 0.0 && self.shrinking_factor < 1.0) {
            return Err(RtokError::InvalidConfig(format!(
                "shrinking_factor ({}) must be in (0, 1)",
                self.shrinking_factor
            )));
        }
        if self.unk_token.is_empty() {
            return Err(RtokError::InvalidConfig(
                "unk_token must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`SentencePieceLearnerConfig`].
#[derive(Debug, Default, Clone)]
pub struct SentencePieceLearnerBuilder {
    cfg: SentencePieceLearnerConfig,
}

impl SentencePieceLearnerBuilder {
    /// Sets the target number of pieces.
    #[must_use]
    pub fn vocab_size(mut self, value: u32) -> Self {
        self.cfg.vocab_size = value;
        self
    }

    /// Sets the longest piece length.
    #[must_use]
    pub fn max_piece_length(mut self, value: usize) -> Self {
        self.cfg.max_piece_length = value;
        self
    }

    /// Configures the pruning schedule.
    #[must_use]
    pub fn pruning(mut self, n_sub_iterations: u32, shrinking_factor: f64) -> Self {
        self.cfg.n_sub_iterations = n_sub_iterations;
        self.cfg.shrinking_factor = shrinking_factor;
        self
    }

    /// Sets the unknown piece.
    #[must_use]
    pub fn unk_token(mut self, token: impl Into<String>) -> Self {
        self.cfg.unk_token = token.into();
        self
    }

    /// Sets the pieces always kept in the inventory.
    #[must_use]
    pub fn special_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cfg.special_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps the vocabulary file next to the model.
    #[must_use]
    pub fn keep_vocab(mut self, enabled: bool) -> Self {
        self.cfg.keep_vocab = enabled;
        self
    }

    /// Shows trainer progress.
    #[must_use]
    pub fn verbose(mut self, enabled: bool) -> Self {
        self.cfg.verbose = enabled;
        self
    }

    /// Finalises the builder, returning a validated [`SentencePieceLearnerConfig`].
    pub fn build(self) -> Result<SentencePieceLearnerConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Controls how learner inputs are discovered on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusConfig {
    /// Enables recursive directory traversal.
    pub recursive: bool,
    /// Follows symlinks encountered during traversal.
    pub follow_symlinks: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            follow_symlinks: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_round_trip() {
        for mode in [
            Mode::None,
            Mode::Space,
            Mode::Conservative,
            Mode::Aggressive,
            Mode::Char,
        ] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
        let err = "xyz".parse::<Mode>().expect_err("unknown mode");
        assert!(matches!(err, RtokError::InvalidConfig(message) if message.contains("xyz")));
    }

    #[test]
    fn builder_normalizes_case_markup() {
        let options = TokenizerOptions::builder()
            .case_markup(true)
            .joiner("")
            .build()
            .expect("options should be valid");
        assert!(options.segment_case);
        assert_eq!(options.joiner, JOINER_MARKER);
    }

    #[test]
    fn validate_rejects_conflicting_annotations() {
        let cases = [
            TokenizerOptions::builder()
                .joiner_annotate(true)
                .spacer_annotate(true),
            TokenizerOptions::builder().joiner_new(true),
            TokenizerOptions::builder().spacer_new(true),
            TokenizerOptions::builder().case_feature(true).case_markup(true),
            TokenizerOptions::builder().segment_alphabet(["Klingon"]),
            TokenizerOptions::builder().bpe_dropout(1.0),
            TokenizerOptions::builder()
                .support_prior_joiners(true)
                .joiner("@@"),
            TokenizerOptions::builder()
                .bpe_model_path("a")
                .sp_model_path("b"),
        ];
        for builder in cases {
            let err = builder.build().expect_err("validation should fail");
            assert!(matches!(err, RtokError::InvalidConfig(_)), "{err}");
        }
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: TokenizerOptions =
            serde_json::from_str(r#"{"mode": "aggressive", "joiner_annotate": true}"#).unwrap();
        assert_eq!(options.mode, Mode::Aggressive);
        assert!(options.joiner_annotate);
        assert_eq!(options.joiner, JOINER_MARKER);
        assert!((options.sp_alpha - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn learner_builders_validate() {
        assert!(BpeLearnerConfig::builder().min_frequency(0).build().is_err());
        let cfg = BpeLearnerConfig::builder()
            .symbols(2)
            .min_frequency(1)
            .build()
            .unwrap();
        assert_eq!(cfg.symbols, 2);
        assert!(SentencePieceLearnerConfig::builder()
            .pruning(2, 1.5)
            .build()
            .is_err());
    }
}
