//! The token value flowing between segmentation, casing, subword, and annotation stages.

use serde::{Deserialize, Serialize};

use crate::casing;

/// Default joiner marking the absence of whitespace between two tokens.
pub const JOINER_MARKER: &str = "￭";
/// Spacer marking the presence of whitespace before a token.
pub const SPACER_MARKER: &str = "▁";
/// Opening bracket of a placeholder.
pub const PLACEHOLDER_OPEN: &str = "｟";
/// Closing bracket of a placeholder.
pub const PLACEHOLDER_CLOSE: &str = "｠";
/// Delimiter between a surface and its features in the string representation.
pub const FEATURE_MARKER: &str = "￨";

pub(crate) const PLACEHOLDER_OPEN_CHAR: char = '｟';
pub(crate) const PLACEHOLDER_CLOSE_CHAR: char = '｠';

/// Position of a token relative to the word it was carved from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    /// A complete word-level token.
    #[default]
    Word,
    /// First piece of a word split by a subword encoder.
    LeadingSubword,
    /// Non-initial piece of a word split by a subword encoder.
    TrailingSubword,
}

/// Letter casing class of a token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Casing {
    /// Casing is not tracked or the token has no cased letters.
    #[default]
    None,
    /// All letters are lowercase.
    Lowercase,
    /// All letters are uppercase (at least two letters).
    Uppercase,
    /// First letter uppercase, following letters lowercase.
    Capitalized,
    /// Any other combination.
    Mixed,
}

impl Casing {
    /// One-letter code used in case feature columns and case markup.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Lowercase => 'L',
            Self::Uppercase => 'U',
            Self::Mixed => 'M',
            Self::Capitalized => 'C',
            Self::None => 'N',
        }
    }

    /// Parses a one-letter case code; unknown letters map to [`Casing::None`].
    #[must_use]
    pub fn from_char(code: char) -> Self {
        match code {
            'L' => Self::Lowercase,
            'U' => Self::Uppercase,
            'M' => Self::Mixed,
            'C' => Self::Capitalized,
            _ => Self::None,
        }
    }
}

/// A token with its annotations.
///
/// Tokens are plain values: callers may edit any field before detokenizing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Visible text of the token.
    pub surface: String,
    /// Word or subword position.
    pub token_type: TokenType,
    /// Casing class, [`Casing::None`] when casing is not tracked.
    pub casing: Casing,
    /// No whitespace separated this token from its left neighbour.
    pub join_left: bool,
    /// No whitespace separated this token from its right neighbour.
    pub join_right: bool,
    /// Whitespace preceded this piece (set by SentencePiece encoding).
    pub spacer: bool,
    /// Exempt from subword splitting and from attaching annotation markers.
    pub preserve: bool,
    /// Auxiliary attributes attached to the token.
    pub features: Vec<String>,
}

impl Token {
    /// Creates a word token with the given surface.
    #[must_use]
    pub fn new(surface: impl Into<String>) -> Self {
        Self {
            surface: surface.into(),
            ..Self::default()
        }
    }

    /// Returns `true` when the surface is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.surface.is_empty()
    }

    /// Returns `true` when the surface uses the placeholder syntax.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        is_placeholder(&self.surface)
    }

    /// Number of characters of the surface.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.surface.chars().count()
    }

    /// Returns `true` when at least one feature is attached.
    #[must_use]
    pub fn has_features(&self) -> bool {
        !self.features.is_empty()
    }

    /// Appends a feature value.
    pub fn append_feature(&mut self, feature: impl Into<String>) {
        self.features.push(feature.into());
    }

    /// Lowercases the surface and records its casing. Placeholders are left untouched.
    pub fn lowercase(&mut self) {
        if self.is_placeholder() {
            return;
        }
        let (lowered, casing) = casing::lowercase_token(&self.surface);
        self.surface = lowered;
        self.casing = casing;
    }
}

/// Returns `true` if `text` contains a placeholder, i.e. an opening bracket followed,
/// at least one character later, by a closing bracket.
#[must_use]
pub fn is_placeholder(text: &str) -> bool {
    let Some(begin) = text.find(PLACEHOLDER_OPEN) else {
        return false;
    };
    text[begin + PLACEHOLDER_OPEN.len()..]
        .match_indices(PLACEHOLDER_CLOSE)
        .any(|(offset, _)| offset > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_predicate() {
        assert!(is_placeholder("｟a｠"));
        assert!(is_placeholder("x｟mrk_case_modifier_C｠y"));
        assert!(!is_placeholder("｟｠"));
        assert!(is_placeholder("｟｠x｠"));
        assert!(!is_placeholder("｟abc"));
        assert!(!is_placeholder("abc｠"));
    }

    #[test]
    fn casing_codes_round_trip() {
        for casing in [
            Casing::None,
            Casing::Lowercase,
            Casing::Uppercase,
            Casing::Capitalized,
            Casing::Mixed,
        ] {
            assert_eq!(Casing::from_char(casing.as_char()), casing);
        }
        assert_eq!(Casing::from_char('x'), Casing::None);
    }

    #[test]
    fn lowercase_skips_placeholders() {
        let mut token = Token::new("｟ABC｠");
        token.lowercase();
        assert_eq!(token.surface, "｟ABC｠");
        assert_eq!(token.casing, Casing::None);

        let mut token = Token::new("Hello");
        token.lowercase();
        assert_eq!(token.surface, "hello");
        assert_eq!(token.casing, Casing::Capitalized);
    }
}
