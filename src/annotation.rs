//! Joiner/spacer annotation codec and case markup materialization.
//!
//! [`serialize_tokens`] turns annotated [`Token`]s into plain strings: join flags become joiner or
//! spacer markers, casing becomes markup tokens or a feature column. [`parse_tokens`] reads such
//! strings back into tokens.

use crate::casing::{
    case_markups, casing_from_markup, lowercase_token, read_case_markup, write_case_markup,
    CaseMarkupType,
};
use crate::config::TokenizerOptions;
use crate::error::{Result, RtokError};
use crate::token::{Casing, Token, SPACER_MARKER};
use crate::unicode;

/// Tokens parsed from their string form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTokens {
    /// Parsed tokens; markup tokens are consumed.
    pub tokens: Vec<Token>,
    /// Index of the word each token was read from.
    pub index_map: Vec<usize>,
}

struct Output {
    words: Vec<String>,
    features: Vec<Vec<String>>,
    token_features: usize,
    case_feature: bool,
}

impl Output {
    fn push(&mut self, word: String, token: &Token, casing: Casing) {
        if word.is_empty() {
            return;
        }
        self.words.push(word);
        for (j, column) in self.features.iter_mut().take(self.token_features).enumerate() {
            column.push(token.features.get(j).cloned().unwrap_or_default());
        }
        if self.case_feature {
            if let Some(column) = self.features.last_mut() {
                column.push(casing.as_char().to_string());
            }
        }
    }
}

/// Materializes tokens as strings plus feature columns.
///
/// Feature columns are aligned with the returned words; with `case_feature` the casing column
/// comes last. Standalone markers carry the features of the token they annotate and the `N`
/// casing.
#[must_use]
pub fn serialize_tokens(
    tokens: &[Token],
    options: &TokenizerOptions,
) -> (Vec<String>, Vec<Vec<String>>) {
    let token_features = tokens.first().map_or(0, |token| token.features.len());
    let num_features = token_features + usize::from(options.case_feature);
    let mut out = Output {
        words: Vec::with_capacity(tokens.len()),
        features: vec![Vec::with_capacity(tokens.len()); num_features],
        token_features,
        case_feature: options.case_feature,
    };

    let markups = if options.case_markup {
        case_markups(tokens, options.soft_case_regions)
    } else {
        Vec::new()
    };

    for (i, token) in tokens.iter().enumerate() {
        let markup = markups.get(i);
        if let Some(word) = markup.and_then(|m| write_case_markup(m.prefix, m.casing)) {
            out.push(word, token, Casing::None);
        }

        let mut prefix: Option<&str> = None;
        let mut suffix: Option<&str> = None;
        let mut attach = !token.preserve;

        if options.joiner_annotate {
            if token.join_left && i > 0 {
                prefix = Some(options.joiner.as_str());
            }
            if token.join_right && i + 1 < tokens.len() {
                suffix = Some(options.joiner.as_str());
            }
            if token.spacer {
                attach = true;
            }
            attach = attach && !options.joiner_new;
        } else if options.spacer_annotate {
            let spaced = if i == 0 {
                token.spacer
            } else {
                !token.join_left && !tokens[i - 1].join_right
            };
            if spaced {
                prefix = Some(SPACER_MARKER);
            }
            attach = attach && !options.spacer_new;
        }

        if prefix.is_none() && suffix.is_none() {
            out.push(token.surface.clone(), token, token.casing);
        } else if attach {
            let word = format!(
                "{}{}{}",
                prefix.unwrap_or_default(),
                token.surface,
                suffix.unwrap_or_default()
            );
            out.push(word, token, token.casing);
        } else {
            if let Some(marker) = prefix {
                out.push(marker.to_owned(), token, Casing::None);
            }
            out.push(token.surface.clone(), token, token.casing);
            if let Some(marker) = suffix {
                out.push(marker.to_owned(), token, Casing::None);
            }
        }

        if let Some(word) = markup.and_then(|m| write_case_markup(m.suffix, m.casing)) {
            out.push(word, token, Casing::None);
        }
    }

    (out.words, out.features)
}

/// Reads the join flags of a single word and strips its markers.
///
/// A word made of a marker only yields an empty token carrying the join flags.
#[must_use]
pub fn annotate_word(word: &str, options: &TokenizerOptions) -> Token {
    let mut token = Token::default();
    let mut surface = word;

    if options.spacer_annotate {
        match surface.strip_prefix(SPACER_MARKER) {
            Some(rest) => surface = rest,
            None => token.join_left = true,
        }
    } else {
        let joiner = options.joiner.as_str();
        if let Some(rest) = surface.strip_suffix(joiner) {
            token.join_right = true;
            surface = rest;
        }
        if let Some(rest) = surface.strip_prefix(joiner) {
            token.join_left = true;
            surface = rest;
        } else if token.join_right && surface.is_empty() {
            token.join_left = true;
        }
    }

    token.surface = surface.to_owned();
    token
}

/// Casing a lowercased token had before `markup` was read for it.
///
/// Tokens without letters never carry a casing, and a lone letter in an uppercase region
/// classifies as capitalized.
fn markup_casing(token: &Token, markup: Casing) -> Casing {
    if token.is_empty() || token.is_placeholder() {
        return Casing::None;
    }
    let (_, natural) = lowercase_token(&token.surface);
    match markup {
        _ if natural == Casing::None => Casing::None,
        Casing::None => natural,
        Casing::Uppercase
            if token.surface.chars().filter(|&c| unicode::is_letter(c)).count() == 1 =>
        {
            Casing::Capitalized
        }
        casing => casing,
    }
}

fn feature_at<'a>(column: &'a [String], index: usize) -> Result<&'a str> {
    column.get(index).map(String::as_str).ok_or_else(|| {
        RtokError::MissingFeature(format!(
            "feature column has {} values but word {index} was requested",
            column.len()
        ))
    })
}

/// Parses words and feature columns back into tokens.
///
/// Case markup tokens set the casing of the following tokens and are consumed. A case modifier
/// is forwarded over empty tokens (standalone markers). With `case_feature` the last feature
/// column holds the casing.
pub fn parse_tokens<S: AsRef<str>>(
    words: &[S],
    features: &[Vec<String>],
    options: &TokenizerOptions,
) -> Result<ParsedTokens> {
    let mut parsed = ParsedTokens {
        tokens: Vec::with_capacity(words.len()),
        index_map: Vec::with_capacity(words.len()),
    };

    let (token_columns, case_column) = if options.case_feature {
        match features.split_last() {
            Some((case_column, rest)) => (rest, Some(case_column)),
            None => {
                return Err(RtokError::MissingFeature(
                    "case_feature is enabled but no case column was given".into(),
                ))
            }
        }
    } else {
        (features, None)
    };

    let mut case_region = Casing::None;
    let mut case_modifier = Casing::None;

    for (i, word) in words.iter().enumerate() {
        let word = word.as_ref();
        if word.is_empty() {
            continue;
        }

        if let Some(column) = case_column {
            let code = feature_at(column, i)?;
            case_modifier = code.chars().next().map_or(Casing::None, Casing::from_char);
        } else {
            match read_case_markup(word) {
                CaseMarkupType::RegionBegin => {
                    case_region = casing_from_markup(word);
                    case_modifier = Casing::None;
                    continue;
                }
                CaseMarkupType::RegionEnd => {
                    case_region = Casing::None;
                    case_modifier = Casing::None;
                    continue;
                }
                CaseMarkupType::Modifier => {
                    case_modifier = casing_from_markup(word);
                    continue;
                }
                CaseMarkupType::None => {
                    if case_modifier == Casing::None {
                        case_modifier = case_region;
                    }
                }
            }
        }

        let mut token = annotate_word(word, options);
        token.casing = if options.case_markup {
            markup_casing(&token, case_modifier)
        } else {
            case_modifier
        };
        for column in token_columns {
            token.append_feature(feature_at(column, i)?);
        }
        if !token.is_empty() {
            case_modifier = Casing::None;
        }

        parsed.tokens.push(token);
        parsed.index_map.push(i);
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    fn joined(surface: &str, join_left: bool, join_right: bool) -> Token {
        Token {
            join_left,
            join_right,
            ..Token::new(surface)
        }
    }

    fn joiner_options() -> TokenizerOptions {
        TokenizerOptions {
            mode: Mode::Aggressive,
            joiner_annotate: true,
            ..TokenizerOptions::default()
        }
    }

    #[test]
    fn joiners_attach_to_both_sides() {
        let tokens = vec![
            joined("Isn", false, false),
            joined("'", true, true),
            joined("t", false, false),
            joined("?", true, false),
        ];
        let (words, features) = serialize_tokens(&tokens, &joiner_options());
        assert_eq!(words, vec!["Isn", "￭'￭", "t", "￭?"]);
        assert!(features.is_empty());
    }

    #[test]
    fn preserved_tokens_get_standalone_markers() {
        let mut tokens = vec![joined("1", false, true), joined("2", false, false)];
        tokens[0].preserve = true;
        let (words, _) = serialize_tokens(&tokens, &joiner_options());
        assert_eq!(words, vec!["1", "￭", "2"]);
    }

    #[test]
    fn spacers_mark_whitespace() {
        let options = TokenizerOptions {
            spacer_annotate: true,
            ..TokenizerOptions::default()
        };
        let tokens = vec![
            joined("it", false, false),
            joined("so", false, false),
            joined("-", true, true),
            joined("greatly", false, false),
        ];
        let (words, _) = serialize_tokens(&tokens, &options);
        assert_eq!(words, vec!["it", "▁so", "-", "greatly"]);

        let new_options = TokenizerOptions {
            spacer_new: true,
            ..options
        };
        let (words, _) = serialize_tokens(&tokens, &new_options);
        assert_eq!(words, vec!["it", "▁", "so", "-", "greatly"]);
    }

    #[test]
    fn case_feature_column_is_last() {
        let options = TokenizerOptions {
            case_feature: true,
            ..joiner_options()
        };
        let mut first = joined("wi", false, true);
        first.casing = Casing::Capitalized;
        first.features = vec!["x".into()];
        let mut second = joined("fi", false, false);
        second.casing = Casing::Capitalized;
        second.features = vec!["y".into()];
        let (words, features) = serialize_tokens(&[first, second], &options);
        assert_eq!(words, vec!["wi￭", "fi"]);
        assert_eq!(features, vec![vec!["x", "y"], vec!["C", "C"]]);

        let parsed = parse_tokens(&words, &features, &options).unwrap();
        assert_eq!(parsed.tokens[0].casing, Casing::Capitalized);
        assert_eq!(parsed.tokens[0].features, vec!["x"]);
        assert!(parsed.tokens[0].join_right);
    }

    #[test]
    fn missing_case_feature_is_an_error() {
        let options = TokenizerOptions {
            case_feature: true,
            ..TokenizerOptions::default()
        };
        let err = parse_tokens(&["a"], &[], &options).expect_err("case column required");
        assert!(matches!(err, RtokError::MissingFeature(_)));
    }

    #[test]
    fn standalone_markers_parse_to_empty_tokens() {
        let token = annotate_word("￭", &joiner_options());
        assert!(token.is_empty() && token.join_left && token.join_right);

        let token = annotate_word("￭ab￭", &joiner_options());
        assert_eq!(token.surface, "ab");
        assert!(token.join_left && token.join_right);

        let spacer = TokenizerOptions {
            spacer_annotate: true,
            ..TokenizerOptions::default()
        };
        assert!(annotate_word("ab", &spacer).join_left);
        assert!(!annotate_word("▁ab", &spacer).join_left);
    }

    #[test]
    fn case_modifiers_are_forwarded_over_markers() {
        let options = TokenizerOptions {
            joiner_new: true,
            case_markup: true,
            ..joiner_options()
        };
        let words = ["hello", "｟mrk_case_modifier_C｠", "￭", "world", "!"];
        let parsed = parse_tokens(&words, &[], &options).unwrap();
        assert_eq!(parsed.tokens.len(), 4);
        assert_eq!(parsed.tokens[2].casing, Casing::Capitalized);
        assert_eq!(parsed.index_map, vec![0, 2, 3, 4]);
    }
}
