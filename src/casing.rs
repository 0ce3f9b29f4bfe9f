//! Casing classification and the case markup transform.

use crate::token::{Casing, Token, TokenType, PLACEHOLDER_CLOSE, PLACEHOLDER_OPEN};
use crate::unicode::{self, CaseType};

const CASE_MODIFIER_PREFIX: &str = "mrk_case_modifier_";
const CASE_REGION_BEGIN_PREFIX: &str = "mrk_begin_case_region_";
const CASE_REGION_END_PREFIX: &str = "mrk_end_case_region_";

/// Kind of a case markup token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseMarkupType {
    /// Not a case markup token.
    None,
    /// Applies a casing to the next token only.
    Modifier,
    /// Opens a region of tokens sharing a casing.
    RegionBegin,
    /// Closes the current region.
    RegionEnd,
}

/// Markup to emit around a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCaseMarkup {
    /// Markup emitted before the token.
    pub prefix: CaseMarkupType,
    /// Markup emitted after the token.
    pub suffix: CaseMarkupType,
    /// Casing carried by the markup.
    pub casing: Casing,
}

/// Folds one more letter into the casing of a token.
#[must_use]
pub fn update_casing(current: Casing, letter_case: CaseType, letter_index: usize) -> Casing {
    match (current, letter_case) {
        (Casing::None, CaseType::Lower) => Casing::Lowercase,
        (Casing::None, CaseType::Upper) => Casing::Capitalized,
        (Casing::Lowercase, CaseType::Upper) => Casing::Mixed,
        (Casing::Capitalized, CaseType::Upper) if letter_index == 1 => Casing::Uppercase,
        (Casing::Capitalized, CaseType::Upper) => Casing::Mixed,
        (Casing::Uppercase, CaseType::Lower) => Casing::Mixed,
        (casing, _) => casing,
    }
}

/// Lowercases `token` and returns the casing it had.
#[must_use]
pub fn lowercase_token(token: &str) -> (String, Casing) {
    let mut casing = Casing::None;
    let mut lowered = String::with_capacity(token.len());
    let mut letter_index = 0;
    for c in token.chars() {
        if unicode::is_letter(c) {
            let letter_case = unicode::case_type(c);
            casing = update_casing(casing, letter_case, letter_index);
            letter_index += 1;
            if letter_case == CaseType::Upper {
                lowered.push(unicode::to_lower(c));
                continue;
            }
        }
        lowered.push(c);
    }
    (lowered, casing)
}

/// Re-applies `casing` to a lowercase token.
#[must_use]
pub fn restore_token_casing(token: &str, casing: Casing) -> String {
    match casing {
        Casing::None | Casing::Lowercase | Casing::Mixed => token.to_owned(),
        Casing::Uppercase => token.chars().map(unicode::to_upper).collect(),
        Casing::Capitalized => {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => {
                    let mut restored = String::with_capacity(token.len());
                    restored.push(unicode::to_upper(first));
                    restored.extend(chars);
                    restored
                }
                None => String::new(),
            }
        }
    }
}

fn placeholder_body(markup: &str) -> Option<&str> {
    markup
        .strip_prefix(PLACEHOLDER_OPEN)?
        .strip_suffix(PLACEHOLDER_CLOSE)
}

fn markup_matches(markup: &str, prefix: &str) -> bool {
    placeholder_body(markup)
        .and_then(|body| body.strip_prefix(prefix))
        .is_some_and(|code| code.chars().count() == 1)
}

/// Identifies a case markup token.
#[must_use]
pub fn read_case_markup(markup: &str) -> CaseMarkupType {
    if markup_matches(markup, CASE_MODIFIER_PREFIX) {
        CaseMarkupType::Modifier
    } else if markup_matches(markup, CASE_REGION_BEGIN_PREFIX) {
        CaseMarkupType::RegionBegin
    } else if markup_matches(markup, CASE_REGION_END_PREFIX) {
        CaseMarkupType::RegionEnd
    } else {
        CaseMarkupType::None
    }
}

/// Casing encoded in a case markup token.
#[must_use]
pub fn casing_from_markup(markup: &str) -> Casing {
    placeholder_body(markup)
        .and_then(|body| body.chars().last())
        .map_or(Casing::None, Casing::from_char)
}

/// Builds the markup token for `markup` and `casing`; `None` yields `None`.
#[must_use]
pub fn write_case_markup(markup: CaseMarkupType, casing: Casing) -> Option<String> {
    let prefix = match markup {
        CaseMarkupType::Modifier => CASE_MODIFIER_PREFIX,
        CaseMarkupType::RegionBegin => CASE_REGION_BEGIN_PREFIX,
        CaseMarkupType::RegionEnd => CASE_REGION_END_PREFIX,
        CaseMarkupType::None => return None,
    };
    Some(format!(
        "{PLACEHOLDER_OPEN}{prefix}{}{PLACEHOLDER_CLOSE}",
        casing.as_char()
    ))
}

// A later token continues the uppercase run if it is uppercase or a single capital letter,
// skipping over case invariant tokens.
fn has_connected_uppercase(tokens: &[Token], offset: usize) -> bool {
    for token in &tokens[offset + 1..] {
        match token.casing {
            Casing::Uppercase => return true,
            Casing::Capitalized if token.char_len() == 1 => return true,
            Casing::None => continue,
            _ => return false,
        }
    }
    false
}

fn numbers_only(text: &str) -> bool {
    text.chars().all(unicode::is_number)
}

/// Computes the markup to emit around each token.
///
/// Uppercase tokens open a region that is closed after the last token belonging to it. By
/// default a region only extends over the trailing subwords of the word that opened it; with
/// `soft` it also spans case invariant tokens and single capitals that connect to more
/// uppercase text.
#[must_use]
pub fn case_markups(tokens: &[Token], soft: bool) -> Vec<TokenCaseMarkup> {
    let mut markups: Vec<TokenCaseMarkup> = Vec::with_capacity(tokens.len());
    let mut in_region = false;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        let mut casing = token.casing;
        let mut prefix = CaseMarkupType::None;

        if in_region {
            let continues = if soft {
                casing == Casing::Uppercase
                    || (casing == Casing::Capitalized && token.char_len() == 1)
                    || (casing == Casing::None
                        && !token.is_placeholder()
                        && (has_connected_uppercase(tokens, i) || numbers_only(&token.surface)))
            } else {
                casing == Casing::Uppercase && token.token_type == TokenType::TrailingSubword
            };
            if !continues {
                if let Some(last) = markups.last_mut() {
                    last.suffix = CaseMarkupType::RegionEnd;
                }
                in_region = false;
                // Revisit the same token outside of the region.
                continue;
            }
            casing = Casing::Uppercase;
        } else if casing == Casing::Uppercase
            || (soft
                && casing == Casing::Capitalized
                && token.char_len() == 1
                && has_connected_uppercase(tokens, i))
        {
            casing = Casing::Uppercase;
            prefix = CaseMarkupType::RegionBegin;
            in_region = true;
        } else if casing == Casing::Capitalized {
            prefix = CaseMarkupType::Modifier;
        }

        markups.push(TokenCaseMarkup {
            prefix,
            suffix: CaseMarkupType::None,
            casing,
        });
        i += 1;
    }

    if in_region {
        if let Some(last) = markups.last_mut() {
            last.suffix = CaseMarkupType::RegionEnd;
        }
    }
    markups
}
