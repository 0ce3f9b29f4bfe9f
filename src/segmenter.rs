//! Mode-driven segmentation of raw text into annotated tokens.
//!
//! The segmenter walks the characters of the input once, keeping track of the class of the
//! previous character (letter, number, whitespace, other symbol, or placeholder) and of its
//! script. Token boundaries are introduced on class transitions according to the mode and the
//! `segment_*` options, and every boundary that was not whitespace in the input is recorded with
//! `join_left` / `join_right` flags so that the text can be rebuilt exactly.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::mem;

use crate::casing::update_casing;
use crate::config::{Mode, TokenizerOptions};
use crate::error::Result;
use crate::token::{Casing, Token, FEATURE_MARKER, PLACEHOLDER_CLOSE_CHAR, PLACEHOLDER_OPEN_CHAR};
use crate::unicode::{self, CharInfo, CharType, Script, ZERO_WIDTH_JOINER};

/// Number of characters seen per script name, plus `Numeric` and `Other`.
pub type AlphabetCounts = BTreeMap<String, usize>;

/// Prefix of an escaped character inside placeholders.
pub const PROTECTED_CHARACTER: &str = "％";

const HEX_WIDTH: usize = 4;

const SUBSTITUTES: &[(char, &str)] = &[
    ('▁', "_"),
    ('￭', "■"),
    ('￨', "│"),
    ('％', "%"),
    ('＃', "#"),
    ('：', ":"),
];

#[derive(Clone, Copy, PartialEq, Eq)]
struct State(u8);

impl State {
    const LETTER: Self = Self(1);
    const NUMBER: Self = Self(1 << 1);
    const SPACE: Self = Self(1 << 2);
    const OTHER: Self = Self(1 << 3);
    const PLACEHOLDER: Self = Self(1 << 4);
    const OTHER_SPACE: Self = Self(Self::OTHER.0 | Self::SPACE.0);

    fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 != 0
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Alphabet {
    Unknown,
    Script(Script),
    Placeholder,
    Number,
}

struct TokensBuilder {
    tokens: Vec<Token>,
    current: Token,
    current_length: usize,
    no_substitution: bool,
}

impl TokensBuilder {
    fn new(no_substitution: bool) -> Self {
        Self {
            tokens: Vec::new(),
            current: Token::default(),
            current_length: 0,
            no_substitution,
        }
    }

    fn is_new_token(&self) -> bool {
        self.current.is_empty()
    }

    fn segment(&mut self) {
        if !self.current.is_empty() {
            self.tokens.push(mem::take(&mut self.current));
            self.current_length = 0;
        }
    }

    fn join_previous(&mut self) {
        if let Some(previous) = self.tokens.last_mut() {
            previous.join_right = true;
        }
    }

    fn push_str(&mut self, text: &str) {
        self.current.surface.push_str(text);
        self.current_length += 1;
    }

    fn append(&mut self, c: &CharInfo<'_>) {
        self.push_str(c.data);
    }

    fn append_all(&mut self, chars: &[CharInfo<'_>]) {
        for c in chars {
            self.append(c);
        }
    }

    fn safe_append(&mut self, c: &CharInfo<'_>) {
        if !self.no_substitution {
            if let Some((_, substitute)) = SUBSTITUTES.iter().find(|(from, _)| *from == c.value) {
                self.push_str(substitute);
                return;
            }
        }
        self.append(c);
    }

    fn escape_append(&mut self, c: &CharInfo<'_>) {
        if self.no_substitution {
            self.append(c);
        } else {
            self.push_str(&escape_character(c.value));
        }
    }

    fn finish(mut self) -> Vec<Token> {
        self.segment();
        self.tokens
    }
}

fn escape_character(c: char) -> String {
    format!("{PROTECTED_CHARACTER}{:0width$X}", u32::from(c), width = HEX_WIDTH)
}

/// Writes whitespace characters of `text` as `％XXXX` escapes, so that the text survives being
/// joined with other words on whitespace.
#[must_use]
pub fn escape_whitespace(text: &str) -> Cow<'_, str> {
    if !text.chars().any(char::is_whitespace) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if c.is_whitespace() {
            escaped.push_str(&escape_character(c));
        } else {
            escaped.push(c);
        }
    }
    Cow::Owned(escaped)
}

/// Replaces `％XXXX` escapes with the character they encode.
#[must_use]
pub fn unescape_characters(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(index) = rest.find(PROTECTED_CHARACTER) {
        result.push_str(&rest[..index]);
        let after = &rest[index + PROTECTED_CHARACTER.len()..];
        let decoded = after
            .get(..HEX_WIDTH)
            .filter(|code| code.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|code| u32::from_str_radix(code, 16).ok())
            .and_then(char::from_u32);
        match decoded {
            Some(c) => {
                result.push(c);
                rest = &after[HEX_WIDTH..];
            }
            None => {
                result.push_str(PROTECTED_CHARACTER);
                rest = after;
            }
        }
    }
    result.push_str(rest);
    result
}

fn next_main_char(chars: &[CharInfo<'_>], offset: usize) -> usize {
    let mut next = offset + 1;
    while next < chars.len() && chars[next].char_type == CharType::Mark {
        next += 1;
    }
    next
}

fn is_skipped(c: &CharInfo<'_>) -> bool {
    (u32::from(c.value) < 32 && c.char_type != CharType::Separator) || c.value == '\u{FEFF}'
}

/// Splits text into [`Token`]s according to the segmentation options.
#[derive(Debug, Clone)]
pub struct Segmenter {
    mode: Mode,
    no_substitution: bool,
    with_separators: bool,
    prior_joiner: Option<char>,
    preserve_placeholders: bool,
    preserve_segmented_tokens: bool,
    segment_case: bool,
    segment_numbers: bool,
    segment_alphabet: Vec<Script>,
    segment_alphabet_change: bool,
}

impl Segmenter {
    /// Builds a segmenter from validated options.
    pub fn new(options: &TokenizerOptions) -> Result<Self> {
        Ok(Self {
            mode: options.mode,
            no_substitution: options.no_substitution,
            with_separators: options.with_separators,
            prior_joiner: if options.support_prior_joiners {
                options.joiner_char()
            } else {
                None
            },
            preserve_placeholders: options.preserve_placeholders,
            preserve_segmented_tokens: options.preserve_segmented_tokens,
            segment_case: options.segment_case,
            segment_numbers: options.segment_numbers,
            segment_alphabet: options.segment_scripts()?,
            segment_alphabet_change: options.segment_alphabet_change,
        })
    }

    /// Conservative segmenter with every option at its default.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            mode: Mode::Conservative,
            no_substitution: false,
            with_separators: false,
            prior_joiner: None,
            preserve_placeholders: false,
            preserve_segmented_tokens: false,
            segment_case: false,
            segment_numbers: false,
            segment_alphabet: Vec::new(),
            segment_alphabet_change: false,
        }
    }

    /// Segments `text`. Empty input yields no tokens.
    #[must_use]
    pub fn segment(&self, text: &str) -> Vec<Token> {
        self.segment_impl(text, None)
    }

    /// Segments `text` and counts the characters seen per script.
    pub fn segment_with_alphabets(&self, text: &str, alphabets: &mut AlphabetCounts) -> Vec<Token> {
        self.segment_impl(text, Some(alphabets))
    }

    fn segment_impl(&self, text: &str, alphabets: Option<&mut AlphabetCounts>) -> Vec<Token> {
        if text.is_empty() {
            return Vec::new();
        }
        match self.mode {
            Mode::None => self.segment_on_placeholders(text, true),
            Mode::Space => self.segment_on_spaces(text),
            Mode::Conservative | Mode::Aggressive | Mode::Char => {
                self.segment_text(text, alphabets)
            }
        }
    }

    fn segment_on_spaces(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        for chunk in text.split(' ').filter(|chunk| !chunk.is_empty()) {
            let mut fields = chunk.split(FEATURE_MARKER);
            let surface = fields.next().unwrap_or_default();
            let features: Vec<&str> = fields.collect();
            let mut sub_tokens = self.segment_on_placeholders(surface, false);
            for token in &mut sub_tokens {
                for feature in &features {
                    token.append_feature(*feature);
                }
            }
            tokens.extend(sub_tokens);
        }
        tokens
    }

    fn segment_on_placeholders(&self, text: &str, split_on_whitespace: bool) -> Vec<Token> {
        let chars = unicode::chars_info(text);
        let mut builder = TokensBuilder::new(self.no_substitution);
        let mut in_placeholder = false;

        for (i, c) in chars.iter().enumerate() {
            let followed_by_separator = chars
                .get(i + 1)
                .map_or(true, |next| next.char_type == CharType::Separator);

            if in_placeholder {
                if c.char_type == CharType::Separator {
                    builder.escape_append(c);
                    continue;
                }
                builder.append(c);
                if c.value == PLACEHOLDER_CLOSE_CHAR {
                    if !followed_by_separator {
                        builder.current.join_right = true;
                    }
                    if self.preserve_placeholders || self.preserve_segmented_tokens {
                        builder.current.preserve = true;
                    }
                    builder.segment();
                    in_placeholder = false;
                }
            } else if self.prior_joiner == Some(c.value) {
                if builder.is_new_token() {
                    builder.current.join_left = true;
                } else {
                    builder.current.join_right = true;
                    builder.segment();
                }
            } else if split_on_whitespace && c.char_type == CharType::Separator {
                builder.segment();
                if self.with_separators {
                    builder.append(c);
                    if !followed_by_separator {
                        builder.segment();
                    }
                }
            } else if c.value == PLACEHOLDER_OPEN_CHAR {
                if !builder.is_new_token() {
                    if i > 0 && chars[i - 1].char_type != CharType::Separator {
                        builder.current.join_right = true;
                    }
                    if self.preserve_segmented_tokens {
                        builder.current.preserve = true;
                    }
                    builder.segment();
                }
                builder.append(c);
                in_placeholder = true;
            } else {
                builder.safe_append(c);
            }
        }

        builder.finish()
    }

    fn splits_script(&self, alphabet: Alphabet) -> bool {
        matches!(alphabet, Alphabet::Script(script) if self.segment_alphabet.contains(&script))
    }

    fn segment_text(&self, text: &str, mut alphabets: Option<&mut AlphabetCounts>) -> Vec<Token> {
        let chars = unicode::chars_info(text);
        let mut builder = TokensBuilder::new(self.no_substitution);
        let mut state = State::SPACE;
        let mut prev_alphabet = Alphabet::Unknown;
        let mut i = 0;

        while i < chars.len() {
            let letter = state.contains(State::LETTER);
            let space = state.contains(State::SPACE);
            let number = state.contains(State::NUMBER);
            let other = state.contains(State::OTHER);
            let placeholder = state.contains(State::PLACEHOLDER);

            let c = &chars[i];
            let v = c.value;
            if is_skipped(c) {
                i += 1;
                continue;
            }

            let next_index = next_main_char(&chars, i);
            let next_c = chars.get(next_index);
            let marks = &chars[i + 1..next_index];
            let mut advance_to = i + 1;

            if placeholder {
                if v == PLACEHOLDER_CLOSE_CHAR {
                    builder.append(c);
                    if self.preserve_placeholders {
                        builder.current.preserve = true;
                    }
                    prev_alphabet = Alphabet::Placeholder;
                    state = State::LETTER;
                } else if c.char_type == CharType::Separator {
                    builder.escape_append(c);
                } else {
                    builder.append(c);
                }
            } else if v == PLACEHOLDER_OPEN_CHAR {
                if !space {
                    builder.segment();
                    if (letter && prev_alphabet != Alphabet::Placeholder) || number {
                        builder.current.join_left = true;
                    } else {
                        builder.join_previous();
                    }
                } else if other && builder.is_new_token() {
                    builder.join_previous();
                }
                builder.append(c);
                state = State::PLACEHOLDER;
            } else if c.char_type == CharType::Separator {
                if !marks.is_empty() {
                    // A separator carrying combining marks is kept as an escaped symbol.
                    if !space || other {
                        builder.segment();
                        builder.current.join_left = true;
                    }
                    builder.escape_append(c);
                    builder.append_all(marks);
                    builder.segment();
                    advance_to = next_index;
                    state = State::OTHER_SPACE;
                } else {
                    if !space {
                        builder.segment();
                    }
                    if v == ZERO_WIDTH_JOINER {
                        let glues_number = number
                            && next_c.is_some_and(|next| next.char_type == CharType::Letter);
                        if other || glues_number {
                            builder.join_previous();
                        } else {
                            builder.segment();
                            builder.current.join_left = true;
                        }
                    } else if self.with_separators {
                        builder.append(c);
                        if next_c.map_or(true, |next| next.char_type != CharType::Separator) {
                            builder.segment();
                        }
                    }
                    state = State::SPACE;
                }
            } else if self.prior_joiner == Some(v) {
                if other {
                    builder.join_previous();
                } else if space {
                    builder.current.join_left = true;
                } else {
                    builder.segment();
                    builder.join_previous();
                    state = State::SPACE;
                }
            } else {
                let mut is_letter = c.char_type == CharType::Letter;
                let is_number = c.char_type == CharType::Number;
                let mut alphabet = if is_letter {
                    Script::of(v).map_or(Alphabet::Unknown, Alphabet::Script)
                } else {
                    Alphabet::Unknown
                };

                if let Some(counts) = alphabets.as_deref_mut() {
                    let name = match alphabet {
                        Alphabet::Script(script) => script.name(),
                        _ if is_number => "Numeric",
                        _ => "Other",
                    };
                    *counts.entry(name.to_owned()).or_insert(0) += 1;
                }

                if self.mode == Mode::Conservative
                    && (is_number
                        || (v == '-' && letter)
                        || v == '_'
                        || (letter
                            && (v == '.' || v == ',')
                            && next_c.is_some_and(|next| {
                                matches!(next.char_type, CharType::Number | CharType::Letter)
                            })))
                {
                    is_letter = true;
                    alphabet = Alphabet::Number;
                }

                if is_letter && self.mode != Mode::Char {
                    let new_casing =
                        update_casing(builder.current.casing, c.case_type, builder.current_length);

                    let mut segmented_by_rule = false;
                    let split = if letter {
                        let same_script = prev_alphabet == alphabet && self.splits_script(alphabet);
                        let script_change =
                            prev_alphabet != alphabet && self.segment_alphabet_change;
                        let mixed_case = self.segment_case && new_casing == Casing::Mixed;
                        segmented_by_rule = same_script || script_change || mixed_case;
                        segmented_by_rule || prev_alphabet == Alphabet::Placeholder
                    } else {
                        !space
                    };

                    if split {
                        builder.current.join_right = true;
                        if self.preserve_segmented_tokens && segmented_by_rule {
                            builder.current.preserve = true;
                        }
                        builder.segment();
                        builder.current.casing =
                            update_casing(builder.current.casing, c.case_type, 0);
                    } else {
                        builder.current.casing = new_casing;
                        if other && builder.is_new_token() {
                            builder.join_previous();
                        }
                    }

                    builder.safe_append(c);
                    builder.append_all(marks);
                    advance_to = next_index;
                    state = State::LETTER;
                    prev_alphabet = alphabet;
                } else if is_number && self.mode != Mode::Char {
                    if letter || (number && self.segment_numbers) || (!number && !space) {
                        if self.preserve_segmented_tokens && number && self.segment_numbers {
                            builder.current.preserve = true;
                        }
                        builder.segment();
                        if !letter || prev_alphabet == Alphabet::Placeholder {
                            builder.join_previous();
                        } else {
                            builder.current.join_left = true;
                        }
                    } else if other {
                        builder.join_previous();
                    }

                    builder.safe_append(c);
                    builder.append_all(marks);
                    advance_to = next_index;
                    state = State::NUMBER;
                } else {
                    if !space || other {
                        builder.segment();
                        builder.current.join_left = true;
                    }
                    builder.safe_append(c);
                    builder.append_all(marks);
                    advance_to = next_index;
                    builder.segment();
                    state = State::OTHER_SPACE;
                }
            }

            i = advance_to;
        }

        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter(options: TokenizerOptions) -> Segmenter {
        Segmenter::new(&options.normalized().unwrap()).unwrap()
    }

    fn surfaces(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|token| token.surface.as_str()).collect()
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        for mode in [Mode::None, Mode::Space, Mode::Conservative, Mode::Aggressive, Mode::Char] {
            assert!(segmenter(TokenizerOptions::with_mode(mode)).segment("").is_empty());
        }
    }

    #[test]
    fn conservative_keeps_compounds_together() {
        let tokens = segmenter(TokenizerOptions::default()).segment(
            "Your Hardware-Enablement Stack (HWE) is supported until April 2019.",
        );
        assert_eq!(
            surfaces(&tokens),
            vec![
                "Your",
                "Hardware-Enablement",
                "Stack",
                "(",
                "HWE",
                ")",
                "is",
                "supported",
                "until",
                "April",
                "2019",
                "."
            ]
        );
        assert!(tokens[3].join_right);
        assert!(!tokens[3].join_left);
        assert!(tokens[5].join_left);
        assert!(tokens[11].join_left);
    }

    #[test]
    fn conservative_absorbs_number_punctuation() {
        let tokens = segmenter(TokenizerOptions::default()).segment("1,000.5 km_h, a-");
        assert_eq!(surfaces(&tokens), vec!["1,000.5", "km_h", ",", "a-"]);
    }

    #[test]
    fn aggressive_splits_every_class_change() {
        let tokens =
            segmenter(TokenizerOptions::with_mode(Mode::Aggressive)).segment("Isn't it so-greatly MP3 $1");
        assert_eq!(
            surfaces(&tokens),
            vec!["Isn", "'", "t", "it", "so", "-", "greatly", "MP", "3", "$", "1"]
        );
        assert!(tokens[1].join_left && tokens[1].join_right);
        assert!(tokens[8].join_left);
        assert!(tokens[9].join_right);
        assert!(!tokens[10].join_left);
    }

    #[test]
    fn space_mode_splits_on_spaces_and_reads_features() {
        let tokens = segmenter(TokenizerOptions::with_mode(Mode::Space))
            .segment("  Hello   World ");
        assert_eq!(surfaces(&tokens), vec!["Hello", "World"]);

        let tokens = segmenter(TokenizerOptions::with_mode(Mode::Space))
            .segment("Hello￨12￨AB world￨34￨CD");
        assert_eq!(tokens[0].features, vec!["12", "AB"]);
        assert_eq!(tokens[1].features, vec!["34", "CD"]);
    }

    #[test]
    fn char_mode_emits_every_character() {
        let tokens = segmenter(TokenizerOptions::with_mode(Mode::Char)).segment("  Hello   World 123.");
        assert_eq!(
            surfaces(&tokens),
            vec!["H", "e", "l", "l", "o", "W", "o", "r", "l", "d", "1", "2", "3", "."]
        );
        assert!(tokens[1].join_left);
        assert!(!tokens[5].join_left);
    }

    #[test]
    fn placeholders_are_atomic() {
        let seg = segmenter(TokenizerOptions::default());
        let tokens = seg.segment("｟1,023｠km");
        assert_eq!(surfaces(&tokens), vec!["｟1,023｠", "km"]);
        assert!(tokens[0].join_right);

        let tokens = seg.segment("A｟380｠");
        assert_eq!(surfaces(&tokens), vec!["A", "｟380｠"]);
        assert!(tokens[1].join_left);

        let tokens = seg.segment("1｟ABCD｠0");
        assert_eq!(surfaces(&tokens), vec!["1", "｟ABCD｠", "0"]);
        assert!(tokens[1].join_left && tokens[1].join_right);
    }

    #[test]
    fn none_mode_escapes_placeholder_separators() {
        let seg = segmenter(TokenizerOptions::with_mode(Mode::None));
        let tokens = seg.segment("｟a b c｠");
        assert_eq!(surfaces(&tokens), vec!["｟a％0020b％0020c｠"]);

        let tokens = seg.segment("Hello, World｟x｠!");
        assert_eq!(surfaces(&tokens), vec!["Hello,", "World", "｟x｠", "!"]);
        assert!(tokens[1].join_right);
        assert!(tokens[2].join_right);
    }

    #[test]
    fn separators_can_be_kept() {
        let options = TokenizerOptions {
            mode: Mode::Aggressive,
            with_separators: true,
            ..TokenizerOptions::default()
        };
        let tokens = segmenter(options).segment("Hello World!");
        assert_eq!(surfaces(&tokens), vec!["Hello", " ", "World", "!"]);
        let tokens = segmenter(TokenizerOptions {
            with_separators: true,
            ..TokenizerOptions::default()
        })
        .segment("a  \tb");
        assert_eq!(surfaces(&tokens), vec!["a", "  \t", "b"]);
    }

    #[test]
    fn reserved_characters_are_substituted() {
        let tokens = segmenter(TokenizerOptions::with_mode(Mode::Aggressive)).segment("a▁b￭c");
        assert_eq!(surfaces(&tokens), vec!["a", "_", "b", "■", "c"]);

        let tokens = segmenter(TokenizerOptions {
            mode: Mode::Aggressive,
            no_substitution: true,
            ..TokenizerOptions::default()
        })
        .segment("a▁b");
        assert_eq!(surfaces(&tokens), vec!["a", "▁", "b"]);
    }

    #[test]
    fn segment_numbers_and_case() {
        let options = TokenizerOptions {
            mode: Mode::Aggressive,
            segment_numbers: true,
            segment_case: true,
            ..TokenizerOptions::default()
        };
        let tokens = segmenter(options).segment("1984 WiFi");
        assert_eq!(surfaces(&tokens), vec!["1", "9", "8", "4", "Wi", "Fi"]);
        assert!(tokens[0].join_right && tokens[2].join_right);
        assert!(tokens[4].join_right);
        assert!(!tokens[4].preserve);
    }

    #[test]
    fn segmented_tokens_can_be_preserved() {
        let options = TokenizerOptions {
            mode: Mode::Aggressive,
            segment_case: true,
            preserve_segmented_tokens: true,
            ..TokenizerOptions::default()
        };
        let tokens = segmenter(options).segment("WiFi");
        assert!(tokens[0].preserve);
        assert!(!tokens[1].preserve);
    }

    #[test]
    fn alphabet_segmentation_splits_listed_scripts() {
        let options = TokenizerOptions {
            segment_alphabet: vec!["Han".into()],
            ..TokenizerOptions::default()
        };
        let tokens = segmenter(options).segment("測試 abc");
        assert_eq!(surfaces(&tokens), vec!["測", "試", "abc"]);
        assert!(tokens[0].join_right);

        let options = TokenizerOptions {
            segment_alphabet_change: true,
            ..TokenizerOptions::default()
        };
        let tokens = segmenter(options).segment("rawБыстро");
        assert_eq!(surfaces(&tokens), vec!["raw", "Быстро"]);
    }

    #[test]
    fn combining_marks_stay_attached() {
        let tokens = segmenter(TokenizerOptions::with_mode(Mode::Aggressive))
            .segment("e\u{0301}te\u{0301} !\u{0301}");
        assert_eq!(surfaces(&tokens), vec!["e\u{0301}te\u{0301}", "!\u{0301}"]);
    }

    #[test]
    fn zero_width_joiner_glues_neighbours() {
        let tokens = segmenter(TokenizerOptions::default()).segment("a\u{200D}b");
        assert_eq!(surfaces(&tokens), vec!["a", "b"]);
        assert!(tokens[1].join_left);
    }

    #[test]
    fn prior_joiners_are_consumed() {
        let options = TokenizerOptions {
            support_prior_joiners: true,
            ..TokenizerOptions::default()
        };
        let tokens = segmenter(options).segment("pre￭ fix ￭ed");
        assert_eq!(surfaces(&tokens), vec!["pre", "fix", "ed"]);
        assert!(tokens[0].join_right);
        assert!(tokens[2].join_left);
    }

    #[test]
    fn alphabet_statistics_are_counted() {
        let mut counts = AlphabetCounts::new();
        segmenter(TokenizerOptions::default()).segment_with_alphabets("ab 12 !測", &mut counts);
        assert_eq!(counts.get("Latin"), Some(&2));
        assert_eq!(counts.get("Numeric"), Some(&2));
        assert_eq!(counts.get("Other"), Some(&1));
        assert_eq!(counts.get("Han"), Some(&1));
    }

    #[test]
    fn unescape_restores_protected_characters() {
        assert_eq!(unescape_characters("a％0020b"), "a b");
        assert_eq!(unescape_characters("a％0020"), "a ");
        assert_eq!(unescape_characters("％ZZ"), "％ZZ");
        assert_eq!(unescape_characters("plain"), "plain");
    }

    #[test]
    fn whitespace_is_escaped() {
        assert_eq!(escape_whitespace("ab"), Cow::Borrowed("ab"));
        assert_eq!(escape_whitespace("  "), "％0020％0020");
        assert_eq!(escape_whitespace("a\tb"), "a％0009b");
        assert_eq!(unescape_characters(&escape_whitespace(" \u{3000}")), " \u{3000}");
    }
}
