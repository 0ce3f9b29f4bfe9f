//! Character classification used by the segmenter and the casing transform.

use std::ops::RangeInclusive;

mod script;

pub use script::Script;

/// Broad class of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharType {
    /// Whitespace or other separating character.
    Separator,
    /// Alphabetic character.
    Letter,
    /// Numeric character.
    Number,
    /// Combining mark attaching to the preceding character.
    Mark,
    /// Punctuation, symbols and anything else.
    Other,
}

/// Letter case of a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseType {
    /// Lowercase letter.
    Lower,
    /// Uppercase letter.
    Upper,
    /// Uncased character.
    None,
}

/// A character of the input together with its classification.
#[derive(Debug, Clone, Copy)]
pub struct CharInfo<'a> {
    /// UTF-8 slice of the character in the input.
    pub data: &'a str,
    /// The character itself.
    pub value: char,
    /// Broad character class.
    pub char_type: CharType,
    /// Letter case.
    pub case_type: CaseType,
}

/// Zero width joiner, handled as a separator that glues its neighbours.
pub const ZERO_WIDTH_JOINER: char = '\u{200D}';

// Unicode general category M (Mn, Mc, Me) for the blocks the segmenter meets in practice.
const MARK_RANGES: &[RangeInclusive<u32>] = &[
    0x0300..=0x036F,
    0x0483..=0x0489,
    0x0591..=0x05BD,
    0x05BF..=0x05BF,
    0x05C1..=0x05C2,
    0x05C4..=0x05C5,
    0x05C7..=0x05C7,
    0x0610..=0x061A,
    0x064B..=0x065F,
    0x0670..=0x0670,
    0x06D6..=0x06DC,
    0x06DF..=0x06E4,
    0x06E7..=0x06E8,
    0x06EA..=0x06ED,
    0x0711..=0x0711,
    0x0730..=0x074A,
    0x07A6..=0x07B0,
    0x07EB..=0x07F3,
    0x0816..=0x0819,
    0x081B..=0x0823,
    0x0825..=0x0827,
    0x0829..=0x082D,
    0x0859..=0x085B,
    0x08D3..=0x08E1,
    0x08E3..=0x0903,
    0x093A..=0x093C,
    0x093E..=0x094F,
    0x0951..=0x0957,
    0x0962..=0x0963,
    0x0981..=0x0983,
    0x09BC..=0x09BC,
    0x09BE..=0x09C4,
    0x09C7..=0x09C8,
    0x09CB..=0x09CD,
    0x09D7..=0x09D7,
    0x09E2..=0x09E3,
    0x0A01..=0x0A03,
    0x0A3C..=0x0A3C,
    0x0A3E..=0x0A42,
    0x0A47..=0x0A48,
    0x0A4B..=0x0A4D,
    0x0A70..=0x0A71,
    0x0A81..=0x0A83,
    0x0ABC..=0x0ABC,
    0x0ABE..=0x0AC5,
    0x0AC7..=0x0AC9,
    0x0ACB..=0x0ACD,
    0x0B01..=0x0B03,
    0x0B3C..=0x0B3C,
    0x0B3E..=0x0B44,
    0x0B47..=0x0B48,
    0x0B4B..=0x0B4D,
    0x0B82..=0x0B82,
    0x0BBE..=0x0BC2,
    0x0BC6..=0x0BC8,
    0x0BCA..=0x0BCD,
    0x0C00..=0x0C04,
    0x0C3E..=0x0C44,
    0x0C46..=0x0C48,
    0x0C4A..=0x0C4D,
    0x0C81..=0x0C83,
    0x0CBC..=0x0CBC,
    0x0CBE..=0x0CC4,
    0x0CC6..=0x0CC8,
    0x0CCA..=0x0CCD,
    0x0D00..=0x0D03,
    0x0D3B..=0x0D3C,
    0x0D3E..=0x0D44,
    0x0D46..=0x0D48,
    0x0D4A..=0x0D4D,
    0x0D81..=0x0D83,
    0x0DCA..=0x0DCA,
    0x0DCF..=0x0DD4,
    0x0DD6..=0x0DD6,
    0x0DD8..=0x0DDF,
    0x0E31..=0x0E31,
    0x0E34..=0x0E3A,
    0x0E47..=0x0E4E,
    0x0EB1..=0x0EB1,
    0x0EB4..=0x0EBC,
    0x0EC8..=0x0ECD,
    0x0F18..=0x0F19,
    0x0F35..=0x0F35,
    0x0F37..=0x0F37,
    0x0F39..=0x0F39,
    0x0F3E..=0x0F3F,
    0x0F71..=0x0F84,
    0x0F86..=0x0F87,
    0x0F8D..=0x0FBC,
    0x102B..=0x103E,
    0x1056..=0x1059,
    0x135D..=0x135F,
    0x1712..=0x1714,
    0x17B4..=0x17D3,
    0x180B..=0x180D,
    0x1920..=0x193B,
    0x1AB0..=0x1AFF,
    0x1B00..=0x1B04,
    0x1B34..=0x1B44,
    0x1DC0..=0x1DFF,
    0x20D0..=0x20F0,
    0x2CEF..=0x2CF1,
    0x2DE0..=0x2DFF,
    0x302A..=0x302F,
    0x3099..=0x309A,
    0xA66F..=0xA672,
    0xA674..=0xA67D,
    0xA69E..=0xA69F,
    0xA8E0..=0xA8F1,
    0xFB1E..=0xFB1E,
    0xFE00..=0xFE0F,
    0xFE20..=0xFE2F,
    0xE0100..=0xE01EF,
];

/// Returns `true` for combining marks.
#[must_use]
pub fn is_mark(c: char) -> bool {
    let cp = u32::from(c);
    MARK_RANGES.iter().any(|range| range.contains(&cp))
}

/// Returns `true` for whitespace and the zero width joiner.
#[must_use]
pub fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ZERO_WIDTH_JOINER
}

/// Returns `true` for alphabetic characters that are not combining marks.
#[must_use]
pub fn is_letter(c: char) -> bool {
    c.is_alphabetic() && !is_mark(c)
}

/// Returns `true` for numeric characters.
#[must_use]
pub fn is_number(c: char) -> bool {
    c.is_numeric()
}

/// Classifies a character.
#[must_use]
pub fn char_type(c: char) -> CharType {
    if is_separator(c) {
        CharType::Separator
    } else if is_mark(c) {
        CharType::Mark
    } else if is_letter(c) {
        CharType::Letter
    } else if is_number(c) {
        CharType::Number
    } else {
        CharType::Other
    }
}

/// Letter case of a character.
#[must_use]
pub fn case_type(c: char) -> CaseType {
    if c.is_lowercase() {
        CaseType::Lower
    } else if c.is_uppercase() {
        CaseType::Upper
    } else {
        CaseType::None
    }
}

/// Simple lowercase mapping: characters whose lowercase form is not a single character are kept.
#[must_use]
pub fn to_lower(c: char) -> char {
    single_char(c.to_lowercase()).unwrap_or(c)
}

/// Simple uppercase mapping: characters whose uppercase form is not a single character are kept.
#[must_use]
pub fn to_upper(c: char) -> char {
    single_char(c.to_uppercase()).unwrap_or(c)
}

fn single_char(mut mapping: impl Iterator<Item = char>) -> Option<char> {
    let first = mapping.next()?;
    match mapping.next() {
        Some(_) => None,
        None => Some(first),
    }
}

/// Splits `text` into classified characters.
#[must_use]
pub fn chars_info(text: &str) -> Vec<CharInfo<'_>> {
    text.char_indices()
        .map(|(offset, value)| CharInfo {
            data: &text[offset..offset + value.len_utf8()],
            value,
            char_type: char_type(value),
            case_type: case_type(value),
        })
        .collect()
}

/// Splits `text` into characters, keeping combining marks with the character they modify.
#[must_use]
pub fn explode_with_marks(text: &str) -> Vec<&str> {
    let mut pieces: Vec<&str> = Vec::with_capacity(text.len());
    let mut start: Option<usize> = None;
    for (offset, c) in text.char_indices() {
        if is_mark(c) && start.is_some() {
            continue;
        }
        if let Some(begin) = start {
            pieces.push(&text[begin..offset]);
        }
        start = Some(offset);
    }
    if let Some(begin) = start {
        pieces.push(&text[begin..]);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_characters() {
        assert_eq!(char_type('a'), CharType::Letter);
        assert_eq!(char_type('測'), CharType::Letter);
        assert_eq!(char_type('7'), CharType::Number);
        assert_eq!(char_type(' '), CharType::Separator);
        assert_eq!(char_type('\u{3000}'), CharType::Separator);
        assert_eq!(char_type(ZERO_WIDTH_JOINER), CharType::Separator);
        assert_eq!(char_type('\u{0301}'), CharType::Mark);
        assert_eq!(char_type('\u{093F}'), CharType::Mark);
        assert_eq!(char_type('!'), CharType::Other);
        assert_eq!(char_type('$'), CharType::Other);
    }

    #[test]
    fn case_mappings() {
        assert_eq!(case_type('a'), CaseType::Lower);
        assert_eq!(case_type('É'), CaseType::Upper);
        assert_eq!(case_type('1'), CaseType::None);
        assert_eq!(to_upper('é'), 'É');
        assert_eq!(to_lower('Ж'), 'ж');
        assert_eq!(to_upper('ß'), 'ß');
    }

    #[test]
    fn explode_keeps_marks_attached() {
        assert_eq!(explode_with_marks("ab"), vec!["a", "b"]);
        assert_eq!(
            explode_with_marks("e\u{0301}t\u{0300}\u{0301}"),
            vec!["e\u{0301}", "t\u{0300}\u{0301}"]
        );
        assert_eq!(explode_with_marks("\u{0301}a"), vec!["\u{0301}", "a"]);
        assert!(explode_with_marks("").is_empty());
    }
}
