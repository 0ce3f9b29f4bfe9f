//! Script (alphabet) lookup by code point ranges.

use std::cmp::Ordering;
use std::fmt;

/// Code point blocks mapped to the script that owns them. Sorted by start code point.
const SCRIPT_RANGES: &[(u32, u32, &str)] = &[
    (0x0020, 0x007F, "Latin"),
    (0x00A0, 0x00FF, "Latin"),
    (0x0100, 0x017F, "Latin"),
    (0x0180, 0x024F, "Latin"),
    (0x0370, 0x03FF, "Greek"),
    (0x0400, 0x04FF, "Cyrillic"),
    (0x0500, 0x052F, "Cyrillic"),
    (0x0530, 0x058F, "Armenian"),
    (0x0590, 0x05FF, "Hebrew"),
    (0x0600, 0x06FF, "Arabic"),
    (0x0700, 0x074F, "Syriac"),
    (0x0780, 0x07BF, "Thaana"),
    (0x0900, 0x097F, "Devanagari"),
    (0x0980, 0x09FF, "Bengali"),
    (0x0A00, 0x0A7F, "Gurmukhi"),
    (0x0A80, 0x0AFF, "Gujarati"),
    (0x0B00, 0x0B7F, "Oriya"),
    (0x0B80, 0x0BFF, "Tamil"),
    (0x0C00, 0x0C7F, "Telugu"),
    (0x0C80, 0x0CFF, "Kannada"),
    (0x0D00, 0x0D7F, "Malayalam"),
    (0x0D80, 0x0DFF, "Sinhala"),
    (0x0E00, 0x0E7F, "Thai"),
    (0x0E80, 0x0EFF, "Lao"),
    (0x0F00, 0x0FFF, "Tibetan"),
    (0x1000, 0x109F, "Myanmar"),
    (0x10A0, 0x10FF, "Georgian"),
    (0x1100, 0x11FF, "Hangul"),
    (0x1200, 0x137F, "Ethiopic"),
    (0x13A0, 0x13FF, "Cherokee"),
    (0x1680, 0x169F, "Ogham"),
    (0x1700, 0x171F, "Tagalog"),
    (0x1720, 0x173F, "Hanunoo"),
    (0x1740, 0x175F, "Buhid"),
    (0x1760, 0x177F, "Tagbanwa"),
    (0x1780, 0x17FF, "Khmer"),
    (0x1800, 0x18AF, "Mongolian"),
    (0x1900, 0x194F, "Limbu"),
    (0x1E00, 0x1EFF, "Latin"),
    (0x1F00, 0x1FFF, "Greek"),
    (0x2800, 0x28FF, "Braille"),
    (0x2E80, 0x2EFF, "Han"),
    (0x2F00, 0x2FDF, "Kangxi"),
    (0x3040, 0x309F, "Hiragana"),
    (0x30A0, 0x30FF, "Katakana"),
    (0x3100, 0x312F, "Bopomofo"),
    (0x3130, 0x318F, "Hangul"),
    (0x3190, 0x319F, "Kanbun"),
    (0x31A0, 0x31BF, "Bopomofo"),
    (0x31F0, 0x31FF, "Katakana"),
    (0x3200, 0x32FF, "Han"),
    (0x3300, 0x33FF, "Han"),
    (0x3400, 0x4DBF, "Han"),
    (0x4E00, 0x9FFF, "Han"),
    (0xA000, 0xA48F, "Yi"),
    (0xA490, 0xA4CF, "Yi"),
    (0xAC00, 0xD7AF, "Hangul"),
    (0xF900, 0xFAFF, "Han"),
    (0xFB50, 0xFDFF, "Arabic"),
    (0xFE30, 0xFE4F, "Han"),
    (0xFE70, 0xFEFF, "Arabic"),
    (0xFF21, 0xFF3A, "Latin"),
    (0xFF41, 0xFF5A, "Latin"),
    (0xFF66, 0xFF9F, "Katakana"),
    (0x20000, 0x2A6DF, "Han"),
];

/// A writing system known to the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Script {
    name: &'static str,
}

impl Script {
    /// Looks up a script by its name (e.g. `"Han"`, `"Latin"`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        SCRIPT_RANGES
            .iter()
            .find(|(_, _, candidate)| *candidate == name)
            .map(|&(_, _, name)| Self { name })
    }

    /// Script owning the code point, if any.
    #[must_use]
    pub fn of(c: char) -> Option<Self> {
        let cp = u32::from(c);
        SCRIPT_RANGES
            .binary_search_by(|&(start, end, _)| {
                if cp < start {
                    Ordering::Greater
                } else if cp > end {
                    Ordering::Less
                } else {
                    Ordering::Equal
                }
            })
            .ok()
            .map(|index| Self {
                name: SCRIPT_RANGES[index].2,
            })
    }

    /// Canonical name of the script.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.name
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_sorted_and_disjoint() {
        for window in SCRIPT_RANGES.windows(2) {
            assert!(window[0].0 <= window[0].1);
            assert!(window[0].1 < window[1].0, "{:?}", window);
        }
    }

    #[test]
    fn lookup_by_code_point() {
        assert_eq!(Script::of('a').map(Script::name), Some("Latin"));
        assert_eq!(Script::of('é').map(Script::name), Some("Latin"));
        assert_eq!(Script::of('Ж').map(Script::name), Some("Cyrillic"));
        assert_eq!(Script::of('測').map(Script::name), Some("Han"));
        assert_eq!(Script::of('か').map(Script::name), Some("Hiragana"));
        assert_eq!(Script::of('한').map(Script::name), Some("Hangul"));
        assert_eq!(Script::of('\u{1F600}'), None);
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(Script::from_name("Han"), Script::of('漢'));
        assert!(Script::from_name("Klingon").is_none());
    }
}
