//! Chapter/verse reference parsing and scope predicates.
//!
//! Five shapes are accepted: `3`, `3-5`, `3:2`, `3:2-4` and `3:2-5:1`.
//! Chapters start at 1; verse 0 is the content of a chapter before its
//! first verse.

use crate::error::ReferenceError;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvReference {
    Chapter(u32),
    ChapterRange { from: u32, to: u32 },
    Verse { chapter: u32, verse: u32 },
    VerseRange { chapter: u32, from: u32, to: u32 },
    CrossChapter { from: (u32, u32), to: (u32, u32) },
}

impl CvReference {
    pub fn parse(input: &str) -> Result<Self, ReferenceError> {
        ReferenceParser::new(input).parse()
    }

    /// Inclusive chapter bounds
    pub fn chapters(&self) -> (u32, u32) {
        match *self {
            CvReference::Chapter(c) => (c, c),
            CvReference::ChapterRange { from, to } => (from, to),
            CvReference::Verse { chapter, .. } | CvReference::VerseRange { chapter, .. } => {
                (chapter, chapter)
            }
            CvReference::CrossChapter { from, to } => (from.0, to.0),
        }
    }

    /// Block-level test over a block's open, included and own scopes.
    ///
    /// For a cross-chapter reference this only answers whether the block
    /// touches a chapter strictly inside the range; the edge chapters need
    /// an item scan with [`CvReference::matches_open_scopes`].
    pub fn matches_block_scopes(&self, scopes: &BTreeSet<String>) -> bool {
        match *self {
            CvReference::Chapter(c) => scopes.contains(&chapter_label(c)),
            CvReference::ChapterRange { from, to } => (from..=to).any(|c| scopes.contains(&chapter_label(c))),
            CvReference::Verse { chapter, verse: 0 } => {
                scopes.contains(&chapter_label(chapter)) && !has_verse_scope(scopes.iter())
            }
            CvReference::Verse { chapter, verse } => {
                scopes.contains(&chapter_label(chapter)) && scopes.contains(&verse_label(verse))
            }
            CvReference::VerseRange { chapter, from, to } => {
                scopes.contains(&chapter_label(chapter))
                    && ((from..=to).any(|v| scopes.contains(&verse_label(v)))
                        || (from == 0 && !has_verse_scope(scopes.iter())))
            }
            CvReference::CrossChapter { from, to } => chapter_numbers(scopes.iter())
                .any(|c| c > from.0 && c < to.0),
        }
    }

    /// Item-level test over the scopes open at an item
    pub fn matches_open_scopes(&self, open: &[String]) -> bool {
        let has = |label: String| open.contains(&label);
        match *self {
            CvReference::Chapter(c) => has(chapter_label(c)),
            CvReference::ChapterRange { from, to } => (from..=to).any(|c| has(chapter_label(c))),
            CvReference::Verse { chapter, verse: 0 } => {
                has(chapter_label(chapter)) && !has_verse_scope(open.iter())
            }
            CvReference::Verse { chapter, verse } => {
                has(chapter_label(chapter)) && has(verse_label(verse))
            }
            CvReference::VerseRange { chapter, from, to } => {
                has(chapter_label(chapter))
                    && ((from..=to).any(|v| has(verse_label(v)))
                        || (from == 0 && !has_verse_scope(open.iter())))
            }
            CvReference::CrossChapter { from, to } => {
                let mut chapters = chapter_numbers(open.iter());
                let (Some(chapter), None) = (chapters.next(), chapters.next()) else {
                    return false;
                };
                if chapter < from.0 || chapter > to.0 {
                    false
                } else if chapter == from.0 {
                    self.first_chapter_matches(open, true)
                } else if chapter == to.0 {
                    self.last_chapter_matches(open, true)
                } else {
                    true
                }
            }
        }
    }

    /// Inside the first chapter of a cross-chapter range, at or after its
    /// first verse. Pre-verse content only counts when `counts_as_content`.
    pub fn first_chapter_matches(&self, open: &[String], counts_as_content: bool) -> bool {
        let CvReference::CrossChapter { from: (c, v), .. } = *self else {
            return false;
        };
        open.contains(&chapter_label(c))
            && (verse_numbers(open.iter()).any(|n| n >= v)
                || (v == 0 && counts_as_content && !has_verse_scope(open.iter())))
    }

    pub fn last_chapter_matches(&self, open: &[String], counts_as_content: bool) -> bool {
        let CvReference::CrossChapter { to: (c, v), .. } = *self else {
            return false;
        };
        open.contains(&chapter_label(c))
            && (verse_numbers(open.iter()).any(|n| n <= v)
                || (v == 0 && counts_as_content && !has_verse_scope(open.iter())))
    }
}

impl FromStr for CvReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CvReference::parse(s)
    }
}

impl fmt::Display for CvReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CvReference::Chapter(c) => write!(f, "{}", c),
            CvReference::ChapterRange { from, to } => write!(f, "{}-{}", from, to),
            CvReference::Verse { chapter, verse } => write!(f, "{}:{}", chapter, verse),
            CvReference::VerseRange { chapter, from, to } => write!(f, "{}:{}-{}", chapter, from, to),
            CvReference::CrossChapter { from, to } => {
                write!(f, "{}:{}-{}:{}", from.0, from.1, to.0, to.1)
            }
        }
    }
}

pub fn chapter_label(c: u32) -> String {
    format!("chapter/{}", c)
}

pub fn verse_label(v: u32) -> String {
    format!("verse/{}", v)
}

/// Any `verse/` or `verses/` scope
fn has_verse_scope<'a>(mut scopes: impl Iterator<Item = &'a String>) -> bool {
    scopes.any(|s| s.starts_with("verse"))
}

fn verse_numbers<'a>(scopes: impl Iterator<Item = &'a String>) -> impl Iterator<Item = u32> {
    scopes.filter_map(|s| s.strip_prefix("verse/").and_then(|n| n.parse().ok()))
}

fn chapter_numbers<'a>(scopes: impl Iterator<Item = &'a String>) -> impl Iterator<Item = u32> {
    scopes.filter_map(|s| s.strip_prefix("chapter/").and_then(|n| n.parse().ok()))
}

/// Reference parser
struct ReferenceParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ReferenceParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.trim(),
            pos: 0,
        }
    }

    fn parse(&mut self) -> Result<CvReference, ReferenceError> {
        let chapter = self.parse_chapter()?;
        let reference = if self.consume_char(':') {
            let verse = self.parse_number()?;
            if self.consume_char('-') {
                let end = self.parse_number()?;
                if self.consume_char(':') {
                    let to_verse = self.parse_number()?;
                    if end == 0 {
                        return Err(self.malformed());
                    }
                    if (chapter, verse) > (end, to_verse) {
                        return Err(self.invalid());
                    }
                    CvReference::CrossChapter {
                        from: (chapter, verse),
                        to: (end, to_verse),
                    }
                } else {
                    if end == 0 {
                        return Err(self.malformed());
                    }
                    if verse > end {
                        return Err(self.invalid());
                    }
                    CvReference::VerseRange {
                        chapter,
                        from: verse,
                        to: end,
                    }
                }
            } else {
                CvReference::Verse { chapter, verse }
            }
        } else if self.consume_char('-') {
            let to = self.parse_chapter()?;
            if chapter > to {
                return Err(self.invalid());
            }
            CvReference::ChapterRange { from: chapter, to }
        } else {
            CvReference::Chapter(chapter)
        };
        if !self.is_eof() {
            return Err(self.malformed());
        }
        Ok(reference)
    }

    fn parse_chapter(&mut self) -> Result<u32, ReferenceError> {
        if self.peek_char() == Some('0') {
            return Err(self.malformed());
        }
        self.parse_number()
    }

    fn parse_number(&mut self) -> Result<u32, ReferenceError> {
        let start = self.pos;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        self.input[start..self.pos]
            .parse::<u32>()
            .map_err(|_| self.malformed())
    }

    fn malformed(&self) -> ReferenceError {
        ReferenceError::Malformed(self.input.to_string())
    }

    fn invalid(&self) -> ReferenceError {
        ReferenceError::InvalidRange(self.input.to_string())
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_shapes() {
        assert_eq!(CvReference::parse("3").unwrap(), CvReference::Chapter(3));
        assert_eq!(
            CvReference::parse("3-5").unwrap(),
            CvReference::ChapterRange { from: 3, to: 5 }
        );
        assert_eq!(
            CvReference::parse("3:2").unwrap(),
            CvReference::Verse { chapter: 3, verse: 2 }
        );
        assert_eq!(
            CvReference::parse("3:2-4").unwrap(),
            CvReference::VerseRange { chapter: 3, from: 2, to: 4 }
        );
        assert_eq!(
            CvReference::parse("3:2-5:1").unwrap(),
            CvReference::CrossChapter { from: (3, 2), to: (5, 1) }
        );
        assert_eq!(
            CvReference::parse(" 1:0 ").unwrap(),
            CvReference::Verse { chapter: 1, verse: 0 }
        );
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(matches!(CvReference::parse("5-3"), Err(ReferenceError::InvalidRange(_))));
        assert!(matches!(CvReference::parse("3:4-3:2"), Err(ReferenceError::InvalidRange(_))));
        assert!(matches!(CvReference::parse("3:4-2"), Err(ReferenceError::InvalidRange(_))));
    }

    #[test]
    fn test_malformed() {
        for bad in ["", "0", "a", "3:", "3-", "3:2-", "3:2-4:", "3:2x", "03", "3:1-0"] {
            assert!(
                matches!(CvReference::parse(bad), Err(ReferenceError::Malformed(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_display_roundtrip() {
        for text in ["3", "3-5", "3:2", "3:2-4", "3:2-5:1"] {
            assert_eq!(CvReference::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_verse_zero_matches_before_first_verse() {
        let r = CvReference::parse("1:0").unwrap();
        assert!(r.matches_open_scopes(&scopes(&["chapter/1", "blockTag/p"])));
        assert!(!r.matches_open_scopes(&scopes(&["chapter/1", "verses/1", "verse/1"])));
    }

    #[test]
    fn test_cross_chapter_items() {
        let r = CvReference::parse("2:3-4:1").unwrap();
        assert!(!r.matches_open_scopes(&scopes(&["chapter/2", "verse/2"])));
        assert!(r.matches_open_scopes(&scopes(&["chapter/2", "verse/3"])));
        assert!(r.matches_open_scopes(&scopes(&["chapter/3", "verse/40"])));
        assert!(r.matches_open_scopes(&scopes(&["chapter/4", "verse/1"])));
        assert!(!r.matches_open_scopes(&scopes(&["chapter/4", "verse/2"])));
        assert!(!r.matches_open_scopes(&scopes(&["verse/2"])));
    }

    #[test]
    fn test_block_scopes() {
        let block: BTreeSet<String> = ["chapter/3", "verse/2", "verse/3", "blockTag/p"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(CvReference::parse("3").unwrap().matches_block_scopes(&block));
        assert!(CvReference::parse("2-4").unwrap().matches_block_scopes(&block));
        assert!(CvReference::parse("3:3").unwrap().matches_block_scopes(&block));
        assert!(!CvReference::parse("3:4-6").unwrap().matches_block_scopes(&block));
        assert!(!CvReference::parse("3:0").unwrap().matches_block_scopes(&block));
        assert!(CvReference::parse("2:1-4:1").unwrap().matches_block_scopes(&block));
    }
}
