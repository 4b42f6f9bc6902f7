//! Verse mapping between versification schemes.
//!
//! A mapping source is parsed into [`MappingRule`]s, then compiled per book
//! into per-chapter byte tables. Each table is a run of entries:
//!
//! ```text
//! verse nByte | target count nByte | per target:
//!     counted book | chapter nByte | verse nByte | fragment byte (0 = none)
//! ```

use crate::error::{ImportError, Result};
use crate::utils::ByteArray;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static VERSE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([A-Z0-9]{3})\s+)?(\d+):(\d+)(?:-(\d+))?([a-z])?$").expect("verse reference regex")
});

/// One side of a mapping line; a range is expanded by the parser
#[derive(Debug, Clone, PartialEq, Eq)]
struct RefRange {
    book: Option<String>,
    chapter: u32,
    from_verse: u32,
    to_verse: u32,
    fragment: Option<char>,
}

impl RefRange {
    fn parse(text: &str, line: usize) -> std::result::Result<Self, ImportError> {
        let bad = |reason: &str| ImportError::Mapping {
            line,
            reason: format!("{} in '{}'", reason, text),
        };
        let caps = VERSE_REF.captures(text.trim()).ok_or_else(|| bad("malformed reference"))?;
        let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let chapter = number(2).ok_or_else(|| bad("bad chapter"))?;
        let from_verse = number(3).ok_or_else(|| bad("bad verse"))?;
        let to_verse = number(4).unwrap_or(from_verse);
        if to_verse < from_verse {
            return Err(bad("reversed verse range"));
        }
        Ok(Self {
            book: caps.get(1).map(|m| m.as_str().to_string()),
            chapter,
            from_verse,
            to_verse,
            fragment: caps.get(5).and_then(|m| m.as_str().chars().next()),
        })
    }

    fn len(&self) -> u32 {
        self.to_verse - self.from_verse + 1
    }

    fn verse_at(&self, offset: u32) -> VerseRef {
        VerseRef {
            book: self.book.clone(),
            chapter: self.chapter,
            verse: self.from_verse + offset,
            fragment: self.fragment,
        }
    }

    fn verses(&self) -> impl Iterator<Item = VerseRef> + '_ {
        (0..self.len()).map(|o| self.verse_at(o))
    }
}

/// A single verse, optionally a lettered fragment of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerseRef {
    pub book: Option<String>,
    pub chapter: u32,
    pub verse: u32,
    pub fragment: Option<char>,
}

/// One source verse and the verses it maps to, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    pub from: VerseRef,
    pub targets: Vec<VerseRef>,
}

fn rules_for_line(left: &str, right: &str, line: usize) -> std::result::Result<Vec<MappingRule>, ImportError> {
    let from = RefRange::parse(left, line)?;
    let targets = right
        .split(',')
        .map(|t| RefRange::parse(t, line))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    // a range mapped onto one range of the same length pairs verse by verse
    if from.len() > 1 {
        if let [single] = targets.as_slice() {
            if single.len() == from.len() {
                return Ok((0..from.len())
                    .map(|o| MappingRule {
                        from: from.verse_at(o),
                        targets: vec![single.verse_at(o)],
                    })
                    .collect());
            }
        }
    }
    let expanded: Vec<VerseRef> = targets.iter().flat_map(|t| t.verses()).collect();
    Ok(from
        .verses()
        .map(|v| MappingRule {
            from: v,
            targets: expanded.clone(),
        })
        .collect())
}

/// Parse `.vrs` text; only `=` lines carry mappings
pub fn parse_vrs(text: &str) -> std::result::Result<Vec<MappingRule>, ImportError> {
    let mut rules = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((left, right)) = line.split_once('=') else {
            continue;
        };
        rules.extend(rules_for_line(left, right, n + 1)?);
    }
    Ok(rules)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonMapping {
    mapped_verses: BTreeMap<String, Vec<String>>,
}

/// Parse `{"mappedVerses": {"GEN 31:55": ["GEN 32:1"]}}`
pub fn parse_json(text: &str) -> std::result::Result<Vec<MappingRule>, ImportError> {
    let source: JsonMapping = serde_json::from_str(text).map_err(|e| ImportError::Mapping {
        line: e.line(),
        reason: e.to_string(),
    })?;
    let mut rules = Vec::new();
    for (n, (left, targets)) in source.mapped_verses.iter().enumerate() {
        rules.extend(rules_for_line(left, &targets.join(","), n + 1)?);
    }
    Ok(rules)
}

/// Forward and reversed tables of one book, keyed by chapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseMapping {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub forward: BTreeMap<String, ByteArray>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reversed: BTreeMap<String, ByteArray>,
}

/// A resolved mapping target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedVerse {
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub fragment: Option<char>,
}

type ChapterEntries = BTreeMap<u32, BTreeMap<u32, Vec<MappedVerse>>>;

impl VerseMapping {
    /// Compile the rules that concern `book`; `None` when nothing does
    pub fn for_book(rules: &[MappingRule], book: &str) -> Result<Option<Self>> {
        let mut forward: ChapterEntries = BTreeMap::new();
        let mut reversed: ChapterEntries = BTreeMap::new();
        for rule in rules {
            let source_book = rule.from.book.as_deref().unwrap_or(book);
            if source_book == book {
                let verses = forward
                    .entry(rule.from.chapter)
                    .or_default()
                    .entry(rule.from.verse)
                    .or_default();
                for t in &rule.targets {
                    verses.push(MappedVerse {
                        book: t.book.clone().unwrap_or_else(|| source_book.to_string()),
                        chapter: t.chapter,
                        verse: t.verse,
                        fragment: t.fragment,
                    });
                }
            }
            for t in &rule.targets {
                if t.book.as_deref().unwrap_or(source_book) != book {
                    continue;
                }
                let back = MappedVerse {
                    book: source_book.to_string(),
                    chapter: rule.from.chapter,
                    verse: rule.from.verse,
                    fragment: None,
                };
                let verses = reversed.entry(t.chapter).or_default().entry(t.verse).or_default();
                if !verses.contains(&back) {
                    verses.push(back);
                }
            }
        }
        if forward.is_empty() && reversed.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            forward: encode_tables(&forward)?,
            reversed: encode_tables(&reversed)?,
        }))
    }
}

fn encode_tables(entries: &ChapterEntries) -> Result<BTreeMap<String, ByteArray>> {
    let mut tables = BTreeMap::new();
    for (chapter, verses) in entries {
        let mut ba = ByteArray::new();
        for (verse, targets) in verses {
            ba.push_nbyte(*verse);
            ba.push_nbyte(targets.len() as u32);
            for t in targets {
                ba.push_counted_string(&t.book)?;
                ba.push_nbyte(t.chapter);
                ba.push_nbyte(t.verse);
                ba.push_byte(t.fragment.map_or(0, |c| c as u8));
            }
        }
        ba.trim();
        tables.insert(chapter.to_string(), ba);
    }
    Ok(tables)
}

/// Look a verse up in one chapter table; unmapped verses map to themselves
pub fn map_verse(table: &ByteArray, book: &str, chapter: u32, verse: u32) -> Result<(String, Vec<MappedVerse>)> {
    let mut pos = 0;
    while pos < table.len() {
        let (entry_verse, used) = table.nbyte_at(pos)?;
        pos += used;
        let (count, used) = table.nbyte_at(pos)?;
        pos += used;
        let mut targets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let target_book = table.counted_string(pos)?;
            pos += target_book.len() + 1;
            let (c, used) = table.nbyte_at(pos)?;
            pos += used;
            let (v, used) = table.nbyte_at(pos)?;
            pos += used;
            let fragment = match table.byte(pos)? {
                0 => None,
                b => Some(b as char),
            };
            pos += 1;
            targets.push(MappedVerse {
                book: target_book,
                chapter: c,
                verse: v,
                fragment,
            });
        }
        if entry_verse == verse {
            let mapped_book = targets
                .first()
                .map_or_else(|| book.to_string(), |t| t.book.clone());
            return Ok((mapped_book, targets));
        }
    }
    Ok((
        book.to_string(),
        vec![MappedVerse {
            book: book.to_string(),
            chapter,
            verse,
            fragment: None,
        }],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vrs_lines() {
        let rules = parse_vrs("# comment\nGEN 1:1\nGEN 31:55 = GEN 32:1\n2:5 = 2:5a,2:5b\n").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].from.book.as_deref(), Some("GEN"));
        assert_eq!(rules[1].from.book, None);
        assert_eq!(rules[1].targets[1].fragment, Some('b'));
    }

    #[test]
    fn test_parse_vrs_range_pairs() {
        let rules = parse_vrs("PSA 51:1-3 = PSA 51:3-5").unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[2].from.verse, 3);
        assert_eq!(rules[2].targets[0].verse, 5);
    }

    #[test]
    fn test_parse_vrs_error_line() {
        let err = parse_vrs("GEN 1:1 = GEN 1:2\nGEN x = y").unwrap_err();
        assert!(matches!(err, ImportError::Mapping { line: 2, .. }));
    }

    #[test]
    fn test_parse_json() {
        let rules = parse_json(r#"{"mappedVerses": {"GEN 31:55": ["GEN 32:1"]}}"#).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].targets[0].chapter, 32);
        assert!(parse_json("{}").is_err());
    }

    #[test]
    fn test_forward_and_reverse() {
        let rules = parse_vrs("GEN 31:55 = GEN 32:1\n").unwrap();
        let mapping = VerseMapping::for_book(&rules, "GEN").unwrap().unwrap();
        let (book, cvs) = map_verse(&mapping.forward["31"], "GEN", 31, 55).unwrap();
        assert_eq!(book, "GEN");
        assert_eq!((cvs[0].chapter, cvs[0].verse), (32, 1));
        let (_, back) = map_verse(&mapping.reversed["32"], "GEN", 32, 1).unwrap();
        assert_eq!((back[0].chapter, back[0].verse), (31, 55));
        assert!(VerseMapping::for_book(&rules, "EXO").unwrap().is_none());
    }

    #[test]
    fn test_wildcard_book_and_fragments() {
        let rules = parse_vrs("2:5 = 2:5a,2:5b").unwrap();
        let mapping = VerseMapping::for_book(&rules, "MRK").unwrap().unwrap();
        let (book, cvs) = map_verse(&mapping.forward["2"], "MRK", 2, 5).unwrap();
        assert_eq!(book, "MRK");
        let fragments: Vec<Option<char>> = cvs.iter().map(|c| c.fragment).collect();
        assert_eq!(fragments, vec![Some('a'), Some('b')]);
    }

    #[test]
    fn test_unmapped_verse_is_identity() {
        let rules = parse_vrs("GEN 31:55 = GEN 32:1").unwrap();
        let mapping = VerseMapping::for_book(&rules, "GEN").unwrap().unwrap();
        let (_, cvs) = map_verse(&mapping.forward["31"], "GEN", 31, 2).unwrap();
        assert_eq!((cvs[0].chapter, cvs[0].verse, cvs[0].fragment), (31, 2, None));
    }
}
