//! Chapter and verse spans of a main sequence.
//!
//! Each chapter gets one record in `chapters`; its verses get one blob in
//! `chapter_verses` holding a run of records per verse slot `0..=max`.
//! A record starts with a length byte:
//!
//! ```text
//! bits 7-6  record type (0 empty, 2 short, 3 long)
//! bit  5    last record of its verse slot
//! bits 4-0  record length in bytes, including this one
//! ```
//!
//! Short records span one block: `startBlock startItem endItem nextToken
//! [verses]`. Long records add `endBlock` after `startBlock`. Chapter
//! records carry no verses code.

use crate::error::{Result, StructuralError};
use crate::succinct::codec::decode_item_at;
use crate::succinct::{EnumCategory, EnumDictionary, Item, ScopeEdge, SuccinctBlock, TokenKind};
use crate::succinct::item::{ItemHeader, ItemType};
use crate::utils::ByteArray;
use roaring::RoaringBitmap;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

pub const EMPTY_RECORD: u8 = 0;
pub const SHORT_RECORD: u8 = 2;
pub const LONG_RECORD: u8 = 3;

pub fn make_length_byte(record_type: u8, is_last: bool, length: usize) -> u8 {
    (length as u8 & 0x1f) + if is_last { 32 } else { 0 } + (record_type << 6)
}

/// (record type, is last, length)
pub fn read_length_byte(ba: &ByteArray, pos: usize) -> Result<(u8, bool, usize)> {
    let b = ba.byte(pos)?;
    Ok((b >> 6, (b >> 5) & 1 == 1, (b & 0x1f) as usize))
}

/// A block/item range inside the main sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub start_block: u32,
    pub end_block: u32,
    pub start_item: u32,
    pub end_item: u32,
    pub next_token: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerseSpan {
    #[serde(flatten)]
    pub span: Span,
    /// Label of the `verses` scope the record closed under, e.g. `4-5`
    pub verses: String,
}

/// Everything derived from one scan of a main sequence
#[derive(Debug, Clone, Default)]
pub struct ChapterVerseIndex {
    pub chapters: BTreeMap<String, ByteArray>,
    pub chapter_verses: BTreeMap<String, ByteArray>,
    pub tokens_present: RoaringBitmap,
}

#[derive(Debug, Clone)]
struct PendingRecord {
    start_block: u32,
    start_item: u32,
    next_token: u32,
    end: Option<(u32, u32)>,
    verses: String,
}

impl PendingRecord {
    fn opened(block: usize, item: usize, next_token: u32) -> Self {
        Self {
            start_block: block as u32,
            start_item: item as u32,
            next_token,
            end: None,
            verses: String::new(),
        }
    }

    fn span(&self) -> Option<Span> {
        self.end.map(|(end_block, end_item)| Span {
            start_block: self.start_block,
            end_block,
            start_item: self.start_item,
            end_item,
            next_token: self.next_token,
        })
    }
}

/// Scan a main sequence and encode its chapter and verse records.
///
/// The dictionary must have staged pre-enums: verse range labels that are
/// not yet interned (`0` for implicit verse 0) are added.
pub fn build_chapter_verse_index(
    blocks: &[SuccinctBlock],
    enums: &mut EnumDictionary,
) -> Result<ChapterVerseIndex> {
    let mut chapter_verses: BTreeMap<String, BTreeMap<u32, Vec<PendingRecord>>> = BTreeMap::new();
    let mut chapters: BTreeMap<String, PendingRecord> = BTreeMap::new();
    let mut tokens_present = RoaringBitmap::new();
    let mut chapter_n = "0".to_string();
    let mut verses = "1".to_string();
    let mut next_token: u32 = 0;
    let mut previous_block_items: Option<usize> = None;

    for (block_n, block) in blocks.iter().enumerate() {
        let c = &block.c;
        let mut pos = 0;
        let mut item_n = 0usize;
        while pos < c.len() {
            let header = ItemHeader::read(c, pos)?;
            match header.item_type {
                ItemType::Token => {
                    if header.token_kind()? == TokenKind::WordLike {
                        tokens_present.insert(c.nbyte(pos + 2)?);
                        next_token += 1;
                    }
                }
                ItemType::StartScope | ItemType::EndScope => {
                    let (item, _) = decode_item_at(c, pos, enums)?;
                    if let Item::Scope { edge, label } = item {
                        match edge {
                            ScopeEdge::Start => {
                                if let Some(n) = label.strip_prefix("chapter/") {
                                    chapter_n = n.to_string();
                                    chapter_verses.insert(chapter_n.clone(), BTreeMap::new());
                                    chapters.insert(
                                        chapter_n.clone(),
                                        PendingRecord::opened(block_n, item_n, next_token),
                                    );
                                } else if let Some(n) = label.strip_prefix("verse/") {
                                    let Ok(verse_n) = n.parse::<u32>() else {
                                        warn!(label = %label, "non-numeric verse scope not indexed");
                                        pos += header.length;
                                        item_n += 1;
                                        continue;
                                    };
                                    let slots = chapter_verses.entry(chapter_n.clone()).or_default();
                                    if verse_n == 1 && !slots.contains_key(&0) {
                                        if let Some(chapter) = chapters.get(&chapter_n) {
                                            if chapter.next_token < next_token {
                                                let mut zero = chapter.clone();
                                                zero.end = Some(match (item_n, previous_block_items) {
                                                    (0, Some(count)) if count > 0 => {
                                                        (block_n as u32 - 1, count as u32 - 1)
                                                    }
                                                    _ => (block_n as u32, item_n.saturating_sub(1) as u32),
                                                });
                                                zero.verses = "0".to_string();
                                                slots.insert(0, vec![zero]);
                                            }
                                        }
                                    }
                                    slots
                                        .entry(verse_n)
                                        .or_default()
                                        .push(PendingRecord::opened(block_n, item_n, next_token));
                                } else if let Some(v) = label.strip_prefix("verses/") {
                                    verses = v.to_string();
                                }
                            }
                            ScopeEdge::End => {
                                if let Some(n) = label.strip_prefix("chapter/") {
                                    chapter_n = n.to_string();
                                    if let Some(chapter) = chapters.get_mut(&chapter_n) {
                                        chapter.end = Some((block_n as u32, item_n as u32));
                                    }
                                } else if let Some(n) = label.strip_prefix("verse/") {
                                    let record = n.parse::<u32>().ok().and_then(|v| {
                                        chapter_verses
                                            .get_mut(&chapter_n)
                                            .and_then(|slots| slots.get_mut(&v))
                                            .and_then(|records| records.last_mut())
                                    });
                                    if let Some(record) = record {
                                        record.end = Some((block_n as u32, item_n as u32));
                                        record.verses = verses.clone();
                                    }
                                }
                            }
                        }
                    }
                }
                ItemType::Graft => {}
            }
            pos += header.length;
            item_n += 1;
        }
        previous_block_items = Some(item_n);
    }

    let mut index = ChapterVerseIndex {
        tokens_present,
        ..ChapterVerseIndex::default()
    };
    for (chapter, slots) in chapter_verses {
        let ba = encode_verse_slots(&chapter, &slots, enums)?;
        index.chapter_verses.insert(chapter, ba);
    }
    for (chapter, record) in chapters {
        if let Some(span) = record.span() {
            let mut ba = ByteArray::new();
            push_span(&mut ba, &span, None, true)?;
            ba.trim();
            index.chapters.insert(chapter, ba);
        }
    }
    Ok(index)
}

fn encode_verse_slots(
    chapter: &str,
    slots: &BTreeMap<u32, Vec<PendingRecord>>,
    enums: &mut EnumDictionary,
) -> Result<ByteArray> {
    let mut ba = ByteArray::new();
    let Some(&max_verse) = slots.keys().next_back() else {
        return Ok(ba);
    };
    for slot in 0..=max_verse {
        let spans: Vec<(Span, &str)> = slots
            .get(&slot)
            .map(|records| {
                records
                    .iter()
                    .filter_map(|r| match r.span() {
                        Some(span) => Some((span, r.verses.as_str())),
                        None => {
                            warn!(chapter, verse = slot, "verse record without an end dropped");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        if spans.is_empty() {
            ba.push_byte(make_length_byte(EMPTY_RECORD, true, 1));
            continue;
        }
        let last = spans.len() - 1;
        for (n, (span, verses)) in spans.into_iter().enumerate() {
            let code = enums.code_for(EnumCategory::ScopeBits, verses, true)?;
            push_span(&mut ba, &span, Some(code), n == last)?;
        }
    }
    ba.trim();
    Ok(ba)
}

fn push_span(ba: &mut ByteArray, span: &Span, verses: Option<u32>, is_last: bool) -> Result<()> {
    let start = ba.len();
    ba.push_byte(0);
    let record_type = if span.start_block == span.end_block {
        ba.push_nbytes(&[span.start_block, span.start_item, span.end_item, span.next_token]);
        SHORT_RECORD
    } else {
        ba.push_nbytes(&[
            span.start_block,
            span.end_block,
            span.start_item,
            span.end_item,
            span.next_token,
        ]);
        LONG_RECORD
    };
    if let Some(code) = verses {
        ba.push_nbyte(code);
    }
    let length = ba.len() - start;
    if length > 31 {
        return Err(StructuralError::invariant(format!("index record of {} bytes", length)).into());
    }
    ba.set_byte(start, make_length_byte(record_type, is_last, length))?;
    Ok(())
}

fn read_span(ba: &ByteArray, pos: usize, record_type: u8, with_verses: bool) -> Result<(Span, Option<u32>)> {
    let (n, shape) = match record_type {
        SHORT_RECORD => (4, SHORT_RECORD),
        LONG_RECORD => (5, LONG_RECORD),
        other => {
            return Err(StructuralError::CorruptBytes {
                pos,
                reason: format!("index record type {}", other),
            }
            .into());
        }
    };
    let values = ba.nbytes(pos + 1, n + usize::from(with_verses))?;
    let span = if shape == SHORT_RECORD {
        Span {
            start_block: values[0],
            end_block: values[0],
            start_item: values[1],
            end_item: values[2],
            next_token: values[3],
        }
    } else {
        Span {
            start_block: values[0],
            end_block: values[1],
            start_item: values[2],
            end_item: values[3],
            next_token: values[4],
        }
    };
    Ok((span, values.get(n).copied()))
}

/// Decode a chapter record
pub fn decode_chapter(ba: &ByteArray) -> Result<Option<Span>> {
    if ba.is_empty() {
        return Ok(None);
    }
    let (record_type, _, _) = read_length_byte(ba, 0)?;
    if record_type == EMPTY_RECORD {
        return Ok(None);
    }
    read_span(ba, 0, record_type, false).map(|(span, _)| Some(span))
}

/// Decode a chapter's verse blob into one group per verse slot
pub fn decode_chapter_verses(ba: &ByteArray, enums: &EnumDictionary) -> Result<Vec<Vec<VerseSpan>>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut pos = 0;
    while pos < ba.len() {
        let (record_type, is_last, length) = read_length_byte(ba, pos)?;
        if length == 0 {
            return Err(StructuralError::CorruptBytes {
                pos,
                reason: "zero-length index record".to_string(),
            }
            .into());
        }
        if record_type != EMPTY_RECORD {
            let (span, code) = read_span(ba, pos, record_type, true)?;
            let verses = match code {
                Some(code) => enums.string_for(EnumCategory::ScopeBits, code)?.to_string(),
                None => String::new(),
            };
            current.push(VerseSpan { span, verses });
        }
        if is_last {
            groups.push(std::mem::take(&mut current));
        }
        pos += length;
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomTags;
    use crate::parser::{Dialect, TagTable, parse_document};
    use crate::succinct::{record_document_pre_enums, succinctify_blocks};
    use crate::utils::SequentialIds;

    fn index_for(text: &str) -> (EnumDictionary, Vec<SuccinctBlock>, ChapterVerseIndex) {
        let table = TagTable::new(&CustomTags::default()).unwrap();
        let ids = SequentialIds::new("s");
        let doc = parse_document(text, Dialect::Usfm, &table, &ids, &[]).unwrap();
        let mut enums = EnumDictionary::new();
        enums.build_pre_enums().unwrap();
        record_document_pre_enums(&mut enums, &doc).unwrap();
        enums.build_enums().unwrap();
        let blocks = succinctify_blocks(&doc.sequences[0], &mut enums).unwrap();
        let index = build_chapter_verse_index(&blocks, &mut enums).unwrap();
        (enums, blocks, index)
    }

    #[test]
    fn test_length_byte() {
        let b = make_length_byte(SHORT_RECORD, true, 7);
        let mut ba = ByteArray::new();
        ba.push_byte(b);
        assert_eq!(read_length_byte(&ba, 0).unwrap(), (SHORT_RECORD, true, 7));
        assert_eq!(make_length_byte(EMPTY_RECORD, true, 1), 33);
    }

    #[test]
    fn test_short_and_long_records() {
        let mut ba = ByteArray::new();
        let short = Span {
            start_block: 2,
            end_block: 2,
            start_item: 1,
            end_item: 200,
            next_token: 16384,
        };
        let long = Span {
            start_block: 2,
            end_block: 5,
            start_item: 9,
            end_item: 0,
            next_token: 3,
        };
        push_span(&mut ba, &short, None, true).unwrap();
        assert_eq!(decode_chapter(&ba).unwrap(), Some(short));
        ba.clear();
        push_span(&mut ba, &long, None, true).unwrap();
        assert_eq!(decode_chapter(&ba).unwrap(), Some(long));
    }

    #[test]
    fn test_two_chapters() {
        let (enums, _, index) = index_for(
            "\\id GEN\n\\c 1\n\\p\n\\v 1 one\n\\v 2 two two\n\\v 3 three\n\\c 2\n\\p\n\\v 1 four\n\\v 2 five",
        );
        assert_eq!(index.chapters.len(), 2);
        let c1 = decode_chapter_verses(&index.chapter_verses["1"], &enums).unwrap();
        // slot 0 is empty
        assert_eq!(c1.len(), 4);
        assert!(c1[0].is_empty());
        let v2 = &c1[2][0];
        assert_eq!(v2.verses, "2");
        assert_eq!(v2.span.next_token, 1);
        assert_eq!(v2.span.start_block, v2.span.end_block);
        let c2 = decode_chapter_verses(&index.chapter_verses["2"], &enums).unwrap();
        assert_eq!(c2[1][0].span.next_token, 4);
        assert_eq!(index.tokens_present.len(), 5);
    }

    #[test]
    fn test_implicit_verse_zero() {
        let (enums, _, index) = index_for("\\id GEN\n\\c 1\n\\p Before\n\\v 1 after");
        let groups = decode_chapter_verses(&index.chapter_verses["1"], &enums).unwrap();
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[0][0].verses, "0");
        assert_eq!(groups[0][0].span.next_token, 0);
    }

    #[test]
    fn test_bridged_verses_label() {
        let (enums, _, index) = index_for("\\id GEN\n\\c 1\n\\p\n\\v 1-2 both\n\\v 3 three");
        let groups = decode_chapter_verses(&index.chapter_verses["1"], &enums).unwrap();
        assert_eq!(groups[1][0].verses, "1-2");
        assert_eq!(groups[2][0].verses, "1-2");
        assert_eq!(groups[3][0].verses, "3");
    }

    #[test]
    fn test_multi_block_chapter_is_long() {
        let (_, _, index) = index_for("\\id GEN\n\\c 1\n\\p\n\\v 1 a\n\\p\n\\v 2 b");
        let (record_type, _, _) = read_length_byte(&index.chapters["1"], 0).unwrap();
        assert_eq!(record_type, LONG_RECORD);
        let span = decode_chapter(&index.chapters["1"]).unwrap().unwrap();
        assert_eq!(span.start_block, 0);
        assert_eq!(span.end_block, 1);
    }
}
