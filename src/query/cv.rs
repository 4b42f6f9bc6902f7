//! Chapter/verse lookups through the index.
//!
//! Every lookup returns [`ItemGroup`]s: the scopes open where a span
//! starts, then its items with each block wrapped in its own scope and
//! blocks joined by a line space.

use super::reference::CvReference;
use crate::error::Result;
use crate::index::{MappedVerse, Span, VerseSpan, map_verse};
use crate::model::{DocSet, Document, ItemGroup, Sequence, join_blocks};
use serde::Serialize;
use tracing::debug;

/// Verses and chapters present around a position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CvNavigation {
    pub previous_verse: Option<(u32, u32)>,
    pub next_verse: Option<(u32, u32)>,
    pub previous_chapter: Option<u32>,
    pub next_chapter: Option<u32>,
}

pub fn cv(doc_set: &DocSet, document: &Document, reference: &CvReference, include_context: bool) -> Result<Vec<ItemGroup>> {
    let main = document.main_sequence()?;
    let mut groups = Vec::new();
    match *reference {
        CvReference::Chapter(c) => {
            if let Some(span) = document.chapter_span(c)? {
                groups.push(span_group(doc_set, main, &[span], include_context)?);
            }
        }
        CvReference::ChapterRange { from, to } => {
            for c in from..=to {
                if let Some(span) = document.chapter_span(c)? {
                    groups.push(span_group(doc_set, main, &[span], include_context)?);
                }
            }
        }
        CvReference::Verse { chapter, verse } => {
            groups.extend(verse_groups(doc_set, document, chapter, verse, verse, include_context)?);
        }
        CvReference::VerseRange { chapter, from, to } => {
            groups.extend(verse_groups(doc_set, document, chapter, from, to, include_context)?);
        }
        CvReference::CrossChapter { from, to } => {
            let first = first_record(doc_set, document, from.0, from.1)?;
            let last = first_record(doc_set, document, to.0, to.1)?;
            if let (Some(first), Some(last)) = (first, last) {
                if (first.start_block, first.start_item) <= (last.end_block, last.end_item) {
                    let span = Span {
                        start_block: first.start_block,
                        end_block: last.end_block,
                        start_item: first.start_item,
                        end_item: last.end_item,
                        next_token: first.next_token,
                    };
                    groups.push(span_group(doc_set, main, &[span], include_context)?);
                }
            }
        }
    }
    debug!(document = %document.id, reference = %reference, groups = groups.len(), "cv");
    Ok(groups)
}

/// Look a verse up in another docSet through the versification tables.
///
/// The source book's forward table maps the verse into the shared
/// versification, the target book's reversed table maps it back out.
/// Each resulting verse yields one group, in mapping order; a fragment
/// letter picks one record of the target verse.
pub fn mapped_cv(
    source: &Document,
    chapter: u32,
    verse: u32,
    target_set: &DocSet,
    include_context: bool,
) -> Result<Vec<ItemGroup>> {
    let (book, mapped) = verse_numbers(source, chapter, verse)?;
    let Some(target) = target_set.document_with_book(&book) else {
        return Ok(Vec::new());
    };
    let reversed = target.main_sequence()?.verse_mapping.as_ref().map(|m| &m.reversed);
    let mut verses: Vec<MappedVerse> = Vec::new();
    for mv in mapped {
        match reversed.and_then(|r| r.get(&mv.chapter.to_string())) {
            Some(table) => {
                let (_, back) = map_verse(table, &mv.book, mv.chapter, mv.verse)?;
                let keep_fragment = back.len() == 1;
                verses.extend(back.into_iter().map(|b| MappedVerse {
                    fragment: if keep_fragment { mv.fragment } else { None },
                    ..b
                }));
            }
            None => verses.push(mv),
        }
    }

    let main = target.main_sequence()?;
    let mut groups = Vec::new();
    for mv in &verses {
        let Some(slots) = target.chapter_verse_groups(mv.chapter, &target_set.enums)? else {
            continue;
        };
        let Some(records) = slots.get(mv.verse as usize) else {
            continue;
        };
        let spans: Vec<Span> = match mv.fragment {
            Some(letter) => {
                let n = (letter as u32).saturating_sub('a' as u32) as usize;
                records.get(n).map(|r| r.span).into_iter().collect()
            }
            None => records.iter().map(|r| r.span).collect(),
        };
        if !spans.is_empty() {
            groups.push(span_group(target_set, main, &spans, include_context)?);
        }
    }
    debug!(source = %source.id, target = %target.id, chapter, verse, groups = groups.len(), "mapped cv");
    Ok(groups)
}

/// Neighbouring verses and chapters that have index records
pub fn cv_navigation(doc_set: &DocSet, document: &Document, chapter: u32, verse: u32) -> Result<CvNavigation> {
    let slots = |c: u32| -> Result<Vec<Vec<VerseSpan>>> {
        Ok(document.chapter_verse_groups(c, &doc_set.enums)?.unwrap_or_default())
    };
    let present = |groups: &[Vec<VerseSpan>]| -> Vec<u32> {
        groups
            .iter()
            .enumerate()
            .filter(|(_, records)| !records.is_empty())
            .map(|(v, _)| v as u32)
            .collect()
    };
    let current = present(&slots(chapter)?);
    let next = present(&slots(chapter + 1)?);
    let previous = match chapter.checked_sub(1) {
        Some(c) => present(&slots(c)?),
        None => Vec::new(),
    };

    let next_verse = current
        .iter()
        .find(|v| **v > verse)
        .map(|v| (chapter, *v))
        .or_else(|| next.first().map(|v| (chapter + 1, *v)));
    let previous_verse = current
        .iter()
        .rev()
        .find(|v| **v < verse)
        .map(|v| (chapter, *v))
        .or_else(|| previous.last().map(|v| (chapter - 1, *v)));
    Ok(CvNavigation {
        previous_verse,
        next_verse,
        previous_chapter: (!current.is_empty() && !previous.is_empty()).then(|| chapter - 1),
        next_chapter: (!current.is_empty() && !next.is_empty()).then_some(chapter + 1),
    })
}

/// The book and verses a local verse maps to; unmapped verses map to
/// themselves
pub fn verse_numbers(document: &Document, chapter: u32, verse: u32) -> Result<(String, Vec<MappedVerse>)> {
    let book = document.book_code().unwrap_or_default().to_string();
    let forward = document
        .main_sequence()?
        .verse_mapping
        .as_ref()
        .and_then(|m| m.forward.get(&chapter.to_string()));
    match forward {
        Some(table) => map_verse(table, &book, chapter, verse),
        None => Ok((
            book.clone(),
            vec![MappedVerse {
                book,
                chapter,
                verse,
                fragment: None,
            }],
        )),
    }
}

fn verse_groups(
    doc_set: &DocSet,
    document: &Document,
    chapter: u32,
    from: u32,
    to: u32,
    include_context: bool,
) -> Result<Vec<ItemGroup>> {
    let Some(slots) = document.chapter_verse_groups(chapter, &doc_set.enums)? else {
        return Ok(Vec::new());
    };
    let main = document.main_sequence()?;
    let mut groups = Vec::new();
    for records in slots.iter().take(to as usize + 1).skip(from as usize) {
        if records.is_empty() {
            continue;
        }
        let spans: Vec<Span> = records.iter().map(|r| r.span).collect();
        groups.push(span_group(doc_set, main, &spans, include_context)?);
    }
    Ok(groups)
}

fn first_record(doc_set: &DocSet, document: &Document, chapter: u32, verse: u32) -> Result<Option<Span>> {
    Ok(document
        .chapter_verse_groups(chapter, &doc_set.enums)?
        .and_then(|slots| slots.get(verse as usize).and_then(|r| r.first()).map(|r| r.span)))
}

/// One group over several spans; open scopes are taken where the first
/// span starts
fn span_group(doc_set: &DocSet, main: &Sequence, spans: &[Span], include_context: bool) -> Result<ItemGroup> {
    let open_scopes = match spans.first() {
        Some(span) => doc_set.open_scopes_at(main, span.start_block as usize, span.start_item as usize)?,
        None => Vec::new(),
    };
    let mut blocks = Vec::new();
    for span in spans {
        blocks.extend(doc_set.items_for_span(main, span, include_context)?);
    }
    Ok(ItemGroup {
        open_scopes,
        items: join_blocks(blocks),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomTags, FilterOptions};
    use crate::index::parse_vrs;
    use crate::parser::{Dialect, TagTable, parse_document};
    use crate::succinct::{Item, TokenKind};
    use crate::utils::SequentialIds;

    const TWO_CHAPTERS: &str =
        "\\id GEN\n\\c 1\n\\p\n\\v 1 one\n\\p\n\\v 2 two words\n\\p\n\\v 3 three\n\\c 2\n\\p\n\\v 1 four\n\\v 2 five";

    fn doc_set(id: &str, text: &str) -> (DocSet, String) {
        let table = TagTable::new(&CustomTags::default()).unwrap();
        let ids = SequentialIds::new(id);
        let parsed = parse_document(text, Dialect::Usfm, &table, &ids, &[]).unwrap();
        let mut ds = DocSet::new(id, Default::default());
        let doc_ids = ds.import_parsed(&[parsed], &ids, &FilterOptions::default()).unwrap();
        (ds, doc_ids[0].clone())
    }

    fn words(group: &ItemGroup) -> Vec<String> {
        group
            .items
            .iter()
            .filter(|ci| ci.item.is_word_like())
            .filter_map(|ci| match &ci.item {
                Item::Token(t) => Some(t.chars.clone()),
                _ => None,
            })
            .collect()
    }

    fn reference(text: &str) -> CvReference {
        CvReference::parse(text).unwrap()
    }

    #[test]
    fn test_cv_verse() {
        let (ds, doc_id) = doc_set("a", TWO_CHAPTERS);
        let doc = ds.document(&doc_id).unwrap();
        let groups = cv(&ds, doc, &reference("1:2"), true).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(words(&groups[0]), vec!["two", "words"]);
        assert!(groups[0].open_scopes.contains(&"chapter/1".to_string()));
        let first_word = groups[0].items.iter().find(|ci| ci.item.is_word_like()).unwrap();
        assert_eq!(first_word.context.as_ref().map(|c| c.position), Some(1));
    }

    #[test]
    fn test_cv_chapter_and_range() {
        let (ds, doc_id) = doc_set("a", TWO_CHAPTERS);
        let doc = ds.document(&doc_id).unwrap();
        let chapter = cv(&ds, doc, &reference("2"), false).unwrap();
        assert_eq!(words(&chapter[0]), vec!["four", "five"]);
        assert_eq!(cv(&ds, doc, &reference("1-2"), false).unwrap().len(), 2);
        let verses = cv(&ds, doc, &reference("1:1-2"), false).unwrap();
        assert_eq!(verses.len(), 2);
        let cross = cv(&ds, doc, &reference("1:3-2:1"), false).unwrap();
        assert_eq!(words(&cross[0]), vec!["three", "four"]);
        assert!(cv(&ds, doc, &reference("7"), false).unwrap().is_empty());
    }

    #[test]
    fn test_blocks_are_joined_with_line_space() {
        let (ds, doc_id) = doc_set("a", TWO_CHAPTERS);
        let doc = ds.document(&doc_id).unwrap();
        let chapter = cv(&ds, doc, &reference("1"), false).unwrap();
        let spaces = chapter[0]
            .items
            .iter()
            .filter(|ci| ci.item == Item::token(TokenKind::LineSpace, " "))
            .count();
        assert!(spaces >= 2);
    }

    #[test]
    fn test_deleted_block_leaves_no_stale_verse() {
        let (mut ds, doc_id) = doc_set("a", TWO_CHAPTERS);
        let (main_id, block) = {
            let doc = ds.document(&doc_id).unwrap();
            let main = doc.main_sequence().unwrap();
            (main.id.clone(), ds.blocks_matching_reference(main, &reference("1:2")).unwrap()[0])
        };
        assert!(ds.delete_block(&doc_id, &main_id, block).unwrap());
        let doc = ds.document(&doc_id).unwrap();
        assert!(cv(&ds, doc, &reference("1:2"), false).unwrap().is_empty());
        assert_eq!(words(&cv(&ds, doc, &reference("1:3"), false).unwrap()[0]), vec!["three"]);
    }

    #[test]
    fn test_mapped_cv_fragments() {
        let (mut source, source_id) = doc_set("s", "\\id GEN\n\\c 2\n\\p\n\\v 5 whole verse");
        source.set_verse_mapping(&parse_vrs("2:5 = 2:5a,2:5b").unwrap()).unwrap();
        let (target, _) = doc_set("t", "\\id GEN\n\\c 2\n\\p\n\\v 5 first half\n\\v 5 second half");
        let doc = source.document(&source_id).unwrap();
        let groups = mapped_cv(doc, 2, 5, &target, false).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(words(&groups[0]), vec!["first", "half"]);
        assert_eq!(words(&groups[1]), vec!["second", "half"]);
    }

    #[test]
    fn test_navigation() {
        let (ds, doc_id) = doc_set("a", TWO_CHAPTERS);
        let doc = ds.document(&doc_id).unwrap();
        let nav = cv_navigation(&ds, doc, 1, 3).unwrap();
        assert_eq!(nav.next_verse, Some((2, 1)));
        assert_eq!(nav.previous_verse, Some((1, 2)));
        assert_eq!(nav.next_chapter, Some(2));
        assert_eq!(nav.previous_chapter, None);
        let last = cv_navigation(&ds, doc, 2, 2).unwrap();
        assert_eq!(last.next_verse, None);
        assert_eq!(last.previous_chapter, Some(1));
    }

    #[test]
    fn test_verse_numbers_identity_without_mapping() {
        let (ds, doc_id) = doc_set("a", TWO_CHAPTERS);
        let (book, verses) = verse_numbers(ds.document(&doc_id).unwrap(), 1, 2).unwrap();
        assert_eq!(book, "GEN");
        assert_eq!((verses[0].chapter, verses[0].verse), (1, 2));
    }
}
