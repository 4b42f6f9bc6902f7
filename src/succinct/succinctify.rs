//! Builder sequences to succinct blocks.
//!
//! Two passes over a parsed document: every string is first staged in the
//! dictionary, then each block is encoded while an open-scope list is carried
//! from one block to the next.

use super::block::SuccinctBlock;
use super::codec::{encode_item, encode_scope, record_item_pre_enums, record_scope_pre_enums};
use super::enums::{EnumCategory, EnumDictionary};
use super::item::{Item, ScopeEdge};
use crate::error::Result;
use crate::parser::{BuildSequence, ParsedDocument};
use crate::utils::ByteArray;

/// Stage every enum value a parsed document needs
pub fn record_document_pre_enums(enums: &mut EnumDictionary, doc: &ParsedDocument) -> Result<()> {
    for seq in &doc.sequences {
        enums.record_pre_enum(EnumCategory::Ids, &seq.id)?;
        for block in &seq.blocks {
            record_scope_pre_enums(enums, &block.bs)?;
            for item in block.bg.iter().chain(&block.items) {
                record_item_pre_enums(enums, item)?;
            }
        }
    }
    Ok(())
}

/// Encode one sequence's blocks.
///
/// `os` holds the start records of the scopes open when the block begins,
/// `is` the scopes started inside it and `nt` the number of word-like
/// tokens that came before it in the sequence.
pub fn succinctify_blocks(seq: &BuildSequence, enums: &mut EnumDictionary) -> Result<Vec<SuccinctBlock>> {
    let mut blocks = Vec::with_capacity(seq.blocks.len());
    let mut open: Vec<String> = Vec::new();
    let mut next_token: u32 = 0;

    for block in &seq.blocks {
        let mut out = SuccinctBlock::default();
        out.set_next_token(next_token);
        encode_scope(&mut out.bs, ScopeEdge::Start, &block.bs, enums, true)?;
        for graft in &block.bg {
            encode_item(&mut out.bg, graft, enums, true)?;
        }
        for label in &open {
            encode_scope(&mut out.os, ScopeEdge::Start, label, enums, true)?;
        }

        let mut included: Vec<&str> = Vec::new();
        let mut content = ByteArray::with_capacity(block.items.len() * 3);
        for item in &block.items {
            encode_item(&mut content, item, enums, true)?;
            match item {
                Item::Token(_) if item.is_word_like() => next_token += 1,
                Item::Scope { edge: ScopeEdge::Start, label } => {
                    if !open.contains(label) {
                        open.push(label.clone());
                    }
                    if !included.contains(&label.as_str()) {
                        included.push(label);
                    }
                }
                Item::Scope { edge: ScopeEdge::End, label } => open.retain(|l| l != label),
                _ => {}
            }
        }
        for label in included {
            encode_scope(&mut out.is, ScopeEdge::Start, label, enums, true)?;
        }
        out.c = content;
        out.trim();
        blocks.push(out);
    }
    Ok(blocks)
}

/// Recompute `os`, `is` and `nt` of every block from the content alone
pub fn rebuild_block_indexes(blocks: &mut [SuccinctBlock], enums: &mut EnumDictionary) -> Result<()> {
    let mut open: Vec<String> = Vec::new();
    let mut next_token: u32 = 0;
    for block in blocks.iter_mut() {
        let mut os = ByteArray::new();
        for label in &open {
            encode_scope(&mut os, ScopeEdge::Start, label, enums, true)?;
        }
        let (is, words) = included_scopes(&block.c, enums, &mut open)?;
        block.os = os;
        block.is = is;
        block.set_next_token(next_token);
        block.trim();
        next_token += words;
    }
    Ok(())
}

/// Included-scope record of a content buffer; updates `open` and counts words
pub fn included_scopes(
    c: &ByteArray,
    enums: &mut EnumDictionary,
    open: &mut Vec<String>,
) -> Result<(ByteArray, u32)> {
    let mut included: Vec<String> = Vec::new();
    let mut words = 0;
    for item in super::codec::decode_items(c, enums)? {
        match item {
            Item::Token(t) if t.kind == super::item::TokenKind::WordLike => words += 1,
            Item::Scope { edge: ScopeEdge::Start, label } => {
                if !open.contains(&label) {
                    open.push(label.clone());
                }
                if !included.contains(&label) {
                    included.push(label);
                }
            }
            Item::Scope { edge: ScopeEdge::End, label } => open.retain(|l| *l != label),
            _ => {}
        }
    }
    let mut is = ByteArray::new();
    for label in &included {
        encode_scope(&mut is, ScopeEdge::Start, label, enums, true)?;
    }
    is.trim();
    Ok((is, words))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomTags;
    use crate::parser::{Dialect, TagTable, parse_document};
    use crate::succinct::block::decode_block;
    use crate::utils::SequentialIds;

    fn encode(text: &str) -> (EnumDictionary, ParsedDocument, Vec<SuccinctBlock>) {
        let table = TagTable::new(&CustomTags::default()).unwrap();
        let ids = SequentialIds::new("s");
        let doc = parse_document(text, Dialect::Usfm, &table, &ids, &[]).unwrap();
        let mut enums = EnumDictionary::new();
        enums.build_pre_enums().unwrap();
        record_document_pre_enums(&mut enums, &doc).unwrap();
        enums.sort_pre_enums();
        enums.build_enums().unwrap();
        let blocks = succinctify_blocks(&doc.sequences[0], &mut enums).unwrap();
        (enums, doc, blocks)
    }

    #[test]
    fn test_blocks_decode_to_parsed_items() {
        let (enums, doc, blocks) = encode("\\id GEN\n\\c 1\n\\p\n\\v 1 In the\n\\p\n\\v 2 God said");
        assert_eq!(blocks.len(), doc.sequences[0].blocks.len());
        for (built, stored) in doc.sequences[0].blocks.iter().zip(&blocks) {
            let decoded = decode_block(stored, &enums).unwrap();
            assert_eq!(decoded.c, built.items);
            assert_eq!(decoded.bs, Item::start(built.bs.clone()));
        }
    }

    #[test]
    fn test_open_scopes_and_next_token() {
        let (enums, _, blocks) = encode("\\id GEN\n\\c 1\n\\p\n\\v 1 In the\n\\p more words\n\\v 2 God");
        let second = decode_block(&blocks[1], &enums).unwrap();
        assert_eq!(second.nt, 2);
        assert!(second.os.contains(&Item::start("chapter/1")));
        assert!(second.os.contains(&Item::start("verse/1")));
        assert!(second.is.contains(&Item::start("verse/2")));
        assert!(!second.is.contains(&Item::start("verse/1")));
    }

    #[test]
    fn test_rebuild_matches_original_encoding() {
        let (mut enums, _, blocks) = encode("\\id GEN\n\\c 1\n\\p\n\\v 1 a b\n\\p c\n\\v 2 d\n\\c 2\n\\p\n\\v 1 e");
        let mut rebuilt = blocks.clone();
        for b in &mut rebuilt {
            b.os.clear();
            b.is.clear();
            b.nt.clear();
        }
        rebuild_block_indexes(&mut rebuilt, &mut enums).unwrap();
        assert_eq!(rebuilt, blocks);
    }
}
