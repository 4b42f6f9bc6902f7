//! In-place edits of succinct sequences.
//!
//! Every edit re-encodes through the docSet dictionary (adding unseen
//! values), repairs the derived block indexes and rebuilds the chapter/verse
//! index of the document.

use super::docset::DocSet;
use super::document::Document;
use super::sequence::Sequence;
use crate::config::FilterOptions;
use crate::error::{LookupError, Result};
use crate::succinct::block::scope_labels;
use crate::succinct::codec::{decode_item_at, encode_items, encode_scope};
use crate::succinct::item::{ItemHeader, ItemType};
use crate::succinct::succinctify::included_scopes;
use crate::succinct::{EnumCategory, EnumDictionary, Item, ScopeEdge, SuccinctBlock, rebuild_block_indexes};
use crate::utils::{ByteArray, IdGenerator};
use std::collections::BTreeSet;
use tracing::debug;

impl DocSet {
    /// Replace the content of one block.
    ///
    /// Returns false when the block does not exist. The block's included
    /// scopes are recomputed, then open scopes and next-token markers are
    /// repaired forward until a block needs no change.
    pub fn replace_block_items(
        &mut self,
        doc_id: &str,
        seq_id: Option<&str>,
        block_index: usize,
        items: &[Item],
    ) -> Result<bool> {
        let enums = &mut self.enums;
        let doc = self
            .documents
            .get_mut(doc_id)
            .ok_or_else(|| LookupError::UnknownDocument(doc_id.to_string()))?;
        let seq_id = seq_id.map_or_else(|| doc.main_id.clone(), str::to_string);
        let seq = doc.sequence_mut(&seq_id)?;
        if block_index >= seq.blocks.len() {
            return Ok(false);
        }
        enums.maybe_build_pre_enums()?;
        let c = encode_items(items, enums, true)?;
        seq.blocks[block_index].c = c;
        repair_after_edit(&mut seq.blocks, block_index, enums)?;
        let is_main = seq.is_main();
        if is_main {
            doc.build_chapter_verse_index(enums)?;
        }
        debug!(document = doc_id, sequence = %seq_id, block = block_index, items = items.len(), "block items replaced");
        Ok(true)
    }

    /// Insert an empty block with its own scope at `position`
    pub fn new_block(&mut self, doc_id: &str, seq_id: &str, position: usize, label: &str) -> Result<bool> {
        let enums = &mut self.enums;
        let doc = self
            .documents
            .get_mut(doc_id)
            .ok_or_else(|| LookupError::UnknownDocument(doc_id.to_string()))?;
        let Some(seq) = doc.sequences.get_mut(seq_id) else {
            return Ok(false);
        };
        if position > seq.blocks.len() {
            return Ok(false);
        }
        enums.maybe_build_pre_enums()?;
        let mut block = SuccinctBlock::default();
        encode_scope(&mut block.bs, ScopeEdge::Start, label, enums, true)?;
        block.trim();
        seq.blocks.insert(position, block);
        rebuild_block_indexes(&mut seq.blocks, enums)?;
        if seq.is_main() {
            doc.build_chapter_verse_index(enums)?;
        }
        Ok(true)
    }

    pub fn delete_block(&mut self, doc_id: &str, seq_id: &str, position: usize) -> Result<bool> {
        let enums = &mut self.enums;
        let doc = self
            .documents
            .get_mut(doc_id)
            .ok_or_else(|| LookupError::UnknownDocument(doc_id.to_string()))?;
        let Some(seq) = doc.sequences.get_mut(seq_id) else {
            return Ok(false);
        };
        if position >= seq.blocks.len() {
            return Ok(false);
        }
        seq.blocks.remove(position);
        enums.maybe_build_pre_enums()?;
        rebuild_block_indexes(&mut seq.blocks, enums)?;
        if seq.is_main() {
            doc.build_chapter_verse_index(enums)?;
        }
        Ok(true)
    }

    /// Add a sequence built from item lists, one per block, each opened by
    /// a block scope label
    pub fn new_sequence(
        &mut self,
        doc_id: &str,
        kind: &str,
        blocks: &[(String, Vec<Item>)],
        ids: &dyn IdGenerator,
    ) -> Result<String> {
        let enums = &mut self.enums;
        let doc = self
            .documents
            .get_mut(doc_id)
            .ok_or_else(|| LookupError::UnknownDocument(doc_id.to_string()))?;
        enums.maybe_build_pre_enums()?;
        let mut seq = Sequence::new(ids.next_id(), kind);
        enums.code_for(EnumCategory::Ids, &seq.id, true)?;
        for (label, items) in blocks {
            let mut block = SuccinctBlock::default();
            encode_scope(&mut block.bs, ScopeEdge::Start, label, enums, true)?;
            block.c = encode_items(items, enums, true)?;
            seq.blocks.push(block);
        }
        rebuild_block_indexes(&mut seq.blocks, enums)?;
        let id = seq.id.clone();
        doc.sequences.insert(id.clone(), seq);
        Ok(id)
    }

    /// Delete a non-main sequence, the grafts that point at it and
    /// whatever becomes unreachable
    pub fn delete_sequence(&mut self, doc_id: &str, seq_id: &str) -> Result<bool> {
        let enums = &mut self.enums;
        let doc = self
            .documents
            .get_mut(doc_id)
            .ok_or_else(|| LookupError::UnknownDocument(doc_id.to_string()))?;
        let Some(seq) = doc.sequences.get(seq_id) else {
            return Ok(false);
        };
        if seq.is_main() {
            return Err(LookupError::MainSequence.into());
        }
        for other in doc.sequences.values_mut() {
            for block in &mut other.blocks {
                block.bg = drop_grafts_to(&block.bg, seq_id, enums)?;
                block.c = drop_grafts_to(&block.c, seq_id, enums)?;
            }
        }
        doc.sequences.remove(seq_id);
        doc.gc_sequences(enums)?;
        doc.build_chapter_verse_index(enums)?;
        Ok(true)
    }

    /// Filter every document of the docSet
    pub fn filter_by_options(&mut self, options: &FilterOptions) -> Result<()> {
        if options.is_empty() {
            return Ok(());
        }
        for doc in self.documents.values_mut() {
            filter_document(doc, options, &mut self.enums)?;
        }
        Ok(())
    }
}

/// Remove scopes and grafts an option set rejects, recompute block indexes
/// and collect sequences no longer grafted from main
pub fn filter_document(doc: &mut Document, options: &FilterOptions, enums: &mut EnumDictionary) -> Result<()> {
    if options.is_empty() {
        return Ok(());
    }
    enums.maybe_build_pre_enums()?;
    for seq in doc.sequences.values_mut() {
        for block in &mut seq.blocks {
            block.c = filter_records(&block.c, options, enums)?;
            block.bg = filter_records(&block.bg, options, enums)?;
        }
        rebuild_block_indexes(&mut seq.blocks, enums)?;
    }
    doc.gc_sequences(enums)?;
    doc.build_chapter_verse_index(enums)
}

/// Copy the records an option set keeps, byte for byte
fn filter_records(ba: &ByteArray, options: &FilterOptions, enums: &EnumDictionary) -> Result<ByteArray> {
    let mut out = ByteArray::with_capacity(ba.len());
    let mut pos = 0;
    while pos < ba.len() {
        let (item, len) = decode_item_at(ba, pos, enums)?;
        let keep = match &item {
            Item::Token(_) => true,
            Item::Scope { label, .. } => options.keeps_scope(label),
            Item::Graft { graft_type, .. } => options.keeps_graft(graft_type),
        };
        if keep {
            out.push_bytes(&ba.as_slice()[pos..pos + len]);
        }
        pos += len;
    }
    out.trim();
    Ok(out)
}

fn drop_grafts_to(ba: &ByteArray, seq_id: &str, enums: &EnumDictionary) -> Result<ByteArray> {
    let mut out = ByteArray::with_capacity(ba.len());
    let mut pos = 0;
    while pos < ba.len() {
        let header = ItemHeader::read(ba, pos)?;
        let keep = if header.item_type == ItemType::Graft {
            match decode_item_at(ba, pos, enums)?.0 {
                Item::Graft { seq_id: target, .. } => target != seq_id,
                _ => true,
            }
        } else {
            true
        };
        if keep {
            out.push_bytes(&ba.as_slice()[pos..pos + header.length]);
        }
        pos += header.length;
    }
    out.trim();
    Ok(out)
}

/// Recompute `is` of an edited block, then repair `os` and `nt` forward
fn repair_after_edit(blocks: &mut [SuccinctBlock], from: usize, enums: &mut EnumDictionary) -> Result<()> {
    let mut open = scope_labels(&blocks[from].os, enums)?;
    let mut next_token = blocks[from].next_token()?;
    let (is, words) = included_scopes(&blocks[from].c, enums, &mut open)?;
    blocks[from].is = is;
    blocks[from].trim();
    next_token += words;

    for block in blocks.iter_mut().skip(from + 1) {
        let current: BTreeSet<String> = scope_labels(&block.os, enums)?.into_iter().collect();
        let wanted: BTreeSet<String> = open.iter().cloned().collect();
        if current == wanted && block.next_token()? == next_token {
            break;
        }
        if current != wanted {
            let mut os = ByteArray::new();
            for label in &open {
                encode_scope(&mut os, ScopeEdge::Start, label, enums, true)?;
            }
            os.trim();
            block.os = os;
        } else {
            open = scope_labels(&block.os, enums)?;
        }
        block.set_next_token(next_token);
        let (_, words) = included_scopes(&block.c, enums, &mut open)?;
        next_token += words;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomTags;
    use crate::parser::{Dialect, TagTable, parse_document};
    use crate::succinct::decode_block;
    use crate::utils::SequentialIds;

    fn doc_set(text: &str) -> (DocSet, String) {
        let table = TagTable::new(&CustomTags::default()).unwrap();
        let ids = SequentialIds::new("x");
        let parsed = parse_document(text, Dialect::Usfm, &table, &ids, &[]).unwrap();
        let mut ds = DocSet::new("eng_web", Default::default());
        let doc_ids = ds.import_parsed(&[parsed], &ids, &FilterOptions::default()).unwrap();
        (ds, doc_ids[0].clone())
    }

    const TEXT: &str = "\\id GEN\n\\c 1\n\\p\n\\v 1 In the beginning\n\\p\n\\v 2 God created\\f + \\ft a note\\f*\n\\p\n\\v 3 Light";

    #[test]
    fn test_replace_items_repairs_following_blocks() {
        let (mut ds, doc_id) = doc_set(TEXT);
        let main_id = ds.document(&doc_id).unwrap().main_id.clone();
        let items = vec![
            Item::start("verse/1"),
            Item::word("Once"),
            Item::end("verse/1"),
            Item::start("verse/9"),
            Item::word("more"),
            Item::word("words"),
        ];
        assert!(ds.replace_block_items(&doc_id, None, 0, &items).unwrap());
        let seq = ds.document(&doc_id).unwrap().sequence(&main_id).unwrap().clone();
        let second = decode_block(&seq.blocks[1], &ds.enums).unwrap();
        assert!(second.os.contains(&Item::start("verse/9")));
        assert_eq!(second.nt, 3);
        let third = decode_block(&seq.blocks[2], &ds.enums).unwrap();
        assert_eq!(third.nt, 5);
    }

    #[test]
    fn test_out_of_range_edits_return_false() {
        let (mut ds, doc_id) = doc_set(TEXT);
        let main_id = ds.document(&doc_id).unwrap().main_id.clone();
        assert!(!ds.replace_block_items(&doc_id, None, 99, &[]).unwrap());
        assert!(!ds.delete_block(&doc_id, &main_id, 99).unwrap());
        assert!(!ds.new_block(&doc_id, &main_id, 99, "blockTag/p").unwrap());
        assert!(!ds.new_block(&doc_id, "nope", 0, "blockTag/p").unwrap());
    }

    #[test]
    fn test_new_and_delete_block() {
        let (mut ds, doc_id) = doc_set(TEXT);
        let main_id = ds.document(&doc_id).unwrap().main_id.clone();
        let before = ds.document(&doc_id).unwrap().sequence(&main_id).unwrap().blocks.len();
        assert!(ds.new_block(&doc_id, &main_id, 1, "blockTag/q").unwrap());
        let seq = ds.document(&doc_id).unwrap().sequence(&main_id).unwrap();
        assert_eq!(seq.blocks.len(), before + 1);
        assert_eq!(decode_block(&seq.blocks[1], &ds.enums).unwrap().bs, Item::start("blockTag/q"));
        assert!(ds.delete_block(&doc_id, &main_id, 1).unwrap());
        let seq = ds.document(&doc_id).unwrap().sequence(&main_id).unwrap();
        assert_eq!(seq.blocks.len(), before);
    }

    #[test]
    fn test_delete_sequence_removes_grafts() {
        let (mut ds, doc_id) = doc_set(TEXT);
        let doc = ds.document(&doc_id).unwrap();
        let footnote = doc
            .sequences
            .values()
            .find(|s| s.kind == "footnote")
            .map(|s| s.id.clone())
            .unwrap();
        let main_id = doc.main_id.clone();
        assert!(ds.delete_sequence(&doc_id, &footnote).unwrap());
        let doc = ds.document(&doc_id).unwrap();
        assert!(!doc.sequences.contains_key(&footnote));
        assert!(doc.sequence(&main_id).unwrap().graft_targets(&ds.enums).unwrap().iter().all(|t| *t != footnote));
        assert!(matches!(
            ds.delete_sequence(&doc_id, &main_id),
            Err(crate::error::Error::Lookup(LookupError::MainSequence))
        ));
    }

    #[test]
    fn test_filter_removes_grafts_and_collects() {
        let (mut ds, doc_id) = doc_set(TEXT);
        let options = FilterOptions {
            exclude_grafts: Some(vec!["footnote".to_string()]),
            ..FilterOptions::default()
        };
        ds.filter_by_options(&options).unwrap();
        let doc = ds.document(&doc_id).unwrap();
        assert!(doc.sequences.values().all(|s| s.kind != "footnote"));
        let snapshot = doc.clone();
        ds.filter_by_options(&options).unwrap();
        assert_eq!(ds.document(&doc_id).unwrap(), &snapshot);
    }

    #[test]
    fn test_empty_filter_is_identity() {
        let (mut ds, doc_id) = doc_set(TEXT);
        let before = ds.document(&doc_id).unwrap().clone();
        ds.filter_by_options(&FilterOptions::default()).unwrap();
        assert_eq!(ds.document(&doc_id).unwrap(), &before);
    }
}
