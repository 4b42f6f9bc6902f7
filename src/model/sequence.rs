use crate::error::{LookupError, Result};
use crate::index::{ChapterVerseIndex, VerseMapping};
use crate::succinct::codec::decode_items;
use crate::succinct::{EnumDictionary, Item, ItemFilter, SuccinctBlock, decode_items_with};
use crate::utils::ByteArray;
use roaring::RoaringBitmap;
use std::collections::{BTreeMap, BTreeSet};

/// An ordered run of succinct blocks.
///
/// Only the main sequence carries the chapter/verse index, the
/// `tokens_present` bitmap and an optional verse mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub id: String,
    pub kind: String,
    pub tags: BTreeSet<String>,
    pub blocks: Vec<SuccinctBlock>,
    pub chapters: BTreeMap<String, ByteArray>,
    pub chapter_verses: BTreeMap<String, ByteArray>,
    pub tokens_present: Option<RoaringBitmap>,
    pub verse_mapping: Option<VerseMapping>,
}

impl Sequence {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            tags: BTreeSet::new(),
            blocks: Vec::new(),
            chapters: BTreeMap::new(),
            chapter_verses: BTreeMap::new(),
            tokens_present: None,
            verse_mapping: None,
        }
    }

    pub fn is_main(&self) -> bool {
        self.kind == "main"
    }

    pub fn block(&self, index: usize) -> Result<&SuccinctBlock> {
        self.blocks.get(index).ok_or_else(|| {
            LookupError::UnknownBlock {
                sequence: self.id.clone(),
                index,
            }
            .into()
        })
    }

    /// Install a freshly built chapter/verse index
    pub fn set_index(&mut self, index: ChapterVerseIndex) {
        self.chapters = index.chapters;
        self.chapter_verses = index.chapter_verses;
        self.tokens_present = Some(index.tokens_present);
    }

    /// Ids of every sequence grafted from this one, block grafts first
    pub fn graft_targets(&self, enums: &EnumDictionary) -> Result<Vec<String>> {
        let mut targets = Vec::new();
        for block in &self.blocks {
            for item in decode_items(&block.bg, enums)? {
                if let Item::Graft { seq_id, .. } = item {
                    targets.push(seq_id);
                }
            }
            for ci in decode_items_with(&block.c, enums, ItemFilter::GRAFTS, None, &[])? {
                if let Item::Graft { seq_id, .. } = ci.item {
                    targets.push(seq_id);
                }
            }
        }
        Ok(targets)
    }

    /// Number of word-like tokens in the whole sequence
    pub fn word_count(&self, enums: &EnumDictionary) -> Result<u32> {
        let Some(last) = self.blocks.last() else {
            return Ok(0);
        };
        let tail = decode_items_with(&last.c, enums, ItemFilter::TOKENS, None, &[])?
            .iter()
            .filter(|ci| ci.item.is_word_like())
            .count() as u32;
        Ok(last.next_token()? + tail)
    }
}
