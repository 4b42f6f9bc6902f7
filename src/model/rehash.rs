use super::docset::DocSet;
use crate::error::Result;
use crate::succinct::codec::{decode_items, record_item_pre_enums, remap_records};
use crate::succinct::{EnumCategory, EnumDictionary};
use std::time::Instant;
use tracing::info;

impl DocSet {
    /// Recompute every enum code by descending frequency of live use and
    /// rewrite all block records to match.
    ///
    /// Values no longer referenced by any block disappear. A live record
    /// whose code has no counterpart is a structural error and leaves the
    /// docSet untouched.
    pub fn rehash(&mut self) -> Result<()> {
        let start = Instant::now();
        let mut fresh = EnumDictionary::new();
        fresh.build_empty_pre_enums();
        for doc in self.documents() {
            for seq in doc.sequences.values() {
                fresh.record_pre_enum(EnumCategory::Ids, &seq.id)?;
                for block in &seq.blocks {
                    for ba in [&block.bs, &block.bg, &block.c, &block.is, &block.os] {
                        for item in decode_items(ba, &self.enums)? {
                            record_item_pre_enums(&mut fresh, &item)?;
                        }
                    }
                }
            }
        }
        fresh.sort_pre_enums();
        fresh.build_enums()?;
        let map = self.enums.code_map_to(&fresh)?;

        let mut documents = self.documents.clone();
        for doc in documents.values_mut() {
            for seq in doc.sequences.values_mut() {
                for block in &mut seq.blocks {
                    block.bs = remap_records(&block.bs, &map)?;
                    block.bg = remap_records(&block.bg, &map)?;
                    block.c = remap_records(&block.c, &map)?;
                    block.is = remap_records(&block.is, &map)?;
                    block.os = remap_records(&block.os, &map)?;
                }
            }
            doc.build_chapter_verse_index(&mut fresh)?;
        }
        fresh.clear_pre_enums();

        let before: usize = EnumCategory::ALL.iter().map(|c| self.enums.len(*c)).sum();
        let after: usize = EnumCategory::ALL.iter().map(|c| fresh.len(*c)).sum();
        self.enums = fresh;
        self.documents = documents;
        info!(
            doc_set = %self.id,
            codes_before = before,
            codes_after = after,
            elapsed = ?start.elapsed(),
            "docSet rehashed"
        );
        Ok(())
    }
}
