//! A docSet: documents sharing selectors and one enum dictionary.

use super::document::Document;
use super::edit::filter_document;
use super::sequence::Sequence;
use crate::config::{FilterOptions, Selectors};
use crate::error::{ConfigurationError, ImportError, LookupError, Result};
use crate::index::{MappingRule, Span, VerseMapping};
use crate::parser::ParsedDocument;
use crate::query::CvReference;
use crate::succinct::block::{all_block_scopes, scope_labels};
use crate::succinct::codec::{decode_item_at, decode_items, decode_single};
use crate::succinct::{
    ContextItem, EnumCategory, EnumDictionary, Item, ItemFilter, ScopeEdge, SuccinctBlock, TokenKind,
    decode_items_with, record_document_pre_enums,
};
use crate::utils::IdGenerator;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][A-Za-z0-9]*(:.+)?$").expect("tag regex is valid"));

pub const HAS_MAPPING_TAG: &str = "hasMapping";

pub fn validate_tag(tag: &str) -> std::result::Result<(), ConfigurationError> {
    if TAG.is_match(tag) {
        Ok(())
    } else {
        Err(ConfigurationError::BadTag(tag.to_string()))
    }
}

/// Items together with the scopes open where they start
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemGroup {
    pub open_scopes: Vec<String>,
    pub items: Vec<ContextItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocSetStats {
    pub documents: usize,
    pub sequences: usize,
    pub blocks: usize,
    pub enum_sizes: BTreeMap<String, usize>,
    pub enum_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct DocSet {
    pub id: String,
    pub selectors: Selectors,
    pub tags: BTreeSet<String>,
    pub enums: EnumDictionary,
    pub documents: BTreeMap<String, Document>,
    /// Import order
    pub doc_ids: Vec<String>,
}

impl DocSet {
    pub fn new(id: impl Into<String>, selectors: Selectors) -> Self {
        Self {
            id: id.into(),
            selectors,
            tags: BTreeSet::new(),
            enums: EnumDictionary::new(),
            documents: BTreeMap::new(),
            doc_ids: Vec::new(),
        }
    }

    pub fn document(&self, doc_id: &str) -> Result<&Document> {
        self.documents
            .get(doc_id)
            .ok_or_else(|| LookupError::UnknownDocument(doc_id.to_string()).into())
    }

    pub fn document_mut(&mut self, doc_id: &str) -> Result<&mut Document> {
        self.documents
            .get_mut(doc_id)
            .ok_or_else(|| LookupError::UnknownDocument(doc_id.to_string()).into())
    }

    /// Documents in import order
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.doc_ids.iter().filter_map(|id| self.documents.get(id))
    }

    /// The only document with this book code, if exactly one has it
    pub fn document_with_book(&self, book_code: &str) -> Option<&Document> {
        let mut matching = self.documents().filter(|d| d.book_code() == Some(book_code));
        match (matching.next(), matching.next()) {
            (Some(doc), None) => Some(doc),
            _ => None,
        }
    }

    /// Succinctify a batch of parsed documents.
    ///
    /// Staging happens on a copy of the dictionary, so a failure anywhere
    /// leaves the docSet as it was.
    pub fn import_parsed(
        &mut self,
        parsed: &[ParsedDocument],
        ids: &dyn IdGenerator,
        filter: &FilterOptions,
    ) -> Result<Vec<String>> {
        let start = Instant::now();
        let mut books: BTreeSet<&str> = self.documents().filter_map(|d| d.book_code()).collect();
        for doc in parsed {
            if !books.insert(doc.book_code.as_str()) {
                return Err(ImportError::DuplicateBook(doc.book_code.clone()).into());
            }
        }

        let mut enums = self.enums.clone();
        let first_import = enums.is_empty(EnumCategory::WordLike);
        enums.build_pre_enums()?;
        for doc in parsed {
            record_document_pre_enums(&mut enums, doc)?;
        }
        if first_import {
            enums.sort_pre_enums();
        }
        enums.build_enums()?;
        debug!(elapsed = ?start.elapsed(), "enums staged");

        let mut imported = Vec::with_capacity(parsed.len());
        for doc in parsed {
            let mut document = Document::from_parsed(ids.next_id(), doc, &mut enums)?;
            if !filter.is_empty() {
                filter_document(&mut document, filter, &mut enums)?;
            }
            imported.push(document);
        }
        enums.clear_pre_enums();

        self.enums = enums;
        let mut doc_ids = Vec::with_capacity(imported.len());
        for document in imported {
            info!(
                doc_set = %self.id,
                document = %document.id,
                book = document.book_code().unwrap_or(""),
                sequences = document.sequences.len(),
                "document imported"
            );
            doc_ids.push(document.id.clone());
            self.doc_ids.push(document.id.clone());
            self.documents.insert(document.id.clone(), document);
        }
        debug!(elapsed = ?start.elapsed(), count = doc_ids.len(), "batch succinctified");
        Ok(doc_ids)
    }

    /// Remove a document and rehash what is left
    pub fn delete_document(&mut self, doc_id: &str) -> Result<()> {
        if self.documents.remove(doc_id).is_none() {
            return Err(LookupError::UnknownDocument(doc_id.to_string()).into());
        }
        self.doc_ids.retain(|id| id != doc_id);
        self.rehash()
    }

    /// Scopes open just before `item_index` of a block
    pub fn open_scopes_at(&self, seq: &Sequence, block_index: usize, item_index: usize) -> Result<Vec<String>> {
        let block = seq.block(block_index)?;
        let mut open = scope_labels(&block.os, &self.enums)?;
        let mut pos = 0;
        let mut n = 0;
        while pos < block.c.len() && n < item_index {
            let (item, len) = decode_item_at(&block.c, pos, &self.enums)?;
            if let Item::Scope { edge, label } = item {
                match edge {
                    ScopeEdge::Start => {
                        if !open.contains(&label) {
                            open.push(label);
                        }
                    }
                    ScopeEdge::End => open.retain(|l| *l != label),
                }
            }
            pos += len;
            n += 1;
        }
        Ok(open)
    }

    /// Items of each block a span covers, wrapped in the block's own scope.
    ///
    /// The first and last blocks are sliced at the span's item bounds; the
    /// end item is inclusive.
    pub fn items_for_span(&self, seq: &Sequence, span: &Span, include_context: bool) -> Result<Vec<Vec<ContextItem>>> {
        let mut ret = Vec::new();
        for block_n in span.start_block..=span.end_block {
            let block = seq.block(block_n as usize)?;
            let open = scope_labels(&block.os, &self.enums)?;
            let next_token = if include_context {
                Some(block.next_token()?)
            } else {
                None
            };
            let mut items = decode_items_with(&block.c, &self.enums, ItemFilter::ALL, next_token, &open)?;
            if block_n == span.end_block {
                items.truncate((span.end_item as usize + 1).min(items.len()));
            }
            if block_n == span.start_block {
                let from = (span.start_item as usize).min(items.len());
                items.drain(..from);
            }
            let bs = decode_single(&block.bs, &self.enums)?;
            let Some(label) = bs.scope_label().map(str::to_string) else {
                continue;
            };
            let mut wrapped: Vec<ContextItem> = decode_items(&block.bg, &self.enums)?
                .into_iter()
                .map(plain)
                .collect();
            wrapped.push(plain(Item::start(label.clone())));
            wrapped.extend(items);
            wrapped.push(plain(Item::end(label)));
            ret.push(wrapped);
        }
        Ok(ret)
    }

    /// Indexes of blocks whose scopes satisfy a reference
    pub fn blocks_matching_reference(&self, seq: &Sequence, reference: &CvReference) -> Result<Vec<usize>> {
        let mut ret = Vec::new();
        for (n, block) in seq.blocks.iter().enumerate() {
            let scopes = all_block_scopes(block, &self.enums)?;
            let matches = reference.matches_block_scopes(&scopes)
                || (matches!(reference, CvReference::CrossChapter { .. })
                    && self.cross_chapter_edge_matches(block, reference)?);
            if matches {
                ret.push(n);
            }
        }
        Ok(ret)
    }

    /// Item scan for the first and last chapters of a cross-chapter range
    fn cross_chapter_edge_matches(&self, block: &SuccinctBlock, reference: &CvReference) -> Result<bool> {
        let open = scope_labels(&block.os, &self.enums)?;
        for ci in decode_items_with(&block.c, &self.enums, ItemFilter::ALL, Some(0), &open)? {
            let Some(ctx) = ci.context else {
                continue;
            };
            if reference.first_chapter_matches(&ctx.scopes, ci.item.is_token())
                || reference.last_chapter_matches(&ctx.scopes, ci.item.is_token())
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every item of a sequence whose open scopes satisfy a reference
    pub fn items_matching_reference(
        &self,
        seq: &Sequence,
        reference: &CvReference,
        include_context: bool,
    ) -> Result<Vec<ContextItem>> {
        let mut ret = Vec::new();
        for n in self.blocks_matching_reference(seq, reference)? {
            let block = seq.block(n)?;
            let open = scope_labels(&block.os, &self.enums)?;
            let mut scopes = open.clone();
            let next_token = Some(block.next_token()?);
            for mut ci in decode_items_with(&block.c, &self.enums, ItemFilter::ALL, next_token, &open)? {
                if let Some(ctx) = &ci.context {
                    scopes.clone_from(&ctx.scopes);
                } else if let Item::Scope { edge, label } = &ci.item {
                    match edge {
                        ScopeEdge::Start if !scopes.contains(label) => scopes.push(label.clone()),
                        ScopeEdge::End => scopes.retain(|l| l != label),
                        _ => {}
                    }
                }
                if reference.matches_open_scopes(&scopes) {
                    if !include_context {
                        ci.context = None;
                    }
                    ret.push(ci);
                }
            }
        }
        Ok(ret)
    }

    pub fn add_tag(&mut self, tag: &str) -> Result<()> {
        validate_tag(tag)?;
        self.tags.insert(tag.to_string());
        Ok(())
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.remove(tag);
    }

    pub fn add_document_tag(&mut self, doc_id: &str, tag: &str) -> Result<()> {
        validate_tag(tag)?;
        self.document_mut(doc_id)?.tags.insert(tag.to_string());
        Ok(())
    }

    pub fn remove_document_tag(&mut self, doc_id: &str, tag: &str) -> Result<()> {
        self.document_mut(doc_id)?.tags.remove(tag);
        Ok(())
    }

    pub fn add_sequence_tag(&mut self, doc_id: &str, seq_id: &str, tag: &str) -> Result<()> {
        validate_tag(tag)?;
        self.document_mut(doc_id)?.sequence_mut(seq_id)?.tags.insert(tag.to_string());
        Ok(())
    }

    pub fn remove_sequence_tag(&mut self, doc_id: &str, seq_id: &str, tag: &str) -> Result<()> {
        self.document_mut(doc_id)?.sequence_mut(seq_id)?.tags.remove(tag);
        Ok(())
    }

    /// Attach forward and reversed versification tables to every book the
    /// rules mention
    pub fn set_verse_mapping(&mut self, rules: &[MappingRule]) -> Result<usize> {
        let mut mapped = 0;
        for doc in self.documents.values_mut() {
            let Some(book) = doc.book_code().map(str::to_string) else {
                continue;
            };
            let mapping = VerseMapping::for_book(rules, &book)?;
            if mapping.is_some() {
                mapped += 1;
            }
            doc.main_sequence_mut()?.verse_mapping = mapping;
        }
        self.tags.insert(HAS_MAPPING_TAG.to_string());
        info!(doc_set = %self.id, rules = rules.len(), documents = mapped, "verse mapping set");
        Ok(mapped)
    }

    pub fn unset_verse_mapping(&mut self) -> Result<()> {
        for doc in self.documents.values_mut() {
            doc.main_sequence_mut()?.verse_mapping = None;
        }
        self.tags.remove(HAS_MAPPING_TAG);
        Ok(())
    }

    pub fn stats(&self) -> DocSetStats {
        let mut stats = DocSetStats {
            documents: self.documents.len(),
            ..DocSetStats::default()
        };
        for doc in self.documents.values() {
            stats.sequences += doc.sequences.len();
            stats.blocks += doc.sequences.values().map(|s| s.blocks.len()).sum::<usize>();
        }
        for category in EnumCategory::ALL {
            stats
                .enum_sizes
                .insert(category.name().to_string(), self.enums.len(category));
            stats.enum_bytes += self.enums.table(category).len();
        }
        stats
    }
}

fn plain(item: Item) -> ContextItem {
    ContextItem { item, context: None }
}

/// Join per-block item lists with a line space token
pub fn join_blocks(blocks: Vec<Vec<ContextItem>>) -> Vec<ContextItem> {
    let mut joined = Vec::new();
    for (n, block) in blocks.into_iter().enumerate() {
        if n > 0 {
            joined.push(plain(Item::token(TokenKind::LineSpace, " ")));
        }
        joined.extend(block);
    }
    joined
}
