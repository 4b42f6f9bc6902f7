use super::docset::{DocSet, ItemGroup};
use super::sequence::Sequence;
use crate::error::{ImportError, Result};
use crate::succinct::block::scope_labels;
use crate::succinct::codec::{decode_items, decode_single};
use crate::succinct::item::{ItemHeader, ItemType};
use crate::succinct::{ContextItem, EnumCategory, Item, ItemFilter, ScopeEdge, SuccinctBlock, TokenKind, decode_items_with};
use regex::Regex;
use roaring::RoaringBitmap;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Exact,
    Regex,
}

/// A block containing the searched words
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub document: String,
    pub sequence: String,
    pub block: usize,
}

impl DocSet {
    /// Word-like codes for each term; an unknown exact term yields none
    fn term_codes(&self, terms: &[String], mode: SearchMode) -> Result<Vec<Vec<u32>>> {
        terms
            .iter()
            .map(|term| match mode {
                SearchMode::Exact => Ok(self
                    .enums
                    .code_of(EnumCategory::WordLike, term)
                    .into_iter()
                    .collect()),
                SearchMode::Regex => {
                    let re = Regex::new(term).map_err(|e| ImportError::Pattern(e.to_string()))?;
                    self.enums.codes_matching(EnumCategory::WordLike, &re)
                }
            })
            .collect()
    }

    /// Blocks holding any (or, with `all_terms`, every) term.
    ///
    /// Main sequences are skipped outright when their `tokens_present`
    /// bitmap rules the terms out.
    pub fn search_words(&self, terms: &[String], mode: SearchMode, all_terms: bool) -> Result<Vec<SearchHit>> {
        let codes = self.term_codes(terms, mode)?;
        if codes.is_empty() || (all_terms && codes.iter().any(Vec::is_empty)) {
            return Ok(Vec::new());
        }
        let mut hits = Vec::new();
        for doc in self.documents() {
            for seq in doc.sequences.values() {
                if let Some(present) = &seq.tokens_present {
                    if !terms_present(present, &codes, all_terms) {
                        continue;
                    }
                }
                for (n, block) in seq.blocks.iter().enumerate() {
                    let present = block_word_codes(block)?;
                    if terms_present(&present, &codes, all_terms) {
                        hits.push(SearchHit {
                            document: doc.id.clone(),
                            sequence: seq.id.clone(),
                            block: n,
                        });
                    }
                }
            }
        }
        Ok(hits)
    }

    /// Item groups split wherever the set of open scopes matching the
    /// prefixes changes; items outside a scope for every prefix are skipped
    pub fn sequence_items_by_scopes(&self, seq: &Sequence, prefixes: &[String]) -> Result<Vec<ItemGroup>> {
        let mut groups: Vec<ItemGroup> = Vec::new();
        let mut last_key: Option<Vec<String>> = None;
        for block in &seq.blocks {
            let label = self.block_label(block)?;
            let mut open: BTreeSet<String> = scope_labels(&block.os, &self.enums)?.into_iter().collect();
            open.insert(label.clone());
            for item in self.block_stream(block, &label)? {
                if let Item::Scope { edge: ScopeEdge::Start, label } = &item.item {
                    open.insert(label.clone());
                }
                let key: Option<Vec<String>> = prefixes
                    .iter()
                    .map(|p| open.iter().find(|s| s.starts_with(p.as_str())).cloned())
                    .collect();
                if let Some(mut key) = key {
                    key.sort();
                    if last_key.as_ref() != Some(&key) {
                        groups.push(ItemGroup {
                            open_scopes: open.iter().cloned().collect(),
                            items: Vec::new(),
                        });
                        last_key = Some(key);
                    }
                    if let Some(group) = groups.last_mut() {
                        group.items.push(item.clone());
                    }
                }
                if let Item::Scope { edge: ScopeEdge::End, label } = &item.item {
                    open.remove(label);
                }
            }
        }
        Ok(groups)
    }

    /// Item groups delimited by the start of any of the given milestone
    /// scopes. Each block ends with its closing scope and a newline.
    pub fn sequence_items_by_milestones(&self, seq: &Sequence, milestones: &[String]) -> Result<Vec<ItemGroup>> {
        let mut groups = vec![ItemGroup {
            open_scopes: Vec::new(),
            items: Vec::new(),
        }];
        let mut open: BTreeSet<String> = BTreeSet::new();
        for block in &seq.blocks {
            let label = self.block_label(block)?;
            open.insert(label.clone());
            open.extend(scope_labels(&block.os, &self.enums)?);
            let stream = self.block_stream(block, &label)?;
            // block end is re-pushed together with the newline
            let body = &stream[..stream.len().saturating_sub(1)];
            for ci in body {
                if let Item::Scope { edge: ScopeEdge::Start, label: started } = &ci.item {
                    open.insert(started.clone());
                    if milestones.contains(started) {
                        if let Some(group) = groups.last_mut() {
                            group.open_scopes = open.iter().cloned().collect();
                        }
                        groups.push(ItemGroup {
                            open_scopes: Vec::new(),
                            items: Vec::new(),
                        });
                        open.retain(|s| {
                            let kind = s.split('/').next().unwrap_or("");
                            !(matches!(kind, "blockTag" | "verse" | "verses" | "chapter") || milestones.contains(s))
                        });
                        open.insert(label.clone());
                    }
                }
                if let Some(group) = groups.last_mut() {
                    group.items.push(ci.clone());
                }
            }
            if let Some(group) = groups.last_mut() {
                group.items.push(plain(Item::end(label)));
                group.items.push(plain(Item::token(TokenKind::Punctuation, "\n")));
            }
        }
        if let Some(group) = groups.last_mut() {
            group.open_scopes = open.into_iter().collect();
        }
        Ok(groups)
    }

    fn block_label(&self, block: &SuccinctBlock) -> Result<String> {
        match decode_single(&block.bs, &self.enums)? {
            Item::Scope { label, .. } => Ok(label),
            other => Err(crate::error::StructuralError::invariant(format!("block scope is {:?}", other)).into()),
        }
    }

    /// Block grafts, the block scope start, content and the block scope end
    fn block_stream(&self, block: &SuccinctBlock, label: &str) -> Result<Vec<ContextItem>> {
        let mut stream: Vec<ContextItem> = decode_items(&block.bg, &self.enums)?.into_iter().map(plain).collect();
        stream.push(plain(Item::start(label)));
        let open = scope_labels(&block.os, &self.enums)?;
        stream.extend(decode_items_with(
            &block.c,
            &self.enums,
            ItemFilter::ALL,
            Some(block.next_token()?),
            &open,
        )?);
        stream.push(plain(Item::end(label)));
        Ok(stream)
    }
}

fn plain(item: Item) -> ContextItem {
    ContextItem { item, context: None }
}

/// Word-like codes used in a block's content, read from record headers
fn block_word_codes(block: &SuccinctBlock) -> Result<RoaringBitmap> {
    let mut present = RoaringBitmap::new();
    let mut pos = 0;
    while pos < block.c.len() {
        let header = ItemHeader::read(&block.c, pos)?;
        if header.item_type == ItemType::Token && header.token_kind()? == TokenKind::WordLike {
            present.insert(block.c.nbyte(pos + 2)?);
        }
        pos += header.length;
    }
    Ok(present)
}

fn terms_present(present: &RoaringBitmap, codes: &[Vec<u32>], all_terms: bool) -> bool {
    let found = |term: &Vec<u32>| term.iter().any(|c| present.contains(*c));
    if all_terms {
        codes.iter().all(found)
    } else {
        codes.iter().any(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomTags, FilterOptions};
    use crate::parser::{Dialect, TagTable, parse_document};
    use crate::utils::SequentialIds;

    fn doc_set(texts: &[&str]) -> DocSet {
        let table = TagTable::new(&CustomTags::default()).unwrap();
        let ids = SequentialIds::new("q");
        let parsed: Vec<_> = texts
            .iter()
            .map(|t| parse_document(t, Dialect::Usfm, &table, &ids, &[]).unwrap())
            .collect();
        let mut ds = DocSet::new("eng_web", Default::default());
        ds.import_parsed(&parsed, &ids, &FilterOptions::default()).unwrap();
        ds
    }

    fn words(terms: &[&str]) -> Vec<String> {
        terms.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_exact_search() {
        let ds = doc_set(&[
            "\\id GEN\n\\c 1\n\\p\n\\v 1 light and dark\n\\p\n\\v 2 water",
            "\\id EXO\n\\c 1\n\\p\n\\v 1 light again",
        ]);
        let hits = ds.search_words(&words(&["light"]), SearchMode::Exact, false).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.block == 0));
        let both = ds
            .search_words(&words(&["light", "dark"]), SearchMode::Exact, true)
            .unwrap();
        assert_eq!(both.len(), 1);
        assert!(ds.search_words(&words(&["light", "nothing"]), SearchMode::Exact, true).unwrap().is_empty());
        assert_eq!(ds.search_words(&words(&["light", "nothing"]), SearchMode::Exact, false).unwrap().len(), 2);
    }

    #[test]
    fn test_regex_search() {
        let ds = doc_set(&["\\id GEN\n\\c 1\n\\p\n\\v 1 light and dark\n\\p\n\\v 2 water waters"]);
        let hits = ds.search_words(&words(&["^wat"]), SearchMode::Regex, false).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].block, 1);
        assert!(matches!(
            ds.search_words(&words(&["("]), SearchMode::Regex, false),
            Err(crate::error::Error::Import(ImportError::Pattern(_)))
        ));
    }

    #[test]
    fn test_items_by_scopes() {
        let ds = doc_set(&["\\id GEN\n\\c 1\n\\p\n\\v 1 one\n\\v 2 two\n\\c 2\n\\p\n\\v 1 three"]);
        let doc = ds.document_with_book("GEN").unwrap();
        let groups = ds
            .sequence_items_by_scopes(doc.main_sequence().unwrap(), &words(&["chapter/"]))
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].open_scopes.contains(&"chapter/1".to_string()));
        assert!(groups[1].open_scopes.contains(&"chapter/2".to_string()));
        let verses = ds
            .sequence_items_by_scopes(doc.main_sequence().unwrap(), &words(&["chapter/", "verse/"]))
            .unwrap();
        assert_eq!(verses.len(), 3);
    }

    #[test]
    fn test_items_by_milestones() {
        let ds = doc_set(&["\\id GEN\n\\c 1\n\\p\n\\v 1 one \\qt-s |who=\"Pilate\"\\*two\\qt-e\\* three"]);
        let doc = ds.document_with_book("GEN").unwrap();
        let groups = ds
            .sequence_items_by_milestones(doc.main_sequence().unwrap(), &words(&["milestone/qt"]))
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].items.iter().any(|ci| ci.item == Item::word("one")));
        assert!(groups[1].items.iter().any(|ci| ci.item == Item::word("three")));
        assert_eq!(
            groups[1].items.last().map(|ci| ci.item.clone()),
            Some(Item::token(TokenKind::Punctuation, "\n"))
        );
    }
}
