//! The store and its gated processor.
//!
//! A [`Store`] owns every docSet, keyed by the selector string of its
//! selectors. Mutations clear the cv cache. A [`Processor`] funnels all
//! access to one store through a single lock, so an import, edit or
//! rehash never interleaves with a lookup.

use crate::config::{FilterOptions, ProcessorConfig, Selectors};
use crate::error::{ImportError, LookupError, Result};
use crate::index::{MappedVerse, parse_json, parse_vrs};
use crate::model::{DocSet, DocSetStats, Document, ItemGroup, PortableDocSet, SearchHit, SearchMode};
use crate::parser::{Dialect, ParsedDocument, TagTable, parse_document};
use crate::query::{CvNavigation, CvReference, cv, cv_navigation, mapped_cv, verse_numbers};
use crate::succinct::Item;
use crate::utils::{IdGenerator, RandomIds};
use lru::LruCache;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

type CvKey = (String, String, bool);

pub struct Store {
    config: ProcessorConfig,
    tags: TagTable,
    ids: Box<dyn IdGenerator>,
    doc_sets: BTreeMap<String, DocSet>,
    cv_cache: LruCache<CvKey, Vec<ItemGroup>>,
}

impl Store {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        Self::with_ids(config, Box::new(RandomIds::new()))
    }

    pub fn with_ids(config: ProcessorConfig, ids: Box<dyn IdGenerator>) -> Result<Self> {
        config.validate()?;
        let tags = TagTable::new(&config.custom_tags)?;
        let cache_size = NonZeroUsize::new(config.cv_cache_size).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            config,
            tags,
            ids,
            doc_sets: BTreeMap::new(),
            cv_cache: LruCache::new(cache_size),
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn invalidate(&mut self) {
        if !self.cv_cache.is_empty() {
            debug!(entries = self.cv_cache.len(), "cv cache cleared");
            self.cv_cache.clear();
        }
    }

    /// Parse one document and add it to the docSet its selectors name
    pub fn import_document(&mut self, selectors: &Selectors, dialect: Dialect, text: &str) -> Result<String> {
        let mut ids = self.import_documents(selectors, dialect, &[text])?;
        ids.pop()
            .ok_or_else(|| ImportError::NoBookCode.into())
    }

    /// Parse a batch in parallel, then succinctify it into one docSet.
    ///
    /// Any failure leaves the store as it was.
    pub fn import_documents<S: AsRef<str> + Sync>(
        &mut self,
        selectors: &Selectors,
        dialect: Dialect,
        texts: &[S],
    ) -> Result<Vec<String>> {
        self.config.validate_selectors(selectors)?;
        let start = Instant::now();
        let parsed: Vec<ParsedDocument> = texts
            .par_iter()
            .map(|text| {
                parse_document(
                    text.as_ref(),
                    dialect,
                    &self.tags,
                    self.ids.as_ref(),
                    &self.config.empty_blocks,
                )
            })
            .collect::<std::result::Result<_, ImportError>>()?;
        debug!(documents = parsed.len(), elapsed = ?start.elapsed(), "batch parsed");

        let doc_set_id = self.config.selector_string(selectors);
        let created = !self.doc_sets.contains_key(&doc_set_id);
        let doc_set = self
            .doc_sets
            .entry(doc_set_id.clone())
            .or_insert_with(|| DocSet::new(doc_set_id.clone(), selectors.clone()));
        let imported = doc_set.import_parsed(&parsed, self.ids.as_ref(), &self.config.filter);
        if imported.is_err() && created {
            self.doc_sets.remove(&doc_set_id);
        }
        let imported = imported?;
        self.invalidate();
        info!(doc_set = %doc_set_id, documents = imported.len(), elapsed = ?start.elapsed(), "import finished");
        Ok(imported)
    }

    pub fn doc_set(&self, doc_set_id: &str) -> Result<&DocSet> {
        self.doc_sets
            .get(doc_set_id)
            .ok_or_else(|| LookupError::UnknownDocSet(doc_set_id.to_string()).into())
    }

    fn doc_set_mut(&mut self, doc_set_id: &str) -> Result<&mut DocSet> {
        self.invalidate();
        self.doc_sets
            .get_mut(doc_set_id)
            .ok_or_else(|| LookupError::UnknownDocSet(doc_set_id.to_string()).into())
    }

    pub fn doc_sets(&self) -> impl Iterator<Item = &DocSet> {
        self.doc_sets.values()
    }

    /// DocSets whose selectors include every given pair
    pub fn doc_sets_matching(&self, selectors: &Selectors) -> Vec<&DocSet> {
        self.doc_sets
            .values()
            .filter(|ds| selectors.iter().all(|(k, v)| ds.selectors.get(k) == Some(v)))
            .collect()
    }

    pub fn doc_sets_with_book(&self, book_code: &str) -> Vec<&DocSet> {
        self.doc_sets
            .values()
            .filter(|ds| ds.document_with_book(book_code).is_some())
            .collect()
    }

    pub fn document_with_book(&self, doc_set_id: &str, book_code: &str) -> Result<Option<&Document>> {
        Ok(self.doc_set(doc_set_id)?.document_with_book(book_code))
    }

    pub fn documents(&self, doc_set_id: &str) -> Result<Vec<&Document>> {
        Ok(self.doc_set(doc_set_id)?.documents().collect())
    }

    /// Id of the docSet owning a document
    pub fn doc_set_id_of(&self, doc_id: &str) -> Result<String> {
        self.doc_sets
            .values()
            .find(|ds| ds.documents.contains_key(doc_id))
            .map(|ds| ds.id.clone())
            .ok_or_else(|| LookupError::UnknownDocument(doc_id.to_string()).into())
    }

    /// A document together with the docSet whose dictionary decodes it
    pub fn document(&self, doc_id: &str) -> Result<(&DocSet, &Document)> {
        let ds = self.doc_set(&self.doc_set_id_of(doc_id)?)?;
        Ok((ds, ds.document(doc_id)?))
    }

    fn owning_doc_set_mut(&mut self, doc_id: &str) -> Result<&mut DocSet> {
        let id = self.doc_set_id_of(doc_id)?;
        self.doc_set_mut(&id)
    }

    pub fn delete_document(&mut self, doc_set_id: &str, doc_id: &str) -> Result<()> {
        self.doc_set_mut(doc_set_id)?.delete_document(doc_id)
    }

    pub fn delete_doc_set(&mut self, doc_set_id: &str) -> bool {
        self.invalidate();
        self.doc_sets.remove(doc_set_id).is_some()
    }

    pub fn rehash(&mut self, doc_set_id: &str) -> Result<()> {
        self.doc_set_mut(doc_set_id)?.rehash()
    }

    /// Items of a reference, cached until the next mutation
    pub fn cv(&mut self, doc_id: &str, reference: &str, include_context: bool) -> Result<Vec<ItemGroup>> {
        let parsed = CvReference::parse(reference).map_err(ImportError::from)?;
        let key = (doc_id.to_string(), parsed.to_string(), include_context);
        if let Some(hit) = self.cv_cache.get(&key) {
            return Ok(hit.clone());
        }
        let (ds, doc) = self.document(doc_id)?;
        let groups = cv(ds, doc, &parsed, include_context)?;
        self.cv_cache.put(key, groups.clone());
        Ok(groups)
    }

    pub fn mapped_cv(
        &self,
        doc_id: &str,
        chapter: u32,
        verse: u32,
        target_doc_set_id: &str,
        include_context: bool,
    ) -> Result<Vec<ItemGroup>> {
        let (_, doc) = self.document(doc_id)?;
        mapped_cv(doc, chapter, verse, self.doc_set(target_doc_set_id)?, include_context)
    }

    pub fn cv_navigation(&self, doc_id: &str, chapter: u32, verse: u32) -> Result<CvNavigation> {
        let (ds, doc) = self.document(doc_id)?;
        cv_navigation(ds, doc, chapter, verse)
    }

    pub fn verse_numbers(&self, doc_id: &str, chapter: u32, verse: u32) -> Result<(String, Vec<MappedVerse>)> {
        let (_, doc) = self.document(doc_id)?;
        verse_numbers(doc, chapter, verse)
    }

    /// Set versification from `.vrs` text or a `mappedVerses` JSON object
    pub fn set_verse_mapping(&mut self, doc_set_id: &str, source: &str) -> Result<usize> {
        let rules = if source.trim_start().starts_with('{') {
            parse_json(source)?
        } else {
            parse_vrs(source)?
        };
        self.doc_set_mut(doc_set_id)?.set_verse_mapping(&rules)
    }

    pub fn unset_verse_mapping(&mut self, doc_set_id: &str) -> Result<()> {
        self.doc_set_mut(doc_set_id)?.unset_verse_mapping()
    }

    pub fn update_block_items(
        &mut self,
        doc_id: &str,
        seq_id: Option<&str>,
        block_index: usize,
        items: &[Item],
    ) -> Result<bool> {
        self.owning_doc_set_mut(doc_id)?
            .replace_block_items(doc_id, seq_id, block_index, items)
    }

    /// `seq_id` defaults to the main sequence
    pub fn new_block(&mut self, doc_id: &str, seq_id: Option<&str>, position: usize, label: &str) -> Result<bool> {
        let seq_id = self.sequence_or_main(doc_id, seq_id)?;
        self.owning_doc_set_mut(doc_id)?
            .new_block(doc_id, &seq_id, position, label)
    }

    pub fn delete_block(&mut self, doc_id: &str, seq_id: Option<&str>, position: usize) -> Result<bool> {
        let seq_id = self.sequence_or_main(doc_id, seq_id)?;
        self.owning_doc_set_mut(doc_id)?
            .delete_block(doc_id, &seq_id, position)
    }

    fn sequence_or_main(&self, doc_id: &str, seq_id: Option<&str>) -> Result<String> {
        match seq_id {
            Some(id) => Ok(id.to_string()),
            None => Ok(self.document(doc_id)?.1.main_id.clone()),
        }
    }

    pub fn new_sequence(&mut self, doc_id: &str, kind: &str, blocks: &[(String, Vec<Item>)]) -> Result<String> {
        let id = self.doc_set_id_of(doc_id)?;
        self.invalidate();
        let ds = self
            .doc_sets
            .get_mut(&id)
            .ok_or_else(|| LookupError::UnknownDocSet(id.clone()))?;
        ds.new_sequence(doc_id, kind, blocks, self.ids.as_ref())
    }

    pub fn delete_sequence(&mut self, doc_id: &str, seq_id: &str) -> Result<bool> {
        self.owning_doc_set_mut(doc_id)?.delete_sequence(doc_id, seq_id)
    }

    pub fn filter_doc_set(&mut self, doc_set_id: &str, options: &FilterOptions) -> Result<()> {
        self.doc_set_mut(doc_set_id)?.filter_by_options(options)
    }

    pub fn add_doc_set_tag(&mut self, doc_set_id: &str, tag: &str) -> Result<()> {
        self.doc_set_mut(doc_set_id)?.add_tag(tag)
    }

    pub fn remove_doc_set_tag(&mut self, doc_set_id: &str, tag: &str) -> Result<()> {
        self.doc_set_mut(doc_set_id)?.remove_tag(tag);
        Ok(())
    }

    pub fn add_document_tag(&mut self, doc_id: &str, tag: &str) -> Result<()> {
        self.owning_doc_set_mut(doc_id)?.add_document_tag(doc_id, tag)
    }

    pub fn remove_document_tag(&mut self, doc_id: &str, tag: &str) -> Result<()> {
        self.owning_doc_set_mut(doc_id)?.remove_document_tag(doc_id, tag)
    }

    pub fn add_sequence_tag(&mut self, doc_id: &str, seq_id: &str, tag: &str) -> Result<()> {
        self.owning_doc_set_mut(doc_id)?
            .add_sequence_tag(doc_id, seq_id, tag)
    }

    pub fn remove_sequence_tag(&mut self, doc_id: &str, seq_id: &str, tag: &str) -> Result<()> {
        self.owning_doc_set_mut(doc_id)?
            .remove_sequence_tag(doc_id, seq_id, tag)
    }

    pub fn search_words(
        &self,
        doc_set_id: &str,
        terms: &[String],
        mode: SearchMode,
        all_terms: bool,
    ) -> Result<Vec<SearchHit>> {
        self.doc_set(doc_set_id)?.search_words(terms, mode, all_terms)
    }

    pub fn sequence_items_by_scopes(&self, doc_id: &str, seq_id: &str, prefixes: &[String]) -> Result<Vec<ItemGroup>> {
        let (ds, doc) = self.document(doc_id)?;
        ds.sequence_items_by_scopes(doc.sequence(seq_id)?, prefixes)
    }

    pub fn sequence_items_by_milestones(
        &self,
        doc_id: &str,
        seq_id: &str,
        milestones: &[String],
    ) -> Result<Vec<ItemGroup>> {
        let (ds, doc) = self.document(doc_id)?;
        ds.sequence_items_by_milestones(doc.sequence(seq_id)?, milestones)
    }

    pub fn serialize(&self, doc_set_id: &str) -> Result<PortableDocSet> {
        self.doc_set(doc_set_id)?.to_portable()
    }

    /// Load a portable record as a new docSet; returns its id
    pub fn deserialize(&mut self, record: PortableDocSet) -> Result<String> {
        if self.doc_sets.contains_key(&record.id) {
            return Err(ImportError::DuplicateDocSet(record.id).into());
        }
        self.config.validate_selectors(&record.selectors)?;
        let ds = DocSet::from_portable(record)?;
        let id = ds.id.clone();
        info!(doc_set = %id, documents = ds.documents.len(), "docSet loaded");
        self.invalidate();
        self.doc_sets.insert(id.clone(), ds);
        Ok(id)
    }

    pub fn load_json(&mut self, text: &str) -> Result<String> {
        let ds = DocSet::from_json(text)?;
        if self.doc_sets.contains_key(&ds.id) {
            return Err(ImportError::DuplicateDocSet(ds.id).into());
        }
        self.config.validate_selectors(&ds.selectors)?;
        let id = ds.id.clone();
        self.invalidate();
        self.doc_sets.insert(id.clone(), ds);
        Ok(id)
    }

    pub fn stats(&self, doc_set_id: &str) -> Result<DocSetStats> {
        Ok(self.doc_set(doc_set_id)?.stats())
    }
}

/// A store behind a single-flight gate
pub struct Processor {
    store: Mutex<Store>,
}

impl Processor {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        Ok(Self {
            store: Mutex::new(Store::new(config)?),
        })
    }

    pub fn with_ids(config: ProcessorConfig, ids: Box<dyn IdGenerator>) -> Result<Self> {
        Ok(Self {
            store: Mutex::new(Store::with_ids(config, ids)?),
        })
    }

    /// Hold the gate; a panic in an earlier holder does not poison it
    pub fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one operation with the gate held
    pub fn run<R>(&self, op: impl FnOnce(&mut Store) -> R) -> R {
        op(&mut self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::selectors;
    use crate::error::Error;
    use crate::utils::SequentialIds;
    use std::sync::Arc;
    use std::thread;

    const GEN: &str = "\\id GEN\n\\c 1\n\\p\n\\v 1 In the beginning\n\\v 2 God created";
    const EXO: &str = "\\id EXO\n\\c 1\n\\p\n\\v 1 These are the names";

    fn store() -> Store {
        Store::with_ids(ProcessorConfig::default(), Box::new(SequentialIds::new("d"))).unwrap()
    }

    #[test]
    fn test_import_keys_doc_set_by_selectors() {
        let mut store = store();
        let sel = selectors([("lang", "eng"), ("abbr", "web")]);
        let ids = store.import_documents(&sel, Dialect::Usfm, &[GEN, EXO]).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.doc_set("eng_web").unwrap().documents.len(), 2);
        assert!(store.document_with_book("eng_web", "EXO").unwrap().is_some());
        assert_eq!(store.doc_sets_with_book("GEN").len(), 1);
        assert_eq!(store.doc_sets_matching(&selectors([("lang", "eng")])).len(), 1);
    }

    #[test]
    fn test_bad_selectors_rejected() {
        let mut store = store();
        let sel = selectors([("lang", "eng")]);
        assert!(matches!(
            store.import_document(&sel, Dialect::Usfm, GEN),
            Err(Error::Configuration(_))
        ));
        assert!(store.doc_sets().next().is_none());
    }

    #[test]
    fn test_failed_import_leaves_store_unchanged() {
        let mut store = store();
        let sel = selectors([("lang", "eng"), ("abbr", "web")]);
        store.import_document(&sel, Dialect::Usfm, GEN).unwrap();
        let before = store.stats("eng_web").unwrap();
        assert!(store.import_documents(&sel, Dialect::Usfm, &[EXO, GEN]).is_err());
        assert_eq!(store.stats("eng_web").unwrap(), before);
    }

    #[test]
    fn test_cv_cache_cleared_on_edit() {
        let mut store = store();
        let sel = selectors([("lang", "eng"), ("abbr", "web")]);
        let doc_id = store.import_document(&sel, Dialect::Usfm, GEN).unwrap();
        let before = store.cv(&doc_id, "1:2", false).unwrap();
        assert_eq!(store.cv(&doc_id, "1:2", false).unwrap(), before);
        assert!(store.delete_block(&doc_id, None, 0).unwrap());
        assert!(store.cv(&doc_id, "1:2", false).unwrap().is_empty());
        assert!(matches!(store.cv(&doc_id, "2-1", false), Err(Error::Import(_))));
    }

    #[test]
    fn test_serialize_into_second_store() {
        let mut first = store();
        let sel = selectors([("lang", "eng"), ("abbr", "web")]);
        first.import_document(&sel, Dialect::Usfm, GEN).unwrap();
        let record = first.serialize("eng_web").unwrap();
        let mut second = store();
        assert_eq!(second.deserialize(record.clone()).unwrap(), "eng_web");
        assert!(matches!(second.deserialize(record), Err(Error::Import(ImportError::DuplicateDocSet(_)))));
        assert!(second.document_with_book("eng_web", "GEN").unwrap().is_some());
    }

    #[test]
    fn test_processor_serializes_imports() {
        let processor = Arc::new(
            Processor::with_ids(ProcessorConfig::default(), Box::new(SequentialIds::new("p"))).unwrap(),
        );
        let handles: Vec<_> = ["GEN", "EXO", "LEV", "NUM"]
            .into_iter()
            .map(|book| {
                let processor = Arc::clone(&processor);
                thread::spawn(move || {
                    let text = format!("\\id {}\n\\c 1\n\\p\n\\v 1 word", book);
                    processor.run(|store| {
                        store.import_document(&selectors([("lang", "eng"), ("abbr", "web")]), Dialect::Usfm, &text)
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(processor.lock().stats("eng_web").unwrap().documents, 4);
    }
}
