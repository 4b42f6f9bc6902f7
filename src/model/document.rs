use super::sequence::Sequence;
use crate::error::{LookupError, Result, StructuralError};
use crate::index::{Span, VerseSpan, build_chapter_verse_index, decode_chapter, decode_chapter_verses};
use crate::parser::ParsedDocument;
use crate::succinct::{EnumDictionary, succinctify_blocks};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// One book: a main sequence plus everything grafted from it
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub headers: BTreeMap<String, String>,
    pub main_id: String,
    pub tags: BTreeSet<String>,
    pub sequences: BTreeMap<String, Sequence>,
}

impl Document {
    /// Succinctify a parsed document.
    ///
    /// Every string must already be staged in `enums`.
    pub fn from_parsed(id: String, parsed: &ParsedDocument, enums: &mut EnumDictionary) -> Result<Self> {
        let mut headers = parsed.headers.clone();
        headers
            .entry("bookCode".to_string())
            .or_insert_with(|| parsed.book_code.clone());
        let mut sequences = BTreeMap::new();
        for built in &parsed.sequences {
            let mut seq = Sequence::new(built.id.clone(), built.kind.clone());
            seq.tags = built.tags.clone();
            seq.blocks = succinctify_blocks(built, enums)?;
            sequences.insert(seq.id.clone(), seq);
        }
        let mut doc = Self {
            id,
            headers,
            main_id: parsed.main_id.clone(),
            tags: BTreeSet::new(),
            sequences,
        };
        doc.build_chapter_verse_index(enums)?;
        Ok(doc)
    }

    pub fn book_code(&self) -> Option<&str> {
        self.headers.get("bookCode").map(String::as_str)
    }

    pub fn main_sequence(&self) -> Result<&Sequence> {
        self.sequences.get(&self.main_id).ok_or_else(|| {
            StructuralError::invariant(format!("document '{}' has no main sequence", self.id)).into()
        })
    }

    pub fn main_sequence_mut(&mut self) -> Result<&mut Sequence> {
        let id = self.id.clone();
        self.sequences.get_mut(&self.main_id).ok_or_else(|| {
            StructuralError::invariant(format!("document '{}' has no main sequence", id)).into()
        })
    }

    pub fn sequence(&self, seq_id: &str) -> Result<&Sequence> {
        self.sequences
            .get(seq_id)
            .ok_or_else(|| LookupError::UnknownSequence(seq_id.to_string()).into())
    }

    pub fn sequence_mut(&mut self, seq_id: &str) -> Result<&mut Sequence> {
        self.sequences
            .get_mut(seq_id)
            .ok_or_else(|| LookupError::UnknownSequence(seq_id.to_string()).into())
    }

    /// Rescan the main sequence
    pub fn build_chapter_verse_index(&mut self, enums: &mut EnumDictionary) -> Result<()> {
        enums.maybe_build_pre_enums()?;
        let main = self.main_sequence_mut()?;
        let index = build_chapter_verse_index(&main.blocks, enums)?;
        debug!(
            sequence = %main.id,
            chapters = index.chapters.len(),
            tokens = index.tokens_present.len(),
            "chapter/verse index built"
        );
        main.set_index(index);
        Ok(())
    }

    pub fn chapter_span(&self, chapter: u32) -> Result<Option<Span>> {
        match self.main_sequence()?.chapters.get(&chapter.to_string()) {
            Some(ba) => decode_chapter(ba),
            None => Ok(None),
        }
    }

    /// Verse records of a chapter, one group per verse slot
    pub fn chapter_verse_groups(&self, chapter: u32, enums: &EnumDictionary) -> Result<Option<Vec<Vec<VerseSpan>>>> {
        match self.main_sequence()?.chapter_verses.get(&chapter.to_string()) {
            Some(ba) => decode_chapter_verses(ba, enums).map(Some),
            None => Ok(None),
        }
    }

    /// Sequences reachable from main through block and inline grafts
    pub fn reachable_sequences(&self, enums: &EnumDictionary) -> Result<BTreeSet<String>> {
        let mut used = BTreeSet::new();
        let mut stack = vec![self.main_id.clone()];
        while let Some(seq_id) = stack.pop() {
            if !used.insert(seq_id.clone()) {
                continue;
            }
            let Some(seq) = self.sequences.get(&seq_id) else {
                continue;
            };
            for target in seq.graft_targets(enums)? {
                if !used.contains(&target) {
                    stack.push(target);
                }
            }
        }
        Ok(used)
    }

    /// Drop unreachable sequences; true when anything was removed
    pub fn gc_sequences(&mut self, enums: &EnumDictionary) -> Result<bool> {
        let used = self.reachable_sequences(enums)?;
        let before = self.sequences.len();
        self.sequences.retain(|id, _| used.contains(id));
        let removed = before - self.sequences.len();
        if removed > 0 {
            debug!(document = %self.id, removed, "unreachable sequences collected");
        }
        Ok(removed > 0)
    }
}
