//! Portable record of a docSet.
//!
//! ```text
//! {id, selectors, enums: {category: base64}, tags: [..],
//!  docs: {docId: {headers, mainId, tags,
//!         sequences: {seqId: {type, tags, blocks: [{bs,bg,c,is,os,nt}],
//!                             chapters?, chapterVerses?, tokensPresent?, verseMapping?}}}}}
//! ```
//!
//! Byte buffers are base64 of their exact bytes, `tokensPresent` is base64
//! of the roaring portable format and sets are sorted lists.

use super::docset::DocSet;
use super::document::Document;
use super::sequence::Sequence;
use crate::config::Selectors;
use crate::error::{Result, StructuralError};
use crate::index::VerseMapping;
use crate::succinct::{EnumCategory, EnumDictionary, SuccinctBlock};
use crate::utils::ByteArray;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableDocSet {
    pub id: String,
    pub selectors: Selectors,
    pub enums: BTreeMap<String, ByteArray>,
    pub tags: Vec<String>,
    pub docs: BTreeMap<String, PortableDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableDocument {
    pub headers: BTreeMap<String, String>,
    pub main_id: String,
    pub tags: Vec<String>,
    pub sequences: BTreeMap<String, PortableSequence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableSequence {
    #[serde(rename = "type")]
    pub kind: String,
    pub tags: Vec<String>,
    pub blocks: Vec<SuccinctBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapters: Option<BTreeMap<String, ByteArray>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_verses: Option<BTreeMap<String, ByteArray>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_present: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verse_mapping: Option<VerseMapping>,
}

impl DocSet {
    pub fn to_portable(&self) -> Result<PortableDocSet> {
        let enums = EnumCategory::ALL
            .iter()
            .map(|c| (c.name().to_string(), self.enums.table(*c).clone()))
            .collect();
        let mut docs = BTreeMap::new();
        for doc in self.documents() {
            let mut sequences = BTreeMap::new();
            for seq in doc.sequences.values() {
                sequences.insert(seq.id.clone(), portable_sequence(seq)?);
            }
            docs.insert(
                doc.id.clone(),
                PortableDocument {
                    headers: doc.headers.clone(),
                    main_id: doc.main_id.clone(),
                    tags: doc.tags.iter().cloned().collect(),
                    sequences,
                },
            );
        }
        Ok(PortableDocSet {
            id: self.id.clone(),
            selectors: self.selectors.clone(),
            enums,
            tags: self.tags.iter().cloned().collect(),
            docs,
        })
    }

    /// Rebuild a docSet; main sequences must carry their indexes
    pub fn from_portable(record: PortableDocSet) -> Result<Self> {
        let mut tables: [ByteArray; 5] = Default::default();
        for (name, bytes) in record.enums {
            let category = EnumCategory::from_name(&name)
                .ok_or_else(|| StructuralError::Portable(format!("unknown enum category '{}'", name)))?;
            tables[category as usize] = bytes;
        }
        let mut ds = DocSet::new(record.id, record.selectors);
        ds.enums = EnumDictionary::from_tables(tables)?;
        ds.tags = record.tags.into_iter().collect();
        for (doc_id, pdoc) in record.docs {
            let mut sequences = BTreeMap::new();
            for (seq_id, pseq) in pdoc.sequences {
                if seq_id == pdoc.main_id && (pseq.chapters.is_none() || pseq.tokens_present.is_none()) {
                    return Err(StructuralError::invariant(format!(
                        "main sequence '{}' of document '{}' has no chapter index or tokensPresent",
                        seq_id, doc_id
                    ))
                    .into());
                }
                let seq = sequence_from_portable(seq_id.clone(), pseq)?;
                sequences.insert(seq_id, seq);
            }
            let doc = Document {
                id: doc_id.clone(),
                headers: pdoc.headers,
                main_id: pdoc.main_id,
                tags: pdoc.tags.into_iter().collect(),
                sequences,
            };
            doc.main_sequence()?;
            ds.doc_ids.push(doc_id.clone());
            ds.documents.insert(doc_id, doc);
        }
        Ok(ds)
    }

    pub fn to_json(&self) -> Result<String> {
        let record = self.to_portable()?;
        let json = serde_json::to_string(&record).map_err(|e| StructuralError::Portable(e.to_string()))?;
        info!(doc_set = %self.id, documents = self.documents.len(), bytes = json.len(), "docSet serialized");
        Ok(json)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let record: PortableDocSet =
            serde_json::from_str(text).map_err(|e| StructuralError::Portable(e.to_string()))?;
        Self::from_portable(record)
    }
}

fn portable_sequence(seq: &Sequence) -> Result<PortableSequence> {
    let tokens_present = match &seq.tokens_present {
        Some(bitmap) => {
            let mut bytes = Vec::with_capacity(bitmap.serialized_size());
            bitmap
                .serialize_into(&mut bytes)
                .map_err(|e| StructuralError::Portable(e.to_string()))?;
            Some(BASE64.encode(bytes))
        }
        None => None,
    };
    let main = seq.is_main();
    Ok(PortableSequence {
        kind: seq.kind.clone(),
        tags: seq.tags.iter().cloned().collect(),
        blocks: seq.blocks.clone(),
        chapters: main.then(|| seq.chapters.clone()),
        chapter_verses: main.then(|| seq.chapter_verses.clone()),
        tokens_present,
        verse_mapping: seq.verse_mapping.clone(),
    })
}

fn sequence_from_portable(id: String, pseq: PortableSequence) -> Result<Sequence> {
    let tokens_present = match pseq.tokens_present {
        Some(text) => {
            let bytes = BASE64
                .decode(text)
                .map_err(|e| StructuralError::Portable(e.to_string()))?;
            Some(
                RoaringBitmap::deserialize_from(bytes.as_slice())
                    .map_err(|e| StructuralError::Portable(e.to_string()))?,
            )
        }
        None => None,
    };
    let mut seq = Sequence::new(id, pseq.kind);
    seq.tags = pseq.tags.into_iter().collect();
    seq.blocks = pseq.blocks;
    seq.chapters = pseq.chapters.unwrap_or_default();
    seq.chapter_verses = pseq.chapter_verses.unwrap_or_default();
    seq.tokens_present = tokens_present;
    seq.verse_mapping = pseq.verse_mapping;
    Ok(seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomTags, FilterOptions, selectors};
    use crate::parser::{Dialect, TagTable, parse_document};
    use crate::utils::SequentialIds;

    fn sample() -> DocSet {
        let table = TagTable::new(&CustomTags::default()).unwrap();
        let ids = SequentialIds::new("p");
        let parsed = parse_document(
            "\\id GEN\n\\h Genesis\n\\c 1\n\\p\n\\v 1 In the beginning\\f + \\ft note\\f*\n\\v 2 more",
            Dialect::Usfm,
            &table,
            &ids,
            &[],
        )
        .unwrap();
        let mut ds = DocSet::new("eng_web", selectors([("lang", "eng"), ("abbr", "web")]));
        ds.import_parsed(&[parsed], &ids, &FilterOptions::default()).unwrap();
        ds.add_tag("draft").unwrap();
        ds
    }

    #[test]
    fn test_portable_round_trip() {
        let ds = sample();
        let json = ds.to_json().unwrap();
        let back = DocSet::from_json(&json).unwrap();
        assert_eq!(back.documents, ds.documents);
        assert_eq!(back.tags, ds.tags);
        assert_eq!(back.selectors, ds.selectors);
        for category in EnumCategory::ALL {
            assert_eq!(back.enums.table(category), ds.enums.table(category));
        }
        assert_eq!(back.to_json().unwrap(), json);
    }

    #[test]
    fn test_missing_main_index_is_structural() {
        let ds = sample();
        let mut record = ds.to_portable().unwrap();
        for doc in record.docs.values_mut() {
            let main_id = doc.main_id.clone();
            let main = doc.sequences.get_mut(&main_id).unwrap();
            main.tokens_present = None;
        }
        assert!(matches!(
            DocSet::from_portable(record),
            Err(crate::error::Error::Structural(StructuralError::Invariant(_)))
        ));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let mut record = sample().to_portable().unwrap();
        record.enums.insert("colours".to_string(), ByteArray::new());
        assert!(DocSet::from_portable(record).is_err());
    }
}
