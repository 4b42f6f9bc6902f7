//! Post-parse clean-up, run once over every sequence.

use super::state::{MAIN, Parser};
use super::ParsedDocument;
use crate::error::ImportError;
use crate::succinct::{Item, ScopeKind, ScopeLabel};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

const NOTE_TAGS: &[&str] = &["f", "fe", "ef", "x", "ex"];
const NUMBER_SEQUENCES: &[&str] = &["pubNumber", "altNumber", "esbCat"];

impl Parser<'_> {
    /// Tidy every sequence and hand the result over
    pub fn finish(mut self, empty_blocks: &[String]) -> Result<ParsedDocument, ImportError> {
        let (book_code, headers) = self.extract_headers()?;
        self.graftify_intro_headings();
        for seq in &mut self.sequences {
            seq.trim();
            seq.reorder_span_with_atts();
        }
        self.make_note_grafts();
        for seq in &mut self.sequences {
            seq.move_orphan_scopes();
            seq.remove_empty_blocks(empty_blocks);
        }
        self.remove_empty_sequences();
        for seq in &mut self.sequences {
            seq.add_table_scopes();
            seq.close();
        }
        self.substitute_number_scopes();
        for seq in &mut self.sequences {
            if seq.kind == "footnote" || seq.kind == "xref" {
                seq.inline_to_end();
            }
        }
        debug!(
            book = %book_code,
            sequences = self.sequences.len(),
            "tidied parse"
        );
        let main_id = self.sequences[MAIN].id.clone();
        Ok(ParsedDocument {
            book_code,
            headers,
            main_id,
            sequences: self.sequences,
        })
    }

    fn extract_headers(&self) -> Result<(String, BTreeMap<String, String>), ImportError> {
        let mut headers = BTreeMap::new();
        for seq in self.sequences.iter().filter(|s| s.kind == "header") {
            for block in &seq.blocks {
                if let Some(tag) = block.bs.strip_prefix("blockTag/") {
                    headers.insert(tag.to_string(), block.text().trim().to_string());
                }
            }
        }
        let book_code = headers
            .get("id")
            .and_then(|id| id.split_whitespace().next())
            .map(|code| code.to_uppercase())
            .ok_or(ImportError::NoBookCode)?;
        headers.insert("bookCode".to_string(), book_code.clone());
        Ok((book_code, headers))
    }

    /// Section headings inside introductions become heading sequences
    fn graftify_intro_headings(&mut self) {
        let is_heading = |bs: &str| bs == "blockTag/iot" || bs.starts_with("blockTag/is");
        for s in 0..self.sequences.len() {
            if self.sequences[s].kind != "introduction" {
                continue;
            }
            if !self.sequences[s].blocks.iter().any(|b| is_heading(&b.bs)) {
                continue;
            }
            let blocks = std::mem::take(&mut self.sequences[s].blocks);
            let mut kept = Vec::new();
            let mut pending = Vec::new();
            for mut block in blocks {
                if is_heading(&block.bs) {
                    let idx = self.new_sequence("heading");
                    pending.push(Item::graft("heading", self.sequences[idx].id.clone()));
                    self.sequences[idx].blocks.push(block);
                } else {
                    block.bg.splice(0..0, pending.drain(..));
                    kept.push(block);
                }
            }
            if !pending.is_empty() {
                let mut hanging = super::sequence::BuildBlock::new("hangingGraft");
                hanging.bg = pending;
                kept.push(hanging);
            }
            self.sequences[s].blocks = kept;
        }
    }

    /// Single-character callers move into their own sequences
    fn make_note_grafts(&mut self) {
        let mut found = Vec::new();
        for (s, seq) in self.sequences.iter().enumerate() {
            for (b, block) in seq.blocks.iter().enumerate() {
                for (i, pair) in block.items.windows(2).enumerate() {
                    let is_note = pair[0].is_start()
                        && pair[0]
                            .scope_label()
                            .and_then(|l| l.strip_prefix("inline/"))
                            .is_some_and(|tag| NOTE_TAGS.contains(&tag));
                    let is_caller = matches!(&pair[1], Item::Token(t) if t.chars.chars().count() == 1);
                    if is_note && is_caller {
                        found.push((s, b, i + 1));
                    }
                }
            }
        }
        for (s, b, i) in found {
            let label = self.sequences[s].blocks[b].bs.clone();
            let caller = self.sequences[s].blocks[b].items[i].clone();
            let idx = self.new_sequence("noteCaller");
            let graft = Item::graft("noteCaller", self.sequences[idx].id.clone());
            let seq = &mut self.sequences[idx];
            seq.new_block(label);
            seq.add_item(caller);
            self.sequences[s].blocks[b].items[i] = graft;
        }
    }

    fn remove_empty_sequences(&mut self) {
        let empty: HashSet<String> = self
            .sequences
            .iter()
            .skip(1)
            .filter(|s| s.blocks.is_empty())
            .map(|s| s.id.clone())
            .collect();
        if empty.is_empty() {
            return;
        }
        for seq in &mut self.sequences {
            seq.remove_grafts_to(&empty);
        }
        self.sequences.retain(|s| !empty.contains(&s.id));
    }

    /// Number scopes carry their digression's text, and the digression goes
    fn substitute_number_scopes(&mut self) {
        let numbers: HashMap<String, String> = self
            .sequences
            .iter()
            .filter(|s| NUMBER_SEQUENCES.contains(&s.kind.as_str()))
            .map(|s| (s.id.clone(), s.text().trim().replace('/', "÷")))
            .collect();
        if numbers.is_empty() {
            return;
        }
        let substitute = |item: &mut Item| {
            if let Item::Scope { label, .. } = item {
                let replacement = match ScopeLabel::parse(label) {
                    Ok(parsed)
                        if matches!(
                            parsed.kind,
                            ScopeKind::PubVerse
                                | ScopeKind::AltVerse
                                | ScopeKind::AltChapter
                                | ScopeKind::EsbCat
                        ) =>
                    {
                        numbers
                            .get(parsed.components[0])
                            .map(|text| format!("{}/{}", parsed.kind.name(), text))
                    }
                    _ => None,
                };
                if let Some(new_label) = replacement {
                    *label = new_label;
                }
            }
        };
        for seq in &mut self.sequences {
            for block in &mut seq.blocks {
                block.items.iter_mut().for_each(substitute);
            }
        }
        let ids: HashSet<String> = numbers.into_keys().collect();
        for seq in &mut self.sequences {
            seq.remove_grafts_to(&ids);
        }
        self.sequences.retain(|s| !ids.contains(&s.id));
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CustomTags;
    use crate::parser::{Dialect, ParsedDocument, TagTable, parse_document};
    use crate::succinct::Item;
    use crate::utils::SequentialIds;

    fn parse(text: &str) -> ParsedDocument {
        let table = TagTable::new(&CustomTags::default()).unwrap();
        let ids = SequentialIds::new("s");
        parse_document(text, Dialect::Usfm, &table, &ids, &[]).unwrap()
    }

    fn main_items(doc: &ParsedDocument) -> Vec<Item> {
        doc.sequences[0]
            .blocks
            .iter()
            .flat_map(|b| b.items.clone())
            .collect()
    }

    #[test]
    fn test_headers_and_book_code() {
        let doc = parse("\\id gen Genesis test\n\\h Genesis\n\\toc1 The Book\n\\c 1\n\\p\n\\v 1 In");
        assert_eq!(doc.book_code, "GEN");
        assert_eq!(doc.headers["h"], "Genesis");
        assert_eq!(doc.headers["toc"], "The Book");
        assert_eq!(doc.headers["id"], "gen Genesis test");
    }

    #[test]
    fn test_no_book_code() {
        let table = TagTable::new(&CustomTags::default()).unwrap();
        let ids = SequentialIds::new("s");
        assert!(parse_document("\\p hello", Dialect::Usfm, &table, &ids, &[]).is_err());
    }

    #[test]
    fn test_scopes_balanced_and_moved() {
        let doc = parse("\\id GEN\n\\c 1\n\\p\n\\v 1 a\n\\c 2\n\\p\n\\v 1 b\n");
        let main = &doc.sequences[0];
        assert_eq!(main.blocks.len(), 2);
        assert_eq!(main.blocks[1].items[0], Item::start("chapter/2"));
        assert_eq!(main.blocks[0].items.last(), Some(&Item::end("chapter/1")));
        let items = main_items(&doc);
        let starts = items.iter().filter(|i| i.is_start()).count();
        let ends = items.iter().filter(|i| i.is_end()).count();
        assert_eq!(starts, ends);
        assert!(main.active_scopes.is_empty());
    }

    #[test]
    fn test_note_caller_graft() {
        let doc = parse("\\id GEN\n\\c 1\n\\p\n\\v 1 a\\f + \\ft note\\f* b");
        let caller = doc.sequences.iter().find(|s| s.kind == "noteCaller").unwrap();
        assert_eq!(caller.text(), "+");
        let note = doc.sequences.iter().find(|s| s.kind == "footnote").unwrap();
        assert_eq!(
            note.blocks[0].items[1],
            Item::graft("noteCaller", caller.id.clone())
        );
        assert_eq!(note.blocks[0].items.last(), Some(&Item::end("inline/f")));
    }

    #[test]
    fn test_pub_verse_substituted() {
        let doc = parse("\\id GEN\n\\c 1\n\\p\n\\v 1 \\vp 1a\\vp* text");
        let items = main_items(&doc);
        assert!(items.contains(&Item::start("pubVerse/1a")));
        assert!(items.contains(&Item::end("pubVerse/1a")));
        assert!(!items.iter().any(|i| matches!(i, Item::Graft { .. })));
        assert!(!doc.sequences.iter().any(|s| s.kind == "pubNumber"));
    }

    #[test]
    fn test_empty_heading_removed() {
        let doc = parse("\\id GEN\n\\s\n\\p text");
        assert!(!doc.sequences.iter().any(|s| s.kind == "heading"));
        assert!(doc.sequences[0].blocks.iter().all(|b| !b
            .bg
            .iter()
            .any(|g| matches!(g, Item::Graft { graft_type, .. } if graft_type == "heading"))));
    }

    #[test]
    fn test_intro_headings_grafted() {
        let doc = parse("\\id GEN\n\\is Intro\n\\ip Para one\n\\c 1\n\\p\n\\v 1 a");
        let intro = doc.sequences.iter().find(|s| s.kind == "introduction").unwrap();
        assert_eq!(intro.blocks.len(), 1);
        assert_eq!(intro.blocks[0].bs, "blockTag/ip");
        assert!(matches!(&intro.blocks[0].bg[0], Item::Graft { graft_type, .. } if graft_type == "heading"));
    }

    #[test]
    fn test_table_scopes() {
        let doc = parse("\\id GEN\n\\c 1\n\\tr \\th1 A\\th2 B\n\\tr \\tc1 a\\tc2 b\n\\p after");
        let main = &doc.sequences[0];
        assert_eq!(main.blocks[0].items[0], Item::start("table"));
        assert!(main.blocks[1].items.contains(&Item::end("table")));
        assert!(main.blocks[0].items.contains(&Item::start("cell/heading/start/2")));
    }
}
