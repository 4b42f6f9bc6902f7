//! The parse state machine: pre-tokens in, sequences of blocks out.

use super::pretoken::{MilestoneEdge, PreToken};
use super::sequence::BuildSequence;
use super::specs::{BaseTarget, Behavior, Hook, TagTable};
use crate::succinct::{Item, ScopeKind};
use crate::utils::IdGenerator;
use rustc_hash::FxHashMap;

pub(super) const MAIN: usize = 0;

/// How many sequences of a type a document may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    One,
    Optional,
    Many,
}

fn arity(kind: &str) -> Arity {
    match kind {
        "main" => Arity::One,
        "header" | "title" | "endTitle" | "introTitle" | "introEndTitle" => Arity::Optional,
        _ => Arity::Many,
    }
}

/// Scope that attribute pre-tokens attach to
#[derive(Debug, Clone)]
struct AttributeContext {
    label: String,
    ended_by: String,
}

/// Tag name and full tag name of a marker pre-token
fn tag_names(pt: &PreToken) -> (String, String) {
    match pt {
        PreToken::StartTag(t) | PreToken::EndTag(t) => (t.name.clone(), t.full_name.clone()),
        PreToken::StartMilestone { name, .. } | PreToken::EmptyMilestone { name } => {
            (name.clone(), name.clone())
        }
        _ => (String::new(), String::new()),
    }
}

fn fill(template: &str, names: &(String, String)) -> String {
    template
        .replace("$fullTagName$", &names.1)
        .replace("$tagName$", &names.0)
}

/// Keep labels splittable on `/`
fn label_safe(value: &str) -> String {
    value.trim().replace('/', "÷")
}

pub struct Parser<'a> {
    table: &'a TagTable,
    ids: &'a dyn IdGenerator,
    pub(super) sequences: Vec<BuildSequence>,
    singletons: FxHashMap<&'static str, usize>,
    current: usize,
    parent: Option<usize>,
    base_type: String,
    main_like: usize,
    attribute_context: Option<AttributeContext>,
}

impl<'a> Parser<'a> {
    pub fn new(table: &'a TagTable, ids: &'a dyn IdGenerator) -> Self {
        let main = BuildSequence::new(ids.next_id(), "main");
        Self {
            table,
            ids,
            sequences: vec![main],
            singletons: FxHashMap::default(),
            current: MAIN,
            parent: None,
            base_type: "main".to_string(),
            main_like: MAIN,
            attribute_context: None,
        }
    }

    pub(super) fn new_sequence(&mut self, kind: &str) -> usize {
        self.sequences
            .push(BuildSequence::new(self.ids.next_id(), kind));
        self.sequences.len() - 1
    }

    pub fn parse_all(&mut self, pts: &[PreToken]) {
        for pt in pts {
            self.parse_item(pt);
        }
    }

    pub fn parse_item(&mut self, pt: &PreToken) {
        let behavior = self.table.lookup(pt);
        self.close_for(pt, behavior);
        let Some(behavior) = behavior else {
            return;
        };
        let names = tag_names(pt);
        let d = behavior.descriptor();

        let mut changed = false;
        if let Some(base) = d.base {
            changed = self.change_base(base, d.force_new_sequence);
        }
        if d.inline.is_none() && d.new_block {
            if !changed && self.parent.is_some() {
                self.return_to_base();
            }
            let current = &mut self.sequences[self.current];
            current.close_scopes_for("endBlock");
            current.new_block(format!("blockTag/{}", names.1));
        }
        if let Some(inline) = d.inline {
            self.start_digression(inline, &names.1);
        }
        if let Some(hook) = d.during {
            self.run_hook(hook, pt, &names);
        }
        for template in d.scopes {
            let label = fill(template.label, &names);
            let ended_by = template.ended_by.iter().map(|e| fill(e, &names)).collect();
            self.sequences[self.current].open_scope(label, ended_by);
        }
        if let Some(hook) = d.after {
            self.run_hook(hook, pt, &names);
        }
    }

    /// Fire the closing events a pre-token implies
    fn close_for(&mut self, pt: &PreToken, behavior: Option<Behavior>) {
        match pt {
            PreToken::StartTag(tag) => {
                if !tag.nested && !behavior.is_some_and(Behavior::is_digression) {
                    self.sequences[self.current].close_scopes_for("implicitEnd");
                }
            }
            PreToken::EndTag(tag) => {
                let event = format!("endTag/{}", tag.full_name);
                self.sequences[self.current].close_scopes_for(&event);
                if self
                    .attribute_context
                    .as_ref()
                    .is_some_and(|c| c.ended_by == event)
                {
                    self.attribute_context = None;
                }
            }
            PreToken::StartMilestone {
                name,
                edge: MilestoneEdge::End,
            } => {
                let event = format!("endMilestone/{}", name);
                self.sequences[self.current].close_scopes_for(&event);
            }
            PreToken::Chapter { .. } => self.sequences[MAIN].close_scopes_for("chapter"),
            PreToken::PubChapter { .. } => self.sequences[MAIN].close_scopes_for("pubChapter"),
            PreToken::Verses { .. } => self.sequences[MAIN].close_scopes_for("verses"),
            _ => {}
        }
    }

    /// Switch base sequence; false when already there
    fn change_base(&mut self, base: BaseTarget, force_new: bool) -> bool {
        let target = match base {
            BaseTarget::MainLike => self.sequences[self.main_like].kind.clone(),
            BaseTarget::Named(kind) => kind.to_string(),
        };
        if target == self.base_type && !force_new {
            return false;
        }
        if self.parent.is_some() {
            self.return_to_base();
        }
        self.sequences[self.current].close_scopes_for("baseSequenceChange");
        self.base_type = target;
        match base {
            BaseTarget::MainLike => self.current = self.main_like,
            BaseTarget::Named(kind) => {
                let existing = match arity(kind) {
                    Arity::Optional => self.singletons.get(kind).copied(),
                    Arity::One => Some(MAIN),
                    Arity::Many => None,
                };
                let idx = match existing {
                    Some(idx) => idx,
                    None => {
                        let idx = self.new_sequence(kind);
                        if arity(kind) == Arity::Optional {
                            self.singletons.insert(kind, idx);
                        }
                        idx
                    }
                };
                if idx != MAIN {
                    let graft = Item::graft(kind, self.sequences[idx].id.clone());
                    self.sequences[self.main_like].add_block_graft(graft);
                }
                self.current = idx;
            }
        }
        true
    }

    fn start_digression(&mut self, kind: &'static str, full_name: &str) {
        if self.parent.is_some() {
            self.return_to_base();
        }
        let parent = if self.sequences[self.current].kind == "header" {
            MAIN
        } else {
            self.current
        };
        let idx = self.new_sequence(kind);
        let graft = Item::graft(kind, self.sequences[idx].id.clone());
        self.sequences[parent].add_item(graft);
        self.sequences[idx].new_block(format!("inline/{}", full_name));
        self.parent = Some(parent);
        self.current = idx;
    }

    fn return_to_base(&mut self) {
        if let Some(parent) = self.parent.take() {
            self.sequences[self.current].close();
            self.current = parent;
        }
    }

    fn run_hook(&mut self, hook: Hook, pt: &PreToken, names: &(String, String)) {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match (hook, pt) {
            (Hook::OpenChapter, PreToken::Chapter { number }) => {
                self.sequences[MAIN]
                    .open_scope(format!("chapter/{}", number), strings(&["chapter"]));
            }
            (Hook::OpenPubChapter, PreToken::PubChapter { number }) => {
                self.sequences[MAIN].open_scope(
                    format!("pubChapter/{}", label_safe(number)),
                    strings(&["chapter", "pubChapter"]),
                );
            }
            (Hook::OpenVerses, PreToken::Verses { number, numbers }) => {
                let main = &mut self.sequences[MAIN];
                let ended_by = strings(&["verses", "chapter"]);
                main.open_scope(format!("verses/{}", number), ended_by.clone());
                for n in numbers {
                    main.open_scope(format!("verse/{}", n), ended_by.clone());
                }
            }
            (Hook::OpenCell(role, align), PreToken::StartTag(tag)) => {
                let label = format!("cell/{}/{}/{}", role.name(), align.name(), tag.level);
                let ended_by = vec![
                    format!("endTag/{}", tag.full_name),
                    "implicitEnd".to_string(),
                    "endBlock".to_string(),
                    "baseSequenceChange".to_string(),
                ];
                self.sequences[self.current].open_scope(label, ended_by);
            }
            (Hook::SetAttributeContext, PreToken::StartTag(tag)) => {
                self.attribute_context = Some(AttributeContext {
                    label: format!("spanWithAtts/{}", tag.full_name),
                    ended_by: format!("endTag/{}", tag.full_name),
                });
            }
            (Hook::SetAttributeContext, PreToken::StartMilestone { name, .. }) => {
                self.attribute_context = Some(AttributeContext {
                    label: format!("milestone/{}", name),
                    ended_by: format!("endMilestone/{}", name),
                });
            }
            (Hook::ClearAttributeContext, _) => self.attribute_context = None,
            (Hook::OpenAttributes, PreToken::Attribute { key, values }) => {
                let Some(context) = self.attribute_context.clone() else {
                    return;
                };
                for (n, value) in values.iter().enumerate() {
                    let label = format!("attribute/{}/{}/{}/{}", context.label, key, n, value);
                    let ended_by = vec![context.ended_by.clone(), "endBlock".to_string()];
                    self.sequences[self.current].open_scope(label, ended_by);
                }
            }
            (Hook::AddEmptyMilestone, _) => {
                let label = format!("milestone/{}", names.0);
                let current = &mut self.sequences[self.current];
                current.add_item(Item::start(label.clone()));
                current.add_item(Item::end(label));
            }
            (Hook::ReturnToBase, _) => self.return_to_base(),
            (Hook::OpenNumberScope(kind), _) => {
                let id = self.sequences[self.current].id.clone();
                let parent = self.parent.unwrap_or(MAIN);
                let ended_by = match kind {
                    ScopeKind::AltChapter => strings(&["chapter"]),
                    ScopeKind::PubVerse | ScopeKind::AltVerse => strings(&["verses", "chapter"]),
                    _ => Vec::new(),
                };
                self.sequences[parent].open_scope(format!("{}/{}", kind.name(), id), ended_by);
            }
            (Hook::StartSidebar, _) => self.main_like = self.current,
            (Hook::EndSidebar, _) => {
                self.main_like = MAIN;
                self.current = MAIN;
                self.parent = None;
                self.base_type = "main".to_string();
            }
            (Hook::AddToken, PreToken::Printable(token)) => {
                self.sequences[self.current].add_item(Item::Token(token.clone()));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomTags;
    use crate::parser::lexers::lex_usfm;
    use crate::utils::SequentialIds;

    fn parse(text: &str) -> Vec<BuildSequence> {
        let table = TagTable::new(&CustomTags::default()).unwrap();
        let ids = SequentialIds::new("s");
        let pts = lex_usfm(text, &table).unwrap();
        let mut parser = Parser::new(&table, &ids);
        parser.parse_all(&pts);
        parser.sequences
    }

    #[test]
    fn test_header_grafted_into_main() {
        let seqs = parse("\\id GEN Test\n\\c 1\n\\p\n\\v 1 In");
        assert_eq!(seqs[0].kind, "main");
        assert_eq!(seqs[1].kind, "header");
        assert_eq!(seqs[0].blocks[0].bg, vec![Item::graft("header", "s1")]);
        assert_eq!(seqs[0].blocks[0].bs, "blockTag/p");
        assert_eq!(seqs[1].blocks[0].bs, "blockTag/id");
    }

    #[test]
    fn test_verses_close_previous() {
        let seqs = parse("\\id GEN\n\\c 1\n\\p\n\\v 1 a\n\\v 2 b");
        let items = &seqs[0].blocks[0].items;
        let pos_end = items.iter().position(|i| *i == Item::end("verse/1")).unwrap();
        let pos_start = items.iter().position(|i| *i == Item::start("verse/2")).unwrap();
        assert!(pos_end < pos_start);
        let labels: Vec<&str> = seqs[0].active_scopes.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["chapter/1", "verses/2", "verse/2"]);
    }

    #[test]
    fn test_footnote_digression() {
        let seqs = parse("\\id GEN\n\\c 1\n\\p\n\\v 1 a\\f + \\ft note\\f* b");
        let note = seqs.iter().find(|s| s.kind == "footnote").unwrap();
        assert_eq!(note.blocks[0].bs, "inline/f");
        assert!(note.active_scopes.is_empty());
        assert!(note.blocks[0].items.contains(&Item::end("inline/f")));
        assert!(seqs[0].blocks[0].items.contains(&Item::graft("footnote", note.id.clone())));
        assert!(seqs[0].blocks[0].items.contains(&Item::word("b")));
    }

    #[test]
    fn test_headings_each_new_sequence() {
        let seqs = parse("\\id GEN\n\\s One\n\\p a\n\\s Two\n\\p b");
        let headings: Vec<&BuildSequence> = seqs.iter().filter(|s| s.kind == "heading").collect();
        assert_eq!(headings.len(), 2);
        let main = &seqs[0];
        assert_eq!(main.blocks.len(), 2);
        assert_eq!(main.blocks[1].bg, vec![Item::graft("heading", headings[1].id.clone())]);
    }

    #[test]
    fn test_milestone_attributes() {
        let seqs = parse("\\id GEN\n\\p \\qt-s |who=\"Pilate\"\\*x\\qt-e\\*");
        let items = &seqs[0].blocks[0].items;
        assert_eq!(items[0], Item::start("milestone/qt"));
        assert_eq!(items[1], Item::start("attribute/milestone/qt/who/0/Pilate"));
        assert!(items.contains(&Item::end("attribute/milestone/qt/who/0/Pilate")));
        assert!(seqs[0].active_scopes.is_empty());
    }
}
