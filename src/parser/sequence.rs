//! Mutable sequences and blocks built during a parse, with the per-sequence
//! tidy passes run once the last pre-token has been consumed.

use crate::succinct::{Item, ScopeEdge};
use std::collections::{BTreeSet, HashSet};

/// A scope opened by the parser and the closing events that end it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveScope {
    pub label: String,
    pub ended_by: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildBlock {
    pub bs: String,
    pub bg: Vec<Item>,
    pub items: Vec<Item>,
}

impl BuildBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            bs: label.into(),
            bg: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn has_tokens(&self) -> bool {
        self.items.iter().any(Item::is_token)
    }

    /// Tokens or inline grafts
    pub fn has_content(&self) -> bool {
        self.items
            .iter()
            .any(|i| matches!(i, Item::Token(_) | Item::Graft { .. }))
    }

    pub fn text(&self) -> String {
        self.items.iter().filter_map(Item::chars).collect()
    }

    /// Drop whitespace tokens before the first and after the last
    /// non-whitespace item, stepping over scopes
    pub fn trim(&mut self) {
        let is_content = |i: &Item| match i {
            Item::Token(t) => !t.kind.is_space(),
            Item::Graft { .. } => true,
            Item::Scope { .. } => false,
        };
        let first = self.items.iter().position(is_content);
        let last = self.items.iter().rposition(is_content);
        let (first, last) = match (first, last) {
            (Some(f), Some(l)) => (f, l),
            _ => {
                self.items.retain(|i| !i.is_space());
                return;
            }
        };
        let mut n = 0;
        self.items.retain(|i| {
            let keep = !(i.is_space() && (n < first || n > last));
            n += 1;
            keep
        });
    }

    /// Move attribute starts to just after the span they decorate
    pub fn reorder_span_with_atts(&mut self) {
        let mut i = 0;
        while i < self.items.len() {
            let span = match &self.items[i] {
                Item::Scope {
                    edge: ScopeEdge::Start,
                    label,
                } if label.starts_with("spanWithAtts/") => label.clone(),
                _ => {
                    i += 1;
                    continue;
                }
            };
            let prefix = format!("attribute/{}/", span);
            let mut moved = Vec::new();
            let mut j = i + 1;
            while j < self.items.len() {
                let item = &self.items[j];
                if item.is_end() && item.scope_label() == Some(span.as_str()) {
                    break;
                }
                let is_attribute =
                    item.is_start() && item.scope_label().is_some_and(|l| l.starts_with(&prefix));
                if is_attribute {
                    moved.push(self.items.remove(j));
                } else {
                    j += 1;
                }
            }
            let count = moved.len();
            for (offset, item) in moved.into_iter().enumerate() {
                self.items.insert(i + 1 + offset, item);
            }
            i += 1 + count;
        }
    }

    /// Put the end of the block's inline scope last
    pub fn inline_to_end(&mut self) {
        let position = self.items.iter().position(|i| {
            i.is_end() && i.scope_label().is_some_and(|l| l.starts_with("inline/"))
        });
        if let Some(pos) = position {
            let item = self.items.remove(pos);
            self.items.push(item);
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildSequence {
    pub id: String,
    pub kind: String,
    pub tags: BTreeSet<String>,
    pub blocks: Vec<BuildBlock>,
    pub active_scopes: Vec<ActiveScope>,
}

impl BuildSequence {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            tags: BTreeSet::new(),
            blocks: Vec::new(),
            active_scopes: Vec::new(),
        }
    }

    /// The block that receives items, creating an orphan block if needed
    pub fn last_block(&mut self) -> &mut BuildBlock {
        if self.blocks.is_empty() {
            self.blocks.push(BuildBlock::new("orphanTokens"));
        }
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }

    /// Start a block, reusing a trailing placeholder block
    pub fn new_block(&mut self, label: impl Into<String>) {
        let label = label.into();
        match self.blocks.last_mut() {
            Some(block) if block.bs == "orphanTokens" || block.bs == "hangingGraft" => {
                block.bs = label;
            }
            _ => self.blocks.push(BuildBlock::new(label)),
        }
    }

    pub fn add_item(&mut self, item: Item) {
        self.last_block().items.push(item);
    }

    pub fn add_block_graft(&mut self, graft: Item) {
        let reuse = self
            .blocks
            .last()
            .is_some_and(|b| b.bs == "hangingGraft" || b.items.is_empty());
        if !reuse {
            self.blocks.push(BuildBlock::new("hangingGraft"));
        }
        self.last_block().bg.push(graft);
    }

    pub fn open_scope(&mut self, label: String, ended_by: Vec<String>) {
        self.add_item(Item::start(label.clone()));
        self.active_scopes.push(ActiveScope { label, ended_by });
    }

    /// End every active scope listening for `event`, newest first
    pub fn close_scopes_for(&mut self, event: &str) {
        let mut closing = Vec::new();
        self.active_scopes.retain(|s| {
            let ends = s.ended_by.iter().any(|e| e == event);
            if ends {
                closing.push(s.label.clone());
            }
            !ends
        });
        for label in closing.into_iter().rev() {
            self.add_item(Item::end(label));
        }
    }

    /// End all active scopes, newest first
    pub fn close(&mut self) {
        let scopes = std::mem::take(&mut self.active_scopes);
        for scope in scopes.into_iter().rev() {
            self.add_item(Item::end(scope.label));
        }
    }

    pub fn text(&self) -> String {
        self.blocks.iter().map(BuildBlock::text).collect()
    }

    pub fn graft_targets(&self) -> Vec<String> {
        self.blocks
            .iter()
            .flat_map(|b| b.bg.iter().chain(&b.items))
            .filter_map(|i| match i {
                Item::Graft { seq_id, .. } => Some(seq_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn trim(&mut self) {
        for block in &mut self.blocks {
            block.trim();
        }
    }

    pub fn reorder_span_with_atts(&mut self) {
        for block in &mut self.blocks {
            block.reorder_span_with_atts();
        }
    }

    /// Trailing starts move to the next block, leading ends to the previous
    pub fn move_orphan_scopes(&mut self) {
        if self.blocks.len() < 2 {
            return;
        }
        for n in 0..self.blocks.len() - 1 {
            let mut moving = Vec::new();
            while self.blocks[n].items.last().is_some_and(Item::is_start) {
                if let Some(item) = self.blocks[n].items.pop() {
                    moving.push(item);
                }
            }
            for item in moving {
                self.blocks[n + 1].items.insert(0, item);
            }
        }
        for n in 1..self.blocks.len() {
            let leading = self.blocks[n]
                .items
                .iter()
                .take_while(|i| i.is_end())
                .count();
            let moving: Vec<Item> = self.blocks[n].items.drain(..leading).collect();
            self.blocks[n - 1].items.extend(moving);
        }
    }

    /// Fold blocks with no tokens or grafts into their neighbours
    pub fn remove_empty_blocks(&mut self, keep: &[String]) {
        let can_be_empty =
            |label: &str| label == "blockTag/b" || label == "blockTag/ib" || keep.iter().any(|k| k == label);
        let mut n = 0;
        while n < self.blocks.len() {
            let block = &self.blocks[n];
            if block.has_content() || can_be_empty(&block.bs) {
                n += 1;
                continue;
            }
            if n + 1 < self.blocks.len() {
                let empty = self.blocks.remove(n);
                let next = &mut self.blocks[n];
                next.bg.splice(0..0, empty.bg);
                next.items.splice(0..0, empty.items);
            } else if block.bg.is_empty() {
                let empty = self.blocks.remove(n);
                if n > 0 {
                    self.blocks[n - 1].items.extend(empty.items);
                } else if !empty.items.is_empty() {
                    self.blocks.push(empty);
                    n += 1;
                }
            } else {
                n += 1;
            }
        }
    }

    /// Drop grafts pointing at any of `ids`
    pub fn remove_grafts_to(&mut self, ids: &HashSet<String>) {
        let keep = |i: &Item| !matches!(i, Item::Graft { seq_id, .. } if ids.contains(seq_id));
        for block in &mut self.blocks {
            block.bg.retain(keep);
            block.items.retain(keep);
        }
    }

    /// Wrap each run of table-row blocks in a `table` scope
    pub fn add_table_scopes(&mut self) {
        let is_row = |b: &BuildBlock| b.bs == "blockTag/tr";
        let mut n = 0;
        while n < self.blocks.len() {
            if !is_row(&self.blocks[n]) {
                n += 1;
                continue;
            }
            let first = n;
            while n + 1 < self.blocks.len() && is_row(&self.blocks[n + 1]) {
                n += 1;
            }
            self.blocks[first].items.insert(0, Item::start("table"));
            self.blocks[n].items.push(Item::end("table"));
            n += 1;
        }
    }

    pub fn inline_to_end(&mut self) {
        if let Some(block) = self.blocks.last_mut() {
            block.inline_to_end();
        }
    }
}
