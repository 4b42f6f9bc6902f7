//! The stored form of a block and the decode primitives over it.

use super::codec::{decode_item_at, decode_items, decode_single};
use super::enums::EnumDictionary;
use super::item::{Item, ScopeEdge, TokenKind};
use crate::error::Result;
use crate::utils::ByteArray;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Five item buffers plus the next-token marker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccinctBlock {
    /// The block's own scope
    pub bs: ByteArray,
    /// Grafts anchored to the block
    pub bg: ByteArray,
    /// Content items
    pub c: ByteArray,
    /// Scopes started inside the block
    pub is: ByteArray,
    /// Scopes open at block entry
    pub os: ByteArray,
    /// Word-like tokens seen in the sequence before this block
    pub nt: ByteArray,
}

impl SuccinctBlock {
    pub fn next_token(&self) -> Result<u32> {
        if self.nt.is_empty() {
            return Ok(0);
        }
        Ok(self.nt.nbyte(0)?)
    }

    pub fn set_next_token(&mut self, value: u32) {
        self.nt.clear();
        self.nt.push_nbyte(value);
        self.nt.trim();
    }

    pub fn trim(&mut self) {
        for ba in [
            &mut self.bs,
            &mut self.bg,
            &mut self.c,
            &mut self.is,
            &mut self.os,
            &mut self.nt,
        ] {
            ba.trim();
        }
    }
}

/// Fully decoded view of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedBlock {
    pub bs: Item,
    pub bg: Vec<Item>,
    pub c: Vec<Item>,
    pub os: Vec<Item>,
    pub is: Vec<Item>,
    pub nt: u32,
}

pub fn decode_block(block: &SuccinctBlock, enums: &EnumDictionary) -> Result<DecodedBlock> {
    Ok(DecodedBlock {
        bs: decode_single(&block.bs, enums)?,
        bg: decode_items(&block.bg, enums)?,
        c: decode_items(&block.c, enums)?,
        os: decode_items(&block.os, enums)?,
        is: decode_items(&block.is, enums)?,
        nt: block.next_token()?,
    })
}

/// Which item variants a decode keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemFilter {
    pub tokens: bool,
    pub scopes: bool,
    pub grafts: bool,
}

impl ItemFilter {
    pub const ALL: ItemFilter = ItemFilter {
        tokens: true,
        scopes: true,
        grafts: true,
    };
    pub const TOKENS: ItemFilter = ItemFilter {
        tokens: true,
        scopes: false,
        grafts: false,
    };
    pub const SCOPES: ItemFilter = ItemFilter {
        tokens: false,
        scopes: true,
        grafts: false,
    };
    pub const GRAFTS: ItemFilter = ItemFilter {
        tokens: false,
        scopes: false,
        grafts: true,
    };

    fn keeps(&self, item: &Item) -> bool {
        match item {
            Item::Token(_) => self.tokens,
            Item::Scope { .. } => self.scopes,
            Item::Graft { .. } => self.grafts,
        }
    }
}

impl Default for ItemFilter {
    fn default() -> Self {
        ItemFilter::ALL
    }
}

/// Position and enclosing scopes of a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenContext {
    pub position: u32,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextItem {
    #[serde(flatten)]
    pub item: Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<TokenContext>,
}

/// Stream items back from a content buffer.
///
/// Open scopes are tracked from `open_scopes`; when `next_token` is given
/// every token carries its word index and a snapshot of the open scopes.
pub fn decode_items_with(
    ba: &ByteArray,
    enums: &EnumDictionary,
    filter: ItemFilter,
    next_token: Option<u32>,
    open_scopes: &[String],
) -> Result<Vec<ContextItem>> {
    let mut open: Vec<String> = open_scopes.to_vec();
    let mut position = next_token;
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < ba.len() {
        let (item, len) = decode_item_at(ba, pos, enums)?;
        pos += len;
        if let Item::Scope { edge, label } = &item {
            match edge {
                ScopeEdge::Start => {
                    if !open.contains(label) {
                        open.push(label.clone());
                    }
                }
                ScopeEdge::End => open.retain(|l| l != label),
            }
        }
        let context = match (&item, position.as_mut()) {
            (Item::Token(t), Some(p)) => {
                let ctx = TokenContext {
                    position: *p,
                    scopes: open.clone(),
                };
                if t.kind == TokenKind::WordLike {
                    *p += 1;
                }
                Some(ctx)
            }
            _ => None,
        };
        if filter.keeps(&item) {
            out.push(ContextItem { item, context });
        }
    }
    Ok(out)
}

/// Labels of every scope in a buffer
pub fn scope_labels(ba: &ByteArray, enums: &EnumDictionary) -> Result<Vec<String>> {
    Ok(decode_items(ba, enums)?
        .into_iter()
        .filter_map(|i| match i {
            Item::Scope { label, .. } => Some(label),
            _ => None,
        })
        .collect())
}

/// Open, included and own scopes of a block
pub fn all_block_scopes(block: &SuccinctBlock, enums: &EnumDictionary) -> Result<BTreeSet<String>> {
    let mut labels: BTreeSet<String> = scope_labels(&block.os, enums)?.into_iter().collect();
    labels.extend(scope_labels(&block.is, enums)?);
    labels.extend(scope_labels(&block.bs, enums)?);
    Ok(labels)
}

/// Scopes still open after the block's content
pub fn open_scopes_after(block: &SuccinctBlock, enums: &EnumDictionary) -> Result<Vec<String>> {
    let mut open = scope_labels(&block.os, enums)?;
    for item in decode_items(&block.c, enums)? {
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
    }
    Ok(open)
}
