//! Items and their byte records.
//!
//! Every record starts with a header byte `(itemType << 6) | totalLength`
//! followed by a subtype byte and a run of nByte codes:
//!
//! | item        | subtype            | payload                     |
//! |-------------|--------------------|-----------------------------|
//! | token       | [`TokenKind`] code | one `wordLike`/`notWordLike` code |
//! | start/end   | [`ScopeKind`] code | one `scopeBits` code per component |
//! | graft       | `graftTypes` code  | one `ids` code              |

use super::enums::EnumCategory;
use super::scope::ScopeKind;
use crate::error::StructuralError;
use crate::utils::ByteArray;
use serde::{Deserialize, Serialize};

/// Records never exceed this many bytes
pub const MAX_ITEM_LENGTH: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenKind {
    WordLike,
    Punctuation,
    LineSpace,
    Eol,
    SoftLineBreak,
    NoBreakSpace,
    BareSlash,
    Unknown,
}

const TOKEN_KINDS: [TokenKind; 8] = [
    TokenKind::WordLike,
    TokenKind::Punctuation,
    TokenKind::LineSpace,
    TokenKind::Eol,
    TokenKind::SoftLineBreak,
    TokenKind::NoBreakSpace,
    TokenKind::BareSlash,
    TokenKind::Unknown,
];

impl TokenKind {
    pub fn code(self) -> u8 {
        TOKEN_KINDS.iter().position(|k| *k == self).unwrap_or(0) as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        TOKEN_KINDS.get(code as usize).copied()
    }

    pub fn category(self) -> EnumCategory {
        if self == TokenKind::WordLike {
            EnumCategory::WordLike
        } else {
            EnumCategory::NotWordLike
        }
    }

    /// Whitespace-only tokens removed by trimming
    pub fn is_space(self) -> bool {
        matches!(self, TokenKind::LineSpace | TokenKind::Eol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "subType")]
    pub kind: TokenKind,
    #[serde(rename = "payload")]
    pub chars: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeEdge {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Item {
    Token(Token),
    Scope {
        edge: ScopeEdge,
        label: String,
    },
    Graft {
        #[serde(rename = "subType")]
        graft_type: String,
        #[serde(rename = "payload")]
        seq_id: String,
    },
}

impl Item {
    pub fn token(kind: TokenKind, chars: impl Into<String>) -> Self {
        Item::Token(Token {
            kind,
            chars: chars.into(),
        })
    }

    pub fn word(chars: impl Into<String>) -> Self {
        Item::token(TokenKind::WordLike, chars)
    }

    pub fn start(label: impl Into<String>) -> Self {
        Item::Scope {
            edge: ScopeEdge::Start,
            label: label.into(),
        }
    }

    pub fn end(label: impl Into<String>) -> Self {
        Item::Scope {
            edge: ScopeEdge::End,
            label: label.into(),
        }
    }

    pub fn graft(graft_type: impl Into<String>, seq_id: impl Into<String>) -> Self {
        Item::Graft {
            graft_type: graft_type.into(),
            seq_id: seq_id.into(),
        }
    }

    pub fn is_token(&self) -> bool {
        matches!(self, Item::Token(_))
    }

    pub fn is_word_like(&self) -> bool {
        matches!(self, Item::Token(t) if t.kind == TokenKind::WordLike)
    }

    pub fn is_space(&self) -> bool {
        matches!(self, Item::Token(t) if t.kind.is_space())
    }

    pub fn is_start(&self) -> bool {
        matches!(self, Item::Scope { edge: ScopeEdge::Start, .. })
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Item::Scope { edge: ScopeEdge::End, .. })
    }

    pub fn scope_label(&self) -> Option<&str> {
        match self {
            Item::Scope { label, .. } => Some(label),
            _ => None,
        }
    }

    pub fn chars(&self) -> Option<&str> {
        match self {
            Item::Token(t) => Some(&t.chars),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Token = 0,
    StartScope = 1,
    EndScope = 2,
    Graft = 3,
}

impl ItemType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => ItemType::Token,
            1 => ItemType::StartScope,
            2 => ItemType::EndScope,
            _ => ItemType::Graft,
        }
    }

    pub fn for_edge(edge: ScopeEdge) -> Self {
        match edge {
            ScopeEdge::Start => ItemType::StartScope,
            ScopeEdge::End => ItemType::EndScope,
        }
    }
}

/// Decoded record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHeader {
    pub item_type: ItemType,
    pub subtype: u8,
    pub length: usize,
}

impl ItemHeader {
    pub fn read(ba: &ByteArray, pos: usize) -> Result<Self, StructuralError> {
        let b0 = ba.byte(pos)?;
        let length = (b0 & 0x3f) as usize;
        if length < 2 {
            return Err(StructuralError::CorruptBytes {
                pos,
                reason: format!("item length {}", length),
            });
        }
        Ok(Self {
            item_type: ItemType::from_bits(b0 >> 6),
            subtype: ba.byte(pos + 1)?,
            length,
        })
    }

    /// All payload codes of the record at `pos`
    pub fn payload(&self, ba: &ByteArray, pos: usize) -> Result<Vec<u32>, StructuralError> {
        let end = pos + self.length;
        let mut cursor = pos + 2;
        let mut codes = Vec::new();
        while cursor < end {
            let (v, used) = ba.nbyte_at(cursor)?;
            codes.push(v);
            cursor += used;
        }
        if cursor != end {
            return Err(StructuralError::CorruptBytes {
                pos,
                reason: "payload overruns record".to_string(),
            });
        }
        Ok(codes)
    }

    pub fn scope_kind(&self) -> Result<ScopeKind, StructuralError> {
        ScopeKind::from_code(self.subtype).ok_or_else(|| StructuralError::CorruptBytes {
            pos: 0,
            reason: format!("unknown scope kind {}", self.subtype),
        })
    }

    pub fn token_kind(&self) -> Result<TokenKind, StructuralError> {
        TokenKind::from_code(self.subtype).ok_or_else(|| StructuralError::CorruptBytes {
            pos: 0,
            reason: format!("unknown token kind {}", self.subtype),
        })
    }
}

/// Append a record from a type, subtype and payload codes
pub fn push_record(
    ba: &mut ByteArray,
    item_type: ItemType,
    subtype: u32,
    codes: &[u32],
) -> Result<(), StructuralError> {
    let subtype = u8::try_from(subtype).map_err(|_| {
        StructuralError::invariant(format!("item subtype {} does not fit a byte", subtype))
    })?;
    let length = 2 + codes
        .iter()
        .map(|c| crate::utils::nbyte_length(*c))
        .sum::<usize>();
    if length > MAX_ITEM_LENGTH {
        return Err(StructuralError::invariant(format!(
            "item record of {} bytes exceeds {}",
            length, MAX_ITEM_LENGTH
        )));
    }
    ba.push_byte(((item_type as u8) << 6) | length as u8);
    ba.push_byte(subtype);
    ba.push_nbytes(codes);
    Ok(())
}

/// Iterate record start offsets of a buffer
pub fn record_offsets(ba: &ByteArray) -> Result<Vec<usize>, StructuralError> {
    let mut offsets = Vec::new();
    let mut pos = 0;
    while pos < ba.len() {
        offsets.push(pos);
        pos += ItemHeader::read(ba, pos)?.length;
    }
    Ok(offsets)
}

/// Count records without decoding payloads
pub fn record_count(ba: &ByteArray) -> Result<usize, StructuralError> {
    record_offsets(ba).map(|o| o.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut ba = ByteArray::new();
        push_record(&mut ba, ItemType::Token, TokenKind::Punctuation.code() as u32, &[300]).unwrap();
        push_record(&mut ba, ItemType::EndScope, ScopeKind::Attribute.code() as u32, &[1, 2, 3, 4, 70000]).unwrap();
        push_record(&mut ba, ItemType::Graft, 2, &[9]).unwrap();

        let offsets = record_offsets(&ba).unwrap();
        assert_eq!(offsets.len(), 3);

        let h = ItemHeader::read(&ba, offsets[0]).unwrap();
        assert_eq!(h.item_type, ItemType::Token);
        assert_eq!(h.token_kind().unwrap(), TokenKind::Punctuation);
        assert_eq!(h.length, 4);
        assert_eq!(h.payload(&ba, offsets[0]).unwrap(), vec![300]);

        let h = ItemHeader::read(&ba, offsets[1]).unwrap();
        assert_eq!(h.item_type, ItemType::EndScope);
        assert_eq!(h.scope_kind().unwrap(), ScopeKind::Attribute);
        assert_eq!(h.payload(&ba, offsets[1]).unwrap(), vec![1, 2, 3, 4, 70000]);

        let h = ItemHeader::read(&ba, offsets[2]).unwrap();
        assert_eq!(h.item_type, ItemType::Graft);
        assert_eq!(h.subtype, 2);
    }

    #[test]
    fn test_record_too_long() {
        let mut ba = ByteArray::new();
        let codes = vec![u32::MAX >> 4; 16];
        assert!(push_record(&mut ba, ItemType::StartScope, 0, &codes).is_err());
        assert!(ba.is_empty());
    }

    #[test]
    fn test_subtype_too_large() {
        let mut ba = ByteArray::new();
        assert!(push_record(&mut ba, ItemType::Graft, 256, &[0]).is_err());
    }

    #[test]
    fn test_item_helpers() {
        assert!(Item::word("in").is_word_like());
        assert!(Item::token(TokenKind::Eol, "\n").is_space());
        assert!(Item::start("verse/1").is_start());
        assert_eq!(Item::end("verse/1").scope_label(), Some("verse/1"));
        assert!(!Item::graft("footnote", "x").is_token());
    }
}
