//! Succinct block storage.
//!
//! Items (tokens, scope edges and grafts) are packed into variable-length
//! byte records whose strings are interned in a per-docSet
//! [`EnumDictionary`]. A [`SuccinctBlock`] holds six such buffers.

pub mod block;
pub mod codec;
pub mod enums;
pub mod item;
pub mod scope;
pub mod succinctify;

pub use block::{
    ContextItem, DecodedBlock, ItemFilter, SuccinctBlock, TokenContext, decode_block,
    decode_items_with,
};
pub use enums::{CodeMap, EnumCategory, EnumDictionary};
pub use item::{Item, ScopeEdge, Token, TokenKind};
pub use scope::{ScopeKind, ScopeLabel, join_label, label_payload};
pub use succinctify::{rebuild_block_indexes, record_document_pre_enums, succinctify_blocks};
