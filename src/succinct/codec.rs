//! Conversion between [`Item`]s and their byte records through a docSet's
//! enum dictionary.

use super::enums::{CodeMap, EnumCategory, EnumDictionary};
use super::item::{Item, ItemHeader, ItemType, ScopeEdge, Token, push_record};
use super::scope::{ScopeKind, ScopeLabel, join_label};
use crate::error::{LookupError, Result, StructuralError};
use crate::utils::ByteArray;

/// Stage every string an item needs
pub fn record_item_pre_enums(enums: &mut EnumDictionary, item: &Item) -> Result<()> {
    match item {
        Item::Token(t) => enums.record_pre_enum(t.kind.category(), &t.chars),
        Item::Scope { label, .. } => record_scope_pre_enums(enums, label),
        Item::Graft { graft_type, seq_id } => {
            enums.record_pre_enum(EnumCategory::GraftTypes, graft_type)?;
            enums.record_pre_enum(EnumCategory::Ids, seq_id)
        }
    }
}

pub fn record_scope_pre_enums(enums: &mut EnumDictionary, label: &str) -> Result<()> {
    let parsed = ScopeLabel::parse(label)?;
    for component in parsed.components {
        enums.record_pre_enum(EnumCategory::ScopeBits, component)?;
    }
    Ok(())
}

pub fn encode_item(
    ba: &mut ByteArray,
    item: &Item,
    enums: &mut EnumDictionary,
    add_if_missing: bool,
) -> Result<()> {
    match item {
        Item::Token(t) => {
            let code = enums.code_for(t.kind.category(), &t.chars, add_if_missing)?;
            push_record(ba, ItemType::Token, t.kind.code() as u32, &[code])?;
        }
        Item::Scope { edge, label } => encode_scope(ba, *edge, label, enums, add_if_missing)?,
        Item::Graft { graft_type, seq_id } => {
            let type_code = enums.code_for(EnumCategory::GraftTypes, graft_type, add_if_missing)?;
            let id_code = enums.code_for(EnumCategory::Ids, seq_id, add_if_missing)?;
            push_record(ba, ItemType::Graft, type_code, &[id_code])?;
        }
    }
    Ok(())
}

pub fn encode_scope(
    ba: &mut ByteArray,
    edge: ScopeEdge,
    label: &str,
    enums: &mut EnumDictionary,
    add_if_missing: bool,
) -> Result<()> {
    let parsed = ScopeLabel::parse(label)?;
    let mut codes = Vec::with_capacity(parsed.components.len());
    for component in &parsed.components {
        codes.push(enums.code_for(EnumCategory::ScopeBits, component, add_if_missing)?);
    }
    push_record(ba, ItemType::for_edge(edge), parsed.kind.code() as u32, &codes)?;
    Ok(())
}

/// Decode the record at `pos`, returning the item and its length
pub fn decode_item_at(ba: &ByteArray, pos: usize, enums: &EnumDictionary) -> Result<(Item, usize)> {
    let header = ItemHeader::read(ba, pos)?;
    let codes = header.payload(ba, pos)?;
    let item = match header.item_type {
        ItemType::Token => {
            let kind = header.token_kind()?;
            let code = single_code(&codes, pos)?;
            Item::Token(Token {
                kind,
                chars: enums.string_for(kind.category(), code)?.to_string(),
            })
        }
        ItemType::StartScope | ItemType::EndScope => {
            let edge = if header.item_type == ItemType::StartScope {
                ScopeEdge::Start
            } else {
                ScopeEdge::End
            };
            Item::Scope {
                edge,
                label: decode_label(header.scope_kind()?, &codes, enums)?,
            }
        }
        ItemType::Graft => Item::Graft {
            graft_type: enums
                .string_for(EnumCategory::GraftTypes, header.subtype as u32)?
                .to_string(),
            seq_id: enums
                .string_for(EnumCategory::Ids, single_code(&codes, pos)?)?
                .to_string(),
        },
    };
    Ok((item, header.length))
}

fn single_code(codes: &[u32], pos: usize) -> Result<u32> {
    match codes {
        [code] => Ok(*code),
        _ => Err(StructuralError::CorruptBytes {
            pos,
            reason: format!("expected one payload code, found {}", codes.len()),
        }
        .into()),
    }
}

fn decode_label(kind: ScopeKind, codes: &[u32], enums: &EnumDictionary) -> Result<String> {
    if codes.len() != kind.n_components() {
        return Err(LookupError::UnknownScope(kind.name().to_string()).into());
    }
    let mut components = Vec::with_capacity(codes.len());
    for &code in codes {
        components.push(enums.string_for(EnumCategory::ScopeBits, code)?);
    }
    Ok(join_label(kind, &components))
}

/// Decode every record of a buffer
pub fn decode_items(ba: &ByteArray, enums: &EnumDictionary) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut pos = 0;
    while pos < ba.len() {
        let (item, len) = decode_item_at(ba, pos, enums)?;
        items.push(item);
        pos += len;
    }
    Ok(items)
}

/// Decode a single-record buffer such as a block scope
pub fn decode_single(ba: &ByteArray, enums: &EnumDictionary) -> Result<Item> {
    decode_item_at(ba, 0, enums).map(|(item, _)| item)
}

pub fn encode_items(items: &[Item], enums: &mut EnumDictionary, add_if_missing: bool) -> Result<ByteArray> {
    let mut ba = ByteArray::new();
    for item in items {
        encode_item(&mut ba, item, enums, add_if_missing)?;
    }
    ba.trim();
    Ok(ba)
}

/// Rewrite a buffer's codes through a rehash map
pub fn remap_records(ba: &ByteArray, map: &CodeMap) -> Result<ByteArray> {
    let mut out = ByteArray::with_capacity(ba.len());
    let mut pos = 0;
    while pos < ba.len() {
        let header = ItemHeader::read(ba, pos)?;
        let codes = header.payload(ba, pos)?;
        let lookup = |category: EnumCategory, old: u32| {
            map.get(category, old).ok_or_else(|| {
                StructuralError::invariant(format!(
                    "live {} code {} has no code after rehash",
                    category.name(),
                    old
                ))
            })
        };
        match header.item_type {
            ItemType::Token => {
                let category = header.token_kind()?.category();
                let new_codes = codes
                    .iter()
                    .map(|&c| lookup(category, c))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                push_record(&mut out, ItemType::Token, header.subtype as u32, &new_codes)?;
            }
            ItemType::StartScope | ItemType::EndScope => {
                let new_codes = codes
                    .iter()
                    .map(|&c| lookup(EnumCategory::ScopeBits, c))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                push_record(&mut out, header.item_type, header.subtype as u32, &new_codes)?;
            }
            ItemType::Graft => {
                let type_code = lookup(EnumCategory::GraftTypes, header.subtype as u32)?;
                let id_code = lookup(EnumCategory::Ids, single_code(&codes, pos)?)?;
                push_record(&mut out, ItemType::Graft, type_code, &[id_code])?;
            }
        }
        pos += header.length;
    }
    out.trim();
    Ok(out)
}
