//! Dump formatting for items, groups, sequences and search hits.
//!
//! A token prints as its chars, a scope start as `+label+`, a scope end as
//! `-label-` and a graft as `>type<`.

use anyhow::Result;
use crate::model::{DocSet, DocSetStats, Document, ItemGroup, SearchHit, Sequence};
use crate::succinct::{Item, ScopeEdge, decode_block};
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

pub fn stdout(color: bool) -> StandardStream {
    StandardStream::stdout(if color { ColorChoice::Auto } else { ColorChoice::Never })
}

pub fn item_text(item: &Item) -> String {
    match item {
        Item::Token(t) => t.chars.clone(),
        Item::Scope {
            edge: ScopeEdge::Start,
            label,
        } => format!("+{}+", label),
        Item::Scope {
            edge: ScopeEdge::End,
            label,
        } => format!("-{}-", label),
        Item::Graft { graft_type, .. } => format!(">{}<", graft_type),
    }
}

/// Items concatenated in dump form
pub fn dump_items<'a>(items: impl IntoIterator<Item = &'a Item>) -> String {
    items.into_iter().map(item_text).collect()
}

fn item_color(item: &Item) -> Option<Color> {
    match item {
        Item::Token(_) => None,
        Item::Scope {
            edge: ScopeEdge::Start, ..
        } => Some(Color::Green),
        Item::Scope { edge: ScopeEdge::End, .. } => Some(Color::Red),
        Item::Graft { .. } => Some(Color::Magenta),
    }
}

pub fn write_items<'a, W: WriteColor>(out: &mut W, items: impl IntoIterator<Item = &'a Item>) -> io::Result<()> {
    for item in items {
        match item_color(item) {
            Some(color) => {
                out.set_color(ColorSpec::new().set_fg(Some(color)))?;
                write!(out, "{}", item_text(item))?;
                out.reset()?;
            }
            None => write!(out, "{}", item_text(item))?,
        }
    }
    Ok(())
}

/// One paragraph per group, headed by its open scopes
pub fn write_groups<W: WriteColor>(out: &mut W, groups: &[ItemGroup]) -> io::Result<()> {
    for (n, group) in groups.iter().enumerate() {
        if n > 0 {
            writeln!(out)?;
        }
        out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
        writeln!(out, "[{}]", group.open_scopes.join(" "))?;
        out.reset()?;
        write_items(out, group.items.iter().map(|ci| &ci.item))?;
        writeln!(out)?;
    }
    Ok(())
}

/// Every block of a sequence: index, grafts, own scope, then content
pub fn write_sequence<W: WriteColor>(out: &mut W, doc_set: &DocSet, seq: &Sequence) -> Result<()> {
    let header = |out: &mut W| -> io::Result<()> {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
        writeln!(out, "{} ({}), {} blocks", seq.id, seq.kind, seq.blocks.len())?;
        out.reset()
    };
    header(out)?;
    for (n, block) in seq.blocks.iter().enumerate() {
        let decoded = decode_block(block, &doc_set.enums)?;
        let line = |out: &mut W| -> io::Result<()> {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
            write!(out, "{:>4} ", n)?;
            out.reset()?;
            write_items(out, &decoded.bg)?;
            write_items(out, std::iter::once(&decoded.bs))?;
            write_items(out, &decoded.c)?;
            writeln!(out)
        };
        line(out)?;
    }
    Ok(())
}

/// Main sequence first, then the others in id order
pub fn write_document<W: WriteColor>(out: &mut W, doc_set: &DocSet, doc: &Document) -> Result<()> {
    write_sequence(out, doc_set, doc.main_sequence()?)?;
    for seq in doc.sequences.values().filter(|s| s.id != doc.main_id) {
        writeln!(out)?;
        write_sequence(out, doc_set, seq)?;
    }
    Ok(())
}

pub fn write_search_hits<W: WriteColor>(out: &mut W, doc_set: &DocSet, hits: &[SearchHit]) -> io::Result<()> {
    for hit in hits {
        let book = doc_set
            .documents
            .get(&hit.document)
            .and_then(|d| d.book_code())
            .unwrap_or("?");
        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        write!(out, "{}", book)?;
        out.reset()?;
        write!(out, ":{}:", hit.sequence)?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(out, "{}", hit.block)?;
        out.reset()?;
    }
    Ok(())
}

pub fn write_stats<W: Write>(out: &mut W, doc_set: &DocSet, stats: &DocSetStats) -> io::Result<()> {
    writeln!(out, "docSet:     {}", doc_set.id)?;
    writeln!(out, "documents:  {}", stats.documents)?;
    writeln!(out, "sequences:  {}", stats.sequences)?;
    writeln!(out, "blocks:     {}", stats.blocks)?;
    for (category, size) in &stats.enum_sizes {
        writeln!(out, "  {:<12} {}", category, size)?;
    }
    writeln!(out, "enum bytes: {}", stats.enum_bytes)?;
    if !doc_set.tags.is_empty() {
        let tags: Vec<&str> = doc_set.tags.iter().map(String::as_str).collect();
        writeln!(out, "tags:       {}", tags.join(", "))?;
    }
    Ok(())
}
