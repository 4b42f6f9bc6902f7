//! Derived indexes over a document's main sequence.
//!
//! - [`chapter_verse`] - chapter and verse spans, plus the word-like tokens present
//! - [`versification`] - forward and reversed verse mapping tables

pub mod chapter_verse;
pub mod versification;

pub use chapter_verse::{
    ChapterVerseIndex, Span, VerseSpan, build_chapter_verse_index, decode_chapter,
    decode_chapter_verses,
};
pub use versification::{MappedVerse, MappingRule, VerseMapping, map_verse, parse_json, parse_vrs};
