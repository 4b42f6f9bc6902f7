//! Markup dialects to pre-tokens.

pub mod usfm;
pub mod usx;

pub use usfm::{lex_text, lex_usfm};
pub use usx::lex_usx;
