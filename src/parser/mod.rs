//! Markup parsing.
//!
//! A dialect lexer turns text into [`PreToken`]s, the [`Parser`] state
//! machine builds sequences of blocks from them using the [`TagTable`], and a
//! tidy pass normalizes the result into a [`ParsedDocument`].

pub mod lexers;
pub mod pretoken;
pub mod sequence;
pub mod specs;
pub mod state;
mod tidy;

pub use pretoken::{PreToken, TagName};
pub use sequence::{BuildBlock, BuildSequence};
pub use specs::TagTable;
pub use state::Parser;

use crate::error::ImportError;
use crate::utils::IdGenerator;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Usfm,
    Usx,
}

impl FromStr for Dialect {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usfm" | "sfm" => Ok(Dialect::Usfm),
            "usx" | "xml" => Ok(Dialect::Usx),
            other => Err(ImportError::UnknownDialect(other.to_string())),
        }
    }
}

impl Dialect {
    /// Guess from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.parse().ok()
    }
}

/// Parser output: sequences still in item form
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub book_code: String,
    pub headers: BTreeMap<String, String>,
    pub main_id: String,
    pub sequences: Vec<BuildSequence>,
}

/// Lex, parse and tidy a document
pub fn parse_document(
    text: &str,
    dialect: Dialect,
    table: &TagTable,
    ids: &dyn IdGenerator,
    empty_blocks: &[String],
) -> Result<ParsedDocument, ImportError> {
    let pts = match dialect {
        Dialect::Usfm => lexers::lex_usfm(text, table)?,
        Dialect::Usx => lexers::lex_usx(text, table)?,
    };
    let mut parser = Parser::new(table, ids);
    parser.parse_all(&pts);
    parser.finish(empty_blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("USFM".parse::<Dialect>().unwrap(), Dialect::Usfm);
        assert_eq!("usx".parse::<Dialect>().unwrap(), Dialect::Usx);
        assert!(matches!(
            "docx".parse::<Dialect>(),
            Err(ImportError::UnknownDialect(_))
        ));
        assert_eq!(Dialect::from_extension("sfm"), Some(Dialect::Usfm));
    }
}
