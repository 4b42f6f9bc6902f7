//! # versestore
//!
//! Succinct in-memory storage for USFM and USX Scripture documents, with a
//! chapter/verse index, versification mapping and in-place editing.
//!
//! ## Architecture
//!
//! - [`parser`] - USFM/USX lexers, tag table, parser state machine and tidy
//! - [`succinct`] - item codec, enum dictionary and succinct blocks
//! - [`index`] - chapter/verse index and versification tables
//! - [`model`] - docSets, documents and sequences; edits, rehash, search, portable record
//! - [`query`] - reference parsing and cv lookups
//! - [`store`] - the store and its single-flight processor
//! - [`output`] - dump formatting
//! - [`config`], [`error`], [`utils`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use versestore::config::{ProcessorConfig, selectors};
//! use versestore::parser::Dialect;
//! use versestore::store::Store;
//!
//! let mut store = Store::new(ProcessorConfig::default())?;
//! let sel = selectors([("lang", "eng"), ("abbr", "web")]);
//! let doc_id = store.import_document(&sel, Dialect::Usfm, "\\id GEN\n\\c 1\n\\p\n\\v 1 In the beginning")?;
//!
//! for group in store.cv(&doc_id, "1:1", false)? {
//!     println!("{:?}: {}", group.open_scopes, versestore::output::dump_items(group.items.iter().map(|ci| &ci.item)));
//! }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod output;
pub mod parser;
pub mod query;
pub mod store;
pub mod succinct;
pub mod utils;

pub use error::{Error, Result};
pub use store::{Processor, Store};
