//! The in-memory store model.
//!
//! - [`docset`] - documents sharing selectors and an enum dictionary
//! - [`document`] - one book and its sequences
//! - [`sequence`] - ordered succinct blocks
//! - [`edit`] - block and sequence edits, filtering
//! - [`rehash`] - enum dictionary recompaction
//! - [`search`] - word search and scope/milestone groupings
//! - [`serialize`] - the portable record

pub mod docset;
pub mod document;
pub mod edit;
pub mod rehash;
pub mod search;
pub mod sequence;
pub mod serialize;

pub use docset::{DocSet, DocSetStats, HAS_MAPPING_TAG, ItemGroup, join_blocks, validate_tag};
pub use document::Document;
pub use search::{SearchHit, SearchMode};
pub use sequence::Sequence;
pub use serialize::{PortableDocSet, PortableDocument, PortableSequence};
