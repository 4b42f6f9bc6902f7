//! Chapter/verse references and lookups.

pub mod cv;
pub mod reference;

pub use cv::{CvNavigation, cv, cv_navigation, mapped_cv, verse_numbers};
pub use reference::{CvReference, chapter_label, verse_label};
