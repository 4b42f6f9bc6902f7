//! Shared utilities.
//!
//! - [`encoding`] - growable byte buffer with nByte integers and counted strings
//! - [`ids`] - sequence and document id generators
//! - [`progress`] - import progress reporting (no-op without the `progress` feature)

pub mod encoding;
pub mod ids;
pub mod progress;

pub use encoding::*;
pub use ids::*;
