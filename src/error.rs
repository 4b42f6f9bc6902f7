//! Error taxonomy for the store.
//!
//! Every fallible library operation returns [`Result`]. The four classes map
//! onto how a caller is expected to react: configuration errors are fatal at
//! setup, import errors abort a single import, lookup errors are reported to
//! the caller, and structural errors mean a persisted record is corrupt.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("selector '{name}': {reason}")]
    BadSelectorSpec { name: String, reason: String },
    #[error("selector '{name}' has bad value '{value}': {reason}")]
    BadSelectorValue {
        name: String,
        value: String,
        reason: String,
    },
    #[error("unexpected selector '{0}'")]
    UnexpectedSelector(String),
    #[error("missing selector '{0}'")]
    MissingSelector(String),
    #[error("bad custom tag '{0}'")]
    BadCustomTag(String),
    #[error("bad tag '{0}'")]
    BadTag(String),
    #[error("config: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unknown dialect '{0}'")]
    UnknownDialect(String),
    #[error("unknown tag '{tag}' at byte {pos}")]
    UnknownTag { tag: String, pos: usize },
    #[error("malformed XML: {0}")]
    Xml(String),
    #[error("string of {0} bytes does not fit a counted string")]
    StringTooLong(usize),
    #[error("document has no book code")]
    NoBookCode,
    #[error("document with book code '{0}' already exists in docSet")]
    DuplicateBook(String),
    #[error("docSet '{0}' already exists")]
    DuplicateDocSet(String),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("malformed verse mapping at line {line}: {reason}")]
    Mapping { line: usize, reason: String },
    #[error("bad search pattern: {0}")]
    Pattern(String),
}

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("malformed reference '{0}'")]
    Malformed(String),
    #[error("invalid range '{0}': start is after end")]
    InvalidRange(String),
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("enum category '{0}' has no staging table (buildPreEnums not called)")]
    UnknownCategory(String),
    #[error("unknown value '{value}' in enum category '{category}'")]
    UnknownValue { category: String, value: String },
    #[error("unknown code {code} in enum category '{category}'")]
    UnknownCode { category: String, code: u32 },
    #[error("unknown docSet '{0}'")]
    UnknownDocSet(String),
    #[error("unknown document '{0}'")]
    UnknownDocument(String),
    #[error("unknown sequence '{0}'")]
    UnknownSequence(String),
    #[error("block {index} out of range for sequence '{sequence}'")]
    UnknownBlock { sequence: String, index: usize },
    #[error("the main sequence cannot be deleted")]
    MainSequence,
    #[error("unknown scope kind in label '{0}'")]
    UnknownScope(String),
}

#[derive(Debug, Error)]
pub enum StructuralError {
    #[error("structural invariant violation: {0}")]
    Invariant(String),
    #[error("corrupt byte record at offset {pos}: {reason}")]
    CorruptBytes { pos: usize, reason: String },
    #[error("bad portable record: {0}")]
    Portable(String),
}

impl StructuralError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        StructuralError::Invariant(msg.into())
    }
}
