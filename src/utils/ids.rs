//! Sequence and document id generation.

use ahash::RandomState;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of ids for documents and sequences.
///
/// Ids only need to be unique within one processor; they are interned in the
/// `ids` enum category of the owning docSet.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Default generator: a per-process random seed hashed with a counter
pub struct RandomIds {
    state: RandomState,
    counter: AtomicU64,
}

impl RandomIds {
    pub fn new() -> Self {
        Self {
            state: RandomState::new(),
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for RandomIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let h = self.state.hash_one(n);
        // 48 bits, base36
        to_base36(h & 0xffff_ffff_ffff)
    }
}

/// Deterministic generator for tests and reproducible dumps
#[derive(Default)]
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
