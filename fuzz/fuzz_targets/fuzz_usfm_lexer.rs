#![no_main]

use libfuzzer_sys::fuzz_target;
use versestore::config::CustomTags;
use versestore::parser::{Dialect, TagTable, parse_document};
use versestore::utils::SequentialIds;

fuzz_target!(|data: &[u8]| {
    // Arbitrary text must lex, parse and tidy without panicking
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(table) = TagTable::new(&CustomTags::default()) {
            let ids = SequentialIds::new("f");
            let _ = parse_document(text, Dialect::Usfm, &table, &ids, &[]);
            let _ = parse_document(text, Dialect::Usx, &table, &ids, &[]);
        }
    }
});
