//! Import and lookup benchmarks over the test fixtures.
//!
//! Run with: `cargo bench`
//! Save baseline: `cargo bench -- --save-baseline main`
//! Compare: `cargo bench -- --baseline main`

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use versestore::config::{ProcessorConfig, selectors};
use versestore::parser::Dialect;
use versestore::store::Store;

const GEN: &str = include_str!("../tests/fixtures/gen.usfm");
const EXO: &str = include_str!("../tests/fixtures/exo.usfm");

/// GEN repeated to a chapter count closer to a real book
fn long_genesis(chapters: u32) -> String {
    let mut text = String::from("\\id GEN Bench\n\\h Genesis\n\\mt Genesis\n");
    for c in 1..=chapters {
        text.push_str(&format!("\\c {}\n\\p\n", c));
        for v in 1..=30 {
            text.push_str(&format!(
                "\\v {} In the beginning God created the heavens and the earth.\\f + \\ft note {}\\f*\n",
                v, v
            ));
            if v % 10 == 0 {
                text.push_str("\\p\n");
            }
        }
    }
    text
}

fn bench_import(c: &mut Criterion) {
    let sel = selectors([("lang", "eng"), ("abbr", "web")]);
    let long = long_genesis(50);

    let mut group = c.benchmark_group("import");
    group.bench_function("fixtures", |b| {
        b.iter(|| {
            let mut store = Store::new(ProcessorConfig::default()).unwrap();
            black_box(store.import_documents(&sel, Dialect::Usfm, &[GEN, EXO]).unwrap())
        })
    });
    group.sample_size(20);
    group.bench_function("genesis_50_chapters", |b| {
        b.iter(|| {
            let mut store = Store::new(ProcessorConfig::default()).unwrap();
            black_box(store.import_document(&sel, Dialect::Usfm, &long).unwrap())
        })
    });
    group.finish();
}

fn bench_cv(c: &mut Criterion) {
    let sel = selectors([("lang", "eng"), ("abbr", "web")]);
    let mut store = Store::new(ProcessorConfig::default()).unwrap();
    let doc_id = store
        .import_document(&sel, Dialect::Usfm, &long_genesis(50))
        .unwrap();

    let mut group = c.benchmark_group("cv");
    for reference in ["25", "25:15", "25:10-20", "24:28-26:2"] {
        group.bench_function(reference, |b| {
            b.iter(|| {
                // cached lookups would measure the LRU only
                store.invalidate();
                black_box(store.cv(&doc_id, reference, true).unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_import, bench_cv);
criterion_main!(benches);
