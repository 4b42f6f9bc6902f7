use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use versestore::config::{ProcessorConfig, SelectorSpec, SelectorType, SelectorValue, Selectors};
use versestore::model::{PortableDocSet, SearchMode};
use versestore::output;
use versestore::parser::Dialect;
use versestore::store::Store;
use versestore::utils::progress;

#[derive(Parser)]
#[command(name = "versestore")]
#[command(about = "Succinct storage and chapter/verse lookup for USFM/USX Scripture")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import USFM/USX files into one docSet and write its portable record
    Import {
        /// Files or directories to import
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Selector as key=value (repeatable)
        #[arg(short, long = "selector", value_name = "KEY=VALUE")]
        selectors: Vec<String>,

        /// Only import files matching this glob (default: *.usfm, *.sfm, *.usx)
        #[arg(short, long)]
        glob: Option<String>,

        /// Processor configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Versification mapping (.vrs text or mappedVerses JSON)
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Output record
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Print the items of a chapter/verse reference
    Cv {
        record: PathBuf,
        book: String,
        /// 3, 3-5, 3:2, 3:2-4 or 3:2-5:1
        reference: String,
        /// Include token positions and open scopes
        #[arg(long)]
        context: bool,
        /// Emit JSON instead of the dump format
        #[arg(long)]
        json: bool,
    },
    /// Find blocks containing words
    Search {
        record: PathBuf,
        #[arg(required = true)]
        terms: Vec<String>,
        /// Treat terms as regular expressions
        #[arg(long)]
        regex: bool,
        /// Require every term in the block
        #[arg(long)]
        all: bool,
    },
    /// Show docSet statistics
    Stats { record: PathBuf },
    /// Dump the blocks of a document
    Dump {
        record: PathBuf,
        book: String,
        /// Only this sequence
        #[arg(long)]
        sequence: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let color = !cli.no_color;

    match cli.command {
        Commands::Import {
            paths,
            selectors,
            glob,
            config,
            mapping,
            out,
        } => {
            let config = match config {
                Some(path) => ProcessorConfig::load(&path)?,
                None => ProcessorConfig::default(),
            };
            let selectors = parse_selectors(&config, &selectors)?;
            let mut store = Store::new(config)?;
            let files = discover(&paths, glob.as_deref())?;
            if files.is_empty() {
                bail!("no USFM or USX files found");
            }
            let doc_set_id = import_files(&mut store, &selectors, &files)?;
            if let Some(path) = mapping {
                let source = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
                let mapped = store.set_verse_mapping(&doc_set_id, &source)?;
                println!("Verse mapping set on {} documents", mapped);
            }
            let json = store.doc_set(&doc_set_id)?.to_json()?;
            fs::write(&out, json).with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote docSet {} to {}", doc_set_id, out.display());
        }
        Commands::Cv {
            record,
            book,
            reference,
            context,
            json,
        } => {
            let (mut store, doc_set_id) = load(&record)?;
            let doc_id = store
                .document_with_book(&doc_set_id, &book)?
                .map(|d| d.id.clone())
                .ok_or_else(|| anyhow!("no document with book code {}", book))?;
            let groups = store.cv(&doc_id, &reference, context)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                let mut out = output::stdout(color);
                output::write_groups(&mut out, &groups)?;
            }
        }
        Commands::Search {
            record,
            terms,
            regex,
            all,
        } => {
            let (store, doc_set_id) = load(&record)?;
            let mode = if regex { SearchMode::Regex } else { SearchMode::Exact };
            let hits = store.search_words(&doc_set_id, &terms, mode, all)?;
            let mut out = output::stdout(color);
            output::write_search_hits(&mut out, store.doc_set(&doc_set_id)?, &hits)?;
            if hits.is_empty() {
                writeln!(out, "No matches")?;
            }
        }
        Commands::Stats { record } => {
            let (store, doc_set_id) = load(&record)?;
            let stats = store.stats(&doc_set_id)?;
            output::write_stats(&mut std::io::stdout(), store.doc_set(&doc_set_id)?, &stats)?;
        }
        Commands::Dump { record, book, sequence } => {
            let (store, doc_set_id) = load(&record)?;
            let doc_set = store.doc_set(&doc_set_id)?;
            let doc = doc_set
                .document_with_book(&book)
                .ok_or_else(|| anyhow!("no document with book code {}", book))?;
            let mut out = output::stdout(color);
            match sequence {
                Some(seq_id) => output::write_sequence(&mut out, doc_set, doc.sequence(&seq_id)?)?,
                None => output::write_document(&mut out, doc_set, doc)?,
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `key=value` pairs typed by the configured selector specs
fn parse_selectors(config: &ProcessorConfig, pairs: &[String]) -> Result<Selectors> {
    let mut selectors = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("selector '{}' is not key=value", pair))?;
        let kind = config.selectors.iter().find(|s| s.name == key).map(|s| s.kind);
        let value = match kind {
            Some(SelectorType::Integer) => SelectorValue::Integer(
                value
                    .parse()
                    .with_context(|| format!("selector '{}' needs an integer", key))?,
            ),
            _ => SelectorValue::String(value.to_string()),
        };
        selectors.insert(key.to_string(), value);
    }
    Ok(selectors)
}

fn file_globs(glob: Option<&str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    match glob {
        Some(g) => {
            builder.add(Glob::new(g)?);
        }
        None => {
            for g in ["*.usfm", "*.sfm", "*.usx", "*.SFM", "*.USFM"] {
                builder.add(Glob::new(g)?);
            }
        }
    }
    Ok(builder.build()?)
}

/// Walk every path, honouring ignore files, and keep matching files
fn discover(paths: &[PathBuf], glob: Option<&str>) -> Result<Vec<PathBuf>> {
    let globs = file_globs(glob)?;
    let spinner = progress::spinner("Discovering files...");
    let mut files = Vec::new();
    for root in paths {
        if root.is_file() {
            files.push(root.clone());
            continue;
        }
        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .filter_entry(|entry| !matches!(entry.file_name().to_str(), Some(".git" | "target")))
            .build();
        files.extend(
            walker
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .filter(|entry| entry.path().file_name().is_some_and(|name| globs.is_match(name)))
                .map(|entry| entry.into_path()),
        );
    }
    files.sort();
    spinner.finish_with_message(format!("Found {} files", files.len()));
    Ok(files)
}

fn dialect_of(path: &Path) -> Result<Dialect> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(Dialect::from_extension)
        .ok_or_else(|| anyhow!("cannot tell USFM from USX for {}", path.display()))
}

/// Import files grouped by dialect; returns the docSet id
fn import_files(store: &mut Store, selectors: &Selectors, files: &[PathBuf]) -> Result<String> {
    let mut by_dialect: BTreeMap<bool, Vec<String>> = BTreeMap::new();
    for path in files {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let is_usx = dialect_of(path)? == Dialect::Usx;
        by_dialect.entry(is_usx).or_default().push(text);
    }
    let bar = progress::import_bar(files.len() as u64);
    for (is_usx, texts) in by_dialect {
        let dialect = if is_usx { Dialect::Usx } else { Dialect::Usfm };
        let ids = store.import_documents(selectors, dialect, &texts)?;
        bar.inc(ids.len() as u64);
    }
    bar.finish_and_clear();
    let doc_set_id = store.config().selector_string(selectors);
    let stats = store.stats(&doc_set_id)?;
    println!(
        "Imported {} documents ({} sequences, {} blocks)",
        stats.documents, stats.sequences, stats.blocks
    );
    Ok(doc_set_id)
}

/// Read a portable record into a fresh store configured for its selectors
fn load(path: &Path) -> Result<(Store, String)> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let record: PortableDocSet = serde_json::from_str(&text).context("not a docSet record")?;
    let mut config = ProcessorConfig::default();
    if !record.selectors.is_empty() {
        config.selectors = record
            .selectors
            .iter()
            .map(|(name, value)| {
                let mut spec = SelectorSpec::string(name);
                if matches!(value, SelectorValue::Integer(_)) {
                    spec.kind = SelectorType::Integer;
                }
                spec
            })
            .collect();
    }
    let mut store = Store::new(config)?;
    let id = store.deserialize(record)?;
    Ok((store, id))
}
