use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use docsearch_core::persist::{self, Encoding, MetaFile, SerializeOptions, FORMAT_VERSION};
use docsearch_core::{documenter, BuildConfig, DocumentStore, DuplicatePolicy, InvertedIndex, NewDocument, SearchOptions, Snapshot, Tokenizer, TokenizerConfig};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query documentation search indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OnDuplicate {
    Reject,
    Replace,
    Suffix,
}

impl From<OnDuplicate> for DuplicatePolicy {
    fn from(v: OnDuplicate) -> Self {
        match v {
            OnDuplicate::Reject => DuplicatePolicy::Reject,
            OnDuplicate::Replace => DuplicatePolicy::Replace,
            OnDuplicate::Suffix => DuplicatePolicy::Suffix,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from search_index.js, JSON or JSONL files (or a directory of them)
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index file
        #[arg(long)]
        output: String,
        /// Write the compact binary encoding instead of JSON
        #[arg(long, default_value_t = false)]
        binary: bool,
        /// Leave document bodies out of the index
        #[arg(long, default_value_t = false)]
        no_text: bool,
        /// JSON file with `tokenizer` and `build` overrides
        #[arg(long)]
        config: Option<String>,
        /// What to do when two records share a location; overrides the config file.
        /// Without either, repeated locations get an ordinal suffix
        #[arg(long, value_enum)]
        on_duplicate: Option<OnDuplicate>,
    },
    /// Run a query against an index file and print the JSON response
    Query {
        #[arg(long)]
        index: String,
        #[arg(long)]
        q: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
    /// Write the document table of an index back out as search_index.js
    Export {
        #[arg(long)]
        index: String,
        #[arg(long)]
        output: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    tokenizer: Option<TokenizerConfig>,
    build: Option<BuildConfig>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, binary, no_text, config, on_duplicate } => {
            let config = match config {
                Some(path) => load_config(Path::new(&path))?,
                None => ConfigFile::default(),
            };
            // Documenter repeats `location: ""` for page records, so keep them all unless told otherwise
            let mut build = config
                .build
                .unwrap_or(BuildConfig { duplicate_policy: DuplicatePolicy::Suffix, ..BuildConfig::default() });
            if let Some(policy) = on_duplicate {
                build.duplicate_policy = policy.into();
            }
            let tokenizer = Tokenizer::new(config.tokenizer.unwrap_or_default());
            let options = SerializeOptions {
                encoding: if binary { Encoding::Binary } else { Encoding::Json },
                include_text: !no_text,
            };
            build_index(Path::new(&input), Path::new(&output), &tokenizer, &build, &options)
        }
        Commands::Query { index, q, k } => {
            let snapshot = Snapshot::load(Path::new(&index)).with_context(|| format!("loading {index}"))?;
            let resp = snapshot.respond(&q, &SearchOptions::top_k(k))?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
            Ok(())
        }
        Commands::Export { index, output } => {
            let snapshot = Snapshot::load(Path::new(&index)).with_context(|| format!("loading {index}"))?;
            let js = documenter::export(snapshot.store())?;
            persist::write_atomic(Path::new(&output), js.as_bytes())?;
            tracing::info!(output, docs = snapshot.store().len(), "export complete");
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<ConfigFile> {
    let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let config = serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

fn build_index(input: &Path, output: &Path, tokenizer: &Tokenizer, config: &BuildConfig, options: &SerializeOptions) -> Result<()> {
    let files = collect_inputs(input)?;
    if files.is_empty() {
        bail!("no .js, .json or .jsonl files under {}", input.display());
    }

    let mut store = DocumentStore::with_policy(config.duplicate_policy);
    for file in &files {
        let docs = read_documents(file)?;
        let added = documenter::load_into(&mut store, docs).with_context(|| format!("ingesting {}", file.display()))?;
        tracing::debug!(file = %file.display(), added, "ingested file");
    }
    tracing::info!(num_docs = store.len(), files = files.len(), "ingested documents");

    let index = InvertedIndex::build_from_store(&store, tokenizer, config)?;
    persist::save_index(output, &index, &store, options)?;

    let meta = MetaFile {
        num_docs: index.num_docs(),
        num_terms: index.num_terms(),
        created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
        version: FORMAT_VERSION,
    };
    persist::save_meta(&persist::meta_path(output), &meta)?;

    tracing::info!(output = %output.display(), "index build complete");
    Ok(())
}

/// Input files in a stable order, so the same tree always yields the same ids.
fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(extension(p), Some("js" | "json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }
    Ok(files)
}

fn read_documents(file: &Path) -> Result<Vec<NewDocument>> {
    let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let docs = if extension(file) == Some("jsonl") {
        documenter::parse_jsonl(&text)
    } else {
        documenter::parse(&text)
    };
    docs.with_context(|| format!("parsing {}", file.display()))
}

fn extension(p: &Path) -> Option<&str> {
    p.extension().and_then(|s| s.to_str())
}
