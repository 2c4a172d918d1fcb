use anyhow::Result;
use clap::{Parser, Subcommand};
use postings::persist::{load_snapshot, save_doc_id_map, save_docs, save_index, save_meta, IndexPaths, MetaFile, SNAPSHOT_VERSION};
use postings::tokenizer::Analyzer;
use postings::{DocId, DocMeta, IndexBuffer, InvertedIndex};
use serde::Deserialize;
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InputDoc {
    id: String,
    title: String,
    body: String,
    url: Option<String>,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and inspect positional postings indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Index overlapping character N-grams instead of stemmed words
        #[arg(long)]
        ngram: Option<usize>,
        /// Documents buffered in memory before the buffer is folded into the index
        #[arg(long, default_value_t = 2048)]
        buffer_docs: u32,
        /// Stop after this many input documents
        #[arg(long)]
        max_docs: Option<u32>,
    },
    /// Print the postings of an existing index
    Dump {
        /// Index directory
        #[arg(long)]
        index: String,
        /// Only print this term
        #[arg(long)]
        term: Option<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, ngram, buffer_docs, max_docs } => {
            let analyzer = ngram.map_or(Analyzer::Words, Analyzer::NGram);
            build_index(&input, &output, analyzer, buffer_docs.max(1), max_docs)
        }
        Commands::Dump { index, term } => dump_index(&index, term.as_deref()),
    }
}

/// Accumulates one indexing run: the sealed generation so far, the live buffer
/// and the document tables.
struct Ingest<'a> {
    analyzer: Analyzer,
    buffer_docs: u32,
    max_docs: Option<u32>,
    out_paths: &'a IndexPaths,
    next_doc_id: DocId,
    index: InvertedIndex,
    buffer: IndexBuffer,
    docs: HashMap<DocId, DocMeta>,
    doc_id_map: HashMap<String, DocId>,
    skipped: usize,
}

impl<'a> Ingest<'a> {
    fn new(analyzer: Analyzer, buffer_docs: u32, max_docs: Option<u32>, out_paths: &'a IndexPaths) -> Self {
        Self {
            analyzer,
            buffer_docs,
            max_docs,
            out_paths,
            next_doc_id: 0,
            index: InvertedIndex::new(),
            buffer: IndexBuffer::new(),
            docs: HashMap::new(),
            doc_id_map: HashMap::new(),
            skipped: 0,
        }
    }

    /// True once `max_docs` input documents have been consumed, skipped ones included.
    fn is_full(&self) -> bool {
        self.max_docs.is_some_and(|max| self.next_doc_id >= max)
    }

    fn ingest_doc(&mut self, doc: InputDoc) -> Result<()> {
        if self.is_full() {
            return Ok(());
        }
        let doc_id = self.next_doc_id;
        self.next_doc_id += 1;

        let tokens = self.analyzer.analyze(&doc.body);
        if let Err(err) = self.buffer.add_document(doc_id, &tokens) {
            if err.is_document_local() {
                tracing::warn!(external_id = %doc.id, doc_id, error = %err, "skipping document");
                self.skipped += 1;
                return Ok(());
            }
            return Err(err.into());
        }
        self.doc_id_map.insert(doc.id.clone(), doc_id);

        // Write text for snippet extraction
        let text_rel = format!("texts/{}.txt", doc_id);
        fs::write(self.out_paths.root.join(&text_rel), &doc.body)?;
        self.docs.insert(doc_id, DocMeta { external_id: doc.id, title: doc.title, url: doc.url, text_path: Some(text_rel) });

        if self.buffer.num_docs() >= self.buffer_docs {
            self.flush()?;
        }
        Ok(())
    }

    /// Seals the buffer and folds it into the accumulated generation.
    fn flush(&mut self) -> Result<()> {
        if self.buffer.num_docs() == 0 {
            return Ok(());
        }
        let sealed = std::mem::take(&mut self.buffer).seal()?;
        tracing::debug!(docs = sealed.num_docs(), terms = sealed.num_terms(), "flushing index buffer");
        self.index.merge(sealed)?;
        Ok(())
    }

    fn ingest_file(&mut self, file: &Path) -> Result<()> {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            let reader = BufReader::new(File::open(file)?);
            for line in reader.lines() {
                if self.is_full() { break; }
                let line = line?;
                if line.trim().is_empty() { continue; }
                let doc: InputDoc = serde_json::from_str(&line)?;
                self.ingest_doc(doc)?;
            }
            return Ok(());
        }
        let reader = BufReader::new(File::open(file)?);
        let json: serde_json::Value = serde_json::from_reader(reader)?;
        match json {
            serde_json::Value::Array(arr) => {
                for v in arr {
                    if self.is_full() { break; }
                    let doc: InputDoc = serde_json::from_value(v)?;
                    self.ingest_doc(doc)?;
                }
            }
            serde_json::Value::Object(_) => {
                let doc: InputDoc = serde_json::from_value(json)?;
                self.ingest_doc(doc)?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn collect_inputs(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn build_index(input: &str, output: &str, analyzer: Analyzer, buffer_docs: u32, max_docs: Option<u32>) -> Result<()> {
    let out_paths = IndexPaths::new(output);
    fs::create_dir_all(out_paths.texts())?;

    let mut ingest = Ingest::new(analyzer, buffer_docs, max_docs, &out_paths);
    for file in collect_inputs(Path::new(input)) {
        if ingest.is_full() {
            tracing::info!(?max_docs, "document limit reached");
            break;
        }
        ingest.ingest_file(&file)?;
    }
    ingest.flush()?;

    let Ingest { index, docs, doc_id_map, skipped, .. } = ingest;
    tracing::info!(num_docs = index.num_docs(), num_terms = index.num_terms(), skipped, "ingested documents");

    save_index(&out_paths, &index)?;
    save_docs(&out_paths, &docs)?;
    save_doc_id_map(&out_paths, &doc_id_map)?;
    let meta = MetaFile {
        num_docs: index.num_docs(),
        num_terms: index.num_terms(),
        analyzer,
        created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
        version: SNAPSHOT_VERSION,
    };
    save_meta(&out_paths, &meta)?;

    tracing::info!(output, "index build complete");
    Ok(())
}

fn dump_index(index_dir: &str, term: Option<&str>) -> Result<()> {
    let snapshot = load_snapshot(&IndexPaths::new(index_dir))?;
    match term {
        Some(term) => match snapshot.index.postings(term) {
            Some(list) => print!("TOKEN {}({}):\nPOSTINGS: [\n{}]\n", term, list.len(), list),
            None => println!("TOKEN {term}: not indexed"),
        },
        None => print!("{}", snapshot.index),
    }
    Ok(())
}
