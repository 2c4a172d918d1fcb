//! Snapshot of one sealed index generation on disk.
//!
//! The snapshot is a plain serde dump; postings are not compressed. Lists are
//! re-validated on load, so a corrupted file cannot produce an unsorted list.

use crate::tokenizer::Analyzer;
use crate::{DocId, DocMeta, InvertedIndex};
use anyhow::{Context, Result};
use bincode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: usize,
    pub analyzer: Analyzer,
    pub created_at: String,
    pub version: u32,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn postings(&self) -> PathBuf { self.root.join("postings.bin") }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn doc_id_map(&self) -> PathBuf { self.root.join("doc_id_map.bin") }
    pub fn texts(&self) -> PathBuf { self.root.join("texts") }
}

fn write_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, value)?;
    w.flush()?;
    Ok(())
}

fn read_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let value = bincode::deserialize_from(BufReader::new(f))
        .with_context(|| format!("decoding {}", path.display()))?;
    Ok(value)
}

pub fn save_index(paths: &IndexPaths, index: &InvertedIndex) -> Result<()> {
    create_dir_all(&paths.root)?;
    write_bin(&paths.postings(), index)
}

pub fn load_index(paths: &IndexPaths) -> Result<InvertedIndex> {
    read_bin(&paths.postings())
}

pub fn save_docs(paths: &IndexPaths, docs: &HashMap<DocId, DocMeta>) -> Result<()> {
    create_dir_all(&paths.root)?;
    write_bin(&paths.docs(), docs)
}

pub fn load_docs(paths: &IndexPaths) -> Result<HashMap<DocId, DocMeta>> {
    read_bin(&paths.docs())
}

pub fn save_doc_id_map(paths: &IndexPaths, map: &HashMap<String, DocId>) -> Result<()> {
    create_dir_all(&paths.root)?;
    write_bin(&paths.doc_id_map(), map)
}

pub fn load_doc_id_map(paths: &IndexPaths) -> Result<HashMap<String, DocId>> {
    read_bin(&paths.doc_id_map())
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let f = File::open(paths.meta()).with_context(|| format!("opening {}", paths.meta().display()))?;
    let meta: MetaFile = serde_json::from_reader(BufReader::new(f))?;
    if meta.version > SNAPSHOT_VERSION {
        anyhow::bail!("snapshot version {} is newer than supported {}", meta.version, SNAPSHOT_VERSION);
    }
    Ok(meta)
}

/// Everything a query server needs from one generation.
pub struct Snapshot {
    pub index: InvertedIndex,
    pub docs: HashMap<DocId, DocMeta>,
    /// External document id to internal id.
    pub doc_id_map: HashMap<String, DocId>,
    pub meta: MetaFile,
}

pub fn load_snapshot(paths: &IndexPaths) -> Result<Snapshot> {
    let meta = load_meta(paths)?;
    let index = load_index(paths)?;
    let docs = load_docs(paths)?;
    let doc_id_map = load_doc_id_map(paths)?;
    tracing::info!(num_docs = meta.num_docs, num_terms = index.num_terms(), "loaded index snapshot");
    Ok(Snapshot { index, docs, doc_id_map, meta })
}
