use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::builder::{PostingsList, PostingsListBuilder};
use crate::error::{Error, Result};
use crate::merge::merge_disjoint;
use crate::{DocId, Position};

/// Per-term counters exposed to ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TermStats {
    /// Documents containing the term.
    pub docs_count: usize,
    /// Occurrences across all documents.
    pub positions_count: u64,
}

/// Mutable, single-writer buffer that grows one builder per term.
#[derive(Debug, Default)]
pub struct IndexBuffer {
    builders: HashMap<String, PostingsListBuilder>,
    num_docs: u32,
    last_document: Option<DocId>,
}

impl IndexBuffer {
    pub fn new() -> Self { Self::default() }

    /// Feeds every `(term, position)` of one document.
    ///
    /// Documents must arrive in strictly increasing id order. If any position is
    /// out of order the whole document is dropped from the buffer before the
    /// error is returned.
    pub fn add_document(&mut self, document_id: DocId, tokens: &[(String, Position)]) -> Result<()> {
        if let Some(last) = self.last_document {
            if document_id <= last {
                return Err(Error::OutOfOrderDocument { last, document_id });
            }
        }
        let mut touched: HashSet<&str> = HashSet::new();
        for (term, position) in tokens {
            let builder = self.builders.entry(term.clone()).or_default();
            touched.insert(term.as_str());
            if let Err(err) = builder.add_occurrence(document_id, *position) {
                tracing::warn!(document_id, term = %term, error = %err, "discarding document postings");
                for t in &touched {
                    if let Some(b) = self.builders.get_mut(*t) {
                        b.discard_document(document_id);
                    }
                }
                return Err(err);
            }
        }
        self.last_document = Some(document_id);
        self.num_docs += 1;
        Ok(())
    }

    pub fn num_docs(&self) -> u32 { self.num_docs }

    pub fn num_terms(&self) -> usize { self.builders.len() }

    /// Seals every builder into an immutable generation.
    pub fn seal(self) -> Result<InvertedIndex> {
        let mut postings = HashMap::with_capacity(self.builders.len());
        for (term, mut builder) in self.builders {
            let list = builder.finish()?;
            // terms seen only in discarded documents
            if list.is_empty() { continue; }
            postings.insert(term, Arc::new(list));
        }
        tracing::debug!(num_docs = self.num_docs, num_terms = postings.len(), "sealed index buffer");
        Ok(InvertedIndex { postings, num_docs: self.num_docs })
    }
}

/// Read-only index generation: term dictionary over sealed postings lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvertedIndex {
    postings: HashMap<String, Arc<PostingsList>>,
    num_docs: u32,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn postings(&self, term: &str) -> Option<&Arc<PostingsList>> {
        self.postings.get(term)
    }

    pub fn doc_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, |l| l.len())
    }

    pub fn term_stats(&self, term: &str) -> Option<TermStats> {
        self.postings.get(term).map(|l| TermStats { docs_count: l.len(), positions_count: l.positions_count() })
    }

    pub fn num_docs(&self) -> u32 { self.num_docs }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.postings.keys().map(String::as_str)
    }

    /// Folds a later generation whose documents are disjoint from this one.
    ///
    /// Nothing is modified unless every shared term merges cleanly.
    pub fn merge(&mut self, other: InvertedIndex) -> Result<()> {
        let mut merged: Vec<(String, PostingsList)> = Vec::new();
        let mut fresh: Vec<(String, Arc<PostingsList>)> = Vec::new();
        for (term, list) in other.postings {
            match self.postings.get(&term) {
                Some(base) => {
                    let added = Arc::try_unwrap(list).unwrap_or_else(|l| (*l).clone());
                    let combined = merge_disjoint((**base).clone(), added)?;
                    merged.push((term, combined));
                }
                None => fresh.push((term, list)),
            }
        }
        tracing::debug!(merged = merged.len(), fresh = fresh.len(), "merged index generation");
        for (term, list) in merged {
            self.postings.insert(term, Arc::new(list));
        }
        self.postings.extend(fresh);
        self.num_docs += other.num_docs;
        Ok(())
    }
}

/// Human-readable listing of every term and its postings, sorted by term.
impl fmt::Display for InvertedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sorted: BTreeMap<&String, &Arc<PostingsList>> = self.postings.iter().collect();
        for (term, list) in sorted {
            writeln!(f, "TOKEN {}({}):", term, list.len())?;
            write!(f, "POSTINGS: [\n{}]\n", list)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(terms: &[(&str, Position)]) -> Vec<(String, Position)> {
        terms.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    #[test]
    fn buffer_builds_sealed_generation() {
        let mut buf = IndexBuffer::new();
        buf.add_document(0, &toks(&[("rust", 0), ("fast", 1), ("rust", 2)])).unwrap();
        buf.add_document(1, &toks(&[("fast", 0)])).unwrap();
        let idx = buf.seal().unwrap();
        assert_eq!(idx.num_docs(), 2);
        assert_eq!(idx.doc_frequency("fast"), 2);
        assert_eq!(idx.term_stats("rust"), Some(TermStats { docs_count: 1, positions_count: 2 }));
        assert!(idx.postings("slow").is_none());
    }

    #[test]
    fn bad_document_is_dropped_whole() {
        let mut buf = IndexBuffer::new();
        buf.add_document(0, &toks(&[("a", 0)])).unwrap();
        let err = buf.add_document(1, &toks(&[("a", 0), ("b", 1), ("a", 0)])).unwrap_err();
        assert!(err.is_document_local());
        buf.add_document(2, &toks(&[("a", 3)])).unwrap();
        let idx = buf.seal().unwrap();
        assert_eq!(idx.postings("a").unwrap().document_ids(), vec![0, 2]);
        assert!(idx.postings("b").is_none());
        assert_eq!(idx.num_docs(), 2);
    }

    #[test]
    fn documents_must_increase() {
        let mut buf = IndexBuffer::new();
        buf.add_document(2, &toks(&[("a", 0)])).unwrap();
        assert_eq!(
            buf.add_document(1, &toks(&[("a", 0)])),
            Err(Error::OutOfOrderDocument { last: 2, document_id: 1 })
        );
    }

    #[test]
    fn merge_folds_disjoint_generations() {
        let mut first = IndexBuffer::new();
        first.add_document(0, &toks(&[("a", 0)])).unwrap();
        first.add_document(2, &toks(&[("a", 1), ("b", 2)])).unwrap();
        let mut base = first.seal().unwrap();

        let mut second = IndexBuffer::new();
        second.add_document(1, &toks(&[("a", 4)])).unwrap();
        second.add_document(3, &toks(&[("c", 0)])).unwrap();
        base.merge(second.seal().unwrap()).unwrap();

        assert_eq!(base.num_docs(), 4);
        assert_eq!(base.postings("a").unwrap().document_ids(), vec![0, 1, 2]);
        assert_eq!(base.doc_frequency("c"), 1);
    }

    #[test]
    fn overlapping_merge_leaves_base_untouched() {
        let mut first = IndexBuffer::new();
        first.add_document(0, &toks(&[("a", 0)])).unwrap();
        let mut base = first.seal().unwrap();
        let mut second = IndexBuffer::new();
        second.add_document(0, &toks(&[("a", 1)])).unwrap();
        assert_eq!(base.merge(second.seal().unwrap()), Err(Error::OverlappingDocument(0)));
        assert_eq!(base.num_docs(), 1);
        assert_eq!(base.postings("a").unwrap().get(0).unwrap().positions(), &[0]);
    }

    #[test]
    fn dump_is_sorted_by_term() {
        let mut buf = IndexBuffer::new();
        buf.add_document(0, &toks(&[("b", 0), ("a", 1)])).unwrap();
        let dump = buf.seal().unwrap().to_string();
        assert_eq!(dump, "TOKEN a(1):\nPOSTINGS: [\ndoc_id 0 (1 )\n]\nTOKEN b(1):\nPOSTINGS: [\ndoc_id 0 (0 )\n]\n");
    }
}
