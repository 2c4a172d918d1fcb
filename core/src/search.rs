//! Query-time evaluation: conjunctive/disjunctive document search with
//! optional phrase verification and pluggable scoring.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::builder::PostingsList;
use crate::merge::{intersect_all_with, term_frequency, union_all_with};
use crate::posting::Posting;
use crate::{DocId, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Every term must occur.
    #[default]
    All,
    /// At least one term must occur.
    Any,
    /// Every term must occur, at the offsets it has in the query.
    Phrase,
}

/// One distinct query term with its sealed list and its offsets within the query.
#[derive(Debug, Clone)]
pub struct QueryTerm<'a> {
    pub list: &'a PostingsList,
    pub offsets: Vec<Position>,
}

impl<'a> QueryTerm<'a> {
    pub fn new(list: &'a PostingsList, offsets: Vec<Position>) -> Self {
        Self { list, offsets }
    }

    pub fn doc_frequency(&self) -> usize {
        self.list.len()
    }
}

/// Turns raw per-document counts into a relevance contribution.
pub trait Scorer {
    fn score(&self, term_frequency: u32, doc_frequency: usize, total_docs: u32) -> f64;
}

/// `tf * log2(N / df)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TfIdf;

impl Scorer for TfIdf {
    fn score(&self, term_frequency: u32, doc_frequency: usize, total_docs: u32) -> f64 {
        if doc_frequency == 0 || total_docs == 0 {
            return 0.0;
        }
        let idf = (total_docs as f64 / doc_frequency as f64).log2();
        term_frequency as f64 * idf
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document_id: DocId,
    pub score: f64,
    /// Phrase occurrences in the document; `None` outside phrase mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrases: Option<usize>,
}

/// Evaluates `terms` and returns hits by descending score, ties by document id.
pub fn search_documents<S: Scorer>(terms: &[QueryTerm<'_>], total_docs: u32, mode: Mode, scorer: &S) -> Vec<SearchHit> {
    if terms.is_empty() {
        return Vec::new();
    }
    let lists: Vec<&PostingsList> = terms.iter().map(|t| t.list).collect();
    let mut hits = Vec::new();

    match mode {
        Mode::All | Mode::Phrase => {
            intersect_all_with(&lists, |doc, nodes| {
                let phrases = if mode == Mode::Phrase {
                    let count = count_phrase_occurrences(terms, nodes);
                    if count == 0 {
                        return;
                    }
                    Some(count)
                } else {
                    None
                };
                let score = terms
                    .iter()
                    .zip(nodes)
                    .map(|(t, node)| scorer.score(term_frequency(node), t.doc_frequency(), total_docs))
                    .sum();
                hits.push(SearchHit { document_id: doc, score, phrases });
            });
        }
        Mode::Any => {
            union_all_with(&lists, |doc, nodes| {
                let score = terms
                    .iter()
                    .zip(nodes)
                    .filter_map(|(t, node)| node.map(|n| scorer.score(term_frequency(n), t.doc_frequency(), total_docs)))
                    .sum();
                hits.push(SearchHit { document_id: doc, score, phrases: None });
            });
        }
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.document_id.cmp(&b.document_id))
    });
    tracing::debug!(terms = terms.len(), ?mode, hits = hits.len(), "search evaluated");
    hits
}

/// Counts how often the query's terms occur in one document at the relative
/// offsets they have in the query. `nodes[i]` is the document's node for `terms[i]`.
pub fn count_phrase_occurrences(terms: &[QueryTerm<'_>], nodes: &[&Posting]) -> usize {
    // one cursor per (term, query offset); a term repeated in the query gets several
    let cursors: Vec<(&[Position], i64)> = terms
        .iter()
        .zip(nodes)
        .flat_map(|(t, node)| t.offsets.iter().map(move |&base| (node.positions(), base as i64)))
        .collect();
    if cursors.is_empty() {
        return 0;
    }
    let rel = |k: usize, i: usize| cursors[k].0.get(i).map(|&p| p as i64 - cursors[k].1);
    let mut idx = vec![0usize; cursors.len()];
    let mut count = 0;

    'outer: while let Some(lead) = rel(0, idx[0]) {
        let mut next = lead;
        for k in 1..cursors.len() {
            while rel(k, idx[k]).is_some_and(|r| r < lead) {
                idx[k] += 1;
            }
            match rel(k, idx[k]) {
                None => break 'outer,
                Some(r) if r != lead => {
                    next = r;
                    break;
                }
                Some(_) => {}
            }
        }
        if next > lead {
            while rel(0, idx[0]).is_some_and(|r| r < next) {
                idx[0] += 1;
            }
        } else {
            count += 1;
            idx[0] += 1;
        }
    }
    count
}
