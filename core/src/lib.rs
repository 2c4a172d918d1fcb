//! Positional postings lists and the sorted-merge algorithms built on them.
//!
//! Indexing feeds `(term, document_id, position)` occurrences into a
//! [`PostingsListBuilder`] per term; once sealed, a [`PostingsList`] is
//! immutable and can be shared freely between query threads, which combine
//! lists through the functions in [`merge`] and [`search`].

pub mod builder;
pub mod cursor;
pub mod error;
pub mod index;
pub mod merge;
pub mod persist;
pub mod posting;
pub mod search;
pub mod tokenizer;

pub use builder::{PostingsList, PostingsListBuilder};
pub use cursor::PostingsCursor;
pub use error::{Error, Result};
pub use index::{IndexBuffer, InvertedIndex};
pub use merge::{intersect, phrase_adjacent, term_frequency, union, PhraseMatch};
pub use posting::Posting;

use serde::{Deserialize, Serialize};

pub type DocId = u32;
pub type Position = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub external_id: String,
    pub title: String,
    pub url: Option<String>,
    /// Relative path to the stored full text for snippet extraction, e.g., texts/{doc_id}.txt
    pub text_path: Option<String>,
}
