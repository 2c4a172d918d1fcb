use thiserror::Error;

use crate::{DocId, Position};

/// Precondition violations raised while building or combining postings lists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A position was not strictly greater than the last one recorded for the document.
    #[error("position {offset} for document {document_id} is not after last position {last}")]
    OutOfOrderPosition {
        document_id: DocId,
        last: Position,
        offset: Position,
    },

    /// A document arrived after a document with a larger identifier.
    #[error("document {document_id} arrived after document {last}")]
    OutOfOrderDocument { last: DocId, document_id: DocId },

    #[error("postings list is sealed")]
    ListSealed,

    /// Two lists that must be disjoint both contain this document.
    #[error("document {0} is present in both lists")]
    OverlappingDocument(DocId),

    /// A stored node has empty, unsorted or miscounted positions.
    #[error("posting for document {0} is malformed")]
    MalformedPosting(DocId),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error invalidates only the current document rather than the whole build.
    pub fn is_document_local(&self) -> bool {
        matches!(self, Error::OutOfOrderPosition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::OutOfOrderPosition { document_id: 7, last: 4, offset: 3 };
        assert_eq!(err.to_string(), "position 3 for document 7 is not after last position 4");
        let err = Error::OutOfOrderDocument { last: 2, document_id: 1 };
        assert_eq!(err.to_string(), "document 1 arrived after document 2");
    }

    #[test]
    fn test_document_local_errors() {
        assert!(Error::OutOfOrderPosition { document_id: 1, last: 1, offset: 1 }.is_document_local());
        assert!(!Error::ListSealed.is_document_local());
        assert!(!Error::OutOfOrderDocument { last: 2, document_id: 1 }.is_document_local());
    }
}
