use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cursor::PostingsCursor;
use crate::error::{Error, Result};
use crate::posting::Posting;
use crate::{DocId, Position};

/// Sealed postings list for one term.
///
/// Nodes are stored contiguously in ascending `document_id` order; a node's
/// successor is the next element. Once built the list never changes, so it is
/// shared between readers without locking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Posting>", into = "Vec<Posting>")]
pub struct PostingsList {
    nodes: Vec<Posting>,
}

impl PostingsList {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a list from nodes that must already satisfy every list invariant.
    pub fn from_postings(nodes: Vec<Posting>) -> Result<Self> {
        for node in &nodes {
            if !node.is_well_formed() {
                return Err(Error::MalformedPosting(node.document_id()));
            }
        }
        for pair in nodes.windows(2) {
            if pair[1].document_id() <= pair[0].document_id() {
                return Err(Error::OutOfOrderDocument {
                    last: pair[0].document_id(),
                    document_id: pair[1].document_id(),
                });
            }
        }
        Ok(Self { nodes })
    }

    pub(crate) fn from_sorted(nodes: Vec<Posting>) -> Self {
        debug_assert!(nodes.windows(2).all(|w| w[0].document_id() < w[1].document_id()));
        Self { nodes }
    }

    /// Number of documents containing the term.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First node of the chain.
    pub fn head(&self) -> Option<&Posting> {
        self.nodes.first()
    }

    pub fn cursor(&self) -> PostingsCursor<'_> {
        PostingsCursor::new(&self.nodes)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Posting> {
        self.nodes.iter()
    }

    pub fn document_ids(&self) -> Vec<DocId> {
        self.nodes.iter().map(Posting::document_id).collect()
    }

    /// Node for `document_id`, found by binary search over the ordered chain.
    pub fn get(&self, document_id: DocId) -> Option<&Posting> {
        self.nodes
            .binary_search_by_key(&document_id, Posting::document_id)
            .ok()
            .map(|i| &self.nodes[i])
    }

    /// Total occurrences of the term across all documents.
    pub fn positions_count(&self) -> u64 {
        self.nodes.iter().map(|p| p.position_count() as u64).sum()
    }

    pub(crate) fn into_nodes(self) -> Vec<Posting> {
        self.nodes
    }
}

impl TryFrom<Vec<Posting>> for PostingsList {
    type Error = Error;

    fn try_from(nodes: Vec<Posting>) -> Result<Self> {
        Self::from_postings(nodes)
    }
}

impl From<PostingsList> for Vec<Posting> {
    fn from(list: PostingsList) -> Self {
        list.nodes
    }
}

impl<'a> IntoIterator for &'a PostingsList {
    type Item = &'a Posting;
    type IntoIter = std::slice::Iter<'a, Posting>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl fmt::Display for PostingsList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            write!(f, "doc_id {} (", node.document_id())?;
            for pos in node.positions() {
                write!(f, "{pos} ")?;
            }
            writeln!(f, ")")?;
        }
        Ok(())
    }
}

/// Grows one term's postings list while documents are indexed in ascending order.
#[derive(Debug, Default)]
pub struct PostingsListBuilder {
    nodes: Vec<Posting>,
    sealed: bool,
}

impl PostingsListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the term occurs in `document_id` at `position`.
    ///
    /// Occurrences must arrive with non-decreasing document ids and, within a
    /// document, strictly increasing positions. The builder never reorders.
    pub fn add_occurrence(&mut self, document_id: DocId, position: Position) -> Result<()> {
        if self.sealed {
            return Err(Error::ListSealed);
        }
        if let Some(tail) = self.nodes.last_mut() {
            if tail.document_id() == document_id {
                return tail.append_position(position);
            }
            if tail.document_id() > document_id {
                return Err(Error::OutOfOrderDocument { last: tail.document_id(), document_id });
            }
        }
        self.nodes.push(Posting::new(document_id, position));
        Ok(())
    }

    /// Drops the tail node if it belongs to `document_id`.
    ///
    /// Returns whether anything was removed.
    pub fn discard_document(&mut self, document_id: DocId) -> bool {
        if self.sealed {
            return false;
        }
        if self.last_document() != Some(document_id) {
            return false;
        }
        self.nodes.pop();
        true
    }

    /// Seals the builder and hands over the finished list.
    pub fn finish(&mut self) -> Result<PostingsList> {
        if self.sealed {
            return Err(Error::ListSealed);
        }
        self.sealed = true;
        let nodes = std::mem::take(&mut self.nodes);
        tracing::trace!(docs = nodes.len(), "sealed postings list");
        Ok(PostingsList::from_sorted(nodes))
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Document id of the tail node, if any.
    pub fn last_document(&self) -> Option<DocId> {
        self.nodes.last().map(Posting::document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(occurrences: &[(DocId, Position)]) -> PostingsList {
        let mut b = PostingsListBuilder::new();
        for &(doc, pos) in occurrences {
            b.add_occurrence(doc, pos).unwrap();
        }
        b.finish().unwrap()
    }

    #[test]
    fn groups_positions_by_document() {
        let list = build(&[(1, 2), (1, 5), (3, 1)]);
        assert_eq!(list.document_ids(), vec![1, 3]);
        assert_eq!(list.get(1).unwrap().positions(), &[2, 5]);
        assert_eq!(list.get(3).unwrap().position_count(), 1);
        assert!(list.get(2).is_none());
        assert_eq!(list.positions_count(), 3);
    }

    #[test]
    fn out_of_order_document_is_rejected() {
        let mut b = PostingsListBuilder::new();
        b.add_occurrence(2, 0).unwrap();
        let err = b.add_occurrence(1, 0).unwrap_err();
        assert_eq!(err, Error::OutOfOrderDocument { last: 2, document_id: 1 });
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn out_of_order_position_is_surfaced_by_builder() {
        let mut b = PostingsListBuilder::new();
        b.add_occurrence(1, 4).unwrap();
        assert!(matches!(b.add_occurrence(1, 3), Err(Error::OutOfOrderPosition { .. })));
    }

    #[test]
    fn sealed_builder_rejects_mutation() {
        let mut b = PostingsListBuilder::new();
        b.add_occurrence(1, 0).unwrap();
        let list = b.finish().unwrap();
        assert_eq!(list.len(), 1);
        assert!(b.is_sealed());
        assert_eq!(b.add_occurrence(2, 0), Err(Error::ListSealed));
        assert_eq!(b.finish(), Err(Error::ListSealed));
    }

    #[test]
    fn discard_drops_only_matching_tail() {
        let mut b = PostingsListBuilder::new();
        b.add_occurrence(1, 0).unwrap();
        b.add_occurrence(2, 3).unwrap();
        assert!(!b.discard_document(1));
        assert!(b.discard_document(2));
        assert_eq!(b.last_document(), Some(1));
        b.add_occurrence(2, 0).unwrap();
        assert_eq!(b.finish().unwrap().document_ids(), vec![1, 2]);
    }

    #[test]
    fn from_postings_validates_order() {
        let nodes = vec![Posting::new(3, 0), Posting::new(1, 0)];
        assert_eq!(
            PostingsList::from_postings(nodes),
            Err(Error::OutOfOrderDocument { last: 3, document_id: 1 })
        );
    }

    #[test]
    fn display_lists_every_node() {
        let list = build(&[(1, 2), (1, 5), (3, 1)]);
        assert_eq!(list.to_string(), "doc_id 1 (2 5 )\ndoc_id 3 (1 )\n");
    }
}
