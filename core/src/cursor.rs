use crate::posting::Posting;
use crate::DocId;

/// Forward-only, single-pass cursor over a sealed postings list.
///
/// Cursors borrow the list read-only, so any number of them can walk the same
/// list independently.
#[derive(Debug, Clone)]
pub struct PostingsCursor<'a> {
    nodes: &'a [Posting],
    idx: usize,
}

impl<'a> PostingsCursor<'a> {
    pub(crate) fn new(nodes: &'a [Posting]) -> Self {
        Self { nodes, idx: 0 }
    }

    /// Node under the cursor, `None` once exhausted.
    pub fn current(&self) -> Option<&'a Posting> {
        self.nodes.get(self.idx)
    }

    pub fn doc(&self) -> Option<DocId> {
        self.current().map(Posting::document_id)
    }

    /// Moves to the next node. No-op at the end.
    pub fn advance(&mut self) {
        if self.idx < self.nodes.len() {
            self.idx += 1;
        }
    }

    /// Advances to the first node whose document id is `>= target` and returns it.
    ///
    /// Never moves backwards.
    pub fn seek(&mut self, target: DocId) -> Option<&'a Posting> {
        let rest = &self.nodes[self.idx..];
        // gallop then binary search inside the bracket
        let mut bound = 1;
        while bound < rest.len() && rest[bound].document_id() < target {
            bound *= 2;
        }
        let lo = bound / 2;
        let hi = bound.min(rest.len());
        let offset = lo + rest[lo..hi].partition_point(|p| p.document_id() < target);
        self.idx += offset;
        self.current()
    }

    pub fn is_exhausted(&self) -> bool {
        self.idx >= self.nodes.len()
    }

    /// Nodes left, including the current one.
    pub fn remaining(&self) -> usize {
        self.nodes.len() - self.idx
    }
}

impl<'a> Iterator for PostingsCursor<'a> {
    type Item = &'a Posting;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current()?;
        self.advance();
        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::{PostingsList, PostingsListBuilder};

    fn list(docs: &[u32]) -> PostingsList {
        let mut b = PostingsListBuilder::new();
        for &d in docs {
            b.add_occurrence(d, 0).unwrap();
        }
        b.finish().unwrap()
    }

    #[test]
    fn advance_walks_then_stops() {
        let l = list(&[1, 4]);
        let mut c = l.cursor();
        assert_eq!(c.doc(), Some(1));
        c.advance();
        assert_eq!(c.doc(), Some(4));
        c.advance();
        assert!(c.current().is_none());
        c.advance();
        assert!(c.is_exhausted());
    }

    #[test]
    fn seek_lands_on_first_not_less() {
        let l = list(&[1, 3, 5, 7, 9, 11, 13, 15, 17]);
        let mut c = l.cursor();
        assert_eq!(c.seek(6).map(|p| p.document_id()), Some(7));
        assert_eq!(c.seek(7).map(|p| p.document_id()), Some(7));
        assert_eq!(c.seek(2).map(|p| p.document_id()), Some(7));
        assert_eq!(c.seek(17).map(|p| p.document_id()), Some(17));
        assert!(c.seek(18).is_none());
        assert!(c.is_exhausted());
    }

    #[test]
    fn independent_cursors_do_not_interfere() {
        let l = list(&[2, 4, 6]);
        let mut a = l.cursor();
        let b = l.cursor();
        a.advance();
        a.advance();
        assert_eq!(a.doc(), Some(6));
        assert_eq!(b.doc(), Some(2));
        assert_eq!(b.remaining(), 3);
    }
}
