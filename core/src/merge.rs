//! Sorted-merge algorithms over sealed postings lists.
//!
//! Every function relies on the ascending `document_id` order of its inputs
//! and runs in time linear in the combined input length, without sorting.

use std::cmp::Ordering;

use serde::Serialize;

use crate::builder::PostingsList;
use crate::cursor::PostingsCursor;
use crate::error::{Error, Result};
use crate::posting::Posting;
use crate::{DocId, Position};

/// Documents where term B follows term A at the requested distance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhraseMatch {
    pub document_id: DocId,
    /// `(offset in A, offset in B)` for every adjacent occurrence, ascending.
    pub offsets: Vec<(Position, Position)>,
}

/// Calls `on_match` with both nodes for every document present in `a` and `b`.
pub fn intersect_with<'a, F>(a: &'a PostingsList, b: &'a PostingsList, mut on_match: F)
where
    F: FnMut(&'a Posting, &'a Posting),
{
    if a.is_empty() || b.is_empty() {
        return;
    }
    let mut ca = a.cursor();
    let mut cb = b.cursor();
    while let (Some(na), Some(nb)) = (ca.current(), cb.current()) {
        match na.document_id().cmp(&nb.document_id()) {
            Ordering::Less => ca.advance(),
            Ordering::Greater => cb.advance(),
            Ordering::Equal => {
                on_match(na, nb);
                ca.advance();
                cb.advance();
            }
        }
    }
}

/// Documents containing both terms (boolean AND), ascending.
pub fn intersect(a: &PostingsList, b: &PostingsList) -> Vec<DocId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    intersect_with(a, b, |na, _| out.push(na.document_id()));
    out
}

/// Documents containing either term (boolean OR), ascending and deduplicated.
pub fn union(a: &PostingsList, b: &PostingsList) -> Vec<DocId> {
    let mut out = Vec::with_capacity(a.len().max(b.len()));
    let mut ca = a.cursor();
    let mut cb = b.cursor();
    loop {
        match (ca.doc(), cb.doc()) {
            (Some(da), Some(db)) => match da.cmp(&db) {
                Ordering::Less => {
                    out.push(da);
                    ca.advance();
                }
                Ordering::Greater => {
                    out.push(db);
                    cb.advance();
                }
                Ordering::Equal => {
                    out.push(da);
                    ca.advance();
                    cb.advance();
                }
            },
            (Some(_), None) => {
                out.extend(ca.by_ref().map(Posting::document_id));
                break;
            }
            (None, Some(_)) => {
                out.extend(cb.by_ref().map(Posting::document_id));
                break;
            }
            (None, None) => break,
        }
    }
    out
}

/// Documents in which some occurrence of `b` sits exactly `gap` tokens after an
/// occurrence of `a`, with the matching offset pairs.
pub fn phrase_adjacent(a: &PostingsList, b: &PostingsList, gap: u32) -> Vec<PhraseMatch> {
    let mut out = Vec::new();
    intersect_with(a, b, |na, nb| {
        let offsets = adjacent_offsets(na.positions(), nb.positions(), gap);
        if !offsets.is_empty() {
            out.push(PhraseMatch { document_id: na.document_id(), offsets });
        }
    });
    out
}

/// Two-pointer scan over two ascending position lists.
fn adjacent_offsets(a: &[Position], b: &[Position], gap: u32) -> Vec<(Position, Position)> {
    let mut pairs = Vec::new();
    let mut j = 0;
    for &pa in a {
        let Some(target) = pa.checked_add(gap) else { break };
        while j < b.len() && b[j] < target {
            j += 1;
        }
        if j == b.len() {
            break;
        }
        if b[j] == target {
            pairs.push((pa, target));
        }
    }
    pairs
}

/// Occurrences of the term in the node's document.
pub fn term_frequency(node: &Posting) -> u32 {
    node.position_count()
}

/// n-way conjunction. `on_match` receives the nodes in the order of `lists`.
///
/// The shortest list drives the walk; every other cursor only seeks forward.
pub fn intersect_all_with<'a, F>(lists: &[&'a PostingsList], mut on_match: F)
where
    F: FnMut(DocId, &[&'a Posting]),
{
    if lists.is_empty() || lists.iter().any(|l| l.is_empty()) {
        return;
    }
    let mut order: Vec<usize> = (0..lists.len()).collect();
    order.sort_by_key(|&i| lists[i].len());
    let mut rank = vec![0; lists.len()];
    for (r, &i) in order.iter().enumerate() {
        rank[i] = r;
    }
    let mut cursors: Vec<PostingsCursor<'a>> = order.iter().map(|&i| lists[i].cursor()).collect();
    let mut matched: Vec<&'a Posting> = Vec::with_capacity(lists.len());

    'outer: while let Some(doc) = cursors[0].doc() {
        for k in 1..cursors.len() {
            match cursors[k].seek(doc) {
                None => break 'outer,
                Some(node) if node.document_id() > doc => {
                    cursors[0].seek(node.document_id());
                    continue 'outer;
                }
                Some(_) => {}
            }
        }
        matched.clear();
        matched.extend(rank.iter().filter_map(|&r| cursors[r].current()));
        on_match(doc, &matched);
        cursors[0].advance();
    }
}

/// Documents containing every term, ascending.
pub fn intersect_all(lists: &[&PostingsList]) -> Vec<DocId> {
    let mut out = Vec::new();
    intersect_all_with(lists, |doc, _| out.push(doc));
    out
}

/// n-way disjunction. `on_match` receives, per input list, the node for the
/// document or `None` when that list lacks it.
pub fn union_all_with<'a, F>(lists: &[&'a PostingsList], mut on_match: F)
where
    F: FnMut(DocId, &[Option<&'a Posting>]),
{
    let mut cursors: Vec<PostingsCursor<'a>> = lists.iter().map(|l| l.cursor()).collect();
    let mut matched: Vec<Option<&'a Posting>> = vec![None; lists.len()];
    while let Some(doc) = cursors.iter().filter_map(PostingsCursor::doc).min() {
        for (slot, cursor) in matched.iter_mut().zip(cursors.iter_mut()) {
            *slot = match cursor.current() {
                Some(node) if node.document_id() == doc => {
                    cursor.advance();
                    Some(node)
                }
                _ => None,
            };
        }
        on_match(doc, &matched);
    }
}

/// Documents containing any term, ascending and deduplicated.
pub fn union_all(lists: &[&PostingsList]) -> Vec<DocId> {
    let mut out = Vec::new();
    union_all_with(lists, |doc, _| out.push(doc));
    out
}

/// Splices two lists with disjoint document sets into one ordered list.
///
/// Used when a freshly indexed batch is folded into an existing generation.
pub fn merge_disjoint(a: PostingsList, b: PostingsList) -> Result<PostingsList> {
    if a.is_empty() {
        return Ok(b);
    }
    if b.is_empty() {
        return Ok(a);
    }
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut ia = a.into_nodes().into_iter().peekable();
    let mut ib = b.into_nodes().into_iter().peekable();
    loop {
        let take_a = match (ia.peek(), ib.peek()) {
            (Some(na), Some(nb)) => match na.document_id().cmp(&nb.document_id()) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => return Err(Error::OverlappingDocument(na.document_id())),
            },
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_a { ia.next() } else { ib.next() };
        out.extend(next);
    }
    Ok(PostingsList::from_sorted(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PostingsListBuilder;

    fn build(occurrences: &[(DocId, Position)]) -> PostingsList {
        let mut b = PostingsListBuilder::new();
        for &(doc, pos) in occurrences {
            b.add_occurrence(doc, pos).unwrap();
        }
        b.finish().unwrap()
    }

    fn docs(ids: &[DocId]) -> PostingsList {
        build(&ids.iter().map(|&d| (d, 0)).collect::<Vec<_>>())
    }

    fn sample_a() -> PostingsList {
        build(&[(1, 2), (1, 5), (3, 1)])
    }

    fn sample_b() -> PostingsList {
        build(&[(1, 6), (2, 9)])
    }

    #[test]
    fn worked_example() {
        let (a, b) = (sample_a(), sample_b());
        assert_eq!(intersect(&a, &b), vec![1]);
        assert_eq!(union(&a, &b), vec![1, 2, 3]);
        assert_eq!(
            phrase_adjacent(&a, &b, 1),
            vec![PhraseMatch { document_id: 1, offsets: vec![(5, 6)] }]
        );
    }

    #[test]
    fn empty_inputs() {
        let a = sample_a();
        let empty = PostingsList::empty();
        assert!(intersect(&a, &empty).is_empty());
        assert!(intersect(&empty, &a).is_empty());
        assert_eq!(union(&a, &empty), a.document_ids());
        assert_eq!(union(&empty, &a), a.document_ids());
        assert!(union(&empty, &empty).is_empty());
    }

    #[test]
    fn self_merge_is_identity() {
        let a = docs(&[2, 4, 8, 16]);
        assert_eq!(intersect(&a, &a), a.document_ids());
        assert_eq!(union(&a, &a), a.document_ids());
    }

    #[test]
    fn phrase_with_larger_gap() {
        let a = build(&[(4, 0), (4, 10), (7, 3)]);
        let b = build(&[(4, 2), (4, 12), (7, 4)]);
        let hits = phrase_adjacent(&a, &b, 2);
        assert_eq!(hits, vec![PhraseMatch { document_id: 4, offsets: vec![(0, 2), (10, 12)] }]);
        assert_eq!(phrase_adjacent(&a, &b, 1), vec![PhraseMatch { document_id: 7, offsets: vec![(3, 4)] }]);
    }

    #[test]
    fn phrase_gap_does_not_overflow() {
        let a = build(&[(1, u32::MAX - 1)]);
        let b = build(&[(1, u32::MAX)]);
        assert!(phrase_adjacent(&a, &b, 5).is_empty());
        assert_eq!(phrase_adjacent(&a, &b, 1).len(), 1);
    }

    #[test]
    fn term_frequency_reads_count() {
        let a = sample_a();
        assert_eq!(term_frequency(a.head().unwrap()), 2);
    }

    #[test]
    fn n_way_intersection_and_union() {
        let a = docs(&[1, 2, 3, 5, 8, 13]);
        let b = docs(&[2, 3, 5, 7, 11, 13]);
        let c = docs(&[3, 5, 13, 21]);
        assert_eq!(intersect_all(&[&a, &b, &c]), vec![3, 5, 13]);
        assert_eq!(union_all(&[&a, &b, &c]), vec![1, 2, 3, 5, 7, 8, 11, 13, 21]);
        assert!(intersect_all(&[&a, &PostingsList::empty()]).is_empty());
        assert!(intersect_all(&[]).is_empty());
        assert_eq!(intersect_all(&[&a]), a.document_ids());
    }

    #[test]
    fn n_way_callbacks_keep_input_order() {
        let long = build(&[(1, 0), (2, 7), (3, 0)]);
        let short = build(&[(2, 8)]);
        let mut seen = Vec::new();
        intersect_all_with(&[&long, &short], |doc, nodes| {
            seen.push((doc, nodes[0].positions().to_vec(), nodes[1].positions().to_vec()));
        });
        assert_eq!(seen, vec![(2, vec![7], vec![8])]);

        let mut present = Vec::new();
        union_all_with(&[&long, &short], |doc, nodes| {
            present.push((doc, nodes[0].is_some(), nodes[1].is_some()));
        });
        assert_eq!(present, vec![(1, true, false), (2, true, true), (3, true, false)]);
    }

    #[test]
    fn merge_disjoint_interleaves() {
        let a = build(&[(1, 0), (4, 2), (4, 3)]);
        let b = build(&[(2, 1), (9, 0)]);
        let merged = merge_disjoint(a, b).unwrap();
        assert_eq!(merged.document_ids(), vec![1, 2, 4, 9]);
        assert_eq!(merged.get(4).unwrap().positions(), &[2, 3]);
    }

    #[test]
    fn merge_disjoint_rejects_overlap() {
        let a = docs(&[1, 3]);
        let b = docs(&[2, 3]);
        assert_eq!(merge_disjoint(a, b), Err(Error::OverlappingDocument(3)));
    }
}
