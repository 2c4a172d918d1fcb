use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{DocId, Position};

/// One document's occurrences of a term.
///
/// `position_count` mirrors `positions.len()` so term frequency is a field read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    document_id: DocId,
    positions: Vec<Position>,
    position_count: u32,
}

impl Posting {
    /// Creates a node holding its first occurrence.
    pub fn new(document_id: DocId, position: Position) -> Self {
        Self { document_id, positions: vec![position], position_count: 1 }
    }

    pub fn document_id(&self) -> DocId {
        self.document_id
    }

    /// Occurrence offsets, strictly increasing.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn position_count(&self) -> u32 {
        self.position_count
    }

    pub fn last_position(&self) -> Option<Position> {
        self.positions.last().copied()
    }

    /// Records another occurrence in this document.
    ///
    /// `offset` must be strictly greater than the last stored position; on
    /// failure the node is left untouched.
    pub fn append_position(&mut self, offset: Position) -> Result<()> {
        if let Some(last) = self.last_position() {
            if offset <= last {
                return Err(Error::OutOfOrderPosition { document_id: self.document_id, last, offset });
            }
        }
        self.positions.push(offset);
        self.position_count += 1;
        Ok(())
    }

    /// Checks the node-level invariants. Used when loading snapshots.
    pub(crate) fn is_well_formed(&self) -> bool {
        !self.positions.is_empty()
            && self.position_count as usize == self.positions.len()
            && self.positions.windows(2).all(|w| w[0] < w[1])
    }
}
