//! Postings and inverted lists.
//!
//! A posting is `(docid, positions)` with positions as strictly increasing
//! token offsets; an inverted list is a docid-ascending sequence of postings
//! with unique docids. Positional operators synthesize new inverted lists
//! from child lists, so these invariants are checked at the append seam.

use serde::{Deserialize, Serialize};

/// One document's occurrences of a term (or synthesized pattern).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Internal document id.
    pub docid: u32,
    /// Strictly increasing token positions.
    pub positions: Vec<u32>,
}

impl Posting {
    /// Term frequency within the document: the number of positions.
    pub fn tf(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// A docid-ascending sequence of postings for one field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvList {
    /// Field the postings were drawn from.
    pub field: String,
    /// Postings, docid ascending, docids unique.
    pub postings: Vec<Posting>,
}

impl InvList {
    /// Create an empty inverted list for `field`.
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            postings: Vec::new(),
        }
    }

    /// Append a posting. `docid` must exceed every docid already present and
    /// `positions` must be strictly increasing and non-empty.
    pub fn append_posting(&mut self, docid: u32, positions: Vec<u32>) {
        debug_assert!(!positions.is_empty());
        debug_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(self.postings.last().map_or(true, |p| p.docid < docid));
        self.postings.push(Posting { docid, positions });
    }

    /// Document frequency: the number of postings.
    pub fn df(&self) -> u32 {
        self.postings.len() as u32
    }

    /// Collection term frequency: total positions across all postings.
    pub fn ctf(&self) -> u64 {
        self.postings.iter().map(|p| p.positions.len() as u64).sum()
    }

    /// Whether the list holds no postings.
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Posting for `docid`, if present.
    pub fn posting_for(&self, docid: u32) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&docid, |p| p.docid)
            .ok()
            .map(|i| &self.postings[i])
    }
}
