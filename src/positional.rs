//! Positional query operators.
//!
//! `Term`, `Syn`, `Near/k` and `Window/k` all evaluate eagerly at
//! `initialize`, synthesizing an inverted list that the operator owns for
//! the query's lifetime, and then expose the shared cursor contract over it
//! (`has_match` / `current_docid` / `current_posting` / `advance_past`).
//! Children are exclusively owned; trees are built bottom-up.

use crate::index::Index;
use crate::postings::{InvList, Posting};
use crate::Error;

/// Positional operator kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IopKind {
    /// A single index term.
    Term {
        /// The stem to look up.
        term: String,
    },
    /// Synonym union: min-docid merge, position sets merged and deduplicated.
    Syn,
    /// Ordered proximity: children in order, adjacent gaps within `distance`.
    Near {
        /// Maximum gap between adjacent children, in tokens.
        distance: u32,
    },
    /// Unordered window: all children within a span of `distance` tokens.
    Window {
        /// Window width in tokens (span must be strictly smaller).
        distance: u32,
    },
}

impl IopKind {
    fn name(&self) -> &'static str {
        match self {
            IopKind::Term { .. } => "TERM",
            IopKind::Syn => "SYN",
            IopKind::Near { .. } => "NEAR",
            IopKind::Window { .. } => "WINDOW",
        }
    }
}

/// A positional operator node: a matcher over a synthesized inverted list.
#[derive(Debug)]
pub struct Iop {
    kind: IopKind,
    field: String,
    children: Vec<Iop>,
    list: InvList,
    cursor: usize,
}

impl Iop {
    /// A term leaf on `field`.
    pub fn term(term: &str, field: &str) -> Self {
        Self {
            kind: IopKind::Term {
                term: term.to_string(),
            },
            field: field.to_string(),
            children: Vec::new(),
            list: InvList::new(field),
            cursor: 0,
        }
    }

    /// Synonym union of `children`.
    pub fn syn(children: Vec<Iop>) -> Result<Self, Error> {
        Self::composite(IopKind::Syn, children)
    }

    /// Ordered `#NEAR/distance` over `children`.
    pub fn near(distance: u32, children: Vec<Iop>) -> Result<Self, Error> {
        Self::composite(IopKind::Near { distance }, children)
    }

    /// Unordered `#WINDOW/distance` over `children`.
    pub fn window(distance: u32, children: Vec<Iop>) -> Result<Self, Error> {
        Self::composite(IopKind::Window { distance }, children)
    }

    fn composite(kind: IopKind, children: Vec<Iop>) -> Result<Self, Error> {
        let Some(first) = children.first() else {
            return Err(Error::QueryParse(format!(
                "{} operator needs at least one argument",
                kind.name()
            )));
        };
        let field = first.field.clone();
        if let Some(other) = children.iter().find(|c| c.field != field) {
            return Err(Error::QueryParse(format!(
                "{} operator mixes fields {} and {}",
                kind.name(),
                field,
                other.field
            )));
        }
        Ok(Self {
            kind,
            list: InvList::new(&field),
            field,
            children,
            cursor: 0,
        })
    }

    /// The common field of this operator and its children.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Evaluate the operator bottom-up, materializing its inverted list.
    pub fn initialize(&mut self, index: &Index) -> Result<(), Error> {
        for child in &mut self.children {
            child.initialize(index)?;
        }
        self.list = match &self.kind {
            IopKind::Term { term } => index.postings(&self.field, term)?,
            IopKind::Syn => eval_syn(&self.field, &mut self.children),
            IopKind::Near { distance } => eval_near(&self.field, &mut self.children, *distance),
            IopKind::Window { distance } => eval_window(&self.field, &mut self.children, *distance),
        };
        self.cursor = 0;
        Ok(())
    }

    /// Whether the cursor points at a posting.
    pub fn has_match(&self) -> bool {
        self.cursor < self.list.postings.len()
    }

    /// Docid under the cursor. Precondition: `has_match()`.
    pub fn current_docid(&self) -> u32 {
        self.list.postings[self.cursor].docid
    }

    /// Posting under the cursor. Precondition: `has_match()`.
    pub fn current_posting(&self) -> &Posting {
        &self.list.postings[self.cursor]
    }

    /// Move the cursor to the first posting with docid strictly greater
    /// than `docid` (no-op when already beyond it).
    pub fn advance_past(&mut self, docid: u32) {
        self.cursor += self.list.postings[self.cursor..].partition_point(|p| p.docid <= docid);
    }

    /// Term frequency of the current posting. Precondition: `has_match()`.
    pub fn tf_of_doc(&self) -> u32 {
        self.current_posting().tf()
    }

    /// Collection term frequency of the synthesized list.
    pub fn ctf(&self) -> u64 {
        self.list.ctf()
    }

    /// Document frequency of the synthesized list.
    pub fn df(&self) -> u32 {
        self.list.df()
    }
}

/// Advance the minimum-docid children until all share a docid. Returns that
/// docid, or `None` once any child is exhausted.
fn next_common_docid(children: &mut [Iop]) -> Option<u32> {
    loop {
        let mut min = u32::MAX;
        let mut max = 0u32;
        for child in children.iter() {
            if !child.has_match() {
                return None;
            }
            let docid = child.current_docid();
            min = min.min(docid);
            max = max.max(docid);
        }
        if min == max {
            return Some(min);
        }
        for child in children.iter_mut() {
            if child.has_match() && child.current_docid() == min {
                child.advance_past(min);
            }
        }
    }
}

fn eval_syn(field: &str, children: &mut [Iop]) -> InvList {
    let mut list = InvList::new(field);
    loop {
        // Union semantics: the next docid is the minimum over live children.
        let Some(docid) = children
            .iter()
            .filter(|c| c.has_match())
            .map(Iop::current_docid)
            .min()
        else {
            return list;
        };
        let mut positions: Vec<u32> = Vec::new();
        for child in children.iter() {
            if child.has_match() && child.current_docid() == docid {
                positions.extend_from_slice(&child.current_posting().positions);
            }
        }
        positions.sort_unstable();
        positions.dedup();
        list.append_posting(docid, positions);
        for child in children.iter_mut() {
            child.advance_past(docid);
        }
    }
}

fn eval_near(field: &str, children: &mut [Iop], distance: u32) -> InvList {
    let mut list = InvList::new(field);
    while let Some(docid) = next_common_docid(children) {
        let postings: Vec<&Posting> = children.iter().map(Iop::current_posting).collect();
        let n = postings.len();
        let mut cursors = vec![0usize; n];
        let mut matches: Vec<u32> = Vec::new();

        'doc: loop {
            let first = &postings[0].positions;
            if cursors[0] >= first.len() {
                break;
            }
            // Walk left to right, each child strictly after the previous.
            let mut prev = first[cursors[0]];
            for i in 1..n {
                let positions = &postings[i].positions;
                cursors[i] += positions[cursors[i]..].partition_point(|&p| p <= prev);
                if cursors[i] >= positions.len() {
                    break 'doc;
                }
                prev = positions[cursors[i]];
            }
            // Adjacent gaps must all fit within the distance.
            let mut prev = first[cursors[0]];
            let mut within = true;
            for i in 1..n {
                let cur = postings[i].positions[cursors[i]];
                if cur - prev > distance {
                    within = false;
                    break;
                }
                prev = cur;
            }
            if within {
                // Emit the rightmost position and consume one from each child.
                matches.push(prev);
                for cursor in cursors.iter_mut() {
                    *cursor += 1;
                }
            } else {
                cursors[0] += 1;
            }
        }

        if !matches.is_empty() {
            list.append_posting(docid, matches);
        }
        for child in children.iter_mut() {
            child.advance_past(docid);
        }
    }
    list
}

fn eval_window(field: &str, children: &mut [Iop], distance: u32) -> InvList {
    let mut list = InvList::new(field);
    while let Some(docid) = next_common_docid(children) {
        let postings: Vec<&Posting> = children.iter().map(Iop::current_posting).collect();
        let n = postings.len();
        let mut cursors = vec![0usize; n];
        let mut matches: Vec<u32> = Vec::new();

        while cursors
            .iter()
            .zip(&postings)
            .all(|(&c, p)| c < p.positions.len())
        {
            let mut pmin = u32::MAX;
            let mut pmax = 0u32;
            for i in 0..n {
                let pos = postings[i].positions[cursors[i]];
                pmin = pmin.min(pos);
                pmax = pmax.max(pos);
            }
            if pmax - pmin < distance {
                matches.push(pmax);
                for cursor in cursors.iter_mut() {
                    *cursor += 1;
                }
            } else {
                for i in 0..n {
                    if postings[i].positions[cursors[i]] == pmin {
                        cursors[i] += 1;
                    }
                }
            }
        }

        if !matches.is_empty() {
            list.append_posting(docid, matches);
        }
        for child in children.iter_mut() {
            child.advance_past(docid);
        }
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;
    use proptest::prelude::*;

    fn index_from_bodies(bodies: &[&[&str]]) -> Index {
        let mut b = Index::builder();
        for (i, stems) in bodies.iter().enumerate() {
            b.add_document(&format!("doc{i}"), &[("body", *stems)]);
        }
        b.build()
    }

    fn initialized(mut iop: Iop, index: &Index) -> Iop {
        iop.initialize(index).unwrap();
        iop
    }

    fn drain(iop: &mut Iop) -> Vec<(u32, Vec<u32>)> {
        let mut out = Vec::new();
        while iop.has_match() {
            let p = iop.current_posting();
            out.push((p.docid, p.positions.clone()));
            let docid = p.docid;
            iop.advance_past(docid);
        }
        out
    }

    #[test]
    fn term_reads_index_postings() {
        let ix = index_from_bodies(&[&["a", "b", "a"], &["b"]]);
        let mut t = initialized(Iop::term("a", "body"), &ix);
        assert_eq!(drain(&mut t), vec![(0, vec![0, 2])]);
        assert_eq!(t.df(), 1);
        assert_eq!(t.ctf(), 2);
    }

    #[test]
    fn syn_merges_unions_and_dedups() {
        let ix = index_from_bodies(&[&["a", "b"], &["b"], &["c"]]);
        let syn = Iop::syn(vec![Iop::term("a", "body"), Iop::term("b", "body")]).unwrap();
        let mut syn = initialized(syn, &ix);
        assert_eq!(drain(&mut syn), vec![(0, vec![0, 1]), (1, vec![0])]);
    }

    #[test]
    fn near_emits_rightmost_and_advances_all() {
        // A at [1,10,20], B at [2,15,21]: #NEAR/2 yields [2, 21].
        let ix = index_from_bodies(&[&[
            "x", "a", "b", "x", "x", "x", "x", "x", "x", "x", // 0..=9
            "a", "x", "x", "x", "x", "b", "x", "x", "x", "x", // 10..=19
            "a", "b",
        ]]);
        let near = Iop::near(2, vec![Iop::term("a", "body"), Iop::term("b", "body")]).unwrap();
        let mut near = initialized(near, &ix);
        assert_eq!(drain(&mut near), vec![(0, vec![2, 21])]);
    }

    #[test]
    fn near_requires_order() {
        let ix = index_from_bodies(&[&["b", "a"]]);
        let near = Iop::near(3, vec![Iop::term("a", "body"), Iop::term("b", "body")]).unwrap();
        let mut near = initialized(near, &ix);
        assert!(drain(&mut near).is_empty());
    }

    #[test]
    fn window_spans_are_strict() {
        // A at [5,30], B at [6,29]: #WINDOW/3 yields [6, 30].
        let mut body = vec!["x"; 31];
        body[5] = "a";
        body[30] = "a";
        body[6] = "b";
        body[29] = "b";
        let ix = index_from_bodies(&[&body]);
        let win = Iop::window(3, vec![Iop::term("a", "body"), Iop::term("b", "body")]).unwrap();
        let mut win = initialized(win, &ix);
        assert_eq!(drain(&mut win), vec![(0, vec![6, 30])]);

        // The same placement under #WINDOW/1 has no span of width < 1.
        let win = Iop::window(1, vec![Iop::term("a", "body"), Iop::term("b", "body")]).unwrap();
        let mut win = initialized(win, &ix);
        assert!(drain(&mut win).is_empty());
    }

    #[test]
    fn composite_rejects_mixed_fields() {
        let err = Iop::near(2, vec![Iop::term("a", "body"), Iop::term("a", "title")]);
        assert!(matches!(err, Err(crate::Error::QueryParse(_))));
    }

    #[test]
    fn advance_past_is_a_noop_beyond_target() {
        let ix = index_from_bodies(&[&["a"], &["a"], &["a"]]);
        let mut t = initialized(Iop::term("a", "body"), &ix);
        t.advance_past(1);
        assert_eq!(t.current_docid(), 2);
        t.advance_past(0);
        assert_eq!(t.current_docid(), 2);
    }

    proptest! {
        // Synthesized lists keep strict docid and position ordering no
        // matter how terms are scattered.
        #[test]
        fn synthesized_lists_stay_strictly_ordered(
            docs in prop::collection::vec(
                prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "x"]), 1..30),
                1..12,
            ),
            distance in 1u32..6,
        ) {
            let borrowed: Vec<Vec<&str>> = docs
                .iter()
                .map(|d| d.iter().map(|s| &**s).collect())
                .collect();
            let slices: Vec<&[&str]> = borrowed.iter().map(|d| d.as_slice()).collect();
            let ix = index_from_bodies(&slices);

            let ops: Vec<Iop> = vec![
                Iop::syn(vec![Iop::term("a", "body"), Iop::term("b", "body")]).unwrap(),
                Iop::near(distance, vec![Iop::term("a", "body"), Iop::term("b", "body")]).unwrap(),
                Iop::window(distance, vec![
                    Iop::term("a", "body"),
                    Iop::term("b", "body"),
                    Iop::term("c", "body"),
                ]).unwrap(),
            ];
            for op in ops {
                let mut op = initialized(op, &ix);
                let postings = drain(&mut op);
                prop_assert!(postings.windows(2).all(|w| w[0].0 < w[1].0));
                for (_, positions) in &postings {
                    prop_assert!(!positions.is_empty());
                    prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
                }
            }
        }
    }
}
