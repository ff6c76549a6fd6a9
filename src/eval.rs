//! Score lists and the query evaluation loop.

use std::time::Instant;

use crate::index::Index;
use crate::model::RetrievalModel;
use crate::parse;
use crate::Error;

/// One ranked document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEntry {
    /// Internal document id.
    pub docid: u32,
    /// Document score under the evaluating model.
    pub score: f64,
}

/// An ordered list of `(docid, score)` pairs.
///
/// Built empty, appended during iteration, then sorted once and truncated
/// once: score descending, ties broken by external docid ascending.
#[derive(Debug, Clone, Default)]
pub struct ScoreList {
    entries: Vec<ScoreEntry>,
}

impl ScoreList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one document.
    pub fn add(&mut self, docid: u32, score: f64) {
        self.entries.push(ScoreEntry { docid, score });
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries in their current order.
    pub fn entries(&self) -> &[ScoreEntry] {
        &self.entries
    }

    /// Sort by score descending, breaking ties by external docid ascending.
    pub fn sort(&mut self, index: &Index) -> Result<(), Error> {
        let mut keyed: Vec<(String, ScoreEntry)> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            keyed.push((index.external_docid(entry.docid)?.to_string(), entry));
        }
        keyed.sort_by(|a, b| {
            b.1.score
                .total_cmp(&a.1.score)
                .then_with(|| a.0.cmp(&b.0))
        });
        self.entries = keyed.into_iter().map(|(_, entry)| entry).collect();
        Ok(())
    }

    /// Keep only the first `n` entries.
    pub fn truncate(&mut self, n: usize) {
        self.entries.truncate(n);
    }
}

/// Evaluate `qstring` under `model`, returning the top `top_n` documents.
///
/// The query is wrapped in the model's default operator, parsed, initialized
/// (materializing positional subtrees), drained, sorted and truncated. An
/// empty query yields an empty list.
pub fn process_query(
    index: &Index,
    qstring: &str,
    top_n: usize,
    model: &RetrievalModel,
) -> Result<ScoreList, Error> {
    process_query_with_deadline(index, qstring, top_n, model, None)
}

/// [`process_query`] with a cooperative deadline: when it expires between a
/// match and its score, the partial list collected so far is sorted,
/// truncated and returned.
pub fn process_query_with_deadline(
    index: &Index,
    qstring: &str,
    top_n: usize,
    model: &RetrievalModel,
    deadline: Option<Instant>,
) -> Result<ScoreList, Error> {
    let mut results = ScoreList::new();
    if qstring.trim().is_empty() {
        return Ok(results);
    }

    let wrapped = format!("{} ( {} )", model.default_qry_sop_name(), qstring);
    let mut root = parse::parse_query(&wrapped)?;
    root.initialize(index)?;

    while root.has_match(model) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::warn!("query deadline expired after {} documents", results.len());
            break;
        }
        let Some(docid) = root.current_docid() else {
            break;
        };
        let score = root.score(index, model)?;
        results.add(docid, score);
        root.advance_past(docid);
    }

    results.sort(index)?;
    results.truncate(top_n);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> Index {
        let mut b = Index::builder();
        b.add_document("z-last", &[("body", &["tie", "a"][..])]);
        b.add_document("a-first", &[("body", &["tie", "b"][..])]);
        b.add_document("m-mid", &[("body", &["other"][..])]);
        b.build()
    }

    #[test]
    fn ties_break_by_external_docid_ascending() {
        let ix = index();
        let results =
            process_query(&ix, "tie", 10, &RetrievalModel::UnrankedBoolean).unwrap();
        let docids: Vec<u32> = results.entries().iter().map(|e| e.docid).collect();
        // Both docs score 1.0; "a-first" sorts before "z-last".
        assert_eq!(docids, vec![1, 0]);
    }

    #[test]
    fn sort_then_truncate_is_idempotent() {
        let ix = index();
        let mut list = ScoreList::new();
        list.add(0, 0.25);
        list.add(1, 0.5);
        list.add(2, 0.125);
        list.sort(&ix).unwrap();
        list.truncate(2);
        let once: Vec<ScoreEntry> = list.entries().to_vec();
        list.sort(&ix).unwrap();
        list.truncate(2);
        assert_eq!(list.entries(), once.as_slice());
    }

    #[test]
    fn empty_query_yields_empty_list() {
        let ix = index();
        let results =
            process_query(&ix, "   ", 10, &RetrievalModel::UnrankedBoolean).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn expired_deadline_returns_partial_results() {
        let ix = index();
        let past = Instant::now() - std::time::Duration::from_millis(1);
        let results = process_query_with_deadline(
            &ix,
            "tie",
            10,
            &RetrievalModel::UnrankedBoolean,
            Some(past),
        )
        .unwrap();
        assert!(results.is_empty());
    }
}
