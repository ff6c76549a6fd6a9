//! Read-only index facade.
//!
//! The index is a fielded positional image: per (field, term) inverted
//! lists, per (field, doc) lengths, an external↔internal docid mapping, and
//! optional per-document string attributes (spam score, raw URL, PageRank).
//! It is opened once per run from a `postcard`-encoded file and never
//! mutated afterwards; every accessor is a pure read.
//!
//! `IndexBuilder` ingests caller-provided stem streams (tokenization policy
//! is the caller's) and is the seam tests and tooling use to produce index
//! images.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::postings::InvList;
use crate::Error;

#[derive(Debug, Default, Serialize, Deserialize)]
struct FieldIndex {
    // term -> inverted list, docid ascending.
    postings: BTreeMap<String, InvList>,
    // docid -> length in stems; absent means the doc has no such field.
    doc_len: HashMap<u32, u32>,
    total_len: u64,
}

/// A fielded positional inverted index, read-only after open.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Index {
    fields: HashMap<String, FieldIndex>,
    external_ids: Vec<String>,
    external_to_internal: HashMap<String, u32>,
    // attribute name -> docid -> value
    attributes: HashMap<String, HashMap<u32, String>>,
}

impl Index {
    /// Open an index image from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let unavailable = |reason: String| Error::IndexUnavailable {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|e| unavailable(e.to_string()))?;
        postcard::from_bytes(&bytes).map_err(|e| unavailable(format!("undecodable image: {e}")))
    }

    /// Write the index image to disk (test and tooling seam).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let bytes = postcard::to_allocvec(self).map_err(|e| {
            Error::Io(std::io::Error::other(format!("encode index image: {e}")))
        })?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Start building an index from stem streams.
    pub fn builder() -> IndexBuilder {
        IndexBuilder::default()
    }

    /// Total number of documents.
    pub fn num_docs(&self) -> u32 {
        self.external_ids.len() as u32
    }

    fn field(&self, field: &str) -> Result<&FieldIndex, Error> {
        self.fields
            .get(field)
            .ok_or_else(|| Error::UnknownField(field.to_string()))
    }

    fn check_docid(&self, docid: u32) -> Result<(), Error> {
        if (docid as usize) < self.external_ids.len() {
            Ok(())
        } else {
            Err(Error::UnknownDocid(docid))
        }
    }

    /// Number of documents with a non-empty `field`.
    pub fn doc_count(&self, field: &str) -> Result<u32, Error> {
        Ok(self.field(field)?.doc_len.len() as u32)
    }

    /// Sum of `field` lengths over the corpus.
    pub fn sum_of_field_lengths(&self, field: &str) -> Result<u64, Error> {
        Ok(self.field(field)?.total_len)
    }

    /// Length of `field` in `docid`, in stems. Zero when the document has no
    /// such field.
    pub fn field_length(&self, field: &str, docid: u32) -> Result<u32, Error> {
        self.check_docid(docid)?;
        Ok(self.field(field)?.doc_len.get(&docid).copied().unwrap_or(0))
    }

    /// Document frequency of `term` in `field`.
    pub fn doc_freq(&self, field: &str, term: &str) -> Result<u32, Error> {
        Ok(self.field(field)?.postings.get(term).map_or(0, InvList::df))
    }

    /// Collection term frequency of `term` in `field`.
    pub fn total_term_freq(&self, field: &str, term: &str) -> Result<u64, Error> {
        Ok(self.field(field)?.postings.get(term).map_or(0, InvList::ctf))
    }

    /// Internal docid for an external document id.
    pub fn internal_docid(&self, external: &str) -> Result<u32, Error> {
        self.external_to_internal
            .get(external)
            .copied()
            .ok_or_else(|| Error::UnknownExternalDocid(external.to_string()))
    }

    /// External document id for an internal docid.
    pub fn external_docid(&self, docid: u32) -> Result<&str, Error> {
        self.external_ids
            .get(docid as usize)
            .map(String::as_str)
            .ok_or(Error::UnknownDocid(docid))
    }

    /// Per-document attribute (e.g. `spamScore`, `rawUrl`, `PageRank`).
    pub fn attribute(&self, name: &str, docid: u32) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|by_doc| by_doc.get(&docid))
            .map(String::as_str)
    }

    /// Inverted list for `(field, term)`. An unknown term yields an empty
    /// list, not an error.
    pub fn postings(&self, field: &str, term: &str) -> Result<InvList, Error> {
        let fx = self.field(field)?;
        Ok(fx
            .postings
            .get(term)
            .cloned()
            .unwrap_or_else(|| InvList::new(field)))
    }

    /// Term vector for `(docid, field)`: the distinct stems of the document
    /// with their document and collection frequencies, plus the stem index
    /// occupying each token position. Stem index 0 is reserved.
    pub fn term_vector(&self, docid: u32, field: &str) -> Result<TermVector, Error> {
        self.check_docid(docid)?;
        let fx = self.field(field)?;
        let len = fx.doc_len.get(&docid).copied().unwrap_or(0) as usize;

        let mut stems = vec![String::new()];
        let mut stem_freq = vec![0u32];
        let mut total_stem_freq = vec![0u64];
        let mut positions = vec![0u32; len];

        // BTreeMap iteration keeps the stems[] ordering stable across runs.
        for (term, list) in &fx.postings {
            let Some(posting) = list.posting_for(docid) else {
                continue;
            };
            let stem_index = stems.len() as u32;
            stems.push(term.clone());
            stem_freq.push(posting.tf());
            total_stem_freq.push(list.ctf());
            for &pos in &posting.positions {
                positions[pos as usize] = stem_index;
            }
        }

        Ok(TermVector {
            stems,
            stem_freq,
            total_stem_freq,
            positions,
        })
    }
}

/// The distinct stems of one (document, field) with parallel statistics.
#[derive(Debug, Clone)]
pub struct TermVector {
    stems: Vec<String>,
    stem_freq: Vec<u32>,
    total_stem_freq: Vec<u64>,
    positions: Vec<u32>,
}

impl TermVector {
    /// Number of stem slots, including the reserved slot 0.
    pub fn stems_len(&self) -> usize {
        self.stems.len()
    }

    /// Stem string for `stem_index` (slot 0 is empty).
    pub fn stem(&self, stem_index: usize) -> &str {
        &self.stems[stem_index]
    }

    /// Term frequency of the stem at `stem_index` within the document.
    pub fn stem_freq(&self, stem_index: usize) -> u32 {
        self.stem_freq[stem_index]
    }

    /// Collection term frequency of the stem at `stem_index`.
    pub fn total_stem_freq(&self, stem_index: usize) -> u64 {
        self.total_stem_freq[stem_index]
    }

    /// Stem index occupying each token position.
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    /// Iterate `(stem, tf, ctf)` over the real stems (slot 0 skipped).
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32, u64)> + '_ {
        (1..self.stems.len())
            .map(move |i| (self.stems[i].as_str(), self.stem_freq[i], self.total_stem_freq[i]))
    }
}

/// Builds an [`Index`] from caller-provided stem streams.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    index: Index,
}

impl IndexBuilder {
    /// Add a document with its per-field stem streams. Returns the internal
    /// docid. Re-adding an external id replaces nothing; ids must be fresh.
    pub fn add_document(&mut self, external_id: &str, fields: &[(&str, &[&str])]) -> u32 {
        let docid = self.index.external_ids.len() as u32;
        self.index.external_ids.push(external_id.to_string());
        self.index
            .external_to_internal
            .insert(external_id.to_string(), docid);

        for (field, stems) in fields {
            let fx = self.index.fields.entry(field.to_string()).or_default();
            fx.doc_len.insert(docid, stems.len() as u32);
            fx.total_len += stems.len() as u64;

            let mut by_term: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
            for (pos, stem) in stems.iter().enumerate() {
                by_term.entry(stem).or_default().push(pos as u32);
            }
            for (term, positions) in by_term {
                fx.postings
                    .entry(term.to_string())
                    .or_insert_with(|| InvList::new(field))
                    .append_posting(docid, positions);
            }
        }
        docid
    }

    /// Attach a string attribute to a document.
    pub fn set_attribute(&mut self, docid: u32, name: &str, value: &str) {
        self.index
            .attributes
            .entry(name.to_string())
            .or_default()
            .insert(docid, value.to_string());
    }

    /// Finish building.
    pub fn build(self) -> Index {
        self.index
    }
}
