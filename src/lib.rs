//! `qeval`: a structured-query retrieval evaluator.
//!
//! A query expression (`#AND`, `#OR`, `#SUM`, `#WAND`, `#WSUM`, `#SYN`,
//! `#NEAR/k`, `#WINDOW/k`, field-qualified terms) is compiled into a tree of
//! iterator-driven operators and evaluated against a fielded positional
//! inverted index, producing a ranked list under one of four retrieval
//! models. On top of the core loop sit pseudo-relevance-feedback query
//! expansion and xQuAD/PM2 result diversification.
//!
//! Scope:
//! - In-memory index image, opened read-only for the run
//! - Deterministic ranking (score desc, then external doc id asc)
//! - Caller-provided stem streams (tokenization policy lives with the caller)
//!
//! Non-goals:
//! - Index construction from raw text (stemming, parsing markup)
//! - Fitting learned ranking models (feature vectors are emitted for
//!   external learners)
//!
//! References:
//! - Robertson & Zaragoza (2009): BM25 and the probabilistic framework
//! - Zhai & Lafferty (2004): language-model smoothing (Dirichlet, JM)
//! - Santos et al. (2010), Dang & Croft (2012): xQuAD and PM2

pub mod diversify;
pub mod eval;
pub mod index;
pub mod ltr;
pub mod model;
pub mod params;
pub mod parse;
pub mod positional;
pub mod postings;
pub mod prf;
pub mod scoring;
pub mod trec;

pub use error::Error;

mod error {
    use std::path::PathBuf;

    /// Errors for query evaluation.
    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        /// A required parameter-file key was absent.
        #[error("missing required parameter: {0}")]
        ParameterMissing(String),
        /// A parameter value failed to parse.
        #[error("malformed parameter {key}: {value}")]
        ParameterMalformed {
            /// Offending key.
            key: String,
            /// Offending value.
            value: String,
        },
        /// The index image could not be opened.
        #[error("index unavailable at {path}: {reason}")]
        IndexUnavailable {
            /// Path that was opened.
            path: PathBuf,
            /// Underlying failure.
            reason: String,
        },
        /// A field name unknown to the index.
        #[error("unknown field: {0}")]
        UnknownField(String),
        /// An internal document id outside the index.
        #[error("unknown document id: {0}")]
        UnknownDocid(u32),
        /// An external document id unknown to the index.
        #[error("unknown external document id: {0}")]
        UnknownExternalDocid(String),
        /// The query expression could not be parsed.
        #[error("query parse error: {0}")]
        QueryParse(String),
        /// A (model, operator) pairing with no defined semantics.
        #[error("{model} does not support the {op} operator")]
        UnsupportedOperator {
            /// Retrieval model name.
            model: &'static str,
            /// Operator name.
            op: &'static str,
        },
        /// A scoring operator was asked to score a document it does not match.
        #[error("{op} operator asked for a score with no current match")]
        ScoringInvariantViolated {
            /// Operator name.
            op: &'static str,
        },
        /// File I/O failure.
        #[error(transparent)]
        Io(#[from] std::io::Error),
    }
}
