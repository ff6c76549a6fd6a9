//! Scoring query operators.
//!
//! Each node is both a matcher (a lazy iterator over candidate docids in
//! ascending order) and a scorer, dispatching exhaustively over the
//! retrieval model. `Score` wraps a single positional operator; the
//! composites own scoring children. Under Indri every composite asks
//! non-matching children for a *default score* (the smoothed background
//! probability), so missing-term posteriors stay comparable across
//! documents; `And` therefore matches by union under Indri and by strict
//! intersection under the other models.

use crate::index::Index;
use crate::model::{
    bm25_rsj, bm25_tf_weight, bm25_user_weight, collection_prior, indri_smoothed_p, RetrievalModel,
};
use crate::positional::Iop;
use crate::Error;

/// A scoring operator node.
#[derive(Debug)]
pub enum Sop {
    /// Scores its sole positional child.
    Score(ScoreNode),
    /// Intersection (union under Indri); min / geometric-mean combination.
    And(GroupNode),
    /// Union; max / noisy-OR combination.
    Or(GroupNode),
    /// Union; sum / arithmetic-mean combination.
    Sum(GroupNode),
    /// Weighted `And`.
    WAnd(WeightedNode),
    /// Weighted `Sum`.
    WSum(WeightedNode),
}

/// `Score` state: the positional child plus document-independent statistics
/// cached at initialize.
#[derive(Debug)]
pub struct ScoreNode {
    iop: Iop,
    avg_doc_len: f64,
    p_mle: f64,
    rsj: f64,
}

/// Unweighted composite state.
#[derive(Debug)]
pub struct GroupNode {
    children: Vec<Sop>,
}

/// Weighted composite state; `weights` parallels `children`.
#[derive(Debug)]
pub struct WeightedNode {
    children: Vec<Sop>,
    weights: Vec<f64>,
    total_weight: f64,
}

impl Sop {
    /// Wrap a positional operator in a `Score` node.
    pub fn score_op(iop: Iop) -> Self {
        Sop::Score(ScoreNode {
            iop,
            avg_doc_len: 0.0,
            p_mle: 0.0,
            rsj: 0.0,
        })
    }

    /// `#AND` over scoring children.
    pub fn and(children: Vec<Sop>) -> Result<Self, Error> {
        Ok(Sop::And(GroupNode::new("AND", children)?))
    }

    /// `#OR` over scoring children.
    pub fn or(children: Vec<Sop>) -> Result<Self, Error> {
        Ok(Sop::Or(GroupNode::new("OR", children)?))
    }

    /// `#SUM` over scoring children.
    pub fn sum(children: Vec<Sop>) -> Result<Self, Error> {
        Ok(Sop::Sum(GroupNode::new("SUM", children)?))
    }

    /// `#WAND` over scoring children with positive weights.
    pub fn wand(weights: Vec<f64>, children: Vec<Sop>) -> Result<Self, Error> {
        Ok(Sop::WAnd(WeightedNode::new("WAND", weights, children)?))
    }

    /// `#WSUM` over scoring children with positive weights.
    pub fn wsum(weights: Vec<f64>, children: Vec<Sop>) -> Result<Self, Error> {
        Ok(Sop::WSum(WeightedNode::new("WSUM", weights, children)?))
    }

    /// Operator name for diagnostics.
    pub fn op_name(&self) -> &'static str {
        match self {
            Sop::Score(_) => "SCORE",
            Sop::And(_) => "AND",
            Sop::Or(_) => "OR",
            Sop::Sum(_) => "SUM",
            Sop::WAnd(_) => "WAND",
            Sop::WSum(_) => "WSUM",
        }
    }

    /// Recursively evaluate positional subtrees and cache per-term
    /// statistics. Must be called exactly once before iteration.
    pub fn initialize(&mut self, index: &Index) -> Result<(), Error> {
        match self {
            Sop::Score(node) => node.initialize(index),
            Sop::And(node) | Sop::Or(node) | Sop::Sum(node) => {
                for child in &mut node.children {
                    child.initialize(index)?;
                }
                Ok(())
            }
            Sop::WAnd(node) | Sop::WSum(node) => {
                for child in &mut node.children {
                    child.initialize(index)?;
                }
                Ok(())
            }
        }
    }

    /// Whether the operator currently points at a matching document,
    /// advancing children as needed to find one.
    pub fn has_match(&mut self, model: &RetrievalModel) -> bool {
        match self {
            Sop::Score(node) => node.iop.has_match(),
            Sop::And(node) => match model {
                // Defaults must participate, so Indri AND matches by union.
                RetrievalModel::Indri { .. } => has_match_min(&mut node.children, model),
                _ => has_match_all(&mut node.children, model),
            },
            Sop::Or(node) | Sop::Sum(node) => has_match_min(&mut node.children, model),
            Sop::WAnd(node) | Sop::WSum(node) => has_match_min(&mut node.children, model),
        }
    }

    /// The operator's current docid: the child minimum for composites.
    pub fn current_docid(&self) -> Option<u32> {
        match self {
            Sop::Score(node) => node.iop.has_match().then(|| node.iop.current_docid()),
            Sop::And(node) | Sop::Or(node) | Sop::Sum(node) => {
                node.children.iter().filter_map(Sop::current_docid).min()
            }
            Sop::WAnd(node) | Sop::WSum(node) => {
                node.children.iter().filter_map(Sop::current_docid).min()
            }
        }
    }

    /// Advance every descendant past `docid`.
    pub fn advance_past(&mut self, docid: u32) {
        match self {
            Sop::Score(node) => node.iop.advance_past(docid),
            Sop::And(node) | Sop::Or(node) | Sop::Sum(node) => {
                for child in &mut node.children {
                    child.advance_past(docid);
                }
            }
            Sop::WAnd(node) | Sop::WSum(node) => {
                for child in &mut node.children {
                    child.advance_past(docid);
                }
            }
        }
    }

    /// Score the current document under `model`. Asking for a score with no
    /// current match is a programming error.
    pub fn score(&mut self, index: &Index, model: &RetrievalModel) -> Result<f64, Error> {
        let Some(docid) = self.current_docid() else {
            return Err(Error::ScoringInvariantViolated { op: self.op_name() });
        };
        match self {
            Sop::Score(node) => node.score(index, model),
            Sop::And(node) => score_and(&mut node.children, index, model, docid),
            Sop::Or(node) => score_or(&mut node.children, index, model, docid),
            Sop::Sum(node) => score_sum(&mut node.children, index, model, docid),
            Sop::WAnd(node) => score_wand(node, index, model, docid),
            Sop::WSum(node) => score_wsum(node, index, model, docid),
        }
    }

    /// Background score for a document this operator does not match. Only
    /// Indri defines defaults for every operator; under the other models the
    /// union composites answer 0.0 and the AND forms have no defined value.
    pub fn default_score(
        &mut self,
        index: &Index,
        model: &RetrievalModel,
        docid: u32,
    ) -> Result<f64, Error> {
        if !matches!(model, RetrievalModel::Indri { .. }) {
            return match self {
                Sop::Score(_) | Sop::Or(_) | Sop::Sum(_) | Sop::WSum(_) => Ok(0.0),
                Sop::And(_) | Sop::WAnd(_) => Err(Error::UnsupportedOperator {
                    model: model.name(),
                    op: self.op_name(),
                }),
            };
        }
        match self {
            Sop::Score(node) => node.default_score(index, model, docid),
            // The Indri composites already combine score-or-default per
            // child, so the default is the same combination at `docid`.
            Sop::And(node) => score_and(&mut node.children, index, model, docid),
            Sop::Or(node) => score_or(&mut node.children, index, model, docid),
            Sop::Sum(node) => score_sum(&mut node.children, index, model, docid),
            Sop::WAnd(node) => score_wand(node, index, model, docid),
            Sop::WSum(node) => score_wsum(node, index, model, docid),
        }
    }

    fn matches(&mut self, model: &RetrievalModel, docid: u32) -> bool {
        self.has_match(model) && self.current_docid() == Some(docid)
    }
}

impl GroupNode {
    fn new(op: &'static str, children: Vec<Sop>) -> Result<Self, Error> {
        if children.is_empty() {
            return Err(Error::QueryParse(format!(
                "{op} operator needs at least one argument"
            )));
        }
        Ok(Self { children })
    }
}

impl WeightedNode {
    fn new(op: &'static str, weights: Vec<f64>, children: Vec<Sop>) -> Result<Self, Error> {
        if children.is_empty() {
            return Err(Error::QueryParse(format!(
                "{op} operator needs at least one argument"
            )));
        }
        if weights.len() != children.len() {
            return Err(Error::QueryParse(format!(
                "{op} operator has {} weights for {} arguments",
                weights.len(),
                children.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(Error::QueryParse(format!(
                "{op} operator weights must be positive"
            )));
        }
        let total_weight = weights.iter().sum();
        Ok(Self {
            children,
            weights,
            total_weight,
        })
    }
}

impl ScoreNode {
    fn initialize(&mut self, index: &Index) -> Result<(), Error> {
        self.iop.initialize(index)?;
        let field = self.iop.field();
        let doc_count = index.doc_count(field)? as f64;
        let total_len = index.sum_of_field_lengths(field)?;
        self.avg_doc_len = if doc_count > 0.0 {
            total_len as f64 / doc_count
        } else {
            0.0
        };
        // Statistics come from the synthesized list, so NEAR/WINDOW/SYN
        // patterns smooth against their own collection frequency.
        self.p_mle = collection_prior(self.iop.ctf(), total_len);
        self.rsj = bm25_rsj(index.num_docs() as f64, self.iop.df() as f64);
        Ok(())
    }

    fn score(&self, index: &Index, model: &RetrievalModel) -> Result<f64, Error> {
        let docid = self.iop.current_docid();
        let tf = self.iop.tf_of_doc() as f64;
        match *model {
            RetrievalModel::UnrankedBoolean => Ok(1.0),
            RetrievalModel::RankedBoolean => Ok(tf),
            RetrievalModel::Bm25 { k1, b, k3 } => {
                let doc_len = index.field_length(self.iop.field(), docid)? as f64;
                Ok(self.rsj
                    * bm25_tf_weight(tf, doc_len, self.avg_doc_len, k1, b)
                    * bm25_user_weight(k3, 1.0))
            }
            RetrievalModel::Indri { mu, lambda } => {
                let doc_len = index.field_length(self.iop.field(), docid)? as f64;
                Ok(indri_smoothed_p(tf, doc_len, mu, lambda, self.p_mle))
            }
        }
    }

    fn default_score(
        &self,
        index: &Index,
        model: &RetrievalModel,
        docid: u32,
    ) -> Result<f64, Error> {
        match *model {
            RetrievalModel::Indri { mu, lambda } => {
                let doc_len = index.field_length(self.iop.field(), docid)? as f64;
                Ok(indri_smoothed_p(0.0, doc_len, mu, lambda, self.p_mle))
            }
            _ => Ok(0.0),
        }
    }
}

/// True when every child matches one common docid, advancing the minimum
/// children until they align or one is exhausted.
fn has_match_all(children: &mut [Sop], model: &RetrievalModel) -> bool {
    loop {
        let mut min = u32::MAX;
        let mut max = 0u32;
        for child in children.iter_mut() {
            if !child.has_match(model) {
                return false;
            }
            let Some(docid) = child.current_docid() else {
                return false;
            };
            min = min.min(docid);
            max = max.max(docid);
        }
        if min == max {
            return true;
        }
        for child in children.iter_mut() {
            if child.current_docid() == Some(min) {
                child.advance_past(min);
            }
        }
    }
}

/// True when at least one child matches.
fn has_match_min(children: &mut [Sop], model: &RetrievalModel) -> bool {
    children.iter_mut().any(|c| c.has_match(model))
}

fn score_or_default(
    child: &mut Sop,
    index: &Index,
    model: &RetrievalModel,
    docid: u32,
) -> Result<f64, Error> {
    if child.matches(model, docid) {
        child.score(index, model)
    } else {
        child.default_score(index, model, docid)
    }
}

fn score_and(
    children: &mut [Sop],
    index: &Index,
    model: &RetrievalModel,
    docid: u32,
) -> Result<f64, Error> {
    match *model {
        RetrievalModel::UnrankedBoolean => Ok(1.0),
        RetrievalModel::RankedBoolean => {
            // Children are aligned on the match docid; AND takes the minimum.
            let mut score = f64::INFINITY;
            for child in children.iter_mut() {
                score = score.min(child.score(index, model)?);
            }
            Ok(score)
        }
        RetrievalModel::Bm25 { .. } => {
            let mut score = 0.0;
            for child in children.iter_mut() {
                score += child.score(index, model)?;
            }
            Ok(score)
        }
        RetrievalModel::Indri { .. } => {
            let exponent = 1.0 / children.len() as f64;
            let mut score = 1.0;
            for child in children.iter_mut() {
                score *= score_or_default(child, index, model, docid)?.powf(exponent);
            }
            Ok(score)
        }
    }
}

fn score_or(
    children: &mut [Sop],
    index: &Index,
    model: &RetrievalModel,
    docid: u32,
) -> Result<f64, Error> {
    match *model {
        RetrievalModel::UnrankedBoolean => Ok(1.0),
        RetrievalModel::RankedBoolean | RetrievalModel::Bm25 { .. } => {
            let mut score = 0.0;
            for child in children.iter_mut() {
                if child.matches(model, docid) {
                    score = f64::max(score, child.score(index, model)?);
                }
            }
            Ok(score)
        }
        RetrievalModel::Indri { .. } => {
            let mut miss = 1.0;
            for child in children.iter_mut() {
                miss *= 1.0 - score_or_default(child, index, model, docid)?;
            }
            Ok(1.0 - miss)
        }
    }
}

fn score_sum(
    children: &mut [Sop],
    index: &Index,
    model: &RetrievalModel,
    docid: u32,
) -> Result<f64, Error> {
    match *model {
        RetrievalModel::UnrankedBoolean => Ok(1.0),
        RetrievalModel::RankedBoolean | RetrievalModel::Bm25 { .. } => {
            let mut score = 0.0;
            for child in children.iter_mut() {
                if child.matches(model, docid) {
                    score += child.score(index, model)?;
                }
            }
            Ok(score)
        }
        RetrievalModel::Indri { .. } => {
            let weight = 1.0 / children.len() as f64;
            let mut score = 0.0;
            for child in children.iter_mut() {
                score += weight * score_or_default(child, index, model, docid)?;
            }
            Ok(score)
        }
    }
}

fn score_wand(
    node: &mut WeightedNode,
    index: &Index,
    model: &RetrievalModel,
    docid: u32,
) -> Result<f64, Error> {
    match *model {
        RetrievalModel::UnrankedBoolean => Ok(1.0),
        RetrievalModel::RankedBoolean => {
            let mut score = 0.0;
            for (child, &weight) in node.children.iter_mut().zip(&node.weights) {
                if child.matches(model, docid) {
                    score += weight * child.score(index, model)?;
                }
            }
            Ok(score)
        }
        RetrievalModel::Bm25 { k3, .. } => {
            // Matching children only; the user weight carries the query
            // weight, no zero short-circuit.
            let mut score = 0.0;
            for (child, &weight) in node.children.iter_mut().zip(&node.weights) {
                if child.matches(model, docid) {
                    score += child.score(index, model)? * bm25_user_weight(k3, weight);
                }
            }
            Ok(score)
        }
        RetrievalModel::Indri { .. } => {
            let mut score = 1.0;
            for (child, &weight) in node.children.iter_mut().zip(&node.weights) {
                let s = score_or_default(child, index, model, docid)?;
                score *= s.powf(weight / node.total_weight);
            }
            Ok(score)
        }
    }
}

fn score_wsum(
    node: &mut WeightedNode,
    index: &Index,
    model: &RetrievalModel,
    docid: u32,
) -> Result<f64, Error> {
    match *model {
        RetrievalModel::UnrankedBoolean => Ok(1.0),
        RetrievalModel::RankedBoolean => {
            let mut score = 0.0;
            for (child, &weight) in node.children.iter_mut().zip(&node.weights) {
                if child.matches(model, docid) {
                    score += weight * child.score(index, model)?;
                }
            }
            Ok(score)
        }
        RetrievalModel::Bm25 { k3, .. } => {
            let mut score = 0.0;
            for (child, &weight) in node.children.iter_mut().zip(&node.weights) {
                if child.matches(model, docid) {
                    score += child.score(index, model)? * bm25_user_weight(k3, weight);
                }
            }
            Ok(score)
        }
        RetrievalModel::Indri { .. } => {
            let mut score = 0.0;
            for (child, &weight) in node.children.iter_mut().zip(&node.weights) {
                let s = score_or_default(child, index, model, docid)?;
                score += (weight / node.total_weight) * s;
            }
            Ok(score)
        }
    }
}
