//! Result diversification: xQuAD and PM2.
//!
//! Inputs are a baseline ranking for the query plus one ranking per intent.
//! Rankings are truncated to `max_input_rankings_length`, scaled into a
//! common probability range when any score exceeds 1.0, and reordered
//! greedily. Candidates always come from the query baseline; ties on the
//! selection score break deterministically by docid ascending.

use std::collections::HashMap;

use crate::eval::ScoreList;

/// Diversification algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiversityAlgorithm {
    /// Explicit query aspect diversification (Santos et al., 2010).
    XQuad,
    /// Proportionality-based diversification (Dang & Croft, 2012).
    Pm2,
}

/// Diversification configuration.
#[derive(Debug, Clone)]
pub struct DiversityParams {
    /// Algorithm to run.
    pub algorithm: DiversityAlgorithm,
    /// Relevance/diversity trade-off.
    pub lambda: f64,
    /// Input rankings are truncated to this length.
    pub max_input_rankings_length: usize,
    /// Output length cap.
    pub max_result_ranking_length: usize,
}

struct Inputs {
    // Candidates in docid-ascending order, so strict argmax comparisons
    // resolve ties toward the smaller docid.
    candidates: Vec<u32>,
    p_query: HashMap<u32, f64>,
    p_intent: Vec<HashMap<u32, f64>>,
}

impl Inputs {
    fn new(baseline: &ScoreList, intents: &[ScoreList], params: &DiversityParams) -> Self {
        let take = params.max_input_rankings_length;
        let base: Vec<(u32, f64)> = baseline
            .entries()
            .iter()
            .take(take)
            .map(|e| (e.docid, e.score))
            .collect();
        let intent_lists: Vec<Vec<(u32, f64)>> = intents
            .iter()
            .map(|r| {
                r.entries()
                    .iter()
                    .take(take)
                    .map(|e| (e.docid, e.score))
                    .collect()
            })
            .collect();

        // Scores already in [0,1] are used as-is; otherwise every list is
        // scaled by the largest column sum to a common range.
        let any_above_one = base
            .iter()
            .chain(intent_lists.iter().flatten())
            .any(|&(_, s)| s > 1.0);
        let mut scale = 1.0;
        if any_above_one {
            let column_sum = |list: &[(u32, f64)]| list.iter().map(|&(_, s)| s).sum::<f64>();
            let largest = std::iter::once(column_sum(&base))
                .chain(intent_lists.iter().map(|l| column_sum(l)))
                .fold(0.0_f64, f64::max);
            if largest > 0.0 {
                scale = largest;
            }
        }

        let mut candidates: Vec<u32> = base.iter().map(|&(d, _)| d).collect();
        candidates.sort_unstable();
        Self {
            candidates,
            p_query: base.iter().map(|&(d, s)| (d, s / scale)).collect(),
            p_intent: intent_lists
                .iter()
                .map(|l| l.iter().map(|&(d, s)| (d, s / scale)).collect())
                .collect(),
        }
    }

    fn p_query(&self, docid: u32) -> f64 {
        self.p_query.get(&docid).copied().unwrap_or(0.0)
    }

    fn p_intent(&self, intent: usize, docid: u32) -> f64 {
        self.p_intent[intent].get(&docid).copied().unwrap_or(0.0)
    }
}

/// Reorder `baseline` for diversity across `intents`.
pub fn diversify(
    baseline: &ScoreList,
    intents: &[ScoreList],
    params: &DiversityParams,
) -> ScoreList {
    let inputs = Inputs::new(baseline, intents, params);
    let picked = match params.algorithm {
        DiversityAlgorithm::XQuad => xquad(&inputs, params),
        DiversityAlgorithm::Pm2 => pm2(&inputs, params),
    };
    let mut out = ScoreList::new();
    for (docid, score) in picked {
        out.add(docid, score);
    }
    out
}

fn xquad(inputs: &Inputs, params: &DiversityParams) -> Vec<(u32, f64)> {
    let k = inputs.p_intent.len();
    let prior = if k > 0 { 1.0 / k as f64 } else { 0.0 };
    let lambda = params.lambda;

    let mut remaining = inputs.candidates.clone();
    let mut coverage = vec![1.0_f64; k];
    let mut picked = Vec::new();

    while picked.len() < params.max_result_ranking_length && !remaining.is_empty() {
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, &docid) in remaining.iter().enumerate() {
            let mut diversity = 0.0;
            for intent in 0..k {
                diversity += prior * inputs.p_intent(intent, docid) * coverage[intent];
            }
            let score = (1.0 - lambda) * inputs.p_query(docid) + lambda * diversity;
            if score > best_score {
                best = i;
                best_score = score;
            }
        }
        let docid = remaining.remove(best);
        for intent in 0..k {
            coverage[intent] *= 1.0 - inputs.p_intent(intent, docid);
        }
        picked.push((docid, best_score));
    }
    picked
}

fn pm2(inputs: &Inputs, params: &DiversityParams) -> Vec<(u32, f64)> {
    let k = inputs.p_intent.len();
    let lambda = params.lambda;
    let prior = if k > 0 { 1.0 / k as f64 } else { 0.0 };

    let mut votes = vec![prior * params.max_result_ranking_length as f64; k];
    let mut seats = vec![0.0_f64; k];
    let mut remaining = inputs.candidates.clone();
    let mut picked: Vec<(u32, f64)> = Vec::new();

    while picked.len() < params.max_result_ranking_length && !remaining.is_empty() {
        let quotients: Vec<f64> = (0..k).map(|i| votes[i] / (2.0 * seats[i] + 1.0)).collect();
        let best_intent = quotients
            .iter()
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |acc, (i, &q)| {
                if q > acc.1 {
                    (i, q)
                } else {
                    acc
                }
            })
            .0;

        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, &docid) in remaining.iter().enumerate() {
            let mut score = 0.0;
            for intent in 0..k {
                let contribution = quotients[intent] * inputs.p_intent(intent, docid);
                if intent == best_intent {
                    score += lambda * contribution;
                } else {
                    score += (1.0 - lambda) * contribution;
                }
            }
            if score > best_score {
                best = i;
                best_score = score;
            }
        }
        let docid = remaining.remove(best);

        let total: f64 = (0..k).map(|i| inputs.p_intent(i, docid)).sum();
        if total > 0.0 {
            for intent in 0..k {
                seats[intent] += inputs.p_intent(intent, docid) / total;
            }
        }
        picked.push((docid, best_score));
    }

    // PM2 selection scores need not decrease; rewrite any later score so the
    // emitted ranking is strictly decreasing and survives external sorters.
    for i in 1..picked.len() {
        if picked[i].1 >= picked[i - 1].1 {
            picked[i].1 = picked[i - 1].1 * 0.999;
        }
    }
    picked
}
