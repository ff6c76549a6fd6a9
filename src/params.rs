//! Parameter-file parsing.
//!
//! Line-oriented `key = value`; blank lines and `#` comments are ignored,
//! unrecognized keys are kept and ignored. The four required keys are
//! validated at load time; typed accessors surface malformed values as
//! [`Error::ParameterMalformed`].

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::diversify::{DiversityAlgorithm, DiversityParams};
use crate::model::RetrievalModel;
use crate::prf::PrfParams;
use crate::Error;

const REQUIRED: [&str; 4] = [
    "indexPath",
    "queryFilePath",
    "trecEvalOutputPath",
    "retrievalAlgorithm",
];

/// Parsed parameter file.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    /// Load and validate a parameter file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str_checked(&text)
    }

    /// Parse parameter text and validate the required keys.
    pub fn from_str_checked(text: &str) -> Result<Self, Error> {
        let mut values = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::ParameterMalformed {
                    key: line.to_string(),
                    value: "expected key = value".to_string(),
                });
            };
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
        let params = Self { values };
        for key in REQUIRED {
            params.require(key)?;
        }
        Ok(params)
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Raw value for `key`, or [`Error::ParameterMissing`].
    pub fn require(&self, key: &str) -> Result<&str, Error> {
        self.get(key)
            .ok_or_else(|| Error::ParameterMissing(key.to_string()))
    }

    /// Parse `key` as `T`, falling back to `default` when absent.
    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, Error> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| Error::ParameterMalformed {
                key: key.to_string(),
                value: raw.to_string(),
            }),
        }
    }

    /// Whether `key` is present and truthy (`true`/`1`/`yes`).
    pub fn get_flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| {
            v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("yes")
        })
    }

    /// The retrieval algorithm name, lowercased.
    pub fn algorithm(&self) -> Result<String, Error> {
        Ok(self.require("retrievalAlgorithm")?.to_ascii_lowercase())
    }

    /// Build the retrieval model (not applicable to `ltr` runs).
    pub fn retrieval_model(&self) -> Result<RetrievalModel, Error> {
        match self.algorithm()?.as_str() {
            "unrankedboolean" => Ok(RetrievalModel::UnrankedBoolean),
            "rankedboolean" => Ok(RetrievalModel::RankedBoolean),
            "bm25" => Ok(RetrievalModel::Bm25 {
                k1: self.get_or("BM25:k_1", 1.2)?,
                b: self.get_or("BM25:b", 0.75)?,
                k3: self.get_or("BM25:k_3", 0.0)?,
            }),
            "indri" => Ok(RetrievalModel::Indri {
                mu: self.get_or("Indri:mu", 2500.0)?,
                lambda: self.get_or("Indri:lambda", 0.4)?,
            }),
            other => Err(Error::ParameterMalformed {
                key: "retrievalAlgorithm".to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// PRF configuration when `prf` is enabled.
    pub fn prf_params(&self) -> Result<Option<PrfParams>, Error> {
        if !self.get_flag("prf") {
            return Ok(None);
        }
        let defaults = PrfParams::default();
        Ok(Some(PrfParams {
            num_docs: self.get_or("prf:numDocs", defaults.num_docs)?,
            num_terms: self.get_or("prf:numTerms", defaults.num_terms)?,
            mu: self.get_or("prf:Indri:mu", defaults.mu)?,
            orig_weight: self.get_or("prf:Indri:origWeight", defaults.orig_weight)?,
            expansion_field: self
                .get("prf:expansionField")
                .unwrap_or(&defaults.expansion_field)
                .to_string(),
        }))
    }

    /// Diversification configuration when `diversity` is enabled.
    pub fn diversity_params(&self) -> Result<Option<DiversityParams>, Error> {
        if !self.get_flag("diversity") {
            return Ok(None);
        }
        let raw = self.require("diversity:algorithm")?;
        let algorithm = match raw.to_ascii_lowercase().as_str() {
            "xquad" => DiversityAlgorithm::XQuad,
            "pm2" => DiversityAlgorithm::Pm2,
            _ => {
                return Err(Error::ParameterMalformed {
                    key: "diversity:algorithm".to_string(),
                    value: raw.to_string(),
                })
            }
        };
        Ok(Some(DiversityParams {
            algorithm,
            lambda: self.get_or("diversity:lambda", 0.5)?,
            max_input_rankings_length: self.get_or("diversity:maxInputRankingsLength", 100)?,
            max_result_ranking_length: self.get_or("diversity:maxResultRankingLength", 100)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "indexPath = /tmp/ix\n\
                        queryFilePath = /tmp/q\n\
                        trecEvalOutputPath = /tmp/out\n";

    #[test]
    fn required_keys_are_validated_at_load() {
        let err = Params::from_str_checked("indexPath = /tmp/ix\n");
        assert!(matches!(err, Err(Error::ParameterMissing(_))));
    }

    #[test]
    fn comments_and_blanks_are_ignored() {
        let text = format!("{BASE}# a comment\n\nretrievalAlgorithm = bm25\n");
        let params = Params::from_str_checked(&text).unwrap();
        assert_eq!(params.algorithm().unwrap(), "bm25");
    }

    #[test]
    fn bm25_parameters_use_documented_defaults() {
        let text = format!("{BASE}retrievalAlgorithm = BM25\nBM25:k_1 = 1.6\n");
        let model = Params::from_str_checked(&text)
            .unwrap()
            .retrieval_model()
            .unwrap();
        assert_eq!(
            model,
            RetrievalModel::Bm25 {
                k1: 1.6,
                b: 0.75,
                k3: 0.0
            }
        );
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let text = format!("{BASE}retrievalAlgorithm = indri\nIndri:mu = lots\n");
        let err = Params::from_str_checked(&text).unwrap().retrieval_model();
        assert!(matches!(err, Err(Error::ParameterMalformed { .. })));
    }

    #[test]
    fn prf_is_off_unless_truthy() {
        let text = format!("{BASE}retrievalAlgorithm = indri\nprf = false\n");
        let params = Params::from_str_checked(&text).unwrap();
        assert!(params.prf_params().unwrap().is_none());

        let text = format!(
            "{BASE}retrievalAlgorithm = indri\nprf = true\nprf:numTerms = 25\n"
        );
        let prf = Params::from_str_checked(&text)
            .unwrap()
            .prf_params()
            .unwrap()
            .unwrap();
        assert_eq!(prf.num_terms, 25);
        assert_eq!(prf.expansion_field, "body");
    }

    #[test]
    fn diversity_algorithm_names_are_case_insensitive() {
        let text = format!(
            "{BASE}retrievalAlgorithm = indri\ndiversity = true\n\
             diversity:algorithm = xQuAD\ndiversity:lambda = 0.3\n"
        );
        let dp = Params::from_str_checked(&text)
            .unwrap()
            .diversity_params()
            .unwrap()
            .unwrap();
        assert_eq!(dp.algorithm, DiversityAlgorithm::XQuad);
        assert_eq!(dp.lambda, 0.3);
    }
}
