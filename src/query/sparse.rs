//! Sparse (lexical) scoring over retrieval candidates
//!
//! Candidates arriving from dense retrieval are re-scored lexically: a
//! BM25-style term score computed per candidate against an assumed average
//! document length, and a keyword score (exact substring match, else
//! Jaccard overlap of term sets). The two combine with configured weights
//! into one sparse signal.

use crate::config::RetrievalConfig;
use crate::error::{MindsongError, Result};
use ahash::{AHashMap, AHashSet};
use regex::Regex;

/// Per-candidate sparse signals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseScore {
    pub bm25: f32,
    pub keyword: f32,
    pub combined: f32,
}

pub struct SparseScorer {
    k1: f32,
    b: f32,
    avg_doc_len: f32,
    bm25_weight: f32,
    keyword_weight: f32,
    token_re: Regex,
}

impl SparseScorer {
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let token_re = Regex::new(r"[a-z0-9_]+")
            .map_err(|e| MindsongError::Config(format!("Failed to compile tokenizer: {}", e)))?;

        Ok(Self {
            k1: config.bm25_k1,
            b: config.bm25_b,
            avg_doc_len: config.avg_doc_len,
            bm25_weight: config.bm25_weight,
            keyword_weight: config.keyword_weight,
            token_re,
        })
    }

    /// Score one candidate document against the query.
    pub fn score(&self, query: &str, doc: &str) -> SparseScore {
        let query_terms = self.tokenize(query);
        let doc_terms = self.tokenize(doc);

        let bm25 = self.bm25(&query_terms, &doc_terms);
        let keyword = self.keyword(query, doc, &query_terms, &doc_terms);

        SparseScore {
            bm25,
            keyword,
            combined: self.bm25_weight * bm25 + self.keyword_weight * keyword,
        }
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        self.token_re
            .find_iter(&lower)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// BM25-style sum over distinct query terms. The inverse-frequency
    /// factor is approximated per candidate as ln((|doc|+1)/(tf+0.5)) and
    /// length normalization uses the configured average document length
    /// rather than a corpus-measured one.
    fn bm25(&self, query_terms: &[String], doc_terms: &[String]) -> f32 {
        if query_terms.is_empty() || doc_terms.is_empty() {
            return 0.0;
        }

        let doc_len = doc_terms.len() as f32;
        let mut tf: AHashMap<&str, f32> = AHashMap::new();
        for term in doc_terms {
            *tf.entry(term.as_str()).or_insert(0.0) += 1.0;
        }

        let norm = self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_doc_len);
        let unique: AHashSet<&str> = query_terms.iter().map(|t| t.as_str()).collect();

        let mut score = 0.0;
        for term in unique {
            let tf_t = tf.get(term).copied().unwrap_or(0.0);
            if tf_t == 0.0 {
                continue;
            }
            let idf = ((doc_len + 1.0) / (tf_t + 0.5)).ln();
            score += idf * (tf_t * (self.k1 + 1.0)) / (tf_t + norm);
        }
        score
    }

    /// 1.0 on an exact (case-insensitive) substring match of the whole
    /// query, else Jaccard overlap of the term sets.
    fn keyword(&self, query: &str, doc: &str, query_terms: &[String], doc_terms: &[String]) -> f32 {
        let query_lower = query.trim().to_lowercase();
        if query_lower.is_empty() {
            return 0.0;
        }
        if doc.to_lowercase().contains(&query_lower) {
            return 1.0;
        }

        let query_set: AHashSet<&str> = query_terms.iter().map(|t| t.as_str()).collect();
        let doc_set: AHashSet<&str> = doc_terms.iter().map(|t| t.as_str()).collect();
        let union = query_set.union(&doc_set).count();
        if union == 0 {
            return 0.0;
        }
        let intersection = query_set.intersection(&doc_set).count();
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn scorer() -> SparseScorer {
        SparseScorer::new(&Config::default().retrieval).unwrap()
    }

    #[test]
    fn test_exact_substring_scores_full_keyword() {
        let s = scorer();
        let score = s.score("onboarding checklist", "See the Onboarding Checklist for details.");
        assert!((score.keyword - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_overlap_uses_jaccard() {
        let s = scorer();
        let score = s.score("onboarding checklist", "the onboarding process takes a week");
        assert!(score.keyword > 0.0);
        assert!(score.keyword < 1.0);
    }

    #[test]
    fn test_no_overlap_scores_zero() {
        let s = scorer();
        let score = s.score("quarterly revenue", "completely unrelated walrus content");
        assert_eq!(score.bm25, 0.0);
        assert_eq!(score.keyword, 0.0);
        assert_eq!(score.combined, 0.0);
    }

    #[test]
    fn test_bm25_rewards_matching_terms() {
        let s = scorer();
        let one_match = s.score("alpha beta", "alpha something else entirely here");
        let two_match = s.score("alpha beta", "alpha beta something else here");
        assert!(two_match.bm25 > one_match.bm25);
    }

    #[test]
    fn test_combined_is_weighted_sum() {
        let s = scorer();
        let score = s.score("alpha", "alpha alpha beta");
        let expected = 0.6 * score.bm25 + 0.4 * score.keyword;
        assert!((score.combined - expected).abs() < 1e-6);
    }

    #[test]
    fn test_empty_inputs() {
        let s = scorer();
        assert_eq!(s.score("", "some document").combined, 0.0);
        assert_eq!(s.score("query", "").combined, 0.0);
    }

    #[test]
    fn test_deterministic() {
        let s = scorer();
        let a = s.score("release notes", "release notes for version two");
        let b = s.score("release notes", "release notes for version two");
        assert_eq!(a, b);
    }
}
