//! Okapi BM25 over pre-tokenized documents.
//!
//! The model is a single reduction over the whole corpus; adding a document
//! changes every idf, so it is rebuilt rather than patched.
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization, 0 = none, 1 = full.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bm25Model {
    params: Bm25Params,
    avg_doc_len: f64,
    doc_lengths: Vec<u32>,
    doc_freq: BTreeMap<String, u32>,
    term_freqs: Vec<BTreeMap<String, u32>>,
}

impl Bm25Model {
    pub fn build(docs: &[Vec<String>], params: Bm25Params) -> Self {
        let mut doc_freq: BTreeMap<String, u32> = BTreeMap::new();
        let mut term_freqs = Vec::with_capacity(docs.len());
        let mut doc_lengths = Vec::with_capacity(docs.len());
        let mut total_len = 0usize;

        for tokens in docs {
            total_len += tokens.len();
            doc_lengths.push(tokens.len() as u32);

            let mut tf: BTreeMap<String, u32> = BTreeMap::new();
            for token in tokens {
                *tf.entry(token.clone()).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(tf);
        }

        let avg_doc_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        Self {
            params,
            avg_doc_len,
            doc_lengths,
            doc_freq,
            term_freqs,
        }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }

    /// Internal consistency of a deserialized model.
    pub fn is_consistent(&self) -> bool {
        self.term_freqs.len() == self.doc_lengths.len()
            && self.avg_doc_len.is_finite()
            && self.params.k1.is_finite()
            && self.params.b.is_finite()
    }

    /// `ln((N - df + 0.5) / (df + 0.5) + 1)`, positive for any df.
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.len() as f64;
        let df = f64::from(self.doc_freq.get(term).copied().unwrap_or(0));
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// One score per document, in corpus order. Repeated query tokens
    /// count once per occurrence.
    pub fn scores(&self, query: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.len()];
        if query.is_empty() || self.is_empty() {
            return scores;
        }

        let known: HashSet<&str> = query
            .iter()
            .map(String::as_str)
            .filter(|t| self.doc_freq.contains_key(*t))
            .collect();
        if known.is_empty() {
            return scores;
        }

        let Bm25Params { k1, b } = self.params;
        let avg = self.avg_doc_len.max(1e-9);
        for (i, tf) in self.term_freqs.iter().enumerate() {
            let dl = f64::from(self.doc_lengths[i]);
            let norm = k1 * (1.0 - b + b * dl / avg);
            let mut score = 0.0;
            for term in query {
                if !known.contains(term.as_str()) {
                    continue;
                }
                let freq = f64::from(tf.get(term).copied().unwrap_or(0));
                if freq <= 0.0 {
                    continue;
                }
                score += self.idf(term) * (freq * (k1 + 1.0)) / (freq + norm);
            }
            scores[i] = score;
        }
        scores
    }
}
