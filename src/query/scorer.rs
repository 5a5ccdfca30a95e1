//! BM25 scoring

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};

/// BM25 free parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term-frequency saturation
    pub k1: f32,
    /// Length normalization strength, 0 disables it
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Params {
    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(IndexError::InvalidConfig(format!("k1 must be >= 0, got {}", self.k1)));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(IndexError::InvalidConfig(format!("b must be in [0, 1], got {}", self.b)));
        }
        Ok(())
    }
}

/// Collection-level BM25 scorer
#[derive(Debug, Clone, Copy)]
pub struct Bm25 {
    params: Bm25Params,
    doc_count: u32,
    avg_doc_len: f32,
}

impl Bm25 {
    pub fn new(params: Bm25Params, doc_count: u32, avg_doc_len: f64) -> Self {
        Self {
            params,
            doc_count,
            avg_doc_len: avg_doc_len as f32,
        }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// `ln(1 + (N - df + 0.5) / (df + 0.5))`, always positive
    #[inline]
    pub fn idf(&self, df: u64) -> f32 {
        let n = self.doc_count as f64;
        let df = df as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln() as f32
    }

    /// Contribution of one term to a document's score
    #[inline]
    pub fn term_score(&self, idf: f32, tf: u32, doc_len: u32) -> f32 {
        let Bm25Params { k1, b } = self.params;
        let tf = tf as f32;
        // An all-empty collection has avgdl 0; treat every length as average
        let relative_len = if self.avg_doc_len > 0.0 {
            doc_len as f32 / self.avg_doc_len
        } else {
            1.0
        };
        idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * relative_len))
    }
}
