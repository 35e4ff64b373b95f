//! Okapi BM25.
//!
//! ```text
//! weight(d) = sum over features f matching d:
//!     w(f) * idf(f) * tf(f,d) * (k1 + 1) / (tf(f,d) + k1 * (1 - b + b * doclen(d) / avgdoclen))
//! idf(f)    = max(ln((N - df(f) + 0.5) / (df(f) + 0.5)), 0.00001)
//! ```
//!
//! Without a document length column every document is considered to be of
//! average length.

use std::fmt::Write;

use crate::error::{QuarryError, Result};
use crate::index::snapshot::Snapshot;
use crate::index::types::DocNo;
use crate::query::eval::{EvalContext, FeatureIterator};
use crate::query::weighting::{FunctionConfig, WeightingExecution, WeightingFunction};

const MIN_IDF: f64 = 0.00001;

/// Inverse document frequency with the lower bound used for ranking.
pub fn idf(nof_documents: usize, document_frequency: usize) -> f64 {
    let n = nof_documents as f64;
    let df = document_frequency as f64;
    let idf = ((n - df + 0.5) / (df + 0.5)).ln();
    if idf.is_nan() || idf < MIN_IDF { MIN_IDF } else { idf }
}

/// Configured BM25.
#[derive(Debug, Clone)]
pub struct Bm25 {
    k1: f64,
    b: f64,
    avgdoclen: f64,
    doclen_column: Option<String>,
    feature_set: String,
    debug: Option<String>,
}

impl Bm25 {
    pub const PARAMS: &'static [&'static str] = &["k1", "b", "avgdoclen", "metadata_doclen", "match"];

    pub fn from_config(config: &FunctionConfig) -> Result<Self> {
        config.check_known(Self::PARAMS)?;
        let k1 = config.number("k1", 1.5)?;
        let b = config.number("b", 0.75)?;
        let avgdoclen = config.number("avgdoclen", 500.0)?;
        if k1 < 0.0 || b < 0.0 {
            return Err(QuarryError::config("bm25 parameters k1 and b must not be negative"));
        }
        if avgdoclen <= 0.0 {
            return Err(QuarryError::config("bm25 parameter avgdoclen must be positive"));
        }
        let feature_set = config
            .feature_set("match")?
            .ok_or_else(|| QuarryError::config("bm25 needs a 'match' feature set"))?;
        Ok(Bm25 {
            k1,
            b,
            avgdoclen,
            doclen_column: config.text("metadata_doclen")?.filter(|s| !s.is_empty()),
            feature_set,
            debug: config.debug_name()?,
        })
    }
}

impl WeightingFunction for Bm25 {
    fn name(&self) -> &str {
        "bm25"
    }

    fn describe(&self) -> String {
        format!(
            "bm25( k1={}, b={}, avgdoclen={}, metadata_doclen={}, match= %{})",
            self.k1,
            self.b,
            self.avgdoclen,
            self.doclen_column.as_deref().unwrap_or(""),
            self.feature_set
        )
    }

    fn debug_name(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    fn instance(&self, ctx: &EvalContext<'_>) -> Result<Box<dyn WeightingExecution>> {
        let doclen_column = match &self.doclen_column {
            Some(name) => Some(ctx.snapshot().metadata().schema().index_of(name).ok_or_else(|| {
                QuarryError::config(format!("bm25: unknown document length column '{name}'"))
            })?),
            None => None,
        };
        let nof_documents = ctx.nof_documents();
        let features = ctx.features(&self.feature_set)?;
        let idfs = features
            .iter()
            .map(|f| idf(nof_documents, f.document_frequency))
            .collect();
        Ok(Box::new(Bm25Execution {
            k1: self.k1,
            b: self.b,
            avgdoclen: self.avgdoclen,
            doclen_column,
            features,
            idfs,
        }))
    }
}

#[derive(Debug)]
struct Bm25Execution {
    k1: f64,
    b: f64,
    avgdoclen: f64,
    doclen_column: Option<usize>,
    features: Vec<FeatureIterator>,
    idfs: Vec<f64>,
}

impl Bm25Execution {
    fn relative_length(&self, snapshot: &Snapshot, docno: DocNo) -> f64 {
        match self.doclen_column {
            Some(idx) => snapshot.metadata().get(docno, idx).as_f64() / self.avgdoclen,
            None => 1.0,
        }
    }

    fn weigh(&mut self, snapshot: &Snapshot, docno: DocNo, mut trace: Option<&mut String>) -> f64 {
        let rel_doclen = self.relative_length(snapshot, docno);
        let norm = self.k1 * (1.0 - self.b + self.b * rel_doclen);
        let mut weight = 0.0;
        for (feature, idf) in self.features.iter_mut().zip(&self.idfs) {
            if feature.iterator.skip_doc(docno) != docno {
                continue;
            }
            let ff = feature.iterator.frequency() as f64;
            if ff == 0.0 {
                continue;
            }
            let contribution = feature.weight * idf * (ff * (self.k1 + 1.0)) / (ff + norm);
            if let Some(out) = trace.as_mut() {
                let _ = write!(out, "[{} ff={ff} idf={idf:.5} w={contribution:.5}] ", feature.expression);
            }
            weight += contribution;
        }
        weight
    }
}

impl WeightingExecution for Bm25Execution {
    fn call(&mut self, snapshot: &Snapshot, docno: DocNo) -> Result<f64> {
        Ok(self.weigh(snapshot, docno, None))
    }

    fn call_debug(&mut self, snapshot: &Snapshot, docno: DocNo) -> Result<(f64, String)> {
        let mut trace = String::new();
        let weight = self.weigh(snapshot, docno, Some(&mut trace));
        Ok((weight, format!("bm25 {weight:.5}: {}", trace.trim_end())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf_floor() {
        assert_eq!(idf(2, 1), MIN_IDF);
        assert_eq!(idf(2, 5), MIN_IDF);
        assert!((idf(100, 9) - (91.5f64 / 9.5).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_config() {
        let config = FunctionConfig::new("bm25").feature("match", "seek").param("k1", 0.75);
        let bm25 = Bm25::from_config(&config).unwrap();
        assert_eq!(
            bm25.describe(),
            "bm25( k1=0.75, b=0.75, avgdoclen=500, metadata_doclen=, match= %seek)"
        );
        assert!(Bm25::from_config(&FunctionConfig::new("bm25")).is_err());
        assert!(Bm25::from_config(&config.clone().param("z", 1.0)).is_err());
        assert!(Bm25::from_config(&config.param("avgdoclen", 0.0)).is_err());
    }
}
