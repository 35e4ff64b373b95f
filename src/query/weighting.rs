//! Weighting functions.
//!
//! A weighting function is configured once per query evaluation scheme from
//! a [`FunctionConfig`] and instantiated per query. The instance is called
//! once for every ranked document and yields a scalar that becomes one
//! argument of the weighting formula.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::index::snapshot::Snapshot;
use crate::index::types::DocNo;
use crate::query::eval::EvalContext;

pub mod bm25;
pub mod constant;
pub mod frequency;
pub mod metadata;

pub use bm25::Bm25;
pub use constant::ConstantWeight;
pub use frequency::TermFrequency;
pub use metadata::MetaDataWeight;

/// A function parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
    /// Reference to a query feature set.
    Feature { feature: String },
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(v) => write!(f, "{v}"),
            ParamValue::Text(s) => write!(f, "'{s}'"),
            ParamValue::Feature { feature } => write!(f, " %{feature}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

/// Name and parameters of a weighting function or summarizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl FunctionConfig {
    pub fn new<S: Into<String>>(name: S) -> Self {
        FunctionConfig {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder style parameter.
    pub fn param<K: Into<String>, V: Into<ParamValue>>(mut self, key: K, value: V) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Builder style feature parameter.
    pub fn feature<K: Into<String>, F: Into<String>>(mut self, key: K, feature: F) -> Self {
        self.params.insert(
            key.into(),
            ParamValue::Feature {
                feature: feature.into(),
            },
        );
        self
    }

    /// Fail on parameters outside `known`. `debug` is always accepted.
    pub fn check_known(&self, known: &[&str]) -> Result<()> {
        for key in self.params.keys() {
            if key != "debug" && !known.contains(&key.as_str()) {
                return Err(QuarryError::config(format!(
                    "unknown parameter '{key}' for function '{}'",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Numeric parameter; text that parses as a number is accepted.
    pub fn number(&self, key: &str, default: f64) -> Result<f64> {
        match self.params.get(key) {
            None => Ok(default),
            Some(ParamValue::Number(v)) => Ok(*v),
            Some(ParamValue::Text(s)) => s.trim().parse().map_err(|_| {
                QuarryError::config(format!(
                    "parameter '{key}' of function '{}' expects a number, got '{s}'",
                    self.name
                ))
            }),
            Some(ParamValue::Feature { .. }) => Err(QuarryError::config(format!(
                "parameter '{key}' of function '{}' expects a number, got a feature",
                self.name
            ))),
        }
    }

    /// Text parameter.
    pub fn text(&self, key: &str) -> Result<Option<String>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(ParamValue::Text(s)) => Ok(Some(s.clone())),
            Some(ParamValue::Number(v)) => Ok(Some(v.to_string())),
            Some(ParamValue::Feature { .. }) => Err(QuarryError::config(format!(
                "parameter '{key}' of function '{}' expects a string, got a feature",
                self.name
            ))),
        }
    }

    /// Text parameter that must be present.
    pub fn required_text(&self, key: &str) -> Result<String> {
        self.text(key)?.ok_or_else(|| {
            QuarryError::config(format!("missing parameter '{key}' for function '{}'", self.name))
        })
    }

    /// Feature set parameter. A plain string names a feature set as well.
    pub fn feature_set(&self, key: &str) -> Result<Option<String>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(ParamValue::Feature { feature }) | Some(ParamValue::Text(feature)) => Ok(Some(feature.clone())),
            Some(ParamValue::Number(_)) => Err(QuarryError::config(format!(
                "parameter '{key}' of function '{}' expects a feature set",
                self.name
            ))),
        }
    }

    /// Name of the summary element carrying debug output.
    pub fn debug_name(&self) -> Result<Option<String>> {
        self.text("debug")
    }
}

impl fmt::Display for FunctionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, (key, value)) in self.params.iter().filter(|(k, _)| *k != "debug").enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, " {key}={value}")?;
        }
        f.write_str(")")
    }
}

/// A configured weighting function.
pub trait WeightingFunction: Send + Sync + fmt::Debug {
    /// Registered function name.
    fn name(&self) -> &str;

    /// Parameter rendering for query dumps.
    fn describe(&self) -> String;

    /// Name of the debug summary element, if any.
    fn debug_name(&self) -> Option<&str> {
        None
    }

    /// Bind the function to a query.
    fn instance(&self, ctx: &EvalContext<'_>) -> Result<Box<dyn WeightingExecution>>;
}

/// A weighting function bound to one query.
pub trait WeightingExecution: Send + fmt::Debug {
    /// Weight of a document.
    fn call(&mut self, snapshot: &Snapshot, docno: DocNo) -> Result<f64>;

    /// Weight of a document with an explanation of how it was computed.
    fn call_debug(&mut self, snapshot: &Snapshot, docno: DocNo) -> Result<(f64, String)> {
        let weight = self.call(snapshot, docno)?;
        Ok((weight, format!("{weight:.5}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params() {
        let config = FunctionConfig::new("bm25")
            .param("k1", 0.75)
            .param("b", "2.1")
            .param("debug", "debug_weighting")
            .feature("match", "seek");
        assert_eq!(config.number("k1", 1.5).unwrap(), 0.75);
        assert_eq!(config.number("b", 0.75).unwrap(), 2.1);
        assert_eq!(config.number("avgdoclen", 500.0).unwrap(), 500.0);
        assert!(config.number("match", 0.0).is_err());
        assert_eq!(config.feature_set("match").unwrap().as_deref(), Some("seek"));
        assert_eq!(config.debug_name().unwrap().as_deref(), Some("debug_weighting"));
        assert!(config.check_known(&["k1", "b", "match"]).is_ok());
        assert!(config.check_known(&["k1", "match"]).is_err());
        assert_eq!(config.to_string(), "bm25( b='2.1', k1=0.75, match= %seek)");
    }

    #[test]
    fn test_json_params() {
        let config: FunctionConfig = serde_json::from_str(
            r#"{"name": "tf", "params": {"match": {"feature": "seek"}, "weight": 2, "debug": "d"}}"#,
        )
        .unwrap();
        assert_eq!(
            config.params["match"],
            ParamValue::Feature {
                feature: "seek".to_string()
            }
        );
        assert_eq!(config.number("weight", 1.0).unwrap(), 2.0);
    }
}
