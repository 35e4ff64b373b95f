//! Name to factory registry of weighting functions and summarizers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{QuarryError, Result};
use crate::query::summarizer::{
    AttributeSummarizer, ForwardIndexSummarizer, MatchPhraseSummarizer, MetaDataSummarizer, SummarizerFunction,
};
use crate::query::weighting::{
    Bm25, ConstantWeight, FunctionConfig, MetaDataWeight, TermFrequency, WeightingFunction,
};

pub type WeightingFactory = fn(&FunctionConfig) -> Result<Arc<dyn WeightingFunction>>;
pub type SummarizerFactory = fn(&FunctionConfig) -> Result<Arc<dyn SummarizerFunction>>;

fn bm25(config: &FunctionConfig) -> Result<Arc<dyn WeightingFunction>> {
    Ok(Arc::new(Bm25::from_config(config)?))
}

fn term_frequency(config: &FunctionConfig) -> Result<Arc<dyn WeightingFunction>> {
    Ok(Arc::new(TermFrequency::from_config(config)?))
}

fn metadata_weight(config: &FunctionConfig) -> Result<Arc<dyn WeightingFunction>> {
    Ok(Arc::new(MetaDataWeight::from_config(config)?))
}

fn constant_weight(config: &FunctionConfig) -> Result<Arc<dyn WeightingFunction>> {
    Ok(Arc::new(ConstantWeight::from_config(config)?))
}

fn attribute_summarizer(config: &FunctionConfig) -> Result<Arc<dyn SummarizerFunction>> {
    Ok(Arc::new(AttributeSummarizer::from_config(config)?))
}

fn metadata_summarizer(config: &FunctionConfig) -> Result<Arc<dyn SummarizerFunction>> {
    Ok(Arc::new(MetaDataSummarizer::from_config(config)?))
}

fn forwardindex_summarizer(config: &FunctionConfig) -> Result<Arc<dyn SummarizerFunction>> {
    Ok(Arc::new(ForwardIndexSummarizer::from_config(config)?))
}

fn matchphrase_summarizer(config: &FunctionConfig) -> Result<Arc<dyn SummarizerFunction>> {
    Ok(Arc::new(MatchPhraseSummarizer::from_config(config)?))
}

/// Function lookup by case-insensitive name.
#[derive(Clone)]
pub struct FunctionRegistry {
    weighting: BTreeMap<String, WeightingFactory>,
    summarizers: BTreeMap<String, SummarizerFactory>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("weighting", &self.weighting_names())
            .field("summarizers", &self.summarizer_names())
            .finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// A registry with the built-in functions.
    pub fn new() -> Self {
        let mut registry = FunctionRegistry::empty();
        registry.register_weighting("bm25", bm25);
        registry.register_weighting("tf", term_frequency);
        registry.register_weighting("frequency", term_frequency);
        registry.register_weighting("metadata", metadata_weight);
        registry.register_weighting("constant", constant_weight);
        registry.register_summarizer("attribute", attribute_summarizer);
        registry.register_summarizer("metadata", metadata_summarizer);
        registry.register_summarizer("forwardindex", forwardindex_summarizer);
        registry.register_summarizer("matchphrase", matchphrase_summarizer);
        registry
    }

    /// A registry without any function.
    pub fn empty() -> Self {
        FunctionRegistry {
            weighting: BTreeMap::new(),
            summarizers: BTreeMap::new(),
        }
    }

    pub fn register_weighting(&mut self, name: &str, factory: WeightingFactory) {
        self.weighting.insert(name.to_ascii_lowercase(), factory);
    }

    pub fn register_summarizer(&mut self, name: &str, factory: SummarizerFactory) {
        self.summarizers.insert(name.to_ascii_lowercase(), factory);
    }

    pub fn weighting_function(&self, config: &FunctionConfig) -> Result<Arc<dyn WeightingFunction>> {
        let factory = self
            .weighting
            .get(&config.name.to_ascii_lowercase())
            .ok_or_else(|| QuarryError::config(format!("unknown weighting function '{}'", config.name)))?;
        factory(config)
    }

    pub fn summarizer(&self, config: &FunctionConfig) -> Result<Arc<dyn SummarizerFunction>> {
        let factory = self
            .summarizers
            .get(&config.name.to_ascii_lowercase())
            .ok_or_else(|| QuarryError::config(format!("unknown summarizer '{}'", config.name)))?;
        factory(config)
    }

    pub fn weighting_names(&self) -> Vec<&str> {
        self.weighting.keys().map(String::as_str).collect()
    }

    pub fn summarizer_names(&self) -> Vec<&str> {
        self.summarizers.keys().map(String::as_str).collect()
    }
}
