//! Query evaluation.
//!
//! Queries are expression trees ([`expression::Expression`]) grouped into
//! named feature sets. A [`QueryEval`] decides which sets select, restrict
//! and exclude documents, which weighting functions rank them and which
//! summarizers describe the ranked documents. Expressions compile to posting
//! iterators ([`posting`]) over an immutable snapshot.

pub mod collector;
pub mod eval;
pub mod expression;
pub mod formula;
pub mod posting;
pub mod registry;
pub mod restriction;
pub mod result;
pub mod session;
pub mod summarizer;
pub mod weighting;

pub use eval::{EvalContext, FeatureIterator, QueryEval, QueryFeature};
pub use expression::{Expression, StructureOperator};
pub use formula::WeightingFormula;
pub use registry::FunctionRegistry;
pub use restriction::{CompareOperator, MetaDataRestriction};
pub use result::{QueryResult, Rank, SummaryElement};
pub use session::{Query, QueryState};
pub use weighting::{FunctionConfig, ParamValue};
