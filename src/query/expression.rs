//! Query expression trees.
//!
//! The query analyzer hands over trees of three node kinds: terms, structural
//! combinations of subtrees and document fields delimited by metadata columns.
//! The tree is a closed enum; the posting iterator compiler matches it
//! exhaustively.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::index::types::Term;

/// Structural operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureOperator {
    /// Ordered, non-overlapping, first to last start at most `range` apart.
    Sequence,
    /// Ordered and directly adjacent.
    SequenceImm,
    /// Like `Sequence`; the first child is a delimiter that must not occur
    /// inside the match.
    SequenceStruct,
    /// Unordered, all (or `cardinality`) children inside a window of `range`.
    Within,
    /// Like `Within`; the first child is a delimiter that must not occur
    /// inside the match.
    WithinStruct,
    /// Any child.
    Union,
    /// Positions shared by all children.
    Intersect,
    /// Positions of the first child that are not positions of the second.
    Diff,
    /// Occurrences of the first child lying inside a span of the second.
    Inside,
    /// At least `cardinality` children present in the document (0 = any).
    Contains,
}

impl StructureOperator {
    pub fn name(&self) -> &'static str {
        match self {
            StructureOperator::Sequence => "sequence",
            StructureOperator::SequenceImm => "sequence_imm",
            StructureOperator::SequenceStruct => "sequence_struct",
            StructureOperator::Within => "within",
            StructureOperator::WithinStruct => "within_struct",
            StructureOperator::Union => "union",
            StructureOperator::Intersect => "intersect",
            StructureOperator::Diff => "diff",
            StructureOperator::Inside => "inside",
            StructureOperator::Contains => "contains",
        }
    }
}

impl FromStr for StructureOperator {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequence" => Ok(StructureOperator::Sequence),
            "sequence_imm" => Ok(StructureOperator::SequenceImm),
            "sequence_struct" => Ok(StructureOperator::SequenceStruct),
            "within" => Ok(StructureOperator::Within),
            "within_struct" => Ok(StructureOperator::WithinStruct),
            "union" => Ok(StructureOperator::Union),
            "intersect" => Ok(StructureOperator::Intersect),
            "diff" => Ok(StructureOperator::Diff),
            "inside" => Ok(StructureOperator::Inside),
            "contains" => Ok(StructureOperator::Contains),
            other => Err(QuarryError::config(format!(
                "unknown posting join operator '{other}'"
            ))),
        }
    }
}

impl fmt::Display for StructureOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A node of a query expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Term {
        #[serde(rename = "type")]
        term_type: String,
        value: String,
    },
    Structure {
        operator: StructureOperator,
        #[serde(default)]
        range: u32,
        #[serde(default)]
        cardinality: u32,
        children: Vec<Expression>,
    },
    /// A field spanning from the position stored in metadata column `start`
    /// up to (excluding) the position stored in column `end`.
    DocField { start: String, end: String },
}

impl Expression {
    pub fn term<T: Into<String>, V: Into<String>>(term_type: T, value: V) -> Self {
        Expression::Term {
            term_type: term_type.into(),
            value: value.into(),
        }
    }

    pub fn structure(
        operator: StructureOperator,
        range: u32,
        cardinality: u32,
        children: Vec<Expression>,
    ) -> Self {
        Expression::Structure {
            operator,
            range,
            cardinality,
            children,
        }
    }

    pub fn docfield<S: Into<String>, E: Into<String>>(start: S, end: E) -> Self {
        Expression::DocField {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn sequence(range: u32, children: Vec<Expression>) -> Self {
        Expression::structure(StructureOperator::Sequence, range, 0, children)
    }

    pub fn union(children: Vec<Expression>) -> Self {
        Expression::structure(StructureOperator::Union, 0, 0, children)
    }

    pub fn contains(cardinality: u32, children: Vec<Expression>) -> Self {
        Expression::structure(StructureOperator::Contains, 0, cardinality, children)
    }

    /// The term of a leaf node.
    pub fn as_term(&self) -> Option<Term> {
        match self {
            Expression::Term { term_type, value } => Some(Term::new(term_type.clone(), value.clone())),
            _ => None,
        }
    }

    /// All distinct terms of the tree, in order of first appearance.
    pub fn terms(&self) -> Vec<Term> {
        fn walk(expr: &Expression, out: &mut Vec<Term>) {
            match expr {
                Expression::Term { .. } => {
                    if let Some(term) = expr.as_term() {
                        if !out.contains(&term) {
                            out.push(term);
                        }
                    }
                }
                Expression::Structure { children, .. } => {
                    for child in children {
                        walk(child, out);
                    }
                }
                Expression::DocField { .. } => {}
            }
        }
        let mut terms = Vec::new();
        walk(self, &mut terms);
        terms
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Term { term_type, value } => write!(f, "{term_type} '{value}'"),
            Expression::Structure {
                operator,
                range,
                cardinality,
                children,
            } => {
                write!(f, "{operator}")?;
                if *range != 0 || *cardinality != 0 {
                    write!(f, "[range={range}, cardinality={cardinality}]")?;
                }
                f.write_str("(")?;
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Expression::DocField { start, end } => write!(f, "docfield({start}, {end})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_terms() {
        let expr = Expression::contains(
            1,
            vec![
                Expression::term("word", "2"),
                Expression::sequence(3, vec![Expression::term("word", "3"), Expression::term("word", "2")]),
            ],
        );
        assert_eq!(
            expr.to_string(),
            "contains[range=0, cardinality=1](word '2', sequence[range=3, cardinality=0](word '3', word '2'))"
        );
        assert_eq!(
            expr.terms(),
            vec![Term::new("word", "2"), Term::new("word", "3")]
        );
    }

    #[test]
    fn test_json_form() {
        let json = r#"{"structure": {"operator": "sequence_imm", "children": [
            {"term": {"type": "word", "value": "a"}},
            {"doc_field": {"start": "title_start", "end": "title_end"}}
        ]}}"#;
        let expr: Expression = serde_json::from_str(json).unwrap();
        match expr {
            Expression::Structure {
                operator,
                range,
                children,
                ..
            } => {
                assert_eq!(operator, StructureOperator::SequenceImm);
                assert_eq!(range, 0);
                assert_eq!(children.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!("nearby".parse::<StructureOperator>().is_err());
    }
}
