//! Metadata restrictions in conjunctive normal form.
//!
//! A restriction is a list of groups. Conditions inside a group are ORed, the
//! groups are ANDed. Column names are resolved against a schema once, when the
//! restriction is compiled; an unknown column is an evaluation error.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::index::document::NumericValue;
use crate::index::metadata::{MetaDataSchema, MetaDataTable};
use crate::index::types::DocNo;

/// Comparison operator of a restriction condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOperator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterEqual,
}

impl CompareOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOperator::Equal => "=",
            CompareOperator::NotEqual => "!=",
            CompareOperator::Less => "<",
            CompareOperator::LessEqual => "<=",
            CompareOperator::Greater => ">",
            CompareOperator::GreaterEqual => ">=",
        }
    }

    /// Evaluate `left <op> right`. Incomparable values (NaN) never match.
    pub fn holds(&self, left: &NumericValue, right: &NumericValue) -> bool {
        let Some(ordering) = left.compare(right) else {
            return false;
        };
        match self {
            CompareOperator::Equal => ordering == Ordering::Equal,
            CompareOperator::NotEqual => ordering != Ordering::Equal,
            CompareOperator::Less => ordering == Ordering::Less,
            CompareOperator::LessEqual => ordering != Ordering::Greater,
            CompareOperator::Greater => ordering == Ordering::Greater,
            CompareOperator::GreaterEqual => ordering != Ordering::Less,
        }
    }
}

impl FromStr for CompareOperator {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "=" | "==" | "eq" => Ok(CompareOperator::Equal),
            "!=" | "<>" | "ne" => Ok(CompareOperator::NotEqual),
            "<" | "lt" => Ok(CompareOperator::Less),
            "<=" | "le" => Ok(CompareOperator::LessEqual),
            ">" | "gt" => Ok(CompareOperator::Greater),
            ">=" | "ge" => Ok(CompareOperator::GreaterEqual),
            other => Err(QuarryError::config(format!(
                "unknown compare operator '{other}'"
            ))),
        }
    }
}

impl fmt::Display for CompareOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One comparison of a metadata column against a constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDataCondition {
    pub operator: CompareOperator,
    pub column: String,
    pub value: NumericValue,
}

impl fmt::Display for MetaDataCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.operator, self.value)
    }
}

/// A restriction over metadata columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaDataRestriction {
    groups: Vec<Vec<MetaDataCondition>>,
}

impl MetaDataRestriction {
    pub fn new() -> Self {
        MetaDataRestriction::default()
    }

    /// Add a condition. With `new_group` (or when there is no group yet) the
    /// condition opens a new ANDed group, otherwise it is ORed into the last.
    pub fn add_condition<S: Into<String>>(
        &mut self,
        operator: CompareOperator,
        column: S,
        value: NumericValue,
        new_group: bool,
    ) {
        let condition = MetaDataCondition {
            operator,
            column: column.into(),
            value,
        };
        match self.groups.last_mut() {
            Some(group) if !new_group => group.push(condition),
            _ => self.groups.push(vec![condition]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[Vec<MetaDataCondition>] {
        &self.groups
    }

    /// Resolve column names against `schema`.
    pub fn compile(&self, schema: &MetaDataSchema) -> Result<CompiledRestriction> {
        let groups = self
            .groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|cond| {
                        let column = schema.index_of(&cond.column).ok_or_else(|| {
                            QuarryError::evaluation(format!(
                                "restriction references unknown metadata column '{}'",
                                cond.column
                            ))
                        })?;
                        Ok((column, cond.operator, cond.value))
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CompiledRestriction { groups })
    }
}

impl fmt::Display for MetaDataRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, group) in self.groups.iter().enumerate() {
            if idx > 0 {
                f.write_str(" AND ")?;
            }
            let conditions: Vec<String> = group.iter().map(ToString::to_string).collect();
            if conditions.len() > 1 {
                write!(f, "({})", conditions.join(" OR "))?;
            } else {
                f.write_str(&conditions.join(""))?;
            }
        }
        Ok(())
    }
}

/// A restriction with column names resolved to column indices.
#[derive(Debug, Clone, Default)]
pub struct CompiledRestriction {
    groups: Vec<Vec<(usize, CompareOperator, NumericValue)>>,
}

impl CompiledRestriction {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether the metadata of `docno` satisfies every group.
    pub fn matches(&self, table: &MetaDataTable, docno: DocNo) -> bool {
        self.groups.iter().all(|group| {
            group
                .iter()
                .any(|(column, op, value)| op.holds(&table.get(docno, *column), value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MetaDataTable {
        let schema: MetaDataSchema = "date UINT32, cross INT8".parse().unwrap();
        let mut table = MetaDataTable::new(schema.clone());
        for (docno, date, cross) in [(1u32, 100i64, -1i64), (2, 200, 0), (3, 300, 1)] {
            let mut doc = crate::index::document::AnalyzedDocument::new();
            doc.set_metadata("date", date).set_metadata("cross", cross);
            table.set_record(docno, &schema.build_record(&doc).unwrap());
        }
        table
    }

    #[test]
    fn test_cnf_semantics() {
        let table = table();
        let mut restriction = MetaDataRestriction::new();
        restriction.add_condition(CompareOperator::GreaterEqual, "date", 150i64.into(), true);
        restriction.add_condition(CompareOperator::Equal, "cross", (-1i64).into(), false);
        restriction.add_condition(CompareOperator::NotEqual, "cross", 1i64.into(), true);

        let compiled = restriction.compile(table.schema()).unwrap();
        let matching: Vec<DocNo> = (1..=3).filter(|&d| compiled.matches(&table, d)).collect();
        assert_eq!(matching, vec![1, 2]);
        assert_eq!(
            restriction.to_string(),
            "(date >= 150 OR cross = -1) AND cross != 1"
        );
    }

    #[test]
    fn test_unknown_column() {
        let mut restriction = MetaDataRestriction::new();
        restriction.add_condition(CompareOperator::Less, "nope", 1i64.into(), true);
        let err = restriction.compile(table().schema()).unwrap_err();
        assert!(matches!(err, QuarryError::Evaluation(_)));
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!("<=".parse::<CompareOperator>().unwrap(), CompareOperator::LessEqual);
        assert!("~".parse::<CompareOperator>().is_err());
    }
}
