//! Compilation of expression trees into posting iterators.

use log::trace;

use crate::error::{QuarryError, Result};
use crate::index::snapshot::Snapshot;
use crate::index::types::{DocNo, Position};
use crate::query::expression::{Expression, StructureOperator};
use crate::query::posting::structure::SequenceMode;
use crate::query::posting::{
    ContainsIterator, DiffIterator, DocFieldIterator, EmptyIterator, InsideIterator, IntersectIterator,
    PostingIterator, SequenceIterator, TermIterator, UnionIterator, WithinIterator,
};

/// Build the iterator of an expression against a snapshot.
///
/// Terms unknown to the snapshot and structures without children compile to
/// an [`EmptyIterator`]. Malformed structures are configuration errors, also
/// when they have no children.
pub fn compile(expr: &Expression, snapshot: &Snapshot) -> Result<Box<dyn PostingIterator>> {
    match expr {
        Expression::Term { .. } => {
            let Some(term) = expr.as_term() else {
                return Ok(Box::new(EmptyIterator));
            };
            match snapshot.postings(&term) {
                Some(list) => Ok(Box::new(TermIterator::new(term, list))),
                None => {
                    trace!("term {term} not in index");
                    Ok(Box::new(EmptyIterator))
                }
            }
        }
        Expression::DocField { start, end } => {
            let schema = snapshot.metadata().schema();
            let column = |name: &str| {
                schema
                    .index_of(name)
                    .ok_or_else(|| QuarryError::config(format!("unknown metadata column '{name}' in docfield")))
            };
            let (start, end) = (column(start)?, column(end)?);
            Ok(Box::new(DocFieldIterator::new(
                start,
                end,
                snapshot.metadata().clone(),
                snapshot.max_docno(),
                snapshot.nof_documents(),
            )))
        }
        Expression::Structure {
            operator,
            range,
            cardinality,
            children,
        } => compile_structure(*operator, *range, *cardinality as usize, children, snapshot),
    }
}

fn compile_structure(
    operator: StructureOperator,
    range: u32,
    cardinality: usize,
    children: &[Expression],
    snapshot: &Snapshot,
) -> Result<Box<dyn PostingIterator>> {
    let structural = matches!(
        operator,
        StructureOperator::SequenceStruct | StructureOperator::WithinStruct
    );
    if structural && children.len() < 2 {
        return Err(QuarryError::config(format!(
            "{operator} needs a delimiter and at least one argument"
        )));
    }
    let arity = if structural { children.len() - 1 } else { children.len() };
    if cardinality > arity {
        return Err(QuarryError::config(format!(
            "cardinality {cardinality} of {operator} exceeds its {arity} arguments"
        )));
    }
    if children.is_empty() {
        return Ok(Box::new(EmptyIterator));
    }
    if matches!(operator, StructureOperator::Diff | StructureOperator::Inside) && children.len() != 2 {
        return Err(QuarryError::config(format!(
            "{operator} needs exactly 2 arguments, got {}",
            children.len()
        )));
    }

    let mut compiled = children
        .iter()
        .map(|child| compile(child, snapshot))
        .collect::<Result<Vec<_>>>()?;
    let delimiter = if structural { Some(compiled.remove(0)) } else { None };

    let iterator: Box<dyn PostingIterator> = match operator {
        StructureOperator::Sequence | StructureOperator::SequenceStruct => Box::new(SequenceIterator::new(
            SequenceMode::Ordered { range },
            compiled,
            delimiter,
        )),
        StructureOperator::SequenceImm => {
            Box::new(SequenceIterator::new(SequenceMode::Immediate, compiled, None))
        }
        StructureOperator::Within | StructureOperator::WithinStruct => {
            Box::new(WithinIterator::new(range, cardinality, compiled, delimiter))
        }
        StructureOperator::Union => Box::new(UnionIterator::new(compiled)),
        StructureOperator::Intersect => Box::new(IntersectIterator::new(compiled)),
        StructureOperator::Contains => Box::new(ContainsIterator::new(cardinality, compiled)),
        StructureOperator::Diff | StructureOperator::Inside => {
            let mut pair = compiled.into_iter();
            let (Some(first), Some(second)) = (pair.next(), pair.next()) else {
                return Err(QuarryError::config(format!("{operator} needs exactly 2 arguments")));
            };
            if operator == StructureOperator::Diff {
                Box::new(DiffIterator::new(first, second))
            } else {
                Box::new(InsideIterator::new(first, second))
            }
        }
    };
    Ok(iterator)
}

/// Drain an iterator into the matching documents and their match positions.
pub fn collect_matches(iterator: &mut dyn PostingIterator) -> Vec<(DocNo, Vec<Position>)> {
    let mut out = Vec::new();
    let mut docno = iterator.skip_doc(1);
    while docno != 0 {
        let positions = iterator.spans().into_iter().map(|s| s.start).collect();
        out.push((docno, positions));
        docno = iterator.skip_doc(docno + 1);
    }
    out
}
