//! Fixed-width typed metadata columns.
//!
//! Every document owns one record of `record_size` bytes laid out column by
//! column in declaration order. Records are grouped into blocks that are
//! shared between snapshots, so a commit copies only the blocks it touches.
//!
//! A column may be *aggregated*: its value is derived from the document's
//! search index terms at insertion time instead of being supplied by the
//! caller (e.g. `doclen UINT16 = count(word)`).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::index::document::{AnalyzedDocument, NumericValue};
use crate::index::types::DocNo;

const BLOCK_ROWS: usize = 256;

/// Storage type of a metadata column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaDataType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
}

impl MetaDataType {
    /// Width of a value in bytes.
    pub fn size(&self) -> usize {
        match self {
            MetaDataType::Int8 | MetaDataType::UInt8 => 1,
            MetaDataType::Int16 | MetaDataType::UInt16 => 2,
            MetaDataType::Int32 | MetaDataType::UInt32 | MetaDataType::Float32 => 4,
        }
    }

    /// Upper case type name as used in schema strings.
    pub fn name(&self) -> &'static str {
        match self {
            MetaDataType::Int8 => "INT8",
            MetaDataType::UInt8 => "UINT8",
            MetaDataType::Int16 => "INT16",
            MetaDataType::UInt16 => "UINT16",
            MetaDataType::Int32 => "INT32",
            MetaDataType::UInt32 => "UINT32",
            MetaDataType::Float32 => "FLOAT32",
        }
    }

    fn range(&self) -> Option<(i64, i64)> {
        match self {
            MetaDataType::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            MetaDataType::UInt8 => Some((0, u8::MAX as i64)),
            MetaDataType::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            MetaDataType::UInt16 => Some((0, u16::MAX as i64)),
            MetaDataType::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            MetaDataType::UInt32 => Some((0, u32::MAX as i64)),
            MetaDataType::Float32 => None,
        }
    }

    /// Encode `value` into `buf`, failing when it does not fit the type.
    pub fn encode(&self, value: &NumericValue, buf: &mut [u8]) -> std::result::Result<(), String> {
        if let MetaDataType::Float32 = self {
            let v = value.as_f64();
            if !v.is_finite() || v.abs() > f32::MAX as f64 {
                return Err(format!("value {value} out of range for FLOAT32"));
            }
            LittleEndian::write_f32(buf, v as f32);
            return Ok(());
        }
        let v = value
            .as_i64()
            .ok_or_else(|| format!("value {value} is not an integer as required by {}", self.name()))?;
        if let Some((lo, hi)) = self.range() {
            if v < lo || v > hi {
                return Err(format!("value {v} out of range for {}", self.name()));
            }
        }
        self.write_int(v, buf);
        Ok(())
    }

    /// Encode an integer, clamping it into the type's range.
    fn encode_saturating(&self, value: i64, buf: &mut [u8]) -> bool {
        match self.range() {
            Some((lo, hi)) => {
                let clamped = value.clamp(lo, hi);
                self.write_int(clamped, buf);
                clamped == value
            }
            None => {
                LittleEndian::write_f32(buf, value as f32);
                true
            }
        }
    }

    fn write_int(&self, v: i64, buf: &mut [u8]) {
        match self {
            MetaDataType::Int8 => buf[0] = (v as i8) as u8,
            MetaDataType::UInt8 => buf[0] = v as u8,
            MetaDataType::Int16 => LittleEndian::write_i16(buf, v as i16),
            MetaDataType::UInt16 => LittleEndian::write_u16(buf, v as u16),
            MetaDataType::Int32 => LittleEndian::write_i32(buf, v as i32),
            MetaDataType::UInt32 => LittleEndian::write_u32(buf, v as u32),
            MetaDataType::Float32 => LittleEndian::write_f32(buf, v as f32),
        }
    }

    /// Decode a value from `buf`.
    pub fn decode(&self, buf: &[u8]) -> NumericValue {
        match self {
            MetaDataType::Int8 => NumericValue::Int(buf[0] as i8 as i64),
            MetaDataType::UInt8 => NumericValue::UInt(buf[0] as u64),
            MetaDataType::Int16 => NumericValue::Int(LittleEndian::read_i16(buf) as i64),
            MetaDataType::UInt16 => NumericValue::UInt(LittleEndian::read_u16(buf) as u64),
            MetaDataType::Int32 => NumericValue::Int(LittleEndian::read_i32(buf) as i64),
            MetaDataType::UInt32 => NumericValue::UInt(LittleEndian::read_u32(buf) as u64),
            MetaDataType::Float32 => NumericValue::Float(LittleEndian::read_f32(buf) as f64),
        }
    }
}

impl FromStr for MetaDataType {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INT8" => Ok(MetaDataType::Int8),
            "UINT8" => Ok(MetaDataType::UInt8),
            "INT16" => Ok(MetaDataType::Int16),
            "UINT16" => Ok(MetaDataType::UInt16),
            "INT32" => Ok(MetaDataType::Int32),
            "UINT32" => Ok(MetaDataType::UInt32),
            "FLOAT32" | "FLOAT" => Ok(MetaDataType::Float32),
            other => Err(QuarryError::config(format!("unknown metadata type '{other}'"))),
        }
    }
}

impl fmt::Display for MetaDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Derivation rule of an aggregated column, evaluated over search index terms
/// of one term type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregator {
    /// Number of occurrences.
    Count(String),
    /// Smallest position.
    MinPos(String),
    /// Largest position.
    MaxPos(String),
    /// Largest position plus one (end of a span marked by the type).
    NextPos(String),
}

impl Aggregator {
    /// Compute the aggregate for a document. Missing types yield 0.
    pub fn compute(&self, doc: &AnalyzedDocument) -> i64 {
        fn positions<'a>(doc: &'a AnalyzedDocument, term_type: &'a str) -> impl Iterator<Item = i64> + 'a {
            doc.search_index
                .iter()
                .filter(move |t| t.term_type == term_type)
                .map(|t| t.position as i64)
        }
        let positions = |term_type| positions(doc, term_type);
        match self {
            Aggregator::Count(t) => positions(t).count() as i64,
            Aggregator::MinPos(t) => positions(t).min().unwrap_or(0),
            Aggregator::MaxPos(t) => positions(t).max().unwrap_or(0),
            Aggregator::NextPos(t) => positions(t).max().map(|p| p + 1).unwrap_or(0),
        }
    }
}

impl FromStr for Aggregator {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (func, rest) = s
            .split_once('(')
            .ok_or_else(|| QuarryError::config(format!("malformed aggregator '{s}'")))?;
        let arg = rest
            .strip_suffix(')')
            .ok_or_else(|| QuarryError::config(format!("malformed aggregator '{s}'")))?
            .trim()
            .to_string();
        if arg.is_empty() {
            return Err(QuarryError::config(format!("aggregator '{s}' without term type")));
        }
        match func.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(Aggregator::Count(arg)),
            "minpos" => Ok(Aggregator::MinPos(arg)),
            "maxpos" => Ok(Aggregator::MaxPos(arg)),
            "nextpos" => Ok(Aggregator::NextPos(arg)),
            other => Err(QuarryError::config(format!("unknown aggregator '{other}'"))),
        }
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregator::Count(t) => write!(f, "count({t})"),
            Aggregator::MinPos(t) => write!(f, "minpos({t})"),
            Aggregator::MaxPos(t) => write!(f, "maxpos({t})"),
            Aggregator::NextPos(t) => write!(f, "nextpos({t})"),
        }
    }
}

/// Declaration of one metadata column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDataColumn {
    pub name: String,
    pub data_type: MetaDataType,
    #[serde(default)]
    pub aggregator: Option<Aggregator>,
}

impl MetaDataColumn {
    pub fn new<S: Into<String>>(name: S, data_type: MetaDataType) -> Self {
        MetaDataColumn {
            name: name.into(),
            data_type,
            aggregator: None,
        }
    }

    pub fn aggregated<S: Into<String>>(name: S, data_type: MetaDataType, aggregator: Aggregator) -> Self {
        MetaDataColumn {
            name: name.into(),
            data_type,
            aggregator: Some(aggregator),
        }
    }
}

/// Ordered list of metadata columns with their record layout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<MetaDataColumn>", into = "Vec<MetaDataColumn>")]
pub struct MetaDataSchema {
    columns: Vec<MetaDataColumn>,
    offsets: Vec<usize>,
    record_size: usize,
}

impl MetaDataSchema {
    /// Build a schema, rejecting duplicate or empty column names.
    pub fn new(columns: Vec<MetaDataColumn>) -> Result<Self> {
        let mut offsets = Vec::with_capacity(columns.len());
        let mut record_size = 0;
        for (idx, column) in columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(QuarryError::config("metadata column without name"));
            }
            if columns[..idx].iter().any(|c| c.name == column.name) {
                return Err(QuarryError::config(format!(
                    "duplicate metadata column '{}'",
                    column.name
                )));
            }
            offsets.push(record_size);
            record_size += column.data_type.size();
        }
        Ok(MetaDataSchema {
            columns,
            offsets,
            record_size,
        })
    }

    pub fn columns(&self) -> &[MetaDataColumn] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&MetaDataColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn slot(&self, idx: usize) -> (usize, usize) {
        let start = self.offsets[idx];
        (start, start + self.columns[idx].data_type.size())
    }

    /// Build the record of a document. Values for unknown or aggregated
    /// columns and values that do not fit their column are rejected.
    pub fn build_record(&self, doc: &AnalyzedDocument) -> Result<Vec<u8>> {
        let mut record = vec![0u8; self.record_size];
        for (name, value) in &doc.metadata {
            let idx = self.index_of(name).ok_or_else(|| {
                QuarryError::transaction(format!("unknown metadata column '{name}'"))
            })?;
            let column = &self.columns[idx];
            if column.aggregator.is_some() {
                return Err(QuarryError::transaction(format!(
                    "metadata column '{name}' is aggregated and cannot be assigned"
                )));
            }
            let (start, end) = self.slot(idx);
            column
                .data_type
                .encode(value, &mut record[start..end])
                .map_err(|msg| {
                    QuarryError::transaction(format!("metadata column '{name}': {msg}"))
                })?;
        }
        for (idx, column) in self.columns.iter().enumerate() {
            if let Some(aggregator) = &column.aggregator {
                let value = aggregator.compute(doc);
                let (start, end) = self.slot(idx);
                if !column.data_type.encode_saturating(value, &mut record[start..end]) {
                    warn!(
                        "aggregated metadata column '{}' saturated: {} does not fit {}",
                        column.name, value, column.data_type
                    );
                }
            }
        }
        Ok(record)
    }

    /// Decode column `idx` from a record.
    pub fn decode(&self, record: &[u8], idx: usize) -> NumericValue {
        let (start, end) = self.slot(idx);
        self.columns[idx].data_type.decode(&record[start..end])
    }
}

impl TryFrom<Vec<MetaDataColumn>> for MetaDataSchema {
    type Error = QuarryError;

    fn try_from(columns: Vec<MetaDataColumn>) -> Result<Self> {
        MetaDataSchema::new(columns)
    }
}

impl From<MetaDataSchema> for Vec<MetaDataColumn> {
    fn from(schema: MetaDataSchema) -> Self {
        schema.columns
    }
}

impl FromStr for MetaDataSchema {
    type Err = QuarryError;

    /// Parse `name TYPE [= aggregator(type)], ...`.
    fn from_str(s: &str) -> Result<Self> {
        let mut columns = Vec::new();
        for decl in s.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let (head, aggregator) = match decl.split_once('=') {
                Some((head, agg)) => (head.trim(), Some(agg.parse::<Aggregator>()?)),
                None => (decl, None),
            };
            let mut parts = head.split_whitespace();
            let name = parts
                .next()
                .ok_or_else(|| QuarryError::config(format!("malformed metadata column '{decl}'")))?;
            let data_type = parts
                .next()
                .ok_or_else(|| {
                    QuarryError::config(format!("metadata column '{name}' without type"))
                })?
                .parse::<MetaDataType>()?;
            if parts.next().is_some() {
                return Err(QuarryError::config(format!(
                    "malformed metadata column '{decl}'"
                )));
            }
            columns.push(MetaDataColumn {
                name: name.to_string(),
                data_type,
                aggregator,
            });
        }
        MetaDataSchema::new(columns)
    }
}

impl fmt::Display for MetaDataSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, column) in self.columns.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", column.name, column.data_type)?;
            if let Some(aggregator) = &column.aggregator {
                write!(f, " = {aggregator}")?;
            }
        }
        Ok(())
    }
}

/// A schema migration step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaDataCommand {
    /// Append a new column initialized with zero.
    Add { name: String, data_type: MetaDataType },
    /// Drop a column.
    Remove { name: String },
    /// Rename a column keeping its values.
    Rename { old: String, new: String },
    /// Change the type of a column, converting values with a range check.
    Alter { name: String, data_type: MetaDataType },
    /// Reset all values of a column to zero.
    Clear { name: String },
}

/// Row-major metadata records indexed by document number.
#[derive(Debug, Clone)]
pub struct MetaDataTable {
    schema: Arc<MetaDataSchema>,
    blocks: Vec<Arc<Vec<u8>>>,
}

impl MetaDataTable {
    /// Create an empty table.
    pub fn new(schema: MetaDataSchema) -> Self {
        MetaDataTable {
            schema: Arc::new(schema),
            blocks: Vec::new(),
        }
    }

    pub fn schema(&self) -> &MetaDataSchema {
        &self.schema
    }

    fn locate(&self, docno: DocNo) -> Option<(usize, usize)> {
        if docno == 0 || self.schema.record_size == 0 {
            return None;
        }
        let row = docno as usize - 1;
        let size = self.schema.record_size;
        Some((row / BLOCK_ROWS, (row % BLOCK_ROWS) * size))
    }

    /// The raw record of a document, if it was ever written.
    pub fn record(&self, docno: DocNo) -> Option<&[u8]> {
        let (block, offset) = self.locate(docno)?;
        let data = self.blocks.get(block)?;
        Some(&data[offset..offset + self.schema.record_size])
    }

    /// Value of column `idx` for a document; zero when unset.
    pub fn get(&self, docno: DocNo, idx: usize) -> NumericValue {
        match self.record(docno) {
            Some(record) => self.schema.decode(record, idx),
            None => self.schema.columns[idx].data_type.decode(&[0u8; 4]),
        }
    }

    /// Value of the named column, `None` if the column does not exist.
    pub fn get_by_name(&self, docno: DocNo, name: &str) -> Option<NumericValue> {
        self.schema.index_of(name).map(|idx| self.get(docno, idx))
    }

    /// Store a record for a document.
    pub fn set_record(&mut self, docno: DocNo, record: &[u8]) {
        let Some((block, offset)) = self.locate(docno) else {
            return;
        };
        let block_bytes = BLOCK_ROWS * self.schema.record_size;
        while self.blocks.len() <= block {
            self.blocks.push(Arc::new(vec![0u8; block_bytes]));
        }
        let data = Arc::make_mut(&mut self.blocks[block]);
        data[offset..offset + record.len()].copy_from_slice(record);
    }

    /// Reset the record of a document to zero.
    pub fn clear_record(&mut self, docno: DocNo) {
        if self.record(docno).is_some() {
            let zero = vec![0u8; self.schema.record_size];
            self.set_record(docno, &zero);
        }
    }

    /// Apply migration commands, producing a new table with converted records
    /// for documents `1..=max_docno`.
    pub fn alter(&self, commands: &[MetaDataCommand], max_docno: DocNo) -> Result<MetaDataTable> {
        // (column, source column index in the old schema)
        let mut layout: Vec<(MetaDataColumn, Option<usize>)> = self
            .schema
            .columns
            .iter()
            .cloned()
            .enumerate()
            .map(|(idx, col)| (col, Some(idx)))
            .collect();

        let find = |layout: &Vec<(MetaDataColumn, Option<usize>)>, name: &str| {
            layout
                .iter()
                .position(|(c, _)| c.name == name)
                .ok_or_else(|| QuarryError::config(format!("unknown metadata column '{name}'")))
        };

        for command in commands {
            match command {
                MetaDataCommand::Add { name, data_type } => {
                    if layout.iter().any(|(c, _)| &c.name == name) {
                        return Err(QuarryError::config(format!(
                            "metadata column '{name}' already exists"
                        )));
                    }
                    layout.push((MetaDataColumn::new(name.clone(), *data_type), None));
                }
                MetaDataCommand::Remove { name } => {
                    let idx = find(&layout, name)?;
                    layout.remove(idx);
                }
                MetaDataCommand::Rename { old, new } => {
                    if layout.iter().any(|(c, _)| &c.name == new) {
                        return Err(QuarryError::config(format!(
                            "metadata column '{new}' already exists"
                        )));
                    }
                    let idx = find(&layout, old)?;
                    layout[idx].0.name = new.clone();
                }
                MetaDataCommand::Alter { name, data_type } => {
                    let idx = find(&layout, name)?;
                    layout[idx].0.data_type = *data_type;
                }
                MetaDataCommand::Clear { name } => {
                    let idx = find(&layout, name)?;
                    layout[idx].1 = None;
                }
            }
        }

        let schema = MetaDataSchema::new(layout.iter().map(|(c, _)| c.clone()).collect())?;
        let mut table = MetaDataTable::new(schema);
        for docno in 1..=max_docno {
            let Some(old_record) = self.record(docno) else {
                continue;
            };
            let mut record = vec![0u8; table.schema.record_size];
            for (new_idx, (column, source)) in layout.iter().enumerate() {
                let Some(source) = source else { continue };
                let value = self.schema.decode(old_record, *source);
                let (start, end) = table.schema.slot(new_idx);
                column
                    .data_type
                    .encode(&value, &mut record[start..end])
                    .map_err(|msg| {
                        QuarryError::transaction(format!(
                            "cannot convert metadata column '{}' of document {docno}: {msg}",
                            column.name
                        ))
                    })?;
            }
            table.set_record(docno, &record);
        }
        Ok(table)
    }

    /// Serialize records `1..=max_docno`.
    pub fn to_bytes(&self, max_docno: DocNo) -> Vec<u8> {
        let size = self.schema.record_size;
        let mut bytes = Vec::with_capacity(size * max_docno as usize);
        for docno in 1..=max_docno {
            match self.record(docno) {
                Some(record) => bytes.extend_from_slice(record),
                None => bytes.extend(std::iter::repeat_n(0u8, size)),
            }
        }
        bytes
    }

    /// Inverse of [`MetaDataTable::to_bytes`].
    pub fn from_bytes(schema: MetaDataSchema, bytes: &[u8]) -> Result<Self> {
        let mut table = MetaDataTable::new(schema);
        let size = table.schema.record_size;
        if size == 0 {
            return Ok(table);
        }
        if bytes.len() % size != 0 {
            return Err(QuarryError::serialization(
                "metadata records do not match the schema record size",
            ));
        }
        for (idx, record) in bytes.chunks(size).enumerate() {
            if record.iter().any(|&b| b != 0) {
                table.set_record(idx as DocNo + 1, record);
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> MetaDataSchema {
        "doclen UINT16 = count(word), cross INT8, score FLOAT32"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_parse_schema() {
        let schema = schema();
        assert_eq!(schema.columns().len(), 3);
        assert_eq!(schema.record_size(), 7);
        assert_eq!(
            schema.column("doclen").unwrap().aggregator,
            Some(Aggregator::Count("word".to_string()))
        );
        assert_eq!(
            schema.to_string(),
            "doclen UINT16 = count(word), cross INT8, score FLOAT32"
        );
    }

    #[test]
    fn test_schema_errors() {
        assert!("a UINT8, a INT8".parse::<MetaDataSchema>().is_err());
        assert!("a UINT64".parse::<MetaDataSchema>().is_err());
        assert!("a".parse::<MetaDataSchema>().is_err());
        assert!("a UINT8 = sum(word)".parse::<MetaDataSchema>().is_err());
    }

    #[test]
    fn test_build_record_and_read_back() {
        let schema = schema();
        let mut doc = AnalyzedDocument::new();
        doc.add_text("word", "a b c");
        doc.set_metadata("cross", -3);
        doc.set_metadata("score", 1.5);

        let mut table = MetaDataTable::new(schema.clone());
        table.set_record(2, &schema.build_record(&doc).unwrap());

        assert_eq!(table.get_by_name(2, "doclen"), Some(NumericValue::UInt(3)));
        assert_eq!(table.get_by_name(2, "cross"), Some(NumericValue::Int(-3)));
        assert_eq!(table.get_by_name(2, "score"), Some(NumericValue::Float(1.5)));
        assert_eq!(table.get_by_name(1, "cross"), Some(NumericValue::Int(0)));
        assert_eq!(table.get_by_name(2, "missing"), None);
    }

    #[test]
    fn test_record_validation() {
        let schema = schema();
        let mut doc = AnalyzedDocument::new();
        doc.set_metadata("cross", 300);
        assert!(matches!(
            schema.build_record(&doc),
            Err(QuarryError::Transaction(_))
        ));

        let mut doc = AnalyzedDocument::new();
        doc.set_metadata("unknown", 1);
        assert!(schema.build_record(&doc).is_err());

        let mut doc = AnalyzedDocument::new();
        doc.set_metadata("doclen", 1);
        assert!(schema.build_record(&doc).is_err());
    }

    #[test]
    fn test_alter_table() {
        let schema: MetaDataSchema = "a UINT8, b UINT16".parse().unwrap();
        let mut table = MetaDataTable::new(schema.clone());
        let mut doc = AnalyzedDocument::new();
        doc.set_metadata("a", 7);
        doc.set_metadata("b", 1000);
        table.set_record(1, &schema.build_record(&doc).unwrap());

        let altered = table
            .alter(
                &[
                    MetaDataCommand::Rename {
                        old: "a".to_string(),
                        new: "x".to_string(),
                    },
                    MetaDataCommand::Alter {
                        name: "x".to_string(),
                        data_type: MetaDataType::Int32,
                    },
                    MetaDataCommand::Add {
                        name: "c".to_string(),
                        data_type: MetaDataType::UInt8,
                    },
                    MetaDataCommand::Clear {
                        name: "b".to_string(),
                    },
                ],
                1,
            )
            .unwrap();
        assert_eq!(altered.get_by_name(1, "x"), Some(NumericValue::Int(7)));
        assert_eq!(altered.get_by_name(1, "b"), Some(NumericValue::UInt(0)));
        assert_eq!(altered.get_by_name(1, "c"), Some(NumericValue::UInt(0)));
        assert_eq!(altered.get_by_name(1, "a"), None);

        let narrowing = table.alter(
            &[MetaDataCommand::Alter {
                name: "b".to_string(),
                data_type: MetaDataType::UInt8,
            }],
            1,
        );
        assert!(narrowing.is_err());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let schema: MetaDataSchema = "a UINT8".parse().unwrap();
        let mut table = MetaDataTable::new(schema.clone());
        table.set_record(3, &[9]);
        let bytes = table.to_bytes(3);
        assert_eq!(bytes, vec![0, 0, 9]);
        let restored = MetaDataTable::from_bytes(schema, &bytes).unwrap();
        assert_eq!(restored.get_by_name(3, "a"), Some(NumericValue::UInt(9)));
    }
}
