//! Binary statistics blobs.
//!
//! Layout (all integers little-endian, varints as in [`crate::util::varint`]):
//!
//! ```text
//! magic "QSTB" | version u16 | encoding u8 | origin u8
//! unixtime u64 | counter u64 | part u32
//! nofdocs delta (signed varint) | entry count (varint)
//! entries ... | crc32 u32
//! ```
//!
//! The `std` encoding writes every entry as type, value and increment. The
//! `compact` encoding writes a sorted type table once and prefix-compresses
//! the sorted values. Decoding rejects unknown versions, unknown encodings,
//! checksum mismatches and trailing garbage instead of guessing.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::index::types::Term;
use crate::statistics::{DfChange, StatisticsRecord, TimeStamp};
use crate::storage::structured::{StructReader, StructWriter};

const BLOB_MAGIC: &[u8; 4] = b"QSTB";
const BLOB_VERSION: u16 = 1;

/// Statistics blob encoding, selected by the `statsproc` configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatsProcKind {
    #[default]
    Std,
    Compact,
}

impl StatsProcKind {
    fn tag(&self) -> u8 {
        match self {
            StatsProcKind::Std => 0,
            StatsProcKind::Compact => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(StatsProcKind::Std),
            1 => Ok(StatsProcKind::Compact),
            other => Err(QuarryError::consistency(format!(
                "unknown statistics blob encoding {other}"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StatsProcKind::Std => "std",
            StatsProcKind::Compact => "compact",
        }
    }
}

impl FromStr for StatsProcKind {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "std" | "default" => Ok(StatsProcKind::Std),
            "compact" => Ok(StatsProcKind::Compact),
            other => Err(QuarryError::config(format!(
                "unknown statistics processor '{other}'"
            ))),
        }
    }
}

impl fmt::Display for StatsProcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a blob describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlobOrigin {
    /// Changes of one commit.
    Update,
    /// Full statistics of a storage registering with a peer.
    Register,
    /// Full statistics with negated sign, withdrawing a storage.
    Deregister,
}

impl BlobOrigin {
    fn tag(&self) -> u8 {
        match self {
            BlobOrigin::Update => 0,
            BlobOrigin::Register => 1,
            BlobOrigin::Deregister => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(BlobOrigin::Update),
            1 => Ok(BlobOrigin::Register),
            2 => Ok(BlobOrigin::Deregister),
            other => Err(QuarryError::consistency(format!(
                "unknown statistics blob origin {other}"
            ))),
        }
    }
}

/// Decoded content of a statistics blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsMessage {
    pub timestamp: TimeStamp,
    pub part: u32,
    pub origin: BlobOrigin,
    pub encoding: StatsProcKind,
    pub nofdocs_delta: i64,
    pub changes: Vec<DfChange>,
}

impl StatisticsMessage {
    /// Key identifying a blob for duplicate detection.
    pub fn key(&self) -> (TimeStamp, u32, BlobOrigin) {
        (self.timestamp, self.part, self.origin)
    }

    /// Split a record into messages of at most `max_entries` entries. The
    /// document count delta travels with part 0. An empty record still yields
    /// one message so that consumers can advance their timestamp.
    pub fn split(
        record: &StatisticsRecord,
        origin: BlobOrigin,
        encoding: StatsProcKind,
        max_entries: usize,
    ) -> Vec<StatisticsMessage> {
        let max_entries = max_entries.max(1);
        let mut messages = Vec::new();
        let mut chunks = record.changes.chunks(max_entries).peekable();
        if chunks.peek().is_none() {
            messages.push(StatisticsMessage {
                timestamp: record.timestamp,
                part: 0,
                origin,
                encoding,
                nofdocs_delta: record.nofdocs_delta,
                changes: Vec::new(),
            });
            return messages;
        }
        for (part, chunk) in chunks.enumerate() {
            messages.push(StatisticsMessage {
                timestamp: record.timestamp,
                part: part as u32,
                origin,
                encoding,
                nofdocs_delta: if part == 0 { record.nofdocs_delta } else { 0 },
                changes: chunk.to_vec(),
            });
        }
        messages
    }

    /// Encode into a blob.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_raw(BLOB_MAGIC)?;
        writer.write_u16(BLOB_VERSION)?;
        writer.write_u8(self.encoding.tag())?;
        writer.write_u8(self.origin.tag())?;
        writer.write_u64(self.timestamp.unixtime)?;
        writer.write_u64(self.timestamp.counter)?;
        writer.write_u32(self.part)?;
        writer.write_signed_varint(self.nofdocs_delta)?;
        writer.write_varint(self.changes.len() as u64)?;
        match self.encoding {
            StatsProcKind::Std => {
                for change in &self.changes {
                    writer.write_string(&change.term.term_type)?;
                    writer.write_string(&change.term.value)?;
                    writer.write_signed_varint(change.increment)?;
                }
            }
            StatsProcKind::Compact => encode_compact(&mut writer, &self.changes)?,
        }
        writer.finish()
    }

    /// Decode a blob, failing closed on anything unexpected.
    pub fn decode(blob: &[u8]) -> Result<Self> {
        let mut reader = StructReader::new(Cursor::new(blob));
        let truncated = |_| QuarryError::consistency("truncated statistics blob");

        let magic = reader.read_raw(4).map_err(truncated)?;
        if magic.as_slice() != BLOB_MAGIC {
            return Err(QuarryError::consistency("not a statistics blob"));
        }
        let version = reader.read_u16().map_err(truncated)?;
        if version != BLOB_VERSION {
            return Err(QuarryError::consistency(format!(
                "unsupported statistics blob version {version}"
            )));
        }
        let encoding = StatsProcKind::from_tag(reader.read_u8().map_err(truncated)?)?;
        let origin = BlobOrigin::from_tag(reader.read_u8().map_err(truncated)?)?;
        let unixtime = reader.read_u64().map_err(truncated)?;
        let counter = reader.read_u64().map_err(truncated)?;
        let part = reader.read_u32().map_err(truncated)?;
        let nofdocs_delta = reader.read_signed_varint().map_err(truncated)?;
        let count = reader.read_varint().map_err(truncated)? as usize;

        let changes = match encoding {
            StatsProcKind::Std => {
                let mut changes = Vec::with_capacity(count.min(1 << 16));
                for _ in 0..count {
                    let term_type = reader.read_string().map_err(truncated)?;
                    let value = reader.read_string().map_err(truncated)?;
                    let increment = reader.read_signed_varint().map_err(truncated)?;
                    changes.push(DfChange {
                        term: Term::new(term_type, value),
                        increment,
                    });
                }
                changes
            }
            StatsProcKind::Compact => decode_compact(&mut reader, count).map_err(truncated)?,
        };

        if !reader.verify_checksum().map_err(truncated)? {
            return Err(QuarryError::consistency("statistics blob checksum mismatch"));
        }
        if reader.position() + 4 != blob.len() as u64 {
            return Err(QuarryError::consistency(
                "trailing bytes after statistics blob",
            ));
        }

        Ok(StatisticsMessage {
            timestamp: TimeStamp::new(unixtime, counter),
            part,
            origin,
            encoding,
            nofdocs_delta,
            changes,
        })
    }
}

fn encode_compact(writer: &mut StructWriter<Vec<u8>>, changes: &[DfChange]) -> Result<()> {
    let mut sorted: Vec<&DfChange> = changes.iter().collect();
    sorted.sort_by(|a, b| a.term.cmp(&b.term));

    let mut types: Vec<&str> = sorted.iter().map(|c| c.term.term_type.as_str()).collect();
    types.dedup();
    writer.write_varint(types.len() as u64)?;
    for term_type in &types {
        writer.write_string(term_type)?;
    }

    let mut previous: &str = "";
    for change in sorted {
        let type_idx = types
            .binary_search(&change.term.term_type.as_str())
            .map_err(|_| QuarryError::other("statistics type table inconsistent"))?;
        let value = change.term.value.as_str();
        let shared = common_prefix(previous, value);
        writer.write_varint(type_idx as u64)?;
        writer.write_varint(shared as u64)?;
        writer.write_string(&value[shared..])?;
        writer.write_signed_varint(change.increment)?;
        previous = value;
    }
    Ok(())
}

fn decode_compact(reader: &mut StructReader<Cursor<&[u8]>>, count: usize) -> Result<Vec<DfChange>> {
    let ntypes = reader.read_varint()? as usize;
    let mut types = Vec::with_capacity(ntypes.min(1 << 12));
    for _ in 0..ntypes {
        types.push(reader.read_string()?);
    }

    let mut changes = Vec::with_capacity(count.min(1 << 16));
    let mut previous = String::new();
    for _ in 0..count {
        let type_idx = reader.read_varint()? as usize;
        let shared = reader.read_varint()? as usize;
        let suffix = reader.read_string()?;
        let increment = reader.read_signed_varint()?;
        let term_type = types
            .get(type_idx)
            .ok_or_else(|| QuarryError::serialization("type index out of range"))?;
        if shared > previous.len() || !previous.is_char_boundary(shared) {
            return Err(QuarryError::serialization("invalid shared prefix length"));
        }
        let value = format!("{}{}", &previous[..shared], suffix);
        changes.push(DfChange {
            term: Term::new(term_type.clone(), value.clone()),
            increment,
        });
        previous = value;
    }
    Ok(changes)
}

/// Length in bytes of the common prefix, on a char boundary.
fn common_prefix(a: &str, b: &str) -> usize {
    let mut len = 0;
    for (ca, cb) in a.chars().zip(b.chars()) {
        if ca != cb {
            break;
        }
        len += ca.len_utf8();
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StatisticsRecord {
        StatisticsRecord {
            timestamp: TimeStamp::new(1_700_000_000, 3),
            nofdocs_delta: 2,
            changes: vec![
                DfChange {
                    term: Term::new("word", "citizen"),
                    increment: 1,
                },
                DfChange {
                    term: Term::new("word", "city"),
                    increment: -2,
                },
                DfChange {
                    term: Term::new("title", "city"),
                    increment: 5,
                },
            ],
        }
    }

    #[test]
    fn test_std_roundtrip() {
        let messages = StatisticsMessage::split(&record(), BlobOrigin::Update, StatsProcKind::Std, 100);
        assert_eq!(messages.len(), 1);
        let blob = messages[0].encode().unwrap();
        let decoded = StatisticsMessage::decode(&blob).unwrap();
        assert_eq!(decoded, messages[0]);
    }

    #[test]
    fn test_compact_is_sorted_and_smaller() {
        let message = &StatisticsMessage::split(&record(), BlobOrigin::Update, StatsProcKind::Compact, 100)[0];
        let blob = message.encode().unwrap();
        let decoded = StatisticsMessage::decode(&blob).unwrap();

        let mut expected = record().changes;
        expected.sort_by(|a, b| a.term.cmp(&b.term));
        assert_eq!(decoded.changes, expected);
        assert_eq!(decoded.encoding, StatsProcKind::Compact);

        let std_blob = StatisticsMessage {
            encoding: StatsProcKind::Std,
            ..message.clone()
        }
        .encode()
        .unwrap();
        assert!(blob.len() < std_blob.len());
    }

    #[test]
    fn test_split_into_parts() {
        let messages = StatisticsMessage::split(&record(), BlobOrigin::Update, StatsProcKind::Std, 2);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].nofdocs_delta, 2);
        assert_eq!(messages[1].nofdocs_delta, 0);
        assert_eq!(messages[1].part, 1);
        assert_eq!(messages[1].changes.len(), 1);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut blob = StatisticsMessage::split(&record(), BlobOrigin::Update, StatsProcKind::Std, 10)[0]
            .encode()
            .unwrap();
        blob[4] = 9;
        let err = StatisticsMessage::decode(&blob).unwrap_err();
        assert!(matches!(err, QuarryError::Consistency(_)));
        assert!(err.to_string().contains("version 9"));
    }

    #[test]
    fn test_corruption_rejected() {
        let blob = StatisticsMessage::split(&record(), BlobOrigin::Update, StatsProcKind::Std, 10)[0]
            .encode()
            .unwrap();

        let mut flipped = blob.clone();
        let last = flipped.len() - 6;
        flipped[last] ^= 0x01;
        assert!(StatisticsMessage::decode(&flipped).is_err());

        assert!(StatisticsMessage::decode(&blob[..blob.len() - 3]).is_err());

        let mut extended = blob.clone();
        extended.push(0);
        assert!(StatisticsMessage::decode(&extended).is_err());

        assert!(StatisticsMessage::decode(b"nope").is_err());
    }

    #[test]
    fn test_parse_statsproc() {
        assert_eq!("compact".parse::<StatsProcKind>().unwrap(), StatsProcKind::Compact);
        assert_eq!("default".parse::<StatsProcKind>().unwrap(), StatsProcKind::Std);
        assert!("zip".parse::<StatsProcKind>().is_err());
    }
}
