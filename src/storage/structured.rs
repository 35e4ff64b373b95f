//! Checksummed binary serialization for index files and statistics blobs.
//!
//! [`StructWriter`] and [`StructReader`] wrap any byte sink or source and keep
//! a running CRC32 over everything that passes through them. The writer's
//! `finish` appends the checksum; the reader's `verify_checksum` checks it.
//! Fixed width integers are little-endian, lengths are varints.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{QuarryError, Result};
use crate::util::varint::{MAX_VARINT_LEN, decode_u64, encode_u64, zigzag_decode, zigzag_encode};

/// Running checksum and byte count shared by writer and reader.
#[derive(Default)]
struct Tally {
    hasher: Hasher,
    bytes: u64,
}

impl Tally {
    fn add(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

macro_rules! fixed_width {
    ($write:ident, $read:ident, $ty:ty) => {
        impl<W: Write> StructWriter<W> {
            pub fn $write(&mut self, value: $ty) -> Result<()> {
                self.write_raw(&value.to_le_bytes())
            }
        }

        impl<R: Read> StructReader<R> {
            pub fn $read(&mut self) -> Result<$ty> {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                self.reader.read_exact(&mut bytes)?;
                self.tally.add(&bytes);
                Ok(<$ty>::from_le_bytes(bytes))
            }
        }
    };
}

/// Writes binary records and tracks their checksum.
pub struct StructWriter<W: Write> {
    writer: W,
    tally: Tally,
}

fixed_width!(write_u8, read_u8, u8);
fixed_width!(write_u16, read_u16, u16);
fixed_width!(write_u32, read_u32, u32);
fixed_width!(write_u64, read_u64, u64);

impl<W: Write> StructWriter<W> {
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            tally: Tally::default(),
        }
    }

    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        self.write_raw(&encode_u64(value))
    }

    /// Zigzag encoded, so small negative deltas stay short.
    pub fn write_signed_varint(&mut self, value: i64) -> Result<()> {
        self.write_varint(zigzag_encode(value))
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Length-prefixed byte string.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.write_raw(value)
    }

    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.tally.add(value);
        Ok(())
    }

    /// Ascending positions or document numbers, stored as count plus gaps.
    pub fn write_ascending_u32s(&mut self, values: &[u32]) -> Result<()> {
        self.write_varint(values.len() as u64)?;
        values.iter().try_fold(0u32, |last, &value| {
            self.write_varint(u64::from(value.wrapping_sub(last)))?;
            Ok::<u32, QuarryError>(value)
        })?;
        Ok(())
    }

    /// Bytes written so far, checksum excluded.
    pub fn position(&self) -> u64 {
        self.tally.bytes
    }

    /// Append the checksum and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        self.writer.write_u32::<LittleEndian>(self.tally.checksum())?;
        Ok(self.writer)
    }
}

/// Reads records written by [`StructWriter`].
pub struct StructReader<R: Read> {
    reader: R,
    tally: Tally,
}

impl<R: Read> StructReader<R> {
    pub fn new(reader: R) -> Self {
        StructReader {
            reader,
            tally: Tally::default(),
        }
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut bytes = Vec::with_capacity(4);
        while bytes.len() < MAX_VARINT_LEN {
            let byte = self.reader.read_u8()?;
            bytes.push(byte);
            if byte & 0x80 == 0 {
                break;
            }
        }
        let (value, _) = decode_u64(&bytes)?;
        self.tally.add(&bytes);
        Ok(value)
    }

    pub fn read_signed_varint(&mut self) -> Result<i64> {
        self.read_varint().map(zigzag_decode)
    }

    pub fn read_string(&mut self) -> Result<String> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|e| QuarryError::serialization(format!("string is not UTF-8: {e}")))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_varint()?;
        self.read_raw(length as usize)
    }

    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(length.min(1 << 20));
        let read = (&mut self.reader).take(length as u64).read_to_end(&mut bytes)?;
        if read != length {
            return Err(QuarryError::serialization(format!(
                "expected {length} bytes, found {read}"
            )));
        }
        self.tally.add(&bytes);
        Ok(bytes)
    }

    pub fn read_ascending_u32s(&mut self) -> Result<Vec<u32>> {
        let count = self.read_varint()? as usize;
        let mut values = Vec::with_capacity(count.min(1 << 16));
        let mut last = 0u32;
        for _ in 0..count {
            last = last.wrapping_add(self.read_varint()? as u32);
            values.push(last);
        }
        Ok(values)
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.tally.bytes
    }

    /// Compare the stored trailing checksum with everything read so far.
    pub fn verify_checksum(&mut self) -> Result<bool> {
        let stored = self.reader.read_u32::<LittleEndian>()?;
        Ok(stored == self.tally.checksum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_posting_record() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_string("word").unwrap();
        writer.write_string("capital").unwrap();
        writer.write_u32(3).unwrap();
        writer.write_ascending_u32s(&[2, 9, 10, 300]).unwrap();
        writer.write_signed_varint(-1).unwrap();
        writer.write_u8(7).unwrap();
        writer.write_u16(500).unwrap();
        writer.write_u64(1 << 40).unwrap();
        let written = writer.position();
        let buffer = writer.finish().unwrap();
        assert_eq!(buffer.len() as u64, written + 4);

        let mut reader = StructReader::new(Cursor::new(buffer));
        assert_eq!(reader.read_string().unwrap(), "word");
        assert_eq!(reader.read_string().unwrap(), "capital");
        assert_eq!(reader.read_u32().unwrap(), 3);
        assert_eq!(reader.read_ascending_u32s().unwrap(), vec![2, 9, 10, 300]);
        assert_eq!(reader.read_signed_varint().unwrap(), -1);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_u16().unwrap(), 500);
        assert_eq!(reader.read_u64().unwrap(), 1 << 40);
        assert_eq!(reader.position(), written);
        assert!(reader.verify_checksum().unwrap());
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_string("journal").unwrap();
        let mut buffer = writer.finish().unwrap();
        buffer[3] ^= 0x20;

        let mut reader = StructReader::new(Cursor::new(buffer));
        reader.read_string().unwrap();
        assert!(!reader.verify_checksum().unwrap());
    }

    #[test]
    fn test_short_input() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_string("journal").unwrap();
        let mut buffer = writer.finish().unwrap();
        buffer.truncate(4);

        let mut reader = StructReader::new(Cursor::new(buffer));
        assert!(matches!(reader.read_string(), Err(QuarryError::Serialization(_))));
    }
}
