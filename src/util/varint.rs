//! Variable-length integers: seven bits per byte, high bit set while more
//! bytes follow. Signed values are zigzag mapped first so that small
//! magnitudes of either sign stay short; statistics increments rely on that.

use crate::error::{QuarryError, Result};

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

pub fn encode_u64(mut value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VARINT_LEN);
    while value >= 0x80 {
        bytes.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    bytes.push(value as u8);
    bytes
}

/// Decode one varint from the front of `bytes`; returns the value and the
/// number of bytes it took.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (idx, &byte) in bytes.iter().take(MAX_VARINT_LEN).enumerate() {
        let low = u64::from(byte & 0x7F);
        let shift = 7 * idx as u32;
        if shift == 63 && low > 1 {
            return Err(QuarryError::serialization("varint overflows 64 bits"));
        }
        value |= low << shift;
        if byte & 0x80 == 0 {
            return Ok((value, idx + 1));
        }
    }
    if bytes.len() >= MAX_VARINT_LEN {
        Err(QuarryError::serialization("varint overflows 64 bits"))
    } else {
        Err(QuarryError::serialization("varint is cut off"))
    }
}

/// 0, -1, 1, -2, ... map to 0, 1, 2, 3, ...
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        for (value, len) in [(0u64, 1), (127, 1), (128, 2), (16_383, 2), (16_384, 3), (u64::MAX, 10)] {
            let encoded = encode_u64(value);
            assert_eq!(encoded.len(), len, "{value}");
            assert_eq!(decode_u64(&encoded).unwrap(), (value, len));
        }
    }

    #[test]
    fn test_decode_reads_only_the_first_value() {
        let mut bytes = encode_u64(300);
        bytes.extend(encode_u64(5));
        assert_eq!(decode_u64(&bytes).unwrap(), (300, 2));
        assert_eq!(decode_u64(&bytes[2..]).unwrap(), (5, 1));
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        for v in [0i64, 5, -5, i64::MAX, i64::MIN] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }

    #[test]
    fn test_malformed() {
        assert!(decode_u64(&[0x80]).is_err());
        assert!(decode_u64(&[]).is_err());
        assert!(decode_u64(&[0xFF; 11]).is_err());
        assert!(decode_u64(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02]).is_err());
    }
}
