//! Fixed-width 32-byte word encoding used by contract call data and event logs.
//!
//! Every scalar occupies exactly one word, rendered as 64 lowercase hex
//! characters and left-padded with zeros. Dynamic sequences are a count word
//! followed by the encoding of each element. Decoding never panics: short,
//! long or non-hex input is reported as a [`DecodeError`].

use alloy::primitives::{Address, B256, I256, U256};
use thiserror::Error;

pub const WORD_BYTES: usize = 32;
pub const WORD_HEX_LEN: usize = WORD_BYTES * 2;

pub type Word = [u8; WORD_BYTES];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected {expected} hex characters, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("word {index} out of bounds ({available} words available)")]
    OutOfBounds { index: usize, available: usize },

    #[error("{event}: expected {expected} topics, got {actual}")]
    TopicCount {
        event: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unknown function selector 0x{0}")]
    UnknownSelector(String),

    #[error("value does not fit in {0}")]
    Overflow(&'static str),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// A value that can be written as one or more words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    UnsignedInt(U256),
    SignedInt(I256),
    Address(Address),
    DynamicArray(Vec<AbiValue>),
}

impl AbiValue {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, AbiValue::DynamicArray(_))
    }
}

/// Encodes a single value. Arrays are written as count followed by elements.
pub fn encode(value: &AbiValue) -> String {
    match value {
        AbiValue::UnsignedInt(v) => hex::encode(v.to_be_bytes::<WORD_BYTES>()),
        // two's complement, sign-extended across the full word
        AbiValue::SignedInt(v) => hex::encode(v.into_raw().to_be_bytes::<WORD_BYTES>()),
        AbiValue::Address(a) => hex::encode(a.into_word()),
        AbiValue::DynamicArray(items) => {
            let mut out = encode(&AbiValue::UnsignedInt(U256::from(items.len())));
            for item in items {
                out.push_str(&encode(item));
            }
            out
        }
    }
}

/// Encodes an argument list with the standard head/tail layout: static values
/// sit in the head, dynamic values are replaced by a byte offset into the tail.
pub fn encode_arguments(values: &[AbiValue]) -> String {
    let head_bytes = values.len() * WORD_BYTES;
    let mut head = String::with_capacity(values.len() * WORD_HEX_LEN);
    let mut tail = String::new();

    for value in values {
        if value.is_dynamic() {
            let offset = head_bytes + tail.len() / 2;
            head.push_str(&encode(&AbiValue::UnsignedInt(U256::from(offset))));
            tail.push_str(&encode(value));
        } else {
            head.push_str(&encode(value));
        }
    }

    head.push_str(&tail);
    head
}

/// Builds call data from a 4-byte selector and its arguments.
pub fn encode_call(selector: [u8; 4], values: &[AbiValue]) -> Vec<u8> {
    let mut data = selector.to_vec();
    // encode_arguments only ever emits valid hex
    data.extend(hex::decode(encode_arguments(values)).unwrap_or_default());
    data
}

fn strip_prefix(input: &str) -> &str {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input)
}

/// Parses one 64-character word, with or without a `0x` prefix.
pub fn decode_word(input: &str) -> Result<Word, DecodeError> {
    let digits = strip_prefix(input);
    if digits.len() != WORD_HEX_LEN {
        return Err(DecodeError::WrongLength {
            expected: WORD_HEX_LEN,
            actual: digits.len(),
        });
    }

    let mut word = [0u8; WORD_BYTES];
    hex::decode_to_slice(digits, &mut word).map_err(|e| DecodeError::InvalidHex(e.to_string()))?;
    Ok(word)
}

pub fn decode_uint(input: &str) -> Result<U256, DecodeError> {
    decode_word(input).map(|w| U256::from_be_bytes(w))
}

pub fn decode_int(input: &str) -> Result<I256, DecodeError> {
    decode_uint(input).map(I256::from_raw)
}

/// Addresses live in the low 20 bytes of the word.
pub fn decode_address(input: &str) -> Result<Address, DecodeError> {
    decode_word(input).map(|w| Address::from_slice(&w[12..]))
}

/// Random-access reader over a sequence of words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Words {
    words: Vec<Word>,
}

impl Words {
    pub fn from_hex(input: &str) -> Result<Self, DecodeError> {
        let digits = strip_prefix(input);
        if digits.len() % WORD_HEX_LEN != 0 {
            return Err(DecodeError::WrongLength {
                expected: digits.len().div_ceil(WORD_HEX_LEN) * WORD_HEX_LEN,
                actual: digits.len(),
            });
        }
        let bytes = hex::decode(digits).map_err(|e| DecodeError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() % WORD_BYTES != 0 {
            return Err(DecodeError::WrongLength {
                expected: bytes.len().div_ceil(WORD_BYTES) * WORD_HEX_LEN,
                actual: bytes.len() * 2,
            });
        }

        let words = bytes
            .chunks_exact(WORD_BYTES)
            .map(|chunk| {
                let mut word = [0u8; WORD_BYTES];
                word.copy_from_slice(chunk);
                word
            })
            .collect();

        Ok(Self { words })
    }

    /// Indexed event topics are already one word each.
    pub fn from_topics(topics: &[B256]) -> Self {
        Self {
            words: topics.iter().map(|t| t.0).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.words.len()
    }

    pub fn word(&self, index: usize) -> Result<&Word, DecodeError> {
        self.words.get(index).ok_or(DecodeError::OutOfBounds {
            index,
            available: self.words.len(),
        })
    }

    pub fn uint(&self, index: usize) -> Result<U256, DecodeError> {
        self.word(index).map(|w| U256::from_be_bytes(*w))
    }

    pub fn int(&self, index: usize) -> Result<I256, DecodeError> {
        self.uint(index).map(I256::from_raw)
    }

    pub fn address(&self, index: usize) -> Result<Address, DecodeError> {
        self.word(index).map(|w| Address::from_slice(&w[12..]))
    }

    /// Reads a word that must fit a `usize`, such as a count or offset.
    pub fn usize_at(&self, index: usize) -> Result<usize, DecodeError> {
        let value = self.uint(index)?;
        usize::try_from(value).map_err(|_| DecodeError::Overflow("usize"))
    }

    /// Reads a count word at `start` followed by that many single-word
    /// elements. Returns the elements and the index of the next unread word.
    pub fn sequence<T>(
        &self,
        start: usize,
        element: impl Fn(&Words, usize) -> Result<T, DecodeError>,
    ) -> Result<(Vec<T>, usize), DecodeError> {
        let count = self.usize_at(start)?;
        let end = start
            .checked_add(1)
            .and_then(|first| first.checked_add(count))
            .ok_or(DecodeError::Overflow("usize"))?;
        if end > self.words.len() {
            return Err(DecodeError::OutOfBounds {
                index: end - 1,
                available: self.words.len(),
            });
        }

        let items = (start + 1..end)
            .map(|i| element(self, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((items, end))
    }

    /// Follows the byte offset stored at `head_index` to an address array.
    pub fn address_array(&self, head_index: usize) -> Result<Vec<Address>, DecodeError> {
        let offset = self.usize_at(head_index)?;
        if offset % WORD_BYTES != 0 {
            return Err(DecodeError::Malformed(format!(
                "array offset {offset} is not word aligned"
            )));
        }
        self.sequence(offset / WORD_BYTES, Words::address)
            .map(|(items, _)| items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn test_unsigned_is_left_padded() {
        let encoded = encode(&AbiValue::UnsignedInt(U256::from(255u64)));
        assert_eq!(encoded.len(), WORD_HEX_LEN);
        assert!(encoded.ends_with("ff"));
        assert!(encoded[..62].chars().all(|c| c == '0'));
    }

    #[test]
    fn test_negative_signed_is_sign_extended() {
        let encoded = encode(&AbiValue::SignedInt(I256::try_from(-1i64).unwrap()));
        assert_eq!(encoded, "f".repeat(64));
        assert_eq!(decode_int(&encoded).unwrap(), I256::try_from(-1i64).unwrap());
    }

    #[test]
    fn test_address_occupies_low_bytes() {
        let addr = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        let encoded = encode(&AbiValue::Address(addr));
        assert_eq!(&encoded[..24], "000000000000000000000000");
        assert_eq!(&encoded[24..], "c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        assert_eq!(decode_address(&format!("0x{encoded}")).unwrap(), addr);
    }

    #[test]
    fn test_array_is_count_then_elements() {
        let encoded = encode(&AbiValue::DynamicArray(vec![
            AbiValue::UnsignedInt(U256::from(7u64)),
            AbiValue::UnsignedInt(U256::from(9u64)),
        ]));
        assert_eq!(encoded.len(), 3 * WORD_HEX_LEN);

        let words = Words::from_hex(&encoded).unwrap();
        let (items, next) = words.sequence(0, Words::uint).unwrap();
        assert_eq!(items, vec![U256::from(7u64), U256::from(9u64)]);
        assert_eq!(next, 3);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        assert!(matches!(
            decode_uint("abc"),
            Err(DecodeError::WrongLength { expected: 64, actual: 3 })
        ));
        assert!(matches!(
            Words::from_hex(&"0".repeat(65)),
            Err(DecodeError::WrongLength { .. })
        ));
    }

    #[test]
    fn test_non_hex_is_rejected() {
        let bad = "zz".repeat(32);
        assert!(matches!(decode_uint(&bad), Err(DecodeError::InvalidHex(_))));
    }

    #[test]
    fn test_sequence_count_past_end_is_an_error() {
        // claims five elements but carries one
        let mut data = encode(&AbiValue::UnsignedInt(U256::from(5u64)));
        data.push_str(&encode(&AbiValue::UnsignedInt(U256::from(1u64))));
        let words = Words::from_hex(&data).unwrap();
        assert!(matches!(
            words.sequence(0, Words::uint),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_arguments_place_arrays_in_tail() {
        let a = address!("1111111111111111111111111111111111111111");
        let b = address!("2222222222222222222222222222222222222222");
        let data = encode_arguments(&[
            AbiValue::UnsignedInt(U256::from(100u64)),
            AbiValue::DynamicArray(vec![AbiValue::Address(a), AbiValue::Address(b)]),
            AbiValue::Address(a),
        ]);

        let words = Words::from_hex(&data).unwrap();
        assert_eq!(words.uint(0).unwrap(), U256::from(100u64));
        assert_eq!(words.usize_at(1).unwrap(), 3 * WORD_BYTES);
        assert_eq!(words.address(2).unwrap(), a);
        assert_eq!(words.address_array(1).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_unaligned_offset_is_malformed() {
        let words = Words::from_hex(&encode(&AbiValue::UnsignedInt(U256::from(5u64)))).unwrap();
        assert!(matches!(words.address_array(0), Err(DecodeError::Malformed(_))));
    }
}
