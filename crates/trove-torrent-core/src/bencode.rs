//! Bencode value model with a strict decoder and a canonical encoder.
//!
//! Dictionaries are kept in a `BTreeMap`, so encoding always emits keys in
//! sorted byte order regardless of the order they were decoded in.

use std::collections::BTreeMap;

use crate::error::{FleetError, FleetResult};

const MAX_DEPTH: usize = 64;

/// A decoded bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Signed integer (`i42e`).
    Integer(i64),
    /// Length-prefixed byte string (`4:spam`).
    Bytes(Vec<u8>),
    /// Ordered list (`l...e`).
    List(Vec<Self>),
    /// Dictionary with byte-string keys (`d...e`).
    Dict(BTreeMap<Vec<u8>, Self>),
}

impl Value {
    /// Build a byte-string value from anything byte-like.
    #[must_use]
    pub fn bytes(value: impl AsRef<[u8]>) -> Self {
        Self::Bytes(value.as_ref().to_vec())
    }

    /// Build a dictionary from `(key, value)` pairs.
    #[must_use]
    pub fn dict<K: AsRef<[u8]>>(entries: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Dict(
            entries
                .into_iter()
                .map(|(key, value)| (key.as_ref().to_vec(), value))
                .collect(),
        )
    }

    /// Borrow the raw bytes of a byte-string value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Borrow a byte-string value as UTF-8 text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Read an integer value.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Borrow the items of a list value.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the entries of a dictionary value.
    #[must_use]
    pub const fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Self>> {
        match self {
            Self::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a key when this value is a dictionary.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_dict()
            .and_then(|entries| entries.get(key.as_bytes()))
    }
}

/// Decode a complete bencoded document.
///
/// # Errors
///
/// Returns [`FleetError::MalformedBinaryData`] on truncated input, malformed
/// integers or length prefixes, non-string or duplicate dictionary keys,
/// excessive nesting, or trailing bytes after the top-level value.
pub fn decode(input: &[u8]) -> FleetResult<Value> {
    let mut decoder = Decoder { input, pos: 0 };
    let value = decoder.value(0)?;
    if decoder.pos != input.len() {
        return Err(FleetError::malformed("trailing data", Some(decoder.pos)));
    }
    Ok(value)
}

/// Encode a value using canonical bencode rules.
#[must_use]
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Integer(number) => {
            out.push(b'i');
            out.extend_from_slice(number.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(bytes) => write_bytes(bytes, out),
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(entries) => {
            out.push(b'd');
            for (key, item) in entries {
                write_bytes(key, out);
                encode_into(item, out);
            }
            out.push(b'e');
        }
    }
}

fn write_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Decoder<'_> {
    fn peek(&self) -> FleetResult<u8> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or_else(|| FleetError::malformed("unexpected end of input", Some(self.pos)))
    }

    fn value(&mut self, depth: usize) -> FleetResult<Value> {
        if depth > MAX_DEPTH {
            return Err(FleetError::malformed("nesting too deep", Some(self.pos)));
        }
        match self.peek()? {
            b'i' => {
                self.pos += 1;
                self.number(b'e', true).map(Value::Integer)
            }
            b'l' => {
                self.pos += 1;
                let mut items = Vec::new();
                while self.peek()? != b'e' {
                    items.push(self.value(depth + 1)?);
                }
                self.pos += 1;
                Ok(Value::List(items))
            }
            b'd' => {
                self.pos += 1;
                let mut entries = BTreeMap::new();
                while self.peek()? != b'e' {
                    let key_offset = self.pos;
                    if !self.peek()?.is_ascii_digit() {
                        return Err(FleetError::malformed(
                            "dictionary key is not a byte string",
                            Some(key_offset),
                        ));
                    }
                    let key = self.byte_string()?;
                    let item = self.value(depth + 1)?;
                    if entries.insert(key, item).is_some() {
                        return Err(FleetError::malformed(
                            "duplicate dictionary key",
                            Some(key_offset),
                        ));
                    }
                }
                self.pos += 1;
                Ok(Value::Dict(entries))
            }
            b'0'..=b'9' => self.byte_string().map(Value::Bytes),
            _ => Err(FleetError::malformed("unexpected token", Some(self.pos))),
        }
    }

    fn byte_string(&mut self) -> FleetResult<Vec<u8>> {
        let length_offset = self.pos;
        let length = self.number(b':', false)?;
        let length = usize::try_from(length)
            .map_err(|_| FleetError::malformed("invalid length prefix", Some(length_offset)))?;
        let start = self.pos;
        let end = start
            .checked_add(length)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| FleetError::malformed(
                "length prefix exceeds input",
                Some(length_offset),
            ))?;
        self.pos = end;
        Ok(self.input[start..end].to_vec())
    }

    fn number(&mut self, terminator: u8, allow_negative: bool) -> FleetResult<i64> {
        let start = self.pos;
        let end = self.input[start..]
            .iter()
            .position(|byte| *byte == terminator)
            .map(|idx| start + idx)
            .ok_or_else(|| FleetError::malformed("unterminated number", Some(start)))?;
        let raw = &self.input[start..end];
        let (negative, digits) = match raw.split_first() {
            Some((b'-', rest)) if allow_negative => (true, rest),
            _ => (false, raw),
        };
        let well_formed = !digits.is_empty()
            && digits.iter().all(u8::is_ascii_digit)
            && !(digits.len() > 1 && digits[0] == b'0')
            && !(negative && digits == b"0");
        if !well_formed {
            return Err(FleetError::malformed("invalid number", Some(start)));
        }
        let text = std::str::from_utf8(raw)
            .map_err(|_| FleetError::malformed("invalid number", Some(start)))?;
        let value = text
            .parse::<i64>()
            .map_err(|_| FleetError::malformed("number out of range", Some(start)))?;
        self.pos = end + 1;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::dict([
            ("list", Value::List(vec![Value::Integer(1), Value::Integer(-2)])),
            ("string", Value::bytes("blooblah")),
            (
                "nested",
                Value::dict([("zero", Value::Integer(0)), ("empty", Value::bytes(""))]),
            ),
        ])
    }

    #[test]
    fn encode_decode_encode_is_stable() -> FleetResult<()> {
        let encoded = encode(&sample());
        let decoded = decode(&encoded)?;
        assert_eq!(decoded, sample());
        assert_eq!(encode(&decoded), encoded);
        Ok(())
    }

    #[test]
    fn encoder_sorts_dictionary_keys() -> FleetResult<()> {
        let decoded = decode(b"d1:bi2e1:ai1ee")?;
        assert_eq!(encode(&decoded), b"d1:ai1e1:bi2ee".to_vec());
        Ok(())
    }

    #[test]
    fn decoder_reads_known_document() -> FleetResult<()> {
        let value = decode(b"d4:spaml1:a1:bee")?;
        let items = value.get("spam").and_then(Value::as_list).unwrap_or_default();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].as_str(), Some("b"));
        Ok(())
    }

    #[test]
    fn decoder_rejects_malformed_input() {
        let cases: [&[u8]; 12] = [
            b"",
            b"i12",
            b"ie",
            b"i03e",
            b"i-0e",
            b"5:abc",
            b"x",
            b"l1:a",
            b"di1e1:ae",
            b"d1:ai1e1:ai2ee",
            b"i1ei2e",
            b"-1:a",
        ];
        for case in cases {
            let result = decode(case);
            assert!(
                matches!(result, Err(FleetError::MalformedBinaryData { .. })),
                "expected malformed error for {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn decoder_bounds_nesting_depth() {
        let mut deep = vec![b'l'; MAX_DEPTH + 2];
        deep.extend(vec![b'e'; MAX_DEPTH + 2]);
        assert!(decode(&deep).is_err());
    }
}
