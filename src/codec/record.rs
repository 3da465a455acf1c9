//! Record encoding for forms.
//!
//! A serialized form is a plain concatenation of records, with no count
//! header and no terminator:
//!
//! ```text
//! ┌───────────┬──────────┬─────┬───────────┬───────────┐
//! │ name len  │ name     │ tag │ value len │ value     │
//! │ u32 LE    │ N bytes  │ u8  │ u32 LE    │ M bytes   │
//! └───────────┴──────────┴─────┴───────────┴───────────┘
//! ```
//!
//! An empty form serializes to an empty byte string.

use bytes::{BufMut, Bytes, BytesMut};

use super::form::Form;
use super::types::TypeTag;
use crate::error::{FormlinkError, Result};

/// Size of each length header inside a record.
pub const LENGTH_SIZE: usize = 4;

/// Serialize a form into its record encoding.
///
/// Records are emitted in the form's internal iteration order, which is
/// unspecified. Two serializations of the same form may differ byte-for-byte.
pub fn serialize(form: &Form) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(form));
    for (name, tag, value) in form.records() {
        buf.put_u32_le(name.len() as u32);
        buf.put_slice(name.as_bytes());
        buf.put_u8(tag.as_u8());
        buf.put_u32_le(value.len() as u32);
        buf.put_slice(value);
    }
    buf.freeze()
}

/// Exact number of bytes `serialize` will produce.
pub fn encoded_len(form: &Form) -> usize {
    form.records()
        .map(|(name, _, value)| LENGTH_SIZE + name.len() + 1 + LENGTH_SIZE + value.len())
        .sum()
}

/// Parse a record encoding into a form.
///
/// Values are sliced out of `data` without copying.
///
/// # Errors
///
/// Returns `FormlinkError::Format` if any length header or slice runs past
/// the end of the input, or a field name is not UTF-8.
pub fn parse(data: Bytes) -> Result<Form> {
    let mut reader = RecordReader::new(data);
    let mut form = Form::new();

    while !reader.is_exhausted() {
        let name = reader.take_chunk("name")?;
        let name = String::from_utf8(name.to_vec())
            .map_err(|_| FormlinkError::Format("field name is not valid UTF-8".to_string()))?;
        let tag = TypeTag(reader.take_u8("type tag")?);
        let value = reader.take_chunk("value")?;
        form.insert_raw(name, tag, value);
    }

    Ok(form)
}

/// Cursor over a record buffer.
struct RecordReader {
    data: Bytes,
    offset: usize,
}

impl RecordReader {
    fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    fn is_exhausted(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take_u8(&mut self, what: &str) -> Result<u8> {
        if self.remaining() < 1 {
            return Err(truncated(what, self.offset));
        }
        let value = self.data[self.offset];
        self.offset += 1;
        Ok(value)
    }

    fn take_u32(&mut self, what: &str) -> Result<u32> {
        if self.remaining() < LENGTH_SIZE {
            return Err(truncated(what, self.offset));
        }
        let raw = &self.data[self.offset..self.offset + LENGTH_SIZE];
        self.offset += LENGTH_SIZE;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Read a u32 length followed by that many bytes.
    fn take_chunk(&mut self, what: &str) -> Result<Bytes> {
        let len = self.take_u32(what)? as usize;
        if self.remaining() < len {
            return Err(truncated(what, self.offset));
        }
        let chunk = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        Ok(chunk)
    }
}

fn truncated(what: &str, offset: usize) -> FormlinkError {
    FormlinkError::Format(format!("truncated record {} at offset {}", what, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-encode one record.
    fn record(name: &str, tag: u8, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(tag);
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value);
        out
    }

    #[test]
    fn test_empty_form_serializes_to_nothing() {
        assert!(serialize(&Form::new()).is_empty());
        assert!(parse(Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn test_single_record_layout() {
        let mut form = Form::new();
        form.set_string("p1", "aaaa");

        let bytes = serialize(&form);
        assert_eq!(&bytes[..], &record("p1", 0x04, b"aaaa")[..]);
        assert_eq!(bytes.len(), encoded_len(&form));
    }

    #[test]
    fn test_parse_hand_encoded_records() {
        let mut data = record("a", 0x02, &7i64.to_le_bytes());
        data.extend(record("b", 0x04, b"text"));

        let form = parse(Bytes::from(data)).unwrap();
        assert_eq!(form.len(), 2);
        assert_eq!(form.get_i64("a"), 7);
        assert_eq!(form.get_string("b"), "text");
        assert_eq!(form.field_type("a"), TypeTag::INT64);
    }

    #[test]
    fn test_truncated_name_length() {
        let err = parse(Bytes::from_static(&[1, 0])).unwrap_err();
        assert!(matches!(err, FormlinkError::Format(_)));
    }

    #[test]
    fn test_truncated_value() {
        let mut data = record("name", 0x04, b"value");
        data.truncate(data.len() - 2);

        let err = parse(Bytes::from(data)).unwrap_err();
        assert!(err.to_string().contains("truncated record value"));
    }

    #[test]
    fn test_missing_type_tag() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.push(b'x');

        let err = parse(Bytes::from(data)).unwrap_err();
        assert!(err.to_string().contains("type tag"));
    }

    #[test]
    fn test_name_length_past_end() {
        let mut data = Vec::new();
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data.extend_from_slice(b"abc");

        assert!(parse(Bytes::from(data)).is_err());
    }

    #[test]
    fn test_duplicate_name_last_wins() {
        let mut data = record("k", 0x04, b"first");
        data.extend(record("k", 0x04, b"second"));

        let form = parse(Bytes::from(data)).unwrap();
        assert_eq!(form.len(), 1);
        assert_eq!(form.get_string("k"), "second");
    }
}
