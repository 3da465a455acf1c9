//! Form - self-describing typed key/value record.
//!
//! A form is an unordered set of named fields. Each field holds raw bytes
//! plus a [`TypeTag`]; the typed accessors encode and decode those bytes.
//!
//! # Accessor contract
//!
//! - Reading a missing field returns the accessor's zero value
//!   (`0`, `0.0`, `false`, `""`, empty vector, empty form).
//! - Accessors do not check the stored tag. Reading a field through the
//!   wrong accessor decodes its bytes anyway and yields whatever those bytes
//!   mean under that accessor; it never fails.
//! - Field iteration order is unspecified and not part of the protocol.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};

use super::record;
use super::types::TypeTag;
use crate::error::Result;

/// Reserved field carrying the transaction id on requests and responses.
pub const TRANSACTION_ID_FIELD: &str = "_transaction_id";

/// Element-count field inside the nested form of a string/form vector.
const VECTOR_COUNT_FIELD: &str = "count";

/// Width of packed int64/double values.
const WORD_SIZE: usize = 8;

/// Mutable, string-keyed collection of typed fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Form {
    fields: HashMap<String, Bytes>,
    types: HashMap<String, TypeTag>,
}

impl Form {
    /// Create an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a form from its record encoding (copies the input).
    pub fn parse(data: &[u8]) -> Result<Self> {
        record::parse(Bytes::copy_from_slice(data))
    }

    /// Parse a form from shared bytes without copying field values.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        record::parse(data)
    }

    /// Serialize this form into its record encoding.
    pub fn serialize(&self) -> Bytes {
        record::serialize(self)
    }

    /// Number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the form has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check if a field is present.
    #[inline]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names, in unspecified order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Recorded type tag of a field; untyped or missing fields report `BYTES`.
    pub fn field_type(&self, name: &str) -> TypeTag {
        self.types.get(name).copied().unwrap_or_default()
    }

    /// `(name, tag, value)` for every field, in unspecified order.
    pub(crate) fn records(&self) -> impl Iterator<Item = (&str, TypeTag, &Bytes)> {
        self.fields
            .iter()
            .map(move |(name, value)| (name.as_str(), self.field_type(name), value))
    }

    /// Store a field exactly as decoded from the wire.
    pub(crate) fn insert_raw(&mut self, name: String, tag: TypeTag, value: Bytes) {
        self.types.insert(name.clone(), tag);
        self.fields.insert(name, value);
    }

    fn set_typed(&mut self, name: impl Into<String>, tag: TypeTag, value: Bytes) {
        self.insert_raw(name.into(), tag, value);
    }

    // Transaction id

    /// Transaction id carried by this form, empty if absent.
    pub fn transaction_id(&self) -> String {
        self.get_string(TRANSACTION_ID_FIELD)
    }

    /// Stamp the reserved transaction id field.
    pub fn set_transaction_id(&mut self, id: &str) {
        self.set_string(TRANSACTION_ID_FIELD, id);
    }

    // Raw bytes

    pub fn set_bytes(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        self.set_typed(name, TypeTag::BYTES, value.into());
    }

    /// Raw value of a field, `None` if absent.
    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).map(|v| &v[..])
    }

    // Scalars

    pub fn set_bool(&mut self, name: impl Into<String>, value: bool) {
        self.set_typed(name, TypeTag::BOOL, Bytes::from(vec![value as u8]));
    }

    /// First byte nonzero; `false` if absent or empty.
    pub fn get_bool(&self, name: &str) -> bool {
        self.get_bytes(name)
            .and_then(|v| v.first())
            .is_some_and(|b| *b != 0)
    }

    pub fn set_i64(&mut self, name: impl Into<String>, value: i64) {
        self.set_typed(name, TypeTag::INT64, Bytes::copy_from_slice(&value.to_le_bytes()));
    }

    /// Little-endian i64 from the first 8 bytes; `0` if absent or shorter.
    pub fn get_i64(&self, name: &str) -> i64 {
        self.word(name).map(i64::from_le_bytes).unwrap_or(0)
    }

    pub fn set_f64(&mut self, name: impl Into<String>, value: f64) {
        self.set_typed(name, TypeTag::DOUBLE, Bytes::copy_from_slice(&value.to_le_bytes()));
    }

    /// Little-endian IEEE-754 binary64; `0.0` if absent or shorter.
    pub fn get_f64(&self, name: &str) -> f64 {
        self.word(name).map(f64::from_le_bytes).unwrap_or(0.0)
    }

    pub fn set_string(&mut self, name: impl Into<String>, value: &str) {
        self.set_typed(name, TypeTag::STRING, Bytes::copy_from_slice(value.as_bytes()));
    }

    /// Raw bytes as text (invalid UTF-8 is replaced); empty if absent.
    pub fn get_string(&self, name: &str) -> String {
        self.get_bytes(name)
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_default()
    }

    /// Stored as int64 milliseconds since the Unix epoch.
    pub fn set_datetime(&mut self, name: impl Into<String>, value: SystemTime) {
        let millis = match value.duration_since(UNIX_EPOCH) {
            Ok(after) => after.as_millis() as i64,
            Err(before) => -(before.duration().as_millis() as i64),
        };
        self.set_i64(name, millis);
    }

    /// A stored value of `0` (or a missing field) is "unset" and yields
    /// `UNIX_EPOCH`.
    pub fn get_datetime(&self, name: &str) -> SystemTime {
        let millis = self.get_i64(name);
        let offset = Duration::from_millis(millis.unsigned_abs());
        let instant = if millis >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        };
        instant.unwrap_or(UNIX_EPOCH)
    }

    // Nested form

    pub fn set_form(&mut self, name: impl Into<String>, value: &Form) {
        self.set_typed(name, TypeTag::FORM, value.serialize());
    }

    /// Decoded nested form; empty if absent or malformed.
    pub fn get_form(&self, name: &str) -> Form {
        self.fields
            .get(name)
            .and_then(|v| Form::from_bytes(v.clone()).ok())
            .unwrap_or_default()
    }

    // Packed vectors

    pub fn set_i64_vec(&mut self, name: impl Into<String>, values: &[i64]) {
        let packed = pack_words(values.iter().map(|v| v.to_le_bytes()));
        self.set_typed(name, TypeTag::VECTOR_INT64, packed);
    }

    /// Element count is `len / 8`; trailing bytes are ignored.
    pub fn get_i64_vec(&self, name: &str) -> Vec<i64> {
        self.words(name).map(i64::from_le_bytes).collect()
    }

    pub fn set_f64_vec(&mut self, name: impl Into<String>, values: &[f64]) {
        let packed = pack_words(values.iter().map(|v| v.to_le_bytes()));
        self.set_typed(name, TypeTag::VECTOR_DOUBLE, packed);
    }

    pub fn get_f64_vec(&self, name: &str) -> Vec<f64> {
        self.words(name).map(f64::from_le_bytes).collect()
    }

    // Indexed vectors (nested form with `count` + "0", "1", ...)

    pub fn set_string_vec<S: AsRef<str>>(&mut self, name: impl Into<String>, values: &[S]) {
        let mut nested = Form::new();
        nested.set_i64(VECTOR_COUNT_FIELD, values.len() as i64);
        for (i, value) in values.iter().enumerate() {
            nested.set_string(i.to_string(), value.as_ref());
        }
        self.set_typed(name, TypeTag::VECTOR_STRING, nested.serialize());
    }

    pub fn get_string_vec(&self, name: &str) -> Vec<String> {
        match self.indexed(name) {
            Some((nested, count)) => (0..count).map(|i| nested.get_string(&i.to_string())).collect(),
            None => Vec::new(),
        }
    }

    pub fn set_form_vec(&mut self, name: impl Into<String>, values: &[Form]) {
        let mut nested = Form::new();
        nested.set_i64(VECTOR_COUNT_FIELD, values.len() as i64);
        for (i, value) in values.iter().enumerate() {
            nested.set_bytes(i.to_string(), value.serialize());
        }
        self.set_typed(name, TypeTag::VECTOR_FORM, nested.serialize());
    }

    /// Missing elements decode as empty forms; malformed ones are skipped.
    pub fn get_form_vec(&self, name: &str) -> Vec<Form> {
        let Some((nested, count)) = self.indexed(name) else {
            return Vec::new();
        };
        (0..count)
            .filter_map(|i| match nested.fields.get(&i.to_string()) {
                Some(raw) => Form::from_bytes(raw.clone()).ok(),
                None => Some(Form::new()),
            })
            .collect()
    }

    /// First 8 bytes of a field.
    fn word(&self, name: &str) -> Option<[u8; WORD_SIZE]> {
        let value = self.get_bytes(name)?;
        value.get(..WORD_SIZE)?.try_into().ok()
    }

    /// A field split into packed 8-byte words.
    fn words<'a>(&'a self, name: &str) -> impl Iterator<Item = [u8; WORD_SIZE]> + 'a {
        self.get_bytes(name)
            .unwrap_or_default()
            .chunks_exact(WORD_SIZE)
            .filter_map(|chunk| chunk.try_into().ok())
    }

    /// Nested index form and its usable element count.
    ///
    /// The count is clamped to the number of nested fields other than the
    /// count itself.
    fn indexed(&self, name: &str) -> Option<(Form, usize)> {
        let raw = self.fields.get(name)?;
        let nested = Form::from_bytes(raw.clone()).ok()?;
        let declared = nested.get_i64(VECTOR_COUNT_FIELD).max(0) as u64;
        let elements = nested.len() - usize::from(nested.has_field(VECTOR_COUNT_FIELD));
        let count = declared.min(elements as u64) as usize;
        Some((nested, count))
    }
}

fn pack_words(words: impl ExactSizeIterator<Item = [u8; WORD_SIZE]>) -> Bytes {
    let mut buf = BytesMut::with_capacity(words.len() * WORD_SIZE);
    for word in words {
        buf.put_slice(&word);
    }
    buf.freeze()
}
