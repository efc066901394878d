//! Field values and the property representation stored on graph nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier the backing store assigns to a node. Never exposed through [`crate::Db`].
pub type NodeId = u64;

/// Field name to value map handed to `insert`/`update` and filled by `read`/`scan`.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Set of field names a caller wants back from `read`/`scan`.
pub type FieldSet = BTreeSet<String>;

/// Opaque byte-string value of one record field.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldValue(Vec<u8>);

impl FieldValue {
    /// Wraps raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Borrowed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Owned bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the value has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) => write!(f, "FieldValue({text:?})"),
            Err(_) => write!(f, "FieldValue({} bytes)", self.0.len()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

/// Value of a node property as the stores keep it.
///
/// Record keys live as `Str`, record fields as `Bytes`. Bytes travel as
/// base64 when serialized so snapshots and wire bodies stay valid JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PropertyValue {
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl PropertyValue {
    /// Returns the string payload, if this is a string property.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(value) => Some(value),
            PropertyValue::Bytes(_) => None,
        }
    }

    /// Converts the property into a field value; strings become their UTF-8 bytes.
    pub fn into_field(self) -> FieldValue {
        match self {
            PropertyValue::Str(value) => FieldValue::from(value),
            PropertyValue::Bytes(bytes) => FieldValue::new(bytes),
        }
    }
}

impl From<FieldValue> for PropertyValue {
    fn from(value: FieldValue) -> Self {
        PropertyValue::Bytes(value.into_bytes())
    }
}

impl From<&FieldValue> for PropertyValue {
    fn from(value: &FieldValue) -> Self {
        PropertyValue::Bytes(value.as_bytes().to_vec())
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
