//! Command and report message model.
//!
//! Both messages carry parallel `coils`/`values` arrays: entry `i` of
//! `values` belongs to coil name `i`. Commands flow toward the device,
//! reports flow away from it.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// A value attached to a named I/O point.
///
/// Wire representations are untagged: a JSON `true`, `3`, `1.5` or `"on"`
/// all deserialize to the matching variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PointValue {
    /// Boolean value.
    Bool(bool),

    /// Integer value.
    Integer(i64),

    /// Floating point value.
    Float(f64),

    /// Text value.
    Text(String),
}

impl PointValue {
    /// Coerce to a coil bit: non-zero and non-empty are true.
    pub fn truthy(&self) -> bool {
        match self {
            PointValue::Bool(b) => *b,
            PointValue::Integer(i) => *i != 0,
            PointValue::Float(f) => *f != 0.0,
            PointValue::Text(s) => !s.is_empty(),
        }
    }
}

impl std::fmt::Display for PointValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointValue::Bool(b) => write!(f, "{}", b),
            PointValue::Integer(i) => write!(f, "{}", i),
            PointValue::Float(v) => write!(f, "{}", v),
            PointValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for PointValue {
    fn from(v: bool) -> Self {
        PointValue::Bool(v)
    }
}

impl From<i64> for PointValue {
    fn from(v: i64) -> Self {
        PointValue::Integer(v)
    }
}

impl From<f64> for PointValue {
    fn from(v: f64) -> Self {
        PointValue::Float(v)
    }
}

impl From<&str> for PointValue {
    fn from(v: &str) -> Self {
        PointValue::Text(v.to_string())
    }
}

/// An inbound write request: set each named coil to the paired value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Command {
    /// Coil names, in the order they should be written.
    pub coils: Vec<String>,

    /// Values paired with `coils` by index.
    pub values: Vec<PointValue>,
}

impl Command {
    /// Iterate the `(coil, value)` pairs in message order.
    ///
    /// Extra entries of the longer array are dropped, as with a zip.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &PointValue)> {
        self.coils
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Whether the parallel arrays have matching lengths.
    pub fn is_balanced(&self) -> bool {
        self.coils.len() == self.values.len()
    }
}

/// An outbound snapshot of polled device state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    /// Unix epoch milliseconds when the device was polled.
    pub timestamp: i64,

    /// Device name from configuration.
    pub device: String,

    /// Declared input point names.
    pub coils: Vec<String>,

    /// Values paired with `coils` by index.
    pub values: Vec<PointValue>,
}

/// Serialization format for bus payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON format (human-readable, good for debugging).
    #[default]
    Json,

    /// CBOR format (compact binary).
    Cbor,
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
    }
}

/// Guess the format from the first payload byte.
///
/// Returns `Json` if the data starts with `{` or `[`, otherwise `Cbor`.
pub fn detect_format(data: &[u8]) -> Format {
    match data.first() {
        Some(b'{') | Some(b'[') => Format::Json,
        _ => Format::Cbor,
    }
}

/// Decode bytes, auto-detecting the format.
pub fn decode_auto<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    decode(data, detect_format(data))
}
