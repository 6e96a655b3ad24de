//! CBOR sensor record decoder
//!
//! Decodes the self-describing record the sensor sends with every scan into
//! a generic value tree, then extracts the sensor id and its measurements.
//! Any structural fault invalidates the whole record.

use core::fmt;

use minicbor::data::Type;
use minicbor::Decoder;

use crate::config::protocol::MAX_RECORD_DEPTH;
use crate::protocol::digest::to_hex;

/// Errors that can occur while decoding a sensor record
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The bytes are not valid CBOR
    #[error("invalid CBOR: {0}")]
    Cbor(#[from] minicbor::decode::Error),
    /// Arrays and maps nest deeper than the decoder allows
    #[error("nesting deeper than {MAX_RECORD_DEPTH} levels")]
    TooDeep,
    /// Bytes remain after the top-level item
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
    /// A data item the record format never uses
    #[error("unsupported CBOR item: {0}")]
    Unsupported(String),
    /// The top-level item is not a map
    #[error("record is not a map")]
    NotAMap,
    /// A required key is absent
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// A required key holds a value of the wrong shape
    #[error("field `{field}` {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

/// A decoded CBOR data item
///
/// Tags are transparent: a tagged item decodes to the item it wraps.
#[derive(Debug, Clone, PartialEq)]
pub enum CborValue {
    Unsigned(u64),
    Negative(i64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<CborValue>),
    Map(Vec<(CborValue, CborValue)>),
    Bool(bool),
    Float(f64),
    Null,
    Undefined,
}

impl CborValue {
    /// Look up a text key in a map
    pub fn get(&self, key: &str) -> Option<&CborValue> {
        match self {
            CborValue::Map(entries) => entries.iter().find_map(|(k, v)| match k {
                CborValue::Text(text) if text == key => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Numeric value of an integer or float item
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            CborValue::Unsigned(n) => Some(n as f64),
            CborValue::Negative(n) => Some(n as f64),
            CborValue::Float(n) => Some(n),
            _ => None,
        }
    }
}

/// Identifier a sensor reports for itself
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SensorId {
    Text(String),
    Number(i128),
    Bytes(Vec<u8>),
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorId::Text(text) => f.write_str(text),
            SensorId::Number(n) => write!(f, "{n}"),
            SensorId::Bytes(bytes) => f.write_str(&to_hex(bytes)),
        }
    }
}

/// Structured content of a scan
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub sensor_id: SensorId,
    /// One raw sample per detector channel, in channel order
    pub measurements: Vec<f64>,
}

/// Decode a complete CBOR item, rejecting trailing bytes
pub fn decode_value(bytes: &[u8]) -> Result<CborValue, RecordError> {
    let mut decoder = Decoder::new(bytes);
    let value = decode_item(&mut decoder, 0)?;
    let remaining = bytes.len() - decoder.position();
    if remaining != 0 {
        return Err(RecordError::TrailingBytes(remaining));
    }
    Ok(value)
}

/// Decode a sensor record
pub fn decode_record(bytes: &[u8]) -> Result<SensorRecord, RecordError> {
    let value = decode_value(bytes)?;
    if !matches!(value, CborValue::Map(_)) {
        return Err(RecordError::NotAMap);
    }

    let sensor_id = match value.get("sensor_id") {
        Some(CborValue::Text(text)) => SensorId::Text(text.clone()),
        Some(CborValue::Unsigned(n)) => SensorId::Number(i128::from(*n)),
        Some(CborValue::Negative(n)) => SensorId::Number(i128::from(*n)),
        Some(CborValue::Bytes(bytes)) => SensorId::Bytes(bytes.clone()),
        Some(_) => {
            return Err(RecordError::InvalidField {
                field: "sensor_id",
                reason: "is not an identifier",
            })
        }
        None => return Err(RecordError::MissingField("sensor_id")),
    };

    let measurements = match value.get("measurements") {
        Some(CborValue::Array(items)) => items
            .iter()
            .map(CborValue::as_f64)
            .collect::<Option<Vec<f64>>>()
            .ok_or(RecordError::InvalidField {
                field: "measurements",
                reason: "holds a non-numeric sample",
            })?,
        Some(_) => {
            return Err(RecordError::InvalidField {
                field: "measurements",
                reason: "is not an array",
            })
        }
        None => return Err(RecordError::MissingField("measurements")),
    };

    Ok(SensorRecord {
        sensor_id,
        measurements,
    })
}

fn decode_item(d: &mut Decoder<'_>, depth: usize) -> Result<CborValue, RecordError> {
    if depth > MAX_RECORD_DEPTH {
        return Err(RecordError::TooDeep);
    }

    let value = match d.datatype()? {
        Type::Bool => CborValue::Bool(d.bool()?),
        Type::Null => {
            d.null()?;
            CborValue::Null
        }
        Type::Undefined => {
            d.undefined()?;
            CborValue::Undefined
        }
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => CborValue::Unsigned(d.u64()?),
        Type::I8 | Type::I16 | Type::I32 | Type::I64 => CborValue::Negative(d.i64()?),
        Type::F16 => CborValue::Float(f64::from(d.f16()?)),
        Type::F32 => CborValue::Float(f64::from(d.f32()?)),
        Type::F64 => CborValue::Float(d.f64()?),
        Type::Bytes => CborValue::Bytes(d.bytes()?.to_vec()),
        Type::BytesIndef => {
            let mut bytes = Vec::new();
            for chunk in d.bytes_iter()? {
                bytes.extend_from_slice(chunk?);
            }
            CborValue::Bytes(bytes)
        }
        Type::String => CborValue::Text(d.str()?.to_owned()),
        Type::StringIndef => {
            let mut text = String::new();
            for chunk in d.str_iter()? {
                text.push_str(chunk?);
            }
            CborValue::Text(text)
        }
        Type::Array | Type::ArrayIndef => {
            let mut items = Vec::new();
            match d.array()? {
                Some(len) => {
                    for _ in 0..len {
                        items.push(decode_item(d, depth + 1)?);
                    }
                }
                None => {
                    while !take_break(d)? {
                        items.push(decode_item(d, depth + 1)?);
                    }
                }
            }
            CborValue::Array(items)
        }
        Type::Map | Type::MapIndef => {
            let mut entries = Vec::new();
            match d.map()? {
                Some(len) => {
                    for _ in 0..len {
                        let key = decode_item(d, depth + 1)?;
                        let value = decode_item(d, depth + 1)?;
                        entries.push((key, value));
                    }
                }
                None => {
                    while !take_break(d)? {
                        let key = decode_item(d, depth + 1)?;
                        let value = decode_item(d, depth + 1)?;
                        entries.push((key, value));
                    }
                }
            }
            CborValue::Map(entries)
        }
        Type::Tag => {
            d.tag()?;
            decode_item(d, depth + 1)?
        }
        other => return Err(RecordError::Unsupported(format!("{other:?}"))),
    };

    Ok(value)
}

/// Consume the break byte closing an indefinite-length container
fn take_break(d: &mut Decoder<'_>) -> Result<bool, RecordError> {
    if matches!(d.datatype()?, Type::Break) {
        d.set_position(d.position() + 1);
        Ok(true)
    } else {
        Ok(false)
    }
}
