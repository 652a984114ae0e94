//! Persisted record model and codecs for the paintlog session journal.
//!
//! A session journal is an append-only sequence of [`RecordedEvent`]s keyed by
//! project. Payloads stay flexible (`serde_json::Value`) so the engine can add
//! record types without touching the codec, while the on-disk form is
//! protobuf: each event is written length-delimited, so a journal file is the
//! plain concatenation of its records and appending never rewrites history.
//!
//! JSON lines are supported as an interchange format for inspection and
//! import.

use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error returned by the journal decoders.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireEvent`.
    #[error("failed to decode journal record: {0}")]
    Decode(#[from] prost::DecodeError),
    /// A record decoded but carries an empty type tag.
    #[error("journal record {index} has an empty type tag")]
    MissingType { index: usize },
    /// A JSON line could not be parsed into a record.
    #[error("invalid JSON record on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One persisted user action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Short action tag, e.g. `"draw"` or `"l-add"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Milliseconds since the Unix epoch; strictly increasing within a journal.
    pub timestamp: i64,
    /// Action payload.
    #[serde(default)]
    pub data: Value,
}

impl RecordedEvent {
    #[must_use]
    pub fn new(kind: impl Into<String>, timestamp: i64, data: Value) -> Self {
        Self { kind: kind.into(), timestamp, data }
    }
}

/// Encode a single event into protobuf bytes (not length-delimited).
#[must_use]
pub fn encode_event(event: &RecordedEvent) -> Vec<u8> {
    let wire = event_to_wire(event);
    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec cannot run out of capacity.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode a single event previously produced by [`encode_event`].
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes and
/// [`CodecError::MissingType`] when the record has no type tag.
pub fn decode_event(bytes: &[u8]) -> Result<RecordedEvent, CodecError> {
    let wire = WireEvent::decode(bytes)?;
    wire_to_event(wire, 0)
}

/// Append one length-delimited event to a journal buffer.
pub fn append_event(event: &RecordedEvent, out: &mut Vec<u8>) {
    let wire = event_to_wire(event);
    out.reserve(wire.encoded_len() + 10);
    wire.encode_length_delimited(out).unwrap_or_default();
}

/// Encode a whole journal.
#[must_use]
pub fn encode_journal(events: &[RecordedEvent]) -> Vec<u8> {
    let mut out = Vec::new();
    for event in events {
        append_event(event, &mut out);
    }
    out
}

/// Decode a journal buffer produced by [`append_event`] / [`encode_journal`].
///
/// # Errors
///
/// Fails on the first malformed record; use [`decode_journal_prefix`] to keep
/// the records that precede a torn write.
pub fn decode_journal(bytes: &[u8]) -> Result<Vec<RecordedEvent>, CodecError> {
    let prefix = decode_journal_prefix(bytes);
    match prefix.error {
        Some(e) => Err(e),
        None => Ok(prefix.events),
    }
}

/// Leading records of a journal buffer that decoded cleanly.
#[derive(Debug)]
pub struct JournalPrefix {
    pub events: Vec<RecordedEvent>,
    /// Bytes covered by `events`. Everything past this is a torn or corrupt
    /// tail when `error` is set.
    pub consumed: usize,
    pub error: Option<CodecError>,
}

/// Decode as many leading records as possible.
#[must_use]
pub fn decode_journal_prefix(bytes: &[u8]) -> JournalPrefix {
    let mut events = Vec::new();
    let mut buf = bytes;
    let mut consumed = 0;
    while !buf.is_empty() {
        let decoded = WireEvent::decode_length_delimited(&mut buf)
            .map_err(CodecError::from)
            .and_then(|wire| wire_to_event(wire, events.len()));
        match decoded {
            Ok(event) => {
                events.push(event);
                consumed = bytes.len() - buf.len();
            }
            Err(e) => return JournalPrefix { events, consumed, error: Some(e) },
        }
    }
    JournalPrefix { events, consumed, error: None }
}

/// Render one event as a single JSON line (no trailing newline).
#[must_use]
pub fn to_json_line(event: &RecordedEvent) -> String {
    serde_json::to_string(event).unwrap_or_default()
}

/// Parse a JSON-lines document. Blank lines are ignored.
///
/// # Errors
///
/// Returns [`CodecError::Json`] naming the 1-based line that failed.
pub fn parse_json_lines(text: &str) -> Result<Vec<RecordedEvent>, CodecError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<RecordedEvent>(line).map_err(|source| CodecError::Json { line: i + 1, source })
        })
        .collect()
}

fn event_to_wire(event: &RecordedEvent) -> WireEvent {
    WireEvent {
        kind: event.kind.clone(),
        timestamp: event.timestamp,
        data: Some(json_to_proto_value(&event.data)),
    }
}

fn wire_to_event(wire: WireEvent, index: usize) -> Result<RecordedEvent, CodecError> {
    if wire.kind.is_empty() {
        return Err(CodecError::MissingType { index });
    }
    Ok(RecordedEvent {
        kind: wire.kind,
        timestamp: wire.timestamp,
        data: wire
            .data
            .map_or(Value::Object(Map::new()), |v| proto_to_json_value(&v)),
    })
}

fn json_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => prost_types::value::Kind::NullValue(prost_types::NullValue::NullValue as i32),
        Value::Bool(v) => prost_types::value::Kind::BoolValue(*v),
        Value::Number(v) => prost_types::value::Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => prost_types::value::Kind::StringValue(v.clone()),
        Value::Array(v) => prost_types::value::Kind::ListValue(prost_types::ListValue {
            values: v.iter().map(json_to_proto_value).collect(),
        }),
        Value::Object(v) => prost_types::value::Kind::StructValue(prost_types::Struct {
            fields: v
                .iter()
                .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
                .collect(),
        }),
    };

    prost_types::Value { kind: Some(kind) }
}

/// Protobuf numbers are doubles; integral values come back as JSON integers so
/// payloads such as layer indices deserialize into integer fields.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn proto_number_to_json(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 {
        return Value::from(v as i64);
    }
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn proto_to_json_value(value: &prost_types::Value) -> Value {
    let Some(kind) = &value.kind else {
        return Value::Null;
    };

    match kind {
        prost_types::value::Kind::NullValue(_) => Value::Null,
        prost_types::value::Kind::NumberValue(v) => proto_number_to_json(*v),
        prost_types::value::Kind::StringValue(v) => Value::String(v.clone()),
        prost_types::value::Kind::BoolValue(v) => Value::Bool(*v),
        prost_types::value::Kind::StructValue(v) => Value::Object(
            v.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
                .collect(),
        ),
        prost_types::value::Kind::ListValue(v) => {
            Value::Array(v.values.iter().map(proto_to_json_value).collect())
        }
    }
}

#[derive(Clone, PartialEq, Message)]
struct WireEvent {
    #[prost(string, tag = "1")]
    kind: String,
    #[prost(int64, tag = "2")]
    timestamp: i64,
    #[prost(message, optional, tag = "3")]
    data: Option<prost_types::Value>,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
