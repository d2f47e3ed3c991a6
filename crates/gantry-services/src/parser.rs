//! Trigger parser — raw bytes in, `TriggerEvent`s out.
//!
//! A single invocation may carry a delivery batch. Pub/sub batches wrap the
//! trigger message as a string; upload-notification batches describe an
//! object and imply an `object_upload` trigger. Anything else is treated as
//! one bare trigger message.

use serde_json::{Map, Value};

use gantry_core::{DispatchError, TriggerEvent};

use crate::handlers::object_upload::OBJECT_UPLOAD;

/// One unit of work inside an invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Pub/sub message id, when the envelope carried one.
    pub message_id: Option<String>,
    /// Bytes preserved verbatim in a dead-letter entry.
    pub payload: Vec<u8>,
    /// Set when the envelope already implied the event.
    pub event: Option<TriggerEvent>,
}

impl Delivery {
    fn raw(payload: Vec<u8>) -> Self {
        Self {
            message_id: None,
            payload,
            event: None,
        }
    }
}

/// Parse one trigger message.
pub fn parse_trigger(raw: &[u8]) -> Result<TriggerEvent, DispatchError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| DispatchError::MalformedInput(format!("invalid JSON: {e}")))?;

    let Value::Object(mut obj) = value else {
        return Err(DispatchError::MalformedInput(
            "trigger message must be a JSON object".to_string(),
        ));
    };

    let trigger_type = match obj.remove("trigger_type") {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::String(_)) | None | Some(Value::Null) => {
            return Err(DispatchError::MalformedInput(
                "message must include 'trigger_type' field".to_string(),
            ))
        }
        Some(other) => {
            return Err(DispatchError::MalformedInput(format!(
                "'trigger_type' must be a string, got {other}"
            )))
        }
    };

    Ok(TriggerEvent {
        trigger_type,
        data: object_field(&mut obj, "data")?,
        metadata: object_field(&mut obj, "metadata")?,
    })
}

fn object_field(obj: &mut Map<String, Value>, key: &str) -> Result<Map<String, Value>, DispatchError> {
    match obj.remove(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(m)) => Ok(m),
        Some(_) => Err(DispatchError::MalformedInput(format!(
            "'{key}' must be a JSON object"
        ))),
    }
}

/// Split an invocation payload into deliveries. Never fails: anything that
/// cannot be unwrapped becomes a raw delivery and fails later in
/// `parse_trigger`, where it is dead-lettered.
pub fn unwrap_deliveries(raw: &[u8]) -> Vec<Delivery> {
    let records = match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(mut obj)) => match obj.remove("Records") {
            Some(Value::Array(records)) => records,
            _ => return vec![Delivery::raw(raw.to_vec())],
        },
        _ => return vec![Delivery::raw(raw.to_vec())],
    };

    records.into_iter().map(unwrap_record).collect()
}

fn unwrap_record(record: Value) -> Delivery {
    let record_bytes = serde_json::to_vec(&record).unwrap_or_default();

    if let Some(sns) = record.get("Sns") {
        let message_id = sns
            .get("MessageId")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        return match sns.get("Message").and_then(|v| v.as_str()) {
            Some(message) => Delivery {
                message_id,
                payload: message.as_bytes().to_vec(),
                event: None,
            },
            None => Delivery {
                message_id,
                payload: record_bytes,
                event: None,
            },
        };
    }

    if let Some(s3) = record.get("s3") {
        let bucket = s3.pointer("/bucket/name").and_then(|v| v.as_str());
        let key = s3.pointer("/object/key").and_then(|v| v.as_str());
        if let (Some(bucket), Some(key)) = (bucket, key) {
            let mut event = TriggerEvent::new(OBJECT_UPLOAD);
            event.data.insert("bucket".into(), Value::String(bucket.to_string()));
            event.data.insert("key".into(), Value::String(decode_object_key(key)));
            if let Some(size) = s3.pointer("/object/size") {
                event.data.insert("size".into(), size.clone());
            }
            return Delivery {
                message_id: None,
                payload: record_bytes,
                event: Some(event),
            };
        }
    }

    Delivery::raw(record_bytes)
}

/// Undo form encoding in upload-notification keys: `+` is a space and
/// `%XX` is a byte. Malformed escapes are kept as written.
pub fn decode_object_key(key: &str) -> String {
    let spaced = key.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}
