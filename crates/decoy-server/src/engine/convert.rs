use super::EngineError;
use crate::mock::MockResponse;
use serde_json::Value;

/// Map a generic engine result onto a [`MockResponse`].
///
/// Shared by every engine: numeric statuses are truncated to integers, a
/// structured `body` is serialized to JSON text, header values may be scalars
/// or lists, and `delay` accepts every form a static response accepts.
pub fn response_from_value(value: Value) -> Result<MockResponse, EngineError> {
    let Value::Object(mut fields) = value else {
        return Err(EngineError::Decode(format!(
            "expected a response object, got {}",
            kind(&value)
        )));
    };

    if let Some(status) = fields.get_mut("status") {
        *status = match status.take() {
            Value::Number(n) => match n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)) {
                Some(code) if code <= u64::from(u16::MAX) => Value::from(code),
                _ => return Err(EngineError::Decode(format!("invalid status {n}"))),
            },
            Value::String(s) => s
                .trim()
                .parse::<u16>()
                .map(Value::from)
                .map_err(|_| EngineError::Decode(format!("invalid status {s:?}")))?,
            Value::Null => Value::from(0),
            other => return Err(EngineError::Decode(format!("invalid status {other}"))),
        };
    }

    // Empty Lua/Rhai tables come back as empty arrays.
    if matches!(fields.get("headers"), Some(Value::Array(a)) if a.is_empty()) {
        fields.remove("headers");
    }

    serde_json::from_value(Value::Object(fields)).map_err(|e| EngineError::Decode(e.to_string()))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
