//! Helper functions callable from expressions as `#name(...)`.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use minijinja::{Environment, Error, ErrorKind, Value};

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

/// Text form of a value: strings as-is, everything else via display.
fn text_of(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), ToString::to_string)
}

/// Register the stage-independent helpers.
pub(crate) fn register_builtins(env: &mut Environment<'_>) {
    env.add_function("toJson", |value: Value| -> Result<String, Error> {
        serde_json::to_string(&value).map_err(|e| invalid(format!("toJson failed: {e}")))
    });

    env.add_function("readJson", |text: String| -> Result<Value, Error> {
        let parsed: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| invalid(format!("readJson failed: {e}")))?;
        Ok(Value::from_serialize(&parsed))
    });

    env.add_function("toInt", |value: Value| -> Result<Value, Error> {
        let text = text_of(&value);
        text.trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid(format!("'{text}' is not an integer")))
    });

    env.add_function("toFloat", |value: Value| -> Result<Value, Error> {
        let text = text_of(&value);
        text.trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| invalid(format!("'{text}' is not a number")))
    });

    env.add_function("toBoolean", |value: Value| -> bool {
        value
            .as_str()
            .map_or_else(|| value.is_true(), |s| s.trim().eq_ignore_ascii_case("true"))
    });

    env.add_function("toBase64", |value: Value| -> String {
        STANDARD.encode(text_of(&value))
    });

    env.add_function("fromBase64", |text: String| -> Result<String, Error> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| invalid(format!("fromBase64 failed: {e}")))?;
        String::from_utf8(bytes).map_err(|e| invalid(format!("fromBase64 failed: {e}")))
    });

    env.add_function("alphanumerical", |value: Value| -> String {
        text_of(&value)
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect()
    });
}

/// Register helpers that look at the stage being evaluated and its ancestors.
///
/// `stages` holds ancestor snapshots (nearest first) as JSON objects with
/// `name`, `refId`, `type`, `status`, `context` and `outputs`.
pub(crate) fn register_stage_functions(
    env: &mut Environment<'_>,
    current: Arc<serde_json::Value>,
    stages: Arc<Vec<serde_json::Value>>,
) {
    let by_name = Arc::clone(&stages);
    env.add_function("stage", move |name: String| -> Result<Value, Error> {
        find_stage(&by_name, "name", &name)
            .ok_or_else(|| invalid(format!("Unable to locate [{name}] stage")))
    });

    env.add_function("stageByRefId", move |ref_id: String| -> Result<Value, Error> {
        find_stage(&stages, "refId", &ref_id)
            .ok_or_else(|| invalid(format!("Unable to locate stage with refId [{ref_id}]")))
    });

    env.add_function("currentStage", move || -> Value {
        Value::from_serialize(current.as_ref())
    });
}

fn find_stage(stages: &[serde_json::Value], field: &str, wanted: &str) -> Option<Value> {
    stages
        .iter()
        .find(|stage| stage.get(field).and_then(serde_json::Value::as_str) == Some(wanted))
        .map(Value::from_serialize)
}
