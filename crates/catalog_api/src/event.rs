//! Accessors over API Gateway HTTP API (payload v2) events.

use base64::prelude::*;
use serde_json::{json, Map, Value};

use crate::error::HandlerError;

/// The request body as a JSON object.
///
/// String bodies are parsed, after base64 decoding when the event sets
/// `isBase64Encoded`. An absent or null body is an empty object.
pub fn json_body(event: &Value) -> Result<Map<String, Value>, HandlerError> {
    let Some(object) = event.as_object() else {
        return Err(validation("Request payload must be a JSON object"));
    };
    let encoded = object
        .get("isBase64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let body = match object.get("body") {
        None | Some(Value::Null) => json!({}),
        Some(Value::String(text)) if encoded => parse_text(&decode_body(text)?)?,
        Some(Value::String(text)) => parse_text(text)?,
        Some(body @ Value::Object(_)) => body.clone(),
        Some(_) => return Err(validation("Request body must be a JSON object")),
    };

    match body {
        Value::Object(map) => Ok(map),
        other => Err(validation(format!("{other} is not of type 'object'"))),
    }
}

fn decode_body(text: &str) -> Result<String, HandlerError> {
    let bytes = BASE64_STANDARD
        .decode(text.trim())
        .map_err(|error| validation(format!("Malformed base64 body: {error}")))?;
    String::from_utf8(bytes).map_err(|_| validation("Request body must be UTF-8 text"))
}

fn parse_text(text: &str) -> Result<Value, HandlerError> {
    if text.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(text).map_err(|error| validation(format!("Malformed JSON body: {error}")))
}

pub fn path_parameter(event: &Value, name: &str) -> Result<String, HandlerError> {
    string_parameter(event, "pathParameters", name)
}

pub fn query_parameter(event: &Value, name: &str) -> Result<String, HandlerError> {
    string_parameter(event, "queryStringParameters", name)
}

fn string_parameter(event: &Value, section: &str, name: &str) -> Result<String, HandlerError> {
    let parameters = match event.get(section) {
        Some(Value::Object(parameters)) => parameters,
        Some(other) if !other.is_null() => {
            return Err(validation(format!("{other} is not of type 'object'")))
        }
        _ => return Err(validation(format!("'{name}' is a required property"))),
    };
    crate::item::required_string(parameters, name)
}

fn validation(message: impl Into<String>) -> HandlerError {
    HandlerError::Validation(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_bodies() {
        let event = json!({ "body": "{\"artist_name\":\"A\"}" });
        assert_eq!(json_body(&event).expect("body")["artist_name"], "A");
    }

    #[test]
    fn decodes_base64_bodies() {
        let event = json!({
            "body": "eyJhcnRpc3RfbmFtZSI6IkEifQ==",
            "isBase64Encoded": true
        });
        assert_eq!(json_body(&event).expect("body")["artist_name"], "A");
    }

    #[test]
    fn rejects_bodies_flagged_base64_that_do_not_decode() {
        let event = json!({ "body": "{\"artist_name\":\"A\"}", "isBase64Encoded": true });
        assert!(matches!(
            json_body(&event),
            Err(HandlerError::Validation(message)) if message.starts_with("Malformed base64 body")
        ));
    }

    #[test]
    fn rejects_malformed_and_non_object_bodies() {
        assert!(json_body(&json!({ "body": "{not json" })).is_err());
        assert!(json_body(&json!({ "body": "[1, 2]" })).is_err());
        assert!(json_body(&json!({ "body": 3 })).is_err());
    }

    #[test]
    fn missing_parameter_sections_are_validation_errors() {
        let event = json!({ "pathParameters": { "album_name": "AM" } });
        assert_eq!(path_parameter(&event, "album_name").expect("album"), "AM");
        assert_eq!(
            query_parameter(&event, "artist_name"),
            Err(HandlerError::Validation(
                "'artist_name' is a required property".to_string()
            ))
        );
    }
}
