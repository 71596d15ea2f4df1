use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::HandlerError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

impl ApiGatewayResponse {
    pub fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}

pub fn success_response(payload: Value) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code: 200,
        headers: json!({"Content-Type": "application/json"}),
        body: payload.to_string(),
    }
}

pub fn fail_response(error: &HandlerError) -> ApiGatewayResponse {
    let status_code = error.status_code();
    ApiGatewayResponse {
        status_code,
        headers: json!({"Content-Type": "application/json"}),
        body: json!({
            "message": error.to_string(),
            "statusCode": status_code,
        })
        .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_body_echoes_status() {
        let response = fail_response(&HandlerError::NotFound("Item not found".to_string()));
        assert_eq!(response.status_code, 404);
        assert_eq!(
            response.body_json().expect("json body"),
            json!({ "message": "Item not found", "statusCode": 404 })
        );
    }
}
