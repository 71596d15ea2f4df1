//! One handler per route. Each takes the raw HTTP API event and always
//! produces a response; failures become error responses.

pub mod create;
pub mod delete;
pub mod get;
pub mod update;

use serde_json::Value;
use tracing::{error, info};

use crate::error::HandlerError;
use crate::responses::{fail_response, success_response, ApiGatewayResponse};

fn respond(operation: &str, result: Result<Value, HandlerError>) -> ApiGatewayResponse {
    match result {
        Ok(payload) => {
            info!(operation, status = 200, "request handled");
            success_response(payload)
        }
        Err(failure @ HandlerError::Store(_)) => {
            error!(operation, error = %failure, "store request failed");
            fail_response(&failure)
        }
        Err(failure) => {
            info!(operation, status = failure.status_code(), error = %failure, "request rejected");
            fail_response(&failure)
        }
    }
}
