use serde_json::{json, Value};

use crate::error::HandlerError;
use crate::event::json_body;
use crate::item::item_from_body;
use crate::responses::ApiGatewayResponse;
use crate::store::ItemStore;

pub fn handle_create_item(event: Value, store: &impl ItemStore) -> ApiGatewayResponse {
    super::respond("create_item", create_item(&event, store))
}

fn create_item(event: &Value, store: &impl ItemStore) -> Result<Value, HandlerError> {
    let body = json_body(event)?;
    let item = item_from_body(&body)?;
    store.put_item(item).map_err(HandlerError::Store)?;
    Ok(json!({ "message": "Item was created successfully" }))
}
