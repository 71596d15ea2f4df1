use serde_json::{json, Value};

use crate::error::HandlerError;
use crate::event::json_body;
use crate::expressions::UpdateExpression;
use crate::item::{validate_attribute_types, AlbumKey};
use crate::responses::ApiGatewayResponse;
use crate::store::ItemStore;

pub fn handle_update_item(event: Value, store: &impl ItemStore) -> ApiGatewayResponse {
    super::respond("update_item", update_item(&event, store))
}

fn update_item(event: &Value, store: &impl ItemStore) -> Result<Value, HandlerError> {
    let body = json_body(event)?;
    let key = AlbumKey::from_body(&body)?;
    validate_attribute_types(&body)?;

    let update = UpdateExpression::from_body(&body);
    let attributes = store
        .update_item(&key, &update)
        .map_err(HandlerError::Store)?;
    Ok(json!({
        "message": "Item was updated successfully",
        "item": attributes,
    }))
}
