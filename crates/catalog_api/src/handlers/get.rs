use serde_json::{json, Value};

use crate::error::HandlerError;
use crate::event::{path_parameter, query_parameter};
use crate::item::AlbumKey;
use crate::responses::ApiGatewayResponse;
use crate::store::ItemStore;

pub fn handle_get_item(event: Value, store: &impl ItemStore) -> ApiGatewayResponse {
    super::respond("get_item", get_item(&event, store))
}

fn get_item(event: &Value, store: &impl ItemStore) -> Result<Value, HandlerError> {
    let key = AlbumKey::new(
        query_parameter(event, "artist_name")?,
        path_parameter(event, "album_name")?,
    );
    let item = store
        .get_item(&key)
        .map_err(HandlerError::Store)?
        .ok_or_else(|| HandlerError::NotFound("Item not found".to_string()))?;
    Ok(json!({ "item": item }))
}
