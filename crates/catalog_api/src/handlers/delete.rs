use serde_json::{json, Value};

use crate::error::HandlerError;
use crate::event::{path_parameter, query_parameter};
use crate::item::AlbumKey;
use crate::responses::ApiGatewayResponse;
use crate::store::ItemStore;

pub fn handle_delete_item(event: Value, store: &impl ItemStore) -> ApiGatewayResponse {
    super::respond("delete_item", delete_item(&event, store))
}

fn delete_item(event: &Value, store: &impl ItemStore) -> Result<Value, HandlerError> {
    let key = AlbumKey::new(
        query_parameter(event, "artist_name")?,
        path_parameter(event, "album_name")?,
    );
    store.delete_item(&key).map_err(HandlerError::Store)?;
    Ok(json!({ "message": "Item was deleted successfully" }))
}
