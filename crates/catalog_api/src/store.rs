use crate::expressions::UpdateExpression;
use crate::item::{AlbumKey, Item};

/// Album persistence used by the handlers.
///
/// Implementations report failures as messages; handlers surface them as
/// server errors.
pub trait ItemStore {
    fn put_item(&self, item: Item) -> Result<(), String>;

    /// Apply `update` to the item at `key`, creating it when absent, and
    /// return the updated attributes with their new values.
    fn update_item(&self, key: &AlbumKey, update: &UpdateExpression) -> Result<Item, String>;

    fn get_item(&self, key: &AlbumKey) -> Result<Option<Item>, String>;

    fn delete_item(&self, key: &AlbumKey) -> Result<(), String>;
}
