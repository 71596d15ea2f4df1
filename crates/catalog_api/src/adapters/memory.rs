use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::expressions::UpdateExpression;
use crate::item::{AlbumKey, Item, PARTITION_KEY, SORT_KEY};
use crate::store::ItemStore;

/// Process-local store keyed by `(PK, SK)`.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    items: Mutex<BTreeMap<(String, String), Item>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<(String, String), Item>>, String> {
        self.items
            .lock()
            .map_err(|_| "item store lock poisoned".to_string())
    }

    fn key_of(item: &Item) -> Result<(String, String), String> {
        let part = |name: &str| {
            item.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| format!("item is missing key attribute {name}"))
        };
        Ok((part(PARTITION_KEY)?, part(SORT_KEY)?))
    }
}

fn table_key(key: &AlbumKey) -> (String, String) {
    (key.partition_key(), key.sort_key())
}

impl ItemStore for MemoryItemStore {
    fn put_item(&self, item: Item) -> Result<(), String> {
        let key = Self::key_of(&item)?;
        let mut items = self.lock()?;
        items.insert(key, item);
        Ok(())
    }

    fn update_item(&self, key: &AlbumKey, update: &UpdateExpression) -> Result<Item, String> {
        let (partition, sort) = table_key(key);
        let mut items = self.lock()?;
        let item = items.entry((partition.clone(), sort.clone())).or_insert_with(|| {
            Item::from([
                (PARTITION_KEY.to_string(), Value::String(partition)),
                (SORT_KEY.to_string(), Value::String(sort)),
            ])
        });
        let updated = update.updated_attributes();
        item.extend(updated.clone());
        Ok(updated)
    }

    fn get_item(&self, key: &AlbumKey) -> Result<Option<Item>, String> {
        let items = self.lock()?;
        Ok(items.get(&table_key(key)).cloned())
    }

    fn delete_item(&self, key: &AlbumKey) -> Result<(), String> {
        let mut items = self.lock()?;
        items.remove(&table_key(key));
        Ok(())
    }
}
