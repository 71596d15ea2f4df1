//! DynamoDB-backed [`ItemStore`].
//!
//! The handlers are synchronous; each call blocks the current worker on the
//! SDK future, which requires the multi-threaded tokio runtime.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::LambdaConfig;
use crate::expressions::UpdateExpression;
use crate::item::{AlbumKey, Item, PARTITION_KEY, SORT_KEY};
use crate::store::ItemStore;

pub struct DynamoItemStore {
    client: Client,
    table_name: String,
}

impl DynamoItemStore {
    pub async fn connect(config: &LambdaConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let client = if let Some(endpoint) = &config.dynamodb_endpoint {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&sdk_config)
        };

        info!(table = %config.table_name, "connected to DynamoDB");
        Self {
            client,
            table_name: config.table_name.clone(),
        }
    }

    fn block_on<F, T>(future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
    }
}

impl ItemStore for DynamoItemStore {
    fn put_item(&self, item: Item) -> Result<(), String> {
        let attributes = to_attributes(&item)?;
        let client = self.client.clone();
        let table_name = self.table_name.clone();

        Self::block_on(async move {
            client
                .put_item()
                .table_name(table_name)
                .set_item(Some(attributes))
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to put item: {error}"))
        })?;
        debug!(table = %self.table_name, "stored item");
        Ok(())
    }

    fn update_item(&self, key: &AlbumKey, update: &UpdateExpression) -> Result<Item, String> {
        let values = update
            .values
            .iter()
            .map(|(placeholder, value)| Ok((placeholder.clone(), to_attribute(value)?)))
            .collect::<Result<HashMap<_, _>, String>>()?;
        let client = self.client.clone();
        let table_name = self.table_name.clone();
        let expression = update.expression();
        let (partition, sort) = (key.partition_key(), key.sort_key());

        let output = Self::block_on(async move {
            client
                .update_item()
                .table_name(table_name)
                .key(PARTITION_KEY, AttributeValue::S(partition))
                .key(SORT_KEY, AttributeValue::S(sort))
                .update_expression(expression)
                .set_expression_attribute_values(Some(values))
                .return_values(ReturnValue::UpdatedNew)
                .send()
                .await
                .map_err(|error| format!("failed to update item: {error}"))
        })?;

        match output.attributes {
            Some(attributes) => from_attributes(&attributes),
            None => Ok(Item::new()),
        }
    }

    fn get_item(&self, key: &AlbumKey) -> Result<Option<Item>, String> {
        let client = self.client.clone();
        let table_name = self.table_name.clone();
        let (partition, sort) = (key.partition_key(), key.sort_key());

        let output = Self::block_on(async move {
            client
                .get_item()
                .table_name(table_name)
                .key(PARTITION_KEY, AttributeValue::S(partition))
                .key(SORT_KEY, AttributeValue::S(sort))
                .send()
                .await
                .map_err(|error| format!("failed to get item: {error}"))
        })?;

        output.item.as_ref().map(from_attributes).transpose()
    }

    fn delete_item(&self, key: &AlbumKey) -> Result<(), String> {
        let client = self.client.clone();
        let table_name = self.table_name.clone();
        let (partition, sort) = (key.partition_key(), key.sort_key());

        Self::block_on(async move {
            client
                .delete_item()
                .table_name(table_name)
                .key(PARTITION_KEY, AttributeValue::S(partition))
                .key(SORT_KEY, AttributeValue::S(sort))
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to delete item: {error}"))
        })
    }
}

fn to_attributes(item: &Item) -> Result<HashMap<String, AttributeValue>, String> {
    item.iter()
        .map(|(name, value)| Ok((name.clone(), to_attribute(value)?)))
        .collect()
}

fn to_attribute(value: &Value) -> Result<AttributeValue, String> {
    match value {
        Value::String(text) => Ok(AttributeValue::S(text.clone())),
        Value::Number(number) => Ok(AttributeValue::N(number.to_string())),
        Value::Bool(flag) => Ok(AttributeValue::Bool(*flag)),
        Value::Null => Ok(AttributeValue::Null(true)),
        other => Err(format!("unsupported attribute value {other}")),
    }
}

fn from_attributes(attributes: &HashMap<String, AttributeValue>) -> Result<Item, String> {
    attributes
        .iter()
        .map(|(name, value)| Ok((name.clone(), from_attribute(name, value)?)))
        .collect()
}

/// Items only ever hold scalars; list, map, set and binary attributes are
/// refused rather than read as null.
fn from_attribute(name: &str, value: &AttributeValue) -> Result<Value, String> {
    match value {
        AttributeValue::S(text) => Ok(Value::String(text.clone())),
        AttributeValue::N(number) => Ok(number_value(number)),
        AttributeValue::Bool(flag) => Ok(Value::Bool(*flag)),
        AttributeValue::Null(_) => Ok(Value::Null),
        other => {
            warn!(attribute = name, value = ?other, "unsupported attribute type");
            Err(format!("attribute {name} has an unsupported type"))
        }
    }
}

/// Table numbers are decimal strings; integral ones come back as JSON
/// integers.
pub fn number_value(text: &str) -> Value {
    if let Ok(integer) = text.parse::<i64>() {
        return json!(integer);
    }
    match text.parse::<f64>() {
        Ok(float) if float.fract() == 0.0 && float.abs() < i64::MAX as f64 => json!(float as i64),
        Ok(float) => json!(float),
        Err(_) => Value::String(text.to_string()),
    }
}
