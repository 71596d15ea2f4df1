use serde_json::json;

use crate::error::Result;
use crate::stack::Stack;
use crate::template::Resource;

pub const TABLE_LOGICAL_ID: &str = "Table";
pub const PARTITION_KEY: &str = "PK";
pub const SORT_KEY: &str = "SK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableProps {
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDeclaration {
    pub logical_id: String,
    pub table_name: String,
}

/// Declare the single on-demand key-value table with a `PK`/`SK` string key.
pub fn declare_table(stack: &mut Stack, props: &TableProps) -> Result<TableDeclaration> {
    let resource = Resource::new(
        "AWS::DynamoDB::Table",
        json!({
            "TableName": props.table_name,
            "BillingMode": "PAY_PER_REQUEST",
            "KeySchema": [
                { "AttributeName": PARTITION_KEY, "KeyType": "HASH" },
                { "AttributeName": SORT_KEY, "KeyType": "RANGE" }
            ],
            "AttributeDefinitions": [
                { "AttributeName": PARTITION_KEY, "AttributeType": "S" },
                { "AttributeName": SORT_KEY, "AttributeType": "S" }
            ]
        }),
    );
    stack.add_resource(TABLE_LOGICAL_ID, resource)?;

    Ok(TableDeclaration {
        logical_id: TABLE_LOGICAL_ID.to_string(),
        table_name: props.table_name.clone(),
    })
}
