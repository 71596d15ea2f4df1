use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::HandlerError;

pub const PARTITION_KEY: &str = "PK";
pub const SORT_KEY: &str = "SK";

/// Stored attributes of one album, keyed by table attribute name.
pub type Item = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    String,
    Number,
}

impl AttributeKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
        }
    }
}

/// A request field and the table attribute it is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub table_name: &'static str,
    pub api_name: &'static str,
    /// Value placeholder used in update expressions.
    pub placeholder: &'static str,
    pub kind: AttributeKind,
}

/// Attribute catalogue, in update-expression order.
pub const ATTRIBUTES: [Attribute; 6] = [
    Attribute {
        table_name: "ArtistName",
        api_name: "artist_name",
        placeholder: ":an",
        kind: AttributeKind::String,
    },
    Attribute {
        table_name: "AlbumName",
        api_name: "album_name",
        placeholder: ":aln",
        kind: AttributeKind::String,
    },
    Attribute {
        table_name: "ReleaseYear",
        api_name: "release_year",
        placeholder: ":ry",
        kind: AttributeKind::Number,
    },
    Attribute {
        table_name: "NumSongs",
        api_name: "num_songs",
        placeholder: ":ns",
        kind: AttributeKind::Number,
    },
    Attribute {
        table_name: "Sales",
        api_name: "sales",
        placeholder: ":s",
        kind: AttributeKind::Number,
    },
    Attribute {
        table_name: "RecordLabel",
        api_name: "record_label",
        placeholder: ":rl",
        kind: AttributeKind::String,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumKey {
    pub artist_name: String,
    pub album_name: String,
}

impl AlbumKey {
    pub fn new(artist_name: impl Into<String>, album_name: impl Into<String>) -> Self {
        Self {
            artist_name: artist_name.into(),
            album_name: album_name.into(),
        }
    }

    pub fn partition_key(&self) -> String {
        format!("ARTIST#{}", self.artist_name)
    }

    pub fn sort_key(&self) -> String {
        format!("ALBUM#{}", self.album_name)
    }

    /// Key of a JSON request body carrying `artist_name` and `album_name`.
    pub fn from_body(body: &Map<String, Value>) -> Result<Self, HandlerError> {
        Ok(Self::new(
            required_string(body, "artist_name")?,
            required_string(body, "album_name")?,
        ))
    }
}

pub fn required_string(object: &Map<String, Value>, field: &str) -> Result<String, HandlerError> {
    match object.get(field) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(HandlerError::Validation(format!(
            "{other} is not of type 'string'"
        ))),
        None => Err(HandlerError::Validation(format!(
            "'{field}' is a required property"
        ))),
    }
}

/// Check the type of every catalogued field present in `body`.
pub fn validate_attribute_types(body: &Map<String, Value>) -> Result<(), HandlerError> {
    for attribute in &ATTRIBUTES {
        if let Some(value) = body.get(attribute.api_name) {
            if !attribute.kind.matches(value) {
                return Err(HandlerError::Validation(format!(
                    "{value} is not of type '{}'",
                    attribute.kind.name()
                )));
            }
        }
    }
    Ok(())
}

/// The stored form of a create request: key attributes plus every
/// catalogued field the body carries.
pub fn item_from_body(body: &Map<String, Value>) -> Result<Item, HandlerError> {
    let key = AlbumKey::from_body(body)?;
    validate_attribute_types(body)?;

    let mut item = Item::new();
    item.insert(
        PARTITION_KEY.to_string(),
        Value::String(key.partition_key()),
    );
    item.insert(SORT_KEY.to_string(), Value::String(key.sort_key()));
    for attribute in &ATTRIBUTES {
        if let Some(value) = body.get(attribute.api_name) {
            item.insert(attribute.table_name.to_string(), value.clone());
        }
    }
    Ok(item)
}
