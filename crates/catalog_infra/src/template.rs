use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const SSM_STRING_PARAMETER_TYPE: &str = "AWS::SSM::Parameter::Value<String>";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Resource {
    /// Build a resource from a JSON object of properties.
    ///
    /// Non-object property values are ignored and leave the resource without
    /// properties.
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        let properties = match properties {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        let logical_id = logical_id.into();
        if !self.depends_on.contains(&logical_id) {
            self.depends_on.push(logical_id);
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        self.properties.insert(name.into(), value);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateParameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TemplateParameter {
    /// A parameter the engine resolves from the SSM parameter store at
    /// deploy time, keyed by `key`.
    pub fn ssm_string(key: impl Into<String>) -> Self {
        Self {
            parameter_type: SSM_STRING_PARAMETER_TYPE.to_string(),
            default: Some(key.into()),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion", default = "format_version")]
    pub format_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, TemplateParameter>,
    #[serde(default)]
    pub resources: BTreeMap<String, Resource>,
}

fn format_version() -> String {
    TEMPLATE_FORMAT_VERSION.to_string()
}

impl Template {
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: format_version(),
            description,
            ..Self::default()
        }
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.resource_type == resource_type)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
